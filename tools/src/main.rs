//! pipeline-runner: headless queue consumer for the fuelwatch pipeline.
//!
//! Usage:
//!   pipeline-runner --db fuelwatch.db
//!   pipeline-runner --db fuelwatch.db --once
//!   pipeline-runner --db fuelwatch.db --enqueue-report month pdf --once
//!   pipeline-runner --db fuelwatch.db --seed-demo --test-notification --once

use anyhow::{bail, Result};
use fuelwatch_core::{
    analysis::{analyze_station, numeric_history},
    artifacts::ArtifactStore,
    config::PipelineConfig,
    push::PushDispatcher,
    queue::{JobPayload, JobQueue, NotifyTarget, QueueName},
    reports::{create_report, enqueue_report_generation, ReportFormat, ReportPeriod},
    risk_model::{RiskModelClient, TransactionFeatures},
    store::ComplianceStore,
    types::now_millis,
    worker::Worker,
};
use std::env;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// SIGINT/SIGTERM raise the shutdown flag; the worker loops notice it on
/// their next poll and drain out cleanly.
fn install_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGINT,
            signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            signal_handler as *const () as libc::sighandler_t,
        );
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, std::sync::atomic::Ordering::SeqCst);
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let once = args.iter().any(|a| a == "--once");
    let poll_ms = parse_arg(&args, "--poll-ms", 500u64);
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or("fuelwatch.db");

    println!("fuelwatch — pipeline-runner");
    println!("  db:       {db}");
    println!("  poll_ms:  {poll_ms}");
    println!("  mode:     {}", if once { "once" } else { "poll" });
    println!();

    let config = PipelineConfig::from_env()?;
    let store = ComplianceStore::open(db)?;
    store.migrate()?;
    let queue = JobQueue::new(store.reopen()?);

    if args.iter().any(|a| a == "--seed-demo") {
        seed_demo(&store, &config)?;
    }

    if let Some(pos) = args.iter().position(|a| a == "--enqueue-report") {
        let (Some(period), Some(format)) = (args.get(pos + 1), args.get(pos + 2)) else {
            bail!("--enqueue-report needs <period> <format>");
        };
        let Some(period) = ReportPeriod::parse(period) else {
            bail!("unknown period '{period}' (week|month|year)");
        };
        let Some(format) = ReportFormat::parse(format) else {
            bail!("unknown format '{format}' (pdf|excel|csv)");
        };
        let report_id = create_report(&store, period, format)?;
        enqueue_report_generation(&queue, &store, report_id)?;
        println!("enqueued report {report_id} ({} / {})", period.as_str(), format.as_str());
    }

    if args.iter().any(|a| a == "--test-notification") {
        let job_id = queue.enqueue(&JobPayload::Notify {
            target: NotifyTarget::Admin,
            title: "Test notification".into(),
            body: "pipeline-runner connectivity check".into(),
            data: serde_json::json!({ "source": "pipeline-runner" }),
        })?;
        println!("enqueued test notification as job {job_id}");
    }

    if once {
        let worker = build_worker(&store, &config, QueueName::ALL.to_vec())?;
        let executed = worker.drain()?;
        println!("executed {executed} job(s)");
        return Ok(());
    }

    install_signal_handlers();

    // One consumer thread per queue, each on its own connection; a slow
    // report render never delays notification delivery.
    let poll = Duration::from_millis(poll_ms);
    let mut handles = Vec::new();
    for queue_name in QueueName::ALL {
        let worker = build_worker(&store, &config, vec![queue_name])?;
        handles.push(std::thread::spawn(move || worker.run(poll, &SHUTDOWN)));
    }
    for handle in handles {
        if handle.join().is_err() {
            log::error!("worker thread panicked");
        }
    }
    Ok(())
}

fn build_worker(
    store: &ComplianceStore,
    config: &PipelineConfig,
    queues: Vec<QueueName>,
) -> Result<Worker> {
    let artifacts = ArtifactStore::from_config(&config.storage)?;
    let dispatcher = PushDispatcher::from_config(&config.push);
    Ok(Worker::new(store.reopen()?, artifacts, dispatcher, queues)?)
}

/// Insert a small demo dataset and run one scoring pass over it, so a fresh
/// checkout produces visible output without a client attached.
fn seed_demo(store: &ComplianceStore, config: &PipelineConfig) -> Result<()> {
    let now = now_millis();
    let admin = store.insert_user("Demo Admin", "admin@example.com", "admin", now)?;
    store.insert_user("Demo Supervisor", "supervisor@example.com", "supervisor", now)?;

    let history: Vec<serde_json::Value> = [1200.0, 1150.0, 1220.0, 1180.0, 1210.0]
        .iter()
        .map(|v| serde_json::json!(v))
        .collect();
    let station_id = store.insert_station("Demo Station", 1.52, 1.52, Some(1210.0), &history, now)?;
    let vehicle_id = store.insert_vehicle("DEMO-001", Some("Tanker"), 60.0, Some("diesel"), None, now)?;
    store.insert_audit(station_id, "pending", now)?;

    let station = store
        .get_station(station_id)?
        .ok_or_else(|| anyhow::anyhow!("demo station vanished"))?;
    let result = analyze_station(
        station.price,
        station.official_price,
        &numeric_history(&station.history),
        station.stock.unwrap_or(0.0),
    );
    println!(
        "seeded: admin user {admin}, station {station_id} ({} / score {}), vehicle {vehicle_id}",
        result.status.as_str(),
        result.score
    );

    let model = RiskModelClient::from_config(&config.model);
    let assessment = model.evaluate(&TransactionFeatures {
        liters: 45.0,
        unit_price: 1.52,
        total_amount: 68.4,
        capacity_liters: Some(60.0),
    });
    match assessment {
        Some(a) => println!("risk model: label {} score {:?}", a.label.as_str(), a.score),
        None => println!("risk model: disabled"),
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
