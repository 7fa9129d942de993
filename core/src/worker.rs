//! Worker pool: consumes the two named queues and dispatches typed jobs to
//! their handlers.
//!
//! Within one worker, job execution is strictly sequential; concurrency
//! comes from running several workers (threads or processes), each with its
//! own store connection. The at-most-one-active-execution guarantee is the
//! queue's (claim is one atomic UPDATE), not the worker's.

use crate::{
    artifacts::ArtifactStore,
    error::PipelineResult,
    notifications::{NotificationService, PushPayload},
    push::PushDispatcher,
    queue::{ClaimedJob, JobPayload, JobQueue, QueueName},
    reports::ReportGenerator,
    store::ComplianceStore,
    types::now_millis,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct Worker {
    queue: JobQueue,
    store: ComplianceStore,
    reports: ReportGenerator,
    notifier: NotificationService,
    queues: Vec<QueueName>,
}

impl Worker {
    /// Build a worker consuming `queues`. The queue handle gets its own
    /// connection so claim traffic never contends with handler reads on the
    /// same connection.
    pub fn new(
        store: ComplianceStore,
        artifacts: ArtifactStore,
        dispatcher: PushDispatcher,
        queues: Vec<QueueName>,
    ) -> PipelineResult<Self> {
        let queue = JobQueue::new(store.reopen()?);
        Ok(Self {
            queue,
            store,
            reports: ReportGenerator::new(artifacts),
            notifier: NotificationService::new(dispatcher),
            queues,
        })
    }

    /// Run every currently-due job once, across all subscribed queues.
    /// Returns the number of jobs executed (successfully or not). Used by
    /// tests and `--once` mode; the polling loop calls it repeatedly.
    ///
    /// Each pass first recovers jobs orphaned by a crashed worker, so a
    /// claim that was never settled becomes claimable again once its
    /// visibility timeout elapses.
    pub fn drain(&self) -> PipelineResult<usize> {
        let mut executed = 0;
        for queue in &self.queues {
            self.queue.recover_stalled(*queue, now_millis())?;
            while let Some(job) = self.queue.claim(*queue, now_millis())? {
                self.run_job(&job)?;
                executed += 1;
            }
        }
        Ok(executed)
    }

    /// Poll loop: drain, sleep when idle, stop when `shutdown` is raised.
    pub fn run(&self, poll: Duration, shutdown: &AtomicBool) {
        log::info!(
            "worker consuming {:?}",
            self.queues.iter().map(|q| q.as_str()).collect::<Vec<_>>()
        );
        while !shutdown.load(Ordering::SeqCst) {
            match self.drain() {
                Ok(0) => std::thread::sleep(poll),
                Ok(n) => log::debug!("executed {n} job(s)"),
                Err(err) => {
                    // A store/queue error here is the worker's own plumbing
                    // failing, not a handler failing; back off and retry.
                    log::error!("worker loop error: {err}");
                    std::thread::sleep(poll);
                }
            }
        }
        log::info!("worker stopped");
    }

    /// Execute one claimed job and settle it with the queue. Handler errors
    /// are routed into the retry machinery, never propagated out of the
    /// worker loop.
    fn run_job(&self, job: &ClaimedJob) -> PipelineResult<()> {
        let outcome = match &job.payload {
            JobPayload::GenerateReport { report_id } => self
                .reports
                .generate(&self.store, *report_id)
                .map(|_| ()),
            JobPayload::Notify { target, title, body, data } => self
                .notifier
                .notify_role(
                    &self.store,
                    *target,
                    &PushPayload {
                        title: title.clone(),
                        body: body.clone(),
                        data: data.clone(),
                    },
                )
                .map(|_| ()),
        };

        match outcome {
            Ok(()) => self.queue.complete(job, now_millis()),
            Err(err) => self.queue.fail(job, &err, now_millis()),
        }
    }
}
