//! Queue dispatcher
//!
//! Ticks on a fixed interval and starts as many queued jobs as the
//! concurrency limit allows. A failed tick is logged and retried on the
//! next one.

use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{debug, error, info};

use crate::service::BuildQueue;

pub struct Dispatcher {
    queue: Arc<BuildQueue>,
    interval: Duration,
}

impl Dispatcher {
    pub fn new(queue: Arc<BuildQueue>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    /// Starts the dispatch loop; never returns
    pub async fn run(self) {
        info!("Starting queue dispatcher (interval: {:?})", self.interval);

        let mut interval = time::interval(self.interval);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        match self.queue.dispatch_once().await {
            Ok(0) => debug!("Nothing to dispatch"),
            Ok(n) => info!("Dispatched {} job(s) this cycle", n),
            Err(e) => error!("Error during dispatch cycle: {}", e),
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::repository::{
        InMemoryExecutionRepository, InMemoryJobRepository, InMemoryPipelineRepository,
        JobRepository,
    };
    use crate::service::EventBus;
    use crate::service::pipeline::{create_pipeline, tests as pipeline_tests};
    use crate::service::queue::{JobHandler, NewJob};
    use async_trait::async_trait;
    use slipway_core::domain::job::{BuildJob, JobStatus, TriggerType};
    use slipway_core::domain::pipeline::StageType;
    use tokio::sync::mpsc;

    struct Finisher {
        jobs: Arc<InMemoryJobRepository>,
        done: mpsc::UnboundedSender<BuildJob>,
    }

    #[async_trait]
    impl JobHandler for Finisher {
        async fn run(&self, job: BuildJob) {
            self.jobs
                .transition(job.id, JobStatus::Success, None)
                .await
                .unwrap();
            self.done.send(job).unwrap();
        }
    }

    #[tokio::test]
    async fn test_loop_drains_the_queue() {
        let config = Config {
            max_concurrent_builds: 1,
            ..Config::default()
        };
        let jobs = Arc::new(InMemoryJobRepository::new());
        let pipelines = Arc::new(InMemoryPipelineRepository::new());
        let pipeline = create_pipeline(
            pipelines.as_ref(),
            pipeline_tests::spec(vec![pipeline_tests::stage("unit", StageType::Test)]),
        )
        .await
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = Arc::new(BuildQueue::new(
            &config,
            jobs.clone(),
            pipelines,
            Arc::new(InMemoryExecutionRepository::new()),
            Arc::new(Finisher { jobs, done: tx }),
            EventBus::new(),
        ));
        for _ in 0..3 {
            queue
                .enqueue(NewJob::new(pipeline.id, TriggerType::Api))
                .await
                .unwrap();
        }

        let handle = Dispatcher::new(queue.clone(), Duration::from_millis(5)).spawn();
        for _ in 0..3 {
            let job = time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(job.status, JobStatus::Running);
        }
        handle.abort();

        assert_eq!(queue.status().await.unwrap().queued, 0);
    }
}
