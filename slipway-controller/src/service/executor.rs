//! Pipeline Executor
//!
//! Runs one claimed job: stages execute strictly in declaration order and
//! the first failure stops the run. Every stage gets its own log, and the
//! owning job mirrors the terminal status of the execution.

use chrono::Utc;
use regex::{Captures, Regex};
use slipway_core::domain::event::ControllerEvent;
use slipway_core::domain::execution::{
    ExecutionStatus, PipelineExecution, StageExecution, StageStatus,
};
use slipway_core::domain::job::{BuildJob, JobStatus};
use slipway_core::domain::pipeline::{Pipeline, PipelineStage, StageType};
use slipway_core::domain::rollout::{DeployTrigger, HealthState, WorkloadRef};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::builder::{BuildRequest, ImageBuilder};
use super::events::EventBus;
use super::pattern::matches_any;
use super::queue::JobHandler;
use super::rollout::{DeploySpec, RolloutController};
use crate::config::Config;
use crate::repository::log::LogWriter;
use crate::repository::{ExecutionRepository, JobRepository, LogStore, PipelineRepository};

/// Extra time a stage gets past its own timeout so a runner that timed out
/// can still clean up what it started on the cluster
const STAGE_CLEANUP_GRACE: Duration = Duration::from_secs(10);

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Expands `${NAME}` placeholders; unknown names are left untouched
pub fn expand(template: &str, vars: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Pipeline variables, then job overrides, then the built-ins
pub fn build_variables(
    pipeline: &Pipeline,
    job: &BuildJob,
    build_number: u64,
) -> HashMap<String, String> {
    let mut vars = pipeline.variables.clone();
    vars.extend(job.variables.clone());

    let short_sha: String = job.commit_sha.chars().take(7).collect();
    vars.insert("COMMIT_SHA".to_string(), job.commit_sha.clone());
    vars.insert("SHORT_SHA".to_string(), short_sha);
    vars.insert("BRANCH".to_string(), job.branch.clone());
    vars.insert("BUILD_NUMBER".to_string(), build_number.to_string());
    vars.insert("PIPELINE".to_string(), pipeline.name.clone());
    vars.insert("REPOSITORY".to_string(), pipeline.repository.clone());
    vars
}

/// Whether the stage's run condition admits `branch`
fn should_run(stage: &PipelineStage, branch: &str) -> bool {
    stage
        .condition
        .as_ref()
        .is_none_or(|c| matches_any(&c.branches, branch))
}

/// Mutable state threaded through the stages of one run
struct RunContext<'a> {
    pipeline: &'a Pipeline,
    job: &'a BuildJob,
    build_number: u64,
    vars: HashMap<String, String>,
    /// Image pushed by the most recent build stage
    last_image: Option<String>,
}

pub struct PipelineExecutor {
    pipelines: Arc<dyn PipelineRepository>,
    jobs: Arc<dyn JobRepository>,
    executions: Arc<dyn ExecutionRepository>,
    logs: Arc<LogStore>,
    builder: ImageBuilder,
    rollout: RolloutController,
    events: EventBus,
    simulated_test_duration: Duration,
    history_limit: usize,
}

impl PipelineExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        pipelines: Arc<dyn PipelineRepository>,
        jobs: Arc<dyn JobRepository>,
        executions: Arc<dyn ExecutionRepository>,
        logs: Arc<LogStore>,
        builder: ImageBuilder,
        rollout: RolloutController,
        events: EventBus,
    ) -> Self {
        Self {
            pipelines,
            jobs,
            executions,
            logs,
            builder,
            rollout,
            events,
            simulated_test_duration: config.simulated_test_duration,
            history_limit: config.execution_history_limit,
        }
    }

    async fn execute(&self, job: BuildJob) {
        let pipeline = match self.pipelines.find_by_id(job.pipeline_id).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                self.fail_job(&job, format!("pipeline {} no longer exists", job.pipeline_id))
                    .await;
                return;
            }
            Err(e) => {
                self.fail_job(&job, format!("failed to load pipeline: {}", e))
                    .await;
                return;
            }
        };

        let build_number = match self.executions.next_build_number(pipeline.id).await {
            Ok(n) => n,
            Err(e) => {
                self.fail_job(&job, format!("failed to allocate build number: {}", e))
                    .await;
                return;
            }
        };

        let mut execution = PipelineExecution {
            id: Uuid::new_v4(),
            pipeline_id: pipeline.id,
            pipeline_name: pipeline.name.clone(),
            job_id: job.id,
            build_number,
            repository: pipeline.repository.clone(),
            branch: job.branch.clone(),
            commit_sha: job.commit_sha.clone(),
            author: job.author.clone(),
            trigger: job.trigger,
            stages: Vec::new(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            error_message: None,
        };

        if let Err(e) = self.executions.insert(&execution).await {
            warn!("Failed to record execution {}: {}", execution.id, e);
        }
        if let Err(e) = self.jobs.set_execution(job.id, execution.id).await {
            warn!("Failed to link job {} to execution {}: {}", job.id, execution.id, e);
        }

        info!(
            "Build #{} of {} started ({}@{})",
            build_number, pipeline.name, job.branch, job.commit_sha
        );
        self.events.publish(ControllerEvent::BuildStarted {
            job_id: job.id,
            execution_id: execution.id,
            pipeline_id: pipeline.id,
            build_number,
        });

        let mut ctx = RunContext {
            pipeline: &pipeline,
            job: &job,
            build_number,
            vars: build_variables(&pipeline, &job, build_number),
            last_image: None,
        };
        let deadline = pipeline
            .timeout_seconds
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        let failure = self.run_stages(&mut execution, &mut ctx, deadline).await;
        self.finish(execution, &job, failure).await;
    }

    /// Runs the stages in order; returns the error that stopped the run
    async fn run_stages(
        &self,
        execution: &mut PipelineExecution,
        ctx: &mut RunContext<'_>,
        deadline: Option<Instant>,
    ) -> Option<String> {
        let pipeline = ctx.pipeline;
        for stage in &pipeline.stages {
            let log = self.logs.writer(Uuid::new_v4());

            if !should_run(stage, &ctx.job.branch) {
                log.info(format!("Skipped: branch {} does not match", ctx.job.branch))
                    .await;
                let now = Utc::now();
                execution.stages.push(StageExecution {
                    name: stage.name.clone(),
                    stage_type: stage.stage_type.clone(),
                    status: StageStatus::Skipped,
                    started_at: now,
                    finished_at: Some(now),
                    duration_ms: Some(0),
                    log_id: log.log_id(),
                    error: None,
                    output: None,
                });
                self.save(execution).await;
                self.events.publish(ControllerEvent::StageCompleted {
                    execution_id: execution.id,
                    stage: stage.name.clone(),
                    status: StageStatus::Skipped,
                });
                continue;
            }

            let started_at = Utc::now();
            execution.stages.push(StageExecution {
                name: stage.name.clone(),
                stage_type: stage.stage_type.clone(),
                status: StageStatus::Running,
                started_at,
                finished_at: None,
                duration_ms: None,
                log_id: log.log_id(),
                error: None,
                output: None,
            });
            self.save(execution).await;
            self.events.publish(ControllerEvent::StageStarted {
                execution_id: execution.id,
                stage: stage.name.clone(),
            });
            log.info(format!("Stage {} ({}) started", stage.name, stage.stage_type))
                .await;

            let mut timeout = Duration::from_secs(stage.timeout_seconds);
            if let Some(deadline) = deadline {
                timeout = timeout.min(deadline.saturating_duration_since(Instant::now()));
            }

            // Runners enforce `timeout` themselves; the outer bound only
            // catches a runner stuck past its own cleanup
            let result = if timeout.is_zero() {
                Err("pipeline timeout exceeded".to_string())
            } else {
                let stage_run = self.run_stage(stage, ctx, timeout, &log);
                match time::timeout(timeout + STAGE_CLEANUP_GRACE, stage_run).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("stage timed out after {}s", timeout.as_secs())),
                }
            };

            let finished_at = Utc::now();
            let (status, error, output) = match result {
                Ok(output) => {
                    log.info(format!("Stage {} succeeded", stage.name)).await;
                    (StageStatus::Success, None, output)
                }
                Err(message) => {
                    log.error(format!("Stage {} failed: {}", stage.name, message))
                        .await;
                    (StageStatus::Failed, Some(message), None)
                }
            };

            if let Some(record) = execution.stages.last_mut() {
                record.status = status;
                record.finished_at = Some(finished_at);
                record.duration_ms = Some(elapsed_ms(started_at, finished_at));
                record.error = error.clone();
                record.output = output;
            }
            self.save(execution).await;
            self.events.publish(ControllerEvent::StageCompleted {
                execution_id: execution.id,
                stage: stage.name.clone(),
                status,
            });

            if let Some(message) = error {
                return Some(format!("stage '{}' failed: {}", stage.name, message));
            }
        }
        None
    }

    /// Runs one stage; `Ok` carries the stage output, if any
    async fn run_stage(
        &self,
        stage: &PipelineStage,
        ctx: &mut RunContext<'_>,
        timeout: Duration,
        log: &LogWriter,
    ) -> Result<Option<String>, String> {
        let config = &stage.config;
        let vars = &ctx.vars;
        let expand_opt = |v: &Option<String>| v.as_deref().map(|s| expand(s, vars));

        match &stage.stage_type {
            StageType::Build => {
                let destination = expand_opt(&config.image)
                    .ok_or_else(|| "build stage has no image".to_string())?;
                let req = BuildRequest {
                    pipeline: ctx.pipeline.name.clone(),
                    build_number: ctx.build_number,
                    repository: ctx.pipeline.repository.clone(),
                    branch: ctx.job.branch.clone(),
                    commit_sha: ctx.job.commit_sha.clone(),
                    destination: destination.clone(),
                    context: expand_opt(&config.context),
                    dockerfile: expand_opt(&config.dockerfile),
                    timeout,
                };

                self.builder
                    .build(&req, log)
                    .await
                    .map_err(|e| e.to_string())?;
                ctx.last_image = Some(destination.clone());
                Ok(Some(destination))
            }
            StageType::Deploy => {
                let image = expand_opt(&config.image)
                    .or_else(|| ctx.last_image.clone())
                    .ok_or_else(|| "no image configured and no earlier build stage".to_string())?;
                let workload = expand_opt(&config.workload)
                    .ok_or_else(|| "deploy stage has no workload".to_string())?;
                let namespace =
                    expand_opt(&config.namespace).unwrap_or_else(|| "default".to_string());
                let workload = WorkloadRef::new(namespace, workload);

                log.info(format!("Deploying {} to {}", image, workload)).await;
                let check = self
                    .rollout
                    .deploy(DeploySpec {
                        workload: workload.clone(),
                        image: image.clone(),
                        container: expand_opt(&config.container),
                        auto_rollback: config.auto_rollback,
                        trigger: DeployTrigger::Pipeline,
                        digest: None,
                    })
                    .await
                    .map_err(|e| e.to_string())?;

                let outcome = self
                    .rollout
                    .wait_for_outcome(check.id, timeout)
                    .await
                    .map_err(|e| e.to_string())?;
                if outcome.status != HealthState::Healthy {
                    return Err(format!("rollout of {} failed: {}", workload, outcome.message));
                }

                log.info(format!("{} is healthy on {}", workload, image)).await;
                Ok(Some(image))
            }
            StageType::Test => match expand_opt(&config.image) {
                Some(image) if !config.command.is_empty() => {
                    let command: Vec<String> =
                        config.command.iter().map(|c| expand(c, vars)).collect();
                    self.builder
                        .run_check(
                            &ctx.pipeline.name,
                            ctx.build_number,
                            &image,
                            &command,
                            timeout,
                            log,
                        )
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(None)
                }
                _ => {
                    log.info("No test command configured; running simulated check")
                        .await;
                    if self.simulated_test_duration > timeout {
                        time::sleep(timeout).await;
                        return Err(format!("stage timed out after {}s", timeout.as_secs()));
                    }
                    time::sleep(self.simulated_test_duration).await;
                    Ok(None)
                }
            },
            StageType::Custom | StageType::Other(_) => {
                warn!(
                    "Stage {} of {} has type '{}' with no runner; treating as success",
                    stage.name, ctx.pipeline.name, stage.stage_type
                );
                log.warning(format!("No runner for stage type '{}'", stage.stage_type))
                    .await;
                Ok(None)
            }
        }
    }

    async fn finish(&self, mut execution: PipelineExecution, job: &BuildJob, failure: Option<String>) {
        let finished_at = Utc::now();
        execution.status = if failure.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Success
        };
        execution.finished_at = Some(finished_at);
        execution.duration_ms = Some(elapsed_ms(execution.started_at, finished_at));
        execution.error_message = failure.clone();
        self.save(&execution).await;

        match &failure {
            Some(message) => warn!(
                "Build #{} of {} failed: {}",
                execution.build_number, execution.pipeline_name, message
            ),
            None => info!(
                "Build #{} of {} succeeded",
                execution.build_number, execution.pipeline_name
            ),
        }

        let job_status = if failure.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Success
        };
        if let Err(e) = self.jobs.transition(job.id, job_status, failure).await {
            error!("Failed to finish job {}: {}", job.id, e);
        }

        self.events.publish(ControllerEvent::BuildCompleted {
            job_id: job.id,
            execution_id: execution.id,
            status: execution.status,
        });
        self.events.publish(ControllerEvent::JobStatusChanged {
            job_id: job.id,
            status: job_status,
        });

        match self.executions.enforce_retention(self.history_limit).await {
            Ok(dropped) if dropped.is_empty() => {}
            Ok(dropped) => {
                let logs = self.logs.remove_stage_logs(&dropped).await;
                debug!(
                    "Dropped {} executions beyond the history limit ({} logs)",
                    dropped.len(),
                    logs
                );
            }
            Err(e) => warn!("Execution retention failed: {}", e),
        }
    }

    /// Fails a job that never got an execution
    async fn fail_job(&self, job: &BuildJob, message: String) {
        error!("Job {} failed before starting: {}", job.id, message);
        if let Err(e) = self
            .jobs
            .transition(job.id, JobStatus::Failed, Some(message))
            .await
        {
            error!("Failed to mark job {} failed: {}", job.id, e);
        }
        self.events.publish(ControllerEvent::JobStatusChanged {
            job_id: job.id,
            status: JobStatus::Failed,
        });
    }

    async fn save(&self, execution: &PipelineExecution) {
        if let Err(e) = self.executions.update(execution).await {
            warn!("Failed to update execution {}: {}", execution.id, e);
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for PipelineExecutor {
    async fn run(&self, job: BuildJob) {
        self.execute(job).await;
    }
}

fn elapsed_ms(start: chrono::DateTime<Utc>, end: chrono::DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::JobPhase;
    use crate::cluster::fake::{FakeCluster, Rollout};
    use crate::repository::{
        DeploymentHistoryRepository, HealthCheckRepository, InMemoryExecutionRepository,
        InMemoryJobRepository, InMemoryPipelineRepository,
    };
    use crate::service::pipeline::{create_pipeline, tests as pipeline_tests};
    use crate::service::queue::{BuildQueue, NewJob};
    use slipway_core::domain::job::TriggerType;
    use slipway_core::domain::pipeline::StageCondition;
    use slipway_core::dto::pipeline::PipelineSpec;

    fn test_config() -> Config {
        Config {
            build_poll_interval: Duration::from_millis(5),
            health_poll_interval: Duration::from_millis(5),
            health_max_attempts: 4,
            simulated_test_duration: Duration::from_millis(1),
            ..Config::default()
        }
    }

    struct Harness {
        executor: PipelineExecutor,
        queue: BuildQueue,
        jobs: Arc<InMemoryJobRepository>,
        executions: Arc<InMemoryExecutionRepository>,
        logs: Arc<LogStore>,
        cluster: Arc<FakeCluster>,
        events: EventBus,
        pipeline_id: Uuid,
    }

    async fn harness(spec: PipelineSpec) -> Harness {
        let config = test_config();
        let cluster = Arc::new(FakeCluster::new());
        let pipelines = Arc::new(InMemoryPipelineRepository::new());
        let jobs = Arc::new(InMemoryJobRepository::new());
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let logs = Arc::new(LogStore::new());
        let events = EventBus::new();

        let pipeline = create_pipeline(pipelines.as_ref(), spec).await.unwrap();
        let rollout = RolloutController::new(
            &config,
            cluster.clone(),
            Arc::new(HealthCheckRepository::new()),
            Arc::new(DeploymentHistoryRepository::new()),
            events.clone(),
        );
        let executor = PipelineExecutor::new(
            &config,
            pipelines.clone(),
            jobs.clone(),
            executions.clone(),
            logs.clone(),
            ImageBuilder::new(&config, cluster.clone()),
            rollout,
            events.clone(),
        );

        struct Idle;
        #[async_trait::async_trait]
        impl JobHandler for Idle {
            async fn run(&self, _job: BuildJob) {}
        }

        // The queue only admits and claims here; jobs are run by hand
        let queue = BuildQueue::new(
            &config,
            jobs.clone(),
            pipelines,
            executions.clone(),
            Arc::new(Idle),
            events.clone(),
        );

        Harness {
            executor,
            queue,
            jobs,
            executions,
            logs,
            cluster,
            events,
            pipeline_id: pipeline.id,
        }
    }

    impl Harness {
        /// Admits a job, claims it and runs it to completion
        async fn run(&self, branch: &str) -> (BuildJob, PipelineExecution) {
            let job = self
                .queue
                .enqueue(NewJob {
                    branch: Some(branch.to_string()),
                    commit_sha: Some("0123456789abcdef".to_string()),
                    ..NewJob::new(self.pipeline_id, TriggerType::Manual)
                })
                .await
                .unwrap();
            let claimed = self.jobs.claim_next(1).await.unwrap().unwrap();
            assert_eq!(claimed.id, job.id);

            self.executor.run(claimed).await;

            let job = self.jobs.find_by_id(job.id).await.unwrap().unwrap();
            let execution = self
                .executions
                .find_by_id(job.execution_id.unwrap())
                .await
                .unwrap()
                .unwrap();
            (job, execution)
        }
    }

    fn test_stage(name: &str, image: Option<&str>) -> PipelineStage {
        let mut stage = pipeline_tests::stage(name, StageType::Test);
        if let Some(image) = image {
            stage.config.image = Some(image.to_string());
            stage.config.command = vec!["make".to_string(), "test".to_string()];
        }
        stage
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_run() {
        let spec = pipeline_tests::spec(vec![
            test_stage("a", None),
            test_stage("b", Some("golang:1.22")),
            pipeline_tests::stage("c", StageType::Custom),
        ]);
        let h = harness(spec).await;
        h.cluster.set_job_outcome(JobPhase::Failed("exit code 2".to_string()));

        let (job, execution) = h.run("main").await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.stages.len(), 2);
        assert_eq!(execution.stages[0].status, StageStatus::Success);
        assert_eq!(execution.stages[1].status, StageStatus::Failed);
        assert!(execution.error_message.as_deref().unwrap().contains("'b'"));
        assert!(execution.duration_ms.is_some());

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(h.cluster.created_jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_all_stages_pass_and_each_has_a_log() {
        let spec = pipeline_tests::spec(vec![
            test_stage("unit", None),
            pipeline_tests::stage("notify", StageType::Other("slack".to_string())),
        ]);
        let h = harness(spec).await;
        let mut rx = h.events.subscribe();

        let (job, execution) = h.run("main").await;

        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.build_number, 1);
        assert_eq!(job.status, JobStatus::Success);
        for stage in &execution.stages {
            assert_eq!(stage.status, StageStatus::Success);
            assert!(!h.logs.read_all(stage.log_id).await.is_empty());
        }

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(serde_json::to_value(&event).unwrap()["type"].clone());
        }
        assert_eq!(kinds.first().unwrap(), "build_queued");
        assert!(kinds.contains(&serde_json::json!("build_started")));
        assert!(kinds.contains(&serde_json::json!("build_completed")));
    }

    #[tokio::test]
    async fn test_build_then_deploy_uses_built_image() {
        let mut build = pipeline_tests::stage("image", StageType::Build);
        build.config.image = Some("registry.local:5000/api:${SHORT_SHA}".to_string());
        let mut deploy = pipeline_tests::stage("ship", StageType::Deploy);
        deploy.config.workload = Some("api".to_string());
        deploy.config.namespace = Some("prod".to_string());

        let h = harness(pipeline_tests::spec(vec![build, deploy])).await;
        let target = WorkloadRef::new("prod", "api");
        h.cluster.add_workload(&target, "registry.local:5000/api:old");

        let (_, execution) = h.run("main").await;

        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(
            execution.stages[0].output.as_deref(),
            Some("registry.local:5000/api:0123456")
        );
        assert_eq!(
            h.cluster.current_image(&target).as_deref(),
            Some("registry.local:5000/api:0123456")
        );
    }

    #[tokio::test]
    async fn test_stalled_rollout_fails_deploy_stage() {
        let mut deploy = pipeline_tests::stage("ship", StageType::Deploy);
        deploy.config.workload = Some("api".to_string());
        deploy.config.image = Some("acme/api:broken".to_string());

        let h = harness(pipeline_tests::spec(vec![deploy])).await;
        h.cluster
            .add_workload(&WorkloadRef::new("default", "api"), "acme/api:good");
        h.cluster.set_behaviour("acme/api:broken", Rollout::Stalled);

        let (job, execution) = h.run("main").await;

        assert_eq!(execution.stages[0].status, StageStatus::Failed);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_branch_condition_skips_stage() {
        let mut release_only = test_stage("publish", None);
        release_only.condition = Some(StageCondition {
            branches: vec!["release/*".to_string()],
        });
        let h = harness(pipeline_tests::spec(vec![test_stage("unit", None), release_only])).await;

        let (_, execution) = h.run("main").await;

        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.stages[1].status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_stage_timeout_fails_stage() {
        let mut slow = test_stage("slow", Some("golang:1.22"));
        slow.timeout_seconds = 1;
        let h = harness(pipeline_tests::spec(vec![slow])).await;
        h.cluster.set_job_outcome(JobPhase::Running);

        let (_, execution) = h.run("main").await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.stages[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timed_out_job_is_deleted_despite_slow_job_creation() {
        let mut slow = test_stage("slow", Some("golang:1.22"));
        slow.timeout_seconds = 1;
        let h = harness(pipeline_tests::spec(vec![slow])).await;
        h.cluster.set_job_outcome(JobPhase::Running);
        h.cluster.set_create_job_latency(Duration::from_millis(30));

        let (job, execution) = h.run("main").await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(execution.stages[0].error.as_deref().unwrap().contains("timed out"));
        let created = h.cluster.created_jobs();
        assert_eq!(h.cluster.deleted_jobs(), vec![created[0].name.clone()]);
    }

    #[tokio::test]
    async fn test_failed_build_stage_fails_execution() {
        let mut build = pipeline_tests::stage("image", StageType::Build);
        build.config.image = Some("registry.local:5000/api:${SHORT_SHA}".to_string());
        let h = harness(pipeline_tests::spec(vec![build])).await;
        h.cluster
            .set_job_outcome(JobPhase::Failed("kaniko exited with 1".to_string()));

        let (job, execution) = h.run("main").await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.stages.len(), 1);
        assert_eq!(execution.stages[0].status, StageStatus::Failed);
        assert!(
            execution.stages[0]
                .error
                .as_deref()
                .unwrap()
                .contains("kaniko exited with 1")
        );
        assert!(execution.stages[0].output.is_none());
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(h.cluster.created_jobs().len(), 1);
    }

    #[test]
    fn test_expand_replaces_known_placeholders_only() {
        let vars = HashMap::from([
            ("SHORT_SHA".to_string(), "abc1234".to_string()),
            ("PIPELINE".to_string(), "api".to_string()),
        ]);
        assert_eq!(expand("acme/${PIPELINE}:${SHORT_SHA}", &vars), "acme/api:abc1234");
        assert_eq!(expand("${UNKNOWN}-x", &vars), "${UNKNOWN}-x");
    }
}
