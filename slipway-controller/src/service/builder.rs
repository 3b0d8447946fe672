//! Image Builder Adapter
//!
//! Runs image builds and test checks as one-shot cluster jobs. The adapter
//! polls the job until it finishes, forwarding new pod log lines into the
//! stage log, and races the whole run against the stage timeout.

use slipway_core::domain::log::LogLevel;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pattern::normalize_repository;
use crate::cluster::{ClusterClient, ClusterError, JobPhase, JobSpec};
use crate::config::Config;
use crate::repository::log::LogWriter;

/// Kubernetes object names are DNS labels
const MAX_JOB_NAME_LENGTH: usize = 63;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("job failed: {0}")]
    Failed(String),

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// One image build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub pipeline: String,
    pub build_number: u64,
    pub repository: String,
    pub branch: String,
    pub commit_sha: String,
    /// Fully qualified destination image
    pub destination: String,
    pub context: Option<String>,
    pub dockerfile: Option<String>,
    pub timeout: Duration,
}

pub struct ImageBuilder {
    cluster: Arc<dyn ClusterClient>,
    builder_image: String,
    namespace: String,
    poll_interval: Duration,
    cleanup_on_timeout: bool,
}

impl ImageBuilder {
    pub fn new(config: &Config, cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            cluster,
            builder_image: config.builder_image.clone(),
            namespace: config.builder_namespace.clone(),
            poll_interval: config.build_poll_interval,
            cleanup_on_timeout: config.build_cleanup_on_timeout,
        }
    }

    /// Builds and pushes `req.destination`
    pub async fn build(&self, req: &BuildRequest, log: &LogWriter) -> Result<(), BuildError> {
        let name = job_name(&req.pipeline, req.build_number, "build");
        let spec = JobSpec {
            name,
            namespace: self.namespace.clone(),
            image: self.builder_image.clone(),
            command: Vec::new(),
            args: kaniko_args(req),
            labels: labels(&req.pipeline, req.build_number, "build"),
        };

        log.info(format!("Building {} from {}@{}", req.destination, req.repository, req.commit_sha))
            .await;
        self.run_job(spec, req.timeout, log).await?;
        log.info(format!("Pushed {}", req.destination)).await;
        Ok(())
    }

    /// Runs `command` inside `image` and succeeds on exit code zero
    pub async fn run_check(
        &self,
        pipeline: &str,
        build_number: u64,
        image: &str,
        command: &[String],
        timeout: Duration,
        log: &LogWriter,
    ) -> Result<(), BuildError> {
        let spec = JobSpec {
            name: job_name(pipeline, build_number, "test"),
            namespace: self.namespace.clone(),
            image: image.to_string(),
            command: command.to_vec(),
            args: Vec::new(),
            labels: labels(pipeline, build_number, "test"),
        };

        log.info(format!("Running '{}' in {}", command.join(" "), image))
            .await;
        self.run_job(spec, timeout, log).await
    }

    async fn run_job(
        &self,
        spec: JobSpec,
        timeout: Duration,
        log: &LogWriter,
    ) -> Result<(), BuildError> {
        self.cluster.create_job(&spec).await?;
        info!("Created job {}/{}", spec.namespace, spec.name);
        log.log(LogLevel::Debug, format!("Job {} created", spec.name))
            .await;

        match time::timeout(timeout, self.wait_for_job(&spec, log)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Job {} timed out after {:?}", spec.name, timeout);
                log.error(format!("Timed out after {}s", timeout.as_secs()))
                    .await;
                if self.cleanup_on_timeout {
                    if let Err(e) = self.cluster.delete_job(&spec.namespace, &spec.name).await {
                        warn!("Failed to delete timed out job {}: {}", spec.name, e);
                    }
                }
                Err(BuildError::TimedOut(timeout))
            }
        }
    }

    async fn wait_for_job(&self, spec: &JobSpec, log: &LogWriter) -> Result<(), BuildError> {
        let mut interval = time::interval(self.poll_interval);
        let mut forwarded = 0;

        loop {
            interval.tick().await;

            let phase = match self.cluster.job_phase(&spec.namespace, &spec.name).await {
                Ok(phase) => phase,
                Err(e) => {
                    // Retried on the next tick
                    warn!("Failed to read job {}: {}", spec.name, e);
                    continue;
                }
            };

            self.forward_logs(spec, &mut forwarded, log).await;

            match phase {
                JobPhase::Succeeded => return Ok(()),
                JobPhase::Failed(message) => {
                    log.error(format!("Job failed: {}", message)).await;
                    return Err(BuildError::Failed(message));
                }
                JobPhase::Pending | JobPhase::Running => {
                    debug!("Job {} is {:?}", spec.name, phase);
                }
            }
        }
    }

    /// Appends pod log lines not yet forwarded
    async fn forward_logs(&self, spec: &JobSpec, forwarded: &mut usize, log: &LogWriter) {
        let output = match self.cluster.job_logs(&spec.namespace, &spec.name).await {
            Ok(output) => output,
            Err(e) => {
                debug!("Logs for job {} unavailable: {}", spec.name, e);
                return;
            }
        };

        let lines: Vec<&str> = output.lines().collect();
        for line in lines.iter().skip(*forwarded) {
            log.info(*line).await;
        }
        *forwarded = (*forwarded).max(lines.len());
    }
}

fn kaniko_args(req: &BuildRequest) -> Vec<String> {
    let mut context = format!(
        "--context=git://{}.git#refs/heads/{}",
        normalize_repository(&req.repository),
        req.branch
    );
    if req.commit_sha != super::queue::DEFAULT_COMMIT {
        context.push('#');
        context.push_str(&req.commit_sha);
    }

    let mut args = vec![context, format!("--destination={}", req.destination)];
    if let Some(sub_path) = &req.context {
        args.push(format!("--context-sub-path={}", sub_path));
    }
    if let Some(dockerfile) = &req.dockerfile {
        args.push(format!("--dockerfile={}", dockerfile));
    }
    args
}

fn labels(pipeline: &str, build_number: u64, kind: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/managed-by".to_string(), "slipway".to_string()),
        ("slipway.dev/pipeline".to_string(), slug(pipeline, MAX_JOB_NAME_LENGTH)),
        ("slipway.dev/build".to_string(), build_number.to_string()),
        ("slipway.dev/kind".to_string(), kind.to_string()),
    ])
}

/// `slipway-{pipeline}-{build}-{kind}-{suffix}`, cut to a valid DNS label
fn job_name(pipeline: &str, build_number: u64, kind: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let tail = format!("-{}-{}-{}", build_number, kind, &suffix[..6]);
    let budget = MAX_JOB_NAME_LENGTH - "slipway-".len() - tail.len();
    format!("slipway-{}{}", slug(pipeline, budget), tail)
}

fn slug(value: &str, max: usize) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.truncate(max);
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "pipeline".to_string()
    } else {
        trimmed.to_string()
    }
}
