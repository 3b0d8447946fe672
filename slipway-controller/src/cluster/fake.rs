//! Scripted in-process cluster for tests
//!
//! Each image is given a rollout behaviour; a workload reports the
//! behaviour of whatever image it currently runs. Image updates, job
//! creations and deletions are recorded for assertions.

use async_trait::async_trait;
use slipway_core::domain::rollout::WorkloadRef;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use super::{
    ClusterClient, ClusterError, ClusterEvent, ClusterResult, ContainerImage, JobPhase, JobSpec,
    WorkloadCondition, WorkloadStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollout {
    /// All replicas updated and available
    Healthy,
    /// Never converges
    Progressing,
    /// Progress deadline exceeded
    Stalled,
}

#[derive(Default)]
struct State {
    images: HashMap<WorkloadRef, String>,
    behaviours: HashMap<String, Rollout>,
    failing_reads: usize,
    failures_after_update: usize,
    image_updates: Vec<(WorkloadRef, String, BTreeMap<String, String>)>,
    job_outcome: Option<JobPhase>,
    job_logs: String,
    jobs: Vec<JobSpec>,
    deleted_jobs: Vec<String>,
    create_job_latency: Duration,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_workload(&self, workload: &WorkloadRef, image: &str) {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(workload.clone(), image.to_string());
    }

    pub fn set_behaviour(&self, image: &str, rollout: Rollout) {
        self.state
            .lock()
            .unwrap()
            .behaviours
            .insert(image.to_string(), rollout);
    }

    /// The `n` workload reads following the next image update fail with an
    /// API error
    pub fn fail_reads_after_update(&self, n: usize) {
        self.state.lock().unwrap().failures_after_update = n;
    }

    pub fn set_job_outcome(&self, phase: JobPhase) {
        self.state.lock().unwrap().job_outcome = Some(phase);
    }

    /// Delays every `create_job` call
    pub fn set_create_job_latency(&self, latency: Duration) {
        self.state.lock().unwrap().create_job_latency = latency;
    }

    pub fn set_job_logs(&self, logs: &str) {
        self.state.lock().unwrap().job_logs = logs.to_string();
    }

    pub fn current_image(&self, workload: &WorkloadRef) -> Option<String> {
        self.state.lock().unwrap().images.get(workload).cloned()
    }

    /// Images set on workloads, in call order
    pub fn image_updates(&self) -> Vec<(WorkloadRef, String)> {
        self.state
            .lock()
            .unwrap()
            .image_updates
            .iter()
            .map(|(w, i, _)| (w.clone(), i.clone()))
            .collect()
    }

    pub fn last_annotations(&self) -> Option<BTreeMap<String, String>> {
        self.state
            .lock()
            .unwrap()
            .image_updates
            .last()
            .map(|(_, _, a)| a.clone())
    }

    pub fn created_jobs(&self) -> Vec<JobSpec> {
        self.state.lock().unwrap().jobs.clone()
    }

    pub fn deleted_jobs(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_jobs.clone()
    }

    fn status_for(image: &str, rollout: Rollout) -> WorkloadStatus {
        let (updated, ready, conditions) = match rollout {
            Rollout::Healthy => (2, 2, vec![]),
            Rollout::Progressing => (1, 1, vec![]),
            Rollout::Stalled => (
                1,
                1,
                vec![WorkloadCondition {
                    condition_type: "Progressing".to_string(),
                    status: "False".to_string(),
                    reason: Some("ProgressDeadlineExceeded".to_string()),
                    message: Some("deployment exceeded its progress deadline".to_string()),
                }],
            ),
        };

        WorkloadStatus {
            containers: vec![ContainerImage {
                name: "app".to_string(),
                image: image.to_string(),
            }],
            generation: 2,
            observed_generation: 2,
            desired_replicas: 2,
            updated_replicas: updated,
            ready_replicas: ready,
            available_replicas: ready,
            conditions,
        }
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_workload(&self, workload: &WorkloadRef) -> ClusterResult<WorkloadStatus> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(ClusterError::Api {
                status: 503,
                message: "apiserver unavailable".to_string(),
            });
        }

        let image = state
            .images
            .get(workload)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(workload.to_string()))?;
        let rollout = state
            .behaviours
            .get(&image)
            .copied()
            .unwrap_or(Rollout::Healthy);

        Ok(Self::status_for(&image, rollout))
    }

    async fn set_workload_image(
        &self,
        workload: &WorkloadRef,
        _container: Option<&str>,
        image: &str,
        annotations: &BTreeMap<String, String>,
    ) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.images.contains_key(workload) {
            return Err(ClusterError::NotFound(workload.to_string()));
        }
        state.images.insert(workload.clone(), image.to_string());
        state.failing_reads = std::mem::take(&mut state.failures_after_update);
        state
            .image_updates
            .push((workload.clone(), image.to_string(), annotations.clone()));
        Ok(())
    }

    async fn create_job(&self, spec: &JobSpec) -> ClusterResult<()> {
        let latency = {
            let mut state = self.state.lock().unwrap();
            state.jobs.push(spec.clone());
            state.create_job_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    async fn job_phase(&self, _namespace: &str, _name: &str) -> ClusterResult<JobPhase> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .job_outcome
            .clone()
            .unwrap_or(JobPhase::Succeeded))
    }

    async fn job_logs(&self, _namespace: &str, _name: &str) -> ClusterResult<String> {
        Ok(self.state.lock().unwrap().job_logs.clone())
    }

    async fn delete_job(&self, _namespace: &str, name: &str) -> ClusterResult<()> {
        self.state.lock().unwrap().deleted_jobs.push(name.to_string());
        Ok(())
    }

    async fn list_events(&self, namespace: &str) -> ClusterResult<Vec<ClusterEvent>> {
        Ok(vec![ClusterEvent {
            uid: "evt-1".to_string(),
            namespace: namespace.to_string(),
            kind: "Deployment".to_string(),
            object: "web".to_string(),
            reason: "ScalingReplicaSet".to_string(),
            message: "Scaled up replica set web-abc to 2".to_string(),
            event_type: "Normal".to_string(),
            timestamp: None,
        }])
    }
}
