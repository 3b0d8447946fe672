//! Kubernetes REST client
//!
//! Speaks to the API server directly over HTTPS with a service account
//! bearer token: apps/v1 Deployments, batch/v1 Jobs and core/v1 pods, logs
//! and events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use slipway_core::domain::rollout::WorkloadRef;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{
    ClusterClient, ClusterError, ClusterEvent, ClusterResult, ContainerImage, JobPhase, JobSpec,
    WorkloadCondition, WorkloadStatus,
};
use crate::config::Config;

const STRATEGIC_MERGE_PATCH: &str = "application/strategic-merge-patch+json";

/// Seconds a finished job is kept by the cluster before garbage collection
const JOB_TTL_SECONDS: u32 = 3600;

pub struct KubeClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl KubeClient {
    /// Builds a client from the controller configuration
    ///
    /// A missing token file is not an error: the client then sends
    /// unauthenticated requests, which works against `kubectl proxy`.
    pub async fn from_config(config: &Config) -> ClusterResult<Self> {
        let token = match tokio::fs::read_to_string(&config.kube_token_path).await {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "No service account token at {}, using unauthenticated requests",
                    config.kube_token_path.display()
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        let client = Client::builder()
            .danger_accept_invalid_certs(config.kube_insecure_tls)
            .build()?;

        Ok(Self {
            base_url: config.kube_api_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClusterResult<T> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        let response = check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ClusterError::Parse(e.to_string()))
    }

    fn deployment_path(workload: &WorkloadRef) -> String {
        format!(
            "/apis/apps/v1/namespaces/{}/deployments/{}",
            workload.namespace, workload.name
        )
    }

    fn job_path(namespace: &str, name: &str) -> String {
        format!("/apis/batch/v1/namespaces/{}/jobs/{}", namespace, name)
    }
}

/// Maps non-success responses onto cluster errors
async fn check(response: Response) -> ClusterResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    if status == StatusCode::NOT_FOUND {
        Err(ClusterError::NotFound(message))
    } else {
        Err(ClusterError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn get_workload(&self, workload: &WorkloadRef) -> ClusterResult<WorkloadStatus> {
        let deployment: Deployment = self.get_json(&Self::deployment_path(workload)).await?;
        Ok(deployment.into())
    }

    async fn set_workload_image(
        &self,
        workload: &WorkloadRef,
        container: Option<&str>,
        image: &str,
        annotations: &BTreeMap<String, String>,
    ) -> ClusterResult<()> {
        // Strategic merge keys containers by name, so the name must be known
        let container = match container {
            Some(name) => name.to_string(),
            None => {
                let status = self.get_workload(workload).await?;
                status
                    .containers
                    .first()
                    .map(|c| c.name.clone())
                    .ok_or_else(|| {
                        ClusterError::Parse(format!("{} has no containers", workload))
                    })?
            }
        };

        let patch = json!({
            "spec": {
                "template": {
                    "metadata": { "annotations": annotations },
                    "spec": {
                        "containers": [{ "name": container, "image": image }]
                    }
                }
            }
        });

        debug!("Patching {} container {} to {}", workload, container, image);

        let response = self
            .request(reqwest::Method::PATCH, &Self::deployment_path(workload))
            .header(reqwest::header::CONTENT_TYPE, STRATEGIC_MERGE_PATCH)
            .body(patch.to_string())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn create_job(&self, spec: &JobSpec) -> ClusterResult<()> {
        let mut container = json!({
            "name": "main",
            "image": spec.image,
            "args": spec.args,
        });
        if !spec.command.is_empty() {
            container["command"] = json!(spec.command);
        }

        let body = json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": spec.name,
                "namespace": spec.namespace,
                "labels": spec.labels,
            },
            "spec": {
                "backoffLimit": 0,
                "ttlSecondsAfterFinished": JOB_TTL_SECONDS,
                "template": {
                    "metadata": { "labels": spec.labels },
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [container],
                    }
                }
            }
        });

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/apis/batch/v1/namespaces/{}/jobs", spec.namespace),
            )
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn job_phase(&self, namespace: &str, name: &str) -> ClusterResult<JobPhase> {
        let job: Job = self.get_json(&Self::job_path(namespace, name)).await?;
        Ok(job.status.phase())
    }

    async fn job_logs(&self, namespace: &str, name: &str) -> ClusterResult<String> {
        let pods: PodList = self
            .get_json(&format!(
                "/api/v1/namespaces/{}/pods?labelSelector=job-name%3D{}",
                namespace, name
            ))
            .await?;

        let Some(pod) = pods.items.first() else {
            return Ok(String::new());
        };

        let response = self
            .request(
                reqwest::Method::GET,
                &format!(
                    "/api/v1/namespaces/{}/pods/{}/log",
                    namespace, pod.metadata.name
                ),
            )
            .send()
            .await?;

        // Logs are unavailable until the container starts
        if response.status() == StatusCode::BAD_REQUEST {
            return Ok(String::new());
        }

        Ok(check(response).await?.text().await?)
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!(
                    "{}?propagationPolicy=Background",
                    Self::job_path(namespace, name)
                ),
            )
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn list_events(&self, namespace: &str) -> ClusterResult<Vec<ClusterEvent>> {
        let events: EventList = self
            .get_json(&format!("/api/v1/namespaces/{}/events", namespace))
            .await?;

        Ok(events
            .items
            .into_iter()
            .map(|e| ClusterEvent {
                uid: e.metadata.uid.unwrap_or_default(),
                namespace: namespace.to_string(),
                kind: e.involved_object.kind,
                object: e.involved_object.name,
                reason: e.reason.unwrap_or_default(),
                message: e.message.unwrap_or_default(),
                event_type: e.event_type.unwrap_or_default(),
                timestamp: e.last_timestamp.or(e.event_time),
            })
            .collect())
    }
}

// =============================================================================
// API Object Types
// =============================================================================

#[derive(Deserialize)]
struct Deployment {
    #[serde(default)]
    metadata: ObjectMeta,
    spec: DeploymentSpec,
    #[serde(default)]
    status: DeploymentStatusBody,
}

#[derive(Deserialize, Default)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    generation: i64,
    uid: Option<String>,
}

#[derive(Deserialize)]
struct DeploymentSpec {
    replicas: Option<i32>,
    template: PodTemplate,
}

#[derive(Deserialize)]
struct PodTemplate {
    spec: PodSpec,
}

#[derive(Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Deserialize)]
struct Container {
    name: String,
    image: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct DeploymentStatusBody {
    observed_generation: i64,
    updated_replicas: i32,
    ready_replicas: i32,
    available_replicas: i32,
    conditions: Vec<Condition>,
}

#[derive(Deserialize)]
struct Condition {
    #[serde(rename = "type")]
    condition_type: String,
    status: String,
    reason: Option<String>,
    message: Option<String>,
}

impl From<Deployment> for WorkloadStatus {
    fn from(d: Deployment) -> Self {
        WorkloadStatus {
            containers: d
                .spec
                .template
                .spec
                .containers
                .into_iter()
                .map(|c| ContainerImage {
                    name: c.name,
                    image: c.image.unwrap_or_default(),
                })
                .collect(),
            generation: d.metadata.generation,
            observed_generation: d.status.observed_generation,
            // Unset replicas defaults to 1 on the API server
            desired_replicas: d.spec.replicas.unwrap_or(1),
            updated_replicas: d.status.updated_replicas,
            ready_replicas: d.status.ready_replicas,
            available_replicas: d.status.available_replicas,
            conditions: d
                .status
                .conditions
                .into_iter()
                .map(|c| WorkloadCondition {
                    condition_type: c.condition_type,
                    status: c.status,
                    reason: c.reason,
                    message: c.message,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct Job {
    #[serde(default)]
    status: JobStatusBody,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct JobStatusBody {
    active: i32,
    succeeded: i32,
    failed: i32,
    conditions: Vec<Condition>,
}

impl JobStatusBody {
    fn phase(&self) -> JobPhase {
        let condition = |t: &str| {
            self.conditions
                .iter()
                .find(|c| c.condition_type == t && c.status == "True")
        };

        if self.succeeded > 0 || condition("Complete").is_some() {
            JobPhase::Succeeded
        } else if let Some(c) = condition("Failed") {
            JobPhase::Failed(
                c.message
                    .clone()
                    .or_else(|| c.reason.clone())
                    .unwrap_or_else(|| "job failed".to_string()),
            )
        } else if self.failed > 0 {
            JobPhase::Failed("job failed".to_string())
        } else if self.active > 0 {
            JobPhase::Running
        } else {
            JobPhase::Pending
        }
    }
}

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Deserialize)]
struct Pod {
    metadata: ObjectMeta,
}

#[derive(Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    #[serde(default)]
    metadata: ObjectMeta,
    involved_object: InvolvedObject,
    reason: Option<String>,
    message: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    last_timestamp: Option<DateTime<Utc>>,
    event_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct InvolvedObject {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_status_parsing() {
        let body = json!({
            "metadata": { "name": "web", "generation": 4 },
            "spec": {
                "replicas": 3,
                "template": {
                    "spec": {
                        "containers": [
                            { "name": "app", "image": "registry/web:v2" },
                            { "name": "sidecar", "image": "envoy:1.30" }
                        ]
                    }
                }
            },
            "status": {
                "observedGeneration": 4,
                "updatedReplicas": 3,
                "readyReplicas": 2,
                "availableReplicas": 2,
                "conditions": [
                    { "type": "Progressing", "status": "True", "reason": "ReplicaSetUpdated" }
                ]
            }
        });

        let deployment: Deployment = serde_json::from_value(body).unwrap();
        let status = WorkloadStatus::from(deployment);

        assert_eq!(status.image_of(None), Some("registry/web:v2"));
        assert_eq!(status.image_of(Some("sidecar")), Some("envoy:1.30"));
        assert_eq!(status.desired_replicas, 3);
        assert_eq!(status.ready_replicas, 2);
        assert_eq!(
            status.condition("Progressing").and_then(|c| c.reason.as_deref()),
            Some("ReplicaSetUpdated")
        );
    }

    #[test]
    fn test_fresh_deployment_without_status() {
        let body = json!({
            "metadata": { "name": "web", "generation": 1 },
            "spec": { "template": { "spec": { "containers": [{ "name": "app", "image": "a:1" }] } } }
        });

        let status = WorkloadStatus::from(serde_json::from_value::<Deployment>(body).unwrap());
        assert_eq!(status.desired_replicas, 1);
        assert_eq!(status.observed_generation, 0);
        assert!(status.conditions.is_empty());
    }

    #[test]
    fn test_job_phase_from_conditions() {
        let failed: Job = serde_json::from_value(json!({
            "status": {
                "failed": 1,
                "conditions": [{ "type": "Failed", "status": "True", "reason": "BackoffLimitExceeded" }]
            }
        }))
        .unwrap();
        assert_eq!(
            failed.status.phase(),
            JobPhase::Failed("BackoffLimitExceeded".to_string())
        );

        let running: Job = serde_json::from_value(json!({ "status": { "active": 1 } })).unwrap();
        assert_eq!(running.status.phase(), JobPhase::Running);

        let pending: Job = serde_json::from_value(json!({})).unwrap();
        assert_eq!(pending.status.phase(), JobPhase::Pending);

        let done: Job = serde_json::from_value(json!({ "status": { "succeeded": 1 } })).unwrap();
        assert_eq!(done.status.phase(), JobPhase::Succeeded);
    }
}
