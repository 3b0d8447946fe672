//! Auto-Deploy Rule Repository
//!
//! Rules live in memory and, when a path is configured, are written back to
//! a JSON file after every change.

use slipway_core::domain::rollout::AutoDeployRule;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::RepoResult;

#[derive(Default)]
pub struct RuleRepository {
    rules: RwLock<Vec<AutoDeployRule>>,
    path: Option<PathBuf>,
}

impl RuleRepository {
    /// Rules that are never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads rules from `path`; a missing file starts an empty set
    pub async fn load(path: PathBuf) -> RepoResult<Self> {
        let rules = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<AutoDeployRule>>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No rules file at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Loaded {} auto-deploy rules from {}", rules.len(), path.display());

        Ok(Self {
            rules: RwLock::new(rules),
            path: Some(path),
        })
    }

    pub async fn list(&self) -> Vec<AutoDeployRule> {
        self.rules.read().await.clone()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<AutoDeployRule> {
        self.rules.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn create(&self, rule: AutoDeployRule) -> RepoResult<AutoDeployRule> {
        let mut rules = self.rules.write().await;
        rules.push(rule.clone());
        self.persist(&rules).await?;
        Ok(rule)
    }

    /// Returns false when the rule does not exist
    pub async fn update(&self, rule: AutoDeployRule) -> RepoResult<bool> {
        let mut rules = self.rules.write().await;
        let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) else {
            return Ok(false);
        };
        *existing = rule;
        self.persist(&rules).await?;
        Ok(true)
    }

    /// Returns false when the rule does not exist
    pub async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() == before {
            return Ok(false);
        }
        self.persist(&rules).await?;
        Ok(true)
    }

    // Called with the write lock held so file order matches memory order
    async fn persist(&self, rules: &[AutoDeployRule]) -> RepoResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(rules)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
