//! Controller configuration
//!
//! Defines all configurable parameters for the controller including the
//! queue limits, loop intervals, rollout supervision budget, and the
//! addresses of the cluster API and image registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use slipway_core::domain::webhook::WebhookSource;

/// Controller configuration
///
/// All intervals are configurable so tests can run the loops in
/// milliseconds while production uses the multi-second defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address
    pub bind_addr: String,

    /// PostgreSQL URL; pipelines and history stay in memory when unset
    pub database_url: Option<String>,

    /// Maximum number of builds in `running` state
    pub max_concurrent_builds: usize,

    /// Maximum number of builds in `queued` state
    pub max_queue_size: usize,

    /// Queue dispatch tick
    pub dispatch_interval: Duration,

    /// How long finished jobs stay in the queue listing
    pub job_retention: Duration,

    /// Retention sweep tick
    pub sweep_interval: Duration,

    /// Number of executions kept in history
    pub execution_history_limit: usize,

    /// Number of past successful runs averaged for completion estimates
    pub estimate_window: usize,

    /// Rollout health polling tick
    pub health_poll_interval: Duration,

    /// Polls before a rollout is declared timed out
    pub health_max_attempts: u32,

    /// How long finished health checks stay queryable
    pub health_grace_period: Duration,

    /// Duration of a test stage that has no command configured
    pub simulated_test_duration: Duration,

    /// Kubernetes API base URL
    pub kube_api_url: String,

    /// Service account token file
    pub kube_token_path: PathBuf,

    /// Skip TLS verification against the cluster API
    pub kube_insecure_tls: bool,

    /// Namespace watched by the cluster event stream
    pub watch_namespace: String,

    /// Image used for build jobs
    pub builder_image: String,

    /// Namespace build and test jobs run in
    pub builder_namespace: String,

    /// Build job status polling tick
    pub build_poll_interval: Duration,

    /// Delete the remote job when a build stage times out
    pub build_cleanup_on_timeout: bool,

    /// Registry API base URL
    pub registry_url: String,

    /// Host prefix prepended to registry repositories to form pullable images
    pub registry_image_prefix: Option<String>,

    /// Auto-deploy rules file
    pub rules_path: PathBuf,

    /// Shared secrets per webhook provider
    pub webhook_secrets: HashMap<WebhookSource, String>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - SLIPWAY_BIND_ADDR (default: 0.0.0.0:8080)
    /// - DATABASE_URL
    /// - MAX_CONCURRENT_BUILDS (default: 2)
    /// - MAX_QUEUE_SIZE (default: 100)
    /// - DISPATCH_INTERVAL_SECS (default: 5)
    /// - JOB_RETENTION_SECS (default: 86400)
    /// - SWEEP_INTERVAL_SECS (default: 300)
    /// - EXECUTION_HISTORY_LIMIT (default: 500)
    /// - HEALTH_POLL_INTERVAL_SECS (default: 5)
    /// - HEALTH_MAX_ATTEMPTS (default: 60)
    /// - HEALTH_GRACE_SECS (default: 300)
    /// - KUBE_API_URL, KUBE_TOKEN_PATH, KUBE_INSECURE_TLS, WATCH_NAMESPACE
    /// - BUILDER_IMAGE, BUILDER_NAMESPACE, BUILD_POLL_INTERVAL_SECS, BUILD_CLEANUP_ON_TIMEOUT
    /// - REGISTRY_URL, REGISTRY_IMAGE_PREFIX
    /// - RULES_PATH
    /// - WEBHOOK_SECRET_GITHUB, WEBHOOK_SECRET_GITEA, WEBHOOK_SECRET_GITLAB, WEBHOOK_SECRET_GENERIC
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let mut webhook_secrets = HashMap::new();
        for (source, var) in [
            (WebhookSource::Github, "WEBHOOK_SECRET_GITHUB"),
            (WebhookSource::Gitea, "WEBHOOK_SECRET_GITEA"),
            (WebhookSource::Gitlab, "WEBHOOK_SECRET_GITLAB"),
            (WebhookSource::Generic, "WEBHOOK_SECRET_GENERIC"),
        ] {
            if let Some(secret) = env_string(var).filter(|s| !s.is_empty()) {
                webhook_secrets.insert(source, secret);
            }
        }

        Ok(Self {
            bind_addr: env_string("SLIPWAY_BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: env_string("DATABASE_URL").filter(|s| !s.is_empty()),
            max_concurrent_builds: env_parse("MAX_CONCURRENT_BUILDS")?
                .unwrap_or(defaults.max_concurrent_builds),
            max_queue_size: env_parse("MAX_QUEUE_SIZE")?.unwrap_or(defaults.max_queue_size),
            dispatch_interval: env_secs("DISPATCH_INTERVAL_SECS")?
                .unwrap_or(defaults.dispatch_interval),
            job_retention: env_secs("JOB_RETENTION_SECS")?.unwrap_or(defaults.job_retention),
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS")?.unwrap_or(defaults.sweep_interval),
            execution_history_limit: env_parse("EXECUTION_HISTORY_LIMIT")?
                .unwrap_or(defaults.execution_history_limit),
            estimate_window: defaults.estimate_window,
            health_poll_interval: env_secs("HEALTH_POLL_INTERVAL_SECS")?
                .unwrap_or(defaults.health_poll_interval),
            health_max_attempts: env_parse("HEALTH_MAX_ATTEMPTS")?
                .unwrap_or(defaults.health_max_attempts),
            health_grace_period: env_secs("HEALTH_GRACE_SECS")?
                .unwrap_or(defaults.health_grace_period),
            simulated_test_duration: defaults.simulated_test_duration,
            kube_api_url: env_string("KUBE_API_URL").unwrap_or(defaults.kube_api_url),
            kube_token_path: env_string("KUBE_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.kube_token_path),
            kube_insecure_tls: env_parse("KUBE_INSECURE_TLS")?
                .unwrap_or(defaults.kube_insecure_tls),
            watch_namespace: env_string("WATCH_NAMESPACE").unwrap_or(defaults.watch_namespace),
            builder_image: env_string("BUILDER_IMAGE").unwrap_or(defaults.builder_image),
            builder_namespace: env_string("BUILDER_NAMESPACE")
                .unwrap_or(defaults.builder_namespace),
            build_poll_interval: env_secs("BUILD_POLL_INTERVAL_SECS")?
                .unwrap_or(defaults.build_poll_interval),
            build_cleanup_on_timeout: env_parse("BUILD_CLEANUP_ON_TIMEOUT")?
                .unwrap_or(defaults.build_cleanup_on_timeout),
            registry_url: env_string("REGISTRY_URL").unwrap_or(defaults.registry_url),
            registry_image_prefix: env_string("REGISTRY_IMAGE_PREFIX").filter(|s| !s.is_empty()),
            rules_path: env_string("RULES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.rules_path),
            webhook_secrets,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_builds == 0 {
            anyhow::bail!("max_concurrent_builds must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("max_queue_size must be greater than 0");
        }

        // tokio's interval panics on a zero period
        for (name, interval) in [
            ("dispatch_interval", self.dispatch_interval),
            ("sweep_interval", self.sweep_interval),
            ("health_poll_interval", self.health_poll_interval),
            ("build_poll_interval", self.build_poll_interval),
        ] {
            if interval.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if self.health_max_attempts == 0 {
            anyhow::bail!("health_max_attempts must be greater than 0");
        }

        if self.execution_history_limit == 0 {
            anyhow::bail!("execution_history_limit must be greater than 0");
        }

        for (name, url) in [
            ("kube_api_url", &self.kube_api_url),
            ("registry_url", &self.registry_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        Ok(())
    }

    pub fn webhook_secret(&self, source: WebhookSource) -> Option<&str> {
        self.webhook_secrets.get(&source).map(String::as_str)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            max_concurrent_builds: 2,
            max_queue_size: 100,
            dispatch_interval: Duration::from_secs(5),
            job_retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(300),
            execution_history_limit: 500,
            estimate_window: 10,
            health_poll_interval: Duration::from_secs(5),
            health_max_attempts: 60,
            health_grace_period: Duration::from_secs(300),
            simulated_test_duration: Duration::from_secs(2),
            kube_api_url: "https://kubernetes.default.svc".to_string(),
            kube_token_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token"),
            kube_insecure_tls: false,
            watch_namespace: "default".to_string(),
            builder_image: "gcr.io/kaniko-project/executor:latest".to_string(),
            builder_namespace: "slipway-builds".to_string(),
            build_poll_interval: Duration::from_secs(5),
            build_cleanup_on_timeout: true,
            registry_url: "http://registry.registry.svc:5000".to_string(),
            registry_image_prefix: None,
            rules_path: PathBuf::from("auto-deploy-rules.json"),
            webhook_secrets: HashMap::new(),
        }
    }
}

fn env_string(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn env_parse<T>(var: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", var, e)),
        Err(_) => Ok(None),
    }
}

fn env_secs(var: &str) -> anyhow::Result<Option<Duration>> {
    Ok(env_parse::<u64>(var)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dispatch_interval, Duration::from_secs(5));
        assert_eq!(config.health_max_attempts, 60);
        assert_eq!(config.estimate_window, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.max_concurrent_builds = 0;
        assert!(config.validate().is_err());
        config.max_concurrent_builds = 1;

        config.registry_url = "registry:5000".to_string();
        assert!(config.validate().is_err());
        config.registry_url = "http://registry:5000".to_string();

        config.health_max_attempts = 0;
        assert!(config.validate().is_err());
        config.health_max_attempts = 3;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let zeroed: [fn(&mut Config); 4] = [
            |c| c.dispatch_interval = Duration::ZERO,
            |c| c.sweep_interval = Duration::ZERO,
            |c| c.health_poll_interval = Duration::ZERO,
            |c| c.build_poll_interval = Duration::ZERO,
        ];
        for zero in zeroed {
            let mut config = Config::default();
            zero(&mut config);
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("interval must be greater than 0"));
        }
    }
}
