//! CLI configuration

#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the controller service
    pub controller_url: String,
}
