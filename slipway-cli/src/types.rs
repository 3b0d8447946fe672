//! Common types used across CLI modules

use clap::ValueEnum;
use slipway_core::domain::job::JobPriority;
use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone, PartialEq)]
pub enum IdOrPrefix {
    Full(Uuid),
    Prefix(String),
}

impl IdOrPrefix {
    /// Attempts a full UUID first, otherwise treats the input as a prefix
    pub fn parse(input: &str) -> Self {
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.to_lowercase()),
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    pub fn matches(&self, id: Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => *uuid == id,
            IdOrPrefix::Prefix(prefix) => id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

/// Job priority as accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
    Critical,
}

impl From<PriorityArg> for JobPriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => JobPriority::Low,
            PriorityArg::Normal => JobPriority::Normal,
            PriorityArg::High => JobPriority::High,
            PriorityArg::Critical => JobPriority::Critical,
        }
    }
}

/// Parse a single key=value pair
pub fn parse_key_val(s: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_uuid() {
        let id = Uuid::new_v4();
        let parsed = IdOrPrefix::parse(&id.to_string());
        assert_eq!(parsed, IdOrPrefix::Full(id));
        assert!(parsed.matches(id));
        assert!(!parsed.matches(Uuid::new_v4()));
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let id = Uuid::parse_str("0f3c9a4e-1b2d-4c5e-8f90-123456789abc").unwrap();
        let parsed = IdOrPrefix::parse("0F3C");
        assert_eq!(parsed.as_uuid(), None);
        assert!(parsed.matches(id));
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("IMAGE_TAG=v1=rc").unwrap(),
            ("IMAGE_TAG".to_string(), "v1=rc".to_string())
        );
        assert!(parse_key_val("no-equals").is_err());
    }
}
