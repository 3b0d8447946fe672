//! Webhook Service
//!
//! Signature verification and payload normalization for source-control and
//! registry notifications.

use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use slipway_core::domain::webhook::{RegistryEvent, WebhookEvent, WebhookSource};
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const GITHUB_SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const GITEA_SIGNATURE_HEADER: &str = "X-Gitea-Signature";
pub const GITLAB_TOKEN_HEADER: &str = "X-Gitlab-Token";
pub const GENERIC_SIGNATURE_HEADER: &str = "X-Slipway-Signature";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature header {0}")]
    MissingSignature(&'static str),

    #[error("signature mismatch")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, WebhookError>;

/// Result of normalizing a delivery
#[derive(Debug)]
pub enum Normalized {
    Event(WebhookEvent),
    /// Valid delivery that never triggers builds (pings, branch deletions)
    Ignored(String),
}

// =============================================================================
// Signatures
// =============================================================================

/// Checks the delivery against the provider's shared secret.
///
/// Returns `Ok(false)` when no secret is configured for the source: the
/// delivery is accepted but recorded as unsigned.
pub fn verify_signature(
    source: WebhookSource,
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<bool> {
    let Some(secret) = secret else {
        return Ok(false);
    };

    let header_name = match source {
        WebhookSource::Github => GITHUB_SIGNATURE_HEADER,
        WebhookSource::Gitea => GITEA_SIGNATURE_HEADER,
        WebhookSource::Gitlab => GITLAB_TOKEN_HEADER,
        WebhookSource::Generic => GENERIC_SIGNATURE_HEADER,
    };
    let value = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature(header_name))?;

    match source {
        WebhookSource::Gitlab => {
            if constant_time_eq(value.as_bytes(), secret.as_bytes()) {
                Ok(true)
            } else {
                Err(WebhookError::InvalidSignature)
            }
        }
        _ => {
            let hex_digest = value.strip_prefix("sha256=").unwrap_or(value);
            verify_hmac(secret, body, hex_digest)?;
            Ok(true)
        }
    }
}

fn verify_hmac(secret: &str, body: &[u8], hex_digest: &str) -> Result<()> {
    let expected = hex::decode(hex_digest).map_err(|_| WebhookError::InvalidSignature)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Hex HMAC-SHA256 of `body`, in the form providers send it
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

// =============================================================================
// Source-control payloads
// =============================================================================

/// Builds a [`WebhookEvent`] from a provider delivery
pub fn normalize(
    source: WebhookSource,
    headers: &HeaderMap,
    body: &[u8],
    signature_valid: bool,
) -> Result<Normalized> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    let parsed = match source {
        WebhookSource::Github => parse_github_style(header(headers, "X-GitHub-Event"), &payload),
        WebhookSource::Gitea => parse_github_style(
            header(headers, "X-Gitea-Event").or_else(|| header(headers, "X-GitHub-Event")),
            &payload,
        ),
        WebhookSource::Gitlab => parse_gitlab(&payload),
        WebhookSource::Generic => parse_generic(&payload),
    }?;

    let parsed = match parsed {
        Parsed::Push(p) => p,
        Parsed::Ignored(reason) => return Ok(Normalized::Ignored(reason)),
    };

    Ok(Normalized::Event(WebhookEvent {
        id: Uuid::new_v4(),
        source,
        event_type: parsed.event_type,
        repository: parsed.repository,
        branch: parsed.branch,
        commit_sha: parsed.commit_sha,
        author: parsed.author,
        signature_valid,
        processed: false,
        build_ids: Vec::new(),
        error: None,
        received_at: Utc::now(),
    }))
}

struct PushInfo {
    event_type: String,
    repository: String,
    branch: String,
    commit_sha: String,
    author: Option<String>,
}

enum Parsed {
    Push(PushInfo),
    Ignored(String),
}

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn required(value: &Value, pointer: &str) -> Result<String> {
    str_at(value, pointer)
        .map(str::to_string)
        .ok_or_else(|| WebhookError::InvalidPayload(format!("missing {}", pointer)))
}

/// Splits `refs/heads/x` and `refs/tags/x` into event type and name
fn split_ref(git_ref: &str) -> (&'static str, &str) {
    if let Some(tag) = git_ref.strip_prefix("refs/tags/") {
        ("tag", tag)
    } else {
        ("push", git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref))
    }
}

/// GitHub and Gitea share the push and pull request payload shapes
fn parse_github_style(event: Option<&str>, payload: &Value) -> Result<Parsed> {
    let repository = str_at(payload, "/repository/html_url")
        .or_else(|| str_at(payload, "/repository/full_name"))
        .map(str::to_string)
        .ok_or_else(|| WebhookError::InvalidPayload("missing repository".to_string()))?;

    match event.unwrap_or("push") {
        "push" => {
            let git_ref = required(payload, "/ref")?;
            let commit_sha = required(payload, "/after")?;
            if commit_sha == ZERO_SHA {
                return Ok(Parsed::Ignored(format!("{} deleted", git_ref)));
            }
            let (event_type, name) = split_ref(&git_ref);
            Ok(Parsed::Push(PushInfo {
                event_type: event_type.to_string(),
                repository,
                branch: name.to_string(),
                commit_sha,
                author: str_at(payload, "/pusher/name")
                    .or_else(|| str_at(payload, "/pusher/login"))
                    .or_else(|| str_at(payload, "/head_commit/author/name"))
                    .map(str::to_string),
            }))
        }
        "pull_request" => Ok(Parsed::Push(PushInfo {
            event_type: "pull_request".to_string(),
            repository,
            branch: required(payload, "/pull_request/head/ref")?,
            commit_sha: required(payload, "/pull_request/head/sha")?,
            author: str_at(payload, "/pull_request/user/login").map(str::to_string),
        })),
        other => Ok(Parsed::Ignored(format!("unsupported event '{}'", other))),
    }
}

fn parse_gitlab(payload: &Value) -> Result<Parsed> {
    let repository = str_at(payload, "/project/web_url")
        .or_else(|| str_at(payload, "/project/path_with_namespace"))
        .map(str::to_string)
        .ok_or_else(|| WebhookError::InvalidPayload("missing project".to_string()))?;

    match str_at(payload, "/object_kind").unwrap_or("") {
        "push" | "tag_push" => {
            let git_ref = required(payload, "/ref")?;
            let Some(commit_sha) = str_at(payload, "/checkout_sha").map(str::to_string) else {
                return Ok(Parsed::Ignored(format!("{} deleted", git_ref)));
            };
            let (event_type, name) = split_ref(&git_ref);
            Ok(Parsed::Push(PushInfo {
                event_type: event_type.to_string(),
                repository,
                branch: name.to_string(),
                commit_sha,
                author: str_at(payload, "/user_username")
                    .or_else(|| str_at(payload, "/user_name"))
                    .map(str::to_string),
            }))
        }
        "merge_request" => Ok(Parsed::Push(PushInfo {
            event_type: "pull_request".to_string(),
            repository,
            branch: required(payload, "/object_attributes/source_branch")?,
            commit_sha: required(payload, "/object_attributes/last_commit/id")?,
            author: str_at(payload, "/user/username").map(str::to_string),
        })),
        other => Ok(Parsed::Ignored(format!("unsupported event '{}'", other))),
    }
}

#[derive(Deserialize)]
struct GenericPayload {
    #[serde(default = "default_event")]
    event: String,
    repository: String,
    branch: String,
    commit_sha: String,
    #[serde(default)]
    author: Option<String>,
}

fn default_event() -> String {
    "push".to_string()
}

fn parse_generic(payload: &Value) -> Result<Parsed> {
    let p: GenericPayload = serde_json::from_value(payload.clone())
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    Ok(Parsed::Push(PushInfo {
        event_type: p.event,
        repository: p.repository,
        branch: p.branch,
        commit_sha: p.commit_sha,
        author: p.author,
    }))
}

// =============================================================================
// Registry notifications
// =============================================================================

#[derive(Deserialize)]
struct RegistryEnvelope {
    #[serde(default)]
    events: Vec<RegistryNotification>,
}

#[derive(Deserialize)]
struct RegistryNotification {
    action: String,
    target: RegistryTarget,
}

#[derive(Deserialize)]
struct RegistryTarget {
    repository: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    digest: Option<String>,
}

/// Tagged pushes from a registry notification envelope; pulls, deletes
/// and untagged pushes are dropped
pub fn parse_registry(body: &[u8]) -> Result<Vec<RegistryEvent>> {
    let envelope: RegistryEnvelope =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    Ok(envelope
        .events
        .into_iter()
        .filter(|n| n.action == "push")
        .filter_map(|n| {
            let tag = n.target.tag.filter(|t| !t.is_empty())?;
            Some(RegistryEvent {
                id: Uuid::new_v4(),
                repository: n.target.repository,
                tag,
                digest: n.target.digest,
                processed: false,
                auto_deploy: false,
                rule_id: None,
                health_check_id: None,
                error: None,
                received_at: Utc::now(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};
    use serde_json::json;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_github_signature() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let good = format!("sha256={}", sign("s3cret", body));

        let ok = verify_signature(
            WebhookSource::Github,
            Some("s3cret"),
            &headers(&[(GITHUB_SIGNATURE_HEADER, &good)]),
            body,
        );
        assert!(ok.unwrap());

        let tampered = verify_signature(
            WebhookSource::Github,
            Some("s3cret"),
            &headers(&[(GITHUB_SIGNATURE_HEADER, &good)]),
            br#"{"ref":"refs/heads/evil"}"#,
        );
        assert!(matches!(tampered, Err(WebhookError::InvalidSignature)));

        let missing = verify_signature(WebhookSource::Github, Some("s3cret"), &HeaderMap::new(), body);
        assert!(matches!(missing, Err(WebhookError::MissingSignature(_))));
    }

    #[test]
    fn test_gitea_signature_is_bare_hex() {
        let body = b"{}";
        let sig = sign("k", body);
        assert!(
            verify_signature(
                WebhookSource::Gitea,
                Some("k"),
                &headers(&[(GITEA_SIGNATURE_HEADER, &sig)]),
                body
            )
            .unwrap()
        );
    }

    #[test]
    fn test_gitlab_token_compare() {
        let ok = verify_signature(
            WebhookSource::Gitlab,
            Some("token"),
            &headers(&[(GITLAB_TOKEN_HEADER, "token")]),
            b"{}",
        );
        assert!(ok.unwrap());

        let bad = verify_signature(
            WebhookSource::Gitlab,
            Some("token"),
            &headers(&[(GITLAB_TOKEN_HEADER, "tokeN")]),
            b"{}",
        );
        assert!(matches!(bad, Err(WebhookError::InvalidSignature)));
    }

    #[test]
    fn test_unconfigured_secret_accepts_unsigned() {
        assert!(!verify_signature(WebhookSource::Github, None, &HeaderMap::new(), b"{}").unwrap());
    }

    #[test]
    fn test_github_push_normalization() {
        let body = json!({
            "ref": "refs/heads/main",
            "after": "9f1c2b3a",
            "repository": { "full_name": "acme/api", "html_url": "https://github.com/acme/api" },
            "pusher": { "name": "dana" }
        })
        .to_string();

        let Normalized::Event(event) = normalize(
            WebhookSource::Github,
            &headers(&[("X-GitHub-Event", "push")]),
            body.as_bytes(),
            true,
        )
        .unwrap() else {
            panic!("expected event");
        };

        assert_eq!(event.event_type, "push");
        assert_eq!(event.branch, "main");
        assert_eq!(event.commit_sha, "9f1c2b3a");
        assert_eq!(event.repository, "https://github.com/acme/api");
        assert_eq!(event.author.as_deref(), Some("dana"));
        assert!(event.signature_valid);
    }

    #[test]
    fn test_tags_and_deletions() {
        let tag = json!({
            "ref": "refs/tags/v1.2.0",
            "after": "abc",
            "repository": { "full_name": "acme/api" }
        })
        .to_string();
        match normalize(WebhookSource::Gitea, &HeaderMap::new(), tag.as_bytes(), false).unwrap() {
            Normalized::Event(e) => {
                assert_eq!(e.event_type, "tag");
                assert_eq!(e.branch, "v1.2.0");
            }
            Normalized::Ignored(r) => panic!("ignored: {}", r),
        }

        let deleted = json!({
            "ref": "refs/heads/old",
            "after": ZERO_SHA,
            "repository": { "full_name": "acme/api" }
        })
        .to_string();
        assert!(matches!(
            normalize(WebhookSource::Github, &HeaderMap::new(), deleted.as_bytes(), false).unwrap(),
            Normalized::Ignored(_)
        ));

        let ping = json!({ "zen": "hi", "repository": { "full_name": "acme/api" } }).to_string();
        assert!(matches!(
            normalize(
                WebhookSource::Github,
                &headers(&[("X-GitHub-Event", "ping")]),
                ping.as_bytes(),
                false
            )
            .unwrap(),
            Normalized::Ignored(_)
        ));
    }

    #[test]
    fn test_gitlab_merge_request() {
        let body = json!({
            "object_kind": "merge_request",
            "project": { "web_url": "https://gitlab.com/acme/api" },
            "user": { "username": "lee" },
            "object_attributes": {
                "source_branch": "feature/x",
                "last_commit": { "id": "feedface" }
            }
        })
        .to_string();

        let Normalized::Event(event) =
            normalize(WebhookSource::Gitlab, &HeaderMap::new(), body.as_bytes(), true).unwrap()
        else {
            panic!("expected event");
        };
        assert_eq!(event.event_type, "pull_request");
        assert_eq!(event.branch, "feature/x");
        assert_eq!(event.commit_sha, "feedface");
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            normalize(WebhookSource::Github, &HeaderMap::new(), b"not json", false),
            Err(WebhookError::InvalidPayload(_))
        ));
        assert!(matches!(
            normalize(WebhookSource::Generic, &HeaderMap::new(), b"{\"branch\":\"main\"}", false),
            Err(WebhookError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_registry_envelope_keeps_tagged_pushes() {
        let body = json!({
            "events": [
                { "action": "push", "target": { "repository": "acme/api", "tag": "v2", "digest": "sha256:aa" } },
                { "action": "pull", "target": { "repository": "acme/api", "tag": "v2" } },
                { "action": "push", "target": { "repository": "acme/api", "digest": "sha256:bb" } }
            ]
        })
        .to_string();

        let events = parse_registry(body.as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tag, "v2");
        assert_eq!(events[0].digest.as_deref(), Some("sha256:aa"));
    }
}
