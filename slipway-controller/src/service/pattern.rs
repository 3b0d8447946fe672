//! Repository and glob matching shared by webhook triggers, stage
//! conditions and auto-deploy rules.

use regex::Regex;

/// Compiles a glob into an anchored regex. `*` matches any run of
/// characters (including `/`), `?` matches one character.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re)
}

/// Invalid patterns match nothing
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    glob_to_regex(pattern).is_ok_and(|re| re.is_match(value))
}

/// Empty lists and lists containing `*` match everything
pub fn matches_any(patterns: &[String], value: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| glob_matches(p, value))
}

/// Canonical form of a repository reference: lowercase, without scheme,
/// credentials, `.git` suffix or trailing slash. `git@host:owner/repo`
/// becomes `host/owner/repo`.
pub fn normalize_repository(repository: &str) -> String {
    let mut repo = repository.trim().to_ascii_lowercase();

    if let Some(idx) = repo.find("://") {
        repo = repo[idx + 3..].to_string();
    } else if let Some(rest) = repo.strip_prefix("git@") {
        repo = rest.replacen(':', "/", 1);
    }

    if let Some(idx) = repo.find('@') {
        if idx < repo.find('/').unwrap_or(repo.len()) {
            repo = repo[idx + 1..].to_string();
        }
    }

    let repo = repo.trim_end_matches('/');
    repo.strip_suffix(".git").unwrap_or(repo).to_string()
}

/// Exact match after normalization, or the incoming repository ends with
/// the configured one on whole path segments, so a pipeline configured for
/// `acme/api` accepts `github.com/acme/api`. A shorter incoming name never
/// matches a longer configured one.
pub fn repository_matches(configured: &str, incoming: &str) -> bool {
    let configured = normalize_repository(configured);
    let incoming = normalize_repository(incoming);
    if configured.is_empty() || incoming.is_empty() {
        return false;
    }

    configured == incoming || incoming.ends_with(&format!("/{}", configured))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_matching() {
        assert!(glob_matches("release/*", "release/1.4"));
        assert!(glob_matches("v?.*", "v1.2"));
        assert!(glob_matches("main", "main"));
        assert!(!glob_matches("main", "maintenance"));
        assert!(!glob_matches("release/*", "hotfix/1"));
        // Regex metacharacters are literal
        assert!(glob_matches("v1.0", "v1.0"));
        assert!(!glob_matches("v1.0", "v1x0"));
    }

    #[test]
    fn test_matches_any_wildcards() {
        assert!(matches_any(&[], "anything"));
        assert!(matches_any(&["*".to_string()], "anything"));
        let list = vec!["main".to_string(), "master".to_string()];
        assert!(matches_any(&list, "master"));
        assert!(!matches_any(&list, "develop"));
    }

    #[test]
    fn test_normalize_repository() {
        assert_eq!(
            normalize_repository("https://GitHub.com/Acme/API.git"),
            "github.com/acme/api"
        );
        assert_eq!(
            normalize_repository("git@github.com:acme/api.git"),
            "github.com/acme/api"
        );
        assert_eq!(
            normalize_repository("https://token@gitea.local/acme/api/"),
            "gitea.local/acme/api"
        );
    }

    #[test]
    fn test_repository_matching_is_segment_aware() {
        assert!(repository_matches("acme/api", "https://github.com/acme/api.git"));
        assert!(!repository_matches("github.com/acme/api", "acme/api"));
        assert!(!repository_matches("acme/api", "api"));
        assert!(!repository_matches("other/api", "api"));
        assert!(!repository_matches("acme/api", "github.com/acme/api-gateway"));
        assert!(!repository_matches("me/api", "github.com/acme/api"));
        assert!(!repository_matches("", "github.com/acme/api"));
    }
}
