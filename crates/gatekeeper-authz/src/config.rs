//! Configuration for the decision core.

use std::fmt;
use std::time::Duration;

/// Configuration for rule set compilation and evaluation.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Rule every routed module must define; it carries `{allow, results}`.
    pub decision_rule: String,
    /// Whether builtin errors abort evaluation instead of yielding undefined.
    pub strict_mode: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            decision_rule: "decision".to_string(),
            strict_mode: false,
        }
    }
}

impl EvaluatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable strict mode.
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }
}

/// Retry policy for one background refresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Attempts per run.
    pub max_attempts: u32,
    /// Backoff unit; the wait before retry `n` is `n * backoff_step`.
    pub backoff_step: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_step: Duration::from_secs(3),
        }
    }
}

impl RefreshPolicy {
    /// Wait applied after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/// Where and how to reach the directory and session services.
#[derive(Clone)]
pub struct DirectorySettings {
    /// Base URL of the directory service.
    pub directory_url: String,
    /// Base URL of the session service.
    pub session_url: String,
    /// Service account name used for server login.
    pub server_name: String,
    /// Service account secret used for server login.
    pub server_secret: String,
    /// Optional HTTP client timeout.
    pub timeout: Option<Duration>,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            directory_url: "http://localhost:9507".to_string(),
            session_url: "http://localhost:9107".to_string(),
            server_name: "gatekeeper".to_string(),
            server_secret: String::new(),
            timeout: None,
        }
    }
}

impl fmt::Debug for DirectorySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySettings")
            .field("directory_url", &self.directory_url)
            .field("session_url", &self.session_url)
            .field("server_name", &self.server_name)
            .field("server_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.decision_rule, "decision");
        assert!(!config.strict_mode);
    }

    #[test]
    fn test_strict_mode_builder() {
        assert!(EvaluatorConfig::new().with_strict_mode(true).strict_mode);
    }

    #[test]
    fn test_refresh_backoff_grows_linearly() {
        let policy = RefreshPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_after(1), Duration::from_secs(3));
        assert_eq!(policy.delay_after(3), Duration::from_secs(9));
    }

    #[test]
    fn test_directory_settings_redacts_secret() {
        let settings = DirectorySettings {
            server_secret: "hunter2".to_string(),
            ..DirectorySettings::default()
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("localhost:9507"));
    }
}
