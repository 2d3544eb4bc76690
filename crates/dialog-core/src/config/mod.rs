//! Configuration for dialog-core
//!
//! [`DialogConfig`] carries the transaction timers, the authentication retry
//! budget and the default header values the dialog stamps on outgoing
//! requests. It deserializes from TOML; every field is optional there and
//! falls back to the values of [`DialogConfig::default`].
//!
//! ```rust
//! use std::time::Duration;
//! use sipline_dialog_core::config::DialogConfig;
//!
//! let config = DialogConfig::from_toml_str(r#"
//!     auth_attempts = 5
//!     user_agent = "sipline/0.1"
//!
//!     [timers]
//!     t1 = 250
//! "#).unwrap();
//!
//! assert_eq!(config.timers.t1, Duration::from_millis(250));
//! assert_eq!(config.timers.t2, Duration::from_secs(4));
//! assert_eq!(config.register_expires, 360);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{DialogError, DialogResult};

/// Methods advertised in the `Allow` header of a REGISTER
pub const DEFAULT_ALLOW: &str = "INVITE, ACK, CANCEL, OPTIONS, BYE, REFER, SUBSCRIBE, NOTIFY, INFO, PUBLISH";

/// Event packages advertised in the `Allow-Events` header of a REGISTER
pub const DEFAULT_ALLOW_EVENTS: &str = "talk,hold,conference,refer,check-sync";

/// RFC 3261 timer values used by client transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    /// Round-trip estimate and initial retransmission interval
    #[serde(with = "duration_ms")]
    pub t1: Duration,

    /// Retransmission interval cap for non-INVITE requests
    #[serde(with = "duration_ms")]
    pub t2: Duration,
}

impl TimerSettings {
    /// Transaction timeout (Timer B / Timer F)
    pub fn transaction_timeout(&self) -> Duration {
        self.t1 * 64
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
        }
    }
}

/// Dialog layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    pub timers: TimerSettings,

    /// Total attempts (the first send included) before a challenged request fails
    pub auth_attempts: u32,

    /// Default `Expires` value for REGISTER
    pub register_expires: u32,

    pub allow: String,

    pub allow_events: String,

    /// `User-Agent` header stamped on requests when set
    pub user_agent: Option<String>,

    pub max_forwards: u8,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            timers: TimerSettings::default(),
            auth_attempts: 3,
            register_expires: 360,
            allow: DEFAULT_ALLOW.to_string(),
            allow_events: DEFAULT_ALLOW_EVENTS.to_string(),
            user_agent: None,
            max_forwards: 70,
        }
    }
}

impl DialogConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> DialogResult<Self> {
        let config: DialogConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> DialogResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            DialogError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the transaction timers
    pub fn with_timers(mut self, t1: Duration, t2: Duration) -> Self {
        self.timers = TimerSettings { t1, t2 };
        self
    }

    /// Check that the timers are usable
    pub fn validate(&self) -> DialogResult<()> {
        if self.timers.t1.is_zero() {
            return Err(DialogError::configuration("timers.t1 must be greater than zero"));
        }
        if self.timers.t2 < self.timers.t1 {
            return Err(DialogError::configuration("timers.t2 must not be shorter than timers.t1"));
        }
        if self.max_forwards == 0 {
            return Err(DialogError::configuration("max_forwards must be greater than zero"));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = DialogConfig::from_toml_str("").unwrap();
        assert_eq!(config, DialogConfig::default());
        assert_eq!(config.timers.transaction_timeout(), Duration::from_secs(32));
        assert_eq!(config.max_forwards, 70);
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn test_partial_document() {
        let config = DialogConfig::from_toml_str(
            r#"
            register_expires = 600
            allow = "INVITE, ACK, BYE"

            [timers]
            t2 = 8000
            "#,
        )
        .unwrap();
        assert_eq!(config.register_expires, 600);
        assert_eq!(config.allow, "INVITE, ACK, BYE");
        assert_eq!(config.timers.t1, Duration::from_millis(500));
        assert_eq!(config.timers.t2, Duration::from_secs(8));
        assert_eq!(config.auth_attempts, 3);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            DialogConfig::from_toml_str("auth_attempts = \"many\""),
            Err(DialogError::Configuration { .. })
        ));
        assert!(matches!(
            DialogConfig::from_toml_str("[timers]\nt1 = 0"),
            Err(DialogError::Configuration { .. })
        ));
        assert!(matches!(
            DialogConfig::from_toml_str("[timers]\nt1 = 5000\nt2 = 4000"),
            Err(DialogError::Configuration { .. })
        ));
    }

    #[test]
    fn test_serialized_config_reloads() {
        let config = DialogConfig::default()
            .with_user_agent("sipline-test")
            .with_timers(Duration::from_millis(100), Duration::from_millis(400));
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("t1 = 100"));
        assert_eq!(DialogConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            DialogConfig::from_file("/nonexistent/sipline.toml"),
            Err(DialogError::Configuration { .. })
        ));
    }
}
