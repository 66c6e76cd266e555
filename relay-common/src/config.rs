use crate::error::{RelayError, Result};
use crate::types::DEFAULT_API_PORT;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Loads a relay configuration from a JSON file.
pub fn load_config(path: &str) -> Result<RelayConfig> {
    let data = fs::read_to_string(path)?;
    let config: RelayConfig = serde_json::from_str(&data)?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub default_port: u16,
    pub status: StatusConfig,
    pub fdm: FdmConfig,
    pub haproxy: HaproxyConfig,
    pub retry: RetryConfig,
    pub exec: ExecConfig,
    pub credential: CredentialConfig,
    pub exchange: ExchangeConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_API_PORT,
            status: StatusConfig::default(),
            fdm: FdmConfig::default(),
            haproxy: HaproxyConfig::default(),
            retry: RetryConfig::default(),
            exec: ExecConfig::default(),
            credential: CredentialConfig::default(),
            exchange: ExchangeConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry.master_attempts == 0 {
            return Err(RelayError::Config(
                "retry.master_attempts must be at least 1".into(),
            ));
        }
        if self.retry.attempt_timeout_ms == 0 {
            return Err(RelayError::Config(
                "retry.attempt_timeout_ms must be positive".into(),
            ));
        }
        for (name, template) in [
            ("status.url_template", &self.status.url_template),
            ("fdm.url_template", &self.fdm.url_template),
            ("haproxy.url_template", &self.haproxy.url_template),
        ] {
            if !template.contains("{app}") {
                return Err(RelayError::Config(format!(
                    "{} must contain an {{app}} placeholder",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Characters that would change the meaning of a URL when taken from an
/// app name.
const APP_NAME_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b']')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Expands `{app}` in a URL template, percent-encoding the name.
pub fn expand_template(template: &str, app: &str) -> String {
    let encoded = utf8_percent_encode(app, APP_NAME_ESCAPE).to_string();
    template.replace("{app}", &encoded)
}

/// The application's own public status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub url_template: String,
    pub timeout_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            url_template: "https://{app}.app.runonflux.io/status".into(),
            timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FdmConfig {
    pub url_template: String,
    pub timeout_ms: u64,
}

impl Default for FdmConfig {
    fn default() -> Self {
        Self {
            url_template: "https://fdm.runonflux.io/appips/{app}".into(),
            timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HaproxyConfig {
    pub url_template: String,
    pub timeout_ms: u64,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            url_template: "https://fdm.runonflux.io/haproxy?stats;csv;backend={app}".into(),
            timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts on the presumed master (position 0).
    pub master_attempts: u32,
    /// Attempts on every other node.
    pub other_attempts: u32,
    pub delay_ms: u64,
    /// When set, delays grow by this factor per retry up to `max_delay_ms`.
    pub backoff_multiplier: Option<f64>,
    pub max_delay_ms: u64,
    pub attempt_timeout_ms: u64,
    /// Per-attempt timeout for command execution and uploads.
    pub long_attempt_timeout_ms: u64,
    pub deadline_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            master_attempts: 3,
            other_attempts: 1,
            delay_ms: 2_000,
            backoff_multiplier: None,
            max_delay_ms: 30_000,
            attempt_timeout_ms: 10_000,
            long_attempt_timeout_ms: 120_000,
            deadline_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub settle_ms: u64,
    pub idle_ms: u64,
    pub deadline_ms: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            settle_ms: 500,
            idle_ms: 3_000,
            deadline_ms: 60_000,
        }
    }
}

impl ExecConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub max_age_minutes: i64,
    pub cache_ttl_secs: u64,
    /// Forward credentials that fail to parse unchanged instead of
    /// rejecting them.
    pub pass_through_unparsed: bool,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            max_age_minutes: crate::credential::MAX_CREDENTIAL_AGE_MINUTES,
            cache_ttl_secs: 600,
            pass_through_unparsed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub max_entries: usize,
    pub max_age_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            max_age_secs: 300,
        }
    }
}
