use crate::Result;
use crate::snapshot::{EngineConfig, RetryPolicy};
use camino::{Utf8Path, Utf8PathBuf};
use core::net::SocketAddr;
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use url::Url;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

const LOG_TARGET: &str = "    config";

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "reposnap.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Host name that repository URLs must use
    #[serde(default = "default_host")]
    pub host: String,

    /// Base of the provider's REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base of the provider's raw-content service
    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Address the HTTP service listens on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Maximum number of file fetches in flight for one snapshot
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per file, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_after", with = "humantime_serde")]
    pub default_retry_after: Duration,

    #[serde(default = "default_max_rate_limit_wait", with = "humantime_serde")]
    pub max_rate_limit_wait: Duration,

    #[serde(default = "default_base_backoff", with = "humantime_serde")]
    pub base_backoff: Duration,

    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Bound on a whole snapshot
    #[serde(default = "default_job_timeout", with = "humantime_serde")]
    pub job_timeout: Duration,

    /// Archive chunks buffered ahead of a slow reader
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,
}

fn default_host() -> String {
    "github.com".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_user_agent() -> String {
    "reposnap".to_string()
}

const fn default_listen() -> SocketAddr {
    SocketAddr::new(core::net::IpAddr::V4(core::net::Ipv4Addr::LOCALHOST), 8000)
}

const fn default_concurrency() -> usize {
    6
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_retry_after() -> Duration {
    Duration::from_secs(5)
}

const fn default_max_rate_limit_wait() -> Duration {
    Duration::from_secs(60)
}

const fn default_base_backoff() -> Duration {
    Duration::from_millis(500)
}

const fn default_max_backoff() -> Duration {
    Duration::from_secs(8)
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_job_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

const fn default_output_buffer() -> usize {
    8
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, `reposnap.toml` in `base_dir` is used if it exists.
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = base_dir.join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::debug!(target: LOG_TARGET, "No {CONFIG_FILE_NAME} in '{base_dir}', using the default configuration");
                    return Ok(Self::default());
                }
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(app_err!("host must not be empty"));
        }

        let _ = parse_base_url("api_base_url", &self.api_base_url)?;
        let _ = parse_base_url("raw_base_url", &self.raw_base_url)?;

        if self.concurrency == 0 {
            return Err(app_err!("concurrency must be at least 1"));
        }

        if self.max_attempts == 0 {
            return Err(app_err!("max_attempts must be at least 1"));
        }

        if self.output_buffer == 0 {
            return Err(app_err!("output_buffer must be at least 1"));
        }

        if self.base_backoff > self.max_backoff {
            return Err(app_err!(
                "base_backoff ({:?}) must not exceed max_backoff ({:?})",
                self.base_backoff,
                self.max_backoff
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(app_err!("request_timeout must be greater than zero"));
        }

        if self.job_timeout.is_zero() {
            return Err(app_err!("job_timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Engine settings derived from this configuration
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            host: self.host.trim().to_ascii_lowercase(),
            api_base_url: parse_base_url("api_base_url", &self.api_base_url)?,
            raw_base_url: parse_base_url("raw_base_url", &self.raw_base_url)?,
            concurrency: self.concurrency,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                default_retry_after: self.default_retry_after,
                max_rate_limit_wait: self.max_rate_limit_wait,
                base_backoff: self.base_backoff,
                max_backoff: self.max_backoff,
                request_timeout: self.request_timeout,
            },
            job_timeout: self.job_timeout,
            output_buffer: self.output_buffer,
        })
    }
}

fn parse_base_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value).into_app_err_with(|| format!("{field} '{value}' is not a valid URL"))?;

    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(app_err!("{field} '{value}' must be an http(s) URL"));
    }

    Ok(url)
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
