use std::env;
use std::time::Duration;

use crate::error::CliError;
use crate::output::OutputFormat;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3456";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub const ENV_SERVER_URL: &str = "DOT_AI_URL";
pub const ENV_TOKEN: &str = "DOT_AI_AUTH_TOKEN";
pub const ENV_OUTPUT: &str = "DOT_AI_OUTPUT_FORMAT";
pub const ENV_TIMEOUT: &str = "DOT_AI_TIMEOUT";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_url: String,
    pub token: Option<String>,
    pub output: OutputFormat,
    /// `None` disables the request deadline.
    pub timeout: Option<Duration>,
}

/// Values given on the command line, before env and default fallback.
#[derive(Debug, Clone, Default)]
pub struct ConfigFlags {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub output: Option<String>,
    pub timeout: Option<u64>,
}

impl ConfigFlags {
    pub fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            server_url: matches.get_one::<String>("server_url").cloned(),
            token: matches.get_one::<String>("token").cloned(),
            output: matches.get_one::<String>("output").cloned(),
            timeout: matches.get_one::<u64>("timeout").copied(),
        }
    }
}

impl Config {
    pub fn load(matches: &clap::ArgMatches) -> Result<Self, CliError> {
        Self::resolve(ConfigFlags::from_matches(matches), |key| env::var(key).ok())
    }

    /// Applies flag > environment > default precedence. Empty values count
    /// as unset.
    pub fn resolve(
        flags: ConfigFlags,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CliError> {
        let env_value = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let pick = |flag: Option<String>, key: &str| flag.filter(|v| !v.is_empty()).or_else(|| env_value(key));

        let server_url =
            pick(flags.server_url, ENV_SERVER_URL).unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let token = pick(flags.token, ENV_TOKEN);
        let output = match pick(flags.output, ENV_OUTPUT) {
            Some(raw) => raw.parse::<OutputFormat>()?,
            None => OutputFormat::default(),
        };

        let timeout_secs = match flags.timeout {
            Some(seconds) => seconds,
            None => match env_value(ENV_TIMEOUT) {
                Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                    CliError::Usage(format!(
                        "invalid {ENV_TIMEOUT} value {raw:?}: expected whole seconds"
                    ))
                })?,
                None => DEFAULT_TIMEOUT_SECS,
            },
        };
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        Ok(Self {
            server_url,
            token,
            output,
            timeout,
        })
    }
}
