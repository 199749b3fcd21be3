use thiserror::Error;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_TOOL_ERROR: i32 = 1;
pub const EXIT_CONN_ERROR: i32 = 2;
pub const EXIT_USAGE_ERROR: i32 = 3;

/// Failures surfaced to the user. Each variant carries its own exit
/// classification; callers above the transport boundary only print the
/// message and exit with [`CliError::exit_code`].
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to parse OpenAPI spec: {0}")]
    SpecParse(serde_json::Error),

    #[error("invalid value {value:?} for --{flag}: must be one of: {}", .allowed.join(", "))]
    Validation {
        flag: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("{0}")]
    Usage(String),

    #[error(
        "cannot connect to server at {server_url}.\nSet the server URL with --server-url or DOT_AI_URL."
    )]
    Connection { server_url: String },

    #[error(
        "request to {server_url} timed out after {seconds}s.\nRaise the deadline with --timeout or DOT_AI_TIMEOUT (0 disables it)."
    )]
    Timeout { server_url: String, seconds: u64 },

    #[error("authentication failed (401). Check your --token or DOT_AI_AUTH_TOKEN.")]
    Auth,

    #[error("{}", not_found_message(.detail))]
    NotFound { detail: Option<String> },

    #[error("{}", server_message(.status, .detail))]
    Server { status: u16, detail: Option<String> },

    #[error("{0}")]
    Transport(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::SpecParse(_) | CliError::Validation { .. } | CliError::Usage(_) => {
                EXIT_USAGE_ERROR
            }
            CliError::Connection { .. } | CliError::Timeout { .. } => EXIT_CONN_ERROR,
            CliError::Auth
            | CliError::NotFound { .. }
            | CliError::Server { .. }
            | CliError::Transport(_) => EXIT_TOOL_ERROR,
        }
    }
}

fn not_found_message(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!("not found (404): {detail}"),
        None => "resource not found (404).".to_string(),
    }
}

fn server_message(status: &u16, detail: &Option<String>) -> String {
    let status = *status;
    match (status >= 500, detail) {
        (true, Some(detail)) => format!("server error ({status}): {detail}"),
        (true, None) => {
            format!("server error ({status}). The server encountered an internal error.")
        }
        (false, Some(detail)) => format!("request failed ({status}): {detail}"),
        (false, None) => format!("request failed ({status})."),
    }
}
