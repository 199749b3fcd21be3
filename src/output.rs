use anyhow::Result;
use serde_json::Value;
use std::io::Write;
use std::str::FromStr;

use crate::error::CliError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            other => Err(CliError::Usage(format!(
                "unsupported output format: {other:?} (valid: json, yaml)"
            ))),
        }
    }
}

/// Renders a response body. JSON passes through untouched; YAML conversion
/// falls back to the raw text when the body is not JSON.
pub fn format_response(data: &[u8], format: OutputFormat) -> String {
    let text = String::from_utf8_lossy(data);
    match format {
        OutputFormat::Json => text.into_owned(),
        OutputFormat::Yaml => match serde_json::from_slice::<Value>(data) {
            Ok(value) => render_yaml(&value).unwrap_or_else(|| text.into_owned()),
            Err(_) => text.into_owned(),
        },
    }
}

/// Renders an in-process value, e.g. the command tree.
pub fn format_value(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Ok(render_yaml(value).unwrap_or_default()),
    }
}

fn render_yaml(value: &Value) -> Option<String> {
    serde_yaml::to_string(value)
        .ok()
        .map(|yaml| yaml.trim_end_matches('\n').to_string())
}

pub fn write_stdout_line(value: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if let Err(err) = out.write_all(value.as_bytes()) {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        return Err(err.into());
    }
    if let Err(err) = out.write_all(b"\n") {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        return Err(err.into());
    }
    Ok(())
}
