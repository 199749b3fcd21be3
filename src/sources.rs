use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use std::path::{Path, PathBuf};

/// Points at an alternative OpenAPI document to compile instead of the
/// embedded one.
pub const SPEC_ENV: &str = "DOT_AI_SPEC";

static EMBEDDED_SPEC: &[u8] = include_bytes!("../schemas/openapi.json");

pub fn embedded_spec() -> &'static [u8] {
    EMBEDDED_SPEC
}

/// Returns the override document when one is configured, else the embedded
/// document.
pub fn load_spec(source: Option<&str>) -> Result<Vec<u8>> {
    match source.map(str::trim).filter(|s| !s.is_empty()) {
        Some(source) => {
            log::debug!("loading API document from {source}");
            read_source(source)
        }
        None => {
            log::debug!("using embedded API document");
            Ok(embedded_spec().to_vec())
        }
    }
}

pub fn read_source(value: &str) -> Result<Vec<u8>> {
    if value.starts_with("http://") || value.starts_with("https://") {
        return download_http(value);
    }

    let local = local_path(value);
    if !local.exists() {
        return Err(anyhow!("file not found: {value}"));
    }
    std::fs::read(&local).with_context(|| format!("read {}", local.display()))
}

fn download_http(url: &str) -> Result<Vec<u8>> {
    let client = Client::new();
    let resp = client
        .get(url)
        .send()
        .context("download url")?
        .error_for_status()
        .context("download url")?;
    let bytes = resp.bytes().context("read download")?;
    Ok(bytes.to_vec())
}

fn local_path(value: &str) -> PathBuf {
    if let Some(path) = value.strip_prefix('@') {
        return PathBuf::from(path);
    }
    if let Some(path) = value.strip_prefix("file://") {
        return PathBuf::from(path);
    }
    Path::new(value).to_path_buf()
}
