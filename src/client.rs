use anyhow::{Context, Result};
use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::command_tree::ParamLocation;
use crate::config::Config;
use crate::error::CliError;
use crate::openapi;
use crate::params::RequestParam;

/// Path, query string and body derived from a template and parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Substitutes path placeholders, builds a key-sorted query string from
/// non-empty query values and merges body values into one JSON object.
/// POST, PUT and PATCH without body values send `{}`.
pub fn prepare_request(
    method: &str,
    path_template: &str,
    params: &[RequestParam],
) -> Result<PreparedRequest, CliError> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::Usage(format!("unsupported method {method}")))?;

    let mut path = path_template.to_string();
    let mut query: Vec<(&str, &str)> = Vec::new();
    let mut body = Map::new();

    for param in params {
        match param.location {
            ParamLocation::Path => {
                let encoded = urlencoding::encode(param.value.raw());
                path = path.replace(&format!("{{{}}}", param.name), encoded.as_ref());
            }
            ParamLocation::Query => {
                if !param.value.is_empty() {
                    query.retain(|(name, _)| *name != param.name);
                    query.push((param.name.as_str(), param.value.raw()));
                }
            }
            ParamLocation::Body => {
                if !param.value.is_empty() {
                    body.insert(param.name.clone(), param.value.to_json());
                }
            }
        }
    }

    if let Some(missing) = openapi::placeholders(&path).first() {
        return Err(CliError::Usage(format!(
            "missing required path parameter: {missing}"
        )));
    }

    if !query.is_empty() {
        query.sort_by(|a, b| a.0.cmp(b.0));
        let encoded: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        path = format!("{}?{}", path, encoded.join("&"));
    }

    let body = if !body.is_empty() {
        Some(Value::Object(body))
    } else if method == Method::POST || method == Method::PUT || method == Method::PATCH {
        Some(Value::Object(Map::new()))
    } else {
        None
    };

    Ok(PreparedRequest { method, path, body })
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("dot-ai-cli/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: config.server_url.clone(),
            token: config.token.clone(),
            timeout: config.timeout,
        })
    }

    pub fn build_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return base.to_string();
        }
        format!("{}/{}", base, path)
    }

    /// Issues exactly one call and returns the raw response body.
    pub fn execute(
        &self,
        method: &str,
        path_template: &str,
        params: &[RequestParam],
    ) -> Result<Vec<u8>, CliError> {
        let prepared = prepare_request(method, path_template, params)?;
        let url = self.build_url(&prepared.path);

        let mut request = self.client.request(prepared.method.clone(), &url);
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| CliError::Usage("invalid bearer token".to_string()))?;
            request = request.header(AUTHORIZATION, value);
        }
        if let Some(body) = &prepared.body {
            request = request.json(body);
        }

        log::debug!("request {} {}", prepared.method, url);
        let response = request.send().map_err(|err| self.transport_error(err))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .map_err(|err| CliError::Transport(format!("failed to read response: {err}")))?;
        log::debug!("response {} ({} bytes)", status, bytes.len());

        if status.as_u16() >= 400 {
            return Err(classify_http_error(status.as_u16(), &bytes));
        }
        Ok(bytes.to_vec())
    }

    fn transport_error(&self, err: reqwest::Error) -> CliError {
        log::debug!("transport failure: {err}");
        match self.timeout {
            Some(timeout) if err.is_timeout() => CliError::Timeout {
                server_url: self.base_url.clone(),
                seconds: timeout.as_secs(),
            },
            _ => CliError::Connection {
                server_url: self.base_url.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<Value>,
    message: Option<String>,
}

fn server_detail(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    let error = parsed.error.and_then(|value| match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    });
    error
        .filter(|s| !s.is_empty())
        .or(parsed.message.filter(|s| !s.is_empty()))
}

pub fn classify_http_error(status: u16, body: &[u8]) -> CliError {
    let detail = server_detail(body);
    match status {
        401 => CliError::Auth,
        404 => CliError::NotFound { detail },
        _ => CliError::Server { status, detail },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use serde_json::json;
    use std::net::TcpListener;
    use std::thread;

    fn test_config(server_url: &str, token: Option<&str>) -> Config {
        Config {
            server_url: server_url.to_string(),
            token: token.map(str::to_string),
            output: OutputFormat::Json,
            timeout: Some(Duration::from_secs(5)),
        }
    }

    #[test]
    fn prepare_substitutes_path_and_query() {
        let params = vec![
            RequestParam::new("id", ParamLocation::Path, "42"),
            RequestParam::new("kind", ParamLocation::Query, "Pod"),
        ];
        let prepared = prepare_request("GET", "/api/v1/resources/{id}", &params).unwrap();
        assert_eq!(prepared.method, Method::GET);
        assert_eq!(prepared.path, "/api/v1/resources/42?kind=Pod");
        assert_eq!(prepared.body, None);
    }

    #[test]
    fn prepare_escapes_path_values() {
        let params = vec![RequestParam::new(
            "sourceIdentifier",
            ParamLocation::Path,
            "https://example.com/docs a",
        )];
        let prepared = prepare_request(
            "DELETE",
            "/api/v1/knowledge/source/{sourceIdentifier}",
            &params,
        )
        .unwrap();
        assert_eq!(
            prepared.path,
            "/api/v1/knowledge/source/https%3A%2F%2Fexample.com%2Fdocs%20a"
        );
        assert_eq!(prepared.body, None);
    }

    #[test]
    fn prepare_sorts_query_and_skips_empty_values() {
        let params = vec![
            RequestParam::new("namespace", ParamLocation::Query, "kube system"),
            RequestParam::new("apiVersion", ParamLocation::Query, "apps/v1"),
            RequestParam::new("kind", ParamLocation::Query, ""),
        ];
        let prepared = prepare_request("GET", "/api/v1/resources", &params).unwrap();
        assert_eq!(
            prepared.path,
            "/api/v1/resources?apiVersion=apps%2Fv1&namespace=kube%20system"
        );
    }

    #[test]
    fn prepare_embeds_json_and_text_body_values() {
        let params = vec![
            RequestParam::new("intent", ParamLocation::Body, "list all pods"),
            RequestParam::new("limit", ParamLocation::Body, "10"),
            RequestParam::new("answers", ParamLocation::Body, r#"{"replicas": 3}"#),
            RequestParam::new("skipped", ParamLocation::Body, ""),
        ];
        let prepared = prepare_request("POST", "/api/v1/tools/query", &params).unwrap();
        assert_eq!(
            prepared.body,
            Some(json!({
                "intent": "list all pods",
                "limit": 10,
                "answers": {"replicas": 3}
            }))
        );
    }

    #[test]
    fn prepare_sends_empty_object_for_body_methods() {
        for method in ["POST", "PUT", "PATCH"] {
            let prepared = prepare_request(method, "/api/v1/tools/version", &[]).unwrap();
            assert_eq!(prepared.body, Some(json!({})), "{method}");
        }
        for method in ["GET", "DELETE"] {
            let prepared = prepare_request(method, "/api/v1/namespaces", &[]).unwrap();
            assert_eq!(prepared.body, None, "{method}");
        }
    }

    #[test]
    fn prepare_rejects_unfilled_placeholders() {
        let err = prepare_request("GET", "/api/v1/visualize/{sessionId}", &[]).unwrap_err();
        assert!(err.to_string().contains("sessionId"));
        assert_eq!(err.exit_code(), crate::error::EXIT_USAGE_ERROR);
    }

    #[test]
    fn classify_maps_statuses() {
        assert!(matches!(classify_http_error(401, b""), CliError::Auth));

        let err = classify_http_error(404, br#"{"error": "session not found"}"#);
        assert_eq!(err.to_string(), "not found (404): session not found");

        let err = classify_http_error(500, br#"{"message": "database down"}"#);
        assert_eq!(err.to_string(), "server error (500): database down");

        let err = classify_http_error(503, b"<html>unavailable</html>");
        assert!(matches!(err, CliError::Server { status: 503, detail: None }));

        let err = classify_http_error(
            400,
            br#"{"success": false, "error": {"code": "INVALID", "message": "intent is required"}}"#,
        );
        assert_eq!(err.to_string(), "request failed (400): intent is required");
    }

    #[test]
    fn execute_sends_bearer_token_and_json_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/v1/tools/query")
            .match_header("authorization", "Bearer secret")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({"intent": "what pods run?"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true}"#)
            .create();

        let client = ApiClient::new(&test_config(&server.url(), Some("secret"))).unwrap();
        let params = vec![RequestParam::new(
            "intent",
            ParamLocation::Body,
            "what pods run?",
        )];
        let body = client.execute("POST", "/api/v1/tools/query", &params).unwrap();
        assert_eq!(body, br#"{"success":true}"#.to_vec());
        mock.assert();
    }

    #[test]
    fn execute_sends_query_without_auth_when_token_missing() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v1/resources/42")
            .match_query(mockito::Matcher::UrlEncoded("kind".into(), "Pod".into()))
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(200)
            .with_body("[]")
            .create();

        let client = ApiClient::new(&test_config(&server.url(), None)).unwrap();
        let params = vec![
            RequestParam::new("id", ParamLocation::Path, "42"),
            RequestParam::new("kind", ParamLocation::Query, "Pod"),
        ];
        client
            .execute("GET", "/api/v1/resources/{id}", &params)
            .unwrap();
        mock.assert();
    }

    #[test]
    fn execute_classifies_error_responses() {
        let mut server = mockito::Server::new();
        let _unauthorized = server
            .mock("GET", "/api/v1/namespaces")
            .with_status(401)
            .create();
        let _missing = server
            .mock("GET", "/api/v1/visualize/abc")
            .with_status(404)
            .with_body(r#"{"error":"session abc not found"}"#)
            .create();

        let client = ApiClient::new(&test_config(&server.url(), None)).unwrap();
        let err = client.execute("GET", "/api/v1/namespaces", &[]).unwrap_err();
        assert!(matches!(err, CliError::Auth));

        let params = vec![RequestParam::new("sessionId", ParamLocation::Path, "abc")];
        let err = client
            .execute("GET", "/api/v1/visualize/{sessionId}", &params)
            .unwrap_err();
        assert_eq!(err.to_string(), "not found (404): session abc not found");
    }

    #[test]
    fn execute_reports_connection_failures() {
        let client = ApiClient::new(&test_config("http://127.0.0.1:1", None)).unwrap();
        let err = client.execute("GET", "/api/v1/namespaces", &[]).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONN_ERROR);
        let message = err.to_string();
        assert!(message.contains("cannot connect"));
        assert!(message.contains("--server-url"));
        assert!(message.contains("DOT_AI_URL"));
    }

    #[test]
    fn execute_times_out_when_server_never_answers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let server_url = format!("http://{}", listener.local_addr().unwrap());
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                thread::sleep(Duration::from_secs(5));
                drop(stream);
            }
        });

        let mut config = test_config(&server_url, None);
        config.timeout = Some(Duration::from_secs(1));
        let client = ApiClient::new(&config).unwrap();
        let err = client.execute("GET", "/api/v1/namespaces", &[]).unwrap_err();

        assert!(
            matches!(&err, CliError::Timeout { seconds: 1, server_url: url } if *url == server_url),
            "{err:?}"
        );
        assert_eq!(err.exit_code(), crate::error::EXIT_CONN_ERROR);
        assert!(err.to_string().contains("--timeout"));
    }

    #[test]
    fn build_url_joins_base_and_path() {
        let client = ApiClient::new(&test_config("http://localhost:3456/", None)).unwrap();
        assert_eq!(
            client.build_url("/api/v1/namespaces"),
            "http://localhost:3456/api/v1/namespaces"
        );
    }
}
