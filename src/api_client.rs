use reqwest::blocking::Client;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

pub const ADMIN_AUTH_PATH: &str = "/api/admins/auth-with-password";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid base url: {0}")]
    BadUrl(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{path} failed with HTTP {status}: {message}")]
    Status {
        status: u16,
        path: String,
        message: String,
        body: Option<Value>,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Blocking JSON client for the hosted store. Every call goes through
/// `request`, which injects the admin token once one is held.
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ApiError::BadUrl(base_url.to_string()));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base.to_string(),
            token: None,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        self.request_query(method, path, &[], body)
    }

    pub fn request_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method.clone(), &url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = &self.token {
            req = req.header(reqwest::header::AUTHORIZATION, token);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        tracing::trace!(%method, path, "api request");
        let resp = req.send()?;
        let status = resp.status().as_u16();
        let text = resp.text()?;
        if !(200..300).contains(&status) {
            return Err(decode_error(status, path, &text));
        }

        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }

    pub fn authenticate_admin(&mut self, email: &str, password: &str) -> Result<(), ApiError> {
        let body = json!({ "identity": email, "password": password });
        let resp: Value = match self.request(Method::POST, ADMIN_AUTH_PATH, Some(&body)) {
            Ok(v) => v,
            Err(ApiError::Status { status, message, .. }) if status == 400 || status == 401 => {
                return Err(ApiError::Auth(message));
            }
            Err(e) => return Err(e),
        };
        let token = resp
            .get("token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Auth("response carried no token".into()))?;
        self.token = Some(token.to_string());
        tracing::info!(base_url = %self.base_url, "authenticated as admin");
        Ok(())
    }
}

/// Maps a non-2xx response to an `ApiError`, reading the `{code, message,
/// data}` body the hosted store sends when there is one.
pub fn decode_error(status: u16, path: &str, text: &str) -> ApiError {
    let body: Option<Value> = serde_json::from_str(text).ok();
    let message = body
        .as_ref()
        .and_then(|b| b.get("message"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            let t = text.trim();
            if t.is_empty() {
                format!("HTTP {status}")
            } else {
                t.chars().take(200).collect()
            }
        });
    if status == 404 {
        return ApiError::NotFound(format!("{path}: {message}"));
    }
    ApiError::Status {
        status,
        path: path.to_string(),
        message,
        body,
    }
}

/// Quotes a value for a filter expression such as `name="..."`.
pub fn filter_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
