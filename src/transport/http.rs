use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::thread;
use std::time::Duration;

use super::JsonApi;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::list_type::ResourceKind;
use crate::retry::{retry_with_backoff, RetryAction, RetryConfig};

/// Blocking JSON client with a politeness wait before every request and
/// retry of transient failures.
pub struct HttpClient {
    client: Client,
    wait: Duration,
    retry: RetryConfig,
    bearer: Option<String>,
}

/// Map a non-success HTTP status to the error the caller should see.
///
/// Returns `None` for success statuses.
pub fn classify_status(status: u16, url: &str, body: &str) -> Option<SyncError> {
    let message = if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.trim())
    };
    match status {
        200..=299 => None,
        401 => Some(SyncError::AuthExpired(format!("{url}: {message}"))),
        400 | 403 => Some(SyncError::Permission {
            url: url.to_string(),
            message,
        }),
        _ => Some(SyncError::transient(url, message)),
    }
}

impl HttpClient {
    pub fn new(config: &SyncConfig, user_agent: Option<&str>) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(ua) = user_agent {
            let value = HeaderValue::from_str(ua)
                .map_err(|e| SyncError::Precondition(format!("invalid user agent '{ua}': {e}")))?;
            headers.insert(USER_AGENT, value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SyncError::Precondition(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            wait: Duration::from_secs_f64(config.request_wait_secs.max(0.0)),
            retry: RetryConfig::with_attempts(
                config.retry_attempts,
                config.retry_base_delay_secs,
                config.retry_max_delay_secs,
            ),
            bearer: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request from now on
    pub fn set_bearer(&mut self, token: impl Into<String>) {
        self.bearer = Some(token.into());
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn decode(url: &str, response: Response) -> SyncResult<Value> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| SyncError::transient(url, format!("failed to read body: {e}")))?;
        if let Some(err) = classify_status(status, url, &body) {
            return Err(err);
        }
        // a 200 with an HTML maintenance or captcha page will not get better on retry
        serde_json::from_str(&body).map_err(|e| {
            SyncError::parse(ResourceKind::ApiResponse, None, format!("{url}: response was not JSON: {e}"))
        })
    }

    fn get_once(&self, url: &str) -> SyncResult<Value> {
        if !self.wait.is_zero() {
            thread::sleep(self.wait);
        }
        log::debug!("Requesting {}", url);
        let response = self
            .authorized(self.client.get(url))
            .send()
            .map_err(|e| SyncError::transient(url, e))?;
        Self::decode(url, response)
    }

    /// POST a form and decode the JSON reply, optionally with basic auth
    pub fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        basic_auth: Option<(&str, &str)>,
    ) -> SyncResult<Value> {
        retry_with_backoff(&self.retry, classify_retry, || {
            let mut builder = self.client.post(url).form(form);
            if let Some((user, password)) = basic_auth {
                builder = builder.basic_auth(user, Some(password));
            }
            let response = builder.send().map_err(|e| SyncError::transient(url, e))?;
            Self::decode(url, response)
        })
    }
}

fn classify_retry(err: &SyncError) -> RetryAction {
    if err.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

impl JsonApi for HttpClient {
    fn get_json(&mut self, url: &str) -> SyncResult<Value> {
        retry_with_backoff(&self.retry, classify_retry, || self.get_once(url))
    }
}
