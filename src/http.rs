//! Blocking HTTP JSON client with bounded retries.
//!
//! Both external services (Last.fm and the media center) go through
//! [`JsonClient`], so they share one [`RetryPolicy`]: on any transport or
//! decode failure wait `min(base * 2^(attempt-1), cap)` and try again, up to
//! `max_attempts`, then hand back the last error.

use std::time::Duration;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::HttpError;

/// Identifying user agent sent with every request.
pub const USER_AGENT: &str = concat!("listener-rating/", env!("CARGO_PKG_VERSION"));

static API_KEY_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(api_key=)[^&]*").unwrap());

/// Hide the Last.fm key before a URL reaches the log.
pub fn redact_url(url: &str) -> String {
    API_KEY_PARAM.replace_all(url, "${1}***").into_owned()
}

// ============================================================================
// Transport
// ============================================================================

/// One raw request/response exchange. Implementations do not retry.
pub trait Transport {
    fn get(&self, url: &str, timeout: Duration) -> Result<Value, HttpError>;

    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, HttpError>;
}

/// [`Transport`] backed by a shared `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }

    fn read_json(response: ureq::Response) -> Result<Value, HttpError> {
        let body = response
            .into_string()
            .map_err(|err| HttpError::Transport(format!("Failed to read response: {err}")))?;
        serde_json::from_str(&body).map_err(|err| HttpError::Decode(err.to_string()))
    }

    fn map_error(error: ureq::Error) -> HttpError {
        match error {
            ureq::Error::Status(status, response) => HttpError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => HttpError::Transport(transport.to_string()),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<Value, HttpError> {
        let response = self
            .agent
            .get(url)
            .set("Accept", "application/json")
            .timeout(timeout)
            .call()
            .map_err(Self::map_error)?;
        Self::read_json(response)
    }

    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, HttpError> {
        let mut request = self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .timeout(timeout);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        let response = request
            .send_string(&body.to_string())
            .map_err(Self::map_error)?;
        Self::read_json(response)
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Exponential backoff parameters shared by every external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub cap_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            cap_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.cap_delay)
    }

    /// Run `operation` until it succeeds or attempts run out. No sleep follows the last attempt.
    pub fn run<T, F>(&self, label: &str, sleep: &dyn Fn(Duration), mut operation: F) -> Result<T, HttpError>
    where
        F: FnMut() -> Result<T, HttpError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err @ HttpError::NotConfigured(_)) => return Err(err),
                Err(err) if attempt >= attempts => {
                    warn!("{} failed after {} attempt(s): {}", label, attempt, err);
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        "{} attempt {}/{} failed ({}), retrying in {:.1}s",
                        label,
                        attempt,
                        attempts,
                        err,
                        delay.as_secs_f64()
                    );
                    sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

// ============================================================================
// JSON Client
// ============================================================================

/// Retrying JSON client used by the Last.fm resolver and the media-center client.
pub struct JsonClient {
    transport: Box<dyn Transport>,
    policy: RetryPolicy,
    timeout: Duration,
    debug_api: bool,
    sleeper: Box<dyn Fn(Duration)>,
}

impl JsonClient {
    pub fn new(transport: Box<dyn Transport>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            transport,
            policy,
            timeout,
            debug_api: false,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Log raw request URLs/payloads and response bodies at debug level.
    pub fn with_debug_api(mut self, debug_api: bool) -> Self {
        self.debug_api = debug_api;
        self
    }

    /// Replace the backoff sleep (tests record delays instead of waiting).
    pub fn with_sleeper(mut self, sleeper: Box<dyn Fn(Duration)>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn get_json(&self, url: &str) -> Result<Value, HttpError> {
        let shown = redact_url(url);
        if self.debug_api {
            debug!("GET {}", shown);
        }
        let value = self.policy.run(&format!("GET {}", shown), &*self.sleeper, || {
            self.transport.get(url, self.timeout)
        })?;
        if self.debug_api {
            debug!("Response: {}", value);
        }
        Ok(value)
    }

    pub fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<Value, HttpError> {
        if self.debug_api {
            debug!("POST {} payload: {}", url, body);
        }
        let value = self.policy.run(&format!("POST {}", url), &*self.sleeper, || {
            self.transport.post(url, headers, body, self.timeout)
        })?;
        if self.debug_api {
            debug!("Response: {}", value);
        }
        Ok(value)
    }
}

// ============================================================================
// Test Support
// ============================================================================
