//! Outbound HTTP for indexer scrapers
//!
//! [`ResilientRequestClient`] keeps cookies and a working user agent per host, paces
//! requests through the [`AdaptiveRateLimiter`] when a limit class is given, and falls
//! back to a challenge-solving backend when a host answers 403.

mod body;
mod bypass;
mod cookie_jar;
mod user_agents;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Method;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::services::cache::{TtlCache, cached, traced};
use crate::services::rate_limiter::{AdaptiveRateLimiter, LimitKey};

pub use body::{
    ResponseBody, decode_body, is_html_wrapped_json, lowercase_keys, normalize_headers,
    unwrap_json_from_html,
};
pub use bypass::{BypassConfig, ChallengeSolver, FlareSolverr, Solution, SolveRequest};
pub use cookie_jar::{CookieJar, CookiePair};
pub use user_agents::{USER_AGENTS, UserAgentStore, random_user_agent};

/// Cookie set by Cloudflare once a challenge has been passed
const CLEARANCE_COOKIE: &str = "cf_clearance";

#[derive(Debug, Clone)]
pub struct RequestClientConfig {
    /// Default timeout for the direct request in milliseconds, 0 disables it
    pub timeout_ms: u64,
    pub accept_language: String,
}

impl Default for RequestClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            accept_language: "en-GB,en-US;q=0.9,en;q=0.8".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Overrides the client default
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    /// Rate limit class; when set the request is paced and its outcome recorded
    pub limit_class: Option<String>,
    /// Return the body as bytes instead of decoding it
    pub raw: bool,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn limit_class(mut self, class: impl Into<String>) -> Self {
        self.limit_class = Some(class.into());
        self
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }
}

/// Normalized response handed to scrapers
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Lowercased header names
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
    pub ok: bool,
    /// Whether the body came from the bypass backend
    pub via_bypass: bool,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Direct upstream answer before it is turned into an [`HttpResponse`]
struct DirectResponse {
    status: u16,
    headers: HashMap<String, String>,
    set_cookies: Vec<String>,
    bytes: Vec<u8>,
}

impl DirectResponse {
    fn into_response(self, raw: bool) -> HttpResponse {
        let body = if raw {
            ResponseBody::Binary(self.bytes)
        } else {
            decode_body(
                self.headers.get("content-type").map(String::as_str),
                &self.bytes,
            )
        };

        HttpResponse {
            ok: (200..300).contains(&self.status),
            status: self.status,
            headers: self.headers,
            body,
            via_bypass: false,
        }
    }
}

enum FetchOutcome {
    Failed(RequestError),
    NotCached(HttpResponse),
}

pub struct ResilientRequestClient {
    http: reqwest::Client,
    config: RequestClientConfig,
    cookies: CookieJar,
    user_agents: UserAgentStore,
    solver: Option<Arc<dyn ChallengeSolver>>,
    limiter: Option<Arc<AdaptiveRateLimiter>>,
}

impl ResilientRequestClient {
    pub fn new(config: RequestClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            config,
            cookies: CookieJar::new(),
            user_agents: UserAgentStore::new(),
            solver: None,
            limiter: None,
        })
    }

    /// Client wired up from pipeline configuration, including the bypass backend
    /// when one is configured
    pub fn from_config(config: &Config, limiter: Option<Arc<AdaptiveRateLimiter>>) -> anyhow::Result<Self> {
        let mut client = Self::new(config.request.clone())?;
        if let Some(bypass) = &config.bypass {
            tracing::info!(url = %bypass.url, "Anti-bot bypass enabled");
            client = client.with_solver(Arc::new(FlareSolverr::new(bypass.clone())?));
        }
        if let Some(limiter) = limiter {
            client = client.with_limiter(limiter);
        }
        Ok(client)
    }

    pub fn with_solver(mut self, solver: Arc<dyn ChallengeSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn user_agents(&self) -> &UserAgentStore {
        &self.user_agents
    }

    pub fn bypass_enabled(&self) -> bool {
        self.solver.is_some()
    }

    /// Issue a request.
    ///
    /// Transport failures, timeouts and cancellation are returned as errors. Any
    /// HTTP status, including a 403 the bypass could not get past, is a response.
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<HttpResponse, RequestError> {
        let url = build_url(url, &options.query)?;
        let host = url
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| RequestError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            })?;
        let cancel = options.cancel.clone().unwrap_or_default();
        let limit_key = self
            .limiter
            .as_ref()
            .and(options.limit_class.as_ref())
            .map(|class| LimitKey::new(host.clone(), class.clone()));

        if let (Some(limiter), Some(key)) = (&self.limiter, &limit_key) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                _ = limiter.pace(key) => {}
            }
        }

        let user_agent = self.user_agents.pick(&host);
        let timeout = options.timeout.or_else(|| {
            (self.config.timeout_ms > 0).then(|| Duration::from_millis(self.config.timeout_ms))
        });

        let direct = self.send_direct(&url, &host, &user_agent, &options);
        let direct = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(RequestError::Cancelled),
                result = direct => result,
            }
        };
        let direct = match timeout {
            Some(limit) => tokio::time::timeout(limit, direct)
                .await
                .map_err(|_| RequestError::Timeout(limit))??,
            None => direct.await?,
        };

        tracing::debug!(url = %url, status = direct.status, "Upstream responded");

        if let (Some(limiter), Some(key)) = (&self.limiter, &limit_key) {
            limiter.record_outcome(key, direct.status, &direct.headers).await;
        }

        if direct.status == 403 {
            if let Some(solver) = &self.solver {
                tracing::warn!(url = %url, "Received 403, retrying through bypass backend");
                let request = SolveRequest {
                    url: url.to_string(),
                    method: options.method.clone(),
                    post_data: options.body.clone(),
                    cookies: self.cookies.cookie_pairs(&host),
                };

                let solved = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                    solved = solver.solve(&request) => solved,
                };

                match solved {
                    Ok(solution) => {
                        let response = self.absorb_solution(&host, solution, options.raw);
                        tracing::info!(url = %url, status = response.status, "Bypass retry succeeded");
                        return Ok(response);
                    }
                    Err(e) => {
                        tracing::error!(url = %url, error = %e, "Bypass retry failed, returning original response");
                    }
                }
            }

            return Ok(direct.into_response(options.raw));
        }

        if self.solver.is_some() && self.cookies.has_cookie(&host, CLEARANCE_COOKIE) {
            tracing::debug!(host = %host, "Request passed with stored clearance");
        }

        self.cookies.set_cookies(&host, &direct.set_cookies);
        self.user_agents.remember(&host, &user_agent);

        Ok(direct.into_response(options.raw))
    }

    /// [`request`](Self::request) behind a response cache. Only 2xx responses are cached;
    /// expired entries are pruned whenever a miss stores a new one.
    pub async fn fetch_cached(
        &self,
        cache: &TtlCache<HttpResponse>,
        url: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, RequestError> {
        let key = cache_key(url, &options);
        let fetched = cached(cache, &key, move || async move {
            let response = traced("request", self.request(url, options))
                .await
                .map_err(FetchOutcome::Failed)?;
            if response.ok {
                Ok(response)
            } else {
                Err(FetchOutcome::NotCached(response))
            }
        })
        .await;

        match fetched {
            Ok(response) | Err(FetchOutcome::NotCached(response)) => Ok(response),
            Err(FetchOutcome::Failed(e)) => Err(e),
        }
    }

    async fn send_direct(
        &self,
        url: &Url,
        host: &str,
        user_agent: &str,
        options: &RequestOptions,
    ) -> Result<DirectResponse, RequestError> {
        let headers = self.request_headers(url, host, user_agent, options);
        let mut builder = self
            .http
            .request(options.method.clone(), url.clone())
            .headers(headers);
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = normalize_headers(response.headers());
        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        let bytes = response.bytes().await?.to_vec();

        Ok(DirectResponse {
            status,
            headers,
            set_cookies,
            bytes,
        })
    }

    fn request_headers(&self, url: &Url, host: &str, user_agent: &str, options: &RequestOptions) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, header::ACCEPT_LANGUAGE, &self.config.accept_language);
        insert_header(&mut headers, HeaderName::from_static("priority"), "u=0, i");
        insert_header(
            &mut headers,
            header::REFERER,
            &format!("{}/", url.origin().ascii_serialization()),
        );
        insert_header(&mut headers, header::USER_AGENT, user_agent);

        for (name, value) in &options.headers {
            match HeaderName::from_bytes(name.as_bytes()) {
                Ok(name) => insert_header(&mut headers, name, value),
                Err(e) => tracing::warn!(header = %name, error = %e, "Skipping invalid header name"),
            }
        }

        if let Some(cookie) = self.cookies.cookie_header(host) {
            insert_header(&mut headers, header::COOKIE, &cookie);
        }

        headers
    }

    fn absorb_solution(&self, host: &str, solution: Solution, raw: bool) -> HttpResponse {
        if !solution.cookies.is_empty() {
            let pairs: Vec<String> = solution
                .cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect();
            self.cookies.set_cookies(host, &pairs);
            tracing::debug!(host = %host, count = pairs.len(), "Stored bypass cookies");
        }
        if let Some(user_agent) = &solution.user_agent {
            self.user_agents.remember(host, user_agent);
        }

        let mut headers = lowercase_keys(solution.headers);
        let text = if is_html_wrapped_json(&solution.response) {
            tracing::debug!("Unwrapping HTML-wrapped JSON from bypass response");
            unwrap_json_from_html(&solution.response)
        } else {
            solution.response
        };

        let body = if raw {
            ResponseBody::Binary(text.into_bytes())
        } else {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => {
                    headers
                        .entry("content-type".to_string())
                        .or_insert_with(|| "application/json".to_string());
                    ResponseBody::Json(value)
                }
                Err(_) => {
                    headers
                        .entry("content-type".to_string())
                        .or_insert_with(|| "text/html".to_string());
                    ResponseBody::Text(text)
                }
            }
        };

        HttpResponse {
            status: solution.status,
            ok: (200..300).contains(&solution.status),
            headers,
            body,
            via_bypass: true,
        }
    }
}

impl std::fmt::Debug for ResilientRequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientRequestClient")
            .field("config", &self.config)
            .field("bypass", &self.solver.is_some())
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

fn build_url(raw: &str, query: &[(String, String)]) -> Result<Url, RequestError> {
    let mut url = Url::parse(raw).map_err(|e| RequestError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url)
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => tracing::warn!(header = %name, error = %e, "Skipping invalid header value"),
    }
}

fn cache_key(url: &str, options: &RequestOptions) -> String {
    let query = options
        .query
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{} {}?{} {}",
        options.method,
        url,
        query,
        options.body.as_deref().unwrap_or("")
    )
}
