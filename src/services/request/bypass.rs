//! Anti-bot challenge bypass through a FlareSolverr-compatible backend.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::cookie_jar::CookiePair;

/// Extra time granted to the backend on top of its own solve timeout
const TRANSPORT_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BypassConfig {
    /// Backend base URL, without the `/v1` suffix
    pub url: String,
    pub max_timeout_ms: u64,
}

/// Request replayed through the solver
#[derive(Debug, Clone)]
pub struct SolveRequest {
    pub url: String,
    pub method: Method,
    /// Form body for POST requests
    pub post_data: Option<String>,
    /// Cookies already known for the host
    pub cookies: Vec<CookiePair>,
}

/// What the solver's browser saw
#[derive(Debug, Clone, Default)]
pub struct Solution {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub response: String,
    pub cookies: Vec<CookiePair>,
    pub user_agent: Option<String>,
}

#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn solve(&self, request: &SolveRequest) -> Result<Solution>;
}

#[derive(Debug, Serialize)]
struct FlareSolverrRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    #[serde(rename = "postData", skip_serializing_if = "Option::is_none")]
    post_data: Option<&'a str>,
    #[serde(skip_serializing_if = "no_cookies")]
    cookies: &'a [CookiePair],
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
}

fn no_cookies(cookies: &&[CookiePair]) -> bool {
    cookies.is_empty()
}

#[derive(Debug, Deserialize)]
struct FlareSolverrResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    solution: Option<FlareSolverrSolution>,
}

#[derive(Debug, Deserialize)]
struct FlareSolverrSolution {
    #[serde(default)]
    url: String,
    status: u16,
    #[serde(default)]
    headers: HashMap<String, serde_json::Value>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    cookies: Vec<CookiePair>,
    #[serde(rename = "userAgent", default)]
    user_agent: Option<String>,
}

/// FlareSolverr v1 API client
pub struct FlareSolverr {
    client: reqwest::Client,
    config: BypassConfig,
}

impl FlareSolverr {
    pub fn new(config: BypassConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.max_timeout_ms) + TRANSPORT_GRACE)
            .build()
            .context("Failed to create FlareSolverr HTTP client")?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1", self.config.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChallengeSolver for FlareSolverr {
    async fn solve(&self, request: &SolveRequest) -> Result<Solution> {
        let payload = FlareSolverrRequest {
            cmd: if request.method == Method::POST {
                "request.post"
            } else {
                "request.get"
            },
            url: &request.url,
            post_data: if request.method == Method::POST {
                Some(request.post_data.as_deref().unwrap_or(""))
            } else {
                None
            },
            cookies: &request.cookies,
            max_timeout: self.config.max_timeout_ms,
        };

        let endpoint = self.endpoint();
        tracing::debug!(url = %request.url, endpoint = %endpoint, "Requesting via FlareSolverr");

        let response = self
            .client
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .context("FlareSolverr request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            bail!("FlareSolverr API error: {} - {}", status, detail);
        }

        let data: FlareSolverrResponse = response
            .json()
            .await
            .context("Invalid FlareSolverr response")?;

        if data.status != "ok" {
            bail!(
                "FlareSolverr error: {}",
                data.message.as_deref().unwrap_or("Unknown error")
            );
        }

        let solution = data.solution.context("FlareSolverr returned no solution")?;

        Ok(Solution {
            url: solution.url,
            status: solution.status,
            headers: solution
                .headers
                .into_iter()
                .map(|(name, value)| {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (name.to_ascii_lowercase(), value)
                })
                .collect(),
            response: solution.response,
            cookies: solution.cookies,
            user_agent: solution.user_agent.filter(|ua| !ua.is_empty()),
        })
    }
}

impl std::fmt::Debug for FlareSolverr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlareSolverr")
            .field("url", &self.config.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_payload_omits_empty_fields() {
        let payload = FlareSolverrRequest {
            cmd: "request.get",
            url: "https://tracker.example/api",
            post_data: None,
            cookies: &[],
            max_timeout: 60_000,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"cmd": "request.get", "url": "https://tracker.example/api", "maxTimeout": 60000})
        );
    }

    #[test]
    fn test_post_payload_carries_cookies() {
        let cookies = vec![CookiePair {
            name: "cf_clearance".into(),
            value: "abc".into(),
        }];
        let payload = FlareSolverrRequest {
            cmd: "request.post",
            url: "https://tracker.example/login",
            post_data: Some("a=1&b=2"),
            cookies: &cookies,
            max_timeout: 1000,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["postData"], "a=1&b=2");
        assert_eq!(value["cookies"][0]["name"], "cf_clearance");
    }

    #[test]
    fn test_solution_parsing_ignores_extra_cookie_fields() {
        let raw = json!({
            "status": "ok",
            "message": "Challenge solved!",
            "solution": {
                "url": "https://tracker.example/",
                "status": 200,
                "headers": {"Content-Type": "text/html"},
                "response": "<html></html>",
                "cookies": [{"name": "cf_clearance", "value": "xyz", "domain": ".tracker.example", "httpOnly": true}],
                "userAgent": "Mozilla/5.0 Solver"
            }
        });
        let parsed: FlareSolverrResponse = serde_json::from_value(raw).unwrap();
        let solution = parsed.solution.unwrap();
        assert_eq!(solution.status, 200);
        assert_eq!(solution.cookies[0].value, "xyz");
        assert_eq!(solution.user_agent.as_deref(), Some("Mozilla/5.0 Solver"));
    }

    #[test]
    fn test_endpoint() {
        let solver = FlareSolverr::new(BypassConfig {
            url: "http://solver:8191/".into(),
            max_timeout_ms: 60_000,
        })
        .unwrap();
        assert_eq!(solver.endpoint(), "http://solver:8191/v1");
    }
}
