/// LLM Client — the single point of entry for Claude API calls in vitae.
///
/// Only the content critique check talks to the model, and only through this
/// module. Requests are retried on 429/5xx with exponential backoff, honouring
/// `retry-after` when the API sends one.
use std::time::Duration;

use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
/// Model used for critique. Hardcoded so results stay comparable between runs.
pub const MODEL: &str = "claude-sonnet-4-5";
/// A critique is a short JSON list; this is generous headroom.
const MAX_TOKENS: u32 = 4096;
const ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("reply is not the expected JSON: {0}")]
    Reply(#[from] serde_json::Error),

    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("reply contained no text")]
    NoText,
}

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Turn<'a>; 1],
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct Reply {
    content: Vec<Block>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl Reply {
    fn into_text(self) -> Option<String> {
        self.content.into_iter().find_map(|block| match block {
            Block::Text { text } => Some(text),
            Block::Other => None,
        })
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// What to do after one request.
enum Outcome {
    Done(Reply),
    Retry(LlmError, Option<Duration>),
    Fail(LlmError),
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
    url: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_key,
            url: MESSAGES_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sends one user turn and returns the first text block of the reply.
    pub async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request = Request {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: [Turn {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error = None;
        for attempt in 1..=ATTEMPTS {
            match self.attempt(&request).await {
                Outcome::Done(reply) => {
                    if let Some(usage) = &reply.usage {
                        debug!(
                            "LLM reply: input_tokens={}, output_tokens={}",
                            usage.input_tokens, usage.output_tokens
                        );
                    }
                    return reply.into_text().ok_or(LlmError::NoText);
                }
                Outcome::Fail(e) => return Err(e),
                Outcome::Retry(e, hint) => {
                    if attempt < ATTEMPTS {
                        let delay = retry_delay(attempt, hint);
                        warn!("LLM attempt {attempt} failed ({e}); retrying in {}ms", delay.as_millis());
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(LlmError::Exhausted { attempts: ATTEMPTS }))
    }

    async fn attempt(&self, request: &Request<'_>) -> Outcome {
        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await;
        let response = match response {
            Ok(r) => r,
            Err(e) => return Outcome::Retry(LlmError::Transport(e), None),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<Reply>().await {
                Ok(reply) => Outcome::Done(reply),
                Err(e) => Outcome::Fail(LlmError::Transport(e)),
            };
        }

        let hint = retry_after(&response);
        let error = status_error(status, response).await;
        if is_retryable(status) {
            Outcome::Retry(error, hint)
        } else {
            Outcome::Fail(error)
        }
    }

    /// Completes and parses the reply as JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let text = self.complete(prompt, system).await?;
        parse_json_reply(&text)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn status_error(status: StatusCode, response: Response) -> LlmError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    LlmError::Status {
        status: status.as_u16(),
        message,
    }
}

/// 1s, 2s, 4s… or the server's `retry-after` if longer, capped at 30s.
fn retry_delay(attempt: u32, hint: Option<Duration>) -> Duration {
    let backoff = BASE_DELAY.saturating_mul(1 << (attempt - 1).min(16));
    backoff.max(hint.unwrap_or_default()).min(MAX_DELAY)
}

/// Parses a JSON reply, tolerating a surrounding ```json fence.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    Ok(serde_json::from_str(strip_json_fences(text))?)
}

fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(body) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    let body = body.trim_start();
    body.strip_suffix("```").map(str::trim).unwrap_or(body)
}
