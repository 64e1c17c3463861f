use std::time::Duration;

use anyhow::{Context, bail};
use axum::{extract::State, http::header, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::AppState;
use crate::error::ApiError;

/// Separator between questions in the suggestion string.
pub const SEPARATOR: &str = "||";

/// Served when no completion API key is configured.
pub const DEFAULT_SUGGESTIONS: &str =
    "What's your favorite movie?||Do you have any pets?||What's your dream job?";

const MODEL: &str = "gpt-3.5-turbo";
const MAX_TOKENS: u32 = 400;
const REQUEST_TIMEOUT_SECS: u64 = 30;

const PROMPT: &str = "Create a list of three open-ended and engaging questions formatted as a \
single string. Each question should be separated by '||'. These questions are for an anonymous \
social messaging platform and should be suitable for a diverse audience. Avoid personal or \
sensitive topics, focusing instead on universal themes that encourage friendly interaction. \
For example, your output should be structured like this: 'What's a hobby you've recently \
started?||If you could have dinner with any historical figure, who would it be?||What's a \
simple thing that makes you happy?'. Ensure the questions are intriguing, foster curiosity, \
and contribute to a positive and welcoming conversational environment.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completion endpoint.
pub struct SuggestionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SuggestionClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub async fn suggest(&self) -> anyhow::Result<String> {
        let Some(api_key) = &self.api_key else {
            debug!("No completion API key configured, serving default suggestions");
            return Ok(DEFAULT_SUGGESTIONS.to_string());
        };

        let body = ChatRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            messages: [ChatMessage {
                role: "user",
                content: PROMPT,
            }],
        };

        let response: ChatResponse = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("completion request failed")?
            .error_for_status()?
            .json()
            .await
            .context("completion response unreadable")?;

        let raw = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        match normalize(&raw) {
            Some(text) => Ok(text),
            None => bail!("completion returned no questions: {:?}", raw),
        }
    }
}

/// Trim quotes and whitespace around each question and drop empty entries.
/// `None` when nothing usable is left.
fn normalize(raw: &str) -> Option<String> {
    let questions: Vec<&str> = raw
        .split(SEPARATOR)
        .map(|q| q.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|q| !q.is_empty())
        .collect();

    if questions.is_empty() {
        None
    } else {
        Some(questions.join(SEPARATOR))
    }
}

/// POST /api/suggest-messages: plain text, questions separated by `||`.
pub async fn suggest_messages(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let text = state
        .suggestions
        .suggest()
        .await
        .map_err(ApiError::internal("Failed to generate response"))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        text,
    ))
}
