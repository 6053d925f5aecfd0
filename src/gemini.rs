//! Player identification and fact generation through the Gemini API.
//!
//! Model output is parsed into typed payloads right at the boundary; nothing
//! past this module sees raw JSON.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GeminiError;
use crate::types::QaPair;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
const TEMPERATURE: f32 = 0.1;
const QUOTA_STATUS: &str = "RESOURCE_EXHAUSTED";
const UNKNOWN_PLAYER: &str = "unknown";

const IDENTIFY_PROMPT: &str = r#"You are a baseball historian. The image is a "Name That Yankee" trivia card showing a player's career statistics and the teams and years he played for.

Identify the player. Only answer with a player whose career totals and every team/year on the card match exactly; do not guess. If no player matches, use "Unknown" as the name and an empty nickname.

Respond with ONLY this JSON object:
{
  "name": "Player's full name",
  "nickname": "Common nickname, or an empty string"
}"#;

/// Typed result of the identification call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    Success { name: String, nickname: String },
    Failure { reason: String },
}

/// The generation collaborator the batch runner depends on
pub trait GenerationService {
    fn identify(&mut self, image: &Path) -> Result<Identification, GeminiError>;

    fn facts(&mut self, name: &str) -> Result<Vec<String>, GeminiError>;

    fn qa(&mut self, name: &str, facts: &[String]) -> Result<Vec<QaPair>, GeminiError>;
}

/// Enforces a minimum gap between consecutive API calls.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    /// Block until `min_interval` has passed since the previous call, then
    /// record this one.
    pub fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let pause = self.min_interval - elapsed;
                debug!("rate limit: sleeping {:?}", pause);
                thread::sleep(pause);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// Token usage accumulated over a run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub cached_tokens: u64,
    pub output_tokens: u64,
    pub requests: u64,
}

impl UsageStats {
    fn add(&mut self, other: &UsageStats) {
        self.prompt_tokens += other.prompt_tokens;
        self.cached_tokens += other.cached_tokens;
        self.output_tokens += other.output_tokens;
        self.requests += other.requests;
    }
}

// Gemini API types
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<ApiError>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u64>,
    #[serde(rename = "cachedContentTokenCount")]
    cached_content_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

// Payloads the prompts ask for
#[derive(Debug, Deserialize)]
struct IdentifyPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct FactsPayload {
    #[serde(default)]
    facts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QaPayload {
    #[serde(default)]
    questions: Vec<QaPair>,
}

fn get_mime_type(path: &str) -> &'static str {
    match path.to_lowercase() {
        p if p.ends_with(".png") => "image/png",
        p if p.ends_with(".jpg") || p.ends_with(".jpeg") => "image/jpeg",
        p if p.ends_with(".gif") => "image/gif",
        p if p.ends_with(".webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Turn a raw HTTP status and body into the model's text, or a typed failure.
fn response_text(status: u16, body: &str) -> Result<(String, UsageStats), GeminiError> {
    let parsed: Result<GeminiResponse, _> = serde_json::from_str(body);

    if status == 429 {
        let message = parsed
            .ok()
            .and_then(|r| r.error)
            .map(|e| e.message)
            .unwrap_or_else(|| "HTTP 429".to_string());
        return Err(GeminiError::QuotaExhausted(message));
    }

    let response = match parsed {
        Ok(r) => r,
        Err(e) if (200..300).contains(&status) => {
            return Err(GeminiError::Malformed {
                reason: e.to_string(),
                text: body.chars().take(200).collect(),
            })
        }
        Err(_) => {
            return Err(GeminiError::Api {
                status,
                message: body.chars().take(200).collect(),
            })
        }
    };

    if let Some(error) = response.error {
        if error.status == QUOTA_STATUS {
            return Err(GeminiError::QuotaExhausted(error.message));
        }
        let code = if error.code != 0 { error.code } else { status };
        return Err(GeminiError::Api {
            status: code,
            message: error.message,
        });
    }

    let usage = response
        .usage_metadata
        .as_ref()
        .map_or(UsageStats::default(), |u| UsageStats {
            prompt_tokens: u.prompt_token_count.unwrap_or(0),
            cached_tokens: u.cached_content_token_count.unwrap_or(0),
            output_tokens: u.candidates_token_count.unwrap_or(0),
            requests: 0,
        });

    let text = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect::<String>();

    if text.trim().is_empty() {
        return Err(GeminiError::EmptyResponse);
    }
    Ok((text, usage))
}

/// Count one request against `usage`, whatever the outcome, then classify it.
fn record_call(usage: &mut UsageStats, status: u16, body: &str) -> Result<String, GeminiError> {
    usage.requests += 1;
    let (text, tokens) = response_text(status, body)?;
    usage.add(&tokens);
    debug!(
        prompt_tokens = tokens.prompt_tokens,
        output_tokens = tokens.output_tokens,
        "Gemini call complete"
    );
    Ok(text)
}

/// Remove the Markdown code fence models like to wrap JSON in.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn parse_payload<T: DeserializeOwned>(text: &str) -> Result<T, GeminiError> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| GeminiError::Malformed {
        reason: e.to_string(),
        text: text.chars().take(200).collect(),
    })
}

fn identification_from(payload: IdentifyPayload) -> Identification {
    let name = payload.name.trim();
    if name.is_empty() || name.eq_ignore_ascii_case(UNKNOWN_PLAYER) {
        return Identification::Failure {
            reason: "model could not match the card to a player".to_string(),
        };
    }
    Identification::Success {
        name: name.to_string(),
        nickname: payload.nickname.trim().to_string(),
    }
}

fn facts_prompt(name: &str) -> String {
    format!(
        r#"Give three interesting career facts about the baseball player {name}.

Rules:
- One short sentence per fact.
- No embellishing or subjective words ("remarkable", "legendary").
- Prefer career highlights, unique statistical achievements and family ties to the game.
- Do not use the player's name or "he"; state the fact directly ("Was a five-time All-Star").
- For an unremarkable career, pick three notable numbers from the career line instead.

Respond with ONLY this JSON object:
{{
  "facts": ["Fact 1.", "Fact 2.", "Fact 3."]
}}"#
    )
}

fn qa_prompt(name: &str, facts: &[String]) -> String {
    let known = facts
        .iter()
        .map(|f| format!("- {}", f))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Write three short trivia questions with answers about the baseball player {name}.
Do not repeat these facts, which are already shown:
{known}

Respond with ONLY this JSON object:
{{
  "questions": [{{"question": "Question?", "answer": "Answer."}}]
}}"#
    )
}

pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    limiter: RateLimiter,
    usage: UsageStats,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, limiter: RateLimiter) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; NameThatYankee/1.0)")
            .timeout(Duration::from_secs(180))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            limiter,
            usage: UsageStats::default(),
        })
    }

    pub fn usage(&self) -> UsageStats {
        self.usage
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate(&mut self, parts: Vec<GeminiPart>) -> Result<String, GeminiError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent { parts }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                response_mime_type: "application/json".to_string(),
            },
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_URL, self.model, self.api_key
        );

        self.limiter.wait();
        let response = self.client.post(&url).json(&request).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;

        record_call(&mut self.usage, status, &body)
    }
}

impl GenerationService for GeminiClient {
    fn identify(&mut self, image: &Path) -> Result<Identification, GeminiError> {
        info!(image = %image.display(), "identifying player from clue image");
        let data = fs::read(image)?;
        let parts = vec![
            GeminiPart::InlineData {
                inline_data: InlineData {
                    mime_type: get_mime_type(&image.to_string_lossy()).to_string(),
                    data: BASE64_STANDARD.encode(&data),
                },
            },
            GeminiPart::Text {
                text: IDENTIFY_PROMPT.to_string(),
            },
        ];
        let text = self.generate(parts)?;
        let identification = identification_from(parse_payload(&text)?);
        if let Identification::Success { name, .. } = &identification {
            info!(player = name.as_str(), "player identified");
        }
        Ok(identification)
    }

    fn facts(&mut self, name: &str) -> Result<Vec<String>, GeminiError> {
        info!(player = name, "asking Gemini for career facts");
        let text = self.generate(vec![GeminiPart::Text {
            text: facts_prompt(name),
        }])?;
        let payload: FactsPayload = parse_payload(&text)?;
        Ok(payload
            .facts
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect())
    }

    fn qa(&mut self, name: &str, facts: &[String]) -> Result<Vec<QaPair>, GeminiError> {
        info!(player = name, "asking Gemini for trivia questions");
        let text = self.generate(vec![GeminiPart::Text {
            text: qa_prompt(name, facts),
        }])?;
        let payload: QaPayload = parse_payload(&text)?;
        Ok(payload
            .questions
            .into_iter()
            .filter(|q| !q.question.trim().is_empty())
            .collect())
    }
}
