// --------------------------------------------------
// Client for the external natural-language extraction service.
//
// Responsibilities:
// - Describe the request context (reference date / time / zone)
// - Call Gemini with a strict JSON response schema
// - Reject anything that does not match that schema (fail closed)
// --------------------------------------------------

use chrono::{DateTime, FixedOffset};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::error::ExtractionError;
use crate::models::Priority;
use crate::temporal::DateComponents;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Reference context sent along with the text so relative phrases
/// ("tomorrow", "next Friday") can be anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionContext {
    pub current_date: String, // "Monday, July 1, 2024"
    pub current_time: String, // "HH:mm"
    pub timezone: String,     // "UTC+09:00"
}

impl ExtractionContext {
    pub fn from_reference(now: DateTime<FixedOffset>) -> Self {
        Self {
            current_date: now.format("%A, %B %-d, %Y").to_string(),
            current_time: now.format("%H:%M").to_string(),
            timezone: format!("UTC{}", now.offset()),
        }
    }
}

/// Structured fields returned by the extraction service.
///
/// `title`, `priority`, `category`, `description`, `subtasks` and `tags`
/// are required; a payload missing any of them is rejected as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawExtraction {
    pub title: String,
    #[serde(default)]
    pub date_components: Option<DateComponents>,
    pub priority: Priority,
    pub category: String,
    pub description: String,
    pub subtasks: Vec<String>,
    pub tags: Vec<String>,
    #[serde(default)]
    pub reminder: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl RawExtraction {
    /// Parse and validate a JSON payload.
    pub fn from_json(text: &str) -> Result<Self, ExtractionError> {
        let raw: Self = serde_json::from_str(text)?;
        if raw.title.trim().is_empty() {
            return Err(ExtractionError::Invalid("empty title".into()));
        }
        Ok(raw)
    }
}

/// The extraction collaborator as seen by the normalizer.
#[allow(async_fn_in_trait)]
pub trait Extractor: Send + Sync {
    /// Turn free text into raw task fields.
    async fn extract(
        &self,
        text: &str,
        context: &ExtractionContext,
    ) -> Result<RawExtraction, ExtractionError>;

    /// A short motivational line about today's progress.
    async fn motivate(&self, completed: usize, pending: usize) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Gemini `generateContent` client.
pub struct GeminiExtractor {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiExtractor {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_headers(&self) -> Result<HeaderMap, ExtractionError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ExtractionError::MissingApiKey)?;

        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| ExtractionError::Invalid(format!("invalid API key header: {e}")))?,
        );
        Ok(headers)
    }

    // POST the body and return the concatenated text parts of the first candidate.
    async fn generate(&self, body: Value) -> Result<String, ExtractionError> {
        let headers = self.build_headers()?;
        let response = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: GenerateResponse = response.json().await?;
        let text: String = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyResponse);
        }
        Ok(text)
    }
}

impl Extractor for GeminiExtractor {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn extract(
        &self,
        text: &str,
        context: &ExtractionContext,
    ) -> Result<RawExtraction, ExtractionError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": system_instruction(context) }] },
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
            },
        });

        let reply = self.generate(body).await?;
        debug!(bytes = reply.len(), "extraction reply received");
        RawExtraction::from_json(&reply)
    }

    async fn motivate(&self, completed: usize, pending: usize) -> Result<String, ExtractionError> {
        let prompt = format!(
            "I have completed {completed} tasks today and have {pending} left. \
             Give me a very short (max 20 words) motivational punchline."
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        self.generate(body).await
    }
}

fn system_instruction(context: &ExtractionContext) -> String {
    format!(
        "You turn a short note into a task record.\n\
         \n\
         Reference date: {date}\n\
         Reference time: {time}\n\
         Timezone: {zone}\n\
         \n\
         Dates:\n\
         - Resolve relative phrases (\"tomorrow\", \"next Friday\", \"in 2 days\") against the reference date.\n\
         - Return raw date_components. Leave year null unless the user states one.\n\
         - Leave time null unless the user states one; use 24h \"HH:mm\".\n\
         - If the note has no date at all, return null date_components.\n\
         \n\
         Use priority \"auto\" when the note gives no hint. Return JSON only.",
        date = context.current_date,
        time = context.current_time,
        zone = context.timezone,
    )
}

fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "date_components": {
                "type": "OBJECT",
                "nullable": true,
                "properties": {
                    "year": { "type": "INTEGER", "nullable": true },
                    "month": { "type": "INTEGER", "nullable": true, "description": "1-12" },
                    "day": { "type": "INTEGER", "nullable": true },
                    "time": { "type": "STRING", "nullable": true, "description": "HH:mm in 24h format" }
                }
            },
            "priority": { "type": "STRING", "enum": ["low", "medium", "high", "auto"] },
            "category": { "type": "STRING" },
            "description": { "type": "STRING" },
            "subtasks": { "type": "ARRAY", "items": { "type": "STRING" } },
            "tags": { "type": "ARRAY", "items": { "type": "STRING" } },
            "reminder": { "type": "STRING", "nullable": true, "description": "ISO timestamp, only when a reminder is explicitly requested" },
            "duration_minutes": { "type": "INTEGER", "nullable": true }
        },
        "required": ["title", "priority", "category", "description", "subtasks", "tags"]
    })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}
