//! Aquaculture assistant backed by a generative AI provider, with an
//! offline keyword table for when the provider cannot answer.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

pub const PERSONA_PROMPT: &str = "You are an expert aquaculture consultant named AquaBot. \
You help farmers with fish ponds, tilapia, bangus, and water quality. \
Keep answers short, practical, and easy to understand. \
If the question is NOT about fish farming, politely refuse to answer.";

pub const OFFLINE_PREFIX: &str = "[Offline Mode] ";

pub const UNAVAILABLE_REPLY: &str = "I cannot reach the AI server right now, and I don't have a pre-saved answer for that. Please check your internet connection.";

/// Checked in order; the first keyword found in the message wins.
const OFFLINE_KNOWLEDGE: &[(&str, &str)] = &[
    ("green", "Green water indicates algae. Reduce feeding and turn on aerators."),
    ("brown", "Brown water means mud/solids. Apply agricultural lime (apog)."),
    ("gasping", "Fish gasping means LOW OXYGEN. Aerate immediately!"),
    ("feed", "Feed 3-5% of body weight daily. Split into morning/afternoon."),
    ("growth", "For faster growth, use high-protein feed and maintain high oxygen levels."),
];

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider quota exhausted")]
    Quota,

    #[error("response blocked by provider: {reason}")]
    Blocked { reason: String },

    #[error("provider returned no text")]
    Empty,

    #[error("provider error: {message}")]
    Provider { message: String },
}

#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        message: &str,
        image: Option<&ImageAttachment>,
    ) -> Result<String, AiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    Online,
    Offline,
    Unavailable,
}

impl ReplyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyMode::Online => "online",
            ReplyMode::Offline => "offline",
            ReplyMode::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub mode: ReplyMode,
}

/// Always answers: provider failures degrade to the offline table.
#[derive(Clone)]
pub struct ChatAssistant {
    provider: Option<Arc<dyn ChatProvider>>,
}

impl ChatAssistant {
    pub fn new(provider: Option<Arc<dyn ChatProvider>>) -> Self {
        Self { provider }
    }

    pub fn offline() -> Self {
        Self { provider: None }
    }

    pub fn is_online(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn reply(&self, message: &str, image: Option<&ImageAttachment>) -> ChatReply {
        if let Some(provider) = &self.provider {
            match provider.generate(PERSONA_PROMPT, message, image).await {
                Ok(text) => {
                    return ChatReply {
                        text,
                        mode: ReplyMode::Online,
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "assistant provider failed, switching to offline mode");
                }
            }
        }

        match offline_answer(message) {
            Some(answer) => ChatReply {
                text: format!("{OFFLINE_PREFIX}{answer}"),
                mode: ReplyMode::Offline,
            },
            None => ChatReply {
                text: UNAVAILABLE_REPLY.to_string(),
                mode: ReplyMode::Unavailable,
            },
        }
    }
}

pub fn offline_answer(message: &str) -> Option<&'static str> {
    let lowered = message.to_lowercase();
    OFFLINE_KNOWLEDGE
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, answer)| *answer)
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Google Gemini `generateContent` over REST.
pub struct GeminiProvider {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn build_request(system_prompt: &str, message: &str, image: Option<&ImageAttachment>) -> GenerateRequest {
    let mut parts = vec![GeminiPart::Text {
        text: format!("{system_prompt}\n\nUser Question: {message}"),
    }];
    if let Some(image) = image {
        parts.push(GeminiPart::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
            },
        });
    }
    GenerateRequest {
        contents: vec![GeminiContent { role: "user", parts }],
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, AiError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(AiError::Blocked { reason });
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(AiError::Empty);
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if matches!(reason, "SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII") {
            return Err(AiError::Blocked {
                reason: reason.to_string(),
            });
        }
    }

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        Err(AiError::Empty)
    } else {
        Ok(text.to_string())
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        message: &str,
        image: Option<&ImageAttachment>,
    ) -> Result<String, AiError> {
        let request = build_request(system_prompt, message, image);
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AiError::Quota);
        }
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|err| err.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}: {body}"));
            return Err(AiError::Provider { message });
        }

        extract_text(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl ChatProvider for FailingProvider {
        async fn generate(
            &self,
            _system_prompt: &str,
            _message: &str,
            _image: Option<&ImageAttachment>,
        ) -> Result<String, AiError> {
            Err(AiError::Quota)
        }
    }

    struct EchoProvider;

    #[async_trait]
    impl ChatProvider for EchoProvider {
        async fn generate(
            &self,
            system_prompt: &str,
            message: &str,
            image: Option<&ImageAttachment>,
        ) -> Result<String, AiError> {
            assert_eq!(system_prompt, PERSONA_PROMPT);
            Ok(format!("echo: {message} ({} image bytes)", image.map_or(0, |i| i.bytes.len())))
        }
    }

    #[test]
    fn offline_keywords_match_case_insensitively() {
        assert_eq!(
            offline_answer("My pond water is GREEN"),
            Some("Green water indicates algae. Reduce feeding and turn on aerators.")
        );
        assert!(offline_answer("What is the weather?").is_none());
    }

    #[test]
    fn first_keyword_in_table_order_wins() {
        let answer = offline_answer("how much feed for growth?").expect("matched");
        assert!(answer.starts_with("Feed 3-5%"));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_offline() {
        let assistant = ChatAssistant::new(Some(Arc::new(FailingProvider)));
        let reply = assistant.reply("fish are gasping", None).await;
        assert_eq!(reply.mode, ReplyMode::Offline);
        assert_eq!(
            reply.text,
            "[Offline Mode] Fish gasping means LOW OXYGEN. Aerate immediately!"
        );

        let reply = assistant.reply("tell me a joke", None).await;
        assert_eq!(reply.mode, ReplyMode::Unavailable);
        assert_eq!(reply.text, UNAVAILABLE_REPLY);
    }

    #[tokio::test]
    async fn online_provider_answers_directly() {
        let assistant = ChatAssistant::new(Some(Arc::new(EchoProvider)));
        let image = ImageAttachment {
            mime_type: "image/jpeg".to_string(),
            bytes: vec![1, 2, 3],
        };
        let reply = assistant.reply("green water", Some(&image)).await;
        assert_eq!(reply.mode, ReplyMode::Online);
        assert_eq!(reply.text, "echo: green water (3 image bytes)");
    }

    #[test]
    fn request_inlines_image_as_base64() {
        let image = ImageAttachment {
            mime_type: "image/png".to_string(),
            bytes: b"pond".to_vec(),
        };
        let request = serde_json::to_value(build_request("persona", "hi", Some(&image)))
            .expect("serializable");
        let parts = &request["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "persona\n\nUser Question: hi");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "cG9uZA==");
    }

    #[test]
    fn blocked_and_empty_responses_are_errors() {
        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#)
                .expect("valid json");
        assert!(matches!(extract_text(blocked), Err(AiError::Blocked { .. })));

        let unsafe_candidate: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"finishReason": "SAFETY"}]}"#,
        )
        .expect("valid json");
        assert!(matches!(extract_text(unsafe_candidate), Err(AiError::Blocked { .. })));

        assert!(matches!(
            extract_text(GenerateResponse::default()),
            Err(AiError::Empty)
        ));

        let ok: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Aerate "}, {"text": "now."}]}, "finishReason": "STOP"}]}"#,
        )
        .expect("valid json");
        assert_eq!(extract_text(ok).expect("text"), "Aerate now.");
    }
}
