use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    config::{AnalysisConfig, ApiConfig},
    daemon::{
        chunk::WindowSample,
        storage::entities::{ActivityCardEntity, ObservationEntity},
    },
};

use super::{
    parse::{parse_cards, parse_observations},
    prompts::{cards_text, transcribe_text, GENERATE_CARDS_SYSTEM_PROMPT, TRANSCRIBE_SYSTEM_PROMPT},
    retry::send_with_retry,
    window_context::window_info_text,
    LlmError, LlmProvider,
};

const TEST_PROMPT: &str = "Hello, please reply with 'connection works'";
const TEST_REPLY_LENGTH: usize = 100;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(content.to_string()),
        }
    }

    fn user(content: MessageContent) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

/// [LlmProvider] for OpenAI compatible chat completion APIs with vision support.
pub struct OpenAiProvider {
    client: Client,
    api: ApiConfig,
    analysis: AnalysisConfig,
}

impl OpenAiProvider {
    pub fn new(api: ApiConfig, analysis: AnalysisConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(api.timeout()).build()?;
        Ok(Self {
            client,
            api,
            analysis,
        })
    }

    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        context: &str,
    ) -> Result<String, LlmError> {
        if self.api.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let url = self.api.completions_url();
        let request = ChatRequest {
            model: &self.api.model,
            messages: &messages,
            temperature: self.analysis.temperature,
            max_tokens: self.analysis.max_tokens,
        };
        let response = send_with_retry(
            &self.client,
            |c| c.post(&url).bearer_auth(&self.api.api_key).json(&request),
            self.analysis.http_retries,
            context,
        )
        .await?;

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|v| v.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("reply has no message content".into()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    #[instrument(skip_all, fields(frames = frames.len()))]
    async fn transcribe(
        &self,
        frames: Vec<Vec<u8>>,
        duration_secs: f64,
        samples: Vec<WindowSample>,
    ) -> Result<Vec<ObservationEntity>, LlmError> {
        if frames.is_empty() {
            debug!("No frames to transcribe");
            return Ok(vec![]);
        }

        let window_info = window_info_text(&samples, duration_secs);
        let mut parts = vec![ContentPart::Text {
            text: transcribe_text(duration_secs, frames.len(), &window_info),
        }];
        parts.extend(frames.iter().map(|frame| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/jpeg;base64,{}", STANDARD.encode(frame)),
                detail: "low",
            },
        }));

        let messages = vec![
            ChatMessage::system(TRANSCRIBE_SYSTEM_PROMPT),
            ChatMessage::user(MessageContent::Parts(parts)),
        ];
        let reply = self.chat_completion(messages, "transcribe").await?;
        let observations = parse_observations(&reply, duration_secs);
        debug!("Got {} observations", observations.len());
        Ok(observations)
    }

    #[instrument(skip_all, fields(observations = observations.len()))]
    async fn generate_cards(
        &self,
        observations: Vec<ObservationEntity>,
        context_cards: Vec<ActivityCardEntity>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityCardEntity>, LlmError> {
        if observations.is_empty() {
            return Ok(vec![]);
        }

        let text = cards_text(&observations, start, &context_cards, self.analysis.context_cards);
        let messages = vec![
            ChatMessage::system(GENERATE_CARDS_SYSTEM_PROMPT),
            ChatMessage::user(MessageContent::Text(text)),
        ];
        let reply = self.chat_completion(messages, "generate cards").await?;
        let cards = parse_cards(&reply, start, end);
        debug!("Got {} cards", cards.len());
        Ok(cards)
    }

    async fn test_connection(&self) -> Result<String, LlmError> {
        let messages = vec![ChatMessage::user(MessageContent::Text(TEST_PROMPT.into()))];
        let reply = self.chat_completion(messages, "connection test").await?;
        let reply: String = reply.chars().take(TEST_REPLY_LENGTH).collect();
        info!("Connection test succeeded");
        Ok(format!("Connected, model: {}\nReply: {reply}", self.api.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_parts_use_openai_layout() {
        let message = ChatMessage::user(MessageContent::Parts(vec![
            ContentPart::Text { text: "hi".into() },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/jpeg;base64,AAAA".into(),
                    detail: "low",
                },
            },
        ]));

        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "hi"},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA", "detail": "low"}}
                ]
            })
        );
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let api = ApiConfig {
            base_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        };
        let provider = OpenAiProvider::new(api, AnalysisConfig::default()).unwrap();

        let result = provider.test_connection().await;

        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    #[tokio::test]
    async fn empty_inputs_skip_the_api() {
        let provider = OpenAiProvider::new(ApiConfig::default(), AnalysisConfig::default()).unwrap();

        assert!(provider.transcribe(vec![], 60., vec![]).await.unwrap().is_empty());
        let now = Utc::now();
        assert!(provider
            .generate_cards(vec![], vec![], now, now)
            .await
            .unwrap()
            .is_empty());
    }
}
