use crate::config::{ApiKey, InferenceConfig};
use crate::conversation::ConversationUnit;
use crate::inference::{InferenceClient, InferenceError};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "inference::openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAiInferenceClient {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
    instruction: String,
}

impl OpenAiInferenceClient {
    pub fn new(api_key: ApiKey, config: &InferenceConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: config.model.clone(),
            instruction: config.persona.instruction(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    modalities: [&'a str; 1],
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatMessage<'a> {
    Developer { content: &'a str },
    User { content: Vec<ContentPart<'a>> },
    Assistant { content: &'a str },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    InputAudio { input_audio: InputAudio<'a> },
}

#[derive(Serialize)]
struct InputAudio<'a> {
    data: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn build_request<'a>(
    model: &'a str,
    instruction: &'a str,
    context: &'a [ConversationUnit],
) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(context.len() + 1);
    messages.push(ChatMessage::Developer {
        content: instruction,
    });
    messages.extend(context.iter().map(|unit| match unit {
        ConversationUnit::UserAudio(audio) => ChatMessage::User {
            content: vec![ContentPart::InputAudio {
                input_audio: InputAudio {
                    data: audio.data(),
                    format: audio.format().as_str(),
                },
            }],
        },
        ConversationUnit::AssistantText(text) => ChatMessage::Assistant {
            content: text.text(),
        },
    }));

    ChatRequest {
        model,
        modalities: ["text"],
        messages,
    }
}

fn extract_reply(response: ChatResponse) -> Result<String, InferenceError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::InvalidResponse("no completions in response".to_string()))?;

    choice
        .message
        .content
        .ok_or_else(|| InferenceError::InvalidResponse("completion has no text content".to_string()))
}

fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("HTTP {}: {}", status, envelope.error.message),
        Err(_) => format!("HTTP {}: {}", status, body),
    }
}

impl InferenceClient for OpenAiInferenceClient {
    fn infer(&self, context: Vec<ConversationUnit>) -> BoxFuture<'_, Result<String, InferenceError>> {
        let this = self.clone();
        async move {
            let request = build_request(&this.model, &this.instruction, &context);
            let url = format!("{}/chat/completions", this.base_url);

            tracing::debug!(
                target: LOG_TARGET,
                model = %this.model,
                units = context.len(),
                "requesting completion"
            );

            let response = this
                .client
                .post(&url)
                .bearer_auth(this.api_key.expose())
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(InferenceError::Api(api_error_message(status, &body)));
            }

            let body = response.bytes().await?;
            let parsed: ChatResponse = serde_json::from_slice(&body).map_err(|e| {
                InferenceError::InvalidResponse(format!("Failed to parse JSON: {}", e))
            })?;

            let reply = extract_reply(parsed)?;
            tracing::debug!(target: LOG_TARGET, chars = reply.chars().count(), "completion received");
            Ok(reply)
        }
        .boxed()
    }
}
