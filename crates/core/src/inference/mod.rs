mod openai;

use crate::conversation::ConversationUnit;
use futures::future::BoxFuture;

pub use openai::OpenAiInferenceClient;

#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    #[error("completion request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("completion service error: {0}")]
    Api(String),
    #[error("malformed completion response: {0}")]
    InvalidResponse(String),
}

/// Produces the assistant's next line for a conversation.
///
/// Implementations must not assume anything about who owns the context; the
/// caller appends the reply itself.
pub trait InferenceClient: Send + Sync {
    fn infer(&self, context: Vec<ConversationUnit>) -> BoxFuture<'_, Result<String, InferenceError>>;
}
