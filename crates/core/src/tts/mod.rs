mod download;
mod voicevox;

use crate::config::ApiKey;
use futures::future::BoxFuture;
use std::time::Duration;

pub use download::{download_audio, fetch_audio, save_audio};
pub use voicevox::{
    HttpSynthesisTransport, SynthesisReply, SynthesisTransport, VoicevoxTtsClient,
    DEFAULT_SYNTHESIS_ENDPOINT,
};

/// One query against the synthesis service. Retransmitted unchanged on retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub speaker_id: u32,
    pub api_key: Option<ApiKey>,
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("synthesis request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("synthesis service error: {0}")]
    Service(String),
    #[error("synthesis still rate limited after {retries} retries ({waited:?} waited)")]
    RateLimitExceeded { retries: u32, waited: Duration },
    #[error("invalid synthesis endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("failed to write audio: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns text into a URL of remotely hosted, streamable audio.
pub trait TtsClient: Send + Sync {
    fn synthesize(&self, text: String) -> BoxFuture<'_, Result<String, TtsError>>;
}
