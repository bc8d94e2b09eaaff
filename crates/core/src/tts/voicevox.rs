use crate::config::{ApiKey, SynthesisConfig};
use crate::tts::{SynthesisRequest, TtsClient, TtsError};
use crate::util::retry::RetryPolicy;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

const LOG_TARGET: &str = "tts::voicevox";
pub const DEFAULT_SYNTHESIS_ENDPOINT: &str = "https://api.tts.quest/v3/voicevox/synthesis";

/// Body returned by the synthesis service. Exactly one field is expected to
/// be present; anything else the service sends is ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisReply {
    pub retry_after: Option<f64>,
    pub mp3_streaming_url: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, PartialEq)]
enum ReplyOutcome {
    RetryAfter(f64),
    Ready(String),
    Failed(String),
    Unexpected,
}

fn classify(reply: SynthesisReply) -> ReplyOutcome {
    if let Some(secs) = reply.retry_after {
        return ReplyOutcome::RetryAfter(secs);
    }
    if let Some(url) = reply.mp3_streaming_url {
        return ReplyOutcome::Ready(url);
    }
    if let Some(message) = reply.error_message {
        return ReplyOutcome::Failed(message);
    }
    ReplyOutcome::Unexpected
}

/// Sends one synthesis query and decodes the reply. Transport-level failures
/// are returned as errors and never retried by the caller.
pub trait SynthesisTransport: Send + Sync {
    fn fetch(&self, request: SynthesisRequest) -> BoxFuture<'_, Result<SynthesisReply, TtsError>>;
}

#[derive(Clone)]
pub struct HttpSynthesisTransport {
    client: Client,
    endpoint: Url,
}

impl HttpSynthesisTransport {
    pub fn new(endpoint: &str) -> Result<Self, TtsError> {
        Ok(Self {
            client: Client::new(),
            endpoint: Url::parse(endpoint)?,
        })
    }

    fn request_url(&self, request: &SynthesisRequest) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("speaker", &request.speaker_id.to_string())
                .append_pair("text", &request.text);
            if let Some(key) = &request.api_key {
                query.append_pair("key", key.expose());
            }
        }
        url
    }
}

impl SynthesisTransport for HttpSynthesisTransport {
    fn fetch(&self, request: SynthesisRequest) -> BoxFuture<'_, Result<SynthesisReply, TtsError>> {
        async move {
            let url = self.request_url(&request);
            let reply = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<SynthesisReply>()
                .await?;
            Ok(reply)
        }
        .boxed()
    }
}

/// Client for the VOICEVOX synthesis service hosted by tts.quest.
///
/// The service throttles free callers by answering with `retryAfter`; those
/// answers are waited out according to the [`RetryPolicy`], every other
/// answer ends the call.
#[derive(Clone)]
pub struct VoicevoxTtsClient<T = HttpSynthesisTransport> {
    transport: T,
    speaker_id: u32,
    api_key: Option<ApiKey>,
    retry: RetryPolicy,
}

impl VoicevoxTtsClient<HttpSynthesisTransport> {
    pub fn new(config: &SynthesisConfig, api_key: Option<ApiKey>) -> Result<Self, TtsError> {
        let transport = HttpSynthesisTransport::new(DEFAULT_SYNTHESIS_ENDPOINT)?;
        Ok(Self::with_transport(transport, config, api_key))
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, TtsError> {
        self.transport = HttpSynthesisTransport::new(endpoint)?;
        Ok(self)
    }
}

impl<T: SynthesisTransport> VoicevoxTtsClient<T> {
    pub fn with_transport(transport: T, config: &SynthesisConfig, api_key: Option<ApiKey>) -> Self {
        Self {
            transport,
            speaker_id: config.speaker_id,
            api_key,
            retry: config.retry.clone(),
        }
    }

    fn request_for(&self, text: String) -> SynthesisRequest {
        SynthesisRequest {
            text,
            speaker_id: self.speaker_id,
            api_key: self.api_key.clone(),
        }
    }
}

impl<T: SynthesisTransport> TtsClient for VoicevoxTtsClient<T> {
    fn synthesize(&self, text: String) -> BoxFuture<'_, Result<String, TtsError>> {
        async move {
            let request = self.request_for(text);
            let mut budget = self.retry.budget();

            loop {
                let reply = self.transport.fetch(request.clone()).await?;
                match classify(reply) {
                    ReplyOutcome::RetryAfter(secs) => match budget.next_delay(secs) {
                        Some(delay) => {
                            tracing::warn!(
                                target: LOG_TARGET,
                                retry_after_secs = secs,
                                attempt = budget.retries(),
                                "rate limited, waiting {:?}",
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(
                                target: LOG_TARGET,
                                retries = budget.retries(),
                                "giving up on rate-limited synthesis"
                            );
                            return Err(TtsError::RateLimitExceeded {
                                retries: budget.retries(),
                                waited: budget.waited(),
                            });
                        }
                    },
                    ReplyOutcome::Ready(url) => {
                        tracing::debug!(target: LOG_TARGET, %url, "synthesis ready");
                        return Ok(url);
                    }
                    ReplyOutcome::Failed(message) => return Err(TtsError::Service(message)),
                    ReplyOutcome::Unexpected => {
                        return Err(TtsError::Service("unexpected response shape".to_string()))
                    }
                }
            }
        }
        .boxed()
    }
}
