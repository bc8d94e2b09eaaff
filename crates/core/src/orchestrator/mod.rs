use crate::config::AppConfig;
use crate::conversation::{AssistantTextUnit, AudioFormat, ConversationSession, UserAudioUnit};
use crate::inference::{InferenceClient, InferenceError};
use crate::tts::{TtsClient, TtsError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

const LOG_TARGET: &str = "orchestrator";

/// Where a session's current (or last) turn stands.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingInference,
    AwaitingSynthesis,
    Complete,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnOutput {
    pub reply_text: String,
    pub audio_url: String,
}

#[derive(thiserror::Error, Debug)]
pub enum TurnError {
    #[error("a turn is already in progress for session {0}")]
    TurnInProgress(String),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Synthesis(#[from] TtsError),
    #[error("background worker failed: {0}")]
    Worker(String),
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub workers: usize,
}

impl OrchestratorConfig {
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            workers: app.worker_pool_size,
        }
    }
}

/// Runs voice turns: user audio in, assistant text and audio URL out.
///
/// Remote calls run on spawned tasks, gated by a shared worker pool, and the
/// turn waits on each before moving on. Sessions are passed in per call; the
/// orchestrator keeps no conversation state itself.
pub struct Orchestrator<I, S> {
    inference: Arc<I>,
    tts: Arc<S>,
    workers: Arc<Semaphore>,
}

impl<I, S> Orchestrator<I, S>
where
    I: InferenceClient + 'static,
    S: TtsClient + 'static,
{
    pub fn new(inference: I, tts: S, config: OrchestratorConfig) -> Self {
        Self {
            inference: Arc::new(inference),
            tts: Arc::new(tts),
            workers: Arc::new(Semaphore::new(config.workers.max(1))),
        }
    }

    /// Runs one turn against `session`.
    ///
    /// Fails with [`TurnError::TurnInProgress`] without touching the session
    /// if another turn holds it. A failed inference also removes the turn's
    /// user unit, leaving the session as it was; a failed synthesis keeps both
    /// units so the conversation can go on without playback.
    pub async fn process_turn(
        &self,
        session: &ConversationSession,
        audio: &[u8],
        format: AudioFormat,
    ) -> Result<TurnOutput, TurnError> {
        let turn = session
            .try_begin_turn()
            .ok_or_else(|| TurnError::TurnInProgress(session.id().to_string()))?;

        let base = session.len().await;
        session.append(UserAudioUnit::from_bytes(audio, format)).await;
        turn.set_phase(TurnPhase::AwaitingInference);
        tracing::info!(target: LOG_TARGET, session = %session.id(), %format, bytes = audio.len(), "turn started");

        let result = self.respond(session, base, |phase| turn.set_phase(phase)).await;

        match &result {
            Ok(_) => {
                turn.set_phase(TurnPhase::Complete);
                tracing::info!(target: LOG_TARGET, session = %session.id(), "turn complete");
            }
            Err(e) => {
                turn.set_phase(TurnPhase::Failed);
                tracing::warn!(target: LOG_TARGET, session = %session.id(), error = %e, "turn failed");
            }
        }
        result
    }

    async fn respond(
        &self,
        session: &ConversationSession,
        base: usize,
        set_phase: impl Fn(TurnPhase),
    ) -> Result<TurnOutput, TurnError> {
        let context = session.snapshot().await;
        let inference = Arc::clone(&self.inference);
        let reply_text = match self
            .on_worker(async move { inference.infer(context).await })
            .await
            .and_then(|reply| reply.map_err(TurnError::from))
        {
            Ok(text) => text,
            Err(e) => {
                session.truncate(base).await;
                return Err(e);
            }
        };

        session.append(AssistantTextUnit::new(reply_text.clone())).await;
        set_phase(TurnPhase::AwaitingSynthesis);

        let audio_url = {
            let tts = Arc::clone(&self.tts);
            let text = reply_text.clone();
            self.on_worker(async move { tts.synthesize(text).await })
                .await??
        };

        Ok(TurnOutput {
            reply_text,
            audio_url,
        })
    }

    async fn on_worker<F, T>(&self, work: F) -> Result<T, TurnError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| TurnError::Worker("worker pool closed".to_string()))?;

        tokio::spawn(async move {
            let _permit = permit;
            work.await
        })
        .await
        .map_err(|e| TurnError::Worker(e.to_string()))
    }
}
