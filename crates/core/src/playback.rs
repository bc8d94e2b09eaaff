//! Local playback of synthesized replies through the default output device.

use futures::future::BoxFuture;
use futures::FutureExt;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use std::io::Cursor;

const LOG_TARGET: &str = "playback";

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("audio output unavailable: {details}")]
    AudioOutputUnavailable { details: String },

    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error("playback task failed: {0}")]
    Task(String),
}

/// Plays one encoded clip to the end.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, audio: Vec<u8>) -> BoxFuture<'_, Result<(), PlaybackError>>;
}

/// Decodes mp3/wav bytes and plays them on the default output device.
///
/// The output stream is opened per clip and playback blocks a worker thread
/// until the clip ends, so turns never overlap their audio.
#[derive(Clone, Default)]
pub struct AudioPlaybackSink;

impl AudioPlaybackSink {
    pub fn new() -> Self {
        Self
    }
}

impl PlaybackSink for AudioPlaybackSink {
    fn play(&self, audio: Vec<u8>) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            tokio::task::spawn_blocking(move || play_blocking(audio))
                .await
                .map_err(|e| PlaybackError::Task(e.to_string()))?
        }
        .boxed()
    }
}

fn play_blocking(audio: Vec<u8>) -> Result<(), PlaybackError> {
    let bytes = audio.len();
    // Decode before touching the device so bad payloads fail the same way everywhere.
    let source = Decoder::new(Cursor::new(audio)).map_err(|e| PlaybackError::Decode(e.to_string()))?;

    let stream = OutputStreamBuilder::open_default_stream().map_err(|e| {
        PlaybackError::AudioOutputUnavailable {
            details: format!("open default output stream: {e}"),
        }
    })?;
    let mixer = stream.mixer();
    let sink = Sink::connect_new(&mixer);

    tracing::debug!(target: LOG_TARGET, bytes, "playing reply audio");
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}
