mod session;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use session::{ConversationSession, TurnGuard};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    /// `.mp3` files are mp3, everything else is treated as wav.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("mp3") => AudioFormat::Mp3,
            _ => AudioFormat::Wav,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported audio format: {0}")]
pub struct UnsupportedFormat(pub String);

impl FromStr for AudioFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(UnsupportedFormat(other.to_owned())),
        }
    }
}

/// Recorded user speech, stored base64-encoded so the whole history can be
/// resent every turn without re-encoding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAudioUnit {
    data: String,
    format: AudioFormat,
    byte_len: usize,
}

impl UserAudioUnit {
    pub fn from_bytes(audio: &[u8], format: AudioFormat) -> Self {
        Self {
            data: STANDARD.encode(audio),
            format,
            byte_len: audio.len(),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let audio = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(&audio, AudioFormat::from_path(path)))
    }

    /// Base64 payload as sent to the completion service.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Size of the raw audio before encoding.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssistantTextUnit {
    text: String,
}

impl AssistantTextUnit {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationUnit {
    UserAudio(UserAudioUnit),
    AssistantText(AssistantTextUnit),
}

impl ConversationUnit {
    pub fn is_user(&self) -> bool {
        matches!(self, ConversationUnit::UserAudio(_))
    }
}

impl From<UserAudioUnit> for ConversationUnit {
    fn from(unit: UserAudioUnit) -> Self {
        ConversationUnit::UserAudio(unit)
    }
}

impl From<AssistantTextUnit> for ConversationUnit {
    fn from(unit: AssistantTextUnit) -> Self {
        ConversationUnit::AssistantText(unit)
    }
}

impl fmt::Display for ConversationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationUnit::UserAudio(a) => {
                write!(f, "[audio {}, {} bytes]", a.format(), a.byte_len())
            }
            ConversationUnit::AssistantText(t) => f.write_str(t.text()),
        }
    }
}
