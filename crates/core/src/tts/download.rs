use crate::tts::TtsError;
use std::path::Path;

/// Fetches synthesized audio from its streaming URL.
pub async fn fetch_audio(url: &str) -> Result<Vec<u8>, TtsError> {
    let audio = reqwest::get(url).await?.error_for_status()?.bytes().await?;
    tracing::debug!(bytes = audio.len(), "audio fetched");
    Ok(audio.to_vec())
}

pub async fn save_audio(audio: &[u8], path: &Path) -> Result<(), TtsError> {
    tokio::fs::write(path, audio).await?;
    tracing::info!(path = %path.display(), bytes = audio.len(), "audio saved");
    Ok(())
}

/// Fetches synthesized audio from its streaming URL and writes it to `path`.
/// Returns the number of bytes written.
pub async fn download_audio(url: &str, path: &Path) -> Result<usize, TtsError> {
    let audio = fetch_audio(url).await?;
    save_audio(&audio, path).await?;
    Ok(audio.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;

    #[tokio::test]
    async fn download_writes_streamed_bytes() {
        let server = StubServer::start(vec![(200, "ID3-fake-mp3")]).await;
        let path = std::env::temp_dir().join(format!("voice-chat-dl-{}.mp3", std::process::id()));

        let written = download_audio(&server.url("/audio/1.mp3"), &path)
            .await
            .expect("download");

        assert_eq!(written, 12);
        assert_eq!(tokio::fs::read(&path).await.expect("saved file"), b"ID3-fake-mp3");
        assert!(server.requests()[0].starts_with("GET /audio/1.mp3 "));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn missing_audio_is_a_network_error() {
        let server = StubServer::start(vec![(404, "")]).await;
        let err = fetch_audio(&server.url("/gone.mp3")).await.unwrap_err();
        assert!(matches!(err, TtsError::Network(_)));
    }
}
