#![deny(warnings)]

mod dedup;

use anyhow::Context;
use clap::Parser;
use dedup::SubmissionFilter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use voice_chat_core::config::{
    resolve_api_key, resolve_string_with_default, worker_pool_size, ApiKeys, AppConfig, Env,
    InferenceConfig, Persona, StdEnv, SynthesisConfig, DEFAULT_CHARACTER, DEFAULT_MODEL,
    DEFAULT_RESPONSE_FORMAT, DEFAULT_SPEAKER_ID, DEFAULT_WORKER_POOL_SIZE, ENV_MODEL,
    ENV_OPENAI_API_KEY, ENV_TTS_QUEST_API_KEY,
};
use voice_chat_core::conversation::{AudioFormat, ConversationSession};
use voice_chat_core::inference::OpenAiInferenceClient;
use voice_chat_core::orchestrator::{Orchestrator, OrchestratorConfig};
#[cfg(feature = "playback")]
use voice_chat_core::playback::{AudioPlaybackSink, PlaybackSink};
use voice_chat_core::tts::{download_audio, VoicevoxTtsClient};
#[cfg(feature = "playback")]
use voice_chat_core::tts::{fetch_audio, save_audio};
use voice_chat_core::util::{
    RetryPolicy, DEFAULT_MAX_RATE_LIMIT_RETRIES, DEFAULT_MAX_RATE_LIMIT_WAIT_SECS,
};

type VoiceChat = Orchestrator<OpenAiInferenceClient, VoicevoxTtsClient>;

#[derive(Parser, Debug)]
#[command(name = "voice-chat")]
#[command(about = "Talk to an in-character assistant: audio in, text and synthesized speech out")]
struct Args {
    /// Audio files to send, one turn each. Reads paths from stdin when empty.
    audio: Vec<PathBuf>,

    #[arg(long)]
    openai_api_key: Option<String>,

    #[arg(long)]
    tts_quest_api_key: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long, default_value_t = DEFAULT_SPEAKER_ID)]
    speaker_id: u32,

    #[arg(long, default_value = DEFAULT_CHARACTER)]
    character: String,

    #[arg(long, default_value = DEFAULT_RESPONSE_FORMAT)]
    response_format: String,

    #[arg(long, default_value_t = DEFAULT_MAX_RATE_LIMIT_RETRIES)]
    max_rate_limit_retries: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_RATE_LIMIT_WAIT_SECS)]
    max_rate_limit_wait_secs: u64,

    #[arg(long, default_value_t = DEFAULT_WORKER_POOL_SIZE)]
    workers: usize,

    /// Save each reply's audio here as turn-<n>.mp3
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Play each reply on the default output device. If playback fails the
    /// audio is saved instead (to --download-dir, or the current directory).
    #[cfg(feature = "playback")]
    #[arg(long)]
    play: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let files = args.audio.clone();
    let download_dir = args.download_dir.clone();
    #[cfg(feature = "playback")]
    let play = args.play;
    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::info!(
        model = %cfg.inference.model,
        speaker_id = cfg.synthesis.speaker_id,
        workers = cfg.worker_pool_size,
        "config loaded"
    );

    let chat = build_orchestrator(&cfg)?;
    let mut repl = Repl {
        chat,
        session: ConversationSession::new("cli"),
        filter: SubmissionFilter::default(),
        download_dir,
        #[cfg(feature = "playback")]
        player: play.then(AudioPlaybackSink::new),
        turns: 0,
    };

    if files.is_empty() {
        repl.run_stdin().await
    } else {
        for path in &files {
            repl.submit(path).await?;
        }
        Ok(())
    }
}

fn build_orchestrator(cfg: &AppConfig) -> anyhow::Result<VoiceChat> {
    let inference = OpenAiInferenceClient::new(cfg.openai_key()?.clone(), &cfg.inference);
    let tts = VoicevoxTtsClient::new(&cfg.synthesis, cfg.api_keys.tts_quest.clone())?;
    Ok(Orchestrator::new(
        inference,
        tts,
        OrchestratorConfig::from_app(cfg),
    ))
}

struct Repl {
    chat: VoiceChat,
    session: ConversationSession,
    filter: SubmissionFilter,
    download_dir: Option<PathBuf>,
    #[cfg(feature = "playback")]
    player: Option<AudioPlaybackSink>,
    turns: usize,
}

impl Repl {
    async fn run_stdin(&mut self) -> anyhow::Result<()> {
        println!("Enter an audio file path to talk, or :history, :clear, :quit");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
            match line.trim() {
                "" => continue,
                ":quit" | ":q" => break,
                ":clear" => {
                    self.session.clear().await;
                    self.filter.reset();
                    println!("(conversation cleared)");
                }
                ":history" => self.print_history().await,
                path => {
                    if let Err(e) = self.submit(Path::new(path)).await {
                        eprintln!("error: {e:#}");
                    }
                }
            }
        }
        Ok(())
    }

    async fn submit(&mut self, path: &Path) -> anyhow::Result<()> {
        let audio = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        if !self.filter.accept(&audio) {
            tracing::info!(path = %path.display(), "same audio as last turn, skipping");
            return Ok(());
        }

        let format = AudioFormat::from_path(path);
        let out = self.chat.process_turn(&self.session, &audio, format).await?;
        self.turns += 1;

        println!("{}", out.reply_text);
        println!("audio: {}", out.audio_url);

        #[cfg(feature = "playback")]
        if let Some(player) = &self.player {
            return self.play_reply(player, &out.audio_url).await;
        }

        if let Some(dir) = &self.download_dir {
            let target = turn_audio_path(dir, self.turns);
            download_audio(&out.audio_url, &target)
                .await
                .with_context(|| format!("failed to save audio to {}", target.display()))?;
        }
        Ok(())
    }

    #[cfg(feature = "playback")]
    async fn play_reply(&self, player: &AudioPlaybackSink, url: &str) -> anyhow::Result<()> {
        let audio = fetch_audio(url)
            .await
            .context("failed to fetch reply audio")?;

        let saved = match &self.download_dir {
            Some(dir) => {
                let target = turn_audio_path(dir, self.turns);
                save_audio(&audio, &target)
                    .await
                    .with_context(|| format!("failed to save audio to {}", target.display()))?;
                true
            }
            None => false,
        };

        if let Err(e) = player.play(audio.clone()).await {
            tracing::warn!(error = %e, "playback failed");
            if !saved {
                let target = turn_audio_path(Path::new("."), self.turns);
                save_audio(&audio, &target)
                    .await
                    .with_context(|| format!("failed to save audio to {}", target.display()))?;
                println!("(playback failed, audio saved to {})", target.display());
            }
        }
        Ok(())
    }

    async fn print_history(&self) {
        let units = self.session.snapshot().await;
        if units.is_empty() {
            println!("(no messages yet)");
        }
        for unit in units {
            let speaker = if unit.is_user() { "you" } else { "ai" };
            println!("{speaker}: {unit}");
        }
    }
}

fn turn_audio_path(dir: &Path, turn: usize) -> PathBuf {
    dir.join(format!("turn-{turn}.mp3"))
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let openai = resolve_api_key(args.openai_api_key, ENV_OPENAI_API_KEY, env)?;
    let tts_quest = resolve_api_key(args.tts_quest_api_key, ENV_TTS_QUEST_API_KEY, env)?;

    let inference = InferenceConfig {
        model: resolve_string_with_default(args.model, ENV_MODEL, env, DEFAULT_MODEL),
        persona: Persona::new(args.character, args.response_format)?,
    };

    let synthesis = SynthesisConfig {
        speaker_id: args.speaker_id,
        retry: RetryPolicy::new(
            args.max_rate_limit_retries,
            Duration::from_secs(args.max_rate_limit_wait_secs),
        ),
    };

    Ok(AppConfig {
        api_keys: ApiKeys { openai, tts_quest },
        inference,
        synthesis,
        worker_pool_size: worker_pool_size(args.workers)?,
    })
}
