use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use jiro_gateway::conversation::Orchestrator;
use jiro_gateway::notify::{NoticeLevel, NoticeSender};
use jiro_gateway::relay::{RelayClient, RelayServer, RelayState};
use jiro_gateway::voice::{
    HttpSynthesisEngine, RecognitionEngine, SpeechCapture, SpeechPlayback, SynthesisEngine,
    TranscriptionEngine, Utterance, UtteranceParams, select_voice,
};
use jiro_gateway::{Config, Role, config, llm, prompt};

/// Jiro - voice-enabled chat assistant gateway
#[derive(Parser)]
#[command(name = "jiro", version, about)]
struct Cli {
    /// Port the relay listens on (overrides config)
    #[arg(long, env = "JIRO_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (for hosts without audio hardware)
    #[arg(long, env = "JIRO_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive console chat session against a running relay
    Chat {
        /// Relay chat endpoint URL (defaults to the local relay)
        #[arg(long)]
        relay_url: Option<String>,
    },
    /// Speak a text through the synthesis engine
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Run one listening session and print the transcript
    Listen,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,jiro_gateway=info",
        1 => "info,jiro_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let port = cli.port.unwrap_or(config.relay.port);

    match cli.command {
        None => serve(&config, port).await,
        Some(Command::Chat { relay_url }) => {
            let url = relay_url.unwrap_or_else(|| RelayClient::local_url(port));
            chat(&config, &url, cli.disable_voice).await
        }
        Some(Command::Say { text }) => say(&config, &text).await,
        Some(Command::Listen) => listen(&config).await,
    }
}

/// Run the relay server
async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    if config::api_credential().is_none() {
        tracing::warn!(
            var = config::CREDENTIAL_VAR,
            "no API credential configured - chat requests will fail until it is set"
        );
    }

    let system_prompt = prompt::build_system_prompt(&config.persona);
    let completion = llm::CompletionClient::new(&config.relay);
    let state = RelayState::new(completion, system_prompt);

    tracing::info!(persona = %config.persona.name, port, "starting relay");

    RelayServer::new(state, port).run().await?;
    Ok(())
}

/// Interactive console conversation
async fn chat(config: &Config, relay_url: &str, disable_voice: bool) -> anyhow::Result<()> {
    let (notices, mut notice_rx) = NoticeSender::channel();

    // Print notices as they arrive, like transient toasts
    tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            match notice.level {
                NoticeLevel::Info => println!("  · {}", notice.text),
                NoticeLevel::Error => eprintln!("  ! {}", notice.text),
            }
        }
    });

    let credential = config::api_credential();
    let (recognition, synthesis) = if disable_voice {
        (None, None)
    } else if let Some(credential) = credential {
        let recognition: Arc<dyn RecognitionEngine> =
            Arc::new(TranscriptionEngine::new(credential.clone(), &config.voice));
        let synthesis: Arc<dyn SynthesisEngine> =
            Arc::new(HttpSynthesisEngine::new(credential, &config.voice));
        (Some(recognition), Some(synthesis))
    } else {
        tracing::warn!("no API credential - voice engines unavailable");
        (None, None)
    };

    let capture = SpeechCapture::new(recognition, notices.clone());
    let playback = SpeechPlayback::new(synthesis, notices.clone());
    let relay: Arc<dyn jiro_gateway::RelayApi> = Arc::new(RelayClient::new(relay_url));

    let orchestrator = Orchestrator::new(
        &config.persona,
        config.voice.output_enabled,
        relay,
        capture,
        playback,
        notices,
    );

    let name = config.persona.name.clone();
    println!("{name}: {}", config.persona.greeting);
    println!("  (type a message, /mic to toggle voice input, /voice to toggle voice output, /quit to exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "/quit" | "/exit" => break,
            "/voice" => {
                orchestrator.toggle_voice_output();
                let state = if orchestrator.voice_output_enabled() {
                    "on"
                } else {
                    "off"
                };
                println!("  · voice output {state}");
            }
            "/mic" => {
                let before = orchestrator.messages().len();
                if orchestrator.capture().is_listening() {
                    // Stop early; a finalized transcript is sent right away
                    orchestrator.toggle_voice_input().await;
                } else {
                    orchestrator.toggle_voice_input().await;
                    // Wait for the session to finalize, then hand off
                    while orchestrator.capture().is_listening() {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    let transcript = orchestrator.capture().transcript();
                    if !transcript.trim().is_empty() {
                        println!("you: {transcript}");
                        orchestrator.send_message(&transcript).await;
                    }
                }
                print_new_replies(&orchestrator, &name, before);
            }
            text => {
                let before = orchestrator.messages().len();
                orchestrator.send_message(text).await;
                print_new_replies(&orchestrator, &name, before);
            }
        }
    }

    Ok(())
}

/// Print assistant turns appended since `before`
fn print_new_replies(orchestrator: &Orchestrator, name: &str, before: usize) {
    for message in orchestrator.messages().iter().skip(before) {
        if message.role == Role::Assistant {
            println!("{name}: {}", message.content);
        }
    }
}

/// Speak one text through the synthesis engine
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let credential = config::require_api_credential()?;
    let engine = HttpSynthesisEngine::new(credential, &config.voice);

    let utterance = Utterance {
        id: uuid::Uuid::new_v4(),
        text: text.to_string(),
        voice: select_voice(&engine.voices(), text),
        params: UtteranceParams::default(),
    };

    println!("Speaking: \"{text}\"");
    engine.speak(&utterance).await?;
    println!("Done.");

    Ok(())
}

/// Run one listening session and print the transcript
async fn listen(config: &Config) -> anyhow::Result<()> {
    let credential = config::require_api_credential()?;
    let (notices, mut notice_rx) = NoticeSender::channel();

    tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            println!("  · {}", notice.text);
        }
    });

    let engine: Arc<dyn RecognitionEngine> =
        Arc::new(TranscriptionEngine::new(credential, &config.voice));
    let capture = SpeechCapture::new(Some(engine), notices);

    capture.start().await;
    while capture.is_listening() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let transcript = capture.transcript();
    if transcript.is_empty() {
        println!("No transcript.");
    } else {
        println!("Transcript: {transcript}");
    }

    Ok(())
}
