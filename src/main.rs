use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agri_voice::audio::{AudioBackendConfig, InputBackend, OutputBackend};
#[cfg(feature = "native-audio")]
use agri_voice::audio::{CpalInput, CpalOutput};
use agri_voice::config::DEFAULT_CONFIG_PATH;
use agri_voice::context::{ContextStore, FixedGeolocation, StaticContextProvider};
use agri_voice::session::{spawn_session, Role, SessionHandle, SessionState, Utterance};
use agri_voice::{
    create_router, AppState, Config, Language, NatsTransport, SharedContext, VoiceSession,
    WavFileInput, WavRecorderOutput,
};

/// Agri Voice - live voice mentor for farmers
#[derive(Parser)]
#[command(name = "agri-voice", version, about)]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control surface
    Serve {
        #[command(flatten)]
        devices: DeviceArgs,
    },
    /// Hold one voice session in the terminal until Ctrl-C
    Call {
        #[command(flatten)]
        devices: DeviceArgs,

        /// Conversation language code (en, hi, te, kn, ta, ml)
        #[arg(short, long)]
        language: Option<String>,
    },
}

#[derive(Args)]
struct DeviceArgs {
    /// WAV file streamed as the microphone (default: system microphone)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// WAV file recording the assistant's speech (default: system speaker)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn input_device(
    path: Option<&PathBuf>,
    config: AudioBackendConfig,
) -> Result<Box<dyn InputBackend>> {
    match path {
        Some(path) => {
            info!("Microphone: {}", path.display());
            Ok(Box::new(WavFileInput::new(path, config)))
        }
        None => system_input(config),
    }
}

fn output_device(
    path: Option<&PathBuf>,
    config: AudioBackendConfig,
) -> Result<Box<dyn OutputBackend>> {
    match path {
        Some(path) => {
            info!("Playback recording: {}", path.display());
            Ok(Box::new(WavRecorderOutput::from_config(path, &config)))
        }
        None => system_output(config),
    }
}

#[cfg(feature = "native-audio")]
fn system_input(config: AudioBackendConfig) -> Result<Box<dyn InputBackend>> {
    info!("Microphone: system default");
    Ok(Box::new(CpalInput::new(config)))
}

#[cfg(feature = "native-audio")]
fn system_output(config: AudioBackendConfig) -> Result<Box<dyn OutputBackend>> {
    info!("Speaker: system default");
    Ok(Box::new(CpalOutput::new(config)))
}

#[cfg(not(feature = "native-audio"))]
fn system_input(_config: AudioBackendConfig) -> Result<Box<dyn InputBackend>> {
    anyhow::bail!("No --input given and built without the native-audio feature")
}

#[cfg(not(feature = "native-audio"))]
fn system_output(_config: AudioBackendConfig) -> Result<Box<dyn OutputBackend>> {
    anyhow::bail!("No --output given and built without the native-audio feature")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    info!("Agri Voice v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", config.service.name);

    match cli.command {
        Command::Serve { devices } => serve(config, devices).await,
        Command::Call { devices, language } => call(config, devices, language).await,
    }
}

/// Wire the session actor to its devices, transport and context store
async fn build(
    config: &Config,
    devices: &DeviceArgs,
) -> Result<(SessionHandle, SharedContext, JoinHandle<()>)> {
    let input = input_device(devices.input.as_ref(), config.backend())?;
    let output = output_device(devices.output.as_ref(), config.backend())?;
    let transport = Arc::new(NatsTransport::new(
        config.live.nats_url.clone(),
        config.live.subject_prefix.clone(),
    ));

    let context = ContextStore::new(
        config.fallback_location(),
        config.language(),
        Arc::new(FixedGeolocation::new(None)),
        Arc::new(StaticContextProvider),
    )
    .shared();

    if let Err(e) = context.write().await.refresh().await {
        warn!("Initial context refresh failed: {}", e);
    }

    let (session, events) = VoiceSession::new(
        config.session(),
        input,
        output,
        transport,
    );
    let (handle, task) = spawn_session(session, events, context.clone());

    Ok((handle, context, task))
}

async fn serve(config: Config, devices: DeviceArgs) -> Result<()> {
    let (handle, context, task) = build(&config, &devices).await?;
    let app = create_router(AppState::new(handle.clone(), context));

    let addr = format!("{}:{}", config.service.http.bind, config.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    handle.stop().await?;
    drop(handle);
    task.await.context("Session actor panicked")?;
    Ok(())
}

async fn call(config: Config, devices: DeviceArgs, language: Option<String>) -> Result<()> {
    let (handle, context, task) = build(&config, &devices).await?;

    if let Some(code) = language {
        let language = Language::from_code(&code);
        context.write().await.set_language(language);
        info!("Conversation language: {}", language.display_name());
    }

    handle.start().await?;
    info!("Session live, press Ctrl-C to hang up");

    let mut snapshots = handle.subscribe();
    let mut last_shown: Option<Utterance> = None;
    let mut last_subtitle = None;

    let hangup = tokio::signal::ctrl_c();
    tokio::pin!(hangup);

    loop {
        tokio::select! {
            _ = &mut hangup => {
                info!("Hanging up");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();

                if snapshot.subtitle != last_subtitle {
                    if let Some(subtitle) = &snapshot.subtitle {
                        info!("[{}] {}", speaker(subtitle.role), subtitle.text);
                    }
                    last_subtitle = snapshot.subtitle.clone();
                }

                // The window slides, so resume after the last utterance shown
                let unseen = last_shown
                    .as_ref()
                    .and_then(|seen| {
                        snapshot.history.iter().rposition(|u| {
                            u.timestamp == seen.timestamp && u.role == seen.role && u.text == seen.text
                        })
                    })
                    .map_or(0, |i| i + 1);
                for utterance in &snapshot.history[unseen..] {
                    info!("{}: {}", speaker(utterance.role), utterance.text);
                }
                if let Some(latest) = snapshot.history.last() {
                    last_shown = Some(latest.clone());
                }

                if snapshot.state == SessionState::Idle {
                    if let Some(reason) = snapshot.last_error {
                        warn!("Session ended: {}", reason);
                    } else {
                        info!("Session closed by the service");
                    }
                    break;
                }
            }
        }
    }

    handle.stop().await?;
    drop(handle);
    task.await.context("Session actor panicked")?;
    Ok(())
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "Farmer",
        Role::Assistant => "AgriVoice",
    }
}
