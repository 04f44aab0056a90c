use std::io::Write as _;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use lumen_assistant::audio::Microphone;
use lumen_assistant::audio::pcm::{
    INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, f32_to_pcm16, samples_to_wav,
};
use lumen_assistant::{
    AssistantState, AudioSettings, ChatMessage, Config, CpalMicrophone, GeminiClient,
    LiveSession, Persona, Playback, SharedState, StateHandler, StateUpdate,
};

/// Lumen - Gemini chat and voice assistant
#[derive(Parser)]
#[command(name = "lumen", version, about)]
struct Cli {
    /// Persona to use (aria, atlas, nova, sage)
    #[arg(short, long, env = "LUMEN_PERSONA")]
    persona: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive text chat
    Chat {
        /// Send messages without persona context
        #[arg(long)]
        plain: bool,
        /// Read each reply aloud
        #[arg(long)]
        speak: bool,
    },
    /// Ask a single question
    Ask {
        /// Question text
        text: String,
        /// Send the message without persona context
        #[arg(long)]
        plain: bool,
        /// Read the reply aloud
        #[arg(long)]
        speak: bool,
    },
    /// Speak text in the persona's voice
    Say {
        /// Text to speak
        text: String,
    },
    /// Start a live voice conversation
    Live,
    /// List available personas
    Personas,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the captured audio as a WAV file
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,lumen_assistant=info",
        1 => "info,lumen_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
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
    match &cli.command {
        Command::Personas => {
            list_personas();
            return Ok(());
        }
        Command::TestMic { duration, output } => {
            return test_mic(*duration, output.as_deref()).await;
        }
        Command::TestSpeaker => return test_speaker().await,
        _ => {}
    }

    let mut config = Config::load()?;
    if let Some(persona) = cli.persona.as_deref() {
        config.persona = persona.parse()?;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Chat { plain, speak } => chat(&config, plain, speak).await,
        Command::Ask { text, plain, speak } => ask(&config, &text, plain, speak).await,
        Command::Say { text } => say(&config, &text).await,
        Command::Live => live(&config).await,
        Command::Personas | Command::TestMic { .. } | Command::TestSpeaker => Ok(()),
    }
}

fn list_personas() {
    for persona in Persona::ALL {
        let marker = if persona == Persona::default() { "*" } else { " " };
        println!(
            "{marker} {:<6} {:<8} {}",
            persona.id(),
            persona.voice(),
            persona.tagline()
        );
    }
}

fn print_message(persona: Persona, message: &ChatMessage) {
    if message.is_error {
        eprintln!("! {}", message.content);
        return;
    }
    println!("{}: {}", persona.name(), message.content);
    for (i, source) in message.sources.iter().enumerate() {
        println!("  [{}] {} <{}>", i + 1, source.title, source.uri);
    }
}

/// Wait until everything scheduled has played
async fn wait_for_playback(playback: &Playback) {
    while !playback.is_idle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn ask(config: &Config, text: &str, plain: bool, speak: bool) -> anyhow::Result<()> {
    let client = GeminiClient::new(config);
    let mut state = AssistantState::from_config(config).with_plain_chat(plain);

    let reply = state.send(&client, text).await;
    print_message(state.persona(), &reply);

    if speak && !reply.is_error {
        let playback = Playback::with_default_device(config.audio);
        playback.speak_once(&client, &reply.content, state.persona()).await;
        wait_for_playback(&playback).await;
    }

    if reply.is_error {
        anyhow::bail!("request failed");
    }
    Ok(())
}

async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let client = GeminiClient::new(config);
    let playback = Playback::with_default_device(config.audio);

    playback.speak_once(&client, text, config.persona).await;
    wait_for_playback(&playback).await;
    Ok(())
}

async fn chat(config: &Config, plain: bool, speak: bool) -> anyhow::Result<()> {
    let client = GeminiClient::new(config);
    let playback = Playback::with_default_device(config.audio);
    let mut state = AssistantState::from_config(config).with_plain_chat(plain);

    println!(
        "Chatting with {} ({}). Commands: /clear /persona <name> /volume <0-100> /speed <0.5-2> /quit",
        state.persona().name(),
        state.persona().tagline()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !chat_command(&mut state, &playback, command) {
                break;
            }
            continue;
        }

        let reply = state.send(&client, line).await;
        print_message(state.persona(), &reply);

        if speak && !reply.is_error {
            playback.speak_once(&client, &reply.content, state.persona()).await;
        }
    }

    playback.stop_all();
    Ok(())
}

/// Returns false when the user asked to quit
fn chat_command(state: &mut AssistantState, playback: &Playback, command: &str) -> bool {
    let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
    let arg = arg.trim();

    match name {
        "quit" | "exit" => return false,
        "clear" => {
            state.clear_history();
            println!("Chat history cleared.");
        }
        "stop" => playback.stop_all(),
        "persona" => match arg.parse::<Persona>() {
            Ok(persona) => {
                state.set_persona(persona);
                println!("Now talking with {} ({}).", persona.name(), persona.tagline());
            }
            Err(e) => eprintln!("! {e}"),
        },
        "volume" => match arg.parse::<f32>() {
            Ok(level) => {
                let settings = state.settings().with_volume_percent(level);
                apply_settings(state, playback, settings);
            }
            Err(_) => eprintln!("! usage: /volume <0-100>"),
        },
        "speed" => match arg.parse::<f32>() {
            Ok(rate) => {
                let settings = state.settings().with_speed(rate);
                apply_settings(state, playback, settings);
            }
            Err(_) => eprintln!("! usage: /speed <0.5-2>"),
        },
        other => eprintln!("! unknown command: /{other}"),
    }
    true
}

fn apply_settings(state: &mut AssistantState, playback: &Playback, settings: AudioSettings) {
    state.set_settings(settings);
    playback.set_audio_settings(settings);
    println!(
        "Volume {:.0}%, speed {:.2}x",
        settings.volume() * 100.0,
        settings.speed()
    );
}

async fn live(config: &Config) -> anyhow::Result<()> {
    let playback = Playback::with_default_device(config.audio);
    let state: SharedState = Arc::new(Mutex::new(AssistantState::from_config(config)));
    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let handler = StateHandler::new(Arc::clone(&state), playback.clone()).with_updates(updates_tx);

    let persona = config.persona;
    let mut session = LiveSession::new(config, playback);

    println!("Connecting as {} ...", persona.name());
    session
        .start(persona, &[], Box::new(CpalMicrophone::new()), Arc::new(handler))
        .await?;
    state.lock().unwrap_or_else(PoisonError::into_inner).set_live(true);

    println!("Listening. Speak to {}; press Ctrl-C to stop.", persona.name());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => {
                let Some(update) = update else { break };
                if !print_update(persona, update) {
                    break;
                }
            }
        }
    }

    session.stop();
    state.lock().unwrap_or_else(PoisonError::into_inner).set_live(false);
    println!("Session ended.");
    Ok(())
}

/// Returns false once the session has ended
fn print_update(persona: Persona, update: StateUpdate) -> bool {
    match update {
        StateUpdate::Transcription { .. } => {}
        StateUpdate::TurnCommitted { input, output } => {
            if !input.is_empty() {
                println!("You: {input}");
            }
            if !output.is_empty() {
                println!("{}: {output}", persona.name());
            }
        }
        StateUpdate::ToolApplied(confirmation) => println!("* {confirmation}"),
        StateUpdate::SessionError(message) => {
            eprintln!("! voice session error: {message}");
            return false;
        }
        StateUpdate::SessionClosed => return false,
    }
    true
}

/// RMS and peak over fixed windows of samples
struct LevelMeter {
    window: usize,
    pending: Vec<f32>,
}

impl LevelMeter {
    fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            pending: Vec::new(),
        }
    }

    /// Add samples; returns `(rms, peak)` for every window completed
    fn push(&mut self, samples: &[f32]) -> Vec<(f32, f32)> {
        self.pending.extend_from_slice(samples);

        let mut levels = Vec::new();
        while self.pending.len() >= self.window {
            let window: Vec<f32> = self.pending.drain(..self.window).collect();
            let peak = window.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
            levels.push((calculate_rms(&window), peak));
        }
        levels
    }
}

/// Test microphone input
async fn test_mic(duration: u64, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut mic = CpalMicrophone::new();
    let mut frames = mic.open()?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
    let mut recorded = Vec::new();
    let mut meter = LevelMeter::new(INPUT_SAMPLE_RATE as usize);

    while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, frames.recv()).await {
        recorded.extend_from_slice(&frame);

        for (energy, peak) in meter.push(&frame) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (energy * 100.0).min(50.0) as usize;
            let bar = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

            println!("RMS: {energy:.4} | Peak: {peak:.4} | [{bar}]");
        }
    }

    mic.close();

    if let Some(path) = output {
        let wav = samples_to_wav(&recorded, INPUT_SAMPLE_RATE)?;
        std::fs::write(path, wav)?;
        println!("\nSaved {} samples to {}", recorded.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (OUTPUT_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / OUTPUT_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    let playback = Playback::with_default_device(AudioSettings::default());
    playback.enqueue_chunk(&f32_to_pcm16(&samples))?;
    wait_for_playback(&playback).await;

    println!("---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
