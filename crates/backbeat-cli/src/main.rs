//! backbeat: drum groove trainer

mod config;
mod controls;
mod tab;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};
use backbeat_core::{InstrumentGroup, PatternLibrary, Session, CATEGORIES};
use backbeat_services::{
    bounce_to_wav, default_device_info, BounceOptions, PlaybackCommand, PlaybackEvent, RealtimePlayer,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use controls::Control;

#[derive(Parser)]
#[command(name = "backbeat")]
#[command(about = "Drum groove trainer with live pattern switching", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/backbeat/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON array of extra patterns, appended after the built-in catalog
    #[arg(long, global = true)]
    patterns: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List library patterns by category
    List {
        /// Only this category (e.g. Lv3)
        #[arg(short = 'C', long)]
        category: Option<String>,
    },
    /// Print one pattern
    Show {
        /// Pattern key (e.g. p_1)
        key: String,

        /// Emit JSON instead of a drum tab
        #[arg(long)]
        json: bool,
    },
    /// Play live; controls are read from stdin, one per line
    Play {
        #[command(flatten)]
        playback: PlaybackArgs,

        /// Start the transport immediately
        #[arg(long)]
        autoplay: bool,
    },
    /// Render bars of a pattern to a WAV file
    Bounce {
        /// Output WAV file path
        output: PathBuf,

        #[command(flatten)]
        playback: PlaybackArgs,

        /// Number of bars
        #[arg(short, long, default_value = "4")]
        bars: u32,

        /// Sample rate in Hz (default from config)
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Noise seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
    /// Print the effective config, optionally writing it out
    Config {
        /// Write the effective config to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Overrides for the `[playback]` config section
#[derive(Args)]
struct PlaybackArgs {
    /// Pattern key (e.g. p_7)
    #[arg(short, long)]
    pattern: Option<String>,

    /// Tempo in BPM (20-300)
    #[arg(short, long)]
    tempo: Option<f64>,

    /// Speed multiplier (0.5, 0.75, 1.0, 1.25, 1.5, 2.0)
    #[arg(long)]
    speed: Option<f64>,

    /// Swing percent (0-50, multiples of 5)
    #[arg(short, long)]
    swing: Option<u8>,

    /// Count-in beats (0, 2, 4)
    #[arg(long)]
    pre_roll: Option<u8>,

    /// Click on every beat
    #[arg(short, long)]
    metronome: bool,

    /// Mute an instrument group (repeatable)
    #[arg(long)]
    mute: Vec<InstrumentGroup>,

    /// Master gain (default from config)
    #[arg(short, long)]
    gain: Option<f32>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("backbeat=info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let app_config = config::load_config(&config_path);
    let library = load_library(cli.patterns.as_deref())?;

    match cli.command {
        Commands::List { category } => list(&library, category.as_deref()),
        Commands::Show { key, json } => show(&library, &key, json),
        Commands::Play { playback, autoplay } => play(library, &app_config, &playback, autoplay),
        Commands::Bounce { output, playback, bars, sample_rate, seed } => {
            let options = BounceOptions {
                bars,
                sample_rate: sample_rate.unwrap_or(app_config.render.sample_rate),
                gain: playback.gain.unwrap_or(app_config.render.gain),
                seed,
                ..Default::default()
            };
            let mut session = build_session(library, &app_config, &playback)?;
            let summary = bounce_to_wav(&mut session, &options, &output)
                .with_context(|| format!("bouncing to {}", output.display()))?;
            println!(
                "wrote {} ({:.2} s, {} frames, peak {:.2})",
                output.display(),
                summary.seconds,
                summary.frames,
                summary.peak
            );
            Ok(())
        }
        Commands::Config { write } => {
            println!("# {}", config_path.display());
            print!("{}", toml::to_string_pretty(&app_config)?);
            if write {
                config::save_config(&config_path, &app_config)?;
                println!("# written");
            }
            Ok(())
        }
    }
}

fn load_library(patterns: Option<&Path>) -> anyhow::Result<Arc<PatternLibrary>> {
    let Some(path) = patterns else {
        return Ok(PatternLibrary::builtin());
    };
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let library = PatternLibrary::builtin_with_json(&json).with_context(|| format!("loading {}", path.display()))?;
    tracing::info!(path = %path.display(), patterns = library.len(), "Loaded user patterns");
    Ok(Arc::new(library))
}

fn list(library: &PatternLibrary, category: Option<&str>) -> anyhow::Result<()> {
    for cat in CATEGORIES {
        if category.is_some_and(|c| !c.eq_ignore_ascii_case(cat.key)) {
            continue;
        }
        println!("{} - {}", cat.key, cat.label);
        for entry in library.in_category(cat.key) {
            let p = &entry.pattern;
            println!(
                "  {:<6} {:<5} {:>3} steps  {:>3} BPM  {}",
                entry.key,
                p.meter().to_string(),
                p.grid_size(),
                p.tempo_hint,
                p.label
            );
        }
    }
    Ok(())
}

fn show(library: &PatternLibrary, key: &str, json: bool) -> anyhow::Result<()> {
    let Some(pattern) = library.get(key) else {
        bail!("no pattern with key {key}");
    };
    if json {
        println!("{}", serde_json::to_string_pretty(pattern.as_ref())?);
    } else {
        print!("{}", tab::render(&pattern));
    }
    Ok(())
}

/// Session from config, with command-line overrides applied on top
fn build_session(library: Arc<PatternLibrary>, config: &AppConfig, args: &PlaybackArgs) -> anyhow::Result<Session> {
    let settings = config.playback.to_settings().context("invalid [playback] config")?;
    let mut session = Session::new(library, config.engine, fastrand::Rng::new());
    session.apply_settings(&settings)?;

    let key = args.pattern.as_deref().unwrap_or(&config.playback.pattern);
    session.select(key)?;
    if let Some(bpm) = args.tempo {
        session.set_tempo(bpm)?;
    }
    if let Some(rate) = args.speed {
        session.set_speed_rate(rate)?;
    }
    if let Some(swing) = args.swing {
        session.set_swing(swing)?;
    }
    if let Some(beats) = args.pre_roll {
        session.set_pre_roll(beats)?;
    }
    if args.metronome {
        session.set_metronome(true);
    }
    for group in &args.mute {
        session.set_muted(*group, true);
    }
    Ok(session)
}

fn play(library: Arc<PatternLibrary>, config: &AppConfig, args: &PlaybackArgs, autoplay: bool) -> anyhow::Result<()> {
    let session = build_session(library, config, args)?;
    if let Ok((device, rate, channels)) = default_device_info() {
        tracing::info!(%device, rate, channels, "Using output device");
    }
    let gain = args.gain.unwrap_or(config.render.gain);
    let player = RealtimePlayer::start(session, gain).context("starting audio output")?;

    let events = player.events().clone();
    let printer = thread::spawn(move || {
        for event in events.iter() {
            match event {
                PlaybackEvent::Started => println!("playing"),
                PlaybackEvent::Stopped => println!("stopped"),
                PlaybackEvent::PatternChange { label, transition } => println!("{label}: {transition:?}"),
                PlaybackEvent::SettingsChanged(s) => println!(
                    "tempo {} x{} (= {:.0} BPM), swing {}%, pre-roll {}, metronome {}",
                    s.tempo,
                    s.speed_rate.value(),
                    s.effective_tempo(),
                    s.swing.percent(),
                    s.pre_roll_beats,
                    if s.metronome { "on" } else { "off" }
                ),
                PlaybackEvent::Status(status) => println!("{status:#?}"),
                PlaybackEvent::Rejected(e) => println!("rejected: {e}"),
            }
        }
    });

    if autoplay {
        player.send(PlaybackCommand::Play)?;
    }
    println!("{}", controls::HELP);

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match controls::parse_line(&line?) {
            Ok(None) => {}
            Ok(Some(Control::Quit)) => break,
            Ok(Some(Control::Help)) => println!("{}", controls::HELP),
            Ok(Some(Control::Command(cmd))) => player.send(cmd)?,
            Err(msg) => println!("{msg}"),
        }
    }

    player.shutdown()?;
    // the event channel closes with the driver
    let _ = printer.join();
    Ok(())
}
