//! schall - play sounds from a sound bank on the default output device

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use schall::analysis::VolumeMeter;
use schall::{Config, CpalDevice, LoadStatus, OfflineDevice, OutputDevice, Schall};

const DEFAULT_CONFIG: &str = "schall.toml";
const FRAME: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "schall")]
#[command(about = "Sample player with a shared volume and a level meter")]
#[command(version)]
struct Args {
    /// Sound bank configuration (TOML). Defaults to ./schall.toml if present
    #[arg(short, long, env = "SCHALL_CONFIG")]
    config: Option<PathBuf>,

    /// Output device name (substring match)
    #[arg(short, long, env = "SCHALL_DEVICE")]
    device: Option<String>,

    /// Shared volume, 0.0 to 1.0
    #[arg(long)]
    volume: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List output devices
    Devices,
    /// Load the configured sound bank and show the status of each sound
    Sounds,
    /// Play sounds by title or url, all at once, until they finish
    Play {
        #[arg(required = true)]
        sounds: Vec<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "schall=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Devices => list_devices(),
        Command::Sounds => show_sounds(&load_config(&args)?).await,
        Command::Play { sounds } => play(&args, load_config(&args)?, sounds).await,
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(DEFAULT_CONFIG).context("loading schall.toml")?,
        None => Config::default(),
    };
    if let Some(volume) = args.volume {
        if !(0.0..=1.0).contains(&volume) {
            bail!("volume {volume} is outside 0..=1");
        }
        config.volume = Some(volume);
    }
    if args.device.is_some() {
        config.output.device = args.device.clone();
    }
    Ok(config)
}

fn list_devices() -> Result<()> {
    let default = CpalDevice::default_output().map(|d| d.name().to_owned());
    for device in CpalDevice::list_outputs() {
        let marker = if Some(device.name()) == default.as_deref() { "*" } else { " " };
        println!("{marker} {} ({} Hz, {} ch)", device.name(), device.sample_rate(), device.channels());
    }
    Ok(())
}

async fn show_sounds(config: &Config) -> Result<()> {
    let schall = Schall::from_config(config, OfflineDevice::new(48000, 2));
    schall.preload(None).await;

    for (sound, status) in schall.status() {
        let status = match status {
            LoadStatus::Loaded(info) => format!(
                "{:.2}s, {} Hz, {} ch",
                info.duration.as_secs_f32(),
                info.sample_rate,
                info.channels
            ),
            LoadStatus::Failed => "failed".into(),
            LoadStatus::Pending => "loading".into(),
            LoadStatus::Absent => "not loaded".into(),
        };
        println!("{:<24} {:<48} {status}", sound.title, sound.url);
    }
    Ok(())
}

async fn play(args: &Args, config: Config, keys: &[String]) -> Result<()> {
    let device = match config.output.device.as_deref() {
        Some(name) => CpalDevice::find(name).with_context(|| format!("no output device matching {name:?}"))?,
        None => CpalDevice::default_output().context("no default output device")?,
    };
    debug!(?args, "starting");

    let urls: Vec<String> = keys
        .iter()
        .map(|key| config.find(key).map_or_else(|| key.clone(), |s| s.url.clone()))
        .collect();

    let mut schall = Schall::from_config(&config, device);
    tokio::join!(schall.preload(config.preload), schall.load(&urls));
    if !urls.iter().any(|url| matches!(schall.cache().status(url), LoadStatus::Loaded(_))) {
        bail!("none of the requested sounds could be loaded");
    }

    schall.ensure_context()?;
    let started = schall.play_many(&urls).await;
    info!(started, requested = urls.len(), "playing");

    let mut meter = VolumeMeter::new();
    let mut peak = 0.0f32;
    let mut frame = tokio::time::interval(FRAME);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted");
                break;
            }
            _ = frame.tick() => {
                schall.tick();
                let level = meter.update(schall.root_mut().context_mut());
                peak = peak.max(level);
                if schall.sessions().is_empty() {
                    break;
                }
            }
        }
    }

    // let the last block drain from the device buffer
    tokio::time::sleep(Duration::from_millis(100)).await;
    schall.close().await;
    info!(peak_level = format!("{peak:.3}"), "done");
    Ok(())
}
