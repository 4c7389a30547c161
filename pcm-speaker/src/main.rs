//! pcm-speaker - play raw PCM through the speaker engine
//!
//! Reads device-native PCM from a file or stdin in chunks, queues each chunk
//! on a [`Speaker`] and waits until playback completes (or Ctrl+C).

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcm_speaker::config::{ConfigOverrides, TomlConfig};
use pcm_speaker::device::list_output_devices;
use pcm_speaker::{CompletionMode, DeviceSelector, SampleFormat, Speaker};

/// Command-line arguments for pcm-speaker
#[derive(Parser, Debug)]
#[command(name = "pcm-speaker")]
#[command(about = "Play raw PCM audio on an output device")]
#[command(version)]
struct Args {
    /// Raw PCM input file (stdin when omitted or "-")
    input: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "PCM_SPEAKER_CONFIG")]
    config: Option<PathBuf>,

    /// Sample rate in Hz
    #[arg(short, long, env = "PCM_SPEAKER_RATE")]
    rate: Option<u32>,

    /// Frames per device buffer
    #[arg(long, env = "PCM_SPEAKER_FRAMES_PER_BUFFER")]
    frames_per_buffer: Option<u32>,

    /// Channel count
    #[arg(long, env = "PCM_SPEAKER_CHANNELS")]
    channels: Option<u16>,

    /// Sample format: i8, u8, i16, i24, i32, f32
    #[arg(short, long, env = "PCM_SPEAKER_FORMAT")]
    format: Option<SampleFormat>,

    /// Output device: "default", an index from --list-devices, or a name
    #[arg(short, long, env = "PCM_SPEAKER_DEVICE")]
    device: Option<DeviceSelector>,

    /// Bytes per chunk read from the input
    #[arg(long, default_value = "4096")]
    chunk_size: usize,

    /// Start playback before the whole input has been read (implies
    /// completion only after end of input)
    #[arg(long)]
    stream: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PCM_SPEAKER_LOG")]
    log_level: Option<String>,

    /// Print final callback statistics as JSON
    #[arg(long)]
    stats: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            sample_rate: self.rate,
            frames_per_buffer: self.frames_per_buffer,
            channels: self.channels,
            device: self.device.clone(),
            sample_format: self.format,
            completion: self.stream.then_some(CompletionMode::OnEndOfInput),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => TomlConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };
    let config = file_config.apply(args.overrides());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pcm_speaker={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.list_devices {
        for (index, name) in list_output_devices().context("Failed to list output devices")? {
            println!("{:>3}  {}", index, name);
        }
        return Ok(());
    }

    anyhow::ensure!(args.chunk_size > 0, "--chunk-size must be greater than zero");

    let speaker = Arc::new(Speaker::new(config.speaker).context("Failed to open speaker")?);
    let params = speaker.params().clone();
    info!(
        "Output: {}Hz, {} ch, {}, {} frames per buffer",
        params.sample_rate, params.channels, params.sample_format, params.frames_per_buffer
    );

    let monitor_shutdown = speaker
        .monitor()
        .spawn_monitoring_task(tokio::runtime::Handle::current(), Duration::from_millis(500));

    if args.stream {
        speaker.start().context("Failed to start playback")?;
    }

    let total = feed(&speaker, args.input.as_deref(), args.chunk_size)
        .await
        .context("Failed to read input")?;
    speaker.finish_input();
    info!(
        "Queued {} bytes ({:.2}s of audio)",
        total,
        params.duration_of(total).as_secs_f64()
    );

    if !args.stream {
        speaker.start().context("Failed to start playback")?;
    }

    tokio::select! {
        reason = speaker.wait_for_completion() => {
            info!("Playback {}", reason);
        },
        _ = shutdown_signal() => {
            info!("Interrupted, stopping playback");
        },
    }

    speaker.stop();
    monitor_shutdown.store(true, Ordering::Relaxed);

    let stats = speaker.stats();
    if args.stats {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        info!(
            "{} callbacks, {} bytes played, {} underruns",
            stats.callback_count, stats.bytes_delivered, stats.underrun_count
        );
    }

    Ok(())
}

/// Read the input in `chunk_size` pieces and queue each one.
///
/// Returns the total number of bytes queued.
async fn feed(speaker: &Speaker, input: Option<&Path>, chunk_size: usize) -> Result<usize> {
    let mut reader: Box<dyn AsyncRead + Unpin + Send> = match input {
        Some(path) if path != Path::new("-") => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        _ => Box::new(tokio::io::stdin()),
    };

    let mut buf = vec![0u8; chunk_size];
    let mut total = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        speaker.write(&buf[..n]);
        total += n;
    }

    Ok(total)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
