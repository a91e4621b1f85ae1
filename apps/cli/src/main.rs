use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use magtek_core::{
    CancellationToken, DeviceMode, MagtekReader, NusbBus, NusbTransport, ReaderConfig,
    SwipeOutcome,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "MagTek USB swipe reader setup tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML file overriding USB IDs and timeouts
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show reader mode and software ID
    Show,
    /// Switch the reader to keyboard emulation and reboot it
    Kbmode,
    /// Switch the reader to raw HID mode and reboot it
    Hidmode,
    /// Show the track format setting
    ShowTracks,
    /// Enable a track and reboot the reader
    EnableTrack {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=3))]
        track: u8,
        /// Report an error when the track is blank
        #[arg(long)]
        required: bool,
    },
    /// Disable a track and reboot the reader
    DisableTrack {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=3))]
        track: u8,
    },
    /// Wait for one card swipe and print it (raw HID mode only)
    Read {
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ReaderConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReaderConfig::default(),
    };

    println!("Connecting to reader...");
    let bus = NusbBus::new(config.control_timeout());
    let mut reader = MagtekReader::connect(&bus, config)?;

    match args.command {
        Command::Show => show(&mut reader),
        Command::Kbmode => {
            reader
                .switch_mode(DeviceMode::KbEmulation)
                .context("switching to KB emulation mode")?;
            info!("Reader rebooting into KB emulation mode");
            Ok(())
        }
        Command::Hidmode => {
            reader
                .switch_mode(DeviceMode::RawHid)
                .context("switching to raw HID mode")?;
            info!("Reader rebooting into raw HID mode");
            Ok(())
        }
        Command::ShowTracks => {
            let format = reader.track_format()?;
            print!("Track Format:\n{format}");
            Ok(())
        }
        Command::EnableTrack { track, required } => {
            let format = reader.configure_track(track, true, required)?;
            print!("{format}");
            Ok(())
        }
        Command::DisableTrack { track } => {
            let format = reader.configure_track(track, false, false)?;
            print!("{format}");
            Ok(())
        }
        Command::Read { timeout } => read(&mut reader, timeout),
    }
}

fn show(reader: &mut MagtekReader<NusbTransport>) -> Result<()> {
    let software_id = reader.software_id().context("reading software ID")?;
    println!("Reader mode: {}\nSoftware ID: {}", reader.mode(), software_id);
    Ok(())
}

fn read(reader: &mut MagtekReader<NusbTransport>, timeout: Option<u64>) -> Result<()> {
    let interrupted = CancellationToken::new();
    let handler = interrupted.clone();
    ctrlc::set_handler(move || handler.cancel()).context("installing Ctrl-C handler")?;

    let expired = CancellationToken::new();
    if let Some(secs) = timeout {
        let deadline = expired.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            deadline.cancel();
        });
    }
    let stop = || interrupted.is_cancelled() || expired.is_cancelled();

    println!("Swipe a card...");
    match reader.read_card(Some(&stop))? {
        SwipeOutcome::Swiped(swipe) => {
            print!("{swipe}");
            Ok(())
        }
        SwipeOutcome::Cancelled if interrupted.is_cancelled() => anyhow::bail!("swipe cancelled"),
        SwipeOutcome::Cancelled => {
            anyhow::bail!("no card swiped within {}s", timeout.unwrap_or_default())
        }
    }
}
