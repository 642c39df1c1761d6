//! Pixel show CLI - Record and replay Art-Net pixel shows.

use std::error::Error;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use clap::{Parser, Subcommand};
use pixel_show::{
    controller::{Command, ModeController},
    device::{ArtNetListener, MemoryStrip, audio_for, share},
    schema::ShowConfig,
    show::{Bundle, MonotonicClock, Player, PlayerState, Recorder},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record live Art-Net input into a new save bundle until Ctrl+C
    Record {
        name: String,
        /// Directory to create the bundle in (overrides save_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Play a save bundle, looping until Ctrl+C
    Play {
        bundle: PathBuf,
        /// Stop after a single pass
        #[arg(long)]
        once: bool,
    },
    /// Run the mode controller, reading record/play/idle/quit from stdin
    Run,
    /// Print an example configuration
    ExampleConfig,
}

type CliResult = Result<(), Box<dyn Error>>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ShowConfig::load(path).unwrap_or_else(|e| {
            eprintln!("Error loading config {}: {}", path.display(), e);
            std::process::exit(1);
        }),
        None => ShowConfig::default(),
    };

    let result = match cli.command {
        Commands::Record { name, dir } => record(&config, &name, dir),
        Commands::Play { bundle, once } => play(&config, bundle, once),
        Commands::Run => run(config),
        Commands::ExampleConfig => print_example_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Flag raised once Ctrl+C is received.
fn install_interrupt() -> Arc<AtomicBool> {
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);

    let spawned = thread::Builder::new()
        .name("signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    log::warn!("Ctrl+C handling unavailable: {e}");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Interrupted, shutting down");
                    flag.store(true, Ordering::Release);
                }
            });
        });
    if let Err(e) = spawned {
        log::warn!("Ctrl+C handling unavailable: {e}");
    }
    interrupt
}

fn record(config: &ShowConfig, name: &str, dir: Option<PathBuf>) -> CliResult {
    let dir = dir.unwrap_or_else(|| config.save_dir.clone());
    let interrupt = install_interrupt();

    let strip = share(MemoryStrip::new(&config.pixel_counts));
    let recorder = Recorder::new(
        &config.pixel_counts,
        config.trigger_value,
        strip,
        MonotonicClock::shared(),
    );
    let mut listener = ArtNetListener::bind(config.artnet_bind.as_str())?;
    let root = recorder.record(name, &dir)?;
    recorder.attach(&listener);

    println!("Recording to {} (Ctrl+C to stop)", root.display());
    while !interrupt.load(Ordering::Acquire) {
        recorder.refresh();
        thread::sleep(config.record_refresh());
    }

    listener.shutdown();
    if let Some(stats) = recorder.deinit(config.teardown_grace()) {
        println!("Saved {stats}");
        for (universe, frames) in stats.frames.iter().enumerate() {
            println!("  U{universe}: {frames} frames");
        }
    }
    Ok(())
}

fn play(config: &ShowConfig, bundle: PathBuf, once: bool) -> CliResult {
    let bundle = Bundle::load(bundle)?;
    let interrupt = install_interrupt();

    let topology = bundle.topology();
    println!("Playing {}", bundle.root().display());
    println!(
        "  {} outputs, {} universes, pixels {:?}",
        topology.output_count(),
        topology.universe_count(),
        topology.pixel_counts()
    );

    let strip = share(MemoryStrip::new(topology.pixel_counts()));
    let audio = audio_for(&config.audio, bundle.audio_file());
    let mut player = Player::new(bundle, strip, audio, MonotonicClock::shared())
        .with_teardown_grace(config.teardown_grace());

    let mut passes = 0u64;
    loop {
        player.play();
        let state = player.run(config.playback_refresh(), &interrupt);
        if state != PlayerState::Finished {
            break;
        }
        passes += 1;
        let stats = player.stats();
        println!(
            "Pass {passes}: {} frames, max lateness {:.1} ms",
            stats.total_frames(),
            stats.max_lateness.as_secs_f64() * 1000.0
        );
        if stats.total_frames() == 0 {
            log::warn!("Bundle holds no frames, not looping");
            break;
        }
        if once {
            break;
        }
    }

    player.deinit();
    Ok(())
}

fn run(config: ShowConfig) -> CliResult {
    let interrupt = install_interrupt();
    let (tx, rx) = mpsc::channel();

    thread::Builder::new().name("commands".into()).spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
        }
    })?;

    println!("Commands: record, play, idle, quit");
    let strip = share(MemoryStrip::new(&config.pixel_counts));
    let mut controller = ModeController::new(config, strip, MonotonicClock::shared());
    controller.run(&rx, &interrupt);
    Ok(())
}

fn print_example_config() -> CliResult {
    let config = ShowConfig::default();

    println!("Example configuration (show.json):");
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
