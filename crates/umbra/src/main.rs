use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use umbra_core::codes::ProtocolEvent;
use umbra_core::config::BridgeSettings;
use umbra_core::host::{LifecycleEventSource, SyntheticHost};
use umbra_core::native::exports::{DebugLoopFn, InitFn, ResetFn, DEBUG_LOOP_EXPORT, INIT_EXPORT, RESET_EXPORT};
use umbra_core::native::{AntiDebugModule, RecordingModule};
use umbra_core::DebugEventBridge;
use umbra_utils::{info, init_logging};

mod trace;

/// Drives a native anti-anti-debug module from debugger lifecycle events.
#[derive(Parser, Debug)]
#[command(name = "umbra")]
#[command(version)]
#[command(about = "Drives a native anti-anti-debug module from debugger lifecycle events", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Load the native module and report which exports resolve
    Probe
    {
        /// Directory to load the module from (defaults to UMBRA_MODULE_DIR or the OS search order)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Module file stem, without width suffix or extension
        #[arg(long)]
        stem: Option<String>,
    },
    /// Feed an event trace through the bridge
    Replay
    {
        /// Trace file, one event per line
        trace: PathBuf,
        /// Record native calls and print them instead of loading the module
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Replay with the feature switched off
        #[arg(long, default_value_t = false)]
        disabled: bool,
        /// Directory to load the module from
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print the protocol code table
    Codes,
}

fn main()
{
    // Reads RUST_LOG, UMBRA_LOG_FORMAT and UMBRA_LOG_FILE
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let cli = Cli::parse();

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>>
{
    match cli.command {
        Commands::Probe { dir, stem } => {
            let mut settings = BridgeSettings::from_env()?;
            if let Some(dir) = dir {
                settings.module_dir = Some(dir);
            }
            if let Some(stem) = stem {
                settings.module_stem = stem;
            }
            probe(&settings)
        }
        Commands::Replay {
            trace,
            dry_run,
            disabled,
            dir,
        } => {
            let mut settings = BridgeSettings::from_env()?;
            if let Some(dir) = dir {
                settings.module_dir = Some(dir);
            }
            if disabled {
                settings.set_enabled(false);
            }
            replay(&trace, settings, dry_run)
        }
        Commands::Codes => {
            println!("code  event");
            for event in ProtocolEvent::ALL {
                println!("{:>4}  {}", event.code(), event.name());
            }
            Ok(())
        }
    }
}

fn probe(settings: &BridgeSettings) -> Result<(), Box<dyn std::error::Error>>
{
    let binder = settings.binder();
    let file_name = settings.library_file_name();
    info!("Probing native module {}", file_name);

    let module = binder.load(&file_name)?;
    println!("Loaded {}", module.path().display());

    let init = binder.resolve::<InitFn>(&module, INIT_EXPORT).map(|_| ());
    let reset = binder.resolve::<ResetFn>(&module, RESET_EXPORT).map(|_| ());
    let debug_loop = binder.resolve::<DebugLoopFn>(&module, DEBUG_LOOP_EXPORT).map(|_| ());

    let mut usable = true;
    for (export, result, required) in [
        (INIT_EXPORT, init, true),
        (RESET_EXPORT, reset, false),
        (DEBUG_LOOP_EXPORT, debug_loop, true),
    ] {
        match result {
            Ok(()) => println!("  {export:<20} ok"),
            Err(e) => {
                usable &= !required;
                println!("  {export:<20} missing ({e})");
            }
        }
    }

    binder.release(module.name());
    if usable {
        println!("Module is usable");
        Ok(())
    } else {
        Err(format!("{file_name} is missing a required export").into())
    }
}

fn replay(path: &std::path::Path, settings: BridgeSettings, dry_run: bool) -> Result<(), Box<dyn std::error::Error>>
{
    let events = trace::load(path)?;
    info!("Replaying {} events from {}", events.len(), path.display());

    let settings = Arc::new(settings);
    let host = SyntheticHost::new();
    let recorder = Arc::new(RecordingModule::new());

    let bridge = if dry_run {
        let module: Arc<dyn AntiDebugModule> = recorder.clone();
        Arc::new(DebugEventBridge::with_module(Arc::clone(&settings), host.snapshot(), module))
    } else {
        let binder = Arc::new(settings.binder());
        Arc::new(DebugEventBridge::native(Arc::clone(&settings), host.snapshot(), binder))
    };

    host.subscribe(bridge.clone());
    host.start();
    for event in &events {
        host.emit(event);
    }

    if dry_run {
        for call in recorder.calls() {
            println!("{call}");
        }
    }

    println!("\nReplay summary:");
    println!("  Events: {}", events.len());
    println!("  Enabled: {}", settings.is_enabled());
    println!("  Module bound: {}", bridge.is_available());
    println!("  Live processes: {:?}", bridge.tracked_processes());
    if dry_run {
        println!("  Native calls: {}", recorder.call_count());
    }

    Ok(())
}
