//! `kiosk-cli` – Kiosk Watchdog Shell
//!
//! The `kioskd` binary runs a watchdog supervisor against a simulated device
//! so the whole recovery pipeline can be exercised from a terminal.  It:
//!
//! 1. Checks for `~/.kiosk/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Spawns the supervisor driver on a tokio runtime and prints every bus
//!    event as it is published.
//! 3. Drops the operator into an **interactive REPL** that plays the host:
//!    focus changes, screen power, touches, key presses, PIN entry.
//! 4. Intercepts **Ctrl-C** to stop the driver and exit cleanly.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use kiosk_middleware::EventBus;
use kiosk_platform::SimDevice;
use kiosk_runtime::driver::{self, DriverHandle};
use kiosk_runtime::{Supervisor, TokioClock};
use kiosk_types::{EventPayload, KioskEvent, StepOutcome};

fn main() {
    let _telemetry = kiosk_runtime::init_tracing("kioskd");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = resolve_config(config::load(), run_first_run_wizard);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start tokio runtime".red(), e);
            std::process::exit(1);
        }
    };

    // ── Simulated host + supervisor ───────────────────────────────────────
    let device = SimDevice::new(cfg.target_surface.as_str());
    device.set_foreground("com.android.launcher");
    let platform = device.platform().with_session(Arc::new(cfg.session()));
    let bus = EventBus::default();

    let (handle, driver_task) = {
        let _guard = runtime.enter();
        let supervisor = Supervisor::new(
            cfg.supervisor(),
            platform,
            Arc::new(TokioClock::new()),
            bus.clone(),
        );
        driver::spawn(supervisor)
    };

    // Effective launches surface as focus changes, like a real window manager.
    let focus_feed = handle.clone();
    device.set_focus_listener(Arc::new(move |surface| {
        focus_feed.focus_changed(surface.clone());
    }));

    runtime.spawn(print_events(bus));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let ctrlc_handle = handle.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the watchdog …".yellow().bold());
        ctrlc_handle.shutdown();
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!(
        "  Watching {} (home screen in front).",
        cfg.target_surface.bold()
    );
    println!(
        "  Type {} for a list of commands, {} to start the boot profile.\n",
        "/help".bold().cyan(),
        "/boot".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&runtime, &handle, &device, shutdown);

    stop(&runtime, &handle, driver_task);
}

/// Pick the running config: the saved file, the wizard's answers on first
/// run, or the defaults when the file is unreadable.  `KIOSK_*` overrides
/// apply on every path and are never written back to disk.
fn resolve_config(
    loaded: Result<Option<config::Config>, config::ConfigError>,
    first_run: impl FnOnce() -> config::Config,
) -> config::Config {
    let mut cfg = match loaded {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    cfg
}

fn stop(runtime: &tokio::runtime::Runtime, handle: &DriverHandle, task: tokio::task::JoinHandle<()>) {
    handle.shutdown();
    if let Err(e) = runtime.block_on(task) {
        warn!(error = %e, "watchdog driver task ended abnormally");
    }
    println!("{}", "  ✓ Watchdog stopped.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// Event printer
// ─────────────────────────────────────────────────────────────────────────────

async fn print_events(bus: EventBus) {
    let mut rx = bus.subscribe_all();
    loop {
        match rx.recv().await {
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(n)) => {
                println!("  {} {} event(s) dropped", "…".dimmed(), n);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &KioskEvent) {
    let line = match &event.payload {
        EventPayload::RunStarted { trigger, steps, .. } => {
            format!("{} run started ({} step(s))", trigger.to_string().bold(), steps).cyan()
        }
        EventPayload::StepExecuted {
            trigger,
            step_index,
            action,
            outcome,
            ..
        } => {
            let text = format!("{} step {} {}: {:?}", trigger, step_index, action.label(), outcome);
            match outcome {
                StepOutcome::Fired => text.green(),
                StepOutcome::Failed(_) => text.red(),
                StepOutcome::Superseded | StepOutcome::Stale => text.dimmed(),
            }
        }
        EventPayload::RunCancelled { trigger, .. } => format!("{trigger} run cancelled").yellow(),
        EventPayload::PresenceChanged { surface, presence } => {
            format!("focus {surface} → target {presence:?}").normal()
        }
        EventPayload::LockModeChanged { from, to } => format!("lock {from:?} → {to:?}").magenta().bold(),
        EventPayload::UnlockHint { remaining } => {
            format!("press back {remaining} more time(s) to unlock").magenta()
        }
        EventPayload::PrivilegeProgress(progress) => format!("privileges {progress:?}").blue(),
        EventPayload::PrivilegeDenied(step) => format!("permission denied: {step}").red(),
        EventPayload::PrivilegesSettled(outcome) => {
            format!("privileges settled: {outcome:?} ({:?})", outcome.enforcement()).blue().bold()
        }
        EventPayload::CapabilityWarning(detail) => format!("warning: {detail}").yellow(),
        EventPayload::Heartbeat { sequence } => format!("heartbeat #{sequence}").dimmed(),
    };
    println!("  {} {}", "│".dimmed(), line);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║    Kiosk Watchdog First-Run Wizard   ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the kiosk.\n");

    let mut cfg = config::Config::default();

    cfg.target_surface = prompt_line(
        &format!("  Kiosk surface to keep in front [{}]: ", cfg.target_surface),
        &cfg.target_surface,
    );
    cfg.target_url = prompt_line(
        &format!("  Kiosk URL [{}]: ", cfg.target_url),
        &cfg.target_url,
    );

    let secs = prompt_line(
        &format!("  Heartbeat interval in seconds, 0 to disable [{}]: ", cfg.heartbeat_interval_secs),
        &cfg.heartbeat_interval_secs.to_string(),
    );
    if let Ok(s) = secs.trim().parse::<u64>() {
        cfg.heartbeat_interval_secs = s;
    }

    let pin = prompt_line("  Admin PIN [1234]: ", &cfg.admin_pin);
    if pin.chars().all(|c| c.is_ascii_digit()) {
        cfg.admin_pin = pin;
    } else {
        println!("  {} keeping the default PIN.", "PIN must be digits only;".yellow());
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __ __ _           __"#.bold().cyan());
    println!("{}", r#"  / //_/(_)__  ___ / /__"#.bold().cyan());
    println!("{}", r#" / ,<  / / _ \(_-</  '_/"#.bold().cyan());
    println!("{}", r#"/_/|_|/_/\___/___/_/\_\ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "kioskd".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Foreground-presence watchdog");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
