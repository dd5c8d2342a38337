//! REPL – plays the host device for a running watchdog.
//!
//! Supported slash-commands:
//!   /boot                 – deliver the boot-completed signal
//!   /focus <surface>      – switch the foreground surface
//!   /touch                – user interaction inside the kiosk
//!   /screen on|off        – screen power
//!   /present              – device unlocked by the user
//!   /back /longpress /rightclick /key <chord>
//!                         – unlock-gesture input
//!   /pin <digits>         – answer the admin PIN challenge
//!   /cancel               – dismiss the PIN challenge
//!   /privileges           – run the interactive privilege gate
//!   /backup               – fire the backup launch job
//!   /reject on|off        – make the device refuse launches
//!   /status               – supervisor snapshot
//!   /quit | /exit         – stop the watchdog and exit

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kiosk_platform::SimDevice;
use kiosk_runtime::{DriverHandle, SupervisorStatus};
use kiosk_types::{InputSignal, KeyChord, KeyCode};

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Help,
    Boot,
    Focus(String),
    Touch,
    Screen(bool),
    Present,
    Input(InputSignal),
    Pin(String),
    Cancel,
    Privileges,
    Backup,
    Reject(bool),
    Status,
    Quit,
}

/// Why a line could not be turned into a [`ShellCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unknown(String),
    Usage(&'static str),
}

pub fn parse(line: &str) -> Result<ShellCommand, ParseError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err(ParseError::Usage("/help"));
    };
    let arg = words.next();

    let command = match head {
        "/help" => ShellCommand::Help,
        "/boot" => ShellCommand::Boot,
        "/focus" => ShellCommand::Focus(
            arg.ok_or(ParseError::Usage("/focus <surface>"))?.to_string(),
        ),
        "/touch" => ShellCommand::Touch,
        "/screen" => ShellCommand::Screen(on_off(arg).ok_or(ParseError::Usage("/screen on|off"))?),
        "/present" => ShellCommand::Present,
        "/back" => ShellCommand::Input(InputSignal::Back),
        "/longpress" => ShellCommand::Input(InputSignal::LongPress),
        "/rightclick" => ShellCommand::Input(InputSignal::SecondaryClick),
        "/key" => {
            let chord = arg
                .and_then(parse_chord)
                .ok_or(ParseError::Usage("/key menu|shift+center|alt+enter|<code>"))?;
            ShellCommand::Input(InputSignal::Key(chord))
        }
        "/pin" => match arg {
            Some(pin) if !pin.is_empty() && pin.chars().all(|c| c.is_ascii_digit()) => {
                ShellCommand::Pin(pin.to_string())
            }
            _ => return Err(ParseError::Usage("/pin <digits>")),
        },
        "/cancel" => ShellCommand::Cancel,
        "/privileges" => ShellCommand::Privileges,
        "/backup" => ShellCommand::Backup,
        "/reject" => ShellCommand::Reject(on_off(arg).ok_or(ParseError::Usage("/reject on|off"))?),
        "/status" => ShellCommand::Status,
        "/quit" | "/exit" => ShellCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn on_off(arg: Option<&str>) -> Option<bool> {
    match arg? {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// `menu`, `center`, `enter` or a numeric key code, optionally prefixed
/// with `shift+` and/or `alt+`.
pub fn parse_chord(text: &str) -> Option<KeyChord> {
    let mut shift = false;
    let mut alt = false;
    let mut key = None;
    for part in text.split('+') {
        match part.to_ascii_lowercase().as_str() {
            "shift" => shift = true,
            "alt" => alt = true,
            "menu" => key = Some(KeyCode::Menu),
            "center" | "dpad_center" => key = Some(KeyCode::DpadCenter),
            "enter" => key = Some(KeyCode::Enter),
            code => key = Some(KeyCode::Other(code.parse().ok()?)),
        }
    }
    Some(KeyChord {
        key: key?,
        shift,
        alt,
    })
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(
    runtime: &tokio::runtime::Runtime,
    handle: &DriverHandle,
    device: &Arc<SimDevice>,
    shutdown: Arc<AtomicBool>,
) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Cannot open line editor".red(), e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline("kiosk> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        let command = match parse(line) {
            Ok(command) => command,
            Err(ParseError::Unknown(other)) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
                continue;
            }
            Err(ParseError::Usage(usage)) => {
                println!("{} {}", "Usage:".yellow(), usage);
                continue;
            }
        };

        let delivered = match command {
            ShellCommand::Help => {
                cmd_help();
                true
            }
            ShellCommand::Boot => handle.boot(),
            ShellCommand::Focus(surface) => {
                device.set_foreground(surface.as_str());
                handle.focus_changed(surface)
            }
            ShellCommand::Touch => handle.user_interaction(),
            ShellCommand::Screen(true) => handle.screen_on(),
            ShellCommand::Screen(false) => handle.screen_off(),
            ShellCommand::Present => handle.user_present(),
            ShellCommand::Input(signal) => handle.input(signal),
            ShellCommand::Pin(pin) => handle.pin(pin),
            ShellCommand::Cancel => handle.cancel_challenge(),
            ShellCommand::Privileges => handle.request_privileges(),
            ShellCommand::Backup => handle.backup_job_fired(),
            ShellCommand::Reject(reject) => {
                device.reject_launches(reject);
                println!("  launches are now {}", if reject { "rejected" } else { "accepted" });
                true
            }
            ShellCommand::Status => match runtime.block_on(handle.status()) {
                Some(status) => {
                    print_status(&status, device);
                    true
                }
                None => false,
            },
            ShellCommand::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
        };

        if !delivered {
            println!("{}", "The watchdog driver has stopped.".red());
            break;
        }
        // Give the driver a moment so its events print before the prompt.
        std::thread::sleep(Duration::from_millis(50));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Watchdog Commands".bold().underline());
    println!("  {}              – deliver boot-completed", "/boot".bold().cyan());
    println!("  {}    – switch the foreground surface", "/focus <surface>".bold().cyan());
    println!("  {}             – user touched the kiosk", "/touch".bold().cyan());
    println!("  {}     – screen power", "/screen on|off".bold().cyan());
    println!("  {}           – user unlocked the device", "/present".bold().cyan());
    println!("  {}              – back key (5 quick presses unlock)", "/back".bold().cyan());
    println!("  {}  – open the PIN challenge", "/longpress /rightclick".bold().cyan());
    println!("  {}       – key chord, e.g. menu, shift+center, alt+enter", "/key <chord>".bold().cyan());
    println!("  {}      – answer the PIN challenge", "/pin <digits>".bold().cyan());
    println!("  {}            – dismiss the PIN challenge", "/cancel".bold().cyan());
    println!("  {}        – run the privilege dialogs", "/privileges".bold().cyan());
    println!("  {}            – fire the backup launch job", "/backup".bold().cyan());
    println!("  {}     – make the device refuse launches", "/reject on|off".bold().cyan());
    println!("  {}            – supervisor snapshot", "/status".bold().cyan());
    println!("  {}      – stop the watchdog and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn print_status(status: &SupervisorStatus, device: &SimDevice) {
    let flag = |b: bool| if b { "on".green() } else { "off".dimmed() };
    println!("{}", "Watchdog Status".bold().underline());
    println!("  uptime        : {:.1}s", status.now.as_secs_f64());
    println!(
        "  foreground    : {}",
        device
            .foreground()
            .map_or_else(|| "<none>".to_string(), |s| s.to_string())
            .yellow()
    );
    println!("  presence      : {:?}", status.presence.presence);
    println!("  lock mode     : {}", format!("{:?}", status.lock_mode).bold());
    match &status.gate {
        Some(gate) => println!("  privileges    : {:?} ({:?})", gate, gate.enforcement()),
        None => println!("  privileges    : {}", "not settled".yellow()),
    }
    let runs: Vec<String> = status.active_runs.iter().map(|t| t.to_string()).collect();
    println!(
        "  active runs   : {}",
        if runs.is_empty() { "none".to_string() } else { runs.join(", ") }
    );
    println!("  screen        : {}", flag(status.awake));
    println!("  inactivity    : {}", flag(status.inactivity_armed));
    println!(
        "  poller        : {} ({} check(s))",
        flag(status.polling),
        status.poll_checks
    );
    println!("  heartbeats    : {}", status.heartbeats);
    println!("  launches      : {}", device.launch_count());
    println!(
        "  timers        : {} pending{}",
        status.pending_timers,
        status
            .next_deadline
            .map(|d| format!(", next at {:.1}s", d.as_secs_f64()))
            .unwrap_or_default()
    );
}
