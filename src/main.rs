use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use auto_dance_ctrl::conf_store::parse_pid;
use auto_dance_ctrl::{
    discover_pid, AutomationController, ConfFile, Config, ControllerOptions, CtrlError,
    HotkeyAction, HotkeyManager, PidStore, ProcessFinder, RunState, SessionSnapshot,
    SpeedValue, SystemProcessIo,
};

#[derive(Parser, Debug)]
#[command(
    name = "adc",
    version,
    about = "Attach to a running dance game client and control its playback speed"
)]
struct Cli {
    /// Settings file (JSON); defaults are used when it does not exist
    #[arg(short, long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    /// Record file (INI) holding the last target PID
    #[arg(short, long, global = true, default_value = "app.conf")]
    conf: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print session status as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the target and print its PID
    Detect {
        /// Store the detected PID in the record file
        #[arg(long)]
        save: bool,
    },
    /// Store a PID in the record file
    SavePid { pid: String },
    /// Print the effective settings
    ShowConfig,
    /// Attach, read the speed once and detach
    Measure {
        #[arg(long)]
        pid: Option<u32>,
    },
    /// Run an interactive session (commands on stdin)
    Run {
        #[arg(long)]
        pid: Option<u32>,
        /// Walk the speed to this value after attaching
        #[arg(long)]
        goal: Option<i32>,
        /// Listen for the global hotkeys from the settings file
        #[arg(long)]
        hotkeys: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionCommand {
    Measure,
    Increase,
    Decrease,
    Goal(i32),
    ClearGoal,
    Status,
    Help,
    Quit,
}

impl From<HotkeyAction> for SessionCommand {
    fn from(action: HotkeyAction) -> Self {
        match action {
            HotkeyAction::Increase => SessionCommand::Increase,
            HotkeyAction::Decrease => SessionCommand::Decrease,
            HotkeyAction::Measure => SessionCommand::Measure,
            HotkeyAction::Stop => SessionCommand::Quit,
        }
    }
}

fn parse_command(line: &str) -> std::result::Result<Option<SessionCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let command = match word.to_lowercase().as_str() {
        "m" | "measure" => SessionCommand::Measure,
        "+" | "up" | "inc" => SessionCommand::Increase,
        "-" | "down" | "dec" => SessionCommand::Decrease,
        "goal" | "g" => {
            let value = words.next().ok_or("usage: goal <speed>")?;
            let goal = value
                .parse()
                .map_err(|_| format!("'{}' is not a speed", value))?;
            SessionCommand::Goal(goal)
        }
        "clear" => SessionCommand::ClearGoal,
        "status" | "s" => SessionCommand::Status,
        "help" | "?" => SessionCommand::Help,
        "stop" | "quit" | "q" | "exit" => SessionCommand::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn open_store(path: &Path) -> Result<ConfFile> {
    match ConfFile::open(path) {
        Ok(store) => Ok(store),
        Err(CtrlError::ConfigLoad { .. }) => ConfFile::create(path)
            .with_context(|| format!("creating record file {}", path.display())),
        Err(err) => Err(err).with_context(|| format!("opening record file {}", path.display())),
    }
}

fn print_snapshot(snapshot: &SessionSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    let state = match snapshot.run_state {
        RunState::Running => snapshot.run_state.to_string().green(),
        RunState::Idle => snapshot.run_state.to_string().normal(),
        RunState::StopRequested => snapshot.run_state.to_string().yellow(),
        RunState::Stopped => snapshot.run_state.to_string().red(),
    };
    let speed = match (snapshot.speed, snapshot.bounds) {
        (Some(speed), Some(bounds)) => format!("{} [{}..{}]", speed, bounds.min, bounds.max),
        _ => "-".to_string(),
    };
    let goal = snapshot
        .goal
        .map_or_else(|| "-".to_string(), |goal| goal.to_string());
    println!(
        "● {}  pid {}  speed {}  goal {}",
        state,
        snapshot.pid,
        speed.bold(),
        goal
    );
    if let Some(reason) = &snapshot.last_error {
        println!("  {} {}", "last error:".red(), reason);
    }
    Ok(())
}

fn print_help() {
    println!("commands: m(easure)  + / up  - / down  goal <n>  clear  status  quit");
}

/// Lines typed on stdin. A plain thread does the reading so a pending read
/// never holds up runtime shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run a blocking controller call off the async worker threads.
async fn on_controller<T, F>(controller: &Arc<AutomationController>, call: F) -> Result<T, CtrlError>
where
    T: Send + 'static,
    F: FnOnce(&AutomationController) -> Result<T, CtrlError> + Send + 'static,
{
    let controller = Arc::clone(controller);
    tokio::task::spawn_blocking(move || call(&controller))
        .await
        .map_err(|e| CtrlError::runtime(e.to_string()))?
}

fn build_controller(
    config: &Config,
    conf: &Path,
    pid: Option<u32>,
) -> Result<Arc<AutomationController>> {
    let io = Arc::new(SystemProcessIo::new(config).context("invalid settings")?);
    let store = Arc::new(open_store(conf)?);
    let controller = AutomationController::new(io, store, pid, ControllerOptions::from(config))
        .context("could not determine the target pid")?;
    Ok(Arc::new(controller))
}

fn report_speed(label: &str, result: &Result<SpeedValue, CtrlError>) {
    match result {
        Ok(speed) => {
            let edge = if speed.is_at_max() {
                " (max)"
            } else if speed.is_at_min() {
                " (min)"
            } else {
                ""
            };
            println!("{} {}{}", label, speed.to_string().bold(), edge.dimmed());
        }
        Err(err) if err.is_state_error() => eprintln!("{} {}", "!".yellow(), err),
        Err(err) => eprintln!("{} {}", "✗".red(), err),
    }
}

async fn run_interactive(
    controller: Arc<AutomationController>,
    config: &Config,
    goal: Option<i32>,
    hotkeys: bool,
    json: bool,
) -> Result<()> {
    on_controller(&controller, |c| c.start())
        .await
        .context("failed to start session")?;
    println!("{} attached to pid {}", "▶".green(), controller.pid());
    print_snapshot(&controller.snapshot(), json)?;

    if let Some(goal) = goal {
        controller.seek_speed(goal)?;
    }

    let (hotkey_tx, mut hotkey_rx) = mpsc::unbounded_channel();
    let _hotkey_manager = if hotkeys {
        let mut manager = HotkeyManager::new()?;
        manager.register_bindings(&config.hotkeys)?;
        manager.start_listener(hotkey_tx);
        Some(manager)
    } else {
        drop(hotkey_tx);
        None
    };

    print_help();
    let mut lines = stdin_lines();
    let mut watchdog = tokio::time::interval(Duration::from_millis(200));

    loop {
        let command = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => match parse_command(&line) {
                    Ok(command) => command,
                    Err(message) => {
                        eprintln!("{} {}", "?".yellow(), message);
                        None
                    }
                },
                None => Some(SessionCommand::Quit),
            },
            Some(action) = hotkey_rx.recv() => Some(SessionCommand::from(action)),
            _ = tokio::signal::ctrl_c() => Some(SessionCommand::Quit),
            _ = watchdog.tick() => {
                if controller.run_state() == RunState::Stopped {
                    println!("{} session ended", "■".red());
                    break;
                }
                None
            }
        };

        let Some(command) = command else {
            continue;
        };
        debug!(?command, "session command");

        match command {
            SessionCommand::Measure => {
                let result = on_controller(&controller, |c| c.measure_speed()).await;
                report_speed("speed", &result);
            }
            SessionCommand::Increase => {
                let result = on_controller(&controller, |c| c.increase_speed()).await;
                report_speed("speed +", &result);
            }
            SessionCommand::Decrease => {
                let result = on_controller(&controller, |c| c.decrease_speed()).await;
                report_speed("speed -", &result);
            }
            SessionCommand::Goal(goal) => match controller.seek_speed(goal) {
                Ok(()) => println!("seeking speed {}", goal),
                Err(err) => eprintln!("{} {}", "✗".red(), err),
            },
            SessionCommand::ClearGoal => controller.clear_goal(),
            SessionCommand::Status => print_snapshot(&controller.snapshot(), json)?,
            SessionCommand::Help => print_help(),
            SessionCommand::Quit => break,
        }
    }

    controller.stop();
    controller.join().await;
    print_snapshot(&controller.snapshot(), json)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.settings)
        .with_context(|| format!("loading settings from {}", cli.settings.display()))?;
    init_tracing(cli.verbose || config.verbose);

    match cli.command {
        Command::Detect { save } => {
            let io = SystemProcessIo::new(&config).context("invalid settings")?;
            match discover_pid(&io) {
                Ok(pid) => {
                    let name = ProcessFinder::new()
                        .process_name(pid)
                        .unwrap_or_else(|| "?".to_string());
                    println!(
                        "{} detected target pid {} ({})",
                        "✔".green(),
                        pid.to_string().bold(),
                        name
                    );
                    if save {
                        let store = open_store(&cli.conf)?;
                        store.save_pid(pid)?;
                        println!("saved to {}", store.path().display());
                    }
                }
                Err(err) => {
                    eprintln!("{} {}", "✗".red(), err);
                    std::process::exit(1);
                }
            }
        }
        Command::SavePid { pid } => {
            let pid = parse_pid(&pid)?;
            let store = open_store(&cli.conf)?;
            store.save_pid(pid)?;
            println!("{} saved pid {} to {}", "✔".green(), pid, store.path().display());
        }
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Measure { pid } => {
            let controller = build_controller(&config, &cli.conf, pid)?;
            on_controller(&controller, |c| c.start())
                .await
                .context("failed to attach")?;
            print_snapshot(&controller.snapshot(), cli.json)?;
            controller.stop();
            controller.join().await;
        }
        Command::Run { pid, goal, hotkeys } => {
            let controller = build_controller(&config, &cli.conf, pid)?;
            run_interactive(controller, &config, goal, hotkeys, cli.json).await?;
        }
    }

    Ok(())
}
