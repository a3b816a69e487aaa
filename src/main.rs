use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cnclink::{
    commands, init_logging_with, list_ports, CommunicatorState, ConnectionManager, LinkEvent,
    LinkSettings, LogFormat, TransportKind, BUILD_DATE, VERSION,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Console link to GRBL-family CNC controllers", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports that look like CNC controllers
    Ports,
    /// Connect and send commands read from stdin
    Connect(ConnectArgs),
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// Serial port; given without a value, the first CNC-looking port
    #[arg(long, num_args = 0..=1, default_missing_value = "", conflicts_with_all = ["ws", "ble"])]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// WebSocket endpoint (ws:// or wss://)
    #[arg(long, conflicts_with = "ble")]
    ws: Option<String>,

    /// Bluetooth LE UART device; optionally filtered by advertised name
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    ble: Option<String>,

    /// Settings file (.toml or .json); defaults to the user config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Status poll period in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,
}

impl ConnectArgs {
    /// Settings file values overridden by command-line flags
    fn settings(&self) -> anyhow::Result<LinkSettings> {
        let mut settings = match &self.config {
            Some(path) => LinkSettings::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => LinkSettings::load_or_default()?,
        };
        self.apply_overrides(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut LinkSettings) {
        let connection = &mut settings.connection;
        if let Some(port) = &self.serial {
            connection.transport = TransportKind::Serial;
            connection.serial_port = non_empty(port);
        }
        if let Some(baud) = self.baud {
            connection.baud_rate = baud;
        }
        if let Some(url) = &self.ws {
            connection.transport = TransportKind::WebSocket;
            connection.websocket_url = Some(url.clone());
        }
        if let Some(name) = &self.ble {
            connection.transport = TransportKind::Gatt;
            connection.ble_device_name = non_empty(name);
        }
        if let Some(poll_ms) = self.poll_ms {
            settings.poll_interval_ms = poll_ms;
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging_with(level, format)?;
    info!("cnclink {} (built {})", VERSION, BUILD_DATE);

    match cli.command {
        Command::Ports => print_ports(),
        Command::Connect(args) => run_console(args.settings()?).await,
    }
}

fn print_ports() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No CNC-like serial ports found");
    }
    for port in ports {
        let ids = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" [{:04x}:{:04x}]", vid, pid),
            _ => String::new(),
        };
        println!("{}  {}{}", port.port_name, port.description, ids);
    }
    Ok(())
}

async fn run_console(settings: LinkSettings) -> anyhow::Result<()> {
    let config = settings.connection_config();
    let manager = ConnectionManager::with_config(settings.manager_config());
    let mut events = manager.subscribe();

    manager
        .connect(config.clone())
        .await
        .with_context(|| format!("connecting via {}", config))?;
    println!("Connected ({}). Type :help for console commands.", config);

    let mut printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(LinkEvent::LogAppended(entry)) => println!("{}", entry),
                Ok(LinkEvent::StateChanged(CommunicatorState::Disconnected)) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Console skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_input(&manager, line.trim()).await {
                    break;
                }
            }
            _ = &mut printer => {
                println!("Session ended");
                return Ok(());
            }
        }
    }

    manager.disconnect().await?;
    printer.abort();
    Ok(())
}

/// Run one console line; returns `false` to quit
async fn handle_input(manager: &ConnectionManager, line: &str) -> bool {
    let result = match line {
        "" => Ok(()),
        ":quit" | ":q" => return false,
        ":help" => {
            println!(":reset :status :log :home :unlock :quit; anything else is sent as-is");
            Ok(())
        }
        ":reset" => manager.reset().await,
        ":home" => manager.send_command(&commands::home()).await,
        ":unlock" => manager.send_command(&commands::unlock()).await,
        ":status" => {
            let state = manager.machine_state();
            println!(
                "{}  WPos {}  MPos {}  F{} S{}",
                state.status,
                state.work_position,
                state.machine_position,
                state.feed_rate,
                state.spindle_speed
            );
            Ok(())
        }
        ":log" => {
            for entry in manager.event_log().snapshot() {
                println!("{}", entry);
            }
            Ok(())
        }
        command => manager.send_command(command).await,
    };
    if let Err(e) = result {
        eprintln!("!! {}", e);
    }
    true
}
