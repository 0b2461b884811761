//! phonelink - command line front end
//!
//! Thin wrapper over the library: `init` writes a default config,
//! `monitor` prints every event as a JSON line, `notify` shows a message
//! on the display.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use phonelink::{init_config_dir, load_settings, Connector, Event, Handler, Settings};

/// Script a remote interactive phone display
#[derive(Parser, Debug)]
#[command(name = "phonelink")]
#[command(about = "Client runtime for a remote interactive phone display", long_about = None)]
struct Args {
    /// Directory containing `.phonelink/config.toml`
    #[arg(long, value_name = "DIR", default_value = ".")]
    config_dir: PathBuf,

    /// Override `connection.server_url`
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Override `connection.device_id`
    #[arg(long, value_name = "ID")]
    device_id: Option<String>,

    /// Log to the rolling file in the data directory instead of stderr
    #[arg(long)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config file unless one exists
    Init,

    /// Connect and print every received event as a JSON line
    Monitor,

    /// Show a notification on the display
    Notify {
        message: String,

        /// Wait for the user to confirm it
        #[arg(long)]
        alert: bool,

        /// Display time in seconds (until dismissed when omitted)
        #[arg(long, value_name = "SECS")]
        time: Option<f64>,
    },
}

/// Events the monitor prints.
const MONITORED: [&str; 8] = [
    "data",
    "device",
    "devices",
    "client_device",
    "all_data",
    "error",
    "room_joined",
    "room_left",
];

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    if args.log_file {
        phonelink::core::logging::init()?;
    } else {
        phonelink::core::logging::init_stderr();
    }
    let settings = settings_from(&args);

    match args.command {
        Command::Init => {
            if init_config_dir(&args.config_dir)? {
                eprintln!(
                    "Created {}",
                    args.config_dir.join(".phonelink/config.toml").display()
                );
            } else {
                eprintln!("Config already exists, left untouched.");
            }
        }
        Command::Monitor => {
            let connector = connect(settings).await?;
            monitor(&connector).await?;
        }
        Command::Notify {
            message,
            alert,
            time,
        } => {
            let connector = connect(settings).await?;
            let display_time = time.and_then(|secs| Duration::try_from_secs_f64(secs).ok());
            let confirmed = connector.notify(message, display_time, alert).await?;
            if alert && !confirmed {
                eprintln!("Alert was not confirmed.");
            }
            connector.disconnect().await;
        }
    }
    Ok(())
}

async fn connect(settings: Settings) -> color_eyre::Result<Connector> {
    Connector::connect(settings)
        .await
        .wrap_err("failed to connect to the display server")
}

fn settings_from(args: &Args) -> Settings {
    let mut settings = load_settings(&args.config_dir);
    if let Some(server) = &args.server {
        settings.connection.server_url = server.clone();
    }
    if let Some(device_id) = &args.device_id {
        settings.connection.device_id = device_id.clone();
    }
    settings
}

async fn monitor(connector: &Connector) -> color_eyre::Result<()> {
    for name in MONITORED {
        connector.on(
            name,
            Handler::payload(move |event: &Event| {
                let line = serde_json::json!({"event": name, "payload": event.to_json()});
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{line}");
            }),
        )?;
    }
    eprintln!(
        "Monitoring '{}' on {} (Ctrl+C to stop)",
        connector.device_id(),
        connector.settings().connection.server_url
    );

    tokio::select! {
        _ = connector.wait() => eprintln!("Connection closed by server."),
        _ = tokio::signal::ctrl_c() => connector.disconnect().await,
    }
    Ok(())
}
