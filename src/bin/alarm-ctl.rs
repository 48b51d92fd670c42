//! Operator tool for a running door alarm.
//!
//! Connects to the status websocket to query, arm or disarm monitoring.
//!
//! Usage:
//!   cargo run --bin alarm-ctl -- status
//!   cargo run --bin alarm-ctl -- arm
//!   cargo run --bin alarm-ctl -- disarm
//!   cargo run --bin alarm-ctl -- watch

use clap::{Parser, Subcommand};
use door_alarm::monitor::StatusEvent;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Default status socket URL
const DEFAULT_ALARM_URL: &str = "ws://localhost:8080";

/// How long to wait for the daemon to answer
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "alarm-ctl")]
#[command(about = "Query and control a running door alarm")]
struct Cli {
    /// Door alarm status socket URL
    #[arg(long, env = "DOOR_ALARM_URL", default_value = DEFAULT_ALARM_URL)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the armed flag and door status
    Status,
    /// Arm state-change notifications
    Arm,
    /// Disarm state-change notifications
    Disarm,
    /// Print every status change until interrupted
    Watch,
}

fn parse_event(message: &Message) -> Option<StatusEvent> {
    match message {
        Message::Text(text) => {
            let text_str: &str = text;
            serde_json::from_str(text_str).ok()
        }
        _ => None,
    }
}

fn describe(event: StatusEvent) -> String {
    match event {
        StatusEvent::Status(status) => format!("door:  {}", status),
        StatusEvent::Armed(armed) => {
            format!("armed: {}", if armed { "yes" } else { "no" })
        }
    }
}

/// Outcome of an arm/disarm request. `None` means the wait timed out.
fn confirmation(armed: bool, confirmed: Option<bool>) -> Result<String, String> {
    match confirmed {
        Some(true) => Ok(format!(
            "Monitoring {}",
            if armed { "armed" } else { "disarmed" }
        )),
        Some(false) => Err("Connection closed before confirmation".to_string()),
        None => Err("Timeout waiting for confirmation".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (ws_stream, _) = connect_async(&cli.url).await.map_err(|e| {
        eprintln!("Failed to connect to {}", cli.url);
        eprintln!("Make sure door-alarm is running and LISTEN_ADDR is reachable.");
        eprintln!("Error: {}", e);
        e
    })?;

    let (mut write, mut read) = ws_stream.split();

    // The daemon sends the armed flag and the door status on connect.
    let mut initial = Vec::new();
    let greeting = tokio::time::timeout(RESPONSE_TIMEOUT, async {
        while initial.len() < 2 {
            match read.next().await {
                Some(Ok(msg)) => {
                    if let Some(event) = parse_event(&msg) {
                        initial.push(event);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok(())
    })
    .await;

    match greeting {
        Ok(Ok(())) if initial.len() == 2 => {}
        Ok(Ok(())) => return Err("Connection closed before the status arrived".into()),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err("Timeout waiting for status".into()),
    }

    match cli.command {
        Commands::Status => {
            for event in initial {
                println!("{}", describe(event));
            }
        }
        Commands::Arm | Commands::Disarm => {
            let armed = matches!(cli.command, Commands::Arm);
            let request = serde_json::json!({ "armed": armed });
            write.send(Message::Text(request.to_string().into())).await?;

            let confirmed = tokio::time::timeout(RESPONSE_TIMEOUT, async {
                while let Some(msg) = read.next().await {
                    if let Ok(msg) = msg
                        && parse_event(&msg) == Some(StatusEvent::Armed(armed))
                    {
                        return true;
                    }
                }
                false
            })
            .await;

            println!("{}", confirmation(armed, confirmed.ok())?);
        }
        Commands::Watch => {
            for event in initial {
                println!("{}", describe(event));
            }
            loop {
                tokio::select! {
                    msg = read.next() => match msg {
                        Some(Ok(Message::Close(_))) | None => {
                            println!("Server closed connection");
                            break;
                        }
                        Some(Ok(msg)) => {
                            if let Some(event) = parse_event(&msg) {
                                println!("{}", describe(event));
                            }
                        }
                        Some(Err(e)) => {
                            eprintln!("WebSocket error: {}", e);
                            break;
                        }
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    let _ = write.send(Message::Close(None)).await;
    Ok(())
}
