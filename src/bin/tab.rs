//! asanatabs-tab: a terminal tab for the sync daemon
//!
//! Usage:
//!   asanatabs-tab show
//!   asanatabs-tab watch
//!   asanatabs-tab create --workspace 1200000000000001 "Renew passport" --due 2024-03-01
//!   asanatabs-tab --config asanatabs.json create "Renew passport"
//!   asanatabs-tab done 1200000000000042

use asanatabs::adapter::TabState;
use asanatabs::channel::protocol::{decode_engine_message, encode};
use asanatabs::channel::{EngineMessage, MutationId, TabMessage};
use asanatabs::cli::{create_workspace, TabArgs, TabCommand};
use asanatabs::model::NewTask;
use chrono::Local;
use clap::Parser;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Error = Box<dyn std::error::Error>;

const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = TabArgs::parse();
    let config = args.load_config()?;

    let (socket, _) = connect_async(args.channel_url())
        .await
        .map_err(|e| format!("Cannot reach daemon at {}: {}", args.server, e))?;
    let (mut tx, mut rx) = socket.split();
    let mut state = TabState::new();

    // The daemon always greets a new tab with its cached snapshot
    wait_for(&mut rx, &mut state, |m| {
        matches!(m, EngineMessage::SnapshotUpdate { .. })
    })
    .await?;

    match args.command {
        TabCommand::Show => {
            wait_for(&mut rx, &mut state, |m| {
                matches!(
                    m,
                    EngineMessage::SnapshotUpdate {
                        is_from_local_cache: false,
                        ..
                    } | EngineMessage::PullFailed { .. }
                )
            })
            .await?;
            print_state(&state);
        }
        TabCommand::Watch => {
            print_state(&state);
            loop {
                tokio::select! {
                    message = next_message(&mut rx) => {
                        match message? {
                            Some(message) => {
                                state.apply(message);
                                print_state(&state);
                            }
                            None => {
                                println!("Daemon closed the channel");
                                break;
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        TabCommand::Create {
            workspace,
            title,
            due,
        } => {
            let workspace = create_workspace(workspace, &config)
                .ok_or("No workspace given: pass --workspace or set default_workspace_id")?;
            let mut fields = NewTask::named(title);
            fields.due_on = due;
            let message = state.create_task(&workspace, fields)?;
            send_mutation(&mut tx, &mut rx, &mut state, message).await?;
        }
        TabCommand::Done { task_id } => {
            let message = state
                .mark_done(&task_id)
                .ok_or_else(|| format!("Task {} is not synced yet", task_id))?;
            send_mutation(&mut tx, &mut rx, &mut state, message).await?;
        }
    }

    let _ = tx.close().await;
    Ok(())
}

async fn next_message(rx: &mut SplitStream<Socket>) -> Result<Option<EngineMessage>, Error> {
    while let Some(frame) = rx.next().await {
        match frame? {
            Message::Text(text) => match decode_engine_message(&text) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => eprintln!("Ignoring message: {}", e),
            },
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

/// Apply messages until one matches `done`. Fails on timeout or when the daemon hangs up.
async fn wait_for(
    rx: &mut SplitStream<Socket>,
    state: &mut TabState,
    done: impl Fn(&EngineMessage) -> bool,
) -> Result<EngineMessage, Error> {
    tokio::time::timeout(REPLY_TIMEOUT, apply_until(rx, state, done))
        .await
        .map_err(|_| "Timed out waiting for the daemon")?
}

async fn apply_until(
    rx: &mut SplitStream<Socket>,
    state: &mut TabState,
    done: impl Fn(&EngineMessage) -> bool,
) -> Result<EngineMessage, Error> {
    loop {
        let message = next_message(rx)
            .await?
            .ok_or("Daemon closed the channel")?;
        state.apply(message.clone());
        if done(&message) {
            return Ok(message);
        }
    }
}

async fn send_mutation(
    tx: &mut SplitSink<Socket, Message>,
    rx: &mut SplitStream<Socket>,
    state: &mut TabState,
    message: TabMessage,
) -> Result<(), Error> {
    let id: MutationId = match &message {
        TabMessage::CreateTask { mutation_id, .. } | TabMessage::UpdateTask { mutation_id, .. } => {
            *mutation_id
        }
        TabMessage::RequestPull => return Err("not a mutation".into()),
    };
    tx.send(Message::Text(encode(&message)?)).await?;

    let reply = wait_for(rx, state, |m| match m {
        EngineMessage::MutationApplied { mutation_id, .. }
        | EngineMessage::MutationFailed { mutation_id, .. } => *mutation_id == id,
        _ => false,
    })
    .await?;

    match reply {
        EngineMessage::MutationApplied { task, .. } => {
            println!("OK {} {}", task.id(), task.title());
            Ok(())
        }
        EngineMessage::MutationFailed { reason, .. } => Err(reason.into()),
        _ => Ok(()),
    }
}

fn print_state(state: &TabState) {
    let now = Local::now();
    let buckets = state.buckets(&now);

    let mut header = format!("{:?}", state.status());
    if state.is_from_local_cache() {
        header.push_str(" (cached)");
    }
    if let Some(error) = state.last_error() {
        header.push_str(&format!(" - {}", error));
    }
    println!("{}", header);

    for (label, tasks) in [
        ("Today", &buckets.today),
        ("Tomorrow", &buckets.tomorrow),
        ("Upcoming", &buckets.upcoming),
    ] {
        println!("\n{} ({})", label, tasks.len());
        for task in tasks {
            let due = task.due().map(|d| d.to_string()).unwrap_or_default();
            println!(
                "  {} {:<40} {:<22} {} [{}]",
                state.color_for(task).unwrap_or("#------"),
                task.title(),
                due,
                task.id(),
                task.workspace_name()
            );
        }
    }
}
