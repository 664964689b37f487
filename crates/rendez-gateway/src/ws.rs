// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport for the connection gateway.
//!
//! The first frame on a fresh connection must be the `auth` command; the
//! connection is closed if it does not arrive within the auth window. Each
//! connection runs three tasks: the main loop below, a sender task that
//! drains the outbound frame channel, and (after auth) a fan-in task that
//! forwards the session's bus topic into the loop.

use std::time::{Duration, Instant};

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use rendez_core::ServerFrame;

use crate::SharedGateway;
use crate::connection::{Connection, Flow};

/// Outbound frame buffer per connection.
const OUTBOUND_BUFFER: usize = 64;

/// How often the loop checks the idle and auth deadlines.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(gateway): State<SharedGateway>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, gateway))
}

/// Drive one WebSocket connection until it closes.
async fn handle_socket(socket: WebSocket, gateway: SharedGateway) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Sender task: forwards frames from the connection to the client.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut conn = Connection::new(gateway.clone(), out_tx.clone());
    debug!(connection_id = %conn.id(), "connection opened");

    // Bus fan-in is started once the connection authenticates.
    let (bus_tx, mut bus_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let mut bus_task: Option<JoinHandle<()>> = None;

    let opened = Instant::now();
    let mut last_activity = Instant::now();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.tick().await; // swallow the immediate first tick
    let shutdown = gateway.shutdown.clone();

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        let was_unauthenticated = conn.session().is_none();
                        let flow = conn.handle_text(&text).await;

                        if was_unauthenticated
                            && let Some(session) = conn.session()
                        {
                            let mut sub = gateway.subscribe(session);
                            let tx = bus_tx.clone();
                            bus_task = Some(tokio::spawn(async move {
                                while let Some(payload) = sub.recv().await {
                                    if tx.send(payload).await.is_err() {
                                        break;
                                    }
                                }
                            }));
                        }

                        if flow == Flow::Close {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Protocol is text-only; binary frames count as
                        // liveness but are otherwise ignored.
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(connection_id = %conn.id(), error = %e, "transport error");
                        break;
                    }
                }
            }
            Some(payload) = bus_rx.recv() => {
                if conn.handle_bus(&payload).await == Flow::Close {
                    break;
                }
            }
            _ = ticker.tick() => {
                if conn.session().is_none()
                    && opened.elapsed() >= gateway.config.auth_timeout
                {
                    info!(connection_id = %conn.id(), "auth deadline passed, closing");
                    break;
                }
                if last_activity.elapsed() >= gateway.config.idle_timeout {
                    info!(connection_id = %conn.id(), "idle timeout, detaching");
                    break;
                }
            }
            _ = shutdown.cancelled() => {
                conn.emit_shutting_down().await;
                break;
            }
        }
    }

    conn.detach().await;
    if let Some(task) = bus_task {
        task.abort();
    }

    // Let queued outbound frames drain before the socket is dropped.
    drop(conn);
    drop(out_tx);
    drop(bus_tx);
    let _ = tokio::time::timeout(gateway.config.drain_timeout, sender_task).await;
}
