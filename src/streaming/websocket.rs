// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! WebSocket server for real-time streaming

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::core::LifecycleEvent;
use crate::realtime::ChangeEvent;
use crate::sensors::MotionReading;

/// Topic every client starts subscribed to
pub const ALL_TOPICS: &str = "*";

/// WebSocket server
pub struct WebSocketServer {
    port: u16,
    max_clients: usize,
    clients: Arc<RwLock<HashMap<String, ClientHandle>>>,
    broadcast_tx: broadcast::Sender<WebSocketMessage>,
}

struct ClientHandle {
    addr: SocketAddr,
    subscriptions: Vec<String>,
}

impl ClientHandle {
    fn wants(&self, topic: &str) -> bool {
        self.subscriptions
            .iter()
            .any(|s| s == ALL_TOPICS || s == topic)
    }
}

#[derive(Clone, Debug)]
pub enum WebSocketMessage {
    Reading(String),   // JSON
    Lifecycle(String), // JSON
    Change(String),    // JSON
    System(String),
}

impl WebSocketMessage {
    pub fn topic(&self) -> &'static str {
        match self {
            WebSocketMessage::Reading(_) => "reading",
            WebSocketMessage::Lifecycle(_) => "lifecycle",
            WebSocketMessage::Change(_) => "change",
            WebSocketMessage::System(_) => "system",
        }
    }

    /// Envelope sent over the wire
    pub fn envelope(&self) -> serde_json::Value {
        match self {
            WebSocketMessage::System(message) => serde_json::json!({
                "type": "system",
                "message": message,
            }),
            WebSocketMessage::Reading(json)
            | WebSocketMessage::Lifecycle(json)
            | WebSocketMessage::Change(json) => serde_json::json!({
                "type": self.topic(),
                "data": serde_json::from_str::<serde_json::Value>(json).unwrap_or_default(),
            }),
        }
    }
}

impl WebSocketServer {
    pub fn new(port: u16, max_clients: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1000);

        Self {
            port,
            max_clients,
            clients: Arc::new(RwLock::new(HashMap::new())),
            broadcast_tx,
        }
    }

    /// Bind and accept connections until `shutdown` fires
    ///
    /// Returns the bound address; port 0 picks a free one.
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<SocketAddr> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;

        info!("WebSocket server listening on ws://{}", local);

        let clients = self.clients.clone();
        let max_clients = self.max_clients;
        let broadcast_tx = self.broadcast_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                let client_count = clients.read().await.len();
                                if client_count >= max_clients {
                                    warn!("Max clients reached, rejecting connection from {}", addr);
                                    continue;
                                }

                                let clients = clients.clone();
                                let broadcast_rx = broadcast_tx.subscribe();

                                tokio::spawn(handle_connection(stream, addr, clients, broadcast_rx));
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("WebSocket server shutting down");
                        let _ = broadcast_tx.send(WebSocketMessage::System("shutdown".to_string()));
                        break;
                    }
                }
            }
        });

        Ok(local)
    }

    fn send_json<T: Serialize>(&self, data: &T, wrap: fn(String) -> WebSocketMessage) -> Result<()> {
        let json = serde_json::to_string(data)?;
        let _ = self.broadcast_tx.send(wrap(json));
        Ok(())
    }

    pub fn broadcast_reading(&self, reading: &MotionReading) -> Result<()> {
        self.send_json(reading, WebSocketMessage::Reading)
    }

    /// Only escalations and resolutions leave the process; pending falls,
    /// countdown ticks and false alarms stay private to the patient
    pub fn broadcast_lifecycle(&self, event: &LifecycleEvent) -> Result<()> {
        if !event.kind.is_emergency_step() {
            return Ok(());
        }
        self.send_json(event, WebSocketMessage::Lifecycle)
    }

    pub fn broadcast_change(&self, change: &ChangeEvent) -> Result<()> {
        self.send_json(change, WebSocketMessage::Change)
    }

    pub fn broadcast_system(&self, message: &str) {
        let _ = self
            .broadcast_tx
            .send(WebSocketMessage::System(message.to_string()));
    }

    pub async fn get_client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn get_client_addrs(&self) -> Vec<SocketAddr> {
        self.clients.read().await.values().map(|c| c.addr).collect()
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<RwLock<HashMap<String, ClientHandle>>>,
    mut broadcast_rx: broadcast::Receiver<WebSocketMessage>,
) {
    let client_id = uuid::Uuid::new_v4().to_string();

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    info!("New WebSocket connection from {} (id: {})", addr, client_id);

    clients.write().await.insert(
        client_id.clone(),
        ClientHandle {
            addr,
            subscriptions: vec![ALL_TOPICS.to_string()],
        },
    );

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let welcome = serde_json::json!({
        "type": "welcome",
        "client_id": client_id,
        "server": "SafeFall",
        "version": env!("CARGO_PKG_VERSION"),
        "topics": ["reading", "lifecycle", "change"],
    });

    if let Err(e) = ws_sender.send(Message::Text(welcome.to_string())).await {
        warn!("Failed to send welcome: {}", e);
    }

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received from {}: {}", addr, text);
                        if let Some(reply) = handle_command(&text, &client_id, &clients).await {
                            let _ = ws_sender.send(Message::Text(reply.to_string())).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client {}", addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            msg = broadcast_rx.recv() => {
                match msg {
                    Ok(WebSocketMessage::System(text)) if text == "shutdown" => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                    Ok(message) => {
                        let wanted = clients
                            .read()
                            .await
                            .get(&client_id)
                            .map_or(false, |c| c.wants(message.topic()));
                        if !wanted && !matches!(message, WebSocketMessage::System(_)) {
                            continue;
                        }
                        if let Err(e) = ws_sender.send(Message::Text(message.envelope().to_string())).await {
                            warn!("Failed to send to {}: {}", addr, e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} lagged, {} messages dropped", addr, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    clients.write().await.remove(&client_id);
    info!("WebSocket client {} disconnected", addr);
}

/// Apply a client command; returns the reply, if any
async fn handle_command(
    text: &str,
    client_id: &str,
    clients: &RwLock<HashMap<String, ClientHandle>>,
) -> Option<serde_json::Value> {
    let cmd = serde_json::from_str::<serde_json::Value>(text).ok()?;
    let cmd_type = cmd.get("type").and_then(|v| v.as_str())?;
    let topic = cmd.get("topic").and_then(|v| v.as_str());

    match (cmd_type, topic) {
        ("ping", _) => Some(serde_json::json!({"type": "pong"})),
        ("subscribe", Some(topic)) => {
            let mut clients = clients.write().await;
            let client = clients.get_mut(client_id)?;
            // An explicit subscription narrows the default catch-all
            client.subscriptions.retain(|s| s != ALL_TOPICS);
            if !client.subscriptions.iter().any(|s| s == topic) {
                client.subscriptions.push(topic.to_string());
            }
            Some(serde_json::json!({"type": "subscribed", "topic": topic}))
        }
        ("unsubscribe", Some(topic)) => {
            let mut clients = clients.write().await;
            let client = clients.get_mut(client_id)?;
            client.subscriptions.retain(|s| s != topic);
            Some(serde_json::json!({"type": "unsubscribed", "topic": topic}))
        }
        _ => None,
    }
}
