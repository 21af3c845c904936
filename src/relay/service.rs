//! Relay service - single task owning all room and profile state

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::lobby::RoomDetail;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ConnectionId, ServerMsg};

use super::dispatch::{Envelope, SessionRelay};

/// Depth of the shared input queue
const INPUT_QUEUE: usize = 1024;

/// Everything the relay task reacts to
#[derive(Debug)]
pub enum RelayInput {
    Connect {
        connection: ConnectionId,
        outbound: mpsc::Sender<ServerMsg>,
    },
    Message {
        connection: ConnectionId,
        msg: ClientMsg,
    },
    Malformed {
        connection: ConnectionId,
        reason: String,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Stats(oneshot::Sender<RelayStats>),
    Rooms(oneshot::Sender<Vec<RoomDetail>>),
}

/// Live counters for the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub rooms: usize,
    pub connections: usize,
    pub profiles: usize,
}

/// Cloneable sender side of the relay
#[derive(Clone)]
pub struct RelayHandle {
    input_tx: mpsc::Sender<RelayInput>,
    outbound_buffer: usize,
}

impl RelayHandle {
    /// Register a connection, returning its outbound queue
    pub async fn register(&self, connection: ConnectionId) -> Option<mpsc::Receiver<ServerMsg>> {
        let (outbound, outbound_rx) = mpsc::channel(self.outbound_buffer.max(1));
        self.input_tx
            .send(RelayInput::Connect {
                connection,
                outbound,
            })
            .await
            .ok()?;
        Some(outbound_rx)
    }

    /// Submit a parsed client message. Returns false once the relay is gone.
    pub async fn submit(&self, connection: ConnectionId, msg: ClientMsg) -> bool {
        self.input_tx
            .send(RelayInput::Message { connection, msg })
            .await
            .is_ok()
    }

    /// Report a frame that failed to parse
    pub async fn reject(&self, connection: ConnectionId, reason: String) {
        let _ = self
            .input_tx
            .send(RelayInput::Malformed { connection, reason })
            .await;
    }

    pub async fn unregister(&self, connection: ConnectionId) {
        let _ = self.input_tx.send(RelayInput::Disconnect { connection }).await;
    }

    pub async fn stats(&self) -> Option<RelayStats> {
        let (tx, rx) = oneshot::channel();
        self.input_tx.send(RelayInput::Stats(tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn rooms(&self) -> Option<Vec<RoomDetail>> {
        let (tx, rx) = oneshot::channel();
        self.input_tx.send(RelayInput::Rooms(tx)).await.ok()?;
        rx.await.ok()
    }
}

/// The relay task
pub struct RelayService {
    relay: SessionRelay,
    input_rx: mpsc::Receiver<RelayInput>,
    connections: HashMap<ConnectionId, mpsc::Sender<ServerMsg>>,
}

impl RelayService {
    pub fn new(config: &Config) -> (Self, RelayHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);
        let service = Self {
            relay: SessionRelay::new(config.start_mode, config.nickname_fallback),
            input_rx,
            connections: HashMap::new(),
        };
        let handle = RelayHandle {
            input_tx,
            outbound_buffer: config.outbound_buffer,
        };
        (service, handle)
    }

    /// Process inputs until every handle is dropped
    pub async fn run(mut self) {
        info!(start_mode = ?self.relay.registry().start_mode(), "Relay started");
        while let Some(input) = self.input_rx.recv().await {
            self.process(input);
        }
        info!("Relay stopped");
    }

    fn process(&mut self, input: RelayInput) {
        match input {
            RelayInput::Connect {
                connection,
                outbound,
            } => {
                self.connections.insert(connection, outbound);
                debug!(connection = %connection, total = self.connections.len(), "Connection registered");
                self.deliver(vec![Envelope {
                    to: connection,
                    msg: ServerMsg::Welcome {
                        connection_id: connection,
                        server_time: unix_millis(),
                    },
                }]);
            }
            RelayInput::Message { connection, msg } => {
                if !self.connections.contains_key(&connection) {
                    debug!(connection = %connection, "Message from unregistered connection");
                    return;
                }
                let envelopes = self.relay.handle(connection, msg);
                self.deliver(envelopes);
            }
            RelayInput::Malformed { connection, reason } => {
                self.deliver(vec![Envelope {
                    to: connection,
                    msg: ServerMsg::Error {
                        code: "bad_message".to_string(),
                        message: reason,
                    },
                }]);
            }
            RelayInput::Disconnect { connection } => {
                self.connections.remove(&connection);
                let envelopes = self.relay.disconnect(connection);
                self.deliver(envelopes);
                debug!(connection = %connection, total = self.connections.len(), "Connection unregistered");
            }
            RelayInput::Stats(reply) => {
                let registry = self.relay.registry();
                let _ = reply.send(RelayStats {
                    rooms: registry.room_count(),
                    connections: self.connections.len(),
                    profiles: registry.profiles().len(),
                });
            }
            RelayInput::Rooms(reply) => {
                let _ = reply.send(self.relay.registry().introspect());
            }
        }
    }

    /// Push envelopes into per-connection queues without waiting on slow peers
    fn deliver(&mut self, envelopes: Vec<Envelope>) {
        for Envelope { to, msg } in envelopes {
            let Some(outbound) = self.connections.get(&to) else {
                continue;
            };
            match outbound.try_send(msg) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    warn!(connection = %to, kind = msg_kind(&msg), "Outbound queue full, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection = %to, "Outbound queue closed");
                }
            }
        }
    }
}

fn msg_kind(msg: &ServerMsg) -> &'static str {
    match msg {
        ServerMsg::OpponentFruitMove { .. } => "opponentFruitMove",
        ServerMsg::OpponentCompleteState { .. } => "opponentCompleteState",
        ServerMsg::ScoreUpdate { .. } => "scoreUpdate",
        _ => "other",
    }
}
