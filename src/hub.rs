//! Connection registry and fan-out
//!
//! Two client populations share one hub: dashboards (full event stream)
//! and extensions (task sync only). Each connection owns a bounded
//! outbound queue; the socket task drains it. Broadcasting never awaits
//! a slow client: events are enqueued with `try_send` and connections
//! whose queue is gone or full are pruned after the sweep.

use axum::extract::ws::Message;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::events::{DashboardEvent, ExtensionEvent};

/// Outbound queue depth per connection. A client this far behind is
/// treated as dead.
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Opaque handle identifying one registered connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// Which client population a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Dashboard,
    Extension,
}

#[derive(Default)]
pub struct BroadcastHub {
    next_id: AtomicU64,
    dashboards: DashMap<u64, mpsc::Sender<Message>>,
    extensions: DashMap<u64, mpsc::Sender<Message>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning its id and the receiving half of
    /// its outbound queue
    pub fn register(&self, channel: Channel) -> (ConnectionId, mpsc::Receiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        self.registry(channel).insert(id, tx);
        info!(
            "{:?} client connected (id={}, {} active)",
            channel,
            id,
            self.registry(channel).len()
        );
        (ConnectionId(id), rx)
    }

    /// Drop a connection from the registry. Idempotent.
    pub fn unregister(&self, channel: Channel, id: ConnectionId) {
        if self.registry(channel).remove(&id.0).is_some() {
            info!(
                "{:?} client disconnected (id={}, {} active)",
                channel,
                id.0,
                self.registry(channel).len()
            );
        }
    }

    pub fn connection_count(&self, channel: Channel) -> usize {
        self.registry(channel).len()
    }

    /// Broadcast one event to every dashboard. Returns the number of
    /// connections that accepted the message.
    pub fn broadcast_dashboard(&self, event: &DashboardEvent) -> usize {
        match serde_json::to_string(event) {
            Ok(payload) => self.sweep(Channel::Dashboard, payload),
            Err(e) => {
                warn!("Failed to serialize dashboard event: {}", e);
                0
            }
        }
    }

    /// Broadcast one event to every extension client
    pub fn broadcast_extension(&self, event: &ExtensionEvent) -> usize {
        match serde_json::to_string(event) {
            Ok(payload) => self.sweep(Channel::Extension, payload),
            Err(e) => {
                warn!("Failed to serialize extension event: {}", e);
                0
            }
        }
    }

    /// Send one event to a single connection (reply path). Returns false
    /// when the connection is gone or its queue is full.
    pub fn send_to(&self, channel: Channel, id: ConnectionId, payload: String) -> bool {
        let registry = self.registry(channel);
        let delivered = match registry.get(&id.0) {
            Some(tx) => tx.try_send(Message::Text(payload.into())).is_ok(),
            None => false,
        };
        if !delivered {
            drop(registry.remove(&id.0));
        }
        delivered
    }

    /// Serialize-once fan-out. No awaits while iterating: dead
    /// connections are collected and pruned after the sweep.
    fn sweep(&self, channel: Channel, payload: String) -> usize {
        let registry = self.registry(channel);
        let mut delivered = 0usize;
        let mut dead: Vec<u64> = Vec::new();

        for entry in registry.iter() {
            let message = Message::Text(payload.clone().into());
            match entry.value().try_send(message) {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(*entry.key()),
            }
        }

        for id in dead {
            registry.remove(&id);
            warn!("Pruned unresponsive {:?} client (id={})", channel, id);
        }

        debug!(
            "Broadcast to {:?}: {} delivered, {} active",
            channel,
            delivered,
            registry.len()
        );
        delivered
    }

    fn registry(&self, channel: Channel) -> &DashMap<u64, mpsc::Sender<Message>> {
        match channel {
            Channel::Dashboard => &self.dashboards,
            Channel::Extension => &self.extensions,
        }
    }
}
