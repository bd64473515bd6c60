//! In-process transport. Routes vote batches between nodes living in the
//! same process; used by tests and by single-binary simulations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, warn};
use takara_common::crypto::PublicKey;
use takara_common::model::Peer;
use tokio::sync::mpsc;

use crate::consensus::messages::VoteMessage;
use crate::network::{acceptable_batch, YacNetwork};

type VoteSender = mpsc::UnboundedSender<Vec<VoteMessage>>;

/// Shared routing table: public key to the node's inbound vote queue.
#[derive(Default)]
pub struct LocalHub {
    routes: Mutex<HashMap<PublicKey, VoteSender>>,
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a node and returns its inbound queue.
    pub fn register(&self, public_key: PublicKey) -> mpsc::UnboundedReceiver<Vec<VoteMessage>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(public_key, sender);
        }
        receiver
    }

    fn route(&self, public_key: &PublicKey) -> Option<VoteSender> {
        self.routes
            .lock()
            .ok()
            .and_then(|routes| routes.get(public_key).cloned())
    }
}

/// The sending half bound to one node.
pub struct LocalYacNetwork {
    hub: Arc<LocalHub>,
    stopped: AtomicBool,
}

impl LocalYacNetwork {
    pub fn new(hub: Arc<LocalHub>) -> Self {
        Self {
            hub,
            stopped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl YacNetwork for LocalYacNetwork {
    async fn send_state(&self, to: &Peer, state: Vec<VoteMessage>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if !acceptable_batch(&state) {
            warn!("refusing to send an empty or mixed-round batch");
            return;
        }
        match self.hub.route(&to.public_key) {
            Some(sender) => {
                let _ = sender.send(state);
            }
            None => debug!("no local route to {}", to.public_key),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Capturing transport for unit tests: remembers every send.
#[derive(Default)]
pub struct RecordingNetwork {
    pub sends: Mutex<Vec<(PublicKey, Vec<VoteMessage>)>>,
}

impl RecordingNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take_sends(&self) -> Vec<(PublicKey, Vec<VoteMessage>)> {
        self.sends
            .lock()
            .map(|mut sends| std::mem::take(&mut *sends))
            .unwrap_or_default()
    }
}

#[async_trait]
impl YacNetwork for RecordingNetwork {
    async fn send_state(&self, to: &Peer, state: Vec<VoteMessage>) {
        if let Ok(mut sends) = self.sends.lock() {
            sends.push((to.public_key, state));
        }
    }
}
