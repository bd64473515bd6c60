//! Line-delimited JSON transport over TCP.
//!
//! One connection carries one exchange: a vote batch with an
//! acknowledgement, or a block request answered by a stream of block lines
//! closed by EOF. Transient send failures retry with exponential backoff;
//! a cancelled batch does not.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use takara_common::block::Block;
use takara_common::crypto::PublicKey;
use takara_common::model::Peer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::consensus::messages::VoteMessage;
use crate::network::block_loader::{stateless_valid, BlockLoader, BlockLoaderService};
use crate::network::retry::{with_retry, RetryPolicy};
use crate::network::{acceptable_batch, YacNetwork};

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    State { votes: Vec<VoteMessage> },
    BlocksRequest { height: u64 },
    BlockRequest { height: u64 },
    Block { block: Block },
    Ack { accepted: bool },
}

/// Accepting side: votes go to the queue, block requests are served from
/// the loader service.
pub struct TransportServer {
    loader: Arc<BlockLoaderService>,
    votes: mpsc::UnboundedSender<Vec<VoteMessage>>,
}

impl TransportServer {
    pub fn new(
        loader: Arc<BlockLoaderService>,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<VoteMessage>>) {
        let (votes, receiver) = mpsc::unbounded_channel();
        (Self { loader, votes }, receiver)
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        info!(
            "transport listening on {}",
            listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default()
        );
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream).await;
                    });
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                    return;
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream) {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let message = match serde_json::from_str::<WireMessage>(&line) {
                Ok(message) => message,
                Err(e) => {
                    debug!("dropping an unparsable frame: {}", e);
                    return;
                }
            };
            match message {
                WireMessage::State { votes } => {
                    let accepted = acceptable_batch(&votes);
                    if accepted {
                        let _ = self.votes.send(votes);
                    } else {
                        warn!("cancelling an empty or mixed-round batch");
                    }
                    if write_line(&mut write, &WireMessage::Ack { accepted })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                WireMessage::BlocksRequest { height } => {
                    match self.loader.blocks_after(height) {
                        Ok(blocks) => {
                            for block in blocks {
                                if write_line(&mut write, &WireMessage::Block { block })
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                        Err(e) => warn!("failed to serve blocks after {}: {}", height, e),
                    }
                    return;
                }
                WireMessage::BlockRequest { height } => {
                    match self.loader.get_block(height) {
                        Ok(Some(block)) => {
                            let _ = write_line(&mut write, &WireMessage::Block { block }).await;
                        }
                        Ok(None) => debug!("no block at height {}", height),
                        Err(e) => warn!("failed to serve block {}: {}", height, e),
                    }
                    return;
                }
                _ => return,
            }
        }
    }
}

async fn write_line(
    write: &mut (impl AsyncWriteExt + Unpin),
    message: &WireMessage,
) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    write.write_all(&line).await
}

/// Sending side of the consensus wire protocol.
pub struct TcpYacNetwork {
    policy: RetryPolicy,
    stopped: AtomicBool,
}

impl Default for TcpYacNetwork {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl TcpYacNetwork {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            stopped: AtomicBool::new(false),
        }
    }

    async fn send_once(address: &str, state: &[VoteMessage]) -> Result<(), String> {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(|e| e.to_string())?;
        let message = WireMessage::State {
            votes: state.to_vec(),
        };
        write_line(&mut stream, &message)
            .await
            .map_err(|e| e.to_string())?;

        let (read, _write) = stream.split();
        let mut lines = BufReader::new(read).lines();
        match lines.next_line().await.map_err(|e| e.to_string())? {
            Some(line) => match serde_json::from_str::<WireMessage>(&line) {
                Ok(WireMessage::Ack { accepted: true }) => Ok(()),
                // a cancelled batch will not become acceptable on retry
                Ok(WireMessage::Ack { accepted: false }) => {
                    warn!("peer cancelled the batch");
                    Ok(())
                }
                _ => Err("unexpected response".to_string()),
            },
            None => Err("connection closed before the acknowledgement".to_string()),
        }
    }
}

#[async_trait]
impl YacNetwork for TcpYacNetwork {
    async fn send_state(&self, to: &Peer, state: Vec<VoteMessage>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let address = to.address.clone();
        let result = with_retry(&self.policy, || {
            let address = address.clone();
            let state = state.clone();
            async move { Self::send_once(&address, &state).await }
        })
        .await;
        if let Err(e) = result {
            warn!("failed to send state to {}: {}", address, e);
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Block loader client resolving peer keys to transport addresses.
#[derive(Default)]
pub struct TcpBlockLoader {
    addresses: Mutex<HashMap<PublicKey, String>>,
}

impl TcpBlockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_peers(&self, peers: &[Peer]) {
        if let Ok(mut addresses) = self.addresses.lock() {
            for peer in peers {
                addresses.insert(peer.public_key, peer.address.clone());
            }
        }
    }

    fn address(&self, public_key: &PublicKey) -> Option<String> {
        self.addresses
            .lock()
            .ok()
            .and_then(|addresses| addresses.get(public_key).cloned())
    }

    async fn open_stream(
        &self,
        public_key: &PublicKey,
        request: WireMessage,
    ) -> Option<tokio::io::Lines<BufReader<OwnedReadHalf>>> {
        let address = self.address(public_key)?;
        let stream = match TcpStream::connect(&address).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("failed to connect to {}: {}", address, e);
                return None;
            }
        };
        let (read, mut write) = stream.into_split();
        if write_line(&mut write, &request).await.is_err() {
            return None;
        }
        Some(BufReader::new(read).lines())
    }
}

#[async_trait]
impl BlockLoader for TcpBlockLoader {
    async fn retrieve_blocks(&self, height: u64, peer: &PublicKey) -> BoxStream<'static, Block> {
        let Some(lines) = self
            .open_stream(peer, WireMessage::BlocksRequest { height })
            .await
        else {
            return stream::empty().boxed();
        };

        stream::unfold(lines, |mut lines| async move {
            let line = lines.next_line().await.ok().flatten()?;
            match serde_json::from_str::<WireMessage>(&line) {
                Ok(WireMessage::Block { block }) if stateless_valid(&block) => {
                    Some((block, lines))
                }
                // an invalid block ends the stream
                _ => None,
            }
        })
        .boxed()
    }

    async fn retrieve_block(&self, peer: &PublicKey, height: u64) -> Option<Block> {
        let mut lines = self
            .open_stream(peer, WireMessage::BlockRequest { height })
            .await?;
        let line = lines.next_line().await.ok().flatten()?;
        match serde_json::from_str::<WireMessage>(&line) {
            Ok(WireMessage::Block { block }) if stateless_valid(&block) => Some(block),
            _ => None,
        }
    }
}
