//! Typed publish/subscribe bus wiring the node's subsystems together.
//!
//! A fixed set of topics replaces ad-hoc callback plumbing: block commits,
//! raw and delayed consensus outcomes, applied rounds, block-creator events,
//! gate objects and synchronizer events. Subscribers get an independent
//! broadcast receiver; dropping it unsubscribes. The bus is constructed
//! explicitly during node wiring; tests build their own.

use std::sync::Arc;
use std::time::Duration;

use log::trace;
use tokio::sync::broadcast;

use takara_common::block::Block;

use crate::consensus::messages::{Answer, BlockCreatorEvent, GateObject, SyncEvent};
use crate::consensus::round::Round;

const CHANNEL_CAPACITY: usize = 256;

pub struct EventBus {
    on_block: broadcast::Sender<Arc<Block>>,
    on_outcome_from_yac: broadcast::Sender<Answer>,
    on_outcome_delayed: broadcast::Sender<Answer>,
    on_apply_state: broadcast::Sender<Round>,
    on_block_creator_event: broadcast::Sender<BlockCreatorEvent>,
    on_gate_object: broadcast::Sender<GateObject>,
    on_sync_event: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! topic {
    ($publish:ident, $subscribe:ident, $field:ident, $type:ty) => {
        pub fn $publish(&self, event: $type) {
            trace!("publish {}", stringify!($field));
            // no receivers is fine
            let _ = self.$field.send(event);
        }

        pub fn $subscribe(&self) -> broadcast::Receiver<$type> {
            self.$field.subscribe()
        }
    };
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            on_block: broadcast::channel(CHANNEL_CAPACITY).0,
            on_outcome_from_yac: broadcast::channel(CHANNEL_CAPACITY).0,
            on_outcome_delayed: broadcast::channel(CHANNEL_CAPACITY).0,
            on_apply_state: broadcast::channel(CHANNEL_CAPACITY).0,
            on_block_creator_event: broadcast::channel(CHANNEL_CAPACITY).0,
            on_gate_object: broadcast::channel(CHANNEL_CAPACITY).0,
            on_sync_event: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    topic!(publish_block, subscribe_blocks, on_block, Arc<Block>);
    topic!(
        publish_outcome_from_yac,
        subscribe_outcomes_from_yac,
        on_outcome_from_yac,
        Answer
    );
    topic!(
        publish_outcome_delayed,
        subscribe_outcomes_delayed,
        on_outcome_delayed,
        Answer
    );
    topic!(publish_apply_state, subscribe_apply_state, on_apply_state, Round);
    topic!(
        publish_block_creator_event,
        subscribe_block_creator_events,
        on_block_creator_event,
        BlockCreatorEvent
    );
    topic!(publish_gate_object, subscribe_gate_objects, on_gate_object, GateObject);
    topic!(publish_sync_event, subscribe_sync_events, on_sync_event, SyncEvent);

    /// Publishes a delayed consensus outcome after `delay` without blocking
    /// the caller.
    pub fn publish_outcome_delayed_after(self: &Arc<Self>, delay: Duration, outcome: Answer) {
        let bus = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            bus.publish_outcome_delayed(outcome);
        });
    }
}
