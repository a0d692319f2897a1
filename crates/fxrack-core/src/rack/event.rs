//! Rack events - fire-and-forget notifications to observers
//!
//! Events travel from the audio path to the control path over a wait-free
//! SPSC ring, then fan out to subscribers (UI, chain navigation arbiter).
//! Emission is best-effort and non-blocking: if the ring is full the event
//! is dropped, never the audio deadline. Every event describes fully
//! applied state - events are emitted after a mutation completes.

use std::sync::Arc;

use super::chain::ChainHandle;

/// Direction of a chain navigation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    /// Load the next configured chain
    Next,
    /// Load the previous configured chain
    Prev,
}

/// Notifications published by the rack
///
/// Payloads are index- and handle-based (`Arc<str>`, [`ChainHandle`]) so
/// emitting from the audio thread never allocates.
#[derive(Clone)]
pub enum RackEvent {
    /// An effect was loaded into (or removed from) an effect slot
    ///
    /// `effect` is the display name, or `None` when a previously loaded
    /// effect was removed.
    EffectLoaded {
        chain_slot: usize,
        slot: usize,
        effect: Option<Arc<str>>,
    },

    /// A chain was loaded into a chain slot (the swap is complete)
    EffectChainLoaded {
        chain_slot: usize,
        chain: ChainHandle,
    },

    /// Generic state-changed signal for a chain slot
    Updated { chain_slot: usize },

    /// Whoever is in charge of this chain slot should supply a replacement
    /// chain
    ///
    /// The slot never selects chains itself; the arbiter answers by
    /// loading a chain through the normal load path. No internal state
    /// changes until it does.
    ChainNavigationRequested {
        chain_slot: usize,
        direction: NavDirection,
        current: Option<ChainHandle>,
    },
}

impl std::fmt::Debug for RackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EffectLoaded { chain_slot, slot, effect } => f
                .debug_struct("EffectLoaded")
                .field("chain_slot", chain_slot)
                .field("slot", slot)
                .field("effect", effect)
                .finish(),
            Self::EffectChainLoaded { chain_slot, chain } => f
                .debug_struct("EffectChainLoaded")
                .field("chain_slot", chain_slot)
                .field("chain", &chain.id())
                .finish(),
            Self::Updated { chain_slot } => {
                f.debug_struct("Updated").field("chain_slot", chain_slot).finish()
            }
            Self::ChainNavigationRequested { chain_slot, direction, current } => f
                .debug_struct("ChainNavigationRequested")
                .field("chain_slot", chain_slot)
                .field("direction", direction)
                .field("current", &current.as_ref().map(|c| c.id().to_string()))
                .finish(),
        }
    }
}

/// Capacity of each chain slot's event ring
///
/// A chain load emits one event per effect slot plus two, so 64 gives
/// ample headroom between control-path polls.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Best-effort, non-blocking event producer owned by one chain slot
pub struct EventSink {
    producer: rtrb::Producer<RackEvent>,
}

impl EventSink {
    /// Emit an event; silently dropped if the ring is full
    #[inline]
    pub fn emit(&mut self, event: RackEvent) {
        let _ = self.producer.push(event);
    }
}

/// Create an event ring (sink/consumer pair) for one chain slot
pub fn event_channel() -> (EventSink, rtrb::Consumer<RackEvent>) {
    let (producer, consumer) = rtrb::RingBuffer::new(EVENT_QUEUE_CAPACITY);
    (EventSink { producer }, consumer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_round_trip() {
        let (mut sink, mut events) = event_channel();
        sink.emit(RackEvent::Updated { chain_slot: 3 });

        match events.pop() {
            Ok(RackEvent::Updated { chain_slot }) => assert_eq!(chain_slot, 3),
            other => panic!("unexpected event: {:?}", other.ok()),
        }
    }

    #[test]
    fn test_full_ring_drops_events() {
        let (mut sink, mut events) = event_channel();
        for _ in 0..EVENT_QUEUE_CAPACITY * 2 {
            sink.emit(RackEvent::Updated { chain_slot: 0 });
        }

        let mut drained = 0;
        while events.pop().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, EVENT_QUEUE_CAPACITY);
    }
}
