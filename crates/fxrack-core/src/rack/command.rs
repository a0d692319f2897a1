//! Lock-free command queue for real-time rack control
//!
//! The control path (user interaction, automation) sends commands over a
//! wait-free SPSC ring buffer; the audio path drains them at buffer
//! boundaries. That drain is the design's one synchronization point:
//! pointer and flag swaps only, never effect processing, so a concurrent
//! `process` call observes either fully the old or fully the new
//! configuration and a slow control action can never stall the callback.
//!
//! Large payloads (bound chains, effect instances) are built on the
//! control path and moved in boxed commands, keeping the enum small for
//! cache-efficient queueing. Whatever they displace on the audio thread is
//! freed via deferred deallocation ([`super::gc`]).

use basedrop::Owned;

use super::chain::BoundChain;
use crate::effect::Effect;
use crate::types::ChannelId;

/// Commands sent from the control path to the audio path
///
/// Each variant is one atomic mutation of rack state, applied between
/// buffers. Indices are validated on the control side before enqueueing;
/// the audio side ignores (and logs) anything stale.
pub enum RackCommand {
    /// Atomically replace the chain loaded in a chain slot
    ///
    /// Boxed: a `BoundChain` carries one pre-instantiated effect per slot.
    LoadChain {
        chain_slot: usize,
        chain: Box<BoundChain>,
    },

    /// Append one empty effect slot to a chain slot
    AddEffectSlot { chain_slot: usize },

    /// Load a single effect into one slot position
    LoadEffect {
        chain_slot: usize,
        position: usize,
        effect: Owned<Box<dyn Effect>>,
    },

    /// Remove the effect at one slot position
    ClearEffect { chain_slot: usize, position: usize },

    /// Register a channel on a chain slot (idempotent, default disabled)
    RegisterChannel {
        chain_slot: usize,
        channel: ChannelId,
    },

    /// Enable or disable a whole chain slot
    SetChainEnabled { chain_slot: usize, enabled: bool },

    /// Enable or disable one registered channel on a chain slot
    SetChannelEnabled {
        chain_slot: usize,
        channel: ChannelId,
        enabled: bool,
    },

    /// Set a chain slot's dry/wet mix (0.0 dry - 1.0 wet)
    SetMix { chain_slot: usize, mix: f32 },

    /// Set a chain slot's meta-parameter (fans out to loaded effects)
    SetParameter { chain_slot: usize, value: f32 },

    /// Enable or disable one effect slot position
    SetSlotEnabled {
        chain_slot: usize,
        position: usize,
        enabled: bool,
    },

    /// Set one effect slot's parameter
    SetSlotParameter {
        chain_slot: usize,
        position: usize,
        value: f32,
    },
}

/// Capacity of the command queue
///
/// A full preset switch is a single boxed `LoadChain` per chain slot, so
/// bursts stay small; 256 leaves generous headroom between drains.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair)
///
/// The producer belongs to the control path, the consumer to the audio
/// path. Both ends are wait-free.
pub fn command_channel() -> (rtrb::Producer<RackCommand>, rtrb::Consumer<RackCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_round_trip() {
        let (mut tx, mut rx) = command_channel();

        tx.push(RackCommand::SetMix {
            chain_slot: 1,
            mix: 0.5,
        })
        .unwrap();

        match rx.pop().unwrap() {
            RackCommand::SetMix { chain_slot, mix } => {
                assert_eq!(chain_slot, 1);
                assert_eq!(mix, 0.5);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn test_command_channel_empty() {
        let (_tx, mut rx) = command_channel();
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_command_size() {
        // Keep RackCommand small for cache efficiency in the ring buffer;
        // large payloads (BoundChain, effect instances) must stay boxed.
        let size = std::mem::size_of::<RackCommand>();
        assert!(size <= 48, "RackCommand is {} bytes, expected <= 48", size);
    }
}
