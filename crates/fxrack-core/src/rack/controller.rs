//! Control-path handle to a running effect rack
//!
//! The [`RackController`] is the non-realtime half of the rack: it
//! validates mutations synchronously (capacity, bad indices) against a
//! local mirror of the rack's bookkeeping, instantiates effects through
//! the [`EffectFactory`] off the audio path, enqueues wait-free commands,
//! and drains rack events for fan-out to observers.
//!
//! Everything here is cheap and non-blocking: control callbacks may fire
//! close to the audio thread in degenerate hosts, so nothing in this
//! module performs I/O or unbounded-latency work.

use std::collections::HashSet;
use std::sync::Arc;

use basedrop::Owned;
use crossbeam::channel::{bounded, Receiver, Sender};

use crate::effect::{EffectDescriptor, EffectFactory};
use crate::error::{RackError, RackResult};
use crate::types::ChannelId;

use super::chain::{BoundChain, ChainHandle};
use super::command::RackCommand;
use super::event::{NavDirection, RackEvent};
use super::gc::gc_handle;

/// Per-subscriber buffer for fanned-out events
const SUBSCRIBER_CAPACITY: usize = 256;

/// Control-side bookkeeping for one chain slot
///
/// Kept in lockstep with the audio side by routing every structural
/// mutation through this controller; lets capacity and index errors be
/// reported synchronously without touching shared state.
struct ChainSlotMirror {
    num_slots: usize,
    chain: Option<ChainHandle>,
    channels: HashSet<ChannelId>,
}

/// The control-path facade of an [`super::EffectRack`]
pub struct RackController {
    commands: rtrb::Producer<RackCommand>,
    events: Vec<rtrb::Consumer<RackEvent>>,
    subscribers: Vec<Sender<RackEvent>>,
    factory: Arc<dyn EffectFactory>,
    mirrors: Vec<ChainSlotMirror>,
    max_slots: usize,
}

impl RackController {
    pub(crate) fn new(
        commands: rtrb::Producer<RackCommand>,
        events: Vec<rtrb::Consumer<RackEvent>>,
        factory: Arc<dyn EffectFactory>,
        num_chain_slots: usize,
        max_slots: usize,
    ) -> Self {
        Self {
            commands,
            events,
            subscribers: Vec::new(),
            factory,
            mirrors: (0..num_chain_slots)
                .map(|_| ChainSlotMirror {
                    num_slots: 0,
                    chain: None,
                    channels: HashSet::new(),
                })
                .collect(),
            max_slots,
        }
    }

    /// Number of chain slots in the rack
    pub fn num_chain_slots(&self) -> usize {
        self.mirrors.len()
    }

    /// Number of effect slots currently present in a chain slot
    pub fn num_slots(&self, chain_slot: usize) -> RackResult<usize> {
        Ok(self.mirror(chain_slot)?.num_slots)
    }

    /// The chain currently loaded in a chain slot, if any
    pub fn effect_chain(&self, chain_slot: usize) -> RackResult<Option<ChainHandle>> {
        Ok(self.mirror(chain_slot)?.chain.clone())
    }

    /// Subscribe to rack events (UI updates, navigation requests)
    ///
    /// Fan-out is best-effort: a subscriber that stops draining loses
    /// events rather than blocking the control path.
    pub fn subscribe(&mut self) -> Receiver<RackEvent> {
        let (tx, rx) = bounded(SUBSCRIBER_CAPACITY);
        self.subscribers.push(tx);
        rx
    }

    /// Append one empty effect slot to a chain slot
    ///
    /// Reports [`RackError::SlotCapacity`] synchronously beyond the
    /// configured maximum.
    pub fn add_effect_slot(&mut self, chain_slot: usize) -> RackResult<usize> {
        let max_slots = self.max_slots;
        let mirror = self.mirror_mut(chain_slot)?;
        if mirror.num_slots >= max_slots {
            return Err(RackError::SlotCapacity {
                chain_slot,
                max: max_slots,
            });
        }
        let position = mirror.num_slots;
        self.send(RackCommand::AddEffectSlot { chain_slot })?;
        self.mirrors[chain_slot].num_slots = position + 1;
        Ok(position)
    }

    /// Bind a chain's descriptors and atomically load it into a chain slot
    ///
    /// Effect instantiation happens here, on the control path; the audio
    /// path receives a fully-built chain and swaps pointers.
    pub fn load_effect_chain(&mut self, chain_slot: usize, chain: ChainHandle) -> RackResult<()> {
        let num_slots = self.mirror(chain_slot)?.num_slots;
        let bound = BoundChain::bind(chain.clone(), &*self.factory, num_slots);
        self.send(RackCommand::LoadChain {
            chain_slot,
            chain: Box::new(bound),
        })?;
        self.mirrors[chain_slot].chain = Some(chain);
        Ok(())
    }

    /// Load a single effect into one slot position
    ///
    /// An unrecognized descriptor clears the position instead (an empty
    /// effect reference signals removal).
    pub fn load_effect(
        &mut self,
        chain_slot: usize,
        position: usize,
        descriptor: &EffectDescriptor,
    ) -> RackResult<()> {
        self.check_position(chain_slot, position)?;
        match self.factory.create(descriptor) {
            Some(effect) => {
                let effect = Owned::new(&gc_handle(), effect);
                self.send(RackCommand::LoadEffect {
                    chain_slot,
                    position,
                    effect,
                })
            }
            None => {
                log::warn!(
                    "No factory match for effect '{}'; clearing slot {} of chain slot {}",
                    descriptor.id,
                    position,
                    chain_slot
                );
                self.send(RackCommand::ClearEffect { chain_slot, position })
            }
        }
    }

    /// Remove the effect at one slot position
    pub fn clear_effect(&mut self, chain_slot: usize, position: usize) -> RackResult<()> {
        self.check_position(chain_slot, position)?;
        self.send(RackCommand::ClearEffect { chain_slot, position })
    }

    /// Register a channel on a chain slot (idempotent, default disabled)
    pub fn register_channel(&mut self, chain_slot: usize, channel: &ChannelId) -> RackResult<()> {
        if !self.mirror(chain_slot)?.channels.contains(channel) {
            self.send(RackCommand::RegisterChannel {
                chain_slot,
                channel: channel.clone(),
            })?;
            self.mirrors[chain_slot].channels.insert(channel.clone());
        }
        Ok(())
    }

    /// Register a channel on every chain slot
    pub fn register_channel_all(&mut self, channel: &ChannelId) -> RackResult<()> {
        for chain_slot in 0..self.mirrors.len() {
            self.register_channel(chain_slot, channel)?;
        }
        Ok(())
    }

    /// Enable or disable a whole chain slot
    pub fn set_chain_enabled(&mut self, chain_slot: usize, enabled: bool) -> RackResult<()> {
        self.mirror(chain_slot)?;
        self.send(RackCommand::SetChainEnabled { chain_slot, enabled })
    }

    /// Enable or disable one channel on a chain slot
    ///
    /// An unregistered channel degrades gracefully to a logged no-op.
    pub fn set_channel_enabled(
        &mut self,
        chain_slot: usize,
        channel: &ChannelId,
        enabled: bool,
    ) -> RackResult<()> {
        if !self.mirror(chain_slot)?.channels.contains(channel) {
            log::warn!(
                "Channel {} is not registered on chain slot {}",
                channel,
                chain_slot
            );
            return Ok(());
        }
        self.send(RackCommand::SetChannelEnabled {
            chain_slot,
            channel: channel.clone(),
            enabled,
        })
    }

    /// Set a chain slot's dry/wet mix
    pub fn set_mix(&mut self, chain_slot: usize, mix: f32) -> RackResult<()> {
        self.mirror(chain_slot)?;
        self.send(RackCommand::SetMix { chain_slot, mix })
    }

    /// Set a chain slot's meta-parameter
    pub fn set_parameter(&mut self, chain_slot: usize, value: f32) -> RackResult<()> {
        self.mirror(chain_slot)?;
        self.send(RackCommand::SetParameter { chain_slot, value })
    }

    /// Enable or disable one effect slot position
    pub fn set_slot_enabled(
        &mut self,
        chain_slot: usize,
        position: usize,
        enabled: bool,
    ) -> RackResult<()> {
        self.check_position(chain_slot, position)?;
        self.send(RackCommand::SetSlotEnabled {
            chain_slot,
            position,
            enabled,
        })
    }

    /// Set one effect slot's parameter
    pub fn set_slot_parameter(
        &mut self,
        chain_slot: usize,
        position: usize,
        value: f32,
    ) -> RackResult<()> {
        self.check_position(chain_slot, position)?;
        self.send(RackCommand::SetSlotParameter {
            chain_slot,
            position,
            value,
        })
    }

    /// Ask the chain navigation arbiter for the next chain in a slot
    ///
    /// The rack never selects chains itself: this publishes a request
    /// carrying the slot's current chain, and whoever arbitrates chain
    /// order answers via [`load_effect_chain`](Self::load_effect_chain).
    pub fn request_next_chain(&mut self, chain_slot: usize) -> RackResult<()> {
        self.request_chain(chain_slot, NavDirection::Next)
    }

    /// Ask the chain navigation arbiter for the previous chain in a slot
    pub fn request_prev_chain(&mut self, chain_slot: usize) -> RackResult<()> {
        self.request_chain(chain_slot, NavDirection::Prev)
    }

    fn request_chain(&mut self, chain_slot: usize, direction: NavDirection) -> RackResult<()> {
        let current = self.mirror(chain_slot)?.chain.clone();
        self.broadcast(RackEvent::ChainNavigationRequested {
            chain_slot,
            direction,
            current,
        });
        Ok(())
    }

    /// Drain pending rack events, fan them out to subscribers, and return
    /// them
    ///
    /// Call this periodically from the control loop (e.g. the UI tick).
    pub fn poll_events(&mut self) -> Vec<RackEvent> {
        let mut drained = Vec::new();
        for consumer in &mut self.events {
            while let Ok(event) = consumer.pop() {
                drained.push(event);
            }
        }
        for event in &drained {
            self.broadcast(event.clone());
        }
        drained
    }

    fn broadcast(&mut self, event: RackEvent) {
        self.subscribers
            .retain(|subscriber| match subscriber.try_send(event.clone()) {
                Ok(()) => true,
                Err(crossbeam::channel::TrySendError::Full(_)) => true,
                Err(crossbeam::channel::TrySendError::Disconnected(_)) => false,
            });
    }

    fn send(&mut self, command: RackCommand) -> RackResult<()> {
        if self.commands.push(command).is_err() {
            log::warn!("Rack command queue full; mutation dropped");
            return Err(RackError::ControlQueueFull);
        }
        Ok(())
    }

    fn mirror(&self, chain_slot: usize) -> RackResult<&ChainSlotMirror> {
        self.mirrors
            .get(chain_slot)
            .ok_or(RackError::ChainSlotIndexOutOfBounds {
                index: chain_slot,
                len: self.mirrors.len(),
            })
    }

    fn mirror_mut(&mut self, chain_slot: usize) -> RackResult<&mut ChainSlotMirror> {
        let len = self.mirrors.len();
        self.mirrors
            .get_mut(chain_slot)
            .ok_or(RackError::ChainSlotIndexOutOfBounds {
                index: chain_slot,
                len,
            })
    }

    fn check_position(&self, chain_slot: usize, position: usize) -> RackResult<()> {
        let mirror = self.mirror(chain_slot)?;
        if position >= mirror.num_slots {
            return Err(RackError::SlotIndexOutOfBounds {
                index: position,
                len: mirror.num_slots,
            });
        }
        Ok(())
    }
}
