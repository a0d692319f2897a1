//! Chain slots - the runtime containers that execute loaded chains
//!
//! An [`EffectChainSlot`] is one of a fixed number of parallel effect rack
//! units. It holds a bounded sequence of [`EffectSlot`]s (insertion order
//! is execution order), the currently loaded chain, chain-level controls
//! (enabled, mix, meta-parameter), and the per-channel enable map. Its
//! [`process`](EffectChainSlot::process) method is the one function called
//! from the real-time audio path.
//!
//! Chain replacement is atomic with respect to `process`: a buffer is
//! rendered either fully against the old chain or fully against the new
//! one. In the concurrent deployment this holds because mutations are
//! applied between buffers (see [`super::EffectRack`]); the generation
//! counter exists so that property can be verified.

use std::collections::HashMap;
use std::mem;

use crate::error::{RackError, RackResult};
use crate::types::{ChannelId, Sample, StereoBuffer, MAX_BUFFER_FRAMES};

use super::chain::{BoundChain, ChainHandle};
use super::event::{EventSink, NavDirection, RackEvent};
use super::slot::EffectSlot;

/// The runtime container for one effect rack unit
pub struct EffectChainSlot {
    index: usize,
    group: String,
    max_slots: usize,
    slots: Vec<EffectSlot>,
    chain: Option<ChainHandle>,
    /// Bumped on every chain load; all slots consulted within one
    /// `process` call belong to a single generation
    generation: u64,
    enabled: bool,
    channels: HashMap<ChannelId, bool>,
    mix: f32,
    parameter: f32,
    events: EventSink,
    // Ping-pong scratch plus dry retention for the final mix blend.
    // Pre-allocated so the steady-state path never allocates.
    scratch_a: StereoBuffer,
    scratch_b: StereoBuffer,
    dry: StereoBuffer,
}

impl EffectChainSlot {
    /// Create a chain slot at a fixed rack position
    pub fn new(index: usize, max_slots: usize, events: EventSink) -> Self {
        Self {
            index,
            group: Self::format_group(index),
            max_slots,
            slots: Vec::with_capacity(max_slots),
            chain: None,
            generation: 0,
            enabled: true,
            channels: HashMap::new(),
            mix: 1.0,
            parameter: 0.5,
            events,
            scratch_a: StereoBuffer::silence(MAX_BUFFER_FRAMES),
            scratch_b: StereoBuffer::silence(MAX_BUFFER_FRAMES),
            dry: StereoBuffer::silence(MAX_BUFFER_FRAMES),
        }
    }

    /// Derived group label for control-system addressing (1-based)
    ///
    /// Pure and total: chain slot 0 is always `"[EffectChain1]"`.
    pub fn format_group(index: usize) -> String {
        format!("[EffectChain{}]", index + 1)
    }

    /// This chain slot's rack index (immutable)
    pub fn index(&self) -> usize {
        self.index
    }

    /// This chain slot's group label
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Id of the loaded chain, or `""` when none is loaded
    pub fn id(&self) -> &str {
        self.chain.as_ref().map(|c| c.id()).unwrap_or("")
    }

    /// Human-readable name of the loaded chain, or `""`
    pub fn name(&self) -> &str {
        self.chain.as_ref().map(|c| c.name()).unwrap_or("")
    }

    /// Number of effect slots currently present (not the maximum)
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Configured maximum number of effect slots
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Append one empty effect slot at the next position
    ///
    /// Errors with [`RackError::SlotCapacity`] beyond the configured
    /// maximum; the slot count never exceeds it.
    pub fn add_effect_slot(&mut self) -> RackResult<usize> {
        if self.slots.len() >= self.max_slots {
            return Err(RackError::SlotCapacity {
                chain_slot: self.index,
                max: self.max_slots,
            });
        }
        let position = self.slots.len();
        self.slots.push(EffectSlot::new(position));
        self.events.emit(RackEvent::Updated { chain_slot: self.index });
        Ok(position)
    }

    /// Bounds-checked access to an effect slot
    pub fn effect_slot(&self, index: usize) -> RackResult<&EffectSlot> {
        self.slots.get(index).ok_or(RackError::SlotIndexOutOfBounds {
            index,
            len: self.slots.len(),
        })
    }

    /// Atomically replace the loaded chain
    ///
    /// Installs the bound chain's pre-instantiated effects into the
    /// existing slots (pointer swaps only), attaches registered channels,
    /// publishes the chain reference last, and emits the chain-loaded
    /// notification after the swap completes. Displaced effects are
    /// detached and dropped (deferred deallocation).
    pub fn load_effect_chain(&mut self, bound: BoundChain) {
        let BoundChain { chain, effects } = bound;
        let Self {
            index,
            slots,
            channels,
            events,
            parameter,
            ..
        } = self;

        let mut incoming = effects.into_iter();
        for slot in slots.iter_mut() {
            let mut next = incoming.next().flatten();
            if let Some(effect) = &mut next {
                for channel in channels.keys() {
                    effect.attach_channel(channel);
                }
            }
            if let Some(mut displaced) = slot.load_effect(next) {
                for channel in channels.keys() {
                    displaced.detach_channel(channel);
                }
            }
            slot.update_meta(*parameter);
            events.emit(RackEvent::EffectLoaded {
                chain_slot: *index,
                slot: slot.position(),
                effect: slot.effect_name(),
            });
        }
        // Effects bound for positions that no longer exist are dropped
        // here, deferred off the audio thread like everything else.
        drop(incoming);

        self.generation = self.generation.wrapping_add(1);
        self.chain = Some(chain.clone());
        log::info!(
            "{}: loaded chain '{}' ({})",
            self.group,
            chain.name(),
            chain.id()
        );
        self.events.emit(RackEvent::EffectChainLoaded {
            chain_slot: self.index,
            chain,
        });
        self.events.emit(RackEvent::Updated { chain_slot: self.index });
    }

    /// Load (or, with `None`, clear) a single effect at one slot position
    ///
    /// The displaced effect is detached from all registered channels and
    /// dropped (deferred deallocation). Emits the aggregate effect-loaded
    /// notification for the position; `None` signals removal.
    pub fn load_effect(
        &mut self,
        position: usize,
        effect: Option<basedrop::Owned<Box<dyn crate::effect::Effect>>>,
    ) -> RackResult<()> {
        let Self {
            index,
            slots,
            channels,
            events,
            parameter,
            ..
        } = self;

        let len = slots.len();
        let slot = slots
            .get_mut(position)
            .ok_or(RackError::SlotIndexOutOfBounds { index: position, len })?;

        let mut next = effect;
        if let Some(incoming) = &mut next {
            for channel in channels.keys() {
                incoming.attach_channel(channel);
            }
        }
        if let Some(mut displaced) = slot.load_effect(next) {
            for channel in channels.keys() {
                displaced.detach_channel(channel);
            }
        }
        slot.update_meta(*parameter);
        events.emit(RackEvent::EffectLoaded {
            chain_slot: *index,
            slot: position,
            effect: slot.effect_name(),
        });
        Ok(())
    }

    /// The currently loaded chain, if any
    pub fn effect_chain(&self) -> Option<&ChainHandle> {
        self.chain.as_ref()
    }

    /// Chain load generation counter
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Chain-level enabled flag
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the whole chain slot
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.events.emit(RackEvent::Updated { chain_slot: self.index });
        }
    }

    /// True only if chain-level enabled AND the channel is registered AND
    /// that channel's enable flag is set
    pub fn is_enabled_for_channel(&self, channel: &ChannelId) -> bool {
        self.enabled && self.channels.get(channel).copied().unwrap_or(false)
    }

    /// Register a channel, idempotently
    ///
    /// Adds a per-channel enable flag (default disabled) and attaches the
    /// channel to every loaded effect. Re-registration leaves the enable
    /// state untouched.
    pub fn register_channel(&mut self, channel: &ChannelId) {
        if self.channels.contains_key(channel) {
            return;
        }
        self.channels.insert(channel.clone(), false);
        for slot in &mut self.slots {
            if let Some(effect) = slot.effect_mut() {
                effect.attach_channel(channel);
            }
        }
    }

    /// Whether a channel has been registered
    pub fn is_channel_registered(&self, channel: &ChannelId) -> bool {
        self.channels.contains_key(channel)
    }

    /// Set a registered channel's enable flag
    ///
    /// An unregistered channel degrades gracefully: the call is a no-op
    /// (logged), not an error, and the channel stays disabled.
    pub fn set_channel_enabled(&mut self, channel: &ChannelId, enabled: bool) {
        match self.channels.get_mut(channel) {
            Some(flag) => {
                if *flag != enabled {
                    *flag = enabled;
                    self.events.emit(RackEvent::Updated { chain_slot: self.index });
                }
            }
            None => {
                log::warn!("{}: channel {} is not registered", self.group, channel);
            }
        }
    }

    /// Dry/wet mix, 0.0 = fully dry, 1.0 = fully wet
    pub fn mix(&self) -> f32 {
        self.mix
    }

    /// Set the dry/wet mix (applied continuously, no event)
    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    /// Chain-level meta-parameter, 0.0-1.0
    pub fn parameter(&self) -> f32 {
        self.parameter
    }

    /// Set the chain meta-parameter and fan it out to every loaded effect
    pub fn set_parameter(&mut self, value: f32) {
        self.parameter = value.clamp(0.0, 1.0);
        for slot in &mut self.slots {
            slot.update_meta(self.parameter);
        }
    }

    /// Enable or disable one effect slot position
    pub fn set_slot_enabled(&mut self, position: usize, enabled: bool) -> RackResult<()> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(position)
            .ok_or(RackError::SlotIndexOutOfBounds { index: position, len })?;
        slot.set_enabled(enabled);
        self.events.emit(RackEvent::Updated { chain_slot: self.index });
        Ok(())
    }

    /// Set one effect slot's parameter
    pub fn set_slot_parameter(&mut self, position: usize, value: f32) -> RackResult<()> {
        let len = self.slots.len();
        let chain_parameter = self.parameter;
        let slot = self
            .slots
            .get_mut(position)
            .ok_or(RackError::SlotIndexOutOfBounds { index: position, len })?;
        slot.set_parameter(value, chain_parameter);
        Ok(())
    }

    /// Ask the chain navigation arbiter for the next chain
    ///
    /// Emits a request carrying this slot's index and current chain;
    /// nothing changes until the arbiter loads a replacement through
    /// [`load_effect_chain`](Self::load_effect_chain).
    pub fn request_next_chain(&mut self) {
        self.events.emit(RackEvent::ChainNavigationRequested {
            chain_slot: self.index,
            direction: NavDirection::Next,
            current: self.chain.clone(),
        });
    }

    /// Ask the chain navigation arbiter for the previous chain
    pub fn request_prev_chain(&mut self) {
        self.events.emit(RackEvent::ChainNavigationRequested {
            chain_slot: self.index,
            direction: NavDirection::Prev,
            current: self.chain.clone(),
        });
    }

    /// The real-time entry point: process one buffer for one channel
    ///
    /// `input` and `output` are interleaved stereo and must have equal,
    /// even lengths. Disabled (chain-level or for this channel) or with no
    /// chain loaded, this is a pure passthrough copy. For in-place
    /// operation use [`process_in_place`](Self::process_in_place).
    pub fn process(&mut self, channel: &ChannelId, input: &[Sample], output: &mut [Sample]) {
        debug_assert_eq!(input.len(), output.len());
        debug_assert!(input.len() % 2 == 0);

        if !self.is_processing(channel) {
            output.copy_from_slice(input);
            return;
        }
        self.dry.copy_from_interleaved(input);
        self.run_chain(channel, output);
    }

    /// In-place variant of [`process`](Self::process)
    pub fn process_in_place(&mut self, channel: &ChannelId, buffer: &mut [Sample]) {
        debug_assert!(buffer.len() % 2 == 0);

        if !self.is_processing(channel) {
            return;
        }
        self.dry.copy_from_interleaved(buffer);
        self.run_chain(channel, buffer);
    }

    /// Branch-cheap steady-state gate for the audio path
    #[inline]
    fn is_processing(&self, channel: &ChannelId) -> bool {
        self.enabled && self.chain.is_some() && self.channels.get(channel).copied().unwrap_or(false)
    }

    /// Thread the dry buffer through every slot, then blend by mix
    ///
    /// The dry signal has already been captured in `self.dry`; `output`
    /// may be the caller's input buffer (in-place).
    fn run_chain(&mut self, channel: &ChannelId, output: &mut [Sample]) {
        let Self {
            index,
            slots,
            channels,
            events,
            scratch_a,
            scratch_b,
            dry,
            mix,
            ..
        } = self;

        let frames = dry.len();
        scratch_a.copy_from_interleaved(dry.as_interleaved());
        scratch_b.set_len_from_capacity(frames);

        let mut faulted = false;
        for slot in slots.iter_mut() {
            let ok = slot.process(
                channel,
                scratch_a.as_interleaved(),
                scratch_b.as_interleaved_mut(),
            );
            if !ok {
                // Isolate the fault: drop the effect (deferred) and carry
                // on with passthrough for this position.
                log::error!(
                    "[EffectChain{}]: effect at slot {} panicked; unloading",
                    *index + 1,
                    slot.position()
                );
                if let Some(mut displaced) = slot.take_effect() {
                    for ch in channels.keys() {
                        displaced.detach_channel(ch);
                    }
                }
                events.emit(RackEvent::EffectLoaded {
                    chain_slot: *index,
                    slot: slot.position(),
                    effect: None,
                });
                faulted = true;
            }
            mem::swap(scratch_a, scratch_b);
        }
        if faulted {
            events.emit(RackEvent::Updated { chain_slot: *index });
        }

        // Wet signal ended up in scratch_a; final dry/wet blend
        let wet = scratch_a.as_interleaved();
        let dry = dry.as_interleaved();
        let mix = mix.clamp(0.0, 1.0);
        if mix >= 1.0 {
            output.copy_from_slice(wet);
        } else if mix <= 0.0 {
            output.copy_from_slice(dry);
        } else {
            for ((out, &w), &d) in output.iter_mut().zip(wet).zip(dry) {
                *out = d + (w - d) * mix;
            }
        }
    }
}
