//! The effect rack - chain slots, commands, events, and control wiring
//!
//! [`EffectRack`] is the audio-side half: it owns the chain slots and is
//! the only code that touches them once audio is running. Its companion
//! [`RackController`] lives on the control path; the two communicate over
//! wait-free rings (commands in, events out), which is what makes the
//! mutation model safe: commands are drained at the start of each
//! `process` call, so every buffer is rendered against one consistent
//! configuration and the audio path never blocks, allocates, or frees.

pub mod chain;
pub mod chain_slot;
pub mod command;
pub mod controller;
pub mod controls;
pub mod event;
pub mod gc;
pub mod slot;

pub use chain::{BoundChain, ChainHandle, EffectChain};
pub use chain_slot::EffectChainSlot;
pub use command::{command_channel, RackCommand, COMMAND_QUEUE_CAPACITY};
pub use controller::RackController;
pub use controls::RackControls;
pub use event::{event_channel, EventSink, NavDirection, RackEvent, EVENT_QUEUE_CAPACITY};
pub use slot::EffectSlot;

use std::sync::Arc;

use crate::effect::EffectFactory;
use crate::error::{RackError, RackResult};
use crate::types::{ChannelId, Sample};

/// Default number of parallel chain slots in a rack
pub const DEFAULT_NUM_CHAIN_SLOTS: usize = 4;

/// Default maximum number of effect slots per chain slot
pub const DEFAULT_MAX_EFFECT_SLOTS: usize = 4;

/// The audio-side effect rack
///
/// Owned by (or moved into) the audio thread. The engine calls
/// [`process`](Self::process) once per buffer per active channel; pending
/// control commands are applied first, then the buffer is threaded through
/// every chain slot in rack order.
pub struct EffectRack {
    chain_slots: Vec<EffectChainSlot>,
    commands: rtrb::Consumer<RackCommand>,
}

impl EffectRack {
    /// Create a rack and its control-path counterpart
    ///
    /// The [`RackController`] keeps the factory; effects are instantiated
    /// on the control path only.
    pub fn new(
        num_chain_slots: usize,
        max_effect_slots: usize,
        factory: Arc<dyn EffectFactory>,
    ) -> (Self, RackController) {
        let (command_tx, command_rx) = command_channel();

        let mut chain_slots = Vec::with_capacity(num_chain_slots);
        let mut event_consumers = Vec::with_capacity(num_chain_slots);
        for index in 0..num_chain_slots {
            let (sink, consumer) = event_channel();
            chain_slots.push(EffectChainSlot::new(index, max_effect_slots, sink));
            event_consumers.push(consumer);
        }

        let controller = RackController::new(
            command_tx,
            event_consumers,
            factory,
            num_chain_slots,
            max_effect_slots,
        );

        (
            Self {
                chain_slots,
                commands: command_rx,
            },
            controller,
        )
    }

    /// Number of chain slots
    pub fn num_chain_slots(&self) -> usize {
        self.chain_slots.len()
    }

    /// Access a chain slot (audio-side introspection)
    pub fn chain_slot(&self, index: usize) -> Option<&EffectChainSlot> {
        self.chain_slots.get(index)
    }

    /// Mutable access to a chain slot, for single-threaded embeddings
    /// that drive the slot contract directly instead of via commands
    pub fn chain_slot_mut(&mut self, index: usize) -> Option<&mut EffectChainSlot> {
        self.chain_slots.get_mut(index)
    }

    /// Drain and apply all pending control commands
    ///
    /// Called automatically at the start of every `process` call; this is
    /// the rack's single synchronization point with the control path.
    pub fn process_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: RackCommand) {
        use RackCommand::*;

        let chain_slot_index = match &command {
            LoadChain { chain_slot, .. }
            | AddEffectSlot { chain_slot }
            | LoadEffect { chain_slot, .. }
            | ClearEffect { chain_slot, .. }
            | RegisterChannel { chain_slot, .. }
            | SetChainEnabled { chain_slot, .. }
            | SetChannelEnabled { chain_slot, .. }
            | SetMix { chain_slot, .. }
            | SetParameter { chain_slot, .. }
            | SetSlotEnabled { chain_slot, .. }
            | SetSlotParameter { chain_slot, .. } => *chain_slot,
        };

        let Some(slot) = self.chain_slots.get_mut(chain_slot_index) else {
            log::warn!("Command for unknown chain slot {}", chain_slot_index);
            return;
        };

        // The controller validated indices against its mirror; a residual
        // mismatch here is stale, not fatal - log and move on.
        let result = match command {
            LoadChain { chain, .. } => {
                slot.load_effect_chain(*chain);
                Ok(())
            }
            AddEffectSlot { .. } => slot.add_effect_slot().map(|_| ()),
            LoadEffect { position, effect, .. } => slot.load_effect(position, Some(effect)),
            ClearEffect { position, .. } => slot.load_effect(position, None),
            RegisterChannel { channel, .. } => {
                slot.register_channel(&channel);
                Ok(())
            }
            SetChainEnabled { enabled, .. } => {
                slot.set_enabled(enabled);
                Ok(())
            }
            SetChannelEnabled { channel, enabled, .. } => {
                slot.set_channel_enabled(&channel, enabled);
                Ok(())
            }
            SetMix { mix, .. } => {
                slot.set_mix(mix);
                Ok(())
            }
            SetParameter { value, .. } => {
                slot.set_parameter(value);
                Ok(())
            }
            SetSlotEnabled { position, enabled, .. } => slot.set_slot_enabled(position, enabled),
            SetSlotParameter { position, value, .. } => slot.set_slot_parameter(position, value),
        };

        if let Err(error) = result {
            log::warn!("Stale rack command ignored: {}", error);
        }
    }

    /// Process one buffer for one channel through every chain slot
    ///
    /// Interleaved stereo; `input` and `output` must have equal, even
    /// lengths. Chain slots run in series (the output of slot N feeds
    /// slot N+1); disabled slots pass audio through untouched.
    pub fn process(&mut self, channel: &ChannelId, input: &[Sample], output: &mut [Sample]) {
        self.process_commands();

        let Some((first, rest)) = self.chain_slots.split_first_mut() else {
            output.copy_from_slice(input);
            return;
        };
        first.process(channel, input, output);
        for chain_slot in rest {
            chain_slot.process_in_place(channel, output);
        }
    }

    /// In-place variant of [`process`](Self::process)
    pub fn process_in_place(&mut self, channel: &ChannelId, buffer: &mut [Sample]) {
        self.process_commands();
        for chain_slot in &mut self.chain_slots {
            chain_slot.process_in_place(channel, buffer);
        }
    }

    /// Process one buffer through a single chain slot
    ///
    /// For engines that route channels through individual rack units
    /// instead of the whole series. Drains pending commands first, like
    /// [`process`](Self::process).
    pub fn process_slot(
        &mut self,
        index: usize,
        channel: &ChannelId,
        input: &[Sample],
        output: &mut [Sample],
    ) -> RackResult<()> {
        self.process_commands();
        let len = self.chain_slots.len();
        let chain_slot = self
            .chain_slots
            .get_mut(index)
            .ok_or(RackError::ChainSlotIndexOutOfBounds { index, len })?;
        chain_slot.process(channel, input, output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{
        Effect, EffectDescriptor, EffectFactory, EffectInfo, EffectRegistry,
    };
    use crate::error::RackError;
    use std::sync::Mutex;

    #[test]
    fn test_empty_rack_passthrough() {
        let (mut rack, _controller) =
            EffectRack::new(2, 4, Arc::new(EffectRegistry::with_builtins()));
        let channel = ChannelId::new("1");
        let input = [0.5, -0.5, 0.25, -0.25];
        let mut output = [0.0; 4];
        rack.process(&channel, &input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn test_commands_apply_through_process() {
        let (mut rack, mut controller) =
            EffectRack::new(1, 4, Arc::new(EffectRegistry::with_builtins()));
        let channel = ChannelId::new("1");

        controller.add_effect_slot(0).unwrap();
        controller.register_channel(0, &channel).unwrap();
        controller.set_channel_enabled(0, &channel, true).unwrap();
        let chain = EffectChain::new(
            "g",
            "Gain",
            vec![EffectDescriptor::new("gain", "Gain")],
        )
        .into_handle();
        controller.load_effect_chain(0, chain).unwrap();
        controller.set_parameter(0, 1.0).unwrap(); // gain x2

        let input = [1.0; 64];
        let mut output = [0.0; 64];
        rack.process(&channel, &input, &mut output);
        rack.process(&channel, &input, &mut output);
        assert!((output[0] - 2.0).abs() < 1e-3);

        let events = controller.poll_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, RackEvent::EffectChainLoaded { chain_slot: 0, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, RackEvent::EffectLoaded { slot: 0, effect: Some(_), .. })));
    }

    #[test]
    fn test_unregistered_channel_passes_through_rack() {
        let (mut rack, mut controller) =
            EffectRack::new(1, 4, Arc::new(EffectRegistry::with_builtins()));
        controller.add_effect_slot(0).unwrap();
        let chain = EffectChain::new(
            "g",
            "Gain",
            vec![EffectDescriptor::new("gain", "Gain")],
        )
        .into_handle();
        controller.load_effect_chain(0, chain).unwrap();
        controller.set_parameter(0, 0.0).unwrap(); // gain 0 would silence

        let channel = ChannelId::new("never-registered");
        let input = [1.0; 8];
        let mut output = [0.0; 8];
        rack.process(&channel, &input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn test_process_slot_targets_one_chain_slot() {
        let (mut rack, mut controller) =
            EffectRack::new(2, 4, Arc::new(EffectRegistry::with_builtins()));
        let channel = ChannelId::new("1");
        controller.add_effect_slot(1).unwrap();
        controller.register_channel(1, &channel).unwrap();
        controller.set_channel_enabled(1, &channel, true).unwrap();
        let chain = EffectChain::new(
            "g",
            "Gain",
            vec![EffectDescriptor::new("gain", "Gain")],
        )
        .into_handle();
        controller.load_effect_chain(1, chain).unwrap();
        controller.set_parameter(1, 0.0).unwrap(); // gain 0 silences

        let input = [1.0; 64];
        let mut output = [0.0; 64];
        // Chain slot 0 is untouched passthrough
        rack.process_slot(0, &channel, &input, &mut output).unwrap();
        assert_eq!(output, input);
        // Chain slot 1 applies its silencing gain (after the ramp settles)
        rack.process_slot(1, &channel, &input, &mut output).unwrap();
        rack.process_slot(1, &channel, &input, &mut output).unwrap();
        assert!(output[63].abs() < 1e-3);

        assert!(matches!(
            rack.process_slot(5, &channel, &input, &mut output),
            Err(RackError::ChainSlotIndexOutOfBounds { index: 5, len: 2 })
        ));
    }

    // ─────────────────────────────────────────────────────────────────
    // Chain-swap atomicity
    // ─────────────────────────────────────────────────────────────────
    // Each generation's chain is [writer, checker]: the writer stamps its
    // generation onto the buffer, the checker compares the stamp against
    // its own generation. A torn swap would pair a writer and checker
    // from different generations.

    struct GenWriter {
        info: EffectInfo,
        generation: f32,
    }

    struct GenChecker {
        info: EffectInfo,
        generation: f32,
        mismatches: Arc<Mutex<Vec<(f32, f32)>>>,
    }

    impl Effect for GenWriter {
        fn info(&self) -> &EffectInfo {
            &self.info
        }
        fn attach_channel(&mut self, _channel: &ChannelId) {}
        fn detach_channel(&mut self, _channel: &ChannelId) {}
        fn process(&mut self, _c: &ChannelId, _input: &[Sample], output: &mut [Sample]) {
            output.fill(self.generation);
        }
        fn set_meta_parameter(&mut self, _value: f32) {}
        fn reset(&mut self) {}
    }

    impl Effect for GenChecker {
        fn info(&self) -> &EffectInfo {
            &self.info
        }
        fn attach_channel(&mut self, _channel: &ChannelId) {}
        fn detach_channel(&mut self, _channel: &ChannelId) {}
        fn process(&mut self, _c: &ChannelId, input: &[Sample], output: &mut [Sample]) {
            if input[0] != self.generation {
                self.mismatches
                    .lock()
                    .unwrap()
                    .push((self.generation, input[0]));
            }
            output.copy_from_slice(input);
        }
        fn set_meta_parameter(&mut self, _value: f32) {}
        fn reset(&mut self) {}
    }

    struct GenFactory {
        mismatches: Arc<Mutex<Vec<(f32, f32)>>>,
    }

    impl EffectFactory for GenFactory {
        fn create(&self, descriptor: &EffectDescriptor) -> Option<Box<dyn Effect>> {
            let (kind, generation) = descriptor.id.split_once(':')?;
            let generation: f32 = generation.parse().ok()?;
            match kind {
                "writer" => Some(Box::new(GenWriter {
                    info: EffectInfo::new("writer", "Writer"),
                    generation,
                })),
                "checker" => Some(Box::new(GenChecker {
                    info: EffectInfo::new("checker", "Checker"),
                    generation,
                    mismatches: self.mismatches.clone(),
                })),
                _ => None,
            }
        }
    }

    fn generation_chain(generation: u32) -> ChainHandle {
        EffectChain::new(
            format!("gen-{}", generation),
            format!("Generation {}", generation),
            vec![
                EffectDescriptor::new(format!("writer:{}", generation), "Writer"),
                EffectDescriptor::new(format!("checker:{}", generation), "Checker"),
            ],
        )
        .into_handle()
    }

    #[test]
    fn test_chain_swap_is_atomic_across_threads() {
        let mismatches = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(GenFactory {
            mismatches: mismatches.clone(),
        });
        let (mut rack, mut controller) = EffectRack::new(1, 2, factory);

        let channel = ChannelId::new("1");
        controller.add_effect_slot(0).unwrap();
        controller.add_effect_slot(0).unwrap();
        controller.register_channel(0, &channel).unwrap();
        controller.set_channel_enabled(0, &channel, true).unwrap();
        controller.load_effect_chain(0, generation_chain(0)).unwrap();

        let audio = std::thread::spawn(move || {
            let input = [1.0; 128];
            let mut output = [0.0; 128];
            for _ in 0..2000 {
                rack.process(&channel, &input, &mut output);
                // Every buffer must be uniform: one generation end to end
                assert!(output.windows(2).all(|w| w[0] == w[1]));
            }
            rack
        });

        for generation in 1..200u32 {
            loop {
                match controller.load_effect_chain(0, generation_chain(generation)) {
                    Ok(()) => break,
                    Err(RackError::ControlQueueFull) => std::thread::yield_now(),
                    Err(other) => panic!("unexpected control error: {}", other),
                }
            }
        }

        let _rack = audio.join().unwrap();
        let mismatches = mismatches.lock().unwrap();
        assert!(
            mismatches.is_empty(),
            "torn chain swap observed: {:?}",
            &mismatches[..]
        );
    }
}
