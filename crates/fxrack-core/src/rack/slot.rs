//! Effect slots - one position in a chain slot
//!
//! An [`EffectSlot`] holds at most one effect instance at a fixed position.
//! An empty or disabled slot is a passthrough. The slot is also the fault
//! boundary for its effect: a panicking effect yields passthrough for the
//! current buffer instead of taking down the audio path.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use basedrop::Owned;

use crate::effect::Effect;
use crate::types::{ChannelId, Sample};

/// One position in a chain slot, holding zero or one effect
pub struct EffectSlot {
    position: usize,
    effect: Option<Owned<Box<dyn Effect>>>,
    enabled: bool,
    parameter: f32,
}

impl EffectSlot {
    /// Create an empty slot at a fixed position
    pub(crate) fn new(position: usize) -> Self {
        Self {
            position,
            effect: None,
            enabled: true,
            parameter: 1.0,
        }
    }

    /// Position within the owning chain slot (immutable after placement)
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether an effect is loaded
    pub fn is_loaded(&self) -> bool {
        self.effect.is_some()
    }

    /// Display name of the loaded effect, if any
    pub fn effect_name(&self) -> Option<Arc<str>> {
        self.effect.as_ref().map(|e| e.info().name.clone())
    }

    /// Whether this position is enabled (a disabled slot is a passthrough)
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable this position
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Slot-scoped parameter, normalized to 0.0-1.0
    pub fn parameter(&self) -> f32 {
        self.parameter
    }

    /// Set the slot parameter and refresh the held effect's meta-parameter
    ///
    /// The effective meta value is the slot parameter scaled by the chain
    /// parameter, so one chain-level knob sweeps every position.
    pub fn set_parameter(&mut self, value: f32, chain_parameter: f32) {
        self.parameter = value.clamp(0.0, 1.0);
        self.update_meta(chain_parameter);
    }

    /// Re-apply the effective meta-parameter after a chain-level change
    pub(crate) fn update_meta(&mut self, chain_parameter: f32) {
        if let Some(effect) = &mut self.effect {
            effect.set_meta_parameter((self.parameter * chain_parameter).clamp(0.0, 1.0));
        }
    }

    /// Replace the held effect, returning the previous one
    ///
    /// Ownership transfers both ways: the displaced effect must not be
    /// invoked by this slot again, and belongs to the caller (typically to
    /// be dropped, deferred via basedrop). Channel attach/detach is the
    /// owning chain slot's job since it knows the registered channels.
    pub(crate) fn load_effect(
        &mut self,
        effect: Option<Owned<Box<dyn Effect>>>,
    ) -> Option<Owned<Box<dyn Effect>>> {
        std::mem::replace(&mut self.effect, effect)
    }

    /// Remove and return the held effect
    pub(crate) fn take_effect(&mut self) -> Option<Owned<Box<dyn Effect>>> {
        self.effect.take()
    }

    /// Mutable access to the held effect (for channel lifecycle hooks)
    pub(crate) fn effect_mut(&mut self) -> Option<&mut Box<dyn Effect>> {
        self.effect.as_deref_mut()
    }

    /// Process one buffer, passthrough when empty or disabled
    ///
    /// Returns `false` if the effect panicked; the output is then the
    /// unmodified input and the caller should unload this slot.
    pub fn process(&mut self, channel: &ChannelId, input: &[Sample], output: &mut [Sample]) -> bool {
        debug_assert_eq!(input.len(), output.len());

        let Some(effect) = (self.enabled).then_some(self.effect.as_mut()).flatten() else {
            output.copy_from_slice(input);
            return true;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            effect.process(channel, input, output);
        }));

        if result.is_err() {
            // Whatever the effect wrote is suspect; hand the buffer through
            output.copy_from_slice(input);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::gain::GainEffect;
    use crate::effect::EffectInfo;
    use crate::rack::gc::gc_handle;

    fn boxed_gain() -> Owned<Box<dyn Effect>> {
        Owned::new(&gc_handle(), Box::new(GainEffect::new()) as Box<dyn Effect>)
    }

    #[test]
    fn test_empty_slot_is_passthrough() {
        let mut slot = EffectSlot::new(0);
        let channel = ChannelId::new("[Channel1]");
        let input = [0.25, -0.75, 1.0, 0.0];
        let mut output = [9.0; 4];

        assert!(slot.process(&channel, &input, &mut output));
        assert_eq!(output, input);
    }

    #[test]
    fn test_disabled_slot_is_passthrough() {
        let mut slot = EffectSlot::new(0);
        slot.load_effect(Some(boxed_gain()));
        slot.set_parameter(0.0, 1.0); // gain 0: would silence if applied
        slot.set_enabled(false);

        let channel = ChannelId::new("[Channel1]");
        let input = [1.0; 4];
        let mut output = [0.0; 4];
        assert!(slot.process(&channel, &input, &mut output));
        assert_eq!(output, input);
    }

    #[test]
    fn test_load_effect_transfers_ownership() {
        let mut slot = EffectSlot::new(2);
        assert!(slot.load_effect(Some(boxed_gain())).is_none());
        assert!(slot.is_loaded());
        assert_eq!(slot.effect_name().as_deref(), Some("Gain"));

        let previous = slot.load_effect(None);
        assert!(previous.is_some());
        assert!(!slot.is_loaded());
        assert_eq!(slot.position(), 2);
    }

    struct PanickingEffect {
        info: EffectInfo,
    }

    impl Effect for PanickingEffect {
        fn info(&self) -> &EffectInfo {
            &self.info
        }
        fn attach_channel(&mut self, _channel: &ChannelId) {}
        fn detach_channel(&mut self, _channel: &ChannelId) {}
        fn process(&mut self, _channel: &ChannelId, _input: &[Sample], _output: &mut [Sample]) {
            panic!("effect fault");
        }
        fn set_meta_parameter(&mut self, _value: f32) {}
        fn reset(&mut self) {}
    }

    #[test]
    fn test_panicking_effect_yields_passthrough() {
        let mut slot = EffectSlot::new(0);
        let effect: Box<dyn Effect> = Box::new(PanickingEffect {
            info: EffectInfo::new("boom", "Boom"),
        });
        slot.load_effect(Some(Owned::new(&gc_handle(), effect)));

        let channel = ChannelId::new("[Channel1]");
        let input = [0.5; 4];
        let mut output = [0.0; 4];
        assert!(!slot.process(&channel, &input, &mut output));
        assert_eq!(output, input);
    }
}
