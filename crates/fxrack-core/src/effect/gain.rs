//! Gain effect - simple volume control
//!
//! The reference [`Effect`] implementation: demonstrates per-channel state
//! keyed by [`ChannelId`] and meta-parameter mapping. Zero latency.

use std::collections::HashMap;

use super::{Effect, EffectInfo};
use crate::types::{ChannelId, Sample};

/// Per-channel smoothing state
///
/// The gain ramps linearly across each buffer from the value the channel
/// last rendered at, so parameter jumps never click.
#[derive(Debug, Clone, Copy)]
struct ChannelGain {
    current: f32,
}

/// A simple gain (volume) effect
///
/// The meta-parameter maps linearly to a 0.0-2.0 multiplier, so 0.5 is
/// unity. Each channel ramps independently toward the target.
pub struct GainEffect {
    info: EffectInfo,
    target: f32,
    channels: HashMap<ChannelId, ChannelGain>,
}

impl GainEffect {
    /// Stable effect id used by the registry
    pub const ID: &'static str = "gain";

    /// Create a new gain effect at unity
    pub fn new() -> Self {
        Self {
            info: EffectInfo::new(Self::ID, "Gain"),
            target: 1.0,
            channels: HashMap::new(),
        }
    }

    /// The current target gain multiplier
    pub fn target_gain(&self) -> f32 {
        self.target
    }
}

impl Default for GainEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for GainEffect {
    fn info(&self) -> &EffectInfo {
        &self.info
    }

    fn attach_channel(&mut self, channel: &ChannelId) {
        self.channels
            .entry(channel.clone())
            .or_insert(ChannelGain { current: self.target });
    }

    fn detach_channel(&mut self, channel: &ChannelId) {
        self.channels.remove(channel);
    }

    fn process(&mut self, channel: &ChannelId, input: &[Sample], output: &mut [Sample]) {
        debug_assert_eq!(input.len(), output.len());

        let target = self.target;
        let start = match self.channels.get_mut(channel) {
            Some(state) => {
                let start = state.current;
                state.current = target;
                start
            }
            // Unattached channel: no ramp state, apply the target directly
            None => target,
        };

        let frames = input.len() / 2;
        if frames == 0 || (start - target).abs() < 1e-6 {
            for (out, sample) in output.iter_mut().zip(input) {
                *out = sample * target;
            }
            return;
        }

        let step = (target - start) / frames as f32;
        let mut gain = start;
        for (frame_in, frame_out) in input.chunks_exact(2).zip(output.chunks_exact_mut(2)) {
            gain += step;
            frame_out[0] = frame_in[0] * gain;
            frame_out[1] = frame_in[1] * gain;
        }
    }

    fn set_meta_parameter(&mut self, value: f32) {
        // 0.0-1.0 knob maps to 0.0-2.0 linear gain (0.5 = unity)
        self.target = value.clamp(0.0, 1.0) * 2.0;
    }

    fn reset(&mut self) {
        for state in self.channels.values_mut() {
            state.current = self.target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_by_default() {
        let mut effect = GainEffect::new();
        let channel = ChannelId::new("[Channel1]");
        effect.attach_channel(&channel);

        let input = [1.0, 0.5, -0.25, 0.0];
        let mut output = [0.0; 4];
        effect.process(&channel, &input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn test_meta_parameter_maps_to_gain() {
        let mut effect = GainEffect::new();
        effect.set_meta_parameter(1.0);
        assert_eq!(effect.target_gain(), 2.0);
        effect.set_meta_parameter(0.0);
        assert_eq!(effect.target_gain(), 0.0);
        effect.set_meta_parameter(0.5);
        assert_eq!(effect.target_gain(), 1.0);
    }

    #[test]
    fn test_ramp_reaches_target() {
        let mut effect = GainEffect::new();
        let channel = ChannelId::new("[Channel1]");
        effect.attach_channel(&channel);
        effect.set_meta_parameter(1.0); // gain 2.0

        let input = [1.0; 8];
        let mut output = [0.0; 8];
        effect.process(&channel, &input, &mut output);

        // Last frame sits at the target, earlier frames ramp up toward it
        assert!((output[7] - 2.0).abs() < 1e-4);
        assert!(output[0] < output[7]);

        // Second buffer is flat at the target
        effect.process(&channel, &input, &mut output);
        assert!(output.iter().all(|s| (s - 2.0).abs() < 1e-4));
    }

    #[test]
    fn test_per_channel_state_independent() {
        let mut effect = GainEffect::new();
        let a = ChannelId::new("[Channel1]");
        let b = ChannelId::new("[Channel2]");
        effect.attach_channel(&a);
        effect.set_meta_parameter(1.0);

        let input = [1.0; 4];
        let mut output = [0.0; 4];
        // Channel A ramps from 1.0; channel B was attached after the change
        effect.process(&a, &input, &mut output);
        let a_first = output[0];

        effect.attach_channel(&b);
        effect.process(&b, &input, &mut output);
        assert!((output[0] - 2.0).abs() < 1e-4);
        assert!(a_first < 2.0);
    }
}
