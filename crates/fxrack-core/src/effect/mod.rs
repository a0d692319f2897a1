//! Effect system - the processing trait, descriptors, and the factory
//!
//! The rack is effect-agnostic: anything implementing [`Effect`] can be
//! loaded into an effect slot. Concrete DSP lives elsewhere; this crate
//! ships only [`gain::GainEffect`] as a reference implementation.

pub mod gain;

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{ChannelId, Sample};

/// Static information about an effect instance
///
/// Names are stored as `Arc<str>` so they can be attached to events
/// emitted from the audio thread without allocating.
#[derive(Debug, Clone)]
pub struct EffectInfo {
    /// Stable identifier, matched against [`EffectDescriptor::id`]
    pub id: Arc<str>,
    /// Human-readable name for display
    pub name: Arc<str>,
}

impl EffectInfo {
    /// Create a new effect info
    pub fn new(id: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The core effect trait - implemented by all audio effects
///
/// One effect instance may process the audio of multiple channels; it keeps
/// whatever per-channel state it needs, keyed by [`ChannelId`]. The rack
/// calls the lifecycle hooks when channels are registered on its chain slot
/// and when the effect leaves a slot, so state can be allocated off the
/// audio path.
pub trait Effect: Send {
    /// Information about this effect (id, display name)
    fn info(&self) -> &EffectInfo;

    /// A channel was registered on the owning chain slot
    ///
    /// Called off the audio path; allocate per-channel state here.
    fn attach_channel(&mut self, channel: &ChannelId);

    /// The effect is leaving its slot, or the channel went away; drop any
    /// state held for this channel.
    fn detach_channel(&mut self, channel: &ChannelId);

    /// Process one buffer of interleaved stereo audio for a channel
    ///
    /// `input` and `output` have equal length. Effects that cannot produce
    /// into a separate buffer do not exist in this model: the owning slot
    /// always provides distinct input and output slices (ping-pong
    /// buffering makes in-place chain operation caller-transparent).
    fn process(&mut self, channel: &ChannelId, input: &[Sample], output: &mut [Sample]);

    /// Set the meta-parameter ("super knob"), normalized to 0.0-1.0
    ///
    /// Chain- and slot-level parameter controls fan out here. Effects with
    /// nothing meaningful to map may ignore it.
    fn set_meta_parameter(&mut self, value: f32);

    /// Reset all internal state (all channels)
    fn reset(&mut self);
}

/// Creates effect instances from descriptors
///
/// The mechanism that discovers and loads effect implementations is an
/// external collaborator; the rack consumes it behind this trait. Creation
/// happens on the control path, never in the audio callback.
pub trait EffectFactory: Send + Sync {
    /// Instantiate the effect a descriptor names, or `None` if unknown
    fn create(&self, descriptor: &EffectDescriptor) -> Option<Box<dyn Effect>>;
}

/// Describes an effect to load - the "what", not the instance
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EffectDescriptor {
    /// Stable effect identifier (e.g. `"gain"`)
    pub id: String,
    /// Human-readable name for display
    pub name: String,
}

impl EffectDescriptor {
    /// Create a new descriptor
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A simple id -> constructor registry implementing [`EffectFactory`]
///
/// Suitable for static effect sets (built-ins, tests, demos). Hosts with a
/// real plugin discovery layer implement [`EffectFactory`] themselves.
#[derive(Default)]
pub struct EffectRegistry {
    constructors: HashMap<String, fn() -> Box<dyn Effect>>,
}

impl EffectRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in effects registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(gain::GainEffect::ID, || Box::new(gain::GainEffect::new()));
        registry
    }

    /// Register a constructor under an effect id
    pub fn register(&mut self, id: impl Into<String>, constructor: fn() -> Box<dyn Effect>) {
        self.constructors.insert(id.into(), constructor);
    }

    /// Number of registered effect ids
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl EffectFactory for EffectRegistry {
    fn create(&self, descriptor: &EffectDescriptor) -> Option<Box<dyn Effect>> {
        self.constructors.get(&descriptor.id).map(|ctor| ctor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creates_known_effect() {
        let registry = EffectRegistry::with_builtins();
        let descriptor = EffectDescriptor::new("gain", "Gain");
        let effect = registry.create(&descriptor).expect("gain is built in");
        assert_eq!(&*effect.info().id, "gain");
    }

    #[test]
    fn test_registry_unknown_effect() {
        let registry = EffectRegistry::with_builtins();
        let descriptor = EffectDescriptor::new("does-not-exist", "Nope");
        assert!(registry.create(&descriptor).is_none());
    }

    #[test]
    fn test_registry_len() {
        let registry = EffectRegistry::with_builtins();
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 1);
    }
}
