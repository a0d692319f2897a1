//! Effect chains - named, ordered effect configurations
//!
//! An [`EffectChain`] is pure data: "what to load", independent of any
//! runtime slot. It is immutable once constructed and passed around as a
//! reference-counted [`ChainHandle`]; replacing a loaded chain means
//! replacing the handle, never mutating in place.

use basedrop::{Owned, Shared};

use super::gc::gc_handle;
use crate::effect::{Effect, EffectDescriptor, EffectFactory};

/// Reference-counted handle to an immutable chain
///
/// `basedrop::Shared` rather than `Arc` so the audio thread can drop a
/// displaced handle without freeing memory in the callback.
pub type ChainHandle = Shared<EffectChain>;

/// A named, ordered sequence of effect descriptors
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EffectChain {
    id: String,
    name: String,
    effects: Vec<EffectDescriptor>,
}

impl EffectChain {
    /// Create a new chain
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        effects: Vec<EffectDescriptor>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            effects,
        }
    }

    /// Wrap a chain in a reference-counted handle
    pub fn into_handle(self) -> ChainHandle {
        Shared::new(&gc_handle(), self)
    }

    /// Chain identity
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable chain name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered effect descriptors
    pub fn effects(&self) -> &[EffectDescriptor] {
        &self.effects
    }
}

/// A chain with its effects already instantiated, ready for an atomic swap
///
/// Binding happens on the control path: every descriptor is run through
/// the [`EffectFactory`] up front, so installing the chain into a chain
/// slot is nothing but pointer swaps. One entry per effect slot; `None`
/// where the chain has no descriptor for that position or the factory did
/// not recognize it (the slot ends up empty, i.e. passthrough).
pub struct BoundChain {
    pub(crate) chain: ChainHandle,
    pub(crate) effects: Vec<Option<Owned<Box<dyn Effect>>>>,
}

impl BoundChain {
    /// Instantiate a chain's descriptors for a chain slot with `num_slots`
    /// effect slots
    ///
    /// Descriptors beyond `num_slots` are ignored; the chain never grows
    /// the slot count.
    pub fn bind(chain: ChainHandle, factory: &dyn EffectFactory, num_slots: usize) -> Self {
        let handle = gc_handle();
        let effects = (0..num_slots)
            .map(|position| {
                chain
                    .effects()
                    .get(position)
                    .and_then(|descriptor| {
                        let effect = factory.create(descriptor);
                        if effect.is_none() {
                            log::warn!(
                                "No factory match for effect '{}' in chain '{}'; slot {} left empty",
                                descriptor.id,
                                chain.id(),
                                position
                            );
                        }
                        effect
                    })
                    .map(|effect| Owned::new(&handle, effect))
            })
            .collect();

        Self { chain, effects }
    }

    /// The chain this binding was created from
    pub fn chain(&self) -> &ChainHandle {
        &self.chain
    }

    /// Number of slot positions this binding covers
    pub fn num_positions(&self) -> usize {
        self.effects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectRegistry;

    fn test_chain(effects: &[&str]) -> ChainHandle {
        let descriptors = effects
            .iter()
            .map(|id| EffectDescriptor::new(*id, *id))
            .collect();
        EffectChain::new("test", "Test Chain", descriptors).into_handle()
    }

    #[test]
    fn test_bind_fills_known_descriptors() {
        let registry = EffectRegistry::with_builtins();
        let bound = BoundChain::bind(test_chain(&["gain", "gain"]), &registry, 4);

        assert_eq!(bound.num_positions(), 4);
        assert!(bound.effects[0].is_some());
        assert!(bound.effects[1].is_some());
        assert!(bound.effects[2].is_none());
        assert!(bound.effects[3].is_none());
    }

    #[test]
    fn test_bind_ignores_descriptors_beyond_slot_count() {
        let registry = EffectRegistry::with_builtins();
        let bound = BoundChain::bind(test_chain(&["gain", "gain", "gain"]), &registry, 2);
        assert_eq!(bound.num_positions(), 2);
    }

    #[test]
    fn test_bind_unknown_descriptor_leaves_slot_empty() {
        let registry = EffectRegistry::with_builtins();
        let bound = BoundChain::bind(test_chain(&["mystery"]), &registry, 2);
        assert!(bound.effects[0].is_none());
    }

    #[test]
    fn test_chain_identity() {
        let chain = EffectChain::new("echoes", "Echoes", Vec::new());
        assert_eq!(chain.id(), "echoes");
        assert_eq!(chain.name(), "Echoes");
        assert!(chain.effects().is_empty());
    }
}
