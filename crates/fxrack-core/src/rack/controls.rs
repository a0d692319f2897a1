//! Named control wiring - bridges an external control system to the rack
//!
//! Every chain slot is addressable by its derived group label
//! (`[EffectChain1]`, `[EffectChain2]`, ...). This layer translates named
//! control values written to those groups into controller operations:
//! continuous controls (mix, parameter) are applied on every set, while
//! push-button controls (next/prev chain) are edge-triggered - a
//! transition from released (<= 0) to pressed (> 0) fires exactly once.
//!
//! Control callbacks can arrive from anywhere, so nothing here blocks or
//! does I/O; everything bottoms out in the controller's wait-free queue.

use std::collections::HashMap;

use crate::error::{RackError, RackResult};
use crate::types::ChannelId;

use super::controller::RackController;

/// Value above which a button-style control counts as pressed
const PRESS_THRESHOLD: f64 = 0.0;

/// Parse a group label back to a chain slot index
///
/// The inverse of [`super::EffectChainSlot::format_group`]: labels are
/// 1-based, indices 0-based.
pub fn parse_group(group: &str) -> Option<usize> {
    let number = group.strip_prefix("[EffectChain")?.strip_suffix(']')?;
    let number: usize = number.parse().ok()?;
    number.checked_sub(1)
}

/// Binds named control values to a [`RackController`]
pub struct RackControls {
    controller: RackController,
    /// Previous values for edge-triggered controls, keyed by chain slot
    /// index and control key
    last_values: HashMap<(usize, String), f64>,
}

impl RackControls {
    /// Wrap a controller in the control-binding layer
    pub fn new(controller: RackController) -> Self {
        Self {
            controller,
            last_values: HashMap::new(),
        }
    }

    /// Direct access to the underlying controller
    pub fn controller(&self) -> &RackController {
        &self.controller
    }

    /// Direct mutable access to the underlying controller
    pub fn controller_mut(&mut self) -> &mut RackController {
        &mut self.controller
    }

    /// Apply a named control value
    ///
    /// `group` addresses the chain slot (`[EffectChainN]`); `key` selects
    /// the control:
    ///
    /// - `enabled` - chain slot enabled while the value is > 0
    /// - `mix` - dry/wet blend, clamped to 0.0-1.0
    /// - `parameter` - chain meta-parameter, clamped to 0.0-1.0
    /// - `num_effectslots` - grow the slot count toward the given value
    /// - `next_chain` / `prev_chain` - navigation request on press
    /// - `group_<channel>_enable` - per-channel enable while > 0
    pub fn set(&mut self, group: &str, key: &str, value: f64) -> RackResult<()> {
        let chain_slot = parse_group(group).ok_or_else(|| RackError::UnknownControl {
            group: group.to_string(),
            key: key.to_string(),
        })?;

        match key {
            "enabled" => self
                .controller
                .set_chain_enabled(chain_slot, value > PRESS_THRESHOLD),
            "mix" => self.controller.set_mix(chain_slot, value as f32),
            "parameter" => self.controller.set_parameter(chain_slot, value as f32),
            "num_effectslots" => self.grow_slots(chain_slot, value),
            "next_chain" => {
                if self.pressed(chain_slot, key, value) {
                    self.controller.request_next_chain(chain_slot)
                } else {
                    Ok(())
                }
            }
            "prev_chain" => {
                if self.pressed(chain_slot, key, value) {
                    self.controller.request_prev_chain(chain_slot)
                } else {
                    Ok(())
                }
            }
            _ => {
                if let Some(channel) = parse_channel_enable(key) {
                    self.controller.set_channel_enabled(
                        chain_slot,
                        &channel,
                        value > PRESS_THRESHOLD,
                    )
                } else {
                    Err(RackError::UnknownControl {
                        group: group.to_string(),
                        key: key.to_string(),
                    })
                }
            }
        }
    }

    /// Rising-edge detection for button-style controls
    fn pressed(&mut self, chain_slot: usize, key: &str, value: f64) -> bool {
        let last = self
            .last_values
            .insert((chain_slot, key.to_string()), value)
            .unwrap_or(0.0);
        last <= PRESS_THRESHOLD && value > PRESS_THRESHOLD
    }

    /// Grow a chain slot toward the requested count
    ///
    /// The count never shrinks (slot positions are immutable once placed)
    /// and never exceeds the configured maximum; a request beyond it grows
    /// to the maximum and reports the capacity condition.
    fn grow_slots(&mut self, chain_slot: usize, value: f64) -> RackResult<()> {
        let target = value.max(0.0) as usize;
        while self.controller.num_slots(chain_slot)? < target {
            self.controller.add_effect_slot(chain_slot)?;
        }
        Ok(())
    }
}

/// Parse a `group_<channel>_enable` key to its channel id
fn parse_channel_enable(key: &str) -> Option<ChannelId> {
    let channel = key.strip_prefix("group_")?.strip_suffix("_enable")?;
    (!channel.is_empty()).then(|| ChannelId::new(channel))
}
