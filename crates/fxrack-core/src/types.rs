//! Common types for fxrack
//!
//! Fundamental audio types used throughout the effect rack: sample and
//! stereo-buffer handling, plus the channel identifier used to key
//! per-channel effect state.

use std::fmt;
use std::sync::Arc;

/// Audio sample type (32-bit float, interleaved stereo on the wire)
pub type Sample = f32;

/// Maximum buffer size (in stereo frames) to pre-allocate for real-time safety.
/// Covers all common callback configurations (64, 128, 256, 512, 1024, 2048, 4096).
/// Pre-allocating to this size eliminates allocations in the audio callback.
pub const MAX_BUFFER_FRAMES: usize = 8192;

/// Identifier for an independently-processed audio channel (e.g. one deck).
///
/// Channels are addressed by string key; the newtype wraps `Arc<str>` so
/// clones and comparisons on the audio path never allocate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(Arc<str>);

impl ChannelId {
    /// Create a channel id from a string key
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// The underlying string key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`
/// (interleaved format) using bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Scale both channels by a factor
    #[inline]
    pub fn scale(&self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

/// A buffer of stereo samples
///
/// The owned scratch-buffer type used by chain slots for ping-pong
/// processing and dry-signal retention. External callers hand the rack
/// plain interleaved `&[Sample]` slices; this type backs the internal
/// copies without audio-path allocation.
#[derive(Debug, Clone)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence (len in stereo frames)
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples [L, R, L, R, ...]
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        assert!(
            interleaved.len() % 2 == 0,
            "Interleaved buffer must have even length"
        );
        let samples = interleaved
            .chunks_exact(2)
            .map(|chunk| StereoSample::new(chunk[0], chunk[1]))
            .collect();
        Self { samples }
    }

    /// Number of stereo frames in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Never reallocates as long as `new_len` stays within the original
    /// capacity; newly exposed frames are silenced.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Get a zero-copy mutable view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.samples)
    }

    /// Copy interleaved samples into this buffer, adjusting the working
    /// length to match (real-time safe within capacity)
    pub fn copy_from_interleaved(&mut self, interleaved: &[Sample]) {
        debug_assert!(interleaved.len() % 2 == 0);
        self.set_len_from_capacity(interleaved.len() / 2);
        self.as_interleaved_mut().copy_from_slice(interleaved);
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample = sample.scale(factor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_cheap_clone() {
        let a = ChannelId::new("[Channel1]");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "[Channel1]");
    }

    #[test]
    fn test_interleaved_round_trip() {
        let data = [1.0, 2.0, 3.0, 4.0];
        let buffer = StereoBuffer::from_interleaved(&data);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.as_interleaved(), &data);
    }

    #[test]
    fn test_set_len_from_capacity() {
        let mut buffer = StereoBuffer::silence(8);
        buffer.set_len_from_capacity(4);
        assert_eq!(buffer.len(), 4);
        buffer.as_interleaved_mut().fill(1.0);

        // Growing back within capacity exposes silence, not stale data
        buffer.set_len_from_capacity(8);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.as_interleaved()[8], 0.0);
    }

    #[test]
    fn test_copy_from_interleaved() {
        let mut buffer = StereoBuffer::silence(8);
        buffer.copy_from_interleaved(&[0.5, -0.5]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.as_interleaved(), &[0.5, -0.5]);
    }
}
