use std::sync::Arc;

/// Decoded RGBA8 picture (straight alpha, row-major, tightly packed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes, `width * height * 4` long.
    pub rgba8: Vec<u8>,
}

/// Decoded interleaved floating-point PCM.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Interleaved `f32` PCM samples.
    pub interleaved_f32: Vec<f32>,
}

impl AudioChunk {
    /// Number of sample frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.interleaved_f32.len() / usize::from(self.channels)
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }
}

/// Payload carried by a decoded unit.
pub trait Payload: Send + Sync + 'static {
    /// Contiguous byte view of the payload, without copying.
    fn byte_view(&self) -> &[u8];
}

impl Payload for VideoFrame {
    fn byte_view(&self) -> &[u8] {
        &self.rgba8
    }
}

impl Payload for AudioChunk {
    fn byte_view(&self) -> &[u8] {
        bytemuck::cast_slice(&self.interleaved_f32)
    }
}

/// One decoded unit positioned on the item timeline.
#[derive(Debug)]
pub struct DecodedUnit<P> {
    /// Item-local presentation time in seconds, including previous loop iterations.
    pub presentation_time: f64,
    /// Timestamp inside the source asset in seconds.
    pub source_time: f64,
    /// Display duration in item-local seconds.
    pub duration: f64,
    /// Loop iteration that produced the unit.
    pub loop_index: u64,
    /// Decoded data.
    pub payload: P,
}

/// Shared, immutable view of a decoded unit.
///
/// Cloning is cheap. The payload is freed once, when the last handle and the owning queue entry
/// are both gone; evicting a unit from its queue never invalidates a handle.
#[derive(Debug)]
pub struct UnitHandle<P> {
    unit: Arc<DecodedUnit<P>>,
}

/// Handle to a decoded video frame.
pub type FrameHandle = UnitHandle<VideoFrame>;
/// Handle to a decoded audio chunk.
pub type SampleHandle = UnitHandle<AudioChunk>;

impl<P> Clone for UnitHandle<P> {
    fn clone(&self) -> Self {
        Self {
            unit: Arc::clone(&self.unit),
        }
    }
}

impl<P: Payload> UnitHandle<P> {
    pub(crate) fn new(unit: DecodedUnit<P>) -> Self {
        Self {
            unit: Arc::new(unit),
        }
    }

    /// Item-local presentation time in seconds.
    pub fn presentation_time(&self) -> f64 {
        self.unit.presentation_time
    }

    /// Timestamp inside the source asset in seconds.
    pub fn source_time(&self) -> f64 {
        self.unit.source_time
    }

    /// Display duration in seconds.
    pub fn duration(&self) -> f64 {
        self.unit.duration
    }

    /// Loop iteration that produced the unit.
    pub fn loop_index(&self) -> u64 {
        self.unit.loop_index
    }

    /// Borrow the decoded payload.
    pub fn payload(&self) -> &P {
        &self.unit.payload
    }

    /// Zero-copy contiguous byte view of the payload.
    pub fn as_bytes(&self) -> &[u8] {
        self.unit.payload.byte_view()
    }

    /// Number of live references to the unit (queue entry included).
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.unit)
    }

    /// Return `true` when both handles refer to the same decoded unit.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.unit, &other.unit)
    }
}

impl FrameHandle {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.unit.payload.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.unit.payload.height
    }
}

impl SampleHandle {
    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.unit.payload.sample_rate
    }

    /// Channel count.
    pub fn channels(&self) -> u16 {
        self.unit.payload.channels
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.unit.payload.interleaved_f32
    }

    /// Number of sample frames.
    pub fn frame_count(&self) -> usize {
        self.unit.payload.frame_count()
    }
}

static_assertions::assert_impl_all!(FrameHandle: Send, Sync);
static_assertions::assert_impl_all!(SampleHandle: Send, Sync);

#[cfg(test)]
#[path = "../../tests/unit/media/handle.rs"]
mod tests;
