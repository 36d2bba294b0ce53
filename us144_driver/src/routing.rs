//! The routing matrix.
//!
//! Four selectors, each choosing between two channel pairs: on the
//! playback side, which host pair feeds the line and digital outputs;
//! on the capture side, which device pair feeds each host pair. The
//! selectors are part of the control-mixer surface and may change while
//! streams run; each copy pass snapshots them once.

use std::sync::atomic::{AtomicU8, Ordering};

use us144_core::frame::{BYTES_PER_FRAME, BYTES_PER_SAMPLE};
use us144_wire::capture::DecodedBlock;

/// Host channel pair feeding an output pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSource {
    /// Host channels 1-2.
    Channels12 = 0,
    /// Host channels 3-4.
    Channels34 = 1,
}

/// Device channel pair feeding a host capture pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// The analog inputs (device channels 1-2).
    Analog = 0,
    /// The digital inputs (device channels 3-4).
    Digital = 1,
}

impl PlaybackSource {
    fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            PlaybackSource::Channels12
        } else {
            PlaybackSource::Channels34
        }
    }
}

impl CaptureSource {
    fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            CaptureSource::Analog
        } else {
            CaptureSource::Digital
        }
    }
}

/// The four routing selectors.
///
/// Defaults: line outputs follow host channels 1-2, digital outputs
/// host channels 3-4, host capture 1-2 the analog inputs, host capture
/// 3-4 the digital inputs.
pub struct RoutingMatrix {
    line_out_source: AtomicU8,
    digital_out_source: AtomicU8,
    capture_12_source: AtomicU8,
    capture_34_source: AtomicU8,
}

impl RoutingMatrix {
    pub(crate) fn new() -> Self {
        Self {
            line_out_source: AtomicU8::new(PlaybackSource::Channels12 as u8),
            digital_out_source: AtomicU8::new(PlaybackSource::Channels34 as u8),
            capture_12_source: AtomicU8::new(CaptureSource::Analog as u8),
            capture_34_source: AtomicU8::new(CaptureSource::Digital as u8),
        }
    }

    pub fn line_out_source(&self) -> PlaybackSource {
        PlaybackSource::from_raw(self.line_out_source.load(Ordering::Relaxed))
    }

    pub fn set_line_out_source(&self, source: PlaybackSource) {
        self.line_out_source.store(source as u8, Ordering::Relaxed);
    }

    pub fn digital_out_source(&self) -> PlaybackSource {
        PlaybackSource::from_raw(self.digital_out_source.load(Ordering::Relaxed))
    }

    pub fn set_digital_out_source(&self, source: PlaybackSource) {
        self.digital_out_source.store(source as u8, Ordering::Relaxed);
    }

    pub fn capture_12_source(&self) -> CaptureSource {
        CaptureSource::from_raw(self.capture_12_source.load(Ordering::Relaxed))
    }

    pub fn set_capture_12_source(&self, source: CaptureSource) {
        self.capture_12_source.store(source as u8, Ordering::Relaxed);
    }

    pub fn capture_34_source(&self) -> CaptureSource {
        CaptureSource::from_raw(self.capture_34_source.load(Ordering::Relaxed))
    }

    pub fn set_capture_34_source(&self, source: CaptureSource) {
        self.capture_34_source.store(source as u8, Ordering::Relaxed);
    }
}

/// Byte offset of a source pair inside a packed frame.
#[inline]
fn pair_offset(source: PlaybackSource) -> usize {
    match source {
        PlaybackSource::Channels12 => 0,
        PlaybackSource::Channels34 => 2 * BYTES_PER_SAMPLE,
    }
}

/// Applies playback routing to packed frames, in place.
///
/// Each frame is snapshotted before either destination pair is written,
/// so a selector may read the pair the other one overwrites.
pub fn route_playback(line: PlaybackSource, digital: PlaybackSource, frames: &mut [u8]) {
    const PAIR_BYTES: usize = 2 * BYTES_PER_SAMPLE;

    for frame in frames.chunks_exact_mut(BYTES_PER_FRAME) {
        let mut snapshot = [0u8; BYTES_PER_FRAME];
        snapshot.copy_from_slice(frame);

        let line_src = pair_offset(line);
        frame[..PAIR_BYTES].copy_from_slice(&snapshot[line_src..line_src + PAIR_BYTES]);

        let digital_src = pair_offset(digital);
        frame[PAIR_BYTES..].copy_from_slice(&snapshot[digital_src..digital_src + PAIR_BYTES]);
    }
}

/// Applies capture routing to one decoded block, in place.
///
/// Mirrors the playback side: host pairs 1-2 and 3-4 each select the
/// analog pair (channels 0-1) or the digital pair (channels 2-3).
pub fn route_capture(pair_12: CaptureSource, pair_34: CaptureSource, block: &mut DecodedBlock) {
    for frame in block.iter_mut() {
        let snapshot = *frame;

        let src = match pair_12 {
            CaptureSource::Analog => 0,
            CaptureSource::Digital => 2,
        };
        frame[0] = snapshot[src];
        frame[1] = snapshot[src + 1];

        let src = match pair_34 {
            CaptureSource::Analog => 0,
            CaptureSource::Digital => 2,
        };
        frame[2] = snapshot[src];
        frame[3] = snapshot[src + 1];
    }
}
