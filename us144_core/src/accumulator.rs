//! The feedback accumulator: a 128-slot ring of per-packet frame counts.
//!
//! The feedback path writes eight slots for every feedback byte it
//! decodes; the playback path reads one slot per outgoing isochronous
//! packet. The two ends rendezvous only here, so production is guarded:
//! a write that would push the unread window past the ring's capacity is
//! dropped and the caller falls back to nominal sizing.
//!
//! Not thread-safe; both ends run under the owning instance's lock.

use crate::rate::{FEEDBACK_PATTERN_LEN, SampleRate};

/// Number of slots in the accumulator.
pub const FEEDBACK_ACCUMULATOR_SIZE: usize = 128;

/// Largest unread window that still accepts a full pattern write.
pub const FEEDBACK_PRODUCE_LIMIT: usize = FEEDBACK_ACCUMULATOR_SIZE - FEEDBACK_PATTERN_LEN;

/// Ring of frame counts for upcoming playback packets.
pub struct FeedbackAccumulator {
    slots: [u32; FEEDBACK_ACCUMULATOR_SIZE],
    in_pos: usize,
    out_pos: usize,
}

impl FeedbackAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self {
            slots: [0; FEEDBACK_ACCUMULATOR_SIZE],
            in_pos: 0,
            out_pos: 0,
        }
    }

    /// Number of produced-but-unconsumed slots.
    #[inline]
    pub fn distance(&self) -> usize {
        self.in_pos.wrapping_sub(self.out_pos)
    }

    /// Resets both positions and sets every slot to the nominal frame
    /// count for `rate`. Run at prepare time so a slot consumed before
    /// its first post-sync write still carries a sane size.
    pub fn fill_nominal(&mut self, rate: SampleRate) {
        self.slots = [rate.nominal_frames_per_packet(); FEEDBACK_ACCUMULATOR_SIZE];
        self.in_pos = 0;
        self.out_pos = 0;
    }

    /// Writes one 8-slot pattern at the producer position.
    ///
    /// Returns `false` without writing when the unread window is already
    /// past [`FEEDBACK_PRODUCE_LIMIT`]; the window therefore never
    /// exceeds the ring's capacity.
    pub fn push_pattern(&mut self, pattern: &[u32; FEEDBACK_PATTERN_LEN]) -> bool {
        if self.distance() > FEEDBACK_PRODUCE_LIMIT {
            return false;
        }
        for &frames in pattern {
            self.slots[self.in_pos % FEEDBACK_ACCUMULATOR_SIZE] = frames;
            self.in_pos = self.in_pos.wrapping_add(1);
        }
        true
    }

    /// Writes eight nominal slots for `rate`, with the same overflow
    /// guard as [`push_pattern`](Self::push_pattern).
    pub fn push_nominal(&mut self, rate: SampleRate) -> bool {
        self.push_pattern(&[rate.nominal_frames_per_packet(); FEEDBACK_PATTERN_LEN])
    }

    /// Consumes one slot, or `None` if the window is empty.
    pub fn pop(&mut self) -> Option<u32> {
        if self.distance() == 0 {
            return None;
        }
        let frames = self.slots[self.out_pos % FEEDBACK_ACCUMULATOR_SIZE];
        self.out_pos = self.out_pos.wrapping_add(1);
        Some(frames)
    }
}

impl Default for FeedbackAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
