//! The feedback clock.
//!
//! The feedback endpoint is the single source of timing truth for both
//! streams. Every completed feedback packet carries one byte; in-range
//! bytes select a pattern of eight per-packet frame counts that the
//! playback engine will consume, and the pattern's frame total advances
//! the playback (and, while capture runs, the capture) frame counters.
//! Period-elapsed upcalls are derived from those counters here and
//! nowhere else.
//!
//! Sync state machine: completions are skipped while `skip_count` drains
//! (initial device jitter), then the engine runs unsynced - producing
//! slots but leaving packet sizing nominal - until the writer has
//! lapped the reader across half the accumulator. Out-of-range bytes
//! while synced count toward [`FEEDBACK_SYNC_LOSS_THRESHOLD`]; crossing
//! it stops both streams fatally.

use us144_core::rate::FEEDBACK_PATTERN_LEN;

use crate::{
    device::{PeriodEvents, Us144Device},
    host::{StreamDirection, StreamStopReason},
    transport::{CompletionAction, UrbStatus, UsbBus},
};

/// Consecutive out-of-range feedback bytes tolerated while synced.
pub const FEEDBACK_SYNC_LOSS_THRESHOLD: u32 = 41;

/// Producer/consumer distance at which sync is declared acquired.
const SYNC_DISTANCE: usize = us144_core::FEEDBACK_ACCUMULATOR_SIZE / 2;

impl<B: UsbBus> Us144Device<B> {
    /// Feedback URB completion. `packets` holds one entry per requested
    /// packet: its byte when the packet carried data, `None` when it
    /// was empty.
    pub fn feedback_completed(
        &self,
        status: UrbStatus,
        packets: &[Option<u8>],
    ) -> CompletionAction {
        if !self.playback_active() {
            self.release_audio_urb();
            return CompletionAction::Retire;
        }
        if !status.is_ok() {
            if status.is_teardown() {
                self.release_audio_urb();
                return CompletionAction::Retire;
            }
            self.log_urb_error("feedback", status);
            return CompletionAction::Resubmit;
        }
        let Some(rate) = self.current_rate() else {
            return CompletionAction::Resubmit;
        };

        let mut events = PeriodEvents::default();
        let mut sync_lost = false;
        {
            let mut shared = self.shared.lock().unwrap();

            if shared.feedback.skip_count > 0 {
                shared.feedback.skip_count -= 1;
                return CompletionAction::Resubmit;
            }

            let nominal_total =
                (rate.nominal_frames_per_packet() as u64) * FEEDBACK_PATTERN_LEN as u64;
            let distance_before = shared.accumulator.distance();
            let mut frame_total: u64 = 0;

            for packet in packets {
                let Some(value) = *packet else { continue };
                match rate.pattern(value) {
                    Some(pattern) => {
                        if shared.accumulator.push_pattern(pattern) {
                            frame_total += pattern.iter().map(|&f| f as u64).sum::<u64>();
                        } else {
                            frame_total += nominal_total;
                        }
                        shared.feedback.consecutive_errors = 0;
                    }
                    None => {
                        if shared.feedback.synced {
                            shared.feedback.consecutive_errors += 1;
                            if shared.feedback.consecutive_errors > FEEDBACK_SYNC_LOSS_THRESHOLD {
                                shared.feedback.synced = false;
                                sync_lost = true;
                                break;
                            }
                        }
                        shared.accumulator.push_nominal(rate);
                        frame_total += nominal_total;
                    }
                }
            }

            if !sync_lost {
                if !shared.feedback.synced
                    && distance_before < SYNC_DISTANCE
                    && shared.accumulator.distance() >= SYNC_DISTANCE
                {
                    shared.feedback.synced = true;
                }
                if frame_total > 0 {
                    shared.playback_frames_consumed += frame_total;
                    if self.capture_active() {
                        shared.capture_frames_processed += frame_total;
                    }
                    events = shared.take_period_events(self.capture_active());
                }
            }
        }

        if sync_lost {
            log::warn!("feedback sync lost, stopping streams");
            self.fatal_stop(StreamStopReason::SyncLost);
            self.release_audio_urb();
            return CompletionAction::Retire;
        }

        if events.playback {
            self.host.period_elapsed(StreamDirection::Playback);
        }
        if events.capture {
            self.host.period_elapsed(StreamDirection::Capture);
        }
        CompletionAction::Resubmit
    }

    /// Bounds the number of feedback packets each URB requests,
    /// effective at the next prepare. Clamped to 1..=5.
    pub fn set_feedback_packets_per_urb(&self, packets: usize) {
        let packets = packets.clamp(1, crate::transport::MAX_FEEDBACK_PACKETS_PER_URB);
        self.shared.lock().unwrap().feedback.packets_per_urb = packets;
    }

    /// Feedback packets each URB requests.
    pub fn feedback_packets_per_urb(&self) -> usize {
        self.shared.lock().unwrap().feedback.packets_per_urb
    }
}
