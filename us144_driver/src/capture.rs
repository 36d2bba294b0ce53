//! The capture pipeline.
//!
//! Two halves joined by the backlog ring: the URB completion appends
//! raw payload bytes under the instance lock and schedules the decode
//! worker; the worker drains whole 512-byte blocks, decoding and
//! routing with the lock dropped, and lands the frames in the host
//! capture ring at the driver's write position.
//!
//! The capture position counter itself advances on the feedback clock,
//! not here; this pipeline only moves data.

use us144_core::frame::{BYTES_PER_FRAME, BYTES_PER_SAMPLE, pack_sample};
use us144_wire::capture::{DecodedBlock, RAW_BYTES_PER_DECODE_BLOCK, decode_block};

use crate::{
    device::{Us144Device, Work},
    routing::route_capture,
    transport::{CompletionAction, UrbStatus, UsbBus},
};

impl<B: UsbBus> Us144Device<B> {
    /// Capture URB completion: queues the payload for the decode worker
    /// and resubmits.
    pub fn capture_completed(&self, status: UrbStatus, payload: &[u8]) -> CompletionAction {
        if !self.capture_active() {
            self.release_audio_urb();
            return CompletionAction::Retire;
        }
        if !status.is_ok() {
            if status.is_teardown() {
                self.release_audio_urb();
                return CompletionAction::Retire;
            }
            self.log_urb_error("capture", status);
            return CompletionAction::Resubmit;
        }

        if !payload.is_empty() {
            let overrun = {
                let mut shared = self.shared.lock().unwrap();
                shared.capture_backlog.write_overwriting(payload)
            };
            if overrun > 0 {
                log::debug!("capture backlog overwrote {overrun} bytes; decode worker stalled");
            }
            self.schedule(Work::DecodeCapture);
        }
        CompletionAction::Resubmit
    }

    /// Decode worker body: drains whole blocks while capture stays
    /// active, yielding the lock between blocks.
    pub(crate) fn decode_pending_capture(&self) {
        let mut raw = [0u8; RAW_BYTES_PER_DECODE_BLOCK];
        let mut decoded = DecodedBlock::default();

        while self.capture_active() {
            {
                let mut shared = self.shared.lock().unwrap();
                if shared.capture.buffer_frames == 0 || !shared.capture_backlog.read_exact(&mut raw)
                {
                    break;
                }
            }

            decode_block(&raw, &mut decoded);
            route_capture(
                self.routing.capture_12_source(),
                self.routing.capture_34_source(),
                &mut decoded,
            );

            let (start_frame, buffer_frames) = {
                let mut shared = self.shared.lock().unwrap();
                let buffer_frames = shared.capture.buffer_frames;
                if buffer_frames == 0 {
                    break;
                }
                let start = shared.driver_capture_pos;
                shared.driver_capture_pos = (start + decoded.len()) % buffer_frames;
                (start, buffer_frames)
            };

            let mut packed = [0u8; BYTES_PER_FRAME];
            let mut ring = self.capture_ring.lock().unwrap();
            for (offset, frame) in decoded.iter().enumerate() {
                for (channel, &sample) in frame.iter().enumerate() {
                    pack_sample(sample, &mut packed[channel * BYTES_PER_SAMPLE..]);
                }
                ring.write_frames((start_frame + offset) % buffer_frames, &packed);
            }
        }
    }
}
