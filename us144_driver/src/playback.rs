//! The playback engine.
//!
//! Each completed playback URB is rebuilt in place: the next packet
//! sizes come from the feedback accumulator (nominal until synced),
//! the matching frames are pulled from the host ring at the driver's
//! read position, routed, and copied into the URB's transfer buffer
//! behind a fresh descriptor table.

use us144_core::frame::BYTES_PER_FRAME;

use crate::{
    device::Us144Device,
    routing::route_playback,
    transport::{CompletionAction, IsoPacketDesc, PLAYBACK_URB_PACKETS, UrbStatus, UsbBus},
};

impl<B: UsbBus> Us144Device<B> {
    /// Playback URB completion: refills the URB for resubmission.
    pub fn playback_completed(&self, index: usize, status: UrbStatus) -> CompletionAction {
        if !self.playback_active() {
            self.release_audio_urb();
            return CompletionAction::Retire;
        }
        if !status.is_ok() {
            if status.is_teardown() {
                self.release_audio_urb();
                return CompletionAction::Retire;
            }
            self.log_urb_error("playback", status);
            return CompletionAction::Resubmit;
        }
        let Some(rate) = self.current_rate() else {
            return CompletionAction::Resubmit;
        };
        let nominal = rate.nominal_frames_per_packet() as usize;

        let mut urb = self.playback_urbs[index].lock().unwrap();

        // Packet sizing, position snapshot, and selector reads happen
        // under the instance lock; the copies happen after it drops.
        let mut packet_frames = [0usize; PLAYBACK_URB_PACKETS];
        let (start_frame, frames_to_copy, line, digital) = {
            let mut shared = self.shared.lock().unwrap();
            let mut total = 0usize;
            for frames in packet_frames.iter_mut() {
                *frames = if shared.feedback.synced {
                    shared.accumulator.pop().map(|f| f as usize).unwrap_or(nominal)
                } else {
                    nominal
                };
                total += *frames;
            }
            let start = shared.driver_playback_pos;
            if shared.playback.buffer_frames > 0 {
                shared.driver_playback_pos = (start + total) % shared.playback.buffer_frames;
            }
            (
                start,
                total,
                self.routing.line_out_source(),
                self.routing.digital_out_source(),
            )
        };

        let byte_len = frames_to_copy * BYTES_PER_FRAME;
        let mut scratch = self.scratch.lock().unwrap();
        self.playback_ring
            .lock()
            .unwrap()
            .read_frames(start_frame, &mut scratch[..byte_len]);

        route_playback(line, digital, &mut scratch[..byte_len]);

        urb.buffer[..byte_len].copy_from_slice(&scratch[..byte_len]);
        let mut offset = 0;
        for (packet, &frames) in urb.packets.iter_mut().zip(&packet_frames) {
            let length = frames * BYTES_PER_FRAME;
            *packet = IsoPacketDesc { offset, length };
            offset += length;
        }
        urb.length = byte_len;

        CompletionAction::Resubmit
    }
}
