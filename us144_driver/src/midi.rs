//! MIDI duplex byte transport.
//!
//! Input: bulk-IN completions are de-framed and the bytes handed to the
//! host's rawmidi layer. Output: host bytes queue on the instance; the
//! MIDI worker packs them into 9-byte packets and keeps the single OUT
//! URB in flight until the queue drains.

use std::sync::atomic::Ordering;

use us144_wire::midi::{MIDI_DATA_LEN, MIDI_PACKET_LEN, pack_out, unpack_in};

use crate::{
    device::{Us144Device, Work},
    error::SubmitError,
    transport::{CompletionAction, UrbId, UrbKind, UrbStatus, UsbBus},
};

impl<B: UsbBus> Us144Device<B> {
    /// Opens the MIDI input stream: submits the IN URB and keeps it
    /// cycling until [`midi_in_stop`](Self::midi_in_stop).
    pub fn midi_in_start(&self) -> Result<(), SubmitError> {
        if self.midi_in_active.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.bus.submit(UrbId::new(UrbKind::MidiIn, 0)) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.midi_in_active.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Closes the MIDI input stream and cancels its URB.
    pub fn midi_in_stop(&self) {
        if self.midi_in_active.swap(false, Ordering::AcqRel) {
            self.bus.kill(UrbKind::MidiIn);
        }
    }

    /// MIDI IN URB completion.
    pub fn midi_in_completed(&self, status: UrbStatus, payload: &[u8]) -> CompletionAction {
        if !self.midi_in_active.load(Ordering::Acquire) {
            return CompletionAction::Retire;
        }
        if !status.is_ok() {
            if status.is_teardown() {
                return CompletionAction::Retire;
            }
            self.log_urb_error("MIDI in", status);
            return CompletionAction::Resubmit;
        }

        if !payload.is_empty() {
            let mut bytes = Vec::with_capacity(payload.len() / MIDI_PACKET_LEN * MIDI_DATA_LEN);
            unpack_in(payload, &mut bytes);
            if !bytes.is_empty() {
                self.host.midi_received(&bytes);
            }
        }
        CompletionAction::Resubmit
    }

    /// Queues MIDI bytes for transmission and wakes the MIDI worker.
    pub fn midi_send(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.midi_out_queue.lock().unwrap().extend(bytes);
        self.schedule(Work::MidiOut);
    }

    /// MIDI worker body: starts an OUT transfer if none is in flight.
    pub(crate) fn pump_midi_out(&self) {
        if self.midi_out_active.swap(true, Ordering::AcqRel) {
            // A completion chain is already draining the queue.
            return;
        }
        if !self.fill_midi_out_urb() {
            self.midi_out_active.store(false, Ordering::Release);
            return;
        }
        if let Err(err) = self.bus.submit(UrbId::new(UrbKind::MidiOut, 0)) {
            log::warn!("MIDI out submission failed: {err}");
            self.midi_out_active.store(false, Ordering::Release);
        }
    }

    /// MIDI OUT URB completion: chains the next packet while bytes
    /// remain queued.
    pub fn midi_out_completed(&self, status: UrbStatus) -> CompletionAction {
        if !self.midi_out_active.load(Ordering::Acquire) {
            return CompletionAction::Retire;
        }
        if !status.is_ok() {
            self.midi_out_active.store(false, Ordering::Release);
            if !status.is_teardown() {
                self.log_urb_error("MIDI out", status);
            }
            return CompletionAction::Retire;
        }
        if self.fill_midi_out_urb() {
            CompletionAction::Resubmit
        } else {
            self.midi_out_active.store(false, Ordering::Release);
            CompletionAction::Retire
        }
    }

    /// Packs up to one packet's worth of queued bytes into the OUT URB.
    /// Returns `false` when the queue was empty.
    pub(crate) fn fill_midi_out_urb(&self) -> bool {
        let mut queue = self.midi_out_queue.lock().unwrap();
        if queue.is_empty() {
            return false;
        }
        let take = queue.len().min(MIDI_DATA_LEN);
        let chunk: Vec<u8> = queue.drain(..take).collect();
        drop(queue);

        let (packet, consumed) = pack_out(&chunk);
        debug_assert_eq!(consumed, chunk.len());

        let mut urb = self.midi_out_urb.lock().unwrap();
        urb.buffer = packet;
        urb.length = MIDI_PACKET_LEN;
        true
    }
}
