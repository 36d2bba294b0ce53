//! The transport seam.
//!
//! The driver core never talks USB directly: a [`UsbBus`] implementation
//! owns endpoint pipes, in-flight transfer scheduling, and cancellation,
//! and calls back into the device's `*_completed` handlers as transfers
//! finish. The core owns the transfer state of its outbound URBs (the
//! bus reads [`PlaybackUrb`]/[`MidiOutUrb`] when it transmits); inbound
//! payloads are handed to the completion handlers as slices.

use us144_core::frame::BYTES_PER_FRAME;
use us144_wire::ControlRequest;

use crate::error::{SubmitError, TransportError};

/// Playback URBs kept in flight.
pub const NUM_PLAYBACK_URBS: usize = 4;

/// Feedback URBs kept in flight.
pub const NUM_FEEDBACK_URBS: usize = 4;

/// Capture URBs kept in flight.
pub const NUM_CAPTURE_URBS: usize = 4;

/// Isochronous packets per playback URB (one per microframe).
pub const PLAYBACK_URB_PACKETS: usize = 4;

/// Most feedback packets one URB may request.
pub const MAX_FEEDBACK_PACKETS_PER_URB: usize = 5;

/// Upper bound on frames in one isochronous packet across all rates.
pub const MAX_FRAMES_PER_PACKET: usize = 16;

/// Bytes in each playback URB transfer buffer (and the routing scratch).
pub const PLAYBACK_URB_BYTES: usize = PLAYBACK_URB_PACKETS * MAX_FRAMES_PER_PACKET * BYTES_PER_FRAME;

/// Timeout applied to every control transfer.
pub const USB_CTRL_TIMEOUT_MS: u32 = 1_000;

/// Completion status of one URB, as reported by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrbStatus {
    /// The transfer completed.
    Completed,
    /// Unlinked during teardown (`-ENOENT`).
    Unlinked,
    /// Asynchronously cancelled (`-ECONNRESET`).
    Reset,
    /// The endpoint was disabled (`-ESHUTDOWN`).
    Shutdown,
    /// Low-level protocol error (`-EPROTO`).
    Protocol,
    /// Any other failure, with the bus's error code.
    Failed(i32),
}

impl UrbStatus {
    /// Whether this is a transient status expected during teardown.
    /// Such URBs retire silently, without a ring advance or a log line.
    #[inline]
    pub fn is_teardown(self) -> bool {
        matches!(
            self,
            UrbStatus::Unlinked | UrbStatus::Reset | UrbStatus::Shutdown | UrbStatus::Protocol
        )
    }

    /// Whether the transfer completed.
    #[inline]
    pub fn is_ok(self) -> bool {
        self == UrbStatus::Completed
    }
}

/// The five URB pools. Each pool is anchored as a unit so it can be
/// mass-cancelled with one [`UsbBus::kill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrbKind {
    Playback,
    Feedback,
    Capture,
    MidiIn,
    MidiOut,
}

impl UrbKind {
    /// All pools, in teardown order.
    pub const ALL: [UrbKind; 5] = [
        UrbKind::Feedback,
        UrbKind::Playback,
        UrbKind::Capture,
        UrbKind::MidiIn,
        UrbKind::MidiOut,
    ];
}

/// One URB within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrbId {
    pub kind: UrbKind,
    pub index: usize,
}

impl UrbId {
    pub const fn new(kind: UrbKind, index: usize) -> Self {
        Self { kind, index }
    }
}

/// What a completion handler wants done with the URB it was called for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionAction {
    /// Resubmit the URB as-is (outbound buffers have been refilled).
    Resubmit,
    /// Retire the URB; the pool shrinks until the next trigger-start.
    Retire,
}

/// One isochronous packet inside a playback URB's transfer buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsoPacketDesc {
    pub offset: usize,
    pub length: usize,
}

/// Transfer state of one playback URB. The descriptor table and buffer
/// are rebuilt by the playback engine on every completion; the bus reads
/// them when it transmits.
pub struct PlaybackUrb {
    pub packets: [IsoPacketDesc; PLAYBACK_URB_PACKETS],
    pub buffer: Box<[u8]>,
    pub length: usize,
}

impl PlaybackUrb {
    pub(crate) fn new() -> Self {
        Self {
            packets: [IsoPacketDesc::default(); PLAYBACK_URB_PACKETS],
            buffer: vec![0; PLAYBACK_URB_BYTES].into_boxed_slice(),
            length: 0,
        }
    }

    /// Programs the descriptor table for `frames_per_packet` frames in
    /// every packet and zeroes the covered buffer range.
    pub(crate) fn program_nominal(&mut self, frames_per_packet: usize) {
        let packet_bytes = frames_per_packet * BYTES_PER_FRAME;
        for (index, packet) in self.packets.iter_mut().enumerate() {
            *packet = IsoPacketDesc {
                offset: index * packet_bytes,
                length: packet_bytes,
            };
        }
        self.length = PLAYBACK_URB_PACKETS * packet_bytes;
        self.buffer[..self.length].fill(0);
    }
}

/// Transfer state of the single MIDI OUT URB.
pub struct MidiOutUrb {
    pub buffer: [u8; us144_wire::midi::MIDI_PACKET_LEN],
    pub length: usize,
}

impl MidiOutUrb {
    pub(crate) fn new() -> Self {
        Self {
            buffer: [0; us144_wire::midi::MIDI_PACKET_LEN],
            length: 0,
        }
    }
}

/// The USB transport the core drives.
///
/// Implementations live outside this workspace (libusb, usbdevice_fs,
/// test doubles). Submission is asynchronous: `submit` queues the URB
/// and the bus later invokes the matching completion handler. `kill`
/// cancels every in-flight URB of one pool and returns only after any
/// completion handlers still running for that pool have returned.
pub trait UsbBus: Send + Sync {
    /// Issues a host-to-device control transfer.
    fn control_out(
        &self,
        request: &ControlRequest,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<(), TransportError>;

    /// Issues a device-to-host control transfer; returns the bytes read.
    fn control_in(
        &self,
        request: &ControlRequest,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize, TransportError>;

    /// Selects an alternate setting on a claimed interface.
    fn select_alt_setting(&self, interface: u8, alt_setting: u8) -> Result<(), TransportError>;

    /// Queues one URB for transfer.
    fn submit(&self, urb: UrbId) -> Result<(), SubmitError>;

    /// Cancels every in-flight URB of `kind` (anchor kill). Synchronous
    /// with respect to completion handlers in progress.
    fn kill(&self, kind: UrbKind);
}
