//! Integration tests for the full device lifecycle against a scripted
//! transport.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use us144_core::frame::BYTES_PER_FRAME;
use us144_driver::{
    CompletionAction, HostBridge, StreamDirection, StreamStopReason, UrbId, UrbKind, UrbStatus,
    Us144Device, UsbBus,
    error::{SubmitError, TransportError},
};
use us144_wire::ControlRequest;
use us144_wire::capture::{DecodedBlock, encode_block};

/// A transport that acknowledges everything and records submissions.
struct ScriptedBus {
    submissions: Mutex<Vec<UrbId>>,
    kills: Mutex<Vec<UrbKind>>,
}

impl ScriptedBus {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            kills: Mutex::new(Vec::new()),
        })
    }
}

/// Local newtype so `UsbBus` (foreign to this integration-test crate) can be
/// implemented on a handle wrapping `Arc<ScriptedBus>` without violating the
/// orphan rules.
#[derive(Clone)]
struct ScriptedBusHandle(Arc<ScriptedBus>);

impl UsbBus for ScriptedBusHandle {
    fn control_out(
        &self,
        _request: &ControlRequest,
        _data: &[u8],
        _timeout_ms: u32,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    fn control_in(
        &self,
        request: &ControlRequest,
        buf: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<usize, TransportError> {
        if request.request_type == us144_wire::control::RT_VENDOR_IN {
            buf[0] = us144_wire::control::HANDSHAKE_MAGIC;
            return Ok(1);
        }
        let payload = us144_wire::control::freq_payload(us144_core::SampleRate::Rate48000);
        let len = buf.len().min(payload.len());
        buf[..len].copy_from_slice(&payload[..len]);
        Ok(len)
    }

    fn select_alt_setting(&self, _interface: u8, _alt_setting: u8) -> Result<(), TransportError> {
        Ok(())
    }

    fn submit(&self, urb: UrbId) -> Result<(), SubmitError> {
        self.0.submissions.lock().unwrap().push(urb);
        Ok(())
    }

    fn kill(&self, kind: UrbKind) {
        self.0.kills.lock().unwrap().push(kind);
    }
}

struct CountingHost {
    playback_periods: AtomicUsize,
    capture_periods: AtomicUsize,
    stops: Mutex<Vec<StreamStopReason>>,
    midi: Mutex<Vec<u8>>,
}

impl CountingHost {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            playback_periods: AtomicUsize::new(0),
            capture_periods: AtomicUsize::new(0),
            stops: Mutex::new(Vec::new()),
            midi: Mutex::new(Vec::new()),
        })
    }
}

impl HostBridge for CountingHost {
    fn period_elapsed(&self, direction: StreamDirection) {
        match direction {
            StreamDirection::Playback => &self.playback_periods,
            StreamDirection::Capture => &self.capture_periods,
        }
        .fetch_add(1, Ordering::SeqCst);
    }

    fn stream_stopped(&self, reason: StreamStopReason) {
        self.stops.lock().unwrap().push(reason);
    }

    fn midi_received(&self, bytes: &[u8]) {
        self.midi.lock().unwrap().extend_from_slice(bytes);
    }
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("timed out waiting for {what}");
}

fn streaming_device() -> (Arc<ScriptedBus>, Arc<CountingHost>, Arc<Us144Device<ScriptedBusHandle>>) {
    let bus = ScriptedBus::new();
    let host = CountingHost::new();
    let device = Us144Device::new(
        ScriptedBusHandle(Arc::clone(&bus)),
        host.clone() as Arc<dyn HostBridge>,
        0x8020,
    )
    .expect("probe should succeed");

    device.hw_params(StreamDirection::Playback, 48_000, 48, 1024).unwrap();
    device.hw_params(StreamDirection::Capture, 48_000, 48, 1024).unwrap();
    device.prepare(StreamDirection::Playback).unwrap();
    device.prepare(StreamDirection::Capture).unwrap();
    device.trigger_start().unwrap();

    // Drain the prepare-time skip counter.
    for _ in 0..4 {
        device.feedback_completed(UrbStatus::Completed, &[Some(48)]);
    }
    (bus, host, device)
}

#[test]
fn test_feedback_clock_drives_both_pointers_and_periods() {
    let (_bus, host, device) = streaming_device();

    for urb in 1..=8 {
        device.feedback_completed(UrbStatus::Completed, &[Some(48)]);
        assert_eq!(device.playback_pointer(), (urb * 48) % 1024);
        assert_eq!(device.capture_pointer(), (urb * 48) % 1024);
    }
    assert_eq!(host.playback_periods.load(Ordering::SeqCst), 8);
    assert_eq!(host.capture_periods.load(Ordering::SeqCst), 8);
    assert!(device.synced());
}

#[test]
fn test_playback_refill_consumes_host_audio_while_synced() {
    let (_bus, _host, device) = streaming_device();

    let mut audio = Vec::new();
    for frame in 0..1024usize {
        audio.extend(std::iter::repeat_n((frame % 251) as u8, BYTES_PER_FRAME));
    }
    device.write_playback_frames(0, &audio);

    for _ in 0..8 {
        device.feedback_completed(UrbStatus::Completed, &[Some(48)]);
    }
    assert!(device.synced());

    let mut copied = 0usize;
    for index in 0..4 {
        assert_eq!(
            device.playback_completed(index, UrbStatus::Completed),
            CompletionAction::Resubmit
        );
        device.with_playback_urb(index, |urb| {
            assert_eq!(&urb.buffer[..urb.length], &audio[copied..copied + urb.length]);
            assert_eq!(urb.length % BYTES_PER_FRAME, 0);
            copied += urb.length;
        });
    }
    // Synced sizing follows the all-sixes 48 kHz pattern.
    assert_eq!(copied, 4 * 4 * 6 * BYTES_PER_FRAME);
}

#[test]
fn test_capture_blocks_flow_to_the_host_ring() {
    let (_bus, _host, device) = streaming_device();

    let mut block = DecodedBlock::default();
    for (frame_idx, frame) in block.iter_mut().enumerate() {
        for (channel, sample) in frame.iter_mut().enumerate() {
            *sample = ((frame_idx as i32 + 1) << 16 | (channel as i32) << 8) << 8;
        }
    }
    let raw = encode_block(&block);

    assert_eq!(
        device.capture_completed(UrbStatus::Completed, &raw),
        CompletionAction::Resubmit
    );

    // The decode worker picks the block up asynchronously.
    let mut last = [0u8; BYTES_PER_FRAME];
    wait_until("decoded frames in the host capture ring", || {
        device.read_capture_frames(7, &mut last);
        last.iter().any(|&byte| byte != 0)
    });

    let mut bytes = [0u8; BYTES_PER_FRAME];
    device.read_capture_frames(0, &mut bytes);
    for (channel, &expected) in block[0].iter().enumerate() {
        let sample = us144_core::frame::unpack_sample(&bytes[channel * 3..]);
        assert_eq!(sample, expected);
    }
}

#[test]
fn test_sync_loss_stops_both_streams() {
    let (_bus, host, device) = streaming_device();
    for _ in 0..8 {
        device.feedback_completed(UrbStatus::Completed, &[Some(48)]);
    }
    assert!(device.synced());

    for _ in 0..42 {
        device.feedback_completed(UrbStatus::Completed, &[Some(0xFF)]);
    }

    assert_eq!(host.stops.lock().unwrap().as_slice(), &[StreamStopReason::SyncLost]);
    wait_until("stop worker settles the URB count", || device.active_urbs() == 0);
    assert!(!device.synced());
}

#[test]
fn test_stop_and_restart_cycle() {
    let (bus, _host, device) = streaming_device();

    device.trigger_stop();
    wait_until("URB count returns to zero", || device.active_urbs() == 0);
    assert!(bus.kills.lock().unwrap().contains(&UrbKind::Feedback));

    device.prepare(StreamDirection::Playback).unwrap();
    device.prepare(StreamDirection::Capture).unwrap();
    device.trigger_start().unwrap();
    assert_eq!(device.active_urbs(), 12);
    assert_eq!(device.playback_pointer(), 0);

    device.disconnect();
    wait_until("disconnect settles the URB count", || device.active_urbs() == 0);
}

#[test]
fn test_midi_round_trip() {
    let (bus, host, device) = streaming_device();

    device.midi_in_start().unwrap();
    device.midi_in_completed(
        UrbStatus::Completed,
        &[0xF8, 0xFD, 0xFD, 0xFD, 0xFD, 0xFD, 0xFD, 0xFD, 0x00],
    );
    assert_eq!(host.midi.lock().unwrap().as_slice(), &[0xF8]);

    let before = bus.submissions.lock().unwrap().len();
    device.midi_send(&[0x90, 64, 90]);
    wait_until("MIDI out submission", || {
        bus.submissions.lock().unwrap().len() > before
    });
    device.with_midi_out_urb(|urb| {
        assert_eq!(&urb.buffer[..3], &[0x90, 64, 90]);
    });
}
