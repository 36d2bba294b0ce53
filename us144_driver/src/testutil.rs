//! Test doubles shared by the unit tests: a recording [`UsbBus`] and a
//! counting [`HostBridge`].

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use us144_wire::ControlRequest;
use us144_wire::control::{
    PRODUCT_ID_US144MKII, REQ_GET_SAMPLING_FREQ, REQ_MODE, REQ_SET_SAMPLING_FREQ, RT_VENDOR_IN,
};

use crate::{
    device::Us144Device,
    error::{SubmitError, TransportError},
    host::{HostBridge, StreamDirection, StreamStopReason},
    transport::{UrbId, UrbKind, UrbStatus, UsbBus},
};

/// One recorded control transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BusMessage {
    Out(ControlRequest, Vec<u8>),
    In(ControlRequest),
}

/// Records every call; failures are injected per test.
pub(crate) struct MockBus {
    pub messages: Mutex<Vec<BusMessage>>,
    pub submissions: Mutex<Vec<UrbId>>,
    pub killed: Mutex<Vec<UrbKind>>,
    pub alt_settings: Mutex<Vec<(u8, u8)>>,
    pub handshake_response: Mutex<u8>,
    pub programmed_freq: Mutex<[u8; 3]>,
    /// Fail the Nth `control_out` (counting from 0) with a stall.
    pub fail_control_out: Mutex<Option<usize>>,
    control_out_count: AtomicUsize,
    /// Refuse submissions of this kind.
    pub fail_submit: Mutex<Option<UrbKind>>,
}

impl MockBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            killed: Mutex::new(Vec::new()),
            alt_settings: Mutex::new(Vec::new()),
            handshake_response: Mutex::new(us144_wire::control::HANDSHAKE_MAGIC),
            programmed_freq: Mutex::new([0; 3]),
            fail_control_out: Mutex::new(None),
            control_out_count: AtomicUsize::new(0),
            fail_submit: Mutex::new(None),
        })
    }

    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
        self.submissions.lock().unwrap().clear();
        self.killed.lock().unwrap().clear();
        self.alt_settings.lock().unwrap().clear();
        self.control_out_count.store(0, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> Vec<UrbId> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn recorded(&self) -> Vec<BusMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl UsbBus for Arc<MockBus> {
    fn control_out(
        &self,
        request: &ControlRequest,
        data: &[u8],
        _timeout_ms: u32,
    ) -> Result<(), TransportError> {
        let count = self.control_out_count.fetch_add(1, Ordering::Relaxed);
        if *self.fail_control_out.lock().unwrap() == Some(count) {
            return Err(TransportError::Stall);
        }
        if request.request == REQ_SET_SAMPLING_FREQ && data.len() == 3 {
            *self.programmed_freq.lock().unwrap() = [data[0], data[1], data[2]];
        }
        self.messages
            .lock()
            .unwrap()
            .push(BusMessage::Out(*request, data.to_vec()));
        Ok(())
    }

    fn control_in(
        &self,
        request: &ControlRequest,
        buf: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<usize, TransportError> {
        self.messages.lock().unwrap().push(BusMessage::In(*request));
        if request.request_type == RT_VENDOR_IN && request.request == REQ_MODE {
            buf[0] = *self.handshake_response.lock().unwrap();
            return Ok(1);
        }
        if request.request == REQ_GET_SAMPLING_FREQ {
            buf[..3].copy_from_slice(&*self.programmed_freq.lock().unwrap());
            return Ok(3);
        }
        Ok(0)
    }

    fn select_alt_setting(&self, interface: u8, alt_setting: u8) -> Result<(), TransportError> {
        self.alt_settings.lock().unwrap().push((interface, alt_setting));
        Ok(())
    }

    fn submit(&self, urb: UrbId) -> Result<(), SubmitError> {
        if *self.fail_submit.lock().unwrap() == Some(urb.kind) {
            return Err(SubmitError::Busy);
        }
        self.submissions.lock().unwrap().push(urb);
        Ok(())
    }

    fn kill(&self, kind: UrbKind) {
        self.killed.lock().unwrap().push(kind);
    }
}

/// Counts upcalls.
pub(crate) struct RecordingHost {
    pub playback_periods: AtomicUsize,
    pub capture_periods: AtomicUsize,
    pub stops: Mutex<Vec<StreamStopReason>>,
    pub midi: Mutex<Vec<u8>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            playback_periods: AtomicUsize::new(0),
            capture_periods: AtomicUsize::new(0),
            stops: Mutex::new(Vec::new()),
            midi: Mutex::new(Vec::new()),
        })
    }

    pub fn playback_periods(&self) -> usize {
        self.playback_periods.load(Ordering::SeqCst)
    }

    pub fn capture_periods(&self) -> usize {
        self.capture_periods.load(Ordering::SeqCst)
    }
}

impl HostBridge for RecordingHost {
    fn period_elapsed(&self, direction: StreamDirection) {
        match direction {
            StreamDirection::Playback => self.playback_periods.fetch_add(1, Ordering::SeqCst),
            StreamDirection::Capture => self.capture_periods.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn stream_stopped(&self, reason: StreamStopReason) {
        self.stops.lock().unwrap().push(reason);
    }

    fn midi_received(&self, bytes: &[u8]) {
        self.midi.lock().unwrap().extend_from_slice(bytes);
    }
}

pub(crate) type TestDevice = Us144Device<Arc<MockBus>>;

/// A fresh device on a recording bus, message log cleared of the probe
/// traffic.
pub(crate) fn test_device() -> (Arc<MockBus>, Arc<RecordingHost>, Arc<TestDevice>) {
    let bus = MockBus::new();
    let host = RecordingHost::new();
    let device = Us144Device::new(
        Arc::clone(&bus),
        Arc::clone(&host) as Arc<dyn HostBridge>,
        PRODUCT_ID_US144MKII,
    )
    .unwrap();
    bus.clear();
    (bus, host, device)
}

/// A device configured at 48 kHz and triggered, with the feedback skip
/// counter already drained.
pub(crate) fn streaming_device_48k(
    period_frames: usize,
    buffer_frames: usize,
) -> (Arc<MockBus>, Arc<RecordingHost>, Arc<TestDevice>) {
    let (bus, host, device) = test_device();
    device
        .hw_params(StreamDirection::Playback, 48_000, period_frames, buffer_frames)
        .unwrap();
    device
        .hw_params(StreamDirection::Capture, 48_000, period_frames, buffer_frames)
        .unwrap();
    device.prepare(StreamDirection::Playback).unwrap();
    device.prepare(StreamDirection::Capture).unwrap();
    device.trigger_start().unwrap();
    drain_feedback_skip(&device);
    bus.clear();
    (bus, host, device)
}

/// Burns through the prepare-time skip counter with empty feedback URBs.
pub(crate) fn drain_feedback_skip(device: &TestDevice) {
    for _ in 0..crate::transport::NUM_FEEDBACK_URBS {
        device.feedback_completed(UrbStatus::Completed, &[None]);
    }
}

/// Feeds in-range feedback bytes until the clock reports sync.
pub(crate) fn acquire_sync(device: &TestDevice, value: u8) {
    for _ in 0..16 {
        if device.synced() {
            return;
        }
        device.feedback_completed(UrbStatus::Completed, &[Some(value)]);
    }
    assert!(device.synced(), "sync not acquired after 16 feedback URBs");
}

/// Polls `condition` for up to a second.
pub(crate) fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("timed out waiting for {what}");
}
