//! The device instance.
//!
//! One [`Us144Device`] per attached interface pair. It owns every
//! buffer the streams use (allocated here, freed on drop), the instance
//! lock over the shared stream state, the atomic activity flags the
//! completion handlers consult, and the deferred worker thread.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
};

use us144_core::{ByteRing, FeedbackAccumulator, SampleRate};
use us144_wire::control::{
    PRODUCT_ID_US122MKII, PRODUCT_ID_US144, PRODUCT_ID_US144MKII,
};

use crate::{
    error::ProbeError,
    host::{HostBridge, HostRing},
    routing::RoutingMatrix,
    transport::{
        MidiOutUrb, NUM_CAPTURE_URBS, NUM_PLAYBACK_URBS, PLAYBACK_URB_BYTES, PlaybackUrb, UrbStatus,
        UsbBus,
    },
};

/// Capture backlog ring size: four URBs of headroom over the pool.
pub(crate) const CAPTURE_BACKLOG_BYTES: usize =
    us144_wire::RAW_BYTES_PER_DECODE_BLOCK * NUM_CAPTURE_URBS * 4;

/// Device variants sharing this driver core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    /// US-144MKII (0x0644:0x8020).
    Us144Mkii,
    /// Original US-144 (0x0644:0x800f).
    Us144,
}

impl DeviceModel {
    /// Maps a product ID to a supported model. The US-122MKII shares
    /// the control protocol but not the capture layout and is refused.
    pub fn from_product_id(product_id: u16) -> Result<Self, ProbeError> {
        match product_id {
            PRODUCT_ID_US144MKII => Ok(DeviceModel::Us144Mkii),
            PRODUCT_ID_US144 => Ok(DeviceModel::Us144),
            PRODUCT_ID_US122MKII => Err(ProbeError::UnsupportedDevice(product_id)),
            other => Err(ProbeError::UnsupportedDevice(other)),
        }
    }
}

/// Feedback clock sync state, driven by the feedback engine.
pub(crate) struct FeedbackState {
    pub(crate) synced: bool,
    pub(crate) consecutive_errors: u32,
    pub(crate) skip_count: u32,
    pub(crate) packets_per_urb: usize,
}

/// One direction's PCM geometry, set by `hw_params`.
#[derive(Clone, Copy, Default)]
pub(crate) struct PcmGeometry {
    pub(crate) period_frames: usize,
    pub(crate) buffer_frames: usize,
}

/// Everything guarded by the instance lock. Held briefly: never across
/// a bulk copy, a URB submission, or a host upcall.
pub(crate) struct Shared {
    pub(crate) accumulator: FeedbackAccumulator,
    pub(crate) capture_backlog: ByteRing,
    pub(crate) feedback: FeedbackState,
    pub(crate) playback_frames_consumed: u64,
    pub(crate) capture_frames_processed: u64,
    pub(crate) driver_playback_pos: usize,
    pub(crate) driver_capture_pos: usize,
    pub(crate) last_period_pos: u64,
    pub(crate) last_capture_period_pos: u64,
    pub(crate) playback: PcmGeometry,
    pub(crate) capture: PcmGeometry,
}

/// Period boundaries crossed while the lock was held; the matching
/// upcalls are delivered after it is released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PeriodEvents {
    pub(crate) playback: bool,
    pub(crate) capture: bool,
}

impl Shared {
    /// Advances the period bookkeeping and reports which boundaries
    /// were crossed. Multiple periods elapsed at once still yield one
    /// event each.
    pub(crate) fn take_period_events(&mut self, capture_active: bool) -> PeriodEvents {
        let mut events = PeriodEvents::default();
        if self.playback.period_frames > 0 {
            let current = self.playback_frames_consumed / self.playback.period_frames as u64;
            if current > self.last_period_pos {
                self.last_period_pos = current;
                events.playback = true;
            }
        }
        if capture_active && self.capture.period_frames > 0 {
            let current = self.capture_frames_processed / self.capture.period_frames as u64;
            if current > self.last_capture_period_pos {
                self.last_capture_period_pos = current;
                events.capture = true;
            }
        }
        events
    }
}

/// Items handled by the deferred worker thread.
pub(crate) enum Work {
    DecodeCapture,
    MidiOut,
    StopStreams,
    Shutdown,
}

/// A US-144MKII (or US-144) behind a [`UsbBus`].
pub struct Us144Device<B: UsbBus> {
    pub(crate) bus: B,
    pub(crate) host: Arc<dyn HostBridge>,
    model: DeviceModel,
    pub(crate) shared: Mutex<Shared>,
    pub(crate) routing: RoutingMatrix,
    pub(crate) playback_ring: Mutex<HostRing>,
    pub(crate) capture_ring: Mutex<HostRing>,
    pub(crate) scratch: Mutex<Box<[u8]>>,
    pub(crate) playback_urbs: [Mutex<PlaybackUrb>; NUM_PLAYBACK_URBS],
    pub(crate) midi_out_urb: Mutex<MidiOutUrb>,
    pub(crate) midi_out_queue: Mutex<VecDeque<u8>>,
    pub(crate) playback_active: AtomicBool,
    pub(crate) capture_active: AtomicBool,
    pub(crate) midi_in_active: AtomicBool,
    pub(crate) midi_out_active: AtomicBool,
    pub(crate) active_urbs: AtomicUsize,
    pub(crate) current_rate_hz: AtomicU32,
    pub(crate) disconnected: AtomicBool,
    transport_errors: AtomicU32,
    work_tx: mpsc::Sender<Work>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<B: UsbBus + 'static> Us144Device<B> {
    /// Creates the instance for an enumerated device, probes it with the
    /// handshake read, and starts the worker thread.
    ///
    /// A handshake mismatch is logged but not fatal; an unsupported
    /// product ID is.
    pub fn new(bus: B, host: Arc<dyn HostBridge>, product_id: u16) -> Result<Arc<Self>, ProbeError> {
        let model = DeviceModel::from_product_id(product_id)?;
        let (work_tx, work_rx) = mpsc::channel();

        let device = Arc::new(Self {
            bus,
            host,
            model,
            shared: Mutex::new(Shared {
                accumulator: FeedbackAccumulator::new(),
                capture_backlog: ByteRing::new(CAPTURE_BACKLOG_BYTES),
                feedback: FeedbackState {
                    synced: false,
                    consecutive_errors: 0,
                    skip_count: 0,
                    packets_per_urb: 1,
                },
                playback_frames_consumed: 0,
                capture_frames_processed: 0,
                driver_playback_pos: 0,
                driver_capture_pos: 0,
                last_period_pos: 0,
                last_capture_period_pos: 0,
                playback: PcmGeometry::default(),
                capture: PcmGeometry::default(),
            }),
            routing: RoutingMatrix::new(),
            playback_ring: Mutex::new(HostRing::new()),
            capture_ring: Mutex::new(HostRing::new()),
            scratch: Mutex::new(vec![0; PLAYBACK_URB_BYTES].into_boxed_slice()),
            playback_urbs: [
                Mutex::new(PlaybackUrb::new()),
                Mutex::new(PlaybackUrb::new()),
                Mutex::new(PlaybackUrb::new()),
                Mutex::new(PlaybackUrb::new()),
            ],
            midi_out_urb: Mutex::new(MidiOutUrb::new()),
            midi_out_queue: Mutex::new(VecDeque::new()),
            playback_active: AtomicBool::new(false),
            capture_active: AtomicBool::new(false),
            midi_in_active: AtomicBool::new(false),
            midi_out_active: AtomicBool::new(false),
            active_urbs: AtomicUsize::new(0),
            current_rate_hz: AtomicU32::new(0),
            disconnected: AtomicBool::new(false),
            transport_errors: AtomicU32::new(0),
            work_tx,
            worker: Mutex::new(None),
        });

        device.probe_handshake();

        let weak = Arc::downgrade(&device);
        let handle = thread::Builder::new()
            .name("us144-worker".into())
            .spawn(move || worker_loop(weak, work_rx))
            .map_err(|_| ProbeError::Allocation)?;
        *device.worker.lock().unwrap() = Some(handle);

        Ok(device)
    }
}

impl<B: UsbBus> Us144Device<B> {
    /// The probed device variant.
    pub fn model(&self) -> DeviceModel {
        self.model
    }

    /// The configured rate, or `None` before the first successful
    /// configuration. Read-only on the control-mixer surface.
    pub fn current_rate(&self) -> Option<SampleRate> {
        SampleRate::from_hz(self.current_rate_hz.load(Ordering::Acquire))
    }

    /// The routing selectors (the rest of the mixer surface).
    pub fn routing(&self) -> &RoutingMatrix {
        &self.routing
    }

    /// Host pointer query: playback frames consumed by the device,
    /// modulo the buffer size.
    pub fn playback_pointer(&self) -> usize {
        let shared = self.shared.lock().unwrap();
        if shared.playback.buffer_frames == 0 {
            return 0;
        }
        (shared.playback_frames_consumed % shared.playback.buffer_frames as u64) as usize
    }

    /// Host pointer query for the capture stream.
    pub fn capture_pointer(&self) -> usize {
        let shared = self.shared.lock().unwrap();
        if shared.capture.buffer_frames == 0 {
            return 0;
        }
        (shared.capture_frames_processed % shared.capture.buffer_frames as u64) as usize
    }

    /// Writes host playback audio into the ring at `start_frame`.
    pub fn write_playback_frames(&self, start_frame: usize, data: &[u8]) {
        self.playback_ring.lock().unwrap().write_frames(start_frame, data);
    }

    /// Reads captured audio out of the ring at `start_frame`.
    pub fn read_capture_frames(&self, start_frame: usize, out: &mut [u8]) {
        self.capture_ring.lock().unwrap().read_frames(start_frame, out);
    }

    /// Whether the feedback clock currently drives packet sizing.
    pub fn synced(&self) -> bool {
        self.shared.lock().unwrap().feedback.synced
    }

    /// In-flight audio URBs (feedback + playback + capture).
    pub fn active_urbs(&self) -> usize {
        self.active_urbs.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn playback_active(&self) -> bool {
        self.playback_active.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn capture_active(&self) -> bool {
        self.capture_active.load(Ordering::Acquire)
    }

    /// Runs `f` against one playback URB's transfer state. The bus uses
    /// this to read the descriptor table and buffer when transmitting.
    pub fn with_playback_urb<R>(&self, index: usize, f: impl FnOnce(&PlaybackUrb) -> R) -> R {
        f(&self.playback_urbs[index].lock().unwrap())
    }

    /// Runs `f` against the MIDI OUT URB's transfer state.
    pub fn with_midi_out_urb<R>(&self, f: impl FnOnce(&MidiOutUrb) -> R) -> R {
        f(&self.midi_out_urb.lock().unwrap())
    }

    fn probe_handshake(&self) {
        match self.handshake() {
            Ok(byte) if byte == us144_wire::control::HANDSHAKE_MAGIC => {}
            Ok(byte) => {
                log::warn!("unexpected handshake byte {byte:#04x}, continuing");
            }
            Err(err) => {
                log::warn!("handshake read failed ({err}), continuing");
            }
        }
    }

    pub(crate) fn schedule(&self, work: Work) {
        if self.disconnected.load(Ordering::Acquire) {
            return;
        }
        let _ = self.work_tx.send(work);
    }

    /// One URB retired on the audio endpoints.
    pub(crate) fn release_audio_urb(&self) {
        let _ = self
            .active_urbs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Logs a non-teardown transport failure, rate-limited.
    pub(crate) fn log_urb_error(&self, what: &str, status: UrbStatus) {
        let count = self.transport_errors.fetch_add(1, Ordering::Relaxed);
        if count % 64 == 0 {
            log::warn!("{what} URB failed with {status:?} ({} so far)", count + 1);
        }
    }

    pub(crate) fn join_worker(&self) {
        let _ = self.work_tx.send(Work::Shutdown);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            join_unless_current(handle);
        }
    }
}

impl<B: UsbBus> Drop for Us144Device<B> {
    fn drop(&mut self) {
        let _ = self.work_tx.send(Work::Shutdown);
        if let Some(handle) = self.worker.get_mut().map(Option::take).unwrap_or(None) {
            join_unless_current(handle);
        }
    }
}

/// The last reference can die on the worker thread itself (it upgrades
/// its weak handle per work item); joining there would block forever.
fn join_unless_current(handle: JoinHandle<()>) {
    if handle.thread().id() != thread::current().id() {
        let _ = handle.join();
    }
}

fn worker_loop<B: UsbBus + 'static>(device: Weak<Us144Device<B>>, work_rx: mpsc::Receiver<Work>) {
    while let Ok(work) = work_rx.recv() {
        let Some(device) = device.upgrade() else {
            break;
        };
        match work {
            Work::DecodeCapture => device.decode_pending_capture(),
            Work::MidiOut => device.pump_midi_out(),
            Work::StopStreams => device.stop_streams(),
            Work::Shutdown => break,
        }
    }
}
