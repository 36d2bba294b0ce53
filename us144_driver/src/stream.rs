//! Stream lifecycle: hw_params, prepare, trigger, suspend/resume,
//! disconnect.
//!
//! Playback and capture share one trigger path: the device needs all
//! three audio pipes (feedback, playback, capture) co-scheduled for the
//! feedback clock to mean anything, so trigger-start submits them as a
//! unit and trigger-stop tears them down as a unit through the stop
//! worker.

use std::sync::atomic::Ordering;

use us144_core::SampleRate;
use us144_wire::control::{ALT_SETTING_STREAMING, AUDIO_INTERFACE, MIDI_INTERFACE};

use crate::{
    device::{Us144Device, Work},
    error::{ConfigError, StartError},
    host::{StreamDirection, StreamStopReason, caps},
    transport::{
        NUM_CAPTURE_URBS, NUM_FEEDBACK_URBS, NUM_PLAYBACK_URBS, UrbId, UrbKind, UsbBus,
    },
};

impl<B: UsbBus> Us144Device<B> {
    /// Applies the host's hardware parameters to one direction:
    /// validates the geometry, runs the rate configurator, and sizes
    /// the direction's host ring.
    pub fn hw_params(
        &self,
        direction: StreamDirection,
        rate_hz: u32,
        period_frames: usize,
        buffer_frames: usize,
    ) -> Result<(), ConfigError> {
        let rate = SampleRate::from_hz(rate_hz).ok_or(ConfigError::UnsupportedRate(rate_hz))?;
        if !(caps::MIN_PERIOD_FRAMES..=caps::MAX_PERIOD_FRAMES).contains(&period_frames) {
            return Err(ConfigError::UnsupportedPeriod(period_frames));
        }
        if buffer_frames < period_frames
            || buffer_frames * us144_core::frame::BYTES_PER_FRAME > caps::MAX_BUFFER_BYTES
        {
            return Err(ConfigError::UnsupportedBuffer(buffer_frames));
        }

        self.configure_for_rate(rate)?;

        {
            let mut shared = self.shared.lock().unwrap();
            let geometry = match direction {
                StreamDirection::Playback => &mut shared.playback,
                StreamDirection::Capture => &mut shared.capture,
            };
            geometry.period_frames = period_frames;
            geometry.buffer_frames = buffer_frames;
        }
        let ring = match direction {
            StreamDirection::Playback => &self.playback_ring,
            StreamDirection::Capture => &self.capture_ring,
        };
        ring.lock().unwrap().configure(buffer_frames);
        Ok(())
    }

    /// Releases one direction's hardware parameters.
    pub fn hw_free(&self, direction: StreamDirection) {
        let mut shared = self.shared.lock().unwrap();
        match direction {
            StreamDirection::Playback => shared.playback = Default::default(),
            StreamDirection::Capture => shared.capture = Default::default(),
        }
    }

    /// Prepares one direction for its next trigger-start. May run again
    /// between stop and start within a stream's lifetime.
    pub fn prepare(&self, direction: StreamDirection) -> Result<(), StartError> {
        let Some(rate) = self.current_rate() else {
            return Err(StartError::NotPrepared);
        };

        match direction {
            StreamDirection::Playback => {
                {
                    let mut shared = self.shared.lock().unwrap();
                    shared.playback_frames_consumed = 0;
                    shared.driver_playback_pos = 0;
                    shared.last_period_pos = 0;
                    shared.feedback.synced = false;
                    shared.feedback.consecutive_errors = 0;
                    shared.feedback.skip_count = NUM_FEEDBACK_URBS as u32;
                    shared.accumulator.fill_nominal(rate);
                }
                let nominal = rate.nominal_frames_per_packet() as usize;
                for urb in &self.playback_urbs {
                    urb.lock().unwrap().program_nominal(nominal);
                }
            }
            StreamDirection::Capture => {
                let mut shared = self.shared.lock().unwrap();
                shared.capture_frames_processed = 0;
                shared.driver_capture_pos = 0;
                shared.last_capture_period_pos = 0;
                shared.capture_backlog.clear();
            }
        }
        Ok(())
    }

    /// Starts both streams: flags first, then every feedback, playback,
    /// and capture URB in that order. Any submission failure rolls the
    /// whole start back and the caller must treat the stream as
    /// stopped.
    pub fn trigger_start(&self) -> Result<(), StartError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(StartError::Disconnected);
        }
        {
            let shared = self.shared.lock().unwrap();
            if self.current_rate().is_none() || shared.playback.buffer_frames == 0 {
                return Err(StartError::NotPrepared);
            }
        }
        if self.playback_active.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.capture_active.store(true, Ordering::Release);

        if let Err(err) = self.submit_stream_urbs() {
            self.playback_active.store(false, Ordering::Release);
            self.capture_active.store(false, Ordering::Release);
            self.schedule(Work::StopStreams);
            return Err(StartError::Submit(err));
        }
        Ok(())
    }

    fn submit_stream_urbs(&self) -> Result<(), crate::error::SubmitError> {
        let pools = [
            (UrbKind::Feedback, NUM_FEEDBACK_URBS),
            (UrbKind::Playback, NUM_PLAYBACK_URBS),
            (UrbKind::Capture, NUM_CAPTURE_URBS),
        ];
        for (kind, count) in pools {
            for index in 0..count {
                self.bus.submit(UrbId::new(kind, index))?;
                self.active_urbs.fetch_add(1, Ordering::AcqRel);
            }
        }
        Ok(())
    }

    /// Stops both streams. Teardown happens on the stop worker.
    pub fn trigger_stop(&self) {
        self.playback_active.store(false, Ordering::Release);
        self.capture_active.store(false, Ordering::Release);
        self.schedule(Work::StopStreams);
    }

    /// Stop worker body: kills the three audio anchors and settles the
    /// in-flight count.
    pub(crate) fn stop_streams(&self) {
        self.bus.kill(UrbKind::Feedback);
        self.bus.kill(UrbKind::Playback);
        self.bus.kill(UrbKind::Capture);
        self.active_urbs.store(0, Ordering::Release);
    }

    /// Fatal stop from a completion handler: clears the flags, defers
    /// the teardown to the stop worker, and reports the reason upward.
    pub(crate) fn fatal_stop(&self, reason: StreamStopReason) {
        self.playback_active.store(false, Ordering::Release);
        self.capture_active.store(false, Ordering::Release);
        self.schedule(Work::StopStreams);
        self.host.stream_stopped(reason);
    }

    /// System suspend: stops everything in place. The cached rate and
    /// the MIDI activity flags survive for resume.
    pub fn suspend(&self) {
        self.playback_active.store(false, Ordering::Release);
        self.capture_active.store(false, Ordering::Release);
        self.stop_streams();
        self.bus.kill(UrbKind::MidiIn);
        self.bus.kill(UrbKind::MidiOut);
    }

    /// System resume: restores the alternate settings, replays the rate
    /// configuration, and revives MIDI transfers whose flags stayed
    /// set. Audio streams wait for the host to re-prepare and
    /// re-trigger.
    pub fn resume(&self) -> Result<(), ConfigError> {
        for interface in [AUDIO_INTERFACE, MIDI_INTERFACE] {
            self.bus
                .select_alt_setting(interface, ALT_SETTING_STREAMING)
                .map_err(|source| ConfigError::Step {
                    step: "select alternate setting",
                    source,
                })?;
        }
        if let Some(rate) = self.current_rate() {
            self.configure_for_rate(rate)?;
        }

        if self.midi_in_active.load(Ordering::Acquire) {
            if let Err(err) = self.bus.submit(UrbId::new(UrbKind::MidiIn, 0)) {
                log::warn!("MIDI in resubmission failed on resume: {err}");
                self.midi_in_active.store(false, Ordering::Release);
            }
        }
        if self.midi_out_active.load(Ordering::Acquire) {
            if self.fill_midi_out_urb() {
                if let Err(err) = self.bus.submit(UrbId::new(UrbKind::MidiOut, 0)) {
                    log::warn!("MIDI out resubmission failed on resume: {err}");
                    self.midi_out_active.store(false, Ordering::Release);
                }
            } else {
                self.midi_out_active.store(false, Ordering::Release);
            }
        }
        Ok(())
    }

    /// Device removal: blocks further operations, cancels everything,
    /// and retires the worker thread. The host layer disconnects its
    /// card before calling in.
    pub fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        self.playback_active.store(false, Ordering::Release);
        self.capture_active.store(false, Ordering::Release);
        self.midi_in_active.store(false, Ordering::Release);
        self.midi_out_active.store(false, Ordering::Release);
        for kind in UrbKind::ALL {
            self.bus.kill(kind);
        }
        self.active_urbs.store(0, Ordering::Release);
        self.join_worker();
    }
}
