//! The rate configurator.
//!
//! Selecting a sample rate is a fixed, ordered control-message
//! conversation: drop the device into config mode, program both audio
//! endpoints' sampling frequency (reading the output side back as a
//! check), write the three stream-setup registers, select the rate
//! register, commit, and start streaming. Any failed step invalidates
//! the cached rate so the next stream-open retries from scratch.

use std::sync::atomic::Ordering;

use us144_core::SampleRate;
use us144_wire::control::{
    self, ControlRequest, EP_FEEDBACK, EP_PLAYBACK, MODE_CONFIG, MODE_STREAM_START, regs,
};

use crate::{
    device::Us144Device,
    error::{ConfigError, TransportError},
    transport::{USB_CTRL_TIMEOUT_MS, UsbBus},
};

impl<B: UsbBus> Us144Device<B> {
    /// Runs the full configuration sequence for `rate` and starts
    /// streaming mode.
    ///
    /// Always sends the whole sequence, even when `rate` matches the
    /// cached value; the cache only feeds resume and the mixer's
    /// read-only rate control. On failure the cache resets to
    /// unconfigured.
    pub fn configure_for_rate(&self, rate: SampleRate) -> Result<(), ConfigError> {
        let result = self.run_rate_sequence(rate);
        match result {
            Ok(()) => self.current_rate_hz.store(rate.hz(), Ordering::Release),
            Err(_) => self.current_rate_hz.store(0, Ordering::Release),
        }
        result
    }

    fn run_rate_sequence(&self, rate: SampleRate) -> Result<(), ConfigError> {
        let freq = control::freq_payload(rate);

        self.control_step("mode config", &ControlRequest::mode(MODE_CONFIG), &[])?;
        self.control_step(
            "set input sampling frequency",
            &ControlRequest::set_sampling_freq(EP_FEEDBACK),
            &freq,
        )?;
        self.control_step(
            "set output sampling frequency",
            &ControlRequest::set_sampling_freq(EP_PLAYBACK),
            &freq,
        )?;

        let readback = self
            .read_sampling_freq(EP_PLAYBACK)
            .map_err(|source| ConfigError::Step {
                step: "read sampling frequency back",
                source,
            })?;
        if readback != rate.hz() {
            log::warn!("device reports {readback} Hz after programming {} Hz", rate.hz());
        }

        for (step, register) in [
            ("stream setup register 0", regs::STREAM_SETUP_0),
            ("stream setup register 1", regs::STREAM_SETUP_1),
            ("stream setup register 2", regs::STREAM_SETUP_2),
            ("rate select register", control::rate_register(rate)),
            ("stream commit register", regs::STREAM_COMMIT),
        ] {
            self.control_step(step, &ControlRequest::register_write(register), &[])?;
        }

        self.control_step("mode stream start", &ControlRequest::mode(MODE_STREAM_START), &[])
    }

    fn control_step(
        &self,
        step: &'static str,
        request: &ControlRequest,
        data: &[u8],
    ) -> Result<(), ConfigError> {
        self.bus
            .control_out(request, data, USB_CTRL_TIMEOUT_MS)
            .map_err(|source| ConfigError::Step { step, source })
    }

    /// The probe-time handshake read; a healthy device answers
    /// [`control::HANDSHAKE_MAGIC`].
    pub fn handshake(&self) -> Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        self.bus
            .control_in(&ControlRequest::handshake(), &mut byte, USB_CTRL_TIMEOUT_MS)?;
        Ok(byte[0])
    }

    /// Reads one endpoint's programmed sampling frequency in Hz.
    pub fn read_sampling_freq(&self, endpoint: u8) -> Result<u32, TransportError> {
        let mut payload = [0u8; 3];
        self.bus.control_in(
            &ControlRequest::get_sampling_freq(endpoint),
            &mut payload,
            USB_CTRL_TIMEOUT_MS,
        )?;
        Ok(control::parse_freq_payload(payload))
    }
}
