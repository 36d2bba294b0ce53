//! # US-144 Driver
//!
//! Driver core for the TASCAM US-144MKII (and US-144) USB audio
//! interface: four 24-bit channels each way at 44.1/48/88.2/96 kHz plus
//! a MIDI duplex, clocked by the device's isochronous feedback endpoint.
//!
//! The crate is transport-agnostic. A [`UsbBus`] implementation owns the
//! actual USB plumbing and feeds completions into the device's
//! `*_completed` handlers; a [`HostBridge`] receives period-elapsed and
//! MIDI upcalls. Everything between - the rate configurator, the
//! feedback clock, the playback and capture engines, routing, and the
//! stream lifecycle - lives here.
//!
//! ```no_run
//! use std::sync::Arc;
//! use us144_driver::{Us144Device, host::HostBridge};
//! # struct MyBus;
//! # struct MyHost;
//! # impl us144_driver::transport::UsbBus for MyBus {
//! #     fn control_out(&self, _: &us144_wire::ControlRequest, _: &[u8], _: u32) -> Result<(), us144_driver::error::TransportError> { Ok(()) }
//! #     fn control_in(&self, _: &us144_wire::ControlRequest, _: &mut [u8], _: u32) -> Result<usize, us144_driver::error::TransportError> { Ok(0) }
//! #     fn select_alt_setting(&self, _: u8, _: u8) -> Result<(), us144_driver::error::TransportError> { Ok(()) }
//! #     fn submit(&self, _: us144_driver::transport::UrbId) -> Result<(), us144_driver::error::SubmitError> { Ok(()) }
//! #     fn kill(&self, _: us144_driver::transport::UrbKind) {}
//! # }
//! # impl HostBridge for MyHost {
//! #     fn period_elapsed(&self, _: us144_driver::host::StreamDirection) {}
//! #     fn stream_stopped(&self, _: us144_driver::host::StreamStopReason) {}
//! #     fn midi_received(&self, _: &[u8]) {}
//! # }
//! let host: Arc<dyn HostBridge> = Arc::new(MyHost);
//! let device = Us144Device::new(MyBus, host, 0x8020).unwrap();
//! device.hw_params(us144_driver::host::StreamDirection::Playback, 48_000, 128, 1024).unwrap();
//! device.prepare(us144_driver::host::StreamDirection::Playback).unwrap();
//! device.trigger_start().unwrap();
//! ```

pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod feedback;
pub mod host;
pub mod midi;
pub mod playback;
pub mod routing;
pub mod stream;
pub mod transport;

pub use device::{DeviceModel, Us144Device};
pub use error::{ConfigError, ProbeError, StartError, SubmitError, TransportError};
pub use feedback::FEEDBACK_SYNC_LOSS_THRESHOLD;
pub use host::{HostBridge, StreamDirection, StreamStopReason};
pub use routing::{CaptureSource, PlaybackSource, RoutingMatrix};
pub use transport::{CompletionAction, UrbId, UrbKind, UrbStatus, UsbBus};

#[cfg(test)]
pub(crate) mod testutil;
