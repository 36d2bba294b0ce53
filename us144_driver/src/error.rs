//! Error taxonomy for the driver core.
//!
//! Transient transport conditions are swallowed close to where they
//! occur; only configuration failures, start-time submission failures,
//! probe failures, and sync loss surface to the host layer.

use thiserror::Error;

/// A control transfer or alternate-setting selection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The endpoint stalled the request.
    #[error("endpoint stalled the request")]
    Stall,
    /// No response within the control timeout.
    #[error("control transfer timed out")]
    Timeout,
    /// The device is gone.
    #[error("device disconnected")]
    Disconnected,
    /// Any other transport failure, with the bus's error code.
    #[error("transport failure (code {0})")]
    Io(i32),
}

/// The rate-configuration sequence failed.
///
/// Surfaced to the host as a failed `hw_params`; the cached rate is
/// invalidated so the next stream-open retries the full sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The requested rate is not one of the four the device supports.
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedRate(u32),
    /// The period size is outside the advertised 48..=1024 frames.
    #[error("unsupported period size of {0} frames")]
    UnsupportedPeriod(usize),
    /// The buffer is smaller than one period or larger than 1 MiB.
    #[error("unsupported buffer size of {0} frames")]
    UnsupportedBuffer(usize),
    /// One message of the configuration sequence failed.
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        source: TransportError,
    },
}

/// A URB could not be handed to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The endpoint queue is full; try again.
    #[error("endpoint queue full")]
    Busy,
    /// The device is gone.
    #[error("device disconnected")]
    Disconnected,
    /// Any other submission failure, with the bus's error code.
    #[error("submission failure (code {0})")]
    Io(i32),
}

/// A stream operation was attempted in the wrong state or its initial
/// URB submissions failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    /// `hw_params`/`prepare` have not run since the last teardown.
    #[error("stream is not prepared")]
    NotPrepared,
    /// The device is gone.
    #[error("device disconnected")]
    Disconnected,
    /// An initial submission failed; the stream was rolled back.
    #[error("start-time submission failed: {0}")]
    Submit(#[from] SubmitError),
}

/// Instance creation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The product ID is not one this driver supports.
    #[error("unsupported product id {0:#06x}")]
    UnsupportedDevice(u16),
    /// The worker thread or a buffer could not be allocated.
    #[error("resource allocation failed")]
    Allocation,
}
