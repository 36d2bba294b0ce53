//! # US-144 Core
//!
//! Rate-invariant mechanisms shared by the US-144MKII driver core:
//!
//! - [`SampleRate`] - the four supported rates with their feedback
//!   pattern tables
//! - [`FeedbackAccumulator`] - the 128-slot ring of per-packet frame
//!   counts joining the feedback and playback paths
//! - [`ByteRing`] - the overwriting byte ring between capture URB
//!   completions and the decode worker
//! - [`frame`] - the packed 24-bit, 4-channel frame layout
//!
//! Everything here is pure data and arithmetic; locking and I/O live in
//! `us144_driver`.

pub mod accumulator;
pub mod frame;
pub mod rate;
pub mod ring;

pub use accumulator::{FEEDBACK_ACCUMULATOR_SIZE, FeedbackAccumulator};
pub use rate::SampleRate;
pub use ring::ByteRing;
