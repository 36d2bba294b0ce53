//! # US-144 Wire
//!
//! Wire formats for the US-144MKII USB audio interface:
//!
//! - [`control`] - vendor/class control requests, register map, device
//!   and endpoint identifiers
//! - [`capture`] - the bit-interleaved 512-byte capture block codec
//! - [`midi`] - 9-byte MIDI packet framing
//!
//! Pure functions over byte slices; no I/O.

pub mod capture;
pub mod control;
pub mod midi;

pub use capture::{FRAMES_PER_DECODE_BLOCK, RAW_BYTES_PER_DECODE_BLOCK, decode_block};
pub use control::ControlRequest;
