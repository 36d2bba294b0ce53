//! MIDI packet framing.
//!
//! Both MIDI endpoints move fixed 9-byte packets: eight payload bytes
//! followed by one trailer (`0x00` on output; the input trailer varies
//! and is ignored). Unused payload positions are padded with `0xFD`,
//! which is not a valid MIDI byte and is skipped on receive.

/// Bytes per MIDI packet in either direction.
pub const MIDI_PACKET_LEN: usize = 9;

/// Payload bytes per packet.
pub const MIDI_DATA_LEN: usize = MIDI_PACKET_LEN - 1;

/// Padding byte inside the payload.
pub const MIDI_PAD_BYTE: u8 = 0xFD;

/// Trailer appended to every output packet.
pub const MIDI_OUT_TRAILER: u8 = 0x00;

/// Packs up to [`MIDI_DATA_LEN`] bytes into one output packet.
///
/// Returns the packet and how many bytes of `data` it consumed; the
/// remainder goes into the next packet.
pub fn pack_out(data: &[u8]) -> ([u8; MIDI_PACKET_LEN], usize) {
    let taken = data.len().min(MIDI_DATA_LEN);
    let mut packet = [MIDI_PAD_BYTE; MIDI_PACKET_LEN];
    packet[..taken].copy_from_slice(&data[..taken]);
    packet[MIDI_DATA_LEN] = MIDI_OUT_TRAILER;
    (packet, taken)
}

/// Extracts the MIDI bytes from a bulk-IN payload.
///
/// Processes every whole packet in `payload`, skipping pad bytes and
/// trailers, and appends the result to `out`. A trailing partial packet
/// is ignored. Returns the number of bytes extracted.
pub fn unpack_in(payload: &[u8], out: &mut Vec<u8>) -> usize {
    let before = out.len();
    for packet in payload.chunks_exact(MIDI_PACKET_LEN) {
        out.extend(
            packet[..MIDI_DATA_LEN]
                .iter()
                .copied()
                .filter(|&byte| byte != MIDI_PAD_BYTE),
        );
    }
    out.len() - before
}
