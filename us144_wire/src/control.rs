//! Vendor and class control requests understood by the device.
//!
//! The device is configured entirely through endpoint-zero control
//! transfers: a vendor "mode" request that moves it between config and
//! streaming states, class sampling-frequency requests on the two audio
//! endpoints, and vendor register writes that commit the selected rate.
//! The bus implementation consumes [`ControlRequest`] values verbatim.

use us144_core::SampleRate;

/// TASCAM's USB vendor ID.
pub const VENDOR_ID: u16 = 0x0644;

/// Product ID of the US-144MKII.
pub const PRODUCT_ID_US144MKII: u16 = 0x8020;

/// Product ID of the original US-144.
pub const PRODUCT_ID_US144: u16 = 0x800f;

/// Product ID of the US-122MKII, which shares the control protocol but
/// not the capture layout.
pub const PRODUCT_ID_US122MKII: u16 = 0x8021;

/// Audio interface number (alternate setting 1 streams).
pub const AUDIO_INTERFACE: u8 = 0;

/// MIDI interface number (alternate setting 1 streams).
pub const MIDI_INTERFACE: u8 = 1;

/// Alternate setting carrying the streaming endpoints on both interfaces.
pub const ALT_SETTING_STREAMING: u8 = 1;

/// Isochronous OUT endpoint carrying playback audio.
pub const EP_PLAYBACK: u8 = 0x02;

/// Isochronous IN endpoint carrying feedback bytes.
pub const EP_FEEDBACK: u8 = 0x81;

/// Bulk IN endpoint carrying raw capture blocks.
pub const EP_CAPTURE: u8 = 0x86;

/// Bulk IN endpoint carrying MIDI input packets.
pub const EP_MIDI_IN: u8 = 0x83;

/// Bulk OUT endpoint carrying MIDI output packets.
pub const EP_MIDI_OUT: u8 = 0x04;

/// bInterval of the feedback endpoint.
pub const FEEDBACK_INTERVAL: u8 = 4;

/// Vendor device-to-host request type.
pub const RT_VENDOR_IN: u8 = 0xC0;

/// Vendor host-to-device request type.
pub const RT_VENDOR_OUT: u8 = 0x40;

/// Class host-to-endpoint request type.
pub const RT_CLASS_EP_OUT: u8 = 0x22;

/// Class endpoint-to-host request type.
pub const RT_CLASS_EP_IN: u8 = 0xA2;

/// Vendor request selecting the device mode (also the handshake read).
pub const REQ_MODE: u8 = 0x49;

/// Vendor request writing one configuration register.
pub const REQ_REGISTER_WRITE: u8 = 0x41;

/// Class request setting an endpoint's sampling frequency.
pub const REQ_SET_SAMPLING_FREQ: u8 = 0x01;

/// Class request reading an endpoint's sampling frequency back.
pub const REQ_GET_SAMPLING_FREQ: u8 = 0x81;

/// Mode word: accept configuration.
pub const MODE_CONFIG: u16 = 0x0010;

/// Mode word: start streaming.
pub const MODE_STREAM_START: u16 = 0x0030;

/// Byte the handshake read returns on a healthy device.
pub const HANDSHAKE_MAGIC: u8 = 0x12;

/// wValue of the sampling-frequency control on both audio endpoints.
pub const SAMPLING_FREQ_CONTROL: u16 = 0x0100;

/// wIndex sent with every register write. The byte order is preserved
/// verbatim from captured traces.
pub const REGISTER_WRITE_INDEX: u16 = 0x0101;

/// Configuration register addresses, written in declaration order during
/// the rate sequence.
pub mod regs {
    /// First of the three fixed stream-setup registers.
    pub const STREAM_SETUP_0: u16 = 0x0d04;
    /// Second stream-setup register.
    pub const STREAM_SETUP_1: u16 = 0x0e00;
    /// Third stream-setup register.
    pub const STREAM_SETUP_2: u16 = 0x0f00;
    /// Rate-select register for 44.1 kHz.
    pub const RATE_44100: u16 = 0x1000;
    /// Rate-select register for 48 kHz.
    pub const RATE_48000: u16 = 0x1002;
    /// Rate-select register for 88.2 kHz.
    pub const RATE_88200: u16 = 0x1008;
    /// Rate-select register for 96 kHz.
    pub const RATE_96000: u16 = 0x100a;
    /// Final register committing the configuration.
    pub const STREAM_COMMIT: u16 = 0x110b;
}

/// Rate-select register address for `rate`.
pub const fn rate_register(rate: SampleRate) -> u16 {
    match rate {
        SampleRate::Rate44100 => regs::RATE_44100,
        SampleRate::Rate48000 => regs::RATE_48000,
        SampleRate::Rate88200 => regs::RATE_88200,
        SampleRate::Rate96000 => regs::RATE_96000,
    }
}

/// 3-byte little-endian frequency payload for the sampling-frequency
/// requests.
pub const fn freq_payload(rate: SampleRate) -> [u8; 3] {
    let hz = rate.hz().to_le_bytes();
    [hz[0], hz[1], hz[2]]
}

/// Parses a 3-byte little-endian frequency payload back to Hz.
pub const fn parse_freq_payload(payload: [u8; 3]) -> u32 {
    u32::from_le_bytes([payload[0], payload[1], payload[2], 0])
}

/// The setup packet of one control transfer, minus the data stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    /// The probe-time handshake read (expects [`HANDSHAKE_MAGIC`] back).
    pub const fn handshake() -> Self {
        Self {
            request_type: RT_VENDOR_IN,
            request: REQ_MODE,
            value: 0x0000,
            index: 0x0000,
        }
    }

    /// A mode change ([`MODE_CONFIG`] or [`MODE_STREAM_START`]).
    pub const fn mode(mode: u16) -> Self {
        Self {
            request_type: RT_VENDOR_OUT,
            request: REQ_MODE,
            value: mode,
            index: 0x0000,
        }
    }

    /// A write to one configuration register.
    pub const fn register_write(register: u16) -> Self {
        Self {
            request_type: RT_VENDOR_OUT,
            request: REQ_REGISTER_WRITE,
            value: register,
            index: REGISTER_WRITE_INDEX,
        }
    }

    /// Sets the sampling frequency of one audio endpoint; the data stage
    /// is [`freq_payload`].
    pub const fn set_sampling_freq(endpoint: u8) -> Self {
        Self {
            request_type: RT_CLASS_EP_OUT,
            request: REQ_SET_SAMPLING_FREQ,
            value: SAMPLING_FREQ_CONTROL,
            index: endpoint as u16,
        }
    }

    /// Reads the sampling frequency of one audio endpoint back.
    pub const fn get_sampling_freq(endpoint: u8) -> Self {
        Self {
            request_type: RT_CLASS_EP_IN,
            request: REQ_GET_SAMPLING_FREQ,
            value: SAMPLING_FREQ_CONTROL,
            index: endpoint as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freq_payloads() {
        assert_eq!(freq_payload(SampleRate::Rate44100), [0x44, 0xac, 0x00]);
        assert_eq!(freq_payload(SampleRate::Rate48000), [0x80, 0xbb, 0x00]);
        assert_eq!(freq_payload(SampleRate::Rate88200), [0x88, 0x58, 0x01]);
        assert_eq!(freq_payload(SampleRate::Rate96000), [0x00, 0x77, 0x01]);
    }

    #[test]
    fn test_freq_payload_round_trip() {
        for rate in SampleRate::ALL {
            assert_eq!(parse_freq_payload(freq_payload(rate)), rate.hz());
        }
    }

    #[test]
    fn test_rate_registers() {
        assert_eq!(rate_register(SampleRate::Rate44100), 0x1000);
        assert_eq!(rate_register(SampleRate::Rate48000), 0x1002);
        assert_eq!(rate_register(SampleRate::Rate88200), 0x1008);
        assert_eq!(rate_register(SampleRate::Rate96000), 0x100a);
    }

    #[test]
    fn test_register_write_shape() {
        let req = ControlRequest::register_write(regs::STREAM_SETUP_0);
        assert_eq!(req.request_type, 0x40);
        assert_eq!(req.request, 0x41);
        assert_eq!(req.value, 0x0d04);
        assert_eq!(req.index, 0x0101);
    }

    #[test]
    fn test_sampling_freq_requests_address_the_endpoint() {
        let set = ControlRequest::set_sampling_freq(EP_PLAYBACK);
        assert_eq!((set.request_type, set.request), (0x22, 0x01));
        assert_eq!(set.value, 0x0100);
        assert_eq!(set.index, 0x0002);

        let get = ControlRequest::get_sampling_freq(EP_FEEDBACK);
        assert_eq!((get.request_type, get.request), (0xA2, 0x81));
        assert_eq!(get.index, 0x0081);
    }
}
