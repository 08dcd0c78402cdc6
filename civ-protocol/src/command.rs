use std::sync::{Arc, Mutex};

use log::{error, trace};

use crate::bcd;
use crate::error::{CivError, Result};
use crate::frequency::Frequency;
use crate::protocol::{ADDR_CONTROLLER, ADDR_IC705, Frame};
use crate::transport::Transport;

/// CI-V command bytes.
pub mod cmd {
    /// Frequency broadcast (transceive).
    pub const TRANSCEIVE_FREQ: u8 = 0x00;
    /// Mode broadcast (transceive).
    pub const TRANSCEIVE_MODE: u8 = 0x01;
    /// Read the currently displayed frequency.
    pub const READ_FREQ: u8 = 0x03;
    /// Read the current operating mode and filter.
    pub const READ_MODE: u8 = 0x04;
    /// Set the operating frequency.
    pub const SET_FREQ: u8 = 0x05;
    /// Set duplex offset frequency.
    pub const SET_OFFSET: u8 = 0x0D;
    /// Read/set duplex direction.
    pub const DUPLEX: u8 = 0x0F;
    /// Read/write level settings (AF gain, squelch, RF power, etc.).
    pub const LEVEL: u8 = 0x14;
    /// Read/write various function settings (tone squelch, etc.).
    pub const VARIOUS: u8 = 0x16;
    /// Send/read tone frequency settings.
    pub const TONE: u8 = 0x1B;
}

/// Sub-commands for the DUPLEX (0x0F) command.
pub mod duplex_sub {
    pub const DUP_MINUS: u8 = 0x11;
    pub const DUP_PLUS: u8 = 0x12;
}

/// Sub-commands for the LEVEL (0x14) command.
pub mod level_sub {
    /// RF power level.
    pub const RF_POWER: u8 = 0x0A;
}

/// Sub-commands for the VARIOUS (0x16) command.
pub mod various_sub {
    /// Repeater tone on/off.
    pub const REPEATER_TONE: u8 = 0x42;
}

/// Sub-commands for the TONE (0x1B) command.
pub mod tone_sub {
    /// Repeater tone (Tx) frequency.
    pub const REPEATER_TONE: u8 = 0x00;
    /// TSQL tone (Rx) frequency.
    pub const TSQL_TONE: u8 = 0x01;
}

/// Digits in a repeater tone field: tenths of Hz, e.g. `1035` for 103.5 Hz.
pub const TONE_DIGITS: usize = 4;

/// Digits sent by the set-offset command.
pub const OFFSET_DIGITS: usize = 6;

/// The "0d" send frequency offset command starts at the 100 Hz digit!
/// Good only for the IC-705: the two lowest digits are skipped.
pub const OFFSET_FIRST_DIGIT: usize = 2;

/// Builds CI-V frames and writes them to the serial sink.
///
/// Every call builds one frame from scratch, so clones can be used from
/// any task. Write failures are logged, never returned.
#[derive(Clone)]
pub struct CommandEncoder {
    sink: Arc<Mutex<dyn Transport>>,
    transmitter: u8,
    controller: u8,
}

impl CommandEncoder {
    /// An encoder using the default IC-705 and controller addresses.
    pub fn new<T: Transport + 'static>(sink: T) -> Self {
        Self::with_addresses(sink, ADDR_IC705, ADDR_CONTROLLER)
    }

    pub fn with_addresses<T: Transport + 'static>(
        sink: T,
        transmitter: u8,
        controller: u8,
    ) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            transmitter,
            controller,
        }
    }

    pub fn transmitter(&self) -> u8 {
        self.transmitter
    }

    pub fn controller(&self) -> u8 {
        self.controller
    }

    fn frame(&self, command: u8) -> Frame {
        Frame::new(self.transmitter, self.controller, command)
    }

    /// A command with no sub-command or data, e.g. 0x03 (read frequency).
    pub fn encode_command(&self, command: u8) -> Frame {
        self.frame(command)
    }

    pub fn encode_command_sub(&self, command: u8, sub: u8) -> Frame {
        self.frame(command).param(sub)
    }

    /// Set frequency: 10 BCD digits, lowest first, packed two per byte.
    pub fn encode_set_frequency(&self, hz: u64) -> Result<Frame> {
        let freq = Frequency::from_hz(hz)?;
        Ok(self.frame(cmd::SET_FREQ).params(&freq.to_civ_bytes()))
    }

    /// Set repeater tone from tenths of Hz. Must be exactly four digits.
    ///
    /// The radio wants these digits in reverse order compared to the
    /// frequency field, so they are packed high digit first.
    pub fn encode_set_repeater_tone(&self, deci_hz: u32) -> Result<Frame> {
        let packed = bcd::encode_digits_exact_be(u64::from(deci_hz), TONE_DIGITS)?;
        Ok(self
            .frame(cmd::TONE)
            .param(tone_sub::REPEATER_TONE)
            .params(&packed))
    }

    pub fn encode_tone_enable(&self, enabled: bool) -> Frame {
        self.frame(cmd::VARIOUS)
            .param(various_sub::REPEATER_TONE)
            .param(u8::from(enabled))
    }

    /// Duplex offset in Hz, sent from the 100 Hz digit up.
    pub fn encode_freq_offset(&self, hz: u64) -> Result<Frame> {
        let freq = Frequency::from_hz(hz)?;
        let packed = bcd::encode_digits_le(freq.hz(), OFFSET_DIGITS, OFFSET_FIRST_DIGIT);
        Ok(self.frame(cmd::SET_OFFSET).params(&packed))
    }

    /// Read request: controller asks for some value from the radio.
    pub fn send_command(&self, command: u8) {
        self.write(&self.encode_command(command));
    }

    pub fn send_command_sub(&self, command: u8, sub: u8) {
        self.write(&self.encode_command_sub(command, sub));
    }

    pub fn send_set_frequency(&self, hz: u64) {
        self.send_checked("set frequency", self.encode_set_frequency(hz));
    }

    pub fn send_set_repeater_tone(&self, deci_hz: u32) {
        self.send_checked("set tone", self.encode_set_repeater_tone(deci_hz));
    }

    pub fn send_tone_enable(&self, enabled: bool) {
        self.write(&self.encode_tone_enable(enabled));
    }

    pub fn send_freq_offset(&self, hz: u64) {
        self.send_checked("set offset", self.encode_freq_offset(hz));
    }

    fn send_checked(&self, what: &str, frame: Result<Frame>) {
        match frame {
            Ok(frame) => self.write(&frame),
            Err(e) => error!(target: "CiV", "bad {what} command format: {e}"),
        }
    }

    fn write(&self, frame: &Frame) {
        let bytes = frame.to_bytes();
        trace!("TX: {:02X?}", bytes);
        if let Err(e) = self.try_write(&bytes) {
            error!(target: "CiV", "CiV send command error: {e}");
        }
    }

    fn try_write(&self, bytes: &[u8]) -> Result<()> {
        let mut sink = self.sink.lock().map_err(|_| CivError::SinkPoisoned)?;
        sink.write_all(bytes)?;
        sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::FREQ_DIGITS;
    use crate::protocol::{EOM, FRAME_OVERHEAD, PREAMBLE};
    use crate::transport::MemoryTransport;

    fn encoder() -> (CommandEncoder, MemoryTransport) {
        let sink = MemoryTransport::new();
        (CommandEncoder::new(sink.clone()), sink)
    }

    #[test]
    fn test_read_frequency_frame() {
        let (enc, sink) = encoder();
        enc.send_command(cmd::READ_FREQ);
        assert_eq!(sink.writes(), vec![vec![0xFE, 0xFE, 0xA4, 0xE0, 0x03, 0xFD]]);
    }

    #[test]
    fn test_command_sub_frame() {
        let (enc, sink) = encoder();
        enc.send_command_sub(cmd::LEVEL, level_sub::RF_POWER);
        assert_eq!(
            sink.writes(),
            vec![vec![0xFE, 0xFE, 0xA4, 0xE0, 0x14, 0x0A, 0xFD]]
        );
    }

    #[test]
    fn test_set_frequency_frame() {
        let (enc, sink) = encoder();
        enc.send_set_frequency(146_820_000);
        assert_eq!(
            sink.writes(),
            vec![vec![
                0xFE, 0xFE, 0xA4, 0xE0, 0x05, 0x00, 0x00, 0x82, 0x46, 0x01, 0xFD
            ]]
        );
    }

    #[test]
    fn test_set_frequency_out_of_range_not_sent() {
        let (enc, sink) = encoder();
        enc.send_set_frequency(10_000_000_000);
        assert!(sink.writes().is_empty());
    }

    #[test]
    fn test_set_repeater_tone_frame() {
        let (enc, sink) = encoder();
        enc.send_set_repeater_tone(1035);
        assert_eq!(
            sink.writes(),
            vec![vec![0xFE, 0xFE, 0xA4, 0xE0, 0x1B, 0x00, 0x10, 0x35, 0xFD]]
        );
    }

    #[test]
    fn test_set_repeater_tone_rejects_wrong_digit_count() {
        let (enc, sink) = encoder();
        for deci_hz in [0, 5, 885, 10_000, 12_345] {
            enc.send_set_repeater_tone(deci_hz);
        }
        assert!(sink.writes().is_empty());
        assert!(matches!(
            enc.encode_set_repeater_tone(885),
            Err(CivError::DigitCount { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn test_tone_enable_frame() {
        let (enc, sink) = encoder();
        enc.send_tone_enable(true);
        enc.send_tone_enable(false);
        assert_eq!(
            sink.writes(),
            vec![
                vec![0xFE, 0xFE, 0xA4, 0xE0, 0x16, 0x42, 0x01, 0xFD],
                vec![0xFE, 0xFE, 0xA4, 0xE0, 0x16, 0x42, 0x00, 0xFD],
            ]
        );
    }

    #[test]
    fn test_freq_offset_starts_at_100hz_digit() {
        let (enc, sink) = encoder();
        enc.send_freq_offset(600_000);
        enc.send_freq_offset(1_700_000);
        enc.send_freq_offset(5_000_000);
        assert_eq!(
            sink.writes(),
            vec![
                vec![0xFE, 0xFE, 0xA4, 0xE0, 0x0D, 0x00, 0x60, 0x00, 0xFD],
                vec![0xFE, 0xFE, 0xA4, 0xE0, 0x0D, 0x00, 0x70, 0x01, 0xFD],
                vec![0xFE, 0xFE, 0xA4, 0xE0, 0x0D, 0x00, 0x00, 0x05, 0xFD],
            ]
        );
    }

    #[test]
    fn test_custom_addresses() {
        let sink = MemoryTransport::new();
        let enc = CommandEncoder::with_addresses(sink.clone(), 0x94, 0xE1);
        enc.send_command(cmd::READ_MODE);
        assert_eq!(sink.writes(), vec![vec![0xFE, 0xFE, 0x94, 0xE1, 0x04, 0xFD]]);
        assert_eq!(enc.transmitter(), 0x94);
        assert_eq!(enc.controller(), 0xE1);
    }

    #[test]
    fn test_frame_shape() {
        let (enc, _) = encoder();
        let frames = vec![
            enc.encode_command(cmd::READ_FREQ),
            enc.encode_command_sub(cmd::TONE, tone_sub::REPEATER_TONE),
            enc.encode_set_frequency(441_075_000).unwrap(),
            enc.encode_set_repeater_tone(1413).unwrap(),
            enc.encode_tone_enable(true),
            enc.encode_freq_offset(5_000_000).unwrap(),
        ];
        for frame in frames {
            let bytes = frame.to_bytes();
            assert_eq!(&bytes[..2], &[PREAMBLE, PREAMBLE]);
            assert_eq!(bytes.last(), Some(&EOM));
            assert_eq!(bytes.len(), FRAME_OVERHEAD + frame.params.len());
        }
        assert_eq!(enc.encode_set_frequency(1).unwrap().params.len(), FREQ_DIGITS / 2);
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let enc = CommandEncoder::new(MemoryTransport::failing());
        enc.send_command(cmd::READ_FREQ);
        enc.send_set_frequency(146_820_000);
    }
}
