use crate::error::{CivError, Result};

/// CI-V frame preamble byte.
pub const PREAMBLE: u8 = 0xFE;
/// CI-V frame end-of-message byte.
pub const EOM: u8 = 0xFD;

/// Default CI-V address for the IC-705.
pub const ADDR_IC705: u8 = 0xA4;
/// Default CI-V address for the controller (PC).
pub const ADDR_CONTROLLER: u8 = 0xE0;

/// Bytes in a frame besides its parameters: `FE FE dst src cmd` and `FD`.
pub const FRAME_OVERHEAD: usize = 6;

/// An outbound CI-V frame.
///
/// Frame wire format: `FE FE <dst> <src> <cmd> [<sub_cmd>] [<data>...] FD`
///
/// `params` holds everything between the command byte and the terminator,
/// sub-command included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub dst: u8,
    pub src: u8,
    pub command: u8,
    pub params: Vec<u8>,
}

impl Frame {
    /// Start a frame from `src` to `dst` carrying `command`.
    pub fn new(dst: u8, src: u8, command: u8) -> Self {
        Self {
            dst,
            src,
            command,
            params: Vec::new(),
        }
    }

    /// Append one parameter byte.
    pub fn param(mut self, byte: u8) -> Self {
        self.params.push(byte);
        self
    }

    /// Append several parameter bytes.
    pub fn params(mut self, bytes: &[u8]) -> Self {
        self.params.extend_from_slice(bytes);
        self
    }

    /// Serialize the frame to its wire representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_OVERHEAD + self.params.len());
        bytes.push(PREAMBLE);
        bytes.push(PREAMBLE);
        bytes.push(self.dst);
        bytes.push(self.src);
        bytes.push(self.command);
        bytes.extend_from_slice(&self.params);
        bytes.push(EOM);
        bytes
    }
}

/// Parse a bus address written in hex, with or without a `0x` prefix.
pub fn parse_address(text: &str) -> Result<u8> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u8::from_str_radix(digits, 16).map_err(|_| CivError::InvalidAddress(text.to_string()))
}
