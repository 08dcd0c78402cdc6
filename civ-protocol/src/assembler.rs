use std::fmt::Write;

/// Turns a raw serial chunk into the text line the datagram grammar reads.
///
/// Every byte becomes two uppercase hex digits followed by a space, so
/// `[0xFE, 0xFE, 0xE0]` reads as `"FE FE E0 "`. The line buffer is reused:
/// each call replaces its content rather than appending. Finding datagram
/// boundaries is left to the grammar.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    line: String,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite the line from `bytes` and return it.
    pub fn assemble(&mut self, bytes: &[u8]) -> &str {
        self.line.clear();
        self.line.reserve(bytes.len() * 3);
        for byte in bytes {
            // Writing to a String cannot fail.
            let _ = write!(self.line, "{byte:02X} ");
        }
        &self.line
    }
}
