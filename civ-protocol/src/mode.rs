use std::fmt;

use crate::error::{CivError, Result};

/// Operating mode reported by the radio.
///
/// CI-V sends the mode as one byte; the decoder sees it as a two-digit hex
/// token such as `"05"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    Lsb,
    Usb,
    Am,
    Cw,
    Rtty,
    Fm,
    Wfm,
    CwR,
    RttyR,
    /// D-STAR Digital Voice
    Dv,
}

impl OperatingMode {
    /// Look up a mode from its hex token.
    ///
    /// An unknown code means the radio sent something this table does not
    /// model, so it is an error rather than a fallback.
    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "00" => Ok(Self::Lsb),
            "01" => Ok(Self::Usb),
            "02" => Ok(Self::Am),
            "03" => Ok(Self::Cw),
            "04" => Ok(Self::Rtty),
            "05" => Ok(Self::Fm),
            "06" => Ok(Self::Wfm),
            "07" => Ok(Self::CwR),
            "08" => Ok(Self::RttyR),
            "17" => Ok(Self::Dv),
            other => Err(CivError::UnknownMode(other.to_string())),
        }
    }

    /// Display name used by the logger.
    pub fn name(self) -> &'static str {
        match self {
            Self::Lsb => "LSB",
            Self::Usb => "USB",
            Self::Am => "AM",
            Self::Cw => "CW",
            Self::Rtty => "RTTY",
            Self::Fm => "FM",
            Self::Wfm => "WFM",
            Self::CwR => "CW-R",
            Self::RttyR => "RTTY-R",
            Self::Dv => "DV",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Filter setting that accompanies a mode report, e.g. `FIL01`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter(String);

impl Filter {
    pub fn from_code(code: &str) -> Self {
        Self(format!("FIL{code}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
