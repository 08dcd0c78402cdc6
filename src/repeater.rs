use std::collections::HashMap;
use std::collections::hash_map::Entry;

use civ_protocol::Frequency;
use log::warn;

/// One repeater channel.
///
/// Frequencies are whole Hz. The input (where the repeater listens and we
/// transmit) is the output shifted by the duplex offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeaterDir {
    pub output_hz: u64,
    pub offset_hz: i64,
    /// Time-out timer of the repeater, in seconds.
    pub timeout_secs: u32,
    pub callsign: String,
    /// CTCSS tone in Hz as text, e.g. `"103.5"`. Empty when there is none.
    pub tone: String,
}

impl RepeaterDir {
    pub fn new(
        output_hz: u64,
        offset_khz: i64,
        timeout_secs: u32,
        callsign: &str,
        tone: &str,
    ) -> Self {
        Self {
            output_hz,
            offset_hz: offset_khz * 1000,
            timeout_secs,
            callsign: callsign.to_string(),
            tone: tone.to_string(),
        }
    }

    pub fn input_hz(&self) -> u64 {
        self.output_hz.saturating_add_signed(self.offset_hz)
    }

    /// Callsign without any `/` suffix, e.g. `k7lwh` for `k7lwh/c`.
    pub fn base_callsign(&self) -> &str {
        base_callsign(&self.callsign)
    }

    /// Tone in tenths of Hz, if the tone text parses.
    pub fn tone_deci_hz(&self) -> Option<u32> {
        let hz: f64 = self.tone.trim().parse().ok()?;
        let deci = (hz * 10.0).round();
        (deci.is_finite() && deci >= 0.0 && deci <= f64::from(u32::MAX)).then_some(deci as u32)
    }

    /// Output frequency as MHz text, e.g. `146.4125`.
    pub fn output_mhz_text(&self) -> String {
        Frequency::from_hz(self.output_hz)
            .map(Frequency::mhz_text)
            .unwrap_or_else(|_| self.output_hz.to_string())
    }
}

pub(crate) fn base_callsign(callsign: &str) -> &str {
    callsign.split('/').next().unwrap_or(callsign)
}

/// Who runs a repeater and where it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeaterInfo {
    pub callsign: String,
    pub location: String,
    pub group: String,
    pub url: String,
    pub grid: String,
}

impl RepeaterInfo {
    pub fn new(callsign: &str, location: &str, group: &str, url: &str) -> Self {
        Self {
            callsign: callsign.to_string(),
            location: location.to_string(),
            group: group.to_string(),
            url: url.to_string(),
            grid: String::new(),
        }
    }
}

/// Read-only table of known repeaters, indexed by input and output frequency.
#[derive(Debug, Clone, Default)]
pub struct RepeaterDirectory {
    repeaters: Vec<RepeaterDir>,
    inputs: HashMap<u64, usize>,
    outputs: HashMap<u64, usize>,
    info: HashMap<String, RepeaterInfo>,
}

impl RepeaterDirectory {
    /// Build a directory. A frequency or callsign seen twice keeps its first entry.
    pub fn new(repeaters: Vec<RepeaterDir>, info: Vec<RepeaterInfo>) -> Self {
        let mut inputs = HashMap::new();
        let mut outputs = HashMap::new();
        for (index, repeater) in repeaters.iter().enumerate() {
            if let Entry::Vacant(slot) = inputs.entry(repeater.input_hz()) {
                slot.insert(index);
            } else {
                warn!("duplicate repeater input {} Hz", repeater.input_hz());
            }
            if let Entry::Vacant(slot) = outputs.entry(repeater.output_hz) {
                slot.insert(index);
            } else {
                warn!("duplicate repeater output {} Hz", repeater.output_hz);
            }
        }

        let mut by_call = HashMap::new();
        for entry in info {
            by_call
                .entry(entry.callsign.to_ascii_lowercase())
                .or_insert(entry);
        }

        Self {
            repeaters,
            inputs,
            outputs,
            info: by_call,
        }
    }

    /// The built-in table of Puget Sound area repeaters.
    pub fn builtin() -> Self {
        let repeaters = vec![
            RepeaterDir::new(53_170_000, -1700, 180, "k7lwh", "100.0"),
            RepeaterDir::new(52_870_000, -1700, 180, "ww7psr", "103.5"),
            RepeaterDir::new(146_960_000, -600, 180, "ww7psr", "103.5"),
            RepeaterDir::new(146_820_000, -600, 120, "k7led", "103.5"),
            RepeaterDir::new(145_490_000, -600, 180, "k7lwh", "103.5"),
            RepeaterDir::new(146_920_000, -600, 120, "wa7dem", "123.0"),
            RepeaterDir::new(147_160_000, 600, 120, "w7mir", "146.2"),
            RepeaterDir::new(147_340_000, 600, 120, "k6rfk", "100.0"),
            RepeaterDir::new(147_080_000, 600, 120, "w7wwi", "110.9"),
            // D-STAR
            RepeaterDir::new(146_412_500, 600, 180, "k7lwh/c", "103.5"),
            RepeaterDir::new(146_620_000, -600, 120, "ww7ra", "103.5"),
            RepeaterDir::new(145_430_000, -600, 120, "kd7wdg", "88.5"),
            RepeaterDir::new(145_330_000, -600, 120, "k7nws", "179.9"),
            RepeaterDir::new(146_900_000, -600, 120, "w7srz", "103.5"),
            RepeaterDir::new(147_240_000, -600, 120, "k7sye", "123"),
            RepeaterDir::new(444_637_500, 5000, 120, "wa7hjr/b", ""),
            RepeaterDir::new(444_650_000, 5000, 120, "wa7hjr/rm", "131.8"),
            RepeaterDir::new(444_550_000, 5000, 120, "ww7sea", "141.3"),
            RepeaterDir::new(441_075_000, 5000, 180, "k7lwh", "103.5"),
            RepeaterDir::new(442_875_000, 5000, 120, "w7aux", "103.5"),
            RepeaterDir::new(149_995_000, -600, 120, "w7rnk/c", ""),
            RepeaterDir::new(147_280_000, 600, 120, "w7dk", "103.5"),
            RepeaterDir::new(147_180_000, 600, 120, "wa7law", "103.5"),
            RepeaterDir::new(445_575_000, 5000, 120, "wa7law", "103.5"),
        ];

        let info = vec![
            RepeaterInfo::new(
                "k7lwh",
                "Kirkland",
                "Lake Washington Ham Club",
                "http://www.lakewashingtonhamclub.org/",
            ),
            RepeaterInfo::new(
                "ww7psr",
                "Seattle",
                "Puget Sound Repeater Group",
                "http://psrg.org/",
            ),
            RepeaterInfo::new(
                "k7led",
                "Tiger Mountain East",
                "Mike & Key ARC",
                "http://www.mikeandkey.org/index.php",
            ),
            RepeaterInfo::new("wa7dem", "Granite Falls", "Snohomish Co. ACS/ARES", ""),
            RepeaterInfo::new("w7mir", "Mercer island", "Mercer Island Radio Operators", ""),
            RepeaterInfo::new("k6rfk", "Woodinville", "", ""),
            RepeaterInfo::new("w7wwi", "Tiger Mtn East", "Sea-Tac Repeater Association", ""),
            RepeaterInfo::new("k7sye", "Auburn", "Auburn Valley Repeater Group", ""),
            RepeaterInfo::new("wa7hjr", "Issaquah", "Tiger Mountain East", "http://wa7hjr.org/"),
            RepeaterInfo::new("w7dk", "Tacoma", "Radio Club of Tacoma", ""),
            RepeaterInfo::new(
                "wa7law",
                "Everett",
                "Snohomish County Hams Club",
                "http://www.wa7law.org/",
            ),
        ];

        Self::new(repeaters, info)
    }

    /// All entries in table order.
    pub fn repeaters(&self) -> &[RepeaterDir] {
        &self.repeaters
    }

    pub fn by_input(&self, hz: u64) -> Option<&RepeaterDir> {
        self.inputs.get(&hz).and_then(|&i| self.repeaters.get(i))
    }

    pub fn by_output(&self, hz: u64) -> Option<&RepeaterDir> {
        self.outputs.get(&hz).and_then(|&i| self.repeaters.get(i))
    }

    /// Info for a callsign, falling back to its base callsign (`wa7hjr/b` → `wa7hjr`).
    pub fn info(&self, callsign: &str) -> Option<&RepeaterInfo> {
        let key = callsign.to_ascii_lowercase();
        self.info
            .get(&key)
            .or_else(|| self.info.get(base_callsign(&key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_from_offset() {
        let r = RepeaterDir::new(146_820_000, -600, 120, "k7led", "103.5");
        assert_eq!(r.offset_hz, -600_000);
        assert_eq!(r.input_hz(), 146_220_000);
        let r = RepeaterDir::new(441_075_000, 5000, 180, "k7lwh", "103.5");
        assert_eq!(r.input_hz(), 446_075_000);
    }

    #[test]
    fn test_duplex_invariant_whole_table() {
        let dir = RepeaterDirectory::builtin();
        assert_eq!(dir.repeaters().len(), 24);
        for r in dir.repeaters() {
            assert_eq!(r.input_hz() as i64 - r.output_hz as i64, r.offset_hz);
            assert_eq!(dir.by_output(r.output_hz), Some(r));
            assert_eq!(dir.by_input(r.input_hz()), Some(r));
        }
    }

    #[test]
    fn test_lookup_miss() {
        let dir = RepeaterDirectory::builtin();
        assert!(dir.by_output(146_520_000).is_none());
        assert!(dir.by_input(146_820_000).is_none());
    }

    #[test]
    fn test_tone_deci_hz() {
        let tone = |t: &str| RepeaterDir::new(1, 0, 0, "x", t).tone_deci_hz();
        assert_eq!(tone("103.5"), Some(1035));
        assert_eq!(tone("146.2"), Some(1462));
        assert_eq!(tone("123"), Some(1230));
        assert_eq!(tone("88.5"), Some(885));
        assert_eq!(tone(""), None);
        assert_eq!(tone("-1"), None);
    }

    #[test]
    fn test_info_lookup() {
        let dir = RepeaterDirectory::builtin();
        assert_eq!(dir.info("k7led").unwrap().location, "Tiger Mountain East");
        assert_eq!(dir.info("K7LED").unwrap().group, "Mike & Key ARC");
        assert_eq!(dir.info("wa7hjr/rm").unwrap().url, "http://wa7hjr.org/");
        assert_eq!(dir.info("k7lwh/c").unwrap().location, "Kirkland");
        assert!(dir.info("kd7wdg").is_none());
    }

    #[test]
    fn test_duplicates_keep_first() {
        let dir = RepeaterDirectory::new(
            vec![
                RepeaterDir::new(146_820_000, -600, 120, "first", ""),
                RepeaterDir::new(146_820_000, -600, 120, "second", ""),
            ],
            vec![
                RepeaterInfo::new("first", "A", "", ""),
                RepeaterInfo::new("FIRST", "B", "", ""),
            ],
        );
        assert_eq!(dir.by_output(146_820_000).unwrap().callsign, "first");
        assert_eq!(dir.by_input(146_220_000).unwrap().callsign, "first");
        assert_eq!(dir.info("first").unwrap().location, "A");
    }

    #[test]
    fn test_output_mhz_text() {
        let dir = RepeaterDirectory::builtin();
        assert_eq!(dir.by_output(146_412_500).unwrap().output_mhz_text(), "146.4125");
        assert_eq!(dir.by_output(53_170_000).unwrap().output_mhz_text(), "53.17");
    }
}
