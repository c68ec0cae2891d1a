use regex::{Captures, Regex};

use domain::{ScaleProtocol, WeightReading, WeightUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    /// `ST,GS,+00001.234kg`: stability pair, gross/net pair, signed value, unit
    StatusPair,
    /// `W +1.250 kg`
    WeighPrefix,
    /// `+00000500g`, `-12.45 kg`
    SignedWithUnit,
    /// `001.250`: no marker, no unit
    NumericOnly,
}

impl Rule {
    fn for_protocol(protocol: ScaleProtocol) -> &'static [Rule] {
        match protocol {
            ScaleProtocol::Toledo | ScaleProtocol::Urano => {
                &[Rule::StatusPair, Rule::SignedWithUnit, Rule::NumericOnly]
            }
            ScaleProtocol::Filizola => &[Rule::SignedWithUnit, Rule::WeighPrefix, Rule::NumericOnly],
            ScaleProtocol::Generic => &[
                Rule::StatusPair,
                Rule::WeighPrefix,
                Rule::SignedWithUnit,
                Rule::NumericOnly,
            ],
        }
    }
}

/// Parses raw scale telemetry into weight readings.
///
/// Each protocol tries an ordered list of patterns; the first match wins.
/// Anything unrecognized yields `None`, never an error: partial frames are
/// normal on a live serial stream.
#[derive(Debug)]
pub struct ScaleDecoder {
    status_pair: Regex,
    weigh_prefix: Regex,
    signed_with_unit: Regex,
    numeric_only: Regex,
}

impl ScaleDecoder {
    pub fn new() -> Self {
        Self {
            status_pair: Regex::new(
                r"(?i)^(ST|US|UT)\s*,?\s*(?:(?:GS|NS|NT|GW)\s*,?\s*)?([+-]?)\s*(\d+(?:[.,]\d+)?)\s*(kg|g|lb)$",
            )
            .expect("Invalid regex"),
            weigh_prefix: Regex::new(r"(?i)^W\s*([+-]?)\s*(\d+(?:[.,]\d+)?)\s*(kg|g|lb)$")
                .expect("Invalid regex"),
            signed_with_unit: Regex::new(r"(?i)^([+-]?)\s*(\d+(?:[.,]\d+)?)\s*(kg|g|lb)$")
                .expect("Invalid regex"),
            numeric_only: Regex::new(r"^([+-]?)\s*(\d+(?:[.,]\d+)?)$").expect("Invalid regex"),
        }
    }

    /// Decode a raw chunk. The newest decodable frame in the chunk wins.
    pub fn decode(&self, raw: &[u8], protocol: ScaleProtocol) -> Option<WeightReading> {
        let text = String::from_utf8_lossy(raw);
        self.decode_str(&text, protocol)
    }

    pub fn decode_str(&self, text: &str, protocol: ScaleProtocol) -> Option<WeightReading> {
        frames(text)
            .rev()
            .find_map(|frame| self.decode_frame(frame, protocol))
    }

    fn decode_frame(&self, frame: &str, protocol: ScaleProtocol) -> Option<WeightReading> {
        let frame = frame.replace('\u{00A0}', " ");
        let frame = frame.trim();
        Rule::for_protocol(protocol)
            .iter()
            .find_map(|rule| self.apply(*rule, frame))
    }

    fn apply(&self, rule: Rule, frame: &str) -> Option<WeightReading> {
        match rule {
            Rule::StatusPair => {
                let caps = self.status_pair.captures(frame)?;
                let stable = caps[1].eq_ignore_ascii_case("ST");
                reading(&caps, 2, Some(4), stable)
            }
            Rule::WeighPrefix => {
                let caps = self.weigh_prefix.captures(frame)?;
                reading(&caps, 1, Some(3), true)
            }
            Rule::SignedWithUnit => {
                let caps = self.signed_with_unit.captures(frame)?;
                reading(&caps, 1, Some(3), true)
            }
            Rule::NumericOnly => {
                let caps = self.numeric_only.captures(frame)?;
                reading(&caps, 1, None, true)
            }
        }
    }
}

impl Default for ScaleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames are separated by CR/LF and other control bytes (STX, ETX, ...).
fn frames(text: &str) -> impl DoubleEndedIterator<Item = &str> {
    text.split(|c: char| c.is_control() || c == char::REPLACEMENT_CHARACTER)
        .map(str::trim)
        .filter(|f| !f.is_empty())
}

/// Build a reading from sign/number/unit groups. The number follows the sign group.
fn reading(caps: &Captures<'_>, sign_group: usize, unit_group: Option<usize>, stable: bool) -> Option<WeightReading> {
    let negative = caps.get(sign_group).is_some_and(|m| m.as_str() == "-");
    let number = caps.get(sign_group + 1)?.as_str().replace(',', ".");
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    // Below-zero samples (under tare) are not weighings
    if negative && value > 0.0 {
        return None;
    }

    let unit = match unit_group {
        Some(group) => caps.get(group)?.as_str().parse::<WeightUnit>().ok()?,
        None => WeightUnit::Kg,
    };
    Some(WeightReading::new(value, unit, stable))
}
