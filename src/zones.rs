use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const ZONE_COUNT: usize = 5;
pub const MAX_HEART_RATE_LIMIT: i64 = 220;
pub const DEFAULT_MAX_HEART_RATE: i64 = 200;

/// Fixed training-intensity labels, zone 1 first.
pub const ZONE_LABELS: [&str; ZONE_COUNT] = [
    "Recovery",
    "Aerobic Endurance",
    "Tempo",
    "Threshold",
    "VO2 Max",
];

const DEFAULT_BOUNDS: [(f64, f64); ZONE_COUNT] = [
    (50.0, 59.0),
    (60.0, 69.0),
    (70.0, 79.0),
    (80.0, 89.0),
    (90.0, 100.0),
];

/// One percentage-of-max-HR band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    pub min: f64,
    pub max: f64,
}

/// Which end of a zone an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneIndexError(pub usize);

impl std::fmt::Display for ZoneIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "zone index {} is outside 1..={ZONE_COUNT}", self.0)
    }
}

impl std::error::Error for ZoneIndexError {}

/// The five zones, addressed 1..=5 from the outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneSet([Zone; ZONE_COUNT]);

impl ZoneSet {
    pub fn from_bounds(bounds: [(f64, f64); ZONE_COUNT]) -> Self {
        Self(bounds.map(|(min, max)| Zone { min, max }))
    }

    pub fn get(&self, index: usize) -> Option<&Zone> {
        index.checked_sub(1).and_then(|i| self.0.get(i))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Zone> {
        index.checked_sub(1).and_then(move |i| self.0.get_mut(i))
    }

    /// Iterate as `(index, label, zone)` with 1-based indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'static str, &Zone)> {
        self.0
            .iter()
            .enumerate()
            .map(|(i, z)| (i + 1, ZONE_LABELS[i], z))
    }

    pub fn label(index: usize) -> Option<&'static str> {
        index.checked_sub(1).and_then(|i| ZONE_LABELS.get(i).copied())
    }
}

impl Default for ZoneSet {
    fn default() -> Self {
        Self::from_bounds(DEFAULT_BOUNDS)
    }
}

#[derive(Serialize, Deserialize)]
struct ZoneRecord {
    min: f64,
    max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Serialize for ZoneSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ZONE_COUNT))?;
        for (index, label, zone) in self.iter() {
            map.serialize_entry(
                &index.to_string(),
                &ZoneRecord {
                    min: zone.min,
                    max: zone.max,
                    name: Some(label.to_string()),
                },
            )?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ZoneSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = BTreeMap::<usize, ZoneRecord>::deserialize(deserializer)?;
        let keys: Vec<usize> = records.keys().copied().collect();
        if keys != (1..=ZONE_COUNT).collect::<Vec<_>>() {
            return Err(de::Error::custom(format!(
                "expected zones 1..={ZONE_COUNT}, found {keys:?}"
            )));
        }
        let mut zones = ZoneSet::default();
        for (index, record) in records {
            if let Some(zone) = zones.get_mut(index) {
                zone.min = record.min;
                zone.max = record.max;
            }
        }
        Ok(zones)
    }
}

/// Maximum heart rate as held by the editor.
///
/// The editor keeps a blank field blank instead of snapping it to a number, and
/// non-numeric text is kept as [`MaxHeartRate::Unparsed`] until the user fixes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxHeartRate {
    Bpm(i64),
    Blank,
    Unparsed,
}

impl MaxHeartRate {
    /// Interpret raw field text: blank stays blank, everything else goes through
    /// `parse_int_prefix` and is capped at 220 bpm. There is no lower cap.
    pub fn from_input(raw: &str) -> Self {
        if raw.is_empty() {
            return MaxHeartRate::Blank;
        }
        match parse_int_prefix(raw) {
            Some(v) if v > MAX_HEART_RATE_LIMIT => MaxHeartRate::Bpm(MAX_HEART_RATE_LIMIT),
            Some(v) => MaxHeartRate::Bpm(v),
            None => MaxHeartRate::Unparsed,
        }
    }

    pub fn bpm(self) -> Option<i64> {
        match self {
            MaxHeartRate::Bpm(v) => Some(v),
            _ => None,
        }
    }

    /// Text to show in the input field.
    pub fn to_input(self) -> String {
        match self {
            MaxHeartRate::Bpm(v) => v.to_string(),
            MaxHeartRate::Blank | MaxHeartRate::Unparsed => String::new(),
        }
    }
}

impl Default for MaxHeartRate {
    fn default() -> Self {
        MaxHeartRate::Bpm(DEFAULT_MAX_HEART_RATE)
    }
}

impl Serialize for MaxHeartRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxHeartRate::Bpm(v) => serializer.serialize_i64(*v),
            MaxHeartRate::Blank => serializer.serialize_str(""),
            MaxHeartRate::Unparsed => serializer.serialize_none(),
        }
    }
}

/// Settings for max heart rate and the zone partition.
///
/// Serialized in the shape shared by the local cache and the settings endpoint:
/// `{"maxHR": 200, "zones": {"1": {"min": 50, "max": 59, "name": "Recovery"}, ...}}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Configuration {
    #[serde(rename = "maxHR")]
    pub max_heart_rate: MaxHeartRate,
    pub zones: ZoneSet,
}

impl Configuration {
    /// Decode a cached entry, falling back field by field to the defaults.
    ///
    /// A missing, zero, blank or non-numeric `maxHR` becomes 200 bpm and a missing or
    /// malformed `zones` map becomes the default table. Only text that is not JSON at
    /// all is an error.
    pub fn from_cache_json(data: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(data)?;
        let max_heart_rate = value
            .get("maxHR")
            .and_then(|v| match v {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                Value::String(s) => parse_int_prefix(s),
                _ => None,
            })
            .filter(|v| *v != 0)
            .map(MaxHeartRate::Bpm)
            .unwrap_or_default();
        let zones = match value.get("zones") {
            Some(z) => ZoneSet::deserialize(z).unwrap_or_else(|e| {
                log::warn!("Ignoring cached zones: {e}");
                ZoneSet::default()
            }),
            None => ZoneSet::default(),
        };
        Ok(Self {
            max_heart_rate,
            zones,
        })
    }
}

/// Leading-integer parse: optional whitespace, optional sign, then digits.
/// Trailing garbage is ignored and `None` means no digits were found.
pub fn parse_int_prefix(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits: &str = &rest[..rest.bytes().take_while(u8::is_ascii_digit).count()];
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits.bytes().fold(0i64, |acc, d| {
        acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
    });
    Some(if negative { -magnitude } else { magnitude })
}

/// Leading-float parse: the longest prefix that reads as a decimal number,
/// with optional exponent, or `Infinity`. `None` stands for NaN.
pub fn parse_float_prefix(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        let inf = f64::INFINITY;
        return Some(if s.starts_with('-') { -inf } else { inf });
    }
    let int_digits = bytes[end..].iter().take_while(|b| b.is_ascii_digit()).count();
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = bytes[end + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = bytes[exp_end..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }
    s[..end].parse::<f64>().ok()
}

/// Value stored for an edited zone bound: NaN becomes 0 and negatives are raised to 0.
pub fn coerce_zone_bound(raw: &str) -> f64 {
    parse_float_prefix(raw).unwrap_or(0.0).max(0.0)
}

/// Format a bound the way a number input shows it (`59` rather than `59.0`).
pub fn format_bound(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
