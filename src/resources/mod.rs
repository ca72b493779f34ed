//! Host resource sampling and the pipe-delimited resource log line.

pub mod reporter;
pub mod sampler;

pub use reporter::ResourceLogger;
pub use sampler::{MetricsSource, ResourceSampler, SysinfoSource};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimal places beyond which conversion stops being meaningful for an f64
pub const MAX_ROUND: u32 = 15;

/// Byte unit a snapshot is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Unit {
    B,
    KB,
    #[default]
    MB,
    GB,
}

impl Unit {
    pub const fn divisor(&self) -> u64 {
        match self {
            Unit::B => 1,
            Unit::KB => 1 << 10,
            Unit::MB => 1 << 20,
            Unit::GB => 1 << 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::B => "B",
            Unit::KB => "KB",
            Unit::MB => "MB",
            Unit::GB => "GB",
        }
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "B" => Ok(Unit::B),
            "KB" => Ok(Unit::KB),
            "MB" => Ok(Unit::MB),
            "GB" => Ok(Unit::GB),
            _ => Err(Error::InvalidUnit(s.to_string())),
        }
    }
}

impl TryFrom<String> for Unit {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(value: Unit) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How converted figures are cut down to `round` decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rounding {
    /// Floor at `round + 1` digits. Matches the figures already present in
    /// historical resource logs.
    #[default]
    Truncate,
    /// Round half away from zero at `round` digits.
    Nearest,
}

/// Unit, precision and rounding policy for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleOptions {
    pub unit: Unit,
    pub round: u32,
    pub rounding: Rounding,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            unit: Unit::MB,
            round: 2,
            rounding: Rounding::Truncate,
        }
    }
}

impl SampleOptions {
    pub fn new(unit: Unit, round: u32) -> Self {
        Self {
            unit,
            round,
            ..Self::default()
        }
    }

    pub fn rounding(mut self, rounding: Rounding) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn convert(&self, raw: u64) -> f64 {
        convert(raw, self.unit, self.round, self.rounding)
    }
}

/// Converts a byte count into `unit` using integer arithmetic only, then a
/// single float division to place the decimal point.
pub fn convert(raw: u64, unit: Unit, round: u32, rounding: Rounding) -> f64 {
    let round = round.min(MAX_ROUND);
    let divisor = u128::from(unit.divisor());
    let raw = u128::from(raw);

    let (scaled, scale) = match rounding {
        Rounding::Truncate => {
            let scale = 10u128.pow(round + 1);
            (raw * scale / divisor, scale)
        }
        Rounding::Nearest => {
            let scale = 10u128.pow(round);
            ((raw * scale * 2 + divisor) / (divisor * 2), scale)
        }
    };

    scaled as f64 / scale as f64
}

/// Counters exactly as the OS reports them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawCounters {
    pub cpu_percent: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    pub disk_used: u64,
    pub disk_total: u64,
    pub network_sent: u64,
    pub network_received: u64,
}

/// One point-in-time reading of host resources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_usage_percent: f64,
    pub memory_used: f64,
    pub memory_total: f64,
    pub disk_used: f64,
    pub disk_total: f64,
    pub network_sent: f64,
    pub network_received: f64,
}

impl ResourceSnapshot {
    pub fn from_raw(raw: &RawCounters, options: &SampleOptions) -> Self {
        Self {
            // One decimal, as CPU load is conventionally reported
            cpu_usage_percent: (f64::from(raw.cpu_percent) * 10.0).round() / 10.0,
            memory_used: options.convert(raw.memory_used),
            memory_total: options.convert(raw.memory_total),
            disk_used: options.convert(raw.disk_used),
            disk_total: options.convert(raw.disk_total),
            network_sent: options.convert(raw.network_sent),
            network_received: options.convert(raw.network_received),
        }
    }

    /// cpu, memory used/total, disk used/total, network sent/received
    pub fn fields(&self) -> [f64; 7] {
        [
            self.cpu_usage_percent,
            self.memory_used,
            self.memory_total,
            self.disk_used,
            self.disk_total,
            self.network_sent,
            self.network_received,
        ]
    }

    pub fn to_log_line(&self) -> String {
        self.fields()
            .iter()
            .map(|v| format_number(*v))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for ResourceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_log_line())
    }
}

/// Shortest round-trip decimal, always with a fractional part.
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unit_divisors() {
        assert_eq!(Unit::B.divisor(), 1);
        assert_eq!(Unit::KB.divisor(), 1024);
        assert_eq!(Unit::MB.divisor(), 1024 * 1024);
        assert_eq!(Unit::GB.divisor(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("mb".parse::<Unit>().unwrap(), Unit::MB);
        assert_eq!(" GB ".parse::<Unit>().unwrap(), Unit::GB);
        assert!(matches!("TB".parse::<Unit>(), Err(Error::InvalidUnit(_))));
        assert_eq!(Unit::KB.to_string(), "KB");
    }

    #[test]
    fn test_one_mebibyte() {
        assert_eq!(convert(1_048_576, Unit::MB, 2, Rounding::Truncate), 1.0);
        assert_eq!(convert(1_048_576, Unit::MB, 2, Rounding::Nearest), 1.0);
    }

    #[test]
    fn test_truncate_keeps_an_extra_digit() {
        // 1.999 MB: floor at three digits, not two
        let raw = 1_048_576 * 1999 / 1000;
        assert_eq!(convert(raw, Unit::MB, 2, Rounding::Truncate), 1.998);
        assert_eq!(convert(raw, Unit::MB, 2, Rounding::Nearest), 2.0);

        assert_eq!(convert(1536, Unit::KB, 0, Rounding::Truncate), 1.5);
        assert_eq!(convert(1536, Unit::KB, 0, Rounding::Nearest), 2.0);
        assert_eq!(convert(1535, Unit::KB, 0, Rounding::Nearest), 1.0);
    }

    #[test]
    fn test_bytes_are_exact() {
        assert_eq!(convert(123_456, Unit::B, 2, Rounding::Truncate), 123_456.0);
        assert_eq!(convert(0, Unit::GB, 2, Rounding::Truncate), 0.0);
    }

    #[test]
    fn test_round_is_clamped() {
        let value = convert(u64::MAX, Unit::B, 40, Rounding::Nearest);
        assert!(value.is_finite());
    }

    #[test]
    fn test_log_line_layout() {
        let snapshot = ResourceSnapshot {
            cpu_usage_percent: 12.5,
            memory_used: 1.0,
            memory_total: 15_890.12,
            disk_used: 0.0,
            disk_total: 476_802.5,
            network_sent: 3.25,
            network_received: 100.0,
        };
        assert_eq!(
            snapshot.to_log_line(),
            "12.5 | 1.0 | 15890.12 | 0.0 | 476802.5 | 3.25 | 100.0"
        );
    }

    #[test]
    fn test_cpu_keeps_one_decimal() {
        let raw = RawCounters {
            cpu_percent: 12.34,
            ..RawCounters::default()
        };
        let snapshot = ResourceSnapshot::from_raw(&raw, &SampleOptions::default());
        assert_eq!(snapshot.cpu_usage_percent, 12.3);
    }

    #[test]
    fn test_nearest_on_large_values() {
        // ~5.0e11 KB; f64 has no room left for a fourth decimal here
        let raw = 513_155_655_684_388u64;
        let exact = raw as f64 / 1024.0;
        let value = convert(raw, Unit::KB, 4, Rounding::Nearest);
        assert!((value - exact).abs() <= 0.5e-4 + exact * 4.0 * f64::EPSILON);
    }

    proptest! {
        #[test]
        fn truncation_never_exceeds_exact_value(raw in any::<u64>(), round in 0u32..6) {
            for unit in [Unit::B, Unit::KB, Unit::MB, Unit::GB] {
                let exact = raw as f64 / unit.divisor() as f64;
                let value = convert(raw, unit, round, Rounding::Truncate);
                let step = 10f64.powi(-(round as i32 + 1));
                prop_assert!(value <= exact * (1.0 + 1e-12));
                prop_assert!(exact - value < step + exact * 1e-12);
            }
        }

        #[test]
        fn nearest_is_within_half_a_step(raw in 0u64..(1u64 << 50), round in 0u32..6) {
            for unit in [Unit::KB, Unit::MB, Unit::GB] {
                let exact = raw as f64 / unit.divisor() as f64;
                let value = convert(raw, unit, round, Rounding::Nearest);
                let half = 0.5 * 10f64.powi(-(round as i32));
                // Past ~2^53 / 10^round an f64 cannot hold the last decimal
                let float_slack = exact * 4.0 * f64::EPSILON;
                prop_assert!((value - exact).abs() <= half * (1.0 + 1e-9) + float_slack);
            }
        }

        #[test]
        fn conversion_is_monotonic(a in any::<u64>(), b in any::<u64>()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            for unit in [Unit::B, Unit::KB, Unit::MB, Unit::GB] {
                prop_assert!(
                    convert(lo, unit, 2, Rounding::Truncate) <= convert(hi, unit, 2, Rounding::Truncate)
                );
            }
        }

        #[test]
        fn log_line_fields_parse(fields in proptest::array::uniform7(0.0f64..1e12)) {
            let snapshot = ResourceSnapshot {
                cpu_usage_percent: fields[0],
                memory_used: fields[1],
                memory_total: fields[2],
                disk_used: fields[3],
                disk_total: fields[4],
                network_sent: fields[5],
                network_received: fields[6],
            };
            let line = snapshot.to_log_line();
            let parsed: Vec<f64> = line.split(" | ").map(|f| f.parse().unwrap()).collect();
            prop_assert_eq!(parsed, fields.to_vec());
        }
    }
}
