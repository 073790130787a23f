//! OBD-II Channel Catalog
//!
//! Defines the polled Mode 01 channels, their request codes and decoding
//! formulas. The catalog is built once at startup and only read afterwards.

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset of the first payload hex pair in a `41 XX AA BB` reply
pub const FIRST_PAYLOAD_OFFSET: usize = 6;
/// Offset of the second payload hex pair
pub const SECOND_PAYLOAD_OFFSET: usize = 9;

/// Channels polled by the logger (Mode 01, current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    /// Short-term fuel trim, bank 1 (0x06)
    ShortTermFuelTrimBank1,
    /// Long-term fuel trim, bank 1 (0x07)
    LongTermFuelTrimBank1,
    /// Short-term fuel trim, bank 2 (0x08)
    ShortTermFuelTrimBank2,
    /// Long-term fuel trim, bank 2 (0x09)
    LongTermFuelTrimBank2,
    /// Vehicle speed (0x0D)
    VehicleSpeed,
    /// Intake air temperature (0x0F)
    IntakeAirTemp,
    /// Run time since engine start (0x1F)
    RunTimeSinceEngineStart,
    /// Distance traveled with MIL on (0x21)
    DistanceWithMilOn,
    /// Warm-ups since codes cleared (0x30)
    WarmUpsSinceCodesCleared,
    /// Distance traveled since codes cleared (0x31)
    DistanceSinceCodesCleared,
    /// Absolute barometric pressure (0x33)
    BarometricPressure,
    /// Absolute load value (0x43)
    AbsoluteLoad,
    /// Time run with MIL on (0x4D)
    TimeRunWithMilOn,
    /// Time since trouble codes cleared (0x4E)
    TimeSinceCodesCleared,
    /// Absolute evap system vapor pressure (0x53)
    EvapVaporPressure,
}

impl ChannelId {
    /// Every channel, in standard cycle order
    pub const ALL: [ChannelId; 15] = [
        ChannelId::ShortTermFuelTrimBank1,
        ChannelId::LongTermFuelTrimBank1,
        ChannelId::ShortTermFuelTrimBank2,
        ChannelId::LongTermFuelTrimBank2,
        ChannelId::VehicleSpeed,
        ChannelId::IntakeAirTemp,
        ChannelId::RunTimeSinceEngineStart,
        ChannelId::DistanceWithMilOn,
        ChannelId::WarmUpsSinceCodesCleared,
        ChannelId::DistanceSinceCodesCleared,
        ChannelId::BarometricPressure,
        ChannelId::AbsoluteLoad,
        ChannelId::TimeRunWithMilOn,
        ChannelId::TimeSinceCodesCleared,
        ChannelId::EvapVaporPressure,
    ];

    /// Get the static definition of this channel
    pub fn spec(&self) -> ChannelSpec {
        use ChannelId::*;

        let fuel_trim = Formula::Linear {
            offset: -128,
            mul: 100,
            div: 128,
            decimals: 2,
        };

        match self {
            ShortTermFuelTrimBank1 => ChannelSpec::new(*self, "0106", 0x06, PayloadWidth::One, fuel_trim, "stfueltrimb1.txt"),
            LongTermFuelTrimBank1 => ChannelSpec::new(*self, "0107", 0x07, PayloadWidth::One, fuel_trim, "ltfueltrimb1.txt"),
            ShortTermFuelTrimBank2 => ChannelSpec::new(*self, "0108", 0x08, PayloadWidth::One, fuel_trim, "stfueltrimb2.txt"),
            LongTermFuelTrimBank2 => ChannelSpec::new(*self, "0109", 0x09, PayloadWidth::One, fuel_trim, "ltfueltrimb2.txt"),
            VehicleSpeed => ChannelSpec::new(*self, "010D", 0x0D, PayloadWidth::One, Formula::Raw, "speed.txt"),
            IntakeAirTemp => ChannelSpec::new(
                *self,
                "010F",
                0x0F,
                PayloadWidth::One,
                Formula::Linear { offset: -40, mul: 1, div: 1, decimals: 0 },
                "intaketemp.txt",
            ),
            RunTimeSinceEngineStart => ChannelSpec::new(*self, "011F", 0x1F, PayloadWidth::Two, Formula::Raw, "runrimeenginestart.txt"),
            DistanceWithMilOn => ChannelSpec::new(*self, "0121", 0x21, PayloadWidth::Two, Formula::Raw, "distancewithmil.txt"),
            WarmUpsSinceCodesCleared => ChannelSpec::new(*self, "0130", 0x30, PayloadWidth::One, Formula::Raw, "warmupssincecleared.txt"),
            DistanceSinceCodesCleared => ChannelSpec::new(*self, "0131", 0x31, PayloadWidth::Two, Formula::Raw, "distancesincecleared.txt"),
            BarometricPressure => ChannelSpec::new(*self, "0133", 0x33, PayloadWidth::One, Formula::Raw, "absbarampressure.txt"),
            AbsoluteLoad => ChannelSpec::new(
                *self,
                "0143",
                0x43,
                PayloadWidth::Two,
                Formula::Linear { offset: 0, mul: 100, div: 255, decimals: 1 },
                "absload.txt",
            ),
            TimeRunWithMilOn => ChannelSpec::new(*self, "014D", 0x4D, PayloadWidth::Two, Formula::Raw, "timerunwithmil.txt"),
            TimeSinceCodesCleared => ChannelSpec::new(*self, "014E", 0x4E, PayloadWidth::Two, Formula::Raw, "timesincecleared.txt"),
            EvapVaporPressure => ChannelSpec::new(
                *self,
                "0153",
                0x53,
                PayloadWidth::Two,
                Formula::Linear { offset: 0, mul: 1, div: 200, decimals: 3 },
                "absevapvaporpressure.txt",
            ),
        }
    }

    /// Get the PID hex value
    pub fn pid(&self) -> u8 {
        self.spec().pid
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.spec().code)
    }
}

/// Number of payload bytes a channel reply carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadWidth {
    One,
    Two,
}

impl PayloadWidth {
    /// Minimum frame length holding the whole payload
    pub fn min_frame_len(&self) -> usize {
        match self {
            PayloadWidth::One => FIRST_PAYLOAD_OFFSET + 2,
            PayloadWidth::Two => SECOND_PAYLOAD_OFFSET + 2,
        }
    }
}

/// Conversion from the raw payload integer to a physical value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formula {
    /// Value is the raw payload
    Raw,
    /// `(raw + offset) * mul / div`, kept to `decimals` fractional digits
    Linear {
        offset: i32,
        mul: i32,
        div: i32,
        decimals: u8,
    },
}

impl Formula {
    /// Apply the formula to a raw payload.
    ///
    /// Scaling runs in integer fixed point with the multiplication done
    /// before the division, so `(A - 128) * 100 / 128` keeps its precision
    /// instead of collapsing to zero.
    pub fn apply(&self, raw: u32) -> Value {
        match *self {
            Formula::Raw => Value::Integer(raw as i64),
            Formula::Linear {
                offset,
                mul,
                div,
                decimals,
            } => {
                let pow = 10i64.pow(decimals as u32);
                let numerator = (raw as i64 + offset as i64) * mul as i64 * pow;
                let scaled = div_round(numerator, div as i64);
                if decimals == 0 {
                    Value::Integer(scaled)
                } else {
                    Value::Fixed(FixedPoint { scaled, decimals })
                }
            }
        }
    }
}

/// Integer division rounding half away from zero
fn div_round(numerator: i64, denominator: i64) -> i64 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator.abs() {
        if (numerator < 0) == (denominator < 0) {
            quotient + 1
        } else {
            quotient - 1
        }
    } else {
        quotient
    }
}

/// Decimal value stored as an integer count of `10^-decimals` units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedPoint {
    pub scaled: i64,
    pub decimals: u8,
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pow = 10u64.pow(self.decimals as u32);
        let magnitude = self.scaled.unsigned_abs();
        let sign = if self.scaled < 0 { "-" } else { "" };
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            magnitude / pow,
            magnitude % pow,
            width = self.decimals as usize
        )
    }
}

/// Decoded physical value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Fixed(FixedPoint),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Fixed(fp) => fp.fmt(f),
        }
    }
}

/// Static definition of one polled channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Channel identity
    pub id: ChannelId,
    /// Request code written to the adapter (e.g. "010D")
    pub code: &'static str,
    /// PID byte echoed in the reply header
    pub pid: u8,
    /// Payload width
    pub width: PayloadWidth,
    /// Decoding formula
    pub formula: Formula,
    /// Log file the readings are appended to
    pub log_name: &'static str,
}

impl ChannelSpec {
    const fn new(
        id: ChannelId,
        code: &'static str,
        pid: u8,
        width: PayloadWidth,
        formula: Formula,
        log_name: &'static str,
    ) -> Self {
        Self {
            id,
            code,
            pid,
            width,
            formula,
            log_name,
        }
    }
}

/// Ordered, immutable set of channels making up one poll cycle
#[derive(Debug, Clone)]
pub struct Catalog {
    channels: Vec<ChannelSpec>,
}

impl Catalog {
    /// Catalog with every supported channel, in standard order
    pub fn standard() -> Self {
        Self {
            channels: ChannelId::ALL.iter().map(ChannelId::spec).collect(),
        }
    }

    /// Build a catalog polling the given channels in the given order
    pub fn from_ids(ids: &[ChannelId]) -> Result<Self, ObdError> {
        if ids.is_empty() {
            return Err(ObdError::InvalidCatalog("no channels configured".to_string()));
        }

        let mut channels: Vec<ChannelSpec> = Vec::with_capacity(ids.len());
        for id in ids {
            if channels.iter().any(|c| c.id == *id) {
                return Err(ObdError::InvalidCatalog(format!("{} listed twice", id)));
            }
            channels.push(id.spec());
        }

        Ok(Self { channels })
    }

    /// Look up a channel definition
    pub fn get(&self, id: ChannelId) -> Option<&ChannelSpec> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Cycle position of a channel
    pub fn position(&self, id: ChannelId) -> Option<usize> {
        self.channels.iter().position(|c| c.id == id)
    }

    /// Number of channels in one cycle
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the catalog is empty (never true for a constructed catalog)
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Iterate channels in cycle order
    pub fn iter(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.channels.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}
