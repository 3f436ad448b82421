//! # WeatherLink Live Driver Core Library
//!
//! This library acquires live readings from a Davis WeatherLink Live (WLL)
//! bridge and normalizes them into flat [`Packet`] records for a host
//! weather-data collection engine.
//!
//! ## Data Sources
//!
//! The bridge exposes two feeds carrying overlapping data:
//! - **HTTP**: `GET /v1/current_conditions` returns a full snapshot of every
//!   sensor record (polled at a configurable interval, 10 s minimum)
//! - **UDP**: once armed via `GET /v1/real_time`, the bridge broadcasts
//!   wind/rain telemetry roughly every 2.5 s on port 22222
//!
//! Both feeds report rain as the same monotonically-increasing daily bucket-tip
//! counter, so they must be reconciled through one shared
//! [`rain::RainAccumulator`] to avoid double-counting a tip that both feeds
//! happen to report in the same short window.
//!
//! ## Pipeline
//!
//! ```text
//! HTTP snapshot ──┐
//!                 ├──> classify roles ──> assemble packet ──> yield
//! UDP datagram ───┘          │                  │
//!                            └── shared RainAccumulator ──┘
//! ```
//!
//! The acquisition loop in [`station`] drives both paths from a single thread
//! and exposes the result as a lazy, infinite iterator of packets.

use serde::Serialize;

pub mod bridge;
pub mod config;
pub mod conditions;
pub mod decoder;
pub mod rain;
pub mod station;

/// Unit-system tag for packets in US customary units (°F, mph, inches).
///
/// The bridge reports everything in US units and the driver passes values
/// through unconverted, so every packet carries this tag.
pub const UNIT_SYSTEM_US: u8 = 1;

/// One normalized observation handed to the host engine.
///
/// Every sensor field is optional: `None` means "no data this cycle", which is
/// deliberately distinct from zero. A UDP-derived packet typically populates
/// only the wind and rain fields; an HTTP-derived packet populates whatever
/// sensor records the snapshot carried. Absent fields are skipped entirely
/// when the packet is serialized, matching the sparse-record convention of the
/// host engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Packet {
    /// Observation time, epoch seconds as reported by the bridge.
    #[serde(rename = "dateTime")]
    pub date_time: i64,
    /// Unit system tag; always [`UNIT_SYSTEM_US`].
    #[serde(rename = "usUnits")]
    pub us_units: u8,

    // Wind (either feed).
    #[serde(rename = "windSpeed", skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(rename = "windDir", skip_serializing_if = "Option::is_none")]
    pub wind_dir: Option<f64>,
    /// Maximum wind speed over the last 2 minutes (mph).
    #[serde(rename = "windGust", skip_serializing_if = "Option::is_none")]
    pub wind_gust: Option<f64>,
    #[serde(rename = "windGustDir", skip_serializing_if = "Option::is_none")]
    pub wind_gust_dir: Option<f64>,
    #[serde(rename = "windSpeedAvg10", skip_serializing_if = "Option::is_none")]
    pub wind_speed_avg_10_min: Option<f64>,
    #[serde(rename = "windDirAvg10", skip_serializing_if = "Option::is_none")]
    pub wind_dir_avg_10_min: Option<f64>,

    // Outdoor temperature/humidity suite (HTTP snapshots only).
    #[serde(rename = "outTemp", skip_serializing_if = "Option::is_none")]
    pub out_temp: Option<f64>,
    #[serde(rename = "outHumidity", skip_serializing_if = "Option::is_none")]
    pub out_humidity: Option<f64>,
    #[serde(rename = "dewpoint", skip_serializing_if = "Option::is_none")]
    pub dewpoint: Option<f64>,
    #[serde(rename = "heatindex", skip_serializing_if = "Option::is_none")]
    pub heat_index: Option<f64>,
    #[serde(rename = "windchill", skip_serializing_if = "Option::is_none")]
    pub wind_chill: Option<f64>,
    #[serde(rename = "thsw", skip_serializing_if = "Option::is_none")]
    pub thsw_index: Option<f64>,
    #[serde(rename = "wetBulb", skip_serializing_if = "Option::is_none")]
    pub wet_bulb: Option<f64>,

    // Rain, in inches (bucket tips scaled by the calibrated bucket size).
    #[serde(rename = "rain", skip_serializing_if = "Option::is_none")]
    pub rain: Option<f64>,
    #[serde(rename = "rainRate", skip_serializing_if = "Option::is_none")]
    pub rain_rate: Option<f64>,

    // Solar / UV.
    #[serde(rename = "radiation", skip_serializing_if = "Option::is_none")]
    pub radiation: Option<f64>,
    #[serde(rename = "UV", skip_serializing_if = "Option::is_none")]
    pub uv_index: Option<f64>,

    // Transmitter health.
    #[serde(rename = "txBatteryStatus", skip_serializing_if = "Option::is_none")]
    pub tx_battery_status: Option<i64>,
    #[serde(rename = "signal1", skip_serializing_if = "Option::is_none")]
    pub rx_state: Option<i64>,

    // Barometer record.
    #[serde(rename = "barometer", skip_serializing_if = "Option::is_none")]
    pub barometer: Option<f64>,
    #[serde(rename = "pressure", skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,

    // Indoor temp/hum record.
    #[serde(rename = "inTemp", skip_serializing_if = "Option::is_none")]
    pub in_temp: Option<f64>,
    #[serde(rename = "inHumidity", skip_serializing_if = "Option::is_none")]
    pub in_humidity: Option<f64>,
    #[serde(rename = "inDewpoint", skip_serializing_if = "Option::is_none")]
    pub in_dewpoint: Option<f64>,

    // Auxiliary transmitter (configured separately from the primary ISS).
    #[serde(rename = "extraTemp1", skip_serializing_if = "Option::is_none")]
    pub extra_temp: Option<f64>,
    #[serde(rename = "extraHumid1", skip_serializing_if = "Option::is_none")]
    pub extra_humidity: Option<f64>,

    // Air quality (separate AirLink bridge, merged by poll cycle).
    #[serde(rename = "pm1_0", skip_serializing_if = "Option::is_none")]
    pub pm1: Option<f64>,
    #[serde(rename = "pm2_5", skip_serializing_if = "Option::is_none")]
    pub pm2p5: Option<f64>,
    #[serde(rename = "pm10", skip_serializing_if = "Option::is_none")]
    pub pm10: Option<f64>,
}

impl Packet {
    /// Empty packet for a given observation instant.
    pub fn at(date_time: i64) -> Self {
        Packet {
            date_time,
            us_units: UNIT_SYSTEM_US,
            ..Packet::default()
        }
    }
}
