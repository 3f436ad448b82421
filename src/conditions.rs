//! # Bridge Wire Model and Condition Classifier
//!
//! JSON shapes the WeatherLink Live bridge emits, and the rule that sorts an
//! observation's heterogeneous sensor records into named roles.
//!
//! ## Payloads
//!
//! HTTP `GET /v1/current_conditions` wraps an observation in an envelope:
//!
//! ```json
//! { "data": { "did": "...", "ts": 1531754005, "conditions": [ ... ] },
//!   "error": null }
//! ```
//!
//! UDP datagrams carry the observation at the top level, or
//! `{"conditions": null, "error": "..."}` when the bridge itself failed.
//!
//! Every sensor field inside a condition record may be absent or `null`;
//! both deserialize to `None`, and downstream code treats them identically as
//! "no data".

use serde::Deserialize;

/// Bridge-defined `data_structure_type` tags.
pub mod structure_type {
    /// Primary sensor suite (outdoor wind/temp/hum/rain/UV/solar).
    pub const ISS: u8 = 1;
    /// Leaf/soil moisture station.
    pub const LEAF_SOIL: u8 = 2;
    /// Barometer inside the bridge unit.
    pub const BAROMETER: u8 = 3;
    /// Indoor temperature/humidity sensor inside the bridge unit.
    pub const INDOOR: u8 = 4;
    /// AirLink particulate sensor.
    pub const AIR_QUALITY: u8 = 6;
}

/// Envelope around HTTP responses. A populated `error` means the device
/// reported a failure and `data` must not be used even if present.
#[derive(Debug, Deserialize)]
pub struct HttpEnvelope {
    pub data: Option<Observation>,
    pub error: Option<serde_json::Value>,
}

/// One observation from either feed.
#[derive(Clone, Debug, Deserialize)]
pub struct Observation {
    /// Observation time, epoch seconds.
    pub ts: i64,
    pub conditions: Vec<ConditionRecord>,
}

/// Raw UDP datagram body. `conditions` is `null` on a device-side error.
#[derive(Debug, Deserialize)]
pub struct Datagram {
    pub ts: Option<i64>,
    pub conditions: Option<Vec<ConditionRecord>>,
    pub error: Option<String>,
}

impl Datagram {
    /// Promote the datagram to an [`Observation`], or surface the bridge's
    /// error text when the payload carried none.
    pub fn into_observation(self) -> Result<Observation, Option<String>> {
        match (self.ts, self.conditions) {
            (Some(ts), Some(conditions)) => Ok(Observation { ts, conditions }),
            _ => Err(self.error),
        }
    }
}

/// One sensor record inside an observation.
///
/// The schema depends on `data_structure_type`; every sensor field is optional
/// so a single sparse struct covers all record types. Unknown fields from
/// firmware newer than this driver are ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ConditionRecord {
    pub data_structure_type: u8,
    /// Transmitter id; present for radio record types (ISS, leaf/soil,
    /// air-quality), absent for the bridge's own barometer/indoor records.
    pub txid: Option<u8>,

    // ISS: temperature suite (full HTTP records only).
    pub temp: Option<f64>,
    pub hum: Option<f64>,
    pub dew_point: Option<f64>,
    pub wet_bulb: Option<f64>,
    pub heat_index: Option<f64>,
    pub wind_chill: Option<f64>,
    pub thsw_index: Option<f64>,

    // ISS: wind (both feeds).
    pub wind_speed_last: Option<f64>,
    pub wind_dir_last: Option<f64>,
    pub wind_speed_hi_last_2_min: Option<f64>,
    pub wind_dir_at_hi_speed_last_2_min: Option<f64>,
    pub wind_speed_avg_last_10_min: Option<f64>,
    pub wind_dir_scalar_avg_last_10_min: Option<f64>,

    // ISS: rain.
    /// Rain collector type code (1..=4); see [`crate::rain::BucketSize`].
    pub rain_size: Option<u8>,
    /// Most recent rain rate, counts/hour.
    pub rain_rate_last: Option<f64>,
    /// Total tips since local midnight.
    pub rainfall_daily: Option<i64>,

    // ISS: solar / UV / health.
    pub solar_rad: Option<f64>,
    pub uv_index: Option<f64>,
    pub rx_state: Option<i64>,
    pub trans_battery_flag: Option<i64>,

    // Barometer record.
    pub bar_sea_level: Option<f64>,
    pub bar_absolute: Option<f64>,

    // Indoor temp/hum record.
    pub temp_in: Option<f64>,
    pub hum_in: Option<f64>,
    pub dew_point_in: Option<f64>,

    // AirLink particulates, µg/m³.
    pub pm_1: Option<f64>,
    pub pm_2p5: Option<f64>,
    pub pm_10: Option<f64>,
}

/// An observation's records sorted into named roles.
///
/// A role with no matching record is simply absent; when several records match
/// the same role the last one wins (the bridge is not expected to duplicate
/// records within one message).
#[derive(Debug, Default)]
pub struct Roles<'a> {
    /// Full ISS record: configured transmitter, carries a temperature. This is
    /// the HTTP-snapshot shape.
    pub primary: Option<&'a ConditionRecord>,
    /// Wind/rain-only ISS record: same transmitter but *no* temperature. This
    /// is how UDP broadcasts arrive, tagged with the same structure type and
    /// txid as full records; temperature presence is the load-bearing rule
    /// that tells the two shapes apart.
    pub primary_wind_only: Option<&'a ConditionRecord>,
    pub barometer: Option<&'a ConditionRecord>,
    pub indoor: Option<&'a ConditionRecord>,
    /// Record from the configured auxiliary transmitter, if any.
    pub auxiliary: Option<&'a ConditionRecord>,
    pub air_quality: Option<&'a ConditionRecord>,
}

/// Partition `records` by structure type and transmitter id.
pub fn classify<'a>(
    records: &'a [ConditionRecord],
    primary_txid: u8,
    auxiliary_txid: Option<u8>,
) -> Roles<'a> {
    let mut roles = Roles::default();
    for record in records {
        match record.data_structure_type {
            structure_type::ISS if record.txid == Some(primary_txid) => {
                if record.temp.is_some() {
                    roles.primary = Some(record);
                } else {
                    roles.primary_wind_only = Some(record);
                }
            }
            structure_type::BAROMETER => roles.barometer = Some(record),
            structure_type::INDOOR => roles.indoor = Some(record),
            structure_type::AIR_QUALITY => roles.air_quality = Some(record),
            _ => {}
        }
        if auxiliary_txid.is_some() && record.txid == auxiliary_txid && record.txid != Some(primary_txid) {
            roles.auxiliary = Some(record);
        }
    }
    roles
}
