//! # Packet Assembly
//!
//! Combines classified condition records and the shared rain accumulator into
//! one flat [`Packet`]. Field-level rules:
//!
//! - A missing role contributes nothing; a missing field inside a present role
//!   is omitted. Neither is an error.
//! - Wind comes from whichever primary shape is present; when an observation
//!   somehow carries both, the full record's values overwrite the wind-only
//!   record's (it carries strictly more context).
//! - Every primary record's daily rain counter is folded through the one
//!   shared [`RainAccumulator`], which is what keeps the HTTP and UDP feeds
//!   from double-counting the same bucket tips. The packet's `rain` field is
//!   the per-observation delta, not the running daily total.

use chrono::NaiveDate;

use crate::conditions::{ConditionRecord, Roles};
use crate::rain::RainAccumulator;
use crate::Packet;

/// Build a packet for one observation.
///
/// `local_date` is the observation timestamp converted to the station's local
/// calendar date; it drives the accumulator's midnight reset.
pub fn assemble(
    ts: i64,
    local_date: NaiveDate,
    roles: &Roles<'_>,
    rain: &mut RainAccumulator,
) -> Packet {
    let mut packet = Packet::at(ts);

    // UDP-shaped record first so a full record can overwrite shared fields.
    if let Some(record) = roles.primary_wind_only {
        packet.wind_speed = record.wind_speed_last;
        packet.wind_dir = record.wind_dir_last;
        apply_rain(&mut packet, record, local_date, rain);
    }

    if let Some(record) = roles.primary {
        packet.wind_speed = record.wind_speed_last;
        packet.wind_dir = record.wind_dir_last;
        packet.wind_gust = record.wind_speed_hi_last_2_min;
        packet.wind_gust_dir = record.wind_dir_at_hi_speed_last_2_min;
        packet.wind_speed_avg_10_min = record.wind_speed_avg_last_10_min;
        packet.wind_dir_avg_10_min = record.wind_dir_scalar_avg_last_10_min;

        packet.out_temp = record.temp;
        packet.out_humidity = record.hum;
        packet.dewpoint = record.dew_point;
        packet.heat_index = record.heat_index;
        packet.wind_chill = record.wind_chill;
        packet.thsw_index = record.thsw_index;
        packet.wet_bulb = record.wet_bulb;

        packet.radiation = record.solar_rad;
        packet.uv_index = record.uv_index;
        packet.tx_battery_status = record.trans_battery_flag;
        packet.rx_state = record.rx_state;

        apply_rain(&mut packet, record, local_date, rain);
    }

    if let Some(record) = roles.barometer {
        packet.barometer = record.bar_sea_level;
        packet.pressure = record.bar_absolute;
    }

    if let Some(record) = roles.indoor {
        packet.in_temp = record.temp_in;
        packet.in_humidity = record.hum_in;
        packet.in_dewpoint = record.dew_point_in;
    }

    if let Some(record) = roles.auxiliary {
        packet.extra_temp = record.temp;
        packet.extra_humidity = record.hum;
    }

    if let Some(record) = roles.air_quality {
        packet.pm1 = record.pm_1;
        packet.pm2p5 = record.pm_2p5;
        packet.pm10 = record.pm_10;
    }

    packet
}

/// Fold a record's rain counter and rate into the packet. With no bucket
/// calibration the accumulator returns `None` and the fields stay absent.
fn apply_rain(
    packet: &mut Packet,
    record: &ConditionRecord,
    local_date: NaiveDate,
    rain: &mut RainAccumulator,
) {
    if let Some(count) = record.rainfall_daily {
        if let Some(inches) = rain.observe(count, local_date) {
            packet.rain = Some(inches);
        }
    }
    if let Some(rate) = record.rain_rate_last {
        if let Some(inches_per_hour) = rain.rate_to_inches(rate) {
            packet.rain_rate = Some(inches_per_hour);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{classify, structure_type};
    use crate::rain::BucketSize;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid test date")
    }

    fn accumulator(seed: i64) -> RainAccumulator {
        let mut acc = RainAccumulator::seed(seed, date());
        acc.calibrate(BucketSize::from_code(1).unwrap());
        acc
    }

    fn full_iss(rainfall_daily: i64) -> ConditionRecord {
        ConditionRecord {
            data_structure_type: structure_type::ISS,
            txid: Some(1),
            temp: Some(62.7),
            hum: Some(45.0),
            dew_point: Some(41.2),
            heat_index: Some(62.0),
            wind_chill: Some(62.7),
            wind_speed_last: Some(4.0),
            wind_dir_last: Some(180.0),
            wind_speed_hi_last_2_min: Some(8.0),
            wind_dir_at_hi_speed_last_2_min: Some(190.0),
            wind_speed_avg_last_10_min: Some(5.0),
            wind_dir_scalar_avg_last_10_min: Some(175.0),
            rain_rate_last: Some(30.0),
            rainfall_daily: Some(rainfall_daily),
            solar_rad: Some(747.0),
            uv_index: Some(5.5),
            rx_state: Some(2),
            trans_battery_flag: Some(0),
            ..ConditionRecord::default()
        }
    }

    fn wind_only(rainfall_daily: i64) -> ConditionRecord {
        ConditionRecord {
            data_structure_type: structure_type::ISS,
            txid: Some(1),
            wind_speed_last: Some(3.5),
            wind_dir_last: Some(221.0),
            rain_rate_last: Some(0.0),
            rainfall_daily: Some(rainfall_daily),
            ..ConditionRecord::default()
        }
    }

    #[test]
    fn full_record_populates_sensor_suite() {
        let records = vec![full_iss(53)];
        let roles = classify(&records, 1, None);
        let mut acc = accumulator(50);
        let packet = assemble(1_717_243_200, date(), &roles, &mut acc);

        assert_eq!(packet.out_temp, Some(62.7));
        assert_eq!(packet.wind_speed, Some(4.0));
        assert_eq!(packet.wind_gust, Some(8.0));
        assert_eq!(packet.wind_speed_avg_10_min, Some(5.0));
        assert_eq!(packet.radiation, Some(747.0));
        assert_eq!(packet.tx_battery_status, Some(0));
        assert_eq!(packet.rx_state, Some(2));
        assert!((packet.rain.unwrap() - 0.03).abs() < 1e-9);
        assert!((packet.rain_rate.unwrap() - 0.30).abs() < 1e-9);
    }

    #[test]
    fn dual_feed_same_counter_counts_rain_once() {
        // End-to-end reconciliation: full path sees the counter at 53, then
        // the wind-only path reports the same value moments later.
        let mut acc = accumulator(50);

        let http_records = vec![full_iss(53)];
        let http = assemble(
            1_717_243_200,
            date(),
            &classify(&http_records, 1, None),
            &mut acc,
        );
        assert!((http.rain.unwrap() - 0.03).abs() < 1e-9);

        let udp_records = vec![wind_only(53)];
        let udp = assemble(
            1_717_243_203,
            date(),
            &classify(&udp_records, 1, None),
            &mut acc,
        );
        assert_eq!(udp.rain, Some(0.0));
    }

    #[test]
    fn wind_only_record_leaves_temperature_absent() {
        let records = vec![wind_only(63)];
        let roles = classify(&records, 1, None);
        let mut acc = accumulator(63);
        let packet = assemble(1_717_243_200, date(), &roles, &mut acc);

        assert_eq!(packet.wind_speed, Some(3.5));
        assert_eq!(packet.wind_dir, Some(221.0));
        assert_eq!(packet.out_temp, None);
        assert_eq!(packet.wind_gust, None);
        assert_eq!(packet.rain, Some(0.0));
    }

    #[test]
    fn missing_barometer_means_no_pressure_fields() {
        let records = vec![full_iss(0)];
        let roles = classify(&records, 1, None);
        let mut acc = accumulator(0);
        let packet = assemble(1_717_243_200, date(), &roles, &mut acc);
        assert_eq!(packet.barometer, None);
        assert_eq!(packet.pressure, None);
    }

    #[test]
    fn barometer_indoor_and_air_quality_roles_map_through() {
        let records = vec![
            ConditionRecord {
                data_structure_type: structure_type::BAROMETER,
                bar_sea_level: Some(30.008),
                bar_absolute: Some(29.998),
                ..ConditionRecord::default()
            },
            ConditionRecord {
                data_structure_type: structure_type::INDOOR,
                temp_in: Some(78.0),
                hum_in: Some(41.1),
                dew_point_in: Some(7.8),
                ..ConditionRecord::default()
            },
            ConditionRecord {
                data_structure_type: structure_type::AIR_QUALITY,
                txid: Some(3),
                pm_1: Some(2.0),
                pm_2p5: Some(4.5),
                pm_10: Some(7.1),
                ..ConditionRecord::default()
            },
        ];
        let roles = classify(&records, 1, None);
        let mut acc = accumulator(0);
        let packet = assemble(1_717_243_200, date(), &roles, &mut acc);

        assert_eq!(packet.barometer, Some(30.008));
        assert_eq!(packet.pressure, Some(29.998));
        assert_eq!(packet.in_temp, Some(78.0));
        assert_eq!(packet.in_dewpoint, Some(7.8));
        assert_eq!(packet.pm2p5, Some(4.5));
        assert_eq!(packet.pm10, Some(7.1));
        // Nothing primary in this observation.
        assert_eq!(packet.wind_speed, None);
        assert_eq!(packet.rain, None);
    }

    #[test]
    fn auxiliary_fields_only_set_when_non_null() {
        let records = vec![ConditionRecord {
            data_structure_type: structure_type::ISS,
            txid: Some(4),
            temp: Some(55.0),
            hum: None,
            ..ConditionRecord::default()
        }];
        let roles = classify(&records, 1, Some(4));
        let mut acc = accumulator(0);
        let packet = assemble(1_717_243_200, date(), &roles, &mut acc);
        assert_eq!(packet.extra_temp, Some(55.0));
        assert_eq!(packet.extra_humidity, None);
    }

    #[test]
    fn uncalibrated_rain_fields_are_suppressed() {
        let records = vec![full_iss(53)];
        let roles = classify(&records, 1, None);
        let mut acc = RainAccumulator::seed(50, date());
        let packet = assemble(1_717_243_200, date(), &roles, &mut acc);
        assert_eq!(packet.rain, None);
        assert_eq!(packet.rain_rate, None);
        // The rest of the record is unaffected.
        assert_eq!(packet.out_temp, Some(62.7));
    }

    #[test]
    fn serialized_packet_omits_absent_fields() {
        let records = vec![wind_only(10)];
        let roles = classify(&records, 1, None);
        let mut acc = accumulator(10);
        let packet = assemble(1_717_243_200, date(), &roles, &mut acc);
        let json = serde_json::to_value(&packet).unwrap();
        let map = json.as_object().unwrap();
        assert!(map.contains_key("dateTime"));
        assert!(map.contains_key("windSpeed"));
        assert!(!map.contains_key("outTemp"));
        assert!(!map.contains_key("barometer"));
    }
}
