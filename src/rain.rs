//! # Rain Bucket Calibration and Daily-Counter Accumulation
//!
//! The bridge reports rain as a monotonically-increasing count of bucket tips
//! since local midnight, duplicated across the HTTP and UDP feeds. This module
//! turns that counter into a per-observation rain amount:
//!
//! - [`BucketSize`] maps the hardware `rain_size` code to inches per tip.
//! - [`RainAccumulator`] owns the "already counted" baseline and the
//!   local-midnight reset boundary, and folds every reading from *both* feeds
//!   through one shared instance.
//!
//! ## Why one shared accumulator
//!
//! Both feeds reflect the same underlying daily counter. Differencing each
//! feed independently would attribute the same tips twice whenever the feeds
//! race within one broadcast interval. The accumulator instead absorbs the
//! counter on every positive delta, so whichever feed delivers a given counter
//! value first claims the increment and the other feed's duplicate diff is
//! zero. Correctness does not depend on the order the feeds are processed in,
//! only on every reading passing through this one instance.
//!
//! ## Midnight
//!
//! The bridge zeroes `rainfall_daily` at local midnight. The accumulator
//! tracks the first local date that counts as "a new day" and zeroes its
//! baseline before diffing the first post-midnight reading, so that reading is
//! compared against 0 rather than yesterday's total.

use chrono::NaiveDate;
use log::{debug, warn};

use crate::bridge::WllError;

/// Millimeters to inches, for the metric collector codes.
pub const MM_TO_INCH: f64 = 1.0 / 25.4;

/// Physical size of one rain-collector bucket tip, in inches.
///
/// Derived once per station session from the `rain_size` code the first HTTP
/// snapshot carries; the hardware cannot change collectors mid-run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketSize(f64);

impl BucketSize {
    /// Map a `rain_size` code to a bucket size.
    ///
    /// Codes: 1 = 0.01 in, 2 = 0.2 mm, 3 = 0.1 mm, 4 = 0.001 in. Code 0 is
    /// reserved by the vendor; anything outside 1..=4 is an explicit error so
    /// the caller can leave the calibration unset instead of guessing.
    pub fn from_code(code: u8) -> Result<Self, WllError> {
        let inches = match code {
            1 => 0.01,
            2 => 0.2 * MM_TO_INCH,
            3 => 0.1 * MM_TO_INCH,
            4 => 0.001,
            other => return Err(WllError::UnsupportedBucketSize(other)),
        };
        debug!("rain bucket size set to {inches} in (code {code})");
        Ok(BucketSize(inches))
    }

    pub fn inches_per_tip(self) -> f64 {
        self.0
    }

    /// Scale a tip count (or counts/hour rate) into inches.
    pub fn tips_to_inches(self, tips: f64) -> f64 {
        tips * self.0
    }
}

/// The rain-counter state machine shared by both feeds.
#[derive(Debug)]
pub struct RainAccumulator {
    bucket: Option<BucketSize>,
    /// Tips already attributed to the current local day.
    previous_period_count: i64,
    /// First local date to be treated as a new day.
    reset_date: NaiveDate,
}

impl RainAccumulator {
    /// Seed the accumulator from the first successful snapshot at startup.
    ///
    /// The bridge's current daily counter becomes the baseline (rain that fell
    /// before the driver started is not ours to report) and the next reset is
    /// due the day after the snapshot's local date.
    pub fn seed(daily_tip_count: i64, local_date: NaiveDate) -> Self {
        debug!("rain baseline seeded at {daily_tip_count} tips, reset due {}", next_day(local_date));
        RainAccumulator {
            bucket: None,
            previous_period_count: daily_tip_count,
            reset_date: next_day(local_date),
        }
    }

    /// Set the bucket calibration. Fixed for the session: a later attempt with
    /// a different size is ignored and logged, never applied mid-run.
    pub fn calibrate(&mut self, bucket: BucketSize) {
        match self.bucket {
            Some(existing) if existing != bucket => {
                warn!(
                    "ignoring bucket size change mid-session ({} in -> {} in)",
                    existing.inches_per_tip(),
                    bucket.inches_per_tip()
                );
            }
            Some(_) => {}
            None => self.bucket = Some(bucket),
        }
    }

    pub fn bucket(&self) -> Option<BucketSize> {
        self.bucket
    }

    /// Fold one daily-counter reading into the accumulator and return the rain
    /// amount for this observation period, in inches.
    ///
    /// Returns `None` when no bucket calibration is set; rain fields must then
    /// be reported as unavailable rather than computed with a made-up size.
    /// State is advanced either way so a late-arriving calibration does not
    /// replay the counter.
    pub fn observe(&mut self, daily_tip_count: i64, local_date: NaiveDate) -> Option<f64> {
        let tips = self.observe_tips(daily_tip_count, local_date);
        self.bucket.map(|b| b.tips_to_inches(tips as f64))
    }

    /// Counter-space half of [`observe`](Self::observe): returns the tip delta
    /// attributed to this reading.
    ///
    /// - A reading on or after the stored reset date zeroes the baseline and
    ///   advances the boundary *before* diffing, so the first post-midnight
    ///   reading is compared against 0.
    /// - A reading below the baseline is an anomaly (out-of-order delivery or
    ///   a bridge glitch): logged, delta 0, baseline untouched.
    /// - A positive delta is absorbed into the baseline, which is what makes a
    ///   duplicate of the same counter value from the other feed yield 0.
    pub fn observe_tips(&mut self, daily_tip_count: i64, local_date: NaiveDate) -> i64 {
        if local_date >= self.reset_date {
            debug!("daily rain counter reset (new local day {local_date})");
            self.previous_period_count = 0;
            self.reset_date = next_day(local_date);
        }

        if daily_tip_count < self.previous_period_count {
            warn!(
                "rain counter decreased ({} -> {daily_tip_count} tips); ignoring reading",
                self.previous_period_count
            );
            return 0;
        }

        let delta = daily_tip_count - self.previous_period_count;
        if delta > 0 {
            self.previous_period_count = daily_tip_count;
            debug!("+{delta} bucket tips this period");
        }
        delta
    }

    /// Convert a raw rain rate (counts/hour) into inches/hour, `None` when
    /// uncalibrated.
    pub fn rate_to_inches(&self, counts_per_hour: f64) -> Option<f64> {
        self.bucket.map(|b| b.tips_to_inches(counts_per_hour))
    }
}

/// Day after `date`; saturates at the calendar horizon.
fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).expect("valid test date")
    }

    fn calibrated(seed: i64, date: NaiveDate) -> RainAccumulator {
        let mut acc = RainAccumulator::seed(seed, date);
        acc.calibrate(BucketSize::from_code(1).unwrap());
        acc
    }

    #[test]
    fn bucket_codes_map_to_expected_sizes() {
        assert_eq!(BucketSize::from_code(1).unwrap().inches_per_tip(), 0.01);
        assert!((BucketSize::from_code(2).unwrap().inches_per_tip() - 0.2 / 25.4).abs() < 1e-12);
        assert!((BucketSize::from_code(3).unwrap().inches_per_tip() - 0.1 / 25.4).abs() < 1e-12);
        assert_eq!(BucketSize::from_code(4).unwrap().inches_per_tip(), 0.001);
    }

    #[test]
    fn bucket_codes_outside_range_are_rejected() {
        for code in [0u8, 5, 17, 255] {
            assert!(matches!(
                BucketSize::from_code(code),
                Err(WllError::UnsupportedBucketSize(c)) if c == code
            ));
        }
    }

    #[test]
    fn bucket_conversion_round_trips() {
        for code in 1..=4u8 {
            let bucket = BucketSize::from_code(code).unwrap();
            let tips = 137.0;
            let recovered = bucket.tips_to_inches(tips) / bucket.inches_per_tip();
            assert!(
                (recovered - tips).abs() < 1e-9,
                "code {code} did not round-trip: {recovered}"
            );
        }
    }

    #[test]
    fn duplicate_counter_reading_is_idempotent() {
        let mut acc = calibrated(10, day(1));
        assert_eq!(acc.observe_tips(15, day(1)), 5);
        // Same counter again (the other feed's copy) must not re-count.
        assert_eq!(acc.observe_tips(15, day(1)), 0);
        assert_eq!(acc.observe_tips(15, day(1)), 0);
    }

    #[test]
    fn midnight_reset_diffs_against_zero() {
        let mut acc = calibrated(50, day(1));
        // First post-midnight reading: counter restarted below the old total.
        assert_eq!(acc.observe_tips(3, day(2)), 3);
        // And the new baseline holds.
        assert_eq!(acc.observe_tips(3, day(2)), 0);
        assert_eq!(acc.observe_tips(5, day(2)), 2);
    }

    #[test]
    fn midnight_reset_applies_even_when_counter_is_higher() {
        // A dry midnight crossing where the first new-day reading happens to
        // exceed yesterday's baseline must still be counted in full.
        let mut acc = calibrated(2, day(1));
        assert_eq!(acc.observe_tips(7, day(2)), 7);
    }

    #[test]
    fn skipped_days_still_reset_once() {
        // Quiet station over a weekend: the boundary advances past every
        // missed midnight in one step.
        let mut acc = calibrated(40, day(1));
        assert_eq!(acc.observe_tips(4, day(4)), 4);
        assert_eq!(acc.observe_tips(6, day(4)), 2);
    }

    #[test]
    fn negative_delta_is_suppressed_without_corrupting_state() {
        let mut acc = calibrated(0, day(1));
        assert_eq!(acc.observe_tips(20, day(1)), 20);
        // Glitch dip: no negative delta, baseline unchanged.
        assert_eq!(acc.observe_tips(17, day(1)), 0);
        // Recovery back to the old counter is not new rain either.
        assert_eq!(acc.observe_tips(20, day(1)), 0);
        assert_eq!(acc.observe_tips(21, day(1)), 1);
    }

    #[test]
    fn interleaved_feeds_count_each_tip_at_most_once() {
        // Two logical feeds reporting the same underlying counter, arriving
        // interleaved. The total must equal the true increment (8 tips), not
        // the sum of two independent diffs.
        let mut acc = calibrated(0, day(1));
        let mut total = 0;
        for (http, udp) in [(2, 2), (2, 5), (7, 7), (8, 7)] {
            total += acc.observe_tips(http, day(1));
            total += acc.observe_tips(udp, day(1));
        }
        assert_eq!(total, 8);
    }

    #[test]
    fn observe_converts_tips_to_inches() {
        let mut acc = calibrated(50, day(1));
        let rain = acc.observe(53, day(1)).unwrap();
        assert!((rain - 0.03).abs() < 1e-9);
        assert_eq!(acc.observe(53, day(1)).unwrap(), 0.0);
    }

    #[test]
    fn uncalibrated_accumulator_suppresses_rain_but_advances_state() {
        let mut acc = RainAccumulator::seed(0, day(1));
        assert_eq!(acc.observe(10, day(1)), None);
        assert_eq!(acc.rate_to_inches(30.0), None);
        // Late calibration must not replay the 10 tips observed above.
        acc.calibrate(BucketSize::from_code(1).unwrap());
        assert_eq!(acc.observe(10, day(1)).unwrap(), 0.0);
    }

    #[test]
    fn calibration_is_fixed_for_the_session() {
        let mut acc = RainAccumulator::seed(0, day(1));
        acc.calibrate(BucketSize::from_code(1).unwrap());
        acc.calibrate(BucketSize::from_code(4).unwrap());
        assert_eq!(acc.bucket().unwrap().inches_per_tip(), 0.01);
    }
}
