//! # GPS Interface
//!
//! Optional UTC time reference and geographic position, used to anchor the
//! concentrator's free-running microsecond counter to wall-clock time for
//! `ON_GPS`-mode transmissions and to populate `stat.lati`/`stat.long`.

use async_trait::async_trait;

/// A linear model tying the concentrator's microsecond counter to UTC,
/// anchored at a PPS edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRef {
    /// Concentrator `count_us` value observed at the PPS edge.
    pub count_us_at_pps: u32,
    /// UTC seconds at that same PPS edge.
    pub utc_secs_at_pps: i64,
    /// Whether the reference is currently trustworthy (GPS has a fix).
    pub valid: bool,
}

impl TimeRef {
    /// Converts a concentrator microsecond count into UTC seconds using this
    /// reference's linear model.
    pub fn count_us_to_utc(&self, count_us: u32) -> Option<i64> {
        if !self.valid {
            return None;
        }
        let delta_us = count_us.wrapping_sub(self.count_us_at_pps) as i32;
        Some(self.utc_secs_at_pps + (delta_us as i64 / 1_000_000))
    }
}

/// Geographic coordinates reported in the periodic `stat` message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: i32,
}

/// A source of GPS time and position. Implementations poll a serial NMEA/UBX
/// stream or similar; the gateway core only ever sees this trait.
#[async_trait]
pub trait GpsSource: Send + Sync {
    /// Current UTC↔count_us linear model, if the GPS has ever acquired a fix.
    fn time_ref(&self) -> Option<TimeRef>;

    /// Most recent geographic fix, if any.
    fn position(&self) -> Option<GeoPosition>;
}

/// A GPS source with a fixed, caller-supplied reference — used by tests that
/// need deterministic `tref`/position values without a real receiver.
pub struct StaticGpsSource {
    time_ref: Option<TimeRef>,
    position: Option<GeoPosition>,
}

impl StaticGpsSource {
    pub fn new(time_ref: Option<TimeRef>, position: Option<GeoPosition>) -> Self {
        Self { time_ref, position }
    }

    /// A source that reports no fix at all, the default state at startup.
    pub fn unlocked() -> Self {
        Self {
            time_ref: None,
            position: None,
        }
    }
}

#[async_trait]
impl GpsSource for StaticGpsSource {
    fn time_ref(&self) -> Option<TimeRef> {
        self.time_ref
    }

    fn position(&self) -> Option<GeoPosition> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlocked_source_reports_no_fix() {
        let gps = StaticGpsSource::unlocked();
        assert!(gps.time_ref().is_none());
        assert!(gps.position().is_none());
    }

    #[test]
    fn time_ref_converts_count_us_forward_in_time() {
        let tref = TimeRef {
            count_us_at_pps: 1_000_000,
            utc_secs_at_pps: 1_700_000_000,
            valid: true,
        };
        assert_eq!(tref.count_us_to_utc(3_000_000), Some(1_700_000_002));
    }

    #[test]
    fn invalid_reference_converts_to_none() {
        let tref = TimeRef {
            count_us_at_pps: 0,
            utc_secs_at_pps: 0,
            valid: false,
        };
        assert_eq!(tref.count_us_to_utc(1_000_000), None);
    }
}
