//! Competition period calculation.
//!
//! Every cadence maps an instant to a `current` window and, where one exists,
//! the `previous` window. Windows are half-open: a boundary instant belongs to
//! the window it opens.

use time::{Duration, Month, OffsetDateTime, Time, UtcOffset};

use crate::error::{AppError, Result};
use crate::types::{Periods, Window};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodConfig {
    /// Literal windows, returned verbatim regardless of `now`.
    Fixed {
        current: Window,
        previous: Option<Window>,
    },
    /// Back-to-back windows of `length`, counted from `anchor`.
    Rolling { anchor: OffsetDateTime, length: Duration },
    /// Calendar months in UTC.
    Monthly,
}

impl PeriodConfig {
    /// Build a rolling cadence, rejecting non-positive lengths.
    pub fn rolling(anchor: OffsetDateTime, length: Duration) -> Result<Self> {
        if length <= Duration::ZERO {
            return Err(AppError::Config(format!(
                "period length must be positive, got {length}"
            )));
        }
        Ok(PeriodConfig::Rolling {
            anchor: anchor.to_offset(UtcOffset::UTC),
            length,
        })
    }

    pub fn fixed(current: Window, previous: Option<Window>) -> Result<Self> {
        for w in std::iter::once(&current).chain(previous.iter()) {
            if w.end <= w.start {
                return Err(AppError::Config(format!("fixed window {w} is empty")));
            }
        }
        Ok(PeriodConfig::Fixed { current, previous })
    }

    pub fn periods_at(&self, now: OffsetDateTime) -> Result<Periods> {
        match self {
            PeriodConfig::Fixed { current, previous } => Ok(Periods {
                current: *current,
                previous: *previous,
            }),
            PeriodConfig::Rolling { anchor, length } => rolling_periods(*anchor, *length, now),
            PeriodConfig::Monthly => monthly_periods(now),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            PeriodConfig::Fixed { .. } => "fixed",
            PeriodConfig::Rolling { .. } => "rolling",
            PeriodConfig::Monthly => "monthly",
        }
    }
}

fn utc_midnight(t: OffsetDateTime) -> OffsetDateTime {
    t.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

fn rolling_periods(anchor: OffsetDateTime, length: Duration, now: OffsetDateTime) -> Result<Periods> {
    // Truncate to midnight so intraday time never moves the bucket.
    let elapsed = (utc_midnight(now) - anchor).whole_milliseconds();
    let length_ms = length.whole_milliseconds();
    let k = elapsed.div_euclid(length_ms);

    let offset = |n: i128| -> Result<OffsetDateTime> {
        let ms = i64::try_from(n * length_ms)
            .map_err(|_| AppError::Config("rolling period offset overflows".to_string()))?;
        anchor
            .checked_add(Duration::milliseconds(ms))
            .ok_or_else(|| AppError::Config("rolling period overflows calendar".to_string()))
    };

    let prev_start = offset(k - 1)?;
    let cur_start = offset(k)?;
    let cur_end = offset(k + 1)?;

    Ok(Periods {
        current: Window::new(cur_start, cur_end),
        previous: Some(Window::new(prev_start, cur_start)),
    })
}

fn month_start(year: i32, month: Month) -> Result<OffsetDateTime> {
    let date = time::Date::from_calendar_date(year, month, 1)?;
    Ok(date.midnight().assume_utc())
}

fn monthly_periods(now: OffsetDateTime) -> Result<Periods> {
    let now = now.to_offset(UtcOffset::UTC);
    let (year, month) = (now.year(), now.month());

    let cur_start = month_start(year, month)?;
    let next_year = if month == Month::December { year + 1 } else { year };
    let cur_end = month_start(next_year, month.next())?;
    let prev_year = if month == Month::January { year - 1 } else { year };
    let prev_start = month_start(prev_year, month.previous())?;

    Ok(Periods {
        current: Window::new(cur_start, cur_end),
        previous: Some(Window::new(prev_start, cur_start)),
    })
}

/// Time left until `window` closes, clamped at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    pub fn until_end(window: &Window, now: OffsetDateTime) -> Self {
        let left = (window.end - now).max(Duration::ZERO).whole_seconds();
        Self {
            days: left / 86_400,
            hours: (left / 3_600) % 24,
            minutes: (left / 60) % 60,
            seconds: left % 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn fortnightly() -> PeriodConfig {
        PeriodConfig::rolling(datetime!(2025-08-26 0:00 UTC), Duration::days(14)).unwrap()
    }

    #[test]
    fn anchor_instant_opens_first_window() {
        let p = fortnightly().periods_at(datetime!(2025-08-26 0:00 UTC)).unwrap();
        assert_eq!(
            p.current,
            Window::new(datetime!(2025-08-26 0:00 UTC), datetime!(2025-09-09 0:00 UTC))
        );
        assert_eq!(
            p.previous,
            Some(Window::new(datetime!(2025-08-12 0:00 UTC), datetime!(2025-08-26 0:00 UTC)))
        );
    }

    #[test]
    fn one_millisecond_before_anchor_is_previous_bucket() {
        let now = datetime!(2025-08-26 0:00 UTC) - Duration::milliseconds(1);
        let p = fortnightly().periods_at(now).unwrap();
        assert_eq!(
            p.current,
            Window::new(datetime!(2025-08-12 0:00 UTC), datetime!(2025-08-26 0:00 UTC))
        );
    }

    #[test]
    fn boundary_belongs_to_the_window_it_opens() {
        let cfg = fortnightly();
        let p = cfg.periods_at(datetime!(2025-09-09 0:00 UTC)).unwrap();
        assert_eq!(p.current.start, datetime!(2025-09-09 0:00 UTC));

        let p = cfg.periods_at(datetime!(2025-09-08 23:59:59.999 UTC)).unwrap();
        assert_eq!(p.current.start, datetime!(2025-08-26 0:00 UTC));
    }

    #[test]
    fn intraday_time_does_not_shift_bucket() {
        let cfg = fortnightly();
        let morning = cfg.periods_at(datetime!(2025-10-01 0:00:01 UTC)).unwrap();
        let night = cfg.periods_at(datetime!(2025-10-01 23:59:59 UTC)).unwrap();
        assert_eq!(morning, night);
        assert_eq!(
            morning.current,
            Window::new(datetime!(2025-09-23 0:00 UTC), datetime!(2025-10-07 0:00 UTC))
        );
    }

    #[test]
    fn non_utc_now_is_normalised() {
        // 01:00 +02:00 is still the previous UTC day.
        let p = fortnightly()
            .periods_at(datetime!(2025-09-09 1:00 +2))
            .unwrap();
        assert_eq!(p.current.start, datetime!(2025-08-26 0:00 UTC));
    }

    #[test]
    fn same_input_same_output() {
        let cfg = fortnightly();
        let now = datetime!(2026-01-17 13:45:12 UTC);
        assert_eq!(cfg.periods_at(now).unwrap(), cfg.periods_at(now).unwrap());
    }

    #[test]
    fn zero_or_negative_length_is_rejected() {
        let anchor = datetime!(2025-08-26 0:00 UTC);
        assert!(matches!(
            PeriodConfig::rolling(anchor, Duration::ZERO),
            Err(AppError::Config(_))
        ));
        assert!(PeriodConfig::rolling(anchor, Duration::days(-1)).is_err());
    }

    #[test]
    fn fixed_windows_ignore_now() {
        let current = Window::new(datetime!(2025-09-26 0:00 UTC), datetime!(2025-10-10 0:00 UTC));
        let cfg = PeriodConfig::fixed(current, None).unwrap();
        for now in [
            datetime!(2025-09-26 0:00 UTC),
            datetime!(2025-10-03 12:00 UTC),
            datetime!(2030-01-01 0:00 UTC),
        ] {
            let p = cfg.periods_at(now).unwrap();
            assert_eq!(p.current, current);
            assert_eq!(p.previous, None);
        }
    }

    #[test]
    fn fixed_rejects_empty_window() {
        let t = datetime!(2025-09-26 0:00 UTC);
        assert!(PeriodConfig::fixed(Window::new(t, t), None).is_err());
    }

    #[test]
    fn monthly_wraps_year_boundaries() {
        let p = PeriodConfig::Monthly
            .periods_at(datetime!(2025-12-31 23:00 UTC))
            .unwrap();
        assert_eq!(
            p.current,
            Window::new(datetime!(2025-12-01 0:00 UTC), datetime!(2026-01-01 0:00 UTC))
        );

        let p = PeriodConfig::Monthly
            .periods_at(datetime!(2026-01-15 0:00 UTC))
            .unwrap();
        assert_eq!(
            p.previous,
            Some(Window::new(datetime!(2025-12-01 0:00 UTC), datetime!(2026-01-01 0:00 UTC)))
        );
    }

    #[test]
    fn countdown_splits_and_clamps() {
        let w = Window::new(datetime!(2025-09-09 0:00 UTC), datetime!(2025-09-23 0:00 UTC));
        let c = Countdown::until_end(&w, datetime!(2025-09-21 22:58:30 UTC));
        assert_eq!(
            c,
            Countdown { days: 1, hours: 1, minutes: 1, seconds: 30 }
        );

        let c = Countdown::until_end(&w, datetime!(2025-09-24 0:00 UTC));
        assert_eq!(c, Countdown { days: 0, hours: 0, minutes: 0, seconds: 0 });
    }
}
