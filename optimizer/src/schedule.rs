use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use config::shared::OperationMode;

const SECONDS_PER_DAY: u64 = 86_400;

/// Returns how long a worker in `mode` must wait before it may run, or `None` when it may run now.
///
/// A scheduled window starts every day at the configured UTC time and lasts the configured
/// duration, possibly past midnight into the next day.
pub fn time_until_window(mode: &OperationMode, now: DateTime<Utc>) -> Option<Duration> {
    let OperationMode::Scheduled {
        daily_start_time,
        run_duration_secs,
    } = mode
    else {
        return None;
    };

    let run_duration = TimeDelta::seconds((*run_duration_secs).min(SECONDS_PER_DAY) as i64);
    let today_start = now.date_naive().and_time(*daily_start_time).and_utc();
    let yesterday_start = today_start - TimeDelta::days(1);

    for start in [yesterday_start, today_start] {
        if now >= start && now < start + run_duration {
            return None;
        }
    }

    let next_start = if now < today_start {
        today_start
    } else {
        today_start + TimeDelta::days(1)
    };

    Some((next_start - now).to_std().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone};

    use super::*;

    fn scheduled(hour: u32, minute: u32, run_duration_secs: u64) -> OperationMode {
        OperationMode::Scheduled {
            daily_start_time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            run_duration_secs,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn continuous_mode_always_runs() {
        assert_eq!(time_until_window(&OperationMode::Continuous, at(3, 0)), None);
    }

    #[test]
    fn inside_the_window_runs_now() {
        let mode = scheduled(8, 0, 2 * 3600);

        assert_eq!(time_until_window(&mode, at(8, 0)), None);
        assert_eq!(time_until_window(&mode, at(9, 59)), None);
    }

    #[test]
    fn before_and_after_the_window_waits_for_the_next_start() {
        let mode = scheduled(8, 0, 2 * 3600);

        assert_eq!(
            time_until_window(&mode, at(7, 30)),
            Some(Duration::from_secs(30 * 60))
        );
        assert_eq!(
            time_until_window(&mode, at(10, 0)),
            Some(Duration::from_secs(22 * 3600))
        );
    }

    #[test]
    fn windows_may_cross_midnight() {
        let mode = scheduled(22, 0, 4 * 3600);

        assert_eq!(time_until_window(&mode, at(23, 0)), None);
        assert_eq!(time_until_window(&mode, at(1, 30)), None);
        assert_eq!(
            time_until_window(&mode, at(2, 0)),
            Some(Duration::from_secs(20 * 3600))
        );
    }
}
