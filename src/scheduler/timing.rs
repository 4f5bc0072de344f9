//! Fire Timing
//!
//! Interval schedule for one job:
//! - First firing one interval after start
//! - Missed firings collapse into a single due firing
//! - A due firing later than the misfire grace is dropped by the caller

use chrono::{DateTime, Duration, Utc};

/// A firing that is due now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueFiring {
    /// Latest slot at or before now
    pub scheduled_for: DateTime<Utc>,
    /// Earlier slots folded into this one
    pub coalesced: u32,
}

impl DueFiring {
    pub fn lateness(&self, now: DateTime<Utc>) -> Duration {
        now - self.scheduled_for
    }

    pub fn is_misfire(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.lateness(now) > grace
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireSchedule {
    interval: Duration,
    next: DateTime<Utc>,
}

/// Intervals are clamped to ten years
const MAX_INTERVAL_MILLIS: u128 = 3650 * 86_400_000;

/// Slot after `from`, pinned to the end of time when that overflows
fn slot_after(from: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    from.checked_add_signed(interval)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl FireSchedule {
    pub fn starting_at(start: DateTime<Utc>, interval: std::time::Duration) -> Self {
        let millis = interval.as_millis().clamp(1, MAX_INTERVAL_MILLIS);
        let interval = Duration::milliseconds(millis as i64);
        Self {
            interval,
            next: slot_after(start, interval),
        }
    }

    pub fn next_fire(&self) -> DateTime<Utc> {
        self.next
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time to sleep before the next slot; zero when it has passed
    pub fn time_until(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.next - now).to_std().unwrap_or(std::time::Duration::ZERO)
    }

    /// Consume every slot at or before `now` and move to the first slot after it
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Option<DueFiring> {
        if now < self.next {
            return None;
        }

        let step = self.interval.num_milliseconds();
        let skipped = (now - self.next).num_milliseconds() / step;
        let scheduled_for = self.next + Duration::milliseconds(step * skipped);
        self.next = slot_after(scheduled_for, self.interval);

        Some(DueFiring {
            scheduled_for,
            coalesced: skipped.min(u32::MAX as i64) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    fn hourly() -> FireSchedule {
        FireSchedule::starting_at(start(), std::time::Duration::from_secs(3600))
    }

    #[test]
    fn test_first_fire_after_one_interval() {
        let schedule = hourly();
        assert_eq!(schedule.next_fire(), start() + Duration::hours(1));
        assert_eq!(
            schedule.time_until(start()),
            std::time::Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_not_due_before_slot() {
        let mut schedule = hourly();
        assert_eq!(schedule.take_due(start() + Duration::minutes(59)), None);
        assert_eq!(schedule.next_fire(), start() + Duration::hours(1));
    }

    #[test]
    fn test_on_time_firing() {
        let mut schedule = hourly();
        let now = start() + Duration::hours(1) + Duration::seconds(2);
        let due = schedule.take_due(now).unwrap();

        assert_eq!(due.scheduled_for, start() + Duration::hours(1));
        assert_eq!(due.coalesced, 0);
        assert!(!due.is_misfire(now, Duration::seconds(300)));
        assert_eq!(schedule.next_fire(), start() + Duration::hours(2));
    }

    #[test]
    fn test_missed_firings_coalesce() {
        let mut schedule = hourly();
        let now = start() + Duration::hours(4) + Duration::minutes(3);
        let due = schedule.take_due(now).unwrap();

        assert_eq!(due.coalesced, 3);
        assert_eq!(due.scheduled_for, start() + Duration::hours(4));
        // Latest slot is within grace, so it still runs once
        assert!(!due.is_misfire(now, Duration::seconds(300)));
        assert_eq!(schedule.next_fire(), start() + Duration::hours(5));
        assert_eq!(schedule.take_due(now), None);
    }

    #[test]
    fn test_late_firing_is_misfire() {
        let mut schedule = hourly();
        let now = start() + Duration::hours(1) + Duration::minutes(6);
        let due = schedule.take_due(now).unwrap();

        assert!(due.is_misfire(now, Duration::seconds(300)));
        assert_eq!(due.lateness(now), Duration::minutes(6));
        assert_eq!(schedule.next_fire(), start() + Duration::hours(2));
    }

    #[test]
    fn test_huge_interval_is_clamped() {
        let mut schedule =
            FireSchedule::starting_at(start(), std::time::Duration::from_secs(u64::MAX));
        assert_eq!(schedule.interval(), Duration::days(3650));
        assert_eq!(schedule.next_fire(), start() + Duration::days(3650));
        assert_eq!(schedule.take_due(start() + Duration::days(1)), None);
    }

    #[test]
    fn test_slot_past_end_of_time_never_fires() {
        let near_end = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let mut schedule =
            FireSchedule::starting_at(near_end, std::time::Duration::from_secs(7 * 86400));
        assert_eq!(schedule.next_fire(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(schedule.take_due(near_end + Duration::hours(1)), None);

        let mut daily = FireSchedule::starting_at(
            near_end - Duration::days(1),
            std::time::Duration::from_secs(86400),
        );
        let due = daily.take_due(near_end).unwrap();
        assert_eq!(due.scheduled_for, near_end);
        assert_eq!(daily.next_fire(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_time_until_saturates() {
        let schedule = hourly();
        assert_eq!(
            schedule.time_until(start() + Duration::hours(3)),
            std::time::Duration::ZERO
        );
    }
}
