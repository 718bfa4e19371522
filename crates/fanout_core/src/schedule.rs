use chrono::{DateTime, Days, NaiveTime, Utc};

pub const DEFAULT_DRAIN_BATCH_SIZE: usize = 32;
pub const DEFAULT_DRAIN_VISIBILITY_BASE_SECONDS: u32 = 2;

/// Longest per-message delay the queue accepts. Longer delays are delivered
/// in hops, see [`DeliveryHop`].
pub const MAX_QUEUE_DELAY_SECONDS: u32 = 900;

const DAILY_RESET_HOUR: u32 = 1;

pub fn seconds_until_daily_reset(now: DateTime<Utc>) -> u32 {
    let reset_time = NaiveTime::from_hms_opt(DAILY_RESET_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    let reset = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .map(|day| day.and_time(reset_time).and_utc())
        .unwrap_or(now);

    let millis = (reset - now).num_milliseconds().max(0);
    let seconds = (millis + 999) / 1_000;
    u32::try_from(seconds).unwrap_or(u32::MAX)
}

pub fn drain_visibility(
    visibility_base: u32,
    wave: u32,
    daily_limit_exceeded: bool,
    now: DateTime<Utc>,
) -> u32 {
    let visibility = visibility_base.saturating_add(wave);
    if daily_limit_exceeded {
        visibility.saturating_add(seconds_until_daily_reset(now))
    } else {
        visibility
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryHop {
    pub delay_seconds: u32,
    /// Epoch seconds before which a consumer must defer the message again.
    /// `None` when the whole delay fits in this hop.
    pub not_before: Option<i64>,
}

impl DeliveryHop {
    pub fn plan(total_delay_seconds: u32, now: DateTime<Utc>) -> Self {
        if total_delay_seconds <= MAX_QUEUE_DELAY_SECONDS {
            return Self {
                delay_seconds: total_delay_seconds,
                not_before: None,
            };
        }

        Self {
            delay_seconds: MAX_QUEUE_DELAY_SECONDS,
            not_before: Some(now.timestamp() + i64::from(total_delay_seconds)),
        }
    }
}

pub fn remaining_delay(not_before: i64, now: DateTime<Utc>) -> Option<u32> {
    let remaining = not_before - now.timestamp();
    if remaining <= 0 {
        return None;
    }
    Some(u32::try_from(remaining).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text)
            .expect("timestamp should parse")
            .with_timezone(&Utc)
    }

    #[test]
    fn daily_reset_rounds_up_to_whole_seconds() {
        let now = at("2020-02-02T11:59:30.456Z");
        let reset = Utc
            .with_ymd_and_hms(2020, 2, 3, 1, 0, 0)
            .single()
            .expect("valid date");
        let exact_millis = (reset - now).num_milliseconds();

        let seconds = seconds_until_daily_reset(now);
        assert_eq!(i64::from(seconds), (exact_millis + 999) / 1_000);
        assert_eq!(seconds, 46_830);
    }

    #[test]
    fn daily_reset_targets_following_day_even_before_one_am() {
        let now = at("2020-02-02T00:30:00Z");
        assert_eq!(seconds_until_daily_reset(now), 24 * 3_600 + 30 * 60);
    }

    #[test]
    fn drain_visibility_adds_wave_and_daily_delay() {
        let now = at("2020-02-02T11:59:30.456Z");
        assert_eq!(drain_visibility(2, 1, false, now), 3);
        assert_eq!(drain_visibility(2, 2, false, now), 4);
        assert_eq!(drain_visibility(2, 1, true, now), 3 + 46_830);
    }

    #[test]
    fn short_delays_fit_in_one_hop() {
        let hop = DeliveryHop::plan(182, at("2020-02-02T12:00:00Z"));
        assert_eq!(
            hop,
            DeliveryHop {
                delay_seconds: 182,
                not_before: None,
            }
        );
    }

    #[test]
    fn long_delays_are_capped_and_carry_target_time() {
        let now = at("2020-02-02T12:00:00Z");
        let hop = DeliveryHop::plan(2_000, now);
        assert_eq!(hop.delay_seconds, MAX_QUEUE_DELAY_SECONDS);
        assert_eq!(hop.not_before, Some(now.timestamp() + 2_000));

        let target = now.timestamp() + 2_000;
        let remaining = remaining_delay(target, at("2020-02-02T12:15:00Z")).expect("deferred");
        assert_eq!(remaining, 1_100);

        let next = DeliveryHop::plan(remaining, at("2020-02-02T12:15:00Z"));
        assert_eq!(next.delay_seconds, 900);
        assert_eq!(next.not_before, Some(target));

        assert_eq!(remaining_delay(target, at("2020-02-02T12:30:00Z")), Some(200));
        assert_eq!(remaining_delay(target, at("2020-02-02T12:33:20Z")), None);
    }
}
