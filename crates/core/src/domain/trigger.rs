//! Triggers - schedule specifications and their next-fire computation
//!
//! A [`TriggerSpec`] is the persisted, user-facing description
//! (`{type: interval|cron|date, ...}`). Building it yields a [`Trigger`],
//! a pure function from "now" to the next fire time strictly after it.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::error::{DomainError, Result};

const NAIVE_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Cron day names, indexed by days from Monday
const CRON_DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Schedule specification as stored and accepted from definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TriggerSpec {
    /// Fire every `minutes`, starting one period after the anchor
    Interval { minutes: u32 },
    /// Fire at `hour:minute` on the matching days of week
    Cron {
        day_of_week: String,
        hour: u32,
        minute: u32,
    },
    /// Fire exactly once
    Date { timestamp: String },
}

impl TriggerSpec {
    pub fn interval(minutes: u32) -> Self {
        TriggerSpec::Interval { minutes }
    }

    pub fn cron(day_of_week: impl Into<String>, hour: u32, minute: u32) -> Self {
        TriggerSpec::Cron {
            day_of_week: day_of_week.into(),
            hour,
            minute,
        }
    }

    pub fn date(timestamp: impl Into<String>) -> Self {
        TriggerSpec::Date {
            timestamp: timestamp.into(),
        }
    }

    /// Validate the spec and build its trigger
    ///
    /// `anchor` only matters for interval triggers; `tz` is used for cron
    /// matching and for date timestamps without an explicit offset.
    pub fn build(&self, anchor: DateTime<Utc>, tz: Tz) -> Result<Arc<dyn Trigger>> {
        match self {
            TriggerSpec::Interval { minutes } => {
                Ok(Arc::new(IntervalTrigger::new(anchor, *minutes)?))
            }
            TriggerSpec::Cron {
                day_of_week,
                hour,
                minute,
            } => Ok(Arc::new(CronTrigger::new(day_of_week, *hour, *minute, tz)?)),
            TriggerSpec::Date { timestamp } => Ok(Arc::new(DateTrigger::parse(timestamp, tz)?)),
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self, TriggerSpec::Date { .. })
    }
}

impl std::fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSpec::Interval { minutes } => write!(f, "interval[{}m]", minutes),
            TriggerSpec::Cron {
                day_of_week,
                hour,
                minute,
            } => write!(
                f,
                "cron[day_of_week='{}', hour='{}', minute='{}']",
                day_of_week, hour, minute
            ),
            TriggerSpec::Date { timestamp } => write!(f, "date[{}]", timestamp),
        }
    }
}

/// Next-fire computation. Implementations are pure: the same `now`
/// always yields the same answer.
pub trait Trigger: Send + Sync + std::fmt::Debug {
    /// Next fire time strictly after `now`, or `None` once exhausted
    fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// Parse an IANA timezone name (e.g. "UTC", "Europe/Berlin")
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| DomainError::InvalidScheduleSpec(format!("unknown timezone '{}'", name)))
}

/// Fires at `anchor + k * period` for k >= 1
#[derive(Debug, Clone)]
pub struct IntervalTrigger {
    anchor: DateTime<Utc>,
    period: ChronoDuration,
}

impl IntervalTrigger {
    pub fn new(anchor: DateTime<Utc>, minutes: u32) -> Result<Self> {
        if minutes == 0 {
            return Err(DomainError::InvalidScheduleSpec(
                "interval minutes must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            anchor,
            period: ChronoDuration::minutes(i64::from(minutes)),
        })
    }
}

impl Trigger for IntervalTrigger {
    fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let first = self.anchor + self.period;
        if now < first {
            return Some(first);
        }
        let period_ms = self.period.num_milliseconds();
        let elapsed_ms = (now - self.anchor).num_milliseconds();
        let periods = elapsed_ms / period_ms + 1;
        Some(self.anchor + ChronoDuration::milliseconds(periods * period_ms))
    }
}

/// Fires at `hour:minute` (local to `tz`) on selected days of week
#[derive(Debug, Clone)]
pub struct CronTrigger {
    schedule: Schedule,
    tz: Tz,
}

impl CronTrigger {
    pub fn new(day_of_week: &str, hour: u32, minute: u32, tz: Tz) -> Result<Self> {
        if hour > 23 {
            return Err(DomainError::InvalidScheduleSpec(format!(
                "hour must be in 0-23, got {}",
                hour
            )));
        }
        if minute > 59 {
            return Err(DomainError::InvalidScheduleSpec(format!(
                "minute must be in 0-59, got {}",
                minute
            )));
        }

        // sec min hour day-of-month month day-of-week
        let expression = format!(
            "0 {} {} * * {}",
            minute,
            hour,
            day_of_week_field(day_of_week)?
        );
        let schedule = Schedule::from_str(&expression).map_err(|e| {
            DomainError::InvalidScheduleSpec(format!(
                "cron expression '{}' rejected: {}",
                expression, e
            ))
        })?;
        Ok(Self { schedule, tz })
    }
}

impl Trigger for CronTrigger {
    fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.tz))
            .next()
            .map(|next| next.with_timezone(&Utc))
    }
}

/// Fires once at a fixed instant
#[derive(Debug, Clone)]
pub struct DateTrigger {
    at: DateTime<Utc>,
}

impl DateTrigger {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }

    /// Parse RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` interpreted in `tz`
    pub fn parse(timestamp: &str, tz: Tz) -> Result<Self> {
        let raw = timestamp.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self::new(parsed.with_timezone(&Utc)));
        }
        for format in NAIVE_DATE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                let local = tz.from_local_datetime(&naive).earliest().ok_or_else(|| {
                    DomainError::InvalidScheduleSpec(format!(
                        "date '{}' does not exist in timezone {}",
                        raw, tz
                    ))
                })?;
                return Ok(Self::new(local.with_timezone(&Utc)));
            }
        }
        Err(DomainError::InvalidScheduleSpec(format!(
            "unparseable date '{}' (expected ISO-8601)",
            raw
        )))
    }

    pub fn fire_time(&self) -> DateTime<Utc> {
        self.at
    }
}

impl Trigger for DateTrigger {
    fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.at > now).then_some(self.at)
    }
}

/// Cron day-of-week field for an expression: `*`, `mon`, `mon,wed,fri`,
/// `mon-fri`, or digits 0-6 (0 = Monday), in any comma-separated combination
///
/// Ranges are expanded here because they run Monday to Sunday, while cron
/// numbers its week from Sunday.
fn day_of_week_field(expr: &str) -> Result<String> {
    let days = parse_day_of_week(expr)?;
    if days.iter().all(|selected| *selected) {
        return Ok("*".to_string());
    }
    let names: Vec<&str> = CRON_DAY_NAMES
        .iter()
        .zip(days)
        .filter(|(_, selected)| *selected)
        .map(|(name, _)| *name)
        .collect();
    Ok(names.join(","))
}

fn parse_day_of_week(expr: &str) -> Result<[bool; 7]> {
    let mut days = [false; 7];
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(DomainError::InvalidScheduleSpec(
            "day_of_week cannot be empty".to_string(),
        ));
    }

    for token in expr.split(',') {
        let token = token.trim();
        if token == "*" {
            days = [true; 7];
            continue;
        }
        match token.split_once('-') {
            Some((start, end)) => {
                let start = parse_day(start)?;
                let end = parse_day(end)?;
                if start > end {
                    return Err(DomainError::InvalidScheduleSpec(format!(
                        "day_of_week range '{}' runs backwards",
                        token
                    )));
                }
                for day in start..=end {
                    days[day] = true;
                }
            }
            None => days[parse_day(token)?] = true,
        }
    }
    Ok(days)
}

fn parse_day(token: &str) -> Result<usize> {
    let day = match token.trim().to_ascii_lowercase().as_str() {
        "mon" | "0" => 0,
        "tue" | "1" => 1,
        "wed" | "2" => 2,
        "thu" | "3" => 3,
        "fri" | "4" => 4,
        "sat" | "5" => 5,
        "sun" | "6" => 6,
        _ => {
            return Err(DomainError::InvalidScheduleSpec(format!(
                "malformed day_of_week token '{}'",
                token
            )))
        }
    };
    Ok(day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Weekday};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_interval_next_fire_from_anchor() {
        let t0 = utc(2026, 3, 2, 9, 0);
        let trigger = TriggerSpec::interval(30).build(t0, Tz::UTC).unwrap();

        let next = trigger
            .next_fire_after(t0 + ChronoDuration::minutes(10))
            .unwrap();
        assert_eq!(next, t0 + ChronoDuration::minutes(30));
    }

    #[test]
    fn test_interval_is_strictly_after_now() {
        let t0 = utc(2026, 3, 2, 9, 0);
        let trigger = IntervalTrigger::new(t0, 30).unwrap();

        let at_boundary = t0 + ChronoDuration::minutes(30);
        assert_eq!(
            trigger.next_fire_after(at_boundary),
            Some(t0 + ChronoDuration::minutes(60))
        );
        assert_eq!(
            trigger.next_fire_after(t0 + ChronoDuration::minutes(95)),
            Some(t0 + ChronoDuration::minutes(120))
        );
    }

    #[test]
    fn test_next_fire_is_idempotent() {
        let t0 = utc(2026, 3, 2, 9, 0);
        let now = t0 + ChronoDuration::minutes(47);
        for spec in [
            TriggerSpec::interval(15),
            TriggerSpec::cron("mon-fri", 8, 30),
            TriggerSpec::date("2026-12-24T18:00:00Z"),
        ] {
            let trigger = spec.build(t0, Tz::UTC).unwrap();
            assert_eq!(trigger.next_fire_after(now), trigger.next_fire_after(now));
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = TriggerSpec::interval(0)
            .build(Utc::now(), Tz::UTC)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidScheduleSpec(_)));
    }

    #[test]
    fn test_cron_weekday_range_skips_weekend() {
        // 2026-03-06 is a Friday
        let friday_evening = utc(2026, 3, 6, 20, 0);
        let trigger = CronTrigger::new("mon-fri", 8, 15, Tz::UTC).unwrap();

        let next = trigger.next_fire_after(friday_evening).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!((next.hour(), next.minute()), (8, 15));
        assert_eq!(next, utc(2026, 3, 9, 8, 15));
    }

    #[test]
    fn test_cron_same_day_when_time_not_passed() {
        let monday_morning = utc(2026, 3, 2, 7, 59);
        let trigger = CronTrigger::new("mon", 8, 0, Tz::UTC).unwrap();
        assert_eq!(
            trigger.next_fire_after(monday_morning),
            Some(utc(2026, 3, 2, 8, 0))
        );

        // Exactly at the fire time, the next one is a week later
        assert_eq!(
            trigger.next_fire_after(utc(2026, 3, 2, 8, 0)),
            Some(utc(2026, 3, 9, 8, 0))
        );
    }

    #[test]
    fn test_cron_comma_list_and_numeric_days() {
        let trigger = CronTrigger::new("wed, 4,sun", 12, 0, Tz::UTC).unwrap();
        // Tuesday 2026-03-03 -> Wednesday
        assert_eq!(
            trigger.next_fire_after(utc(2026, 3, 3, 13, 0)),
            Some(utc(2026, 3, 4, 12, 0))
        );
        // Wednesday after noon -> Friday (4)
        assert_eq!(
            trigger.next_fire_after(utc(2026, 3, 4, 12, 1)),
            Some(utc(2026, 3, 6, 12, 0))
        );
    }

    #[test]
    fn test_cron_respects_timezone() {
        let tz = parse_timezone("Europe/Berlin").unwrap();
        let trigger = CronTrigger::new("*", 8, 0, tz).unwrap();
        // 08:00 in Berlin during winter time is 07:00 UTC
        assert_eq!(
            trigger.next_fire_after(utc(2026, 1, 15, 0, 0)),
            Some(utc(2026, 1, 15, 7, 0))
        );
    }

    #[test]
    fn test_cron_follows_daylight_saving_offset() {
        let tz = parse_timezone("Europe/Berlin").unwrap();
        let trigger = CronTrigger::new("*", 8, 0, tz).unwrap();
        // 2026-03-29: clocks go forward at 02:00, 08:00 CEST is 06:00 UTC
        assert_eq!(
            trigger.next_fire_after(utc(2026, 3, 28, 12, 0)),
            Some(utc(2026, 3, 29, 6, 0))
        );
    }

    #[test]
    fn test_weekend_range_crosses_cron_week_start() {
        let trigger = CronTrigger::new("sat-sun", 10, 0, Tz::UTC).unwrap();
        // Sunday 2026-03-08 after 10:00 -> next Saturday
        assert_eq!(
            trigger.next_fire_after(utc(2026, 3, 8, 11, 0)),
            Some(utc(2026, 3, 14, 10, 0))
        );
        assert_eq!(day_of_week_field("sat-sun").unwrap(), "Sat,Sun");
        assert_eq!(day_of_week_field("mon,*").unwrap(), "*");
    }

    #[test]
    fn test_cron_rejects_out_of_range_fields() {
        assert!(CronTrigger::new("mon", 24, 0, Tz::UTC).is_err());
        assert!(CronTrigger::new("mon", 0, 60, Tz::UTC).is_err());
        assert!(CronTrigger::new("funday", 1, 0, Tz::UTC).is_err());
        assert!(CronTrigger::new("fri-mon", 1, 0, Tz::UTC).is_err());
        assert!(CronTrigger::new("mon,", 1, 0, Tz::UTC).is_err());
    }

    #[test]
    fn test_date_fires_once_then_exhausted() {
        let trigger = DateTrigger::parse("2026-05-01T06:30:00Z", Tz::UTC).unwrap();
        let at = utc(2026, 5, 1, 6, 30);

        assert_eq!(trigger.next_fire_after(utc(2026, 4, 30, 0, 0)), Some(at));
        assert_eq!(trigger.next_fire_after(at), None);
    }

    #[test]
    fn test_date_naive_formats_use_timezone() {
        let tz = parse_timezone("America/New_York").unwrap();
        let spaced = DateTrigger::parse("2026-07-04 09:00:00", tz).unwrap();
        let iso = DateTrigger::parse("2026-07-04T09:00:00", tz).unwrap();

        // EDT is UTC-4
        assert_eq!(spaced.fire_time(), utc(2026, 7, 4, 13, 0));
        assert_eq!(iso.fire_time(), spaced.fire_time());
    }

    #[test]
    fn test_unparseable_date_rejected() {
        let err = DateTrigger::parse("next tuesday", Tz::UTC).unwrap_err();
        assert!(matches!(err, DomainError::InvalidScheduleSpec(_)));
    }

    #[test]
    fn test_spec_serde_surface() {
        let spec: TriggerSpec = serde_json::from_value(serde_json::json!({
            "type": "cron", "day_of_week": "mon-fri", "hour": 6, "minute": 45
        }))
        .unwrap();
        assert_eq!(spec, TriggerSpec::cron("mon-fri", 6, 45));

        let json = serde_json::to_value(TriggerSpec::interval(30)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "interval", "minutes": 30}));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
    }
}
