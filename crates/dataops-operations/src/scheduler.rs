//! Cron scheduling
//!
//! Jobs carry standard 5-field cron expressions evaluated in the job's
//! IANA timezone; computed occurrences are normalized to UTC for
//! storage and comparison.
//!
//! The `cron` crate wants a seconds field and counts weekdays in
//! Quartz style, so expressions are normalized before parsing: a
//! leading `0` seconds field is prepended and numeric day-of-week
//! tokens are rewritten to day names (`0`/`7` → `SUN`).

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

use crate::error::{JobError, JobResult};
use crate::model::ScheduledJob;

/// Named shortcuts for common schedules.
const PRESETS: &[(&str, &str)] = &[
    ("hourly", "0 * * * *"),
    ("daily", "0 0 * * *"),
    ("daily_2am", "0 2 * * *"),
    ("weekly", "0 0 * * 0"),
    ("weekly_monday", "0 0 * * 1"),
    ("monthly", "0 0 1 * *"),
    ("every_5_minutes", "*/5 * * * *"),
    ("every_15_minutes", "*/15 * * * *"),
    ("every_30_minutes", "*/30 * * * *"),
];

/// Look up a preset schedule by name.
#[must_use]
pub fn preset_expression(name: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, expr)| *expr)
}

/// All preset names.
#[must_use]
pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|(name, _)| *name).collect()
}

/// Check that an expression is a valid 5-field cron expression.
pub fn validate_cron_expression(expression: &str) -> JobResult<()> {
    parse_schedule(expression).map(|_| ())
}

/// Check that a timezone name exists in the tz database.
pub fn validate_timezone(timezone: &str) -> JobResult<Tz> {
    timezone.parse::<Tz>().map_err(|_| JobError::InvalidTimezone {
        timezone: timezone.to_string(),
    })
}

/// Next occurrence after `base`, evaluated in `timezone`, as UTC.
///
/// Returns None when the schedule has no future occurrence.
pub fn calculate_next_run(
    expression: &str,
    timezone: &str,
    base: DateTime<Utc>,
) -> JobResult<Option<DateTime<Utc>>> {
    let tz = validate_timezone(timezone)?;
    let schedule = parse_schedule(expression)?;

    let local_base = base.with_timezone(&tz);
    Ok(schedule
        .after(&local_base)
        .next()
        .map(|t| t.with_timezone(&Utc)))
}

/// Next `n` occurrences after `base`, as UTC.
pub fn calculate_next_n_runs(
    expression: &str,
    timezone: &str,
    base: DateTime<Utc>,
    n: usize,
) -> JobResult<Vec<DateTime<Utc>>> {
    let tz = validate_timezone(timezone)?;
    let schedule = parse_schedule(expression)?;

    let local_base = base.with_timezone(&tz);
    Ok(schedule
        .after(&local_base)
        .take(n)
        .map(|t| t.with_timezone(&Utc))
        .collect())
}

/// Whether a job's scheduled run is due.
#[must_use]
pub fn is_due(job: &ScheduledJob, now: DateTime<Utc>) -> bool {
    job.is_active && job.next_run_at.is_some_and(|next| next <= now)
}

/// Compute the job's next run after `now`.
///
/// None when the job has no cron expression (manual-only jobs).
pub fn next_run_for(job: &ScheduledJob, now: DateTime<Utc>) -> JobResult<Option<DateTime<Utc>>> {
    match job.cron_expression.as_deref() {
        Some(expression) => calculate_next_run(expression, &job.timezone, now),
        None => Ok(None),
    }
}

fn parse_schedule(expression: &str) -> JobResult<Schedule> {
    let normalized = normalize_expression(expression)?;
    Schedule::from_str(&normalized).map_err(|e| JobError::InvalidCronExpression {
        expression: expression.to_string(),
        message: e.to_string(),
    })
}

/// Rewrite a standard 5-field expression into the 6-field form the
/// parser wants, mapping numeric weekdays to names.
fn normalize_expression(expression: &str) -> JobResult<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(JobError::InvalidCronExpression {
            expression: expression.to_string(),
            message: format!("expected 5 fields, found {}", fields.len()),
        });
    }

    let dow = map_day_of_week_field(fields[4]);
    Ok(format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], dow
    ))
}

fn map_day_of_week_field(field: &str) -> String {
    field
        .split(',')
        .map(map_day_of_week_token)
        .collect::<Vec<_>>()
        .join(",")
}

/// Map one comma-separated token. Step values after `/` are counts,
/// not weekdays, and must stay numeric.
fn map_day_of_week_token(token: &str) -> String {
    match token.split_once('/') {
        Some((base, step)) => format!("{}/{}", map_day_of_week_range(base), step),
        None => map_day_of_week_range(token),
    }
}

fn map_day_of_week_range(part: &str) -> String {
    match part.split_once('-') {
        Some((start, end)) => format!("{}-{}", map_day_digit(start), map_day_digit(end)),
        None => map_day_digit(part).to_string(),
    }
}

fn map_day_digit(token: &str) -> &str {
    match token {
        "0" | "7" => "SUN",
        "1" => "MON",
        "2" => "TUE",
        "3" => "WED",
        "4" => "THU",
        "5" => "FRI",
        "6" => "SAT",
        other => other,
    }
}
