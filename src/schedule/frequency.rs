use chrono::{DateTime, Duration, Months, Utc};
use tracing::error;

use crate::schedule::types::Frequency;

/// Computes the next due timestamp from a frequency rule and a reference
/// time. Pure and deterministic; `None` means the task has no future
/// schedule (manual or one-shot frequencies).
///
/// `MONTHLY` keeps the day-of-month and clamps to the last day when the
/// target month is shorter, so a task anchored on the 31st runs on the 30th
/// (or 28th/29th) where needed. Cron rules yield the first instant strictly
/// after the reference time.
pub fn next_run(frequency: &Frequency, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match frequency {
        Frequency::Manual | Frequency::Once => None,
        Frequency::Daily => Some(reference + Duration::days(1)),
        Frequency::Weekly => Some(reference + Duration::days(7)),
        Frequency::Monthly => reference.checked_add_months(Months::new(1)),
        Frequency::Cron(expr) => match expr.parse::<cron::Schedule>() {
            Ok(schedule) => schedule.after(&reference).next(),
            Err(e) => {
                // expressions are validated when a Frequency is parsed, so
                // this only fires for rows written by external tooling
                error!("Unparsable cron rule '{}': {}", expr, e);
                None
            }
        },
    }
}
