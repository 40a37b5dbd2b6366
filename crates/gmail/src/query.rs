use chrono::{Datelike, NaiveDate};

use mailbrief_core::{Mode, RunWindow};

use crate::error::MailboxError;

/// Longest historical window accepted, in calendar days.
pub const MAX_HISTORICAL_SPAN_DAYS: i64 = 90;

/// Validate the date bounds of a historical run.
pub fn validate_window(window: &RunWindow, today: NaiveDate) -> Result<(), MailboxError> {
    if window.start > window.end {
        return Err(MailboxError::Validation(
            "start date must not be after end date".into(),
        ));
    }
    if window.end > today {
        return Err(MailboxError::Validation(
            "end date must not be in the future".into(),
        ));
    }
    if window.span_days() > MAX_HISTORICAL_SPAN_DAYS {
        return Err(MailboxError::Validation(format!(
            "date range must not exceed {MAX_HISTORICAL_SPAN_DAYS} days"
        )));
    }
    Ok(())
}

/// Build the mailbox search query for a run.
///
/// Historical windows are inclusive of both bounds; the provider's
/// `before:` operator is exclusive, so the end date is advanced by one day.
pub fn build_query(mode: Mode, window: Option<&RunWindow>) -> Result<String, MailboxError> {
    match mode {
        Mode::Weekly => Ok("in:inbox newer_than:7d".to_owned()),
        Mode::Cleanup => Ok("in:inbox".to_owned()),
        Mode::Historical => {
            let window = window.ok_or_else(|| {
                MailboxError::Validation("historical mode requires start and end dates".into())
            })?;
            let before = window
                .end
                .succ_opt()
                .ok_or_else(|| MailboxError::Validation("end date out of range".into()))?;
            Ok(format!(
                "after:{} before:{}",
                format_date(window.start),
                format_date(before)
            ))
        }
    }
}

/// Render a date as `YYYY/M/D` (no zero padding, the provider's form).
fn format_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.year(), date.month(), date.day())
}
