//! Status transitions and timestamp bookkeeping.

use chrono::{Local, NaiveDateTime, SubsecRound, TimeDelta, Utc};

use super::{Order, OrderError, OrderStatus};

/// ISO-8601 local date-time, no offset, fixed microsecond precision.
///
/// Fixed width keeps string order identical to chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Parses `target` and moves `order` to that status.
///
/// Fails with `InvalidStatus` for unknown text and `IllegalTransition` when
/// the step is not allowed; the order is returned untouched only on success.
pub fn apply_transition(mut order: Order, target: &str) -> Result<Order, OrderError> {
    let target: OrderStatus = target.parse()?;
    order.transition_to(target)?;
    Ok(order)
}

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    format_timestamp(Local::now().naive_local())
}

/// Current time as epoch milliseconds.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Timestamp for a mutation following one stamped `previous`.
///
/// Always sorts strictly after `previous`: when the clock has not moved past
/// it (same microsecond, or the clock stepped back) the result is
/// `previous` plus one microsecond.
pub fn refreshed_timestamp(previous: &str) -> String {
    refreshed_from(Local::now().naive_local(), previous)
}

fn refreshed_from(now: NaiveDateTime, previous: &str) -> String {
    let now = now.trunc_subsecs(6);
    let next = match previous.parse::<NaiveDateTime>() {
        Ok(prev) if now <= prev => prev.trunc_subsecs(6) + TimeDelta::microseconds(1),
        _ => now,
    };
    format_timestamp(next)
}

fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
