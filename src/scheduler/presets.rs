//! Named schedule presets → canonical cron string (§4.E).
//!
//! The CRUD surface that lets an end user pick a preset by name is out of scope, but the
//! translation itself is core logic: a [`crate::domain::ScheduledJob`] only ever stores a cron
//! expression, so whatever created it — preset or raw cron — must resolve to one before the
//! scheduler sees it.

/// Resolve a named preset to its canonical `cron` crate syntax (six fields: `sec min hour dom
/// month dow`), or `None` if `name` isn't a recognized preset — callers should treat that as "this
/// is already a raw cron expression, pass it through unchanged".
pub fn resolve(name: &str) -> Option<&'static str> {
    match name {
        "every_weekday_9am" => Some("0 0 9 * * Mon,Tue,Wed,Thu,Fri"),
        "every_weekday_6pm" => Some("0 0 18 * * Mon,Tue,Wed,Thu,Fri"),
        "hourly" => Some("0 0 * * * *"),
        "daily_midnight" => Some("0 0 0 * * *"),
        "first_of_month" => Some("0 0 9 1 * *"),
        "every_monday_9am" => Some("0 0 9 * * Mon"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_preset() {
        assert_eq!(resolve("every_weekday_9am"), Some("0 0 9 * * Mon,Tue,Wed,Thu,Fri"));
    }

    #[test]
    fn unknown_name_passes_through_as_none() {
        assert_eq!(resolve("0 9 * * 1-5"), None);
    }
}
