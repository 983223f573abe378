use chrono::NaiveDateTime;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

const UNITS: [(i64, &str); 7] = [
    (YEAR, "year"),
    (MONTH, "month"),
    (WEEK, "week"),
    (DAY, "day"),
    (HOUR, "hour"),
    (MINUTE, "minute"),
    (1, "second"),
];

/// Renders the distance from `then` to `now` as e.g. `"3 hours ago"`, or `"now"` when under a
/// second (or when `then` is in the future).
pub fn relative_time(then: NaiveDateTime, now: NaiveDateTime) -> String {
    let elapsed = now.signed_duration_since(then).num_seconds();

    for (size, unit) in UNITS {
        if elapsed >= size {
            let count = elapsed / size;
            let plural = if count == 1 { "" } else { "s" };
            return format!("{count} {unit}{plural} ago");
        }
    }

    String::from("now")
}
