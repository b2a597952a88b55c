//! Session week arithmetic. Sessions are played on Wednesdays; dates are UTC.

use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

const SESSION_WEEKDAY: u8 = 3; // Wednesday, counting from Sunday = 0

/// The Wednesday invitations are for. On a Wednesday this is the following week.
pub fn next_session_date(today: Date) -> Date {
    let day = today.weekday().number_days_from_sunday();
    let ahead = match (SESSION_WEEKDAY + 7 - day) % 7 {
        0 => 7,
        n => n,
    };
    today + Duration::days(ahead as i64)
}

/// The most recent Wednesday, today included. Used when resetting responses.
pub fn current_session_date(today: Date) -> Date {
    let day = today.weekday().number_days_from_sunday();
    let back = (day + 7 - SESSION_WEEKDAY) % 7;
    today - Duration::days(back as i64)
}

pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// `Wednesday, June 4, 2025`
pub fn format_session_date(date: Date) -> String {
    let format = format_description!("[weekday], [month repr:long] [day padding:none], [year]");
    date.format(format).unwrap_or_else(|_| date.to_string())
}

/// Parses an ISO `YYYY-MM-DD` date.
pub fn parse_week(raw: &str) -> Option<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()
}
