
use chrono::{Datelike, NaiveDate};

/// Get the current local date.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Get the current calendar year.
pub fn current_year() -> i32 {
    today().year()
}

/// Age reached during a calendar year. Days and months are
/// irrelevant; an unknown birth date counts as an adult of 99.
pub fn age_in_year(birth_date: Option<NaiveDate>, year: i32) -> i32 {
    match birth_date {
        Some(date) => year - date.year(),
        None => 99,
    }
}
