//! Enrollment and arrears rules.
//!
//! A member is enrolled in a year when the year is paid, or when the
//! member is a minor that year and already registered. Arrears follow
//! the amnesty rule: paying the target year forgives every earlier gap.

use std::collections::BTreeSet;

use serde::Serialize;

use tessera_data::Member;

use crate::datetime::age_in_year;

/// Members under this age are exempt from dues.
pub const ADULT_AGE: i32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentStatus {
    pub in_good_standing: bool,
    /// Unpaid, non exempt years in ascending order
    pub arrears: Vec<i32>,
}

impl PaymentStatus {
    fn settled() -> Self {
        Self {
            in_good_standing: true,
            arrears: vec![],
        }
    }
}

/// Is the member exempt from paying dues in the year?
pub fn is_minor_exempt(member: &Member, year: i32) -> bool {
    age_in_year(member.birth_date, year) < ADULT_AGE
}

/// Registration year known and not after the year.
pub fn is_registered_by(member: &Member, year: i32) -> bool {
    matches!(member.first_registration_year, Some(reg) if reg <= year)
}

/// Is the member enrolled (active) in the year?
pub fn is_enrolled(member: &Member, year: i32, paid_years: &BTreeSet<i32>) -> bool {
    if paid_years.contains(&year) {
        return true;
    }
    is_minor_exempt(member, year) && is_registered_by(member, year)
}

/// First year of membership: the registration year, or the earliest
/// paid year when the registration year is unknown.
pub fn effective_start_year(member: &Member, paid_years: &BTreeSet<i32>) -> Option<i32> {
    member
        .first_registration_year
        .or_else(|| paid_years.iter().next().copied())
}

/// Compute the payment status of a member for the target year.
pub fn compute_arrears(
    member: &Member,
    paid_years: &BTreeSet<i32>,
    target_year: i32,
) -> PaymentStatus {
    // Amnesty: a paid target year settles all earlier years.
    if paid_years.contains(&target_year) {
        return PaymentStatus::settled();
    }
    if is_minor_exempt(member, target_year) && is_registered_by(member, target_year) {
        return PaymentStatus::settled();
    }

    // Registering settles the registration year itself; only a
    // registration in the target year is still owed.
    let first_year = match member.first_registration_year {
        Some(reg) if reg < target_year => reg + 1,
        Some(reg) => reg,
        None => paid_years.iter().next().copied().unwrap_or(target_year),
    };

    let arrears: Vec<i32> = (first_year..=target_year)
        .filter(|year| !paid_years.contains(year))
        .filter(|year| !is_minor_exempt(member, *year))
        .collect();

    PaymentStatus {
        in_good_standing: arrears.is_empty(),
        arrears,
    }
}
