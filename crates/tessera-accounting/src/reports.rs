//! Reports over a loaded ledger.
//!
//! Every report is a read only projection of a [`Ledger`] through the
//! compliance rules.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use thiserror::Error as ThisError;

use tessera_data::{normalize_group, Member, Payment};

use crate::{
    compliance::{
        compute_arrears,
        effective_start_year,
        is_enrolled,
        PaymentStatus,
        ADULT_AGE,
    },
    datetime::age_in_year,
    Ledger,
};

/// Birthplaces beyond this rank are summed as "Other".
pub const TOP_BIRTHPLACES: usize = 10;

/// Years of payment history shown for voters.
pub const VOTING_HISTORY_YEARS: i32 = 6;

pub const LABEL_OTHER: &str = "Other";
pub const LABEL_UNKNOWN: &str = "Unknown";

#[derive(ThisError, Debug)]
pub enum ReportError {
    #[error("unknown member: {0}")]
    UnknownMember(u32),
    #[error("invalid filter value: {0}")]
    InvalidFilter(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgeCategory {
    #[default]
    All,
    Adult,
    Minor,
}

impl FromStr for AgeCategory {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "adult" | "adults" => Ok(Self::Adult),
            "minor" | "minors" => Ok(Self::Minor),
            _ => Err(ReportError::InvalidFilter(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    InGoodStanding,
    InArrears,
}

impl FromStr for StatusFilter {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "ok" | "good" | "paid" => Ok(Self::InGoodStanding),
            "arrears" | "unpaid" => Ok(Self::InArrears),
            _ => Err(ReportError::InvalidFilter(s.to_string())),
        }
    }
}

/// A member together with the payment status for a year.
#[derive(Debug, Clone, Serialize)]
pub struct MemberStanding {
    pub member: Member,
    pub status: PaymentStatus,
}

/// Members of a group, filtered by age bracket and payment status.
///
/// The age bracket is taken as of `today`, the payment status
/// as of `reference_year`.
pub fn members_by_group(
    ledger: &Ledger,
    group: Option<&str>,
    age_category: AgeCategory,
    status_filter: StatusFilter,
    reference_year: i32,
    today: NaiveDate,
) -> Vec<MemberStanding> {
    let mut rows: Vec<MemberStanding> = ledger
        .members()
        .iter()
        .filter(|m| group.map_or(true, |g| m.group == g))
        .filter(|m| {
            let adult = age_in_year(m.birth_date, today.year()) >= ADULT_AGE;
            match age_category {
                AgeCategory::All => true,
                AgeCategory::Adult => adult,
                AgeCategory::Minor => !adult,
            }
        })
        .map(|m| MemberStanding {
            status: compute_arrears(m, ledger.paid_years(m.id), reference_year),
            member: m.clone(),
        })
        .filter(|row| match status_filter {
            StatusFilter::All => true,
            StatusFilter::InGoodStanding => row.status.in_good_standing,
            StatusFilter::InArrears => !row.status.in_good_standing,
        })
        .collect();

    rows.sort_by(|a, b| {
        (&a.member.group, &a.member.surname, &a.member.given_name).cmp(&(
            &b.member.group,
            &b.member.surname,
            &b.member.given_name,
        ))
    });
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearStats {
    pub year: i32,
    pub total: usize,
    pub new_members: usize,
    pub churned: usize,
}

/// Enrollment trend per year over an inclusive range.
pub fn yearly_stats(ledger: &Ledger, start_year: i32, end_year: i32) -> Vec<YearStats> {
    let members = ledger.members();
    let enrolled = |year: i32| -> Vec<bool> {
        members
            .iter()
            .map(|m| is_enrolled(m, year, ledger.paid_years(m.id)))
            .collect()
    };
    let start_years: Vec<Option<i32>> = members
        .iter()
        .map(|m| effective_start_year(m, ledger.paid_years(m.id)))
        .collect();

    let mut stats = vec![];
    if start_year > end_year {
        return stats;
    }
    let mut previous = enrolled(start_year - 1);
    for year in start_year..=end_year {
        let current = enrolled(year);
        let total = current.iter().filter(|e| **e).count();
        let new_members = start_years.iter().filter(|s| **s == Some(year)).count();
        let churned = previous
            .iter()
            .zip(current.iter())
            .filter(|(was, is)| **was && !**is)
            .count();
        stats.push(YearStats {
            year,
            total,
            new_members,
            churned,
        });
        previous = current;
    }
    stats
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemographicStats {
    pub year: i32,
    pub total: usize,
    pub age_groups: Vec<Bucket>,
    pub birthplaces: Vec<Bucket>,
}

fn age_bucket(birth_date: Option<NaiveDate>, year: i32) -> &'static str {
    let Some(birth_date) = birth_date else {
        return LABEL_UNKNOWN;
    };
    match year - birth_date.year() {
        age if age < 18 => "Under 18",
        18..=35 => "18-35",
        36..=50 => "36-50",
        51..=65 => "51-65",
        _ => "Over 65",
    }
}

const AGE_BUCKETS: [&str; 6] = ["Under 18", "18-35", "36-50", "51-65", "Over 65", LABEL_UNKNOWN];

/// Age and birthplace distribution of the members enrolled in a year.
pub fn demographic_stats(ledger: &Ledger, year: i32) -> DemographicStats {
    let population: Vec<&Member> = ledger
        .members()
        .iter()
        .filter(|m| is_enrolled(m, year, ledger.paid_years(m.id)))
        .collect();

    let mut ages: HashMap<&str, usize> = HashMap::new();
    let mut places: HashMap<String, usize> = HashMap::new();
    for member in &population {
        *ages.entry(age_bucket(member.birth_date, year)).or_default() += 1;

        let place = member
            .birthplace
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| LABEL_UNKNOWN.to_string());
        *places.entry(place).or_default() += 1;
    }

    let age_groups = AGE_BUCKETS
        .iter()
        .map(|label| Bucket {
            label: label.to_string(),
            count: ages.get(label).copied().unwrap_or(0),
        })
        .collect();

    let mut ranked: Vec<Bucket> = places
        .into_iter()
        .map(|(label, count)| Bucket { label, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    let mut birthplaces: Vec<Bucket> = ranked.iter().take(TOP_BIRTHPLACES).cloned().collect();
    let other: usize = ranked.iter().skip(TOP_BIRTHPLACES).map(|b| b.count).sum();
    if other > 0 {
        birthplaces.push(Bucket {
            label: LABEL_OTHER.to_string(),
            count: other,
        });
    }

    DemographicStats {
        year,
        total: population.len(),
        age_groups,
        birthplaces,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EconomicStats {
    pub year: i32,
    pub total_revenue: f64,
    pub payment_count: usize,
    pub average_amount: f64,
    /// Revenue per normalized group, highest first
    pub revenue_by_group: Vec<(String, f64)>,
}

/// Revenue figures over the payments of a year.
pub fn economic_stats(ledger: &Ledger, year: i32) -> EconomicStats {
    let groups: HashMap<u32, String> = ledger
        .members()
        .iter()
        .map(|m| (m.id, m.normalized_group()))
        .collect();

    let mut total_revenue = 0.0;
    let mut payment_count = 0;
    let mut by_group: HashMap<String, f64> = HashMap::new();
    for payment in ledger.payments_in_year(year) {
        total_revenue += payment.amount;
        payment_count += 1;
        let group = groups
            .get(&payment.member_id)
            .cloned()
            .unwrap_or_else(|| normalize_group(""));
        *by_group.entry(group).or_default() += payment.amount;
    }

    let average_amount = if payment_count > 0 {
        total_revenue / payment_count as f64
    } else {
        0.0
    };
    let mut revenue_by_group: Vec<(String, f64)> = by_group.into_iter().collect();
    revenue_by_group.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    EconomicStats {
        year,
        total_revenue,
        payment_count,
        average_amount,
        revenue_by_group,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Voter {
    pub member: Member,
    /// (year, paid) for the years leading up to the vote
    pub history: Vec<(i32, bool)>,
}

/// Members entitled to vote in the target year: paid the previous
/// year and of age. An unknown birth date counts as of age.
pub fn voting_eligible_members(ledger: &Ledger, target_year: i32) -> Vec<Voter> {
    let window = (target_year - VOTING_HISTORY_YEARS + 1)..=target_year;
    let mut voters: Vec<Voter> = ledger
        .members()
        .iter()
        .filter(|m| ledger.has_paid(m.id, target_year - 1))
        .filter(|m| {
            m.birth_year()
                .map_or(true, |year| year <= target_year - ADULT_AGE)
        })
        .map(|m| Voter {
            member: m.clone(),
            history: window
                .clone()
                .map(|year| (year, ledger.has_paid(m.id, year)))
                .collect(),
        })
        .collect();
    voters.sort_by(|a, b| {
        (&a.member.surname, &a.member.given_name).cmp(&(&b.member.surname, &b.member.given_name))
    });
    voters
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub group: String,
    pub count: usize,
}

/// Headcount of enrolled members per normalized group,
/// largest group first.
pub fn group_counts_for_year(ledger: &Ledger, year: i32) -> Vec<GroupCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for member in ledger.members() {
        if is_enrolled(member, year, ledger.paid_years(member.id)) {
            *counts.entry(member.normalized_group()).or_default() += 1;
        }
    }
    let mut counts: Vec<GroupCount> = counts
        .into_iter()
        .map(|(group, count)| GroupCount { group, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.group.cmp(&b.group)));
    counts
}

/// Members who paid the previous year but not this one.
pub fn churn_list(ledger: &Ledger, year: i32) -> Vec<Member> {
    ledger
        .members()
        .iter()
        .filter(|m| ledger.has_paid(m.id, year - 1) && !ledger.has_paid(m.id, year))
        .cloned()
        .collect()
}

/// Everything known about a single member for a year.
#[derive(Debug, Clone, Serialize)]
pub struct MemberStatus {
    pub member: Member,
    /// Latest year first
    pub payments: Vec<Payment>,
    pub enrolled: bool,
    pub status: PaymentStatus,
}

pub fn member_status(
    ledger: &Ledger,
    member_id: u32,
    target_year: i32,
) -> Result<MemberStatus, ReportError> {
    let member = ledger
        .member(member_id)
        .ok_or(ReportError::UnknownMember(member_id))?;
    let paid = ledger.paid_years(member_id);
    let mut payments: Vec<Payment> = ledger.payments_of(member_id).cloned().collect();
    payments.sort_by(|a, b| b.year.cmp(&a.year));

    Ok(MemberStatus {
        member: member.clone(),
        payments,
        enrolled: is_enrolled(member, target_year, paid),
        status: compute_arrears(member, paid, target_year),
    })
}

/// Group names in use merged with the configured custom groups.
pub fn group_names(ledger: &Ledger, custom_groups: &[String]) -> Vec<String> {
    let names: BTreeSet<String> = ledger
        .members()
        .iter()
        .map(|m| m.group.as_str())
        .chain(custom_groups.iter().map(String::as_str))
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect();
    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn member(id: u32, surname: &str, group: &str, birth_year: Option<i32>) -> Member {
        Member {
            id,
            surname: surname.to_string(),
            group: group.to_string(),
            birth_date: birth_year.map(|y| date(y, 6, 1)),
            ..Default::default()
        }
    }

    fn payment(member_id: u32, year: i32, amount: f64) -> Payment {
        Payment {
            payment_id: format!("{}-{}", member_id, year),
            member_id,
            year,
            amount,
            ..Default::default()
        }
    }

    #[test]
    fn test_group_counts_normalize_names() {
        let ledger = Ledger::new(
            vec![
                member(1, "A", "alfa", Some(1980)),
                member(2, "B", "Alfa ", Some(1980)),
                member(3, "C", "ALFA", Some(1980)),
                member(4, "D", "beta", Some(1980)),
                member(5, "E", "", Some(1980)),
            ],
            vec![
                payment(1, 2023, 20.0),
                payment(2, 2023, 20.0),
                payment(3, 2023, 20.0),
                payment(4, 2023, 20.0),
                payment(5, 2023, 20.0),
            ],
        );
        let counts = group_counts_for_year(&ledger, 2023);
        assert_eq!(
            counts,
            vec![
                GroupCount {
                    group: "ALFA".to_string(),
                    count: 3
                },
                GroupCount {
                    group: "BETA".to_string(),
                    count: 1
                },
                GroupCount {
                    group: "Unassigned".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_group_counts_include_registered_minors() {
        let mut minor = member(1, "Minor", "alfa", Some(2015));
        minor.first_registration_year = Some(2020);
        let unregistered = member(2, "Minor", "alfa", Some(2015));
        let ledger = Ledger::new(vec![minor, unregistered], vec![]);

        let counts = group_counts_for_year(&ledger, 2023);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].count, 1);
    }

    #[test]
    fn test_members_by_group_filters() {
        let mut minor = member(3, "Verdi", "alfa", Some(2015));
        minor.first_registration_year = Some(2020);
        let ledger = Ledger::new(
            vec![
                member(1, "Rossi", "alfa", Some(1980)),
                member(2, "Bianchi", "alfa", Some(1970)),
                minor,
                member(4, "Neri", "beta", None),
            ],
            vec![payment(1, 2024, 20.0), payment(4, 2024, 20.0)],
        );
        let today = date(2024, 10, 1);

        let rows = members_by_group(
            &ledger,
            Some("alfa"),
            AgeCategory::All,
            StatusFilter::All,
            2024,
            today,
        );
        let names: Vec<&str> = rows.iter().map(|r| r.member.surname.as_str()).collect();
        assert_eq!(names, vec!["Bianchi", "Rossi", "Verdi"]);

        let rows = members_by_group(
            &ledger,
            None,
            AgeCategory::Adult,
            StatusFilter::InGoodStanding,
            2024,
            today,
        );
        let names: Vec<&str> = rows.iter().map(|r| r.member.surname.as_str()).collect();
        assert_eq!(names, vec!["Rossi", "Neri"]);

        let rows = members_by_group(
            &ledger,
            None,
            AgeCategory::Minor,
            StatusFilter::All,
            2024,
            today,
        );
        assert_eq!(rows.len(), 1);
        assert!(rows[0].status.in_good_standing);

        let rows = members_by_group(
            &ledger,
            None,
            AgeCategory::All,
            StatusFilter::InArrears,
            2024,
            today,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].member.surname, "Bianchi");
    }

    #[test]
    fn test_age_bracket_uses_today() {
        // A minor in 2024 is an adult today
        let ledger = Ledger::new(vec![member(1, "Rossi", "alfa", Some(2007))], vec![]);
        let rows = members_by_group(
            &ledger,
            None,
            AgeCategory::Adult,
            StatusFilter::All,
            2020,
            date(2026, 1, 1),
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_yearly_stats() {
        let mut late = member(2, "Bianchi", "", Some(1980));
        late.first_registration_year = Some(2022);
        let ledger = Ledger::new(
            vec![member(1, "Rossi", "", Some(1980)), late],
            vec![
                payment(1, 2021, 20.0),
                payment(1, 2022, 20.0),
                payment(2, 2022, 20.0),
                payment(2, 2023, 20.0),
            ],
        );
        let stats = yearly_stats(&ledger, 2021, 2023);
        assert_eq!(
            stats,
            vec![
                YearStats {
                    year: 2021,
                    total: 1,
                    new_members: 1,
                    churned: 0
                },
                YearStats {
                    year: 2022,
                    total: 2,
                    new_members: 1,
                    churned: 0
                },
                YearStats {
                    year: 2023,
                    total: 1,
                    new_members: 0,
                    churned: 1
                },
            ]
        );
        assert!(yearly_stats(&ledger, 2024, 2023).is_empty());
    }

    #[test]
    fn test_demographic_stats() {
        let mut members = vec![];
        let mut payments = vec![];
        // Twelve birthplaces, the last two with one member each
        for i in 0..12u32 {
            for j in 0..(if i < 10 { 2 } else { 1 }) {
                let id = i * 10 + j + 1;
                let mut m = member(id, "X", "", Some(1990));
                m.birthplace = Some(format!(" place{:02} ", i));
                members.push(m);
                payments.push(payment(id, 2024, 10.0));
            }
        }
        let mut unknown = member(500, "Y", "", None);
        unknown.birthplace = Some("  ".to_string());
        members.push(unknown);
        payments.push(payment(500, 2024, 10.0));
        // Not enrolled
        members.push(member(501, "Z", "", Some(1950)));

        let ledger = Ledger::new(members, payments);
        let stats = demographic_stats(&ledger, 2024);
        assert_eq!(stats.total, 23);

        let ages: Vec<(&str, usize)> = stats
            .age_groups
            .iter()
            .map(|b| (b.label.as_str(), b.count))
            .collect();
        assert_eq!(
            ages,
            vec![
                ("Under 18", 0),
                ("18-35", 22),
                ("36-50", 0),
                ("51-65", 0),
                ("Over 65", 0),
                ("Unknown", 1)
            ]
        );

        assert_eq!(stats.birthplaces.len(), TOP_BIRTHPLACES + 1);
        assert_eq!(stats.birthplaces[0].label, "PLACE00");
        let other = stats.birthplaces.last().unwrap();
        assert_eq!(other.label, LABEL_OTHER);
        assert_eq!(other.count, 3);
        let total: usize = stats.birthplaces.iter().map(|b| b.count).sum();
        assert_eq!(total, 23);
    }

    #[test]
    fn test_economic_stats() {
        let ledger = Ledger::new(
            vec![
                member(1, "Rossi", "alfa", None),
                member(2, "Bianchi", "Alfa", None),
                member(3, "Verdi", "beta", None),
            ],
            vec![
                payment(1, 2024, 20.0),
                payment(2, 2024, 30.0),
                payment(3, 2024, 10.0),
                payment(3, 2023, 99.0),
            ],
        );
        let stats = economic_stats(&ledger, 2024);
        assert_eq!(stats.payment_count, 3);
        assert_eq!(stats.total_revenue, 60.0);
        assert_eq!(stats.average_amount, 20.0);
        assert_eq!(
            stats.revenue_by_group,
            vec![("ALFA".to_string(), 50.0), ("BETA".to_string(), 10.0)]
        );

        let empty = economic_stats(&ledger, 2000);
        assert_eq!(empty.payment_count, 0);
        assert_eq!(empty.average_amount, 0.0);
    }

    #[test]
    fn test_voting_eligible_members() {
        let ledger = Ledger::new(
            vec![
                member(1, "Rossi", "", Some(1980)),
                member(2, "Bianchi", "", None),
                // Of age only in 2025
                member(3, "Verdi", "", Some(2007)),
                // Did not pay the previous year
                member(4, "Neri", "", Some(1980)),
            ],
            vec![
                payment(1, 2019, 20.0),
                payment(1, 2023, 20.0),
                payment(2, 2023, 20.0),
                payment(3, 2023, 20.0),
                payment(4, 2024, 20.0),
            ],
        );
        let voters = voting_eligible_members(&ledger, 2024);
        let names: Vec<&str> = voters.iter().map(|v| v.member.surname.as_str()).collect();
        assert_eq!(names, vec!["Bianchi", "Rossi"]);
        assert_eq!(
            voters[1].history,
            vec![
                (2019, true),
                (2020, false),
                (2021, false),
                (2022, false),
                (2023, true),
                (2024, false)
            ]
        );
    }

    #[test]
    fn test_churn_list() {
        let ledger = Ledger::new(
            vec![
                member(1, "Rossi", "", None),
                member(2, "Bianchi", "", None),
            ],
            vec![
                payment(1, 2023, 20.0),
                payment(1, 2024, 20.0),
                payment(2, 2023, 20.0),
            ],
        );
        let churned = churn_list(&ledger, 2024);
        assert_eq!(churned.len(), 1);
        assert_eq!(churned[0].id, 2);
    }

    #[test]
    fn test_member_status() {
        let mut m = member(1, "Rossi", "", Some(1980));
        m.first_registration_year = Some(2020);
        let ledger = Ledger::new(
            vec![m],
            vec![payment(1, 2021, 20.0), payment(1, 2023, 20.0)],
        );
        let status = member_status(&ledger, 1, 2024).unwrap();
        assert_eq!(status.payments[0].year, 2023);
        assert!(!status.enrolled);
        assert_eq!(status.status.arrears, vec![2022, 2024]);

        assert!(matches!(
            member_status(&ledger, 7, 2024),
            Err(ReportError::UnknownMember(7))
        ));
    }

    #[test]
    fn test_group_names() {
        let ledger = Ledger::new(
            vec![
                member(1, "A", " Alfa", None),
                member(2, "B", "", None),
                member(3, "C", "Beta", None),
            ],
            vec![],
        );
        let names = group_names(&ledger, &["Gamma".to_string(), "Alfa".to_string()]);
        assert_eq!(names, vec!["Alfa", "Beta", "Gamma"]);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("Adults".parse::<AgeCategory>().unwrap(), AgeCategory::Adult);
        assert_eq!("arrears".parse::<StatusFilter>().unwrap(), StatusFilter::InArrears);
        assert!("teen".parse::<AgeCategory>().is_err());
    }
}
