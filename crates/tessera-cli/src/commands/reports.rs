use anyhow::Result;
use clap::{Args, Subcommand};

use tessera_accounting::{
    datetime,
    reports::{self, AgeCategory, StatusFilter},
    Ledger,
};
use tessera_data::{
    check_year,
    parse_year,
    SettingValue,
    SETTING_CUSTOM_GROUPS,
    SETTING_MINORS_REFERENCE_YEAR,
};
use tessera_db::Connection;

use crate::formatting::PrintFormatted;

#[derive(Subcommand, Debug)]
pub enum Reports {
    /// Members of a group by age and payment status
    #[clap(name = "group")]
    Group(GroupReport),
    /// Enrollment per year
    #[clap(name = "yearly")]
    Yearly(YearlyReport),
    /// Age and birthplace of enrolled members
    #[clap(name = "demographics")]
    Demographics(YearArg),
    /// Revenue of a year
    #[clap(name = "economics")]
    Economics(YearArg),
    /// Members entitled to vote
    #[clap(name = "voters")]
    Voters(YearArg),
    /// Headcount per group
    #[clap(name = "groups")]
    Groups(YearArg),
    /// Members who did not renew
    #[clap(name = "churn")]
    Churn(YearArg),
    /// Group names in use and configured
    #[clap(name = "group-names")]
    GroupNames,
}

impl Reports {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let ledger = Ledger::load(db).await?;
        match self {
            Reports::Group(cmd) => cmd.run(db, &ledger).await?,
            Reports::Yearly(cmd) => {
                let end = cmd.to.unwrap_or_else(datetime::current_year);
                reports::yearly_stats(&ledger, cmd.from, end).print_formatted();
            }
            Reports::Demographics(arg) => {
                reports::demographic_stats(&ledger, arg.year()).print_formatted();
            }
            Reports::Economics(arg) => {
                reports::economic_stats(&ledger, arg.year()).print_formatted();
            }
            Reports::Voters(arg) => {
                let voters = reports::voting_eligible_members(&ledger, arg.year());
                println!("{} voters.", voters.len());
                voters.print_formatted();
            }
            Reports::Groups(arg) => {
                reports::group_counts_for_year(&ledger, arg.year()).print_formatted();
            }
            Reports::Churn(arg) => {
                let members = reports::churn_list(&ledger, arg.year());
                println!("{} members did not renew.", members.len());
                members.print_formatted();
            }
            Reports::GroupNames => {
                let custom = db
                    .get_setting(SETTING_CUSTOM_GROUPS, SettingValue::List(vec![]))
                    .await?;
                for name in reports::group_names(&ledger, &custom.as_string_list()) {
                    println!("{}", name);
                }
            }
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct YearArg {
    /// Defaults to the current year
    #[clap(short, long, value_parser = parse_year)]
    pub year: Option<i32>,
}

impl YearArg {
    fn year(&self) -> i32 {
        self.year.unwrap_or_else(datetime::current_year)
    }
}

#[derive(Args, Debug)]
pub struct YearlyReport {
    #[clap(short, long, value_parser = parse_year)]
    pub from: i32,
    /// Defaults to the current year
    #[clap(short, long, value_parser = parse_year)]
    pub to: Option<i32>,
}

#[derive(Args, Debug)]
pub struct GroupReport {
    /// Exact group name, all groups when omitted
    #[clap(short, long)]
    pub group: Option<String>,
    /// all, adult or minor
    #[clap(short, long, default_value = "all")]
    pub age: AgeCategory,
    /// all, ok or arrears
    #[clap(short, long, default_value = "all")]
    pub status: StatusFilter,
    /// Reference year for the payment status
    #[clap(short, long, value_parser = parse_year)]
    pub year: Option<i32>,
}

impl GroupReport {
    pub async fn run(self, db: &Connection, ledger: &Ledger) -> Result<()> {
        // Minor lists default to the configured reference year
        let year = match (self.year, self.age) {
            (Some(year), _) => year,
            (None, AgeCategory::Minor) => db
                .get_setting(SETTING_MINORS_REFERENCE_YEAR, SettingValue::Text(String::new()))
                .await?
                .as_i64()
                .and_then(|year| i32::try_from(year).ok())
                .and_then(|year| check_year(year).ok())
                .unwrap_or_else(datetime::current_year),
            (None, _) => datetime::current_year(),
        };

        let rows = reports::members_by_group(
            ledger,
            self.group.as_deref(),
            self.age,
            self.status,
            year,
            datetime::today(),
        );
        println!("{} members, payment status as of {}.", rows.len(), year);
        rows.print_formatted();
        Ok(())
    }
}
