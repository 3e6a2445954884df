use tessera_accounting::{
    datetime,
    reports::{
        DemographicStats,
        EconomicStats,
        GroupCount,
        MemberStanding,
        MemberStatus,
        Voter,
        YearStats,
    },
};
use tessera_backup::BackupStatus;
use tessera_data::{ChangeLogEntry, Member, Payment, Setting};

macro_rules! next_attr {
    ($old:ident, $new:ident) => {
        if $old != $new {
            format!(" -> {}", $new)
        } else {
            "".to_string()
        }
    };
    ($old:ident, $new:ident, $attr:ident) => {
        if $old.$attr != $new.$attr {
            format!(" -> {}", $new.$attr)
        } else {
            "".to_string()
        }
    };
}

fn or_none<T: ToString>(value: &Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "None".to_string(),
    }
}

fn years(years: &[i32]) -> String {
    years
        .iter()
        .map(|y| y.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub trait PrintFormatted {
    fn print_formatted(&self);
}

impl PrintFormatted for Member {
    fn print_formatted(&self) {
        println!("ID:\t\t\t{}", self.id);
        println!("Surname:\t\t{}", self.surname);
        println!("Given name:\t\t{}", self.given_name);
        println!("Birth date:\t\t{}", or_none(&self.birth_date));
        println!("Birthplace:\t\t{}", or_none(&self.birthplace));
        println!("Group:\t\t\t{}", self.group);
        println!("Registered:\t\t{}", or_none(&self.first_registration_year));
        println!("Notes:\t\t\t{}", self.notes);
    }
}

impl PrintFormatted for (Member, Member) {
    fn print_formatted(&self) {
        let (old, new) = self;
        let birth_date_old = or_none(&old.birth_date);
        let birth_date_new = or_none(&new.birth_date);
        let birthplace_old = or_none(&old.birthplace);
        let birthplace_new = or_none(&new.birthplace);
        let registered_old = or_none(&old.first_registration_year);
        let registered_new = or_none(&new.first_registration_year);

        println!("ID:\t\t\t{}", old.id);
        let next_surname = next_attr!(old, new, surname);
        println!("Surname:\t\t{}{}", old.surname, next_surname);
        let next_given_name = next_attr!(old, new, given_name);
        println!("Given name:\t\t{}{}", old.given_name, next_given_name);
        let next_birth_date = next_attr!(birth_date_old, birth_date_new);
        println!("Birth date:\t\t{}{}", birth_date_old, next_birth_date);
        let next_birthplace = next_attr!(birthplace_old, birthplace_new);
        println!("Birthplace:\t\t{}{}", birthplace_old, next_birthplace);
        let next_group = next_attr!(old, new, group);
        println!("Group:\t\t\t{}{}", old.group, next_group);
        let next_registered = next_attr!(registered_old, registered_new);
        println!("Registered:\t\t{}{}", registered_old, next_registered);
        let next_notes = next_attr!(old, new, notes);
        println!("Notes:\t\t\t{}{}", old.notes, next_notes);
    }
}

impl PrintFormatted for Vec<Member> {
    fn print_formatted(&self) {
        let year = datetime::current_year();
        println!(
            "{:>5}\t{:<24}\t{:<20}\t{:<10}\t{:<16}\t{:>4}\t{:>3}",
            "ID", "Surname", "Given name", "Born", "Group", "Reg", "Age"
        );
        println!("{:-<120}", "-");
        for member in self {
            let age = match member.birth_date {
                Some(_) => datetime::age_in_year(member.birth_date, year).to_string(),
                None => "".to_string(),
            };
            println!(
                "{:>5}\t{:<24}\t{:<20}\t{:<10}\t{:<16}\t{:>4}\t{:>3}",
                member.id,
                member.surname,
                member.given_name,
                member.birth_date.map(|d| d.to_string()).unwrap_or_default(),
                member.group,
                member
                    .first_registration_year
                    .map(|y| y.to_string())
                    .unwrap_or_default(),
                age,
            );
        }
    }
}

impl PrintFormatted for Payment {
    fn print_formatted(&self) {
        if !self.payment_id.is_empty() {
            println!("Payment:\t\t{}", self.payment_id);
        }
        println!("Member ID:\t\t{}", self.member_id);
        println!("Year:\t\t\t{}", self.year);
        println!("Date:\t\t\t{}", or_none(&self.payment_date));
        println!("Amount:\t\t\t{:.2}", self.amount);
        println!("Receipt:\t\t{}", self.receipt_no);
        println!("Booklet:\t\t{}", self.booklet_no);
    }
}

impl PrintFormatted for Vec<Payment> {
    fn print_formatted(&self) {
        println!(
            "{:<36}\t{:>5}\t{:>4}\t{:<10}\t{:>8}\t{:>7}\t{:>7}",
            "Payment", "Member", "Year", "Date", "Amount", "Receipt", "Booklet"
        );
        println!("{:-<120}", "-");
        for p in self {
            println!(
                "{:<36}\t{:>5}\t{:>4}\t{:<10}\t{:>8.2}\t{:>7}\t{:>7}",
                p.payment_id,
                p.member_id,
                p.year,
                p.payment_date.map(|d| d.to_string()).unwrap_or_default(),
                p.amount,
                p.receipt_no,
                p.booklet_no,
            );
        }
    }
}

impl PrintFormatted for Setting {
    fn print_formatted(&self) {
        let value = self.value.encode().unwrap_or_default();
        println!("{:<24}\t{}\t({})", self.key, value, self.updated_at);
    }
}

impl PrintFormatted for Vec<Setting> {
    fn print_formatted(&self) {
        for setting in self {
            setting.print_formatted();
        }
    }
}

impl PrintFormatted for Vec<ChangeLogEntry> {
    fn print_formatted(&self) {
        println!(
            "{:>6}\t{:<25}\t{:<10}\t{:<40}\t{}",
            "ID", "Time", "Table", "Record", "Change"
        );
        println!("{:-<120}", "-");
        for entry in self {
            println!(
                "{:>6}\t{:<25}\t{:<10}\t{:<40}\t{}",
                entry.id,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.table,
                entry.record_id,
                entry.change_type,
            );
        }
    }
}

impl PrintFormatted for MemberStatus {
    fn print_formatted(&self) {
        self.member.print_formatted();
        println!();
        println!("Enrolled:\t\t{}", if self.enrolled { "yes" } else { "no" });
        if self.status.in_good_standing {
            println!("Status:\t\t\tin good standing");
        } else {
            println!("Status:\t\t\tin arrears");
            println!("Arrears:\t\t{}", years(&self.status.arrears));
        }
        println!();
        self.payments.print_formatted();
    }
}

impl PrintFormatted for Vec<MemberStanding> {
    fn print_formatted(&self) {
        println!(
            "{:<16}\t{:>5}\t{:<24}\t{:<20}\t{:<10}\t{}",
            "Group", "ID", "Surname", "Given name", "Status", "Arrears"
        );
        println!("{:-<120}", "-");
        for row in self {
            let status = if row.status.in_good_standing {
                "ok"
            } else {
                "arrears"
            };
            println!(
                "{:<16}\t{:>5}\t{:<24}\t{:<20}\t{:<10}\t{}",
                row.member.group,
                row.member.id,
                row.member.surname,
                row.member.given_name,
                status,
                years(&row.status.arrears),
            );
        }
    }
}

impl PrintFormatted for Vec<YearStats> {
    fn print_formatted(&self) {
        println!("{:>4}\t{:>8}\t{:>8}\t{:>8}", "Year", "Enrolled", "New", "Churned");
        println!("{:-<48}", "-");
        for stats in self {
            println!(
                "{:>4}\t{:>8}\t{:>8}\t{:>8}",
                stats.year, stats.total, stats.new_members, stats.churned
            );
        }
    }
}

impl PrintFormatted for DemographicStats {
    fn print_formatted(&self) {
        println!("Enrolled in {}:\t{}", self.year, self.total);
        println!();
        println!("{:<24}\t{:>6}", "Age", "Count");
        println!("{:-<40}", "-");
        for bucket in &self.age_groups {
            println!("{:<24}\t{:>6}", bucket.label, bucket.count);
        }
        println!();
        println!("{:<24}\t{:>6}", "Birthplace", "Count");
        println!("{:-<40}", "-");
        for bucket in &self.birthplaces {
            println!("{:<24}\t{:>6}", bucket.label, bucket.count);
        }
    }
}

impl PrintFormatted for EconomicStats {
    fn print_formatted(&self) {
        println!("Year:\t\t\t{}", self.year);
        println!("Payments:\t\t{}", self.payment_count);
        println!("Revenue:\t\t{:.2}", self.total_revenue);
        println!("Average:\t\t{:.2}", self.average_amount);
        println!();
        println!("{:<24}\t{:>10}", "Group", "Revenue");
        println!("{:-<40}", "-");
        for (group, revenue) in &self.revenue_by_group {
            println!("{:<24}\t{:>10.2}", group, revenue);
        }
    }
}

impl PrintFormatted for Vec<Voter> {
    fn print_formatted(&self) {
        let header: Vec<String> = self
            .first()
            .map(|v| v.history.iter().map(|(year, _)| year.to_string()).collect())
            .unwrap_or_default();
        println!(
            "{:>5}\t{:<24}\t{:<20}\t{}",
            "ID",
            "Surname",
            "Given name",
            header.join("\t")
        );
        println!("{:-<120}", "-");
        for voter in self {
            let history: Vec<&str> = voter
                .history
                .iter()
                .map(|(_, paid)| if *paid { "x" } else { "-" })
                .collect();
            println!(
                "{:>5}\t{:<24}\t{:<20}\t{}",
                voter.member.id,
                voter.member.surname,
                voter.member.given_name,
                history.join("\t")
            );
        }
    }
}

impl PrintFormatted for Vec<GroupCount> {
    fn print_formatted(&self) {
        println!("{:<24}\t{:>6}", "Group", "Count");
        println!("{:-<40}", "-");
        for count in self {
            println!("{:<24}\t{:>6}", count.group, count.count);
        }
    }
}

impl PrintFormatted for BackupStatus {
    fn print_formatted(&self) {
        let yes_no = |flag: bool| if flag { "yes" } else { "no" };
        println!("Accessible:\t\t{}", yes_no(self.authorized));
        println!("Automatic:\t\t{}", yes_no(self.auto_backup));
        println!("Latest folder:\t\t{}", or_none(&self.last_backup_folder));
        println!(
            "Written at:\t\t{}",
            or_none(&self.last_backup_at.map(|at| at.format("%Y-%m-%d %H:%M:%S")))
        );
    }
}
