use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use inquire::Confirm;

use tessera_accounting::{datetime, reports, Ledger};
use tessera_data::{
    parse_id,
    parse_year,
    Delete,
    Insert,
    Member,
    MemberFilter,
    Query,
    Retrieve,
    Update,
};
use tessera_db::Connection;

use crate::formatting::PrintFormatted;

#[derive(Subcommand, Debug)]
pub enum Members {
    /// Show a member with payments and status
    #[clap(name = "show")]
    Show(ShowMember),
    /// List members
    #[clap(name = "list")]
    List(ListMembers),
    /// Search members by name and notes
    #[clap(name = "search")]
    Search(SearchMembers),
    /// Add a member
    #[clap(name = "add")]
    Add(AddMember),
    /// Update a member
    #[clap(name = "set")]
    Update(UpdateMember),
    /// Delete a member and its payments
    #[clap(name = "delete")]
    Delete(DeleteMember),
}

impl Members {
    pub async fn run(self, db: &Connection) -> Result<()> {
        match self {
            Members::Show(cmd) => cmd.run(db).await,
            Members::List(cmd) => cmd.run(db).await,
            Members::Search(cmd) => cmd.run(db).await,
            Members::Add(cmd) => cmd.run(db).await,
            Members::Update(cmd) => cmd.run(db).await,
            Members::Delete(cmd) => cmd.run(db).await,
        }
    }
}

#[derive(Args, Debug)]
pub struct ShowMember {
    #[clap(short, long, value_parser = parse_id)]
    pub id: u32,
    /// Year to evaluate, defaults to the current year
    #[clap(short, long, value_parser = parse_year)]
    pub year: Option<i32>,
}

impl ShowMember {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let year = self.year.unwrap_or_else(datetime::current_year);
        let ledger = Ledger::load(db).await?;
        let status = reports::member_status(&ledger, self.id, year)?;
        println!();
        status.print_formatted();
        println!();
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ListMembers {
    #[clap(short, long)]
    pub group: Option<String>,
}

impl ListMembers {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let filter = MemberFilter {
            group: self.group,
            ..Default::default()
        };
        let members: Vec<Member> = db.query(&filter).await?;
        println!("{} members.", members.len());
        members.print_formatted();
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct SearchMembers {
    /// Every term must match surname, given name or notes
    #[clap(required = true)]
    pub terms: Vec<String>,
}

impl SearchMembers {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let filter = MemberFilter {
            search: Some(self.terms.join(" ")),
            ..Default::default()
        };
        let members: Vec<Member> = db.query(&filter).await?;
        println!("{} members.", members.len());
        members.print_formatted();
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct AddMember {
    #[clap(short, long)]
    pub surname: String,
    #[clap(short = 'n', long)]
    pub given_name: Option<String>,
    #[clap(short, long)]
    pub birth_date: Option<NaiveDate>,
    #[clap(long)]
    pub birthplace: Option<String>,
    #[clap(short, long)]
    pub group: Option<String>,
    /// Year of first registration, defaults to the current year
    #[clap(short, long, value_parser = parse_year)]
    pub registered: Option<i32>,
    #[clap(short = 'c', long)]
    pub notes: Option<String>,
}

impl AddMember {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let member = Member {
            surname: self.surname,
            given_name: self.given_name.unwrap_or_default(),
            birth_date: self.birth_date,
            birthplace: self.birthplace,
            group: self.group.unwrap_or_default(),
            first_registration_year: Some(
                self.registered.unwrap_or_else(datetime::current_year),
            ),
            notes: self.notes.unwrap_or_default(),
            ..Default::default()
        };
        member.validate()?;

        println!();
        member.print_formatted();
        println!();

        let confirm = Confirm::new("Add member?").with_default(true);
        if !confirm.prompt()? {
            return Ok(());
        }

        let member = db.insert(member).await?;
        println!("Member added with id {}.", member.id);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct UpdateMember {
    #[clap(short, long, value_parser = parse_id)]
    pub id: u32,
    #[clap(short, long)]
    pub surname: Option<String>,
    #[clap(short = 'n', long)]
    pub given_name: Option<String>,
    #[clap(short, long)]
    pub birth_date: Option<NaiveDate>,
    #[clap(long)]
    pub birthplace: Option<String>,
    #[clap(short, long)]
    pub group: Option<String>,
    #[clap(short, long, value_parser = parse_year)]
    pub registered: Option<i32>,
    #[clap(short = 'c', long)]
    pub notes: Option<String>,
}

impl UpdateMember {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let member: Member = db.retrieve(self.id).await?;
        let mut update = member.clone();

        if let Some(surname) = self.surname {
            update.surname = surname;
        }
        if let Some(given_name) = self.given_name {
            update.given_name = given_name;
        }
        if let Some(birth_date) = self.birth_date {
            update.birth_date = Some(birth_date);
        }
        if let Some(birthplace) = self.birthplace {
            update.birthplace = Some(birthplace);
        }
        if let Some(group) = self.group {
            update.group = group;
        }
        if let Some(registered) = self.registered {
            update.first_registration_year = Some(registered);
        }
        if let Some(notes) = self.notes {
            update.notes = notes;
        }
        update.validate()?;

        println!();
        (member, update.clone()).print_formatted();
        println!();
        let confirm = Confirm::new("Update member?").with_default(true);
        if !confirm.prompt()? {
            return Ok(());
        }

        db.update(update).await?;
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct DeleteMember {
    #[clap(short, long, value_parser = parse_id)]
    pub id: u32,
}

impl DeleteMember {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let member: Member = db.retrieve(self.id).await?;
        let payments = member.get_payments(db).await?;
        println!();
        member.print_formatted();
        println!("Payments:\t\t{}", payments.len());
        println!();
        let confirm = Confirm::new("Delete member and all its payments?")
            .with_default(false);
        if !confirm.prompt()? {
            return Ok(());
        }
        let removed: Member = db.delete(member.id).await?;
        println!("Member {} deleted.", removed.id);
        Ok(())
    }
}
