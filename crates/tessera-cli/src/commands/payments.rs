use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use inquire::Confirm;

use tessera_accounting::datetime;
use tessera_data::{
    parse_id,
    parse_year,
    Delete,
    Insert,
    Member,
    Payment,
    PaymentFilter,
    Query,
    ReceiptKey,
    Retrieve,
};
use tessera_db::Connection;

use crate::formatting::PrintFormatted;

#[derive(Subcommand, Debug)]
pub enum Payments {
    /// List payments
    #[clap(name = "list")]
    List(ListPayments),
    /// Record a payment
    #[clap(name = "add")]
    Add(AddPayment),
    /// Delete a single payment
    #[clap(name = "delete")]
    Delete(DeletePayment),
    /// Delete all payments of a receipt
    #[clap(name = "delete-receipt")]
    DeleteReceipt(DeleteReceipt),
}

impl Payments {
    pub async fn run(self, db: &Connection) -> Result<()> {
        match self {
            Payments::List(cmd) => cmd.run(db).await,
            Payments::Add(cmd) => cmd.run(db).await,
            Payments::Delete(cmd) => cmd.run(db).await,
            Payments::DeleteReceipt(cmd) => cmd.run(db).await,
        }
    }
}

#[derive(Args, Debug)]
pub struct ListPayments {
    #[clap(short, long, value_parser = parse_id)]
    pub member_id: Option<u32>,
    #[clap(short, long, value_parser = parse_year)]
    pub year: Option<i32>,
    #[clap(short, long)]
    pub receipt_no: Option<u32>,
}

impl ListPayments {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let filter = PaymentFilter {
            member_id: self.member_id,
            year: self.year,
            receipt_no: self.receipt_no,
        };
        let payments: Vec<Payment> = db.query(&filter).await?;
        let total: f64 = payments.iter().map(|p| p.amount).sum();
        println!("{} payments, {:.2} total.", payments.len(), total);
        payments.print_formatted();
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct AddPayment {
    #[clap(short, long, value_parser = parse_id)]
    pub member_id: u32,
    /// Year paid for, defaults to the current year
    #[clap(short, long, value_parser = parse_year)]
    pub year: Option<i32>,
    #[clap(short, long)]
    pub amount: f64,
    /// Date of payment, defaults to today
    #[clap(short, long)]
    pub date: Option<NaiveDate>,
    #[clap(short, long, default_value_t = 0)]
    pub receipt_no: u32,
    #[clap(short, long, default_value_t = 0)]
    pub booklet_no: u32,
}

impl AddPayment {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let member: Member = db.retrieve(self.member_id).await?;
        let payment = Payment {
            member_id: member.id,
            year: self.year.unwrap_or_else(datetime::current_year),
            payment_date: Some(self.date.unwrap_or_else(datetime::today)),
            amount: self.amount,
            receipt_no: self.receipt_no,
            booklet_no: self.booklet_no,
            ..Default::default()
        };
        payment.validate()?;

        println!();
        println!("Member:\t\t\t{}", member.full_name());
        payment.print_formatted();
        println!();
        let confirm = Confirm::new("Record payment?").with_default(true);
        if !confirm.prompt()? {
            return Ok(());
        }

        let payment = db.insert(payment).await?;
        println!("Payment recorded with id {}.", payment.payment_id);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct DeletePayment {
    #[clap(short, long)]
    pub payment_id: String,
}

impl DeletePayment {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let payment: Payment = db.retrieve(self.payment_id).await?;
        println!();
        payment.print_formatted();
        println!();
        let confirm = Confirm::new("Delete payment?").with_default(false);
        if !confirm.prompt()? {
            return Ok(());
        }
        let _: Payment = db.delete(payment.payment_id).await?;
        println!("Payment deleted.");
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct DeleteReceipt {
    #[clap(short, long, value_parser = parse_id)]
    pub member_id: u32,
    #[clap(short, long)]
    pub receipt_no: u32,
    /// Years on the receipt, comma separated
    #[clap(
        short,
        long,
        value_delimiter = ',',
        required = true,
        value_parser = parse_year
    )]
    pub years: Vec<i32>,
}

impl DeleteReceipt {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let key = ReceiptKey {
            member_id: self.member_id,
            receipt_no: self.receipt_no,
            years: self.years.into_iter().collect(),
        };
        let message = format!(
            "Delete payments of receipt {} for member {}?",
            key.receipt_no, key.member_id
        );
        let confirm = Confirm::new(&message).with_default(false);
        if !confirm.prompt()? {
            return Ok(());
        }
        let removed: Vec<Payment> = db.delete(key).await?;
        println!("{} payments deleted.", removed.len());
        removed.print_formatted();
        Ok(())
    }
}
