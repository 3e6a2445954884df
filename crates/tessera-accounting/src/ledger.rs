use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use tracing::debug;

use tessera_data::{paid_years, Member, MemberFilter, Payment, PaymentFilter, Query};

/// In memory view of the membership: all members and all payments,
/// indexed by member once so reports do not rescan the payments.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    members: Vec<Member>,
    payments: Vec<Payment>,
    by_member: HashMap<u32, Vec<usize>>,
    years_by_member: HashMap<u32, BTreeSet<i32>>,
}

impl Ledger {
    pub fn new(members: Vec<Member>, payments: Vec<Payment>) -> Self {
        let mut by_member: HashMap<u32, Vec<usize>> = HashMap::new();
        for (idx, payment) in payments.iter().enumerate() {
            by_member.entry(payment.member_id).or_default().push(idx);
        }
        let years_by_member = by_member
            .iter()
            .map(|(member_id, idx)| {
                (*member_id, paid_years(idx.iter().map(|i| &payments[*i])))
            })
            .collect();

        Self {
            members,
            payments,
            by_member,
            years_by_member,
        }
    }

    /// Read all members and payments from the store.
    pub async fn load<DB>(db: &DB) -> Result<Self>
    where
        DB: Query<Member, Filter = MemberFilter>
            + Query<Payment, Filter = PaymentFilter>
            + Send
            + Sync,
    {
        let members: Vec<Member> = db.query(&MemberFilter::default()).await?;
        let payments: Vec<Payment> = db.query(&PaymentFilter::default()).await?;
        debug!(
            members = members.len(),
            payments = payments.len(),
            "ledger loaded"
        );
        Ok(Self::new(members, payments))
    }

    /// All members, in store order (surname, given name).
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, id: u32) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Payments of a member.
    pub fn payments_of(&self, member_id: u32) -> impl Iterator<Item = &Payment> {
        self.by_member
            .get(&member_id)
            .into_iter()
            .flatten()
            .map(|idx| &self.payments[*idx])
    }

    /// Distinct paid years of a member.
    pub fn paid_years(&self, member_id: u32) -> &BTreeSet<i32> {
        static EMPTY: BTreeSet<i32> = BTreeSet::new();
        self.years_by_member.get(&member_id).unwrap_or(&EMPTY)
    }

    pub fn has_paid(&self, member_id: u32, year: i32) -> bool {
        self.paid_years(member_id).contains(&year)
    }

    /// Payments received for a year.
    pub fn payments_in_year(&self, year: i32) -> impl Iterator<Item = &Payment> {
        self.payments.iter().filter(move |p| p.year == year)
    }
}
