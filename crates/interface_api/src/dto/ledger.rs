//! Ledger DTOs

use chrono::NaiveDate;
use serde::Serialize;

use core_kernel::{BillId, Money, ParticipantId};
use domain_bill::{Bill, CounterpartyBalance, LedgerSnapshot};

#[derive(Debug, Serialize)]
pub struct LedgerBillSummary {
    pub bill_id: BillId,
    pub bill_name: String,
    pub date: NaiveDate,
    pub paid_by: ParticipantId,
    pub total_amount: Money,
    /// The caller's share; absent when the caller only created the bill
    pub share: Option<Money>,
    pub version: u64,
}

impl LedgerBillSummary {
    fn of(bill: &Bill, user: ParticipantId) -> Self {
        Self {
            bill_id: bill.id(),
            bill_name: bill.bill_name().to_string(),
            date: bill.date(),
            paid_by: bill.paid_by(),
            total_amount: bill.total_amount(),
            share: bill.share_of(user),
            version: bill.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub user: ParticipantId,
    pub revision: u64,
    pub bills: Vec<LedgerBillSummary>,
    /// Positive nets are owed to the caller
    pub balances: Vec<CounterpartyBalance>,
}

impl From<&LedgerSnapshot> for LedgerResponse {
    fn from(snapshot: &LedgerSnapshot) -> Self {
        let user = snapshot.user();
        Self {
            user,
            revision: snapshot.revision(),
            bills: snapshot.bills().map(|b| LedgerBillSummary::of(b, user)).collect(),
            balances: snapshot.balances().balances().to_vec(),
        }
    }
}
