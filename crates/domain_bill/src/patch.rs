//! Partial bill edits and the field names used to report conflicts

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{ItemId, ParticipantId};

use crate::bill::{Bill, BillItem, BillParticipant};

/// An intended edit to a bill
///
/// `None` leaves a field alone. The collections replace the whole list when
/// present; item-level differences are worked out against the base version
/// by the conflict detector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_by: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<BillItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<BillParticipant>>,
}

impl BillPatch {
    pub fn is_empty(&self) -> bool {
        self.bill_name.is_none()
            && self.date.is_none()
            && self.paid_by.is_none()
            && self.items.is_none()
            && self.participants.is_none()
    }

    pub fn with_bill_name(mut self, name: impl Into<String>) -> Self {
        self.bill_name = Some(name.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_paid_by(mut self, payer: ParticipantId) -> Self {
        self.paid_by = Some(payer);
        self
    }

    pub fn with_items(mut self, items: Vec<BillItem>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_participants(mut self, participants: Vec<BillParticipant>) -> Self {
        self.participants = Some(participants);
        self
    }

    /// Items the bill would have after this patch
    pub fn items_over<'a>(&'a self, bill: &'a Bill) -> &'a [BillItem] {
        self.items.as_deref().unwrap_or(bill.items())
    }

    /// Participants the bill would have after this patch
    pub fn participants_over<'a>(&'a self, bill: &'a Bill) -> &'a [BillParticipant] {
        self.participants.as_deref().unwrap_or(bill.participants())
    }

    /// Payer the bill would have after this patch
    pub fn paid_by_over(&self, bill: &Bill) -> ParticipantId {
        self.paid_by.unwrap_or(bill.paid_by())
    }
}

/// A single conflictable field of a bill
///
/// Items are addressed by id, so two edits touching different items never
/// collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "field", content = "item_id", rename_all = "snake_case")]
pub enum BillField {
    BillName,
    Date,
    PaidBy,
    Participants,
    /// The item exists on one side and not the other
    Item(ItemId),
    ItemName(ItemId),
    ItemPrice(ItemId),
    ItemAssignment(ItemId),
}

impl BillField {
    /// True for fields that feed the split calculation
    pub fn affects_money(&self) -> bool {
        matches!(
            self,
            BillField::PaidBy
                | BillField::Participants
                | BillField::Item(_)
                | BillField::ItemPrice(_)
                | BillField::ItemAssignment(_)
        )
    }

    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            BillField::Item(id)
            | BillField::ItemName(id)
            | BillField::ItemPrice(id)
            | BillField::ItemAssignment(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for BillField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillField::BillName => write!(f, "billName"),
            BillField::Date => write!(f, "date"),
            BillField::PaidBy => write!(f, "paidBy"),
            BillField::Participants => write!(f, "participants"),
            BillField::Item(id) => write!(f, "items[{id}]"),
            BillField::ItemName(id) => write!(f, "items[{id}].name"),
            BillField::ItemPrice(id) => write!(f, "items[{id}].price"),
            BillField::ItemAssignment(id) => write!(f, "items[{id}].participantIDs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patch() {
        assert!(BillPatch::default().is_empty());
        assert!(!BillPatch::default().with_bill_name("Lunch").is_empty());
    }

    #[test]
    fn test_field_display() {
        let id = ItemId::new();
        assert_eq!(BillField::PaidBy.to_string(), "paidBy");
        assert_eq!(
            BillField::ItemPrice(id).to_string(),
            format!("items[{id}].price")
        );
    }

    #[test]
    fn test_field_serde_shape() {
        let json = serde_json::to_value(BillField::BillName).unwrap();
        assert_eq!(json, serde_json::json!({ "field": "bill_name" }));

        let id = ItemId::new();
        let json = serde_json::to_value(BillField::ItemAssignment(id)).unwrap();
        assert_eq!(json["field"], "item_assignment");
        assert_eq!(json["item_id"], id.as_uuid().to_string());
    }
}
