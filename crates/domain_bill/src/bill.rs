//! Bill aggregate
//!
//! The Bill is the consistency boundary of the ledger. Every constructor and
//! transition returns a new value that already satisfies the ledger
//! invariants:
//!
//! - `sum(calculated_totals) == total_amount`, exact to the minor unit
//! - `total_amount == sum(items[].price)`
//! - every item's participants are participants of the bill
//! - `version` grows by exactly one per committed write
//! - a soft-deleted bill keeps its content; `is_deleted` is terminal

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BillId, Currency, ItemId, Money, ParticipantId};

use crate::calculator;
use crate::error::ValidationError;
use crate::patch::BillPatch;

/// A person sharing the bill, as supplied by the identity directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillParticipant {
    pub id: ParticipantId,
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl BillParticipant {
    pub fn new(
        id: ParticipantId,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            email: email.into(),
            photo_url: None,
        }
    }

    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

/// A line item and the participants who share it
///
/// `participant_ids` is an ordered set, so iteration is ascending by id and
/// the split calculator gets a stable remainder order for free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItem {
    pub id: ItemId,
    pub name: String,
    pub price: Money,
    pub participant_ids: BTreeSet<ParticipantId>,
}

impl BillItem {
    /// Creates an unassigned item
    pub fn new(id: ItemId, name: impl Into<String>, price: Money) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            participant_ids: BTreeSet::new(),
        }
    }

    /// Assigns the item to the given participants (replacing any assignment)
    pub fn assigned_to(mut self, participants: impl IntoIterator<Item = ParticipantId>) -> Self {
        self.participant_ids = participants.into_iter().collect();
        self
    }

    /// True if the item is shared by `participant`
    pub fn is_shared_by(&self, participant: ParticipantId) -> bool {
        self.participant_ids.contains(&participant)
    }
}

/// Input for creating a bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBillRequest {
    pub bill_name: String,
    pub currency: Currency,
    pub date: NaiveDate,
    pub created_by: ParticipantId,
    pub paid_by: ParticipantId,
    pub items: Vec<BillItem>,
    pub participants: Vec<BillParticipant>,
}

/// The Bill aggregate root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    id: BillId,
    created_by: ParticipantId,
    paid_by: ParticipantId,
    bill_name: String,
    total_amount: Money,
    currency: Currency,
    date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_modified_by: ParticipantId,
    items: Vec<BillItem>,
    participants: Vec<BillParticipant>,
    calculated_totals: BTreeMap<ParticipantId, Money>,
    /// Version for optimistic concurrency, starts at 1
    version: u64,
    is_deleted: bool,
    deleted_by: Option<ParticipantId>,
    deleted_at: Option<DateTime<Utc>>,
}

/// Derived amounts of a validated bill
struct Computed {
    total_amount: Money,
    calculated_totals: BTreeMap<ParticipantId, Money>,
}

impl Bill {
    /// Validates the request and builds the bill at version 1
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` when items are missing, a price is not
    /// strictly positive, an item is unassigned, or the payer is not a
    /// participant.
    pub fn create(
        id: BillId,
        request: CreateBillRequest,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let computed = validate_contents(
            request.currency,
            request.paid_by,
            &request.items,
            &request.participants,
        )?;

        Ok(Self {
            id,
            created_by: request.created_by,
            paid_by: request.paid_by,
            bill_name: request.bill_name,
            total_amount: computed.total_amount,
            currency: request.currency,
            date: request.date,
            created_at: now,
            updated_at: now,
            last_modified_by: request.created_by,
            items: request.items,
            participants: request.participants,
            calculated_totals: computed.calculated_totals,
            version: 1,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
        })
    }

    /// Returns the next version of this bill with `patch` applied
    ///
    /// The patched bill is re-validated under the creation rules and its
    /// totals are recomputed. The receiver is left untouched.
    pub fn with_patch(
        &self,
        patch: &BillPatch,
        actor: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch);
        }

        let paid_by = patch.paid_by.unwrap_or(self.paid_by);
        let items = patch.items.clone().unwrap_or_else(|| self.items.clone());
        let participants = patch
            .participants
            .clone()
            .unwrap_or_else(|| self.participants.clone());

        let computed = validate_contents(self.currency, paid_by, &items, &participants)?;

        Ok(Self {
            paid_by,
            bill_name: patch
                .bill_name
                .clone()
                .unwrap_or_else(|| self.bill_name.clone()),
            date: patch.date.unwrap_or(self.date),
            total_amount: computed.total_amount,
            calculated_totals: computed.calculated_totals,
            items,
            participants,
            updated_at: now,
            last_modified_by: actor,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Returns the soft-deleted next version of this bill
    ///
    /// Content fields are carried over unchanged.
    pub fn soft_deleted(&self, actor: ParticipantId, now: DateTime<Utc>) -> Self {
        Self {
            is_deleted: true,
            deleted_by: Some(actor),
            deleted_at: Some(now),
            updated_at: now,
            last_modified_by: actor,
            version: self.version + 1,
            ..self.clone()
        }
    }

    pub fn id(&self) -> BillId {
        self.id
    }

    pub fn created_by(&self) -> ParticipantId {
        self.created_by
    }

    pub fn paid_by(&self) -> ParticipantId {
        self.paid_by
    }

    pub fn bill_name(&self) -> &str {
        &self.bill_name
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_modified_by(&self) -> ParticipantId {
        self.last_modified_by
    }

    /// Items in display order
    pub fn items(&self) -> &[BillItem] {
        &self.items
    }

    pub fn participants(&self) -> &[BillParticipant] {
        &self.participants
    }

    /// Amount owed by each participant, keyed by participant id
    pub fn calculated_totals(&self) -> &BTreeMap<ParticipantId, Money> {
        &self.calculated_totals
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn deleted_by(&self) -> Option<ParticipantId> {
        self.deleted_by
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Ids of all participants, in list order
    pub fn participant_ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants.iter().map(|p| p.id)
    }

    pub fn is_participant(&self, participant: ParticipantId) -> bool {
        self.participants.iter().any(|p| p.id == participant)
    }

    /// True if the bill belongs in `participant`'s ledger
    pub fn involves(&self, participant: ParticipantId) -> bool {
        self.created_by == participant || self.is_participant(participant)
    }

    /// Only participants and the creator may edit
    pub fn can_edit(&self, actor: ParticipantId) -> bool {
        self.involves(actor)
    }

    /// Only the creator or the payer may delete
    pub fn can_delete(&self, actor: ParticipantId) -> bool {
        self.created_by == actor || self.paid_by == actor
    }

    pub fn item(&self, id: ItemId) -> Option<&BillItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&BillParticipant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// The amount `participant` owes on this bill
    pub fn share_of(&self, participant: ParticipantId) -> Option<Money> {
        self.calculated_totals.get(&participant).copied()
    }
}

/// Checks the content rules shared by create and update and derives totals
fn validate_contents(
    currency: Currency,
    paid_by: ParticipantId,
    items: &[BillItem],
    participants: &[BillParticipant],
) -> Result<Computed, ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptyItems);
    }

    let mut seen_participants = HashSet::with_capacity(participants.len());
    for participant in participants {
        if !seen_participants.insert(participant.id) {
            return Err(ValidationError::DuplicateParticipant(participant.id));
        }
    }

    if !seen_participants.contains(&paid_by) {
        return Err(ValidationError::PayerNotParticipant(paid_by));
    }

    let mut seen_items = HashSet::with_capacity(items.len());
    let mut total_minor: i64 = 0;
    for item in items {
        if !seen_items.insert(item.id) {
            return Err(ValidationError::DuplicateItem(item.id));
        }
        if item.price.currency() != currency {
            return Err(ValidationError::CurrencyMismatch {
                item_id: item.id,
                expected: currency,
                actual: item.price.currency(),
            });
        }
        let minor = item.price.to_minor().map_err(|e| ValidationError::InvalidPrice {
            item_id: item.id,
            reason: e.to_string(),
        })?;
        if minor <= 0 {
            return Err(ValidationError::NonPositivePrice {
                item_id: item.id,
                price: item.price,
            });
        }
        if item.participant_ids.is_empty() {
            return Err(ValidationError::UnassignedItem { item_id: item.id });
        }
        total_minor = total_minor
            .checked_add(minor)
            .ok_or_else(|| ValidationError::InvalidPrice {
                item_id: item.id,
                reason: "bill total overflows".to_string(),
            })?;
    }

    let calculated_totals = calculator::split(items, participants, currency)?;

    Ok(Computed {
        total_amount: Money::from_minor(total_minor, currency),
        calculated_totals,
    })
}
