//! Three-way conflict detection for concurrent bill edits
//!
//! A stale write is compared against two versions of the bill: the `base`
//! the client started editing from, and the `server` copy that won the race.
//! A field conflicts only when all three disagree: the local patch changed
//! it, the server changed it, and they did not land on the same value.
//!
//! Severity is ordered `Low < Medium < High < Critical` and the highest
//! matching rule wins:
//!
//! | Severity   | Trigger                                                        |
//! |------------|----------------------------------------------------------------|
//! | `Critical` | `paidBy` conflicts, or both sides moved the total differently  |
//! | `High`     | price/assignment conflicts that change someone's share         |
//! | `Medium`   | item presence, participant list, or share-neutral money fields |
//! | `Low`      | metadata only (`billName`, `date`, item names)                 |

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BillId, ConflictId, ItemId, Money, ParticipantId};

use crate::bill::{Bill, BillItem, BillParticipant};
use crate::calculator;
use crate::patch::{BillField, BillPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    /// The resolutions a caller may choose at this severity
    ///
    /// `Merge` is withheld from critical conflicts and `Manual` from low ones.
    /// `Cancel` is never listed; abandoning an edit is accepted at any
    /// severity.
    pub fn resolution_options(&self) -> Vec<ResolutionOption> {
        use ResolutionOption::*;
        match self {
            ConflictSeverity::Low => vec![AcceptLocal, AcceptServer, Merge],
            ConflictSeverity::Medium | ConflictSeverity::High => {
                vec![AcceptLocal, AcceptServer, Merge, Manual]
            }
            ConflictSeverity::Critical => vec![AcceptLocal, AcceptServer, Manual],
        }
    }

    /// True when the write path must wait for an explicit choice
    pub fn requires_user_choice(&self) -> bool {
        *self >= ConflictSeverity::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOption {
    /// Force the local patch over the server version
    AcceptLocal,
    /// Drop the local patch and keep the server version
    AcceptServer,
    /// Apply only the non-conflicting local changes onto the server version
    Merge,
    /// Write a caller-supplied, fully resolved patch
    Manual,
    /// Abandon the edit without writing
    Cancel,
}

/// A detected conflict between a stale local edit and the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillConflict {
    pub id: ConflictId,
    /// The bill the rejected write targeted
    pub operation_id: BillId,
    pub local_version: u64,
    pub server_version: u64,
    pub conflicting_fields: BTreeSet<BillField>,
    pub severity: ConflictSeverity,
    pub resolution_options: Vec<ResolutionOption>,
    pub detected_at: DateTime<Utc>,
}

impl BillConflict {
    pub fn new(
        operation_id: BillId,
        local_version: u64,
        server_version: u64,
        conflicting_fields: BTreeSet<BillField>,
        severity: ConflictSeverity,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConflictId::new_v7(),
            operation_id,
            local_version,
            server_version,
            conflicting_fields,
            severity,
            resolution_options: severity.resolution_options(),
            detected_at,
        }
    }

    /// True if `option` is listed for this conflict
    pub fn offers(&self, option: ResolutionOption) -> bool {
        self.resolution_options.contains(&option)
    }

    /// True if a caller may settle the conflict with `option`
    pub fn accepts(&self, option: ResolutionOption) -> bool {
        option == ResolutionOption::Cancel || self.offers(option)
    }
}

/// Diffs stale edits against the server and classifies the result
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// Finds the fields where `local` and `server` diverged from `base`
    ///
    /// Returns `None` when the patch touches nothing the server also changed
    /// to a different value.
    pub fn detect(
        &self,
        base: &Bill,
        local: &BillPatch,
        server: &Bill,
        now: DateTime<Utc>,
    ) -> Option<BillConflict> {
        let fields = self.conflicting_fields(base, local, server);
        if fields.is_empty() {
            return None;
        }
        let severity = self.classify(base, local, server, &fields);
        Some(BillConflict::new(
            server.id(),
            base.version(),
            server.version(),
            fields,
            severity,
            now,
        ))
    }

    /// A version mismatch with no overlapping fields
    pub fn stale_write(&self, base: &Bill, server: &Bill, now: DateTime<Utc>) -> BillConflict {
        BillConflict::new(
            server.id(),
            base.version(),
            server.version(),
            BTreeSet::new(),
            ConflictSeverity::Low,
            now,
        )
    }

    pub fn conflicting_fields(
        &self,
        base: &Bill,
        local: &BillPatch,
        server: &Bill,
    ) -> BTreeSet<BillField> {
        let mut fields = BTreeSet::new();

        if let Some(name) = &local.bill_name {
            if diverged(base.bill_name(), name.as_str(), server.bill_name()) {
                fields.insert(BillField::BillName);
            }
        }
        if let Some(date) = local.date {
            if diverged(base.date(), date, server.date()) {
                fields.insert(BillField::Date);
            }
        }
        if let Some(payer) = local.paid_by {
            if diverged(base.paid_by(), payer, server.paid_by()) {
                fields.insert(BillField::PaidBy);
            }
        }
        if let Some(participants) = &local.participants {
            if diverged(
                roster(base.participants()),
                roster(participants),
                roster(server.participants()),
            ) {
                fields.insert(BillField::Participants);
            }
        }
        if let Some(items) = &local.items {
            diff_items(base.items(), items, server.items(), &mut fields);
        }

        fields
    }

    fn classify(
        &self,
        base: &Bill,
        local: &BillPatch,
        server: &Bill,
        fields: &BTreeSet<BillField>,
    ) -> ConflictSeverity {
        if fields.contains(&BillField::PaidBy) || totals_diverged(base, local, server) {
            return ConflictSeverity::Critical;
        }

        let money_conflict = fields
            .iter()
            .any(|f| matches!(f, BillField::ItemPrice(_) | BillField::ItemAssignment(_)));
        if money_conflict && shares_change(local, server) {
            return ConflictSeverity::High;
        }

        let structural = fields.iter().any(|f| {
            matches!(f, BillField::Item(_) | BillField::Participants) || f.affects_money()
        });
        if structural {
            ConflictSeverity::Medium
        } else {
            ConflictSeverity::Low
        }
    }

    /// Builds the patch that carries only local, non-conflicting changes
    /// onto `server`
    ///
    /// The result may be empty when the server already has everything the
    /// local edit wanted.
    pub fn merge(
        &self,
        base: &Bill,
        local: &BillPatch,
        server: &Bill,
        conflicts: &BTreeSet<BillField>,
    ) -> BillPatch {
        let mut merged = BillPatch::default();

        if let Some(name) = &local.bill_name {
            if name != base.bill_name()
                && name != server.bill_name()
                && !conflicts.contains(&BillField::BillName)
            {
                merged.bill_name = Some(name.clone());
            }
        }
        if let Some(date) = local.date {
            if date != base.date() && date != server.date() && !conflicts.contains(&BillField::Date)
            {
                merged.date = Some(date);
            }
        }
        if let Some(payer) = local.paid_by {
            if payer != base.paid_by()
                && payer != server.paid_by()
                && !conflicts.contains(&BillField::PaidBy)
            {
                merged.paid_by = Some(payer);
            }
        }
        if let Some(participants) = &local.participants {
            let local_roster = roster(participants);
            if local_roster != roster(base.participants())
                && local_roster != roster(server.participants())
                && !conflicts.contains(&BillField::Participants)
            {
                merged.participants = Some(participants.clone());
            }
        }
        if let Some(items) = &local.items {
            let merged_items = merge_items(base.items(), items, server.items(), conflicts);
            if merged_items != server.items() {
                merged.items = Some(merged_items);
            }
        }

        merged
    }
}

/// Three-way divergence: both sides moved away from base and disagree
fn diverged<T: PartialEq>(base: T, local: T, server: T) -> bool {
    local != base && server != base && local != server
}

/// Participants keyed by id; list order carries no meaning for conflicts
fn roster(participants: &[BillParticipant]) -> BTreeMap<ParticipantId, &BillParticipant> {
    participants.iter().map(|p| (p.id, p)).collect()
}

fn index(items: &[BillItem]) -> BTreeMap<ItemId, &BillItem> {
    items.iter().map(|item| (item.id, item)).collect()
}

fn diff_items(
    base: &[BillItem],
    local: &[BillItem],
    server: &[BillItem],
    fields: &mut BTreeSet<BillField>,
) {
    let base = index(base);
    let local = index(local);
    let server = index(server);

    let ids: BTreeSet<ItemId> = base
        .keys()
        .chain(local.keys())
        .chain(server.keys())
        .copied()
        .collect();

    for id in ids {
        let b = base.get(&id).copied();
        let l = local.get(&id).copied();
        let s = server.get(&id).copied();

        // Removed on exactly one side: conflicts if the other side edited it
        if b.is_some() && l.is_none() != s.is_none() {
            if l.or(s) != b {
                fields.insert(BillField::Item(id));
            }
            continue;
        }

        if diverged(b.map(|i| &i.name), l.map(|i| &i.name), s.map(|i| &i.name)) {
            fields.insert(BillField::ItemName(id));
        }
        if diverged(b.map(|i| i.price), l.map(|i| i.price), s.map(|i| i.price)) {
            fields.insert(BillField::ItemPrice(id));
        }
        if diverged(
            b.map(|i| &i.participant_ids),
            l.map(|i| &i.participant_ids),
            s.map(|i| &i.participant_ids),
        ) {
            fields.insert(BillField::ItemAssignment(id));
        }
    }
}

fn merge_items(
    base: &[BillItem],
    local: &[BillItem],
    server: &[BillItem],
    conflicts: &BTreeSet<BillField>,
) -> Vec<BillItem> {
    let base_index = index(base);
    let local_index = index(local);
    let mut merged: Vec<BillItem> = server.to_vec();

    // Local removals
    merged.retain(|item| {
        let removed_locally = base_index.contains_key(&item.id) && !local_index.contains_key(&item.id);
        !(removed_locally && !conflicts.contains(&BillField::Item(item.id)))
    });

    for item in local {
        match base_index.get(&item.id) {
            None => {
                if !merged.iter().any(|m| m.id == item.id) {
                    merged.push(item.clone());
                }
            }
            Some(original) => {
                let Some(target) = merged.iter_mut().find(|m| m.id == item.id) else {
                    continue;
                };
                if item.name != original.name && !conflicts.contains(&BillField::ItemName(item.id)) {
                    target.name = item.name.clone();
                }
                if item.price != original.price && !conflicts.contains(&BillField::ItemPrice(item.id))
                {
                    target.price = item.price;
                }
                if item.participant_ids != original.participant_ids
                    && !conflicts.contains(&BillField::ItemAssignment(item.id))
                {
                    target.participant_ids = item.participant_ids.clone();
                }
            }
        }
    }

    merged
}

fn items_total(bill: &Bill, items: &[BillItem]) -> Option<Money> {
    Money::sum(bill.currency(), items.iter().map(|i| &i.price)).ok()
}

/// Both sides changed the bill total and ended on different amounts
fn totals_diverged(base: &Bill, local: &BillPatch, server: &Bill) -> bool {
    let Some(items) = &local.items else {
        return false;
    };
    match items_total(base, items) {
        Some(local_total) => diverged(base.total_amount(), local_total, server.total_amount()),
        None => true,
    }
}

/// Forcing the local patch onto the server would move at least one share
fn shares_change(local: &BillPatch, server: &Bill) -> bool {
    let forced = calculator::split(
        local.items_over(server),
        local.participants_over(server),
        server.currency(),
    );
    match forced {
        Ok(totals) => &totals != server.calculated_totals(),
        Err(_) => true,
    }
}
