//! Bill DTOs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{Currency, ParticipantId};
use domain_bill::{BillItem, BillParticipant, BillPatch, CreateBillRequest, ResolutionOption};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBillBody {
    #[validate(length(min = 1, max = 120))]
    pub bill_name: String,
    pub currency: Currency,
    pub date: NaiveDate,
    pub paid_by: ParticipantId,
    #[validate(length(max = 200))]
    pub items: Vec<BillItem>,
    #[validate(length(max = 50))]
    pub participants: Vec<BillParticipant>,
}

impl CreateBillBody {
    pub fn into_request(self, created_by: ParticipantId) -> CreateBillRequest {
        CreateBillRequest {
            bill_name: self.bill_name,
            currency: self.currency,
            date: self.date,
            created_by,
            paid_by: self.paid_by,
            items: self.items,
            participants: self.participants,
        }
    }
}

/// Patch plus the version the client edited from
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBillBody {
    #[validate(range(min = 1))]
    pub expected_version: u64,
    #[serde(flatten)]
    pub patch: BillPatch,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveConflictBody {
    pub resolution: ResolutionOption,
    /// Required for `manual`, ignored otherwise
    #[serde(default)]
    pub manual_patch: Option<BillPatch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_body_flattens_patch() {
        let body: UpdateBillBody = serde_json::from_value(serde_json::json!({
            "expected_version": 4,
            "bill_name": "Brunch",
            "date": "2024-05-01",
        }))
        .unwrap();

        assert_eq!(body.expected_version, 4);
        assert_eq!(body.patch.bill_name.as_deref(), Some("Brunch"));
        assert!(body.patch.items.is_none());
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_resolve_body_defaults_manual_patch() {
        let body: ResolveConflictBody =
            serde_json::from_value(serde_json::json!({ "resolution": "merge" })).unwrap();
        assert_eq!(body.resolution, ResolutionOption::Merge);
        assert!(body.manual_patch.is_none());
    }
}
