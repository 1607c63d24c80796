//! Session DTOs

use chrono::NaiveDate;
use serde::Deserialize;

/// Turns the saved session into a bill
#[derive(Debug, Default, Deserialize)]
pub struct CommitSessionBody {
    /// Bill date; today (UTC) when absent
    #[serde(default)]
    pub date: Option<NaiveDate>,
}
