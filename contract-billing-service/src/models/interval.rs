//! Billing table update request.

use serde::{Deserialize, Serialize};

/// Days to rebuild, as `YYYY-MM-DD`. Both bounds default to today.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTableInterval {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}
