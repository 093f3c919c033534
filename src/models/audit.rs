use serde::{Deserialize, Serialize};

use crate::time::LocalTime;

/// Append-only snapshot of an Order at deletion time (spec.md §3). Never
/// mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDeleteAudit {
    pub id: i64,
    pub order_id: i64,
    pub order_snapshot_json: String,
    pub deleted_by: String,
    pub motivo: String,
    pub deleted_at: LocalTime,
    pub ip_address: Option<String>,
}
