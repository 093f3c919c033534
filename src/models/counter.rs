use serde::{Deserialize, Serialize};

use crate::time::LocalTime;

/// One counter per order (spec.md §3). Invariant #6 (§8): at most one
/// `isActive = true` across all counters at any committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleCounter {
    pub id: i64,
    pub id_order: i64,
    pub quantity: i64,
    pub is_active: bool,
    pub created_at: LocalTime,
    pub last_updated: LocalTime,
    pub last_bottle_counted_at: Option<LocalTime>,
}
