use serde::{Deserialize, Serialize};

use crate::time::LocalTime;

/// Post-production manual phase (spec.md §3, §4.6). At most one row per
/// order; open iff `hora_fin` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acumula {
    pub id_order: i64,
    pub hora_inicio: LocalTime,
    pub hora_fin: Option<LocalTime>,
    pub tiempo_total: Option<f64>,
    pub num_cajas_manual: f64,
}

impl Acumula {
    pub fn is_open(&self) -> bool {
        self.hora_fin.is_none()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FinishManualDto {
    pub num_cajas_manual: f64,
}
