use serde::{Deserialize, Serialize};

/// Immutable once written (spec.md §3): at most one row per order, created
/// exactly once when the order first leaves EN_PROCESO.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Metricas {
    pub id_order: i64,
    pub tiempo_total: f64,
    pub tiempo_pausado: f64,
    pub tiempo_activo: f64,
    pub disponibilidad: f64,
    pub rendimiento: f64,
    pub calidad: f64,
    pub oee: f64,
    pub std_real: f64,
    pub por_cump_pedido: f64,
}
