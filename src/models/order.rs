use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::time::LocalTime;

/// `estado` (spec.md §3). Only the transitions in spec.md §4.3 are legal;
/// anything else is an `InvalidState` error raised by the engine, not by
/// this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoOrden {
    Creada,
    EnProceso,
    Pausada,
    Finalizada,
    EsperaManual,
    ProcesoManual,
}

impl EstadoOrden {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoOrden::Creada => "CREADA",
            EstadoOrden::EnProceso => "EN_PROCESO",
            EstadoOrden::Pausada => "PAUSADA",
            EstadoOrden::Finalizada => "FINALIZADA",
            EstadoOrden::EsperaManual => "ESPERA_MANUAL",
            EstadoOrden::ProcesoManual => "PROCESO_MANUAL",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "CREADA" => Ok(EstadoOrden::Creada),
            "EN_PROCESO" => Ok(EstadoOrden::EnProceso),
            "PAUSADA" => Ok(EstadoOrden::Pausada),
            "FINALIZADA" => Ok(EstadoOrden::Finalizada),
            "ESPERA_MANUAL" => Ok(EstadoOrden::EsperaManual),
            "PROCESO_MANUAL" => Ok(EstadoOrden::ProcesoManual),
            other => Err(CoreError::Internal(format!(
                "unknown estado in storage: {other}"
            ))),
        }
    }

    /// spec.md §3: "active" while EN_PROCESO or PAUSADA.
    pub fn is_active(&self) -> bool {
        matches!(self, EstadoOrden::EnProceso | EstadoOrden::Pausada)
    }

    /// spec.md §3: `horaFin` is set iff estado reached one of these.
    pub fn has_finished(&self) -> bool {
        matches!(
            self,
            EstadoOrden::Finalizada | EstadoOrden::EsperaManual | EstadoOrden::ProcesoManual
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub cod_order: String,
    pub operario: String,
    pub lote: String,
    pub articulo: String,
    pub descripcion: String,
    pub estado: EstadoOrden,
    pub cantidad: f64,
    pub botes_caja: f64,
    pub std_referencia: f64,
    pub hora_creacion: LocalTime,
    pub hora_inicio: Option<LocalTime>,
    pub hora_fin: Option<LocalTime>,
    pub botes_buenos: Option<f64>,
    pub botes_malos: Option<f64>,
    pub total_cajas_cierre: Option<f64>,
    pub repercap: bool,
    pub acumula: bool,
}

impl Order {
    /// `cajasPrevistas = cantidad/botesCaja` (spec.md §3, invariant #4 §8).
    pub fn cajas_previstas(&self) -> f64 {
        self.cantidad / self.botes_caja
    }

    /// `tiempoEstimado = cantidad/stdReferencia` (spec.md §3, invariant #4 §8).
    pub fn tiempo_estimado(&self) -> f64 {
        self.cantidad / self.std_referencia
    }
}

/// Payload for `createOrder` (spec.md §4.3). Field names mirror the S1
/// example literally since external callers (and the original system) speak
/// these names.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderSpec {
    pub cod_order: String,
    pub operario: String,
    pub lote: String,
    pub articulo: String,
    #[serde(default)]
    pub descripcion: String,
    pub cantidad: f64,
    pub botes_caja: f64,
    pub std_referencia: f64,
    pub formato_bote: String,
    pub tipo: String,
    pub uds_bote: f64,
    #[serde(default)]
    pub repercap: bool,
}

impl OrderSpec {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cod_order.trim().is_empty() {
            return Err(CoreError::invalid_input("codOrder must not be empty"));
        }
        if self.cantidad < 1.0 {
            return Err(CoreError::invalid_input(format!(
                "cantidad must be >= 1, got {}",
                self.cantidad
            )));
        }
        if self.botes_caja < 1.0 {
            return Err(CoreError::invalid_input(format!(
                "botesCaja must be >= 1, got {}",
                self.botes_caja
            )));
        }
        if self.std_referencia <= 0.0 {
            return Err(CoreError::invalid_input(format!(
                "stdReferencia must be > 0, got {}",
                self.std_referencia
            )));
        }
        Ok(())
    }
}

/// Sidecar written alongside every Order at creation time (SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraData {
    pub id_order: i64,
    pub formato_bote: String,
    pub tipo: String,
    pub uds_bote: f64,
}

/// Payload for `finalize` (spec.md §4.3).
#[derive(Debug, Clone, Deserialize)]
pub struct FinishDto {
    pub botes_buenos: f64,
    pub botes_malos: f64,
    pub total_cajas_cierre: f64,
    pub acumula: bool,
}
