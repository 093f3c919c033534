use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::time::LocalTime;

/// Closed set of pause tipos (spec.md §6). Names are stable and match the
/// wire/storage representation exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TipoPausa {
    IncidenciaMaquinaContadora,
    IncidenciaMaquinaPesadora,
    IncidenciaMaquinaEtiquetadora,
    IncidenciaMaquinaRepercap,
    IncidenciaMaquinaTaponadora,
    IncidenciaMaquinaPosicionadora,
    IncidenciaMaquinaEnvasadora,
    IncidenciaMaquinaOtros,
    FaltaMaterial,
    MaterialDefectuoso,
    MantenimientoEnProceso,
    LimpiezaEnProceso,
    ParadaCalidad,
    AveriaPonderal,
    AveriaEtiqueta,
    CambioTurno,
    FabricacionParcial,
    Parada,
}

impl TipoPausa {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipoPausa::IncidenciaMaquinaContadora => "INCIDENCIA_MAQUINA_CONTADORA",
            TipoPausa::IncidenciaMaquinaPesadora => "INCIDENCIA_MAQUINA_PESADORA",
            TipoPausa::IncidenciaMaquinaEtiquetadora => "INCIDENCIA_MAQUINA_ETIQUETADORA",
            TipoPausa::IncidenciaMaquinaRepercap => "INCIDENCIA_MAQUINA_REPERCAP",
            TipoPausa::IncidenciaMaquinaTaponadora => "INCIDENCIA_MAQUINA_TAPONADORA",
            TipoPausa::IncidenciaMaquinaPosicionadora => "INCIDENCIA_MAQUINA_POSICIONADORA",
            TipoPausa::IncidenciaMaquinaEnvasadora => "INCIDENCIA_MAQUINA_ENVASADORA",
            TipoPausa::IncidenciaMaquinaOtros => "INCIDENCIA_MAQUINA_OTROS",
            TipoPausa::FaltaMaterial => "FALTA_MATERIAL",
            TipoPausa::MaterialDefectuoso => "MATERIAL_DEFECTUOSO",
            TipoPausa::MantenimientoEnProceso => "MANTENIMIENTO_EN_PROCESO",
            TipoPausa::LimpiezaEnProceso => "LIMPIEZA_EN_PROCESO",
            TipoPausa::ParadaCalidad => "PARADA_CALIDAD",
            TipoPausa::AveriaPonderal => "AVERIA_PONDERAL",
            TipoPausa::AveriaEtiqueta => "AVERIA_ETIQUETA",
            TipoPausa::CambioTurno => "CAMBIO_TURNO",
            TipoPausa::FabricacionParcial => "FABRICACION_PARCIAL",
            TipoPausa::Parada => "PARADA",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Ok(match s {
            "INCIDENCIA_MAQUINA_CONTADORA" => TipoPausa::IncidenciaMaquinaContadora,
            "INCIDENCIA_MAQUINA_PESADORA" => TipoPausa::IncidenciaMaquinaPesadora,
            "INCIDENCIA_MAQUINA_ETIQUETADORA" => TipoPausa::IncidenciaMaquinaEtiquetadora,
            "INCIDENCIA_MAQUINA_REPERCAP" => TipoPausa::IncidenciaMaquinaRepercap,
            "INCIDENCIA_MAQUINA_TAPONADORA" => TipoPausa::IncidenciaMaquinaTaponadora,
            "INCIDENCIA_MAQUINA_POSICIONADORA" => TipoPausa::IncidenciaMaquinaPosicionadora,
            "INCIDENCIA_MAQUINA_ENVASADORA" => TipoPausa::IncidenciaMaquinaEnvasadora,
            "INCIDENCIA_MAQUINA_OTROS" => TipoPausa::IncidenciaMaquinaOtros,
            "FALTA_MATERIAL" => TipoPausa::FaltaMaterial,
            "MATERIAL_DEFECTUOSO" => TipoPausa::MaterialDefectuoso,
            "MANTENIMIENTO_EN_PROCESO" => TipoPausa::MantenimientoEnProceso,
            "LIMPIEZA_EN_PROCESO" => TipoPausa::LimpiezaEnProceso,
            "PARADA_CALIDAD" => TipoPausa::ParadaCalidad,
            "AVERIA_PONDERAL" => TipoPausa::AveriaPonderal,
            "AVERIA_ETIQUETA" => TipoPausa::AveriaEtiqueta,
            "CAMBIO_TURNO" => TipoPausa::CambioTurno,
            "FABRICACION_PARCIAL" => TipoPausa::FabricacionParcial,
            "PARADA" => TipoPausa::Parada,
            other => {
                return Err(CoreError::invalid_input(format!(
                    "unknown pause tipo: {other}"
                )))
            }
        })
    }

    /// spec.md §4.4: `computa = true` iff tipo is not one of the three
    /// non-computable ones. Unknown future tipos default to `true`, which
    /// falls out naturally here since every tipo we know about is matched
    /// explicitly and anything added to the enum later must be handled —
    /// but per spec.md we keep the *default* arm `true` for resilience if
    /// this match is ever not updated in lockstep with the enum.
    pub fn computa(&self) -> bool {
        !matches!(
            self,
            TipoPausa::CambioTurno | TipoPausa::FabricacionParcial | TipoPausa::Parada
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pause {
    pub id: i64,
    pub id_order: i64,
    pub tipo: Option<TipoPausa>,
    pub descripcion: Option<String>,
    pub operario: Option<String>,
    pub computa: Option<bool>,
    pub hora_inicio: LocalTime,
    pub hora_fin: Option<LocalTime>,
    pub tiempo_total_pausa: Option<f64>,
}

impl Pause {
    pub fn is_open(&self) -> bool {
        self.hora_fin.is_none()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OpenPauseDto {
    pub tipo: Option<String>,
    pub descripcion: Option<String>,
    pub operario: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClosePauseDto {
    pub tipo: Option<String>,
    pub descripcion: Option<String>,
    pub operario: Option<String>,
}
