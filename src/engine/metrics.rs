//! Metric Calculator (C5, spec.md §4.5). One-shot OEE/availability/
//! performance/quality computation; recompute-by-request.

use crate::error::{CoreError, CoreResult};
use crate::models::{EstadoOrden, Metricas, Order};
use crate::store::{pauses, Store};
use crate::time::{minutes_between, now, LocalTime};

/// Pure formula block (spec.md §4.5), usable both for the persisted
/// calculation and the live, unpersisted simulation.
pub struct MetricInputs {
    pub hora_inicio: LocalTime,
    pub hora_fin: LocalTime,
    pub cantidad: f64,
    pub std_referencia: f64,
    pub botes_buenos: f64,
    pub botes_malos: f64,
    pub tiempo_no_computable: f64,
    pub tiempo_pausado: f64,
}

pub fn compute(inputs: &MetricInputs) -> Metricas {
    let tiempo_bruto = minutes_between(inputs.hora_inicio, inputs.hora_fin);
    let tiempo_total = tiempo_bruto - inputs.tiempo_no_computable;
    let tiempo_activo = (tiempo_total - inputs.tiempo_pausado).max(1.0);

    let disponibilidad = if tiempo_total > 0.0 {
        tiempo_activo / tiempo_total
    } else {
        0.0
    };

    let total_producido = inputs.botes_buenos + inputs.botes_malos;
    let produccion_esperada = tiempo_activo * inputs.std_referencia;
    let rendimiento = if produccion_esperada > 0.0 {
        total_producido / produccion_esperada
    } else {
        0.0
    };

    let calidad = if total_producido > 0.0 {
        inputs.botes_buenos / total_producido
    } else {
        0.0
    };

    let oee = disponibilidad * rendimiento * calidad;
    let std_real = total_producido / tiempo_activo;
    let por_cump_pedido = inputs.botes_buenos / inputs.cantidad.max(1.0);

    Metricas {
        id_order: 0, // filled in by the caller once the order id is known
        tiempo_total,
        tiempo_pausado: inputs.tiempo_pausado,
        tiempo_activo,
        disponibilidad,
        rendimiento,
        calidad,
        oee,
        std_real,
        por_cump_pedido,
    }
}

/// Gathers the pause sums for an order and runs `compute`, used by both
/// `calc_and_store` and `recalcular` inside the caller's transaction.
fn compute_for_order(
    tx: &rusqlite::Transaction,
    order: &Order,
    hora_fin: LocalTime,
) -> CoreResult<Metricas> {
    let hora_inicio = order
        .hora_inicio
        .ok_or_else(|| CoreError::invalid_state("order has no horaInicio to compute metrics from"))?;

    let tiempo_no_computable = pauses::closed_pause_minutes_by_computa(tx, order.id, false)?;
    let tiempo_pausado = pauses::closed_pause_minutes_by_computa(tx, order.id, true)?;

    let mut m = compute(&MetricInputs {
        hora_inicio,
        hora_fin,
        cantidad: order.cantidad,
        std_referencia: order.std_referencia,
        botes_buenos: order.botes_buenos.unwrap_or(0.0),
        botes_malos: order.botes_malos.unwrap_or(0.0),
        tiempo_no_computable,
        tiempo_pausado,
    });
    m.id_order = order.id;
    Ok(m)
}

/// spec.md §4.5: "This is the only point where metrics are ever created for
/// an order" (called from `finalize`). Idempotent: if a row already exists,
/// return it unchanged rather than recomputing.
pub fn calc_and_store(tx: &rusqlite::Transaction, order: &Order) -> CoreResult<Metricas> {
    if let Some(existing) = crate::store::metrics::get(tx, order.id)? {
        return Ok(existing);
    }
    let hora_fin = order
        .hora_fin
        .ok_or_else(|| CoreError::invalid_state("order has no horaFin to compute metrics from"))?;
    let m = compute_for_order(tx, order, hora_fin)?;
    crate::store::metrics::insert(tx, &m)?;
    Ok(m)
}

/// `recalcularMetricas` (spec.md §4.5): only valid once an order has left
/// EN_PROCESO; deletes and recomputes inside the same transaction.
pub fn recalcular(store: &Store, id_order: i64) -> CoreResult<Metricas> {
    store.with_transaction(|tx| {
        let order = crate::store::orders::get_by_id(tx, id_order)?;
        if !order.estado.has_finished() {
            return Err(CoreError::invalid_state(format!(
                "recalcularMetricas requires a finished estado, order {id_order} is {}",
                order.estado.as_str()
            )));
        }
        let hora_fin = order
            .hora_fin
            .ok_or_else(|| CoreError::invalid_state("finished order has no horaFin"))?;
        crate::store::metrics::delete(tx, id_order)?;
        let m = compute_for_order(tx, &order, hora_fin)?;
        crate::store::metrics::insert(tx, &m)?;
        Ok(m)
    })
}

/// Live, unpersisted variant for active orders: identical formulas with
/// `horaFin = now` (spec.md §4.5).
pub fn simulate(tx: &rusqlite::Transaction, order: &Order) -> CoreResult<Metricas> {
    if order.estado != EstadoOrden::EnProceso && order.estado != EstadoOrden::Pausada {
        return Err(CoreError::invalid_state(
            "live metric simulation only applies to an active order",
        ));
    }
    compute_for_order(tx, order, now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Madrid;

    fn t(h: u32, m: u32) -> LocalTime {
        Madrid.with_ymd_and_hms(2026, 1, 1, h, m, 0).unwrap()
    }

    /// S1 — happy path, no pauses.
    #[test]
    fn s1_happy_path() {
        let m = compute(&MetricInputs {
            hora_inicio: t(8, 0),
            hora_fin: t(9, 0),
            cantidad: 1000.0,
            std_referencia: 20.0,
            botes_buenos: 900.0,
            botes_malos: 100.0,
            tiempo_no_computable: 0.0,
            tiempo_pausado: 0.0,
        });
        assert_eq!(m.tiempo_total, 60.0);
        assert_eq!(m.tiempo_activo, 60.0);
        assert_eq!(m.disponibilidad, 1.0);
        assert!((m.rendimiento - 1000.0 / 1200.0).abs() < 1e-9);
        assert_eq!(m.calidad, 0.9);
        assert!((m.oee - (1.0 * (1000.0 / 1200.0) * 0.9)).abs() < 1e-9);
        assert!((m.std_real - 1000.0 / 60.0).abs() < 1e-9);
        assert_eq!(m.por_cump_pedido, 0.9);
    }

    /// S2 — non-computable pause shrinks tiempoTotal but not tiempoActivo.
    #[test]
    fn s2_non_computable_pause() {
        let m = compute(&MetricInputs {
            hora_inicio: t(8, 0),
            hora_fin: t(9, 0),
            cantidad: 1000.0,
            std_referencia: 20.0,
            botes_buenos: 800.0,
            botes_malos: 0.0,
            tiempo_no_computable: 15.0,
            tiempo_pausado: 0.0,
        });
        assert_eq!(m.tiempo_total, 45.0);
        assert_eq!(m.tiempo_activo, 45.0);
        assert_eq!(m.disponibilidad, 1.0);
        assert!((m.rendimiento - 800.0 / 900.0).abs() < 1e-9);
        assert_eq!(m.calidad, 1.0);
    }

    /// S5 — computable pause shrinks tiempoActivo, not tiempoTotal.
    #[test]
    fn s5_computable_pause_while_finalizing_paused() {
        let m = compute(&MetricInputs {
            hora_inicio: t(8, 0),
            hora_fin: t(8, 25),
            cantidad: 1000.0,
            std_referencia: 20.0,
            botes_buenos: 50.0,
            botes_malos: 0.0,
            tiempo_no_computable: 0.0,
            tiempo_pausado: 15.0,
        });
        assert_eq!(m.tiempo_total, 25.0);
        assert_eq!(m.tiempo_pausado, 15.0);
        assert_eq!(m.tiempo_activo, 10.0);
    }

    #[test]
    fn zero_total_time_does_not_divide_by_zero() {
        let m = compute(&MetricInputs {
            hora_inicio: t(8, 0),
            hora_fin: t(8, 0),
            cantidad: 10.0,
            std_referencia: 5.0,
            botes_buenos: 0.0,
            botes_malos: 0.0,
            tiempo_no_computable: 0.0,
            tiempo_pausado: 0.0,
        });
        assert_eq!(m.disponibilidad, 0.0);
        // tiempoActivo still clamps to 1.0 per spec.md's "clamp to avoid /0".
        assert_eq!(m.tiempo_activo, 1.0);
        assert_eq!(m.rendimiento, 0.0);
        assert_eq!(m.calidad, 0.0);
    }
}
