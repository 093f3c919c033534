//! Visibility Projector (C10, spec.md §4.10). Computes the single "active
//! visible order", breaking the Order/Pause/Fabricación-parcial cycle the
//! source had (spec.md §9): engines emit low-level facts, this component
//! computes the projection instead of Order and Pause notifying each other
//! directly.

use rusqlite::{params, Transaction};
use serde_json::json;

use crate::error::CoreResult;
use crate::events::{Event, EventBus};
use crate::models::{EstadoOrden, Order, TipoPausa};
use crate::store::{orders, pauses};

/// The order meeting spec.md §4.10's definition, most recently started.
pub fn active_visible_order(tx: &Transaction) -> CoreResult<Option<Order>> {
    let mut candidates: Vec<Order> = Vec::new();

    for order in orders::list_en_proceso(tx)? {
        candidates.push(order);
    }

    for order in list_pausada(tx)? {
        if let Some(open) = pauses::get_open(tx, order.id)? {
            if open.tipo != Some(TipoPausa::FabricacionParcial) {
                candidates.push(order);
            }
        }
    }

    candidates.sort_by(|a, b| {
        let a_key = a.hora_inicio.is_none();
        let b_key = b.hora_inicio.is_none();
        a_key
            .cmp(&b_key)
            .then_with(|| b.hora_inicio.cmp(&a.hora_inicio))
    });

    Ok(candidates.into_iter().next())
}

fn list_pausada(tx: &Transaction) -> CoreResult<Vec<Order>> {
    let sql = "SELECT id FROM orders WHERE estado = ?1";
    let mut stmt = tx.prepare(sql)?;
    let ids: Vec<i64> = stmt
        .query_map(params![EstadoOrden::Pausada.as_str()], |r| r.get(0))?
        .collect::<Result<_, _>>()?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(orders::get_by_id(tx, id)?);
    }
    Ok(out)
}

/// Refreshes the projection and publishes `ACTIVE_ORDER_CHANGED` (spec.md
/// §4.10). Called after iniciar, finalize, openPause, closePause, and any
/// manual pause mutation that could change the projection. Must run after
/// the transaction that produced the new state has committed — same
/// publish-after-commit discipline as every other event (spec.md §4.2).
pub fn refresh(store: &crate::store::Store, bus: &EventBus) -> CoreResult<()> {
    let projection = store.with_transaction(|tx| {
        active_visible_order(tx)
            .map(|o| o.map(|order| json!({ "idOrder": order.id, "codOrder": order.cod_order })))
    })?;

    let data = projection.unwrap_or(serde_json::Value::Null);
    bus.publish(
        "active-order",
        Event::new("ACTIVE_ORDER_CHANGED", "active order projection refreshed", data),
    );
    Ok(())
}
