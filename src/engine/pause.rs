//! Pause Engine (C4, spec.md §4.4): two-phase pause open/close, computable
//! vs non-computable bookkeeping.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventBus};
use crate::locks::OrderLocks;
use crate::models::{ClosePauseDto, EstadoOrden, OpenPauseDto, Pause, TipoPausa};
use crate::store::{orders, pauses, Store};
use crate::time::now;

use super::visibility;

pub struct PauseEngine {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    locks: Arc<OrderLocks>,
}

impl PauseEngine {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, locks: Arc<OrderLocks>) -> Self {
        Self { store, bus, locks }
    }

    /// Open a pause (spec.md §4.4). Requires estado=EN_PROCESO and no open
    /// pause for the order.
    pub async fn open_pause(&self, id_order: i64, dto: OpenPauseDto) -> CoreResult<Pause> {
        let _guard = self.locks.acquire(id_order).await;
        let now = now();

        let tipo = parse_tipo(dto.tipo.as_deref())?;
        let pause = self.store.with_transaction(|tx| {
            let order = orders::get_by_id(tx, id_order)?;
            if order.estado != EstadoOrden::EnProceso {
                return Err(CoreError::invalid_state(format!(
                    "openPause requires estado=EN_PROCESO, order {id_order} is {}",
                    order.estado.as_str()
                )));
            }
            if pauses::get_open(tx, id_order)?.is_some() {
                return Err(CoreError::invalid_state(format!(
                    "order {id_order} already has an open pause"
                )));
            }
            let pause = pauses::open(tx, id_order, tipo, dto.descripcion.clone(), dto.operario.clone(), now)?;
            orders::set_estado(tx, id_order, EstadoOrden::Pausada)?;
            Ok(pause)
        })?;

        info!(order_id = id_order, pause_id = pause.id, tipo = ?pause.tipo, "pause opened");
        self.publish_pause_event("PAUSE_CREATED", &pause);
        self.refresh_visibility();
        Ok(pause)
    }

    /// Close the order's open pause (spec.md §4.4). `closePause` requires a
    /// tipo to resolve one way or another (stored or supplied) —
    /// otherwise `InvalidInput` (S6).
    pub async fn close_pause(&self, id_order: i64, dto: ClosePauseDto) -> CoreResult<Pause> {
        let _guard = self.locks.acquire(id_order).await;
        let now = now();

        let tipo_override = parse_tipo(dto.tipo.as_deref())?;
        let pause = self.store.with_transaction(|tx| {
            let open = pauses::get_open(tx, id_order)?.ok_or_else(|| {
                CoreError::invalid_state(format!("order {id_order} has no open pause to close"))
            })?;
            let closed = pauses::close(
                tx,
                &open,
                tipo_override,
                dto.descripcion.clone(),
                dto.operario.clone(),
                now,
            )?;
            orders::set_estado(tx, id_order, EstadoOrden::EnProceso)?;
            Ok(closed)
        })?;

        info!(order_id = id_order, pause_id = pause.id, tipo = ?pause.tipo, "pause closed");
        self.publish_pause_event("PAUSE_FINISHED", &pause);
        self.refresh_visibility();
        Ok(pause)
    }

    /// spec.md §4.4: publishes `event_type` on the order's own channel, then
    /// refreshes the topic set by tipo — `FABRICACION_PARCIAL` gets
    /// `FABRICACION_PARCIAL_UPDATE`, every other tipo gets
    /// `PAUSES_NON_PARTIAL_UPDATE`.
    fn publish_pause_event(&self, event_type: &'static str, pause: &Pause) {
        let data = json!({
            "idOrder": pause.id_order,
            "pauseId": pause.id,
            "tipo": pause.tipo.map(|t| t.as_str()),
            "computa": pause.computa,
        });
        let message = format!("pause {} for order {}", event_type, pause.id_order);
        self.bus.publish_general_and_scoped(
            "orders",
            &format!("orders/{}", pause.id_order),
            Event::new(event_type, message.clone(), data.clone()),
        );

        let (topic, partial_event_type) = match pause.tipo {
            Some(TipoPausa::FabricacionParcial) => ("fabricacion-parcial", "FABRICACION_PARCIAL_UPDATE"),
            _ => ("pauses-non-partial", "PAUSES_NON_PARTIAL_UPDATE"),
        };
        self.bus.publish(topic, Event::new(partial_event_type, message, data));
    }

    fn refresh_visibility(&self) {
        if let Err(e) = visibility::refresh(&self.store, &self.bus) {
            warn!(error = %e, "failed to refresh active-order projection");
        }
    }
}

fn parse_tipo(s: Option<&str>) -> CoreResult<Option<TipoPausa>> {
    s.map(TipoPausa::from_str).transpose()
}
