//! Acumula Engine (C6, spec.md §4.6): the post-production manual-count
//! phase. Metrics are never touched here — they were already computed and
//! stored by `finalize` before the order entered ESPERA_MANUAL.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventBus};
use crate::locks::OrderLocks;
use crate::models::{Acumula, EstadoOrden, FinishManualDto, Order};
use crate::store::{acumula, orders, Store};
use crate::time::now;

use super::visibility;

pub struct AcumulaEngine {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    locks: Arc<OrderLocks>,
}

impl AcumulaEngine {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, locks: Arc<OrderLocks>) -> Self {
        Self { store, bus, locks }
    }

    /// `startManual(id)` (spec.md §4.6): requires estado=ESPERA_MANUAL and no
    /// open Acumula for the order.
    pub async fn start_manual(&self, id_order: i64) -> CoreResult<Order> {
        let _guard = self.locks.acquire(id_order).await;
        let now = now();

        let order = self.store.with_transaction(|tx| {
            let order = orders::get_by_id(tx, id_order)?;
            if order.estado != EstadoOrden::EsperaManual {
                return Err(CoreError::invalid_state(format!(
                    "startManual requires estado=ESPERA_MANUAL, order {id_order} is {}",
                    order.estado.as_str()
                )));
            }
            if let Some(existing) = acumula::get(tx, id_order)? {
                if existing.is_open() {
                    return Err(CoreError::invalid_state(format!(
                        "order {id_order} already has an open acumula"
                    )));
                }
            }
            acumula::start(tx, id_order, now)?;
            orders::set_acumula(tx, id_order, true)?;
            orders::set_estado(tx, id_order, EstadoOrden::ProcesoManual)
        })?;

        info!(order_id = id_order, "manual accumulation started");
        self.publish_state_changed(&order);
        self.refresh_visibility();
        Ok(order)
    }

    /// `finishManual(id, {numCajasManual})` (spec.md §4.6): requires
    /// estado=PROCESO_MANUAL and an open Acumula. Metrics are untouched.
    pub async fn finish_manual(&self, id_order: i64, dto: FinishManualDto) -> CoreResult<Order> {
        if dto.num_cajas_manual < 0.0 {
            return Err(CoreError::invalid_input("numCajasManual must be >= 0"));
        }
        let _guard = self.locks.acquire(id_order).await;
        let now = now();

        let (order, finished_acumula) = self.store.with_transaction(|tx| {
            let order = orders::get_by_id(tx, id_order)?;
            if order.estado != EstadoOrden::ProcesoManual {
                return Err(CoreError::invalid_state(format!(
                    "finishManual requires estado=PROCESO_MANUAL, order {id_order} is {}",
                    order.estado.as_str()
                )));
            }
            acumula::get(tx, id_order)?.filter(Acumula::is_open).ok_or_else(|| {
                CoreError::invalid_state(format!("order {id_order} has no open acumula to finish"))
            })?;
            let finished = acumula::finish(tx, id_order, dto.num_cajas_manual, now)?;
            let order = orders::set_estado(tx, id_order, EstadoOrden::Finalizada)?;
            Ok((order, finished))
        })?;

        info!(
            order_id = id_order,
            num_cajas_manual = finished_acumula.num_cajas_manual,
            "manual accumulation finished"
        );
        self.publish_state_changed(&order);
        self.refresh_visibility();
        Ok(order)
    }

    fn publish_state_changed(&self, order: &Order) {
        self.bus.publish_general_and_scoped(
            "orders",
            &format!("orders/{}", order.id),
            Event::new(
                "ORDER_STATE_CHANGED",
                format!("order {} is now {}", order.cod_order, order.estado.as_str()),
                json!({ "idOrder": order.id, "estado": order.estado.as_str() }),
            ),
        );
    }

    fn refresh_visibility(&self) {
        if let Err(e) = visibility::refresh(&self.store, &self.bus) {
            warn!(error = %e, "failed to refresh active-order projection");
        }
    }
}
