//! Order Engine (C3, spec.md §4.3): state transitions, invariant
//! enforcement, derived-field computation, cross-component orchestration.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::engine::metrics;
use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventBus};
use crate::locks::OrderLocks;
use crate::models::{EstadoOrden, FinishDto, Order, OrderSpec};
use crate::store::{self, orders, Store};
use crate::time::now;

use super::visibility;

pub struct OrderEngine {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    locks: Arc<OrderLocks>,
}

impl OrderEngine {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, locks: Arc<OrderLocks>) -> Self {
        Self { store, bus, locks }
    }

    /// `createOrder(spec)` (spec.md §4.3). No per-order lock: the order
    /// doesn't exist yet, so there is nothing to serialize against besides
    /// the `codOrder` uniqueness check the transaction itself performs.
    pub fn create_order(&self, spec: OrderSpec) -> CoreResult<Order> {
        spec.validate()?;
        let now = now();
        let order = self
            .store
            .with_transaction(|tx| orders::insert_order(tx, &spec, now))?;

        info!(order_id = order.id, cod_order = %order.cod_order, "order created");
        self.bus.publish_general_and_scoped(
            "orders",
            &format!("orders/{}", order.id),
            Event::new(
                "ORDER_CREATED",
                format!("order {} created", order.cod_order),
                json!({
                    "idOrder": order.id,
                    "codOrder": order.cod_order,
                    "cajasPrevistas": order.cajas_previstas(),
                    "tiempoEstimado": order.tiempo_estimado(),
                }),
            ),
        );
        Ok(order)
    }

    /// `iniciar(id)` (spec.md §4.3): CREADA -> EN_PROCESO, activates the
    /// order's bottle counter, refreshes the visible-order projection.
    pub async fn iniciar(&self, id: i64) -> CoreResult<Order> {
        let _guard = self.locks.acquire(id).await;
        let now = now();

        let order = self.store.with_transaction(|tx| {
            let order = orders::get_by_id(tx, id)?;
            if order.estado != EstadoOrden::Creada {
                return Err(CoreError::invalid_state(format!(
                    "iniciar requires estado=CREADA, order {id} is {}",
                    order.estado.as_str()
                )));
            }
            if let Some(other) = orders::list_en_proceso(tx)?.into_iter().next() {
                return Err(CoreError::invalid_state(format!(
                    "invariant violated: order {} is already EN_PROCESO, cannot start order {id}",
                    other.id
                )));
            }
            let order = orders::iniciar(tx, id, now)?;
            store::counters::activate(tx, id, now)?;
            Ok(order)
        })?;

        info!(order_id = id, "order started");
        self.publish_state_changed(&order);
        self.refresh_visibility();
        Ok(order)
    }

    /// `finalize(id, finishDto)` (spec.md §4.3): the only point where
    /// Metricas is ever created for an order.
    pub async fn finalize(&self, id: i64, dto: FinishDto) -> CoreResult<Order> {
        validate_finish_dto(&dto)?;
        let _guard = self.locks.acquire(id).await;
        let now = now();

        let order = self.store.with_transaction(|tx| {
            let order = orders::get_by_id(tx, id)?;
            if !matches!(order.estado, EstadoOrden::EnProceso | EstadoOrden::Pausada) {
                return Err(CoreError::invalid_state(format!(
                    "finalize requires estado in {{EN_PROCESO, PAUSADA}}, order {id} is {}",
                    order.estado.as_str()
                )));
            }

            if order.estado == EstadoOrden::Pausada {
                if let Some(open) = store::pauses::get_open(tx, id)? {
                    store::pauses::auto_close(tx, &open, now)?;
                }
            }

            if store::pauses::get_open(tx, id)?.is_some() {
                return Err(CoreError::invalid_state(
                    "an open pause remains after cascading closure",
                ));
            }

            let nuevo_estado = if dto.acumula {
                EstadoOrden::EsperaManual
            } else {
                EstadoOrden::Finalizada
            };

            let order = orders::finalize(
                tx,
                id,
                dto.botes_buenos,
                dto.botes_malos,
                dto.total_cajas_cierre,
                dto.acumula,
                nuevo_estado,
                now,
            )?;

            metrics::calc_and_store(tx, &order)?;

            if nuevo_estado == EstadoOrden::Finalizada {
                store::counters::deactivate(tx, id, now)?;
            }

            Ok(order)
        })?;

        info!(order_id = id, new_estado = order.estado.as_str(), "order finalized");
        self.publish_state_changed(&order);
        self.refresh_visibility();
        Ok(order)
    }

    /// Delete path: writes a `DeleteAudit` snapshot before removing the
    /// order (spec.md §3: "never deleted except through the Delete path
    /// that writes a DeleteAudit first").
    pub async fn delete_order(
        &self,
        id: i64,
        deleted_by: &str,
        motivo: &str,
        ip_address: Option<&str>,
    ) -> CoreResult<()> {
        let _guard = self.locks.acquire(id).await;
        let now = now();

        self.store.with_transaction(|tx| {
            let order = orders::get_by_id(tx, id)?;
            let snapshot = serde_json::to_string(&order)?;
            store::audit::insert(tx, id, &snapshot, deleted_by, motivo, now, ip_address)?;
            orders::delete_order(tx, id)
        })?;

        info!(order_id = id, deleted_by, "order deleted");
        self.bus.publish_general_and_scoped(
            "orders",
            &format!("orders/{id}"),
            Event::new("ORDER_DELETED", format!("order {id} deleted"), json!({ "idOrder": id })),
        );
        self.refresh_visibility();
        Ok(())
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

fn validate_finish_dto(dto: &FinishDto) -> CoreResult<()> {
    if dto.botes_buenos < 0.0 || dto.botes_malos < 0.0 || dto.total_cajas_cierre < 0.0 {
        return Err(CoreError::invalid_input(
            "botesBuenos, botesMalos and totalCajasCierre must be >= 0",
        ));
    }
    Ok(())
}
