//! Counter Ingest (C8, spec.md §4.8): falling edges on the counter pin
//! become per-order bottle counts, attributed only to the order currently
//! EN_PROCESO.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventBus};
use crate::locks::OrderLocks;
use crate::store::{orders, Store};
use crate::time::now;

use super::link::GpioLink;

/// Spawns the task that turns counter-pin falling edges into bottle counts.
/// Lives in `gpio` rather than `engine` so the engine layer never has to
/// know the GPIO link exists; this task calls straight into `crate::store`.
pub fn spawn(
    gpio: Arc<GpioLink>,
    counter_pin: u32,
    store: Arc<Store>,
    bus: Arc<EventBus>,
    locks: Arc<OrderLocks>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut events = gpio.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                event = events.recv() => {
                    let event = match event {
                        Ok(e) => e,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "counter ingest lagged behind gpio link");
                            continue;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    };
                    if event.pin != counter_pin {
                        continue;
                    }
                    // Falling edge: previous=1, current=0 (spec.md §4.8).
                    if event.previous == 1 && event.value == 0 {
                        if let Err(e) = ingest_pulse(&store, &bus, &locks).await {
                            warn!(error = %e, "counter ingest pulse dropped due to error");
                        }
                    }
                }
            }
        }
    });
}

/// Two-phase selection: find the candidate order without holding any lock,
/// then lock it and revalidate inside the write transaction, so a pulse
/// never attributes to an order that stopped being EN_PROCESO between the
/// two steps (spec.md §4.1's "reads reissued inside the write transaction").
/// If the revalidation finds the order changed out from under it, this is a
/// real concurrent mutation — re-read-and-fail with `Conflict` rather than
/// silently attributing, or not attributing, a pulse the caller can't see
/// (spec.md §7).
async fn ingest_pulse(store: &Store, bus: &EventBus, locks: &OrderLocks) -> CoreResult<()> {
    let candidate = store.with_transaction(|tx| {
        Ok(orders::most_recently_started_en_proceso(tx)?.map(|o| o.id))
    })?;

    let Some(id_order) = candidate else {
        debug!("counter pulse dropped: no order is EN_PROCESO");
        return Ok(());
    };

    let _guard = locks.acquire(id_order).await;
    let now = now();

    let counter = store.with_transaction(|tx| {
        let order = match orders::most_recently_started_en_proceso(tx)? {
            Some(o) if o.id == id_order => o,
            _ => {
                return Err(CoreError::conflict(format!(
                    "order {id_order} stopped being EN_PROCESO between candidate selection and commit"
                )))
            }
        };
        crate::store::counters::increment_for_order(tx, order.id, now)
    })?;

    bus.publish_general_and_scoped(
        "bottle-counter",
        &format!("bottle-counter/{id_order}"),
        Event::new(
            "BOTTLE_COUNTER_UPDATE",
            format!("order {id_order} counter now at {}", counter.quantity),
            json!({ "idOrder": id_order, "quantity": counter.quantity }),
        ),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSpec;

    fn make_order_spec(cod_order: &str) -> OrderSpec {
        OrderSpec {
            cod_order: cod_order.to_string(),
            operario: "A".to_string(),
            lote: "L1".to_string(),
            articulo: "X".to_string(),
            descripcion: String::new(),
            cantidad: 1000.0,
            botes_caja: 10.0,
            std_referencia: 20.0,
            formato_bote: "500ml".to_string(),
            tipo: "Conserva".to_string(),
            uds_bote: 500.0,
            repercap: false,
        }
    }

    /// Invariant #7 (spec.md §8): a pulse with no order EN_PROCESO is
    /// dropped, not misattributed.
    #[tokio::test]
    async fn drops_pulse_when_no_order_en_proceso() {
        let store = Store::open_in_memory().unwrap();
        let bus = EventBus::new();
        let locks = OrderLocks::new();

        ingest_pulse(&store, &bus, &locks).await.unwrap();

        store
            .with_transaction(|tx| {
                assert!(orders::most_recently_started_en_proceso(tx)?.is_none());
                Ok(())
            })
            .unwrap();
    }

    /// Invariant #7: N falling edges while exactly one order is EN_PROCESO
    /// increment its counter by exactly N.
    #[tokio::test]
    async fn increments_counter_for_the_en_proceso_order() {
        let store = Store::open_in_memory().unwrap();
        let bus = EventBus::new();
        let locks = OrderLocks::new();
        let mut events = bus.subscribe("bottle-counter");

        let id_order = store
            .with_transaction(|tx| {
                let order = orders::insert_order(tx, &make_order_spec("OF-1"), now())?;
                orders::iniciar(tx, order.id, now())?;
                Ok(order.id)
            })
            .unwrap();

        for _ in 0..3 {
            ingest_pulse(&store, &bus, &locks).await.unwrap();
        }

        let counter = store
            .with_transaction(|tx| Ok(crate::store::counters::get_by_order(tx, id_order)?.unwrap()))
            .unwrap();
        assert_eq!(counter.quantity, 3);

        let event = events.try_recv().expect("at least one publish landed");
        assert_eq!(event.event_type, "BOTTLE_COUNTER_UPDATE");
    }

    /// spec.md §7: an order that stops being EN_PROCESO between candidate
    /// selection and lock acquisition surfaces `Conflict`, not a silent drop.
    #[tokio::test]
    async fn conflict_when_order_stops_being_en_proceso_mid_flight() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let locks = Arc::new(OrderLocks::new());

        let id_order = store
            .with_transaction(|tx| {
                let order = orders::insert_order(tx, &make_order_spec("OF-1"), now())?;
                orders::iniciar(tx, order.id, now())?;
                Ok(order.id)
            })
            .unwrap();

        // Hold the order's lock so the spawned pulse blocks between finding
        // its candidate and revalidating it.
        let guard = locks.acquire(id_order).await;

        let store_clone = store.clone();
        let locks_clone = locks.clone();
        let handle = tokio::spawn(async move {
            ingest_pulse(&store_clone, &EventBus::new(), &locks_clone).await
        });

        tokio::task::yield_now().await;
        store
            .with_transaction(|tx| {
                orders::finalize(
                    tx,
                    id_order,
                    900.0,
                    100.0,
                    90.0,
                    false,
                    crate::models::EstadoOrden::Finalizada,
                    now(),
                )?;
                Ok(())
            })
            .unwrap();
        drop(guard);

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }
}
