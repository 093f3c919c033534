//! End-to-end scenarios driven through the public engine API against an
//! in-memory store (spec.md §8). Exact metric-formula assertions (S1, S2,
//! S5, the zero-division guard) live as pure-function tests in
//! `engine::metrics` instead, since these async paths sample `now()` from
//! the real clock and can't be pinned to the scenarios' literal T0 deltas.
//! What's verified here is the wiring and the invariants: state transitions,
//! at-most-one-open-pause, at-most-one-EN_PROCESO-order, counter
//! attribution, acumula handoff, and `recalcularMetricas` idempotence.

use std::sync::Arc;

use cremer_core::error::ErrorKind;
use cremer_core::events::EventBus;
use cremer_core::locks::OrderLocks;
use cremer_core::models::{
    ClosePauseDto, FinishDto, FinishManualDto, OpenPauseDto, OrderSpec,
};
use cremer_core::store::{counters, orders};
use cremer_core::{Engines, Store};

fn spec(cod_order: &str) -> OrderSpec {
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

fn build_engines() -> (Arc<Store>, Engines) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bus = Arc::new(EventBus::new());
    let locks = Arc::new(OrderLocks::new());
    let engines = Engines::new(store.clone(), bus, locks);
    (store, engines)
}

/// S1 derived fields, createOrder leg only (the timed metric portion of S1
/// is covered by `engine::metrics::tests::s1_happy_path`).
#[tokio::test]
async fn create_order_derives_cajas_previstas_and_tiempo_estimado() {
    let (_store, engines) = build_engines();
    let order = engines.orders.create_order(spec("OF-1")).unwrap();
    assert_eq!(order.cajas_previstas(), 100.0);
    assert_eq!(order.tiempo_estimado(), 50.0);
    assert_eq!(order.estado.as_str(), "CREADA");
}

/// Full CREADA -> EN_PROCESO -> FINALIZADA leg, no acumula.
#[tokio::test]
async fn happy_path_without_acumula_reaches_finalizada() {
    let (_store, engines) = build_engines();
    let order = engines.orders.create_order(spec("OF-1")).unwrap();

    let order = engines.orders.iniciar(order.id).await.unwrap();
    assert_eq!(order.estado.as_str(), "EN_PROCESO");
    assert!(order.hora_inicio.is_some());

    let order = engines
        .orders
        .finalize(
            order.id,
            FinishDto {
                botes_buenos: 900.0,
                botes_malos: 100.0,
                total_cajas_cierre: 90.0,
                acumula: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(order.estado.as_str(), "FINALIZADA");
    assert!(order.hora_fin.is_some());
}

/// Invariant #2 (§8): at most one open Pause per order.
#[tokio::test]
async fn invariant_at_most_one_open_pause_per_order() {
    let (_store, engines) = build_engines();
    let order = engines.orders.create_order(spec("OF-1")).unwrap();
    let order = engines.orders.iniciar(order.id).await.unwrap();

    engines
        .pauses
        .open_pause(order.id, OpenPauseDto::default())
        .await
        .unwrap();

    let err = engines
        .pauses
        .open_pause(order.id, OpenPauseDto::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

/// Invariant #3 (§8): at most one Order EN_PROCESO system-wide.
#[tokio::test]
async fn invariant_at_most_one_order_en_proceso() {
    let (_store, engines) = build_engines();
    let a = engines.orders.create_order(spec("OF-A")).unwrap();
    let b = engines.orders.create_order(spec("OF-B")).unwrap();

    engines.orders.iniciar(a.id).await.unwrap();

    let err = engines.orders.iniciar(b.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

/// S3 — counter attribution: once A finalizes, B may start and accrue its
/// own counter, untouched by A's prior count.
#[tokio::test]
async fn s3_counter_attribution_follows_the_active_order() {
    let (store, engines) = build_engines();

    let a = engines.orders.create_order(spec("OF-A")).unwrap();
    let a = engines.orders.iniciar(a.id).await.unwrap();

    // Five falling edges while A is EN_PROCESO.
    for _ in 0..5 {
        bump_counter_for_en_proceso_order(&store);
    }
    let counter_a = counter_for(&store, a.id);
    assert_eq!(counter_a.quantity, 5);

    engines
        .orders
        .finalize(
            a.id,
            FinishDto {
                botes_buenos: 900.0,
                botes_malos: 0.0,
                total_cajas_cierre: 90.0,
                acumula: false,
            },
        )
        .await
        .unwrap();

    let b = engines.orders.create_order(spec("OF-B")).unwrap();
    let b = engines.orders.iniciar(b.id).await.unwrap();

    for _ in 0..3 {
        bump_counter_for_en_proceso_order(&store);
    }

    let counter_a = counter_for(&store, a.id);
    let counter_b = counter_for(&store, b.id);
    assert_eq!(counter_a.quantity, 5, "A's counter must not move once finalized");
    assert_eq!(counter_b.quantity, 3);
}

/// Mirrors `gpio::counter_ingest::ingest_pulse`'s two-phase attribution: find
/// the current EN_PROCESO order, then increment its counter.
fn bump_counter_for_en_proceso_order(store: &Store) {
    store
        .with_transaction(|tx| {
            let id_order = orders::most_recently_started_en_proceso(tx)?
                .expect("an order must be EN_PROCESO")
                .id;
            counters::increment_for_order(tx, id_order, cremer_core::time::now())?;
            Ok(())
        })
        .unwrap();
}

fn counter_for(store: &Store, id_order: i64) -> cremer_core::models::BottleCounter {
    store
        .with_transaction(|tx| Ok(counters::get_by_order(tx, id_order)?.expect("counter exists")))
        .unwrap()
}

/// S6 — closePause requires a resolvable tipo (stored or supplied), else
/// InvalidInput; once given, the second attempt succeeds.
#[tokio::test]
async fn s6_close_pause_without_resolvable_tipo_then_with_one() {
    let (_store, engines) = build_engines();
    let order = engines.orders.create_order(spec("OF-1")).unwrap();
    let order = engines.orders.iniciar(order.id).await.unwrap();

    engines
        .pauses
        .open_pause(
            order.id,
            OpenPauseDto {
                tipo: None,
                descripcion: None,
                operario: None,
            },
        )
        .await
        .unwrap();

    let err = engines
        .pauses
        .close_pause(
            order.id,
            ClosePauseDto {
                tipo: Some("NOT_A_REAL_TIPO".to_string()),
                descripcion: None,
                operario: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let pause = engines
        .pauses
        .close_pause(
            order.id,
            ClosePauseDto {
                tipo: Some("FALTA_MATERIAL".to_string()),
                descripcion: None,
                operario: None,
            },
        )
        .await
        .unwrap();
    assert!(!pause.is_open());
    assert_eq!(pause.tipo.unwrap().as_str(), "FALTA_MATERIAL");
}

/// Manual-accumulation handoff (C6, spec.md §4.6): finalize with
/// acumula=true parks the order in ESPERA_MANUAL rather than finishing it;
/// startManual/finishManual complete it without touching metrics.
#[tokio::test]
async fn acumula_handoff_reaches_finalizada_without_recomputing_metrics() {
    let (_store, engines) = build_engines();
    let order = engines.orders.create_order(spec("OF-1")).unwrap();
    let order = engines.orders.iniciar(order.id).await.unwrap();

    let order = engines
        .orders
        .finalize(
            order.id,
            FinishDto {
                botes_buenos: 900.0,
                botes_malos: 100.0,
                total_cajas_cierre: 90.0,
                acumula: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(order.estado.as_str(), "ESPERA_MANUAL");
    assert!(order.acumula);

    let order = engines.acumula.start_manual(order.id).await.unwrap();
    assert_eq!(order.estado.as_str(), "PROCESO_MANUAL");

    let order = engines
        .acumula
        .finish_manual(order.id, FinishManualDto { num_cajas_manual: 5.0 })
        .await
        .unwrap();
    assert_eq!(order.estado.as_str(), "FINALIZADA");

    // startManual is rejected once the order has already left ESPERA_MANUAL.
    let err = engines.acumula.start_manual(order.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

/// Invariant #9 (§8): `recalcularMetricas` is idempotent.
#[tokio::test]
async fn recalcular_metricas_is_idempotent() {
    let (store, engines) = build_engines();
    let order = engines.orders.create_order(spec("OF-1")).unwrap();
    let order = engines.orders.iniciar(order.id).await.unwrap();
    let order = engines
        .orders
        .finalize(
            order.id,
            FinishDto {
                botes_buenos: 900.0,
                botes_malos: 100.0,
                total_cajas_cierre: 90.0,
                acumula: false,
            },
        )
        .await
        .unwrap();

    let first = cremer_core::engine::metrics::recalcular(&store, order.id).unwrap();
    let second = cremer_core::engine::metrics::recalcular(&store, order.id).unwrap();
    let third = cremer_core::engine::metrics::recalcular(&store, order.id).unwrap();

    assert_eq!(first.tiempo_total, second.tiempo_total);
    assert_eq!(second.tiempo_total, third.tiempo_total);
    assert_eq!(first.oee, second.oee);
    assert_eq!(second.oee, third.oee);
}
