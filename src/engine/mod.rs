//! Engine layer: the components that own state transitions (C3, C4, C6),
//! the metric calculator (C5), and the visibility projector (C10). GPIO
//! ingest (C7-C9, `crate::gpio`) calls straight into `crate::store` for
//! counter bookkeeping instead of depending on this module, so there is no
//! cycle between the two.

pub mod acumula;
pub mod metrics;
pub mod order;
pub mod pause;
pub mod visibility;

use std::sync::Arc;

use crate::events::EventBus;
use crate::locks::OrderLocks;
use crate::store::Store;

pub use acumula::AcumulaEngine;
pub use order::OrderEngine;
pub use pause::PauseEngine;

/// Bundles the three order-mutating engines behind the shared `Store`,
/// `EventBus` and `OrderLocks` they all need, so `main` constructs each of
/// these exactly once. Each engine is `Arc`-wrapped so other long-lived
/// tasks (the Auto-Pause Detector holds its own `Arc<PauseEngine>`) can
/// share the same instance instead of standing up a redundant one.
pub struct Engines {
    pub orders: Arc<OrderEngine>,
    pub pauses: Arc<PauseEngine>,
    pub acumula: Arc<AcumulaEngine>,
}

impl Engines {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, locks: Arc<OrderLocks>) -> Self {
        Self {
            orders: Arc::new(OrderEngine::new(store.clone(), bus.clone(), locks.clone())),
            pauses: Arc::new(PauseEngine::new(store.clone(), bus.clone(), locks.clone())),
            acumula: Arc::new(AcumulaEngine::new(store, bus, locks)),
        }
    }
}
