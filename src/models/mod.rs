pub mod acumula;
pub mod audit;
pub mod counter;
pub mod metrics;
pub mod order;
pub mod pause;

pub use acumula::{Acumula, FinishManualDto};
pub use audit::OrderDeleteAudit;
pub use counter::BottleCounter;
pub use metrics::Metricas;
pub use order::{EstadoOrden, ExtraData, FinishDto, Order, OrderSpec};
pub use pause::{ClosePauseDto, OpenPauseDto, Pause, TipoPausa};
