//! Field-I/O ingest: the GPIO Link (C7), Counter Ingest (C8), and
//! Auto-Pause Detector (C9). None of these depend on `crate::engine` except
//! through `PauseEngine`'s public API (auto-pause) — counter ingest writes
//! straight through `crate::store` the same way the engine layer's
//! `iniciar`/`finalize` do, so there is no cycle between `engine` and `gpio`.

pub mod autopause;
pub mod counter_ingest;
pub mod link;
pub mod wire;

pub use autopause::AutoPauseConfig;
pub use link::{GpioLink, PinEvent};
