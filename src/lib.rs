//! Control core of a manufacturing-execution service for a bottle-packaging
//! line: order/pause state engine, bottle-counter ingest, automatic-pause
//! detection, and publish-subscribe notification over a relational store.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gpio;
pub mod locks;
pub mod models;
pub mod store;
pub mod time;

pub use config::Config;
pub use engine::Engines;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use events::EventBus;
pub use locks::OrderLocks;
pub use store::Store;
