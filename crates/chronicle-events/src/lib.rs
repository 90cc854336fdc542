//! The event bus for the Chronicle telemetry engine.
//!
//! Producers hand [`EventRecord`](chronicle_types::EventRecord)s to
//! [`EventBus::send`]; every subscriber's [`EventSubscriber::notify`] runs
//! inline, in subscription order, before `send` returns. The stats tracker
//! and the achievements tracker are the two canonical subscribers.
//!
//! # Modules
//!
//! - [`bus`] -- The bus itself and the [`EventSubscriber`] trait
//! - [`error`] -- [`BusError`] for subscription bookkeeping mistakes

pub mod bus;
pub mod error;

pub use bus::{EventBus, EventSubscriber};
pub use error::BusError;
