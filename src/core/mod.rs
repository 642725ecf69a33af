//! Runtime core: the bus facade and its construction.
//!
//! The public API from this module is [`MessageBus`], its builder and the
//! configuration types.
//!
//! Internal modules:
//! - [`bus`]: subscribe/publish/shutdown facade shared by clones;
//! - [`builder`]: wires the error funnel, registry and dispatch strategy;
//! - [`config`]: construction-time settings and their sentinels.

mod builder;
mod bus;
mod config;

pub use builder::MessageBusBuilder;
pub use bus::MessageBus;
pub use config::{Config, DispatchMode, Synchrony};
