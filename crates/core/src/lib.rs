//! Control-plane core for the fats application-hosting platform.
//!
//! This crate has no network surface of its own; `fatsd` wires it to HTTP.
//! It owns: the persisted desired/actual state ([`store`]), the subprocess
//! gateway to the container engine and build tools ([`subprocess`],
//! [`container`], [`builder`]), the reconciliation loop that converges them
//! ([`reconciler`], [`generation`], [`scheduler`]), and proxy resolution
//! ([`proxy`]).

pub mod builder;
pub mod config;
pub mod container;
pub mod error;
pub mod generation;
pub mod name;
pub mod network;
pub mod proxy;
pub mod reconciler;
pub mod scheduler;
pub mod secrets;
pub mod store;
pub mod subprocess;

pub use builder::{BuilderConfig, build_from_archive};
pub use config::AppConfig;
pub use container::ContainerManager;
pub use error::{IngressError, ToolError};
pub use generation::{Generation, GenerationRegistry};
pub use network::NetworkManager;
pub use proxy::ProxyResolver;
pub use reconciler::{ContainerOps, PassReport, Reconciler};
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use store::Store;
