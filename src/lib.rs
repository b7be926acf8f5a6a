//! Cellflow — incremental dataflow recomputation.
//!
//! Declare cells that turn input variables into output variables, then ask
//! for targets. Only cells whose inputs changed since they last ran are
//! executed, once each, in dependency order.

pub mod cli;
pub mod core;
pub mod transport;
pub mod tripwire;

pub use crate::core::engine::Engine;
pub use crate::core::error::FlowError;
pub use crate::core::namespace::{Namespace, VarStore};
pub use crate::core::types::Body;
pub use crate::transport::Executor;
