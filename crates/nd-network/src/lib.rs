//! nd-network: the contracts between links and the surrounding solver.
//!
//! Contains:
//! - node (lumped control volumes with additive flow collection)
//! - link (per-link solver I/O block, the FluidLink trait, port rebinding)
//!
//! The global admittance assembly, matrix solve, and time advance belong to
//! the external solver; this crate only defines what a link reads and
//! writes each tick.

pub mod error;
pub mod link;
pub mod node;

pub use error::{NetworkError, NetworkResult};
pub use link::{
    CONDUCTANCE_LIMIT, FluidLink, LinkIo, PortCommand, PortCommandState, PortDirection,
};
pub use node::{Node, NodeList};
