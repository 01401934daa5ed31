//! nd-fluids: species data, compositions, fluid state, and the saturation
//! property catalog.
//!
//! This crate is the reference implementation of the fluid-property contract
//! consumed by the network links: a small species set with static data, a
//! normalized-composition type, the mutable chamber fluid object, and the
//! read-only catalog of saturation curve fits.

pub mod catalog;
pub mod composition;
pub mod error;
pub mod species;
pub mod state;

pub use catalog::PropertyCatalog;
pub use composition::Composition;
pub use error::{FluidError, FluidResult};
pub use species::{Phase, Species};
pub use state::{Fluid, FluidInput};

/// Universal gas constant [kJ/(kmol*K)]; with pressure in kPa this keeps the
/// ideal-gas algebra in network-native units.
pub const R_UNIVERSAL: f64 = 8.31446;
