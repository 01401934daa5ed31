//! nd-links: the accumulator family of fluid-network links.
//!
//! Contains:
//! - accumulator (two-chamber bellows accumulator with spring pressurizer)
//! - accumulator_gas (gas pressurizer chamber layered on the accumulator)
//! - evaporation (selective-species pool evaporation to a gas node)
//! - heater (heat injection without flow)
//! - membrane (selective-membrane species transfer with phase-change heat)

pub mod accumulator;
pub mod accumulator_gas;
pub mod error;
pub mod evaporation;
pub mod heater;
pub mod membrane;

pub use accumulator::{
    Accumulator, AccumulatorCheckpoint, AccumulatorConfig, AccumulatorInput, BellowsZone, FillMode,
};
pub use accumulator_gas::{GasChamberCheckpoint, GasChamberConfig};
pub use error::{LinkError, LinkResult};
pub use evaporation::{EvaporationConfig, EvaporationInput, EvaporationLink};
pub use heater::{Heater, HeaterConfig, HeaterInput};
pub use membrane::{SelectiveMembrane, SelectiveMembraneConfig, SelectiveMembraneInput};
