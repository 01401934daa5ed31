use nd_tables::TableError;
use thiserror::Error;

pub type FluidResult<T> = Result<T, FluidError>;

#[derive(Error, Debug, Clone)]
pub enum FluidError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Non-physical value: {what}")]
    NonPhysical { what: &'static str },

    #[error("No saturation data for species {species}")]
    NoSaturationData { species: &'static str },

    #[error("Property fit error: {0}")]
    Fit(#[from] TableError),
}
