//! Read-only saturation property catalog.
//!
//! Built once at startup and shared by reference through link init contexts.
//! Only the water pair carries saturation data; asking for any other species
//! is a hard error so misconfigured phase-change links fail at init.

use nd_tables::{HeatOfVaporizationFit, SaturationTemperatureFit};

use crate::error::{FluidError, FluidResult};
use crate::species::Species;

/// Water saturation curve: log10(p_sat [kPa]) = A + B*(Tc/T) + C*(Tc/T)^2.
const WATER_SAT_A: f64 = 6.993;
const WATER_SAT_B: f64 = -2.421;
const WATER_SAT_C: f64 = -0.2622;
/// Water heat of vaporization: L [kJ/kg] = A * (1 - Tr)^beta.
const WATER_HVAP_A: f64 = 3128.0;
const WATER_HVAP_ALPHA: f64 = 0.0;
const WATER_HVAP_BETA: f64 = 0.38;

const WATER_SAT_MIN_P: f64 = 0.62; // kPa, triple-point neighborhood
const WATER_SAT_MAX_P: f64 = 1554.0; // kPa, ~473 K
const WATER_HVAP_MIN_TR: f64 = 0.42;
const WATER_HVAP_MAX_TR: f64 = 0.95;

/// Process-wide fluid saturation properties.
#[derive(Debug)]
pub struct PropertyCatalog {
    water_tsat: SaturationTemperatureFit,
    water_hvap: HeatOfVaporizationFit,
}

impl PropertyCatalog {
    pub fn new() -> FluidResult<Self> {
        Ok(Self {
            water_tsat: SaturationTemperatureFit::new(
                WATER_SAT_A,
                WATER_SAT_B,
                WATER_SAT_C,
                WATER_SAT_MIN_P,
                WATER_SAT_MAX_P,
            )?,
            water_hvap: HeatOfVaporizationFit::new(
                WATER_HVAP_A,
                WATER_HVAP_ALPHA,
                WATER_HVAP_BETA,
                WATER_HVAP_MIN_TR,
                WATER_HVAP_MAX_TR,
            )?,
        })
    }

    fn require_water(species: Species) -> FluidResult<f64> {
        species
            .critical_temperature()
            .ok_or(FluidError::NoSaturationData {
                species: species.key(),
            })
    }

    /// Saturation pressure [kPa] at the given temperature.
    pub fn saturation_pressure(&self, species: Species, temperature_k: f64) -> FluidResult<f64> {
        let tc = Self::require_water(species)?;
        if temperature_k <= 0.0 {
            return Err(FluidError::NonPhysical {
                what: "saturation temperature argument must be positive",
            });
        }
        let y = tc / temperature_k;
        Ok(10f64.powf(WATER_SAT_A + WATER_SAT_B * y + WATER_SAT_C * y * y))
    }

    /// Saturation temperature [K] at the given pressure, through the
    /// inverse-reduced-temperature fit (clamped at the fit range).
    pub fn saturation_temperature(&self, species: Species, pressure_kpa: f64) -> FluidResult<f64> {
        let tc = Self::require_water(species)?;
        let inverse_reduced = self.water_tsat.get(pressure_kpa);
        Ok(tc / inverse_reduced)
    }

    /// Heat of vaporization [kJ/kg] at the given temperature (clamped at the
    /// fit range).
    pub fn heat_of_vaporization(&self, species: Species, temperature_k: f64) -> FluidResult<f64> {
        let tc = Self::require_water(species)?;
        Ok(self.water_hvap.get(temperature_k / tc))
    }
}
