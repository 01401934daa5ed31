//! Chamber fluid state: temperature, pressure, mass, and composition with
//! analytic property closures.
//!
//! Density and enthalpy use a frozen-cp model: ideal gas for gas species, a
//! linearized thermal-expansion/compressibility model for liquid water, and
//! mass-fraction-weighted mixing. The model is deliberately local and cheap;
//! the network solver only needs smooth, invertible property slopes.

use serde::{Deserialize, Serialize};

use crate::R_UNIVERSAL;
use crate::composition::Composition;
use crate::error::{FluidError, FluidResult};
use crate::species::{Phase, Species};

/// Liquid water reference density model constants.
const WATER_RHO_REF: f64 = 999.7; // kg/m3 at T_REF, P_REF
const WATER_T_REF: f64 = 283.15; // K
const WATER_P_REF: f64 = 101.325; // kPa
const WATER_EXPANSION: f64 = 2.07e-4; // 1/K
const WATER_COMPRESSIBILITY: f64 = 4.6e-7; // 1/kPa

/// Initialization data for a chamber fluid (temperature, pressure, and mass
/// fractions over the species set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluidInput {
    pub temperature_k: f64,
    pub pressure_kpa: f64,
    pub mass_fractions: Vec<(Species, f64)>,
}

impl FluidInput {
    pub fn new(temperature_k: f64, pressure_kpa: f64, mass_fractions: Vec<(Species, f64)>) -> Self {
        Self {
            temperature_k,
            pressure_kpa,
            mass_fractions,
        }
    }

    pub fn build(&self) -> FluidResult<Fluid> {
        if !(self.temperature_k.is_finite() && self.temperature_k > 0.0) {
            return Err(FluidError::NonPhysical {
                what: "fluid input temperature must be positive and finite",
            });
        }
        if !(self.pressure_kpa.is_finite() && self.pressure_kpa > 0.0) {
            return Err(FluidError::NonPhysical {
                what: "fluid input pressure must be positive and finite",
            });
        }
        let composition = Composition::new_mass_fractions(self.mass_fractions.clone())?;
        Ok(Fluid {
            composition,
            temperature_k: self.temperature_k,
            pressure_kpa: self.pressure_kpa,
            mass_kg: 0.0,
        })
    }
}

/// A lump of fluid with uniform state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fluid {
    composition: Composition,
    temperature_k: f64,
    pressure_kpa: f64,
    mass_kg: f64,
}

impl Fluid {
    pub fn new(composition: Composition, temperature_k: f64, pressure_kpa: f64) -> Self {
        Self {
            composition,
            temperature_k,
            pressure_kpa,
            mass_kg: 0.0,
        }
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn temperature(&self) -> f64 {
        self.temperature_k
    }

    pub fn pressure(&self) -> f64 {
        self.pressure_kpa
    }

    pub fn mass(&self) -> f64 {
        self.mass_kg
    }

    /// Mixture molar mass [kg/kmol].
    pub fn mweight(&self) -> f64 {
        self.composition.molar_mass()
    }

    pub fn phase(&self) -> Phase {
        self.composition.phase()
    }

    pub fn mole_fraction(&self, species: Species) -> f64 {
        self.composition.mole_fraction(species)
    }

    pub fn mass_fraction(&self, species: Species) -> f64 {
        self.composition.mass_fraction(species)
    }

    pub fn set_temperature(&mut self, temperature_k: f64) {
        self.temperature_k = temperature_k;
    }

    pub fn set_pressure(&mut self, pressure_kpa: f64) {
        self.pressure_kpa = pressure_kpa;
    }

    pub fn set_mass(&mut self, mass_kg: f64) {
        self.mass_kg = mass_kg;
    }

    /// Replace mass and composition together (mass fractions normalized).
    pub fn set_mass_and_mass_fractions(
        &mut self,
        mass_kg: f64,
        mass_fractions: Vec<(Species, f64)>,
    ) -> FluidResult<()> {
        self.composition = Composition::new_mass_fractions(mass_fractions)?;
        self.mass_kg = mass_kg;
        Ok(())
    }

    /// Blend an inflow into this fluid by mass, updating the mass and the
    /// mass fractions; temperature and pressure are handled by the caller.
    pub fn mix_masses(&mut self, old_mass: f64, inflow: &Fluid, added_mass: f64) -> FluidResult<()> {
        let new_mass = old_mass + added_mass;
        if new_mass <= 0.0 {
            return Err(FluidError::NonPhysical {
                what: "mixed mass must be positive",
            });
        }
        let mut fractions = Vec::new();
        for species in Species::ALL {
            let w = (old_mass * self.mass_fraction(species)
                + added_mass * inflow.mass_fraction(species))
                / new_mass;
            if w > 0.0 {
                fractions.push((species, w));
            }
        }
        self.set_mass_and_mass_fractions(new_mass, fractions)
    }

    /// Density [kg/m3] at the current state.
    pub fn density(&self) -> f64 {
        self.density_at(self.temperature_k, self.pressure_kpa)
    }

    /// Density [kg/m3] at an arbitrary (T, P); mixtures combine through
    /// mass-fraction-weighted specific volume.
    pub fn density_at(&self, temperature_k: f64, pressure_kpa: f64) -> f64 {
        let mut specific_volume = 0.0;
        for (species, _) in self.composition.iter() {
            let w = self.mass_fraction(species);
            let rho = species_density(species, temperature_k, pressure_kpa);
            if rho > 0.0 {
                specific_volume += w / rho;
            }
        }
        if specific_volume > 0.0 {
            1.0 / specific_volume
        } else {
            0.0
        }
    }

    /// Specific enthalpy [J/kg] with frozen cp.
    pub fn specific_enthalpy(&self) -> f64 {
        self.composition.cp() * self.temperature_k
    }

    /// Temperature [K] back-computed from a specific enthalpy [J/kg].
    pub fn compute_temperature(&self, enthalpy: f64) -> f64 {
        let cp = self.composition.cp();
        if cp > 0.0 && enthalpy.is_finite() {
            enthalpy / cp
        } else {
            self.temperature_k
        }
    }

    /// Pressure [kPa] back-computed from temperature and density by
    /// inverting the phase's density model.
    pub fn compute_pressure(&self, temperature_k: f64, density: f64) -> f64 {
        match self.phase() {
            Phase::Gas => density * R_UNIVERSAL * temperature_k / self.mweight(),
            Phase::Liquid => {
                let thermal = WATER_RHO_REF * (1.0 - WATER_EXPANSION * (temperature_k - WATER_T_REF));
                if thermal > 0.0 {
                    WATER_P_REF + (density / thermal - 1.0) / WATER_COMPRESSIBILITY
                } else {
                    self.pressure_kpa
                }
            }
        }
    }
}

fn species_density(species: Species, temperature_k: f64, pressure_kpa: f64) -> f64 {
    match species.phase() {
        Phase::Gas => {
            if temperature_k > 0.0 {
                pressure_kpa * species.molar_mass() / (R_UNIVERSAL * temperature_k)
            } else {
                0.0
            }
        }
        Phase::Liquid => {
            WATER_RHO_REF
                * (1.0 - WATER_EXPANSION * (temperature_k - WATER_T_REF))
                * (1.0 + WATER_COMPRESSIBILITY * (pressure_kpa - WATER_P_REF))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water(t: f64, p: f64) -> Fluid {
        Fluid::new(Composition::pure(Species::Water), t, p)
    }

    fn nitrogen(t: f64, p: f64) -> Fluid {
        Fluid::new(Composition::pure(Species::N2), t, p)
    }

    #[test]
    fn liquid_water_density_near_reference() {
        let rho = water(283.15, 101.325).density();
        assert!((rho - 999.7).abs() < 1e-9);
    }

    #[test]
    fn liquid_density_falls_with_temperature_rises_with_pressure() {
        let base = water(283.15, 101.325).density();
        assert!(water(293.15, 101.325).density() < base);
        assert!(water(283.15, 500.0).density() > base);
    }

    #[test]
    fn nitrogen_ideal_gas_density() {
        let rho = nitrogen(300.0, 101.325).density();
        // P*MW/(R*T) = 101.325*28.014/(8.31446*300)
        assert!((rho - 1.138).abs() < 0.01, "rho = {rho}");
    }

    #[test]
    fn gas_pressure_density_round_trip() {
        let gas = nitrogen(290.0, 250.0);
        let rho = gas.density();
        let p = gas.compute_pressure(290.0, rho);
        assert!((p - 250.0).abs() < 1e-9);
    }

    #[test]
    fn liquid_pressure_density_round_trip() {
        let liq = water(285.0, 240.0);
        let rho = liq.density();
        let p = liq.compute_pressure(285.0, rho);
        assert!((p - 240.0).abs() < 1e-6);
    }

    #[test]
    fn enthalpy_temperature_round_trip() {
        let liq = water(300.0, 101.325);
        let h = liq.specific_enthalpy();
        assert!((liq.compute_temperature(h) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn mix_masses_blends_fractions() {
        let mut gas = nitrogen(300.0, 100.0);
        gas.set_mass(1.0);
        let inflow = Fluid::new(Composition::pure(Species::He), 300.0, 100.0);
        gas.mix_masses(1.0, &inflow, 1.0).unwrap();
        assert!((gas.mass() - 2.0).abs() < 1e-12);
        assert!((gas.mass_fraction(Species::N2) - 0.5).abs() < 1e-9);
        assert!((gas.mass_fraction(Species::He) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fluid_input_validation() {
        assert!(FluidInput::new(-1.0, 100.0, vec![(Species::N2, 1.0)]).build().is_err());
        assert!(FluidInput::new(300.0, 0.0, vec![(Species::N2, 1.0)]).build().is_err());
        let fluid = FluidInput::new(300.0, 100.0, vec![(Species::N2, 1.0)])
            .build()
            .unwrap();
        assert_eq!(fluid.mass(), 0.0);
        assert_eq!(fluid.phase(), Phase::Gas);
    }
}
