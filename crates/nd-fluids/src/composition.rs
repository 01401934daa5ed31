//! Fluid composition (pure or mixtures).

use serde::{Deserialize, Serialize};

use crate::error::{FluidError, FluidResult};
use crate::species::{Phase, Species};

/// Fluid composition defined by normalized mole fractions.
///
/// The composition is always normalized (mole fractions sum to 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// Species and their mole fractions (always normalized to sum=1).
    items: Vec<(Species, f64)>,
}

impl Composition {
    /// Create a pure-species composition.
    pub fn pure(species: Species) -> Self {
        Self {
            items: vec![(species, 1.0)],
        }
    }

    /// Create a composition from mole fractions.
    ///
    /// Validates that all fractions are finite, non-negative, and have a
    /// positive sum, then normalizes to sum=1.
    pub fn new_mole_fractions(fractions: Vec<(Species, f64)>) -> FluidResult<Self> {
        if fractions.is_empty() {
            return Err(FluidError::InvalidArg {
                what: "empty composition",
            });
        }

        let mut sum = 0.0;
        for (_, frac) in &fractions {
            if !frac.is_finite() {
                return Err(FluidError::NonPhysical {
                    what: "non-finite mole fraction",
                });
            }
            if *frac < 0.0 {
                return Err(FluidError::NonPhysical {
                    what: "negative mole fraction",
                });
            }
            sum += frac;
        }

        if sum <= 0.0 || !sum.is_finite() {
            return Err(FluidError::NonPhysical {
                what: "mole fractions sum to zero or non-finite",
            });
        }

        let normalized: Vec<(Species, f64)> = fractions
            .into_iter()
            .map(|(s, f)| (s, f / sum))
            .filter(|(_, f)| *f > 1e-15)
            .collect();

        if normalized.is_empty() {
            return Err(FluidError::NonPhysical {
                what: "all mole fractions negligible",
            });
        }

        Ok(Self { items: normalized })
    }

    /// Create a composition from mass fractions, converting through the
    /// species molar masses.
    pub fn new_mass_fractions(fractions: Vec<(Species, f64)>) -> FluidResult<Self> {
        let moles: Vec<(Species, f64)> = fractions
            .into_iter()
            .map(|(s, w)| (s, w / s.molar_mass()))
            .collect();
        Self::new_mole_fractions(moles)
    }

    /// Get mole fraction of a species (0.0 if not present).
    pub fn mole_fraction(&self, species: Species) -> f64 {
        self.items
            .iter()
            .find(|(s, _)| *s == species)
            .map(|(_, f)| *f)
            .unwrap_or(0.0)
    }

    /// Get mass fraction of a species (0.0 if not present).
    pub fn mass_fraction(&self, species: Species) -> f64 {
        let mw = self.molar_mass();
        if mw <= 0.0 {
            return 0.0;
        }
        self.mole_fraction(species) * species.molar_mass() / mw
    }

    /// True if the species is present with a non-negligible fraction.
    pub fn contains(&self, species: Species) -> bool {
        self.mole_fraction(species) > 0.0
    }

    /// Iterate over all species with non-zero mole fractions.
    pub fn iter(&self) -> impl Iterator<Item = (Species, f64)> + '_ {
        self.items.iter().copied()
    }

    /// Compute mixture molar mass [kg/kmol] from species mole fractions.
    pub fn molar_mass(&self) -> f64 {
        self.items
            .iter()
            .map(|(species, mole_frac)| species.molar_mass() * mole_frac)
            .sum()
    }

    /// Mass-fraction-weighted specific heat capacity [J/(kg*K)].
    pub fn cp(&self) -> f64 {
        self.items
            .iter()
            .map(|(s, _)| s.cp() * self.mass_fraction(*s))
            .sum()
    }

    /// The species with the largest mole fraction.
    pub fn dominant(&self) -> Species {
        self.items
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(s, _)| *s)
            .expect("composition is never empty")
    }

    /// Phase of the dominant species; the content of a node is tagged with
    /// this phase.
    pub fn phase(&self) -> Phase {
        self.dominant().phase()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use nd_core::{Tolerances, nearly_equal};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalized_sum_is_one(fracs in prop::collection::vec(0.0_f64..1.0_f64, 1..5)) {
            let species = [Species::Water, Species::WaterVapor, Species::N2, Species::O2, Species::He];
            let composition_input: Vec<(Species, f64)> = fracs
                .iter()
                .enumerate()
                .map(|(i, &f)| (species[i % species.len()], f))
                .collect();

            if let Ok(comp) = Composition::new_mole_fractions(composition_input) {
                let sum: f64 = comp.iter().map(|(_, f)| f).sum();
                let tol = Tolerances { abs: 1e-9, rel: 1e-9 };
                prop_assert!(nearly_equal(sum, 1.0, tol));
            }
        }
    }
}
