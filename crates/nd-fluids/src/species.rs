//! Chemical species definitions.

use serde::{Deserialize, Serialize};

/// Phase tag of a species at network conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Gas,
    Liquid,
}

/// Species relevant to liquid/gas accumulator networks.
///
/// Water appears in both phases under distinct tags with one shared molar
/// mass, so phase-change links can pair them as the same chemical species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    /// Liquid water (H₂O)
    Water,
    /// Water vapor (H₂O)
    WaterVapor,
    /// Nitrogen (N₂)
    N2,
    /// Oxygen (O₂)
    O2,
    /// Helium (He)
    He,
}

impl Species {
    pub const ALL: [Species; 5] = [
        Species::Water,
        Species::WaterVapor,
        Species::N2,
        Species::O2,
        Species::He,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Species::Water => "Water",
            Species::WaterVapor => "WaterVapor",
            Species::N2 => "N2",
            Species::O2 => "O2",
            Species::He => "He",
        }
    }

    /// Get molar mass [kg/kmol] for this species.
    pub fn molar_mass(&self) -> f64 {
        match self {
            Species::Water | Species::WaterVapor => 18.015,
            Species::N2 => 28.014,
            Species::O2 => 31.999,
            Species::He => 4.003,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Species::Water => Phase::Liquid,
            Species::WaterVapor | Species::N2 | Species::O2 | Species::He => Phase::Gas,
        }
    }

    /// Specific heat capacity at constant pressure [J/(kg*K)].
    pub fn cp(&self) -> f64 {
        match self {
            Species::Water => 4186.0,
            Species::WaterVapor => 1996.0,
            Species::N2 => 1040.0,
            Species::O2 => 918.0,
            Species::He => 5193.0,
        }
    }

    /// Critical temperature [K], where saturation data exists.
    pub fn critical_temperature(&self) -> Option<f64> {
        match self {
            Species::Water | Species::WaterVapor => Some(647.096),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn water_phases_share_molar_mass() {
        assert_eq!(
            Species::Water.molar_mass(),
            Species::WaterVapor.molar_mass()
        );
        assert_eq!(Species::Water.phase(), Phase::Liquid);
        assert_eq!(Species::WaterVapor.phase(), Phase::Gas);
    }

    #[test]
    fn gas_species_are_gas_phase() {
        for s in [Species::N2, Species::O2, Species::He] {
            assert_eq!(s.phase(), Phase::Gas);
            assert!(s.critical_temperature().is_none());
        }
    }
}
