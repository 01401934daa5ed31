//! Closed-form fluid property curve fits.

use crate::error::{TableError, TableResult};
use nd_core::limit_range;

/// Inverse-reduced saturation temperature fit.
///
/// Reverses the quadratic `c*y^2 + b*y + a = log10(p)` for `y = Tc/T_sat`,
/// returning the negative root. The caller divides the critical temperature
/// by the result to obtain the saturation temperature.
#[derive(Debug, Clone)]
pub struct SaturationTemperatureFit {
    c2: f64,
    c4: f64,
    b: f64,
    b2: f64,
    a: f64,
    min_p: f64,
    max_p: f64,
}

impl SaturationTemperatureFit {
    pub fn new(a: f64, b: f64, c: f64, min_p: f64, max_p: f64) -> TableResult<Self> {
        if c.abs() < f64::EPSILON {
            return Err(TableError::InvalidConfig {
                what: "saturation temperature fit: abs(c) < epsilon",
            });
        }
        let fit = Self {
            c2: 0.5 / c,
            c4: 4.0 * c,
            b: -b,
            b2: b * b,
            a,
            min_p,
            max_p,
        };
        // The radicand and root must be healthy across the whole range.
        for p in [min_p, max_p] {
            if fit.b2 - fit.c4 * (fit.a - p.log10()) < 0.0 {
                return Err(TableError::InvalidConfig {
                    what: "saturation temperature fit: negative radicand at range endpoint",
                });
            }
            if fit.evaluate(p) < f64::EPSILON {
                return Err(TableError::InvalidConfig {
                    what: "saturation temperature fit: non-positive root at range endpoint",
                });
            }
        }
        Ok(fit)
    }

    /// Evaluates at `p` clamped into the valid pressure range.
    pub fn get(&self, p: f64) -> f64 {
        self.evaluate(limit_range(self.min_p, p, self.max_p))
    }

    /// Evaluates at `p`, failing outside the valid pressure range.
    pub fn get_exceptional(&self, p: f64) -> TableResult<f64> {
        if p < self.min_p || p > self.max_p {
            return Err(TableError::OutOfRange {
                what: "saturation pressure argument",
                value: p,
                min: self.min_p,
                max: self.max_p,
            });
        }
        Ok(self.evaluate(p))
    }

    fn evaluate(&self, p: f64) -> f64 {
        (self.b - (self.b2 - self.c4 * (self.a - p.log10())).sqrt()) * self.c2
    }
}

/// Heat of vaporization fit `L = a * exp(-alpha*Tr) * (1 - Tr)^beta` over
/// reduced temperature `Tr = T/Tc`.
#[derive(Debug, Clone)]
pub struct HeatOfVaporizationFit {
    a: f64,
    alpha: f64,
    beta: f64,
    min_tr: f64,
    max_tr: f64,
}

impl HeatOfVaporizationFit {
    pub fn new(a: f64, alpha: f64, beta: f64, min_tr: f64, max_tr: f64) -> TableResult<Self> {
        if alpha.abs() > 50.0 {
            return Err(TableError::InvalidConfig {
                what: "heat of vaporization fit: magnitude of alpha > 50",
            });
        }
        if beta.abs() > 50.0 {
            return Err(TableError::InvalidConfig {
                what: "heat of vaporization fit: magnitude of beta > 50",
            });
        }
        Ok(Self {
            a,
            alpha,
            beta,
            min_tr,
            max_tr,
        })
    }

    /// Evaluates at reduced temperature clamped into the valid range.
    pub fn get(&self, tr: f64) -> f64 {
        self.evaluate(limit_range(self.min_tr, tr, self.max_tr))
    }

    /// Evaluates at reduced temperature, failing outside the valid range.
    pub fn get_exceptional(&self, tr: f64) -> TableResult<f64> {
        if tr < self.min_tr || tr > self.max_tr {
            return Err(TableError::OutOfRange {
                what: "reduced temperature argument",
                value: tr,
                min: self.min_tr,
                max: self.max_tr,
            });
        }
        Ok(self.evaluate(tr))
    }

    fn evaluate(&self, tr: f64) -> f64 {
        self.a * (-self.alpha * tr).exp() * (1.0 - tr).powf(self.beta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Water: log10(psat_kPa) = a + b*(Tc/T) + c*(Tc/T)^2, Tc = 647.096 K.
    const WATER_A: f64 = 6.993;
    const WATER_B: f64 = -2.421;
    const WATER_C: f64 = -0.2622;
    const WATER_TC: f64 = 647.096;

    fn water_fit() -> SaturationTemperatureFit {
        SaturationTemperatureFit::new(WATER_A, WATER_B, WATER_C, 0.7, 1500.0).unwrap()
    }

    #[test]
    fn rejects_degenerate_quadratic() {
        assert!(SaturationTemperatureFit::new(1.0, 1.0, 0.0, 1.0, 100.0).is_err());
    }

    #[test]
    fn rejects_negative_radicand_in_range() {
        // Large a with positive c drives the radicand negative in range.
        assert!(SaturationTemperatureFit::new(50.0, -2.4, 0.26, 0.7, 1500.0).is_err());
    }

    #[test]
    fn water_boiling_point_recovered() {
        let fit = water_fit();
        let tsat = WATER_TC / fit.get(101.325);
        assert!((tsat - 373.1).abs() < 1.0, "tsat = {tsat}");
    }

    #[test]
    fn endpoints_evaluate_finite_and_positive() {
        let fit = water_fit();
        for p in [0.7, 1500.0] {
            let y = fit.get(p);
            assert!(y.is_finite() && y > 0.0);
        }
    }

    #[test]
    fn saturation_temperature_is_monotone_in_pressure() {
        let fit = water_fit();
        let mut prev = WATER_TC / fit.get(0.7);
        for p in [1.0, 10.0, 101.325, 500.0, 1500.0] {
            let tsat = WATER_TC / fit.get(p);
            assert!(tsat > prev);
            prev = tsat;
        }
    }

    #[test]
    fn strict_lookup_errors_outside_range() {
        let fit = water_fit();
        assert!(fit.get_exceptional(0.1).is_err());
        assert!(fit.get_exceptional(2000.0).is_err());
        assert!(fit.get_exceptional(101.325).is_ok());
    }

    #[test]
    fn hvap_rejects_large_exponents() {
        assert!(HeatOfVaporizationFit::new(3000.0, 51.0, 0.38, 0.4, 0.95).is_err());
        assert!(HeatOfVaporizationFit::new(3000.0, 0.0, -51.0, 0.4, 0.95).is_err());
    }

    #[test]
    fn hvap_water_is_plausible_and_decreasing() {
        let fit = HeatOfVaporizationFit::new(3128.0, 0.0, 0.38, 0.4, 0.95).unwrap();
        let l_373 = fit.get(373.15 / WATER_TC);
        assert!((l_373 - 2256.0).abs() < 30.0, "L(373) = {l_373}");
        let l_283 = fit.get(283.15 / WATER_TC);
        assert!(l_283 > l_373);
    }
}
