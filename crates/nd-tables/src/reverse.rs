//! 2-D inverse bilinear lookup: solve y from (x, z).

use crate::bilinear::BiTable;
use crate::error::{TableError, TableResult};
use nd_core::{is_in_range, limit_range};

/// Inverse lookup over the same `z = f(x, y)` grid as [`BiTable`].
///
/// `evaluate(x, z)` searches the `y` axis from the cached bracket of the
/// previous result. With multiple solutions for `y` the first bracket found
/// along the search direction wins, which is deterministic but not
/// guaranteed to be the root a caller might consider canonical; the table is
/// best used where `y` is unique at every `(x, z)`. The search wraps around
/// the end of the `y` axis once before falling back to the nearest scale
/// point.
#[derive(Debug, Clone)]
pub struct BiTableReverse {
    table: BiTable,
    z_min: f64,
    z_max: f64,
}

impl BiTableReverse {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x: &[f64],
        y: &[f64],
        z: &[f64],
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
    ) -> TableResult<Self> {
        let table = BiTable::new(x, y, z, min_x, max_x, min_y, max_y)?;

        // Scan the grid for the z extremes used to bound the z argument.
        let mut z_min = 1.0e16;
        let mut z_max = -1.0e16;
        for i in 0..table.x.len() {
            for j in 0..table.y.len() {
                let v = table.z_at(i, j);
                if v < z_min {
                    z_min = v;
                } else if v > z_max {
                    z_max = v;
                }
            }
        }

        Ok(Self { table, z_min, z_max })
    }

    /// Solves for `y` with `x` and `z` clamped to their valid ranges.
    pub fn get(&self, x: f64, z: f64) -> f64 {
        self.evaluate(
            limit_range(self.table_min_x(), x, self.table_max_x()),
            limit_range(self.z_min, z, self.z_max),
        )
    }

    /// Solves for `y`, failing when `x` or `z` is outside its valid range.
    pub fn get_exceptional(&self, x: f64, z: f64) -> TableResult<f64> {
        if x < self.table_min_x() || x > self.table_max_x() {
            return Err(TableError::OutOfRange {
                what: "first interpolation argument",
                value: x,
                min: self.table_min_x(),
                max: self.table_max_x(),
            });
        }
        if z < self.z_min || z > self.z_max {
            return Err(TableError::OutOfRange {
                what: "dependent variable argument",
                value: z,
                min: self.z_min,
                max: self.z_max,
            });
        }
        Ok(self.evaluate(x, z))
    }

    fn table_min_x(&self) -> f64 {
        self.table.min_x
    }

    fn table_max_x(&self) -> f64 {
        self.table.max_x
    }

    pub fn evaluate(&self, x: f64, z: f64) -> f64 {
        let t = &self.table;
        let n = t.y.len();

        t.seek_x(x);
        let i = t.i.get();

        // Axis validation guarantees x[i+1] > x[i].
        let x_frac = (x - t.x[i]) / (t.x[i + 1] - t.x[i]);

        let row_at = |j: usize| t.z_at(i, j) + x_frac * (t.z_at(i + 1, j) - t.z_at(i, j));

        let mut j = t.j.get() as isize;
        let mut y = t.y[j as usize];
        let mut direction: isize = 0;
        let mut z_delta = 1.0e16;
        let mut z_tail = row_at(j as usize);
        let mut z_head = row_at(j as usize + 1);

        // Loop over adjacent y-row pairs looking for a pair of interpolated z
        // values that bracket the input, starting from the previous bracket.
        // The bracket test is order-independent: z_tail can be on either side
        // of z_head.
        for _ in 0..n - 1 {
            if is_between(z_tail, z, z_head) {
                if z_head != z_tail {
                    y = t.y[j as usize]
                        + (t.y[j as usize + 1] - t.y[j as usize]) * (z - z_tail)
                            / (z_head - z_tail);
                } else {
                    // Equal bounds mean infinitely many solutions across this
                    // cell; the middle of the range is the only sane pick.
                    y = 0.5 * (t.y[j as usize] + t.y[j as usize + 1]);
                }
                break;
            }

            // Track the nearest z point in case no bracket is ever found.
            let z_head_d = (z - z_head).abs();
            let z_tail_d = (z - z_tail).abs();
            if z_head_d < z_delta {
                y = t.y[j as usize + 1];
                z_delta = z_head_d;
            }
            if z_tail_d < z_delta {
                y = t.y[j as usize];
                z_delta = z_tail_d;
            }

            // Pick the search direction pointing toward the z input based on
            // the local slope, then keep going that way.
            if direction == 0 {
                direction = if z_tail_d > z_head_d { 1 } else { -1 };
            }

            j += direction;
            if j < 0 {
                // Searching backwards past the beginning, reset to the end.
                j = n as isize - 2;
                z_tail = row_at(j as usize);
                z_head = row_at(j as usize + 1);
            } else if j > n as isize - 2 {
                // Searching forwards past the end, reset to the beginning.
                j = 0;
                z_tail = row_at(0);
                z_head = row_at(1);
            } else if direction > 0 {
                z_tail = z_head;
                z_head = row_at(j as usize + 1);
            } else {
                z_head = z_tail;
                z_tail = row_at(j as usize);
            }
        }

        t.j.set(j as usize);
        y
    }
}

/// True when `x` lies between `end1` and `end2` inclusive, in either order.
fn is_between(end1: f64, x: f64, end2: f64) -> bool {
    if end1 <= end2 {
        is_in_range(end1, x, end2)
    } else {
        is_in_range(end2, x, end1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_core::{Tolerances, nearly_equal};

    const X: [f64; 3] = [0.0, 1.0, 2.0];
    const Y: [f64; 5] = [0.0, 1.0, 2.0, 3.0, 4.0];
    // Monotone in y: z = 10*y + x.
    const Z_MONO: [f64; 15] = [
        0.0, 10.0, 20.0, 30.0, 40.0, //
        1.0, 11.0, 21.0, 31.0, 41.0, //
        2.0, 12.0, 22.0, 32.0, 42.0,
    ];

    fn tol() -> Tolerances {
        Tolerances::default()
    }

    #[test]
    fn recovers_y_on_monotone_table() {
        let r = BiTableReverse::new(&X, &Y, &Z_MONO, 0.0, 2.0, 0.0, 4.0).unwrap();
        for (x, y) in [(0.5, 0.5), (1.0, 2.25), (1.9, 3.75)] {
            let z = 10.0 * y + x;
            assert!(nearly_equal(r.evaluate(x, z), y, tol()));
        }
    }

    #[test]
    fn forward_reverse_round_trip() {
        let f = BiTable::new(&X, &Y, &Z_MONO, 0.0, 2.0, 0.0, 4.0).unwrap();
        let r = BiTableReverse::new(&X, &Y, &Z_MONO, 0.0, 2.0, 0.0, 4.0).unwrap();
        for (x, y) in [(0.25, 1.4), (1.5, 3.2), (0.9, 0.1)] {
            let z = f.get(x, y);
            let y2 = r.evaluate(x, z);
            assert!(nearly_equal(f.get(x, y2), z, tol()));
        }
    }

    #[test]
    fn repeated_calls_are_stable() {
        let r = BiTableReverse::new(&X, &Y, &Z_MONO, 0.0, 2.0, 0.0, 4.0).unwrap();
        let first = r.evaluate(1.0, 25.0);
        for _ in 0..5 {
            assert_eq!(r.evaluate(1.0, 25.0), first);
        }
    }

    #[test]
    fn flat_cell_returns_midpoint() {
        // z constant in y across the second cell.
        let z = [
            0.0, 10.0, 10.0, 30.0, 40.0, //
            0.0, 10.0, 10.0, 30.0, 40.0, //
            0.0, 10.0, 10.0, 30.0, 40.0,
        ];
        let r = BiTableReverse::new(&X, &Y, &z, 0.0, 2.0, 0.0, 4.0).unwrap();
        assert!(nearly_equal(r.evaluate(1.0, 10.0), 1.0, tol()));
        // Force the cache into the flat cell from above.
        assert!(nearly_equal(r.evaluate(1.0, 20.0), 2.5, tol()));
        let mid = r.evaluate(1.0, 10.0);
        assert!(mid >= 1.0 && mid <= 2.0);
    }

    #[test]
    fn multi_root_first_bracket_wins_deterministically() {
        // Parabolic in y: roots on both sides of the vertex.
        let mut z = vec![0.0; 15];
        for i in 0..3 {
            for (j, yv) in Y.iter().enumerate() {
                z[i * 5 + j] = (yv - 2.0) * (yv - 2.0);
            }
        }
        let r = BiTableReverse::new(&X, &Y, &z, 0.0, 2.0, 0.0, 4.0).unwrap();
        let first = r.evaluate(1.0, 1.0);
        for _ in 0..4 {
            assert_eq!(r.evaluate(1.0, 1.0), first);
        }
        // Whatever root was chosen, it solves the equation.
        assert!(((first - 2.0) * (first - 2.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unreachable_z_falls_back_to_nearest_point() {
        let r = BiTableReverse::new(&X, &Y, &Z_MONO, 0.0, 2.0, 0.0, 4.0).unwrap();
        // z far above the table maximum: nearest scale point is y = 4.
        assert!(nearly_equal(r.evaluate(1.0, 500.0), 4.0, tol()));
    }

    #[test]
    fn get_clamps_z_into_table_extremes() {
        let r = BiTableReverse::new(&X, &Y, &Z_MONO, 0.0, 2.0, 0.0, 4.0).unwrap();
        let y = r.get(1.0, 500.0);
        assert!(nearly_equal(y, 4.0, tol()));
        assert!(r.get_exceptional(1.0, 500.0).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use nd_core::{Tolerances, nearly_equal};
    use proptest::prelude::*;

    proptest! {
        /// Reverse lookup of a forward value lands on a y whose forward value
        /// matches within bilinear-cell tolerance, and repeated lookups from
        /// the same cache state are identical.
        #[test]
        fn round_trip_within_cell_tolerance(
            xq in 0.05_f64..1.95,
            yq in 0.05_f64..3.95,
            slope in 2.0_f64..20.0,
        ) {
            let xs = [0.0, 1.0, 2.0];
            let ys = [0.0, 1.0, 2.0, 3.0, 4.0];
            let mut z = vec![0.0; 15];
            for (i, xv) in xs.iter().enumerate() {
                for (j, yv) in ys.iter().enumerate() {
                    z[i * 5 + j] = slope * yv + xv;
                }
            }
            let f = BiTable::new(&xs, &ys, &z, 0.0, 2.0, 0.0, 4.0).unwrap();
            let r = BiTableReverse::new(&xs, &ys, &z, 0.0, 2.0, 0.0, 4.0).unwrap();

            let zq = f.get(xq, yq);
            let y1 = r.evaluate(xq, zq);
            let y2 = r.evaluate(xq, zq);
            prop_assert_eq!(y1, y2);
            let tol = Tolerances { abs: 1e-9, rel: 1e-9 };
            prop_assert!(nearly_equal(f.get(xq, y1), zq, tol));
        }
    }
}
