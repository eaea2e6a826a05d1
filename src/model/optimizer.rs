//! Derivative-free minimizer used for likelihood maximization.
//!
//! Nelder–Mead simplex with the standard coefficients (reflection 1,
//! expansion 2, contraction 0.5, shrink 0.5). Deterministic: the same
//! objective, start point and steps always walk the same path.

/// Outcome of a minimization run
#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

/// Nelder–Mead settings
#[derive(Debug, Clone, Copy)]
pub struct NelderMead {
    /// Upper bound on simplex iterations
    pub max_iterations: usize,
    /// Converged once `f_worst - f_best <= tolerance * (1 + |f_best|)`
    pub tolerance: f64,
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

impl NelderMead {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Minimize `objective` starting from `start`; the initial simplex adds
    /// `steps[i]` to coordinate `i`. Non-finite objective values are treated
    /// as +infinity.
    pub fn minimize<F>(&self, mut objective: F, start: &[f64], steps: &[f64]) -> Minimum
    where
        F: FnMut(&[f64]) -> f64,
    {
        let n = start.len();
        let mut evaluations = 0usize;
        let mut eval = |x: &[f64]| {
            evaluations += 1;
            let v = objective(x);
            if v.is_finite() {
                v
            } else {
                f64::INFINITY
            }
        };

        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        let f0 = eval(start);
        simplex.push((start.to_vec(), f0));
        for i in 0..n {
            let mut vertex = start.to_vec();
            vertex[i] += steps.get(i).copied().unwrap_or(0.1);
            let f = eval(&vertex);
            simplex.push((vertex, f));
        }

        for iteration in 0..self.max_iterations {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

            let best = simplex[0].1;
            let worst = simplex[n].1;
            if (worst - best).abs() <= self.tolerance * (1.0 + best.abs()) {
                let (point, value) = simplex.swap_remove(0);
                drop(eval);
                return Minimum {
                    point,
                    value,
                    iterations: iteration,
                    evaluations,
                    converged: true,
                };
            }

            let centroid = centroid(&simplex[..n]);
            let worst_point = simplex[n].0.clone();
            let second_worst = simplex[n - 1].1;

            let reflected = along(&centroid, &worst_point, -REFLECTION);
            let f_reflected = eval(&reflected);

            if f_reflected < best {
                let expanded = along(&centroid, &reflected, EXPANSION);
                let f_expanded = eval(&expanded);
                simplex[n] = if f_expanded < f_reflected {
                    (expanded, f_expanded)
                } else {
                    (reflected, f_reflected)
                };
                continue;
            }

            if f_reflected < second_worst {
                simplex[n] = (reflected, f_reflected);
                continue;
            }

            let (contracted, threshold) = if f_reflected < worst {
                (along(&centroid, &reflected, CONTRACTION), f_reflected)
            } else {
                (along(&centroid, &worst_point, CONTRACTION), worst)
            };
            let f_contracted = eval(&contracted);
            if f_contracted < threshold {
                simplex[n] = (contracted, f_contracted);
                continue;
            }

            // Shrink every vertex toward the best one
            let best_point = simplex[0].0.clone();
            for vertex in simplex.iter_mut().skip(1) {
                let shrunk = along(&best_point, &vertex.0, SHRINK);
                let f = eval(&shrunk);
                *vertex = (shrunk, f);
            }
        }

        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (point, value) = simplex.swap_remove(0);
        drop(eval);
        Minimum {
            point,
            value,
            iterations: self.max_iterations,
            evaluations,
            converged: false,
        }
    }
}

fn centroid(vertices: &[(Vec<f64>, f64)]) -> Vec<f64> {
    let dim = vertices[0].0.len();
    let mut c = vec![0.0; dim];
    for (x, _) in vertices {
        for (ci, xi) in c.iter_mut().zip(x) {
            *ci += xi;
        }
    }
    let k = vertices.len() as f64;
    c.iter_mut().for_each(|ci| *ci /= k);
    c
}

/// `origin + t * (target - origin)`
fn along(origin: &[f64], target: &[f64], t: f64) -> Vec<f64> {
    origin
        .iter()
        .zip(target)
        .map(|(o, x)| o + t * (x - o))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let nm = NelderMead::new(2_000, 1e-14);
        let result = nm.minimize(
            |x| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
            &[0.5, 0.5],
        );

        assert!(result.converged);
        assert!((result.point[0] - 3.0).abs() < 1e-4, "x={:?}", result.point);
        assert!((result.point[1] + 1.0).abs() < 1e-4, "x={:?}", result.point);
        assert!(result.evaluations > result.iterations);
    }

    #[test]
    fn test_rosenbrock() {
        let nm = NelderMead::new(5_000, 1e-14);
        let result = nm.minimize(
            |x| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2),
            &[-1.2, 1.0],
            &[0.1, 0.1],
        );

        assert!(result.converged);
        assert!((result.point[0] - 1.0).abs() < 1e-2, "x={:?}", result.point);
        assert!((result.point[1] - 1.0).abs() < 1e-2, "x={:?}", result.point);
    }

    #[test]
    fn test_non_finite_values_are_avoided() {
        let nm = NelderMead::new(2_000, 1e-12);
        let result = nm.minimize(
            |x| if x[0] < 0.0 { f64::NAN } else { (x[0] - 1.0).powi(2) },
            &[2.0],
            &[0.5],
        );

        assert!(result.converged);
        assert!(result.value.is_finite());
        assert!((result.point[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_iteration_cap_reports_failure() {
        let nm = NelderMead::new(3, 1e-300);
        let result = nm.minimize(|x| x[0] * x[0] + x[1] * x[1], &[5.0, 5.0], &[1.0, 1.0]);

        assert!(!result.converged);
        assert_eq!(result.iterations, 3);
    }

    #[test]
    fn test_deterministic() {
        let nm = NelderMead::new(1_000, 1e-12);
        let f = |x: &[f64]| (x[0] - 0.3).powi(2) + (x[1] * x[1] - 0.2).abs();
        let a = nm.minimize(f, &[1.0, 1.0], &[0.2, 0.2]);
        let b = nm.minimize(f, &[1.0, 1.0], &[0.2, 0.2]);
        assert_eq!(a.point, b.point);
        assert_eq!(a.value.to_bits(), b.value.to_bits());
    }
}
