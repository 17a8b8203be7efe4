//! Derivative-free minimisation for model fitting.

/// Nelder–Mead simplex minimiser with the standard coefficients
/// (reflection 1, expansion 2, contraction 0.5, shrink 0.5).
#[derive(Debug, Clone, Copy)]
pub struct NelderMead {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            tolerance: 1e-8,
            initial_step: 0.1,
        }
    }
}

impl NelderMead {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..Self::default()
        }
    }

    /// Returns the best point found and its objective value.
    pub fn minimize<F>(&self, f: F, x0: &[f64]) -> (Vec<f64>, f64)
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = x0.len();
        let eval = |x: &[f64]| {
            let v = f(x);
            if v.is_finite() { v } else { f64::INFINITY }
        };
        if n == 0 {
            return (Vec::new(), eval(x0));
        }

        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((x0.to_vec(), eval(x0)));
        for i in 0..n {
            let mut x = x0.to_vec();
            x[i] += self.initial_step;
            let v = eval(&x);
            simplex.push((x, v));
        }

        for _ in 0..self.max_iterations {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
            let best = simplex[0].1;
            let worst = simplex[n].1;
            if (worst - best).abs() <= self.tolerance * (best.abs() + self.tolerance) {
                break;
            }

            let centroid: Vec<f64> = (0..n)
                .map(|j| simplex[..n].iter().map(|(x, _)| x[j]).sum::<f64>() / n as f64)
                .collect();
            let toward = |coef: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(&simplex[n].0)
                    .map(|(c, w)| c + coef * (c - w))
                    .collect()
            };

            let reflected = toward(1.0);
            let fr = eval(&reflected);
            if fr < simplex[0].1 {
                let expanded = toward(2.0);
                let fe = eval(&expanded);
                simplex[n] = if fe < fr { (expanded, fe) } else { (reflected, fr) };
                continue;
            }
            if fr < simplex[n - 1].1 {
                simplex[n] = (reflected, fr);
                continue;
            }

            let contracted = if fr < simplex[n].1 { toward(0.5) } else { toward(-0.5) };
            let fc = eval(&contracted);
            if fc < simplex[n].1.min(fr) {
                simplex[n] = (contracted, fc);
                continue;
            }

            let anchor = simplex[0].0.clone();
            for (x, v) in simplex.iter_mut().skip(1) {
                for (xi, ai) in x.iter_mut().zip(&anchor) {
                    *xi = ai + 0.5 * (*xi - ai);
                }
                *v = eval(x);
            }
        }

        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (x, v) = simplex.swap_remove(0);
        (x, v)
    }
}
