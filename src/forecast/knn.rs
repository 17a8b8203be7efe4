//! K-nearest-neighbour regression over lag vectors.

use crate::error::{EngineError, Result};

use super::lag::LagRow;

/// A fitted nearest-neighbour regressor.
///
/// Prediction averages the targets of the `k` training rows closest in
/// Euclidean distance. Equal distances resolve to the earlier row.
#[derive(Debug, Clone)]
pub struct KnnRegressor {
    k: usize,
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl KnnRegressor {
    /// Fits on the observed rows of `rows`; placeholder rows are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Model`] when `k` is zero or exceeds the number
    /// of observed rows.
    pub fn fit(k: usize, rows: &[LagRow]) -> Result<Self> {
        let (features, targets): (Vec<Vec<f64>>, Vec<f64>) = rows
            .iter()
            .filter_map(|r| r.target.map(|y| (r.lags.clone(), y)))
            .unzip();

        if k == 0 {
            return Err(EngineError::Model("neighbour count must be at least 1".into()));
        }
        if targets.len() < k {
            return Err(EngineError::Model(format!(
                "{k} neighbours requested but only {} training rows",
                targets.len()
            )));
        }

        Ok(Self {
            k,
            features,
            targets,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n_train(&self) -> usize {
        self.targets.len()
    }

    pub fn predict_one(&self, lags: &[f64]) -> f64 {
        self.predict_for_ks(lags, &[self.k])[0]
    }

    pub fn predict(&self, rows: &[LagRow]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_one(&r.lags)).collect()
    }

    /// Predictions for several neighbour counts from one distance pass.
    ///
    /// Counts above the training size are clamped to it.
    pub fn predict_for_ks(&self, lags: &[f64], ks: &[usize]) -> Vec<f64> {
        let order = self.nearest(lags);
        let mut prefix = Vec::with_capacity(order.len() + 1);
        prefix.push(0.0);
        for &i in &order {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + self.targets[i]);
        }
        ks.iter()
            .map(|&k| {
                let k = k.clamp(1, order.len().max(1));
                prefix.get(k).map_or(0.0, |s| s / k as f64)
            })
            .collect()
    }

    /// Training indices by increasing distance to `query`.
    fn nearest(&self, query: &[f64]) -> Vec<usize> {
        let mut scored: Vec<(f64, usize)> = self
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| (squared_distance(query, f), i))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.into_iter().map(|(_, i)| i).collect()
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timegrid::parse_timestamp;

    fn row(lags: &[f64], target: Option<f64>) -> LagRow {
        LagRow {
            timestamp: parse_timestamp("2024-01-01 00:00").unwrap(),
            target,
            lags: lags.to_vec(),
        }
    }

    #[test]
    fn averages_nearest_targets() {
        let rows = vec![
            row(&[0.0], Some(1.0)),
            row(&[1.0], Some(3.0)),
            row(&[10.0], Some(100.0)),
        ];
        let knn = KnnRegressor::fit(2, &rows).unwrap();
        assert_eq!(knn.predict_one(&[0.4]), 2.0);
    }

    #[test]
    fn ties_prefer_earlier_rows() {
        let rows = vec![
            row(&[1.0], Some(5.0)),
            row(&[-1.0], Some(7.0)),
        ];
        let knn = KnnRegressor::fit(1, &rows).unwrap();
        assert_eq!(knn.predict_one(&[0.0]), 5.0);
    }

    #[test]
    fn placeholder_rows_are_not_trained_on() {
        let rows = vec![row(&[0.0], Some(1.0)), row(&[0.0], None)];
        let knn = KnnRegressor::fit(1, &rows).unwrap();
        assert_eq!(knn.n_train(), 1);
        assert!(KnnRegressor::fit(2, &rows).is_err());
    }

    #[test]
    fn several_ks_in_one_pass() {
        let rows: Vec<LagRow> = (0..5).map(|i| row(&[i as f64], Some(i as f64))).collect();
        let knn = KnnRegressor::fit(1, &rows).unwrap();
        let preds = knn.predict_for_ks(&[0.0], &[1, 3, 5]);
        assert_eq!(preds, vec![0.0, 1.0, 2.0]);
    }
}
