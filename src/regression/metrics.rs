use serde::{Deserialize, Serialize};

/// Hold-out error for one target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    pub target: String,
    pub mae: f64,
    pub rmse: f64,
    /// Largest absolute error seen on the evaluation rows.
    pub max_abs_error: f64,
    /// Coefficient of determination; `None` when the evaluation rows have
    /// no variance in this target.
    pub r2: Option<f64>,
}

/// Validation summary produced by one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub model_kind: String,
    pub n_train: usize,
    /// Hold-out rows; 0 means the metrics are in-sample.
    pub n_test: usize,
    pub test_ids: Vec<String>,
    /// Hold-out metrics (in-sample when `n_test == 0`).
    pub targets: Vec<TargetMetrics>,
    /// In-sample metrics of the returned model over every training row.
    #[serde(default)]
    pub fitted: Vec<TargetMetrics>,
}

impl ValidationReport {
    pub fn for_target(&self, target: &str) -> Option<&TargetMetrics> {
        self.targets.iter().find(|m| m.target == target)
    }

    pub fn fitted_for_target(&self, target: &str) -> Option<&TargetMetrics> {
        self.fitted.iter().find(|m| m.target == target)
    }

    /// Largest absolute error the report vouches for on a training-feature
    /// vector: the hold-out maximum or the returned model's in-sample
    /// maximum, whichever is larger.
    pub fn error_bound(&self, target: &str) -> Option<f64> {
        let holdout = self.for_target(target).map(|m| m.max_abs_error);
        let fitted = self.fitted_for_target(target).map(|m| m.max_abs_error);
        match (holdout, fitted) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_in_sample(&self) -> bool {
        self.n_test == 0
    }
}

/// Per-target metrics for aligned `actual` / `predicted` rows.
///
/// Row `i` of each slice holds one value per name in `targets`.
pub fn evaluate(targets: &[String], actual: &[Vec<f64>], predicted: &[Vec<f64>]) -> Vec<TargetMetrics> {
    targets
        .iter()
        .enumerate()
        .map(|(t, name)| {
            let pairs: Vec<(f64, f64)> = actual
                .iter()
                .zip(predicted)
                .map(|(a, p)| (a[t], p[t]))
                .collect();
            target_metrics(name, &pairs)
        })
        .collect()
}

fn target_metrics(name: &str, pairs: &[(f64, f64)]) -> TargetMetrics {
    let n = pairs.len().max(1) as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut max_abs: f64 = 0.0;
    for &(a, p) in pairs {
        let err = (a - p).abs();
        abs_sum += err;
        sq_sum += err * err;
        max_abs = max_abs.max(err);
    }

    let mean = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let total_var: f64 = pairs.iter().map(|(a, _)| (a - mean).powi(2)).sum();
    let r2 = if pairs.len() > 1 && total_var > 1e-12 {
        Some(1.0 - sq_sum / total_var)
    } else {
        None
    };

    TargetMetrics {
        target: name.to_string(),
        mae: abs_sum / n,
        rmse: (sq_sum / n).sqrt(),
        max_abs_error: max_abs,
        r2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_prediction() {
        let targets = vec!["w".to_string()];
        let actual = vec![vec![1.0], vec![2.0], vec![3.0]];
        let m = evaluate(&targets, &actual, &actual);
        assert_eq!(m[0].mae, 0.0);
        assert_eq!(m[0].rmse, 0.0);
        assert_eq!(m[0].max_abs_error, 0.0);
        assert_eq!(m[0].r2, Some(1.0));
    }

    #[test]
    fn known_errors() {
        let targets = vec!["w".to_string(), "i".to_string()];
        let actual = vec![vec![950.0, 1.0], vec![960.0, 0.8]];
        let predicted = vec![vec![952.0, 1.0], vec![956.0, 0.8]];
        let m = evaluate(&targets, &actual, &predicted);

        assert!((m[0].mae - 3.0).abs() < 1e-12);
        assert!((m[0].rmse - 10.0_f64.sqrt()).abs() < 1e-12);
        assert!((m[0].max_abs_error - 4.0).abs() < 1e-12);
        // total variance 50, squared error 20
        assert!((m[0].r2.unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(m[1].target, "i");
        assert!(m[1].mae.abs() < 1e-12);
    }

    #[test]
    fn single_row_has_no_r2() {
        let targets = vec!["w".to_string()];
        let m = evaluate(&targets, &[vec![950.0]], &[vec![951.0]]);
        assert_eq!(m[0].r2, None);
        assert!((m[0].mae - 1.0).abs() < 1e-12);
    }

    #[test]
    fn error_bound_takes_the_larger_maximum() {
        let targets = vec!["w".to_string()];
        let report = ValidationReport {
            model_kind: "random_forest".into(),
            n_train: 2,
            n_test: 1,
            test_ids: vec!["C".into()],
            targets: evaluate(&targets, &[vec![950.0]], &[vec![951.0]]),
            fitted: evaluate(&targets, &[vec![940.0], vec![960.0]], &[vec![942.5], vec![960.0]]),
        };
        assert!((report.error_bound("w").unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(report.error_bound("i"), None);
    }
}
