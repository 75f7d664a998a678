use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Zip};

use crate::error::{NetworkError, Result};

/// Cross-entropy predictions are clamped into `[EPSILON, 1 - EPSILON]`.
const EPSILON: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loss {
    #[default]
    MeanSquareError,
    MeanAbsoluteError,
    BinaryCrossEntropy,
    CategoricalCrossEntropy,
}

const REGISTRY: [(&str, Loss); 4] = [
    ("MeanSquareError", Loss::MeanSquareError),
    ("MeanAbsoluteError", Loss::MeanAbsoluteError),
    ("BinaryCrossEntropy", Loss::BinaryCrossEntropy),
    ("CategoricalCrossEntropy", Loss::CategoricalCrossEntropy),
];

fn clamp_probability(p: f64) -> f64 {
    p.clamp(EPSILON, 1.0 - EPSILON)
}

impl Loss {
    pub fn name(&self) -> &'static str {
        match self {
            Loss::MeanSquareError => "MeanSquareError",
            Loss::MeanAbsoluteError => "MeanAbsoluteError",
            Loss::BinaryCrossEntropy => "BinaryCrossEntropy",
            Loss::CategoricalCrossEntropy => "CategoricalCrossEntropy",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, loss)| *loss)
    }

    /// Elementwise error between `prediction` and `target`.
    pub fn error(&self, prediction: &Array1<f64>, target: &Array1<f64>) -> Result<Array1<f64>> {
        check_lengths(prediction, target, "loss evaluation")?;
        let error = match self {
            Loss::MeanSquareError => Zip::from(prediction)
                .and(target)
                .map_collect(|p, t| (p - t).powi(2)),
            Loss::MeanAbsoluteError => Zip::from(prediction)
                .and(target)
                .map_collect(|p, t| (p - t).abs()),
            Loss::BinaryCrossEntropy => Zip::from(prediction).and(target).map_collect(|p, t| {
                let p = clamp_probability(*p);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            }),
            Loss::CategoricalCrossEntropy => Zip::from(prediction)
                .and(target)
                .map_collect(|p, t| -(t * clamp_probability(*p).ln())),
        };
        Ok(error)
    }

    /// Derivative of the error with respect to each prediction.
    pub fn derivative(
        &self,
        prediction: &Array1<f64>,
        target: &Array1<f64>,
    ) -> Result<Array1<f64>> {
        check_lengths(prediction, target, "loss derivative")?;
        let derivative = match self {
            Loss::MeanSquareError => Zip::from(prediction)
                .and(target)
                .map_collect(|p, t| 2.0 * (p - t)),
            // p == t falls on the -1 side
            Loss::MeanAbsoluteError => Zip::from(prediction)
                .and(target)
                .map_collect(|p, t| if p > t { 1.0 } else { -1.0 }),
            Loss::BinaryCrossEntropy => Zip::from(prediction).and(target).map_collect(|p, t| {
                let p = clamp_probability(*p);
                (p - t) / (p * (1.0 - p))
            }),
            Loss::CategoricalCrossEntropy => Zip::from(prediction)
                .and(target)
                .map_collect(|p, t| -t / clamp_probability(*p)),
        };
        Ok(derivative)
    }

    /// Scalar cost of a single example.
    ///
    /// Categorical cross-entropy sums over the class axis; every other loss
    /// takes the mean of the elementwise error.
    pub fn cost(&self, prediction: &Array1<f64>, target: &Array1<f64>) -> Result<f64> {
        let error = self.error(prediction, target)?;
        Ok(match self {
            Loss::CategoricalCrossEntropy => error.sum(),
            _ => error.mean().unwrap_or(0.0),
        })
    }
}

fn check_lengths(prediction: &Array1<f64>, target: &Array1<f64>, operation: &str) -> Result<()> {
    if prediction.len() != target.len() {
        return Err(NetworkError::shape(prediction.len(), target.len(), operation));
    }
    Ok(())
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Loss {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        Loss::from_name(s)
            .ok_or_else(|| NetworkError::Configuration(format!("unknown loss function {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_mean_square_error() {
        let loss = Loss::MeanSquareError;
        let prediction = array![0.5, 1.0];
        let target = array![1.0, 1.0];

        assert_abs_diff_eq!(loss.cost(&prediction, &target).unwrap(), 0.125);
        assert_eq!(loss.derivative(&prediction, &target).unwrap(), array![-1.0, 0.0]);
    }

    #[test]
    fn test_mean_absolute_error_subgradient() {
        let loss = Loss::MeanAbsoluteError;
        let prediction = array![2.0, 0.0, 1.0];
        let target = array![1.0, 1.0, 1.0];

        assert_abs_diff_eq!(loss.cost(&prediction, &target).unwrap(), 2.0 / 3.0);
        assert_eq!(
            loss.derivative(&prediction, &target).unwrap(),
            array![1.0, -1.0, -1.0]
        );
    }

    #[test]
    fn test_cross_entropy_is_finite_at_certain_wrong_prediction() {
        let prediction = array![1.0];
        let target = array![0.0];

        for loss in [Loss::BinaryCrossEntropy, Loss::CategoricalCrossEntropy] {
            let cost = loss.cost(&prediction, &target).unwrap();
            assert!(cost.is_finite(), "{loss} produced {cost}");
            let derivative = loss.derivative(&prediction, &target).unwrap();
            assert!(derivative.iter().all(|d| d.is_finite()));
        }

        let bce = Loss::BinaryCrossEntropy.cost(&prediction, &target).unwrap();
        assert!(bce > 30.0);
    }

    #[test]
    fn test_categorical_cross_entropy_sums_classes() {
        let prediction = array![0.7, 0.2, 0.1];
        let target = array![1.0, 0.0, 0.0];

        let cost = Loss::CategoricalCrossEntropy.cost(&prediction, &target).unwrap();
        assert_abs_diff_eq!(cost, -(0.7f64.ln()), epsilon = 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        let result = Loss::MeanSquareError.cost(&array![1.0, 2.0], &array![1.0]);
        assert!(matches!(
            result,
            Err(NetworkError::ShapeMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_registry_names() {
        for (name, loss) in REGISTRY {
            assert_eq!(loss.name(), name);
            assert_eq!(name.parse::<Loss>().unwrap(), loss);
        }
        assert_eq!(Loss::from_name("Hinge"), None);
    }
}
