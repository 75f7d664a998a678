use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{NetworkError, Result};

/// Leak used by `LeakyReLU` when none is given, and the value a loaded model gets.
pub const DEFAULT_LEAK: f64 = 0.1;

/// Sigmoid input is clamped to this magnitude before exponentiation.
const SIGMOID_CLAMP: f64 = 709.0;

/// Enum representing different activation function types
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ActivationType {
    #[default]
    Sigmoid,
    ReLU,
    LeakyReLU { leak: f64 },
    Linear,
}

/// Name → strategy table used when reading a model back from disk.
const REGISTRY: [(&str, ActivationType); 4] = [
    ("Sigmoid", ActivationType::Sigmoid),
    ("ReLU", ActivationType::ReLU),
    ("LeakyReLU", ActivationType::LeakyReLU { leak: DEFAULT_LEAK }),
    ("Linear", ActivationType::Linear),
];

impl ActivationType {
    pub fn leaky_relu() -> Self {
        ActivationType::LeakyReLU { leak: DEFAULT_LEAK }
    }

    /// Name written to and read from model files.
    pub fn name(&self) -> &'static str {
        match self {
            ActivationType::Sigmoid => "Sigmoid",
            ActivationType::ReLU => "ReLU",
            ActivationType::LeakyReLU { .. } => "LeakyReLU",
            ActivationType::Linear => "Linear",
        }
    }

    /// Looks a strategy up by its persisted name. Parameterised variants come
    /// back with their default parameters.
    pub fn from_name(name: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, activation)| *activation)
    }

    /// True when saving this strategy by name alone loses nothing.
    pub fn round_trips_by_name(&self) -> bool {
        match self {
            ActivationType::LeakyReLU { leak } => *leak == DEFAULT_LEAK,
            _ => true,
        }
    }

    /// Applies the activation function to a given input
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            ActivationType::Sigmoid => {
                let x = x.clamp(-SIGMOID_CLAMP, SIGMOID_CLAMP);
                1.0 / (1.0 + (-x).exp())
            }
            ActivationType::ReLU => x.max(0.0),
            ActivationType::LeakyReLU { leak } => {
                if x > 0.0 {
                    x
                } else {
                    leak * x
                }
            }
            ActivationType::Linear => x,
        }
    }

    /// Computes the derivative of the activation function
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationType::Sigmoid => {
                let sigmoid = self.apply(x);
                sigmoid * (1.0 - sigmoid)
            }
            ActivationType::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationType::LeakyReLU { leak } => {
                if x > 0.0 {
                    1.0
                } else {
                    *leak
                }
            }
            ActivationType::Linear => 1.0,
        }
    }

    pub fn forward(&self, z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|x| self.apply(x))
    }

    pub fn backward(&self, z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|x| self.derivative(x))
    }

    /// Draws an initial `(fan_out, fan_in)` weight matrix suited to this activation.
    pub fn init_weights<R: Rng + ?Sized>(
        &self,
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        if fan_in == 0 {
            return Err(NetworkError::Configuration(
                "cannot initialise weights for a layer with no inputs".to_string(),
            ));
        }

        let std_dev = match self {
            ActivationType::Sigmoid | ActivationType::Linear => 1.0 / (fan_in as f64).sqrt(),
            ActivationType::ReLU | ActivationType::LeakyReLU { .. } => {
                (2.0 / fan_in as f64).sqrt()
            }
        };
        let normal_dist = Normal::new(0.0, std_dev)
            .map_err(|e| NetworkError::Configuration(e.to_string()))?;

        let weights = Array2::from_shape_fn((fan_out, fan_in), |_| normal_dist.sample(&mut *rng));
        Ok(match self {
            // He init rectified to non-negative values
            ActivationType::ReLU => weights.mapv(f64::abs),
            _ => weights,
        })
    }
}

impl fmt::Display for ActivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivationType {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        ActivationType::from_name(s).ok_or_else(|| {
            NetworkError::Configuration(format!("unknown activation function {s:?}"))
        })
    }
}
