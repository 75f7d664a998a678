use ndarray::{Array, Dimension};

use crate::error::{NetworkError, Result};
use crate::layer::{check_gradients, Layer, LayerGradient};

/// First and second moment estimates for one layer's weights and biases.
#[derive(Debug, Clone)]
struct Moments {
    m: LayerGradient,
    v: LayerGradient,
}

/// Adam optimizer state: one pair of moment accumulators per non-input layer
/// plus the shared step counter used for bias correction.
#[derive(Debug, Clone)]
pub struct Adam {
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
    moments: Vec<Moments>,
}

impl Default for Adam {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            moments: Vec::new(),
        }
    }
}

impl Adam {
    /// Zero-initialised state shaped after `layers`; the input layer is skipped.
    pub fn new(layers: &[Layer]) -> Self {
        let moments = layers
            .iter()
            .filter_map(|layer| {
                let inputs = layer.inputs()?;
                Some(Moments {
                    m: LayerGradient::zeros(layer.neurons(), inputs),
                    v: LayerGradient::zeros(layer.neurons(), inputs),
                })
            })
            .collect();

        Self {
            moments,
            ..Self::default()
        }
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Applies one bias-corrected Adam update per layer from the mean batch gradient.
    ///
    /// `gradients` is in forward order over the non-input layers, matching the
    /// layout the state was built with. Nothing is updated when a shape does
    /// not line up.
    pub fn step(
        &mut self,
        layers: &mut [Layer],
        gradients: &[LayerGradient],
        learning_rate: f64,
    ) -> Result<()> {
        check_gradients(layers, gradients, "adam step")?;
        if self.moments.len() != gradients.len() {
            return Err(NetworkError::shape(
                self.moments.len(),
                gradients.len(),
                "adam state layers",
            ));
        }
        for (moments, grad) in self.moments.iter().zip(gradients) {
            if moments.m.weights.dim() != grad.weights.dim() {
                return Err(NetworkError::shape(
                    moments.m.weights.len(),
                    grad.weights.len(),
                    "adam state weights",
                ));
            }
        }

        self.t += 1;
        let scale = StepScale {
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            correction1: 1.0 - self.beta1.powi(self.t),
            correction2: 1.0 - self.beta2.powi(self.t),
            learning_rate,
        };

        let trainable = layers.iter_mut().filter(|layer| !layer.is_input());
        for ((layer, moments), grad) in trainable.zip(self.moments.iter_mut()).zip(gradients) {
            let Moments { m, v } = moments;
            let weight_update = scale.update(&mut m.weights, &mut v.weights, &grad.weights);
            let bias_update = scale.update(&mut m.biases, &mut v.biases, &grad.biases);

            *layer.weights_mut()? -= &weight_update;
            *layer.biases_mut()? -= &bias_update;
        }
        Ok(())
    }
}

/// Constants of a single Adam step.
#[derive(Clone, Copy)]
struct StepScale {
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    correction1: f64,
    correction2: f64,
    learning_rate: f64,
}

impl StepScale {
    /// Advances `m` and `v` with `grad` and returns `lr·m̂ / (sqrt(v̂) + ε)`.
    fn update<D: Dimension>(
        &self,
        m: &mut Array<f64, D>,
        v: &mut Array<f64, D>,
        grad: &Array<f64, D>,
    ) -> Array<f64, D> {
        let StepScale {
            beta1,
            beta2,
            epsilon,
            correction1,
            correction2,
            learning_rate,
        } = *self;

        m.zip_mut_with(grad, |m, g| *m = beta1 * *m + (1.0 - beta1) * g);
        v.zip_mut_with(grad, |v, g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        let mut update = m.mapv(|m| learning_rate * m / correction1);
        update.zip_mut_with(&*v, |u, v| *u /= (v / correction2).sqrt() + epsilon);
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationType;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut layers = vec![
            Layer::input(2),
            Layer::new(1, 0, 2, ActivationType::Linear, &mut rng).unwrap(),
        ];
        let before = layers[1].weights().unwrap().clone();
        let mut adam = Adam::new(&layers);

        let grad = LayerGradient {
            weights: array![[0.5, -2.0]],
            biases: array![0.0],
        };
        adam.step(&mut layers, &[grad], 0.01).unwrap();

        // m̂ = g and v̂ = g² after one step, so each parameter moves by ~lr·sign(g)
        let after = layers[1].weights().unwrap();
        assert_abs_diff_eq!(before[[0, 0]] - after[[0, 0]], 0.01, epsilon = 1e-6);
        assert_abs_diff_eq!(before[[0, 1]] - after[[0, 1]], -0.01, epsilon = 1e-6);
        assert_abs_diff_eq!(layers[1].biases().unwrap()[0], 0.0);
        assert_eq!(adam.steps(), 1);
    }

    fn single_weight_layers() -> Vec<Layer> {
        vec![
            Layer::input(1),
            Layer::from_parameters(0, array![[0.0]], array![0.0], ActivationType::Linear)
                .unwrap(),
        ]
    }

    fn weight_gradient(g: f64) -> LayerGradient {
        LayerGradient {
            weights: array![[g]],
            biases: array![0.0],
        }
    }

    #[test]
    fn test_second_step_uses_accumulated_moments() {
        let mut layers = single_weight_layers();
        let mut adam = Adam::new(&layers);

        adam.step(&mut layers, &[weight_gradient(0.5)], 0.1).unwrap();
        assert_abs_diff_eq!(layers[1].weights().unwrap()[[0, 0]], -0.1, epsilon = 1e-6);

        // m = 0.02, v = 0.00031225, corrected by 1 - 0.9² and 1 - 0.999²
        adam.step(&mut layers, &[weight_gradient(-0.25)], 0.1).unwrap();
        assert_abs_diff_eq!(
            layers[1].weights().unwrap()[[0, 0]],
            -0.126633701,
            epsilon = 1e-8
        );
        assert_eq!(layers[1].biases().unwrap()[0], 0.0);
        assert_eq!(adam.steps(), 2);
    }

    #[test]
    fn test_step_rejects_misshaped_gradients() {
        let mut layers = vec![
            Layer::input(2),
            Layer::from_parameters(0, array![[0.5, -0.5]], array![0.0], ActivationType::Linear)
                .unwrap(),
        ];
        let mut adam = Adam::new(&layers);
        let before = layers[1].weights().unwrap().clone();

        assert!(matches!(
            adam.step(&mut layers, &[LayerGradient::zeros(1, 3)], 0.1),
            Err(NetworkError::ShapeMismatch { expected: 2, actual: 3, .. })
        ));
        assert!(matches!(
            adam.step(&mut layers, &[], 0.1),
            Err(NetworkError::ShapeMismatch { expected: 1, actual: 0, .. })
        ));
        assert_eq!(layers[1].weights().unwrap(), &before);
        assert_eq!(adam.steps(), 0);
    }

    #[test]
    fn test_step_rejects_state_built_for_other_layers() {
        let mut adam = Adam::new(&single_weight_layers());
        let mut layers = vec![
            Layer::input(2),
            Layer::from_parameters(0, array![[0.5, -0.5]], array![0.0], ActivationType::Linear)
                .unwrap(),
        ];

        assert!(matches!(
            adam.step(&mut layers, &[LayerGradient::zeros(1, 2)], 0.1),
            Err(NetworkError::ShapeMismatch { expected: 1, actual: 2, .. })
        ));
    }
}
