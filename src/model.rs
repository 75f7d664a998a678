use log::{debug, info, trace, warn};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::hyperparameters::Hyperparameters;
use crate::layer::{check_gradients, Layer, LayerGradient};
use crate::loss::Loss;
use crate::optimizer::Adam;
use crate::utils::{clip, round6};

/// One training example: `(input vector, target vector)`.
pub type Sample = (Array1<f64>, Array1<f64>);

/// Gradients outside `[-CLIP, CLIP]` are clamped by `update_weights`.
const GRADIENT_CLIP: f64 = 1.0;

/// Activation configuration for the non-input layers of a network.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerActivations {
    /// The same activation on every non-input layer.
    Shared(ActivationType),
    /// One activation per non-input layer, in forward order.
    PerLayer(Vec<ActivationType>),
}

impl From<ActivationType> for LayerActivations {
    fn from(activation: ActivationType) -> Self {
        LayerActivations::Shared(activation)
    }
}

impl From<Vec<ActivationType>> for LayerActivations {
    fn from(activations: Vec<ActivationType>) -> Self {
        LayerActivations::PerLayer(activations)
    }
}

impl From<&[ActivationType]> for LayerActivations {
    fn from(activations: &[ActivationType]) -> Self {
        LayerActivations::PerLayer(activations.to_vec())
    }
}

impl Default for LayerActivations {
    fn default() -> Self {
        LayerActivations::Shared(ActivationType::default())
    }
}

/// Costs measured at the end of one epoch, rounded to six decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    /// 1-based epoch index
    pub epoch: usize,
    pub training_cost: f64,
    pub validation_cost: Option<f64>,
}

/// A fully-connected feedforward network: an input layer followed by one or
/// more dense layers, trained against a single loss.
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
    loss: Loss,
    last_cost: Option<f64>,
}

impl Network {
    /// Create a new network with one layer per entry of `layer_sizes`
    ///
    /// # Arguments
    ///
    /// * `layer_sizes` - Neuron count of every layer, input layer first
    /// * `activations` - One shared activation or one per non-input layer
    /// * `loss` - Objective used by `current_cost`, `backprop` and `train`
    pub fn new(
        layer_sizes: &[usize],
        activations: impl Into<LayerActivations>,
        loss: Loss,
    ) -> Result<Self> {
        Self::new_with_rng(layer_sizes, activations, loss, &mut rand::rng())
    }

    /// Same as [`Network::new`], drawing initial weights from `rng`.
    pub fn new_with_rng<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        activations: impl Into<LayerActivations>,
        loss: Loss,
        rng: &mut R,
    ) -> Result<Self> {
        if layer_sizes.len() < 2 {
            return Err(NetworkError::Configuration(format!(
                "at least two layers (input and output) are required, got {}",
                layer_sizes.len()
            )));
        }
        if let Some(index) = layer_sizes.iter().position(|&size| size == 0) {
            return Err(NetworkError::Configuration(format!(
                "layer {index} has no neurons"
            )));
        }

        let downstream = layer_sizes.len() - 1;
        let activations = match activations.into() {
            LayerActivations::Shared(activation) => vec![activation; downstream],
            LayerActivations::PerLayer(activations) => {
                if activations.len() != downstream {
                    return Err(NetworkError::Configuration(format!(
                        "expected {} activation functions (one per non-input layer), got {}",
                        downstream,
                        activations.len()
                    )));
                }
                activations
            }
        };

        let mut layers = Vec::with_capacity(layer_sizes.len());
        layers.push(Layer::input(layer_sizes[0]));
        for ((index, &neurons), activation) in
            layer_sizes.iter().enumerate().skip(1).zip(activations)
        {
            let previous = index - 1;
            layers.push(Layer::new(
                neurons,
                previous,
                layer_sizes[previous],
                activation,
                rng,
            )?);
        }

        Ok(Network::from_layers(layers, loss))
    }

    /// Wraps layers that are already linked in forward order.
    pub(crate) fn from_layers(layers: Vec<Layer>, loss: Loss) -> Self {
        Network {
            layers,
            loss,
            last_cost: None,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Layer> {
        self.layers.iter()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].neurons()
    }

    pub fn output_size(&self) -> usize {
        self.output_layer().neurons()
    }

    /// Weights plus biases over every non-input layer.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Mean training cost of the most recent epoch; `None` until trained.
    pub fn last_cost(&self) -> Option<f64> {
        self.last_cost
    }

    fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    /// Feeds `input` through every layer and returns the output activations.
    ///
    /// Overwrites the cached pre-activations and activations of every layer.
    pub fn predict(&mut self, input: &Array1<f64>) -> Result<Array1<f64>> {
        self.layers[0].set_input(input)?;

        for index in 1..self.layers.len() {
            let (before, rest) = self.layers.split_at_mut(index);
            let layer = &mut rest[0];
            let Some(previous) = layer.previous() else {
                continue;
            };
            layer.forward(before[previous].activations().view())?;
        }

        Ok(self.output_layer().activations().clone())
    }

    /// Cost of the last prediction against `targets`.
    pub fn current_cost(&self, targets: &Array1<f64>) -> Result<f64> {
        let output = self.output_layer();
        if targets.len() != output.neurons() {
            return Err(NetworkError::shape(
                output.neurons(),
                targets.len(),
                "current cost",
            ));
        }
        self.loss.cost(output.activations(), targets)
    }

    /// Backpropagates the loss of the last prediction against `targets`.
    ///
    /// Must follow the `predict` call whose output `targets` belongs to.
    /// Returns `(weight, bias)` gradients for each non-input layer in forward
    /// order.
    pub fn backprop(&mut self, targets: &Array1<f64>) -> Result<Vec<LayerGradient>> {
        let output = self.output_layer();
        if targets.len() != output.neurons() {
            return Err(NetworkError::shape(output.neurons(), targets.len(), "backprop"));
        }
        let output_grads = self.loss.derivative(output.activations(), targets)?;
        let last = self.layers.len() - 1;
        self.layers[last].set_activation_grads(output_grads)?;

        for index in (0..self.layers.len()).rev() {
            let (before, rest) = self.layers.split_at_mut(index);
            let layer = &mut rest[0];
            let Some(previous) = layer.previous() else {
                continue;
            };
            if let Some(upstream) = layer.backward(before[previous].activations().view())? {
                before[previous].set_activation_grads(upstream)?;
            }
        }

        Ok(self.layers.iter().filter_map(Layer::gradient).collect())
    }

    /// Plain gradient-descent step with every gradient clipped to `[-1, 1]`.
    pub fn update_weights(
        &mut self,
        gradient: &[LayerGradient],
        learning_rate: f64,
    ) -> Result<()> {
        check_gradients(&self.layers, gradient, "update weights")?;

        let trainable = self.layers.iter_mut().filter(|layer| !layer.is_input());
        for (layer, grad) in trainable.zip(gradient) {
            let weight_grads = clip(&grad.weights, GRADIENT_CLIP);
            let bias_grads = clip(&grad.biases, GRADIENT_CLIP);
            layer.weights_mut()?.scaled_add(-learning_rate, &weight_grads);
            layer.biases_mut()?.scaled_add(-learning_rate, &bias_grads);
        }
        Ok(())
    }

    /// Mean cost over `samples` without touching any parameter.
    pub fn evaluate(&mut self, samples: &[Sample]) -> Result<f64> {
        if samples.is_empty() {
            return Err(NetworkError::Configuration(
                "cannot evaluate an empty sample set".to_string(),
            ));
        }
        let mut cost_sum = 0.0;
        for (input, target) in samples {
            self.predict(input)?;
            cost_sum += self.current_cost(target)?;
        }
        Ok(cost_sum / samples.len() as f64)
    }

    /// Mini-batch Adam training. See [`Network::train_with_rng`].
    pub fn train(
        &mut self,
        dataset: &[Sample],
        hyperparameters: &Hyperparameters,
    ) -> Result<Vec<EpochStats>> {
        self.train_with_rng(dataset, hyperparameters, &mut rand::rng())
    }

    /// Trains the network with mini-batch Adam.
    ///
    /// The dataset is shuffled once and its tail `validation_split` fraction
    /// held out; the training part is reshuffled every epoch and walked in
    /// consecutive batches whose mean gradient drives one Adam step each.
    /// Returns the costs of every epoch; the last training cost is also kept
    /// as [`Network::last_cost`].
    pub fn train_with_rng<R: Rng + ?Sized>(
        &mut self,
        dataset: &[Sample],
        hyperparameters: &Hyperparameters,
        rng: &mut R,
    ) -> Result<Vec<EpochStats>> {
        if dataset.is_empty() {
            return Err(NetworkError::Configuration("training dataset is empty".to_string()));
        }
        hyperparameters.validate()?;
        let Hyperparameters {
            epochs,
            batch_size,
            learning_rate,
            log_info,
            validation_split,
        } = *hyperparameters;

        let mut adam = Adam::new(&self.layers);

        let mut training = dataset.to_vec();
        training.shuffle(rng);
        let split_index = if validation_split == 0.0 {
            training.len()
        } else {
            ((1.0 - validation_split) * training.len() as f64) as usize
        };
        let validation = training.split_off(split_index);
        if training.is_empty() {
            return Err(NetworkError::Configuration(format!(
                "validation split {validation_split} leaves no training examples out of {}",
                dataset.len()
            )));
        }
        if validation_split > 0.0 && validation.is_empty() {
            warn!(
                "Validation split {validation_split} leaves no validation examples; \
                 skipping validation"
            );
        }

        let batch_size = if batch_size == 0 { training.len() } else { batch_size };
        debug!(
            "Training on {} examples, validating on {}, batch size {}",
            training.len(),
            validation.len(),
            batch_size
        );

        let mut history = Vec::with_capacity(epochs);
        for epoch in 1..=epochs {
            training.shuffle(rng);
            let mut cost_sum = 0.0;
            let mut count = 0usize;

            for (batch_idx, batch) in training.chunks(batch_size).enumerate() {
                let mut gradient_sum: Option<Vec<LayerGradient>> = None;

                for (input, target) in batch {
                    self.predict(input)?;
                    cost_sum += self.current_cost(target)?;
                    let gradient = self.backprop(target)?;

                    if let Some(sum) = gradient_sum.as_mut() {
                        for (total, grad) in sum.iter_mut().zip(&gradient) {
                            total.accumulate(grad);
                        }
                    } else {
                        gradient_sum = Some(gradient);
                    }
                    count += 1;
                }

                let Some(mut gradient) = gradient_sum else {
                    continue;
                };
                let scale = 1.0 / batch.len() as f64;
                for grad in &mut gradient {
                    grad.scale(scale);
                }
                adam.step(&mut self.layers, &gradient, learning_rate)?;
                trace!(
                    "Epoch {epoch} batch {batch_idx}: {} examples, step {}",
                    batch.len(),
                    adam.steps()
                );
            }

            let training_cost = round6(cost_sum / count as f64);
            self.last_cost = Some(training_cost);

            let validation_cost = if validation_split > 0.0 && !validation.is_empty() {
                Some(round6(self.evaluate(&validation)?))
            } else {
                None
            };

            if log_info {
                match validation_cost {
                    Some(validation_cost) => info!(
                        "Epoch {epoch}/{epochs} finished | Training Cost: {training_cost} | \
                         Validation Cost: {validation_cost} | Learning Rate: {learning_rate}"
                    ),
                    None => info!(
                        "Epoch {epoch}/{epochs} finished | Training Cost: {training_cost} | \
                         Learning Rate: {learning_rate}"
                    ),
                }
            }

            history.push(EpochStats {
                epoch,
                training_cost,
                validation_cost,
            });
        }

        Ok(history)
    }
}

impl<'a> IntoIterator for &'a Network {
    type Item = &'a Layer;
    type IntoIter = std::slice::Iter<'a, Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}
