use std::fmt;

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;

use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::utils::outer_product;

/// Trainable state owned by every layer except the input layer.
#[derive(Debug, Clone)]
struct LayerParams {
    weights: Array2<f64>,
    bias: Array1<f64>,
    weight_grads: Array2<f64>,
    /// dL/dz; also the bias gradient.
    preactivation_grads: Array1<f64>,
}

/// Weight and bias gradient of one non-input layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGradient {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
}

impl LayerGradient {
    pub fn zeros(neurons: usize, inputs: usize) -> Self {
        LayerGradient {
            weights: Array2::zeros((neurons, inputs)),
            biases: Array1::zeros(neurons),
        }
    }

    pub fn accumulate(&mut self, other: &LayerGradient) {
        self.weights += &other.weights;
        self.biases += &other.biases;
    }

    pub fn scale(&mut self, factor: f64) {
        self.weights *= factor;
        self.biases *= factor;
    }
}

/// Represents a layer in the neural network
#[derive(Debug, Clone)]
pub struct Layer {
    neurons: usize,
    previous: Option<usize>,
    activation: ActivationType,
    params: Option<LayerParams>,
    preactivation_cache: Array1<f64>,
    activation_cache: Array1<f64>,
    activation_grads: Array1<f64>,
}

impl Layer {
    /// Constructs the pass-through input layer. It owns no weights and its
    /// activation slot always holds the default strategy.
    pub fn input(neurons: usize) -> Self {
        Layer {
            neurons,
            previous: None,
            activation: ActivationType::default(),
            params: None,
            preactivation_cache: Array1::zeros(neurons),
            activation_cache: Array1::zeros(neurons),
            activation_grads: Array1::zeros(neurons),
        }
    }

    /// Constructs a new layer with specified configuration
    ///
    /// # Arguments
    ///
    /// * `neurons` - Number of neurons in this layer
    /// * `previous` - Index of the preceding layer inside the owning network
    /// * `inputs` - Number of neurons in the preceding layer
    /// * `activation` - Activation function type for the layer
    /// * `rng` - Source of randomness for the weight initialisation
    pub fn new<R: Rng + ?Sized>(
        neurons: usize,
        previous: usize,
        inputs: usize,
        activation: ActivationType,
        rng: &mut R,
    ) -> Result<Self> {
        let weights = activation.init_weights(inputs, neurons, rng)?;
        Self::from_parameters(previous, weights, Array1::zeros(neurons), activation)
    }

    /// Builds a layer around existing parameters, one weight row per neuron.
    pub fn from_parameters(
        previous: usize,
        weights: Array2<f64>,
        biases: Array1<f64>,
        activation: ActivationType,
    ) -> Result<Self> {
        let (neurons, inputs) = weights.dim();
        if neurons == 0 || inputs == 0 {
            return Err(NetworkError::Configuration(format!(
                "layer weights must be non-empty, got {neurons}x{inputs}"
            )));
        }
        if biases.len() != neurons {
            return Err(NetworkError::shape(neurons, biases.len(), "layer biases"));
        }

        let params = LayerParams {
            weights,
            bias: biases,
            weight_grads: Array2::zeros((neurons, inputs)),
            preactivation_grads: Array1::zeros(neurons),
        };

        Ok(Layer {
            neurons,
            previous: Some(previous),
            activation,
            params: Some(params),
            preactivation_cache: Array1::zeros(neurons),
            activation_cache: Array1::zeros(neurons),
            activation_grads: Array1::zeros(neurons),
        })
    }

    pub fn neurons(&self) -> usize {
        self.neurons
    }

    /// Index of the preceding layer, `None` for the input layer.
    pub fn previous(&self) -> Option<usize> {
        self.previous
    }

    pub fn is_input(&self) -> bool {
        self.params.is_none()
    }

    pub fn activation(&self) -> ActivationType {
        self.activation
    }

    /// Number of neurons feeding this layer.
    pub fn inputs(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.weights.ncols())
    }

    pub fn weights(&self) -> Option<&Array2<f64>> {
        self.params.as_ref().map(|p| &p.weights)
    }

    pub fn biases(&self) -> Option<&Array1<f64>> {
        self.params.as_ref().map(|p| &p.bias)
    }

    pub fn weights_mut(&mut self) -> Result<&mut Array2<f64>> {
        Ok(&mut self.params_mut("weights")?.weights)
    }

    pub fn biases_mut(&mut self) -> Result<&mut Array1<f64>> {
        Ok(&mut self.params_mut("biases")?.bias)
    }

    pub fn set_weights(&mut self, weights: Array2<f64>) -> Result<()> {
        let params = self.params_mut("weights")?;
        if weights.dim() != params.weights.dim() {
            let (rows, cols) = params.weights.dim();
            return Err(NetworkError::shape(rows * cols, weights.len(), "set weights"));
        }
        params.weights = weights;
        Ok(())
    }

    pub fn set_biases(&mut self, biases: Array1<f64>) -> Result<()> {
        let params = self.params_mut("biases")?;
        if biases.len() != params.bias.len() {
            return Err(NetworkError::shape(params.bias.len(), biases.len(), "set biases"));
        }
        params.bias = biases;
        Ok(())
    }

    /// Pre-activation values `z` from the last forward pass.
    pub fn preactivations(&self) -> &Array1<f64> {
        &self.preactivation_cache
    }

    pub fn activations(&self) -> &Array1<f64> {
        &self.activation_cache
    }

    /// dL/da as last set by the loss or the downstream layer.
    pub fn activation_grads(&self) -> &Array1<f64> {
        &self.activation_grads
    }

    pub fn weight_grads(&self) -> Option<&Array2<f64>> {
        self.params.as_ref().map(|p| &p.weight_grads)
    }

    pub fn bias_grads(&self) -> Option<&Array1<f64>> {
        self.params.as_ref().map(|p| &p.preactivation_grads)
    }

    /// Copy of the gradients left by the last `backward` call.
    pub fn gradient(&self) -> Option<LayerGradient> {
        self.params.as_ref().map(|p| LayerGradient {
            weights: p.weight_grads.clone(),
            biases: p.preactivation_grads.clone(),
        })
    }

    pub fn parameter_count(&self) -> usize {
        self.params
            .as_ref()
            .map_or(0, |p| p.weights.len() + p.bias.len())
    }

    pub(crate) fn set_input(&mut self, input: &Array1<f64>) -> Result<()> {
        if input.len() != self.neurons {
            return Err(NetworkError::shape(self.neurons, input.len(), "predict"));
        }
        self.activation_cache.assign(input);
        Ok(())
    }

    pub(crate) fn set_activation_grads(&mut self, grads: Array1<f64>) -> Result<()> {
        if grads.len() != self.neurons {
            return Err(NetworkError::shape(self.neurons, grads.len(), "set activation gradient"));
        }
        self.activation_grads = grads;
        Ok(())
    }

    /// Forward propagation through the layer: `z = W·input + b`, `a = f(z)`.
    ///
    /// No-op for the input layer, whose activations are supplied externally.
    pub fn forward(&mut self, input: ArrayView1<f64>) -> Result<()> {
        let Some(params) = self.params.as_ref() else {
            return Ok(());
        };
        if input.len() != params.weights.ncols() {
            return Err(NetworkError::shape(params.weights.ncols(), input.len(), "forward"));
        }

        let z = params.weights.dot(&input) + &params.bias;
        self.activation_cache = self.activation.forward(&z);
        self.preactivation_cache = z;
        Ok(())
    }

    /// Backward pass through the layer.
    ///
    /// Reads the activation gradient set by the caller together with the
    /// cached pre-activations, stores the weight and bias gradients and
    /// returns the activation gradient for the preceding layer. Returns
    /// `None` for the input layer.
    pub fn backward(&mut self, input: ArrayView1<f64>) -> Result<Option<Array1<f64>>> {
        let Some(params) = self.params.as_mut() else {
            return Ok(None);
        };
        if input.len() != params.weights.ncols() {
            return Err(NetworkError::shape(params.weights.ncols(), input.len(), "backward"));
        }

        let dz = self.activation.backward(&self.preactivation_cache) * &self.activation_grads;
        params.weight_grads = outer_product(dz.view(), input);
        let upstream = params.weights.t().dot(&dz);
        params.preactivation_grads = dz;
        Ok(Some(upstream))
    }

    /// Read-only view of the neuron at `index`.
    pub fn neuron(&self, index: usize) -> Result<Neuron<'_>> {
        self.check_index(index)?;
        Ok(Neuron { layer: self, index })
    }

    pub fn neurons_iter(&self) -> impl Iterator<Item = Neuron<'_>> {
        (0..self.neurons).map(move |index| Neuron { layer: self, index })
    }

    pub fn set_neuron_weights(&mut self, index: usize, row: &[f64]) -> Result<()> {
        self.check_index(index)?;
        let params = self.params_mut("neuron weights")?;
        let cols = params.weights.ncols();
        if row.len() != cols {
            return Err(NetworkError::shape(cols, row.len(), "set neuron weights"));
        }
        params
            .weights
            .row_mut(index)
            .assign(&ArrayView1::from(row));
        Ok(())
    }

    pub fn set_neuron_bias(&mut self, index: usize, bias: f64) -> Result<()> {
        self.check_index(index)?;
        self.params_mut("neuron bias")?.bias[index] = bias;
        Ok(())
    }

    pub fn set_neuron_activation(&mut self, index: usize, activation: f64) -> Result<()> {
        self.check_index(index)?;
        if self.is_input() {
            return Err(NetworkError::ImmutableInputLayer(
                "cannot change the activation of a neuron in the input layer".to_string(),
            ));
        }
        self.activation_cache[index] = activation;
        Ok(())
    }

    fn params_mut(&mut self, what: &str) -> Result<&mut LayerParams> {
        self.params.as_mut().ok_or_else(|| {
            NetworkError::ImmutableInputLayer(format!("the input layer has no {what}"))
        })
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.neurons {
            return Err(NetworkError::shape(self.neurons, index, "neuron index"));
        }
        Ok(())
    }
}

/// Checks that `gradients` lines up with the non-input layers of `layers`.
pub(crate) fn check_gradients(
    layers: &[Layer],
    gradients: &[LayerGradient],
    operation: &str,
) -> Result<()> {
    let trainable: Vec<&Layer> = layers.iter().filter(|layer| !layer.is_input()).collect();
    if gradients.len() != trainable.len() {
        return Err(NetworkError::shape(
            trainable.len(),
            gradients.len(),
            format!("{operation} layers"),
        ));
    }
    for (layer, grad) in trainable.into_iter().zip(gradients) {
        if let Some(weights) = layer.weights() {
            if weights.dim() != grad.weights.dim() {
                return Err(NetworkError::shape(
                    weights.len(),
                    grad.weights.len(),
                    format!("{operation} weights"),
                ));
            }
        }
        if grad.biases.len() != layer.neurons() {
            return Err(NetworkError::shape(
                layer.neurons(),
                grad.biases.len(),
                format!("{operation} biases"),
            ));
        }
    }
    Ok(())
}

/// One neuron of a layer, viewed through the layer's arrays.
#[derive(Debug, Clone, Copy)]
pub struct Neuron<'a> {
    layer: &'a Layer,
    index: usize,
}

impl<'a> Neuron<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn activation(&self) -> f64 {
        self.layer.activation_cache[self.index]
    }

    pub fn bias(&self) -> Option<f64> {
        self.layer.biases().map(|b| b[self.index])
    }

    /// Incoming weights of this neuron, one per neuron of the previous layer.
    pub fn weights(&self) -> Option<ArrayView1<'a, f64>> {
        self.layer.weights().map(|w| w.row(self.index))
    }
}

impl fmt::Display for Neuron<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bias() {
            Some(bias) => write!(f, "[a={} b={}]", self.activation(), bias),
            None => write!(f, "[a={}]", self.activation()),
        }
    }
}
