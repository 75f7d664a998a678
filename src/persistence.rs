//! Plain-text model files.
//!
//! ```text
//! 3,4,2                     neuron count of every layer
//! ReLU,Sigmoid              activation of every non-input layer
//! MeanSquareError           loss
//!
//! 0.1,0,-0.2,0.3            biases of layer 1
//! 0.5,-0.1,0.7              one weight row per neuron of layer 1
//! ...
//!
//! 0,0.2                     biases of layer 2
//! ...
//! ```
//!
//! Strategies are stored by name only, so a `LeakyReLU` with a custom leak
//! comes back with the default one.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};
use ndarray::{Array1, Array2};

use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::layer::Layer;
use crate::loss::Loss;
use crate::model::Network;

pub const DEFAULT_MODEL_PATH: &str = "model.ai";

const HEADER_LINES: usize = 3;

fn join(values: impl IntoIterator<Item = f64>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_values(line: &str, line_no: usize) -> Result<Vec<f64>> {
    line.split(',')
        .map(|value| {
            value.trim().parse::<f64>().map_err(|_| {
                NetworkError::persistence(line_no, format!("invalid number {value:?}"))
            })
        })
        .collect()
}

impl Network {
    /// Serialises the network into the model file format.
    pub fn to_model_string(&self) -> String {
        let layers = self.layers();

        let mut out = layers
            .iter()
            .map(|layer| layer.neurons().to_string())
            .collect::<Vec<_>>()
            .join(",");
        out.push('\n');
        out.push_str(
            &layers[1..]
                .iter()
                .map(|layer| layer.activation().name())
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
        out.push_str(self.loss().name());

        for layer in &layers[1..] {
            if let (Some(weights), Some(biases)) = (layer.weights(), layer.biases()) {
                out.push_str("\n\n");
                out.push_str(&join(biases.iter().copied()));
                for row in weights.rows() {
                    out.push('\n');
                    out.push_str(&join(row.iter().copied()));
                }
            }
        }
        out
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for (index, layer) in self.iter().enumerate().skip(1) {
            if !layer.activation().round_trips_by_name() {
                warn!(
                    "Layer {index}: {:?} is saved as {} and will load with default parameters",
                    layer.activation(),
                    layer.activation().name()
                );
            }
        }
        writer.write_all(self.to_model_string().as_bytes())?;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        debug!("Saved model with {} parameters to {}", self.parameter_count(), path.display());
        Ok(())
    }

    /// Reads a model file. A missing file is `Ok(None)`, so callers can fall
    /// back to building a fresh network.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Network>> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No model at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let network = Network::from_model_str(&text)?;
        debug!(
            "Loaded model with {} parameters from {}",
            network.parameter_count(),
            path.display()
        );
        Ok(Some(network))
    }

    pub fn from_model_str(text: &str) -> Result<Network> {
        let text = text.replace("\r\n", "\n");
        let lines: Vec<&str> = text.trim_end_matches('\n').split('\n').collect();
        if lines.len() < HEADER_LINES {
            return Err(NetworkError::persistence(
                lines.len() + 1,
                "expected layer sizes, activations and loss header",
            ));
        }

        let sizes = lines[0]
            .split(',')
            .map(|size| match size.trim().parse::<usize>() {
                Ok(size) if size > 0 => Ok(size),
                _ => Err(NetworkError::persistence(1, format!("invalid layer size {size:?}"))),
            })
            .collect::<Result<Vec<usize>>>()?;
        if sizes.len() < 2 {
            return Err(NetworkError::persistence(1, "at least two layers are required"));
        }
        if let Some(pair) = sizes.windows(2).find(|pair| pair[0].checked_mul(pair[1]).is_none()) {
            return Err(NetworkError::persistence(
                1,
                format!("a {}x{} weight matrix does not fit in memory", pair[1], pair[0]),
            ));
        }

        let activations = lines[1]
            .split(',')
            .map(|name| {
                ActivationType::from_name(name.trim()).ok_or_else(|| {
                    NetworkError::persistence(2, format!("unknown activation function {name:?}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if activations.len() != sizes.len() - 1 {
            return Err(NetworkError::persistence(
                2,
                format!(
                    "expected {} activation functions, got {}",
                    sizes.len() - 1,
                    activations.len()
                ),
            ));
        }

        let loss_name = lines[2].trim();
        let loss = Loss::from_str(loss_name).map_err(|_| {
            NetworkError::persistence(3, format!("unknown loss function {loss_name:?}"))
        })?;

        let mut dense = Vec::with_capacity(activations.len());
        let mut cursor = HEADER_LINES;
        for (index, activation) in (1..).zip(activations) {
            let (neurons, inputs) = (sizes[index], sizes[index - 1]);

            match lines.get(cursor) {
                Some(line) if line.trim().is_empty() => cursor += 1,
                Some(_) => {
                    return Err(NetworkError::persistence(
                        cursor + 1,
                        "expected a blank line between layers",
                    ))
                }
                None => {
                    return Err(NetworkError::persistence(
                        cursor + 1,
                        format!("missing block for layer {index}"),
                    ))
                }
            }

            let bias_line = lines.get(cursor).ok_or_else(|| {
                NetworkError::persistence(cursor + 1, format!("missing biases for layer {index}"))
            })?;
            let biases = parse_values(bias_line, cursor + 1)?;
            if biases.len() != neurons {
                return Err(NetworkError::persistence(
                    cursor + 1,
                    format!("expected {neurons} biases, got {}", biases.len()),
                ));
            }
            cursor += 1;

            // grows with the rows actually present, never with the header alone
            let mut weights = Vec::new();
            for neuron in 0..neurons {
                let row_line = lines
                    .get(cursor)
                    .filter(|line| !line.trim().is_empty())
                    .ok_or_else(|| {
                        NetworkError::persistence(
                            cursor + 1,
                            format!(
                                "expected {neurons} weight rows for layer {index}, got {neuron}"
                            ),
                        )
                    })?;
                let row = parse_values(row_line, cursor + 1)?;
                if row.len() != inputs {
                    return Err(NetworkError::persistence(
                        cursor + 1,
                        format!("expected {inputs} weights, got {}", row.len()),
                    ));
                }
                weights.extend(row);
                cursor += 1;
            }

            let weights = Array2::from_shape_vec((neurons, inputs), weights)
                .map_err(|e| NetworkError::persistence(cursor, e.to_string()))?;
            dense.push(Layer::from_parameters(
                index - 1,
                weights,
                Array1::from(biases),
                activation,
            )?);
        }

        if cursor < lines.len() {
            return Err(NetworkError::persistence(
                cursor + 1,
                "unexpected content after the last layer",
            ));
        }

        let layers = std::iter::once(Layer::input(sizes[0])).chain(dense).collect();
        Ok(Network::from_layers(layers, loss))
    }
}

impl FromStr for Network {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        Network::from_model_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const SMALL_MODEL: &str = "2,1\nLinear\nMeanSquareError\n\n0.5\n1,-2";

    #[test]
    fn test_parse_small_model() {
        let network = Network::from_model_str(SMALL_MODEL).unwrap();
        let layer = network.layer(1).unwrap();
        assert_eq!(layer.biases().unwrap(), &array![0.5]);
        assert_eq!(layer.weights().unwrap(), &array![[1.0, -2.0]]);
        assert_eq!(network.loss(), Loss::MeanSquareError);
    }

    #[test]
    fn test_written_text_matches_format() {
        let network = Network::from_model_str(SMALL_MODEL).unwrap();
        assert_eq!(network.to_model_string(), SMALL_MODEL);
    }

    #[test]
    fn test_tolerates_crlf_and_trailing_newline() {
        let text = SMALL_MODEL.replace('\n', "\r\n") + "\r\n";
        assert!(Network::from_model_str(&text).is_ok());
    }

    #[test]
    fn test_malformed_files() {
        let cases = [
            ("2,1\nLinear", 3),
            ("2,1\nTanh\nMeanSquareError\n\n0.5\n1,-2", 2),
            ("2,1\nLinear\nHinge\n\n0.5\n1,-2", 3),
            ("2,1\nLinear,Linear\nMeanSquareError\n\n0.5\n1,-2", 2),
            ("2,1\nLinear\nMeanSquareError\n\n0.5\n1", 6),
            ("2,1\nLinear\nMeanSquareError\n\n0.5,1\n1,-2", 5),
            ("2,1\nLinear\nMeanSquareError\n\n0.5", 6),
            ("2,1\nLinear\nMeanSquareError\n\nx\n1,-2", 5),
            ("2,1\nLinear\nMeanSquareError\n\n0.5\n1,-2\n3,4", 7),
            ("2,0\nLinear\nMeanSquareError", 1),
            ("2,1\nLinear\nMeanSquareError\n\n0.5\n\n", 6),
        ];
        for (text, expected_line) in cases {
            match Network::from_model_str(text) {
                Err(NetworkError::Persistence { line, .. }) => {
                    assert_eq!(line, expected_line, "wrong line for {text:?}")
                }
                other => panic!("expected persistence error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_oversized_header_is_rejected_without_allocating() {
        let overflowing = "4294967296,4294967296\nLinear\nMeanSquareError\n\n0\n0";
        assert!(matches!(
            Network::from_model_str(overflowing),
            Err(NetworkError::Persistence { line: 1, .. })
        ));

        // fits in a usize, but the file holds a single bias
        let huge = "100000000,100000000\nLinear\nMeanSquareError\n\n0\n0";
        assert!(matches!(
            Network::from_model_str(huge),
            Err(NetworkError::Persistence { line: 5, .. })
        ));

        let truncated = "3,100000000\nLinear\nMeanSquareError\n\n";
        assert!(matches!(
            Network::from_model_str(truncated),
            Err(NetworkError::Persistence { line: 4, .. })
        ));
    }

    #[test]
    fn test_loaded_layers_are_linked_in_order() {
        let text = "2,2,1\nReLU,Linear\nMeanAbsoluteError\n\n0,1\n1,0\n0,1\n\n-1\n2,3";
        let mut network = Network::from_model_str(text).unwrap();
        assert_eq!(network.layer(1).unwrap().previous(), Some(0));
        assert_eq!(network.layer(2).unwrap().previous(), Some(1));
        assert_eq!(network.loss(), Loss::MeanAbsoluteError);
        assert_eq!(network.last_cost(), None);

        // relu([x0, x1 + 1]) = [2, 4], then 2·2 + 3·4 - 1
        let output = network.predict(&array![2.0, 3.0]).unwrap();
        assert_eq!(output, array![15.0]);
    }
}
