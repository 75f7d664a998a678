mod activation;
mod encoding;
mod error;
mod hyperparameters;
mod layer;
mod loss;
mod model;
mod optimizer;
mod persistence;
mod utils;

pub use activation::{ActivationType, DEFAULT_LEAK};
pub use encoding::{rating_score, CharVocabulary, RatingDataset};
pub use error::{NetworkError, Result};
pub use hyperparameters::Hyperparameters;
pub use layer::{Layer, LayerGradient, Neuron};
pub use loss::Loss;
pub use model::{EpochStats, LayerActivations, Network, Sample};
pub use optimizer::Adam;
pub use persistence::DEFAULT_MODEL_PATH;
