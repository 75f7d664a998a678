use crate::error::{NetworkError, Result};

/// Hyperparameters for a training run
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameters {
    /// Number of passes over the training set
    pub epochs: usize,

    /// Examples per mini-batch; 0 trains on the whole training set at once
    pub batch_size: usize,

    /// Learning rate for training
    pub learning_rate: f64,

    /// Log one line per epoch at info level
    pub log_info: bool,

    /// Fraction of the shuffled dataset held out for validation, in `[0, 1)`
    pub validation_split: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            epochs: 10,
            batch_size: 0,
            learning_rate: 0.001,
            log_info: true,
            validation_split: 0.15,
        }
    }
}

impl Hyperparameters {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_log_info(mut self, log_info: bool) -> Self {
        self.log_info = log_info;
        self
    }

    pub fn with_validation_split(mut self, validation_split: f64) -> Self {
        self.validation_split = validation_split;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(NetworkError::Configuration(format!(
                "validation split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(NetworkError::Configuration(format!(
                "learning rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hyperparameters() {
        let hp = Hyperparameters::default();

        assert_eq!(hp.epochs, 10);
        assert_eq!(hp.batch_size, 0);
        assert_eq!(hp.learning_rate, 0.001);
        assert!(hp.log_info);
        assert_eq!(hp.validation_split, 0.15);
        assert!(hp.validate().is_ok());
    }

    #[test]
    fn test_validation_split_range() {
        for split in [-0.1, 1.0, 1.5, f64::NAN] {
            let hp = Hyperparameters::default().with_validation_split(split);
            assert!(
                matches!(hp.validate(), Err(NetworkError::Configuration(_))),
                "split {split} accepted"
            );
        }
        assert!(Hyperparameters::default().with_validation_split(0.0).validate().is_ok());
    }

    #[test]
    fn test_learning_rate_must_be_positive() {
        let hp = Hyperparameters::default().with_learning_rate(0.0);
        assert!(hp.validate().is_err());
    }
}
