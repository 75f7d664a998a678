//! Turning labelled menu item names into training samples.
//!
//! Names are one-hot encoded character by character against a vocabulary
//! fitted on the whole dataset; ratings come from a small CSV file whose
//! first column holds the name.

use std::collections::BTreeSet;

use ndarray::Array1;

use crate::error::{NetworkError, Result};
use crate::model::Sample;

/// Sorted alphabet of every character seen in the fitted names.
#[derive(Debug, Clone, PartialEq)]
pub struct CharVocabulary {
    alphabet: Vec<char>,
    max_len: usize,
}

impl CharVocabulary {
    pub fn fit<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut alphabet = BTreeSet::new();
        let mut max_len = 0;
        for name in names {
            alphabet.extend(name.chars());
            max_len = max_len.max(name.chars().count());
        }
        CharVocabulary {
            alphabet: alphabet.into_iter().collect(),
            max_len,
        }
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    /// Length in characters of the longest fitted name.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Length of every encoded vector, and the input size a network needs.
    pub fn input_size(&self) -> usize {
        self.max_len * self.alphabet.len()
    }

    pub fn encode(&self, name: &str) -> Result<Array1<f64>> {
        let width = self.alphabet.len();
        let len = name.chars().count();
        if len > self.max_len {
            return Err(NetworkError::shape(self.max_len, len, "encode name"));
        }

        let mut encoded = Array1::zeros(self.input_size());
        for (position, c) in name.chars().enumerate() {
            let symbol = self
                .alphabet
                .binary_search(&c)
                .map_err(|_| NetworkError::UnknownSymbol(c))?;
            encoded[position * width + symbol] = 1.0;
        }
        Ok(encoded)
    }
}

/// Named rating rows read from a CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingDataset {
    /// Rating column names, without the leading name column.
    pub properties: Vec<String>,
    pub rows: Vec<(String, Vec<f64>)>,
}

impl RatingDataset {
    /// Parses `name,rating,...` rows under a header line. Blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let Some((_, header)) = lines.next() else {
            return Err(NetworkError::persistence(1, "missing CSV header"));
        };
        let properties: Vec<String> = header
            .split(',')
            .skip(1)
            .map(|p| p.trim().to_string())
            .collect();
        if properties.is_empty() {
            return Err(NetworkError::persistence(1, "header names no rating columns"));
        }

        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let mut values = line.split(',');
            let name = values.next().unwrap_or_default().trim().to_string();
            let ratings = values
                .map(|value| {
                    value.trim().parse::<f64>().map_err(|_| {
                        NetworkError::persistence(line_no, format!("invalid rating {value:?}"))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            if ratings.len() != properties.len() {
                return Err(NetworkError::persistence(
                    line_no,
                    format!("expected {} ratings, got {}", properties.len(), ratings.len()),
                ));
            }
            rows.push((name, ratings));
        }

        Ok(RatingDataset { properties, rows })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|(name, _)| name.as_str())
    }

    pub fn vocabulary(&self) -> CharVocabulary {
        CharVocabulary::fit(self.names())
    }

    /// `(encoded name, ratings)` pairs ready for [`crate::Network::train`].
    pub fn samples(&self, vocabulary: &CharVocabulary) -> Result<Vec<Sample>> {
        self.rows
            .iter()
            .map(|(name, ratings)| -> Result<Sample> {
                Ok((vocabulary.encode(name)?, Array1::from(ratings.clone())))
            })
            .collect()
    }
}

/// Rounds a predicted rating to a whole score in `[0, 100]`.
pub fn rating_score(prediction: f64) -> u8 {
    if prediction.is_nan() {
        return 0;
    }
    prediction.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "lunch_name,taste,healthiness\nrizoto,80,60\n\nguláš,95,20\n";

    #[test]
    fn test_vocabulary_encoding() {
        let vocabulary = CharVocabulary::fit(["ab", "ca"]);
        assert_eq!(vocabulary.alphabet(), &['a', 'b', 'c']);
        assert_eq!(vocabulary.input_size(), 6);

        let encoded = vocabulary.encode("ba").unwrap();
        assert_eq!(encoded.to_vec(), vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);

        let short = vocabulary.encode("c").unwrap();
        assert_eq!(short.sum(), 1.0);
        assert_eq!(short[2], 1.0);
    }

    #[test]
    fn test_encoding_errors() {
        let vocabulary = CharVocabulary::fit(["ab"]);
        assert!(matches!(vocabulary.encode("az"), Err(NetworkError::UnknownSymbol('z'))));
        assert!(matches!(
            vocabulary.encode("aba"),
            Err(NetworkError::ShapeMismatch { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn test_parse_rating_csv() {
        let dataset = RatingDataset::parse(CSV).unwrap();
        assert_eq!(dataset.properties, vec!["taste", "healthiness"]);
        assert_eq!(dataset.rows.len(), 2);
        assert_eq!(dataset.rows[1], ("guláš".to_string(), vec![95.0, 20.0]));

        let vocabulary = dataset.vocabulary();
        assert_eq!(vocabulary.max_len(), 6);
        let samples = dataset.samples(&vocabulary).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].0.len(), vocabulary.input_size());
        assert_eq!(samples[0].1.to_vec(), vec![80.0, 60.0]);
    }

    #[test]
    fn test_parse_rejects_ragged_rows() {
        let result = RatingDataset::parse("lunch_name,taste\nrizoto,80,1\n");
        assert!(matches!(result, Err(NetworkError::Persistence { line: 2, .. })));

        let result = RatingDataset::parse("lunch_name,taste\nrizoto,good\n");
        assert!(matches!(result, Err(NetworkError::Persistence { line: 2, .. })));
    }

    #[test]
    fn test_rating_score() {
        assert_eq!(rating_score(49.6), 50);
        assert_eq!(rating_score(-3.0), 0);
        assert_eq!(rating_score(180.0), 100);
        assert_eq!(rating_score(f64::NAN), 0);
    }
}
