use crate::domain::Objective;
use serde::{Deserialize, Serialize};

/// A named output feature with its objective
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputFeature {
    pub key: String,
    pub objective: Objective,
}

impl OutputFeature {
    pub fn new(key: &str, objective: Objective) -> Self {
        OutputFeature {
            key: key.to_string(),
            objective,
        }
    }
}

/// Ordered set of output features
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    features: Vec<OutputFeature>,
}

impl Outputs {
    pub fn new(features: Vec<OutputFeature>) -> Self {
        Outputs { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputFeature> {
        self.features.iter()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.key.as_str()).collect()
    }

    pub fn get(&self, i: usize) -> Option<&OutputFeature> {
        self.features.get(i)
    }

    pub fn get_by_key(&self, key: &str) -> Option<&OutputFeature> {
        self.features.iter().find(|f| f.key == key)
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.features.iter().position(|f| f.key == key)
    }
}
