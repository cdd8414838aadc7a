/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Labels and Selectors
//!
//! Agents carry a flat `key=value` label set. Configurations pick the agents
//! they apply to with an [`AgentSelector`].
//!
//! ## Matching Rules
//!
//! - A selector with NO labels matches ANY agent
//! - A selector WITH labels matches when ALL of its key/value pairs are present
//!   on the agent with equal values
//!
//! Keys starting with [`RESERVED_LABEL_PREFIX`] are owned by the manager
//! (agent id, name, version) and are never part of an agent's custom labels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix of labels maintained by the manager itself.
pub const RESERVED_LABEL_PREFIX: &str = "tether/agent-";

/// Maximum length of a label key or value.
pub const MAX_LABEL_LENGTH: usize = 63;

/// An ordered `key -> value` label set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Returns the labels without the manager-owned ones.
    pub fn custom(&self) -> Labels {
        self.0
            .iter()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns only the manager-owned labels.
    pub fn reserved(&self) -> Labels {
        self.0
            .iter()
            .filter(|(k, _)| is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Validates every key and value.
    ///
    /// # Returns
    ///
    /// `Err` with a human readable reason for the first invalid entry.
    pub fn validate(&self) -> Result<(), String> {
        for (key, value) in &self.0 {
            if key.trim().is_empty() {
                return Err("Label keys cannot be empty".to_string());
            }
            if key.len() > MAX_LABEL_LENGTH || value.len() > MAX_LABEL_LENGTH {
                return Err(format!(
                    "Label {} exceeds {} characters",
                    key, MAX_LABEL_LENGTH
                ));
            }
            if key.chars().any(char::is_whitespace) || value.chars().any(char::is_whitespace) {
                return Err(format!("Label {} cannot contain whitespace", key));
            }
        }
        Ok(())
    }

    /// Parses `a=b,c=d` into labels.
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut labels = Labels::new();
        for pair in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("Invalid label '{}', expected key=value", pair))?;
            labels.insert(key.trim(), value.trim());
        }
        labels.validate()?;
        Ok(labels)
    }
}

fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_LABEL_PREFIX)
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Labels(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", pairs.join(","))
    }
}

/// Label selector used by configurations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSelector {
    /// Every pair must be present on the agent with an equal value.
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl AgentSelector {
    pub fn new<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            match_labels: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Check if this selector matches a label set.
    pub fn matches(&self, labels: &Labels) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value.as_str()))
    }
}
