//! On-disk and on-wire dataset format.

use crate::error::DatasetError;
use overlay::{CardId, CardStats};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One card of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: CardId,
    #[serde(default)]
    pub name: String,
    /// Image URL as published by the host site; indexed after normalization.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub owners: u32,
    #[serde(default)]
    pub wants: u32,
    #[serde(default)]
    pub trades: u32,
}

impl CardRecord {
    pub const fn stats(&self) -> CardStats {
        CardStats {
            owners: self.owners,
            wants: self.wants,
            trades: self.trades,
        }
    }
}

/// A complete dataset snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub version: u64,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub cards: Vec<CardRecord>,
}

impl Dataset {
    /// Parse and validate a dataset document.
    ///
    /// # Errors
    /// Fails on malformed JSON or an invalid dataset (see [`Dataset::validate`]).
    pub fn from_json(bytes: &[u8]) -> Result<Self, DatasetError> {
        let dataset: Self = serde_json::from_slice(bytes)?;
        dataset.validate()?;
        Ok(dataset)
    }

    /// # Errors
    /// Fails only if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, DatasetError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Reject zero ids and duplicate ids.
    ///
    /// # Errors
    /// Names the first offending id.
    pub fn validate(&self) -> Result<(), DatasetError> {
        let mut seen = HashSet::with_capacity(self.cards.len());
        for card in &self.cards {
            if card.id == 0 {
                return Err(DatasetError::Invalid(format!(
                    "card {:?} has id 0",
                    card.name
                )));
            }
            if !seen.insert(card.id) {
                return Err(DatasetError::Invalid(format!("duplicate card id {}", card.id)));
            }
        }
        Ok(())
    }
}

/// Announcement of the latest dataset published by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u64,
    /// Location of the dataset document, relative to the manifest.
    pub url: String,
}
