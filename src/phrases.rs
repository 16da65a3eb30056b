//! Aphorism storage: short literary phrases tied to book chapters.
//!
//! The provider is a trait seam so tests (and future backends) can swap the
//! JSON file out; the announcer only ever asks for a random phrase.

use std::fs;
use std::path::Path;

use anyhow::Context;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    pub text: String,
    pub chapter_number: u32,
    pub chapter_name: String,
}

pub trait PhraseProvider: Send + Sync {
    /// Draw a phrase at random; `None` when the collection is empty.
    fn random_phrase(&self, rng: &mut dyn RngCore) -> Option<Phrase>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Phrases loaded once from a JSON array at startup.
#[derive(Default)]
pub struct JsonPhraseProvider {
    phrases: Vec<Phrase>,
}

impl JsonPhraseProvider {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read phrase file {}", path.display()))?;
        let phrases: Vec<Phrase> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse phrase file {}", path.display()))?;
        info!("loaded {} aphorisms from {}", phrases.len(), path.display());
        Ok(Self { phrases })
    }

    #[cfg(test)]
    pub fn from_phrases(phrases: Vec<Phrase>) -> Self {
        Self { phrases }
    }
}

impl PhraseProvider for JsonPhraseProvider {
    fn random_phrase(&self, rng: &mut dyn RngCore) -> Option<Phrase> {
        if self.phrases.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..self.phrases.len());
        Some(self.phrases[idx].clone())
    }

    fn len(&self) -> usize {
        self.phrases.len()
    }
}
