//! Token accounting
//!
//! Counters are unsigned so non-negativity holds by construction. Each
//! record snapshots the pricing rates in force at call time so historical
//! cost math stays accurate after a price change.

use std::collections::HashMap;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token counters for one vendor call, with the price rates in force
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTokens {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub reasoning_output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,

    #[serde(default)]
    pub input_price_per_1m_tokens: f64,
    #[serde(default)]
    pub cached_input_price_per_1m_tokens: f64,
    #[serde(default)]
    pub output_price_per_1m_tokens: f64,
    #[serde(default)]
    pub reasoning_output_price_per_1m_tokens: f64,
}

impl ModelTokens {
    /// Dollar cost of this record at its snapshotted rates
    pub fn cost(&self) -> f64 {
        const M: f64 = 1_000_000.0;
        self.input_tokens as f64 / M * self.input_price_per_1m_tokens
            + self.cached_input_tokens as f64 / M * self.cached_input_price_per_1m_tokens
            + self.output_tokens as f64 / M * self.output_price_per_1m_tokens
            + self.reasoning_output_tokens as f64 / M * self.reasoning_output_price_per_1m_tokens
    }

    fn has_rates(&self) -> bool {
        self.input_price_per_1m_tokens != 0.0
            || self.cached_input_price_per_1m_tokens != 0.0
            || self.output_price_per_1m_tokens != 0.0
            || self.reasoning_output_price_per_1m_tokens != 0.0
    }
}

impl AddAssign<&ModelTokens> for ModelTokens {
    fn add_assign(&mut self, other: &ModelTokens) {
        self.input_tokens += other.input_tokens;
        self.cached_input_tokens += other.cached_input_tokens;
        self.output_tokens += other.output_tokens;
        self.reasoning_output_tokens += other.reasoning_output_tokens;
        self.total_tokens += other.total_tokens;
        if !self.has_rates() {
            self.input_price_per_1m_tokens = other.input_price_per_1m_tokens;
            self.cached_input_price_per_1m_tokens = other.cached_input_price_per_1m_tokens;
            self.output_price_per_1m_tokens = other.output_price_per_1m_tokens;
            self.reasoning_output_price_per_1m_tokens = other.reasoning_output_price_per_1m_tokens;
        }
    }
}

impl Add for ModelTokens {
    type Output = ModelTokens;

    fn add(mut self, other: ModelTokens) -> ModelTokens {
        self += &other;
        self
    }
}

/// Per-model token accounting for one response, keyed by model id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTracker {
    #[serde(default)]
    pub stats: HashMap<String, ModelTokens>,
}

impl TokenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a call's counters into the entry for `model_id`
    pub fn add(&mut self, model_id: impl Into<String>, tokens: &ModelTokens) {
        *self.stats.entry(model_id.into()).or_default() += tokens;
    }

    /// Merge another tracker, summing overlapping model entries
    pub fn merge(&mut self, other: &TokenTracker) {
        for (model_id, tokens) in &other.stats {
            *self.stats.entry(model_id.clone()).or_default() += tokens;
        }
    }

    pub fn input_tokens(&self) -> u64 {
        self.stats.values().map(|t| t.input_tokens).sum()
    }

    pub fn completion_tokens(&self) -> u64 {
        self.stats.values().map(|t| t.output_tokens).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.stats.values().map(|t| t.total_tokens).sum()
    }
}
