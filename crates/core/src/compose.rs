//! Builds the weighted text document each catalog row is vectorized from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{NormalizedTable, NumericRange};

pub const DEFAULT_HIGH_CUT: f64 = 0.7;
pub const DEFAULT_LOW_CUT: f64 = 0.3;

/// Per text field repeat count; fields without an entry repeat once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightSpec(BTreeMap<String, u32>);

impl WeightSpec {
    pub fn new(weights: BTreeMap<String, u32>) -> Self {
        Self(weights)
    }

    pub fn with(mut self, field: impl Into<String>, weight: u32) -> Self {
        self.0.insert(field.into(), weight);
        self
    }

    pub fn weight_for(&self, field: &str) -> u32 {
        self.0
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, weight)| *weight)
            .unwrap_or(1)
    }

    pub fn entries(&self) -> &BTreeMap<String, u32> {
        &self.0
    }

    /// Layers `other` on top of `self`.
    pub fn merged(mut self, other: &WeightSpec) -> Self {
        for (name, weight) in &other.0 {
            self.0.insert(name.clone(), *weight);
        }
        self
    }
}

/// Cut points for discretizing unit-bounded features.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high: f64,
    pub low: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { high: DEFAULT_HIGH_CUT, low: DEFAULT_LOW_CUT }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FeatureComposer {
    weights: WeightSpec,
    thresholds: Thresholds,
}

impl FeatureComposer {
    pub fn new(weights: WeightSpec, thresholds: Thresholds) -> Self {
        Self { weights, thresholds }
    }

    /// Composes every row of `table`; deterministic for a given table and composer.
    pub fn compose_all(&self, table: &NormalizedTable) -> Vec<String> {
        (0..table.len()).map(|row| self.compose_row(table, row)).collect()
    }

    pub fn compose_row(&self, table: &NormalizedTable, row: usize) -> String {
        let Some(item) = table.item(row) else {
            return String::new();
        };
        let spec = table.spec();
        let mut parts: Vec<String> = Vec::new();

        for (index, (field, value)) in spec.text_fields.iter().zip(&item.text).enumerate() {
            if !table.has_text_field(index) || value.is_empty() {
                continue;
            }
            for _ in 0..self.weights.weight_for(&field.name) {
                parts.push(value.clone());
            }
        }

        for (index, (field, value)) in spec.numeric_fields.iter().zip(&item.numeric).enumerate() {
            if field.range != NumericRange::Unit || !table.has_numeric_field(index) {
                continue;
            }
            if *value > self.thresholds.high {
                parts.push(format!("high_{}", field.token_stem()));
            } else if *value < self.thresholds.low {
                parts.push(format!("low_{}", field.token_stem()));
            }
        }

        parts.join(" ").to_lowercase()
    }
}

/// Attaches the composed document column to `table`.
pub fn compose(
    mut table: NormalizedTable,
    weights: &WeightSpec,
    thresholds: Thresholds,
) -> NormalizedTable {
    let documents = FeatureComposer::new(weights.clone(), thresholds).compose_all(&table);
    table.set_documents(documents);
    table
}
