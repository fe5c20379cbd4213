use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::spec::FieldSpec;
use crate::errors::RecommendError;

/// One loosely-typed raw record as delivered by the catalog loader.
pub type RawRow = serde_json::Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CatalogItem {
    pub title: String,
    pub attribution: String,
    /// Aligned with `FieldSpec::text_fields`.
    pub text: Vec<String>,
    /// Aligned with `FieldSpec::numeric_fields`; imputed, never missing.
    pub numeric: Vec<f64>,
}

/// Serializable view of one row handed to callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemSummary {
    pub row: usize,
    pub title: String,
    pub attribution: String,
    pub attributes: BTreeMap<String, String>,
    pub features: BTreeMap<String, f64>,
}

#[derive(Clone, Debug)]
pub struct NormalizedTable {
    spec: FieldSpec,
    items: Vec<CatalogItem>,
    title_keys: Vec<String>,
    attribution_keys: Vec<String>,
    text_present: Vec<bool>,
    numeric_present: Vec<bool>,
    medians: Vec<f64>,
    documents: Vec<String>,
    duplicates_dropped: usize,
}

pub fn normalize(rows: &[RawRow], spec: &FieldSpec) -> Result<NormalizedTable, RecommendError> {
    spec.validate()?;

    if !rows.is_empty() {
        for field in [&spec.title, &spec.attribution] {
            if !rows.iter().any(|row| row.contains_key(field.as_str())) {
                return Err(RecommendError::missing_identity_field(field));
            }
        }
    }

    let text_present: Vec<bool> = spec
        .text_fields
        .iter()
        .map(|field| rows.iter().any(|row| row.contains_key(field.name.as_str())))
        .collect();
    let numeric_present: Vec<bool> = spec
        .numeric_fields
        .iter()
        .map(|field| rows.iter().any(|row| row.contains_key(field.name.as_str())))
        .collect();
    let medians: Vec<f64> = spec
        .numeric_fields
        .iter()
        .map(|field| {
            let values: Vec<f64> =
                rows.iter().filter_map(|row| numeric_value(row.get(field.name.as_str()))).collect();
            median(values)
        })
        .collect();

    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(rows.len());
    let mut items = Vec::with_capacity(rows.len());
    let mut duplicates_dropped = 0usize;

    for raw in rows {
        let title = text_value(raw.get(spec.title.as_str())).unwrap_or_else(|| "unknown".to_owned());
        let attribution =
            text_value(raw.get(spec.attribution.as_str())).unwrap_or_else(|| "unknown".to_owned());

        if !seen.insert((title.clone(), attribution.clone())) {
            duplicates_dropped += 1;
            debug!(
                event_name = "catalog.normalize.duplicate",
                title = %title,
                attribution = %attribution,
                "dropping duplicate catalog row"
            );
            continue;
        }

        let text = spec
            .text_fields
            .iter()
            .map(|field| {
                text_value(raw.get(field.name.as_str()))
                    .unwrap_or_else(|| field.kind.default_value().to_owned())
            })
            .collect();
        let numeric = spec
            .numeric_fields
            .iter()
            .zip(&medians)
            .map(|(field, median)| numeric_value(raw.get(field.name.as_str())).unwrap_or(*median))
            .collect();

        items.push(CatalogItem { title, attribution, text, numeric });
    }

    let title_keys = items.iter().map(|item| item.title.to_lowercase()).collect();
    let attribution_keys = items.iter().map(|item| item.attribution.to_lowercase()).collect();

    info!(
        event_name = "catalog.normalize.completed",
        raw_rows = rows.len(),
        rows = items.len(),
        duplicates_dropped,
        "catalog normalized"
    );

    Ok(NormalizedTable {
        spec: spec.clone(),
        items,
        title_keys,
        attribution_keys,
        text_present,
        numeric_present,
        medians,
        documents: Vec::new(),
        duplicates_dropped,
    })
}

impl NormalizedTable {
    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn item(&self, row: usize) -> Option<&CatalogItem> {
        self.items.get(row)
    }

    /// Lower-cased titles in row order.
    pub fn title_keys(&self) -> &[String] {
        &self.title_keys
    }

    pub fn attribution_keys(&self) -> &[String] {
        &self.attribution_keys
    }

    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    /// Whether the text field at `index` appeared in at least one raw row.
    pub fn has_text_field(&self, index: usize) -> bool {
        self.text_present.get(index).copied().unwrap_or(false)
    }

    pub fn has_numeric_field(&self, index: usize) -> bool {
        self.numeric_present.get(index).copied().unwrap_or(false)
    }

    pub fn median(&self, index: usize) -> Option<f64> {
        self.medians.get(index).copied()
    }

    /// Column index of a numeric feature that the catalog actually carries.
    pub fn present_numeric_index(&self, name: &str) -> Option<usize> {
        self.spec.numeric_field_index(name).filter(|index| self.has_numeric_field(*index))
    }

    pub fn present_text_index(&self, name: &str) -> Option<usize> {
        self.spec.text_field_index(name).filter(|index| self.has_text_field(*index))
    }

    pub fn numeric(&self, row: usize, column: usize) -> Option<f64> {
        self.items.get(row).and_then(|item| item.numeric.get(column)).copied()
    }

    /// Popularity prior for a row; `0.0` when the catalog has none.
    pub fn popularity(&self, row: usize) -> f64 {
        self.spec
            .popularity
            .as_deref()
            .and_then(|name| self.present_numeric_index(name))
            .and_then(|column| self.numeric(row, column))
            .unwrap_or(0.0)
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn document(&self, row: usize) -> Option<&str> {
        self.documents.get(row).map(String::as_str)
    }

    pub(crate) fn set_documents(&mut self, documents: Vec<String>) {
        debug_assert_eq!(documents.len(), self.items.len());
        self.documents = documents;
    }

    pub fn summary(&self, row: usize) -> Option<ItemSummary> {
        let item = self.items.get(row)?;
        let attributes = self
            .spec
            .text_fields
            .iter()
            .zip(&item.text)
            .enumerate()
            .filter(|(index, _)| self.has_text_field(*index))
            .map(|(_, (field, value))| (field.name.clone(), value.clone()))
            .collect();
        let features = self
            .spec
            .numeric_fields
            .iter()
            .zip(&item.numeric)
            .enumerate()
            .filter(|(index, _)| self.has_numeric_field(*index))
            .map(|(_, (field, value))| (field.name.clone(), *value))
            .collect();

        Some(ItemSummary {
            row,
            title: item.title.clone(),
            attribution: item.attribution.clone(),
            attributes,
            features,
        })
    }
}

fn text_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Object(_) => None,
        Value::String(text) => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(values) => {
            let joined: Vec<String> =
                values.iter().filter_map(|value| text_value(Some(value))).collect();
            Some(joined.join(" "))
        }
    }
}

fn numeric_value(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|value| value.is_finite())
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[middle - 1] + values[middle]) / 2.0
    } else {
        values[middle]
    }
}
