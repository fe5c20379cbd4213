//! Catalog normalization: raw field maps in, a canonical row-addressed table out.

mod normalize;
mod spec;

pub use normalize::{normalize, CatalogItem, ItemSummary, NormalizedTable, RawRow};
pub use spec::{CatalogPreset, FieldSpec, NumericField, NumericRange, TextField, TextKind};
