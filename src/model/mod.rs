//! Catalog of the vision models the scorer knows about.

use clap::builder::PossibleValuesParser;
use serde::Serialize;

/// A model variant offered by the inference provider.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    /// Rough per-frame cost, for display only.
    pub cost: &'static str,
}

pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "claude-haiku-4-20250514",
        name: "Claude 4 Haiku (Rapide & Pas cher)",
        cost: "~0.0008€/frame",
    },
    ModelInfo {
        id: "claude-sonnet-4-20250514",
        name: "Claude 4 Sonnet (Équilibré)",
        cost: "~0.003€/frame",
    },
    ModelInfo {
        id: "claude-opus-4-20250514",
        name: "Claude 4 Opus (Meilleur)",
        cost: "~0.015€/frame",
    },
];

pub const DEFAULT_MODEL_ID: &str = "claude-haiku-4-20250514";

/// Build a Clap value parser that restricts input to the known model identifiers.
pub fn model_value_parser() -> PossibleValuesParser {
    let values: Vec<&'static str> = MODELS.iter().map(|model| model.id).collect();
    PossibleValuesParser::new(values)
}

/// Resolve the model requested by a caller, falling back to `default` when absent or blank.
pub fn resolve_model_id<'a>(requested: Option<&'a str>, default: &'a str) -> &'a str {
    match requested.map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => default,
    }
}
