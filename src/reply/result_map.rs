//! Result containers returned by the parser and the top-level calls.

use crate::dataset::data_set::DataSet;
use crate::types::location::GeoLocation;
use indexmap::IndexMap;
use std::fmt;

/// One data set per location, in request order.
pub type LocationResultMap = IndexMap<GeoLocation, DataSet>;

/// One outcome per model, in the order the server replied.
pub type ModelResultMap = IndexMap<String, ModelOutcome>;

/// A model the server refused to run on (part of) the requested locations.
///
/// Carries the text of the offending reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFailure {
    pub message: String,
}

impl ModelFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// What happened to one model of a multi-model request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    Completed(LocationResultMap),
    Failed(ModelFailure),
}

impl ModelOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ModelOutcome::Failed(_))
    }

    pub fn locations(&self) -> Option<&LocationResultMap> {
        match self {
            ModelOutcome::Completed(map) => Some(map),
            ModelOutcome::Failed(_) => None,
        }
    }

    pub fn into_locations(self) -> Result<LocationResultMap, ModelFailure> {
        match self {
            ModelOutcome::Completed(map) => Ok(map),
            ModelOutcome::Failed(failure) => Err(failure),
        }
    }
}

/// The parsed form of one server reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    /// Normals, or a weather reply that carried no model sections.
    Locations(LocationResultMap),
    /// Multi-model weather output.
    Models(ModelResultMap),
}

impl ParsedReply {
    /// Flattens a single-section reply; a multi-model reply yields `None`.
    pub fn into_locations(self) -> Option<LocationResultMap> {
        match self {
            ParsedReply::Locations(map) => Some(map),
            ParsedReply::Models(_) => None,
        }
    }

    /// Views any reply as per-model outcomes; a single-section reply is keyed
    /// under `default_model`.
    pub fn into_models(self, default_model: &str) -> ModelResultMap {
        match self {
            ParsedReply::Models(models) => models,
            ParsedReply::Locations(map) => {
                let mut models = ModelResultMap::new();
                models.insert(default_model.to_string(), ModelOutcome::Completed(map));
                models
            }
        }
    }
}
