//! Line-driven parser for the BioSIM reply format.
//!
//! A reply is a sequence of comma-separated lines. A header line, recognised
//! by its leading marker (`month` for normals, `rep` for weather output),
//! opens the data block of the next requested location. In multi-model
//! replies a line holding only a model name opens a new model section, and
//! the location cursor starts over. Any line starting with `error` aborts the
//! whole parse.

use crate::dataset::data_set::DataSet;
use crate::error::{BioSimError, ClientError, ServerError};
use crate::reply::result_map::{
    LocationResultMap, ModelFailure, ModelOutcome, ModelResultMap, ParsedReply,
};
use crate::types::location::GeoLocation;
use log::warn;

pub(crate) const FIELD_SEPARATOR: char = ',';
pub(crate) const ERROR_PREFIX: &str = "error";

/// Header marker of a normals reply.
pub const NORMALS_MARKER: &str = "month";
/// Header marker of a weather or model reply.
pub const WEATHER_MARKER: &str = "rep";

struct ModelSection {
    name: String,
    failure: Option<ModelFailure>,
}

/// Parses one server reply into per-location (and per-model) data sets.
///
/// `locations` is the location list of the request that produced the reply:
/// data blocks carry no coordinates and are matched to locations by position.
/// `known_models` lists the model names that may open a section.
pub struct ReplyParser<'a> {
    marker: String,
    locations: &'a [GeoLocation],
    known_models: &'a [String],
    models: ModelResultMap,
    section: Option<ModelSection>,
    current_map: LocationResultMap,
    open_block: Option<(GeoLocation, DataSet)>,
    cursor: usize,
    is_block_initialized: bool,
}

impl<'a> ReplyParser<'a> {
    pub fn new(marker: &str, locations: &'a [GeoLocation], known_models: &'a [String]) -> Self {
        Self {
            marker: marker.to_lowercase(),
            locations,
            known_models,
            models: ModelResultMap::new(),
            section: None,
            current_map: LocationResultMap::new(),
            open_block: None,
            cursor: 0,
            is_block_initialized: false,
        }
    }

    /// Consumes the whole reply. The parser is single-use.
    pub fn parse<S: AsRef<str>>(mut self, lines: &[S]) -> Result<ParsedReply, BioSimError> {
        for line in lines {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            let lowered = line.to_lowercase();
            if lowered.starts_with(ERROR_PREFIX) {
                return Err(ServerError::new(line).into());
            } else if self.is_model_name(line) {
                self.open_model_section(line.trim());
            } else if lowered.starts_with(&self.marker) {
                self.open_block(line)?;
            } else if !self.is_block_initialized {
                self.reject_data_line(line, lines)?;
            } else if let Some((_, data_set)) = self.open_block.as_mut() {
                data_set.append(line.split(FIELD_SEPARATOR))?;
            }
        }
        Ok(self.finish())
    }

    fn is_model_name(&self, line: &str) -> bool {
        let trimmed = line.trim();
        self.known_models.iter().any(|model| model == trimmed)
    }

    fn open_model_section(&mut self, name: &str) {
        self.close_model_section();
        if self.section.is_none() && !self.current_map.is_empty() {
            warn!(
                "Discarding {} location block(s) received before the first model section",
                self.current_map.len()
            );
            self.current_map.clear();
        }
        self.section = Some(ModelSection {
            name: name.to_string(),
            failure: None,
        });
        self.cursor = 0;
        self.is_block_initialized = false;
    }

    fn close_model_section(&mut self) {
        self.close_block();
        let map = std::mem::take(&mut self.current_map);
        if let Some(section) = self.section.take() {
            let outcome = match section.failure {
                Some(failure) => ModelOutcome::Failed(failure),
                None => ModelOutcome::Completed(map),
            };
            self.models.insert(section.name, outcome);
        } else {
            self.current_map = map;
        }
    }

    fn open_block(&mut self, header: &str) -> Result<(), BioSimError> {
        self.close_block();
        let location = *self
            .locations
            .get(self.cursor)
            .ok_or(ClientError::LocationCountMismatch {
                expected: self.locations.len(),
            })?;
        self.open_block = Some((location, DataSet::new(header.split(FIELD_SEPARATOR))));
        self.cursor += 1;
        self.is_block_initialized = true;
        Ok(())
    }

    /// Indexes the open data set and files it under its location.
    fn close_block(&mut self) {
        if let Some((location, mut data_set)) = self.open_block.take() {
            data_set.index_field_types();
            self.current_map.insert(location, data_set);
        }
    }

    /// A data line with no header before it: a failed model inside a model
    /// section, a malformed reply otherwise.
    fn reject_data_line<S: AsRef<str>>(
        &mut self,
        line: &str,
        lines: &[S],
    ) -> Result<(), BioSimError> {
        match self.section.as_mut() {
            Some(section) => {
                match section.failure.as_mut() {
                    Some(failure) => {
                        failure.message.push('\n');
                        failure.message.push_str(line);
                    }
                    None => section.failure = Some(ModelFailure::new(line)),
                }
                Ok(())
            }
            None => {
                let reply = lines
                    .iter()
                    .map(|l| l.as_ref())
                    .collect::<Vec<_>>()
                    .join("\n");
                Err(ClientError::MalformedReply { reply }.into())
            }
        }
    }

    fn finish(mut self) -> ParsedReply {
        self.close_model_section();
        if self.models.is_empty() {
            ParsedReply::Locations(self.current_map)
        } else {
            ParsedReply::Models(self.models)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::value::{FieldType, Value};

    fn locations(n: usize) -> Vec<GeoLocation> {
        (0..n)
            .map(|i| GeoLocation::new(45.0 + i as f64 * 0.1, -74.0, 300.0))
            .collect()
    }

    fn models() -> Vec<String> {
        vec!["DegreeDay_Annual".to_string(), "Spruce_Budworm".to_string()]
    }

    #[test]
    fn test_single_normals_block() {
        let locs = locations(1);
        let known = models();
        let reply = ["month,Tn,Tx", "1,-16.9,-7.6"];
        let parsed = ReplyParser::new(NORMALS_MARKER, &locs, &known)
            .parse(&reply)
            .unwrap();
        let map = parsed.into_locations().unwrap();
        let ds = &map[&locs[0]];
        assert_eq!(ds.field_names(), ["month", "Tn", "Tx"]);
        assert_eq!(
            ds.field_types(),
            [FieldType::Integer, FieldType::Double, FieldType::Double]
        );
        assert_eq!(
            ds.observations()[0].values(),
            [Value::Int(1), Value::Float(-16.9), Value::Float(-7.6)]
        );
    }

    #[test]
    fn test_blocks_follow_location_order() {
        let locs = locations(2);
        let known = models();
        let reply = ["month,T", "1,2.0", "2,3.0", "month,T", "1,4.0"];
        let map = ReplyParser::new(NORMALS_MARKER, &locs, &known)
            .parse(&reply)
            .unwrap()
            .into_locations()
            .unwrap();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), locs);
        assert_eq!(map[&locs[0]].nb_observations(), 2);
        assert_eq!(map[&locs[1]].nb_observations(), 1);
        assert_eq!(map[&locs[1]].field_types(), [FieldType::Integer, FieldType::Double]);
    }

    #[test]
    fn test_error_line_wins_even_after_data() {
        let locs = locations(1);
        let known = models();
        let reply = ["month,T", "1,2.0", "ERROR: the lat parameter cannot be parsed"];
        let err = ReplyParser::new(NORMALS_MARKER, &locs, &known)
            .parse(&reply)
            .unwrap_err();
        assert!(err.is_server_failure());
        assert!(err.to_string().contains("the lat parameter cannot be parsed"));
    }

    #[test]
    fn test_data_without_header_is_malformed() {
        let locs = locations(1);
        let known = models();
        let reply = ["something unexpected", "month,T"];
        let err = ReplyParser::new(NORMALS_MARKER, &locs, &known)
            .parse(&reply)
            .unwrap_err();
        match err {
            BioSimError::Client(ClientError::MalformedReply { reply }) => {
                assert_eq!(reply, "something unexpected\nmonth,T");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_multi_model_reply_with_one_failed_model() {
        let locs = locations(2);
        let known = models();
        let reply = [
            "DegreeDay_Annual",
            "Rep,Year,DD",
            "1,2000,1500.5",
            "Rep,Year,DD",
            "1,2000,1400",
            "Spruce_Budworm",
            "Model Spruce_Budworm cannot be applied",
        ];
        let parsed = ReplyParser::new(WEATHER_MARKER, &locs, &known)
            .parse(&reply)
            .unwrap();
        let ParsedReply::Models(models) = parsed else {
            panic!("expected a multi-model reply");
        };
        assert_eq!(models.len(), 2);
        let dd = models["DegreeDay_Annual"].locations().unwrap();
        assert_eq!(dd.len(), 2);
        assert_eq!(dd[&locs[1]].field_types()[2], FieldType::Integer);
        assert_eq!(
            models["Spruce_Budworm"],
            ModelOutcome::Failed(ModelFailure::new("Model Spruce_Budworm cannot be applied"))
        );
    }

    #[test]
    fn test_more_blocks_than_locations() {
        let locs = locations(1);
        let known = models();
        let reply = ["month,T", "1,2.0", "month,T", "1,2.0"];
        let err = ReplyParser::new(NORMALS_MARKER, &locs, &known)
            .parse(&reply)
            .unwrap_err();
        assert!(matches!(
            err,
            BioSimError::Client(ClientError::LocationCountMismatch { expected: 1 })
        ));
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        let locs = locations(1);
        let known = models();
        let reply = ["month,T", "1,2.0,3.0"];
        let err = ReplyParser::new(NORMALS_MARKER, &locs, &known)
            .parse(&reply)
            .unwrap_err();
        assert!(matches!(err, BioSimError::DataSet(_)));
    }
}
