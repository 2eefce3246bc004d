//! Query-string assembly for the BioSIM APIs.
//!
//! Lists are sent as `%20`-separated values; coordinates travel as three
//! parallel lists in the order of the location slice.

use crate::config::ClientConfig;
use crate::types::enums::{ClimateModel, Period, Rcp};
use crate::types::location::GeoLocation;
use crate::types::parameters::ParameterMap;
use log::warn;
use std::fmt::Display;

pub(crate) const SPACE: &str = "%20";
const EMPTY_PARAMETERS: &str = "null";

fn join<T: Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(SPACE)
}

/// `lat=..&long=..&elev=..`; an unknown elevation is sent as `NaN`.
pub(crate) fn coordinates(locations: &[GeoLocation]) -> String {
    format!(
        "lat={}&long={}&elev={}",
        join(locations.iter().map(|l| l.latitude)),
        join(locations.iter().map(|l| l.longitude)),
        join(locations.iter().map(|l| l.elevation)),
    )
}

fn push_scenario(query: &mut String, rcp: Option<Rcp>, climate_model: Option<ClimateModel>) {
    if let Some(rcp) = rcp {
        query.push_str("&rcp=");
        query.push_str(rcp.url_segment());
    }
    if let Some(climate_model) = climate_model {
        query.push_str("&climMod=");
        query.push_str(climate_model.url_segment());
    }
}

fn push_generation_options(query: &mut String, config: &ClientConfig) {
    if config.force_climate_generation() {
        warn!("Past climate is generated instead of being compiled from observations");
        query.push_str("&source=FromNormals");
    }
    if let Some(n) = config.nb_nearest_neighbours() {
        query.push_str(&format!("&nb_nearest_neighbor={n}"));
    }
}

/// One map per model, an empty map standing in as `null`.
pub(crate) fn parameters(maps: &[ParameterMap]) -> String {
    join(maps.iter().map(|map| {
        if map.is_empty() {
            EMPTY_PARAMETERS.to_string()
        } else {
            map.to_string()
        }
    }))
}

pub(crate) fn normals(
    locations: &[GeoLocation],
    period: Period,
    rcp: Option<Rcp>,
    climate_model: Option<ClimateModel>,
) -> String {
    let mut query = coordinates(locations);
    query.push('&');
    query.push_str(period.query_segment());
    push_scenario(&mut query, rcp, climate_model);
    query
}

pub(crate) struct WeatherRequest<'a> {
    pub from_year: i32,
    pub to_year: i32,
    pub rcp: Option<Rcp>,
    pub climate_model: Option<ClimateModel>,
    pub models: &'a [String],
    pub rep: u32,
    pub rep_model: u32,
    pub parameters: Option<&'a [ParameterMap]>,
}

pub(crate) fn weather(
    locations: &[GeoLocation],
    request: &WeatherRequest<'_>,
    config: &ClientConfig,
) -> String {
    let mut query = coordinates(locations);
    query.push_str(&format!("&from={}&to={}", request.from_year, request.to_year));
    push_scenario(&mut query, request.rcp, request.climate_model);
    push_generation_options(&mut query, config);
    if request.rep > 1 {
        query.push_str(&format!("&rep={}", request.rep));
    }
    if !request.models.is_empty() {
        query.push_str("&model=");
        query.push_str(&join(request.models));
    }
    if request.rep_model > 1 {
        query.push_str(&format!("&repmodel={}", request.rep_model));
    }
    if let Some(maps) = request.parameters {
        query.push_str("&Parameters=");
        query.push_str(&parameters(maps));
    }
    query
}

pub(crate) fn generator(
    locations: &[GeoLocation],
    from_year: i32,
    to_year: i32,
    config: &ClientConfig,
) -> String {
    let mut query = coordinates(locations);
    query.push_str(&format!("&from={from_year}&to={to_year}"));
    push_generation_options(&mut query, config);
    query
}

pub(crate) fn model(model: &str, handles: &[String], parameters: Option<&ParameterMap>) -> String {
    let mut query = format!("model={model}&wgout={}", join(handles));
    if let Some(map) = parameters {
        query.push_str("&Parameters=");
        query.push_str(&self::parameters(std::slice::from_ref(map)));
    }
    query
}

pub(crate) fn cleanup(handles: &[String]) -> String {
    format!("ref={}", join(handles))
}

pub(crate) fn status(revision: &str) -> String {
    format!("crev={revision}")
}

pub(crate) fn model_name(model: &str) -> String {
    format!("model={model}")
}
