mod batch;
mod cache;
mod client;
mod config;
mod dataset;
mod error;
mod query;
mod reply;
mod session;
mod transport;
mod types;

pub use client::BioSimClient;
pub use config::{ClientConfig, DEFAULT_BASE_URL, LOCAL_BASE_URL};
pub use error::{BioSimError, ClientError, ServerError};
pub use session::Session;

pub use batch::DEFAULT_MAX_LOCATIONS_PER_CALL;
pub use cache::climate_cache::{CacheSignature, ClimateCache};

pub use dataset::data_set::{DataSet, MapEntry, NestedMap, Observation};
pub use dataset::error::DataSetError;
pub use dataset::month_summary::summarize_months;
pub use dataset::value::{FieldType, Value};

pub use reply::parser::{ReplyParser, NORMALS_MARKER, WEATHER_MARKER};
pub use reply::result_map::{
    LocationResultMap, ModelFailure, ModelOutcome, ModelResultMap, ParsedReply,
};

pub use transport::error::TransportError;
pub use transport::http::HttpTransport;
pub use transport::Transport;

pub use types::enums::{ClimateModel, Month, Period, Rcp, Variable};
pub use types::location::GeoLocation;
pub use types::parameters::{ParameterMap, ParameterValue};
