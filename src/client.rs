//! This module provides the main entry point of the crate: a client for the
//! BioSIM web service that fetches climate normals, generates weather and
//! applies models to generated weather.

use crate::batch::{self, check_request_size, merge_location_maps, merge_model_maps};
use crate::cache::climate_cache::ClimateCache;
use crate::config::ClientConfig;
use crate::dataset::data_set::DataSet;
use crate::dataset::error::DataSetError;
use crate::dataset::month_summary::summarize_months;
use crate::error::{BioSimError, ClientError, ServerError};
use crate::query::{self, WeatherRequest};
use crate::reply::parser::{ReplyParser, ERROR_PREFIX, NORMALS_MARKER, WEATHER_MARKER};
use crate::reply::result_map::{LocationResultMap, ModelOutcome, ModelResultMap, ParsedReply};
use crate::session::Session;
use crate::transport::http::HttpTransport;
use crate::transport::Transport;
use crate::types::enums::{ClimateModel, Month, Period, Rcp, Variable};
use crate::types::location::GeoLocation;
use crate::types::parameters::ParameterMap;
use bon::bon;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

const NORMALS_API: &str = "BioSimNormals";
const WEATHER_API: &str = "BioSimWeather";
const GENERATOR_API: &str = "BioSimGenerator";
const MODEL_API: &str = "BioSimModel";
const CLEANUP_API: &str = "BioSimMemoryCleanUp";
const MEMORY_LOAD_API: &str = "BioSimMemoryLoad";
const MODEL_LIST_API: &str = "BioSimModelList";
const MODEL_HELP_API: &str = "BioSimModelHelp";
const DEFAULT_PARAMETERS_API: &str = "BioSimModelDefaultParameters";

/// The client for the BioSIM web service.
///
/// A client is bound to one [`ClientConfig`] and one negotiated [`Session`]
/// (the batch capacities advertised by the server). Requests larger than
/// these capacities are split transparently and their results merged back
/// in request order.
///
/// Weather generated through [`BioSimClient::model_output`] stays on the
/// server so that further models can reuse it. Call
/// [`BioSimClient::shutdown`] (or [`BioSimClient::clear_cache`]) before the
/// client goes away so the server can release it.
///
/// # Examples
///
/// ```no_run
/// # use biosim::{BioSimClient, BioSimError, ClientConfig, GeoLocation, Period};
/// # #[tokio::main]
/// # async fn main() -> Result<(), BioSimError> {
/// let client = BioSimClient::connect(ClientConfig::default()).await?;
/// let quebec = GeoLocation::new(46.87, -71.25, 114.0);
///
/// let normals = client
///     .normals()
///     .period(Period::FromNormals1981To2010)
///     .locations(&[quebec])
///     .call()
///     .await?;
/// println!("{:?}", normals[&quebec].field_names());
///
/// client.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct BioSimClient {
    config: ClientConfig,
    transport: Box<dyn Transport>,
    session: Session,
    model_list: OnceCell<Vec<String>>,
    cache: ClimateCache,
    request_micros: AtomicU64,
}

#[bon]
impl BioSimClient {
    /// Connects to the endpoint of `config` over HTTP and runs the status
    /// handshake.
    ///
    /// # Errors
    ///
    /// Returns a client failure if the configuration is invalid, the server
    /// cannot be reached, is not initialized yet, or does not support this
    /// client revision.
    pub async fn connect(config: ClientConfig) -> Result<Self, BioSimError> {
        let transport = HttpTransport::from_config(&config);
        Self::with_transport(config, transport).await
    }

    /// Like [`BioSimClient::connect`], over any [`Transport`].
    pub async fn with_transport<T: Transport + 'static>(
        config: ClientConfig,
        transport: T,
    ) -> Result<Self, BioSimError> {
        config.validate()?;
        let session = Session::negotiate(&transport, config.revision()).await?;
        Self::with_session(config, transport, session)
    }

    /// Builds a client on an already negotiated session. No request is sent.
    pub fn with_session<T: Transport + 'static>(
        config: ClientConfig,
        transport: T,
        session: Session,
    ) -> Result<Self, BioSimError> {
        config.validate()?;
        Ok(Self {
            cache: ClimateCache::new(config.is_ephemeral()),
            transport: Box::new(transport),
            config,
            session,
            model_list: OnceCell::new(),
            request_micros: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The cache of weather generated on the server.
    pub fn cache(&self) -> &ClimateCache {
        &self.cache
    }

    /// Time spent waiting on the server during the last top-level call,
    /// summed over its sub-batches.
    pub fn last_request_duration(&self) -> Duration {
        Duration::from_micros(self.request_micros.load(Ordering::Relaxed))
    }

    fn reset_request_duration(&self) {
        self.request_micros.store(0, Ordering::Relaxed);
    }

    async fn send(&self, api: &str, query: &str) -> Result<Vec<String>, BioSimError> {
        let started = Instant::now();
        let reply = self.transport.send(api, query).await;
        let elapsed = started.elapsed();
        self.request_micros.fetch_add(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        debug!("{} replied in {:?}", api, elapsed);
        reply
    }

    /// Fetches the climate normals of a period for each location.
    ///
    /// # Arguments
    ///
    /// * `.period(Period)`: **Required.** The 30-year period.
    /// * `.locations(&[GeoLocation])`: **Required.** The locations, at most
    ///   [`ClientConfig::max_locations_per_call`].
    /// * `.rcp(Rcp)`: Optional. Emission scenario, RCP 4.5 on the server if omitted.
    /// * `.climate_model(ClimateModel)`: Optional. RCM4 on the server if omitted.
    /// * `.months(&[Month])`: Optional. When given, each location's normals are
    ///   summarized over these months into a single row (precipitation summed,
    ///   other variables averaged weighted by days). Otherwise the twelve
    ///   monthly rows are kept, restricted to the `month` column and the
    ///   normals variables.
    ///
    /// # Returns
    ///
    /// One [`DataSet`] per location, in request order.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use biosim::{BioSimClient, BioSimError, ClientConfig, GeoLocation, Month, Period, Rcp};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), BioSimError> {
    /// let client = BioSimClient::connect(ClientConfig::default()).await?;
    /// let locations = [GeoLocation::without_elevation(48.2, -72.5)];
    ///
    /// let summer = client
    ///     .normals()
    ///     .period(Period::FromNormals2051To2080)
    ///     .locations(&locations)
    ///     .rcp(Rcp::Rcp85)
    ///     .months(&[Month::June, Month::July, Month::August])
    ///     .call()
    ///     .await?;
    /// assert_eq!(summer[&locations[0]].nb_observations(), 1);
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn normals(
        &self,
        period: Period,
        locations: &[GeoLocation],
        rcp: Option<Rcp>,
        climate_model: Option<ClimateModel>,
        months: Option<&[Month]>,
    ) -> Result<LocationResultMap, BioSimError> {
        check_request_size(locations.len(), self.config.max_locations_per_call())?;
        self.reset_request_duration();

        let calls: Vec<_> = batch::partition(locations, self.session.max_locations_normals())
            .map(|batch| self.normals_batch(batch, period, rcp, climate_model))
            .collect();
        let parts = batch::dispatch(calls, self.config.max_concurrent_batches()).await?;
        let mut normals = merge_location_maps(parts);

        match months {
            Some(months) if !months.is_empty() => normals
                .into_iter()
                .map(|(location, monthly)| -> Result<_, BioSimError> {
                    Ok((location, summarize_months(&monthly, months)?))
                })
                .collect(),
            _ => {
                for data_set in normals.values_mut() {
                    keep_normals_fields(data_set)?;
                }
                Ok(normals)
            }
        }
    }

    /// The twelve monthly normals rows of each location.
    #[builder]
    pub async fn monthly_normals(
        &self,
        period: Period,
        locations: &[GeoLocation],
        rcp: Option<Rcp>,
        climate_model: Option<ClimateModel>,
    ) -> Result<LocationResultMap, BioSimError> {
        self.normals()
            .period(period)
            .locations(locations)
            .maybe_rcp(rcp)
            .maybe_climate_model(climate_model)
            .call()
            .await
    }

    /// The normals of each location summarized over the whole year.
    #[builder]
    pub async fn annual_normals(
        &self,
        period: Period,
        locations: &[GeoLocation],
        rcp: Option<Rcp>,
        climate_model: Option<ClimateModel>,
    ) -> Result<LocationResultMap, BioSimError> {
        self.normals()
            .period(period)
            .locations(locations)
            .maybe_rcp(rcp)
            .maybe_climate_model(climate_model)
            .months(&Month::ALL)
            .call()
            .await
    }

    async fn normals_batch(
        &self,
        batch: &[GeoLocation],
        period: Period,
        rcp: Option<Rcp>,
        climate_model: Option<ClimateModel>,
    ) -> Result<LocationResultMap, BioSimError> {
        let reply = self
            .send(NORMALS_API, &query::normals(batch, period, rcp, climate_model))
            .await?;
        match ReplyParser::new(NORMALS_MARKER, batch, &[]).parse(&reply)? {
            ParsedReply::Locations(map) => {
                if map.len() < batch.len() {
                    warn!(
                        "The server returned normals for {} of {} location(s)",
                        map.len(),
                        batch.len()
                    );
                }
                Ok(map)
            }
            ParsedReply::Models(_) => Err(ClientError::MalformedReply {
                reply: reply.join("\n"),
            }
            .into()),
        }
    }

    /// Generates weather for a range of years and applies models to it.
    ///
    /// # Arguments
    ///
    /// * `.from_year(i32)` / `.to_year(i32)`: **Required.** Inclusive year range.
    /// * `.locations(&[GeoLocation])`: **Required.** The locations.
    /// * `.models(&[&str])`: **Required.** Names from [`BioSimClient::model_list`].
    /// * `.rcp(Rcp)` / `.climate_model(ClimateModel)`: Optional scenario.
    /// * `.rep(u32)`: Optional. Number of weather replicates, defaults to 1.
    /// * `.rep_model(u32)`: Optional. Number of model replicates per weather
    ///   replicate, defaults to 1.
    /// * `.parameters(&[ParameterMap])`: Optional. One map per model; an empty
    ///   map keeps the model defaults.
    ///
    /// # Returns
    ///
    /// One [`ModelOutcome`] per model. A model the server could not apply is
    /// reported as [`ModelOutcome::Failed`] while the other models still
    /// carry their data.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use biosim::{BioSimClient, BioSimError, ClientConfig, GeoLocation, ModelOutcome};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), BioSimError> {
    /// let client = BioSimClient::connect(ClientConfig::default()).await?;
    /// let locations = [GeoLocation::new(46.87, -71.25, 114.0)];
    ///
    /// let output = client
    ///     .generate_weather()
    ///     .from_year(2000)
    ///     .to_year(2005)
    ///     .locations(&locations)
    ///     .models(&["DegreeDay_Annual", "Spruce_Budworm_Biology"])
    ///     .rep(3)
    ///     .call()
    ///     .await?;
    /// for (model, outcome) in &output {
    ///     match outcome {
    ///         ModelOutcome::Completed(map) => println!("{model}: {} location(s)", map.len()),
    ///         ModelOutcome::Failed(failure) => println!("{model} failed: {failure}"),
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn generate_weather(
        &self,
        from_year: i32,
        to_year: i32,
        locations: &[GeoLocation],
        models: &[&str],
        rcp: Option<Rcp>,
        climate_model: Option<ClimateModel>,
        rep: Option<u32>,
        rep_model: Option<u32>,
        parameters: Option<&[ParameterMap]>,
    ) -> Result<ModelResultMap, BioSimError> {
        let rep = rep.unwrap_or(1);
        let rep_model = rep_model.unwrap_or(1);
        if rep < 1 || rep_model < 1 {
            return Err(ClientError::InvalidParameter(
                "rep and rep_model must be equal to or greater than 1".to_string(),
            )
            .into());
        }
        if models.is_empty() {
            return Err(ClientError::InvalidParameter("at least one model is required".to_string()).into());
        }
        if let Some(maps) = parameters {
            if maps.len() != models.len() {
                return Err(ClientError::InvalidParameter(format!(
                    "{} parameter map(s) for {} model(s)",
                    maps.len(),
                    models.len()
                ))
                .into());
            }
        }
        check_request_size(locations.len(), self.config.max_locations_per_call())?;
        self.reset_request_duration();

        let models: Vec<String> = models.iter().map(|m| m.trim().to_string()).collect();
        let request = WeatherRequest {
            from_year,
            to_year,
            rcp,
            climate_model,
            models: &models,
            rep,
            rep_model,
            parameters,
        };
        let calls: Vec<_> = batch::partition(locations, self.session.max_locations_weather())
            .map(|batch| self.weather_batch(batch, &request))
            .collect();
        let parts = batch::dispatch(calls, self.config.max_concurrent_batches()).await?;

        let mut merged = ModelResultMap::new();
        for part in parts {
            merge_model_maps(&mut merged, part);
        }
        Ok(merged)
    }

    async fn weather_batch(
        &self,
        batch: &[GeoLocation],
        request: &WeatherRequest<'_>,
    ) -> Result<ModelResultMap, BioSimError> {
        let reply = self
            .send(WEATHER_API, &query::weather(batch, request, &self.config))
            .await?;
        let parsed = ReplyParser::new(WEATHER_MARKER, batch, request.models).parse(&reply)?;
        let first_model = request.models.first().map(String::as_str).unwrap_or_default();
        Ok(parsed.into_models(first_model))
    }

    /// Applies one model to weather generated once per location and year
    /// range, then kept on the server for later calls.
    ///
    /// Locations already generated for the same years are served from the
    /// cache; only the others are sent to the generator. In ephemeral mode the
    /// weather is generated every time and released right after the model
    /// ran.
    ///
    /// # Returns
    ///
    /// One [`DataSet`] per distinct location, in request order.
    ///
    /// # Errors
    ///
    /// Besides transport failures, returns a server failure if the model
    /// cannot be applied.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use biosim::{BioSimClient, BioSimError, ClientConfig, GeoLocation};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), BioSimError> {
    /// let client = BioSimClient::connect(ClientConfig::default()).await?;
    /// let locations = [GeoLocation::new(46.87, -71.25, 114.0)];
    ///
    /// for model in ["DegreeDay_Annual", "Spruce_Budworm_Biology"] {
    ///     let output = client
    ///         .model_output()
    ///         .from_year(2018)
    ///         .to_year(2019)
    ///         .locations(&locations)
    ///         .model(model)
    ///         .call()
    ///         .await?;
    ///     println!("{model}: {:?}", output[&locations[0]].field_names());
    /// }
    /// assert_eq!(client.cache().hits(), 1);
    /// client.shutdown().await?;
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn model_output(
        &self,
        from_year: i32,
        to_year: i32,
        locations: &[GeoLocation],
        model: &str,
        parameters: Option<&ParameterMap>,
    ) -> Result<LocationResultMap, BioSimError> {
        check_request_size(locations.len(), self.config.max_locations_per_call())?;
        self.reset_request_duration();

        let _lease = self.cache.lease().await;
        let handles = self
            .cache
            .get_or_generate(from_year, to_year, locations, |misses| {
                self.generate_handles(from_year, to_year, misses)
            })
            .await?;
        let targets: Vec<(GeoLocation, String)> = handles.into_iter().collect();
        let output = self.apply_model(&targets, model.trim(), parameters).await;

        if self.cache.is_ephemeral() {
            let handles: Vec<String> = targets.into_iter().map(|(_, handle)| handle).collect();
            if let Err(e) = self.release(&handles).await {
                warn!(
                    "Could not release {} generated climate(s) on the server: {}",
                    handles.len(),
                    e
                );
            }
        }
        output
    }

    async fn generate_handles(
        &self,
        from_year: i32,
        to_year: i32,
        locations: Vec<GeoLocation>,
    ) -> Result<Vec<String>, BioSimError> {
        info!(
            "Generating climate from {} to {} for {} location(s)",
            from_year,
            to_year,
            locations.len()
        );
        let calls: Vec<_> = batch::partition(&locations, self.session.max_locations_weather())
            .map(|batch| self.generator_batch(batch, from_year, to_year))
            .collect();
        let parts = batch::dispatch(calls, self.config.max_concurrent_batches()).await?;
        Ok(parts.concat())
    }

    async fn generator_batch(
        &self,
        batch: &[GeoLocation],
        from_year: i32,
        to_year: i32,
    ) -> Result<Vec<String>, BioSimError> {
        let reply = self
            .send(
                GENERATOR_API,
                &query::generator(batch, from_year, to_year, &self.config),
            )
            .await?;
        let handles = reply_items(&reply)?;
        if handles.len() != batch.len() {
            return Err(ClientError::HandleCountMismatch {
                expected: batch.len(),
                found: handles.len(),
            }
            .into());
        }
        Ok(handles)
    }

    async fn apply_model(
        &self,
        targets: &[(GeoLocation, String)],
        model: &str,
        parameters: Option<&ParameterMap>,
    ) -> Result<LocationResultMap, BioSimError> {
        let calls: Vec<_> = batch::partition(targets, self.session.max_locations_weather())
            .map(|batch| self.model_batch(batch, model, parameters))
            .collect();
        let parts = batch::dispatch(calls, self.config.max_concurrent_batches()).await?;
        Ok(merge_location_maps(parts))
    }

    async fn model_batch(
        &self,
        batch: &[(GeoLocation, String)],
        model: &str,
        parameters: Option<&ParameterMap>,
    ) -> Result<LocationResultMap, BioSimError> {
        let locations: Vec<GeoLocation> = batch.iter().map(|(l, _)| *l).collect();
        let handles: Vec<String> = batch.iter().map(|(_, h)| h.clone()).collect();
        let reply = self
            .send(MODEL_API, &query::model(model, &handles, parameters))
            .await?;
        let known = [model.to_string()];
        let parsed = ReplyParser::new(WEATHER_MARKER, &locations, &known).parse(&reply)?;
        match parsed.into_models(model).shift_remove(model) {
            Some(ModelOutcome::Completed(map)) => Ok(map),
            Some(ModelOutcome::Failed(failure)) => Err(ServerError::new(failure.message).into()),
            None => Err(ClientError::MissingModelOutput(model.to_string()).into()),
        }
    }

    /// Asks the server to free generated climate, in batches.
    async fn release(&self, handles: &[String]) -> Result<(), BioSimError> {
        if handles.is_empty() {
            return Ok(());
        }
        let calls: Vec<_> = batch::partition(handles, self.session.max_locations_weather())
            .map(|batch| self.cleanup_batch(batch))
            .collect();
        batch::dispatch(calls, self.config.max_concurrent_batches()).await?;
        info!("Released {} generated climate(s) on the server", handles.len());
        Ok(())
    }

    async fn cleanup_batch(&self, batch: &[String]) -> Result<(), BioSimError> {
        self.send(CLEANUP_API, &query::cleanup(batch)).await?;
        Ok(())
    }

    /// Releases every generated climate held in the cache.
    ///
    /// Waits for the model calls still using cached climate. If the release
    /// fails the cache is left as it was, so the call can be retried.
    pub async fn clear_cache(&self) -> Result<(), BioSimError> {
        let _exclusive = self.cache.exclusive().await;
        let entries = self.cache.take_entries().await;
        if entries.is_empty() {
            return Ok(());
        }
        let handles: Vec<String> = entries.iter().map(|(_, handle)| handle.clone()).collect();
        if let Err(e) = self.release(&handles).await {
            self.cache.restore(entries).await;
            return Err(e);
        }
        Ok(())
    }

    /// Releases the server-side resources of this client and consumes it.
    pub async fn shutdown(self) -> Result<(), BioSimError> {
        self.clear_cache().await
    }

    /// Number of generated climates currently held in the server memory,
    /// by all clients.
    pub async fn nb_objects_on_server(&self) -> Result<usize, BioSimError> {
        let reply = self.send(MEMORY_LOAD_API, "").await?;
        let items = reply_items(&reply)?;
        items
            .first()
            .and_then(|count| count.parse().ok())
            .ok_or_else(|| {
                ClientError::MalformedReply {
                    reply: reply.join("\n"),
                }
                .into()
            })
    }

    /// Names of the models available on the server. Fetched once per client.
    pub async fn model_list(&self) -> Result<Vec<String>, BioSimError> {
        let models = self
            .model_list
            .get_or_try_init(|| async {
                let reply = self.send(MODEL_LIST_API, "").await?;
                reply_items(&reply)
            })
            .await?;
        Ok(models.clone())
    }

    /// The help text of a model.
    pub async fn model_help(&self, model: &str) -> Result<String, BioSimError> {
        let reply = self
            .send(MODEL_HELP_API, &query::model_name(model.trim()))
            .await?;
        Ok(reply.join("\n"))
    }

    /// The default parameters of a model, as text values.
    pub async fn model_default_parameters(&self, model: &str) -> Result<ParameterMap, BioSimError> {
        let reply = self
            .send(DEFAULT_PARAMETERS_API, &query::model_name(model.trim()))
            .await?;
        Ok(ParameterMap::parse(&reply.concat()))
    }
}

impl Drop for BioSimClient {
    fn drop(&mut self) {
        if let Some(outstanding) = self.cache.try_len().filter(|n| *n > 0) {
            warn!(
                "BioSimClient dropped while the server still holds {} generated climate(s); \
                 call shutdown() to release them",
                outstanding
            );
        }
    }
}

/// Trimmed non-blank lines of a list reply; an error line fails the call.
fn reply_items(reply: &[String]) -> Result<Vec<String>, BioSimError> {
    let mut items = Vec::new();
    for line in reply.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        if line.to_lowercase().starts_with(ERROR_PREFIX) {
            return Err(ServerError::new(line).into());
        }
        items.push(line.to_string());
    }
    Ok(items)
}

/// Drops every column but `month` and the normals variables. Columns are
/// removed from the last one so earlier indices stay valid.
fn keep_normals_fields(data_set: &mut DataSet) -> Result<(), DataSetError> {
    let dropped: Vec<usize> = data_set
        .field_names()
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .filter(|(_, name)| Variable::from_field_name(name).is_none())
        .map(|(idx, _)| idx)
        .collect();
    for idx in dropped {
        data_set.remove_field(idx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::value::{FieldType, Value};
    use crate::transport::test_support::{lines, query_list, FixtureTransport};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    /// A deterministic in-memory stand-in for the BioSIM service.
    #[derive(Default)]
    struct FakeServer {
        live: Mutex<Vec<String>>,
        counter: AtomicUsize,
    }

    impl FakeServer {
        fn handle(&self, api: &str, query: &str) -> Result<Vec<String>, BioSimError> {
            let lats = query_list(query, "lat");
            match api {
                NORMALS_API => {
                    if lats.iter().any(|lat| lat.parse::<f64>().unwrap() > 90.0) {
                        return Ok(lines(&["Error: latitude out of range"]));
                    }
                    let mut reply = Vec::new();
                    for lat in &lats {
                        let lat: f64 = lat.parse().unwrap();
                        reply.push("month,TMIN_MN,TMAX_MN,PRCP_TT,TDEX_MN,RELH_MN".to_string());
                        for month in 1..=12 {
                            let tmin = lat - 50.0 + month as f64;
                            reply.push(format!(
                                "{month},{:.1},{:.1},80.0,{:.1},70",
                                tmin,
                                tmin + 10.0,
                                tmin - 2.0
                            ));
                        }
                    }
                    Ok(reply)
                }
                WEATHER_API => {
                    let mut reply = Vec::new();
                    for model in query_list(query, "model") {
                        reply.push(model.clone());
                        if model == "Failing" {
                            reply.push("Model Failing cannot be applied".to_string());
                            continue;
                        }
                        for lat in &lats {
                            reply.push("Rep,Year,DD".to_string());
                            reply.push(format!("1,2000,{lat}"));
                        }
                    }
                    Ok(reply)
                }
                GENERATOR_API => {
                    let mut live = self.live.lock().unwrap();
                    let handles: Vec<String> = lats
                        .iter()
                        .map(|_| format!("wg{}", self.counter.fetch_add(1, Ordering::SeqCst)))
                        .collect();
                    live.extend(handles.iter().cloned());
                    Ok(handles)
                }
                MODEL_API => {
                    let live = self.live.lock().unwrap();
                    let mut reply = Vec::new();
                    for handle in query_list(query, "wgout") {
                        if !live.contains(&handle) {
                            return Ok(vec![format!("Error: unknown wgout {handle}")]);
                        }
                        reply.push("Rep,Year,DD".to_string());
                        reply.push(format!("1,2018,{}", &handle[2..]));
                    }
                    Ok(reply)
                }
                CLEANUP_API => {
                    let released = query_list(query, "ref");
                    self.live.lock().unwrap().retain(|h| !released.contains(h));
                    Ok(Vec::new())
                }
                MEMORY_LOAD_API => Ok(vec![self.live.lock().unwrap().len().to_string()]),
                MODEL_LIST_API => Ok(lines(&["DegreeDay_Annual", "Spruce_Budworm_Biology"])),
                MODEL_HELP_API => Ok(lines(&["Model DegreeDay_Annual", "Computes degree-days"])),
                DEFAULT_PARAMETERS_API => Ok(lines(&["LowerThreshold:5*Method:Sine"])),
                other => Err(ClientError::InvalidParameter(format!("unknown api {other}")).into()),
            }
        }

        fn live(&self) -> usize {
            self.live.lock().unwrap().len()
        }
    }

    fn setup(
        config: ClientConfig,
        session: Session,
    ) -> (BioSimClient, Arc<FixtureTransport>, Arc<FakeServer>) {
        let server = Arc::new(FakeServer::default());
        let handler_server = Arc::clone(&server);
        let transport = Arc::new(FixtureTransport::new(move |api, query| {
            handler_server.handle(api, query)
        }));
        let client = BioSimClient::with_session(config, Arc::clone(&transport), session).unwrap();
        (client, transport, server)
    }

    fn locations(n: usize) -> Vec<GeoLocation> {
        (0..n)
            .map(|i| GeoLocation::new(45.0 + i as f64 * 0.5, -74.0 + i as f64 * 0.25, 300.0))
            .collect()
    }

    #[tokio::test]
    async fn test_monthly_normals_keep_normals_columns() {
        let (client, transport, _) = setup(ClientConfig::default(), Session::new(10, 10));
        let locs = locations(1);
        let normals = client
            .monthly_normals()
            .period(Period::FromNormals1981To2010)
            .locations(&locs)
            .call()
            .await
            .unwrap();

        let ds = &normals[&locs[0]];
        assert_eq!(
            ds.field_names(),
            ["month", "TMIN_MN", "TMAX_MN", "PRCP_TT", "TDEX_MN"]
        );
        assert_eq!(
            ds.field_types(),
            [
                FieldType::Integer,
                FieldType::Double,
                FieldType::Double,
                FieldType::Double,
                FieldType::Double
            ]
        );
        assert_eq!(ds.nb_observations(), 12);
        assert_eq!(ds.value_at(0, 1), Some(&Value::Float(-4.0)));
        assert_eq!(
            transport.calls_to(NORMALS_API),
            vec!["lat=45&long=-74&elev=300&period=1981_2010".to_string()]
        );
    }

    #[tokio::test]
    async fn test_annual_normals_are_one_row() {
        let (client, _, _) = setup(ClientConfig::default(), Session::new(10, 10));
        let locs = locations(2);
        let normals = client
            .annual_normals()
            .period(Period::FromNormals1991To2020)
            .locations(&locs)
            .call()
            .await
            .unwrap();
        assert_eq!(normals.len(), 2);
        let ds = &normals[&locs[1]];
        assert_eq!(ds.nb_observations(), 1);
        let prcp = ds.field_index("PRCP_TT").unwrap();
        assert_eq!(ds.value_at(0, prcp).and_then(Value::as_f64), Some(960.0));
    }

    #[tokio::test]
    async fn test_batch_size_does_not_change_normals() {
        let locs = locations(7);
        let mut results = Vec::new();
        for (capacity, expected_calls) in [(2, 4), (3, 3), (10, 1)] {
            let (client, transport, _) = setup(ClientConfig::default(), Session::new(capacity, 1));
            let normals = client
                .normals()
                .period(Period::FromNormals1971To2000)
                .locations(&locs)
                .call()
                .await
                .unwrap();
            assert_eq!(transport.calls_to(NORMALS_API).len(), expected_calls);
            assert_eq!(normals.keys().copied().collect::<Vec<_>>(), locs);
            results.push(normals);
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
    }

    #[tokio::test]
    async fn test_concurrent_batches_merge_in_order() {
        let config = ClientConfig::builder().max_concurrent_batches(4).build();
        let (client, _, _) = setup(config, Session::new(2, 2));
        let locs = locations(9);
        let output = client
            .generate_weather()
            .from_year(2000)
            .to_year(2000)
            .locations(&locs)
            .models(&["DegreeDay_Annual"])
            .call()
            .await
            .unwrap();
        let dd = output["DegreeDay_Annual"].locations().unwrap();
        assert_eq!(dd.keys().copied().collect::<Vec<_>>(), locs);
    }

    #[tokio::test]
    async fn test_too_many_locations_is_rejected_before_sending() {
        let config = ClientConfig::builder().max_locations_per_call(5).build();
        let (client, transport, _) = setup(config, Session::new(10, 10));
        let err = client
            .normals()
            .period(Period::FromNormals1981To2010)
            .locations(&locations(6))
            .call()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BioSimError::Client(ClientError::TooManyLocations {
                max: 5,
                requested: 6
            })
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_line_fails_the_call() {
        let (client, _, _) = setup(ClientConfig::default(), Session::new(10, 10));
        let err = client
            .normals()
            .period(Period::FromNormals1981To2010)
            .locations(&[GeoLocation::new(95.0, 0.0, 0.0)])
            .call()
            .await
            .unwrap_err();
        assert!(err.is_server_failure());
    }

    #[tokio::test]
    async fn test_failed_model_is_kept_across_batches() {
        let (client, transport, _) = setup(ClientConfig::default(), Session::new(10, 2));
        let locs = locations(3);
        let output = client
            .generate_weather()
            .from_year(2000)
            .to_year(2000)
            .locations(&locs)
            .models(&["DegreeDay_Annual", "Failing"])
            .call()
            .await
            .unwrap();

        assert_eq!(transport.calls_to(WEATHER_API).len(), 2);
        let dd = output["DegreeDay_Annual"].locations().unwrap();
        assert_eq!(dd.keys().copied().collect::<Vec<_>>(), locs);
        assert_eq!(dd[&locs[2]].field_names(), ["Rep", "Year", "DD"]);
        assert!(output["Failing"].is_failure());
        match &output["Failing"] {
            ModelOutcome::Failed(failure) => assert_eq!(
                failure.message,
                "Model Failing cannot be applied\nModel Failing cannot be applied"
            ),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_replicates_are_rejected() {
        let (client, transport, _) = setup(ClientConfig::default(), Session::new(10, 10));
        let err = client
            .generate_weather()
            .from_year(2000)
            .to_year(2000)
            .locations(&locations(1))
            .models(&["DegreeDay_Annual"])
            .rep_model(0)
            .call()
            .await
            .unwrap_err();
        assert!(matches!(err, BioSimError::Client(ClientError::InvalidParameter(_))));
        assert!(err.is_client_failure());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_generated_climate_is_reused_then_released() {
        let (client, transport, server) = setup(ClientConfig::default(), Session::new(10, 10));
        let locs = locations(2);
        for model in ["DegreeDay_Annual", "Spruce_Budworm_Biology"] {
            let output = client
                .model_output()
                .from_year(2018)
                .to_year(2019)
                .locations(&locs)
                .model(model)
                .call()
                .await
                .unwrap();
            assert_eq!(output.keys().copied().collect::<Vec<_>>(), locs);
        }

        assert_eq!(transport.calls_to(GENERATOR_API).len(), 1);
        assert_eq!(transport.calls_to(MODEL_API).len(), 2);
        assert_eq!(client.cache().lookups(), 4);
        assert_eq!(client.cache().hits(), 2);
        assert_eq!(client.nb_objects_on_server().await.unwrap(), 2);

        client.shutdown().await.unwrap();
        assert_eq!(server.live(), 0);
        let cleanups = transport.calls_to(CLEANUP_API);
        assert_eq!(cleanups.len(), 1);
        let mut released = query_list(&cleanups[0], "ref");
        released.sort();
        assert_eq!(released, ["wg0", "wg1"]);
    }

    #[tokio::test]
    async fn test_ephemeral_mode_releases_after_each_call() {
        let config = ClientConfig::builder().ephemeral(true).build();
        let (client, transport, server) = setup(config, Session::new(10, 10));
        let locs = locations(2);
        for _ in 0..2 {
            let output = client
                .model_output()
                .from_year(2018)
                .to_year(2019)
                .locations(&locs)
                .model("DegreeDay_Annual")
                .call()
                .await
                .unwrap();
            assert_eq!(output.len(), 2);
            assert_eq!(server.live(), 0);
        }
        assert_eq!(transport.calls_to(GENERATOR_API).len(), 2);
        assert_eq!(transport.calls_to(CLEANUP_API).len(), 2);
        assert!(client.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_cache_releases_in_batches() {
        let (client, transport, server) = setup(ClientConfig::default(), Session::new(10, 2));
        client
            .model_output()
            .from_year(2018)
            .to_year(2018)
            .locations(&locations(5))
            .model("DegreeDay_Annual")
            .call()
            .await
            .unwrap();
        assert_eq!(transport.calls_to(GENERATOR_API).len(), 3);
        assert_eq!(server.live(), 5);

        client.clear_cache().await.unwrap();
        assert_eq!(transport.calls_to(CLEANUP_API).len(), 3);
        assert_eq!(server.live(), 0);
        assert!(client.cache().is_empty().await);
    }

    /// Holds every model reply back so that other calls can interleave.
    struct SlowModels<T>(T);

    #[async_trait::async_trait]
    impl<T: Transport> Transport for SlowModels<T> {
        async fn send(&self, api: &str, query: &str) -> Result<Vec<String>, BioSimError> {
            if api == MODEL_API {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.0.send(api, query).await
        }
    }

    #[tokio::test]
    async fn test_clear_cache_waits_for_running_model_calls() {
        let server = Arc::new(FakeServer::default());
        let handler_server = Arc::clone(&server);
        let transport = SlowModels(FixtureTransport::new(move |api, query| {
            handler_server.handle(api, query)
        }));
        let client =
            BioSimClient::with_session(ClientConfig::default(), transport, Session::new(10, 10))
                .unwrap();
        let locs = locations(2);

        let (output, cleared) = tokio::join!(
            client
                .model_output()
                .from_year(2018)
                .to_year(2019)
                .locations(&locs)
                .model("DegreeDay_Annual")
                .call(),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                client.clear_cache().await
            }
        );

        let output = output.unwrap();
        assert_eq!(output.keys().copied().collect::<Vec<_>>(), locs);
        cleared.unwrap();
        assert_eq!(server.live(), 0);
        assert!(client.cache().is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_client_is_shared_across_spawned_tasks() {
        let config = ClientConfig::builder().max_concurrent_batches(2).build();
        let (client, transport, _) = setup(config, Session::new(2, 2));
        let client = Arc::new(client);
        let locs = Arc::new(locations(5));

        let normals = {
            let client = Arc::clone(&client);
            let locs = Arc::clone(&locs);
            tokio::spawn(async move {
                client
                    .normals()
                    .period(Period::FromNormals1981To2010)
                    .locations(locs.as_slice())
                    .call()
                    .await
            })
        };
        let models: Vec<_> = ["DegreeDay_Annual", "Spruce_Budworm_Biology"]
            .into_iter()
            .map(|model| {
                let client = Arc::clone(&client);
                let locs = Arc::clone(&locs);
                tokio::spawn(async move {
                    client
                        .model_output()
                        .from_year(2018)
                        .to_year(2019)
                        .locations(locs.as_slice())
                        .model(model)
                        .call()
                        .await
                })
            })
            .collect();

        let normals = normals.await.unwrap().unwrap();
        assert_eq!(normals.keys().copied().collect::<Vec<_>>(), *locs);
        for task in models {
            let output = task.await.unwrap().unwrap();
            assert_eq!(output.keys().copied().collect::<Vec<_>>(), *locs);
        }
        assert_eq!(transport.calls_to(GENERATOR_API).len(), 3);
        assert_eq!(client.cache().len().await, 5);
        assert_eq!(client.cache().hits(), 5);

        let cleaner = Arc::clone(&client);
        tokio::spawn(async move { cleaner.clear_cache().await })
            .await
            .unwrap()
            .unwrap();
        assert!(client.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_model_catalogue() {
        let (client, transport, _) = setup(ClientConfig::default(), Session::new(10, 10));
        let first = client.model_list().await.unwrap();
        let second = client.model_list().await.unwrap();
        assert_eq!(first, ["DegreeDay_Annual", "Spruce_Budworm_Biology"]);
        assert_eq!(first, second);
        assert_eq!(transport.calls_to(MODEL_LIST_API).len(), 1);

        let help = client.model_help("DegreeDay_Annual").await.unwrap();
        assert!(help.starts_with("Model DegreeDay_Annual"));

        let parms = client
            .model_default_parameters("DegreeDay_Annual")
            .await
            .unwrap();
        assert_eq!(parms.len(), 2);
        assert_eq!(parms.to_string(), "LowerThreshold:5*Method:Sine");
        assert_eq!(
            transport.calls_to(DEFAULT_PARAMETERS_API),
            vec!["model=DegreeDay_Annual".to_string()]
        );
    }

    #[tokio::test]
    async fn test_handshake_before_any_call() {
        let transport = FixtureTransport::new(|api, _| match api {
            "BioSimStatus" => Ok(lines(&[
                r#"{"IsInitCompleted":true,"settings":{"NbMaxCoordinatesNormals":50,"NbMaxCoordinatesWG":20}}"#,
            ])),
            _ => Ok(Vec::new()),
        });
        let client = BioSimClient::with_transport(ClientConfig::default(), transport)
            .await
            .unwrap();
        assert_eq!(client.session(), &Session::new(50, 20));

        let unsupported = FixtureTransport::new(|_, _| {
            Ok(lines(&[
                r#"{"IsInitCompleted":true,"settings":{"NbMaxCoordinatesNormals":50,"NbMaxCoordinatesWG":20,"IsClientSupported":false,"ClientMessage":"Please upgrade"}}"#,
            ]))
        });
        let err = BioSimClient::with_transport(ClientConfig::default(), unsupported)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("Please upgrade"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = ClientConfig::builder().nb_nearest_neighbours(40).build();
        let transport = FixtureTransport::new(|_, _| Ok(Vec::new()));
        assert!(BioSimClient::with_session(config, transport, Session::new(1, 1)).is_err());
    }
}
