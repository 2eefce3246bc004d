//! Immutable client configuration.

use crate::batch::DEFAULT_MAX_LOCATIONS_PER_CALL;
use crate::error::ClientError;
use bon::Builder;

/// Public BioSIM endpoint.
pub const DEFAULT_BASE_URL: &str = "https://repicea.dynu.net";
/// Endpoint used when [`ClientConfig::local`] is set.
pub const LOCAL_BASE_URL: &str = "http://192.168.0.194";

const MAX_NEAREST_NEIGHBOURS: u32 = 35;

/// Settings shared by every call of a [`BioSimClient`](crate::BioSimClient).
///
/// Built once with [`ClientConfig::builder`]; every field has a default, so
/// `ClientConfig::default()` is the configuration a fresh client starts with.
///
/// # Examples
///
/// ```
/// use biosim::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .nb_nearest_neighbours(10)
///     .ephemeral(true)
///     .build();
/// assert_eq!(config.nb_nearest_neighbours(), Some(10));
/// assert_eq!(config.endpoint(), "https://repicea.dynu.net");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Builder)]
pub struct ClientConfig {
    /// Root URL of the service.
    #[builder(default = DEFAULT_BASE_URL.to_string(), into)]
    base_url: String,
    /// Targets the local server instead of `base_url`.
    #[builder(default)]
    local: bool,
    /// Tags every request as coming from a test client.
    #[builder(default)]
    test_mode: bool,
    /// Generates past climate from normals instead of compiling observations.
    #[builder(default)]
    force_climate_generation: bool,
    /// Number of weather stations used for interpolation, `None` for the server default (4).
    nb_nearest_neighbours: Option<u32>,
    /// Releases generated climate right after use instead of caching it.
    #[builder(default)]
    ephemeral: bool,
    /// Number of sub-batches allowed in flight at the same time.
    #[builder(default = 1)]
    max_concurrent_batches: usize,
    /// Hard cap on the number of locations of a single call.
    #[builder(default = DEFAULT_MAX_LOCATIONS_PER_CALL)]
    max_locations_per_call: usize,
    /// Client revision reported during the status handshake.
    #[builder(default = env!("CARGO_PKG_VERSION").to_string(), into)]
    revision: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::builder().build()
    }
}

impl ClientConfig {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn force_climate_generation(&self) -> bool {
        self.force_climate_generation
    }

    pub fn nb_nearest_neighbours(&self) -> Option<u32> {
        self.nb_nearest_neighbours
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn max_concurrent_batches(&self) -> usize {
        self.max_concurrent_batches
    }

    pub fn max_locations_per_call(&self) -> usize {
        self.max_locations_per_call
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// The URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        if self.local {
            LOCAL_BASE_URL
        } else {
            &self.base_url
        }
    }

    /// Rejects settings the server would refuse, before any request is made.
    pub fn validate(&self) -> Result<(), ClientError> {
        if let Some(n) = self.nb_nearest_neighbours {
            if n < 1 || n > MAX_NEAREST_NEIGHBOURS {
                return Err(ClientError::InvalidParameter(format!(
                    "the number of nearest neighbours must be between 1 and {MAX_NEAREST_NEIGHBOURS}, got {n}"
                )));
            }
        }
        if self.max_concurrent_batches == 0 {
            return Err(ClientError::InvalidParameter(
                "at least one batch must be allowed in flight".to_string(),
            ));
        }
        if self.max_locations_per_call == 0 {
            return Err(ClientError::InvalidParameter(
                "the location cap of a call must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
