//! The negotiated session: batch capacities and support status returned by
//! the one-time `BioSimStatus` handshake.

use crate::error::{BioSimError, ClientError};
use crate::query;
use crate::transport::Transport;
use log::{info, warn};
use serde::Deserialize;

const STATUS_API: &str = "BioSimStatus";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusReply {
    is_init_completed: bool,
    #[serde(rename = "settings")]
    settings: Option<StatusSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusSettings {
    nb_max_coordinates_normals: usize,
    #[serde(rename = "NbMaxCoordinatesWG")]
    nb_max_coordinates_wg: usize,
    #[serde(default = "supported_by_default")]
    is_client_supported: bool,
    #[serde(default)]
    client_message: String,
}

fn supported_by_default() -> bool {
    true
}

/// Server-imposed limits that hold for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    max_locations_normals: usize,
    max_locations_weather: usize,
    client_message: String,
}

impl Session {
    /// A session with known limits, skipping the handshake.
    pub fn new(max_locations_normals: usize, max_locations_weather: usize) -> Self {
        Self {
            max_locations_normals: max_locations_normals.max(1),
            max_locations_weather: max_locations_weather.max(1),
            client_message: String::new(),
        }
    }

    /// Maximum number of locations in one normals request.
    pub fn max_locations_normals(&self) -> usize {
        self.max_locations_normals
    }

    /// Maximum number of locations in one weather generation request.
    pub fn max_locations_weather(&self) -> usize {
        self.max_locations_weather
    }

    /// Advisory message sent by the server, empty if none.
    pub fn client_message(&self) -> &str {
        &self.client_message
    }

    /// Runs the status handshake. An unsupported client is a fatal error.
    pub async fn negotiate(
        transport: &dyn Transport,
        revision: &str,
    ) -> Result<Session, BioSimError> {
        let reply = transport
            .send(STATUS_API, &query::status(revision))
            .await?
            .join("\n");
        let session = Session::from_status_reply(&reply)?;
        info!(
            "Session negotiated: {} location(s) per normals batch, {} per weather batch",
            session.max_locations_normals, session.max_locations_weather
        );
        Ok(session)
    }

    pub(crate) fn from_status_reply(reply: &str) -> Result<Session, ClientError> {
        let status: StatusReply = serde_json::from_str(reply).map_err(ClientError::StatusParse)?;
        if !status.is_init_completed {
            return Err(ClientError::ServerNotInitialized);
        }
        let settings = status.settings.ok_or_else(|| {
            ClientError::InvalidStatus("the status reply has no settings entry".to_string())
        })?;
        if !settings.is_client_supported {
            return Err(ClientError::UnsupportedClient(settings.client_message));
        }
        if settings.nb_max_coordinates_normals == 0 || settings.nb_max_coordinates_wg == 0 {
            return Err(ClientError::InvalidStatus(
                "the server advertised an empty batch capacity".to_string(),
            ));
        }
        if !settings.client_message.is_empty() {
            warn!("{}", settings.client_message);
        }
        Ok(Session {
            max_locations_normals: settings.nb_max_coordinates_normals,
            max_locations_weather: settings.nb_max_coordinates_wg,
            client_message: settings.client_message,
        })
    }
}
