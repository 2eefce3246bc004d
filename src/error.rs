use crate::dataset::error::DataSetError;
use crate::transport::error::TransportError;
use thiserror::Error;

/// Every failure a call to the BioSIM service can end with.
///
/// Failures fall in two families: client failures (bad request, unparseable
/// reply, unreachable host) and server failures (HTTP 5xx, or an explicit
/// `error` line in the reply). See [`BioSimError::is_server_failure`].
#[derive(Debug, Error)]
pub enum BioSimError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    DataSet(#[from] DataSetError),
}

impl BioSimError {
    pub fn is_server_failure(&self) -> bool {
        match self {
            BioSimError::Server(_) => true,
            BioSimError::Transport(e) => e.is_server_failure(),
            _ => false,
        }
    }

    pub fn is_client_failure(&self) -> bool {
        !self.is_server_failure()
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Malformed server reply:\n{reply}")]
    MalformedReply { reply: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("This client is not supported by the server: {0}")]
    UnsupportedClient(String),

    #[error("The server initialization is not completed")]
    ServerNotInitialized,

    #[error("The server status reply could not be parsed")]
    StatusParse(#[source] serde_json::Error),

    #[error("Invalid server status: {0}")]
    InvalidStatus(String),

    #[error("The maximum number of locations for a single request is {max}, got {requested}")]
    TooManyLocations { max: usize, requested: usize },

    #[error("The reply holds more location blocks than the {expected} location(s) requested")]
    LocationCountMismatch { expected: usize },

    #[error("The generator returned {found} handle(s) for {expected} location(s)")]
    HandleCountMismatch { expected: usize, found: usize },

    #[error("The server did not return any output for model '{0}'")]
    MissingModelOutput(String),
}

/// An explicit failure reported by the service in its reply body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Server replied with an error: {message}")]
pub struct ServerError {
    pub message: String,
}

impl ServerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
