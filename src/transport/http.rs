use crate::config::ClientConfig;
use crate::error::BioSimError;
use crate::transport::error::TransportError;
use crate::transport::Transport;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{debug, warn};
use reqwest::{Client, Response};
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

const API_ROOT: &str = "BioSIM";
const TEST_CLIENT_ID: &str = "cid=testRust";

/// [`Transport`] over HTTP(S) with `reqwest`.
pub struct HttpTransport {
    base_url: String,
    test_mode: bool,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, test_mode: bool) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            test_mode,
            client: Client::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.endpoint(), config.test_mode())
    }

    fn url(&self, api: &str, query: &str) -> String {
        let mut url = format!("{}/{}/{}", self.base_url, API_ROOT, api);
        let has_query = !query.is_empty();
        if has_query {
            url.push('?');
            url.push_str(query);
        }
        if self.test_mode {
            url.push(if has_query { '&' } else { '?' });
            url.push_str(TEST_CLIENT_ID);
        }
        url
    }

    /// Splits the body into lines as it streams in.
    async fn read_lines(url: &str, response: Response) -> Result<Vec<String>, TransportError> {
        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut lines = StreamReader::new(stream).lines();
        let mut reply = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| TransportError::BodyRead(url.to_string(), e))?
        {
            reply.push(line);
        }
        Ok(reply)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, api: &str, query: &str) -> Result<Vec<String>, BioSimError> {
        let url = self.url(api, query);
        debug!("Sending request to {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::NetworkRequest(url.clone(), e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = Self::read_lines(&url, response).await?.join("\n");
            warn!("HTTP error {} for {}: {}", status, url, body);
            return Err(TransportError::HttpStatus { url, status, body }.into());
        }

        Ok(Self::read_lines(&url, response).await?)
    }
}
