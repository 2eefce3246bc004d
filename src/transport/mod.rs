//! The boundary with the BioSIM web service.
//!
//! A call is an API name plus a query string; the answer is the reply body
//! split into lines.

pub mod error;
pub mod http;

use crate::error::BioSimError;
use async_trait::async_trait;
use std::sync::Arc;

/// Sends one request to the service and returns the reply lines in order.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, api: &str, query: &str) -> Result<Vec<String>, BioSimError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, api: &str, query: &str) -> Result<Vec<String>, BioSimError> {
        (**self).send(api, query).await
    }
}
