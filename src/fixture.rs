//! Canned responses standing in for the ECB endpoint.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::BoxError;
use crate::transport::{HttpResponse, Transport};

/// Answers requests from bodies registered per quote currency.
///
/// A request is matched on the `D.{currency}.` series key in its URL.
/// Unmatched requests get a 404, and every call is counted.
#[derive(Debug, Default)]
pub struct FixtureTransport {
    responses: HashMap<String, String>,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, currency: &str, body: impl Into<String>) -> Self {
        self.responses.insert(currency.to_uppercase(), body.into());
        self
    }

    pub fn with_file(self, currency: &str, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let body = std::fs::read_to_string(path)?;
        Ok(self.with_response(currency, body))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.urls
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_string());
        }

        let body = self
            .responses
            .iter()
            .find(|(currency, _)| url.contains(&format!("D.{currency}.")))
            .map(|(_, body)| body.clone());

        Ok(match body {
            Some(body) => HttpResponse {
                status: StatusCode::OK,
                body,
            },
            None => HttpResponse {
                status: StatusCode::NOT_FOUND,
                body: "not valid".to_string(),
            },
        })
    }
}
