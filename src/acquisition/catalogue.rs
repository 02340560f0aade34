//! HTTP client for the product catalogue.
//!
//! The catalogue speaks OData over JSON. Search and metadata requests are
//! anonymous; restore orders and content downloads use basic auth.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use super::error::AcquisitionError;
use super::models::{ProductRecord, ProductTier, RestoreAck};

/// Default catalogue root.
pub const DEFAULT_CATALOGUE_URL: &str = "https://catalogue.onda-dias.eu/dias-catalogue";

/// Body of a product download.
pub struct ContentStream {
    /// Length announced by the server, if any.
    pub declared_len: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes, AcquisitionError>>,
}

/// Operations the orchestrator needs from a catalogue.
#[async_trait]
pub trait CatalogueClient: Send + Sync {
    /// Find the product named `<identifier>.zip`.
    async fn resolve(&self, identifier: &str) -> Result<ProductRecord, AcquisitionError>;

    /// Fetch a product record by its catalogue id.
    async fn lookup(&self, pid: &str) -> Result<ProductRecord, AcquisitionError>;

    /// Ask the catalogue to bring an archived product online.
    async fn request_restore(&self, pid: &str) -> Result<RestoreAck, AcquisitionError>;

    /// Open the content stream of an online product.
    async fn fetch_content(
        &self,
        record: &ProductRecord,
    ) -> Result<ContentStream, AcquisitionError>;
}

#[derive(Debug, Deserialize)]
struct ODataProduct {
    id: String,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    downloadable: bool,
}

#[derive(Debug, Deserialize)]
struct ODataSearchResponse {
    value: Vec<ODataProduct>,
}

#[derive(Debug, Deserialize)]
struct ODataOrderResponse {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "StatusMessage", default)]
    status_message: String,
    #[serde(rename = "EstimatedTime", default)]
    estimated_time: Option<String>,
}

/// Catalogue client for the ONDA DIAS OData API.
#[derive(Clone)]
pub struct OndaCatalogueClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl OndaCatalogueClient {
    /// Create a new client.
    ///
    /// `timeout` bounds connection setup, metadata requests and every single
    /// read. A content download as a whole is not bounded since products run
    /// to several gigabytes, but a stalled transfer fails after `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            username: username.into(),
            password: password.into(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn product_url(&self, pid: &str) -> String {
        format!("{}/Products({})", self.base_url, pid)
    }

    fn content_url(&self, pid: &str) -> String {
        format!("{}/$value", self.product_url(pid))
    }

    fn to_record(&self, product: ODataProduct) -> ProductRecord {
        let tier = if product.downloadable {
            ProductTier::Online
        } else {
            ProductTier::Archived
        };
        let content_url = self.content_url(&product.id);
        ProductRecord {
            pid: product.id,
            name: product.name,
            size: product.size,
            tier,
            content_url,
        }
    }

    async fn metadata_request(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Response, AcquisitionError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;
        check_status(response)
    }
}

fn check_status(response: Response) -> Result<Response, AcquisitionError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(AcquisitionError::TransientNetwork(format!(
            "{} returned {}",
            response.url(),
            status
        )))
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, AcquisitionError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| AcquisitionError::MalformedResponse(e.to_string()))
}

#[async_trait]
impl CatalogueClient for OndaCatalogueClient {
    async fn resolve(&self, identifier: &str) -> Result<ProductRecord, AcquisitionError> {
        let url = format!("{}/Products", self.base_url);
        let file_name = format!("{}.zip", identifier);
        let search = format!("\"name:{}\"", file_name);
        debug!("Searching catalogue for {}", identifier);

        let response = self.metadata_request(&url, &[("$search", search)]).await?;
        let body: ODataSearchResponse = decode(response).await?;

        let hits = body.value.len();
        match body.value.into_iter().find(|p| p.name == file_name) {
            Some(product) => Ok(self.to_record(product)),
            None => {
                if hits > 0 {
                    debug!("{} search hits for {}, none named {}", hits, identifier, file_name);
                }
                Err(AcquisitionError::NotFound(identifier.to_string()))
            }
        }
    }

    async fn lookup(&self, pid: &str) -> Result<ProductRecord, AcquisitionError> {
        let response = self.metadata_request(&self.product_url(pid), &[]).await?;
        let product: ODataProduct = decode(response).await?;
        Ok(self.to_record(product))
    }

    async fn request_restore(&self, pid: &str) -> Result<RestoreAck, AcquisitionError> {
        let url = format!("{}/Ens.Order", self.product_url(pid));
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AcquisitionError::Restore(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Restore(format!(
                "restore order for {} returned {}",
                pid, status
            )));
        }

        let order: ODataOrderResponse = decode(response).await?;
        Ok(RestoreAck {
            status: order.status,
            message: order.status_message,
            estimated_time: order.estimated_time.filter(|s| !s.trim().is_empty()),
        })
    }

    async fn fetch_content(
        &self,
        record: &ProductRecord,
    ) -> Result<ContentStream, AcquisitionError> {
        let response = self
            .client
            .get(&record.content_url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let response = check_status(response)?;

        let declared_len = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(AcquisitionError::from))
            .boxed();

        Ok(ContentStream {
            declared_len,
            stream,
        })
    }
}
