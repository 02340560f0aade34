use httpmock::prelude::*;
use serde_json::json;

use super::constants::pid_for;

/// Catalogue HTTP API served by httpmock.
pub struct CatalogueFixture {
    pub server: MockServer,
}

#[allow(dead_code)]
impl CatalogueFixture {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start_async().await,
        }
    }

    pub fn base_url(&self) -> String {
        self.server.base_url()
    }

    /// Register a product answering search and lookup requests.
    fn product(&self, identifier: &str, size: u64, downloadable: bool) -> String {
        let pid = pid_for(identifier);
        let record = json!({
            "id": pid,
            "name": format!("{}.zip", identifier),
            "size": size,
            "downloadable": downloadable,
        });

        let search = format!("\"name:{}.zip\"", identifier);
        let search_body = json!({ "value": [record.clone()] });
        self.server.mock(|when, then| {
            when.method(GET)
                .path("/Products")
                .query_param("$search", search.as_str());
            then.status(200).json_body(search_body);
        });
        pid
    }

    fn lookup(&self, pid: &str, identifier: &str, size: u64, downloadable: bool) {
        let path = format!("/Products({})", pid);
        let body = json!({
            "id": pid,
            "name": format!("{}.zip", identifier),
            "size": size,
            "downloadable": downloadable,
        });
        self.server.mock(|when, then| {
            when.method(GET).path(path.as_str());
            then.status(200).json_body(body);
        });
    }

    fn content(&self, pid: &str, body_len: usize) {
        let path = format!("/Products({})/$value", pid);
        self.server.mock(|when, then| {
            when.method(GET)
                .path(path.as_str())
                .header_exists("authorization");
            then.status(200).body(vec![42u8; body_len]);
        });
    }

    /// Online product whose content matches its advertised size.
    pub fn online(&self, identifier: &str, size: u64) {
        let pid = self.product(identifier, size, true);
        self.lookup(&pid, identifier, size, true);
        self.content(&pid, size as usize);
    }

    /// Online product whose transfer is shorter than advertised.
    pub fn online_truncated(&self, identifier: &str, size: u64, body_len: usize) {
        let pid = self.product(identifier, size, true);
        self.lookup(&pid, identifier, size, true);
        self.content(&pid, body_len);
    }

    /// Archived product that is online when polled after its restore order.
    pub fn archived_then_online(&self, identifier: &str, size: u64, estimated_time: &str) {
        let pid = self.product(identifier, size, false);
        self.lookup(&pid, identifier, size, true);
        self.content(&pid, size as usize);

        let path = format!("/Products({})/Ens.Order", pid);
        let body = json!({
            "Status": "RUNNING",
            "StatusMessage": "Order accepted",
            "EstimatedTime": estimated_time,
        });
        self.server.mock(|when, then| {
            when.method(POST)
                .path(path.as_str())
                .header_exists("authorization");
            then.status(200).json_body(body);
        });
    }

    /// Archived product whose restore order answers with garbage.
    pub fn archived_with_broken_order(&self, identifier: &str, size: u64) {
        let pid = self.product(identifier, size, false);
        let path = format!("/Products({})/Ens.Order", pid);
        self.server.mock(|when, then| {
            when.method(POST).path(path.as_str());
            then.status(200).body("<html>Service Unavailable</html>");
        });
    }

    /// Product the catalogue does not know about.
    pub fn missing(&self, identifier: &str) {
        let search = format!("\"name:{}.zip\"", identifier);
        self.server.mock(|when, then| {
            when.method(GET)
                .path("/Products")
                .query_param("$search", search.as_str());
            then.status(200).json_body(json!({ "value": [] }));
        });
    }
}
