//! HTTP client for the HDFS gateway.
//!
//! One method per request shape; every endpoint is relative to the configured
//! base URL. Non-2xx answers become `StorageError::Gateway` with the response
//! body as message, transport failures become `StorageError::Transport`.
//! Nothing is retried.

use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use storage_platform::error::{Operation, Result, StorageError};
use storage_platform::filesystem::ByteStream;
use storage_platform::path::basename;

pub const ROUTE_EXISTS: &str = "exists";
pub const ROUTE_DOWNLOAD: &str = "download";
pub const ROUTE_UPLOAD: &str = "upload";
pub const ROUTE_DELETE: &str = "delete";
pub const ROUTE_MKDIR: &str = "mkdir";
pub const ROUTE_LIST: &str = "list";

const USER_AGENT: &str = concat!("hdfs-storage/", env!("CARGO_PKG_VERSION"));

/// The logical call a request belongs to, used for error context.
/// `path` is the caller's root-relative path, never the wire path.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    pub operation: Operation,
    pub path: &'a str,
}

impl<'a> Call<'a> {
    pub fn new(operation: Operation, path: &'a str) -> Self {
        Self { operation, path }
    }

    fn transport(&self, err: reqwest::Error) -> StorageError {
        StorageError::transport(self.operation, self.path, err)
    }
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base: Url,
}

impl GatewayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(StorageError::Config(
                "gateway URL must be provided".to_string(),
            ));
        }
        // trailing slash so that routes join below any base path
        let base = Url::parse(&format!("{}/", trimmed))
            .map_err(|e| StorageError::Config(format!("invalid gateway URL {:?}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, route: &str) -> Result<Url> {
        self.base
            .join(route)
            .map_err(|e| StorageError::Config(format!("invalid gateway route {:?}: {}", route, e)))
    }

    async fn send(&self, call: Call<'_>, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| call.transport(e))?;
        check_status(call, response).await
    }

    /// GET `route` with query parameters
    pub async fn get(&self, call: Call<'_>, route: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = self.endpoint(route)?;
        debug!("gateway GET {} {:?}", url, query);
        self.send(call, self.client.get(url).query(query)).await
    }

    /// GET `route` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        call: Call<'_>,
        route: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.get(call, route, query).await?;
        let body = response.bytes().await.map_err(|e| call.transport(e))?;
        serde_json::from_slice(&body)
            .map_err(|e| StorageError::invalid_response(call.operation, call.path, e))
    }

    /// GET `route` and hand back the body as a live byte stream
    pub async fn get_stream(
        &self,
        call: Call<'_>,
        route: &str,
        query: &[(&str, String)],
    ) -> Result<ByteStream> {
        let response = self.get(call, route, query).await?;
        let operation = call.operation;
        let path = call.path.to_string();
        Ok(response
            .bytes_stream()
            .map_err(move |e| StorageError::transport(operation, &path, e))
            .boxed())
    }

    /// POST a form body carrying a single `path` field
    pub async fn post_path(&self, call: Call<'_>, route: &str, wire_path: &str) -> Result<()> {
        let url = self.endpoint(route)?;
        debug!("gateway POST {} path={}", url, wire_path);
        let request = self.client.post(url).form(&[("path", wire_path)]);
        self.send(call, request).await?;
        Ok(())
    }

    /// Multipart upload: a `path` text field and a `file` part named after the basename of `wire_path`
    pub async fn upload(&self, call: Call<'_>, wire_path: &str, file: Part) -> Result<()> {
        let url = self.endpoint(ROUTE_UPLOAD)?;
        debug!("gateway POST {} upload path={}", url, wire_path);
        let form = Form::new()
            .text("path", wire_path.to_string())
            .part("file", file.file_name(basename(wire_path).to_string()));
        self.send(call, self.client.post(url).multipart(form)).await?;
        Ok(())
    }
}

async fn check_status(call: Call<'_>, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
    Err(StorageError::Gateway {
        operation: call.operation,
        path: call.path.to_string(),
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_below_base_path() {
        let client = GatewayClient::new("http://gateway:8080/hdfs/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(ROUTE_LIST).unwrap().as_str(),
            "http://gateway:8080/hdfs/list"
        );

        let client = GatewayClient::new("http://gateway:8080", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(ROUTE_EXISTS).unwrap().as_str(),
            "http://gateway:8080/exists"
        );
    }

    #[test]
    fn test_rejects_empty_and_invalid_urls() {
        assert!(matches!(
            GatewayClient::new("  ", Duration::from_secs(5)),
            Err(StorageError::Config(_))
        ));
        assert!(matches!(
            GatewayClient::new("not a url", Duration::from_secs(5)),
            Err(StorageError::Config(_))
        ));
    }
}
