use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::{ObjectStore, StorageError, StorageResult, UploadOptions};
use crate::config::StorageConfig;

/// Supabase Storage REST client scoped to a single bucket
pub struct SupabaseStorage {
    client: Client,
    base_url: Url,
    bucket: String,
    service_key: String,
}

impl SupabaseStorage {
    pub fn new(
        base_url: &str,
        bucket: impl Into<String>,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| StorageError::Configuration(format!("invalid SUPABASE_URL: {}", e)))?;
        // Url::join drops the last segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            bucket: bucket.into(),
            service_key: service_key.into(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let base_url = config
            .supabase_url
            .as_deref()
            .ok_or_else(|| StorageError::Configuration("SUPABASE_URL is not set".to_string()))?;
        let service_key = config
            .service_key
            .as_deref()
            .ok_or_else(|| {
                StorageError::Configuration("SUPABASE_SERVICE_ROLE_KEY is not set".to_string())
            })?;

        Self::new(
            base_url,
            config.bucket.clone(),
            service_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `<base>/storage/v1/object/<bucket>[/<path>]`
    fn object_url(&self, path: Option<&str>) -> StorageResult<Url> {
        let relative = match path {
            Some(path) => format!(
                "storage/v1/object/{}/{}",
                self.bucket,
                path.trim_start_matches('/')
            ),
            None => format!("storage/v1/object/{}", self.bucket),
        };
        self.base_url.join(&relative).map_err(|e| {
            StorageError::Configuration(format!("invalid object path '{}': {}", relative, e))
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn error_from_response(path: &str, response: reqwest::Response) -> StorageError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return StorageError::NotFound(path.to_string());
        }
        StorageError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

fn transport(err: reqwest::Error) -> StorageError {
    StorageError::Transport(err.to_string())
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: UploadOptions,
    ) -> StorageResult<()> {
        let url = self.object_url(Some(path))?;
        tracing::debug!("Uploading {} bytes to {}/{}", bytes.len(), self.bucket, path);

        let response = self
            .authorized(self.client.post(url))
            .header(header::CONTENT_TYPE, options.content_type)
            .header("x-upsert", if options.upsert { "true" } else { "false" })
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(path, response).await)
        }
    }

    async fn download(&self, path: &str) -> StorageResult<Vec<u8>> {
        let url = self.object_url(Some(path))?;

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(path, response).await);
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    async fn remove(&self, paths: &[String]) -> StorageResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = self.object_url(None)?;

        let response = self
            .authorized(self.client.delete(url))
            .json(&json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(&paths.join(","), response).await)
        }
    }
}
