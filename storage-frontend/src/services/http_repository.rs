//! REST client for the storage endpoints of the LIS backend.

use crate::config::StorageApiSettings;
use crate::models::{
    AssignmentReceipt, AssignmentRequest, AssignmentResponse, BarcodeValidation, CurrentLocation,
    HierarchyLevel, HierarchyNode, MetadataUpdate, NewNode, NodeId, NodeRecord, SearchResult,
};
use crate::services::repository::HierarchyRepository;
use async_trait::async_trait;
use lis_core::error::AppError;
use lis_core::observability::{TracedClientExt, TracedRequest};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use validator::Validate;

pub struct StorageApiClient {
    client: Client,
    settings: StorageApiSettings,
}

impl StorageApiClient {
    pub fn new(settings: StorageApiSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/storage/{}", self.base_url(), path)
    }

    /// `/rest/storage/sample-items/{id}` with the id percent-encoded as one segment.
    fn sample_item_url(&self, sample_item_id: &str) -> Result<String, AppError> {
        let mut url = reqwest::Url::parse(&self.url("sample-items"))
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!(
                    "Storage API base URL cannot carry a path: {}",
                    self.base_url()
                ))
            })?
            .push(sample_item_id);
        Ok(url.into())
    }

    fn authorize(&self, request: TracedRequest) -> TracedRequest {
        let request = request.timeout(self.settings.timeout());
        match &self.settings.session_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Send and return status plus body text; transport failures are logged here.
    async fn execute(&self, request: TracedRequest, url: &str) -> Result<(StatusCode, String), AppError> {
        tracing::debug!(url = %url, "Sending storage API request");

        let response = self.authorize(request).send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "Storage API request failed");
            AppError::Transport(e)
        })?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// Build an error from a non-success response, preferring the server's
    /// `error`/`message` field over the raw body.
    fn rejection(status: StatusCode, body: &str) -> AppError {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| server_message(&value))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body.trim().to_string()
                }
            });
        tracing::warn!(status = %status, message = %message, "Storage API rejected request");
        AppError::from_status(status.as_u16(), message)
    }
}

fn server_message(value: &serde_json::Value) -> Option<String> {
    ["error", "message", "errorMessage"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

#[async_trait]
impl HierarchyRepository for StorageApiClient {
    async fn list_children(
        &self,
        level: HierarchyLevel,
        parent: Option<&NodeId>,
    ) -> Result<Vec<HierarchyNode>, AppError> {
        let url = self.url(level.collection());
        let request = match (level.parent_query_key(), parent) {
            (None, _) => self.client.traced_get(&url),
            (Some(key), Some(parent)) => self.client.traced_get(&url).query(&[(key, parent.as_str())]),
            (Some(_), None) => return Ok(Vec::new()),
        };

        let (status, body) = self.execute(request, &url).await?;
        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }

        let records: Vec<NodeRecord> = serde_json::from_str(&body)?;
        let nodes = records
            .into_iter()
            .filter(|record| record.active != Some(false))
            .map(|record| {
                let mut node = record.into_node(level);
                if node.parent_id.is_none() {
                    node.parent_id = parent.cloned();
                }
                node
            })
            .collect::<Vec<_>>();

        tracing::debug!(level = %level, count = nodes.len(), "Loaded child nodes");
        Ok(nodes)
    }

    async fn create_node(&self, node: &NewNode) -> Result<HierarchyNode, AppError> {
        node.validate()?;
        if node.level.parent_field().is_some() && node.parent_id.is_none() {
            return Err(AppError::BadRequest(format!(
                "{} requires a saved parent",
                node.level.label()
            )));
        }

        let url = self.url(node.level.collection());
        let request = self.client.traced_post(&url).json(&node.to_payload());
        let (status, body) = self.execute(request, &url).await?;
        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }

        let value: serde_json::Value = serde_json::from_str(&body)?;
        let record: NodeRecord = serde_json::from_value(value.clone())?;
        if record.id.is_none() {
            let message = server_message(&value)
                .unwrap_or_else(|| format!("Failed to create {}", node.level.label()));
            tracing::warn!(level = %node.level, message = %message, "Create returned no id");
            return Err(AppError::BadRequest(message));
        }

        let mut created = record.into_node(node.level);
        if created.display_name.is_empty() {
            created.display_name = node.display_name.clone();
        }
        if created.parent_id.is_none() {
            created.parent_id = node.parent_id.clone();
        }

        tracing::info!(
            level = %node.level,
            id = ?created.id,
            name = %created.display_name,
            "Created storage node"
        );
        Ok(created)
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<SearchResult>, AppError> {
        let url = self.url("locations/search");
        let request = self.client.traced_get(&url).query(&[("q", query.trim())]);
        let (status, body) = self.execute(request, &url).await?;
        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn validate_barcode(&self, barcode: &str) -> Result<BarcodeValidation, AppError> {
        let url = self.url("barcode/validate");
        let request = self.client.traced_get(&url).query(&[("barcode", barcode.trim())]);
        let (status, body) = self.execute(request, &url).await?;

        let parsed = serde_json::from_str::<BarcodeValidation>(&body);
        if status.is_success() {
            return Ok(parsed?);
        }
        // Unresolvable barcodes may come back as 4xx with a validation body.
        match parsed {
            Ok(validation) if status.is_client_error() => Ok(validation),
            _ => Err(Self::rejection(status, &body)),
        }
    }

    async fn assign(&self, request: &AssignmentRequest) -> Result<AssignmentReceipt, AppError> {
        let url = self.url("sample-items/assign");
        let traced = self.client.traced_post(&url).json(request);
        let (status, body) = self.execute(traced, &url).await?;
        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }

        let response: AssignmentResponse = serde_json::from_str(&body)?;
        response.into_result().map_err(|message| {
            tracing::warn!(
                sample_item_id = %request.sample_item_id,
                message = %message,
                "Assignment rejected"
            );
            AppError::BadRequest(message)
        })
    }

    async fn update_metadata(
        &self,
        sample_item_id: &str,
        update: &MetadataUpdate,
    ) -> Result<(), AppError> {
        let url = self.sample_item_url(sample_item_id)?;
        let request = self.client.traced_patch(&url).json(update);
        let (status, body) = self.execute(request, &url).await?;
        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }
        Ok(())
    }

    async fn current_location(
        &self,
        sample_item_id: &str,
    ) -> Result<Option<CurrentLocation>, AppError> {
        let url = self.sample_item_url(sample_item_id)?;
        let request = self.client.traced_get(&url);
        let (status, body) = self.execute(request, &url).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Some(CurrentLocation::default()));
        }
        Ok(Some(serde_json::from_str(&body)?))
    }
}
