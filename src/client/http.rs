//! HTTP implementation of the upstream task service client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{Result, SchedulerError};

use super::models::{
    Cluster, ExtraPriority, GetQuotaRequest, GetTaskRequest, GetTaskResponse, ListTasksRequest,
    ListTasksResponse, ResourceQuota, UpdateTaskRequest, UpdateTaskResponse,
};
use super::TesClient;

const GA4GH_API_PREFIX: &str = "/api/ga4gh/tes/v1";
const OTHER_API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone)]
pub struct HttpTesClient {
    client: Client,
    base_url: String,
}

impl HttpTesClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SchedulerError::Http)?;

        Ok(Self {
            client,
            base_url: endpoint.into().trim_end_matches('/').to_owned(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await.map_err(SchedulerError::Http)?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let message = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND {
                return Err(SchedulerError::NotFound(message));
            }
            return Err(SchedulerError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        response.json().await.map_err(SchedulerError::Http)
    }
}

#[async_trait]
impl TesClient for HttpTesClient {
    async fn list_tasks(&self, req: &ListTasksRequest) -> Result<ListTasksResponse> {
        let mut query: Vec<(&str, String)> = Vec::new();
        for state in &req.state {
            query.push(("state", state.as_str().to_string()));
        }
        if let Some(view) = req.view {
            query.push(("view", view.as_str().to_string()));
        }
        if req.page_size > 0 {
            query.push(("page_size", req.page_size.to_string()));
        }
        if !req.page_token.is_empty() {
            query.push(("page_token", req.page_token.clone()));
        }
        if let Some(name_prefix) = &req.name_prefix {
            query.push(("name_prefix", name_prefix.clone()));
        }
        if let Some(cluster_id) = &req.cluster_id {
            query.push(("cluster_id", cluster_id.clone()));
        }
        if let Some(without_cluster) = req.without_cluster {
            query.push(("without_cluster", without_cluster.to_string()));
        }

        self.send(
            self.request(Method::GET, &format!("{GA4GH_API_PREFIX}/tasks"))
                .query(&query),
        )
        .await
    }

    async fn get_task(&self, req: &GetTaskRequest) -> Result<GetTaskResponse> {
        let mut builder = self.request(Method::GET, &format!("{GA4GH_API_PREFIX}/tasks/{}", req.id));
        if let Some(view) = req.view {
            builder = builder.query(&[("view", view.as_str())]);
        }
        self.send(builder).await
    }

    async fn update_task(&self, req: &UpdateTaskRequest) -> Result<UpdateTaskResponse> {
        self.send(
            self.request(Method::PATCH, &format!("{OTHER_API_PREFIX}/tasks/{}", req.id))
                .json(req),
        )
        .await
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        self.send(self.request(Method::GET, &format!("{OTHER_API_PREFIX}/clusters")))
            .await
    }

    async fn get_quota(&self, req: &GetQuotaRequest) -> Result<ResourceQuota> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if req.global {
            query.push(("global", "true".to_string()));
        }
        if !req.account_id.is_empty() {
            query.push(("account_id", req.account_id.clone()));
        }
        if !req.user_id.is_empty() {
            query.push(("user_id", req.user_id.clone()));
        }
        self.send(
            self.request(Method::GET, &format!("{OTHER_API_PREFIX}/quota"))
                .query(&query),
        )
        .await
    }

    async fn list_extra_priorities(&self) -> Result<Vec<ExtraPriority>> {
        self.send(self.request(Method::GET, &format!("{OTHER_API_PREFIX}/extra_priority")))
            .await
    }
}
