//! Typed client for the upstream task service.

pub mod http;
pub mod models;

use async_trait::async_trait;

use crate::error::Result;
use models::{
    Cluster, ExtraPriority, GetQuotaRequest, GetTaskRequest, GetTaskResponse, ListTasksRequest,
    ListTasksResponse, ResourceQuota, UpdateTaskRequest, UpdateTaskResponse,
};

pub use http::HttpTesClient;

/// Upstream task service operations used by the scheduler. The HTTP wire
/// protocol is owned by the upstream API; this trait is the seam tests mock.
#[async_trait]
pub trait TesClient: Send + Sync {
    async fn list_tasks(&self, req: &ListTasksRequest) -> Result<ListTasksResponse>;

    async fn get_task(&self, req: &GetTaskRequest) -> Result<GetTaskResponse>;

    async fn update_task(&self, req: &UpdateTaskRequest) -> Result<UpdateTaskResponse>;

    async fn list_clusters(&self) -> Result<Vec<Cluster>>;

    /// Returns `Err(SchedulerError::NotFound)` when no quota is configured
    /// for the requested scope.
    async fn get_quota(&self, req: &GetQuotaRequest) -> Result<ResourceQuota>;

    async fn list_extra_priorities(&self) -> Result<Vec<ExtraPriority>>;
}
