// src/deploy_client.rs
use crate::models::deployment::{
    ApiDeployment, ApiDomain, ApiProject, DeploymentsResponse, DomainsResponse, ProjectsResponse,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("request to deployment API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("deployment API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed deployment API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The slice of the deployment platform's REST API the chat handlers use.
#[async_trait]
pub trait DeploymentApi: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<ApiProject>, PlatformError>;
    async fn get_project(&self, name: &str) -> Result<ApiProject, PlatformError>;
    async fn list_deployments(
        &self,
        project: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<ApiDeployment>, PlatformError>;
    async fn list_domains(&self) -> Result<Vec<ApiDomain>, PlatformError>;
}

#[derive(Debug, Clone)]
pub struct DeployClient {
    client: Client,
    api_token: String,
    base_url: String,
    team_id: Option<String>,
}

impl DeployClient {
    pub fn new(api_token: String, base_url: String, team_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            team_id,
        }
    }

    /// Issues one authenticated GET. Every call is attempted exactly once.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let mut params: Vec<(&str, String)> = query.to_vec();
        if let Some(team_id) = &self.team_id {
            params.push(("teamId", team_id.clone()));
        }

        debug!(path = %path, "calling deployment API");

        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_token)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(path = %path, status = %status.as_u16(), "deployment API error");
            return Err(PlatformError::Status { status, body });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DeploymentApi for DeployClient {
    async fn list_projects(&self) -> Result<Vec<ApiProject>, PlatformError> {
        let response: ProjectsResponse = self.get_json("/v9/projects", &[]).await?;
        info!("📦 Fetched {} projects", response.projects.len());
        Ok(response.projects)
    }

    async fn get_project(&self, name: &str) -> Result<ApiProject, PlatformError> {
        let path = format!("/v9/projects/{}", urlencoding::encode(name));
        self.get_json(&path, &[]).await
    }

    async fn list_deployments(
        &self,
        project: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<ApiDeployment>, PlatformError> {
        let mut query = Vec::new();
        if let Some(project) = project {
            query.push(("projectId", project.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let response: DeploymentsResponse = self.get_json("/v6/deployments", &query).await?;
        info!("🚀 Fetched {} deployments", response.deployments.len());
        Ok(response.deployments)
    }

    async fn list_domains(&self) -> Result<Vec<ApiDomain>, PlatformError> {
        let response: DomainsResponse = self.get_json("/v5/domains", &[]).await?;
        info!("🌐 Fetched {} domains", response.domains.len());
        Ok(response.domains)
    }
}
