// src/models/deployment.rs
//
// Raw payloads of the deployment platform's REST API and the display shapes
// the chat handlers reshape them into.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Length a commit SHA is shortened to when shown to the user.
pub const SHORT_SHA_LEN: usize = 7;

// ---------------------------------------------------------------------------
// Raw API payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectsResponse {
    #[serde(default)]
    pub projects: Vec<ApiProject>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProject {
    pub name: String,
    pub node_version: Option<String>,
    #[serde(default)]
    pub live: bool,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub link: Option<ApiLink>,
    #[serde(default)]
    pub latest_deployments: Vec<ApiDeploymentRef>,
    pub targets: Option<ApiTargets>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLink {
    #[serde(rename = "type")]
    pub link_type: Option<String>,
    pub org: Option<String>,
    pub repo: Option<String>,
    pub production_branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDeploymentRef {
    #[serde(default)]
    pub alias: Vec<String>,
    pub target: Option<String>,
    pub created_at: Option<i64>,
    #[serde(default)]
    pub private: bool,
    pub plan: Option<String>,
    #[serde(default)]
    pub meta: ApiGitMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiGitMeta {
    #[serde(rename = "githubCommitAuthorName")]
    pub author: Option<String>,
    #[serde(rename = "githubCommitSha")]
    pub sha: Option<String>,
    #[serde(rename = "githubCommitRef")]
    pub branch: Option<String>,
    #[serde(rename = "githubCommitMessage")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTargets {
    pub production: Option<ApiTarget>,
    pub preview: Option<ApiTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTarget {
    #[serde(default)]
    pub alias: Vec<String>,
    pub build: Option<Value>,
    #[serde(default)]
    pub meta: ApiGitMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentsResponse {
    #[serde(default)]
    pub deployments: Vec<ApiDeployment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDeployment {
    pub uid: String,
    pub name: String,
    pub url: Option<String>,
    pub state: Option<String>,
    pub target: Option<String>,
    pub created: Option<i64>,
    pub creator: Option<ApiCreator>,
    #[serde(default)]
    pub meta: ApiGitMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCreator {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainsResponse {
    #[serde(default)]
    pub domains: Vec<ApiDomain>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDomain {
    pub name: String,
    #[serde(default)]
    pub verified: bool,
    pub created_at: Option<i64>,
    pub service_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Display shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub project_name: String,
    pub domain: Option<String>,
    pub branch: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub live: bool,
    pub org: Option<String>,
    pub repo: Option<String>,
    pub latest: Option<LatestDeployment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestDeployment {
    pub target: Option<String>,
    pub message: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    pub project_name: String,
    pub node_version: Option<String>,
    pub live: bool,
    pub private: bool,
    pub plan: Option<String>,
    pub host: Option<String>,
    pub branch: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub org: Option<String>,
    pub repo: Option<String>,
    pub target: ProjectTargets,
}

impl ProjectDetail {
    /// Copy of the detail with commit SHAs shortened for display.
    pub fn for_display(&self) -> Self {
        let mut shown = self.clone();
        shown.target.production = shown.target.production.with_short_sha();
        shown.target.preview = shown.target.preview.with_short_sha();
        shown
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTargets {
    pub production: DeploymentTarget,
    pub preview: DeploymentTarget,
}

/// A production or preview target. `Empty` serializes as `{}` and marks a
/// target the platform did not report; callers must branch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeploymentTarget {
    Populated(TargetDetail),
    Empty {},
}

impl DeploymentTarget {
    pub fn is_empty(&self) -> bool {
        matches!(self, DeploymentTarget::Empty {})
    }

    pub fn detail(&self) -> Option<&TargetDetail> {
        match self {
            DeploymentTarget::Populated(detail) => Some(detail),
            DeploymentTarget::Empty {} => None,
        }
    }

    fn with_short_sha(self) -> Self {
        match self {
            DeploymentTarget::Populated(mut detail) => {
                detail.git.sha = detail
                    .git
                    .sha
                    .map(|sha| sha.chars().take(SHORT_SHA_LEN).collect());
                DeploymentTarget::Populated(detail)
            }
            empty => empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDetail {
    pub domains: Vec<String>,
    pub build: Option<String>,
    pub git: GitInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitInfo {
    pub author: Option<String>,
    pub sha: Option<String>,
    pub branch: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub uid: String,
    pub name: String,
    pub url: Option<String>,
    pub state: Option<String>,
    pub target: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub creator: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSummary {
    pub name: String,
    pub verified: bool,
    pub created: Option<DateTime<Utc>>,
    pub service_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Reshaping
// ---------------------------------------------------------------------------

fn millis(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Reshapes the project list, dropping every project whose name contains `hidden`.
pub fn summarize_projects(projects: Vec<ApiProject>, hidden: &str) -> Vec<ProjectSummary> {
    projects
        .into_iter()
        .filter(|project| hidden.is_empty() || !project.name.contains(hidden))
        .map(ProjectSummary::from)
        .collect()
}

impl From<ApiProject> for ProjectSummary {
    fn from(project: ApiProject) -> Self {
        let latest = project.latest_deployments.into_iter().next();
        let link = project.link;

        Self {
            project_name: project.name,
            domain: latest.as_ref().and_then(|d| d.alias.first().cloned()),
            branch: link.as_ref().and_then(|l| l.production_branch.clone()),
            created: millis(project.created_at),
            live: project.live,
            org: link.as_ref().and_then(|l| l.org.clone()),
            repo: link.as_ref().and_then(|l| l.repo.clone()),
            latest: latest.map(|d| LatestDeployment {
                target: d.target,
                message: d.meta.message,
                time: millis(d.created_at),
            }),
        }
    }
}

impl From<ApiTarget> for TargetDetail {
    fn from(target: ApiTarget) -> Self {
        let build = target.build.and_then(|build| match build {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });

        Self {
            domains: target.alias,
            build,
            git: GitInfo {
                author: target.meta.author,
                sha: target.meta.sha,
                branch: target.meta.branch,
                message: target.meta.message,
            },
        }
    }
}

impl From<Option<ApiTarget>> for DeploymentTarget {
    fn from(target: Option<ApiTarget>) -> Self {
        match target {
            Some(target) => DeploymentTarget::Populated(target.into()),
            None => DeploymentTarget::Empty {},
        }
    }
}

impl From<ApiProject> for ProjectDetail {
    fn from(project: ApiProject) -> Self {
        let latest = project.latest_deployments.first();
        let link = project.link.as_ref();
        let (production, preview) = match project.targets.clone() {
            Some(targets) => (targets.production, targets.preview),
            None => (None, None),
        };

        Self {
            project_name: project.name.clone(),
            node_version: project.node_version.clone(),
            live: project.live,
            private: latest.map(|d| d.private).unwrap_or(false),
            plan: latest.and_then(|d| d.plan.clone()),
            host: link.and_then(|l| l.link_type.clone()),
            branch: link.and_then(|l| l.production_branch.clone()),
            created: millis(project.created_at),
            updated: millis(project.updated_at),
            org: link.and_then(|l| l.org.clone()),
            repo: link.and_then(|l| l.repo.clone()),
            target: ProjectTargets {
                production: production.into(),
                preview: preview.into(),
            },
        }
    }
}

impl From<ApiDeployment> for DeploymentSummary {
    fn from(deployment: ApiDeployment) -> Self {
        Self {
            uid: deployment.uid,
            name: deployment.name,
            url: deployment.url,
            state: deployment.state,
            target: deployment.target,
            created: millis(deployment.created),
            creator: deployment.creator.and_then(|c| c.username),
            message: deployment.meta.message,
        }
    }
}

impl From<ApiDomain> for DomainSummary {
    fn from(domain: ApiDomain) -> Self {
        Self {
            name: domain.name,
            verified: domain.verified,
            created: millis(domain.created_at),
            service_type: domain.service_type,
        }
    }
}
