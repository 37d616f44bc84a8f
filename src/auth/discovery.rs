//! Cloud Code project discovery.
//!
//! Every wrapped request names a project. Discovery asks `loadCodeAssist`
//! which project an account belongs to; accounts that have never used the
//! service are provisioned through `onboardUser`. When both fail, a shared
//! fallback project keeps the account usable with limited quota.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::constants::{
    API_PATH_LOAD_CODE_ASSIST, API_PATH_ONBOARD_USER, DEFAULT_PROJECT_ID,
    LOAD_CODE_ASSIST_ENDPOINTS,
};
use crate::error::{ProxyError, Result};

/// Resolves the Cloud Code project for an access token.
#[async_trait]
pub trait ProjectDiscovery: Send + Sync {
    /// Discover (or provision) the project id.
    async fn discover(&self, token: &str, hint: Option<&str>) -> Result<String>;
}

/// Production discovery against the Cloud Code endpoints.
pub struct CloudCodeDiscovery {
    client: reqwest::Client,
}

impl CloudCodeDiscovery {
    /// Create a discovery client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn try_load_code_assist(
        &self,
        token: &str,
        endpoint: &str,
        hint: Option<&str>,
    ) -> Result<LoadCodeAssistResponse> {
        let url = format!("{endpoint}{API_PATH_LOAD_CODE_ASSIST}");
        let body = match hint {
            Some(project) => serde_json::json!({ "cloudaicompanionProject": project }),
            None => serde_json::json!({}),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProxyError::api(status.as_u16(), text));
        }
        Ok(response.json().await?)
    }

    async fn try_onboard_user(&self, token: &str, endpoint: &str) -> Result<String> {
        let url = format!("{endpoint}{API_PATH_ONBOARD_USER}");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "tierId": "free-tier" }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProxyError::api(status.as_u16(), text));
        }

        let onboarded: OnboardUserResponse = response.json().await?;
        onboarded
            .project_id()
            .ok_or_else(|| ProxyError::Internal("onboardUser returned no project".to_string()))
    }
}

impl Default for CloudCodeDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectDiscovery for CloudCodeDiscovery {
    async fn discover(&self, token: &str, hint: Option<&str>) -> Result<String> {
        let mut last_error: Option<ProxyError> = None;

        for endpoint in LOAD_CODE_ASSIST_ENDPOINTS {
            debug!(endpoint = %endpoint, "Trying loadCodeAssist");
            match self.try_load_code_assist(token, endpoint, hint).await {
                Ok(response) => {
                    if let Some(project) = response.project_id() {
                        info!(project = %project, "Discovered project");
                        return Ok(project);
                    }
                    // Known account but no project yet: provision one.
                    match self.try_onboard_user(token, endpoint).await {
                        Ok(project) => {
                            info!(project = %project, "Onboarded new project");
                            return Ok(project);
                        }
                        Err(e) => {
                            warn!(endpoint = %endpoint, error = %e, "Onboarding failed");
                            last_error = Some(e);
                        }
                    }
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "loadCodeAssist failed");
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            warn!(error = %e, "Project discovery exhausted, using fallback project");
        }
        Ok(DEFAULT_PROJECT_ID.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadCodeAssistResponse {
    #[serde(default)]
    cloudaicompanion_project: Option<String>,
    #[serde(default)]
    project: Option<String>,
}

impl LoadCodeAssistResponse {
    fn project_id(&self) -> Option<String> {
        self.cloudaicompanion_project
            .clone()
            .or_else(|| self.project.clone())
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnboardUserResponse {
    #[serde(default)]
    response: Option<OnboardUserInner>,
    #[serde(default)]
    cloudaicompanion_project: Option<ProjectRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnboardUserInner {
    #[serde(default)]
    cloudaicompanion_project: Option<ProjectRef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProjectRef {
    Id(String),
    Object {
        #[serde(default)]
        id: Option<String>,
    },
}

impl ProjectRef {
    fn id(&self) -> Option<String> {
        match self {
            ProjectRef::Id(id) => Some(id.clone()),
            ProjectRef::Object { id } => id.clone(),
        }
        .filter(|id| !id.is_empty())
    }
}

impl OnboardUserResponse {
    fn project_id(&self) -> Option<String> {
        self.response
            .as_ref()
            .and_then(|r| r.cloudaicompanion_project.as_ref())
            .or(self.cloudaicompanion_project.as_ref())
            .and_then(|p| p.id())
    }
}
