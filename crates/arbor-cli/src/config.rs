//! Environment-derived runtime configuration.

use anyhow::{bail, Context, Result};

const DEFAULT_API_VERSION: &str = "2024-12-01-preview";
const DEFAULT_MCP_BASE_URL: &str = "http://localhost:8000/mcp/sse";
const DEFAULT_WORKSPACE_DIR: &str = "/home/pan/workspace";

/// Validated settings for one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub azure_api_key: String,
    /// Azure resource endpoint with any trailing slash removed.
    pub azure_endpoint: String,
    pub azure_deployment: String,
    pub azure_api_version: String,
    pub mcp_base_url: String,
    pub project_name: Option<String>,
    pub workspace_dir: String,
}

impl RunConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary lookup so validation is testable
    /// without mutating process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let azure_api_key =
            get("AZURE_OPENAI_API_KEY").context("AZURE_OPENAI_API_KEY must be set")?;
        let azure_endpoint =
            get("AZURE_OPENAI_ENDPOINT").context("AZURE_OPENAI_ENDPOINT must be set")?;
        if !azure_endpoint.starts_with("https://") {
            bail!("AZURE_OPENAI_ENDPOINT must start with 'https://'");
        }
        let azure_deployment =
            get("AZURE_OPENAI_DEPLOYMENT").context("AZURE_OPENAI_DEPLOYMENT must be set")?;
        let azure_api_version =
            get("AZURE_OPENAI_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let mcp_base_url = get("MCP_BASE_URL").unwrap_or_else(|| DEFAULT_MCP_BASE_URL.to_string());
        if !mcp_base_url.starts_with("http://") && !mcp_base_url.starts_with("https://") {
            bail!("MCP_BASE_URL must be a valid HTTP/HTTPS URL");
        }

        Ok(Self {
            azure_api_key,
            azure_endpoint: azure_endpoint.trim_end_matches('/').to_string(),
            azure_deployment,
            azure_api_version,
            mcp_base_url,
            project_name: get("PROJECT_NAME"),
            workspace_dir: get("WORKSPACE_DIR")
                .unwrap_or_else(|| DEFAULT_WORKSPACE_DIR.to_string()),
        })
    }

    /// Full completion endpoint base for the configured deployment.
    pub fn completion_api_base(&self) -> String {
        format!(
            "{}/openai/deployments/{}",
            self.azure_endpoint, self.azure_deployment
        )
    }
}
