//! External skill analyzer (out-of-scope collaborator, spec.md §4.9 step 1
//! and §4.10's background quarantine analysis): static/behavioral review of
//! a skill bundle, returning a vulnerability verdict plus dependency steps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgenShieldError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VulnerabilityLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl VulnerabilityLevel {
    pub fn is_critical(&self) -> bool {
        matches!(self, VulnerabilityLevel::Critical)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub level: VulnerabilityLevel,
    #[serde(default)]
    pub summary: Option<String>,
}

/// A dependency-installation step (e.g. `brew install jq`) the analyzer
/// discovered by reading the skill's manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyStep {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub vulnerability: Vulnerability,
    #[serde(default)]
    pub dependencies: Vec<DependencyStep>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait SkillAnalyzer: Send + Sync {
    async fn analyze(&self, slug: &str, source: &str) -> Result<AnalysisResult>;
}

pub struct HttpSkillAnalyzer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSkillAnalyzer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SkillAnalyzer for HttpSkillAnalyzer {
    async fn analyze(&self, slug: &str, source: &str) -> Result<AnalysisResult> {
        let url = format!("{}/analyze", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "slug": slug, "source": source }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AgenShieldError::transient(
                url,
                format!("analyzer returned {}", response.status()),
            ));
        }

        Ok(response.json().await?)
    }
}
