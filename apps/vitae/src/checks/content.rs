//! Content critique — asks the LLM to review the profile's texts.
//!
//! Input is the structured export of the profile (name, title, sections),
//! not the rendered artifact, so layout markup never reaches the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::prompts::{CRITIQUE_PROMPT_TEMPLATE, CRITIQUE_SYSTEM};
use super::{CheckInput, Finding, FindingSource, QualityCheck};
use crate::errors::BuildError;
use crate::llm_client::LlmClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemKind {
    Recommendation,
    Readability,
    Grammar,
    #[serde(alias = "Bravity")]
    Brevity,
}

/// One problem reported by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueProblem {
    pub path: String,
    pub problem: ProblemKind,
    pub recommendation: String,
    #[serde(default)]
    pub revised: Option<String>,
}

impl CritiqueProblem {
    fn to_finding(&self) -> Finding {
        let mut message = format!(
            "{:?} issue in {}: {}",
            self.problem, self.path, self.recommendation
        );
        if let Some(revised) = self.revised.as_deref().filter(|r| !r.trim().is_empty()) {
            message.push_str(&format!(" (suggested: \"{revised}\")"));
        }
        Finding::warning(FindingSource::Content, message)
    }
}

pub struct ContentCritique {
    llm: LlmClient,
}

impl ContentCritique {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

pub fn build_prompt(profile_json: &str) -> String {
    CRITIQUE_PROMPT_TEMPLATE.replace("{profile_json}", profile_json)
}

#[async_trait]
impl QualityCheck for ContentCritique {
    fn name(&self) -> &str {
        "Content"
    }

    fn source(&self) -> FindingSource {
        FindingSource::Content
    }

    async fn check(&self, input: &CheckInput<'_>) -> Result<Vec<Finding>, BuildError> {
        let Some(data) = input.data else {
            return Ok(Vec::new());
        };
        let profile_json = serde_json::to_string(&data.export()).map_err(|e| {
            BuildError::CheckUnavailable {
                check: self.name().to_string(),
                reason: format!("cannot serialize profile: {e}"),
            }
        })?;

        info!("[{}] Requesting content critique (this may take a while)", input.id);
        let problems: Vec<CritiqueProblem> = self
            .llm
            .call_json(&build_prompt(&profile_json), CRITIQUE_SYSTEM)
            .await
            .map_err(|e| BuildError::CheckUnavailable {
                check: self.name().to_string(),
                reason: e.to_string(),
            })?;

        Ok(problems.iter().map(CritiqueProblem::to_finding).collect())
    }
}
