//! Consensus failure diagnosis.
//!
//! A single classification from a sampling model is noisy. The diagnoser asks
//! the same question several times at rising temperatures and lets the
//! classifications vote.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DiagnosisConfig, DiagnosisResult, FailureClassification, GenerationContext, Node,
};
use crate::domain::ports::{Diagnoser, LlmGateway, LlmRequest};
use crate::services::llm_response::{extract_json, strip_code_fences};

const SYSTEM_PROMPT: &str = "You diagnose failing test runs for generated code. \
Decide whether the implementation is wrong (implementation_bug), the tests are wrong (test_bug), \
or the failure comes from the execution environment (environment). \
Respond with a single JSON object: \
{\"classification\": \"implementation_bug|test_bug|environment\", \
\"fixed_code\": \"<full corrected implementation or test file, empty for environment>\", \
\"explanation\": \"<one paragraph>\"}";

/// One round's classification and proposed fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisVote {
    pub classification: FailureClassification,
    pub fixed_code: String,
    pub explanation: String,
}

impl DiagnosisVote {
    fn fail_safe(round: u32, error: &DomainError) -> Self {
        Self {
            classification: FailureClassification::ImplementationBug,
            fixed_code: String::new(),
            explanation: format!("diagnosis round {round} failed: {error}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VotePayload {
    classification: String,
    #[serde(default)]
    fixed_code: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Parse one model response into a vote.
///
/// Structured JSON is tried first. Otherwise the text is scanned for
/// `test_bug` or `environment`, and anything else counts as an
/// implementation bug.
pub fn parse_vote(response: &str) -> DiagnosisVote {
    let stripped = strip_code_fences(response);

    if let Ok(payload) = serde_json::from_str::<VotePayload>(&extract_json(&stripped)) {
        if let Some(classification) = FailureClassification::parse(&payload.classification) {
            return DiagnosisVote {
                classification,
                fixed_code: payload
                    .fixed_code
                    .map(|code| strip_code_fences(&code))
                    .unwrap_or_default(),
                explanation: payload.explanation.unwrap_or_default().trim().to_string(),
            };
        }
    }

    let lowered = stripped.to_ascii_lowercase();
    let classification = if lowered.contains("test_bug") {
        FailureClassification::TestBug
    } else if lowered.contains("environment") {
        FailureClassification::Environment
    } else {
        FailureClassification::ImplementationBug
    };
    DiagnosisVote {
        classification,
        fixed_code: String::new(),
        explanation: stripped,
    }
}

/// Plurality winner; ties go to the classification seen first.
pub fn tally_votes(votes: &[DiagnosisVote]) -> Option<FailureClassification> {
    let mut counts: Vec<(FailureClassification, usize)> = Vec::with_capacity(3);
    for vote in votes {
        match counts.iter_mut().find(|(c, _)| *c == vote.classification) {
            Some((_, n)) => *n += 1,
            None => counts.push((vote.classification, 1)),
        }
    }

    let mut best: Option<(FailureClassification, usize)> = None;
    for (classification, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((classification, count));
        }
    }
    best.map(|(classification, _)| classification)
}

/// Among votes for `winner`, prefer code plus explanation, then code, then
/// the first one.
fn select_fix(votes: &[DiagnosisVote], winner: FailureClassification) -> Option<&DiagnosisVote> {
    let all: Vec<&DiagnosisVote> = votes.iter().filter(|v| v.classification == winner).collect();
    all.iter()
        .find(|v| !v.fixed_code.trim().is_empty() && !v.explanation.trim().is_empty())
        .or_else(|| all.iter().find(|v| !v.fixed_code.trim().is_empty()))
        .or_else(|| all.first())
        .copied()
}

/// Diagnoser that resolves several independent LLM classifications by vote.
pub struct MajorityVoteDiagnoser {
    gateway: Arc<dyn LlmGateway>,
    config: DiagnosisConfig,
}

impl MajorityVoteDiagnoser {
    pub fn new(gateway: Arc<dyn LlmGateway>, config: DiagnosisConfig) -> Self {
        Self { gateway, config }
    }

    /// Temperature of 0-based round `round`.
    #[allow(clippy::cast_precision_loss)]
    pub fn temperature_for_round(&self, round: u32) -> f32 {
        self.config.base_temperature + self.config.temperature_step * round as f32
    }

    fn build_prompt(
        node: &Node,
        implementation: &str,
        test_code: &str,
        error_output: &str,
        context: &GenerationContext,
    ) -> String {
        let mut prompt = format!("## Target\n{}", node.name);
        if let Some(signature) = &node.signature {
            prompt.push_str(&format!("\nSignature: {signature}"));
        }
        if let Some(docstring) = &node.docstring {
            prompt.push_str(&format!("\nDescription: {docstring}"));
        }
        prompt.push_str(&format!(
            "\n\n## Upstream code\n{}\n\n## Implementation\n```\n{}\n```\n\n## Tests\n```\n{}\n```\n\n## Failure output\n```\n{}\n```",
            context.render(),
            implementation.trim_end(),
            test_code.trim_end(),
            error_output.trim_end(),
        ));
        prompt
    }

    /// Collect one vote per round, in round order.
    pub async fn collect_votes(&self, prompt: &str) -> Vec<DiagnosisVote> {
        let mut votes = Vec::with_capacity(self.config.rounds as usize);
        for round in 0..self.config.rounds {
            let request = LlmRequest::new(prompt)
                .with_system(SYSTEM_PROMPT)
                .with_temperature(self.temperature_for_round(round));
            let vote = match self.gateway.complete(request).await {
                Ok(response) => parse_vote(&response),
                Err(err) => {
                    warn!(round, gateway = self.gateway.name(), error = %err, "diagnosis round failed");
                    DiagnosisVote::fail_safe(round, &err)
                }
            };
            debug!(round, classification = %vote.classification, "diagnosis vote");
            votes.push(vote);
        }
        votes
    }
}

#[async_trait]
impl Diagnoser for MajorityVoteDiagnoser {
    #[instrument(skip_all, fields(node_id = %node.id, rounds = self.config.rounds))]
    async fn diagnose_and_fix(
        &self,
        node: &Node,
        implementation: &str,
        test_code: &str,
        error_output: &str,
        context: &GenerationContext,
    ) -> DomainResult<DiagnosisResult> {
        let prompt = Self::build_prompt(node, implementation, test_code, error_output, context);
        let votes = self.collect_votes(&prompt).await;

        let winner = tally_votes(&votes)
            .ok_or_else(|| DomainError::Diagnosis("no diagnosis rounds configured".to_string()))?;
        let chosen = select_fix(&votes, winner)
            .ok_or_else(|| DomainError::Diagnosis("winning vote missing".to_string()))?;
        let agreeing = votes.iter().filter(|v| v.classification == winner).count();
        info!(classification = %winner, agreeing, total = votes.len(), "diagnosis consensus");

        let fixed_code = Some(chosen.fixed_code.clone()).filter(|code| !code.trim().is_empty());
        Ok(DiagnosisResult {
            classification: winner,
            fixed_implementation: fixed_code
                .clone()
                .filter(|_| winner == FailureClassification::ImplementationBug),
            fixed_test_code: fixed_code.filter(|_| winner == FailureClassification::TestBug),
            explanation: chosen.explanation.clone(),
        })
    }
}
