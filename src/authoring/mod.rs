//! Generator retry loop with validation feedback.
//!
//! Mock and test files can be produced by an external generator (a human,
//! a template, or an LLM-driven process — this crate does not care which).
//! [`generate_with_feedback`] drives a [`ContentGenerator`] callback: each
//! attempt is validated, and while error-level issues remain the next
//! prompt embeds them under a `VALIDATION FEEDBACK` heading so the
//! generator can repair its own output. Warnings alone never trigger a
//! retry.

use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, info};

use crate::validator::{IssueLevel, ValidationIssue, has_errors};

/// Errors a generator callback can report.
#[derive(Debug, Error, Diagnostic)]
pub enum GeneratorError {
    #[error("generation timed out")]
    #[diagnostic(code(stepsim::authoring::timeout))]
    Timeout,

    #[error("generation failed: {0}")]
    #[diagnostic(code(stepsim::authoring::failed))]
    Failed(String),
}

/// The external process that turns a prompt into file content.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Retry behavior for [`generate_with_feedback`].
#[derive(Clone, Debug)]
pub struct RetrySettings {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Per-attempt timeout; unlimited when unset.
    pub timeout: Option<Duration>,
    /// Whether a timed-out attempt is retried instead of aborting.
    pub retry_on_timeout: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: None,
            retry_on_timeout: false,
        }
    }
}

/// Terminal result of the retry loop.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub success: bool,
    pub attempts: u32,
    /// The last generated content, also present on failure so callers can
    /// inspect what the generator produced.
    pub content: Option<String>,
    /// Issues from the last validated attempt.
    pub issues: Vec<ValidationIssue>,
    pub error: Option<String>,
}

/// Drive `generator` until `validate` reports no error-level issues or the
/// attempt budget runs out.
pub async fn generate_with_feedback<G, V>(
    generator: &G,
    base_prompt: &str,
    validate: V,
    settings: &RetrySettings,
) -> GenerationOutcome
where
    G: ContentGenerator + ?Sized,
    V: Fn(&str) -> Vec<ValidationIssue>,
{
    let mut prompt = base_prompt.to_string();
    let mut attempts = 0;
    let mut last_content = None;
    let mut last_issues = Vec::new();

    while attempts < settings.max_attempts {
        attempts += 1;
        debug!(attempt = attempts, "invoking generator");

        let generated = match settings.timeout {
            Some(limit) => match tokio::time::timeout(limit, generator.generate(&prompt)).await {
                Ok(result) => result,
                Err(_) => Err(GeneratorError::Timeout),
            },
            None => generator.generate(&prompt).await,
        };

        match generated {
            Ok(content) => {
                let issues = validate(&content);
                if !has_errors(&issues) {
                    info!(attempt = attempts, "generation validated cleanly");
                    return GenerationOutcome {
                        success: true,
                        attempts,
                        content: Some(content),
                        issues,
                        error: None,
                    };
                }
                info!(
                    attempt = attempts,
                    errors = issues
                        .iter()
                        .filter(|issue| issue.level == IssueLevel::Error)
                        .count(),
                    "generation has validation errors"
                );
                prompt = compose_feedback_prompt(base_prompt, &issues);
                last_content = Some(content);
                last_issues = issues;
            }
            Err(GeneratorError::Timeout)
                if settings.retry_on_timeout && attempts < settings.max_attempts =>
            {
                info!(attempt = attempts, "generation timed out, retrying");
            }
            Err(err) => {
                return GenerationOutcome {
                    success: false,
                    attempts,
                    content: last_content,
                    issues: last_issues,
                    error: Some(err.to_string()),
                };
            }
        }
    }

    GenerationOutcome {
        success: false,
        attempts,
        content: last_content,
        issues: last_issues,
        error: Some(format!(
            "validation errors remained after {attempts} attempts"
        )),
    }
}

/// The base prompt plus the remaining error-level issues, so the generator
/// repairs rather than regresses.
fn compose_feedback_prompt(base_prompt: &str, issues: &[ValidationIssue]) -> String {
    let mut prompt = String::from(base_prompt);
    prompt.push_str("\n\nVALIDATION FEEDBACK\n");
    prompt.push_str("The previous attempt failed validation with these issues:\n");
    for issue in issues {
        if issue.level != IssueLevel::Error {
            continue;
        }
        prompt.push_str("- ");
        prompt.push_str(&issue.message);
        if let Some(suggestion) = &issue.suggestion {
            prompt.push_str(" (");
            prompt.push_str(suggestion);
            prompt.push(')');
        }
        prompt.push('\n');
    }
    prompt.push_str(
        "\nRegenerate the complete file, fixing every issue above while keeping the parts \
         that were already correct.",
    );
    prompt
}
