//! The canonical response and the normalizer that produces it.
//!
//! Connectors translate a vendor reply into a [`ProviderResult`], a
//! provider-shaped list of candidates with optional prompt feedback, and hand
//! it to [`normalize`]. The result is a [`Response`] that is either a success
//! (content, usage, grounding) or a failure (error code and message). Both
//! kinds carry usage. Whether a response is a failure is decided only by the
//! presence of the error fields, see [`Response::is_error`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chat::Content;

/// Error code used when the provider gave nothing to go on
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred.";

const EMPTY_CANDIDATE_MESSAGE: &str = "the model finished without producing any content";
const BLOCKED_PROMPT_MESSAGE: &str = "the prompt was blocked by the provider";

/// The reason why the model stopped generating, in canonical form.
///
/// Connectors map their vendor-specific reasons onto these codes before
/// building a [`Candidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    /// The model generated a stop token or hit a stop sequence
    Stop,
    /// The requested token limit was reached
    MaxTokens,
    /// A safety or content filter was triggered
    Safety,
    /// The model stopped to call a tool
    ToolUse,
    /// Anything else
    Other,
}

/// Resource usage for a single call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// The number of tokens in the prompt
    pub prompt_tokens: u64,
    /// The number of tokens in the completion
    pub completion_tokens: u64,
    /// `prompt_tokens + completion_tokens`, see [`normalize`]
    pub total_tokens: u64,
    /// Wall-clock latency of the call in milliseconds
    pub latency_ms: f64,
    /// Estimated cost in cents, when known
    pub cost_cents: f64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Usage {
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            ..Default::default()
        }
    }

    fn recomputed(self) -> Usage {
        Usage {
            total_tokens: self.prompt_tokens.saturating_add(self.completion_tokens),
            ..self
        }
    }
}

/// A reference to a source document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Start offset of the cited span in the generated text
    #[serde(default)]
    pub start_index: usize,
    /// End offset of the cited span in the generated text
    #[serde(default)]
    pub end_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Confidence in the grounding, between 0 and 1
    #[serde(default)]
    pub score: f64,
}

/// A single completion proposed by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub finish_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<GroundingMetadata>,
}

impl Candidate {
    fn has_content(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Validation or safety feedback about the prompt itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: String,
    #[serde(default)]
    pub block_reason_message: String,
}

/// A reply in the shape providers produce it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage: Usage,
}

/// The provider-agnostic response returned to callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<GroundingMetadata>,

    /// Reserved for streaming: this response is part of an unfinished stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
    /// Reserved for streaming: the turn is complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
    /// Reserved for streaming: generation was interrupted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_metadata: BTreeMap<String, serde_json::Value>,

    pub usage: Usage,
}

impl Response {
    fn failure(code: &str, message: &str, usage: Usage) -> Response {
        let code = if code.is_empty() {
            UNKNOWN_ERROR_CODE
        } else {
            code
        };

        Response {
            error_code: Some(code.to_string()),
            error_message: Some(message.to_string()),
            usage,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some() || self.error_message.is_some()
    }

    /// A human-readable rendering of the failure, if this is one
    pub fn error_text(&self) -> Option<String> {
        match (&self.error_message, &self.error_code) {
            (Some(message), _) => Some(message.clone()),
            (None, Some(code)) => Some(format!("Error: {code}")),
            (None, None) => None,
        }
    }

    /// The generated text, if this is a success
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().map(Content::text)
    }
}

fn or_default<'a>(s: &'a str, default: &'a str) -> &'a str {
    if s.is_empty() {
        default
    } else {
        s
    }
}

/// Collapses a provider-shaped result into a canonical [`Response`].
///
/// Only the first candidate is considered. A candidate without content is
/// reported through its finish reason, a missing candidate through the prompt
/// feedback, and when neither exists the response carries
/// [`UNKNOWN_ERROR_CODE`]. In every case `usage.total_tokens` is recomputed
/// from the prompt and completion counts; the provider's total is ignored.
pub fn normalize(raw: ProviderResult) -> Response {
    let usage = raw.usage.recomputed();

    if let Some(candidate) = raw.candidates.into_iter().next() {
        if candidate.has_content() {
            return Response {
                content: candidate.content,
                grounding: candidate.grounding,
                usage,
                ..Default::default()
            };
        }

        return Response::failure(
            &candidate.finish_reason,
            or_default(&candidate.finish_message, EMPTY_CANDIDATE_MESSAGE),
            usage,
        );
    }

    if let Some(feedback) = raw.prompt_feedback {
        return Response::failure(
            &feedback.block_reason,
            or_default(&feedback.block_reason_message, BLOCKED_PROMPT_MESSAGE),
            usage,
        );
    }

    Response::failure(UNKNOWN_ERROR_CODE, UNKNOWN_ERROR_MESSAGE, usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Part, Role};

    fn usage(prompt: u64, completion: u64, total: u64) -> Usage {
        Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
            latency_ms: 12.5,
            cost_cents: 0.0,
        }
    }

    #[test]
    fn first_candidate_with_content_wins() {
        let grounding = GroundingMetadata {
            citations: vec![Citation {
                source_id: "doc-1".to_string(),
                ..Default::default()
            }],
            score: 0.9,
        };

        let response = normalize(ProviderResult {
            candidates: vec![
                Candidate {
                    content: Some(Content::model("first")),
                    finish_reason: FinishReason::Stop.to_string(),
                    grounding: Some(grounding.clone()),
                    ..Default::default()
                },
                Candidate {
                    content: Some(Content::model("second")),
                    ..Default::default()
                },
            ],
            usage: usage(10, 5, 15),
            ..Default::default()
        });

        assert!(!response.is_error());
        assert_eq!(response.text().as_deref(), Some("first"));
        assert_eq!(response.grounding, Some(grounding));
        assert_eq!(response.usage.total_tokens, 15);
        assert_eq!(response.usage.latency_ms, 12.5);
    }

    #[test]
    fn parts_count_as_content() {
        let mut content = Content::new(Role::Model, "");
        content.parts.push(Part::Data(serde_json::json!({"call": "weather"})));

        let response = normalize(ProviderResult {
            candidates: vec![Candidate {
                content: Some(content),
                ..Default::default()
            }],
            ..Default::default()
        });

        assert!(!response.is_error());
    }

    #[test]
    fn empty_candidate_reports_its_finish_reason() {
        let response = normalize(ProviderResult {
            candidates: vec![Candidate {
                content: Some(Content::model("")),
                finish_reason: "MAX_TOKENS".to_string(),
                finish_message: "the response hit the token limit".to_string(),
                ..Default::default()
            }],
            usage: usage(100, 0, 0),
            ..Default::default()
        });

        assert!(response.is_error());
        assert!(response.content.is_none());
        assert_eq!(response.error_code.as_deref(), Some("MAX_TOKENS"));
        assert_eq!(
            response.error_text().as_deref(),
            Some("the response hit the token limit")
        );
        assert_eq!(response.usage.total_tokens, 100);
    }

    #[test]
    fn blocked_prompt_reports_the_block_reason() {
        let response = normalize(ProviderResult {
            prompt_feedback: Some(PromptFeedback {
                block_reason: "SAFETY".to_string(),
                block_reason_message: String::new(),
            }),
            usage: usage(7, 0, 99),
            ..Default::default()
        });

        assert!(response.is_error());
        assert_eq!(response.error_code.as_deref(), Some("SAFETY"));
        assert_eq!(response.error_message.as_deref(), Some(BLOCKED_PROMPT_MESSAGE));
        assert_eq!(response.usage.total_tokens, 7);
    }

    #[test]
    fn nothing_at_all_is_an_unknown_error() {
        let response = normalize(ProviderResult::default());

        assert_eq!(response.error_code.as_deref(), Some(UNKNOWN_ERROR_CODE));
        assert_eq!(response.error_message.as_deref(), Some(UNKNOWN_ERROR_MESSAGE));
    }

    #[test]
    fn failures_are_never_silently_empty() {
        let response = normalize(ProviderResult {
            candidates: vec![Candidate::default()],
            ..Default::default()
        });

        assert_eq!(response.error_code.as_deref(), Some(UNKNOWN_ERROR_CODE));
        assert_eq!(response.error_message.as_deref(), Some(EMPTY_CANDIDATE_MESSAGE));
    }

    #[test]
    fn provider_totals_are_never_trusted() {
        for (prompt, completion, total) in [(0, 0, 5), (3, 4, 0), (10, 20, 31), (u64::MAX, 1, 2)] {
            let with_candidate = normalize(ProviderResult {
                candidates: vec![Candidate {
                    content: Some(Content::model("ok")),
                    ..Default::default()
                }],
                usage: usage(prompt, completion, total),
                ..Default::default()
            });
            let without = normalize(ProviderResult {
                usage: usage(prompt, completion, total),
                ..Default::default()
            });

            let expected = prompt.saturating_add(completion);
            assert_eq!(with_candidate.usage.total_tokens, expected);
            assert_eq!(without.usage.total_tokens, expected);
        }
    }

    #[test]
    fn error_text_falls_back_to_the_code() {
        let response = Response {
            error_code: Some("SAFETY".to_string()),
            ..Default::default()
        };

        assert!(response.is_error());
        assert_eq!(response.error_text().as_deref(), Some("Error: SAFETY"));
        assert_eq!(Response::default().error_text(), None);
    }

    #[test]
    fn finish_reasons_render_as_codes() {
        assert_eq!(FinishReason::MaxTokens.to_string(), "MAX_TOKENS");
        assert_eq!(FinishReason::ToolUse.to_string(), "TOOL_USE");
    }
}
