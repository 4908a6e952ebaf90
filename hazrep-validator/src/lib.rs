//! Structural validation for generated safety reports.
//!
//! The generation API returns free text that is supposed to be a JSON array
//! of incident cases. Models routinely wrap the JSON in a Markdown code fence
//! and occasionally drop required fields, so everything here is defensive:
//! [`validate`] never panics and never returns an error type — malformed
//! input is an expected outcome, reported as [`Outcome::Invalid`].
//!
//! This crate is pure (no I/O) so it can be unit tested with literal strings.

use serde::{Deserialize, Serialize};

/// Classification of an incident case. Closed enumeration: anything else in
/// the `type` field makes the whole report invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// An incident that actually happened on a comparable site.
    Fact,
    /// An incident inferred by the model.
    #[serde(rename = "AI")]
    Ai,
}

/// A single countermeasure attached to an incident case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Countermeasure {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub assignees: Vec<String>,
}

/// One incident case in a generated report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentCase {
    #[serde(rename = "caseNo")]
    pub case_no: i64,
    #[serde(rename = "caseTitle")]
    pub case_title: String,
    #[serde(rename = "type")]
    pub classification: Classification,
    pub overview: String,
    pub countermeasures: Vec<Countermeasure>,
}

/// A validated safety report: an ordered, non-empty list of incident cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SafetyReport {
    pub cases: Vec<IncidentCase>,
}

/// Result of validating raw generated text.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Valid(SafetyReport),
    Invalid(String),
}

impl Outcome {
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Strip one wrapping Markdown code fence, if present.
///
/// Handles an optional language tag on the opening fence (```` ```json ````).
/// Text without a matching fence pair is returned unchanged (trimmed).
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        // Opening fence without a closing one: leave the input alone.
        return trimmed;
    };
    match rest.split_once('\n') {
        // First line is the (possibly empty) language tag.
        Some((_, body)) => body.trim(),
        None => rest.trim(),
    }
}

/// Validate raw generated text against the report schema.
///
/// Steps: strip a wrapping code fence, parse as JSON, then check the
/// structural requirements serde cannot express (non-empty sequences).
/// Parser failures are folded into [`Outcome::Invalid`].
pub fn validate(raw: &str) -> Outcome {
    let body = strip_code_fence(raw);

    let report: SafetyReport = match serde_json::from_str(body) {
        Ok(report) => report,
        Err(e) => return Outcome::Invalid(format!("report is not valid JSON: {e}")),
    };

    if report.cases.is_empty() {
        return Outcome::Invalid("report contains no cases".into());
    }
    for case in &report.cases {
        if case.countermeasures.is_empty() {
            return Outcome::Invalid(format!(
                "case {} has no countermeasures",
                case.case_no
            ));
        }
    }

    Outcome::Valid(report)
}
