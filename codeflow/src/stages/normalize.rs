//! Folds raw capability responses into [`Outcome`]s.
//!
//! Responses are JSON objects tagged by a `status` field. A missing or
//! unknown status, or a field of the wrong type, is a fatal
//! `malformed response`.

use crate::core::{Artifact, Outcome};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

const MALFORMED: &str = "malformed response";

fn parse<T: DeserializeOwned>(capability: &str, value: Value) -> Result<T, Outcome> {
    serde_json::from_value(value)
        .map_err(|e| Outcome::fatal(format!("{MALFORMED} from {capability}: {e}")))
}

fn fenced_block() -> Option<&'static Regex> {
    static FENCED: OnceLock<Option<Regex>> = OnceLock::new();
    FENCED
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

fn score_pattern() -> Option<&'static Regex> {
    static SCORE: OnceLock<Option<Regex>> = OnceLock::new();
    SCORE
        .get_or_init(|| Regex::new(r"(?i)score[:\s]+(\d+(?:\.\d+)?)\s*/\s*10").ok())
        .as_ref()
}

/// Returns the code inside the first fenced block, or the trimmed text when
/// there is no fence.
#[must_use]
pub fn extract_code(text: &str) -> String {
    fenced_block()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| text.trim(), |m| m.as_str().trim_end())
        .to_string()
}

#[derive(Deserialize)]
#[serde(tag = "status")]
enum GenerateResponse {
    #[serde(rename = "success")]
    Success {
        code: String,
        #[serde(default)]
        explanation: Option<String>,
        #[serde(default)]
        dependencies: Vec<String>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

/// Normalizes a generation response into an outcome carrying the new artifact.
pub fn generation(value: Value, produced_by: &str) -> Outcome {
    let response: GenerateResponse = match parse("generate", value) {
        Ok(response) => response,
        Err(outcome) => return outcome,
    };

    match response {
        GenerateResponse::Success {
            code,
            explanation,
            dependencies,
        } => {
            let code = extract_code(&code);
            if code.trim().is_empty() {
                return Outcome::soft_failure(vec!["generator returned no code".to_string()]);
            }
            let artifact = Artifact::new(code, produced_by).with_dependencies(dependencies);
            let outcome = Outcome::success(artifact);
            match explanation {
                Some(text) if !text.trim().is_empty() => {
                    outcome.with_metadata("explanation", Value::String(text))
                }
                _ => outcome,
            }
        }
        GenerateResponse::Error { error } => Outcome::soft_failure(vec![
            error.unwrap_or_else(|| "generation failed without details".to_string()),
        ]),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SyntaxFinding {
    Detailed {
        #[serde(default)]
        line: Option<u64>,
        issue: String,
        #[serde(default)]
        fix: Option<String>,
    },
    Text(String),
}

impl SyntaxFinding {
    fn render(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Detailed { line, issue, fix } => {
                let mut rendered = match line {
                    Some(line) => format!("Line {line}: {issue}"),
                    None => issue,
                };
                if let Some(fix) = fix.filter(|f| !f.trim().is_empty()) {
                    rendered.push_str(&format!(" (fix: {fix})"));
                }
                rendered
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "status")]
enum SyntaxResponse {
    #[serde(rename = "SYNTAX_VALID", alias = "valid")]
    Valid {},
    #[serde(rename = "SYNTAX_ERROR", alias = "errors")]
    Invalid {
        #[serde(default)]
        errors: Vec<SyntaxFinding>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        corrected_code: Option<String>,
    },
    #[serde(rename = "PARSE_FAILED")]
    ParseFailed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        errors: Vec<SyntaxFinding>,
    },
}

/// Normalizes a syntax-check response.
///
/// A non-blank `corrected_code` on a syntax error becomes the outcome's
/// correction, attributed to `check_syntax`.
pub fn syntax(value: Value) -> Outcome {
    let response: SyntaxResponse = match parse("check_syntax", value) {
        Ok(response) => response,
        Err(outcome) => return outcome,
    };

    match response {
        SyntaxResponse::Valid {} => Outcome::accepted(),
        SyntaxResponse::Invalid {
            errors,
            message,
            corrected_code,
        } => {
            let mut details: Vec<String> = errors.into_iter().map(SyntaxFinding::render).collect();
            if details.is_empty() {
                details.push(message.unwrap_or_else(|| "syntax errors reported without details".to_string()));
            }
            match corrected_code.map(|code| extract_code(&code)) {
                Some(code) if !code.trim().is_empty() => {
                    Outcome::corrected(details, Artifact::new(code, "check_syntax"))
                }
                _ => Outcome::soft_failure(details),
            }
        }
        SyntaxResponse::ParseFailed { message, errors } => {
            let reason = message
                .or_else(|| errors.into_iter().next().map(SyntaxFinding::render))
                .unwrap_or_else(|| "syntax checker could not parse the code".to_string());
            Outcome::fatal(reason)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReferenceFinding {
    Detailed {
        #[serde(default, rename = "type")]
        kind: Option<String>,
        referenced: String,
        #[serde(default)]
        issue: Option<String>,
        #[serde(default)]
        suggestion: Option<String>,
    },
    Text(String),
}

impl ReferenceFinding {
    fn render(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Detailed {
                kind,
                referenced,
                issue,
                suggestion,
            } => {
                let kind = kind.unwrap_or_else(|| "Reference".to_string());
                let issue = issue.unwrap_or_else(|| "does not exist".to_string());
                let mut rendered = format!("{kind} '{referenced}': {issue}");
                if let Some(suggestion) = suggestion.filter(|s| !s.trim().is_empty()) {
                    rendered.push_str(&format!(" (suggestion: {suggestion})"));
                }
                rendered
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "status")]
enum ReferenceResponse {
    #[serde(rename = "VERIFIED")]
    Verified {},
    #[serde(rename = "PARTIALLY_VERIFIED")]
    PartiallyVerified {
        #[serde(default)]
        notes: Vec<String>,
    },
    #[serde(rename = "HALLUCINATION_DETECTED", alias = "flagged")]
    Flagged {
        #[serde(default, alias = "flagged")]
        hallucinations: Vec<ReferenceFinding>,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(rename = "VERIFICATION_FAILED")]
    Failed {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Normalizes a reference-verification response.
pub fn references(value: Value) -> Outcome {
    let response: ReferenceResponse = match parse("check_references", value) {
        Ok(response) => response,
        Err(outcome) => return outcome,
    };

    match response {
        ReferenceResponse::Verified {} => Outcome::accepted(),
        ReferenceResponse::PartiallyVerified { notes } => Outcome::accepted_with_notes(notes),
        ReferenceResponse::Flagged {
            hallucinations,
            message,
        } => {
            let mut details: Vec<String> = hallucinations
                .into_iter()
                .map(ReferenceFinding::render)
                .collect();
            if details.is_empty() {
                details.push(message.unwrap_or_else(|| "unverified references reported without details".to_string()));
            }
            Outcome::soft_failure(details)
        }
        ReferenceResponse::Failed { message } => Outcome::fatal(
            message.unwrap_or_else(|| "reference verification failed".to_string()),
        ),
    }
}

#[derive(Deserialize)]
#[serde(tag = "status")]
enum ReviewResponse {
    #[serde(rename = "success")]
    Success {
        #[serde(default, alias = "raw_review")]
        review: Option<String>,
        #[serde(default)]
        summary: Option<String>,
        #[serde(default)]
        score: Option<f64>,
        #[serde(default)]
        critical_issues: Vec<Value>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

/// Normalizes a review response. Review text becomes a note; the score and
/// critical issues, when present, become metadata.
pub fn review(value: Value) -> Outcome {
    let response: ReviewResponse = match parse("review", value) {
        Ok(response) => response,
        Err(outcome) => return outcome,
    };

    match response {
        ReviewResponse::Success {
            review,
            summary,
            score,
            critical_issues,
        } => {
            let Some(text) = review.or(summary).filter(|t| !t.trim().is_empty()) else {
                return Outcome::soft_failure(vec!["reviewer returned no review text".to_string()]);
            };

            let score = score.or_else(|| {
                score_pattern()
                    .and_then(|re| re.captures(&text))
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<f64>().ok())
            });

            let mut outcome = Outcome::accepted_with_notes(vec![text]);
            if let Some(score) = score {
                outcome = outcome.with_metadata("score", serde_json::json!(score));
            }
            if !critical_issues.is_empty() {
                outcome = outcome.with_metadata("critical_issues", Value::Array(critical_issues));
            }
            outcome
        }
        ReviewResponse::Error { error } => Outcome::soft_failure(vec![
            error.unwrap_or_else(|| "review failed without details".to_string()),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutcomeKind;
    use serde_json::json;

    #[test]
    fn test_extract_code_from_fence() {
        let text = "Here you go:\n```python\ndef add(a, b):\n    return a + b\n```\nDone.";
        assert_eq!(extract_code(text), "def add(a, b):\n    return a + b");
        assert_eq!(extract_code("  x = 1  \n"), "x = 1");
    }

    #[test]
    fn test_generation_success() {
        let outcome = generation(
            json!({"status": "success", "code": "x = 1", "dependencies": ["numpy"], "explanation": "sets x"}),
            "generate",
        );
        match outcome {
            Outcome::Success { artifact: Some(artifact), metadata, .. } => {
                assert_eq!(artifact.content, "x = 1");
                assert_eq!(artifact.produced_by, "generate");
                assert_eq!(artifact.dependencies, vec!["numpy".to_string()]);
                assert_eq!(metadata.get("explanation"), Some(&json!("sets x")));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_generation_error_and_empty_code_are_soft() {
        let outcome = generation(json!({"status": "error", "error": "rate limited"}), "generate");
        assert_eq!(outcome, Outcome::soft_failure(vec!["rate limited".into()]));

        let outcome = generation(json!({"status": "success", "code": "   "}), "generate");
        assert_eq!(outcome.kind(), OutcomeKind::SoftFailure);
    }

    #[test]
    fn test_syntax_shapes() {
        assert!(syntax(json!({"status": "SYNTAX_VALID", "message": "ok", "summary": {}})).is_success());
        assert!(syntax(json!({"status": "valid"})).is_success());

        let outcome = syntax(json!({
            "status": "SYNTAX_ERROR",
            "errors": [
                {"line": 3, "issue": "expected ':'", "fix": "add a colon"},
                "unexpected indent"
            ]
        }));
        assert_eq!(
            outcome.error_details(),
            vec![
                "Line 3: expected ':' (fix: add a colon)".to_string(),
                "unexpected indent".to_string()
            ]
        );

        let outcome = syntax(json!({
            "status": "SYNTAX_ERROR",
            "errors": [{"line": 1, "issue": "expected ':'"}],
            "corrected_code": "def f():\n    pass\n"
        }));
        match &outcome {
            Outcome::SoftFailure { details, correction } => {
                assert_eq!(details, &vec!["Line 1: expected ':'".to_string()]);
                let correction = correction.as_ref().unwrap();
                assert_eq!(correction.content, "def f():\n    pass");
                assert_eq!(correction.produced_by, "check_syntax");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let blank = syntax(json!({"status": "SYNTAX_ERROR", "errors": ["bad"], "corrected_code": "  "}));
        assert_eq!(blank, Outcome::soft_failure(vec!["bad".into()]));

        let outcome = syntax(json!({"status": "PARSE_FAILED", "message": "binary input"}));
        assert_eq!(outcome, Outcome::fatal("binary input"));
    }

    #[test]
    fn test_reference_shapes() {
        assert!(references(json!({"status": "VERIFIED"})).is_success());

        let partial = references(json!({"status": "PARTIALLY_VERIFIED", "notes": ["could not reach index"]}));
        assert_eq!(partial, Outcome::accepted_with_notes(vec!["could not reach index".into()]));

        let flagged = references(json!({
            "status": "HALLUCINATION_DETECTED",
            "hallucinations": [{
                "type": "Library",
                "referenced": "fastjsonx",
                "issue": "not on PyPI",
                "suggestion": "use json"
            }]
        }));
        assert_eq!(
            flagged.error_details(),
            vec!["Library 'fastjsonx': not on PyPI (suggestion: use json)".to_string()]
        );

        let alias = references(json!({"status": "flagged", "flagged": ["foo.bar"]}));
        assert_eq!(alias.error_details(), vec!["foo.bar".to_string()]);

        let failed = references(json!({"status": "VERIFICATION_FAILED", "message": "syntax error"}));
        assert_eq!(failed.kind(), OutcomeKind::Fatal);
    }

    #[test]
    fn test_review_shapes() {
        let outcome = review(json!({"status": "success", "raw_review": "Solid.\nScore: 8/10"}));
        match outcome {
            Outcome::Success { artifact, notes, metadata } => {
                assert!(artifact.is_none());
                assert_eq!(notes, vec!["Solid.\nScore: 8/10".to_string()]);
                assert_eq!(metadata.get("score"), Some(&json!(8.0)));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let outcome = review(json!({"status": "error", "error": "model unavailable"}));
        assert_eq!(outcome.kind(), OutcomeKind::SoftFailure);
    }

    #[test]
    fn test_malformed_responses_are_fatal() {
        for value in [
            json!({"code": "x = 1"}),
            json!({"status": "MAYBE"}),
            json!({"status": "success", "code": 42}),
            json!("not an object"),
        ] {
            let outcome = generation(value, "generate");
            assert_eq!(outcome.kind(), OutcomeKind::Fatal);
            assert!(outcome.error_details()[0].starts_with("malformed response"));
        }
        assert_eq!(syntax(json!({})).kind(), OutcomeKind::Fatal);
        assert_eq!(references(json!({"status": 1})).kind(), OutcomeKind::Fatal);
        assert_eq!(review(json!(null)).kind(), OutcomeKind::Fatal);
    }
}
