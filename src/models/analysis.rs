use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::AnalysisError;

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 100;

/// Validated compatibility analysis. Only [`validate`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    match_score: u8,
    executive_summary: String,
    strengths: Vec<String>,
    gaps: Vec<String>,
    keywords_found: Vec<String>,
    keywords_missing: Vec<String>,
    suggestions: Vec<String>,
    interview_prep: Vec<String>,
}

impl AnalysisResult {
    pub fn match_score(&self) -> u8 {
        self.match_score
    }

    pub fn executive_summary(&self) -> &str {
        &self.executive_summary
    }

    pub fn strengths(&self) -> &[String] {
        &self.strengths
    }

    pub fn gaps(&self) -> &[String] {
        &self.gaps
    }

    pub fn keywords_found(&self) -> &[String] {
        &self.keywords_found
    }

    pub fn keywords_missing(&self) -> &[String] {
        &self.keywords_missing
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn interview_prep(&self) -> &[String] {
        &self.interview_prep
    }
}

/// Turns untrusted model output into an [`AnalysisResult`].
///
/// Fields are checked in declaration order and the first offending one is
/// reported. List fields may be absent (read as empty) but never of another
/// type.
pub fn validate(raw_text: &str) -> Result<AnalysisResult, AnalysisError> {
    debug!("validating analysis payload ({} chars)", raw_text.len());

    let text = strip_json_fences(raw_text);
    let document: Value = serde_json::from_str(text).map_err(|e| {
        debug!("payload is not JSON: {}", e);
        AnalysisError::MalformedResponse(e.to_string())
    })?;

    let object = document
        .as_object()
        .ok_or_else(|| AnalysisError::schema("<root>", "expected a JSON object"))?;

    Ok(AnalysisResult {
        match_score: match_score(object)?,
        executive_summary: executive_summary(object)?,
        strengths: string_list(object, "strengths")?,
        gaps: string_list(object, "gaps")?,
        keywords_found: string_list(object, "keywordsFound")?,
        keywords_missing: string_list(object, "keywordsMissing")?,
        suggestions: string_list(object, "suggestions")?,
        interview_prep: string_list(object, "interviewPrep")?,
    })
}

fn match_score(object: &Map<String, Value>) -> Result<u8, AnalysisError> {
    const FIELD: &str = "matchScore";

    let value = object
        .get(FIELD)
        .ok_or_else(|| AnalysisError::schema(FIELD, "missing"))?;

    let score = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            // 87.0 is accepted, 87.5 is not
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.is_finite() => f as i64,
                _ => {
                    return Err(AnalysisError::schema(
                        FIELD,
                        format!("expected an integer, got {}", n),
                    ));
                }
            },
        },
        other => {
            return Err(AnalysisError::schema(
                FIELD,
                format!("expected an integer, got {}", type_name(other)),
            ));
        }
    };

    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(AnalysisError::schema(
            FIELD,
            format!("must be between {} and {}, got {}", MIN_SCORE, MAX_SCORE, score),
        ));
    }

    Ok(score as u8)
}

fn executive_summary(object: &Map<String, Value>) -> Result<String, AnalysisError> {
    const FIELD: &str = "executiveSummary";

    match object.get(FIELD) {
        None => Err(AnalysisError::schema(FIELD, "missing")),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(AnalysisError::schema(FIELD, "must not be empty"))
        }
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(AnalysisError::schema(
            FIELD,
            format!("expected a string, got {}", type_name(other)),
        )),
    }
}

fn string_list(object: &Map<String, Value>, field: &str) -> Result<Vec<String>, AnalysisError> {
    let items = match object.get(field) {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(AnalysisError::schema(
                field,
                format!("expected a list of strings, got {}", type_name(other)),
            ));
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(AnalysisError::schema(
                format!("{}[{}]", field, i),
                format!("expected a string, got {}", type_name(other)),
            )),
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));

    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start()),
        None => text,
    }
}
