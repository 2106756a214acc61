use log::debug;
use serde_json::{Value, json};

use crate::models::draft::SubmissionDraft;

/// Bumped whenever the instruction or response schema changes.
pub const PROMPT_VERSION: &str = "match-analysis/v1";

const SYSTEM_PROMPT: &str = include_str!("system_prompt.txt");

pub const RESPONSE_MIME_TYPE: &str = "application/json";

/// One analysis call as the service will see it. Built fresh for every submission.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub system_instruction: String,
    pub user_prompt: String,
    pub temperature: f32,
}

impl AnalysisRequest {
    /// Renders the Gemini `generateContent` request body.
    pub fn to_body(&self) -> Value {
        json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": self.user_prompt }]
                }
            ],
            "systemInstruction": {
                "parts": [{ "text": self.system_instruction }]
            },
            "generationConfig": {
                "temperature": self.temperature,
                "responseMimeType": RESPONSE_MIME_TYPE,
                "responseJsonSchema": response_schema()
            }
        })
    }
}

pub struct PromptBuilder {
    temperature: f32,
}

impl PromptBuilder {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    pub fn build(&self, draft: &SubmissionDraft) -> AnalysisRequest {
        let user_prompt = format!(
            "RESUME:\n{}\n\nJOB DESCRIPTION:\n{}\n",
            draft.resume_text, draft.job_description_text
        );
        debug!(
            "built {} prompt ({} chars)",
            PROMPT_VERSION,
            user_prompt.len()
        );

        AnalysisRequest {
            system_instruction: format!("[{}]\n{}", PROMPT_VERSION, SYSTEM_PROMPT),
            user_prompt,
            temperature: self.temperature,
        }
    }
}

fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "matchScore": {
                "type": "integer",
                "minimum": 0,
                "maximum": 100,
                "description": "Overall fit of the resume for the role, 0-100"
            },
            "executiveSummary": { "type": "string" },
            "strengths": string_list(),
            "gaps": string_list(),
            "keywordsFound": string_list(),
            "keywordsMissing": string_list(),
            "suggestions": string_list(),
            "interviewPrep": string_list()
        },
        "required": [
            "matchScore",
            "executiveSummary",
            "strengths",
            "gaps",
            "keywordsFound",
            "keywordsMissing",
            "suggestions",
            "interviewPrep"
        ]
    })
}

fn string_list() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}
