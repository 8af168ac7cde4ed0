use tutor_providers::llm::{ChatMessage, CompleteOptions, Role};
use tutor_providers::router::LlmRouter;

use crate::error::{IngestError, Result};
use crate::types::SynthesisedCourse;

const MAX_SCHEMA_RETRIES: u32 = 2;

const SYSTEM_PROMPT: &str = "You design course curricula from source material. \
Given the extracted text of one or more documents, produce a JSON object with \
fields: title, description, modules (array of {week, title, description, \
objectives, topics}), topics (array of {order_index, title, content, \
estimated_duration_minutes}). `week` values must be 1..N with no gaps; each \
module's `order_index` values must be 1..M with no gaps. Respond with JSON only.";

/// Ask the LLM to turn extracted corpus text into a course structure,
/// retrying on schema violations up to `MAX_SCHEMA_RETRIES` times before
/// giving up (§4.3 "LLM schema violation -> retry up to 2 then fail").
pub async fn synthesise_course(llm: &LlmRouter, corpus_text: &str) -> Result<SynthesisedCourse> {
    let messages = vec![
        ChatMessage {
            role: Role::System,
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: Role::User,
            content: corpus_text.to_string(),
        },
    ];

    let mut last_violation: Option<String> = None;

    for attempt in 0..=MAX_SCHEMA_RETRIES {
        let response = llm
            .complete(&messages, &CompleteOptions::default())
            .await
            .map_err(|e| IngestError::Transient(e.to_string()))?;

        match parse_and_validate(&response.content) {
            Ok(course) => return Ok(course),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "curriculum synthesis failed schema validation");
                last_violation = Some(e.to_string());
            }
        }
    }

    Err(IngestError::SchemaViolation {
        reason: last_violation.unwrap_or_else(|| "no valid response produced".to_string()),
    })
}

fn parse_and_validate(raw: &str) -> Result<SynthesisedCourse> {
    let json = extract_json_object(raw);
    let course: SynthesisedCourse = serde_json::from_str(json).map_err(|e| IngestError::SchemaViolation { reason: e.to_string() })?;
    course.validate()?;
    Ok(course)
}

/// Models sometimes wrap JSON in prose or a fenced code block; take the
/// outermost `{...}` span rather than failing on the surrounding text.
fn extract_json_object(raw: &str) -> &str {
    let start = raw.find('{');
    let end = raw.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &raw[s..=e],
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_object_strips_surrounding_prose() {
        let raw = "Here is the course:\n```json\n{\"title\":\"x\"}\n```\nEnjoy!";
        assert_eq!(extract_json_object(raw), "{\"title\":\"x\"}");
    }

    #[test]
    fn parse_and_validate_rejects_malformed_json() {
        assert!(parse_and_validate("not json at all").is_err());
    }

    #[test]
    fn parse_and_validate_accepts_well_formed_course() {
        let raw = r#"{
            "title": "Intro",
            "description": "desc",
            "modules": [
                {
                    "week": 1,
                    "title": "Week 1",
                    "description": "desc",
                    "objectives": [],
                    "topics": [
                        {"order_index": 1, "title": "T1", "content": "c", "estimated_duration_minutes": null}
                    ]
                }
            ]
        }"#;
        assert!(parse_and_validate(raw).is_ok());
    }
}
