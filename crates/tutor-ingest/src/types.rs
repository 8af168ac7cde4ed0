use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// One uploaded file in a batch (§4.3 "a single ingest task may cover
/// several source files").
#[derive(Debug, Clone)]
pub struct IngestFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Caller-supplied framing for the course this batch produces or extends.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub owner_id: String,
    pub course_id: Option<String>,
    pub title: String,
    pub language: String,
    pub country: String,
    pub files: Vec<IngestFile>,
    /// Whether to run the optional per-topic content-expansion stage
    /// (§4.3 "content-expansion (optional, per-topic LLM expansion
    /// grounded in top-K retrieval)").
    pub expand_content: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Extract,
    Chunk,
    Embed,
    IndexUpsert,
    CurriculumSynthesis,
    ContentExpansion,
    Persist,
}

impl IngestStage {
    /// Coarse progress band each stage occupies, for `progress_percent`
    /// reporting (§4.2 "heartbeat carries a percent and a message").
    pub fn progress_band(&self) -> (u8, u8) {
        match self {
            IngestStage::Extract => (0, 15),
            IngestStage::Chunk => (15, 25),
            IngestStage::Embed => (25, 45),
            IngestStage::IndexUpsert => (45, 55),
            IngestStage::CurriculumSynthesis => (55, 75),
            IngestStage::ContentExpansion => (75, 90),
            IngestStage::Persist => (90, 100),
        }
    }
}

/// A pending chunk prior to embedding/persistence — carries enough
/// provenance to become a `tutor_drs::types::DocumentChunk` once a
/// `chunk_id` and course/module/topic linkage are assigned.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub document_id: String,
    pub page: Option<i64>,
    pub char_start: i64,
    pub char_end: i64,
    pub text: String,
}

/// Curriculum structure synthesised by the LLM from the extracted corpus
/// (§4.3 stage "curriculum-synthesis"). Mirrors `tutor_drs::types::{Course,
/// Module, Topic}` but without ids, which are assigned at persist time.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisedCourse {
    pub title: String,
    pub description: String,
    pub modules: Vec<SynthesisedModule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisedModule {
    pub week: i64,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    pub topics: Vec<SynthesisedTopic>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisedTopic {
    pub order_index: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub estimated_duration_minutes: Option<i64>,
}

impl SynthesisedCourse {
    /// Structural validation before it's trusted enough to persist (§4.3
    /// "LLM schema violation -> retry up to 2 then fail"). Checks gapless,
    /// unique week/order_index numbering, matching the DRS's own `UNIQUE`
    /// constraints so a later insert can't fail on a structure we already
    /// accepted here.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.title.trim().is_empty() {
            return Err(IngestError::SchemaViolation {
                reason: "course title is empty".to_string(),
            });
        }
        if self.modules.is_empty() {
            return Err(IngestError::SchemaViolation {
                reason: "course has no modules".to_string(),
            });
        }

        let mut weeks: Vec<i64> = self.modules.iter().map(|m| m.week).collect();
        weeks.sort_unstable();
        for (i, week) in weeks.iter().enumerate() {
            if *week != (i as i64) + 1 {
                return Err(IngestError::SchemaViolation {
                    reason: format!("module weeks must be gapless starting at 1, got {weeks:?}"),
                });
            }
        }

        for module in &self.modules {
            if module.topics.is_empty() {
                return Err(IngestError::SchemaViolation {
                    reason: format!("module week {} has no topics", module.week),
                });
            }
            let mut indices: Vec<i64> = module.topics.iter().map(|t| t.order_index).collect();
            indices.sort_unstable();
            for (i, idx) in indices.iter().enumerate() {
                if *idx != (i as i64) + 1 {
                    return Err(IngestError::SchemaViolation {
                        reason: format!("topic order_index must be gapless starting at 1 within module week {}, got {indices:?}", module.week),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_course() -> SynthesisedCourse {
        SynthesisedCourse {
            title: "Intro to Testing".to_string(),
            description: "desc".to_string(),
            modules: vec![SynthesisedModule {
                week: 1,
                title: "Week 1".to_string(),
                description: "desc".to_string(),
                objectives: vec![],
                topics: vec![SynthesisedTopic {
                    order_index: 1,
                    title: "Topic 1".to_string(),
                    content: "content".to_string(),
                    estimated_duration_minutes: None,
                }],
            }],
        }
    }

    #[test]
    fn validate_accepts_gapless_numbering() {
        assert!(valid_course().validate().is_ok());
    }

    #[test]
    fn validate_rejects_gap_in_module_weeks() {
        let mut course = valid_course();
        course.modules[0].week = 2;
        assert!(course.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_modules() {
        let mut course = valid_course();
        course.modules.clear();
        assert!(course.validate().is_err());
    }
}
