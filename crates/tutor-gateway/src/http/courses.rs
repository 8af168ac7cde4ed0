use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use tutor_core::TutorError;
use tutor_protocol::http::{CourseDetailDto, CourseSummaryDto, ModuleDto, TopicDto};

use crate::app::AppState;
use crate::error::ApiError;

const COURSE_LIST_LIMIT: usize = 100;

pub async fn list_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<CourseSummaryDto>>, ApiError> {
    let courses = state.drs.list_courses(COURSE_LIST_LIMIT)?;
    Ok(Json(
        courses
            .into_iter()
            .map(|c| CourseSummaryDto {
                course_id: c.course_id,
                course_number: c.course_number,
                title: c.title,
            })
            .collect(),
    ))
}

pub async fn detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id_or_number): Path<String>,
) -> Result<Json<CourseDetailDto>, ApiError> {
    // §6.2 `GET /courses/{id_or_number}`: a bare integer is a course_number,
    // anything else is the opaque course_id.
    let course = match id_or_number.parse::<i64>() {
        Ok(course_number) => state.drs.get_course_by_number(course_number)?,
        Err(_) => state.drs.get_course(&id_or_number)?,
    }
    .ok_or_else(|| ApiError(TutorError::NotFound(format!("course {id_or_number}"))))?;

    let modules = state.drs.list_modules(&course.course_id)?;
    let mut module_dtos = Vec::with_capacity(modules.len());
    for module in modules {
        let topics = state.drs.list_topics(&module.module_id)?;
        module_dtos.push(ModuleDto {
            module_id: module.module_id,
            week: module.week,
            title: module.title,
            topics: topics
                .into_iter()
                .map(|t| TopicDto {
                    topic_id: t.topic_id,
                    title: t.title,
                    order_index: t.order_index,
                })
                .collect(),
        });
    }

    Ok(Json(CourseDetailDto {
        course_id: course.course_id,
        course_number: course.course_number,
        title: course.title,
        modules: module_dtos,
    }))
}
