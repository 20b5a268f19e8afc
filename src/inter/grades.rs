/*!
Handlers for the `/api/grades` resource.

Grade entry checks that the referenced users hold the right roles and that
the entering teacher actually teaches the subject that year; the read
endpoints are filtered report queries.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
    response::{IntoResponse, Response},
    Router,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;

use crate::config::Glob;
use crate::user::Role;
use super::*;

pub fn router() -> Router {
    Router::new()
        .route("/", post(add_grade))
        .route("/:id", put(update_grade).delete(delete_grade))
        .route("/student/:student_id", get(get_all_student_grades))
        .route(
            "/student/:student_id/subject/:subject_id",
            get(get_student_grades_by_subject),
        )
        .route(
            "/teacher/:teacher_id/subject/:subject_id",
            get(get_teacher_subject_grades),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGrade {
    pub student_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub score: f64,
    pub term: String,
    pub academic_year: String,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGrade {
    pub teacher_id: Option<i64>,
    pub score: Option<f64>,
    pub term: Option<String>,
    pub academic_year: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeFilter {
    pub academic_year: Option<String>,
    pub term: Option<String>,
}

/// Does this teacher hold the (subject, year) assignment?
async fn teacher_is_assigned(
    glob: &Glob,
    teacher_id: i64,
    subject_id: i64,
    academic_year: &str,
) -> Result<bool, ()> {
    match glob.store.get_assignment(subject_id, academic_year).await {
        Ok(Some(a)) => Ok(a.teacher_id == teacher_id),
        Ok(None) => Ok(false),
        Err(e) => {
            log::error!("Error querying assignment: {}", &e);
            Err(())
        },
    }
}

async fn add_grade(
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<CreateGrade>,
) -> Response {
    log::trace!("grades::add_grade( {:?} ) called.", &payload);

    match glob.store.get_user_by_id(payload.student_id).await {
        Err(e) => {
            log::error!("Error fetching user {}: {}", &payload.student_id, &e);
            return json_500(Some("Unable to add grade.".to_owned()));
        },
        Ok(None) => {
            return respond_not_found("Student does not exist.".to_owned());
        },
        Ok(Some(u)) => {
            if u.role != Role::Student {
                return respond_bad_request("User is not a student.".to_owned());
            }
        },
    }

    match glob.store.get_user_by_id(payload.teacher_id).await {
        Err(e) => {
            log::error!("Error fetching user {}: {}", &payload.teacher_id, &e);
            return json_500(Some("Unable to add grade.".to_owned()));
        },
        Ok(None) => {
            return respond_not_found("Teacher does not exist.".to_owned());
        },
        Ok(Some(u)) => {
            if u.role != Role::Teacher {
                return respond_bad_request("User is not a teacher.".to_owned());
            }
        },
    }

    match glob.store.get_subject_by_id(payload.subject_id).await {
        Err(e) => {
            log::error!("Error fetching subject {}: {}", &payload.subject_id, &e);
            return json_500(Some("Unable to add grade.".to_owned()));
        },
        Ok(None) => {
            return respond_not_found("Subject does not exist.".to_owned());
        },
        Ok(Some(_)) => {},
    }

    match teacher_is_assigned(
        &glob, payload.teacher_id, payload.subject_id, &payload.academic_year
    ).await {
        Ok(true) => {},
        Ok(false) => {
            return respond_forbidden(
                "Teacher is not assigned to this subject for the given year.".to_owned()
            );
        },
        Err(()) => {
            return json_500(Some("Unable to add grade.".to_owned()));
        },
    }

    match glob.store.insert_grade(
        payload.student_id,
        payload.subject_id,
        payload.teacher_id,
        payload.score,
        &payload.term,
        &payload.academic_year,
        payload.comment.as_deref(),
    ).await {
        Ok(g) => (StatusCode::CREATED, Json(g)).into_response(),
        Err(e) => {
            log::error!("Error inserting grade: {}", &e);
            json_500(Some("Unable to add grade.".to_owned()))
        },
    }
}

async fn update_grade(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<UpdateGrade>,
) -> Response {
    log::trace!("grades::update_grade( {}, {:?} ) called.", &id, &payload);

    let grade = match glob.store.get_grade_by_id(id).await {
        Ok(Some(g)) => g,
        Ok(None) => {
            return respond_not_found("Grade does not exist.".to_owned());
        },
        Err(e) => {
            log::error!("Error fetching grade {}: {}", &id, &e);
            return json_500(Some("Unable to update grade.".to_owned()));
        },
    };

    // Handing the grade to a different teacher requires that the new
    // teacher hold the assignment for the grade's subject and year.
    if let Some(new_teacher) = payload.teacher_id {
        if new_teacher != grade.teacher_id {
            match teacher_is_assigned(
                &glob, new_teacher, grade.subject_id, &grade.academic_year
            ).await {
                Ok(true) => {},
                Ok(false) => {
                    return respond_forbidden(
                        "New teacher is not assigned to this subject.".to_owned()
                    );
                },
                Err(()) => {
                    return json_500(Some("Unable to update grade.".to_owned()));
                },
            }
        }
    }

    match glob.store.update_grade(
        id,
        payload.teacher_id,
        payload.score,
        payload.term.as_deref(),
        payload.academic_year.as_deref(),
        payload.comment.as_deref(),
    ).await {
        Ok(Some(g)) => (StatusCode::OK, Json(g)).into_response(),
        Ok(None) => respond_not_found("Grade does not exist.".to_owned()),
        Err(e) => {
            log::error!("Error updating grade {}: {}", &id, &e);
            json_500(Some("Unable to update grade.".to_owned()))
        },
    }
}

async fn delete_grade(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("grades::delete_grade( {} ) called.", &id);

    match glob.store.delete_grade(id).await {
        Ok(0) => respond_not_found("Grade does not exist.".to_owned()),
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "message": "Grade deleted." }))
        ).into_response(),
        Err(e) => {
            log::error!("Error deleting grade {}: {}", &id, &e);
            json_500(Some("Unable to delete grade.".to_owned()))
        },
    }
}

async fn get_student_grades_by_subject(
    Path((student_id, subject_id)): Path<(i64, i64)>,
    Query(filter): Query<GradeFilter>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!(
        "grades::get_student_grades_by_subject( {}, {}, {:?} ) called.",
        &student_id, &subject_id, &filter
    );

    match glob.store.get_student_grades(
        student_id,
        Some(subject_id),
        filter.academic_year.as_deref(),
        filter.term.as_deref(),
    ).await {
        Ok(grades) => (StatusCode::OK, Json(grades)).into_response(),
        Err(e) => {
            log::error!(
                "Error fetching grades for student {} / subject {}: {}",
                &student_id, &subject_id, &e
            );
            json_500(Some("Unable to fetch grades.".to_owned()))
        },
    }
}

async fn get_all_student_grades(
    Path(student_id): Path<i64>,
    Query(filter): Query<GradeFilter>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!(
        "grades::get_all_student_grades( {}, {:?} ) called.",
        &student_id, &filter
    );

    match glob.store.get_student_grades(
        student_id,
        None,
        filter.academic_year.as_deref(),
        filter.term.as_deref(),
    ).await {
        Ok(grades) => (StatusCode::OK, Json(grades)).into_response(),
        Err(e) => {
            log::error!(
                "Error fetching grades for student {}: {}",
                &student_id, &e
            );
            json_500(Some("Unable to fetch grades.".to_owned()))
        },
    }
}

async fn get_teacher_subject_grades(
    Path((teacher_id, subject_id)): Path<(i64, i64)>,
    Query(filter): Query<GradeFilter>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!(
        "grades::get_teacher_subject_grades( {}, {}, {:?} ) called.",
        &teacher_id, &subject_id, &filter
    );

    match glob.store.get_teacher_subject_grades(
        teacher_id,
        subject_id,
        filter.academic_year.as_deref(),
        filter.term.as_deref(),
    ).await {
        Ok(grades) => (StatusCode::OK, Json(grades)).into_response(),
        Err(e) => {
            log::error!(
                "Error fetching grades for teacher {} / subject {}: {}",
                &teacher_id, &subject_id, &e
            );
            json_500(Some("Unable to fetch grades.".to_owned()))
        },
    }
}
