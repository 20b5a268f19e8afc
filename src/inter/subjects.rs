/*!
Handlers for the `/api/subjects` resource: the subject catalog itself,
teacher assignment, and student enrollment.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
    response::{IntoResponse, Response},
    Router,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::config::Glob;
use crate::user::Role;
use super::*;

pub fn router() -> Router {
    Router::new()
        .route("/", get(get_all_subjects).post(create_subject))
        .route("/assign-teacher", post(assign_teacher))
        .route("/enroll-student", post(enroll_student))
        .route("/teacher/:teacher_id", get(get_teacher_subjects))
        .route("/student/:student_id", get(get_student_subjects))
        .route("/:id", get(get_subject_by_id).put(update_subject).delete(delete_subject))
        .route("/:id/enrolled-students", get(get_enrolled_students))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubject {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    #[serde(default)]
    pub credits: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubject {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub credits: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTeacher {
    pub teacher_id: Option<i64>,
    pub subject_id: i64,
    pub academic_year: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollStudent {
    pub student_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub academic_year: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearFilter {
    pub academic_year: Option<String>,
}

async fn create_subject(
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<CreateSubject>,
) -> Response {
    log::trace!(
        "subjects::create_subject( {:?}, {:?} ) called.",
        &payload.name, &payload.code
    );

    match glob.store.get_subject_by_code(&payload.code).await {
        Err(e) => {
            log::error!("Error querying subject by code: {}", &e);
            return json_500(Some("Unable to create subject.".to_owned()));
        },
        Ok(Some(_)) => {
            return respond_conflict(
                "A subject with this code already exists.".to_owned()
            );
        },
        Ok(None) => {},
    }

    match glob.store.insert_subject(
        &payload.name,
        &payload.code,
        payload.description.as_deref(),
        payload.credits,
    ).await {
        Ok(s) => (StatusCode::CREATED, Json(s)).into_response(),
        Err(e) => {
            log::error!("Error inserting subject {:?}: {}", &payload.code, &e);
            json_500(Some("Unable to create subject.".to_owned()))
        },
    }
}

async fn get_all_subjects(
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("subjects::get_all_subjects() called.");

    match glob.store.get_subjects_with_teachers().await {
        Ok(subjects) => (StatusCode::OK, Json(subjects)).into_response(),
        Err(e) => {
            log::error!("Error fetching subjects: {}", &e);
            json_500(Some("Unable to fetch subjects.".to_owned()))
        },
    }
}

async fn get_subject_by_id(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("subjects::get_subject_by_id( {} ) called.", &id);

    match glob.store.get_subject_by_id(id).await {
        Ok(Some(s)) => (StatusCode::OK, Json(s)).into_response(),
        Ok(None) => respond_not_found("Subject does not exist.".to_owned()),
        Err(e) => {
            log::error!("Error fetching subject {}: {}", &id, &e);
            json_500(Some("Unable to fetch subject.".to_owned()))
        },
    }
}

async fn update_subject(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<UpdateSubject>,
) -> Response {
    log::trace!("subjects::update_subject( {}, {:?} ) called.", &id, &payload);

    match glob.store.update_subject(
        id,
        payload.name.as_deref(),
        payload.code.as_deref(),
        payload.description.as_deref(),
        payload.credits,
    ).await {
        Ok(Some(s)) => (StatusCode::OK, Json(s)).into_response(),
        Ok(None) => respond_not_found("Subject does not exist.".to_owned()),
        Err(e) => {
            log::error!("Error updating subject {}: {}", &id, &e);
            json_500(Some("Unable to update subject.".to_owned()))
        },
    }
}

async fn delete_subject(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("subjects::delete_subject( {} ) called.", &id);

    match glob.store.delete_subject(id).await {
        Ok(0) => respond_not_found("Subject does not exist.".to_owned()),
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "message": "Subject deleted." }))
        ).into_response(),
        Err(e) => {
            log::error!("Error deleting subject {}: {}", &id, &e);
            json_500(Some("Unable to delete subject.".to_owned()))
        },
    }
}

/**
Assign, replace, or remove the teacher for a (subject, year) slot.

A missing/null `teacherId` means "remove whatever assignment is there";
otherwise the existing assignment for the slot is updated in place (last
writer wins) or a new one is created.
*/
async fn assign_teacher(
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<AssignTeacher>,
) -> Response {
    log::trace!("subjects::assign_teacher( {:?} ) called.", &payload);

    let teacher_id = match payload.teacher_id {
        None => {
            let existing = match glob.store.get_assignment(
                payload.subject_id, &payload.academic_year
            ).await {
                Ok(a) => a,
                Err(e) => {
                    log::error!("Error querying assignment: {}", &e);
                    return json_500(Some("Unable to update assignment.".to_owned()));
                },
            };

            match existing {
                Some(a) => match glob.store.delete_assignment(a.id).await {
                    Ok(()) => {
                        return (
                            StatusCode::OK,
                            Json(json!({ "message": "Teacher assignment removed." }))
                        ).into_response();
                    },
                    Err(e) => {
                        log::error!("Error deleting assignment {}: {}", &a.id, &e);
                        return json_500(Some("Unable to remove assignment.".to_owned()));
                    },
                },
                None => {
                    return (
                        StatusCode::OK,
                        Json(json!({ "message": "No teacher is assigned to this subject." }))
                    ).into_response();
                },
            }
        },
        Some(tid) => tid,
    };

    match glob.store.get_user_by_id(teacher_id).await {
        Err(e) => {
            log::error!("Error fetching user {}: {}", &teacher_id, &e);
            return json_500(Some("Unable to update assignment.".to_owned()));
        },
        Ok(None) => {
            return respond_not_found("Teacher does not exist.".to_owned());
        },
        Ok(Some(u)) => {
            if u.role != Role::Teacher {
                return respond_bad_request(
                    "User is not a teacher.".to_owned()
                );
            }
        },
    }

    match glob.store.get_subject_by_id(payload.subject_id).await {
        Err(e) => {
            log::error!("Error fetching subject {}: {}", &payload.subject_id, &e);
            return json_500(Some("Unable to update assignment.".to_owned()));
        },
        Ok(None) => {
            return respond_not_found("Subject does not exist.".to_owned());
        },
        Ok(Some(_)) => {},
    }

    let existing = match glob.store.get_assignment(
        payload.subject_id, &payload.academic_year
    ).await {
        Ok(a) => a,
        Err(e) => {
            log::error!("Error querying assignment: {}", &e);
            return json_500(Some("Unable to update assignment.".to_owned()));
        },
    };

    match existing {
        Some(a) => match glob.store.update_assignment_teacher(a.id, teacher_id).await {
            Ok(a) => (StatusCode::OK, Json(a)).into_response(),
            Err(e) => {
                log::error!("Error updating assignment {}: {}", &a.id, &e);
                json_500(Some("Unable to update assignment.".to_owned()))
            },
        },
        None => match glob.store.insert_assignment(
            teacher_id, payload.subject_id, &payload.academic_year
        ).await {
            Ok(a) => (StatusCode::CREATED, Json(a)).into_response(),
            Err(e) => {
                log::error!("Error inserting assignment: {}", &e);
                json_500(Some("Unable to create assignment.".to_owned()))
            },
        },
    }
}

async fn get_teacher_subjects(
    Path(teacher_id): Path<i64>,
    Query(filter): Query<YearFilter>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!(
        "subjects::get_teacher_subjects( {}, {:?} ) called.",
        &teacher_id, &filter.academic_year
    );

    match glob.store.get_user_by_id(teacher_id).await {
        Err(e) => {
            log::error!("Error fetching user {}: {}", &teacher_id, &e);
            return json_500(Some("Unable to fetch teacher subjects.".to_owned()));
        },
        Ok(None) => {
            return respond_not_found("Teacher does not exist.".to_owned());
        },
        Ok(Some(u)) => {
            if u.role != Role::Teacher {
                log::warn!(
                    "User {} exists but has role {:?} rather than teacher.",
                    &teacher_id, &u.role
                );
                return respond_bad_request("User is not a teacher.".to_owned());
            }
        },
    }

    match glob.store.get_assignments_by_teacher(
        teacher_id, filter.academic_year.as_deref()
    ).await {
        Ok(taught) => (StatusCode::OK, Json(taught)).into_response(),
        Err(e) => {
            log::error!(
                "Error fetching subjects for teacher {}: {}",
                &teacher_id, &e
            );
            json_500(Some("Unable to fetch teacher subjects.".to_owned()))
        },
    }
}

async fn enroll_student(
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<EnrollStudent>,
) -> Response {
    log::trace!("subjects::enroll_student( {:?} ) called.", &payload);

    let (student_id, subject_id, academic_year) = match (
        payload.student_id, payload.subject_id, payload.academic_year
    ) {
        (Some(st), Some(su), Some(y)) => (st, su, y),
        _ => {
            return respond_bad_request(
                "studentId, subjectId, and academicYear are all required.".to_owned()
            );
        },
    };

    match glob.store.get_user_by_id(student_id).await {
        Err(e) => {
            log::error!("Error fetching user {}: {}", &student_id, &e);
            return json_500(Some("Unable to enroll student.".to_owned()));
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

    match glob.store.get_subject_by_id(subject_id).await {
        Err(e) => {
            log::error!("Error fetching subject {}: {}", &subject_id, &e);
            return json_500(Some("Unable to enroll student.".to_owned()));
        },
        Ok(None) => {
            return respond_not_found("Subject does not exist.".to_owned());
        },
        Ok(Some(_)) => {},
    }

    match glob.store.get_enrollment(student_id, subject_id, &academic_year).await {
        Err(e) => {
            log::error!("Error querying enrollment: {}", &e);
            return json_500(Some("Unable to enroll student.".to_owned()));
        },
        Ok(Some(enrollment)) => {
            log::info!(
                "Student {} is already enrolled in subject {} for {}.",
                &student_id, &subject_id, &academic_year
            );
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "message": "Student is already enrolled in this subject for the chosen year.",
                    "enrollment": enrollment,
                }))
            ).into_response();
        },
        Ok(None) => {},
    }

    match glob.store.insert_enrollment(student_id, subject_id, &academic_year).await {
        Ok(enrollment) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Enrollment created.",
                "enrollment": enrollment,
            }))
        ).into_response(),
        Err(e) => {
            log::error!(
                "Error enrolling student {} in subject {}: {}",
                &student_id, &subject_id, &e
            );
            json_500(Some("Unable to enroll student.".to_owned()))
        },
    }
}

async fn get_student_subjects(
    Path(student_id): Path<i64>,
    Query(filter): Query<YearFilter>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!(
        "subjects::get_student_subjects( {}, {:?} ) called.",
        &student_id, &filter.academic_year
    );

    match glob.store.get_enrollments_by_student(
        student_id, filter.academic_year.as_deref()
    ).await {
        Ok(enrollments) => (StatusCode::OK, Json(enrollments)).into_response(),
        Err(e) => {
            log::error!(
                "Error fetching enrollments for student {}: {}",
                &student_id, &e
            );
            json_500(Some("Unable to fetch student subjects.".to_owned()))
        },
    }
}

async fn get_enrolled_students(
    Path(id): Path<i64>,
    Query(filter): Query<YearFilter>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!(
        "subjects::get_enrolled_students( {}, {:?} ) called.",
        &id, &filter.academic_year
    );

    match glob.store.get_subject_by_id(id).await {
        Err(e) => {
            log::error!("Error fetching subject {}: {}", &id, &e);
            return json_500(Some("Unable to fetch enrolled students.".to_owned()));
        },
        Ok(None) => {
            return respond_not_found("Subject does not exist.".to_owned());
        },
        Ok(Some(_)) => {},
    }

    match glob.store.get_enrolled_students(
        id, filter.academic_year.as_deref()
    ).await {
        Ok(students) => (StatusCode::OK, Json(students)).into_response(),
        Err(e) => {
            log::error!(
                "Error fetching enrolled students for subject {}: {}",
                &id, &e
            );
            json_500(Some("Unable to fetch enrolled students.".to_owned()))
        },
    }
}
