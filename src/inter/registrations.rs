/*!
Handlers for the `/api/registrations` resource: students ask to register
for subjects, admins approve or reject.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
    response::{IntoResponse, Response},
    Router,
    routing::{get, put},
};
use serde::Deserialize;
use serde_json::json;

use crate::config::Glob;
use crate::registration::RegistrationStatus;
use crate::user::{Role, User};
use super::*;

pub fn router() -> Router {
    Router::new()
        .route("/", get(get_all_requests).post(create_request))
        .route("/student/:student_id", get(get_student_requests))
        .route("/:id/process", put(process_request))
        .route("/available-subjects/:student_id", get(get_available_subjects))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub student_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub academic_year: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    pub status: Option<String>,
    pub academic_year: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub action: Option<String>,
    /// Either the admin's numeric id or their provider identifier; the
    /// frontend is not consistent about which it sends.
    pub admin_id: Option<serde_json::Value>,
    pub admin_note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearFilter {
    pub academic_year: Option<String>,
}

async fn create_request(
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<CreateRequest>,
) -> Response {
    log::trace!("registrations::create_request( {:?} ) called.", &payload);

    let (student_id, subject_id) = match (payload.student_id, payload.subject_id) {
        (Some(st), Some(su)) => (st, su),
        _ => {
            return respond_bad_request(
                "studentId and subjectId are both required.".to_owned()
            );
        },
    };
    let academic_year = payload.academic_year
        .unwrap_or_else(|| glob.default_academic_year.clone());

    match glob.store.get_user_by_id(student_id).await {
        Err(e) => {
            log::error!("Error fetching user {}: {}", &student_id, &e);
            return json_500(Some("Unable to create registration request.".to_owned()));
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
            return json_500(Some("Unable to create registration request.".to_owned()));
        },
        Ok(None) => {
            return respond_not_found("Subject does not exist.".to_owned());
        },
        Ok(Some(_)) => {},
    }

    match glob.store.get_enrollment(student_id, subject_id, &academic_year).await {
        Err(e) => {
            log::error!("Error querying enrollment: {}", &e);
            return json_500(Some("Unable to create registration request.".to_owned()));
        },
        Ok(Some(_)) => {
            return respond_conflict(
                "Student is already enrolled in this subject.".to_owned()
            );
        },
        Ok(None) => {},
    }

    match glob.store.find_pending(student_id, subject_id, &academic_year).await {
        Err(e) => {
            log::error!("Error querying pending request: {}", &e);
            return json_500(Some("Unable to create registration request.".to_owned()));
        },
        Ok(Some(_)) => {
            return respond_conflict(
                "A registration request for this subject is already awaiting approval.".to_owned()
            );
        },
        Ok(None) => {},
    }

    match glob.store.insert_request(
        student_id, subject_id, &academic_year, payload.reason.as_deref()
    ).await {
        Ok(req) => (StatusCode::CREATED, Json(req)).into_response(),
        Err(e) => {
            log::error!("Error inserting registration request: {}", &e);
            json_500(Some("Unable to create registration request.".to_owned()))
        },
    }
}

fn parse_status_filter(
    status: Option<&str>,
) -> Result<Option<RegistrationStatus>, Response> {
    match status {
        None => Ok(None),
        Some(s) => match s.parse() {
            Ok(status) => Ok(Some(status)),
            Err(_) => Err(respond_bad_request(
                format!("{:?} is not a valid registration status.", s)
            )),
        },
    }
}

async fn get_all_requests(
    Query(filter): Query<RequestFilter>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("registrations::get_all_requests( {:?} ) called.", &filter);

    let status = match parse_status_filter(filter.status.as_deref()) {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    match glob.store.get_requests(
        None, status, filter.academic_year.as_deref()
    ).await {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(e) => {
            log::error!("Error fetching registration requests: {}", &e);
            json_500(Some("Unable to fetch registration requests.".to_owned()))
        },
    }
}

async fn get_student_requests(
    Path(student_id): Path<i64>,
    Query(filter): Query<RequestFilter>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!(
        "registrations::get_student_requests( {}, {:?} ) called.",
        &student_id, &filter
    );

    let status = match parse_status_filter(filter.status.as_deref()) {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    match glob.store.get_requests(
        Some(student_id), status, filter.academic_year.as_deref()
    ).await {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(e) => {
            log::error!(
                "Error fetching registration requests for student {}: {}",
                &student_id, &e
            );
            json_500(Some("Unable to fetch registration requests.".to_owned()))
        },
    }
}

/**
Resolve the admin named in a process request.

The identifier may be the admin's numeric id or their provider id. When
neither resolves, this falls back to the first admin on record — which
means any valid-looking request gets attributed to *somebody*. Questionable,
but it is what the frontend relies on.
*/
async fn resolve_admin(
    glob: &Glob,
    admin_id: &serde_json::Value,
) -> Result<Option<User>, ()> {
    let numeric: Option<i64> = match admin_id {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    };

    if let Some(id) = numeric {
        match glob.store.get_user_by_id(id).await {
            Ok(Some(u)) => { return Ok(Some(u)); },
            Ok(None) => {},
            Err(e) => {
                log::error!("Error fetching user {}: {}", &id, &e);
                return Err(());
            },
        }
    }

    if let serde_json::Value::String(s) = admin_id {
        match glob.store.get_user_by_provider_id(s).await {
            Ok(Some(u)) => { return Ok(Some(u)); },
            Ok(None) => {},
            Err(e) => {
                log::error!("Error fetching user by provider id {:?}: {}", s, &e);
                return Err(());
            },
        }
    }

    log::warn!(
        "Admin identifier {:?} resolved to nobody; falling back to the \
        first admin on record.",
        admin_id
    );
    match glob.store.get_users_by_role(Role::Admin).await {
        Ok(admins) => Ok(admins.into_iter().next()),
        Err(e) => {
            log::error!("Error fetching admins: {}", &e);
            Err(())
        },
    }
}

async fn process_request(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<ProcessRequest>,
) -> Response {
    log::trace!(
        "registrations::process_request( {}, {:?} ) called.",
        &id, &payload
    );

    let action = match payload.action.as_deref() {
        Some(a @ ("approve" | "reject")) => a,
        Some(a) => {
            return respond_bad_request(format!(
                "Action must be \"approve\" or \"reject\", not {:?}.", a
            ));
        },
        None => {
            return respond_bad_request(
                "Action must be \"approve\" or \"reject\".".to_owned()
            );
        },
    };

    let admin_id = match payload.admin_id {
        Some(v) => v,
        None => {
            return respond_bad_request("adminId is required.".to_owned());
        },
    };

    let request = match glob.store.get_request_by_id(id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            return respond_not_found(
                "Registration request does not exist.".to_owned()
            );
        },
        Err(e) => {
            log::error!("Error fetching registration request {}: {}", &id, &e);
            return json_500(Some("Unable to process registration request.".to_owned()));
        },
    };

    // Read-then-write with no row lock: two admins racing on the same
    // request can both see `pending` here and both proceed.
    if request.status != RegistrationStatus::Pending {
        return respond_bad_request(
            "Registration request has already been processed.".to_owned()
        );
    }

    let admin = match resolve_admin(&glob, &admin_id).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            log::error!("No admin could be resolved for {:?}.", &admin_id);
            return respond_forbidden("Invalid admin identity.".to_owned());
        },
        Err(()) => {
            return json_500(Some("Unable to process registration request.".to_owned()));
        },
    };

    if admin.role != Role::Admin {
        log::error!(
            "User {} resolved from {:?} has role {:?}, not admin.",
            &admin.id, &admin_id, &admin.role
        );
        return respond_forbidden("Invalid admin identity.".to_owned());
    }

    log::trace!(
        "    ...processing as admin {} ({}).", &admin.id, &admin.name
    );

    if action == "reject" {
        return match glob.store.set_decision(
            request.id,
            RegistrationStatus::Rejected,
            payload.admin_note.as_deref(),
            admin.id,
        ).await {
            Ok(req) => (
                StatusCode::OK,
                Json(json!({
                    "message": "Registration request rejected.",
                    "request": req,
                }))
            ).into_response(),
            Err(e) => {
                log::error!("Error rejecting request {}: {}", &request.id, &e);
                json_500(Some("Unable to process registration request.".to_owned()))
            },
        };
    }

    // Approval. The enrollment may already exist (an admin may have
    // enrolled the student directly in the meantime); in that case record
    // the approval without duplicating it.
    let existing = match glob.store.get_enrollment(
        request.student_id, request.subject_id, &request.academic_year
    ).await {
        Ok(e) => e,
        Err(e) => {
            log::error!("Error querying enrollment: {}", &e);
            return json_500(Some("Unable to process registration request.".to_owned()));
        },
    };

    if existing.is_some() {
        let note = payload.admin_note
            .unwrap_or_else(|| "Already enrolled.".to_owned());
        return match glob.store.set_decision(
            request.id,
            RegistrationStatus::Approved,
            Some(&note),
            admin.id,
        ).await {
            Ok(req) => (
                StatusCode::OK,
                Json(json!({
                    "message": "Registration request approved; student was already enrolled.",
                    "request": req,
                }))
            ).into_response(),
            Err(e) => {
                log::error!("Error approving request {}: {}", &request.id, &e);
                json_500(Some("Unable to process registration request.".to_owned()))
            },
        };
    }

    if let Err(e) = glob.store.insert_enrollment(
        request.student_id, request.subject_id, &request.academic_year
    ).await {
        log::error!(
            "Error enrolling student {} in subject {}: {}",
            &request.student_id, &request.subject_id, &e
        );
        return json_500(Some("Unable to process registration request.".to_owned()));
    }

    match glob.store.set_decision(
        request.id,
        RegistrationStatus::Approved,
        payload.admin_note.as_deref(),
        admin.id,
    ).await {
        Ok(req) => (
            StatusCode::OK,
            Json(json!({
                "message": "Registration request approved and student enrolled.",
                "request": req,
            }))
        ).into_response(),
        Err(e) => {
            log::error!("Error approving request {}: {}", &request.id, &e);
            json_500(Some("Unable to process registration request.".to_owned()))
        },
    }
}

async fn get_available_subjects(
    Path(student_id): Path<i64>,
    Query(filter): Query<YearFilter>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!(
        "registrations::get_available_subjects( {}, {:?} ) called.",
        &student_id, &filter.academic_year
    );

    let academic_year = filter.academic_year
        .unwrap_or_else(|| glob.default_academic_year.clone());

    match glob.store.get_available_subjects(student_id, &academic_year).await {
        Ok(subjects) => (StatusCode::OK, Json(subjects)).into_response(),
        Err(e) => {
            log::error!(
                "Error fetching available subjects for student {}: {}",
                &student_id, &e
            );
            json_500(Some("Unable to fetch available subjects.".to_owned()))
        },
    }
}
