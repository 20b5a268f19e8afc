/*!
Interoperation between the client and server.

(Not the application and the database; that's covered by `store`. Not the
application and the identity provider either; that's `provider`.)

Every handler speaks JSON. Errors come back as a status code plus a
`{"message": ...}` body. Everything under `/api` passes through
`bearer_authenticate()` first; the token is vouched for (or not) by the
identity provider itself.
*/
use std::sync::Arc;

use axum::{
    http::{Request, StatusCode, header},
    Json,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::config::Glob;
use crate::provider::AuthResult;

pub mod grades;
pub mod registrations;
pub mod subjects;
pub mod users;

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

fn respond_message(code: StatusCode, msg: String) -> Response {
    (
        code,
        Json(json!({ "message": msg }))
    ).into_response()
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    respond_message(StatusCode::BAD_REQUEST, msg)
}

pub fn respond_unauthorized(msg: String) -> Response {
    log::trace!("respond_unauthorized( {:?} ) called.", &msg);

    respond_message(StatusCode::UNAUTHORIZED, msg)
}

pub fn respond_forbidden(msg: String) -> Response {
    log::trace!("respond_forbidden( {:?} ) called.", &msg);

    respond_message(StatusCode::FORBIDDEN, msg)
}

pub fn respond_not_found(msg: String) -> Response {
    log::trace!("respond_not_found( {:?} ) called.", &msg);

    respond_message(StatusCode::NOT_FOUND, msg)
}

pub fn respond_conflict(msg: String) -> Response {
    log::trace!("respond_conflict( {:?} ) called.", &msg);

    respond_message(StatusCode::CONFLICT, msg)
}

/**
Return a JSON response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn json_500(text: Option<String>) -> Response {
    match text {
        Some(text) => respond_message(
            StatusCode::INTERNAL_SERVER_ERROR,
            text
        ),
        None => respond_message(
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_500.to_owned()
        ),
    }
}

/**
Middleware that gates `/api` behind a live bearer token.

The token rides in the standard `Authorization: Bearer ...` header and is
checked against the identity provider's introspection endpoint; nothing
about it is interpreted here.
*/
pub async fn bearer_authenticate<B>(
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let glob: &Arc<Glob> = req.extensions().get().unwrap();

    let token = match req.headers().get(header::AUTHORIZATION) {
        Some(h_val) => match h_val.to_str() {
            Ok(s) => match s.strip_prefix("Bearer ") {
                Some(token) => token,
                None => {
                    return respond_unauthorized(
                        "Authorization header must carry a bearer token.".to_owned()
                    );
                },
            },
            Err(e) => {
                log::error!(
                    "Failed converting Authorization value {:?} to &str: {}",
                    h_val, &e
                );
                return respond_bad_request(
                    "Authorization header value unrecognizable.".to_owned()
                );
            },
        },
        None => {
            return respond_unauthorized(
                "Request must have an Authorization header.".to_owned()
            );
        },
    };

    let res = glob.provider.introspect(token).await;

    match res {
        Err(e) => {
            log::error!(
                "Provider::introspect( [ bearer token ] ) returned error: {}",
                &e
            );

            return json_500(None);
        },
        Ok(AuthResult::Inactive) => {
            return respond_unauthorized(
                "Invalid or expired bearer token.".to_owned()
            );
        },
        Ok(AuthResult::Valid(_)) => {
            // This is the good path. We will just fall through and call the
            // next layer after the match.
        },
    }

    next.run(req).await
}
