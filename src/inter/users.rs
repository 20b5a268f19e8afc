/*!
Handlers for the `/api/users` resource.

Users here are shadow records of identity-provider accounts. Creation
provisions the provider account first and falls back to a `temp_`
placeholder identity when the provider is unreachable; deletion cleans up
the provider account after the database transaction commits.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
    response::{IntoResponse, Response},
    Router,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

use crate::config::Glob;
use crate::provider;
use crate::user::Role;
use super::*;

pub fn router() -> Router {
    Router::new()
        .route("/", get(get_all_users).post(create_user))
        .route("/role/:role", get(get_users_by_role))
        .route("/provider/:provider_id", get(get_user_by_provider_id))
        .route("/:id", get(get_user_by_id).put(update_user).delete(delete_user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password: Option<String>,
    pub provider_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

async fn create_user(
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<CreateUser>,
) -> Response {
    log::trace!(
        "users::create_user( {:?}, {:?}, {} ) called.",
        &payload.name, &payload.email, &payload.role
    );

    // Re-provisioning an existing account is not an error; hand back the
    // record we already have.
    match glob.store.get_user_by_email(&payload.email).await {
        Err(e) => {
            log::error!("Error querying user by email: {}", &e);
            return json_500(Some("Unable to create user.".to_owned()));
        },
        Ok(Some(u)) => {
            log::info!(
                "User with email {:?} already exists with id {}.",
                &payload.email, &u.id
            );
            return (StatusCode::OK, Json(u)).into_response();
        },
        Ok(None) => {},
    }

    if let Some(pid) = payload.provider_id.as_deref() {
        match glob.store.get_user_by_provider_id(pid).await {
            Err(e) => {
                log::error!("Error querying user by provider id: {}", &e);
                return json_500(Some("Unable to create user.".to_owned()));
            },
            Ok(Some(u)) => {
                log::info!(
                    "User with provider id {:?} already exists with id {}.",
                    pid, &u.id
                );
                return (StatusCode::OK, Json(u)).into_response();
            },
            Ok(None) => {},
        }
    }

    let provider_id = match payload.provider_id {
        Some(pid) => pid,
        None => {
            let password = payload.password.as_deref().unwrap_or_default();
            match glob.provider.create_user(
                &payload.name, &payload.email, password, payload.role
            ).await {
                Ok(pid) => pid,
                Err(e) => {
                    log::error!(
                        "Unable to create provider account for {:?}: {}",
                        &payload.email, &e
                    );
                    // Keep the application usable while the provider is
                    // down: the shadow record gets a placeholder identity.
                    // Such a user cannot authenticate until the provider
                    // link is repaired.
                    let pid = glob.provider.placeholder_identity();
                    log::warn!(
                        "Creating user {:?} with placeholder identity {:?}; \
                        this account cannot authenticate.",
                        &payload.email, &pid
                    );
                    pid
                },
            }
        },
    };

    match glob.store.insert_user(
        &provider_id, &payload.name, &payload.email, payload.role
    ).await {
        Ok(u) => (StatusCode::CREATED, Json(u)).into_response(),
        Err(e) => {
            log::error!(
                "Error inserting user {:?} into database: {}",
                &payload.email, &e
            );
            json_500(Some("Unable to create user.".to_owned()))
        },
    }
}

async fn get_all_users(
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("users::get_all_users() called.");

    match glob.store.get_users().await {
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(e) => {
            log::error!("Error fetching users: {}", &e);
            json_500(Some("Unable to fetch users.".to_owned()))
        },
    }
}

async fn get_users_by_role(
    Path(role): Path<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("users::get_users_by_role( {:?} ) called.", &role);

    let role: Role = match role.parse() {
        Ok(r) => r,
        Err(_) => {
            return respond_bad_request(
                format!("{:?} is not a valid role.", &role)
            );
        },
    };

    match glob.store.get_users_by_role(role).await {
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(e) => {
            log::error!("Error fetching users by role: {}", &e);
            json_500(Some("Unable to fetch users.".to_owned()))
        },
    }
}

async fn get_user_by_id(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("users::get_user_by_id( {} ) called.", &id);

    match glob.store.get_user_by_id(id).await {
        Ok(Some(u)) => (StatusCode::OK, Json(u)).into_response(),
        Ok(None) => respond_not_found("User does not exist.".to_owned()),
        Err(e) => {
            log::error!("Error fetching user {}: {}", &id, &e);
            json_500(Some("Unable to fetch user.".to_owned()))
        },
    }
}

async fn get_user_by_provider_id(
    Path(provider_id): Path<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!(
        "users::get_user_by_provider_id( {:?} ) called.",
        &provider_id
    );

    match glob.store.get_user_by_provider_id(&provider_id).await {
        Ok(Some(u)) => {
            log::trace!(
                "    ...found user {} ({}, {}).", &u.id, &u.name, &u.role
            );
            (StatusCode::OK, Json(u)).into_response()
        },
        Ok(None) => respond_not_found("User does not exist.".to_owned()),
        Err(e) => {
            log::error!(
                "Error fetching user by provider id {:?}: {}",
                &provider_id, &e
            );
            json_500(Some("Unable to fetch user.".to_owned()))
        },
    }
}

async fn update_user(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<Glob>>,
    Json(payload): Json<UpdateUser>,
) -> Response {
    log::trace!("users::update_user( {}, {:?} ) called.", &id, &payload);

    match glob.store.update_user(
        id,
        payload.name.as_deref(),
        payload.email.as_deref(),
        payload.role,
    ).await {
        Ok(Some(u)) => (StatusCode::OK, Json(u)).into_response(),
        Ok(None) => respond_not_found("User does not exist.".to_owned()),
        Err(e) => {
            log::error!("Error updating user {}: {}", &id, &e);
            json_500(Some("Unable to update user.".to_owned()))
        },
    }
}

async fn delete_user(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("users::delete_user( {} ) called.", &id);

    let user = match glob.store.get_user_by_id(id).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return respond_not_found("User does not exist.".to_owned());
        },
        Err(e) => {
            log::error!("Error fetching user {}: {}", &id, &e);
            return json_500(Some("Unable to delete user.".to_owned()));
        },
    };

    if let Err(e) = glob.store.delete_user(id).await {
        log::error!("Error deleting user {}: {}", &id, &e);
        return json_500(Some("Unable to delete user.".to_owned()));
    }

    // Provider-side cleanup stays outside the database transaction: a
    // failure here leaves a stale provider account, which we can only log.
    if provider::is_placeholder(&user.provider_id) {
        log::info!(
            "Skipping provider deletion for placeholder identity {:?}.",
            &user.provider_id
        );
    } else if let Err(e) = glob.provider.delete_user(&user.provider_id).await {
        log::error!(
            "User {} deleted from database, but provider deletion of {:?} \
            failed: {}",
            &id, &user.provider_id, &e
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "message": "User and all dependent records deleted.",
            "userId": id,
        }))
    ).into_response()
}
