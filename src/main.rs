/*!
The GradeView server binary: logging, configuration, schema bootstrap,
router assembly, and the listen loop.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    Json,
    middleware,
    response::IntoResponse,
    Router,
    routing::get,
};
use serde_json::json;
use simplelog::{ColorChoice, TerminalMode, TermLogger};

use gradeview::{config, inter};

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "OK",
            "message": "GradeView API is running.",
        }))
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("gradeview")
        .build();
    TermLogger::init(
        gradeview::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let (cfg, glob) = match config::load_configuration().await {
        Ok(x) => x,
        Err(e) => {
            log::error!("Error loading configuration: {}", &e);
            std::process::exit(1);
        },
    };
    let glob = Arc::new(glob);

    let api = Router::new()
        .nest("/users", inter::users::router())
        .nest("/subjects", inter::subjects::router())
        .nest("/grades", inter::grades::router())
        .nest("/registrations", inter::registrations::router())
        .layer(middleware::from_fn(inter::bearer_authenticate));

    let app = Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .layer(Extension(glob));

    log::info!("Listening on {}", &cfg.addr);

    axum::Server::bind(&cfg.addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
