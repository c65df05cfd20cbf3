//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, HttpNotifier, MobileMoneyGateway},
    config::Config,
    error::ApiError,
    web::{
        admin::{admin_affiliates_handler, admin_overview_handler, admin_transactions_handler},
        affiliate::{
            create_affiliate_link_handler, list_affiliate_links_handler, track_click_handler,
        },
        auth::{login_handler, logout_handler, signup_handler},
        checkout::{
            activate_purchase_handler, checkout_handler, refresh_transaction_handler,
            transaction_status_handler,
        },
        courses::{
            claim_course_handler, create_course_handler, get_course_handler, list_courses_handler,
        },
        health_handler,
        learning::{
            add_watch_time_handler, answer_quiz_handler, chapter_access_handler,
            complete_video_handler, completion_handler, get_progress_handler,
            reset_progress_handler, retry_quiz_handler, start_quiz_handler, submit_quiz_handler,
            update_position_handler,
        },
        middleware::{require_admin, require_auth},
        state::AppState,
        ApiDoc,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter
        .run_migrations()
        .await
        .map_err(|e| ApiError::Internal(format!("Migration failed: {}", e)))?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()?;

    let payment_adapter = Arc::new(MobileMoneyGateway::new(
        http_client.clone(),
        config.payment_api_url.clone(),
        config.payment_api_token.clone(),
        config.payment_country.clone(),
    ));
    let notifier_adapter = Arc::new(HttpNotifier::new(
        http_client,
        config.notification_url.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter.clone(),
        progress: db_adapter.clone(),
        affiliates: db_adapter,
        payments: payment_adapter,
        notifier: notifier_adapter,
        config: config.clone(),
        quizzes: DashMap::new(),
        pollers: DashMap::new(),
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(
            config
                .public_base_url
                .parse()
                .map_err(|e| ApiError::Internal(format!("Invalid PUBLIC_BASE_URL: {}", e)))?,
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/courses", get(list_courses_handler))
        .route("/courses/{course_id}", get(get_course_handler))
        .route("/affiliate/clicks", post(track_click_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/courses/{course_id}/claim", post(claim_course_handler))
        .route("/courses/{course_id}/progress", get(get_progress_handler))
        .route(
            "/courses/{course_id}/progress/videos/{video_id}/complete",
            post(complete_video_handler),
        )
        .route(
            "/courses/{course_id}/progress/position",
            post(update_position_handler),
        )
        .route(
            "/courses/{course_id}/progress/watch-time",
            post(add_watch_time_handler),
        )
        .route(
            "/courses/{course_id}/progress/reset",
            post(reset_progress_handler),
        )
        .route("/courses/{course_id}/access", get(chapter_access_handler))
        .route("/courses/{course_id}/completion", get(completion_handler))
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/quiz/start",
            post(start_quiz_handler),
        )
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/quiz/answers",
            post(answer_quiz_handler),
        )
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/quiz/submit",
            post(submit_quiz_handler),
        )
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/quiz/retry",
            post(retry_quiz_handler),
        )
        .route(
            "/affiliate/links",
            post(create_affiliate_link_handler).get(list_affiliate_links_handler),
        )
        .route("/checkout", post(checkout_handler))
        .route("/checkout/{deposit_id}", get(transaction_status_handler))
        .route(
            "/checkout/{deposit_id}/refresh",
            post(refresh_transaction_handler),
        )
        .route(
            "/checkout/{deposit_id}/activate",
            post(activate_purchase_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Admin routes (auth + admin flag required)
    let admin_routes = Router::new()
        .route("/admin/courses", post(create_course_handler))
        .route("/admin/overview", get(admin_overview_handler))
        .route("/admin/transactions", get(admin_transactions_handler))
        .route("/admin/affiliates", get(admin_affiliates_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_admin,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
