/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use profilehub_api::app::{build_blob_store, build_router, AppState};
/// use profilehub_api::config::Config;
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let signer = config.url_signer()?;
/// let store = build_blob_store(&config, signer.clone()).await?;
///
/// let app = build_router(AppState::new(pool, config, store, signer));
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use crate::{
    config::{Config, StorageBackend},
    error::ApiError,
    middleware::security::SecurityHeadersLayer,
};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use profilehub_shared::{
    auth::middleware::authenticate_bearer,
    images::{ImageReconciler, UserLocks},
    storage::{local::LocalDiskStore, memory::MemoryBlobStore, signer::UrlSigner, BlobStore},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub store: Arc<dyn BlobStore>,
    pub signer: UrlSigner,
    pub reconciler: ImageReconciler,
    pub locks: Arc<UserLocks>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config, store: Arc<dyn BlobStore>, signer: UrlSigner) -> Self {
        let reconciler = ImageReconciler::new(store.clone(), config.storage.delete_timeout());

        Self {
            db,
            config: Arc::new(config),
            store,
            signer,
            reconciler,
            locks: Arc::new(UserLocks::new()),
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Opens the blob store selected by `STORAGE_BACKEND`.
pub async fn build_blob_store(
    config: &Config,
    signer: UrlSigner,
) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.storage.backend {
        StorageBackend::Local => {
            let store = LocalDiskStore::open(&config.storage.root, signer).await?;
            info!(root = %store.root().display(), "Using local disk blob store");
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            info!("Using in-memory blob store; images are lost on restart");
            Ok(Arc::new(MemoryBlobStore::new(signer)))
        }
    }
}

/// Builds the router
///
/// ```text
/// /
/// ├── GET  /health
/// └── /v1/
///     ├── /users/
///     │   ├── POST   /register
///     │   ├── POST   /login
///     │   ├── POST   /refresh
///     │   ├── GET    /            (bearer)
///     │   ├── GET    /:id         (bearer)
///     │   ├── PUT    /:id         (bearer)
///     │   └── DELETE /:id         (bearer)
///     ├── POST /uploads           (multipart)
///     └── GET  /blobs/*key        (signed URL)
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_user_routes = Router::new()
        .route("/register", post(routes::users::register))
        .route("/login", post(routes::users::login))
        .route("/refresh", post(routes::users::refresh));

    let protected_user_routes = Router::new()
        .route("/", get(routes::users::list_users))
        .route(
            "/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let upload_routes = Router::new()
        .route("/", post(routes::uploads::upload_image))
        .layer(DefaultBodyLimit::max(
            state.config.api.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ));

    let blob_routes = Router::new().route("/*key", get(routes::blobs::serve_blob));

    let v1_routes = Router::new()
        .nest("/users", public_user_routes.merge(protected_user_routes))
        .nest("/uploads", upload_routes)
        .nest("/blobs", blob_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Validates the bearer token and stores the caller's `AuthContext` in the
/// request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_context = authenticate_bearer(req.headers(), state.jwt_secret())?;
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}
