use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{Method, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use herbarium_media::{FsAssetStorage, ImageCodec, ImageStore, QrGenerator, UploadIntake};
use herbarium_shared::policy::{CAN_CATALOG, CAN_CURATE};
use herbarium_shared::specimen::SpecimenSummary;
use herbarium_shared::{ImageDescriptor, SpecimenRecord};
use herbarium_store::{Database, GroupCount, SpecimenFilter};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::access::{
    CollectionStats, Page, PageRequest, Pagination, PublicFilter, PublicLookup, PublicStats,
};
use crate::auth::{self, AuthUser};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::form::SpecimenForm;
use crate::lifecycle::Catalog;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub catalog: Catalog,
    pub intake: UploadIntake,
    pub signing_key: Arc<SigningKey>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Open the database and asset directory named by `config` and wire the
    /// media pipeline to them.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let db = Arc::new(Mutex::new(Database::open_at(&config.database_path)?));

        let storage = FsAssetStorage::new(config.images_dir()).await?;
        let images = ImageStore::new(config.storage_mode, ImageCodec::default(), Arc::new(storage));

        let catalog = Catalog::new(
            db.clone(),
            images.clone(),
            QrGenerator::default(),
            config.public_base_url.clone(),
        );

        Ok(Self {
            db,
            catalog,
            intake: UploadIntake::new(images),
            signing_key: Arc::new(config.signing_key()),
            config: Arc::new(config),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let uploads = ServeDir::new(&state.config.upload_dir);
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/profile", get(auth::profile))
        .route("/api/auth/users", get(auth::list_users))
        .route("/api/plants/stats", get(specimen_stats))
        .route("/api/plants", get(list_specimens).post(create_specimen))
        .route(
            "/api/plants/{id}",
            get(get_specimen).put(update_specimen).delete(delete_specimen),
        )
        .route("/api/plants/{id}/images", post(add_images))
        .route("/api/plants/{id}/images/{image_id}", delete(delete_image))
        .route("/public/specimen/{occurrence_id}", get(public_specimen))
        .route("/public/plants/{occurrence_id}", get(public_specimen))
        .route("/public/specimens", get(public_specimens))
        .route("/public/families", get(public_families))
        .route("/public/stats", get(public_stats))
        .nest_service("/uploads", uploads)
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// `{ success, message?, data?, pagination? }`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<Pagination>,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            pagination: None,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(data)
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::new(data)
        }
    }
}

impl Envelope<()> {
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            pagination: None,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct SpecimenData {
    plant: SpecimenRecord,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedData {
    qr_code: Option<String>,
    images_uploaded: usize,
    plant: SpecimenRecord,
}

#[derive(Serialize)]
struct ImagesData {
    images: Vec<ImageDescriptor>,
    total: usize,
}

#[derive(Serialize)]
struct SpecimensData {
    specimens: Vec<SpecimenSummary>,
}

#[derive(Serialize)]
struct FamiliesData {
    families: Vec<GroupCount>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
    })
}

async fn route_not_found() -> ServerError {
    ServerError::NotFound("Route not found".into())
}

/// Record ids are UUIDs; anything else cannot name a record.
fn parse_id(raw: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServerError::not_found())
}

async fn specimen_stats(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Envelope<CollectionStats>>, ServerError> {
    let stats = state.catalog.stats().await?;
    Ok(Json(Envelope::new(stats)))
}

async fn list_specimens(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(filter): Query<SpecimenFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Envelope<Vec<SpecimenRecord>>>, ServerError> {
    let (records, pagination) = state
        .catalog
        .list(&filter, Page::authenticated(&page))
        .await?;
    Ok(Json(Envelope::paginated(records, pagination)))
}

async fn create_specimen(
    State(state): State<AppState>,
    auth: AuthUser,
    form: SpecimenForm,
) -> Result<(StatusCode, Json<Envelope<CreatedData>>), ServerError> {
    auth.require(CAN_CATALOG)?;

    let images = state
        .intake
        .ingest(form.files, form.descriptions.as_deref())
        .await?;
    let record = state
        .catalog
        .create(form.fields, images, Some(auth.id()))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            "Specimen created",
            CreatedData {
                qr_code: record.qr_code_data_url.clone(),
                images_uploaded: record.images.len(),
                plant: record,
            },
        )),
    ))
}

async fn get_specimen(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<SpecimenData>>, ServerError> {
    let record = state.catalog.get(parse_id(&id)?).await?;
    Ok(Json(Envelope::new(SpecimenData { plant: record })))
}

async fn update_specimen(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    form: SpecimenForm,
) -> Result<Json<Envelope<SpecimenData>>, ServerError> {
    auth.require(CAN_CATALOG)?;
    let id = parse_id(&id)?;

    let images = state
        .intake
        .ingest(form.files, form.descriptions.as_deref())
        .await?;
    let record = state
        .catalog
        .update(id, form.fields, images, Some(auth.id()))
        .await?;

    Ok(Json(Envelope::with_message(
        "Specimen updated",
        SpecimenData { plant: record },
    )))
}

async fn delete_specimen(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ServerError> {
    auth.require(CAN_CURATE)?;
    state
        .catalog
        .soft_delete(parse_id(&id)?, Some(auth.id()))
        .await?;
    Ok(Json(Envelope::message_only("Specimen deleted")))
}

async fn add_images(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    form: SpecimenForm,
) -> Result<Json<Envelope<ImagesData>>, ServerError> {
    auth.require(CAN_CATALOG)?;
    let id = parse_id(&id)?;

    let images = state
        .intake
        .ingest(form.files, form.descriptions.as_deref())
        .await?;
    let added = images.len();
    let record = state.catalog.add_images(id, images, Some(auth.id())).await?;

    info!(id = %id, added, "Images attached via API");
    Ok(Json(Envelope::with_message(
        format!("{added} image(s) added"),
        ImagesData {
            total: record.images.len(),
            images: record.images,
        },
    )))
}

async fn delete_image(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, image_id)): Path<(String, String)>,
) -> Result<Json<Envelope<ImagesData>>, ServerError> {
    auth.require(CAN_CURATE)?;
    let record = state
        .catalog
        .delete_image(parse_id(&id)?, &image_id, Some(auth.id()))
        .await?;

    Ok(Json(Envelope::with_message(
        "Image deleted",
        ImagesData {
            total: record.images.len(),
            images: record.images,
        },
    )))
}

async fn public_specimen(
    State(state): State<AppState>,
    Path(occurrence_id): Path<String>,
) -> Result<Json<Envelope<PublicLookup>>, ServerError> {
    let lookup = state.catalog.public_lookup(&occurrence_id).await?;
    Ok(Json(Envelope::new(lookup)))
}

async fn public_specimens(
    State(state): State<AppState>,
    Query(filter): Query<PublicFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Envelope<SpecimensData>>, ServerError> {
    let (specimens, pagination) = state
        .catalog
        .public_list(filter, Page::public(&page))
        .await?;
    Ok(Json(Envelope::paginated(
        SpecimensData { specimens },
        pagination,
    )))
}

async fn public_families(
    State(state): State<AppState>,
) -> Result<Json<Envelope<FamiliesData>>, ServerError> {
    let families = state.catalog.families().await?;
    Ok(Json(Envelope::new(FamiliesData { families })))
}

async fn public_stats(
    State(state): State<AppState>,
) -> Result<Json<Envelope<PublicStats>>, ServerError> {
    let stats = state
        .catalog
        .public_stats(&state.config.collection_name)
        .await?;
    Ok(Json(Envelope::new(stats)))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
