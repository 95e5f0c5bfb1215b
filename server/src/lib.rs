use anyhow::Result;
use annotation_core::model::{Annotation, AnnotationId, AnnotationLabel, BoundingBox, DocTypeId, DocumentContext, PendingAnnotation, PendingRelation, RelationGroup, RelationId, RelationSide};
use annotation_core::persist::load_pages;
use annotation_core::search::{search, SearchOptions, SearchResult, SearchSession};
use annotation_core::selection::SelectionBuilder;
use annotation_core::sled_remote::SledRemoteStore;
use annotation_core::store::AnnotationStore;
use annotation_core::token_index::TokenIndex;
use annotation_core::StoreError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ServerConfig {
    /// Pages JSON for the document being annotated.
    pub pages: PathBuf,
    /// Directory of the sled database backing the remote store.
    pub db: PathBuf,
    pub corpus_id: String,
    pub document_id: String,
    pub context_chars: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AnnotationStore>,
    pub index: Arc<TokenIndex>,
    pub selection: Arc<Mutex<SelectionBuilder>>,
    pub search_session: Arc<Mutex<SearchSession>>,
    pub search_options: SearchOptions,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub context_chars: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchResult>,
}

#[derive(Deserialize)]
pub struct SessionTermBody {
    pub term: String,
}

/// Cursor state of the search session and the hit it points at.
#[derive(Serialize)]
pub struct SessionView {
    pub term: String,
    pub total_hits: usize,
    pub selected: usize,
    pub result: Option<SearchResult>,
}

impl SessionView {
    fn of(session: &SearchSession) -> Self {
        Self {
            term: session.term().to_string(),
            total_hits: session.results().len(),
            selected: session.selected(),
            result: session.selected_result().cloned(),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct ReviewBody {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Deserialize)]
pub struct AddToRelationBody {
    pub annotation_ids: Vec<AnnotationId>,
    pub side: RelationSide,
}

#[derive(Deserialize)]
pub struct SelectionBox {
    pub page_index: usize,
    pub bounds: BoundingBox,
}

#[derive(Deserialize)]
pub struct CommitBody {
    #[serde(default)]
    pub label: Option<AnnotationLabel>,
}

/// Store failures as HTTP responses: validation → 4xx, remote failure → 502.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self { ApiError(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::MissingContext => StatusCode::CONFLICT,
            StoreError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            StoreError::UnknownAnnotation(_) | StoreError::UnknownRelation(_) => StatusCode::NOT_FOUND,
            StoreError::EmptyText | StoreError::EmptyRelationSide | StoreError::ConflictingReview(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Remote(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Opens the sled-backed store, indexes the document and loads its annotations.
pub async fn build_app(config: ServerConfig) -> Result<Router> {
    let pages = load_pages(&config.pages)?;
    let index = TokenIndex::build(&pages);
    let remote = SledRemoteStore::open(&config.db)?;
    let store = AnnotationStore::new(Arc::new(remote));
    store.set_context(Some(DocumentContext::new(config.corpus_id, config.document_id)));
    store.refresh().await?;
    tracing::info!(pages = pages.len(), annotations = store.snapshot().annotations.len(), "document ready");
    let search_options = SearchOptions { context_chars: config.context_chars };
    Ok(router(AppState {
        store: Arc::new(store),
        index: Arc::new(index),
        selection: Arc::new(Mutex::new(SelectionBuilder::new())),
        search_session: Arc::new(Mutex::new(SearchSession::new(search_options))),
        search_options,
    }))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/annotations", get(snapshot_handler).post(create_annotation))
        .route("/annotations/refresh", post(refresh_handler))
        .route("/annotations/:id", put(update_annotation).delete(delete_annotation))
        .route("/annotations/:id/approve", post(approve_annotation))
        .route("/annotations/:id/reject", post(reject_annotation))
        .route("/relations", post(create_relation).put(update_relations))
        .route("/relations/:id", delete(delete_relation))
        .route("/relations/:id/annotations", post(add_to_relation))
        .route("/relations/:id/annotations/:annotation_id", delete(remove_from_relation))
        .route("/doc-types", post(create_doc_type))
        .route("/doc-types/:id", delete(delete_doc_type))
        .route("/search", get(search_handler))
        .route("/search/session", get(session_handler).post(set_session_term).delete(clear_session))
        .route("/search/session/next", post(next_hit))
        .route("/search/session/prev", post(previous_hit))
        .route("/selection", get(selection_handler).delete(cancel_selection))
        .route("/selection/active", post(set_active_selection))
        .route("/selection/queue", post(enqueue_selection))
        .route("/selection/commit", post(commit_selection))
        .route("/notices", get(notices_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn snapshot_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(&*state.store.snapshot()).unwrap_or_default())
}

async fn refresh_handler(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let snapshot = state.store.refresh().await?;
    Ok(Json(serde_json::to_value(&*snapshot).unwrap_or_default()))
}

async fn create_annotation(State(state): State<AppState>, Json(candidate): Json<PendingAnnotation>) -> ApiResult<(StatusCode, Json<Annotation>)> {
    let created = state.store.create_annotation(candidate).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_annotation(State(state): State<AppState>, Path(id): Path<String>, Json(mut updated): Json<Annotation>) -> ApiResult<Json<Annotation>> {
    updated.id = AnnotationId(id);
    Ok(Json(state.store.update_annotation(updated).await?))
}

async fn delete_annotation(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<annotation_core::CascadePlan>> {
    Ok(Json(state.store.delete_annotation(&AnnotationId(id)).await?))
}

async fn approve_annotation(State(state): State<AppState>, Path(id): Path<String>, body: Option<Json<ReviewBody>>) -> ApiResult<Json<Annotation>> {
    let comment = body.and_then(|Json(b)| b.comment);
    Ok(Json(state.store.approve_annotation(&AnnotationId(id), comment.as_deref()).await?))
}

async fn reject_annotation(State(state): State<AppState>, Path(id): Path<String>, body: Option<Json<ReviewBody>>) -> ApiResult<Json<Annotation>> {
    let comment = body.and_then(|Json(b)| b.comment);
    Ok(Json(state.store.reject_annotation(&AnnotationId(id), comment.as_deref()).await?))
}

async fn create_relation(State(state): State<AppState>, Json(candidate): Json<PendingRelation>) -> ApiResult<(StatusCode, Json<RelationGroup>)> {
    let created = state.store.create_relation(candidate).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_relations(State(state): State<AppState>, Json(relations): Json<Vec<RelationGroup>>) -> ApiResult<Json<Vec<RelationGroup>>> {
    Ok(Json(state.store.update_relations(relations).await?))
}

async fn delete_relation(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.store.delete_relation(&RelationId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_to_relation(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<AddToRelationBody>) -> ApiResult<Json<RelationGroup>> {
    Ok(Json(state.store.add_annotations_to_relation(&RelationId(id), &body.annotation_ids, body.side).await?))
}

async fn remove_from_relation(State(state): State<AppState>, Path((id, annotation_id)): Path<(String, String)>) -> ApiResult<Json<annotation_core::RelationChange>> {
    Ok(Json(state.store.remove_annotation_from_relation(&AnnotationId(annotation_id), &RelationId(id)).await?))
}

async fn create_doc_type(State(state): State<AppState>, Json(label): Json<AnnotationLabel>) -> ApiResult<(StatusCode, Json<annotation_core::DocTypeAnnotation>)> {
    let created = state.store.create_doc_type_annotation(&label).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_doc_type(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.store.delete_doc_type_annotation(&DocTypeId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let options = SearchOptions { context_chars: params.context_chars.unwrap_or(state.search_options.context_chars) };
    let results = search(&params.q, &state.index, &options);
    Json(SearchResponse { query: params.q, took_s: start.elapsed().as_secs_f64(), total_hits: results.len(), results })
}

async fn session_handler(State(state): State<AppState>) -> Json<SessionView> {
    Json(SessionView::of(&state.search_session.lock()))
}

/// Searches again only when the term changed; the cursor is kept otherwise.
async fn set_session_term(State(state): State<AppState>, Json(body): Json<SessionTermBody>) -> Json<SessionView> {
    let mut session = state.search_session.lock();
    session.set_term(&body.term, &state.index);
    Json(SessionView::of(&session))
}

async fn next_hit(State(state): State<AppState>) -> Json<SessionView> {
    let mut session = state.search_session.lock();
    session.advance();
    Json(SessionView::of(&session))
}

async fn previous_hit(State(state): State<AppState>) -> Json<SessionView> {
    let mut session = state.search_session.lock();
    session.reverse();
    Json(SessionView::of(&session))
}

async fn clear_session(State(state): State<AppState>) -> StatusCode {
    state.search_session.lock().clear();
    StatusCode::NO_CONTENT
}

async fn selection_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let selection = state.selection.lock();
    Json(serde_json::json!({ "queue": selection.queue(), "active": selection.active() }))
}

async fn set_active_selection(State(state): State<AppState>, Json(body): Json<SelectionBox>) -> StatusCode {
    state.selection.lock().set_active(body.page_index, body.bounds);
    StatusCode::NO_CONTENT
}

async fn enqueue_selection(State(state): State<AppState>, Json(body): Json<SelectionBox>) -> StatusCode {
    state.selection.lock().enqueue(body.page_index, body.bounds);
    StatusCode::NO_CONTENT
}

async fn cancel_selection(State(state): State<AppState>) -> StatusCode {
    state.selection.lock().cancel();
    StatusCode::NO_CONTENT
}

/// Commits the gesture. Without a label nothing happens and the gesture is kept.
async fn commit_selection(State(state): State<AppState>, Json(body): Json<CommitBody>) -> ApiResult<Response> {
    let pending = state.selection.lock().commit(&state.index, body.label.as_ref());
    match pending {
        Some(candidate) => {
            let created = state.store.create_annotation(candidate).await?;
            Ok((StatusCode::CREATED, Json(created)).into_response())
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn notices_handler(State(state): State<AppState>) -> Json<Vec<annotation_core::Notice>> {
    Json(state.store.drain_notices())
}
