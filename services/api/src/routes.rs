//! API service routes
//!
//! Everything except `/health` requires a bearer token of an active staff user.

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use booking::models::meeting::date_window;
use booking::models::{BookingRequestFilter, DepartmentCount, MeetingFilter};
use booking::reporting::{DashboardSummary, DepartmentDetail, DepartmentSummary, MeetingStats};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    middleware::{AuthUser, auth_middleware},
    models::{
        BookingRequestResponse, ListResponse, MeetingQuery, MeetingResponse, RejectRequest,
        RequestQuery, UpdateMeetingRequest,
    },
};

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/requests", get(get_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/approve", post(approve_request))
        .route("/requests/:id/reject", post(reject_request))
        .route("/requests/:id/cancel", post(cancel_request))
        .route("/meetings", get(get_meetings))
        .route("/meetings/:id", get(get_meeting).patch(update_meeting))
        .route("/meetings/:id/cancel", post(cancel_meeting))
        .route("/meetings/:id/activate", post(activate_meeting))
        .route("/departments", get(get_departments))
        .route("/departments/:id", get(get_department))
        .route("/stats/meetings", get(get_meeting_stats))
        .route("/stats/departments", get(get_department_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "api-service"
    }))
}

pub async fn get_dashboard(State(state): State<AppState>) -> ApiResult<Json<DashboardSummary>> {
    Ok(Json(state.reporter.dashboard().await?))
}

/// List booking requests, newest first
pub async fn get_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestQuery>,
) -> ApiResult<Json<ListResponse<BookingRequestResponse>>> {
    let requests = state
        .lifecycle
        .list_requests(&BookingRequestFilter {
            status: query.status,
            department_id: query.department_id,
            requested_by: None,
            limit: Some(query.page_size()),
        })
        .await?;

    Ok(Json(ListResponse::new(requests)))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BookingRequestResponse>> {
    Ok(Json(state.lifecycle.get_request(id).await?.into()))
}

/// Approve a pending request and return the meeting it became
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MeetingResponse>> {
    let meeting = state.lifecycle.approve(id, user.id).await?;
    info!("Request {} approved through the API by {}", id, user.id);
    Ok(Json(meeting.into()))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectRequest>>,
) -> ApiResult<Json<BookingRequestResponse>> {
    let reason = body.and_then(|Json(body)| body.reason);
    let request = state.lifecycle.reject(id, user.id, reason).await?;
    Ok(Json(request.into()))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BookingRequestResponse>> {
    let request = state.lifecycle.cancel_request(id, user.id).await?;
    Ok(Json(request.into()))
}

/// List active meetings, latest start first
pub async fn get_meetings(
    State(state): State<AppState>,
    Query(query): Query<MeetingQuery>,
) -> ApiResult<Json<ListResponse<MeetingResponse>>> {
    let starts_within = match query.date {
        Some(date) => Some(
            date_window(date, state.lifecycle.policy().reference_offset)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid date {}", date)))?,
        ),
        None => None,
    };

    let meetings = state
        .lifecycle
        .list_meetings(&MeetingFilter {
            status: query.status,
            department_id: query.department_id,
            starts_within,
            limit: Some(query.page_size()),
            ..Default::default()
        })
        .await?;

    Ok(Json(ListResponse::new(meetings)))
}

pub async fn get_meeting(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MeetingResponse>> {
    Ok(Json(state.lifecycle.get_meeting(id).await?.into()))
}

/// Attach provisioning details to a meeting
pub async fn update_meeting(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMeetingRequest>,
) -> ApiResult<Json<MeetingResponse>> {
    let meeting = state.lifecycle.update_meeting(id, &body.into()).await?;
    Ok(Json(meeting.into()))
}

pub async fn cancel_meeting(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MeetingResponse>> {
    Ok(Json(state.lifecycle.cancel_meeting(id, user.id).await?.into()))
}

pub async fn activate_meeting(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MeetingResponse>> {
    Ok(Json(state.lifecycle.activate_meeting(id, user.id).await?.into()))
}

pub async fn get_departments(
    State(state): State<AppState>,
) -> ApiResult<Json<ListResponse<DepartmentSummary>>> {
    Ok(Json(ListResponse::new(
        state.reporter.department_summaries().await?,
    )))
}

pub async fn get_department(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DepartmentDetail>> {
    Ok(Json(state.reporter.department_detail(id).await?))
}

pub async fn get_meeting_stats(State(state): State<AppState>) -> ApiResult<Json<MeetingStats>> {
    Ok(Json(state.reporter.meeting_stats().await?))
}

pub async fn get_department_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DepartmentCount>>> {
    Ok(Json(state.reporter.department_stats().await?))
}
