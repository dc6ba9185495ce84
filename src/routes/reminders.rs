use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::reminder::{CalendarEvent, CreateReminderRequest, ReminderQuery, UpdateReminderRequest},
    services::{dispatch::DeliveryError, reminders::ReminderService, scheduler::Registration},
    AppState,
};

type ApiError = (StatusCode, Json<Value>);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

fn not_found(id: Uuid) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Reminder {id} not found") })),
    )
}

fn to_json(value: impl serde::Serialize) -> Result<Json<Value>, ApiError> {
    serde_json::to_value(value).map(Json).map_err(internal)
}

fn registration_json(registration: Registration) -> Value {
    match registration {
        Registration::Scheduled { fire_at, trigger } => json!({
            "scheduled": true,
            "fire_at": fire_at,
            "trigger": trigger.to_string(),
        }),
        Registration::Stale => json!({ "scheduled": false }),
    }
}

pub async fn list_reminders(
    State(state): State<AppState>,
    Query(query): Query<ReminderQuery>,
) -> Result<Json<Value>, ApiError> {
    let reminders = state.store.find(&query).await.map_err(internal)?;
    to_json(reminders)
}

pub async fn calendar(
    State(state): State<AppState>,
    Query(query): Query<ReminderQuery>,
) -> Result<Json<Value>, ApiError> {
    let reminders = state.store.find(&query).await.map_err(internal)?;
    let events: Vec<CalendarEvent> = reminders.iter().map(CalendarEvent::from).collect();
    to_json(events)
}

/// GET /reminders/scheduled: timers currently pending in this process.
pub async fn list_scheduled(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    to_json(state.scheduler.pending())
}

pub async fn get_reminder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    match state.store.find_populated(id).await.map_err(internal)? {
        Some(populated) => to_json(populated),
        None => Err(not_found(id)),
    }
}

pub async fn create_reminder(
    State(state): State<AppState>,
    Json(body): Json<CreateReminderRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.title.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Title is required" })),
        ));
    }

    let (reminder, registration) = ReminderService::create(&*state.store, &state.scheduler, &body)
        .await
        .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "reminder": reminder, "schedule": registration_json(registration) })),
    ))
}

pub async fn update_reminder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateReminderRequest>,
) -> Result<Json<Value>, ApiError> {
    let (reminder, registration) =
        ReminderService::update(&*state.store, &state.scheduler, id, &body)
            .await
            .map_err(internal)?
            .ok_or_else(|| not_found(id))?;

    Ok(Json(json!({ "reminder": reminder, "schedule": registration_json(registration) })))
}

pub async fn delete_reminder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !ReminderService::delete(&*state.store, &state.scheduler, id)
        .await
        .map_err(internal)?
    {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /reminders/{id}/send: deliver immediately, independent of the timer.
pub async fn send_now(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    match state.scheduler.deliver_now(id).await {
        Ok(summary) => to_json(summary),
        Err(e @ DeliveryError::NotFound(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": e.to_string() })),
        )),
        Err(e @ DeliveryError::NoRecipients(_)) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )),
        Err(DeliveryError::Store(e)) => Err(internal(format!("{e:#}"))),
    }
}
