//! Public storefront catalog.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::db;
use crate::db::events::{Event, TicketType};
use crate::db::products::Product;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn list_products(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(db::products::list_active(&state.pool).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWithTypes {
    #[serde(flatten)]
    pub event: Event,
    pub ticket_types: Vec<TicketType>,
}

pub async fn list_events(State(state): State<AppState>) -> AppResult<Json<Vec<EventWithTypes>>> {
    let events = db::events::list_published(&state.pool).await?;
    let mut out = Vec::with_capacity(events.len());
    for event in events {
        let ticket_types = db::events::ticket_types_for(&state.pool, &event.id, true).await?;
        out.push(EventWithTypes {
            event,
            ticket_types,
        });
    }
    Ok(Json(out))
}

pub async fn event_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<EventWithTypes>> {
    let event = db::events::find_by_slug(&state.pool, &slug)
        .await?
        .filter(|e| e.published && e.active)
        .ok_or_else(|| AppError::not_found(format!("event {slug} not found")))?;
    let ticket_types = db::events::ticket_types_for(&state.pool, &event.id, true).await?;
    Ok(Json(EventWithTypes {
        event,
        ticket_types,
    }))
}
