use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};

use clinicflow_core::{ConsumableItemId, InventoryItemId, TheaterStoreId};
use clinicflow_infra::TheaterRestock;
use clinicflow_inventory::{NewConsumable, NewInventoryItem, NewTheaterStore};

use crate::app::services::{AppServices, run};
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/consumables", post(create_consumable).get(list_consumables))
        .route("/consumables/low-stock", get(low_stock))
        .route("/consumables/:id", get(get_consumable))
        .route("/consumables/:id/restock", post(restock_consumable))
        .route("/consumables/:id/usage", get(usage_of_consumable))
        .route("/value", get(stock_value))
        .route("/theater-stores", post(create_theater_store).get(list_theater_stores))
        .route("/theater-stores/:id", get(get_theater_store))
        .route("/theater-stores/:id/restock", post(restock_theater_store))
        .route("/theater-stores/:id/deactivate", post(deactivate_theater_store))
        .route("/theater-stores/:id/usage", get(usage_from_store))
        .route("/inventory-items", post(create_inventory_item).get(list_inventory_items))
        .route("/inventory-items/:id", get(get_inventory_item))
}

fn items<T: serde::Serialize>(result: clinicflow_infra::ServiceResult<Vec<T>>) -> Response {
    errors::respond(StatusCode::OK, result.map(|items| serde_json::json!({ "items": items })))
}

// -------------------------
// General store
// -------------------------

pub async fn create_consumable(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewConsumable>,
) -> Response {
    let user = actor.user_id();
    errors::respond(
        StatusCode::CREATED,
        run(&services, move |s| s.create_consumable(user, body)).await,
    )
}

pub async fn list_consumables(Extension(services): Extension<Arc<AppServices>>) -> Response {
    items(run(&services, |s| s.consumables()).await)
}

pub async fn low_stock(Extension(services): Extension<Arc<AppServices>>) -> Response {
    items(run(&services, |s| s.low_stock_consumables()).await)
}

pub async fn get_consumable(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let id = match errors::parse::<ConsumableItemId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = run(&services, move |s| {
        let item = s.consumable(id)?;
        let theater_stock = s.theater_stock_of(id)?;
        Ok(serde_json::json!({ "item": item, "theater_stock": theater_stock }))
    })
    .await;
    errors::respond(StatusCode::OK, result)
}

pub async fn restock_consumable(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RestockRequest>,
) -> Response {
    let id = match errors::parse::<ConsumableItemId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let user = actor.user_id();
    errors::respond(
        StatusCode::OK,
        run(&services, move |s| s.restock_general(id, user, body.quantity)).await,
    )
}

pub async fn usage_of_consumable(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    match errors::parse::<ConsumableItemId>(&id) {
        Ok(id) => items(run(&services, move |s| s.usage_by_item(id)).await),
        Err(resp) => resp,
    }
}

pub async fn stock_value(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(
        StatusCode::OK,
        run(&services, |s| s.general_stock_value())
            .await
            .map(|value| serde_json::json!({ "general_stock_value": value })),
    )
}

// -------------------------
// Theater stores
// -------------------------

pub async fn create_theater_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewTheaterStore>,
) -> Response {
    let user = actor.user_id();
    errors::respond(
        StatusCode::CREATED,
        run(&services, move |s| s.create_theater_store(user, body)).await,
    )
}

pub async fn list_theater_stores(Extension(services): Extension<Arc<AppServices>>) -> Response {
    items(run(&services, |s| s.theater_stores()).await)
}

pub async fn get_theater_store(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let id = match errors::parse::<TheaterStoreId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = run(&services, move |s| {
        let store = s.theater_store(id)?;
        let rows = s.theater_store_contents(id)?;
        Ok(serde_json::json!({ "store": store, "items": rows }))
    })
    .await;
    errors::respond(StatusCode::OK, result)
}

pub async fn restock_theater_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<TheaterRestock>,
) -> Response {
    let id = match errors::parse::<TheaterStoreId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let user = actor.user_id();
    errors::respond(
        StatusCode::OK,
        run(&services, move |s| s.restock_theater_store(id, user, body)).await,
    )
}

pub async fn deactivate_theater_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match errors::parse::<TheaterStoreId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let user = actor.user_id();
    errors::respond(
        StatusCode::OK,
        run(&services, move |s| s.deactivate_theater_store(id, user)).await,
    )
}

pub async fn usage_from_store(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    match errors::parse::<TheaterStoreId>(&id) {
        Ok(id) => items(run(&services, move |s| s.usage_by_store(id)).await),
        Err(resp) => resp,
    }
}

// -------------------------
// Dispensary / optics
// -------------------------

pub async fn create_inventory_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewInventoryItem>,
) -> Response {
    let user = actor.user_id();
    errors::respond(
        StatusCode::CREATED,
        run(&services, move |s| s.create_inventory_item(user, body)).await,
    )
}

pub async fn list_inventory_items(Extension(services): Extension<Arc<AppServices>>) -> Response {
    items(run(&services, |s| s.inventory_items()).await)
}

pub async fn get_inventory_item(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    match errors::parse::<InventoryItemId>(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.inventory_item(id)).await,
        ),
        Err(resp) => resp,
    }
}
