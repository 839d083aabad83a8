use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    handler::Handler,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Extension, Json, Router,
};
use http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    drinks::{DrinkStore, RecipeInput, StoreError},
    Authorizer, VerifiedClaims,
};

/// Builds the drinks API. Every route but `GET /drinks` is guarded by its own permission.
pub fn router(drinks: Arc<DrinkStore>, authorizer: &Authorizer) -> Router {
    Router::new()
        .route(
            "/drinks",
            get(list_drinks).post(create_drink.layer(authorizer.require("post:drinks"))),
        )
        .route(
            "/drinks-detail",
            get(list_drink_details.layer(authorizer.require("get:drinks-detail"))),
        )
        .route(
            "/drinks/{id}",
            patch(update_drink.layer(authorizer.require("patch:drinks")))
                .delete(delete_drink.layer(authorizer.require("delete:drinks"))),
        )
        .fallback(|| async { ApiError::NotFound })
        .with_state(drinks)
}

#[derive(Debug, Deserialize)]
struct DrinkPayload {
    title: Option<String>,
    recipe: Option<RecipeInput>,
}

async fn list_drinks(State(drinks): State<Arc<DrinkStore>>) -> Json<Value> {
    let drinks: Vec<_> = drinks.list().await.iter().map(|drink| drink.short()).collect();
    Json(json!({ "success": true, "drinks": drinks }))
}

async fn list_drink_details(
    Extension(_claims): Extension<VerifiedClaims>,
    State(drinks): State<Arc<DrinkStore>>,
) -> Json<Value> {
    let drinks: Vec<_> = drinks.list().await.iter().map(|drink| drink.long()).collect();
    Json(json!({ "success": true, "drinks": drinks }))
}

async fn create_drink(
    Extension(claims): Extension<VerifiedClaims>,
    State(drinks): State<Arc<DrinkStore>>,
    payload: Result<Json<DrinkPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let (Some(title), Some(recipe)) = (payload.title, payload.recipe) else {
        return Err(ApiError::BadRequest("title and recipe are required"));
    };

    let drink = drinks.insert(title, recipe.into()).await?;
    tracing::info!(id = drink.id, subject = ?claims.subject(), "drink created");
    Ok(Json(json!({ "success": true, "drinks": [drink.long()] })))
}

async fn update_drink(
    Extension(claims): Extension<VerifiedClaims>,
    State(drinks): State<Arc<DrinkStore>>,
    Path(id): Path<u64>,
    payload: Result<Json<DrinkPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let drink = drinks
        .update(id, payload.title, payload.recipe.map(Into::into))
        .await?;
    tracing::info!(id, subject = ?claims.subject(), "drink updated");
    Ok(Json(json!({ "success": true, "drinks": [drink.long()] })))
}

async fn delete_drink(
    Extension(claims): Extension<VerifiedClaims>,
    State(drinks): State<Arc<DrinkStore>>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    drinks.delete(id).await?;
    tracing::info!(id, subject = ?claims.subject(), "drink deleted");
    Ok(Json(json!({ "success": true, "delete": id })))
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("resource not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unprocessable: {0}")]
    Unprocessable(#[from] JsonRejection),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound | ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let body = Json(json!({
            "success": false,
            "error": status_code.as_u16(),
            "message": self.to_string(),
        }));
        (status_code, body).into_response()
    }
}
