use axum::{
    extract::{rejection::JsonRejection, OriginalUri, Path, Query, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use shared::{ApiResponse, FieldError};
use std::collections::HashMap;
use tracing::info;

use crate::domain::GestionService;
use crate::error::ApiError;
use crate::validation;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gestiones: GestionService,
}

impl AppState {
    pub fn new(gestiones: GestionService) -> Self {
        Self { gestiones }
    }
}

/// Build the full application router. Static files and CORS are layered
/// on top by the caller.
pub fn router(state: AppState) -> Router {
    let gestiones = Router::new()
        .route("/", get(list_gestiones).post(create_gestion))
        // registered before /:id so the literal segment wins
        .route("/estadisticas", get(get_estadisticas))
        .route(
            "/:id",
            get(get_gestion)
                .put(update_gestion)
                .patch(patch_gestion)
                .delete(delete_gestion),
        );

    let api = Router::new()
        .route("/", get(api_info))
        .route("/health", get(api_health))
        .nest("/gestiones", gestiones)
        .fallback(api_not_found);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(state)
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Servidor funcionando correctamente",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}

/// GET /api/v1/health
async fn api_health() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "API funcionando correctamente",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}

/// GET /api/v1
async fn api_info() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "API BPO - Gestión de Contactos",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "gestiones": "/api/v1/gestiones",
            "health": "/health",
        },
    }))
}

/// JSON 404 for anything under /api/v1 that no route claims
async fn api_not_found(method: Method, OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    let body: ApiResponse<()> =
        ApiResponse::error(format!("Ruta {method} {uri} no encontrada"));
    (StatusCode::NOT_FOUND, Json(body))
}

/// Unwrap a JSON body, turning extractor rejections (malformed JSON,
/// wrong content-type) into the standard validation envelope.
fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::Validation(vec![FieldError::new(
            "body",
            format!("El cuerpo debe ser JSON válido: {}", rejection.body_text()),
        )])),
    }
}

/// POST /api/v1/gestiones
async fn create_gestion(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    info!("POST /api/v1/gestiones");

    let body = json_body(body)?;
    let draft = validation::validate_draft(&body).map_err(ApiError::Validation)?;
    let gestion = state.gestiones.create(draft).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Gestión creada exitosamente", gestion)),
    ))
}

/// GET /api/v1/gestiones
async fn list_gestiones(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    info!("GET /api/v1/gestiones - query: {:?}", params);

    // Query strings arrive untyped; the schema does the coercion
    let raw = Value::Object(
        params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    );
    let filter = validation::validate_list_query(&raw).map_err(ApiError::Validation)?;
    let (rows, pagination) = state.gestiones.list(filter).await?;

    Ok(Json(
        ApiResponse::ok("Gestiones obtenidas exitosamente", rows).with_pagination(pagination),
    ))
}

/// GET /api/v1/gestiones/estadisticas
async fn get_estadisticas(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    info!("GET /api/v1/gestiones/estadisticas");

    let stats = state.gestiones.statistics().await?;
    Ok(Json(ApiResponse::ok(
        "Estadísticas obtenidas exitosamente",
        stats,
    )))
}

/// GET /api/v1/gestiones/:id
async fn get_gestion(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = validation::parse_id(&raw_id).map_err(ApiError::Validation)?;
    info!("GET /api/v1/gestiones/{id}");

    match state.gestiones.get_by_id(id).await? {
        Some(gestion) => Ok(Json(ApiResponse::ok(
            "Gestión obtenida exitosamente",
            gestion,
        ))),
        None => Err(not_found(id)),
    }
}

/// PUT /api/v1/gestiones/:id
async fn update_gestion(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = validation::parse_id(&raw_id).map_err(ApiError::Validation)?;
    info!("PUT /api/v1/gestiones/{id}");

    let body = json_body(body)?;
    let draft = validation::validate_draft(&body).map_err(ApiError::Validation)?;
    match state.gestiones.update(id, draft).await? {
        Some(gestion) => Ok(Json(ApiResponse::ok(
            "Gestión actualizada exitosamente",
            gestion,
        ))),
        None => Err(not_found(id)),
    }
}

/// PATCH /api/v1/gestiones/:id
async fn patch_gestion(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = validation::parse_id(&raw_id).map_err(ApiError::Validation)?;
    info!("PATCH /api/v1/gestiones/{id}");

    let body = json_body(body)?;
    let patch = validation::validate_patch(&body).map_err(ApiError::Validation)?;
    match state.gestiones.update_partial(id, patch).await? {
        Some(gestion) => Ok(Json(ApiResponse::ok(
            "Gestión actualizada exitosamente",
            gestion,
        ))),
        None => Err(not_found(id)),
    }
}

/// DELETE /api/v1/gestiones/:id (soft: the record is closed, not removed)
async fn delete_gestion(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = validation::parse_id(&raw_id).map_err(ApiError::Validation)?;
    info!("DELETE /api/v1/gestiones/{id}");

    if state.gestiones.soft_delete(id).await? {
        let body: ApiResponse<()> =
            ApiResponse::ok_message("Gestión eliminada exitosamente (estado cambiado a cerrada)");
        Ok(Json(body))
    } else {
        Err(not_found(id))
    }
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Gestión con ID {id} no encontrada"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        router(AppState::new(GestionService::new(db)))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn valid_payload() -> Value {
        json!({
            "clienteDocumento": "123456789",
            "clienteNombre": "Juan Pérez",
            "asesorId": "ASE001",
            "tipificacion": "Contacto Efectivo"
        })
    }

    #[tokio::test]
    async fn test_create_returns_201_with_defaults() {
        let app = test_app().await;

        let response = app
            .oneshot(json_request("POST", "/api/v1/gestiones", valid_payload()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["message"], json!("Gestión creada exitosamente"));
        assert_eq!(body["data"]["estado"], json!("abierta"));
        assert_eq!(body["data"]["canalOficial"], json!(true));
        assert!(body["data"]["id"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_create_invalid_body_collects_field_errors() {
        let app = test_app().await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/gestiones",
                json!({ "clienteDocumento": "12", "valorCompromiso": -5 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Errores de validación"));
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"clienteDocumento"));
        assert!(fields.contains(&"clienteNombre"));
        assert!(fields.contains(&"valorCompromiso"));
    }

    #[tokio::test]
    async fn test_malformed_body_still_gets_json_envelope() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/gestiones")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Errores de validación"));
        assert_eq!(body["errors"][0]["field"], json!("body"));

        // Missing content-type is a body rejection too, same envelope
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/gestiones")
                    .body(Body::from(serde_json::to_vec(&valid_payload()).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_get_missing_returns_404() {
        let app = test_app().await;

        let response = app
            .oneshot(get_request("/api/v1/gestiones/999"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["message"], json!("Gestión con ID 999 no encontrada"));
    }

    #[tokio::test]
    async fn test_non_numeric_id_returns_400() {
        let app = test_app().await;

        let response = app
            .oneshot(get_request("/api/v1/gestiones/abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let app = test_app().await;

        let created = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/gestiones", valid_payload()))
            .await
            .unwrap();
        let id = body_json(created).await["data"]["id"].as_i64().unwrap();

        // PUT replaces every mutable field
        let mut replacement = valid_payload();
        replacement["clienteNombre"] = json!("Juan Pérez Actualizado");
        replacement["tipificacion"] = json!("Promesa de Pago");
        replacement["valorCompromiso"] = json!(150000.50);
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/api/v1/gestiones/{id}"),
                replacement,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["clienteNombre"], json!("Juan Pérez Actualizado"));
        assert_eq!(body["data"]["valorCompromiso"], json!(150000.50));

        // PATCH touches only the named fields
        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/api/v1/gestiones/{id}"),
                json!({ "observaciones": "Seguimiento realizado" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["observaciones"], json!("Seguimiento realizado"));
        assert_eq!(body["data"]["clienteNombre"], json!("Juan Pérez Actualizado"));

        // DELETE closes the record
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/v1/gestiones/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["message"],
            json!("Gestión eliminada exitosamente (estado cambiado a cerrada)")
        );

        // Still retrievable, now cerrada
        let response = app
            .oneshot(get_request(&format!("/api/v1/gestiones/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["estado"], json!("cerrada"));
    }

    #[tokio::test]
    async fn test_patch_empty_body_returns_400() {
        let app = test_app().await;

        let created = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/gestiones", valid_payload()))
            .await
            .unwrap();
        let id = body_json(created).await["data"]["id"].as_i64().unwrap();

        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/api/v1/gestiones/{id}"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        let messages: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["message"].as_str().unwrap())
            .collect();
        assert!(messages.contains(&"Debe proporcionar al menos un campo para actualizar"));
    }

    #[tokio::test]
    async fn test_list_with_filters_and_pagination() {
        let app = test_app().await;

        for i in 0..3 {
            let mut payload = valid_payload();
            payload["clienteDocumento"] = json!(format!("1000000{i}"));
            payload["clienteNombre"] = json!(format!("Cliente {i}"));
            if i == 2 {
                payload["tipificacion"] = json!("No Contacto");
            }
            let response = app
                .clone()
                .oneshot(json_request("POST", "/api/v1/gestiones", payload))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .clone()
            .oneshot(get_request("/api/v1/gestiones?page=1&limit=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["pagination"]["total"], json!(3));
        assert_eq!(body["pagination"]["totalPages"], json!(2));

        let response = app
            .clone()
            .oneshot(get_request(
                "/api/v1/gestiones?tipificacion=No%20Contacto",
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["clienteNombre"], json!("Cliente 2"));

        // Out-of-range limit is a validation failure, not a clamp
        let response = app
            .oneshot(get_request("/api/v1/gestiones?limit=500"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_estadisticas_route_wins_over_id() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/gestiones", valid_payload()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(get_request("/api/v1/gestiones/estadisticas"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["message"], json!("Estadísticas obtenidas exitosamente"));
        assert_eq!(body["data"]["total"], json!(1));
        assert_eq!(body["data"]["abiertas"], json!(1));
        assert_eq!(body["data"]["porTipificacion"]["Contacto Efectivo"], json!(1));
    }

    #[tokio::test]
    async fn test_health_and_info_endpoints() {
        let app = test_app().await;

        let response = app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], json!("Servidor funcionando correctamente"));

        let response = app.clone().oneshot(get_request("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/api/v1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["endpoints"]["gestiones"], json!("/api/v1/gestiones"));
    }

    #[tokio::test]
    async fn test_unknown_api_route_returns_json_404() {
        let app = test_app().await;

        let response = app
            .oneshot(get_request("/api/v1/clientes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Ruta GET /api/v1/clientes no encontrada"));
    }
}
