// handlers/mod.rs - HTTP surface of the daycare API
//
// Public:    /health, /api/health, and every GET under /api
// Protected: mutating /api routes, behind the bearer-token gate when
//            `security.require_auth` is enabled

pub mod children;
pub mod facilities;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::SecurityConfig;
use crate::middleware::jwt_auth_middleware;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/health", get(health::health))
        .route("/api/garderies", get(facilities::list).post(facilities::create))
        .route("/api/garderies/by-directeur/:id", get(facilities::by_director))
        .route(
            "/api/garderies/:id",
            get(facilities::show).put(facilities::update).delete(facilities::delete),
        )
        .route("/api/garderies/:id/enfants", get(facilities::children))
        .route("/api/enfants", get(children::list).post(children::create))
        .route("/api/enfants/by-parent/:parent_id", get(children::by_parent))
        .route(
            "/api/enfants/:id",
            get(children::show).put(children::update).delete(children::delete),
        )
        .route("/api/enfants/:id/release", post(children::release))
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes));

    if let Some(cors) = cors_layer(&state.config.security) {
        app = app.layer(cors);
    }
    if state.config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    app.with_state(state)
}

fn cors_layer(security: &SecurityConfig) -> Option<CorsLayer> {
    if !security.enable_cors {
        return None;
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if origins.is_empty() {
        return Some(CorsLayer::permissive());
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{encode_token, Claims};
    use crate::config::AppConfig;
    use crate::ledger::{Ledger, MemoryStore};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_with(config: AppConfig) -> Router {
        let ledger = Ledger::new(Arc::new(MemoryStore::default()));
        router(AppState { ledger, config: Arc::new(config) })
    }

    fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    fn facility_body(total: i32) -> Value {
        json!({
            "nom": "Les Petits Loups",
            "adresse": "12 rue des Lilas",
            "tarif": 45.5,
            "nombre_places": total,
            "description": "Garderie de quartier",
            "directeur_id": 1
        })
    }

    #[tokio::test]
    async fn enrollment_round_trip() {
        let app = app_with(AppConfig::development());

        let (status, facility) = send(&app, json_request(Method::POST, "/api/garderies", facility_body(2), None)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(facility["disponibilite"], 2);
        let facility_id = facility["idgarderie"].as_i64().unwrap();

        let (status, child) = send(
            &app,
            json_request(
                Method::POST,
                "/api/enfants",
                json!({ "nom": "Léa", "age": 3, "parent_id": 5, "garderie_id": facility_id }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(child["nom"], "Léa");
        assert_eq!(child["parent_id"], 5);
        assert_eq!(child["garderie_id"], facility_id);
        assert!(child["idenfant"].is_i64());

        let request = Request::get(format!("/api/garderies/{facility_id}")).body(Body::empty()).unwrap();
        let (_, facility) = send(&app, request).await;
        assert_eq!(facility["disponibilite"], 1);
    }

    #[tokio::test]
    async fn missing_fields_are_a_400_with_error_message() {
        let app = app_with(AppConfig::development());
        let (status, body) =
            send(&app, json_request(Method::POST, "/api/enfants", json!({ "nom": "Léa" }), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Le nom et l'âge sont obligatoires");
    }

    #[tokio::test]
    async fn malformed_json_is_a_400() {
        let app = app_with(AppConfig::development());
        let request = Request::post("/api/enfants")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ not json"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_JSON");
    }

    #[tokio::test]
    async fn unknown_facility_is_a_404() {
        let app = app_with(AppConfig::development());
        let (status, body) = send(
            &app,
            json_request(Method::POST, "/api/enfants", json!({ "nom": "Léa", "age": 3, "garderie_id": 999 }), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Garderie non trouvée");
    }

    #[tokio::test]
    async fn full_facility_is_a_400() {
        let app = app_with(AppConfig::development());
        let (_, facility) = send(&app, json_request(Method::POST, "/api/garderies", facility_body(1), None)).await;
        let id = facility["idgarderie"].as_i64().unwrap();
        let enroll = json!({ "nom": "Léa", "age": 3, "garderie_id": id });

        let (first, _) = send(&app, json_request(Method::POST, "/api/enfants", enroll.clone(), None)).await;
        let (second, body) = send(&app, json_request(Method::POST, "/api/enfants", enroll, None)).await;

        assert_eq!(first, StatusCode::CREATED);
        assert_eq!(second, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Plus de places disponibles dans cette garderie");
    }

    #[tokio::test]
    async fn release_route_frees_the_slot() {
        let app = app_with(AppConfig::development());
        let (_, facility) = send(&app, json_request(Method::POST, "/api/garderies", facility_body(1), None)).await;
        let facility_id = facility["idgarderie"].as_i64().unwrap();
        let (_, child) = send(
            &app,
            json_request(Method::POST, "/api/enfants", json!({ "nom": "Léa", "age": 3, "garderie_id": facility_id }), None),
        )
        .await;
        let child_id = child["idenfant"].as_i64().unwrap();

        let uri = format!("/api/enfants/{child_id}/release");
        let (status, released) = send(&app, json_request(Method::POST, &uri, json!({}), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(released["garderie_id"], Value::Null);

        let (status, _) = send(&app, json_request(Method::POST, &uri, json!({}), None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn zero_age_is_a_400() {
        let app = app_with(AppConfig::development());
        let (status, body) =
            send(&app, json_request(Method::POST, "/api/enfants", json!({ "nom": "Bébé", "age": 0 }), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Le nom et l'âge sont obligatoires");
    }

    #[tokio::test]
    async fn listing_routes() {
        let app = app_with(AppConfig::development());
        let mut zebre = facility_body(2);
        zebre["nom"] = json!("Zèbre");
        zebre["directeur_id"] = json!(7);
        let mut abeille = facility_body(2);
        abeille["nom"] = json!("Abeille");
        send(&app, json_request(Method::POST, "/api/garderies", zebre, None)).await;
        let (_, abeille) = send(&app, json_request(Method::POST, "/api/garderies", abeille, None)).await;
        let abeille_id = abeille["idgarderie"].as_i64().unwrap();

        let (status, listed) = send(&app, Request::get("/api/garderies").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["nom"], "Abeille");
        assert_eq!(listed[1]["nom"], "Zèbre");

        let (status, found) =
            send(&app, Request::get("/api/garderies/by-directeur/7").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["nom"], "Zèbre");
        let (status, body) =
            send(&app, Request::get("/api/garderies/by-directeur/99").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Aucune garderie trouvée pour ce directeur");

        let enroll = json!({ "nom": "Léa", "age": 3, "parent_id": 5, "garderie_id": abeille_id });
        send(&app, json_request(Method::POST, "/api/enfants", enroll, None)).await;
        send(&app, json_request(Method::POST, "/api/enfants", json!({ "nom": "Tom", "age": 4 }), None)).await;

        let (status, all) = send(&app, Request::get("/api/enfants").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().map(Vec::len), Some(2));

        let (status, mine) =
            send(&app, Request::get("/api/enfants/by-parent/5").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine.as_array().map(Vec::len), Some(1));
        assert_eq!(mine[0]["nom"], "Léa");
        assert_eq!(mine[0]["garderie_nom"], "Abeille");
        assert_eq!(mine[0]["garderie_adresse"], "12 rue des Lilas");
    }

    #[tokio::test]
    async fn facility_put_cannot_touch_slots() {
        let app = app_with(AppConfig::development());
        let (_, facility) = send(&app, json_request(Method::POST, "/api/garderies", facility_body(3), None)).await;
        let id = facility["idgarderie"].as_i64().unwrap();
        let uri = format!("/api/garderies/{id}");

        let body = json!({
            "nom": "Les Grands Loups",
            "adresse": "14 rue des Lilas",
            "tarif": 50,
            "description": "Agrandie",
            "disponibilite": 0,
            "nombre_places": 99
        });
        let (status, updated) = send(&app, json_request(Method::PUT, &uri, body, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["nom"], "Les Grands Loups");
        assert_eq!(updated["disponibilite"], 3);
        assert_eq!(updated["nombre_places"], 3);

        let (status, body) = send(&app, json_request(Method::PUT, &uri, json!({ "nom": "X" }), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn non_numeric_id_is_a_400() {
        let app = app_with(AppConfig::development());
        let request = Request::get("/api/enfants/abc").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn gate_requires_a_token_for_writes() {
        let mut config = AppConfig::development();
        config.security.require_auth = true;
        let secret = config.security.jwt_secret.clone();
        let app = app_with(config);
        let body = json!({ "nom": "Léa", "age": 3 });

        let (status, error) = send(&app, json_request(Method::POST, "/api/enfants", body.clone(), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error["error"], "Token requis pour l'authentification");

        let (status, _) = send(&app, json_request(Method::POST, "/api/enfants", body.clone(), Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = encode_token(&Claims::new(5, "parent@example.com", "parent", 1), &secret).unwrap();
        let (status, _) = send(&app, json_request(Method::POST, "/api/enfants", body, Some(&token))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn reads_and_health_skip_the_gate() {
        let mut config = AppConfig::development();
        config.security.require_auth = true;
        let app = app_with(config);

        let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");

        let (status, _) = send(&app, Request::get("/api/garderies/1").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
