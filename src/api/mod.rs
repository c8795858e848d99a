// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::Scope,
    error::ErrorBody,
    payments::WebhookStats,
    state::AppState,
    storage::{Direction, Payment, PaymentStatus, PaymentView},
};

pub mod balance;
pub mod health;
pub mod invoices;
pub mod keys;
pub mod payments;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/invoices", post(invoices::create_invoice))
        .route(
            "/payments",
            get(payments::list_payments).post(payments::pay_invoice),
        )
        .route(
            "/payments/{payment_id}",
            get(payments::get_payment).delete(payments::delete_payment),
        )
        .route("/balance", get(balance::get_balance))
        .route("/apikey", post(keys::create_api_key));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        invoices::create_invoice,
        payments::pay_invoice,
        payments::list_payments,
        payments::get_payment,
        payments::delete_payment,
        balance::get_balance,
        keys::create_api_key,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Payment,
            PaymentView,
            Direction,
            PaymentStatus,
            Scope,
            ErrorBody,
            WebhookStats,
            invoices::CreateInvoiceBody,
            payments::PayInvoiceBody,
            payments::ListPaymentsResponse,
            balance::BalanceResponse,
            keys::ApiKeyResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Invoices", description = "Inbound Lightning invoices"),
        (name = "Payments", description = "Outbound payments and payment history"),
        (name = "Balance", description = "Ledger-derived balance"),
        (name = "Account", description = "API keys for webhook signatures"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{test_state, token};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const ALL_SCOPES: &[&str] = &["read_wallet", "create_invoice", "send_transaction", "edit_account"];

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_endpoints_are_public() {
        let (state, _h) = test_state();
        let app = router(state);

        let (status, body) = call(&app, Method::GET, "/health/live", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&app, Method::GET, "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["ledger"], "ok");
        assert_eq!(body["webhooks"]["in_flight"], 0);
    }

    #[tokio::test]
    async fn v1_requires_a_token() {
        let (state, _h) = test_state();
        let app = router(state);

        let (status, body) = call(&app, Method::GET, "/v1/balance", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn missing_scope_is_forbidden() {
        let (state, _h) = test_state();
        let app = router(state);
        let read_only = token(1, &["read_wallet"]);

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/invoices",
            Some(&read_only),
            Some(json!({ "amount_sat": 1000 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_code"], "insufficient_permissions");
    }

    #[tokio::test]
    async fn invoice_then_settlement_shows_in_balance() {
        let (state, h) = test_state();
        let app = router(state);
        let jwt = token(5, ALL_SCOPES);

        let (status, invoice) = call(
            &app,
            Method::POST,
            "/v1/invoices",
            Some(&jwt),
            Some(json!({ "amount_sat": 1000, "memo": "coffee" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(invoice["status"], "OPEN");
        assert_eq!(invoice["direction"], "INBOUND");
        assert_eq!(invoice["amount_msat"], 1_000_000);
        assert_eq!(invoice["expired"], false);

        let (_, balance) = call(&app, Method::GET, "/v1/balance", Some(&jwt), None).await;
        assert_eq!(balance, json!({ "sats": 0, "msats": 0 }));

        let id = invoice["id"].as_u64().unwrap();
        let preimage = hex::encode(vec![9u8; 32]);
        h.deps.db.mark_succeeded(id, &preimage).unwrap();

        let (_, balance) = call(&app, Method::GET, "/v1/balance", Some(&jwt), None).await;
        assert_eq!(balance, json!({ "sats": 1000, "msats": 1_000_000 }));
    }

    #[tokio::test]
    async fn pay_invoice_over_http() {
        let (state, h) = test_state();
        let app = router(state);
        let jwt = token(3, ALL_SCOPES);
        h.fund(3, 500);

        let (request, _) = h.fake.register_pay_req(1000);
        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/payments",
            Some(&jwt),
            Some(json!({ "payment_request": request })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error_code"], "insufficient_balance");

        let (request, _) = h.fake.register_pay_req(100);
        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/payments",
            Some(&jwt),
            Some(json!({ "payment_request": request })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "SUCCEEDED");
        assert_eq!(body["direction"], "OUTBOUND");
        assert!(body["preimage"].is_string());

        let (_, balance) = call(&app, Method::GET, "/v1/balance", Some(&jwt), None).await;
        assert_eq!(balance["sats"], 400);
    }

    #[tokio::test]
    async fn payments_are_scoped_to_their_owner() {
        let (state, h) = test_state();
        let app = router(state);
        let owner = token(1, ALL_SCOPES);
        let stranger = token(2, ALL_SCOPES);
        let funded = h.fund(1, 100);
        let uri = format!("/v1/payments/{}", funded.id);

        let (status, body) = call(&app, Method::GET, &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], funded.id);

        let (status, body) = call(&app, Method::GET, &uri, Some(&stranger), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "not_found");

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&stranger), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleted_payments_leave_the_listing_but_not_the_balance() {
        let (state, h) = test_state();
        let app = router(state);
        let jwt = token(1, ALL_SCOPES);
        let first = h.fund(1, 100);
        let second = h.fund(1, 200);

        let (_, list) = call(&app, Method::GET, "/v1/payments", Some(&jwt), None).await;
        let ids: Vec<u64> = list["payments"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let uri = format!("/v1/payments/{}", first.id);
        let (status, _) = call(&app, Method::DELETE, &uri, Some(&jwt), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, list) = call(&app, Method::GET, "/v1/payments?limit=10", Some(&jwt), None).await;
        assert_eq!(list["payments"].as_array().unwrap().len(), 1);

        let (_, list) = call(
            &app,
            Method::GET,
            "/v1/payments?include_deleted=true",
            Some(&jwt),
            None,
        )
        .await;
        assert_eq!(list["payments"].as_array().unwrap().len(), 2);

        let (_, balance) = call(&app, Method::GET, "/v1/balance", Some(&jwt), None).await;
        assert_eq!(balance["sats"], 300);
    }

    #[tokio::test]
    async fn api_key_is_returned_once_and_stored_hashed() {
        let (state, h) = test_state();
        let app = router(state);
        let jwt = token(8, ALL_SCOPES);

        let (status, body) = call(&app, Method::POST, "/v1/apikey", Some(&jwt), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let raw = body["api_key"].as_str().unwrap();

        let stored = h.deps.db.api_key_hash(8).unwrap().unwrap();
        assert_eq!(stored, crate::auth::hash_api_key(raw));
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/invoices",
            "/v1/payments",
            "/v1/payments/{payment_id}",
            "/v1/balance",
            "/v1/apikey",
            "/health/ready",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
