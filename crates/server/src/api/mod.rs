//! JSON API under `/api`. Every route needs a bearer token; the tenant in the
//! token scopes every read and write.

pub mod auth;
pub mod error;
mod intake;
mod invoices;
mod master;
mod rate_cards;
mod receipt_lots;
mod stock_ledger;

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;

use feedstock_core::auth::TokenService;
use feedstock_core::invoicing::InvoiceGenerator;
use feedstock_core::stock::StockLedgerPoster;
use feedstock_db::repositories::{
    SqlIntakeRepository, SqlInvoiceRepository, SqlMasterRepository, SqlRateCardRepository,
    SqlStockRepository,
};
use feedstock_db::DbPool;

use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenService,
    pub rate_cards: Arc<SqlRateCardRepository>,
    pub intake: Arc<SqlIntakeRepository>,
    pub stock: Arc<SqlStockRepository>,
    pub invoices: Arc<SqlInvoiceRepository>,
    pub masters: Arc<SqlMasterRepository>,
    pub generator: Arc<InvoiceGenerator>,
    pub poster: Arc<StockLedgerPoster>,
}

impl AppState {
    pub fn new(pool: DbPool, tokens: TokenService) -> Self {
        let rate_cards = Arc::new(SqlRateCardRepository::new(pool.clone()));
        let intake = Arc::new(SqlIntakeRepository::new(pool.clone()));
        let stock = Arc::new(SqlStockRepository::new(pool.clone()));
        let invoices = Arc::new(SqlInvoiceRepository::new(pool.clone()));
        let masters = Arc::new(SqlMasterRepository::new(pool));

        let generator =
            Arc::new(InvoiceGenerator::new(rate_cards.clone(), intake.clone(), invoices.clone()));
        let poster = Arc::new(StockLedgerPoster::new(stock.clone()));

        Self { tokens, rate_cards, intake, stock, invoices, masters, generator, poster }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(rate_cards::routes())
        .merge(stock_ledger::routes())
        .merge(receipt_lots::routes())
        .merge(intake::routes())
        .merge(invoices::routes())
        .merge(master::routes());

    Router::new().nest("/api", api).layer(TraceLayer::new_for_http()).with_state(state)
}

/// JSON body whose rejections answer `400 {"message": ...}`.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;
        Ok(Self(value))
    }
}

/// Query string whose rejections answer `400 {"message": ...}`.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use feedstock_core::auth::TokenService;
    use feedstock_core::domain::tenant::Role;
    use feedstock_db::{connect_with_settings, migrations};

    use super::{router, AppState};

    const FEEDSTOCK: &str = "8d7e2a4c-55a1-4c1b-9a7e-0d2f1b3c4e5f";
    const CENTER: &str = "5b1d0c1e-9f3a-4d8e-8a52-3c1f2d4e6a70";

    struct TestApp {
        router: Router,
        tokens: TokenService,
    }

    impl TestApp {
        async fn new() -> Self {
            let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
            migrations::run_pending(&pool).await.expect("migrations");
            let tokens = TokenService::new(
                SecretString::from("test-signing-secret-with-32-plus-chars".to_string()),
                3600,
            )
            .expect("token service");
            Self { router: router(AppState::new(pool, tokens.clone())), tokens }
        }

        fn token(&self, tenant: &str, role: Role) -> String {
            self.tokens.issue(tenant, "test-user", role).expect("token")
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<String>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder.header(CONTENT_TYPE, "application/json").body(Body::from(body)),
                None => builder.body(Body::empty()),
            }
            .expect("request");

            let response = self.router.clone().oneshot(request).await.expect("response");
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
            let value =
                if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json") };
            (status, value)
        }

        async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
            self.send(Method::POST, uri, Some(token), Some(body.to_string())).await
        }

        async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
            self.send(Method::GET, uri, Some(token), None).await
        }
    }

    fn week() -> Value {
        json!({ "weekStartDate": "2026-02-23", "weekEndDate": "2026-03-01", "partyType": "farmer" })
    }

    #[tokio::test]
    async fn weekly_invoice_end_to_end() {
        let app = TestApp::new().await;
        let token = app.token("tenant-a", Role::Procurement);

        let (status, card) = app
            .post(
                "/api/rate-cards",
                &token,
                json!({
                    "partyType": "farmer",
                    "partyId": "farmer-1",
                    "feedstockTypeId": FEEDSTOCK,
                    "effectiveFrom": "2026-02-01",
                    "ratePerTon": 1600,
                    "qualityAdjustments": [
                        { "metric": "moisturePercent", "operator": "gt", "value": 20, "adjustmentPerTon": -50 },
                        { "metric": "contaminationPercent", "operator": "gte", "value": 5, "adjustmentPerTon": -25 }
                    ]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{card}");

        let (status, intake) = app
            .post(
                "/api/plant-intake-entries",
                &token,
                json!({
                    "feedstockTypeId": FEEDSTOCK,
                    "sourceType": "farmer",
                    "sourceRefId": "farmer-1",
                    "grossWeightTon": 10,
                    "tareWeightTon": 1.5,
                    "moisturePercent": 22,
                    "contaminationPercent": 3,
                    "intakeDate": "2026-02-24"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{intake}");

        let (status, run) = app.post("/api/invoices/generate-weekly", &token, week()).await;
        assert_eq!(status, StatusCode::CREATED, "{run}");
        assert_eq!(run["generatedCount"], json!(1));
        assert_eq!(run["skippedNoRate"], json!(0));
        let line = &run["invoices"][0]["lines"][0];
        assert_eq!(line["ratePerTon"].as_f64(), Some(1550.0));
        assert_eq!(run["invoices"][0]["totalAmount"].as_f64(), Some(13175.0));
        assert_eq!(run["cycle"]["status"], json!("generated"));

        let (status, body) = app.post("/api/invoices/generate-weekly", &token, week()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"].as_str().unwrap_or_default().contains("forceRegen=true"));

        let (status, invoices) = app.get("/api/invoices?partyType=farmer", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(invoices.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn receipt_lot_out_postings_keep_the_balance() {
        let app = TestApp::new().await;
        let token = app.token("tenant-a", Role::Operations);
        let writer = app.token("tenant-a", Role::Admin);

        let (status, lot) = app
            .post(
                "/api/center-receipt-lots",
                &writer,
                json!({
                    "collectionCenterId": CENTER,
                    "sourceType": "farmer",
                    "sourceRefId": "farmer-1",
                    "feedstockTypeId": FEEDSTOCK,
                    "receiptDate": "2026-02-20",
                    "grossQtyTon": 25
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{lot}");
        let lot_id = lot["id"].as_str().unwrap_or_default().to_string();

        let (status, entry) = app
            .post("/api/center-stock-ledger/out", &token, json!({ "centerReceiptLotId": lot_id, "qtyTon": 8 }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{entry}");
        assert_eq!(entry["balanceAfterTon"].as_f64(), Some(17.0));
        assert_eq!(entry["movementType"], json!("OUT"));

        let (status, body) = app
            .post("/api/center-stock-ledger/out", &token, json!({ "centerReceiptLotId": lot_id, "qtyTon": 20 }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!("Insufficient available quantity in lot"));

        let (_, stored) = app.get(&format!("/api/center-receipt-lots/{lot_id}"), &token).await;
        assert_eq!(stored["availableQtyTon"].as_f64(), Some(17.0));

        let (status, entries) =
            app.get(&format!("/api/center-stock-ledger?centerReceiptLotId={lot_id}"), &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entries[0]["movementType"], json!("OUT"));
        assert_eq!(entries[1]["movementType"], json!("IN"));

        let (status, report) =
            app.get(&format!("/api/center-stock-ledger/verify/{lot_id}"), &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["valid"], json!(true));

        let other_tenant = app.token("tenant-b", Role::Operations);
        let (status, _) = app
            .post(
                "/api/center-stock-ledger/out",
                &other_tenant,
                json!({ "centerReceiptLotId": lot_id, "qtyTon": 1 }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn requests_without_a_valid_token_are_rejected() {
        let app = TestApp::new().await;

        let (status, body) = app.send(Method::GET, "/api/rate-cards", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].is_string());

        let (status, _) = app.get("/api/rate-cards", "not-a-jwt").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn drivers_cannot_post_stock_movements() {
        let app = TestApp::new().await;
        let driver = app.token("tenant-a", Role::Driver);

        let (status, body) = app
            .post("/api/center-stock-ledger/out", &driver, json!({ "centerReceiptLotId": CENTER, "qtyTon": 1 }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["message"].as_str().unwrap_or_default().contains("driver"));
    }

    #[tokio::test]
    async fn malformed_bodies_and_missing_fields_are_bad_requests() {
        let app = TestApp::new().await;
        let token = app.token("tenant-a", Role::Procurement);

        let (status, body) = app
            .send(Method::POST, "/api/rate-cards", Some(&token), Some("{not json".to_string()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let (status, body) =
            app.post("/api/rate-cards", &token, json!({ "partyType": "farmer" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            json!("partyType, partyId, feedstockTypeId, effectiveFrom and ratePerTon are required")
        );

        let (status, _) = app
            .post(
                "/api/invoices/generate-weekly",
                &token,
                json!({ "weekStartDate": "2026-03-01", "weekEndDate": "2026-02-23" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn master_collections_are_served_by_kind() {
        let app = TestApp::new().await;
        let token = app.token("tenant-a", Role::Procurement);

        let (status, farmer) =
            app.post("/api/farmers", &token, json!({ "code": "F-001", "name": "Ravi" })).await;
        assert_eq!(status, StatusCode::CREATED, "{farmer}");
        assert_eq!(farmer["tenantId"], json!("tenant-a"));

        let (status, _) =
            app.post("/api/farmers", &token, json!({ "code": "F-001", "name": "Other" })).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, listed) = app.get("/api/farmers", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        let (status, _) = app.get("/api/spaceships", &token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
