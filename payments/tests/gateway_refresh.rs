//! The authenticated API stack against a mock backend: sign-in, refresh on
//! 401 with a single replay, shared refreshes, and purging on rejection.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

use academy_payments::api::{
    AcademyApi, ApiRequest, AuthenticatedGateway, GatewayError, PaymentService, ReqwestTransport,
};
use academy_payments::auth::{
    AuthError, CredentialPair, CredentialStore, HttpAuthBackend, MemoryCredentialStore,
    SessionTokenManager,
};
use academy_payments::config::{CookiePolicy, Environment, REFRESH_TOKEN_ENTRY};
use academy_payments::http::HttpClient;
use academy_payments::metrics::PaymentMetrics;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn jwt(subject: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{subject}","exp":{exp}}}"#));
    format!("{header}.{claims}.sig")
}

fn jwt_info(access: &str, refresh: &str) -> String {
    json!({"jwt_info": {"access_token": access, "refresh_token": refresh}}).to_string()
}

struct Stack {
    api: AcademyApi,
    gateway: Arc<AuthenticatedGateway>,
    store: Arc<MemoryCredentialStore>,
    metrics: Arc<PaymentMetrics>,
}

fn stack(server: &ServerGuard, store: MemoryCredentialStore) -> Stack {
    stack_with_retries(server, store, 0)
}

fn stack_with_retries(
    server: &ServerGuard,
    store: MemoryCredentialStore,
    retries: usize,
) -> Stack {
    let http = HttpClient::new(server.url(), Duration::from_secs(5), retries);
    let store = Arc::new(store);
    let metrics = Arc::new(PaymentMetrics::new().unwrap());
    let tokens = Arc::new(
        SessionTokenManager::new(
            store.clone(),
            Arc::new(HttpAuthBackend::new(http.clone())),
            CookiePolicy::for_environment(Environment::Development),
            Duration::from_secs(5),
        )
        .with_metrics(metrics.clone()),
    );
    let gateway = Arc::new(
        AuthenticatedGateway::new(Arc::new(ReqwestTransport::new(http)), tokens)
            .with_metrics(metrics.clone()),
    );
    Stack {
        api: AcademyApi::new(gateway.clone(), "academy"),
        gateway,
        store,
        metrics,
    }
}

fn signed_in(access: &str, refresh: &str) -> MemoryCredentialStore {
    let pair = CredentialPair::from_tokens(access, refresh).unwrap();
    MemoryCredentialStore::with_pair(&pair, &CookiePolicy::for_environment(Environment::Development))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sign_in_installs_the_issued_pair() {
    let mut server = Server::new_async().await;
    let exp = Utc::now().timestamp() + 3600;
    let access = jwt("fresh", exp);
    let signin = server
        .mock("POST", "/auth/signin/invite")
        .match_body(Matcher::PartialJson(
            json!({"mini_app_name": "academy", "invite_id": "inv-1"}),
        ))
        .with_status(200)
        .with_body(jwt_info(&access, &jwt("fresh-refresh", exp + 86_400)))
        .create_async()
        .await;
    let me = server
        .mock("GET", "/user/me")
        .match_header("authorization", format!("Bearer {access}").as_str())
        .with_status(200)
        .with_body(r#"{"id":7}"#)
        .create_async()
        .await;

    let stack = stack(&server, MemoryCredentialStore::new());
    stack.api.sign_in("query_id=1", Some("inv-1")).await.unwrap();
    let profile = stack.api.me().await.unwrap();

    assert_eq!(profile["id"], 7);
    signin.assert_async().await;
    me.assert_async().await;
}

#[tokio::test]
async fn unauthorized_request_is_refreshed_and_replayed_once() {
    let mut server = Server::new_async().await;
    let exp = Utc::now().timestamp() + 3600;
    let old_access = jwt("old", exp);
    let new_access = jwt("new", exp);

    let rejected = server
        .mock("GET", "/app/level/level-7/buy/ton")
        .match_header("authorization", format!("Bearer {old_access}").as_str())
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .match_body(Matcher::Json(json!({"refresh_token": jwt("old-refresh", exp + 86_400)})))
        .with_status(200)
        .with_body(jwt_info(&new_access, &jwt("new-refresh", exp + 86_400)))
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/app/level/level-7/buy/ton")
        .match_header("authorization", format!("Bearer {new_access}").as_str())
        .with_status(200)
        .with_body(
            json!({"payment": {
                "id": "INV-42",
                "product_level_id": "level-7",
                "amount": "500",
                "currency": "BLG",
                "status": "pending",
                "url": format!("0:{}", "ab".repeat(32)),
            }})
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let stack = stack(
        &server,
        signed_in(&old_access, &jwt("old-refresh", exp + 86_400)),
    );
    let payment = stack
        .api
        .buy_level("level-7", PaymentService::Ton)
        .await
        .unwrap();
    let invoice = payment.into_invoice().unwrap();

    assert_eq!(invoice.amount_token(), 500);
    assert_eq!(invoice.reference_id(), "INV-42");
    assert_eq!(stack.metrics.gateway_replays_total.get(), 1);
    assert_eq!(stack.metrics.refresh_attempts_total.get(), 1);
    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;
}

#[tokio::test]
async fn failed_purchase_is_not_resent_but_reads_are() {
    let mut server = Server::new_async().await;
    let exp = Utc::now().timestamp() + 3600;
    let access = jwt("student", exp);

    let buy = server
        .mock("GET", "/app/level/level-7/buy/ton")
        .with_status(502)
        .expect(1)
        .create_async()
        .await;
    let me = server
        .mock("GET", "/user/me")
        .with_status(502)
        .expect(3)
        .create_async()
        .await;

    let stack = stack_with_retries(
        &server,
        signed_in(&access, &jwt("refresh", exp + 86_400)),
        2,
    );
    assert!(stack
        .api
        .buy_level("level-7", PaymentService::Ton)
        .await
        .is_err());
    assert!(stack.api.me().await.is_err());

    buy.assert_async().await;
    me.assert_async().await;
}

#[tokio::test]
async fn second_unauthorized_is_final() {
    let mut server = Server::new_async().await;
    let exp = Utc::now().timestamp() + 3600;

    let protected = server
        .mock("GET", "/user/me")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(jwt_info(&jwt("new", exp), &jwt("new-refresh", exp)))
        .expect(1)
        .create_async()
        .await;

    let stack = stack(&server, signed_in(&jwt("old", exp), &jwt("old-refresh", exp)));
    let err = stack.api.me().await.unwrap_err();

    assert_eq!(
        err,
        GatewayError::Unauthorized {
            path: "/user/me".into()
        }
    );
    protected.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let mut server = Server::new_async().await;
    let now = Utc::now().timestamp();
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(jwt_info(
            &jwt("new", now + 3600),
            &jwt("new-refresh", now + 86_400),
        ))
        .expect(1)
        .create_async()
        .await;

    let stack = stack(
        &server,
        signed_in(&jwt("old", now - 60), &jwt("old-refresh", now + 86_400)),
    );
    let tokens = stack.gateway.tokens().clone();
    let calls = (0..8).map(|_| {
        let tokens = tokens.clone();
        async move { tokens.get_valid_access_token().await }
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), jwt("new", now + 3600));
    }
    refresh.assert_async().await;
    assert_eq!(stack.metrics.refresh_attempts_total.get(), 1);
}

#[tokio::test]
async fn rejected_refresh_purges_the_pair() {
    let mut server = Server::new_async().await;
    let now = Utc::now().timestamp();
    server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .create_async()
        .await;

    let stack = stack(
        &server,
        signed_in(&jwt("old", now - 60), &jwt("old-refresh", now + 86_400)),
    );
    let err = stack
        .gateway
        .send(ApiRequest::get("/user/me"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Auth(AuthError::CredentialsExpired(_))
    ));
    assert!(stack.store.raw_entry(REFRESH_TOKEN_ENTRY).is_none());
    assert!(stack.store.load().unwrap().refresh.is_none());
    assert_eq!(stack.metrics.refresh_failures_total.get(), 1);
}
