use axum::body::Body;
use axum::http::{Request, StatusCode};
use sqlx::{Pool, Postgres};
use std::collections::HashMap;
use tower::util::ServiceExt;
use waiver_service::{build_router, test_support, AppState};

async fn seed(
    pool: &Pool<Postgres>,
    id: &str,
    name: &str,
    email: &str,
    property: &str,
    checkin: &str,
    days_ago: i32,
) {
    sqlx::query(
        "INSERT INTO submissions (id, property, checkin_date, name, email, activities, activity_initials, signature, status, created_at) \
         VALUES ($1,$2,$3::date,$4,$5,$6,$7,$8,'notified', now() - make_interval(days => $9))",
    )
    .bind(id)
    .bind(property)
    .bind(checkin)
    .bind(name)
    .bind(email)
    .bind(sqlx::types::Json(vec!["swimming".to_string()]))
    .bind(sqlx::types::Json(HashMap::from([("swimming".to_string(), "XX".to_string())])))
    .bind("data:image/png;base64,iVBORw0KGgo=")
    .bind(days_ago)
    .execute(pool)
    .await
    .unwrap();
}

async fn get_search(pool: Pool<Postgres>, uri: &str) -> (StatusCode, serde_json::Value) {
    let app = build_router(AppState { db: pool });
    let res = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
#[serial_test::serial]
async fn search_matches_substring_across_fields() {
    let Some(state) = test_support::test_state().await else {
        eprintln!("skipping search_matches_substring_across_fields: DATABASE_URL not set");
        return;
    };
    let pool = state.db;
    seed(&pool, "s1", "John Doe", "j@x.com", "resort-a", "2024-01-15", 2).await;
    seed(&pool, "s2", "Ana Maria", "ana@y.com", "resort-b", "2024-02-20", 1).await;

    let (status, v) = get_search(pool.clone(), "/admin/search?q=Doe").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["results"].as_array().unwrap().len(), 1);
    assert_eq!(v["results"][0]["name"], "John Doe");

    // email substring
    let (_, v) = get_search(pool.clone(), "/admin/search?q=ana@y").await;
    assert_eq!(v["results"].as_array().unwrap().len(), 1);
    assert_eq!(v["results"][0]["id"], "s2");

    // checkin_date substring (DATE cast to text)
    let (_, v) = get_search(pool.clone(), "/admin/search?q=2024-01").await;
    assert_eq!(v["results"].as_array().unwrap().len(), 1);
    assert_eq!(v["results"][0]["id"], "s1");

    let (_, v) = get_search(pool, "/admin/search?q=nomatch").await;
    assert_eq!(v["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
#[serial_test::serial]
async fn results_are_newest_first_and_capped_at_50() {
    let Some(state) = test_support::test_state().await else {
        eprintln!("skipping results_are_newest_first_and_capped_at_50: DATABASE_URL not set");
        return;
    };
    let pool = state.db;
    for i in 0..60 {
        seed(
            &pool,
            &format!("bulk-{i}"),
            &format!("Guest {i}"),
            &format!("guest{i}@x.com"),
            "resort-a",
            "2024-03-10",
            i,
        )
        .await;
    }

    let (status, v) = get_search(pool, "/admin/search?q=resort-a").await;
    assert_eq!(status, StatusCode::OK);
    let results = v["results"].as_array().unwrap();
    assert_eq!(results.len(), 50, "capped at 50");
    assert_eq!(results[0]["id"], "bulk-0", "newest first");
    assert_eq!(results[49]["id"], "bulk-49");
}

#[tokio::test]
#[serial_test::serial]
async fn missing_or_empty_query_is_400() {
    let Some(state) = test_support::test_state().await else {
        eprintln!("skipping missing_or_empty_query_is_400: DATABASE_URL not set");
        return;
    };
    let pool = state.db;

    let (status, v) = get_search(pool.clone(), "/admin/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["code"], "validation_error");

    let (status, _) = get_search(pool, "/admin/search?q=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial_test::serial]
async fn admin_token_guards_search_when_set() {
    let Some(state) = test_support::test_state().await else {
        eprintln!("skipping admin_token_guards_search_when_set: DATABASE_URL not set");
        return;
    };
    let pool = state.db;
    std::env::set_var("WAIVER_ADMIN_TOKEN", "s3cret");

    let app = build_router(AppState { db: pool.clone() });
    let res = app
        .oneshot(Request::builder().uri("/admin/search?q=x").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let app = build_router(AppState { db: pool.clone() });
    let res = app
        .oneshot(
            Request::builder()
                .uri("/admin/search?q=x")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let app = build_router(AppState { db: pool.clone() });
    let res = app
        .oneshot(
            Request::builder()
                .uri("/admin/search?q=x")
                .header("authorization", "Bearer s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    std::env::remove_var("WAIVER_ADMIN_TOKEN");

    // Unset token leaves the route open.
    let app = build_router(AppState { db: pool });
    let res = app
        .oneshot(Request::builder().uri("/admin/search?q=x").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
