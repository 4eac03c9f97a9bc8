//! Submission processing pipeline: duplicate detection, per-activity document
//! generation, artifact and record persistence, and delivery.
//!
//! A fresh submission is acknowledged as soon as its row is durable; document
//! generation, storage and notification run in a detached task whose failures
//! are logged and recorded as submission events. Resubmission of an identical
//! (name, email, property, checkin_date) tuple never regenerates documents:
//! it re-sends the artifacts already on file and stays synchronous.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::{Pool, Postgres};
use tracing::{error, info, warn};

use crate::catalog;
use crate::ident;
use crate::models::{Document, Submission};
use crate::notify::{self, NotifyItem};
use crate::render::{self, DocumentRenderer, RenderInput};
use crate::storage::{self, document_key, ArtifactStore};
use crate::telemetry::{
    DOCUMENTS_GENERATED, DOCUMENT_FAILURES, NOTIFICATIONS_TOTAL, PIPELINE_DURATION,
    REDELIVERIES_TOTAL, SUBMISSIONS_TOTAL,
};

/// A submission request that passed validation: every field is present, every
/// activity is in the catalog and carries an initials entry.
#[derive(Debug, Clone)]
pub struct ValidSubmission {
    pub property: String,
    pub checkin_date: NaiveDate,
    pub name: String,
    pub email: String,
    pub activities: Vec<String>,
    pub activity_initials: HashMap<String, String>,
    pub signature: String,
}

/// Caller-visible result of `submit`.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub success: bool,
    pub submission_id: Option<String>,
    pub access_codes: Option<HashMap<String, String>>,
    pub message: String,
}

/// Tagged per-activity generation result. `error: None` means the artifact
/// was rendered and stored under `storage_key`.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub activity: String,
    pub storage_key: String,
    pub access_code: Option<String>,
    pub error: Option<String>,
}

pub async fn submit(pool: &Pool<Postgres>, req: ValidSubmission) -> Result<SubmitOutcome, sqlx::Error> {
    if let Some(existing) =
        find_existing(pool, &req.name, &req.email, &req.property, req.checkin_date).await?
    {
        return redeliver(pool, &existing, &req.activities).await;
    }

    let submission_id = ident::new_submission_id();
    let mut access_codes: HashMap<String, String> = HashMap::new();
    for activity in &req.activities {
        if catalog::is_restricted(activity) {
            access_codes.insert(activity.clone(), ident::new_access_code());
        }
    }

    // The dedup lookup above is not atomic with this insert; the unique index
    // on (name, email, property, checkin_date) is. A conflict means an
    // identical submission won the race, so serve it from file instead.
    let inserted = sqlx::query(
        "INSERT INTO submissions (id, property, checkin_date, name, email, activities, activity_initials, signature, status) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,'received') \
         ON CONFLICT (name, email, property, checkin_date) DO NOTHING",
    )
    .bind(&submission_id)
    .bind(&req.property)
    .bind(req.checkin_date)
    .bind(&req.name)
    .bind(&req.email)
    .bind(sqlx::types::Json(&req.activities))
    .bind(sqlx::types::Json(&req.activity_initials))
    .bind(&req.signature)
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 0 {
        let existing =
            find_existing(pool, &req.name, &req.email, &req.property, req.checkin_date)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
        warn!(submission_id = %existing.id, "submission.dedup_conflict");
        return redeliver(pool, &existing, &req.activities).await;
    }

    SUBMISSIONS_TOTAL.inc();
    record_event(pool, &submission_id, "received", None).await;
    info!(submission_id = %submission_id, activities = req.activities.len(), "submission.received");

    let pool = pool.clone();
    let job_id = submission_id.clone();
    let job_codes = access_codes.clone();
    tokio::spawn(async move {
        process_documents(pool, job_id, req, job_codes).await;
    });

    Ok(SubmitOutcome {
        success: true,
        submission_id: Some(submission_id),
        access_codes: if access_codes.is_empty() { None } else { Some(access_codes) },
        message: "Submission received! Documents are being generated and will be emailed shortly."
            .into(),
    })
}

/// Duplicate path: intersect the requested activities with the documents on
/// file, reuse their storage keys and access codes, and re-send. Creates no
/// new rows; success reflects the notification outcome alone.
async fn redeliver(
    pool: &Pool<Postgres>,
    existing: &Submission,
    requested: &[String],
) -> Result<SubmitOutcome, sqlx::Error> {
    let docs = documents_for(pool, &existing.id).await?;
    let items: Vec<NotifyItem> = requested
        .iter()
        .filter_map(|a| docs.iter().find(|d| &d.activity == a))
        .map(|d| NotifyItem {
            activity: d.activity.clone(),
            storage_key: d.storage_key.clone(),
            access_code: d.access_code.clone(),
        })
        .collect();
    let access_codes: HashMap<String, String> = items
        .iter()
        .filter_map(|i| i.access_code.clone().map(|c| (i.activity.clone(), c)))
        .collect();

    info!(submission_id = %existing.id, reused = items.len(), "submission.redeliver");
    let outcome = notify::get_notifier()
        .notifier()
        .notify(&existing.email, &existing.name, &items)
        .await;
    NOTIFICATIONS_TOTAL
        .with_label_values(&[if outcome.success { "success" } else { "failure" }])
        .inc();
    REDELIVERIES_TOTAL.inc();
    mark_status(
        pool,
        &existing.id,
        "redelivered",
        Some(&format!("{} documents re-sent", items.len())),
    )
    .await;

    Ok(SubmitOutcome {
        success: outcome.success,
        submission_id: None,
        access_codes: if access_codes.is_empty() { None } else { Some(access_codes) },
        message: if outcome.success {
            "Email sent with existing documents and access codes".into()
        } else {
            format!("Email failed: {}", outcome.message)
        },
    })
}

/// Detached background stage: fan-out generation, Document rows for the
/// successes, then notification. The caller already has its response, so
/// every failure in here must land in the log and the events table.
async fn process_documents(
    pool: Pool<Postgres>,
    submission_id: String,
    req: ValidSubmission,
    access_codes: HashMap<String, String>,
) {
    let timer = PIPELINE_DURATION.start_timer();
    mark_status(&pool, &submission_id, "documents_pending", None).await;

    let renderer = render::get_renderer().renderer();
    let store = storage::get_storage().await.store();
    let outcomes = generate_documents(renderer, store, &submission_id, &req, &access_codes).await;

    let total = outcomes.len();
    let mut items: Vec<NotifyItem> = Vec::new();
    for outcome in &outcomes {
        match &outcome.error {
            None => {
                let res = sqlx::query(
                    "INSERT INTO documents (submission_id, activity, storage_key, access_code) \
                     VALUES ($1,$2,$3,$4)",
                )
                .bind(&submission_id)
                .bind(&outcome.activity)
                .bind(&outcome.storage_key)
                .bind(&outcome.access_code)
                .execute(&pool)
                .await;
                match res {
                    Ok(_) => {
                        DOCUMENTS_GENERATED.inc();
                        items.push(NotifyItem {
                            activity: outcome.activity.clone(),
                            storage_key: outcome.storage_key.clone(),
                            access_code: outcome.access_code.clone(),
                        });
                    }
                    Err(e) => {
                        DOCUMENT_FAILURES.inc();
                        error!(submission_id = %submission_id, activity = %outcome.activity, error = %e, "document.persist_failed");
                        record_event(
                            &pool,
                            &submission_id,
                            "document_failed",
                            Some(&format!("{}: record write failed: {e}", outcome.activity)),
                        )
                        .await;
                    }
                }
            }
            Some(err) => {
                DOCUMENT_FAILURES.inc();
                warn!(submission_id = %submission_id, activity = %outcome.activity, error = %err, "document.render_failed");
                record_event(
                    &pool,
                    &submission_id,
                    "document_failed",
                    Some(&format!("{}: {err}", outcome.activity)),
                )
                .await;
            }
        }
    }

    if items.is_empty() {
        error!(submission_id = %submission_id, total, "documents.none_generated");
        mark_status(&pool, &submission_id, "notify_failed", Some("no documents generated")).await;
        timer.observe_duration();
        return;
    }

    let status = if items.len() == total { "documents_complete" } else { "documents_partial" };
    mark_status(
        &pool,
        &submission_id,
        status,
        Some(&format!("{}/{} documents generated", items.len(), total)),
    )
    .await;
    info!(submission_id = %submission_id, generated = items.len(), total, "documents.generated");

    let outcome = notify::get_notifier()
        .notifier()
        .notify(&req.email, &req.name, &items)
        .await;
    NOTIFICATIONS_TOTAL
        .with_label_values(&[if outcome.success { "success" } else { "failure" }])
        .inc();
    if outcome.success {
        mark_status(&pool, &submission_id, "notified", None).await;
    } else {
        error!(submission_id = %submission_id, reason = %outcome.message, "notify.failed");
        mark_status(&pool, &submission_id, "notify_failed", Some(&outcome.message)).await;
    }
    timer.observe_duration();
}

/// Fan out one render+store task per activity and join them in input order,
/// so the outcome list is order-stable relative to `req.activities`. A
/// failure stays confined to its own activity.
pub async fn generate_documents(
    renderer: Arc<dyn DocumentRenderer>,
    store: Arc<dyn ArtifactStore>,
    submission_id: &str,
    req: &ValidSubmission,
    access_codes: &HashMap<String, String>,
) -> Vec<DocumentOutcome> {
    let mut tasks = Vec::with_capacity(req.activities.len());
    for activity in &req.activities {
        let storage_key =
            document_key(req.checkin_date, &req.property, activity, &req.name, submission_id);
        let access_code = access_codes.get(activity).cloned();
        let input = RenderInput {
            property: req.property.clone(),
            checkin_date: req.checkin_date,
            name: req.name.clone(),
            initials: req.activity_initials.get(activity).cloned().unwrap_or_default(),
            signature: req.signature.clone(),
        };
        let renderer = renderer.clone();
        let store = store.clone();
        let task_activity = activity.clone();
        let task_key = storage_key.clone();
        let task_code = access_code.clone();
        let handle = tokio::spawn(async move {
            let bytes = renderer.render(&task_activity, &input, task_code.as_deref()).await?;
            store.put(&task_key, &bytes).await?;
            Ok::<_, anyhow::Error>(())
        });
        tasks.push((activity.clone(), storage_key, access_code, handle));
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    for (activity, storage_key, access_code, handle) in tasks {
        let error = match handle.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(format!("render task panicked: {e}")),
        };
        outcomes.push(DocumentOutcome { activity, storage_key, access_code, error });
    }
    outcomes
}

/// Most recent submission matching the dedup tuple, if any.
async fn find_existing(
    pool: &Pool<Postgres>,
    name: &str,
    email: &str,
    property: &str,
    checkin_date: NaiveDate,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(
        "SELECT id, property, checkin_date, name, email, activities, activity_initials, signature, status, created_at \
         FROM submissions \
         WHERE name = $1 AND email = $2 AND property = $3 AND checkin_date = $4 \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(name)
    .bind(email)
    .bind(property)
    .bind(checkin_date)
    .fetch_optional(pool)
    .await
}

pub async fn documents_for(
    pool: &Pool<Postgres>,
    submission_id: &str,
) -> Result<Vec<Document>, sqlx::Error> {
    sqlx::query_as::<_, Document>(
        "SELECT id, submission_id, activity, storage_key, access_code, created_at \
         FROM documents WHERE submission_id = $1 ORDER BY created_at",
    )
    .bind(submission_id)
    .fetch_all(pool)
    .await
}

/// Substring search over name, email, property and check-in date, newest
/// first, capped at 50. Read-only.
pub async fn search(pool: &Pool<Postgres>, query: &str) -> Result<Vec<Submission>, sqlx::Error> {
    let pattern = format!("%{query}%");
    sqlx::query_as::<_, Submission>(
        "SELECT id, property, checkin_date, name, email, activities, activity_initials, signature, status, created_at \
         FROM submissions \
         WHERE name LIKE $1 OR email LIKE $1 OR property LIKE $1 OR checkin_date::text LIKE $1 \
         ORDER BY created_at DESC LIMIT 50",
    )
    .bind(&pattern)
    .fetch_all(pool)
    .await
}

// Event row lands before the status flips, so a reader observing a status
// also sees its event.
async fn mark_status(pool: &Pool<Postgres>, id: &str, status: &str, message: Option<&str>) {
    let _ = sqlx::query(
        "INSERT INTO submission_events (submission_id, event_type, message) VALUES ($1,$2,$3)",
    )
    .bind(id)
    .bind(status)
    .bind(message)
    .execute(pool)
    .await;
    let _ = sqlx::query("UPDATE submissions SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await;
}

async fn record_event(pool: &Pool<Postgres>, id: &str, event: &str, message: Option<&str>) {
    let _ = sqlx::query(
        "INSERT INTO submission_events (submission_id, event_type, message) VALUES ($1,$2,$3)",
    )
    .bind(id)
    .bind(event)
    .bind(message)
    .execute(pool)
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    struct FlakyRenderer;

    #[async_trait]
    impl DocumentRenderer for FlakyRenderer {
        async fn render(
            &self,
            activity: &str,
            _input: &RenderInput,
            _access_code: Option<&str>,
        ) -> anyhow::Result<Vec<u8>> {
            if activity == "kayaking" {
                anyhow::bail!("renderer unavailable");
            }
            Ok(b"%PDF-1.3 stub".to_vec())
        }
    }

    struct BrokenRenderer;

    #[async_trait]
    impl DocumentRenderer for BrokenRenderer {
        async fn render(
            &self,
            _activity: &str,
            _input: &RenderInput,
            _access_code: Option<&str>,
        ) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("renderer down")
        }
    }

    fn request() -> ValidSubmission {
        let activities = vec!["archery".to_string(), "kayaking".to_string(), "swimming".to_string()];
        let activity_initials =
            activities.iter().map(|a| (a.clone(), "JD".to_string())).collect();
        ValidSubmission {
            property: "resort-a".into(),
            checkin_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            name: "John Doe".into(),
            email: "j@x.com".into(),
            activities,
            activity_initials,
            signature: "data:image/png;base64,AAAA".into(),
        }
    }

    #[tokio::test]
    async fn fan_out_isolates_failures_and_keeps_input_order() {
        let store = Arc::new(MemoryStore::default());
        let req = request();
        let codes = HashMap::from([("archery".to_string(), "1234".to_string())]);
        let outcomes =
            generate_documents(Arc::new(FlakyRenderer), store.clone(), "sub1", &req, &codes).await;

        assert_eq!(
            outcomes.iter().map(|o| o.activity.as_str()).collect::<Vec<_>>(),
            vec!["archery", "kayaking", "swimming"]
        );
        assert!(outcomes[0].error.is_none());
        assert!(outcomes[1].error.is_some());
        assert!(outcomes[2].error.is_none());

        // The failed activity's artifact never lands in the store.
        assert!(store.get(&outcomes[0].storage_key).await.unwrap().is_some());
        assert!(store.get(&outcomes[1].storage_key).await.unwrap().is_none());
        assert!(store.get(&outcomes[2].storage_key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn access_code_rides_only_its_activity() {
        let store = Arc::new(MemoryStore::default());
        let req = request();
        let codes = HashMap::from([("archery".to_string(), "9876".to_string())]);
        let outcomes =
            generate_documents(Arc::new(FlakyRenderer), store, "sub2", &req, &codes).await;
        assert_eq!(outcomes[0].access_code.as_deref(), Some("9876"));
        assert!(outcomes[1].access_code.is_none());
        assert!(outcomes[2].access_code.is_none());
    }

    #[tokio::test]
    async fn total_failure_stores_nothing() {
        let store = Arc::new(MemoryStore::default());
        let req = request();
        let outcomes = generate_documents(
            Arc::new(BrokenRenderer),
            store.clone(),
            "sub3",
            &req,
            &HashMap::new(),
        )
        .await;
        assert!(outcomes.iter().all(|o| o.error.is_some()));
        for outcome in &outcomes {
            assert!(store.get(&outcome.storage_key).await.unwrap().is_none());
        }
    }

    #[test]
    fn storage_keys_are_deterministic_per_activity() {
        let req = request();
        let key_a = document_key(req.checkin_date, &req.property, "archery", &req.name, "abc");
        let key_b = document_key(req.checkin_date, &req.property, "archery", &req.name, "abc");
        assert_eq!(key_a, key_b);
        assert_eq!(key_a, "waivers/2024/01/15/resort-a/archery/john-doe-abc.pdf");
    }
}
