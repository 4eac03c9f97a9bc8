//! Participant notification. `Notifier` delivers a confirmation message
//! carrying the generated documents' activities, storage keys and access
//! codes. Delivery failures are reported in the outcome, never retried here.
//! Backend selected at boot via `WAIVER_EMAIL_MODE` (`api` | `mock`).

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog;

/// One successfully stored document, as the notifier sees it.
#[derive(Debug, Clone)]
pub struct NotifyItem {
    pub activity: String,
    pub storage_key: String,
    pub access_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotifyOutcome {
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, recipient: &str, name: &str, items: &[NotifyItem]) -> NotifyOutcome;
}

fn activity_label(activity: &str) -> &str {
    catalog::find_activity(activity).map(|a| a.label).unwrap_or(activity)
}

fn email_html(name: &str, items: &[NotifyItem]) -> String {
    let mut activities = String::new();
    for item in items {
        activities.push_str(&format!("<li>{}</li>", activity_label(&item.activity)));
    }
    let mut codes = String::new();
    for item in items {
        if let Some(code) = &item.access_code {
            let label = activity_label(&item.activity);
            codes.push_str(&format!(
                "<div class=\"access-code\"><strong>{label} Access Code:</strong> {code}<br/>\
                 <small>Use this code to access the {} area during your stay.</small></div>",
                label.to_lowercase()
            ));
        }
    }
    format!(
        "<html><body style=\"font-family: Arial, sans-serif; line-height: 1.6;\">\
         <h2>Activity Waiver Confirmation</h2>\
         <p>Dear {name},</p>\
         <p>Thank you for completing your activity waivers. Your documents have been processed successfully.</p>\
         <h3>Activities Covered:</h3>\
         <ul>{activities}</ul>\
         {codes}\
         <p>Please keep this email for your records. Have a great time!</p>\
         <hr/>\
         <p style=\"font-size: 12px; color: #666;\">This email was automatically generated. Please do not reply to this message.</p>\
         </body></html>"
    )
}

/// JSON POST to an HTTP email provider. The payload references documents by
/// storage key; fetching and attaching bytes is the provider's concern.
pub struct HttpApiNotifier {
    client: reqwest::Client,
    endpoint: String,
    from: String,
    api_key: Option<String>,
}

impl HttpApiNotifier {
    pub fn new(endpoint: String, from: String, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint, from, api_key }
    }
}

#[async_trait]
impl Notifier for HttpApiNotifier {
    async fn notify(&self, recipient: &str, name: &str, items: &[NotifyItem]) -> NotifyOutcome {
        let body = serde_json::json!({
            "from": self.from,
            "to": [recipient],
            "subject": "Activity Waiver Documents",
            "html": email_html(name, items),
            "documents": items.iter().map(|i| serde_json::json!({
                "activity": i.activity,
                "storageKey": i.storage_key,
                "accessCode": i.access_code,
            })).collect::<Vec<_>>(),
        });
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(recipient = %recipient, documents = items.len(), "notify.sent");
                NotifyOutcome { success: true, message: "Email sent successfully".into() }
            }
            Ok(resp) => {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                warn!(recipient = %recipient, %status, "notify.provider_error");
                NotifyOutcome {
                    success: false,
                    message: format!("email provider returned {status}: {detail}"),
                }
            }
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "notify.request_failed");
                NotifyOutcome { success: false, message: format!("email request failed: {e}") }
            }
        }
    }
}

/// Logs and succeeds. Used in tests and local development.
pub struct MockNotifier;

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, recipient: &str, _name: &str, items: &[NotifyItem]) -> NotifyOutcome {
        info!(recipient = %recipient, documents = items.len(), "notify.mock");
        NotifyOutcome { success: true, message: "Email sent successfully".into() }
    }
}

#[derive(Clone)]
pub struct NotifierManager {
    inner: Arc<dyn Notifier>,
}

impl std::fmt::Debug for NotifierManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierManager").finish()
    }
}

impl NotifierManager {
    pub fn from_env() -> Self {
        let mode = std::env::var("WAIVER_EMAIL_MODE").unwrap_or_else(|_| "mock".into());
        if mode.eq_ignore_ascii_case("api") {
            match std::env::var("WAIVER_EMAIL_ENDPOINT") {
                Ok(endpoint) => {
                    let from = std::env::var("WAIVER_EMAIL_FROM")
                        .unwrap_or_else(|_| "waivers@example.com".into());
                    let api_key = std::env::var("WAIVER_EMAIL_API_KEY").ok();
                    info!(endpoint = %endpoint, "notify.init_api");
                    return NotifierManager {
                        inner: Arc::new(HttpApiNotifier::new(endpoint, from, api_key)),
                    };
                }
                Err(_) => warn!("WAIVER_EMAIL_ENDPOINT not set, falling back to mock notifier"),
            }
        }
        info!("notify.init_mock");
        NotifierManager { inner: Arc::new(MockNotifier) }
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.inner.clone()
    }
}

static NOTIFIER: OnceCell<NotifierManager> = OnceCell::new();

pub fn get_notifier() -> &'static NotifierManager {
    NOTIFIER.get_or_init(NotifierManager::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<NotifyItem> {
        vec![
            NotifyItem {
                activity: "archery".into(),
                storage_key: "waivers/2024/01/15/resort-a/archery/john-doe-a1.pdf".into(),
                access_code: Some("1234".into()),
            },
            NotifyItem {
                activity: "kayaking".into(),
                storage_key: "waivers/2024/01/15/resort-a/kayaking/john-doe-a1.pdf".into(),
                access_code: None,
            },
        ]
    }

    #[tokio::test]
    async fn mock_notifier_always_succeeds() {
        let outcome = MockNotifier.notify("j@x.com", "John Doe", &items()).await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "Email sent successfully");
    }

    #[test]
    fn email_html_lists_activities_and_codes() {
        let html = email_html("John Doe", &items());
        assert!(html.contains("Dear John Doe"));
        assert!(html.contains("<li>Archery</li>"));
        assert!(html.contains("<li>Kayaking</li>"));
        assert!(html.contains("Archery Access Code:</strong> 1234"));
        assert!(!html.contains("Kayaking Access Code"));
    }
}
