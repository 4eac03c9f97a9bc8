//! Waiver document rendering. `DocumentRenderer` is the seam: the pipeline
//! hands it an activity, the participant fields and an optional access code
//! and gets document bytes back. Backends are selected once at boot via
//! `WAIVER_RENDER_MODE` (`pdf` | `html`); the pipeline never branches on
//! backend identity.

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::io::BufWriter;
use std::sync::Arc;
use tracing::info;

use crate::catalog;

/// Participant fields a waiver document is rendered from.
#[derive(Debug, Clone)]
pub struct RenderInput {
    pub property: String,
    pub checkin_date: NaiveDate,
    pub name: String,
    pub initials: String,
    pub signature: String,
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync + 'static {
    async fn render(
        &self,
        activity: &str,
        input: &RenderInput,
        access_code: Option<&str>,
    ) -> anyhow::Result<Vec<u8>>;
}

fn activity_label(activity: &str) -> &str {
    catalog::find_activity(activity).map(|a| a.label).unwrap_or(activity)
}

const RISK_ITEMS: &[&str] = &[
    "Physical injury or death",
    "Equipment failure or malfunction",
    "Weather conditions",
    "Terrain hazards",
    "Other participants' actions",
];

fn waiver_sections(activity: &str, input: &RenderInput) -> Vec<(&'static str, String)> {
    let label = activity_label(activity);
    vec![
        (
            "Release and Waiver of Liability",
            format!(
                "I, {}, acknowledge that I am voluntarily participating in {} activities at {}.",
                input.name, label, input.property
            ),
        ),
        (
            "Risks and Hazards",
            format!("I understand that {label} involves inherent risks including but not limited to:"),
        ),
        (
            "Assumption of Risk",
            format!("I voluntarily assume all risks associated with participation in {label} activities."),
        ),
        (
            "Release of Liability",
            format!(
                "I hereby release, waive, and discharge {} from any and all claims, demands, or causes of action arising from my participation.",
                input.property
            ),
        ),
        (
            "Medical Treatment",
            "I consent to emergency medical treatment if necessary and agree to be responsible for all medical expenses.".to_string(),
        ),
        (
            "Governing Law",
            format!(
                "This waiver shall be governed by the laws of the jurisdiction where {} is located.",
                input.property
            ),
        ),
    ]
}

/// A4 text layout over printpdf's builtin Helvetica. The signature image is
/// not rasterized; the document records the initials and a capture notice.
pub struct PdfRenderer;

#[async_trait]
impl DocumentRenderer for PdfRenderer {
    async fn render(
        &self,
        activity: &str,
        input: &RenderInput,
        access_code: Option<&str>,
    ) -> anyhow::Result<Vec<u8>> {
        let label = activity_label(activity);
        let title = format!("Activity Waiver - {label}");
        let (doc, page1, layer1) = PdfDocument::new(&title, Mm(210.0), Mm(297.0), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow::anyhow!("pdf font error: {e}"))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow::anyhow!("pdf font error: {e}"))?;

        let mut y = Mm(280.0);
        layer.use_text(&title, 14.0, Mm(20.0), y, &bold);
        y -= Mm(7.0);
        layer.use_text(
            format!("Property: {} | Check-in: {}", input.property, input.checkin_date),
            9.0,
            Mm(20.0),
            y,
            &font,
        );
        y -= Mm(5.0);
        layer.use_text(format!("Participant: {}", input.name), 9.0, Mm(20.0), y, &font);
        y -= Mm(10.0);

        for (heading, paragraph) in waiver_sections(activity, input) {
            layer.use_text(heading, 11.0, Mm(20.0), y, &bold);
            y -= Mm(6.0);
            for line in wrap_text(&paragraph, 85) {
                layer.use_text(&line, 9.0, Mm(25.0), y, &font);
                y -= Mm(4.5);
            }
            if heading == "Risks and Hazards" {
                for item in RISK_ITEMS {
                    layer.use_text(format!("  - {item}"), 9.0, Mm(28.0), y, &font);
                    y -= Mm(4.5);
                }
            }
            y -= Mm(4.0);
        }

        layer.use_text(
            format!("Participant Initials: {}", input.initials),
            10.0,
            Mm(20.0),
            y,
            &bold,
        );
        y -= Mm(6.0);
        layer.use_text("Signature: captured electronically at submission", 9.0, Mm(20.0), y, &font);
        y -= Mm(8.0);

        if let Some(code) = access_code {
            layer.use_text(
                format!("{} Access Code: {}", label, code),
                12.0,
                Mm(20.0),
                y,
                &bold,
            );
            y -= Mm(5.0);
            layer.use_text(
                format!("Use this code to access the {} area.", label.to_lowercase()),
                8.0,
                Mm(20.0),
                y,
                &font,
            );
        }

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| anyhow::anyhow!("pdf save error: {e}"))?;
        buf.into_inner()
            .map_err(|e| anyhow::anyhow!("pdf buffer error: {e}"))
    }
}

/// Self-contained HTML document, the local fallback when no PDF engine is
/// wanted. Byte-for-byte stable given the same inputs.
pub struct HtmlRenderer;

#[async_trait]
impl DocumentRenderer for HtmlRenderer {
    async fn render(
        &self,
        activity: &str,
        input: &RenderInput,
        access_code: Option<&str>,
    ) -> anyhow::Result<Vec<u8>> {
        let label = activity_label(activity);
        let mut body = String::new();
        for (heading, paragraph) in waiver_sections(activity, input) {
            body.push_str(&format!(
                "<div class=\"section-title\">{heading}</div>\n<div class=\"paragraph\">{paragraph}</div>\n"
            ));
            if heading == "Risks and Hazards" {
                body.push_str("<ul>\n");
                for item in RISK_ITEMS {
                    body.push_str(&format!("<li>{item}</li>\n"));
                }
                body.push_str("</ul>\n");
            }
        }
        let code_block = match access_code {
            Some(code) => format!(
                "<div class=\"access-code\">{label} Access Code: {code}<br/><small>Use this code to access the {} area.</small></div>",
                label.to_lowercase()
            ),
            None => String::new(),
        };
        let html = format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>Activity Waiver - {label}</title></head>\n<body>\n\
             <div class=\"header\"><h1>Activity Waiver - {label}</h1>\
             <div>Property: {property} | Check-in: {checkin}</div>\
             <div>Participant: {name}</div></div>\n\
             {body}\
             <div class=\"signature-section\">\
             <div><strong>Participant Initials:</strong> {initials}</div>\
             <div><strong>Signature:</strong> captured electronically at submission</div>\
             {code_block}</div>\n\
             </body>\n</html>\n",
            property = input.property,
            checkin = input.checkin_date,
            name = input.name,
            initials = input.initials,
        );
        Ok(html.into_bytes())
    }
}

/// Simple word-wrap helper for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[derive(Clone)]
pub struct RendererManager {
    inner: Arc<dyn DocumentRenderer>,
}

impl std::fmt::Debug for RendererManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererManager").finish()
    }
}

impl RendererManager {
    pub fn from_env() -> Self {
        let mode = std::env::var("WAIVER_RENDER_MODE").unwrap_or_else(|_| "pdf".into());
        if mode.eq_ignore_ascii_case("html") {
            info!("render.init_html");
            return RendererManager { inner: Arc::new(HtmlRenderer) };
        }
        info!("render.init_pdf");
        RendererManager { inner: Arc::new(PdfRenderer) }
    }

    pub fn renderer(&self) -> Arc<dyn DocumentRenderer> {
        self.inner.clone()
    }
}

static RENDERER: OnceCell<RendererManager> = OnceCell::new();

pub fn get_renderer() -> &'static RendererManager {
    RENDERER.get_or_init(RendererManager::from_env)
}
