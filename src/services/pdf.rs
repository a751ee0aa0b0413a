//! PDF rendering.
//!
//! Generated content is markdown-ish text from the language model. Before it
//! reaches the renderer it is HTML-escaped and converted with a converter
//! that only ever emits an allow-listed set of tags, so model output cannot
//! inject markup into the rendered document.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

use super::{MeetingContext, PdfRenderer};
use crate::error::{ReferentError, Result};
use crate::meeting::DocumentType;

const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpPdfRenderer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPdfRenderer {
    pub fn new(endpoint: String) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(RENDER_TIMEOUT).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl PdfRenderer for HttpPdfRenderer {
    async fn render(
        &self,
        doc_type: DocumentType,
        context: &MeetingContext,
        html: &str,
    ) -> Result<Vec<u8>> {
        info!(
            "Rendering {} PDF for {}",
            doc_type.as_str(),
            context.company_name
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "document_type": doc_type.as_str(),
                "meeting": context,
                "content": html,
            }))
            .send()
            .await
            .map_err(|e| ReferentError::ExternalService(format!("PDF render request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("PDF renderer error (HTTP {}): {}", status, body);
            return Err(ReferentError::ExternalService(format!(
                "PDF renderer error (HTTP {status})"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ReferentError::ExternalService(format!("PDF response unreadable: {e}")))?;
        if bytes.is_empty() {
            return Err(ReferentError::ExternalService(
                "PDF renderer produced empty output".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}

/// Escape content, then apply the tag-allow-listed markdown conversion.
/// Every `<` and `>` surviving in the output was emitted by the converter.
pub fn sanitized_html(content: &str) -> String {
    markdown_to_html(&escape_html(content))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Minimal markdown conversion emitting only h1-h4, strong, em, ul, li, p
/// and br. Input is assumed pre-escaped.
fn markdown_to_html(markdown: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_list = false;

    for line in markdown.lines() {
        let trimmed = line.trim_end();

        let (list_item, converted) = if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            (true, format!("<li>{}</li>", inline_markup(rest)))
        } else if let Some(rest) = trimmed.strip_prefix("#### ") {
            (false, format!("<h4>{}</h4>", inline_markup(rest)))
        } else if let Some(rest) = trimmed.strip_prefix("### ") {
            (false, format!("<h3>{}</h3>", inline_markup(rest)))
        } else if let Some(rest) = trimmed.strip_prefix("## ") {
            (false, format!("<h2>{}</h2>", inline_markup(rest)))
        } else if let Some(rest) = trimmed.strip_prefix("# ") {
            (false, format!("<h1>{}</h1>", inline_markup(rest)))
        } else if trimmed.is_empty() {
            (false, "<br>".to_string())
        } else {
            (false, format!("<p>{}</p>", inline_markup(trimmed)))
        };

        if list_item && !in_list {
            out.push("<ul>".to_string());
            in_list = true;
        } else if !list_item && in_list {
            out.push("</ul>".to_string());
            in_list = false;
        }
        out.push(converted);
    }
    if in_list {
        out.push("</ul>".to_string());
    }

    out.join("\n")
}

/// Bold and italic spans within one line.
fn inline_markup(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    // **bold** first, then *italic* on what remains.
    while let Some(start) = rest.find("**") {
        if let Some(len) = rest[start + 2..].find("**") {
            result.push_str(&rest[..start]);
            result.push_str("<strong>");
            result.push_str(&rest[start + 2..start + 2 + len]);
            result.push_str("</strong>");
            rest = &rest[start + 4 + len..];
        } else {
            break;
        }
    }
    result.push_str(rest);

    let mut final_result = String::with_capacity(result.len());
    let mut rest = result.as_str();
    while let Some(start) = rest.find('*') {
        if let Some(len) = rest[start + 1..].find('*') {
            final_result.push_str(&rest[..start]);
            final_result.push_str("<em>");
            final_result.push_str(&rest[start + 1..start + 1 + len]);
            final_result.push_str("</em>");
            rest = &rest[start + 2 + len..];
        } else {
            break;
        }
    }
    final_result.push_str(rest);
    final_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_markdown_headers_and_lists() {
        let html = markdown_to_html("# Referat\n- Sak 1\n- Sak 2\nAvslutning");
        assert!(html.contains("<h1>Referat</h1>"));
        assert!(html.contains("<ul>\n<li>Sak 1</li>\n<li>Sak 2</li>\n</ul>"));
        assert!(html.contains("<p>Avslutning</p>"));
    }

    #[test]
    fn test_inline_markup() {
        assert_eq!(
            inline_markup("**VEDTAK:** godkjent *enstemmig*"),
            "<strong>VEDTAK:</strong> godkjent <em>enstemmig</em>"
        );
    }

    #[test]
    fn test_sanitized_html_neutralizes_injected_tags() {
        let html = sanitized_html("# Tittel\n<img src=x onerror=alert(1)>");
        assert!(!html.contains("<img"));
        assert!(html.contains("&lt;img"));
        // Converter output is still structured.
        assert!(html.contains("<h1>Tittel</h1>"));
    }

    #[test]
    fn test_unclosed_markers_left_alone() {
        assert_eq!(inline_markup("a ** b"), "a ** b");
        assert_eq!(inline_markup("a * b"), "a * b");
    }
}
