//! Google Docs: plain-text extraction of the knowledge document

use super::auth::{GoogleAuth, SCOPE_DOCS_READONLY, SERVICE};
use crate::error::{read_success_body, UpstreamError, UpstreamResult};
use serde::Deserialize;
use std::sync::Arc;

const DOCS_API: &str = "https://docs.googleapis.com/v1/documents";

#[derive(Debug, Default, Deserialize)]
struct Document {
    #[serde(default)]
    body: Option<Body>,
}

#[derive(Debug, Default, Deserialize)]
struct Body {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Debug, Default, Deserialize)]
struct StructuralElement {
    #[serde(default)]
    paragraph: Option<Paragraph>,
    #[serde(default)]
    table: Option<Table>,
}

#[derive(Debug, Default, Deserialize)]
struct Paragraph {
    #[serde(default)]
    elements: Vec<ParagraphElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphElement {
    #[serde(default)]
    text_run: Option<TextRun>,
}

#[derive(Debug, Default, Deserialize)]
struct TextRun {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    #[serde(default)]
    table_rows: Vec<TableRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableRow {
    #[serde(default)]
    table_cells: Vec<TableCell>,
}

#[derive(Debug, Default, Deserialize)]
struct TableCell {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

/// Concatenate paragraph text runs; table cells are flattened in row order.
/// Each level is trimmed, so cell text is joined without separators.
fn extract_text(content: &[StructuralElement]) -> String {
    let mut text = String::new();
    for element in content {
        if let Some(paragraph) = &element.paragraph {
            for run in paragraph.elements.iter().filter_map(|e| e.text_run.as_ref()) {
                text.push_str(&run.content);
            }
        } else if let Some(table) = &element.table {
            for cell in table.table_rows.iter().flat_map(|row| &row.table_cells) {
                text.push_str(&extract_text(&cell.content));
            }
        }
    }
    text.trim().to_string()
}

/// Reads the knowledge document configured by `GOOGLE_DOC_ID_KNOWLEDGE`
pub struct GoogleDocsSource {
    auth: Arc<GoogleAuth>,
    document_id: Option<String>,
}

impl GoogleDocsSource {
    pub fn new(auth: Arc<GoogleAuth>, document_id: Option<String>) -> Self {
        Self { auth, document_id }
    }

    pub async fn fetch_document_text(&self) -> UpstreamResult<String> {
        let document_id = self
            .document_id
            .as_deref()
            .ok_or_else(|| UpstreamError::NotConfigured {
                service: SERVICE,
                missing: "GOOGLE_DOC_ID_KNOWLEDGE".to_string(),
            })?;
        let token = self.auth.access_token(SCOPE_DOCS_READONLY).await?;

        let response = self
            .auth
            .client()
            .get(format!("{DOCS_API}/{document_id}"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, &e))?;

        let body = read_success_body(SERVICE, response).await?;
        let document: Document = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::decode(SERVICE, e.to_string()))?;

        Ok(document
            .body
            .map(|b| extract_text(&b.content))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleConfig;
    use serde_json::json;

    #[test]
    fn extracts_paragraphs_and_tables() {
        let doc: Document = serde_json::from_value(json!({
            "title": "Knowledge",
            "body": {"content": [
                {"sectionBreak": {}},
                {"paragraph": {"elements": [
                    {"textRun": {"content": "Service areas: "}},
                    {"textRun": {"content": "90210, 90211\n"}}
                ]}},
                {"table": {"tableRows": [
                    {"tableCells": [
                        {"content": [{"paragraph": {"elements": [{"textRun": {"content": " Washer \n"}}]}}]},
                        {"content": [{"paragraph": {"elements": [{"textRun": {"content": "$89\n"}}]}}]}
                    ]}
                ]}},
                {"paragraph": {"elements": [{"inlineObjectElement": {}}, {"textRun": {"content": "\nCall us.\n"}}]}}
            ]}
        }))
        .unwrap();

        let text = extract_text(&doc.body.unwrap().content);
        assert_eq!(text, "Service areas: 90210, 90211\nWasher$89\nCall us.");
    }

    #[test]
    fn document_without_body_is_empty() {
        let doc: Document = serde_json::from_value(json!({"title": "Empty"})).unwrap();
        assert!(doc.body.is_none());
        assert_eq!(extract_text(&[]), "");
    }

    #[tokio::test]
    async fn missing_document_id_is_not_configured() {
        let auth = Arc::new(GoogleAuth::new(&GoogleConfig::default()).unwrap());
        let source = GoogleDocsSource::new(auth, None);
        let err = source.fetch_document_text().await.unwrap_err();
        assert!(err.is_not_configured());
        assert!(err.to_string().contains("GOOGLE_DOC_ID_KNOWLEDGE"));
    }
}
