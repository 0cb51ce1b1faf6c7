//! The extraction collaborator seam, its prompt and reply parsing.

use crate::decode::EncodedDocument;
use crate::error::ExtractionError;
use crate::fields::{fields_from_json, Fields};
use async_trait::async_trait;
use serde_json::Value;

/// Pulls invoice entries out of one document.
///
/// Implementations get the encoded document and the ordered column schema,
/// and answer with zero or more entries or an error. The dispatcher applies
/// no timeout and no retry around this call.
#[async_trait]
pub trait InvoiceExtractor: Send + Sync {
    async fn extract(
        &self,
        document: &EncodedDocument,
        columns: &[String],
    ) -> Result<Vec<Fields>, ExtractionError>;
}

/// Instructions sent alongside the document.
pub fn build_prompt(columns: &[String]) -> String {
    format!(
        r#"You are an expert data extractor specializing in invoices. Extract invoice data from the attached document. The spreadsheet columns being filled are: {columns}.

If the document contains several distinct invoice entries, return each one as a separate item.

Return ONLY a JSON array. Each item is an object with these keys:
- "clientName": name of the company or client.
- "clientId": client identifier, if present.
- "invoiceNo": the invoice or credit note number.
- "invoiceDate": date of the invoice.
- "period": billing period, if present.
- "purpose": reason for the invoice (e.g. Gratuity, Leave).
- "amountExclGST": net value before tax, as a number.
- "gstPercentage": GST percentage applied as a number (18 for 18%). Use 18 if not stated.
- "totalInclGST": value including tax, as a number.
- "status": payment status (Paid, Unpaid, Partially Paid). Use "Unpaid" if not stated.
- "link": direct link to the invoice file. Omit if not present.

Use "N/A" for text fields that are not available. If the document contains no invoices, return []."#,
        columns = columns.join(", ")
    )
}

/// Parse a model reply into invoice entries.
///
/// Accepts a bare JSON array, one wrapped in a Markdown code fence, or an
/// object whose only array value holds the entries.
pub fn parse_reply(text: &str) -> Result<Vec<Fields>, ExtractionError> {
    let json = strip_code_fence(text);
    let value = serde_json::from_str::<Value>(json)
        .or_else(|_| serde_json::from_str::<Value>(slice_array(json)?))
        .map_err(|e: serde_json::Error| {
            ExtractionError::MalformedResponse(format!("Reply is not JSON: {}", e))
        })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut arrays = map.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (arrays.next(), arrays.next()) {
                (Some(items), None) => items,
                _ => {
                    return Err(ExtractionError::MalformedResponse(
                        "Expected a JSON array of invoice entries".to_string(),
                    ))
                }
            }
        }
        _ => {
            return Err(ExtractionError::MalformedResponse(
                "Expected a JSON array of invoice entries".to_string(),
            ))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_object().map(fields_from_json).ok_or_else(|| {
                ExtractionError::MalformedResponse(format!("Entry {} is not an object", i))
            })
        })
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after = &trimmed[start + 3..];
    // Skip a language tag such as `json`.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn slice_array(text: &str) -> Result<&str, serde_json::Error> {
    match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        // Re-run the parser on the whole text to get its error.
        _ => serde_json::from_str::<Value>(text).map(|_| text),
    }
}
