//! Structured JSON records written next to each combined PDF.

use serde::{Deserialize, Serialize};

use crate::model::SelectedItem;
use crate::naming::parse_mail_date;

use super::effective_body_text;

/// The machine-readable twin of a combined PDF.
///
/// Field names mirror the upstream search layer's JSON. `dateISO` is empty
/// (not absent) when the `Date:` header does not parse, so consumers see a
/// stable shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRecord {
    pub message_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    /// Original `Date:` header value, verbatim.
    pub date: String,
    #[serde(rename = "dateISO")]
    pub date_iso: String,
    pub entity: String,
    pub body_text: String,
    /// Raw-file name of the attachment this unit is about. Absent for the
    /// no-attachment unit of an email.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub linked_attachment_file: Option<String>,
    /// Every attachment of the parent email, regardless of which one this
    /// unit links to.
    pub attachments: Vec<RecordAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttachment {
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    /// Whether a preview page for this attachment type is attempted in the
    /// combined PDF.
    pub preview_in_combined_pdf: bool,
}

/// Build the record for one unit.
pub fn build_record(
    item: &SelectedItem,
    entity_name: &str,
    linked_attachment_file: Option<String>,
) -> UnitRecord {
    let date_iso = parse_mail_date(&item.date)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();
    let attachments = item
        .attachments
        .iter()
        .map(|att| RecordAttachment {
            filename: att.filename.clone(),
            mime_type: att.mime_type.clone(),
            size: att.size,
            preview_in_combined_pdf: att.is_previewable(),
        })
        .collect();
    UnitRecord {
        message_id: item.message_id.clone(),
        subject: item.subject.clone(),
        from: item.from.clone(),
        to: item.to.clone(),
        cc: item.cc.clone(),
        date: item.date.clone(),
        date_iso,
        entity: entity_name.to_string(),
        body_text: effective_body_text(item),
        linked_attachment_file,
        attachments,
    }
}

/// Serialize a record as pretty-printed JSON.
pub fn record_bytes(record: &UnitRecord) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec_pretty(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttachmentRef;

    fn item() -> SelectedItem {
        SelectedItem {
            message_id: "m1".into(),
            account_ref: "acct".into(),
            subject: "Invoice March".into(),
            from: "Acme Billing <billing@acme.com>".into(),
            to: "me@corp.com".into(),
            cc: String::new(),
            date: "Fri, 15 Mar 2024 09:30:00 +0100".into(),
            body_text: Some("See attached.".into()),
            body_html: None,
            entity_name: None,
            attachments: vec![
                AttachmentRef {
                    id: "a1".into(),
                    filename: "invoice.pdf".into(),
                    mime_type: "application/pdf".into(),
                    size: 123,
                },
                AttachmentRef {
                    id: "a2".into(),
                    filename: "data.xlsx".into(),
                    mime_type: "application/vnd.ms-excel".into(),
                    size: 456,
                },
            ],
        }
    }

    #[test]
    fn test_record_fields() {
        let record = build_record(&item(), "Acme Corp", Some("invoice.pdf".into()));
        assert_eq!(record.entity, "Acme Corp");
        assert_eq!(record.date_iso, "2024-03-15T09:30:00+01:00");
        assert_eq!(record.attachments.len(), 2);
        assert!(record.attachments[0].preview_in_combined_pdf);
        assert!(!record.attachments[1].preview_in_combined_pdf);
    }

    #[test]
    fn test_record_json_shape() {
        let record = build_record(&item(), "Acme Corp", Some("invoice.pdf".into()));
        let json = String::from_utf8(record_bytes(&record).unwrap()).unwrap();
        assert!(json.contains("\"messageId\""));
        assert!(json.contains("\"dateISO\""));
        assert!(json.contains("\"linkedAttachmentFile\": \"invoice.pdf\""));
        assert!(json.contains("\"previewInCombinedPdf\""));
    }

    #[test]
    fn test_record_without_linked_file_omits_key() {
        let record = build_record(&item(), "Acme Corp", None);
        let json = String::from_utf8(record_bytes(&record).unwrap()).unwrap();
        assert!(!json.contains("linkedAttachmentFile"));
    }

    #[test]
    fn test_unparsable_date_yields_empty_iso() {
        let mut item = item();
        item.date = "yesterday-ish".into();
        let record = build_record(&item, "Acme Corp", None);
        assert_eq!(record.date_iso, "");
        // Shape stays stable: the key is present with an empty value.
        let json = String::from_utf8(record_bytes(&record).unwrap()).unwrap();
        assert!(json.contains("\"dateISO\": \"\""));
    }
}
