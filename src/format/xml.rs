//! XML renderer. Documents are built by hand around a small escape helper;
//! the layouts are fixed and shallow enough that a templating layer would
//! buy nothing.

use crate::errors::ApiError;
use crate::events::ResponseModel;
use crate::format::{LISTING_FIELDS, http_date};
use crate::models::FileRecord;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;

const CONTENT_TYPE: &str = "application/xml";
const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

pub fn render(model: &ResponseModel) -> (Bytes, String) {
    let mut xml = String::from(HEADER);
    xml.push_str("<filedepot>");

    match model {
        ResponseModel::File { record, .. } => {
            push_record(&mut xml, record, None);
        }
        ResponseModel::Listing(listing) => {
            xml.push_str("<files>");
            for record in &listing.files {
                push_record(&mut xml, record, listing.fields.as_deref());
            }
            xml.push_str("</files>");
        }
        ResponseModel::Metadata(metadata) => {
            push_metadata(&mut xml, metadata);
        }
        ResponseModel::Ack(pairs) => {
            xml.push_str("<file>");
            for (key, value) in pairs {
                xml.push_str(&format!("<{key}>{}</{key}>", xml_escape(value)));
            }
            xml.push_str("</file>");
        }
    }

    xml.push_str("</filedepot>");
    (Bytes::from(xml), CONTENT_TYPE.to_string())
}

pub fn error(err: &ApiError) -> (Bytes, String) {
    let mut xml = String::from(HEADER);
    xml.push_str("<filedepot><error>");
    xml.push_str(&format!("<code>{}</code>", err.status().as_u16()));
    xml.push_str(&format!("<message>{}</message>", xml_escape(&err.to_string())));
    xml.push_str(&format!("<date>{}</date>", http_date(&Utc::now())));
    xml.push_str(&format!("<errorCode>{}</errorCode>", err.error_code()));
    xml.push_str("</error></filedepot>");

    (Bytes::from(xml), CONTENT_TYPE.to_string())
}

fn push_record(xml: &mut String, record: &FileRecord, fields: Option<&[String]>) {
    let wanted = |name: &str| match fields {
        Some(fields) => fields.iter().any(|f| f == name),
        None => true,
    };

    xml.push_str("<file>");
    for field in LISTING_FIELDS {
        if !wanted(field) {
            continue;
        }

        match *field {
            "account" => {
                xml.push_str(&format!("<account>{}</account>", xml_escape(&record.account)));
            }
            "fileIdentifier" => {
                xml.push_str(&format!(
                    "<fileIdentifier>{}</fileIdentifier>",
                    xml_escape(&record.file_identifier)
                ));
            }
            "checksum" => {
                xml.push_str(&format!(
                    "<checksum>{}</checksum>",
                    xml_escape(&record.checksum)
                ));
            }
            "mime" => {
                xml.push_str(&format!("<mime>{}</mime>", xml_escape(&record.mime)));
            }
            "extension" => {
                xml.push_str(&format!(
                    "<extension>{}</extension>",
                    xml_escape(&record.extension)
                ));
            }
            "added" => {
                xml.push_str(&format!("<added>{}</added>", http_date(&record.added)));
            }
            "updated" => {
                xml.push_str(&format!("<updated>{}</updated>", http_date(&record.updated)));
            }
            "size" => {
                xml.push_str(&format!("<size>{}</size>", record.size));
            }
            "metadata" => {
                if let Some(metadata) = &record.metadata {
                    push_metadata(xml, metadata);
                }
            }
            _ => {}
        }
    }
    xml.push_str("</file>");
}

fn push_metadata(xml: &mut String, metadata: &serde_json::Map<String, Value>) {
    xml.push_str("<metadata>");
    for (key, value) in metadata {
        xml.push_str(&format!(
            r#"<tag key="{}">{}</tag>"#,
            xml_escape(key),
            xml_escape(&value_text(value))
        ));
    }
    xml.push_str("</metadata>");
}

/// Scalar strings render bare; everything else renders as its JSON text.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileListing;
    use chrono::TimeZone;

    fn record() -> FileRecord {
        let added = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        FileRecord {
            account: "acme".into(),
            file_identifier: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into(),
            size: 1024,
            checksum: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into(),
            mime: "image/png".into(),
            extension: "png".into(),
            added,
            updated: added,
            metadata: None,
        }
    }

    fn rendered(model: &ResponseModel) -> String {
        let (body, _) = render(model);
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[test]
    fn listing_honors_projection() {
        let model = ResponseModel::Listing(FileListing {
            files: vec![record()],
            fields: Some(vec!["size".into()]),
        });

        let xml = rendered(&model);

        assert!(xml.contains("<file><size>1024</size></file>"));
        assert!(!xml.contains("<mime>"));
    }

    #[test]
    fn metadata_renders_as_keyed_tags() {
        let metadata = [
            ("artist".to_string(), Value::String("banksy".into())),
            ("year".to_string(), Value::Number(2006.into())),
        ]
        .into_iter()
        .collect();

        let xml = rendered(&ResponseModel::Metadata(metadata));

        assert!(xml.contains(r#"<tag key="artist">banksy</tag>"#));
        assert!(xml.contains(r#"<tag key="year">2006</tag>"#));
    }

    #[test]
    fn special_characters_are_escaped() {
        let metadata = [(
            "title".to_string(),
            Value::String("cats & <dogs>".into()),
        )]
        .into_iter()
        .collect();

        let xml = rendered(&ResponseModel::Metadata(metadata));

        assert!(xml.contains("cats &amp; &lt;dogs&gt;"));
    }

    #[test]
    fn error_document_carries_codes() {
        let (body, content_type) = error(&ApiError::NotFound("File not found"));
        let xml = String::from_utf8(body.to_vec()).unwrap();

        assert_eq!(content_type, "application/xml");
        assert!(xml.contains("<code>404</code>"));
        assert!(xml.contains("<errorCode>301</errorCode>"));
        assert!(xml.contains("<message>File not found</message>"));
    }
}
