//! JSON renderer.

use crate::errors::ApiError;
use crate::events::ResponseModel;
use crate::format::{LISTING_FIELDS, http_date, jsonp_callback};
use crate::models::FileRecord;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

const CONTENT_TYPE: &str = "application/json";

pub fn render(model: &ResponseModel, params: &BTreeMap<String, String>) -> (Bytes, String) {
    let value = match model {
        ResponseModel::File { record, .. } => record_value(record, None),
        ResponseModel::Listing(listing) => Value::Array(
            listing
                .files
                .iter()
                .map(|record| record_value(record, listing.fields.as_deref()))
                .collect(),
        ),
        ResponseModel::Metadata(metadata) => Value::Object(metadata.clone()),
        ResponseModel::Ack(pairs) => {
            let mut object = Map::new();
            for (key, value) in pairs {
                object.insert((*key).to_string(), Value::String(value.clone()));
            }
            Value::Object(object)
        }
    };

    let rendered = match jsonp_callback(params) {
        Some(callback) => format!("{callback}({value})"),
        None => value.to_string(),
    };

    (Bytes::from(rendered), CONTENT_TYPE.to_string())
}

pub fn error(err: &ApiError) -> (Bytes, String) {
    let body = json!({
        "error": {
            "code": err.status().as_u16(),
            "message": err.to_string(),
            "date": http_date(&Utc::now()),
            "errorCode": err.error_code(),
        }
    });

    (Bytes::from(body.to_string()), CONTENT_TYPE.to_string())
}

/// One listing entry, honoring the field projection.
///
/// With a projection only the intersection of requested and known fields is
/// emitted; without one every field is, metadata included (when loaded).
fn record_value(record: &FileRecord, fields: Option<&[String]>) -> Value {
    let wanted = |name: &str| match fields {
        Some(fields) => fields.iter().any(|f| f == name),
        None => true,
    };

    let mut entry = Map::new();
    for field in LISTING_FIELDS {
        if !wanted(field) {
            continue;
        }

        match *field {
            "account" => {
                entry.insert("account".into(), Value::String(record.account.clone()));
            }
            "fileIdentifier" => {
                entry.insert(
                    "fileIdentifier".into(),
                    Value::String(record.file_identifier.clone()),
                );
            }
            "checksum" => {
                entry.insert("checksum".into(), Value::String(record.checksum.clone()));
            }
            "mime" => {
                entry.insert("mime".into(), Value::String(record.mime.clone()));
            }
            "extension" => {
                entry.insert("extension".into(), Value::String(record.extension.clone()));
            }
            "added" => {
                entry.insert("added".into(), Value::String(http_date(&record.added)));
            }
            "updated" => {
                entry.insert("updated".into(), Value::String(http_date(&record.updated)));
            }
            "size" => {
                entry.insert("size".into(), Value::Number(record.size.into()));
            }
            "metadata" => {
                if let Some(metadata) = &record.metadata {
                    entry.insert("metadata".into(), Value::Object(metadata.clone()));
                }
            }
            _ => {}
        }
    }

    Value::Object(entry)
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
            metadata: Some(
                [("artist".to_string(), Value::String("banksy".into()))]
                    .into_iter()
                    .collect(),
            ),
        }
    }

    fn rendered(model: &ResponseModel, params: &BTreeMap<String, String>) -> Value {
        let (body, _) = render(model, params);
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn listing_with_projection_emits_only_requested_fields() {
        let model = ResponseModel::Listing(FileListing {
            files: vec![record()],
            fields: Some(vec!["fileIdentifier".into(), "size".into()]),
        });

        let value = rendered(&model, &BTreeMap::new());
        let entry = value.as_array().unwrap()[0].as_object().unwrap();

        assert_eq!(entry.len(), 2);
        assert_eq!(
            entry["fileIdentifier"],
            Value::String("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into())
        );
        assert_eq!(entry["size"], Value::Number(1024.into()));
    }

    #[test]
    fn listing_without_projection_emits_all_fields() {
        let model = ResponseModel::Listing(FileListing {
            files: vec![record()],
            fields: None,
        });

        let value = rendered(&model, &BTreeMap::new());
        let entry = value.as_array().unwrap()[0].as_object().unwrap();

        for field in ["account", "fileIdentifier", "checksum", "mime", "extension"] {
            assert!(entry.contains_key(field), "missing {field}");
        }
        assert_eq!(entry["metadata"]["artist"], Value::String("banksy".into()));
        assert_eq!(entry["added"], Value::String("Tue, 10 Feb 2026 12:00:00 GMT".into()));
    }

    #[test]
    fn unknown_projection_fields_are_ignored() {
        let model = ResponseModel::Listing(FileListing {
            files: vec![record()],
            fields: Some(vec!["size".into(), "width".into()]),
        });

        let value = rendered(&model, &BTreeMap::new());
        let entry = value.as_array().unwrap()[0].as_object().unwrap();

        assert_eq!(entry.len(), 1);
        assert!(entry.contains_key("size"));
    }

    #[test]
    fn jsonp_wraps_the_payload() {
        let model = ResponseModel::Ack(vec![("fileIdentifier", "abc".into())]);
        let params: BTreeMap<String, String> =
            [("callback".to_string(), "handle".to_string())].into();

        let (body, _) = render(&model, &params);
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.starts_with("handle("));
        assert!(text.ends_with(')'));
    }

    #[test]
    fn ack_preserves_pair_order() {
        let model = ResponseModel::Ack(vec![
            ("fileIdentifier", "abc".into()),
            ("extension", "png".into()),
        ]);

        let (body, _) = render(&model, &BTreeMap::new());
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert_eq!(text, r#"{"fileIdentifier":"abc","extension":"png"}"#);
    }

    #[test]
    fn error_body_carries_codes() {
        let (body, _) = error(&ApiError::EmptyBody);
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["error"]["code"], Value::Number(400.into()));
        assert_eq!(value["error"]["errorCode"], Value::Number(201.into()));
        assert_eq!(value["error"]["message"], Value::String("No file attached".into()));
    }
}
