//! Represents an uploaded file tracked by the registry.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata record for a single uploaded file.
///
/// The payload itself lives in the object store under `object_key`; this
/// record only describes where it is and when it arrived.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Generated identifier (hyphenated v4 UUID).
    pub id: String,

    /// Name supplied by the client at upload time, if any.
    pub file_name: Option<String>,

    /// Key of the payload in the object store (`<id>/<file_name>`).
    #[serde(skip)]
    pub object_key: String,

    /// Display location, `<bucket>/<object_key>`.
    pub url: String,

    /// UTC date of the upload.
    pub upload_date: NaiveDate,
}

impl FileRecord {
    /// Build a record for a freshly written object.
    pub fn new(
        id: impl Into<String>,
        file_name: Option<String>,
        bucket: &str,
        upload_date: NaiveDate,
    ) -> Self {
        let id = id.into();
        let object_key = object_key_for(&id, file_name.as_deref());
        let url = format!("{}/{}", bucket, object_key);
        Self {
            id,
            file_name,
            object_key,
            url,
            upload_date,
        }
    }
}

/// Derive the object-store key for a file: `<id>/<file_name>`.
///
/// A missing name contributes an empty segment, so the key is still unique
/// per id.
pub fn object_key_for(id: &str, file_name: Option<&str>) -> String {
    format!("{}/{}", id, file_name.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_key_and_url_from_id_and_name() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let record = FileRecord::new("abc", Some("report.pdf".into()), "bucket", date);

        assert_eq!(record.object_key, "abc/report.pdf");
        assert_eq!(record.url, "bucket/abc/report.pdf");
        assert_eq!(record.upload_date, date);
    }

    #[test]
    fn missing_name_keeps_trailing_separator() {
        assert_eq!(object_key_for("abc", None), "abc/");
    }

    #[test]
    fn serializes_wire_fields_only() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let record = FileRecord::new("abc", Some("a.txt".into()), "b", date);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "id": "abc",
                "file_name": "a.txt",
                "url": "b/abc/a.txt",
                "upload_date": "2025-03-14",
            })
        );
    }
}
