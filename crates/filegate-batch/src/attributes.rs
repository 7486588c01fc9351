//! Batch key parser.
//!
//! # Design
//! - Accept bare object keys and full object URLs; only the path matters.
//! - "Not applicable" uploads (wrong content type, outside `inbound`) are `Ok(None)`.
//! - Customer/container mismatch is a policy error, never folded into parse errors.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AttributeError;

const CSV_CONTENT_TYPE: &str = "text/csv";
const INBOUND_SEGMENT: &str = "inbound";
const FILE_NAME_PATTERN: &str = r"^([^_]+)_(\d+_\d+)_(\w+)\.csv$";

/// Upload notification as delivered by the ingress layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadNotification {
    /// Object key or URL of the uploaded file.
    pub path: String,
    /// Declared content type of the upload.
    pub content_type: String,
}

impl UploadNotification {
    /// Build a notification from a path and content type.
    pub fn new(path: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_type: content_type.into(),
        }
    }
}

/// Attributes derived from one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchAttributes {
    /// Object key of the file (`container/inbound/...`).
    pub full_path: String,
    /// Container the file was uploaded to.
    pub container_name: String,
    /// Customer named by the file.
    pub customer_name: String,
    /// Stable batch identity, `customer_YYYYMMDD_HHMM`.
    pub batch_prefix: String,
    /// Timestamp encoded in the batch identity.
    pub batch_timestamp: NaiveDateTime,
    /// Lowercased file type code.
    pub file_type: String,
    /// File name without folders.
    pub file_name: String,
    /// Optional folder between `inbound` and the file.
    pub subfolder: Option<String>,
}

impl BatchAttributes {
    /// Object-store prefix that enumerates every file of this batch.
    #[must_use]
    pub fn listing_prefix(&self) -> String {
        match &self.subfolder {
            Some(subfolder) => format!(
                "{}/{INBOUND_SEGMENT}/{subfolder}/{}",
                self.container_name, self.batch_prefix
            ),
            None => format!(
                "{}/{INBOUND_SEGMENT}/{}",
                self.container_name, self.batch_prefix
            ),
        }
    }
}

/// Parses upload paths into [`BatchAttributes`].
#[derive(Debug, Clone)]
pub struct BatchKeyParser {
    file_name: Regex,
}

impl BatchKeyParser {
    /// Compile the file name grammar.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::Pattern`] if the grammar fails to compile.
    pub fn new() -> Result<Self, AttributeError> {
        let file_name = RegexBuilder::new(FILE_NAME_PATTERN)
            .case_insensitive(true)
            .build()
            .map_err(|source| AttributeError::Pattern { source })?;
        Ok(Self { file_name })
    }

    /// Parse a notification, returning `Ok(None)` when it is out of scope.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed paths, names, or timestamps and
    /// [`AttributeError::ContainerMismatch`] when the customer does not own
    /// the container.
    pub fn parse(
        &self,
        notification: &UploadNotification,
    ) -> Result<Option<BatchAttributes>, AttributeError> {
        let media_type = notification
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        if !media_type.eq_ignore_ascii_case(CSV_CONTENT_TYPE) {
            return Ok(None);
        }
        self.parse_key(&notification.path)
    }

    /// Parse an object key or URL regardless of content type.
    ///
    /// # Errors
    ///
    /// See [`BatchKeyParser::parse`].
    pub fn parse_key(&self, path: &str) -> Result<Option<BatchAttributes>, AttributeError> {
        let key = object_key(path);
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        let Some(inbound) = segments
            .iter()
            .skip(1)
            .position(|segment| segment.eq_ignore_ascii_case(INBOUND_SEGMENT))
            .map(|idx| idx + 1)
        else {
            return Ok(None);
        };

        let container = segments[inbound - 1];
        let (subfolder, file_name) = match &segments[inbound + 1..] {
            [file] => (None, *file),
            [folder, file] => (Some((*folder).to_string()), *file),
            [] => {
                return Err(AttributeError::MalformedPath {
                    path: path.to_string(),
                    reason: "missing_file_name",
                });
            }
            _ => {
                return Err(AttributeError::MalformedPath {
                    path: path.to_string(),
                    reason: "too_many_segments",
                });
            }
        };

        let captures =
            self.file_name
                .captures(file_name)
                .ok_or_else(|| AttributeError::MalformedName {
                    file_name: file_name.to_string(),
                })?;
        let customer = &captures[1];
        let stamp = &captures[2];
        let file_type = captures[3].to_ascii_lowercase();

        let batch_timestamp = parse_timestamp(stamp)?;
        if customer != container {
            return Err(AttributeError::ContainerMismatch {
                container: container.to_string(),
                customer: customer.to_string(),
            });
        }

        let full_path = match &subfolder {
            Some(folder) => format!("{container}/{}/{folder}/{file_name}", segments[inbound]),
            None => format!("{container}/{}/{file_name}", segments[inbound]),
        };

        Ok(Some(BatchAttributes {
            full_path,
            container_name: container.to_string(),
            customer_name: customer.to_string(),
            batch_prefix: format!("{customer}_{stamp}"),
            batch_timestamp,
            file_type,
            file_name: file_name.to_string(),
            subfolder,
        }))
    }
}

fn object_key(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) if url.has_host() => url.path().trim_start_matches('/').to_string(),
        _ => raw.trim().trim_start_matches('/').to_string(),
    }
}

fn parse_timestamp(stamp: &str) -> Result<NaiveDateTime, AttributeError> {
    let invalid = || AttributeError::InvalidTimestamp {
        value: stamp.to_string(),
    };
    let (date, time) = stamp.split_once('_').ok_or_else(invalid)?;
    let all_ascii_digits = |value: &str| value.bytes().all(|b| b.is_ascii_digit());
    if date.len() != 8 || time.len() != 4 || !all_ascii_digits(date) || !all_ascii_digits(time)
    {
        return Err(invalid());
    }
    let field = |value: &str| value.parse::<u32>().map_err(|_| invalid());
    let year = i32::try_from(field(&date[..4])?).map_err(|_| invalid())?;
    let date = NaiveDate::from_ymd_opt(year, field(&date[4..6])?, field(&date[6..])?)
        .ok_or_else(invalid)?;
    let time =
        NaiveTime::from_hms_opt(field(&time[..2])?, field(&time[2..])?, 0).ok_or_else(invalid)?;
    Ok(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> BatchKeyParser {
        BatchKeyParser::new().expect("pattern compiles")
    }

    fn csv(path: &str) -> UploadNotification {
        UploadNotification::new(path, "text/csv")
    }

    #[test]
    fn parses_well_formed_path() {
        let attrs = parser()
            .parse(&csv("acme/inbound/acme_20230601_0930_type5.csv"))
            .expect("parse")
            .expect("applicable");
        assert_eq!(attrs.customer_name, "acme");
        assert_eq!(attrs.container_name, "acme");
        assert_eq!(attrs.batch_prefix, "acme_20230601_0930");
        assert_eq!(attrs.file_type, "type5");
        assert_eq!(attrs.file_name, "acme_20230601_0930_type5.csv");
        assert_eq!(attrs.subfolder, None);
        let expected = NaiveDate::from_ymd_opt(2023, 6, 1)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("valid date");
        assert_eq!(attrs.batch_timestamp, expected);
        assert_eq!(attrs.listing_prefix(), "acme/inbound/acme_20230601_0930");
    }

    #[test]
    fn parses_object_url_and_subfolder() {
        let attrs = parser()
            .parse(&csv(
                "https://store.example.net/acme/inbound/daily/acme_20230601_0930_TYPE9.csv",
            ))
            .expect("parse")
            .expect("applicable");
        assert_eq!(attrs.full_path, "acme/inbound/daily/acme_20230601_0930_TYPE9.csv");
        assert_eq!(attrs.file_type, "type9");
        assert_eq!(attrs.subfolder.as_deref(), Some("daily"));
        assert_eq!(
            attrs.listing_prefix(),
            "acme/inbound/daily/acme_20230601_0930"
        );
    }

    #[test]
    fn non_csv_and_non_inbound_uploads_are_not_applicable() {
        let parser = parser();
        let json = UploadNotification::new(
            "acme/inbound/acme_20230601_0930_type5.csv",
            "application/json",
        );
        assert!(parser.parse(&json).expect("parse").is_none());
        let outbound = csv("acme/valid-set/acme_20230601_0930_type5.csv");
        assert!(parser.parse(&outbound).expect("parse").is_none());
        let content_type_case = UploadNotification::new(
            "acme/inbound/acme_20230601_0930_type5.csv",
            "Text/CSV",
        );
        assert!(parser.parse(&content_type_case).expect("parse").is_some());
        let with_charset = UploadNotification::new(
            "acme/inbound/acme_20230601_0930_type5.csv",
            "text/csv; charset=utf-8",
        );
        assert!(parser.parse(&with_charset).expect("parse").is_some());
    }

    #[test]
    fn malformed_names_and_timestamps_are_parse_errors() {
        let parser = parser();
        let err = parser
            .parse(&csv("acme/inbound/readme.csv"))
            .expect_err("bad name");
        assert!(matches!(err, AttributeError::MalformedName { .. }));

        let err = parser
            .parse(&csv("acme/inbound/acme_20231301_0930_type5.csv"))
            .expect_err("bad month");
        assert!(matches!(err, AttributeError::InvalidTimestamp { .. }));

        let err = parser
            .parse(&csv("acme/inbound/acme_2023061_0930_type5.csv"))
            .expect_err("short date");
        assert!(matches!(err, AttributeError::InvalidTimestamp { .. }));

        let err = parser
            .parse(&csv("acme/inbound/a/b/acme_20230601_0930_type5.csv"))
            .expect_err("too deep");
        assert!(matches!(err, AttributeError::MalformedPath { .. }));
        assert!(!err.is_policy_violation());
    }

    #[test]
    fn container_mismatch_is_policy_violation() {
        let err = parser()
            .parse(&csv("acme/inbound/globex_20230601_0930_type5.csv"))
            .expect_err("mismatch");
        assert!(err.is_policy_violation());
        assert!(matches!(
            err,
            AttributeError::ContainerMismatch { ref container, ref customer }
                if container == "acme" && customer == "globex"
        ));
    }
}
