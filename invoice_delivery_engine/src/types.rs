use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

//--------------------------------------      PoNumber       ---------------------------------------------------------

/// A purchase-order number, as issued by the upstream order service. Opaque, case-sensitive, and the identity under
/// which an invoice travels through the whole system.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoNumber(pub String);

impl<S: Into<String>> From<S> for PoNumber {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for PoNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PO#{}", self.0)
    }
}

impl PoNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      PlayerId       ---------------------------------------------------------

/// The identifier a player registered their WebSocket session under. Opaque; whatever the `register` frame carried is
/// authoritative.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl<S: Into<String>> From<S> for PlayerId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      OrderData      ---------------------------------------------------------

/// Order metadata carried alongside an expected invoice. The engine never interprets any of it; it is ferried from the
/// registration frame to the delivery path and back out on `invoice_pdf` responses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
}

//--------------------------------------   ExpectedInvoice   ---------------------------------------------------------

/// A PO number that has been announced to the engine but whose artifact has not yet been seen in the object store.
/// At most one entry exists per PO number; re-registration replaces the prior entry wholesale.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpectedInvoice {
    pub po_number: PoNumber,
    pub player_id: PlayerId,
    pub order_data: OrderData,
    pub registered_at: DateTime<Utc>,
    /// Completed scans in which no matching artifact appeared. Only consulted when the polling engine runs with a
    /// finite retry budget.
    pub attempts: u32,
}

impl ExpectedInvoice {
    pub fn new(po_number: PoNumber, player_id: PlayerId, order_data: OrderData) -> Self {
        Self { po_number, player_id, order_data, registered_at: Utc::now(), attempts: 0 }
    }
}

//--------------------------------------     ObjectMeta      ---------------------------------------------------------

/// A single entry from an object-store listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

//--------------------------------------     S3Metadata      ---------------------------------------------------------

/// Provenance of a fetched artifact, persisted with the record and echoed on `invoice_pdf` frames.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Metadata {
    pub s3_key: String,
    pub s3_size: i64,
    #[serde(default)]
    pub s3_last_modified: Option<String>,
}

//--------------------------------------    InvoiceRecord    ---------------------------------------------------------

/// The on-disk record of a fetched and persisted invoice artifact. Created once by the polling engine and immutable
/// thereafter; its existence is the dedup signal that stops the same PO from ever being fetched twice.
///
/// The wire/disk field names are fixed (camelCase); `savedAt` and `filePath` are stamped by the store at write time.
/// Legacy records may lack `invoiceNumber` and `playerId`; the store backfills the former from the filename.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    #[serde(default)]
    pub invoice_number: PoNumber,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    pub base64_data: String,
    pub filename: String,
    pub file_size: u64,
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub s3_metadata: S3Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

//--------------------------------------     MaxRetries      ---------------------------------------------------------

/// Retry budget for expected-invoice registrations. `Unlimited` means a registration never expires, no matter how
/// long the artifact takes to appear (memory then grows with chronic object-store failure; that is the configured
/// trade-off).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaxRetries {
    Unlimited,
    Finite(u32),
}

impl MaxRetries {
    pub fn is_finite(&self) -> bool {
        matches!(self, MaxRetries::Finite(_))
    }
}

impl Default for MaxRetries {
    fn default() -> Self {
        MaxRetries::Unlimited
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid max-retries value: {0}. Expected an integer or 'unlimited'.")]
pub struct MaxRetriesParseError(String);

impl FromStr for MaxRetries {
    type Err = MaxRetriesParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("unlimited") {
            return Ok(MaxRetries::Unlimited);
        }
        s.parse::<u32>().map(MaxRetries::Finite).map_err(|_| MaxRetriesParseError(s.to_string()))
    }
}

impl Display for MaxRetries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxRetries::Unlimited => write!(f, "unlimited"),
            MaxRetries::Finite(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn max_retries_parsing() {
        assert_eq!("unlimited".parse::<MaxRetries>().unwrap(), MaxRetries::Unlimited);
        assert_eq!("UNLIMITED".parse::<MaxRetries>().unwrap(), MaxRetries::Unlimited);
        assert_eq!("5".parse::<MaxRetries>().unwrap(), MaxRetries::Finite(5));
        assert!("five".parse::<MaxRetries>().is_err());
        assert!("-1".parse::<MaxRetries>().is_err());
    }

    #[test]
    fn record_serializes_with_wire_names() {
        let record = InvoiceRecord {
            invoice_number: "1030".into(),
            player_id: Some("alice".into()),
            base64_data: "aGVsbG8=".to_string(),
            filename: "invoice_1030.pdf".to_string(),
            file_size: 5,
            processed_at: Utc::now(),
            s3_metadata: S3Metadata { s3_key: "invoice_1030.pdf".to_string(), s3_size: 5, s3_last_modified: None },
            summary: None,
            saved_at: None,
            file_path: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["invoiceNumber"], "1030");
        assert_eq!(json["playerId"], "alice");
        assert_eq!(json["base64Data"], "aGVsbG8=");
        assert_eq!(json["fileSize"], 5);
        assert_eq!(json["s3Metadata"]["s3Key"], "invoice_1030.pdf");
        assert!(json.get("summary").is_none());
    }

    #[test]
    fn legacy_record_without_identity_fields_deserializes() {
        let json = r#"{
            "base64Data": "aGVsbG8=",
            "filename": "1030.pdf",
            "fileSize": 5,
            "processedAt": "2024-05-04T12:30:45.000Z"
        }"#;
        let record: InvoiceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.invoice_number.as_str(), "");
        assert!(record.player_id.is_none());
        assert_eq!(record.file_size, 5);
    }
}
