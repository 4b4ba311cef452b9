//! Wire frames for the `/game-control` WebSocket endpoint.
//!
//! Every frame is a JSON object. Client frames carry a required string `type` field; the one exception is the admin
//! panel, which identifies itself with `source: "admin-panel"` and a bare `command` instead. Dispatch is an explicit
//! match over the known kinds; anything unrecognised lands in an ignore arm, never in a panic.
use std::fmt::Display;

use gig_common::helpers::iso8601;
use invoice_delivery_engine::types::{InvoiceRecord, OrderData, S3Metadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;

//--------------------------------------      GameState      ---------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Start,
    Pause,
    End,
}

impl Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameState::Start => write!(f, "start"),
            GameState::Pause => write!(f, "pause"),
            GameState::End => write!(f, "end"),
        }
    }
}

//--------------------------------------    Client frames    ---------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFrame {
    pub user_id: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterExpectedInvoiceFrame {
    pub invoice_number: String,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub order_data: OrderData,
}

impl RegisterExpectedInvoiceFrame {
    /// The order flow sometimes registers under `playerId` and sometimes under the session's `userId`; both are
    /// opaque to us, so the first one present wins.
    pub fn effective_player(&self) -> Option<&str> {
        self.player_id.as_deref().filter(|s| !s.is_empty()).or(self.user_id.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInvoiceFrame {
    pub invoice_number: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendToFrame {
    pub target_user_id: String,
    pub message: Value,
}

#[derive(Clone, Debug)]
pub enum GameEventFrame {
    /// Forwarded verbatim to the external game-over sink.
    GameOver { payload: Value },
    /// Updates the in-process game status and is fanned out to every session.
    StatusChange(GameState),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminAction {
    Start,
    Pause,
    End,
    New,
}

impl AdminAction {
    /// `new` resets a game, which lands the status back at `start`.
    pub fn to_state(self) -> GameState {
        match self {
            AdminAction::Start | AdminAction::New => GameState::Start,
            AdminAction::Pause => GameState::Pause,
            AdminAction::End => GameState::End,
        }
    }
}

#[derive(Clone, Debug)]
pub enum InboundFrame {
    Register(RegisterFrame),
    RegisterExpectedInvoice(RegisterExpectedInvoiceFrame),
    RequestInvoice(RequestInvoiceFrame),
    GameEvent(GameEventFrame),
    Order { data: Value },
    SendTo(SendToFrame),
    Admin(AdminAction),
}

#[derive(Clone, Debug)]
pub enum FrameError {
    /// Malformed JSON, a non-object frame, or a frame with neither a `type` nor an admin command. The client is
    /// buggy; these are dropped without a reply.
    Protocol(String),
    /// A well-formed frame of a kind we do not know. Explicitly ignored.
    UnknownType(String),
    /// A known frame kind with an invalid body. The client gets an error response frame.
    Validation { frame_type: String, reason: String },
}

/// Parses one inbound text frame into its dispatch arm.
pub fn parse_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(|e| FrameError::Protocol(e.to_string()))?;
    if !value.is_object() {
        return Err(FrameError::Protocol("frame is not a JSON object".to_string()));
    }
    let frame_type = value.get("type").and_then(Value::as_str).map(str::to_string);
    match frame_type {
        Some(frame_type) => parse_typed(&frame_type, value),
        None => parse_admin(&value),
    }
}

fn parse_typed(frame_type: &str, value: Value) -> Result<InboundFrame, FrameError> {
    let invalid = |e: serde_json::Error| FrameError::Validation {
        frame_type: frame_type.to_string(),
        reason: e.to_string(),
    };
    match frame_type {
        "register" => serde_json::from_value(value).map(InboundFrame::Register).map_err(invalid),
        "register_expected_invoice" => {
            serde_json::from_value(value).map(InboundFrame::RegisterExpectedInvoice).map_err(invalid)
        },
        "request_invoice" => serde_json::from_value(value).map(InboundFrame::RequestInvoice).map_err(invalid),
        "send-to" => serde_json::from_value(value).map(InboundFrame::SendTo).map_err(invalid),
        "order" => match value.get("data") {
            Some(data) if data.is_object() => Ok(InboundFrame::Order { data: data.clone() }),
            _ => Err(FrameError::Validation {
                frame_type: frame_type.to_string(),
                reason: "missing order data".to_string(),
            }),
        },
        "game_event" => {
            let event = value.get("event").and_then(Value::as_str).map(str::to_string);
            match event.as_deref() {
                Some("game_over") => Ok(InboundFrame::GameEvent(GameEventFrame::GameOver { payload: value })),
                Some("start") => Ok(InboundFrame::GameEvent(GameEventFrame::StatusChange(GameState::Start))),
                Some("pause") => Ok(InboundFrame::GameEvent(GameEventFrame::StatusChange(GameState::Pause))),
                Some("end") => Ok(InboundFrame::GameEvent(GameEventFrame::StatusChange(GameState::End))),
                Some(other) => Err(FrameError::UnknownType(format!("game_event:{other}"))),
                None => Err(FrameError::Protocol("game_event frame without an event".to_string())),
            }
        },
        other => Err(FrameError::UnknownType(other.to_string())),
    }
}

fn parse_admin(value: &Value) -> Result<InboundFrame, FrameError> {
    let source = value.get("source").and_then(Value::as_str);
    let command = value.get("command").and_then(Value::as_str);
    match (command, source) {
        (Some(command), Some("admin-panel")) => match command {
            "start" => Ok(InboundFrame::Admin(AdminAction::Start)),
            "pause" => Ok(InboundFrame::Admin(AdminAction::Pause)),
            "end" => Ok(InboundFrame::Admin(AdminAction::End)),
            "new" => Ok(InboundFrame::Admin(AdminAction::New)),
            other => Err(FrameError::UnknownType(format!("command:{other}"))),
        },
        _ => Err(FrameError::Protocol("frame has neither a type nor an admin command".to_string())),
    }
}

//--------------------------------------    Server frames    ---------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "welcome", rename_all = "camelCase")]
    Welcome { message: String, available_commands: Vec<String> },
    #[serde(rename = "game_status", rename_all = "camelCase")]
    GameStatus { status: GameState, last_updated: String, updated_by: String },
    #[serde(rename = "register_response", rename_all = "camelCase")]
    RegisterResponse { status: String, user_id: String, message: String },
    #[serde(rename = "register_expected_invoice_response", rename_all = "camelCase")]
    RegisterExpectedInvoiceResponse { status: String, invoice_number: String, player_id: String, message: String },
    #[serde(rename = "invoice_ready", rename_all = "camelCase")]
    InvoiceReady { invoice_number: String, filename: String, file_size: u64, processed_at: String, message: String },
    #[serde(rename = "invoice_pdf", rename_all = "camelCase")]
    InvoicePdf {
        status: String,
        invoice_number: String,
        filename: String,
        mime_type: String,
        base64_data: String,
        file_size: u64,
        processed_at: String,
        s3_metadata: S3Metadata,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<Value>,
    },
    #[serde(rename = "invoice_response", rename_all = "camelCase")]
    InvoiceResponse { status: String, invoice_number: String, message: String },
    #[serde(rename = "order_response", rename_all = "camelCase")]
    OrderResponse {
        status: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        order_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        customer_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        customer_email: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "direct_message", rename_all = "camelCase")]
    DirectMessage { from_user_id: String, message: Value },
    #[serde(rename = "send_response", rename_all = "camelCase")]
    SendResponse { status: String, target_user_id: String, message: String },
}

impl ServerFrame {
    pub fn welcome() -> Self {
        ServerFrame::Welcome {
            message: "Connected to the game control channel".to_string(),
            available_commands: ["register", "register_expected_invoice", "request_invoice", "game_event", "order", "send-to"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// The metadata-only notification that an invoice has been processed. Never carries the bytes.
    pub fn invoice_ready(record: &InvoiceRecord) -> Self {
        ServerFrame::InvoiceReady {
            invoice_number: record.invoice_number.as_str().to_string(),
            filename: record.filename.clone(),
            file_size: record.file_size,
            processed_at: iso8601(record.processed_at),
            message: format!("Invoice {} is ready for download", record.invoice_number.as_str()),
        }
    }

    /// The full payload, sent only on an explicit `request_invoice`.
    pub fn invoice_pdf(record: &InvoiceRecord, summary: Option<Value>) -> Self {
        ServerFrame::InvoicePdf {
            status: "success".to_string(),
            invoice_number: record.invoice_number.as_str().to_string(),
            filename: record.filename.clone(),
            mime_type: "application/pdf".to_string(),
            base64_data: record.base64_data.clone(),
            file_size: record.file_size,
            processed_at: iso8601(record.processed_at),
            s3_metadata: record.s3_metadata.clone(),
            summary,
        }
    }

    pub fn invoice_not_found(invoice_number: &str) -> Self {
        ServerFrame::InvoiceResponse {
            status: "error".to_string(),
            invoice_number: invoice_number.to_string(),
            message: format!("Invoice {invoice_number} not found"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_frame_parses() {
        let frame = parse_frame(r#"{"type":"register","userId":"alice"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Register(RegisterFrame { ref user_id }) if user_id == "alice"));
    }

    #[test]
    fn register_expected_invoice_frame_parses() {
        let json = r#"{
            "type": "register_expected_invoice",
            "userId": "rest-api",
            "invoiceNumber": "1030",
            "playerId": "alice",
            "orderData": {"customerName": "Alice", "customerEmail": "alice@example.com", "orderId": "ord-1", "summary": {"total": 50}}
        }"#;
        let InboundFrame::RegisterExpectedInvoice(frame) = parse_frame(json).unwrap() else {
            panic!("wrong dispatch arm");
        };
        assert_eq!(frame.invoice_number, "1030");
        assert_eq!(frame.effective_player(), Some("alice"));
        assert_eq!(frame.order_data.customer_name, "Alice");
        assert_eq!(frame.order_data.summary.unwrap()["total"], 50);
    }

    #[test]
    fn player_id_falls_back_to_user_id() {
        let json = r#"{"type":"register_expected_invoice","userId":"bob","invoiceNumber":"7"}"#;
        let InboundFrame::RegisterExpectedInvoice(frame) = parse_frame(json).unwrap() else {
            panic!("wrong dispatch arm");
        };
        assert_eq!(frame.effective_player(), Some("bob"));
    }

    #[test]
    fn game_events_parse_into_their_arms() {
        let over = parse_frame(r#"{"type":"game_event","event":"game_over","score":99}"#).unwrap();
        match over {
            InboundFrame::GameEvent(GameEventFrame::GameOver { payload }) => assert_eq!(payload["score"], 99),
            other => panic!("wrong dispatch arm: {other:?}"),
        }
        let pause = parse_frame(r#"{"type":"game_event","event":"pause"}"#).unwrap();
        assert!(matches!(pause, InboundFrame::GameEvent(GameEventFrame::StatusChange(GameState::Pause))));
    }

    #[test]
    fn admin_commands_need_the_admin_source() {
        let frame = parse_frame(r#"{"command":"pause","source":"admin-panel"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Admin(AdminAction::Pause)));
        assert!(matches!(
            parse_frame(r#"{"command":"pause","source":"somewhere-else"}"#),
            Err(FrameError::Protocol(_))
        ));
        assert!(matches!(
            parse_frame(r#"{"command":"reboot","source":"admin-panel"}"#),
            Err(FrameError::UnknownType(_))
        ));
    }

    #[test]
    fn admin_new_resets_to_start() {
        assert_eq!(AdminAction::New.to_state(), GameState::Start);
    }

    #[test]
    fn unknown_and_malformed_frames_are_classified() {
        assert!(matches!(parse_frame(r#"{"type":"dance"}"#), Err(FrameError::UnknownType(t)) if t == "dance"));
        assert!(matches!(parse_frame("not json"), Err(FrameError::Protocol(_))));
        assert!(matches!(parse_frame("[1,2,3]"), Err(FrameError::Protocol(_))));
        assert!(matches!(
            parse_frame(r#"{"type":"register"}"#),
            Err(FrameError::Validation { frame_type, .. }) if frame_type == "register"
        ));
    }

    #[test]
    fn server_frames_serialize_with_the_wire_tag() {
        let json = serde_json::to_value(ServerFrame::welcome()).unwrap();
        assert_eq!(json["type"], "welcome");
        assert!(json["availableCommands"].as_array().unwrap().iter().any(|c| c == "register"));

        let json = serde_json::to_value(ServerFrame::invoice_not_found("nope")).unwrap();
        assert_eq!(json["type"], "invoice_response");
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Invoice nope not found");
    }

    #[test]
    fn invoice_pdf_frame_carries_payload_and_optional_summary() {
        let record = InvoiceRecord {
            invoice_number: "1030".into(),
            player_id: Some("alice".into()),
            base64_data: "aGVsbG8=".to_string(),
            filename: "invoice_1030.pdf".to_string(),
            file_size: 5,
            processed_at: chrono::Utc::now(),
            s3_metadata: S3Metadata { s3_key: "invoice_1030.pdf".to_string(), s3_size: 5, s3_last_modified: None },
            summary: None,
            saved_at: None,
            file_path: None,
        };
        let json = serde_json::to_value(ServerFrame::invoice_pdf(&record, None)).unwrap();
        assert_eq!(json["type"], "invoice_pdf");
        assert_eq!(json["mimeType"], "application/pdf");
        assert_eq!(json["base64Data"], "aGVsbG8=");
        assert_eq!(json["s3Metadata"]["s3Key"], "invoice_1030.pdf");
        assert!(json.get("summary").is_none());

        let with_summary =
            serde_json::to_value(ServerFrame::invoice_pdf(&record, Some(serde_json::json!({ "total": 50 })))).unwrap();
        assert_eq!(with_summary["summary"]["total"], 50);
    }
}
