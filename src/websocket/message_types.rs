use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::ChatMessage;

/// Client-to-server frames. `auth` is only expected when the access token
/// did not arrive with the upgrade request.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    Auth { token: String },
    Ping,
    Chat { data: ChatMessage },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    Pong,
}

pub fn pong_frame() -> String {
    serde_json::to_string(&OutboundFrame::Pong).unwrap_or_else(|_| r#"{"type":"pong"}"#.into())
}

pub fn error_frame(message: &str) -> String {
    json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frames_decode_by_tag() {
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(r#"{"type":"ping"}"#).unwrap(),
            InboundFrame::Ping
        ));
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(r#"{"type":"auth","token":"t"}"#).unwrap(),
            InboundFrame::Auth { .. }
        ));

        let frame = serde_json::from_str::<InboundFrame>(
            r#"{"type":"chat","data":{"conversation_id":"c1","content":"hi"}}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Chat { data } => {
                assert_eq!(data.conversation_id, "c1");
                assert_eq!(data.content, "hi");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_type_is_an_error() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn outbound_frames_render() {
        assert_eq!(pong_frame(), r#"{"type":"pong"}"#);
        assert_eq!(error_frame("bad frame"), r#"{"error":"bad frame"}"#);
    }
}
