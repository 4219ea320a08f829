//! Server-Sent Events text encoding (§4.E).
//!
//! Pure formatting only — there is no HTTP server here (the HTTP surface is out of scope); this
//! exists so a caller exposing its own endpoint can format an [`Envelope`](super::Envelope) as
//! wire-ready SSE text.

use super::Envelope;

/// Encode one event as an `event: <type>\ndata: <json>\n\n` frame.
pub fn encode(envelope: &Envelope) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(&envelope.payload)?;
    Ok(format!("event: {}\ndata: {}\n\n", envelope.event_type, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TenantId;
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn encodes_event_type_and_json_payload() {
        let mut payload = HashMap::new();
        payload.insert("invoice_id".to_string(), serde_json::json!("inv_1"));
        let envelope = Envelope {
            tenant_id: TenantId::new(),
            event_type: "invoice.created".to_string(),
            payload,
            emitted_at: Utc::now(),
        };
        let encoded = encode(&envelope).unwrap();
        assert!(encoded.starts_with("event: invoice.created\ndata: "));
        assert!(encoded.ends_with("\n\n"));
        assert!(encoded.contains("inv_1"));
    }
}
