//! Wire message format
//!
//! TigerStyle: Explicit wire types, serde does the codec, parse failures are
//! protocol violations.
//!
//! A transmitted unit is an envelope `seq:ack:body`. The `seq` field may be
//! empty when the sender trusts transport ordering; `ack` is the highest
//! peer sequence number the sender has processed; `body` is one JSON
//! message. Envelopes travel to the transmitter device as the single element
//! of a JSON array so the payload stays a plain string at the kernel
//! boundary.

use selkie_core::{CapData, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Envelope
// =============================================================================

/// One framed wire unit: optional sequence number, ack, message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub seq: Option<u64>,
    pub ack: u64,
    pub body: String,
}

impl Envelope {
    /// Parse the `seq:ack:body` frame
    ///
    /// The body may itself contain colons; only the first two delimit.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.splitn(3, ':');
        let seq_part = parts
            .next()
            .ok_or_else(|| Error::malformed_wire("empty envelope"))?;
        let ack_part = parts
            .next()
            .ok_or_else(|| Error::malformed_wire("envelope missing ack field"))?;
        let body = parts
            .next()
            .ok_or_else(|| Error::malformed_wire("envelope missing body"))?;

        let seq = if seq_part.is_empty() {
            None
        } else {
            Some(seq_part.parse().map_err(|_| {
                Error::malformed_wire(format!("bad sequence number {seq_part:?}"))
            })?)
        };
        let ack = ack_part
            .parse()
            .map_err(|_| Error::malformed_wire(format!("bad ack number {ack_part:?}")))?;
        Ok(Self {
            seq,
            ack,
            body: body.to_string(),
        })
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.seq {
            Some(seq) => write!(f, "{}:{}:{}", seq, self.ack, self.body),
            None => write!(f, ":{}:{}", self.ack, self.body),
        }
    }
}

// =============================================================================
// Message body
// =============================================================================

/// How a settlement event settles its promise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireEventKind {
    #[serde(rename = "notifyFulfillToData")]
    FulfillToData,
    #[serde(rename = "notifyFulfillToTarget")]
    FulfillToTarget,
    #[serde(rename = "notifyReject")]
    Reject,
}

/// A settlement event for a promise shared across the connection
///
/// Slots are written as text in the sender's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    pub event: WireEventKind,
    pub promise: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// A method call crossing the connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCall {
    pub target: String,
    #[serde(rename = "methodName")]
    pub method_name: String,
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<String>,
    #[serde(
        rename = "resultSlot",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub result_slot: Option<String>,
}

/// One wire message body
///
/// Events carry an `event` discriminator; calls carry `methodName`. The two
/// field sets are disjoint, so the untagged representation is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Event(WireEvent),
    Call(WireCall),
}

impl WireMessage {
    /// Serialize to the JSON body of an envelope
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::malformed_wire(format!("encode failed: {e}")))
    }

    /// Parse an envelope body
    pub fn decode(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| Error::malformed_wire(format!("undecodable body: {e}")))
    }
}

// =============================================================================
// Kernel boundary framing
// =============================================================================

/// Wrap an envelope as `transmit` args for the transmitter
pub fn pack_transmit_args(envelope: &Envelope) -> Result<CapData> {
    let body = serde_json::to_string(&[envelope.to_string()])
        .map_err(|e| Error::malformed_wire(format!("encode failed: {e}")))?;
    Ok(CapData::new(body, Vec::new()))
}

/// Unwrap `receive` args into the envelope text
pub fn unpack_receive_args(args: &CapData) -> Result<String> {
    if !args.slots.is_empty() {
        return Err(Error::malformed_wire(
            "receive args must not carry capability slots",
        ));
    }
    let wrapped: Vec<String> = serde_json::from_str(&args.body)
        .map_err(|e| Error::malformed_wire(format!("receive args not a string array: {e}")))?;
    match wrapped.as_slice() {
        [text] => Ok(text.clone()),
        _ => Err(Error::malformed_wire(format!(
            "receive args carried {} strings, expected 1",
            wrapped.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_display_and_parse() {
        let env = Envelope {
            seq: Some(3),
            ack: 7,
            body: r#"{"a":1}"#.to_string(),
        };
        let text = env.to_string();
        assert_eq!(text, r#"3:7:{"a":1}"#);
        assert_eq!(Envelope::parse(&text).unwrap(), env);
    }

    #[test]
    fn test_envelope_with_empty_seq() {
        let env = Envelope {
            seq: None,
            ack: 0,
            body: "{}".to_string(),
        };
        assert_eq!(env.to_string(), ":0:{}");
        assert_eq!(Envelope::parse(":0:{}").unwrap(), env);
    }

    #[test]
    fn test_envelope_body_may_contain_colons() {
        let env = Envelope::parse(r#"1:0:{"target":"o-1"}"#).unwrap();
        assert_eq!(env.body, r#"{"target":"o-1"}"#);
    }

    #[test]
    fn test_envelope_parse_rejects_garbage() {
        assert!(Envelope::parse("").is_err());
        assert!(Envelope::parse("nope").is_err());
        assert!(Envelope::parse("x:0:{}").is_err());
        assert!(Envelope::parse("1:y:{}").is_err());
        assert!(Envelope::parse("1:2").is_err());
    }

    #[test]
    fn test_call_roundtrip_uses_camel_case_fields() {
        let call = WireMessage::Call(WireCall {
            target: "o-1".to_string(),
            method_name: "greet".to_string(),
            args: serde_json::json!(["hello"]),
            slots: vec![],
            result_slot: Some("p+1".to_string()),
        });
        let encoded = call.encode().unwrap();
        assert!(encoded.contains("\"methodName\":\"greet\""));
        assert!(encoded.contains("\"resultSlot\":\"p+1\""));
        assert!(!encoded.contains("slots"));
        assert_eq!(WireMessage::decode(&encoded).unwrap(), call);
    }

    #[test]
    fn test_event_decode() {
        let body = r#"{"event":"notifyFulfillToData","promise":"p-2","args":[42],"slots":[]}"#;
        match WireMessage::decode(body).unwrap() {
            WireMessage::Event(event) => {
                assert_eq!(event.event, WireEventKind::FulfillToData);
                assert_eq!(event.promise, "p-2");
                assert_eq!(event.args, Some(serde_json::json!([42])));
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_name_is_malformed() {
        let body = r#"{"event":"notifyExplode","promise":"p-2"}"#;
        let err = WireMessage::decode(body).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_receive_args_framing() {
        let env = Envelope {
            seq: Some(1),
            ack: 0,
            body: "{}".to_string(),
        };
        let args = pack_transmit_args(&env).unwrap();
        assert_eq!(args.body, r#"["1:0:{}"]"#);
        assert_eq!(unpack_receive_args(&args).unwrap(), "1:0:{}");
    }

    #[test]
    fn test_receive_args_reject_slots_and_bad_shapes() {
        let mut args = CapData::new(r#"["1:0:{}"]"#, vec![selkie_core::VatSlot::object(true, 1)]);
        assert!(unpack_receive_args(&args).is_err());
        args.slots.clear();
        args.body = r#"["a","b"]"#.to_string();
        assert!(unpack_receive_args(&args).is_err());
        args.body = "42".to_string();
        assert!(unpack_receive_args(&args).is_err());
    }
}
