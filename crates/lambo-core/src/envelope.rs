use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::InvokeError;
use crate::gateway::{GatewayRequest, GatewayResponse};

/// Wire discriminant for gateway-shaped requests.
pub const GATEWAY_EVENT_TYPE: &str = "events.APIGatewayProxyRequest";
/// Wire discriminant for gateway-shaped responses.
pub const GATEWAY_RESPONSE_TYPE: &str = "events.APIGatewayProxyResponse";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Gateway,
    Opaque,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeKind::Gateway => f.write_str("gateway"),
            EnvelopeKind::Opaque => f.write_str("opaque"),
        }
    }
}

/// The request side of an invocation.
///
/// On the wire (raw trigger proxy) this is
/// `{"event_type": "...", "event_body": ...}`; any `event_type` other than
/// the gateway one is treated as opaque.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireEvent")]
pub enum EventEnvelope {
    Gateway(GatewayRequest),
    Opaque(Value),
}

/// The response side of an invocation. Its kind always mirrors the request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireResponse")]
pub enum ResponseEnvelope {
    Gateway(GatewayResponse),
    Opaque(Value),
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    event_body: Value,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    response_type: String,
    #[serde(default)]
    response_body: Value,
}

impl TryFrom<WireEvent> for EventEnvelope {
    type Error = serde_json::Error;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        if wire.event_type == GATEWAY_EVENT_TYPE {
            if wire.event_body.is_null() {
                return Ok(EventEnvelope::Gateway(GatewayRequest::default()));
            }
            Ok(EventEnvelope::Gateway(serde_json::from_value(wire.event_body)?))
        } else {
            Ok(EventEnvelope::Opaque(wire.event_body))
        }
    }
}

impl TryFrom<WireResponse> for ResponseEnvelope {
    type Error = serde_json::Error;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        if wire.response_type == GATEWAY_RESPONSE_TYPE {
            Ok(ResponseEnvelope::Gateway(serde_json::from_value(
                wire.response_body,
            )?))
        } else {
            Ok(ResponseEnvelope::Opaque(wire.response_body))
        }
    }
}

impl Serialize for EventEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("EventEnvelope", 2)?;
        match self {
            EventEnvelope::Gateway(request) => {
                state.serialize_field("event_type", GATEWAY_EVENT_TYPE)?;
                state.serialize_field("event_body", request)?;
            }
            EventEnvelope::Opaque(value) => {
                state.serialize_field("event_type", "")?;
                state.serialize_field("event_body", value)?;
            }
        }
        state.end()
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResponseEnvelope", 2)?;
        match self {
            ResponseEnvelope::Gateway(response) => {
                state.serialize_field("response_type", GATEWAY_RESPONSE_TYPE)?;
                state.serialize_field("response_body", response)?;
            }
            ResponseEnvelope::Opaque(value) => {
                state.serialize_field("response_type", "")?;
                state.serialize_field("response_body", value)?;
            }
        }
        state.end()
    }
}

impl EventEnvelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            EventEnvelope::Gateway(_) => EnvelopeKind::Gateway,
            EventEnvelope::Opaque(_) => EnvelopeKind::Opaque,
        }
    }

    /// The JSON document handed to the function: the body alone, without
    /// the envelope.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            EventEnvelope::Gateway(request) => serde_json::to_vec(request),
            EventEnvelope::Opaque(value) => serde_json::to_vec(value),
        }
    }
}

impl ResponseEnvelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            ResponseEnvelope::Gateway(_) => EnvelopeKind::Gateway,
            ResponseEnvelope::Opaque(_) => EnvelopeKind::Opaque,
        }
    }

    /// Parse a function's success payload according to the kind of the
    /// request that produced it. An empty opaque payload is `null`.
    pub fn from_payload(kind: EnvelopeKind, payload: &[u8]) -> Result<Self, serde_json::Error> {
        match kind {
            EnvelopeKind::Gateway => Ok(ResponseEnvelope::Gateway(serde_json::from_slice(
                payload,
            )?)),
            EnvelopeKind::Opaque if payload.iter().all(u8::is_ascii_whitespace) => {
                Ok(ResponseEnvelope::Opaque(Value::Null))
            }
            EnvelopeKind::Opaque => Ok(ResponseEnvelope::Opaque(serde_json::from_slice(payload)?)),
        }
    }

    pub fn into_gateway(self) -> Result<GatewayResponse, InvokeError> {
        match self {
            ResponseEnvelope::Gateway(response) => Ok(response),
            other => Err(InvokeError::UnexpectedResponse {
                expected: EnvelopeKind::Gateway,
                actual: other.kind(),
            }),
        }
    }
}
