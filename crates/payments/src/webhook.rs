//! Webhook authentication and event decoding.
//!
//! The gateway signs each delivery with HMAC-SHA256 over `"{t}.{body}"` and
//! sends the result in a header of the form `t=<unix seconds>,v1=<hex>`.
//! More than one `v1` entry may be present while secrets are rotated.

use std::collections::HashMap;

use common::OrderId;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::SignatureError;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "Payment-Signature";

const SCHEME: &str = "v1";

type HmacSha256 = Hmac<Sha256>;

/// Verifies and produces webhook signatures for one shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    mac: HmacSha256,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    /// Creates a verifier accepting signatures up to `tolerance_secs` old.
    pub fn new(secret: &str, tolerance_secs: i64) -> Result<Self, SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::EmptySecret)?;
        Ok(Self {
            mac,
            tolerance_secs,
        })
    }

    /// Builds the header value the gateway would send for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let digest = self.digest(payload, timestamp).finalize().into_bytes();
        format!("t={timestamp},{SCHEME}={}", hex::encode(digest))
    }

    /// Checks a signature header against the payload using the current time.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Checks a signature header against the payload as of `now`.
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let (timestamp, signatures) = parse_header(header)?;

        if now.abs_diff(timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(SignatureError::Expired);
        }

        let expected = self.digest(payload, timestamp);
        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| expected.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    fn digest(&self, payload: &[u8], timestamp: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(SignatureError::MalformedHeader);
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            SCHEME => signatures.push(value),
            _ => {}
        }
    }

    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(SignatureError::MalformedHeader),
    }
}

/// A webhook delivery as sent by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: IntentObject,
}

/// The payment intent snapshot embedded in an event.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentObject {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The events settlement acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded {
        event_id: String,
        intent_id: String,
        order_id: Option<OrderId>,
    },
    Failed {
        event_id: String,
        intent_id: String,
        order_id: Option<OrderId>,
        code: Option<String>,
        message: Option<String>,
    },
    Other {
        event_id: String,
        kind: String,
    },
}

impl WebhookEvent {
    /// Decodes a raw webhook body.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Reduces the delivery to what settlement needs.
    pub fn classify(self) -> PaymentEvent {
        let order_id = self
            .data
            .object
            .metadata
            .get("order_id")
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(OrderId::new);

        match self.kind.as_str() {
            "payment_intent.succeeded" => PaymentEvent::Succeeded {
                event_id: self.id,
                intent_id: self.data.object.id,
                order_id,
            },
            "payment_intent.payment_failed" => {
                let (code, message) = self
                    .data
                    .object
                    .last_payment_error
                    .map(|e| (e.code, e.message))
                    .unwrap_or_default();
                PaymentEvent::Failed {
                    event_id: self.id,
                    intent_id: self.data.object.id,
                    order_id,
                    code,
                    message,
                }
            }
            _ => PaymentEvent::Other {
                event_id: self.id,
                kind: self.kind,
            },
        }
    }
}
