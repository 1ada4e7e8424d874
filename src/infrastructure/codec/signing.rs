use super::avro::{AvroReader, AvroWriter};
use super::schema::{SIGNING_ORDER_REQUEST_SCHEMA_NAME, SIGNING_ORDER_RESULT_SCHEMA_NAME};
use crate::domain::Metadata;
use crate::foundation::util::time::parse_rfc3339;
use crate::foundation::{RequestId, SkusError};
use chrono::{DateTime, Utc};
use std::fmt;

/// Blinded tokens for one order item, addressed to one issuer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningOrder {
    /// JSON [`Metadata`].
    pub associated_data: Vec<u8>,
    pub blinded_tokens: Vec<String>,
    /// Encoded issuer id.
    pub issuer_type: String,
    pub issuer_cohort: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningOrderRequest {
    pub request_id: RequestId,
    pub data: Vec<SigningOrder>,
}

impl SigningOrderRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = AvroWriter::new();
        w.string(self.request_id.as_str());
        w.array(&self.data, |w, order| {
            w.bytes(&order.associated_data)
                .string_array(&order.blinded_tokens)
                .string(&order.issuer_type)
                .int(order.issuer_cohort);
        });
        w.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SkusError> {
        let mut r = AvroReader::new(SIGNING_ORDER_REQUEST_SCHEMA_NAME, bytes);
        let request_id = RequestId::new(r.string()?);
        let data = r.array(|r| {
            Ok(SigningOrder {
                associated_data: r.bytes()?,
                blinded_tokens: r.string_array()?,
                issuer_type: r.string()?,
                issuer_cohort: r.int()?,
            })
        })?;
        r.finish()?;
        Ok(Self { request_id, data })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedOrderStatus {
    Ok,
    InvalidIssuer,
    Error,
}

impl SignedOrderStatus {
    const SYMBOLS: [SignedOrderStatus; 3] = [SignedOrderStatus::Ok, SignedOrderStatus::InvalidIssuer, SignedOrderStatus::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignedOrderStatus::Ok => "ok",
            SignedOrderStatus::InvalidIssuer => "invalid_issuer",
            SignedOrderStatus::Error => "error",
        }
    }

    fn index(&self) -> i32 {
        match self {
            SignedOrderStatus::Ok => 0,
            SignedOrderStatus::InvalidIssuer => 1,
            SignedOrderStatus::Error => 2,
        }
    }
}

impl fmt::Display for SignedOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedOrder {
    pub signed_tokens: Vec<String>,
    pub public_key: String,
    pub proof: String,
    pub status: SignedOrderStatus,
    pub associated_data: Vec<u8>,
    pub valid_to: Option<String>,
    pub valid_from: Option<String>,
    pub blinded_tokens: Vec<String>,
}

impl SignedOrder {
    pub fn metadata(&self) -> Result<Metadata, SkusError> {
        Metadata::from_json_bytes(&self.associated_data)
    }

    /// Validity window of a time-limited-v2 result. Both ends must be present.
    pub fn validity(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), SkusError> {
        let (Some(from), Some(to)) = (self.valid_from.as_deref(), self.valid_to.as_deref()) else {
            return Err(SkusError::codec(SIGNING_ORDER_RESULT_SCHEMA_NAME, "missing valid_from or valid_to"));
        };
        Ok((parse_rfc3339(from)?, parse_rfc3339(to)?))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningOrderResult {
    pub request_id: RequestId,
    pub data: Vec<SignedOrder>,
}

impl SigningOrderResult {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = AvroWriter::new();
        w.string(self.request_id.as_str());
        w.array(&self.data, |w, order| {
            w.string_array(&order.signed_tokens)
                .string(&order.public_key)
                .string(&order.proof)
                .enum_index(order.status.index())
                .bytes(&order.associated_data)
                .optional_string(order.valid_to.as_deref())
                .optional_string(order.valid_from.as_deref())
                .string_array(&order.blinded_tokens);
        });
        w.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SkusError> {
        let mut r = AvroReader::new(SIGNING_ORDER_RESULT_SCHEMA_NAME, bytes);
        let request_id = RequestId::new(r.string()?);
        let data = r.array(|r| {
            Ok(SignedOrder {
                signed_tokens: r.string_array()?,
                public_key: r.string()?,
                proof: r.string()?,
                status: SignedOrderStatus::SYMBOLS[r.enum_index(SignedOrderStatus::SYMBOLS.len())?],
                associated_data: r.bytes()?,
                valid_to: r.optional_string()?,
                valid_from: r.optional_string()?,
                blinded_tokens: r.string_array()?,
            })
        })?;
        r.finish()?;
        Ok(Self { request_id, data })
    }
}
