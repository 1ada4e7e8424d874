//! Avro schema texts shared with the signer and the ledger consumers.

pub const VOTE_SCHEMA: &str = r#"{
  "namespace": "brave.payments",
  "type": "record",
  "name": "vote",
  "doc": "This message is sent when a user funded wallet has successfully auto-contributed to a channel",
  "fields": [
    { "name": "id", "type": "string" },
    { "name": "type", "type": "string" },
    { "name": "channel", "type": "string" },
    { "name": "createdAt", "type": "string" },
    { "name": "baseVoteValue", "type": "string", "default":"0.25" },
    { "name": "voteTally", "type": "long", "default":1 },
    { "name": "fundingSource", "type": "string", "default": "uphold" }
  ]
}"#;

pub const SIGNING_ORDER_REQUEST_SCHEMA: &str = r#"{
  "namespace": "brave.payments",
  "type": "record",
  "doc": "Top level request containing the data to be processed, as well as any top level metadata for this message.",
  "name": "signingOrderRequestSchema",
  "fields": [
    { "name": "request_id", "type": "string" },
    {
      "name": "data",
      "type": {
        "type": "array",
        "items": {
          "namespace": "brave.payments",
          "type": "record",
          "name": "SigningOrder",
          "fields": [
            { "name": "associated_data", "type": "bytes", "doc": "contains METADATA" },
            {
              "name": "blinded_tokens",
              "type": { "type": "array", "items": { "name": "blinded_token", "type": "string", "namespace": "brave.payments" } }
            },
            { "name": "issuer_type", "type": "string" },
            { "name": "issuer_cohort", "type": "int" }
          ]
        }
      }
    }
  ]
}"#;

pub const SIGNING_ORDER_RESULT_SCHEMA: &str = r#"{
  "namespace": "brave.payments",
  "type": "record",
  "doc": "Top level request containing the data to be processed, as well as any top level metadata for this message.",
  "name": "signingOrderResultSchema",
  "fields": [
    { "name": "request_id", "type": "string" },
    {
      "name": "data",
      "type": {
        "type": "array",
        "items": {
          "namespace": "brave.payments",
          "type": "record",
          "name": "SignedOrder",
          "fields": [
            { "name": "signed_tokens", "type": { "type": "array", "items": { "name": "signed_token", "type": "string" } } },
            { "name": "public_key", "type": "string" },
            { "name": "proof", "type": "string" },
            {
              "name": "status",
              "type": { "name": "SigningResultStatus", "type": "enum", "symbols": ["ok", "invalid_issuer", "error"] }
            },
            { "name": "associated_data", "type": "bytes", "doc": "contains METADATA" },
            { "name": "valid_to", "type": ["null", "string"], "default": null },
            { "name": "valid_from", "type": ["null", "string"], "default": null },
            { "name": "blinded_tokens", "type": { "type": "array", "items": { "type": "string" } }, "default": [] }
          ]
        }
      }
    }
  ]
}"#;

pub(crate) const VOTE_SCHEMA_NAME: &str = "vote";
pub(crate) const SIGNING_ORDER_REQUEST_SCHEMA_NAME: &str = "signingOrderRequestSchema";
pub(crate) const SIGNING_ORDER_RESULT_SCHEMA_NAME: &str = "signingOrderResultSchema";
