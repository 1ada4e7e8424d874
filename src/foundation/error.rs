use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    OrderNotFound,
    OrderItemNotFound,
    OrderUnpaid,
    OrderExpired,
    IssuerNotFound,
    InvalidSku,
    InvalidCredentialType,
    InvalidMobileProduct,
    InvalidIssuerId,
    InvalidVote,
    InvalidStateTransition,
    InvalidDuration,
    InvalidReceipt,
    NoInAppTx,
    IosPurchaseNotFound,
    GpsSubPurchaseExpired,
    GpsSubPurchasePending,
    GpsSubPurchaseFailed,
    GpsSubPurchaseCanceled,
    GpsSubPurchaseDeferred,
    GpsSubPurchaseStatusUnknown,
    OrderExistsForReceipt,
    NoMatchOrderReceipt,
    InvalidPresentation,
    CredentialsNotVerified,
    Tlv2BatchLimitReached,
    NotificationUnauthorized,
    NotificationInvalid,
    CredentialsNotFound,
    MixedOrderItems,
    IssuerRpcError,
    ReceiptVerifierError,
    BusError,
    StorageError,
    StorageLockTimeout,
    SchemaMismatch,
    SerializationError,
    CodecError,
    ConfigError,
    Cancelled,
    Message,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SkusError {
    // === Order model ===
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("order item not found: {0}")]
    OrderItemNotFound(String),

    #[error("order is not paid, or invalid last paid at: order_id={order_id}")]
    OrderUnpaid { order_id: String },

    #[error("order has expired: order_id={order_id}")]
    OrderExpired { order_id: String },

    #[error("issuer not found: {0}")]
    IssuerNotFound(String),

    #[error("invalid sku token")]
    InvalidSku,

    #[error("invalid credential type: {0}")]
    InvalidCredentialType(String),

    #[error("invalid mobile product: {0}")]
    InvalidMobileProduct(String),

    #[error("invalid issuer id {issuer_id}: {details}")]
    InvalidIssuerId { issuer_id: String, details: String },

    #[error("invalid vote: {0}")]
    InvalidVote(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("invalid iso8601 duration '{value}': {details}")]
    InvalidDuration { value: String, details: String },

    #[error("order items must agree on {field}")]
    MixedOrderItems { field: String },

    #[error("credentials not found: {0}")]
    CredentialsNotFound(String),

    #[error("invalid credential presentation: {0}")]
    InvalidPresentation(String),

    #[error("credentials could not be verified: {0}")]
    CredentialsNotVerified(String),

    #[error("too many active credential batches: active={active} limit={limit}")]
    Tlv2BatchLimitReached { active: usize, limit: usize },

    // === Receipts and notifications ===
    #[error("invalid receipt: {0}")]
    InvalidReceipt(String),

    #[error("no in app info in response")]
    NoInAppTx,

    #[error("ios purchase not found: product_id={product_id}")]
    IosPurchaseNotFound { product_id: String },

    #[error("play store subscription purchase expired")]
    GpsSubPurchaseExpired,

    #[error("play store subscription purchase pending")]
    GpsSubPurchasePending,

    #[error("play store subscription purchase failed: {0}")]
    GpsSubPurchaseFailed(String),

    #[error("play store subscription purchase canceled: {reason}")]
    GpsSubPurchaseCanceled { reason: String },

    #[error("play store subscription purchase deferred")]
    GpsSubPurchaseDeferred,

    #[error("play store subscription purchase status unknown: {0}")]
    GpsSubPurchaseStatusUnknown(i64),

    #[error("order already exists for receipt: order_id={order_id}")]
    OrderExistsForReceipt { order_id: String },

    #[error("order_id does not match receipt order")]
    NoMatchOrderReceipt,

    #[error("notification unauthorized: {0}")]
    NotificationUnauthorized(String),

    #[error("invalid notification: {0}")]
    NotificationInvalid(String),

    // === External collaborators ===
    #[error("credential issuer error during {operation}: {details}")]
    IssuerRpc { operation: String, status: Option<u16>, details: String },

    #[error("receipt verifier error during {operation}: {details}")]
    ReceiptVerifier { operation: String, details: String },

    #[error("message bus error during {operation}: {details}")]
    Bus { operation: String, details: String },

    // === Storage ===
    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("storage lock timeout: {operation} (waited {timeout_secs}s)")]
    StorageLockTimeout { operation: String, timeout_secs: u64 },

    #[error("schema mismatch: stored={stored} current={current}")]
    SchemaMismatch { stored: u32, current: u32 },

    // === Encoding ===
    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("codec error in {schema}: {details}")]
    Codec { schema: String, details: String },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, SkusError>;

impl SkusError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SkusError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            SkusError::OrderItemNotFound(_) => ErrorCode::OrderItemNotFound,
            SkusError::OrderUnpaid { .. } => ErrorCode::OrderUnpaid,
            SkusError::OrderExpired { .. } => ErrorCode::OrderExpired,
            SkusError::IssuerNotFound(_) => ErrorCode::IssuerNotFound,
            SkusError::InvalidSku => ErrorCode::InvalidSku,
            SkusError::InvalidCredentialType(_) => ErrorCode::InvalidCredentialType,
            SkusError::InvalidMobileProduct(_) => ErrorCode::InvalidMobileProduct,
            SkusError::InvalidIssuerId { .. } => ErrorCode::InvalidIssuerId,
            SkusError::InvalidVote(_) => ErrorCode::InvalidVote,
            SkusError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            SkusError::InvalidDuration { .. } => ErrorCode::InvalidDuration,
            SkusError::MixedOrderItems { .. } => ErrorCode::MixedOrderItems,
            SkusError::CredentialsNotFound(_) => ErrorCode::CredentialsNotFound,
            SkusError::InvalidReceipt(_) => ErrorCode::InvalidReceipt,
            SkusError::NoInAppTx => ErrorCode::NoInAppTx,
            SkusError::IosPurchaseNotFound { .. } => ErrorCode::IosPurchaseNotFound,
            SkusError::GpsSubPurchaseExpired => ErrorCode::GpsSubPurchaseExpired,
            SkusError::GpsSubPurchasePending => ErrorCode::GpsSubPurchasePending,
            SkusError::GpsSubPurchaseFailed(_) => ErrorCode::GpsSubPurchaseFailed,
            SkusError::GpsSubPurchaseCanceled { .. } => ErrorCode::GpsSubPurchaseCanceled,
            SkusError::GpsSubPurchaseDeferred => ErrorCode::GpsSubPurchaseDeferred,
            SkusError::GpsSubPurchaseStatusUnknown(_) => ErrorCode::GpsSubPurchaseStatusUnknown,
            SkusError::OrderExistsForReceipt { .. } => ErrorCode::OrderExistsForReceipt,
            SkusError::NoMatchOrderReceipt => ErrorCode::NoMatchOrderReceipt,
            SkusError::InvalidPresentation(_) => ErrorCode::InvalidPresentation,
            SkusError::CredentialsNotVerified(_) => ErrorCode::CredentialsNotVerified,
            SkusError::Tlv2BatchLimitReached { .. } => ErrorCode::Tlv2BatchLimitReached,
            SkusError::NotificationUnauthorized(_) => ErrorCode::NotificationUnauthorized,
            SkusError::NotificationInvalid(_) => ErrorCode::NotificationInvalid,
            SkusError::IssuerRpc { .. } => ErrorCode::IssuerRpcError,
            SkusError::ReceiptVerifier { .. } => ErrorCode::ReceiptVerifierError,
            SkusError::Bus { .. } => ErrorCode::BusError,
            SkusError::StorageError { .. } => ErrorCode::StorageError,
            SkusError::StorageLockTimeout { .. } => ErrorCode::StorageLockTimeout,
            SkusError::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            SkusError::SerializationError { .. } => ErrorCode::SerializationError,
            SkusError::Codec { .. } => ErrorCode::CodecError,
            SkusError::ConfigError(_) => ErrorCode::ConfigError,
            SkusError::Cancelled => ErrorCode::Cancelled,
            SkusError::Message(_) => ErrorCode::Message,
        }
    }

    pub fn context(&self) -> ErrorContext {
        ErrorContext { code: self.code(), message: self.to_string() }
    }

    /// Input and authorization failures the caller has to fix; never retried internally.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::OrderNotFound
                | ErrorCode::OrderItemNotFound
                | ErrorCode::OrderUnpaid
                | ErrorCode::OrderExpired
                | ErrorCode::InvalidSku
                | ErrorCode::InvalidCredentialType
                | ErrorCode::InvalidMobileProduct
                | ErrorCode::InvalidVote
                | ErrorCode::InvalidDuration
                | ErrorCode::MixedOrderItems
                | ErrorCode::InvalidReceipt
                | ErrorCode::NoInAppTx
                | ErrorCode::IosPurchaseNotFound
                | ErrorCode::GpsSubPurchaseExpired
                | ErrorCode::GpsSubPurchasePending
                | ErrorCode::GpsSubPurchaseFailed
                | ErrorCode::GpsSubPurchaseCanceled
                | ErrorCode::GpsSubPurchaseDeferred
                | ErrorCode::GpsSubPurchaseStatusUnknown
                | ErrorCode::OrderExistsForReceipt
                | ErrorCode::NoMatchOrderReceipt
                | ErrorCode::InvalidPresentation
                | ErrorCode::CredentialsNotVerified
                | ErrorCode::Tlv2BatchLimitReached
                | ErrorCode::NotificationUnauthorized
                | ErrorCode::NotificationInvalid
        )
    }

    /// HTTP status reported by the credential issuer, if the failure came from it.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            SkusError::IssuerRpc { status, .. } => *status,
            _ => None,
        }
    }

    pub fn issuer_rpc(operation: impl Into<String>, status: Option<u16>, details: impl Into<String>) -> Self {
        SkusError::IssuerRpc { operation: operation.into(), status, details: details.into() }
    }

    pub fn bus(operation: impl Into<String>, details: impl Into<String>) -> Self {
        SkusError::Bus { operation: operation.into(), details: details.into() }
    }

    pub fn codec(schema: impl Into<String>, details: impl Into<String>) -> Self {
        SkusError::Codec { schema: schema.into(), details: details.into() }
    }
}

impl From<toml::de::Error> for SkusError {
    fn from(err: toml::de::Error) -> Self {
        SkusError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<rocksdb::Error> for SkusError {
    fn from(err: rocksdb::Error) -> Self {
        SkusError::StorageError { operation: "rocksdb".to_string(), details: err.to_string() }
    }
}

impl From<bincode::Error> for SkusError {
    fn from(err: bincode::Error) -> Self {
        SkusError::SerializationError { format: "bincode".to_string(), details: err.to_string() }
    }
}

#[macro_export]
macro_rules! storage_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::SkusError::StorageError { operation: $op.into(), details: $err.to_string() }
    };
}

#[macro_export]
macro_rules! serde_err {
    ($fmt:expr, $err:expr) => {
        $crate::foundation::SkusError::SerializationError { format: $fmt.into(), details: $err.to_string() }
    };
}

impl From<io::Error> for SkusError {
    fn from(err: io::Error) -> Self {
        SkusError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for SkusError {
    fn from(err: serde_json::Error) -> Self {
        SkusError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

impl From<base64::DecodeError> for SkusError {
    fn from(err: base64::DecodeError) -> Self {
        SkusError::SerializationError { format: "base64".to_string(), details: err.to_string() }
    }
}

impl From<uuid::Error> for SkusError {
    fn from(err: uuid::Error) -> Self {
        SkusError::SerializationError { format: "uuid".to_string(), details: err.to_string() }
    }
}

impl From<chrono::ParseError> for SkusError {
    fn from(err: chrono::ParseError) -> Self {
        SkusError::SerializationError { format: "rfc3339".to_string(), details: err.to_string() }
    }
}

impl From<rust_decimal::Error> for SkusError {
    fn from(err: rust_decimal::Error) -> Self {
        SkusError::SerializationError { format: "decimal".to_string(), details: err.to_string() }
    }
}

impl From<url::ParseError> for SkusError {
    fn from(err: url::ParseError) -> Self {
        SkusError::SerializationError { format: "url".to_string(), details: err.to_string() }
    }
}

// NOTE: Avoid adding generic "stringly" error conversions here.
// Use structured `SkusError` variants at the call site to preserve context.
