pub mod credential;
pub mod mobile;
pub mod order;
pub mod receipt;
pub mod time_limited;
pub mod vote;

pub use credential::{
    deduplicate_credential_bindings, CredentialBinding, CredentialKind, CredentialRedemption, CredentialVerification,
    CredentialsOutcome, Metadata, OrderCreds, SigningRequestOutbox, TimeAwareSubIssuedCreds, TimeLimitedCreds,
    TimeLimitedPresentation, VerifyCredentialRequest,
};
pub use mobile::{mobile_order_item, sku_vnt_by_mobile_name};
pub use order::{CredentialType, Issuer, IssuerConfig, Order, OrderItem, OrderStatus};
pub use vote::{FundingSource, Vote, VoteEvent, VoteRecord, VoteType};
