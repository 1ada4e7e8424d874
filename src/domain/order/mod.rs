pub mod issuer_id;
pub mod model;
pub mod state_machine;

pub use issuer_id::{decode_issuer_id, encode_issuer_id};
pub use model::{
    ensure_equal_payment_methods, CredentialType, Issuer, IssuerConfig, Order, OrderItem, OrderItemRequest, OrderStatus,
    METADATA_EXTERNAL_ID, METADATA_NUM_INTERVALS, METADATA_NUM_PER_INTERVAL, METADATA_VENDOR, STRIPE_PAYMENT_METHOD,
};
pub use state_machine::{ensure_valid_transition, validate_transition, StateTransitionResult};
