//! Application layer: orchestration across domain logic and infrastructure I/O.

pub mod context;
pub mod receipt;
pub mod service;
pub mod signed_creds;
pub mod vote;

pub use context::{ReceiptContext, SkusContext};
pub use receipt::{
    authenticate_play_notification, check_order_receipt, create_order_with_receipt, link_receipt_to_order,
    process_app_store_notification, process_play_store_notification, validate_apple, validate_google, validate_receipt,
};
pub use service::{
    cancel_order, create_issuer, create_issuer_v3, create_order, create_order_credentials, create_order_item_from_macaroon,
    get_credentials, get_item_credentials, get_time_limited_creds, set_order_trial_days, sku_vnt_by_mobile_name, uniq_batches,
    validate_hardcoded_sku, verify_credential,
};
pub use signed_creds::{forward_to_dlq, handle_signed_order_credentials, run_store_signed_order_credentials};
pub use vote::{run_next_vote_drain_job, run_vote_drain_loop, vote};
