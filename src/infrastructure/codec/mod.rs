//! Wire codecs for the signing protocol and the vote ledger topic.

pub mod avro;
pub mod schema;
pub mod signing;
pub mod vote;

pub use schema::{SIGNING_ORDER_REQUEST_SCHEMA, SIGNING_ORDER_RESULT_SCHEMA, VOTE_SCHEMA};
pub use signing::{SignedOrder, SignedOrderStatus, SigningOrder, SigningOrderRequest, SigningOrderResult};
pub use vote::{decode_vote_event, encode_vote_event};
