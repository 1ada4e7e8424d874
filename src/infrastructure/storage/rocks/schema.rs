use crate::foundation::{ItemId, OrderId};

/// Helper to build storage keys consistently.
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    pub fn prefix(mut self, prefix: &[u8]) -> Self {
        self.buf.extend_from_slice(prefix);
        self
    }

    pub fn order(mut self, order_id: &OrderId) -> Self {
        self.buf.extend_from_slice(order_id.as_bytes());
        self
    }

    pub fn item(mut self, item_id: &ItemId) -> Self {
        self.buf.extend_from_slice(item_id.as_bytes());
        self
    }

    pub fn str(mut self, value: &str) -> Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.buf.extend_from_slice(value);
        self
    }

    pub fn u64_be(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn sep(mut self) -> Self {
        self.buf.push(b':');
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

pub const CF_METADATA: &str = "metadata";
pub const CF_DEFAULT: &str = "default";
pub const CF_ORDER: &str = "order";
pub const CF_ORDER_EXT_INDEX: &str = "order_ext_index";
pub const CF_ISSUER: &str = "issuer";
pub const CF_ISSUER_PK_INDEX: &str = "issuer_pk_index";
pub const CF_ORDER_CREDS: &str = "order_creds";
pub const CF_TLV2_CREDS: &str = "tlv2_creds";
pub const CF_OUTBOX: &str = "signing_outbox";
pub const CF_VOTE: &str = "vote";
pub const CF_VOTE_INDEX: &str = "vote_index";
/// Queue keys of votes neither processed nor erred; values are empty.
pub const CF_VOTE_PENDING: &str = "vote_pending";
