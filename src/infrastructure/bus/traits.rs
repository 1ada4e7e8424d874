use crate::foundation::SkusError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

pub type Result<T> = std::result::Result<T, SkusError>;

pub const TOPIC_UNSIGNED_ORDER_CREDS: &str = "unsigned-order-creds";
pub const TOPIC_SIGNED_ORDER_CREDS: &str = "signed-order-creds";
pub const TOPIC_SIGNED_ORDER_CREDS_DLQ: &str = "signed-order-creds.dlq";
pub const TOPIC_VOTE: &str = "vote";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub offset: u64,
}

pub struct BusSubscription {
    inner: BoxStream<'static, Result<BusMessage>>,
}

impl BusSubscription {
    pub fn new(inner: BoxStream<'static, Result<BusMessage>>) -> Self {
        Self { inner }
    }

    pub async fn next(&mut self) -> Option<Result<BusMessage>> {
        self.inner.next().await
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<()>;
    async fn subscribe(&self, topic: &str) -> Result<BusSubscription>;
}
