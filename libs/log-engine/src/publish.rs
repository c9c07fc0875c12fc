use std::sync::Arc;

use logscope_api::{AppendRecord, EncoderPair, InspectError, LogBroker, MessageEncoder};

use crate::reader::require_topic;

/// Encode ключа и значения, затем append. Ничего не пишется, если
/// topic/partition не существует или encode не удался.
pub struct Publisher {
    broker: Arc<dyn LogBroker>,
}

impl Publisher {
    pub fn new(broker: Arc<dyn LogBroker>) -> Self {
        Self { broker }
    }

    pub async fn publish(
        &self,
        topic: &str,
        partition: u32,
        key: Option<&str>,
        value: &str,
        encoders: &EncoderPair,
    ) -> Result<u64, InspectError> {
        let info = require_topic(self.broker.as_ref(), topic).await?;
        if info.partition(partition).is_none() {
            return Err(InspectError::PartitionNotFound {
                topic: topic.to_string(),
                partition: partition.into(),
            });
        }

        let key = match key {
            Some(text) => Some(encode(topic, encoders.key.as_ref(), text).await?),
            None => None,
        };
        let value = encode(topic, encoders.value.as_ref(), value).await?;

        let record = AppendRecord {
            key,
            value: Some(value),
            ..Default::default()
        };
        let offset = self.broker.append(topic, partition, record).await?;
        tracing::info!(topic = %topic, partition, offset, "message published");
        Ok(offset)
    }
}

async fn encode(topic: &str, encoder: &dyn MessageEncoder, text: &str) -> Result<Vec<u8>, InspectError> {
    encoder
        .encode(text)
        .await
        .map_err(|e| e.into_inspect_error(topic))
}
