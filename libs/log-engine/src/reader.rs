use std::collections::BTreeMap;
use std::sync::Arc;

use logscope_api::{
    CodecError, DecoderPair, InspectError, LogBroker, MessageDecoder, MessageRecord, Payload,
    RawRecord, TopicInfo,
};

/// Снимок topic'а или `TopicNotFound`.
pub(crate) async fn require_topic(broker: &dyn LogBroker, topic: &str) -> Result<TopicInfo, InspectError> {
    broker
        .lookup_topic(topic)
        .await?
        .ok_or_else(|| InspectError::TopicNotFound(topic.to_string()))
}

async fn decode_payload(
    topic: &str,
    offset: u64,
    decoder: &dyn MessageDecoder,
    data: Option<&[u8]>,
) -> Result<Option<Payload>, InspectError> {
    let Some(data) = data else {
        return Ok(None);
    };
    match decoder.decode(data).await {
        Ok(value) => Ok(Some(Payload::Decoded { value })),
        Err(CodecError::Malformed(reason)) => {
            tracing::debug!(topic = %topic, offset, format = %decoder.format(), error = %reason, "undecodable payload");
            Ok(Some(Payload::undecodable(reason, data)))
        }
        Err(e) => Err(e.into_inspect_error(topic)),
    }
}

/// Raw запись → MessageRecord. Битый payload становится `undecodable`,
/// ошибка схемы прерывает всю операцию.
pub(crate) async fn materialize(
    topic: &str,
    raw: RawRecord,
    decoders: &DecoderPair,
) -> Result<MessageRecord, InspectError> {
    let key = decode_payload(topic, raw.offset, decoders.key.as_ref(), raw.key.as_deref()).await?;
    let value = decode_payload(topic, raw.offset, decoders.value.as_ref(), raw.value.as_deref()).await?;
    let headers: BTreeMap<String, String> = raw
        .headers
        .into_iter()
        .map(|(name, value)| (name, String::from_utf8_lossy(&value).into_owned()))
        .collect();

    Ok(MessageRecord {
        partition: raw.partition,
        offset: raw.offset,
        timestamp_ms: raw.timestamp_ms,
        key_size: raw.key.as_ref().map_or(0, Vec::len),
        value_size: raw.value.as_ref().map_or(0, Vec::len),
        key,
        value,
        headers,
    })
}

// ═══════════════════════════════════════════════════════════════
//  MessageReader
// ═══════════════════════════════════════════════════════════════

/// Ограниченные окна записей одной или всех партиций.
pub struct MessageReader {
    broker: Arc<dyn LogBroker>,
    fetch_batch: usize,
}

impl MessageReader {
    pub fn new(broker: Arc<dyn LogBroker>, fetch_batch: usize) -> Self {
        Self {
            broker,
            fetch_batch: fetch_batch.max(1),
        }
    }

    /// До `max_count` подряд идущих записей партиции начиная с
    /// `max(start_offset, first_offset)`.
    ///
    /// Offset за high-water mark'ом или `max_count == 0` дают пустой результат.
    pub async fn read_range(
        &self,
        topic: &str,
        partition: u32,
        start_offset: u64,
        max_count: u64,
        decoders: &DecoderPair,
    ) -> Result<Vec<MessageRecord>, InspectError> {
        let info = require_topic(self.broker.as_ref(), topic).await?;
        let p = info.partition(partition).ok_or_else(|| InspectError::PartitionNotFound {
            topic: topic.to_string(),
            partition: partition.into(),
        })?;

        if max_count == 0 || start_offset >= p.high_watermark {
            return Ok(Vec::new());
        }

        let start = start_offset.max(p.first_offset);
        let end = p.high_watermark;
        self.read_window(topic, partition, start, end, max_count, decoders).await
    }

    /// Каждая партиция с первого сохранившегося offset'а, не больше
    /// `max_per_partition` записей с каждой, затем стабильная сортировка
    /// по timestamp'у.
    ///
    /// Лимит на партицию независимый: нагруженные партиции попадают в
    /// выборку не полностью, и общий результат не "последние N записей topic'а".
    pub async fn read_all(
        &self,
        topic: &str,
        max_per_partition: u64,
        decoders: &DecoderPair,
    ) -> Result<Vec<MessageRecord>, InspectError> {
        let info = require_topic(self.broker.as_ref(), topic).await?;

        let mut records = Vec::new();
        for p in &info.partitions {
            if p.is_empty() {
                continue;
            }
            let window = self
                .read_window(topic, p.id, p.first_offset, p.high_watermark, max_per_partition, decoders)
                .await?;
            records.extend(window);
        }

        records.sort_by_key(|r| r.timestamp_ms);
        tracing::debug!(topic = %topic, partitions = info.partitions.len(), records = records.len(), "read all partitions");
        Ok(records)
    }

    async fn read_window(
        &self,
        topic: &str,
        partition: u32,
        start: u64,
        end: u64,
        max_count: u64,
        decoders: &DecoderPair,
    ) -> Result<Vec<MessageRecord>, InspectError> {
        let mut records = Vec::new();
        let mut next = start;

        'fetch: while next < end && (records.len() as u64) < max_count {
            let remaining = (max_count - records.len() as u64).min(end - next);
            let batch_size = (remaining as usize).min(self.fetch_batch);
            let batch = self.broker.fetch(topic, partition, next, batch_size).await?;
            if batch.is_empty() {
                break;
            }

            for raw in batch {
                if raw.offset >= end || records.len() as u64 >= max_count {
                    break 'fetch;
                }
                next = raw.offset + 1;
                records.push(materialize(topic, raw, decoders).await?);
            }
        }

        Ok(records)
    }
}
