use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use logscope_api::{AppendRecord, InspectError, LogBroker, PartitionInfo, RawRecord, TopicInfo, now_ms};

fn default_max_records() -> usize {
    100_000
}

// ═══════════════════════════════════════════════════════════════
//  Partition ring buffer
// ═══════════════════════════════════════════════════════════════

struct MemoryPartition {
    records: VecDeque<RawRecord>,
    next_offset: u64,
}

impl MemoryPartition {
    fn new() -> Self {
        Self {
            records: VecDeque::new(),
            next_offset: 0,
        }
    }

    fn first_offset(&self) -> u64 {
        self.records.front().map_or(self.next_offset, |r| r.offset)
    }

    fn info(&self, id: u32) -> PartitionInfo {
        PartitionInfo {
            id,
            first_offset: self.first_offset(),
            high_watermark: self.next_offset,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBroker
// ═══════════════════════════════════════════════════════════════

/// In-process broker: ring buffer на партицию.
///
/// При переполнении `max_records` самые старые записи вытесняются, и
/// first offset партиции сдвигается вперёд, как после retention.
pub struct MemoryBroker {
    topics: RwLock<BTreeMap<String, Vec<MemoryPartition>>>,
    max_records: usize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(default_max_records())
    }
}

impl MemoryBroker {
    pub fn new(max_records: usize) -> Self {
        Self {
            topics: RwLock::new(BTreeMap::new()),
            max_records: max_records.max(1),
        }
    }

    /// Создать topic с `partitions` пустыми партициями. Существующий topic не трогается.
    pub async fn create_topic(&self, name: &str, partitions: u32) {
        let mut topics = self.topics.write().await;
        topics
            .entry(name.to_string())
            .or_insert_with(|| (0..partitions).map(|_| MemoryPartition::new()).collect());
    }
}

impl LogBroker for MemoryBroker {
    fn topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, InspectError>> + Send + '_>> {
        Box::pin(async move { Ok(self.topics.read().await.keys().cloned().collect()) })
    }

    fn lookup_topic(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TopicInfo>, InspectError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let topics = self.topics.read().await;
            Ok(topics.get(&topic).map(|partitions| TopicInfo {
                name: topic.clone(),
                partitions: partitions
                    .iter()
                    .enumerate()
                    .map(|(id, p)| p.info(id as u32))
                    .collect(),
            }))
        })
    }

    fn fetch(
        &self,
        topic: &str,
        partition: u32,
        offset: u64,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRecord>, InspectError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let topics = self.topics.read().await;
            let p = topics
                .get(&topic)
                .ok_or_else(|| InspectError::TopicNotFound(topic.clone()))?
                .get(partition as usize)
                .ok_or_else(|| InspectError::PartitionNotFound {
                    topic: topic.clone(),
                    partition: partition.into(),
                })?;

            // Offset'ы в буфере идут подряд, индекс считается напрямую.
            let skip = offset.saturating_sub(p.first_offset()) as usize;
            Ok(p.records.iter().skip(skip).take(max).cloned().collect())
        })
    }

    fn append(
        &self,
        topic: &str,
        partition: u32,
        record: AppendRecord,
    ) -> Pin<Box<dyn Future<Output = Result<u64, InspectError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let mut topics = self.topics.write().await;
            let p = topics
                .get_mut(&topic)
                .ok_or_else(|| InspectError::TopicNotFound(topic.clone()))?
                .get_mut(partition as usize)
                .ok_or_else(|| InspectError::PartitionNotFound {
                    topic: topic.clone(),
                    partition: partition.into(),
                })?;

            let offset = p.next_offset;
            if p.records.len() >= self.max_records {
                p.records.pop_front();
            }
            p.records.push_back(RawRecord {
                partition,
                offset,
                timestamp_ms: record.timestamp_ms.unwrap_or_else(now_ms),
                key: record.key,
                value: record.value,
                headers: record.headers,
            });
            p.next_offset += 1;
            Ok(offset)
        })
    }
}
