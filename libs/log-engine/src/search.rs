use std::sync::Arc;
use std::time::{Duration, Instant};

use logscope_api::{
    CompletionReason, DecoderPair, InspectError, LogBroker, MessageRecord, PartitionFilter,
    PartitionInfo, SearchCompletion, SearchResults,
};

use crate::config::TimestampSeek;
use crate::reader::{materialize, require_topic};

/// Параметры одного поиска после применения дефолтов.
#[derive(Debug, Clone)]
pub struct SearchParams<'a> {
    pub text: &'a str,
    pub partition: PartitionFilter,
    pub max_matches: u64,
    pub start_timestamp_ms: i64,
    pub deadline: Option<Duration>,
}

enum Stop {
    Cap,
    Deadline,
}

/// Полнотекстовый поиск по декодированным значениям.
///
/// Линейный: стоимость пропорциональна числу записей между стартовым
/// timestamp'ом и концом retention'а. Индексов нет.
///
/// Партиции просматриваются по очереди в порядке id, лимит `max_matches`
/// общий. Поэтому при маленьком лимите результат набирается из первых
/// партиций, даже если в следующих есть более ранние совпадения;
/// сортировка по времени применяется уже к найденному.
pub struct SearchEngine {
    broker: Arc<dyn LogBroker>,
    fetch_batch: usize,
    seek: TimestampSeek,
}

impl SearchEngine {
    pub fn new(broker: Arc<dyn LogBroker>, fetch_batch: usize, seek: TimestampSeek) -> Self {
        Self {
            broker,
            fetch_batch: fetch_batch.max(1),
            seek,
        }
    }

    pub async fn search(
        &self,
        topic: &str,
        params: &SearchParams<'_>,
        decoders: &DecoderPair,
    ) -> Result<SearchResults, InspectError> {
        let started = Instant::now();
        let info = require_topic(self.broker.as_ref(), topic).await?;
        let partitions: Vec<PartitionInfo> = match params.partition {
            PartitionFilter::All => info.partitions.clone(),
            PartitionFilter::Only(id) => vec![info.partition(id).cloned().ok_or_else(|| {
                InspectError::PartitionNotFound {
                    topic: topic.to_string(),
                    partition: id.into(),
                }
            })?],
        };

        let mut scan = Scan {
            params,
            started,
            messages: Vec::new(),
            scanned: 0,
        };

        let mut stop = None;
        if params.max_matches == 0 {
            stop = Some(Stop::Cap);
        }
        for p in &partitions {
            if stop.is_some() {
                break;
            }
            stop = self.scan_partition(topic, p, &mut scan, decoders).await?;
        }

        let Scan { mut messages, scanned, .. } = scan;
        messages.sort_by_key(|r| r.timestamp_ms);

        let (exhausted, reason) = match stop {
            None => (true, CompletionReason::ExhaustedAllMessages),
            Some(Stop::Cap) => (false, CompletionReason::FoundRequestedNumberOfResults),
            Some(Stop::Deadline) => (false, CompletionReason::ReachedDeadline),
        };
        let completion = SearchCompletion {
            exhausted,
            reason,
            messages_scanned: scanned,
            matches_found: messages.len() as u64,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::debug!(
            topic = %topic,
            scanned = completion.messages_scanned,
            matches = completion.matches_found,
            reason = ?completion.reason,
            "search finished"
        );
        Ok(SearchResults { messages, completion })
    }

    /// Скан одной партиции до high-water mark'а, снятого в начале поиска.
    async fn scan_partition(
        &self,
        topic: &str,
        p: &PartitionInfo,
        scan: &mut Scan<'_, '_>,
        decoders: &DecoderPair,
    ) -> Result<Option<Stop>, InspectError> {
        let end = p.high_watermark;
        let mut next = match self.seek {
            TimestampSeek::Linear => p.first_offset,
            TimestampSeek::Binary => self.seek_timestamp(topic, p, scan.params.start_timestamp_ms).await?,
        };

        while next < end {
            if scan.deadline_passed() {
                return Ok(Some(Stop::Deadline));
            }
            let batch_size = ((end - next) as usize).min(self.fetch_batch);
            let batch = self.broker.fetch(topic, p.id, next, batch_size).await?;
            if batch.is_empty() {
                break;
            }

            for raw in batch {
                if raw.offset >= end {
                    return Ok(None);
                }
                next = raw.offset + 1;
                scan.scanned += 1;
                if raw.timestamp_ms < scan.params.start_timestamp_ms {
                    continue;
                }

                let record = materialize(topic, raw, decoders).await?;
                if scan.matches(&record) {
                    scan.messages.push(record);
                    if scan.messages.len() as u64 >= scan.params.max_matches {
                        return Ok(Some(Stop::Cap));
                    }
                }
                if scan.deadline_passed() {
                    return Ok(Some(Stop::Deadline));
                }
            }
        }
        Ok(None)
    }

    /// Первый offset с timestamp >= `start_ms` бинарным поиском по одиночным fetch'ам.
    async fn seek_timestamp(&self, topic: &str, p: &PartitionInfo, start_ms: i64) -> Result<u64, InspectError> {
        let (mut lo, mut hi) = (p.first_offset, p.high_watermark);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let head = self.broker.fetch(topic, p.id, mid, 1).await?;
            match head.first() {
                Some(record) if record.offset < hi && record.timestamp_ms < start_ms => {
                    lo = record.offset + 1;
                }
                _ => hi = mid,
            }
        }
        tracing::trace!(topic = %topic, partition = p.id, start_ms, offset = lo, "timestamp seek");
        Ok(lo)
    }
}

struct Scan<'p, 'a> {
    params: &'p SearchParams<'a>,
    started: Instant,
    messages: Vec<MessageRecord>,
    scanned: u64,
}

impl Scan<'_, '_> {
    fn matches(&self, record: &MessageRecord) -> bool {
        record
            .value
            .as_ref()
            .and_then(|payload| payload.text())
            .is_some_and(|text| text.contains(self.params.text))
    }

    fn deadline_passed(&self) -> bool {
        self.params
            .deadline
            .is_some_and(|deadline| self.started.elapsed() >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use logscope_api::AppendRecord;
    use logscope_codec::format::StringCodec;

    fn strings() -> DecoderPair {
        DecoderPair::new(Arc::new(StringCodec), Arc::new(StringCodec))
    }

    async fn broker(records: &[(u32, i64, &str)]) -> Arc<MemoryBroker> {
        let broker = Arc::new(MemoryBroker::default());
        broker.create_topic("t", 2).await;
        for (partition, ts, value) in records {
            let record = AppendRecord {
                value: Some(value.as_bytes().to_vec()),
                timestamp_ms: Some(*ts),
                ..Default::default()
            };
            broker.append("t", *partition, record).await.unwrap();
        }
        broker
    }

    fn params(text: &str, max_matches: u64, start: i64) -> SearchParams<'_> {
        SearchParams {
            text,
            partition: PartitionFilter::All,
            max_matches,
            start_timestamp_ms: start,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn binary_seek_matches_linear_on_monotonic_data() {
        let data: Vec<(u32, i64, String)> = (0..40).map(|i| (0, i * 10, format!("msg-{i}"))).collect();
        let refs: Vec<(u32, i64, &str)> = data.iter().map(|(p, t, v)| (*p, *t, v.as_str())).collect();
        let broker = broker(&refs).await;

        for start in [0, 5, 150, 390, 1_000] {
            let linear = SearchEngine::new(broker.clone(), 7, TimestampSeek::Linear)
                .search("t", &params("msg", 100, start), &strings())
                .await
                .unwrap();
            let binary = SearchEngine::new(broker.clone(), 7, TimestampSeek::Binary)
                .search("t", &params("msg", 100, start), &strings())
                .await
                .unwrap();
            let offsets = |r: &SearchResults| r.messages.iter().map(|m| m.offset).collect::<Vec<_>>();
            assert_eq!(offsets(&linear), offsets(&binary), "start {start}");
            assert!(binary.completion.exhausted);
        }
    }

    #[tokio::test]
    async fn records_before_start_are_never_matched() {
        let broker = broker(&[(0, 0, "foo"), (0, 100, "foo"), (1, 50, "foo")]).await;
        let engine = SearchEngine::new(broker, 10, TimestampSeek::Linear);
        let results = engine.search("t", &params("foo", 10, 60), &strings()).await.unwrap();
        assert_eq!(results.messages.len(), 1);
        assert_eq!(results.messages[0].timestamp_ms, 100);
        assert_eq!(results.completion.messages_scanned, 3);
    }

    #[tokio::test]
    async fn expired_deadline_stops_scan() {
        let broker = broker(&[(0, 0, "foo"), (0, 1, "foo")]).await;
        let engine = SearchEngine::new(broker, 10, TimestampSeek::Linear);
        let mut p = params("foo", 10, 0);
        p.deadline = Some(Duration::ZERO);
        let results = engine.search("t", &p, &strings()).await.unwrap();
        assert!(!results.completion.exhausted);
        assert_eq!(results.completion.reason, CompletionReason::ReachedDeadline);
    }

    #[tokio::test]
    async fn small_cap_fills_from_lower_partition_ids_first() {
        let broker = broker(&[(0, 500, "foo-late"), (1, 10, "foo-early")]).await;
        let engine = SearchEngine::new(broker, 10, TimestampSeek::Linear);
        let results = engine.search("t", &params("foo", 1, 0), &strings()).await.unwrap();
        assert_eq!(results.messages.len(), 1);
        assert_eq!(results.messages[0].partition, 0);
        assert_eq!(results.completion.messages_scanned, 1);
        assert_eq!(results.completion.reason, CompletionReason::FoundRequestedNumberOfResults);
    }

    #[tokio::test]
    async fn unknown_partition_filter_is_not_found() {
        let engine = SearchEngine::new(broker(&[]).await, 10, TimestampSeek::Linear);
        let mut p = params("x", 1, 0);
        p.partition = PartitionFilter::Only(9);
        let err = engine.search("t", &p, &strings()).await.unwrap_err();
        assert_eq!(err.kind(), logscope_api::ErrorKind::NotFound);
    }
}
