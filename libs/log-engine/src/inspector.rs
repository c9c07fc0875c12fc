use std::sync::Arc;

use logscope_api::{
    FormatSelection, InspectError, LogBroker, MessageQuery, MessageRecord, PartitionOffsets,
    PublishReceipt, PublishRequest, SearchQuery, SearchResults,
};
use logscope_codec::CodecRegistry;

use crate::config::InspectorConfig;
use crate::publish::Publisher;
use crate::reader::{MessageReader, require_topic};
use crate::search::{SearchEngine, SearchParams};

// ═══════════════════════════════════════════════════════════════
//  MessageInspector
// ═══════════════════════════════════════════════════════════════

/// Внешний интерфейс ядра, независимый от транспорта.
///
/// Каждый вызов строит свою пару codec'ов через `CodecRegistry`;
/// между запросами шарятся только broker и кэш схем.
pub struct MessageInspector {
    broker: Arc<dyn LogBroker>,
    codecs: Arc<CodecRegistry>,
    config: InspectorConfig,
    reader: MessageReader,
    search: SearchEngine,
    publisher: Publisher,
}

impl MessageInspector {
    pub fn new(broker: Arc<dyn LogBroker>, codecs: Arc<CodecRegistry>, config: InspectorConfig) -> Self {
        Self {
            reader: MessageReader::new(broker.clone(), config.fetch_batch),
            search: SearchEngine::new(broker.clone(), config.fetch_batch, config.timestamp_seek),
            publisher: Publisher::new(broker.clone()),
            broker,
            codecs,
            config,
        }
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    pub async fn topics(&self) -> Result<Vec<String>, InspectError> {
        self.broker.topics().await
    }

    pub async fn get_partitions(&self, topic: &str) -> Result<Vec<PartitionOffsets>, InspectError> {
        let info = require_topic(self.broker.as_ref(), topic).await?;
        Ok(info.partitions.iter().map(PartitionOffsets::from).collect())
    }

    pub async fn get_messages(&self, topic: &str, query: &MessageQuery) -> Result<Vec<MessageRecord>, InspectError> {
        let decoders = self.codecs.decoder_pair(topic, &query.formats)?;
        let count = self.config.effective_count(query.count);
        tracing::debug!(topic = %topic, partition = query.partition, offset = query.offset, count, ?decoders, "get messages");
        self.reader
            .read_range(topic, query.partition, query.offset, count, &decoders)
            .await
    }

    /// Все партиции в форматах по умолчанию, `count_per_partition` записей с каждой.
    ///
    /// Лимит применяется к каждой партиции отдельно, поэтому результат не
    /// "последние N записей topic'а": нагруженные партиции недопредставлены.
    pub async fn get_all_messages(
        &self,
        topic: &str,
        count_per_partition: Option<u64>,
    ) -> Result<Vec<MessageRecord>, InspectError> {
        let decoders = self.codecs.decoder_pair(topic, &FormatSelection::default())?;
        let count = self.config.effective_count(count_per_partition);
        self.reader.read_all(topic, count, &decoders).await
    }

    /// Линейный поиск по тексту значений; см. `SearchEngine`.
    pub async fn search_messages(&self, topic: &str, query: &SearchQuery) -> Result<SearchResults, InspectError> {
        let decoders = self.codecs.decoder_pair(topic, &query.formats)?;
        let params = SearchParams {
            text: &query.text,
            partition: query.partition,
            max_matches: self.config.effective_count(query.max_matches),
            start_timestamp_ms: query.start_timestamp_ms,
            deadline: query.deadline,
        };
        tracing::debug!(topic = %topic, partition = ?params.partition, max_matches = params.max_matches, "search messages");
        self.search.search(topic, &params, &decoders).await
    }

    pub async fn publish_message(&self, topic: &str, request: &PublishRequest) -> Result<PublishReceipt, InspectError> {
        let encoders = self.codecs.encoder_pair(topic, &request.formats)?;
        let offset = self
            .publisher
            .publish(topic, request.partition, request.key.as_deref(), &request.value, &encoders)
            .await?;
        Ok(PublishReceipt {
            partition: request.partition,
            offset,
        })
    }

    /// `.desc` файлы каталога descriptor'ов.
    pub fn descriptor_files(&self) -> Vec<String> {
        self.codecs.descriptors().list()
    }

    pub fn default_descriptor_for(&self, topic: &str) -> Option<String> {
        self.codecs.descriptors().default_for_topic(topic)
    }
}
