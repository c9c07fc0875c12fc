use std::sync::Arc;

use log_engine::{FileBroker, InspectorConfig, MemoryBroker, MessageInspector};
use logscope_api::{
    AppendRecord, CompletionReason, ErrorKind, FormatSelection, LogBroker, MessageFormat,
    MessageQuery, PartitionFilter, Payload, PublishRequest, SearchQuery,
};
use logscope_codec::{
    CodecRegistry, DescriptorResolver, MessageFormatConfig, SchemaRegistry, SchemaType,
    StaticSchemaSource,
};

fn codecs() -> Arc<CodecRegistry> {
    Arc::new(CodecRegistry::new(
        DescriptorResolver::new("descriptors"),
        None,
        MessageFormatConfig::default(),
        false,
    ))
}

fn inspector(broker: Arc<dyn LogBroker>) -> MessageInspector {
    MessageInspector::new(broker, codecs(), InspectorConfig::default())
}

fn text_record(value: &str, ts: i64) -> AppendRecord {
    AppendRecord {
        key: None,
        value: Some(value.as_bytes().to_vec()),
        headers: Vec::new(),
        timestamp_ms: Some(ts),
    }
}

fn value_text(record: &logscope_api::MessageRecord) -> Option<String> {
    record.value.as_ref().and_then(Payload::text)
}

async fn seeded(records: &[(u32, i64, &str)], partitions: u32) -> Arc<MemoryBroker> {
    let broker = Arc::new(MemoryBroker::default());
    broker.create_topic("events", partitions).await;
    for (partition, ts, value) in records {
        broker.append("events", *partition, text_record(value, *ts)).await.unwrap();
    }
    broker
}

// ═══════════════════════════════════════════════════════════════
//  Partitions
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn partitions_listed_once_each() {
    let broker = MemoryBroker::new(2);
    broker.create_topic("events", 3).await;
    for ts in 0..5 {
        broker.append("events", 1, text_record("x", ts)).await.unwrap();
    }
    let inspector = inspector(Arc::new(broker));

    let partitions = inspector.get_partitions("events").await.unwrap();
    let ids: Vec<u32> = partitions.iter().map(|p| p.partition).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(partitions.iter().all(|p| p.first_offset <= p.size));
    assert_eq!((partitions[1].first_offset, partitions[1].size), (3, 5));

    let err = inspector.get_partitions("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ═══════════════════════════════════════════════════════════════
//  Bounded reads
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn bounded_contiguous_reads() {
    let records: Vec<(u32, i64, String)> = (0..10).map(|i| (0, i, format!("m{i}"))).collect();
    let refs: Vec<(u32, i64, &str)> = records.iter().map(|(p, t, v)| (*p, *t, v.as_str())).collect();
    let inspector = inspector(seeded(&refs, 1).await);

    let query = MessageQuery {
        partition: 0,
        offset: 4,
        count: Some(3),
        ..Default::default()
    };
    let window = inspector.get_messages("events", &query).await.unwrap();
    let offsets: Vec<u64> = window.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![4, 5, 6]);
    assert!(window.iter().all(|r| r.partition == 0));
    assert_eq!(value_text(&window[0]).as_deref(), Some("m4"));

    let one = MessageQuery { count: Some(1), ..query.clone() };
    assert_eq!(inspector.get_messages("events", &one).await.unwrap().len(), 1);

    let defaulted = MessageQuery { count: None, offset: 0, ..query };
    assert_eq!(inspector.get_messages("events", &defaulted).await.unwrap().len(), 10);
}

#[tokio::test]
async fn offset_below_retention_starts_at_first_offset() {
    let broker = MemoryBroker::new(3);
    broker.create_topic("events", 1).await;
    for ts in 0..6 {
        broker.append("events", 0, text_record("x", ts)).await.unwrap();
    }
    let inspector = inspector(Arc::new(broker));

    let query = MessageQuery {
        count: Some(2),
        ..Default::default()
    };
    let offsets: Vec<u64> = inspector
        .get_messages("events", &query)
        .await
        .unwrap()
        .iter()
        .map(|r| r.offset)
        .collect();
    assert_eq!(offsets, vec![3, 4]);
}

#[tokio::test]
async fn offset_at_or_past_high_water_is_empty() {
    let inspector = inspector(seeded(&[(0, 0, "a"), (0, 1, "b")], 1).await);
    for offset in [2, 3, 1_000] {
        let query = MessageQuery {
            offset,
            count: Some(5),
            ..Default::default()
        };
        assert!(inspector.get_messages("events", &query).await.unwrap().is_empty());
    }

    let query = MessageQuery {
        partition: 7,
        ..Default::default()
    };
    let err = inspector.get_messages("events", &query).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn all_messages_sorted_stably_by_timestamp() {
    let inspector = inspector(
        seeded(
            &[
                (0, 5, "p0-a"),
                (0, 10, "p0-b"),
                (1, 5, "p1-a"),
                (1, 1, "p1-b"),
                (2, 10, "p2-a"),
            ],
            3,
        )
        .await,
    );

    let records = inspector.get_all_messages("events", None).await.unwrap();
    let values: Vec<String> = records.iter().filter_map(value_text).collect();
    assert_eq!(values, vec!["p1-b", "p0-a", "p1-a", "p0-b", "p2-a"]);

    let capped = inspector.get_all_messages("events", Some(1)).await.unwrap();
    let values: Vec<String> = capped.iter().filter_map(value_text).collect();
    assert_eq!(values, vec!["p0-a", "p1-a", "p2-a"]);
}

// ═══════════════════════════════════════════════════════════════
//  Decoding
// ═══════════════════════════════════════════════════════════════

fn msgpack_values() -> FormatSelection {
    FormatSelection {
        format: Some(MessageFormat::Msgpack),
        ..Default::default()
    }
}

/// msgpack-строка "foo" и байты с зарезервированным маркером 0xc1.
async fn msgpack_topic() -> Arc<MemoryBroker> {
    let broker = Arc::new(MemoryBroker::default());
    broker.create_topic("events", 1).await;
    for (ts, value) in [(0, vec![0xa3, b'f', b'o', b'o']), (1, vec![0xc1, b'f', b'o', b'o'])] {
        let record = AppendRecord {
            value: Some(value),
            timestamp_ms: Some(ts),
            ..Default::default()
        };
        broker.append("events", 0, record).await.unwrap();
    }
    broker
}

#[tokio::test]
async fn malformed_payload_is_marked_not_fatal() {
    let inspector = inspector(msgpack_topic().await);
    let query = MessageQuery {
        formats: msgpack_values(),
        ..Default::default()
    };
    let records = inspector.get_messages("events", &query).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(value_text(&records[0]).as_deref(), Some("foo"));
    match &records[1].value {
        Some(Payload::Undecodable { raw_base64, .. }) => assert_eq!(raw_base64, "wWZvbw=="),
        other => panic!("expected undecodable payload, got {other:?}"),
    }
}

#[tokio::test]
async fn avro_round_trip_through_registry() {
    let schema = r#"{"type": "record", "name": "Order", "fields": [{"name": "item", "type": "string"}]}"#;
    let source = StaticSchemaSource::new().with_schema("orders-value", 21, SchemaType::Avro, schema);
    let codecs = CodecRegistry::new(
        DescriptorResolver::new("descriptors"),
        Some(Arc::new(SchemaRegistry::new(Arc::new(source)))),
        MessageFormatConfig {
            format: MessageFormat::Avro,
            key_format: MessageFormat::Default,
        },
        false,
    );
    let broker = Arc::new(MemoryBroker::default());
    broker.create_topic("orders", 1).await;
    let inspector = MessageInspector::new(broker, Arc::new(codecs), InspectorConfig::default());

    let request = PublishRequest {
        key: Some("order-1".into()),
        value: r#"{"item": "lamp"}"#.into(),
        ..Default::default()
    };
    let receipt = inspector.publish_message("orders", &request).await.unwrap();

    let query = MessageQuery {
        offset: receipt.offset,
        count: Some(1),
        ..Default::default()
    };
    let records = inspector.get_messages("orders", &query).await.unwrap();
    assert_eq!(
        records[0].value,
        Some(Payload::Decoded {
            value: serde_json::json!({"item": "lamp"})
        })
    );
    assert_eq!(records[0].key.as_ref().and_then(Payload::text).as_deref(), Some("order-1"));
}

#[tokio::test]
async fn unknown_schema_id_fails_read_and_search() {
    let schema = r#"{"type": "record", "name": "Order", "fields": [{"name": "item", "type": "string"}]}"#;
    let source = StaticSchemaSource::new().with_schema("orders-value", 21, SchemaType::Avro, schema);
    let codecs = CodecRegistry::new(
        DescriptorResolver::new("descriptors"),
        Some(Arc::new(SchemaRegistry::new(Arc::new(source)))),
        MessageFormatConfig {
            format: MessageFormat::Avro,
            key_format: MessageFormat::Default,
        },
        false,
    );
    let broker = Arc::new(MemoryBroker::default());
    broker.create_topic("orders", 1).await;
    let record = AppendRecord {
        value: Some(vec![0, 0, 0, 0, 99, 8, b'l', b'a', b'm', b'p']),
        timestamp_ms: Some(1),
        ..Default::default()
    };
    broker.append("orders", 0, record).await.unwrap();
    let inspector = MessageInspector::new(broker, Arc::new(codecs), InspectorConfig::default());

    let err = inspector.get_messages("orders", &MessageQuery::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaResolution);
    let message = err.to_string();
    assert!(message.contains("'orders'") && message.contains("schema id 99"), "{message}");

    let query = SearchQuery {
        text: "lamp".into(),
        ..Default::default()
    };
    let err = inspector.search_messages("orders", &query).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaResolution);
}

#[tokio::test]
async fn registry_format_without_registry_is_configuration_error() {
    let inspector = inspector(seeded(&[], 1).await);
    let query = MessageQuery {
        formats: FormatSelection {
            format: Some(MessageFormat::Avro),
            ..Default::default()
        },
        ..Default::default()
    };
    let err = inspector.get_messages("events", &query).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn unknown_format_names_fall_back_to_default() {
    for name in ["", "json", "Avr0", "protobuf3", "  ??  "] {
        assert_eq!(name.parse::<MessageFormat>().unwrap(), MessageFormat::Default, "{name:?}");
    }
    assert_eq!("avro".parse::<MessageFormat>().unwrap(), MessageFormat::Avro);

    let selection: FormatSelection = serde_json::from_str(r#"{"format": "garbled", "key_format": "MsgPack"}"#).unwrap();
    assert_eq!(selection.format, Some(MessageFormat::Default));
    assert_eq!(selection.key_format, Some(MessageFormat::Msgpack));
}

// ═══════════════════════════════════════════════════════════════
//  Search
// ═══════════════════════════════════════════════════════════════

fn search(text: &str, max_matches: u64) -> SearchQuery {
    SearchQuery {
        text: text.into(),
        partition: PartitionFilter::from_raw("events", -1).unwrap(),
        max_matches: Some(max_matches),
        start_timestamp_ms: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn search_reports_exhaustion_and_cap() {
    let inspector = inspector(seeded(&[(0, 0, "foo"), (0, 5, "bar foo"), (0, 10, "baz")], 1).await);

    let all = inspector.search_messages("events", &search("foo", 10)).await.unwrap();
    let values: Vec<String> = all.messages.iter().filter_map(value_text).collect();
    assert_eq!(values, vec!["foo", "bar foo"]);
    assert!(all.completion.exhausted);
    assert_eq!(all.completion.matches_found, 2);
    assert_eq!(all.completion.messages_scanned, 3);
    assert_eq!(all.completion.reason, CompletionReason::ExhaustedAllMessages);

    let capped = inspector.search_messages("events", &search("foo", 1)).await.unwrap();
    assert_eq!(capped.messages.len(), 1);
    assert!(!capped.completion.exhausted);
    assert_eq!(capped.completion.reason, CompletionReason::FoundRequestedNumberOfResults);
}

#[tokio::test]
async fn search_is_case_sensitive_and_merges_partitions() {
    let inspector = inspector(seeded(&[(0, 9, "Foo"), (0, 7, "foo-0"), (1, 3, "foo-1"), (1, 8, "nope")], 2).await);

    let results = inspector.search_messages("events", &search("foo", 10)).await.unwrap();
    let values: Vec<String> = results.messages.iter().filter_map(value_text).collect();
    assert_eq!(values, vec!["foo-1", "foo-0"]);

    let only = SearchQuery {
        partition: PartitionFilter::from_raw("events", 1).unwrap(),
        ..search("foo", 10)
    };
    let results = inspector.search_messages("events", &only).await.unwrap();
    assert!(results.messages.iter().all(|r| r.partition == 1));
    assert_eq!(results.completion.messages_scanned, 2);
}

#[tokio::test]
async fn undecodable_values_never_match() {
    let inspector = inspector(msgpack_topic().await);
    let query = SearchQuery {
        formats: msgpack_values(),
        ..search("foo", 10)
    };
    let results = inspector.search_messages("events", &query).await.unwrap();
    let offsets: Vec<u64> = results.messages.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![0]);
    assert!(results.completion.exhausted);
    assert_eq!(results.completion.messages_scanned, 2);
}

// ═══════════════════════════════════════════════════════════════
//  Publish
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn publish_then_read_on_file_broker() {
    let dir = tempfile::tempdir().unwrap();
    let broker = FileBroker::new(dir.path());
    broker.create_topic("events", 1).unwrap();
    let inspector = inspector(Arc::new(broker));

    let request = PublishRequest {
        partition: 0,
        key: Some("k".into()),
        value: "v".into(),
        ..Default::default()
    };
    let receipt = inspector.publish_message("events", &request).await.unwrap();

    // Новый broker на тех же файлах видит запись.
    let reopened = self::inspector(Arc::new(FileBroker::new(dir.path())));
    let query = MessageQuery {
        partition: 0,
        offset: receipt.offset,
        count: Some(1),
        ..Default::default()
    };
    let records = reopened.get_messages("events", &query).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].offset, receipt.offset);
    assert_eq!(records[0].key.as_ref().and_then(Payload::text).as_deref(), Some("k"));
    assert_eq!(value_text(&records[0]).as_deref(), Some("v"));
}

#[tokio::test]
async fn publish_to_missing_topic_is_not_found() {
    let inspector = inspector(seeded(&[], 1).await);
    let request = PublishRequest {
        value: "v".into(),
        ..Default::default()
    };
    let err = inspector.publish_message("absent", &request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn descriptor_listing_follows_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("events.desc"), b"").unwrap();
    let codecs = CodecRegistry::new(
        DescriptorResolver::new(dir.path()),
        None,
        MessageFormatConfig::default(),
        false,
    );
    let inspector = MessageInspector::new(seeded(&[], 1).await, Arc::new(codecs), InspectorConfig::default());
    assert_eq!(inspector.descriptor_files(), vec!["events.desc"]);
    assert_eq!(inspector.default_descriptor_for("events").as_deref(), Some("events.desc"));
    assert_eq!(inspector.topics().await.unwrap(), vec!["events"]);
}
