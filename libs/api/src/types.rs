use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::InspectError;

// ════════════════════════════════════════════════════════════════
//  Message Format
// ════════════════════════════════════════════════════════════════

/// Формат байтов ключа или значения записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageFormat {
    #[default]
    Default,
    Avro,
    Protobuf,
    Msgpack,
}

impl MessageFormat {
    pub const ALL: [MessageFormat; 4] = [
        MessageFormat::Default,
        MessageFormat::Avro,
        MessageFormat::Protobuf,
        MessageFormat::Msgpack,
    ];

    /// Case-insensitive. Unknown or garbled names fall back to `Default`.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("AVRO") {
            MessageFormat::Avro
        } else if name.eq_ignore_ascii_case("PROTOBUF") {
            MessageFormat::Protobuf
        } else if name.eq_ignore_ascii_case("MSGPACK") {
            MessageFormat::Msgpack
        } else {
            MessageFormat::Default
        }
    }
}

impl std::fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageFormat::Default => f.write_str("DEFAULT"),
            MessageFormat::Avro => f.write_str("AVRO"),
            MessageFormat::Protobuf => f.write_str("PROTOBUF"),
            MessageFormat::Msgpack => f.write_str("MSGPACK"),
        }
    }
}

impl std::str::FromStr for MessageFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(MessageFormat::from_name(s))
    }
}

impl<'de> Deserialize<'de> for MessageFormat {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(MessageFormat::from_name(&name))
    }
}

/// Какую часть записи обрабатывает codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Key,
    Value,
}

impl Role {
    /// Subject в schema registry по соглашению `<topic>-key` / `<topic>-value`.
    pub fn subject(&self, topic: &str) -> String {
        match self {
            Role::Key => format!("{topic}-key"),
            Role::Value => format!("{topic}-value"),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Topic directory
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    pub id: u32,
    /// Первый ещё не удалённый retention'ом offset (inclusive).
    pub first_offset: u64,
    /// Offset, следующий за последней записанной записью.
    pub high_watermark: u64,
}

impl PartitionInfo {
    pub fn is_empty(&self) -> bool {
        self.first_offset >= self.high_watermark
    }
}

/// Снимок метаданных topic'а на момент lookup'а.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    pub name: String,
    /// Упорядочены по id.
    pub partitions: Vec<PartitionInfo>,
}

impl TopicInfo {
    pub fn partition(&self, id: u32) -> Option<&PartitionInfo> {
        self.partitions.iter().find(|p| p.id == id)
    }
}

// ════════════════════════════════════════════════════════════════
//  Records
// ════════════════════════════════════════════════════════════════

/// Запись в том виде, в каком её отдаёт broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub partition: u32,
    pub offset: u64,
    pub timestamp_ms: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub headers: Vec<(String, Vec<u8>)>,
}

/// Запись на append. `timestamp_ms = None` → время broker'а.
#[derive(Debug, Clone, Default)]
pub struct AppendRecord {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub headers: Vec<(String, Vec<u8>)>,
    pub timestamp_ms: Option<i64>,
}

/// Декодированный ключ или значение.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Payload {
    Decoded { value: serde_json::Value },
    /// Байты не разобрались выбранным форматом. Сырые байты в base64.
    Undecodable { error: String, raw_base64: String },
}

impl Payload {
    pub fn undecodable(error: impl Into<String>, raw: &[u8]) -> Self {
        Payload::Undecodable {
            error: error.into(),
            raw_base64: base64::engine::general_purpose::STANDARD.encode(raw),
        }
    }

    /// Текстовое представление для поиска. `None` для undecodable.
    pub fn text(&self) -> Option<String> {
        match self {
            Payload::Decoded { value: serde_json::Value::String(s) } => Some(s.clone()),
            Payload::Decoded { value } => Some(value.to_string()),
            Payload::Undecodable { .. } => None,
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, Payload::Decoded { .. })
    }
}

/// Запись, отдаваемая вызывающему.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub partition: u32,
    pub offset: u64,
    pub timestamp_ms: i64,
    pub key: Option<Payload>,
    pub value: Option<Payload>,
    pub key_size: usize,
    pub value_size: usize,
    pub headers: BTreeMap<String, String>,
}

// ════════════════════════════════════════════════════════════════
//  Requests
// ════════════════════════════════════════════════════════════════

/// Выбор форматов на один запрос. `None` → дефолт из конфигурации.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormatSelection {
    pub format: Option<MessageFormat>,
    pub key_format: Option<MessageFormat>,
    pub desc_file: Option<String>,
    pub msg_type_name: Option<String>,
    /// `None` → `parse_any_proto` из конфигурации; явный `false` его отключает.
    pub is_any_proto: Option<bool>,
}

/// Чтение окна одной партиции.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MessageQuery {
    pub partition: u32,
    pub offset: u64,
    /// `None` → `default_count` из конфигурации. `Some(1)` читает ровно одну запись.
    pub count: Option<u64>,
    #[serde(flatten)]
    pub formats: FormatSelection,
}

/// Какие партиции просматривать при поиске.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartitionFilter {
    #[default]
    All,
    Only(u32),
}

impl PartitionFilter {
    /// `-1` (и любое отрицательное) означает все партиции. Id за пределами
    /// `u32` не может существовать ни в одном topic'е → `PartitionNotFound`.
    pub fn from_raw(topic: &str, partition: i64) -> Result<Self, InspectError> {
        if partition < 0 {
            return Ok(PartitionFilter::All);
        }
        u32::try_from(partition)
            .map(PartitionFilter::Only)
            .map_err(|_| InspectError::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub partition: PartitionFilter,
    /// `None` → `default_count` из конфигурации.
    pub max_matches: Option<u64>,
    pub start_timestamp_ms: i64,
    /// Останов по времени в дополнение к `max_matches`.
    pub deadline: Option<std::time::Duration>,
    pub formats: FormatSelection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PublishRequest {
    pub partition: u32,
    pub key: Option<String>,
    pub value: String,
    #[serde(flatten)]
    pub formats: FormatSelection,
}

// ════════════════════════════════════════════════════════════════
//  Responses
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionOffsets {
    pub partition: u32,
    pub first_offset: u64,
    pub size: u64,
}

impl From<&PartitionInfo> for PartitionOffsets {
    fn from(p: &PartitionInfo) -> Self {
        Self {
            partition: p.id,
            first_offset: p.first_offset,
            size: p.high_watermark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    ExhaustedAllMessages,
    FoundRequestedNumberOfResults,
    ReachedDeadline,
}

/// Итог поиска: отличает "нашли N" от "просмотрели всё, ничего нет"
/// и от "остановились на лимите".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchCompletion {
    pub exhausted: bool,
    pub reason: CompletionReason,
    pub messages_scanned: u64,
    pub matches_found: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub messages: Vec<MessageRecord>,
    pub completion: SearchCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub partition: u32,
    pub offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_are_case_insensitive() {
        assert_eq!(MessageFormat::from_name("avro"), MessageFormat::Avro);
        assert_eq!(MessageFormat::from_name("ProtoBuf"), MessageFormat::Protobuf);
        assert_eq!(MessageFormat::from_name(" MSGPACK "), MessageFormat::Msgpack);
    }

    #[test]
    fn unknown_format_falls_back_to_default() {
        assert_eq!(MessageFormat::from_name("json"), MessageFormat::Default);
        assert_eq!(MessageFormat::from_name("av ro"), MessageFormat::Default);
        assert_eq!(MessageFormat::from_name(""), MessageFormat::Default);
        let parsed: MessageFormat = serde_json::from_str("\"%%garbled\"").unwrap();
        assert_eq!(parsed, MessageFormat::Default);
    }

    #[test]
    fn negative_partition_means_all() {
        assert_eq!(PartitionFilter::from_raw("t", -1).unwrap(), PartitionFilter::All);
        assert_eq!(PartitionFilter::from_raw("t", 2).unwrap(), PartitionFilter::Only(2));
    }

    #[test]
    fn partition_beyond_u32_is_not_found() {
        let err = PartitionFilter::from_raw("t", 4_294_967_296).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
        assert_eq!(err.to_string(), "partition 4294967296 not found in topic 't'");
    }

    #[test]
    fn payload_text_for_search() {
        let s = Payload::Decoded { value: serde_json::json!("bar foo") };
        assert_eq!(s.text().as_deref(), Some("bar foo"));
        let obj = Payload::Decoded { value: serde_json::json!({"a": 1}) };
        assert_eq!(obj.text().as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(Payload::undecodable("bad", b"\x01").text(), None);
    }

    #[test]
    fn partition_offsets_use_wire_names() {
        let info = PartitionInfo { id: 1, first_offset: 5, high_watermark: 9 };
        let json = serde_json::to_value(PartitionOffsets::from(&info)).unwrap();
        assert_eq!(json, serde_json::json!({"partition": 1, "firstOffset": 5, "size": 9}));
    }

    #[test]
    fn message_query_count_one_is_kept() {
        let q: MessageQuery = serde_json::from_str(r#"{"count": 1}"#).unwrap();
        assert_eq!(q.count, Some(1));
        let q: MessageQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.count, None);
    }
}
