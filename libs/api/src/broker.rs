use std::future::Future;
use std::pin::Pin;

use crate::{AppendRecord, InspectError, RawRecord, TopicInfo};

// ════════════════════════════════════════════════════════════════
//  Log broker
// ════════════════════════════════════════════════════════════════

/// Partitioned, offset-addressed log. Directory + read + append.
///
/// Реализации: MemoryBroker (in-process), FileBroker (JSONL на диске).
/// Core ничего не знает о транспорте — только этот трейт.
pub trait LogBroker: Send + Sync {
    /// Имена всех topic'ов, отсортированы.
    fn topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, InspectError>> + Send + '_>>;

    /// Снимок метаданных topic'а. `Ok(None)` = topic не существует.
    fn lookup_topic(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TopicInfo>, InspectError>> + Send + '_>>;

    /// До `max` записей с offset >= `offset`, по возрастанию offset'а.
    ///
    /// Offset ниже retention'а не ошибка: отдаются записи начиная с первой
    /// сохранившейся. Отсутствующий topic/partition → `NotFound`.
    fn fetch(
        &self,
        topic: &str,
        partition: u32,
        offset: u64,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRecord>, InspectError>> + Send + '_>>;

    /// Дописать запись в конец партиции. Возвращает присвоенный offset.
    fn append(
        &self,
        topic: &str,
        partition: u32,
        record: AppendRecord,
    ) -> Pin<Box<dyn Future<Output = Result<u64, InspectError>> + Send + '_>>;
}
