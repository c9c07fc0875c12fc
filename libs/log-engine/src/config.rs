use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  InspectorConfig
// ═══════════════════════════════════════════════════════════════

fn default_count() -> u64 {
    100
}

fn default_max_count() -> u64 {
    100
}

fn default_fetch_batch() -> usize {
    500
}

/// Как искать стартовый offset по timestamp'у при поиске.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSeek {
    /// Сканировать с первого offset'а, пропуская старые записи.
    /// Работает при любом порядке timestamp'ов.
    #[default]
    Linear,
    /// Бинарный поиск по offset'ам. Корректен только при монотонных
    /// timestamp'ах внутри партиции.
    Binary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InspectorConfig {
    /// Сколько записей читать, когда запрос не задаёт count.
    #[serde(default = "default_count")]
    pub default_count: u64,
    /// Верхняя граница count / max_matches от вызывающего.
    #[serde(default = "default_max_count")]
    pub max_count: u64,
    /// Размер одного fetch'а из broker'а.
    #[serde(default = "default_fetch_batch")]
    pub fetch_batch: usize,
    #[serde(default)]
    pub timestamp_seek: TimestampSeek,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            max_count: default_max_count(),
            fetch_batch: default_fetch_batch(),
            timestamp_seek: TimestampSeek::default(),
        }
    }
}

impl InspectorConfig {
    /// `None` → `default_count`; явное значение ограничивается `max_count`.
    pub fn effective_count(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.default_count).min(self.max_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_resolution() {
        let config = InspectorConfig::default();
        assert_eq!(config.effective_count(None), 100);
        assert_eq!(config.effective_count(Some(1)), 1);
        assert_eq!(config.effective_count(Some(0)), 0);
        assert_eq!(config.effective_count(Some(5_000)), 100);
    }

    #[test]
    fn partial_section_uses_defaults() {
        let config: InspectorConfig = serde_json::from_str(r#"{"timestamp_seek": "binary"}"#).unwrap();
        assert_eq!(config.timestamp_seek, TimestampSeek::Binary);
        assert_eq!(config.fetch_batch, 500);
    }
}
