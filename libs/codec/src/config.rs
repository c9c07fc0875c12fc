use serde::Deserialize;

use logscope_api::MessageFormat;

// ═══════════════════════════════════════════════════════════════
//  Message formats
// ═══════════════════════════════════════════════════════════════

/// Форматы по умолчанию, когда запрос их не указывает.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageFormatConfig {
    pub format: MessageFormat,
    pub key_format: MessageFormat,
}

// ═══════════════════════════════════════════════════════════════
//  Protobuf descriptors
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtobufDescriptorConfig {
    /// Каталог с `.desc` файлами (FileDescriptorSet).
    pub directory: String,
    /// Дефолт для `is_any_proto`, когда вызывающий его не задаёт.
    pub parse_any_proto: bool,
}

impl Default for ProtobufDescriptorConfig {
    fn default() -> Self {
        Self {
            directory: "descriptors".into(),
            parse_any_proto: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Schema registry
// ═══════════════════════════════════════════════════════════════

fn default_registry_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaRegistryConfig {
    /// Base URL, e.g. `http://localhost:8081`.
    pub connect: String,
    /// `user:password` для basic auth.
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
}
