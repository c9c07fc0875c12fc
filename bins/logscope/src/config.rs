use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use log_engine::InspectorConfig;
use logscope_api::{FormatSelection, MessageFormat};
use logscope_codec::{MessageFormatConfig, ProtobufDescriptorConfig, SchemaRegistryConfig};

use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(name = "logscope", about = "Просмотр и поиск сообщений в партиционированном логе")]
pub struct Cli {
    /// Путь к TOML конфиг файлу. Без него используются значения по умолчанию.
    #[arg(long, global = true, env = "LOGSCOPE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Список topic'ов
    Topics,
    /// Партиции topic'а: first offset и size
    Partitions(TopicArgs),
    /// Окно записей одной партиции
    Messages(MessagesArgs),
    /// Записи всех партиций, отсортированные по времени
    AllMessages(AllMessagesArgs),
    /// Линейный поиск по тексту значений (не индексный)
    Search(SearchArgs),
    /// Опубликовать одну запись
    Publish(PublishArgs),
}

#[derive(Args, Debug)]
pub struct TopicArgs {
    pub topic: String,
}

/// Выбор форматов, общий для чтения, поиска и publish.
#[derive(Args, Debug, Clone, Default)]
pub struct FormatArgs {
    /// Формат значения: DEFAULT, AVRO, PROTOBUF, MSGPACK
    #[arg(long)]
    pub format: Option<MessageFormat>,
    /// Формат ключа
    #[arg(long)]
    pub key_format: Option<MessageFormat>,
    /// Protobuf descriptor (`.desc`) из каталога descriptor'ов
    #[arg(long)]
    pub desc_file: Option<String>,
    /// Полное имя protobuf message
    #[arg(long)]
    pub msg_type_name: Option<String>,
    /// Разворачивать google.protobuf.Any. Без флага берётся `parse_any_proto`
    /// из конфига; `--any-proto false` отключает его для запроса.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub any_proto: Option<bool>,
}

impl From<FormatArgs> for FormatSelection {
    fn from(args: FormatArgs) -> Self {
        FormatSelection {
            format: args.format,
            key_format: args.key_format,
            desc_file: args.desc_file,
            msg_type_name: args.msg_type_name,
            is_any_proto: args.any_proto,
        }
    }
}

#[derive(Args, Debug)]
pub struct MessagesArgs {
    pub topic: String,
    #[arg(long, default_value_t = 0)]
    pub partition: u32,
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
    /// Сколько записей прочитать; по умолчанию `inspector.default_count`
    #[arg(long)]
    pub count: Option<u64>,
    #[command(flatten)]
    pub formats: FormatArgs,
}

#[derive(Args, Debug)]
pub struct AllMessagesArgs {
    pub topic: String,
    /// Лимит на каждую партицию отдельно
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    pub topic: String,
    /// Подстрока (с учётом регистра)
    #[arg(long)]
    pub text: String,
    /// Партиция; -1 = все
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub partition: i64,
    #[arg(long)]
    pub max_matches: Option<u64>,
    /// Не раньше этого времени (ms since epoch)
    #[arg(long, default_value_t = 0)]
    pub start_ms: i64,
    /// Прервать поиск через столько миллисекунд
    #[arg(long)]
    pub deadline_ms: Option<u64>,
    #[command(flatten)]
    pub formats: FormatArgs,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    pub topic: String,
    #[arg(long, default_value_t = 0)]
    pub partition: u32,
    /// Без ключа публикуется null key
    #[arg(long)]
    pub key: Option<String>,
    #[arg(long)]
    pub value: String,
    #[command(flatten)]
    pub formats: FormatArgs,
}

// ---- TOML Config ----

fn default_data_dir() -> String {
    "data".into()
}

#[derive(Debug, Deserialize)]
pub struct BrokerConfig {
    /// Каталог FileBroker'а: `<data_dir>/<topic>/<partition>.jsonl`
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub message_format: MessageFormatConfig,
    #[serde(default)]
    pub protobuf: ProtobufDescriptorConfig,
    /// Без секции AVRO и registry-backed PROTOBUF недоступны.
    #[serde(default)]
    pub schema_registry: Option<SchemaRegistryConfig>,
    #[serde(default)]
    pub inspector: InspectorConfig,
}

impl AppConfig {
    pub fn load(path: Option<&str>) -> Result<Self, CliError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| CliError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
