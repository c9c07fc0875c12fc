use serde::Serialize;

/// Category of an inspection error. Lets the caller tell "not found"
/// apart from a generic failure without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Topic or partition does not exist at call time.
    NotFound,
    /// Publish payload could not be encoded; nothing was appended.
    Encoding,
    /// Registry unreachable or schema unknown.
    SchemaResolution,
    /// Bad descriptor name, missing message type, missing registry.
    Configuration,
    /// Storage / transport failure of the log broker.
    Broker,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => f.write_str("not_found"),
            ErrorKind::Encoding => f.write_str("encoding"),
            ErrorKind::SchemaResolution => f.write_str("schema_resolution"),
            ErrorKind::Configuration => f.write_str("configuration"),
            ErrorKind::Broker => f.write_str("broker"),
        }
    }
}

/// Ссылка на схему в registry: по id (decode) или по subject (encode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaRef {
    Id(i32),
    Subject(String),
}

impl std::fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaRef::Id(id) => write!(f, "schema id {id}"),
            SchemaRef::Subject(subject) => write!(f, "subject '{subject}'"),
        }
    }
}

/// Ошибка одной операции inspector'а (read / search / publish).
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("topic '{0}' not found")]
    TopicNotFound(String),

    #[error("partition {partition} not found in topic '{topic}'")]
    PartitionNotFound { topic: String, partition: i64 },

    #[error("encoding: {0}")]
    Encoding(String),

    #[error("schema resolution for topic '{topic}' ({schema}): {detail}")]
    SchemaResolution {
        topic: String,
        schema: SchemaRef,
        detail: String,
    },

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("broker: {0}")]
    Broker(String),
}

impl InspectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InspectError::TopicNotFound(_) | InspectError::PartitionNotFound { .. } => {
                ErrorKind::NotFound
            }
            InspectError::Encoding(_) => ErrorKind::Encoding,
            InspectError::SchemaResolution { .. } => ErrorKind::SchemaResolution,
            InspectError::Configuration(_) => ErrorKind::Configuration,
            InspectError::Broker(_) => ErrorKind::Broker,
        }
    }

    pub fn broker(msg: impl Into<String>) -> Self {
        InspectError::Broker(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        InspectError::Configuration(msg.into())
    }
}

impl From<std::io::Error> for InspectError {
    fn from(e: std::io::Error) -> Self {
        InspectError::Broker(e.to_string())
    }
}

/// Ошибка codec'а на уровне одной записи.
///
/// `Malformed` восстанавливается локально (запись помечается как
/// undecodable), `Schema` означает, что без схемы декодировать нельзя вообще.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("{schema}: {detail}")]
    Schema { schema: SchemaRef, detail: String },
}

impl CodecError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        CodecError::Malformed(msg.into())
    }

    /// Поднять ошибку codec'а до ошибки всей операции.
    ///
    /// `Malformed` становится `Encoding` (publish path). Reader обрабатывает
    /// `Malformed` сам и сюда его не передаёт.
    pub fn into_inspect_error(self, topic: &str) -> InspectError {
        match self {
            CodecError::Malformed(detail) => InspectError::Encoding(detail),
            CodecError::Schema { schema, detail } => InspectError::SchemaResolution {
                topic: topic.to_string(),
                schema,
                detail,
            },
        }
    }
}
