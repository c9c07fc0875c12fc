//! Schema registry access: HTTP source, in-memory source, shared parsed cache.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use prost_reflect::{DescriptorPool, MessageDescriptor};
use protox::file::{ChainFileResolver, File as ProtoFile, FileResolver, GoogleFileResolver};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use logscope_api::{CodecError, InspectError, SchemaRef};

use crate::config::SchemaRegistryConfig;

// ═══════════════════════════════════════════════════════════════
//  Registry model
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    /// Registry omits `schemaType` for Avro schemas.
    #[default]
    Avro,
    Protobuf,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaReference {
    pub name: String,
    pub subject: String,
    pub version: i32,
}

/// Schema как её отдаёт registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredSchema {
    /// `/schemas/ids/{id}` не возвращает id — его проставляет клиент.
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(rename = "schemaType", default)]
    pub schema_type: SchemaType,
    pub schema: String,
    #[serde(default)]
    pub references: Vec<SchemaReference>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),
}

// ═══════════════════════════════════════════════════════════════
//  SchemaSource
// ═══════════════════════════════════════════════════════════════

/// Откуда берутся схемы. HTTP registry в проде, статический набор офлайн.
pub trait SchemaSource: Send + Sync {
    fn schema_by_id(
        &self,
        id: i32,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredSchema, RegistryError>> + Send + '_>>;

    fn latest_for_subject(
        &self,
        subject: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredSchema, RegistryError>> + Send + '_>>;
}

/// HTTP client for a Confluent-compatible schema registry.
pub struct HttpSchemaSource {
    base_url: String,
    auth: Option<(String, String)>,
    http_client: reqwest::Client,
}

impl HttpSchemaSource {
    pub fn new(config: &SchemaRegistryConfig) -> Result<Self, InspectError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InspectError::config(format!("schema registry client: {e}")))?;

        let auth = match config.auth.as_deref() {
            None | Some("") => None,
            Some(auth) => {
                let (user, password) = auth.split_once(':').ok_or_else(|| {
                    InspectError::config("schema registry auth must be 'user:password'")
                })?;
                Some((user.to_string(), password.to_string()))
            }
        };

        Ok(Self {
            base_url: config.connect.trim_end_matches('/').to_string(),
            auth,
            http_client,
        })
    }

    async fn get_schema(&self, path: &str, what: String) -> Result<RegisteredSchema, RegistryError> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.schemaregistry.v1+json");
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(what));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let schema: RegisteredSchema = response.json().await?;
        tracing::debug!(url = %url, schema_type = ?schema.schema_type, "schema fetched");
        Ok(schema)
    }
}

impl SchemaSource for HttpSchemaSource {
    fn schema_by_id(
        &self,
        id: i32,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredSchema, RegistryError>> + Send + '_>> {
        Box::pin(async move {
            let mut schema = self
                .get_schema(&format!("schemas/ids/{id}"), format!("schema id {id}"))
                .await?;
            schema.id = Some(id);
            Ok(schema)
        })
    }

    fn latest_for_subject(
        &self,
        subject: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredSchema, RegistryError>> + Send + '_>> {
        let subject = subject.to_string();
        Box::pin(async move {
            self.get_schema(
                &format!("subjects/{subject}/versions/latest"),
                format!("subject '{subject}'"),
            )
            .await
        })
    }
}

/// Фиксированный набор схем в памяти. Для офлайн-инспекции и тестов.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaSource {
    by_id: HashMap<i32, RegisteredSchema>,
    latest: HashMap<String, i32>,
}

impl StaticSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Зарегистрировать схему; последняя добавленная для subject'а становится latest.
    pub fn with_schema(
        mut self,
        subject: &str,
        id: i32,
        schema_type: SchemaType,
        schema: impl Into<String>,
    ) -> Self {
        self.by_id.insert(
            id,
            RegisteredSchema {
                id: Some(id),
                schema_type,
                schema: schema.into(),
                references: Vec::new(),
            },
        );
        self.latest.insert(subject.to_string(), id);
        self
    }
}

impl SchemaSource for StaticSchemaSource {
    fn schema_by_id(
        &self,
        id: i32,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredSchema, RegistryError>> + Send + '_>> {
        let found = self
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("schema id {id}")));
        Box::pin(async move { found })
    }

    fn latest_for_subject(
        &self,
        subject: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredSchema, RegistryError>> + Send + '_>> {
        let found = self
            .latest
            .get(subject)
            .and_then(|id| self.by_id.get(id))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("subject '{subject}'")));
        Box::pin(async move { found })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Parsed schemas
// ═══════════════════════════════════════════════════════════════

/// Protobuf schema из registry, скомпилированная в DescriptorPool.
#[derive(Debug, Clone)]
pub struct ProtoSchema {
    pool: DescriptorPool,
    file_name: String,
}

impl ProtoSchema {
    /// Message по message-index path: первый индекс — top-level message
    /// файла, следующие — вложенные.
    pub fn message_at(&self, indexes: &[i32]) -> Option<MessageDescriptor> {
        let file = self.pool.get_file_by_name(&self.file_name)?;
        let (first, rest) = indexes.split_first()?;
        let mut message = file.messages().nth(usize::try_from(*first).ok()?)?;
        for index in rest {
            let child = message.child_messages().nth(usize::try_from(*index).ok()?)?;
            message = child;
        }
        Some(message)
    }
}

#[derive(Debug)]
pub enum ParsedSchema {
    Avro(apache_avro::Schema),
    Protobuf(ProtoSchema),
}

impl ParsedSchema {
    fn parse(id: i32, registered: &RegisteredSchema) -> Result<Self, String> {
        match registered.schema_type {
            SchemaType::Avro => apache_avro::Schema::parse_str(&registered.schema)
                .map(ParsedSchema::Avro)
                .map_err(|e| format!("avro schema: {e}")),
            SchemaType::Protobuf => {
                let file_name = format!("registry/schema_{id}.proto");
                compile_proto(&file_name, &registered.schema).map(|pool| {
                    ParsedSchema::Protobuf(ProtoSchema { pool, file_name })
                })
            }
            SchemaType::Json => Err("JSON schema payloads are not supported".into()),
        }
    }
}

struct RegistryFileResolver {
    name: String,
    source: String,
}

impl FileResolver for RegistryFileResolver {
    fn resolve_path(&self, path: &Path) -> Option<String> {
        (path == Path::new(&self.name)).then(|| self.name.clone())
    }

    fn open_file(&self, name: &str) -> Result<ProtoFile, protox::Error> {
        if name == self.name {
            ProtoFile::from_source(name, &self.source)
        } else {
            Err(protox::Error::file_not_found(name))
        }
    }
}

fn compile_proto(file_name: &str, source: &str) -> Result<DescriptorPool, String> {
    let mut resolver = ChainFileResolver::new();
    resolver.add(RegistryFileResolver {
        name: file_name.to_string(),
        source: source.to_string(),
    });
    resolver.add(GoogleFileResolver::new());

    let mut compiler = protox::Compiler::with_file_resolver(resolver);
    compiler.include_imports(true);
    compiler
        .open_file(file_name)
        .map_err(|e| format!("protobuf schema: {e}"))?;
    Ok(compiler.descriptor_pool())
}

// ═══════════════════════════════════════════════════════════════
//  SchemaRegistry
// ═══════════════════════════════════════════════════════════════

/// Кэш распарсенных схем поверх SchemaSource. Один на процесс, шарится
/// между запросами через Arc; запись в кэш только на промахе.
pub struct SchemaRegistry {
    source: Arc<dyn SchemaSource>,
    cache: RwLock<HashMap<i32, Arc<ParsedSchema>>>,
}

impl SchemaRegistry {
    pub fn new(source: Arc<dyn SchemaSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn http(config: &SchemaRegistryConfig) -> Result<Self, InspectError> {
        Ok(Self::new(Arc::new(HttpSchemaSource::new(config)?)))
    }

    pub async fn by_id(&self, id: i32) -> Result<Arc<ParsedSchema>, CodecError> {
        if let Some(schema) = self.cache.read().await.get(&id) {
            return Ok(schema.clone());
        }

        tracing::debug!(schema_id = id, "schema cache miss");
        let registered = self
            .source
            .schema_by_id(id)
            .await
            .map_err(|e| schema_error(SchemaRef::Id(id), e.to_string()))?;
        self.insert(id, &registered, SchemaRef::Id(id)).await
    }

    /// Последняя версия subject'а. Не кэшируется по subject'у: latest может смениться.
    pub async fn latest(&self, subject: &str) -> Result<(i32, Arc<ParsedSchema>), CodecError> {
        let schema_ref = || SchemaRef::Subject(subject.to_string());
        let registered = self
            .source
            .latest_for_subject(subject)
            .await
            .map_err(|e| schema_error(schema_ref(), e.to_string()))?;
        let id = registered
            .id
            .ok_or_else(|| schema_error(schema_ref(), "registry response has no schema id".into()))?;

        if let Some(schema) = self.cache.read().await.get(&id) {
            return Ok((id, schema.clone()));
        }
        let parsed = self.insert(id, &registered, schema_ref()).await?;
        Ok((id, parsed))
    }

    async fn insert(
        &self,
        id: i32,
        registered: &RegisteredSchema,
        schema_ref: SchemaRef,
    ) -> Result<Arc<ParsedSchema>, CodecError> {
        let parsed = ParsedSchema::parse(id, registered).map_err(|detail| schema_error(schema_ref, detail))?;
        let mut cache = self.cache.write().await;
        Ok(cache.entry(id).or_insert_with(|| Arc::new(parsed)).clone())
    }
}

fn schema_error(schema: SchemaRef, detail: String) -> CodecError {
    CodecError::Schema { schema, detail }
}
