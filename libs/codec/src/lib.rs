//! Codec'и сообщений logscope и их выбор по формату.
//!
//! `CodecRegistry` — единственная точка dispatch'а формат → codec.
//! Schema registry (Confluent-compatible) и локальные protobuf descriptor'ы
//! подключаются здесь же.

pub mod config;
pub mod descriptor;
pub mod format;
pub mod registry;
pub mod schema_registry;
pub mod wire;

pub use config::{MessageFormatConfig, ProtobufDescriptorConfig, SchemaRegistryConfig};
pub use descriptor::DescriptorResolver;
pub use registry::{CodecRegistry, CodecSpec};
pub use schema_registry::{
    HttpSchemaSource, ParsedSchema, RegisteredSchema, SchemaRegistry, SchemaSource, SchemaType,
    StaticSchemaSource,
};
