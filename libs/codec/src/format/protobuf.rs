use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};

use logscope_api::{CodecError, InspectError, MessageDecoder, MessageEncoder, MessageFormat, SchemaRef};

use super::parse_json_input;
use crate::schema_registry::{ParsedSchema, ProtoSchema, SchemaRegistry};
use crate::wire::{read_message_indexes, split_schema_header, write_message_indexes, write_schema_header};

fn decode_message(descriptor: MessageDescriptor, data: &[u8]) -> Result<serde_json::Value, CodecError> {
    let message = DynamicMessage::decode(descriptor, data)
        .map_err(|e| CodecError::malformed(format!("protobuf decode: {e}")))?;
    serde_json::to_value(&message).map_err(|e| CodecError::malformed(format!("protobuf → json: {e}")))
}

fn encode_message(descriptor: MessageDescriptor, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    let message = DynamicMessage::deserialize(descriptor, value)
        .map_err(|e| CodecError::malformed(format!("json → protobuf: {e}")))?;
    Ok(message.encode_to_vec())
}

// ═══════════════════════════════════════════════════════════════
//  ProtobufDescriptorCodec
// ═══════════════════════════════════════════════════════════════

/// PROTOBUF по локальному `.desc` файлу (FileDescriptorSet).
///
/// С `parse_any` payload сначала разбирается как `google.protobuf.Any`;
/// тип берётся из `type_url`, а при его отсутствии в descriptor'е —
/// из настроенного `message_type`.
pub struct ProtobufDescriptorCodec {
    pool: DescriptorPool,
    message: Option<MessageDescriptor>,
    parse_any: bool,
}

impl ProtobufDescriptorCodec {
    /// Прочитать descriptor set с диска. Файл читается один раз, здесь.
    pub fn load(path: &Path, message_type: Option<&str>, parse_any: bool) -> Result<Self, InspectError> {
        let bytes = std::fs::read(path).map_err(|e| {
            InspectError::config(format!("failed to read descriptor file '{}': {e}", path.display()))
        })?;
        let pool = DescriptorPool::decode(bytes.as_slice()).map_err(|e| {
            InspectError::config(format!("failed to parse descriptor set '{}': {e}", path.display()))
        })?;

        let message = match message_type.filter(|name| !name.trim().is_empty()) {
            Some(name) => Some(pool.get_message_by_name(name.trim()).ok_or_else(|| {
                InspectError::config(format!(
                    "message type '{name}' not found in descriptor '{}'",
                    path.display()
                ))
            })?),
            None if parse_any => None,
            None => {
                return Err(InspectError::config(
                    "protobuf message type name is required for descriptor decoding",
                ));
            }
        };

        tracing::debug!(path = %path.display(), message = ?message.as_ref().map(|m| m.full_name().to_string()), parse_any, "loaded protobuf descriptor");
        Ok(Self { pool, message, parse_any })
    }

    fn decode_any(&self, data: &[u8]) -> Result<serde_json::Value, CodecError> {
        let any = prost_types::Any::decode(data)
            .map_err(|e| CodecError::malformed(format!("protobuf Any decode: {e}")))?;
        let type_name = any.type_url.rsplit('/').next().unwrap_or_default();
        let descriptor = self
            .pool
            .get_message_by_name(type_name)
            .or_else(|| self.message.clone())
            .ok_or_else(|| {
                CodecError::malformed(format!("type '{}' from Any is not in the descriptor", any.type_url))
            })?;
        decode_message(descriptor, &any.value)
    }
}

impl MessageDecoder for ProtobufDescriptorCodec {
    fn decode<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, CodecError>> + Send + 'a>> {
        let result = if self.parse_any {
            self.decode_any(data)
        } else {
            match &self.message {
                Some(descriptor) => decode_message(descriptor.clone(), data),
                None => Err(CodecError::malformed("no message type configured")),
            }
        };
        Box::pin(async move { result })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Protobuf
    }
}

impl MessageEncoder for ProtobufDescriptorCodec {
    fn encode<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, CodecError>> + Send + 'a>> {
        let result = parse_json_input(text).and_then(|value| match &self.message {
            Some(descriptor) => encode_message(descriptor.clone(), &value),
            None => Err(CodecError::malformed("no message type configured for encoding")),
        });
        Box::pin(async move { result })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Protobuf
    }
}

// ═══════════════════════════════════════════════════════════════
//  ProtobufRegistryCodec
// ═══════════════════════════════════════════════════════════════

/// PROTOBUF через schema registry: `[0][id][message indexes][payload]`.
pub struct ProtobufRegistryCodec {
    registry: Arc<SchemaRegistry>,
    subject: String,
}

impl ProtobufRegistryCodec {
    pub fn new(registry: Arc<SchemaRegistry>, subject: String) -> Self {
        Self { registry, subject }
    }
}

fn expect_proto(parsed: &ParsedSchema, schema: SchemaRef) -> Result<&ProtoSchema, CodecError> {
    match parsed {
        ParsedSchema::Protobuf(proto) => Ok(proto),
        ParsedSchema::Avro(_) => Err(CodecError::Schema {
            schema,
            detail: "registered schema is not protobuf".into(),
        }),
    }
}

impl MessageDecoder for ProtobufRegistryCodec {
    fn decode<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, CodecError>> + Send + 'a>> {
        Box::pin(async move {
            let (schema_id, rest) = split_schema_header(data)?;
            let (indexes, payload) = read_message_indexes(rest)?;
            let parsed = self.registry.by_id(schema_id).await?;
            let proto = expect_proto(&parsed, SchemaRef::Id(schema_id))?;
            let descriptor = proto.message_at(&indexes).ok_or_else(|| {
                CodecError::malformed(format!("message index {indexes:?} not in schema {schema_id}"))
            })?;
            decode_message(descriptor, payload)
        })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Protobuf
    }
}

impl MessageEncoder for ProtobufRegistryCodec {
    /// Кодирует первым message'ем схемы (index path `[0]`).
    fn encode<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, CodecError>> + Send + 'a>> {
        Box::pin(async move {
            let value = parse_json_input(text)?;
            let (schema_id, parsed) = self.registry.latest(&self.subject).await?;
            let proto = expect_proto(&parsed, SchemaRef::Subject(self.subject.clone()))?;
            let descriptor = proto.message_at(&[0]).ok_or_else(|| CodecError::Schema {
                schema: SchemaRef::Id(schema_id),
                detail: "schema defines no messages".into(),
            })?;
            let payload = encode_message(descriptor, &value)?;

            let mut buf = Vec::with_capacity(6 + payload.len());
            write_schema_header(schema_id, &mut buf);
            write_message_indexes(&[0], &mut buf);
            buf.extend_from_slice(&payload);
            Ok(buf)
        })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Protobuf
    }
}
