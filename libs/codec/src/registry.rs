use std::sync::Arc;

use logscope_api::{
    DecoderPair, EncoderPair, FormatSelection, InspectError, MessageDecoder, MessageEncoder,
    MessageFormat, Role,
};

use crate::config::{MessageFormatConfig, ProtobufDescriptorConfig, SchemaRegistryConfig};
use crate::descriptor::DescriptorResolver;
use crate::format::{
    AvroRegistryCodec, MsgPackCodec, ProtobufDescriptorCodec, ProtobufRegistryCodec, StringCodec,
};
use crate::schema_registry::SchemaRegistry;

/// Параметры выбора codec'а для одной роли (key или value).
#[derive(Debug, Clone, Copy)]
pub struct CodecSpec<'a> {
    pub topic: &'a str,
    pub descriptor_file: Option<&'a str>,
    pub message_type: Option<&'a str>,
    pub parse_any: bool,
}

impl<'a> CodecSpec<'a> {
    pub fn plain(topic: &'a str) -> Self {
        Self {
            topic,
            descriptor_file: None,
            message_type: None,
            parse_any: false,
        }
    }

    /// Пустая строка descriptor'а считается отсутствующей.
    fn descriptor_file(&self) -> Option<&'a str> {
        self.descriptor_file.filter(|name| !name.trim().is_empty())
    }
}

/// Единственная точка выбора codec'а по формату.
///
/// Codec'и создаются на запрос; общий здесь только `SchemaRegistry`
/// с кэшем распарсенных схем.
pub struct CodecRegistry {
    descriptors: DescriptorResolver,
    schema_registry: Option<Arc<SchemaRegistry>>,
    defaults: MessageFormatConfig,
    parse_any_default: bool,
}

impl CodecRegistry {
    pub fn new(
        descriptors: DescriptorResolver,
        schema_registry: Option<Arc<SchemaRegistry>>,
        defaults: MessageFormatConfig,
        parse_any_default: bool,
    ) -> Self {
        Self {
            descriptors,
            schema_registry,
            defaults,
            parse_any_default,
        }
    }

    /// Собрать registry из секций конфигурации. HTTP-клиент registry создаётся,
    /// только если секция `schema_registry` задана.
    pub fn from_config(
        formats: &MessageFormatConfig,
        protobuf: &ProtobufDescriptorConfig,
        schema_registry: Option<&SchemaRegistryConfig>,
    ) -> Result<Self, InspectError> {
        let schema_registry = schema_registry
            .map(SchemaRegistry::http)
            .transpose()?
            .map(Arc::new);
        Ok(Self::new(
            DescriptorResolver::new(&protobuf.directory),
            schema_registry,
            formats.clone(),
            protobuf.parse_any_proto,
        ))
    }

    pub fn descriptors(&self) -> &DescriptorResolver {
        &self.descriptors
    }

    pub fn defaults(&self) -> &MessageFormatConfig {
        &self.defaults
    }

    fn require_registry(&self, format: MessageFormat, topic: &str) -> Result<Arc<SchemaRegistry>, InspectError> {
        self.schema_registry.clone().ok_or_else(|| {
            InspectError::config(format!(
                "{format} for topic '{topic}' requires a schema registry, none is configured"
            ))
        })
    }

    pub fn resolve_decoder(
        &self,
        format: MessageFormat,
        role: Role,
        spec: &CodecSpec<'_>,
    ) -> Result<Arc<dyn MessageDecoder>, InspectError> {
        let decoder: Arc<dyn MessageDecoder> = match (format, spec.descriptor_file()) {
            (MessageFormat::Avro, _) => Arc::new(AvroRegistryCodec::new(
                self.require_registry(format, spec.topic)?,
                role.subject(spec.topic),
            )),
            (MessageFormat::Protobuf, Some(file)) => {
                let path = self.descriptors.resolve(file)?;
                Arc::new(ProtobufDescriptorCodec::load(&path, spec.message_type, spec.parse_any)?)
            }
            (MessageFormat::Protobuf, None) => Arc::new(ProtobufRegistryCodec::new(
                self.require_registry(format, spec.topic)?,
                role.subject(spec.topic),
            )),
            (MessageFormat::Msgpack, _) => Arc::new(MsgPackCodec),
            (MessageFormat::Default, _) => Arc::new(StringCodec),
        };
        tracing::trace!(topic = %spec.topic, ?role, %format, "decoder resolved");
        Ok(decoder)
    }

    /// Encode никогда не разворачивает Any: тип всегда из `message_type`.
    pub fn resolve_encoder(
        &self,
        format: MessageFormat,
        role: Role,
        spec: &CodecSpec<'_>,
    ) -> Result<Arc<dyn MessageEncoder>, InspectError> {
        let encoder: Arc<dyn MessageEncoder> = match (format, spec.descriptor_file()) {
            (MessageFormat::Avro, _) => Arc::new(AvroRegistryCodec::new(
                self.require_registry(format, spec.topic)?,
                role.subject(spec.topic),
            )),
            (MessageFormat::Protobuf, Some(file)) => {
                let path = self.descriptors.resolve(file)?;
                Arc::new(ProtobufDescriptorCodec::load(&path, spec.message_type, false)?)
            }
            (MessageFormat::Protobuf, None) => Arc::new(ProtobufRegistryCodec::new(
                self.require_registry(format, spec.topic)?,
                role.subject(spec.topic),
            )),
            (MessageFormat::Msgpack, _) => Arc::new(MsgPackCodec),
            (MessageFormat::Default, _) => Arc::new(StringCodec),
        };
        tracing::trace!(topic = %spec.topic, ?role, %format, "encoder resolved");
        Ok(encoder)
    }

    fn spec_for<'a>(&self, topic: &'a str, selection: &'a FormatSelection) -> CodecSpec<'a> {
        CodecSpec {
            topic,
            descriptor_file: selection.desc_file.as_deref(),
            message_type: selection.msg_type_name.as_deref(),
            parse_any: selection.is_any_proto.unwrap_or(self.parse_any_default),
        }
    }

    fn formats_for(&self, selection: &FormatSelection) -> (MessageFormat, MessageFormat) {
        (
            selection.key_format.unwrap_or(self.defaults.key_format),
            selection.format.unwrap_or(self.defaults.format),
        )
    }

    /// Decoder'ы ключа и значения одного запроса. Descriptor из выбора
    /// относится к обеим ролям.
    pub fn decoder_pair(&self, topic: &str, selection: &FormatSelection) -> Result<DecoderPair, InspectError> {
        let spec = self.spec_for(topic, selection);
        let (key_format, value_format) = self.formats_for(selection);
        Ok(DecoderPair::new(
            self.resolve_decoder(key_format, Role::Key, &spec)?,
            self.resolve_decoder(value_format, Role::Value, &spec)?,
        ))
    }

    pub fn encoder_pair(&self, topic: &str, selection: &FormatSelection) -> Result<EncoderPair, InspectError> {
        let spec = self.spec_for(topic, selection);
        let (key_format, value_format) = self.formats_for(selection);
        Ok(EncoderPair::new(
            self.resolve_encoder(key_format, Role::Key, &spec)?,
            self.resolve_encoder(value_format, Role::Value, &spec)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_registry::{SchemaType, StaticSchemaSource};
    use logscope_api::ErrorKind;

    fn offline() -> CodecRegistry {
        CodecRegistry::new(
            DescriptorResolver::new("/nonexistent"),
            None,
            MessageFormatConfig::default(),
            false,
        )
    }

    #[test]
    fn default_and_msgpack_need_no_configuration() {
        let registry = offline();
        let spec = CodecSpec::plain("orders");
        let decoder = registry.resolve_decoder(MessageFormat::Default, Role::Value, &spec).unwrap();
        assert_eq!(decoder.format(), MessageFormat::Default);
        let decoder = registry.resolve_decoder(MessageFormat::Msgpack, Role::Key, &spec).unwrap();
        assert_eq!(decoder.format(), MessageFormat::Msgpack);
    }

    #[test]
    fn schema_formats_without_registry_are_configuration_errors() {
        let registry = offline();
        let spec = CodecSpec::plain("orders");
        for format in [MessageFormat::Avro, MessageFormat::Protobuf] {
            let err = registry.resolve_decoder(format, Role::Value, &spec).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            let err = registry.resolve_encoder(format, Role::Value, &spec).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
    }

    #[test]
    fn blank_descriptor_falls_back_to_registry() {
        let source = StaticSchemaSource::new().with_schema("t-value", 1, SchemaType::Avro, "\"string\"");
        let registry = CodecRegistry::new(
            DescriptorResolver::new("/nonexistent"),
            Some(Arc::new(SchemaRegistry::new(Arc::new(source)))),
            MessageFormatConfig::default(),
            false,
        );
        let spec = CodecSpec {
            descriptor_file: Some("   "),
            ..CodecSpec::plain("t")
        };
        let decoder = registry.resolve_decoder(MessageFormat::Protobuf, Role::Value, &spec).unwrap();
        assert_eq!(decoder.format(), MessageFormat::Protobuf);
    }

    #[test]
    fn missing_descriptor_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CodecRegistry::new(
            DescriptorResolver::new(dir.path()),
            None,
            MessageFormatConfig::default(),
            false,
        );
        let spec = CodecSpec {
            descriptor_file: Some("absent"),
            message_type: Some("demo.Greeting"),
            ..CodecSpec::plain("t")
        };
        let err = registry.resolve_decoder(MessageFormat::Protobuf, Role::Value, &spec).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn pair_uses_configured_defaults_and_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("greeting.desc"),
            crate::format::greeting_descriptor_set(),
        )
        .unwrap();
        let registry = CodecRegistry::new(
            DescriptorResolver::new(dir.path()),
            None,
            MessageFormatConfig {
                format: MessageFormat::Protobuf,
                key_format: MessageFormat::Default,
            },
            false,
        );
        let selection = FormatSelection {
            desc_file: Some("greeting".into()),
            msg_type_name: Some("demo.Greeting".into()),
            ..Default::default()
        };

        let encoders = registry.encoder_pair("greetings", &selection).unwrap();
        let decoders = registry.decoder_pair("greetings", &selection).unwrap();
        assert_eq!(decoders.key.format(), MessageFormat::Default);
        assert_eq!(decoders.value.format(), MessageFormat::Protobuf);

        let bytes = encoders.value.encode(r#"{"text": "hello"}"#).await.unwrap();
        let value = decoders.value.decode(&bytes).await.unwrap();
        assert_eq!(value, serde_json::json!({"text": "hello"}));
    }

    #[tokio::test]
    async fn request_can_switch_off_configured_any_unwrapping() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("greeting.desc"),
            crate::format::greeting_descriptor_set(),
        )
        .unwrap();
        let registry = CodecRegistry::new(
            DescriptorResolver::new(dir.path()),
            None,
            MessageFormatConfig {
                format: MessageFormat::Protobuf,
                key_format: MessageFormat::Default,
            },
            true,
        );
        let selection = FormatSelection {
            desc_file: Some("greeting".into()),
            msg_type_name: Some("demo.Greeting".into()),
            is_any_proto: Some(false),
            ..Default::default()
        };

        let bytes = registry
            .encoder_pair("greetings", &selection)
            .unwrap()
            .value
            .encode(r#"{"text": "hi"}"#)
            .await
            .unwrap();
        let decoders = registry.decoder_pair("greetings", &selection).unwrap();
        let value = decoders.value.decode(&bytes).await.unwrap();
        assert_eq!(value, serde_json::json!({"text": "hi"}));

        assert!(registry.spec_for("greetings", &FormatSelection::default()).parse_any);
    }
}
