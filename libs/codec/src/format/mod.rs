//! Codec'и по форматам. Каждый реализует MessageDecoder и MessageEncoder.

mod avro;
mod msgpack;
mod protobuf;
mod text;

pub use avro::AvroRegistryCodec;
pub use msgpack::MsgPackCodec;
pub use protobuf::{ProtobufDescriptorCodec, ProtobufRegistryCodec};
pub use text::StringCodec;

#[cfg(test)]
pub(crate) use protobuf::tests::greeting_descriptor_set;

use logscope_api::CodecError;

/// Разобрать текст оператора как JSON для schema-aware форматов.
pub(crate) fn parse_json_input(text: &str) -> Result<serde_json::Value, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::malformed(format!("input is not valid JSON: {e}")))
}
