use std::future::Future;
use std::pin::Pin;

use logscope_api::{CodecError, MessageDecoder, MessageEncoder, MessageFormat};

use super::parse_json_input;

/// MSGPACK: бессхемный бинарный формат ↔ JSON value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl MessageDecoder for MsgPackCodec {
    fn decode<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, CodecError>> + Send + 'a>> {
        Box::pin(async move {
            rmp_serde::from_slice::<serde_json::Value>(data)
                .map_err(|e| CodecError::malformed(format!("msgpack decode: {e}")))
        })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Msgpack
    }
}

impl MessageEncoder for MsgPackCodec {
    fn encode<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, CodecError>> + Send + 'a>> {
        Box::pin(async move {
            let value = parse_json_input(text)?;
            rmp_serde::to_vec(&value).map_err(|e| CodecError::malformed(format!("msgpack encode: {e}")))
        })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Msgpack
    }
}
