use std::future::Future;
use std::pin::Pin;

use logscope_api::{CodecError, MessageDecoder, MessageEncoder, MessageFormat};

/// DEFAULT: bytes ↔ строка. Невалидный UTF-8 заменяется, decode не падает.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl MessageDecoder for StringCodec {
    fn decode<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, CodecError>> + Send + 'a>> {
        let text = String::from_utf8_lossy(data).into_owned();
        Box::pin(async move { Ok(serde_json::Value::String(text)) })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Default
    }
}

impl MessageEncoder for StringCodec {
    fn encode<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, CodecError>> + Send + 'a>> {
        Box::pin(async move { Ok(text.as_bytes().to_vec()) })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_round_trip() {
        let bytes = StringCodec.encode("hello").await.unwrap();
        assert_eq!(bytes, b"hello");
        let value = MessageDecoder::decode(&StringCodec, &bytes).await.unwrap();
        assert_eq!(value, serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let value = MessageDecoder::decode(&StringCodec, &[0x66, 0xff]).await.unwrap();
        assert_eq!(value, serde_json::json!("f\u{fffd}"));
    }
}
