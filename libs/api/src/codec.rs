use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{CodecError, MessageFormat};

// ════════════════════════════════════════════════════════════════
//  Codec traits
// ════════════════════════════════════════════════════════════════

/// bytes → структурированное значение для одного формата.
///
/// Registry-backed реализации могут ходить в сеть на первом обращении
/// к schema id, поэтому метод асинхронный.
pub trait MessageDecoder: Send + Sync {
    fn decode<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, CodecError>> + Send + 'a>>;

    fn format(&self) -> MessageFormat;
}

/// Текст оператора → bytes для publish.
///
/// Текст интерпретируется по формату: DEFAULT берёт его как есть,
/// остальные разбирают его как JSON.
pub trait MessageEncoder: Send + Sync {
    fn encode<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, CodecError>> + Send + 'a>>;

    fn format(&self) -> MessageFormat;
}

/// Пара decoder'ов одного запроса. Неизменяема после создания.
#[derive(Clone)]
pub struct DecoderPair {
    pub key: Arc<dyn MessageDecoder>,
    pub value: Arc<dyn MessageDecoder>,
}

impl DecoderPair {
    pub fn new(key: Arc<dyn MessageDecoder>, value: Arc<dyn MessageDecoder>) -> Self {
        Self { key, value }
    }
}

impl std::fmt::Debug for DecoderPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderPair")
            .field("key", &self.key.format())
            .field("value", &self.value.format())
            .finish()
    }
}

#[derive(Clone)]
pub struct EncoderPair {
    pub key: Arc<dyn MessageEncoder>,
    pub value: Arc<dyn MessageEncoder>,
}

impl EncoderPair {
    pub fn new(key: Arc<dyn MessageEncoder>, value: Arc<dyn MessageEncoder>) -> Self {
        Self { key, value }
    }
}

impl std::fmt::Debug for EncoderPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderPair")
            .field("key", &self.key.format())
            .field("value", &self.value.format())
            .finish()
    }
}
