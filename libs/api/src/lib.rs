//! Общие типы logscope: модель данных, трейты broker'а и codec'ов,
//! таксономия ошибок. Без зависимости от tokio.

mod broker;
mod codec;
mod error;
mod types;
mod util;

pub use broker::LogBroker;
pub use codec::{DecoderPair, EncoderPair, MessageDecoder, MessageEncoder};
pub use error::{CodecError, ErrorKind, InspectError, SchemaRef};
pub use types::{
    AppendRecord, CompletionReason, FormatSelection, MessageFormat, MessageQuery, MessageRecord,
    PartitionFilter, PartitionInfo, PartitionOffsets, Payload, PublishReceipt, PublishRequest,
    RawRecord, Role, SearchCompletion, SearchQuery, SearchResults, TopicInfo,
};
pub use util::now_ms;
