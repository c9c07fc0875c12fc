//! Доступ к записям лога: чтение окон, поиск, publish.
//!
//! Broker'ы (`MemoryBroker`, `FileBroker`) реализуют `LogBroker`;
//! `MessageInspector` собирает reader, search и publish поверх одного broker'а.

pub mod config;
pub mod file;
pub mod inspector;
pub mod memory;
pub mod publish;
pub mod reader;
pub mod search;

pub use config::{InspectorConfig, TimestampSeek};
pub use file::FileBroker;
pub use inspector::MessageInspector;
pub use memory::MemoryBroker;
pub use publish::Publisher;
pub use reader::MessageReader;
pub use search::{SearchEngine, SearchParams};
