pub mod publish;
pub mod read;
pub mod search;

use std::sync::Arc;

use log_engine::{FileBroker, MessageInspector};
use logscope_codec::CodecRegistry;
use serde::Serialize;

use crate::config::{AppConfig, Cli, Commands};
use crate::error::CliError;

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let inspector = build_inspector(&config)?;

    match cli.command {
        Commands::Topics => read::topics(&inspector).await,
        Commands::Partitions(args) => read::partitions(&inspector, args).await,
        Commands::Messages(args) => read::messages(&inspector, args).await,
        Commands::AllMessages(args) => read::all_messages(&inspector, args).await,
        Commands::Search(args) => search::run(&inspector, args).await,
        Commands::Publish(args) => publish::run(&inspector, args).await,
    }
}

fn build_inspector(config: &AppConfig) -> Result<MessageInspector, CliError> {
    let codecs = CodecRegistry::from_config(
        &config.message_format,
        &config.protobuf,
        config.schema_registry.as_ref(),
    )?;
    tracing::debug!(
        data_dir = %config.broker.data_dir,
        descriptors = %config.protobuf.directory,
        schema_registry = config.schema_registry.as_ref().map(|r| r.connect.as_str()),
        "inspector configured"
    );

    let broker = Arc::new(FileBroker::new(&config.broker.data_dir));
    Ok(MessageInspector::new(broker, Arc::new(codecs), config.inspector.clone()))
}

/// Pretty JSON в stdout; логи идут в stderr.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
