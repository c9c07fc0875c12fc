use std::time::Duration;

use log_engine::MessageInspector;
use logscope_api::{PartitionFilter, SearchQuery};

use super::print_json;
use crate::config::SearchArgs;
use crate::error::CliError;

pub async fn run(inspector: &MessageInspector, args: SearchArgs) -> Result<(), CliError> {
    let query = SearchQuery {
        text: args.text,
        partition: PartitionFilter::from_raw(&args.topic, args.partition)?,
        max_matches: args.max_matches,
        start_timestamp_ms: args.start_ms,
        deadline: args.deadline_ms.map(Duration::from_millis),
        formats: args.formats.into(),
    };
    tracing::info!(topic = %args.topic, "search scans linearly from the start timestamp");

    let results = inspector.search_messages(&args.topic, &query).await?;
    tracing::info!(
        topic = %args.topic,
        scanned = results.completion.messages_scanned,
        matches = results.completion.matches_found,
        exhausted = results.completion.exhausted,
        "search complete"
    );
    print_json(&results)
}
