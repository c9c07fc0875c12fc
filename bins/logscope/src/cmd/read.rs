use log_engine::MessageInspector;
use logscope_api::MessageQuery;

use super::print_json;
use crate::config::{AllMessagesArgs, MessagesArgs, TopicArgs};
use crate::error::CliError;

pub async fn topics(inspector: &MessageInspector) -> Result<(), CliError> {
    print_json(&inspector.topics().await?)
}

pub async fn partitions(inspector: &MessageInspector, args: TopicArgs) -> Result<(), CliError> {
    print_json(&inspector.get_partitions(&args.topic).await?)
}

pub async fn messages(inspector: &MessageInspector, args: MessagesArgs) -> Result<(), CliError> {
    if args.formats.desc_file.is_none() {
        if let Some(desc) = inspector.default_descriptor_for(&args.topic) {
            tracing::info!(topic = %args.topic, descriptor = %desc, "descriptor matching the topic exists, pass --desc-file to use it");
        }
    }

    let query = MessageQuery {
        partition: args.partition,
        offset: args.offset,
        count: args.count,
        formats: args.formats.into(),
    };
    print_json(&inspector.get_messages(&args.topic, &query).await?)
}

pub async fn all_messages(inspector: &MessageInspector, args: AllMessagesArgs) -> Result<(), CliError> {
    print_json(&inspector.get_all_messages(&args.topic, args.count).await?)
}
