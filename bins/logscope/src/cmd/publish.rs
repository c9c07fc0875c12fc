use log_engine::MessageInspector;
use logscope_api::PublishRequest;

use super::print_json;
use crate::config::PublishArgs;
use crate::error::CliError;

pub async fn run(inspector: &MessageInspector, args: PublishArgs) -> Result<(), CliError> {
    let request = PublishRequest {
        partition: args.partition,
        key: args.key,
        value: args.value,
        formats: args.formats.into(),
    };
    print_json(&inspector.publish_message(&args.topic, &request).await?)
}
