#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error(transparent)]
    Inspect(#[from] logscope_api::InspectError),

    #[error("output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub fn kind(&self) -> Option<logscope_api::ErrorKind> {
        match self {
            CliError::Config { .. } => Some(logscope_api::ErrorKind::Configuration),
            CliError::Inspect(e) => Some(e.kind()),
            CliError::Output(_) => None,
        }
    }
}
