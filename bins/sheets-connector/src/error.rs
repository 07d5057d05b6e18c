#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("broker: {0}")]
    Broker(#[from] sheets_api::BrokerError),

    #[error("sheets: {0}")]
    Sink(#[from] sheets_api::SinkError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("api server: {0}")]
    Api(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn config(context: &'static str, detail: impl Into<String>) -> Self {
        ServerError::Config { context, detail: detail.into() }
    }
}
