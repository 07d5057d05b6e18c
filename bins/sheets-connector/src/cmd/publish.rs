use tokio::io::AsyncReadExt;

use sheets_api::{RecordEnvelope, Validate};

use crate::config::{PublishArgs, ServerConfig};
use crate::error::ServerError;

/// Опубликовать payload (файл или stdin) как есть.
/// Невалидный envelope публикуется, но с предупреждением.
pub async fn run(args: PublishArgs) -> Result<(), ServerError> {
    let config = ServerConfig::load(&args.serve.config)?;
    config.validate_broker()?;

    let payload = match &args.file {
        Some(path) => tokio::fs::read(path).await?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        }
    };
    if payload.is_empty() {
        return Err(ServerError::config("publish", "empty payload"));
    }

    match RecordEnvelope::decode(&payload) {
        Ok(envelope) => {
            if let Err(e) = envelope.questionnaire.validate() {
                tracing::warn!(error = %e, "payload will be rejected by the connector");
            }
        }
        Err(e) => tracing::warn!(error = %e, "payload is not a record envelope"),
    }

    let broker = super::build_broker(&config)?;
    let delivery = broker.publish(&args.topic, &payload).await?;
    tracing::info!(
        topic = %args.topic,
        partition = delivery.partition,
        offset = delivery.offset,
        bytes = payload.len(),
        "published"
    );
    println!("{}:{}:{}", args.topic, delivery.partition, delivery.offset);
    Ok(())
}
