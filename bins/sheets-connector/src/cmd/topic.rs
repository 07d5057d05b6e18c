use sheets_api::BrokerError;

use crate::config::{ServerConfig, TopicCommand};
use crate::error::ServerError;

pub async fn run(command: TopicCommand) -> Result<(), ServerError> {
    match command {
        TopicCommand::Exists { serve, name } => {
            let config = ServerConfig::load(&serve.config)?;
            config.validate_broker()?;
            let broker = super::build_broker(&config)?;

            let exists = broker.topic_exists(&name).await?;
            println!("{name}: {}", if exists { "exists" } else { "not found" });
            Ok(())
        }
        TopicCommand::Create { serve, name, partitions, replication } => {
            let config = ServerConfig::load(&serve.config)?;
            config.validate_broker()?;
            let broker = super::build_broker(&config)?;

            let mut spec = match &config.broker.kafka {
                Some(kafka) => kafka.topic_spec(&name),
                None => sheets_api::TopicSpec::new(&name),
            };
            if let Some(partitions) = partitions {
                spec = spec.with_partitions(partitions);
            }
            if let Some(replication) = replication {
                spec = spec.with_replication(replication);
            }

            match broker.create_topic(&spec).await {
                Ok(()) => {
                    tracing::info!(
                        topic = %name,
                        partitions = spec.partitions,
                        replication = spec.replication,
                        "topic created"
                    );
                    println!("{name}: created");
                    Ok(())
                }
                Err(BrokerError::TopicAlreadyExists(_)) => {
                    println!("{name}: already exists");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}
