use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use broker_engine::KafkaConfig;
use connector_api_server::ServiceLabels;
use pipeline::IngestConfig;
use sheets_client::OAuthConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "sheets-connector", about = "Коннектор broker → Google Sheets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить ingestion и HTTP API
    Serve(ServeArgs),
    /// Опубликовать сообщение в topic
    Publish(PublishArgs),
    /// Операции с topic'ами broker'а
    #[command(subcommand)]
    Topic(TopicCommand),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,
}

#[derive(Args, Clone, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub serve: ServeArgs,
    /// Topic назначения
    #[arg(long)]
    pub topic: String,
    /// Файл с payload'ом; без него читается stdin
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum TopicCommand {
    /// Проверить, существует ли topic
    Exists {
        #[command(flatten)]
        serve: ServeArgs,
        name: String,
    },
    /// Создать topic
    Create {
        #[command(flatten)]
        serve: ServeArgs,
        name: String,
        #[arg(long)]
        partitions: Option<i32>,
        #[arg(long)]
        replication: Option<i32>,
    },
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ApiConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    /// Без секции OAuth endpoints отвечают 503.
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub service_id: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    #[serde(default = "default_metrics_label_prefix")]
    pub metrics_label_prefix: String,
    /// Сколько ждать задачи после Ctrl+C, прежде чем abort.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_port() -> u16 {
    8080
}
fn default_service_name() -> String {
    "google-sheets-connector".into()
}
fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}
fn default_metrics_label_prefix() -> String {
    "gsc".into()
}
fn default_shutdown_grace_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            service_id: String::new(),
            service_name: default_service_name(),
            service_version: default_service_version(),
            metrics_label_prefix: default_metrics_label_prefix(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl ApiConfig {
    pub fn labels(&self) -> ServiceLabels {
        ServiceLabels {
            prefix: self.metrics_label_prefix.clone(),
            id: self.service_id.clone(),
            name: self.service_name.clone(),
            version: self.service_version.clone(),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Kafka,
    /// In-process broker: локальный запуск без Kafka.
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_kind")]
    pub kind: BrokerKind,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
}

fn default_broker_kind() -> BrokerKind {
    BrokerKind::Kafka
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { kind: default_broker_kind(), kafka: None }
    }
}

impl BrokerConfig {
    fn kafka_mut(&mut self) -> &mut KafkaConfig {
        self.kafka.get_or_insert_with(|| KafkaConfig::new(""))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetsKind {
    Google,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct SheetsConfig {
    #[serde(default = "default_sheets_kind")]
    pub kind: SheetsKind,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Переопределение Sheets REST endpoint'а (эмуляторы, прокси).
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_sheets_kind() -> SheetsKind {
    SheetsKind::Google
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            kind: default_sheets_kind(),
            request_timeout_secs: default_request_timeout_secs(),
            base_url: None,
        }
    }
}

impl SheetsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ServerConfig {
    /// Прочитать TOML и применить переменные окружения.
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::config("read", format!("'{path}': {e}")))?;
        let mut config = Self::parse(&content)
            .map_err(|e| ServerError::config("parse", format!("'{path}': {e}")))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Переменные окружения перекрывают файл. Пустые значения игнорируются.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ServerError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| ServerError::config("env", format!("PORT '{port}': {e}")))?;
        }

        if let Some(brokers) = var("KAFKA_BROKERS") {
            self.broker.kafka_mut().brokers = brokers;
        }
        if let Some(username) = var("KAFKA_USERNAME") {
            self.broker.kafka_mut().username = Some(username);
        }
        if let Some(password) = var("KAFKA_PASSWORD") {
            self.broker.kafka_mut().password = Some(password);
        }
        if let Some(topics) = var("KAFKA_TOPICS") {
            self.ingest.topics = split_list(&topics);
        }
        // SERVICE_ID также служит consumer group'ой.
        if let Some(service_id) = var("SERVICE_ID") {
            if let Some(kafka) = self.broker.kafka.as_mut() {
                kafka.group_id = service_id.clone();
            }
            self.server.service_id = service_id;
        }

        let oauth_vars = [
            var("GOOGLE_CLIENT_ID"),
            var("GOOGLE_CLIENT_SECRET"),
            var("GOOGLE_CALLBACK_URL"),
            var("GOOGLE_SCOPES"),
        ];
        if oauth_vars.iter().any(Option::is_some) {
            let [client_id, client_secret, callback_url, scopes] = oauth_vars;
            let oauth = self.oauth.get_or_insert_with(|| OAuthConfig::new("", "", ""));
            if let Some(client_id) = client_id {
                oauth.client_id = client_id;
            }
            if let Some(client_secret) = client_secret {
                oauth.client_secret = client_secret;
            }
            if let Some(callback_url) = callback_url {
                oauth.redirect_url = callback_url;
            }
            if let Some(scopes) = scopes {
                oauth.scopes = split_list(&scopes);
            }
        }
        Ok(())
    }

    /// Достаточно для `publish` и `topic`: нужен только broker.
    pub fn validate_broker(&self) -> Result<(), ServerError> {
        if self.broker.kind == BrokerKind::Kafka {
            match &self.broker.kafka {
                Some(kafka) if !kafka.brokers.trim().is_empty() => {}
                _ => {
                    return Err(ServerError::config(
                        "validate",
                        "broker.kafka.brokers (or KAFKA_BROKERS) is required for kind = \"kafka\"",
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        self.validate_broker()?;
        if let Some(oauth) = &self.oauth {
            if oauth.client_id.is_empty() || oauth.client_secret.is_empty() || oauth.redirect_url.is_empty() {
                return Err(ServerError::config(
                    "validate",
                    "oauth needs client_id, client_secret and redirect_url",
                ));
            }
        }
        if self.sheets.request_timeout_secs == 0 {
            return Err(ServerError::config("validate", "sheets.request_timeout_secs must be positive"));
        }
        self.ingest.validate()?;
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
