pub mod broker;
pub mod error;
pub mod model;
pub mod projection;
pub mod range;
pub mod sink;
pub mod validate;

pub use broker::{
    BrokerGateway, BrokerMessage, Delivery, TopicSpec, DEFAULT_READ_TIMEOUT, METADATA_TIMEOUT,
};
pub use error::{BrokerError, ErrorKind, ProjectionError, SinkError, ValidationError};
pub use model::{
    AccessToken, AppendOutcome, DocumentHandle, Questionnaire, RecordEnvelope, SheetInfo,
    MAX_OPTIONS,
};
pub use projection::{Projection, RecordShape};
pub use sink::{SessionFactory, SheetSession};
pub use validate::Validate;
