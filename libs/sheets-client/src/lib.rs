//! Клиенты табличного store'а: Google Sheets REST v4, OAuth2 и in-memory.

pub mod factory;
pub mod google;
pub mod memory;
pub mod oauth;

pub use factory::GoogleSessionFactory;
pub use google::GoogleSheetsSession;
pub use memory::{MemorySessionFactory, MemorySheets};
pub use oauth::{AuthError, OAuthClient, OAuthConfig};
