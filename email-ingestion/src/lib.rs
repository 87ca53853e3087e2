pub mod alert_parser;
pub mod database;
pub mod email_ingester;

pub use alert_parser::AlertEmail;
pub use database::{connect_pool, EmailDatabase};
pub use email_ingester::{EmailIngester, EmailIngesterConfig, GOOGLE_ALERT_SENDER};
