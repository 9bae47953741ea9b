//! AWS EC2 connector for the muster fleet inventory.
//!
//! Enumerates EC2 instances across the account's enabled regions and
//! normalizes them into canonical assets. Credentials come from the
//! ambient AWS credential chain; the configured account id is verified
//! against the caller identity at connect time.

pub mod config;
pub mod connector;

pub use config::AwsConfig;
pub use connector::AwsConnector;
