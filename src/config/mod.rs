//! Configuration schema and persistent store

mod schema;
mod store;

pub use schema::{
    AccountConfig, AppConfig, DetectorConfig, ExamConfig, TurnServerConfig, WebConfig,
    WebRtcSettings,
};
pub use store::ConfigStore;
