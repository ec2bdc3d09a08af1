//! Configuration Module
//!
//! Environment-driven configuration for the volume delta service.

mod settings;

pub use settings::{
    AccountingSettings, ConfigError, Exchange, FeedSettings, ServerSettings, ServiceConfig,
    SinkKind, SinkSettings, WebSocketSettings,
};
