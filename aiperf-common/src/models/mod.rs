//! Data models shared across services.

mod conversation;
mod error_models;
mod metric;
mod record;
mod service_models;
mod telemetry;

pub use conversation::*;
pub use error_models::*;
pub use metric::*;
pub use record::*;
pub use service_models::*;
pub use telemetry::*;
