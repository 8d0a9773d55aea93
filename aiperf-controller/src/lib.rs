//! The control plane: supervises every other service, drives the profiling
//! protocol, collects results, and exports them.

pub mod exit_errors;
pub mod exporters;
pub mod registry;
pub mod service_manager;
pub mod system_controller;

pub use registry::ServiceRegistry;
pub use service_manager::{ServiceManager, TaskServiceManager};
pub use system_controller::SystemController;
