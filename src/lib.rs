//! NORDSVCP relay — email-driven approval cycle for discontinued-item reports.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
