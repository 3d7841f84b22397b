//! Admin introspection reports

pub mod status;

pub use status::{ConnectionStatus, HubStatus};
