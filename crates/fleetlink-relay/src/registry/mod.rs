//! In-memory registries for live relay connections.

pub mod groups;

pub use groups::DeviceGroups;
