// Entity reconciler: the single in-memory collection of tracked entities

mod engine;
mod entity;
mod metrics;

pub use engine::{Reconciler, ReplaceSummary, SnapshotTicket};
pub use entity::{
    AgentStatus, DeviceInfo, Entity, EntityChange, EntityKind, EntityPatch, EntityUpdate, Position,
};
pub use metrics::{MetricsSnapshot, SyncMetrics};

#[cfg(test)]
mod tests;
