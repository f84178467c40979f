//! Purpose: Define the stable public Rust API boundary for the partitioning shell.
//! Exports: Session, engine, discovery and error types needed by the CLI and tests.
//! Role: Public, additive-only surface over `core` and `shell`.
//! Invariants: Store mutation helpers stay crate-private; callers go through `Engine`.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::device::{Access, BlockDevice, DeviceOpener, FileOpener};
pub use crate::core::discovery::{DiscoveryConfig, MountProvider, ProcMounts};
pub use crate::core::engine::{
    Cleaned, Commit, CreateKind, CreateRequest, Created, Deactivated, Deleted, Engine,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::model::{
    Disk, Extent, Geometry, Partition, PartitionId, TableKind, Volume, VolumeKind,
};
pub use crate::core::selection::Selection;
pub use crate::core::store::EntityStore;
pub use crate::notice::{Notice, notice_json};
pub use crate::shell::{Flow, PROMPT, ScriptOutcome, Session};

/// Engine wired to real devices and the mount table named by `config`.
pub fn system_engine(config: &DiscoveryConfig) -> Engine {
    Engine::new(Box::new(FileOpener), Box::new(ProcMounts::new(config)))
}
