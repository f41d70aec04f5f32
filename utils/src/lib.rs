//! Shared infrastructure utilities for Atlas.
//!
//! This crate provides cross-cutting filesystem utilities that multiple Atlas
//! crates need but that don't belong in the domain-pure `atlas-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`atomic_dir`**: Crash-safe whole-directory replacement and recovery
//! - **`lock`**: Advisory inter-process locks
//! - **`digest`**: Content hashes of snapshot files

pub mod atomic_dir;
pub mod atomic_write;
pub mod digest;
pub mod lock;

pub use atomic_dir::{DirRecovery, DirReplacement, recover_dir, replace_dir};
pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, atomic_copy,
    atomic_write_with_options, commit_file,
};
pub use digest::file_digest;
pub use lock::FileLock;
