pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::MirrorConfig;
pub use self::core::{Mirror, PassReport, RunOptions, RunReport, Tracker};
pub use error::{MirrorError, MirrorResult};
pub use storage::{LocalTree, RemoteStore, S3Store};
