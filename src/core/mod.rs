pub mod lister;
pub mod manifest;
pub mod mirror;
pub mod record;
pub mod resumable;
pub mod tracker;

pub use lister::{Lister, ListingSummary};
pub use manifest::{Manifest, ManifestEntry, ManifestWriter};
pub use mirror::{Mirror, RunOptions, RunReport};
pub use record::{Record, RecordParseError, SKIP_ANNOTATION};
pub use resumable::{
    check_alignment, run_manifest, run_pass, DownloadAction, EntryAction, ExcludeFilter,
    KeyFilter, MakeDirAction, PassReport,
};
pub use tracker::{Recovered, Tracker};
