//! Background pipeline for the flashline service.
//!
//! - Coordinator (retry → fetch → filter → persist → publish → ledger)
//! - Interval scheduler (serialized runs)
//! - Disk failure ledger (retry envelopes)
//! - Upstream flash source client
//! - Image mirror collaborator
//! - Change detector (counter + off-peak backoff)

pub mod detector;
pub mod ledger;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod uploader;

pub use detector::{ChangeDetector, DetectorConfig, RandomSource, SystemRandom};
pub use ledger::{FailedBatch, FailureLedger, LedgerEntry};
pub use pipeline::{Coordinator, RunOutcome, RunSummary};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use source::{FlashSource, InvadersApi, SourceConfig};
pub use uploader::{ImageSync, UploadConfig, UploadRequest};
