//! receipt-ledger: the append-only CSV ledger, the single-image processor,
//! and the folder watcher and batch scan built on it.

pub mod batch;
pub mod ledger;
pub mod processor;
pub mod watcher;

pub use batch::{BatchReport, process_dir};
pub use ledger::{Ledger, LedgerSummary, read_ledger};
pub use processor::{Processor, ProcessorConfig, SUPPORTED_EXTENSIONS};
pub use watcher::{FolderWatcher, WatchConfig, WatchReport, WatchState};
