//! Batch CNPJ enrichment: read identifiers from a spreadsheet, look each one
//! up in the public company registry, and write name plus Simples Nacional /
//! MEI status back out.

pub mod batch;
pub mod cnpj;
pub mod columns;
pub mod config;
pub mod fetch;
pub mod progress;
pub mod sheet;

pub use batch::{process_file, BatchError, BatchRunner};
pub use cnpj::{normalize, Cnpj};
pub use columns::resolve_cnpj_column;
pub use fetch::{LookupClient, LookupResult, OptInFlag};
pub use progress::{ProgressEvent, ProgressSink};
