// src/fetch/mod.rs

mod backoff;
mod client;
mod response;

pub use backoff::{Backoff, Sleep, ThreadSleep};
pub use client::{
    HttpRegistry, LookupClient, LookupError, RegistryApi, RetryNotice, RetryReason,
};
pub use response::{LookupResult, OptInFlag, RegistryResponse, STATUS_OK};
