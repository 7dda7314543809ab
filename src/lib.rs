pub mod checkpoint;
pub mod config;
pub mod document;
pub mod errors;
pub mod executor;
pub mod knowledge;
pub mod kpi;
pub mod phase;
pub mod producers;
pub mod retry;
pub mod validate;
