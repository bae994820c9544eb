// src/ingest/adapters/mod.rs
pub mod google_jobs;
pub mod remoteok;
pub mod wwr_rss;

pub use google_jobs::GoogleJobsAdapter;
pub use remoteok::RemoteOkAdapter;
pub use wwr_rss::WwrRssAdapter;
