//! Durable job queue, worker heartbeats, and bulkhead concurrency caps.

pub mod bulkhead;
pub mod job;

pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use job::{InMemoryJobQueue, Job, JobQueue, JobStatus, Lease, PgJobQueue, DEFAULT_LEASE_SECONDS, DEFAULT_MAX_ATTEMPTS};

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_jobs", include_str!("../migrations/0001_jobs.sql"))];
