//! Concurrent ingestion pipeline: a fetch pool pulling search pages, a
//! write pool committing card batches, and an image pool downloading card
//! art, all joined in phase order by the coordinator.

pub mod coordinator;
pub mod fetch;
pub mod images;
pub mod pool;
pub mod write;
