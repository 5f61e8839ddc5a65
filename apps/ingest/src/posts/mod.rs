pub mod dedup;
pub mod filter;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod prompts;
pub mod query;
pub mod scoring;
pub mod store;
pub mod summary;
pub mod writer;
