pub mod catalog;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod pipeline;

pub mod util {
    pub mod db;
    pub mod env;
    pub mod retry;
}
