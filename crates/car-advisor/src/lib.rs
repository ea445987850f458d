pub mod compose;
pub mod config;
pub mod error;
pub mod generation;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod retrieval;
pub mod retry;
