pub mod batch;
pub mod builders;
pub mod coerce;
pub mod config;
pub mod dedup;
pub mod downsample;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod row;
pub mod source;
pub mod store;
pub mod tables;
pub mod verify;
pub mod writer;
