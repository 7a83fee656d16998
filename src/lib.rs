// Library for tests to access modules

pub mod aggregator;
pub mod config;
pub mod error;
pub mod models;
pub mod period;
pub mod routes;
pub mod sampler;
pub mod service;
pub mod sink;
pub mod stats;
pub mod store;
pub mod version;
pub mod worker;
