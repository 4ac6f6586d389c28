pub mod dashboard_collector;
pub mod host_metrics;
pub mod host_service;
pub mod parsers;
pub mod types;
