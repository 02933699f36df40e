pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod reminder;
pub mod storage;
pub mod store;
pub mod task_api;

#[cfg(test)]
mod test_support;
