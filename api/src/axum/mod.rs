pub mod app;
pub mod errors;
pub mod extractors;
pub mod state;
