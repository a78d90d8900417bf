pub mod config;
pub mod error;
pub mod merge;
pub mod model;
pub mod prompt;
pub mod shinyboard;
pub mod store;
pub mod sync;
