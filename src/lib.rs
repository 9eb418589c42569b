// Library exports for the freshtab binary and integration tests

pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod icons;
pub mod session;
pub mod settings;
pub mod shortcuts;
pub mod storage;
pub mod suggest;
pub mod worker;

pub use error::{Error, Result};
