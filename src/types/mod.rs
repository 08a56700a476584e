//! Configuration types

mod config;


pub use config::*;
