pub mod config;
pub mod debug;
pub mod run;
