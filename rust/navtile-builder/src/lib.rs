pub mod build;
pub mod cli;
