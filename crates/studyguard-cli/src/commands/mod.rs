pub mod classify;
pub mod config;
pub mod helpers;
pub mod replay;
pub mod report;
pub mod run;
