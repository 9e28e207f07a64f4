pub mod calendar;
pub mod config;
pub mod learn;
pub mod schedule;
pub mod task;
