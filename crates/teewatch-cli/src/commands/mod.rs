pub mod clear;
pub mod config;
pub mod poll;
pub mod run;
pub mod show;
