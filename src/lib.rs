//! Declares a shared AWS platform stack and the application stacks built on
//! top of it, and synthesizes them as Terraform JSON.

pub mod app;
pub mod base;
pub mod config;
pub mod deploy;
pub mod petapp;
pub mod region;
pub mod stack;
pub mod token;
pub mod writer;
