pub mod diff;
pub mod entities;
pub mod git;
pub mod handler;
pub mod pr_changes;
pub mod render;
pub mod sanitize;
pub mod str_utils;

pub use git::GitIntegration;
