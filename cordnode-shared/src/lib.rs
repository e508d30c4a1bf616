pub mod api;
pub mod domain;
pub mod path;
pub mod policy;
