//! Request handlers.
//!
//! Each submodule provides the async handler functions for one route
//! group. Handlers delegate orchestration to `backdrop_comfyui` and
//! map errors via [`crate::error::AppError`].

pub mod background;
