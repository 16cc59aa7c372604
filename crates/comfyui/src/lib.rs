//! ComfyUI REST client and job orchestration.
//!
//! Compiles typed job parameters into a node-keyed workflow document,
//! submits it over the ComfyUI HTTP API, and polls execution history
//! until the job produces its artifact, fails, or times out. Each
//! layer (compile, submit, poll, fetch) reports its own error type so
//! callers can map failures onto distinct HTTP responses.

pub mod api;
pub mod history;
pub mod poller;
pub mod workflow;
