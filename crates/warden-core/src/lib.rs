//! Core types for the Warden gateway.
//!
//! This crate provides the types shared across all Warden crates: the
//! approval outcome delivered to suspended hook callers and the hook
//! event posted by the bridge layer.
//!
//! # Main types
//!
//! - [`ApprovalOutcome`] — The resolution of one approval request.
//! - [`HookEvent`] — A tool-use notification from the hook bridge.

/// Approval outcome and hook event types.
pub mod approval;

pub use approval::{ApprovalOutcome, HookEvent};
