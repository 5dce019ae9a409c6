//! Core domain types and utilities for the marketloop platform.
//!
//! This crate provides the foundational types, error handling, and shared
//! utilities used throughout the marketloop marketing CRM.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{
    ContactId, DealId, ExecutionId, FormId, SegmentId, TenantId, UserId, WorkflowId,
};
