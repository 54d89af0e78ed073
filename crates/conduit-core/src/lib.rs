//! Conduit Core — shared domain abstractions.
//!
//! This crate defines the fundamental traits and types that the dispatch
//! pipeline, the storage engines and every bounded context depend on. It
//! contains no infrastructure code.

pub mod accumulator;
pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod outbox;
pub mod request;
pub mod scope;
pub mod storage;
