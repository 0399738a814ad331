//! Diagnostic creation, severity management, and accumulation.
//!
//! This crate provides structured [`Diagnostic`] messages with severity
//! levels and optional notes, and the thread-safe [`DiagnosticSink`] that
//! accumulates them during a placement run. The placement engine never
//! prints; everything user-visible flows through a sink owned by the caller.

#![warn(missing_docs)]

pub mod diagnostic;
pub mod severity;
pub mod sink;

pub use diagnostic::Diagnostic;
pub use severity::Severity;
pub use sink::DiagnosticSink;
