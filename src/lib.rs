//! The core intermediate representation pipeline of the Scrip compiler.
//!
//! Scrip programs arrive here as fully type- and effect-annotated IR trees
//! produced by elaboration. The pipeline rewrites self-recursive tail calls
//! into loops, lowers `async`/`await` into explicit continuation-passing
//! style, and re-validates the tree after each step. Code generation
//! consumes the result.

#![warn(rust_2018_idioms)]

// Supporting modules
pub mod pretty;
pub mod reporting;
pub mod source;

// The type and IR models
pub mod ir;
pub mod types;

// IR-to-IR passes
pub mod pass;

// Reference interpreter, used by the test suite
pub mod eval;

// Top level driver
mod driver;

pub use driver::{Driver, Status};
