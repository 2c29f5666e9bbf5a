//! The JavaScript side of the pipeline: AST, source generation, and the
//! per-permutation transformation passes.

pub mod ast;
pub mod resolve;
pub mod stack_emulator;
pub mod static_eval;
pub mod writer;
