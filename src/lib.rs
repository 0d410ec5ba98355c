//! An interactive Forth-like interpreter-compiler with cooperative fibers.
//!
//! The engine reads whitespace delimited tokens from an input source, keeps a dictionary of
//! named words, and either executes words immediately or appends them to the body of a word
//! being defined.  The same primitives serve both sides of the `:` / `;` boundary.
//!
//! On top of the classic interpreter-compiler core, two coroutine backed words embed lazy
//! sequences and time sliced cooperative tasks into the evaluator: CO_RANGE, a pull style
//! integer generator, and CO_FIBER, a task pumped by the REPL's scheduler between reads.

/// Module for the source code representation: locations, tokens, and compile time state.
pub mod lang;

/// Module for the runtime: the data structures, the interpreter, and the built-in words.
pub mod runtime;
