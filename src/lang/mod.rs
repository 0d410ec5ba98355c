/// Module for keeping track of locations within the original source code.
pub mod source_buffer;

/// Module for turning the source code into a stream of tokens for further processing.
pub mod tokenizing;

/// Module for the compile time state of a word definition.  Due to the nature of the language some
/// words will be executed while others are being compiled, so this state is reachable from every
/// immediate word through the interpreter.
pub mod compilation;
