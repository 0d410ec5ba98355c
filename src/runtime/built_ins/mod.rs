use crate::runtime::{error, interpreter::Interpreter};

/// Module for the stack manipulation words.
pub mod stack_words;

/// Module for the arithmetic, comparison, and bit words.
pub mod math_words;

/// Module for the memory access and data space words.
pub mod memory_words;

/// Module for the numeric and character output words.
pub mod io_words;

/// Module for the floating point words.
pub mod float_words;

/// Module for the text words.
pub mod string_words;

/// Module for the word creation and compilation control words.
pub mod word_words;

/// Module for the control flow compiling words.
pub mod control_words;

/// Module for the time words.
pub mod time_words;

/// Module for the random number words.
pub mod random_words;

/// Module for the generator and fiber words.
pub mod fiber_words;

/// Register every built-in word pack with the interpreter.
pub fn register_core_words(interpreter: &mut dyn Interpreter) {
    stack_words::register_stack_words(interpreter);
    math_words::register_math_words(interpreter);
    memory_words::register_memory_words(interpreter);
    io_words::register_io_words(interpreter);
    float_words::register_float_words(interpreter);
    string_words::register_string_words(interpreter);
    word_words::register_word_words(interpreter);
    control_words::register_control_words(interpreter);
    time_words::register_time_words(interpreter);
    random_words::register_random_words(interpreter);
    fiber_words::register_fiber_words(interpreter);
}

/// The words defined in Forth itself, processed at startup after the native packs are
/// registered.  VARIABLE and CONSTANT are ordinary defining words built with CREATE and DOES>.
pub const BOOT_SOURCE: &str = "\
\\ Words defined in the language itself, on top of the native primitives.

: VARIABLE CREATE 1 CELLS ALLOT DOES> ;
: CONSTANT CREATE , DOES> @ ;

VARIABLE BASE
10 BASE !

: DECIMAL 10 BASE ! ;
: HEX 16 BASE ! ;

: TRUE 1 ;
: FALSE 0 ;

: CELL+ 1 CELLS + ;
: NIP SWAP DROP ;
: TUCK SWAP OVER ;
: ? @ . ;
";

/// Run the boot definitions through the interpreter.
pub fn process_boot_source(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    interpreter.process_source("<boot>", BOOT_SOURCE)
}
