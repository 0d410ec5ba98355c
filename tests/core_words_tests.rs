use coforth::runtime::{
    built_ins::{process_boot_source, register_core_words},
    data_structures::cell::cell_to_int,
    error::Result,
    interpreter::{
        coforth_interpreter::CoforthInterpreter, CodeManagement, Interpreter, InterpreterStack,
    },
};
use std::{cell::RefCell, io::Write, rc::Rc};
use test_case::test_case;

/// An output sink the tests can read back after the interpreter has written to it.
#[derive(Clone)]
struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl Write for SharedOutput {
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buffer);
        Ok(buffer.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Build a fully booted interpreter with a captured output stream.
fn new_interpreter() -> (CoforthInterpreter, Rc<RefCell<Vec<u8>>>) {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter =
        CoforthInterpreter::with_output(Box::new(SharedOutput(buffer.clone())));

    register_core_words(&mut interpreter);
    process_boot_source(&mut interpreter).expect("The boot definitions should process cleanly.");

    (interpreter, buffer)
}

/// Run a source string with an initial stack and return the final stack, signed.
fn eval_and_stack(source: &str, init_stack: &[i64]) -> Result<Vec<i64>> {
    let (mut interpreter, _output) = new_interpreter();

    for &value in init_stack {
        interpreter.push(value as u64);
    }

    interpreter.process_source("<test>", source)?;

    Ok(interpreter
        .stack()
        .data()
        .iter()
        .map(|&cell| cell_to_int(cell))
        .collect())
}

/// Run a source string and return everything it printed.
fn eval_output(source: &str) -> String {
    let (mut interpreter, output) = new_interpreter();

    interpreter
        .process_source("<test>", source)
        .expect("The test source should run cleanly.");

    let bytes = output.borrow().clone();
    String::from_utf8(bytes).expect("Output should be valid UTF-8.")
}

#[test_case("0", &[], &[0] ; "zero")]
#[test_case("42", &[], &[42] ; "number")]
#[test_case("-17", &[], &[-17] ; "negative number")]
#[test_case("0x1A", &[], &[26] ; "hex prefixed number")]
#[test_case("TRUE", &[], &[1] ; "true word")]
#[test_case("FALSE", &[], &[0] ; "false word")]
#[test_case("+", &[2, 2], &[4] ; "simple add")]
#[test_case("-", &[5, 2], &[3] ; "simple sub")]
#[test_case("*", &[3, 4], &[12] ; "simple mul")]
#[test_case("/", &[12, 3], &[4] ; "simple div")]
#[test_case("MOD", &[13, 5], &[3] ; "simple mod")]
#[test_case("/MOD", &[13, 5], &[3, 2] ; "div mod")]
#[test_case("*/", &[10, 6, 3], &[20] ; "star slash")]
#[test_case("*/MOD", &[10, 7, 3], &[1, 23] ; "star slash mod")]
#[test_case("1+", &[41], &[42] ; "increment")]
#[test_case("1-", &[43], &[42] ; "decrement")]
#[test_case("NEGATE", &[5], &[-5] ; "negate")]
#[test_case("ABS", &[-5], &[5] ; "abs")]
#[test_case("MIN", &[3, 7], &[3] ; "min")]
#[test_case("MAX", &[3, 7], &[7] ; "max")]
fn arithmetic_words(source: &str, init: &[i64], expected: &[i64]) {
    let result = eval_and_stack(source, init).unwrap();
    assert_eq!(result, expected);
}

#[test_case("=", &[4, 4], &[1] ; "equal true")]
#[test_case("=", &[4, 5], &[0] ; "equal false")]
#[test_case("<>", &[4, 5], &[1] ; "not equal")]
#[test_case("<", &[1, 2], &[1] ; "less than true")]
#[test_case("<", &[2, 1], &[0] ; "less than false")]
#[test_case(">", &[2, 1], &[1] ; "greater than")]
#[test_case("<=", &[2, 2], &[1] ; "less or equal")]
#[test_case(">=", &[1, 2], &[0] ; "greater or equal false")]
#[test_case("0=", &[0], &[1] ; "zero equal")]
#[test_case("0<", &[-3], &[1] ; "zero less")]
#[test_case("0>", &[3], &[1] ; "zero greater")]
fn comparison_words_use_canonical_booleans(source: &str, init: &[i64], expected: &[i64]) {
    let result = eval_and_stack(source, init).unwrap();
    assert_eq!(result, expected);
}

#[test_case("AND", &[12, 10], &[8] ; "bitwise and")]
#[test_case("OR", &[12, 10], &[14] ; "bitwise or")]
#[test_case("XOR", &[12, 10], &[6] ; "bitwise xor")]
#[test_case("LSHIFT", &[1, 4], &[16] ; "left shift")]
#[test_case("RSHIFT", &[16, 4], &[1] ; "right shift")]
fn bit_words(source: &str, init: &[i64], expected: &[i64]) {
    let result = eval_and_stack(source, init).unwrap();
    assert_eq!(result, expected);
}

#[test_case("DUP", &[7], &[7, 7] ; "dup")]
#[test_case("DROP", &[7, 8], &[7] ; "drop")]
#[test_case("SWAP", &[1, 2], &[2, 1] ; "swap")]
#[test_case("OVER", &[1, 2], &[1, 2, 1] ; "over")]
#[test_case("ROT", &[1, 2, 3], &[2, 3, 1] ; "rot")]
#[test_case("2DUP", &[1, 2], &[1, 2, 1, 2] ; "two dup")]
#[test_case("2DROP", &[1, 2, 3], &[1] ; "two drop")]
#[test_case("2SWAP", &[1, 2, 3, 4], &[3, 4, 1, 2] ; "two swap")]
#[test_case("2OVER", &[1, 2, 3, 4], &[1, 2, 3, 4, 1, 2] ; "two over")]
#[test_case("2 PICK", &[10, 20, 30], &[10, 20, 30, 10] ; "pick")]
#[test_case("2 ROLL", &[10, 20, 30], &[20, 30, 10] ; "roll")]
#[test_case("DEPTH", &[5, 6], &[5, 6, 2] ; "depth")]
fn stack_words(source: &str, init: &[i64], expected: &[i64]) {
    let result = eval_and_stack(source, init).unwrap();
    assert_eq!(result, expected);
}

// The inverse pairs leave the starting stack untouched.
#[test_case("SWAP SWAP", &[1, 2], &[1, 2] ; "swap twice")]
#[test_case("DUP DROP", &[5], &[5] ; "dup drop")]
#[test_case(">R R>", &[7], &[7] ; "to r from r")]
fn inverse_pairs_restore_the_stack(source: &str, init: &[i64], expected: &[i64]) {
    let result = eval_and_stack(source, init).unwrap();
    assert_eq!(result, expected);
}

#[test]
fn r_fetch_copies_without_removing() {
    let result = eval_and_stack("7 >R R@ R@ R> DROP", &[]).unwrap();
    assert_eq!(result, vec![7, 7]);
}

#[test]
fn base_16_parses_bare_and_prefixed_hex_identically() {
    let result = eval_and_stack("HEX 1A 0x1A DECIMAL", &[]).unwrap();
    assert_eq!(result, vec![26, 26]);
}

#[test]
fn base_10_rejects_bare_hex_digits() {
    let result = eval_and_stack("1A", &[]);
    assert!(result.is_err());
}

#[test]
fn base_2_parses_binary_literals() {
    let result = eval_and_stack("2 BASE ! 1010 DECIMAL", &[]).unwrap();
    assert_eq!(result, vec![10]);
}

#[test]
fn division_by_zero_is_an_error() {
    let error = eval_and_stack("/", &[1, 0]).unwrap_err();
    assert!(error.must_clear_stacks());
}

#[test]
fn stack_underflow_is_an_error() {
    let error = eval_and_stack("DROP", &[]).unwrap_err();
    assert!(error.must_clear_stacks());
}

#[test]
fn float_words_use_the_float_view() {
    let result = eval_and_stack("2.5 1.5 F+ F>S", &[]).unwrap();
    assert_eq!(result, vec![4]);

    let result = eval_and_stack("1.0 2.0 F<", &[]).unwrap();
    assert_eq!(result, vec![1]);

    let result = eval_and_stack("3 S>F 0.5 F* F>S", &[]).unwrap();
    assert_eq!(result, vec![1]);
}

#[test]
fn dot_prints_signed_numbers() {
    assert_eq!(eval_output("42 ."), "42 ");
    assert_eq!(eval_output("-42 ."), "-42 ");
}

#[test]
fn emit_type_and_cr_write_to_the_output() {
    assert_eq!(eval_output("65 EMIT"), "A");
    assert_eq!(eval_output("CR"), "\n");
    assert_eq!(eval_output("S\" hello\" TYPE"), "hello");
}

#[test]
fn dot_quote_prints_immediately_when_interpreting() {
    assert_eq!(eval_output(".\" Hello world!\""), "Hello world!");
}

#[test]
fn paren_comments_are_skipped() {
    let result = eval_and_stack("1 ( this is a comment ) 2", &[]).unwrap();
    assert_eq!(result, vec![1, 2]);
}

#[test]
fn backslash_comments_run_to_the_end_of_the_line() {
    let result = eval_and_stack("1 \\ 2 3 4\n5", &[]).unwrap();
    assert_eq!(result, vec![1, 5]);
}

#[test]
fn char_pushes_the_first_character() {
    let result = eval_and_stack("CHAR A", &[]).unwrap();
    assert_eq!(result, vec![65]);
}

#[test]
fn find_reports_known_and_unknown_words() {
    let output = eval_output("FIND DUP");
    assert!(output.contains("DUP"));
    assert!(output.contains("found"));

    let output = eval_output("FIND NO-SUCH-WORD");
    assert!(output.contains("Unknown word"));
}
