use coforth::runtime::{
    built_ins::{process_boot_source, register_core_words},
    data_structures::cell::cell_to_int,
    error::Result,
    interpreter::{
        coforth_interpreter::CoforthInterpreter, CodeManagement, Interpreter, InterpreterStack,
        WordManagement,
    },
};
use std::{cell::RefCell, io::Write, rc::Rc};

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

fn new_interpreter() -> (CoforthInterpreter, Rc<RefCell<Vec<u8>>>) {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter =
        CoforthInterpreter::with_output(Box::new(SharedOutput(buffer.clone())));

    register_core_words(&mut interpreter);
    process_boot_source(&mut interpreter).expect("The boot definitions should process cleanly.");

    (interpreter, buffer)
}

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

fn eval_output(source: &str) -> String {
    let (mut interpreter, output) = new_interpreter();

    interpreter
        .process_source("<test>", source)
        .expect("The test source should run cleanly.");

    let bytes = output.borrow().clone();
    String::from_utf8(bytes).expect("Output should be valid UTF-8.")
}

#[test]
fn variable_store_fetch_round_trip() {
    let result = eval_and_stack("VARIABLE FOO 42 FOO ! FOO @", &[]).unwrap();
    assert_eq!(result, vec![42]);
}

#[test]
fn variables_start_at_zero() {
    let result = eval_and_stack("VARIABLE FRESH FRESH @", &[]).unwrap();
    assert_eq!(result, vec![0]);
}

#[test]
fn constant_pushes_its_value() {
    let result = eval_and_stack("42 CONSTANT LIFE LIFE", &[]).unwrap();
    assert_eq!(result, vec![42]);
}

#[test]
fn create_does_constant_factory() {
    let output = eval_output(": CONS CREATE , DOES> @ ; 7 CONS SEVEN SEVEN .");
    assert!(output.contains("7"));
}

#[test]
fn create_allot_reserves_writable_space() {
    let result = eval_and_stack(
        "CREATE DATA 4 CELLS ALLOT  11 DATA !  22 DATA 1 CELLS + !  DATA @ DATA 1 CELLS + @",
        &[],
    )
    .unwrap();

    assert_eq!(result, vec![11, 22]);
}

#[test]
fn comma_appends_cells_to_the_latest_array() {
    let result = eval_and_stack(
        "CREATE TWOS 2 , 4 , 8 ,  TWOS @ TWOS 1 CELLS + @ TWOS 2 CELLS + @",
        &[],
    )
    .unwrap();

    assert_eq!(result, vec![2, 4, 8]);
}

#[test]
fn comma_quote_installs_a_counted_string() {
    let output = eval_output("CREATE AGH ,\" University of Science\" AGH COUNT TYPE");
    assert_eq!(output, "University of Science");
}

#[test]
fn tick_execute_is_equivalent_to_direct_execution() {
    let result = eval_and_stack(": BAR 21 2 * ; ' BAR EXECUTE", &[]).unwrap();
    assert_eq!(result, vec![42]);
}

#[test]
fn tick_handles_survive_redefinition() {
    // The handle taken before the redefinition keeps the original behavior.
    let result = eval_and_stack(": BAR 1 ; ' BAR : BAR 2 ; EXECUTE BAR", &[]).unwrap();
    assert_eq!(result, vec![1, 2]);
}

#[test]
fn compiled_references_survive_redefinition() {
    let result = eval_and_stack(": GREET 1 ; : USER GREET ; : GREET 2 ; USER GREET", &[]).unwrap();
    assert_eq!(result, vec![1, 2]);
}

#[test]
fn to_stores_into_a_variable() {
    let result = eval_and_stack("VARIABLE FUEL 10 FUEL ! 234 TO FUEL FUEL @", &[]).unwrap();
    assert_eq!(result, vec![234]);
}

#[test]
fn bracket_char_compiles_a_character_literal() {
    let result = eval_and_stack(": C [CHAR] B ; C", &[]).unwrap();
    assert_eq!(result, vec![66]);
}

#[test]
fn bracket_tick_compiles_a_word_address() {
    let result = eval_and_stack(": T ['] DUP ; 5 T EXECUTE", &[]).unwrap();
    assert_eq!(result, vec![5, 5]);
}

#[test]
fn immediate_words_run_during_compilation() {
    let result = eval_and_stack(": IMM IMMEDIATE 42 ; : USE IMM ; USE", &[]).unwrap();

    // IMM ran while USE was being compiled, so the 42 landed before USE ever ran.
    assert_eq!(result, vec![42]);
}

#[test]
fn postpone_defers_an_immediate_word() {
    let result = eval_and_stack(": IMM IMMEDIATE 7 ; : USE POSTPONE IMM ; USE", &[]).unwrap();
    assert_eq!(result, vec![7]);
}

#[test]
fn literal_bakes_a_compile_time_value() {
    let result = eval_and_stack(": L [ 3 4 + ] LITERAL ; L", &[]).unwrap();
    assert_eq!(result, vec![7]);
}

#[test]
fn missing_create_in_a_defining_word_fails() {
    let error = eval_and_stack(": BAD DOES> @ ; BAD X", &[]).unwrap_err();
    assert!(error.must_clear_stacks());
}

#[test]
fn a_defining_word_requires_a_following_name() {
    assert!(eval_and_stack(": CONS CREATE , DOES> @ ; 7 CONS", &[]).is_err());
}

#[test]
fn abort_quote_fails_with_its_message() {
    let error = eval_and_stack(": CHECK 0 = IF ABORT\" bad value\" THEN ; 0 CHECK", &[])
        .unwrap_err();

    assert!(error.error().contains("bad value"));
    assert!(error.must_clear_stacks());
}

#[test]
fn words_listing_shows_definitions_in_insertion_order() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter
        .process_source("<test>", ": AAA 1 ; : BBB 2 ;")
        .unwrap();

    let listing = format!("{}", interpreter.dictionary());
    let aaa = listing.find("AAA").expect("AAA should be listed.");
    let bbb = listing.find("BBB").expect("BBB should be listed.");

    assert!(aaa < bbb);
}

#[test]
fn case_insensitive_lookup_finds_built_ins() {
    let result = eval_and_stack("5 dup Dup", &[]).unwrap();
    assert_eq!(result, vec![5, 5, 5]);
}
