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
use test_case::test_case;

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
fn counted_loop_with_index_sums_correctly() {
    let output = eval_output(": SUM10 0 10 0 DO I + LOOP ; SUM10 .");
    assert!(output.contains("45"));
}

#[test_case("5 T", &[1] ; "true branch")]
#[test_case("-5 T", &[2] ; "false branch")]
fn if_else_then(source: &str, expected: &[i64]) {
    let program = format!(": T 0 > IF 1 ELSE 2 THEN ; {}", source);
    let result = eval_and_stack(&program, &[]).unwrap();
    assert_eq!(result, expected);
}

#[test]
fn if_without_else_skips_when_false() {
    let result = eval_and_stack(": T IF 42 THEN ; 0 T 1 T", &[]).unwrap();
    assert_eq!(result, vec![42]);
}

#[test]
fn begin_until_counts_down() {
    let result = eval_and_stack(": CD BEGIN 1- DUP 0= UNTIL DROP ; 5 CD", &[]).unwrap();
    assert_eq!(result, Vec::<i64>::new());
}

#[test]
fn begin_while_repeat_counts_down() {
    let result = eval_and_stack(": W BEGIN DUP 0 > WHILE 1- REPEAT ; 3 W", &[]).unwrap();
    assert_eq!(result, vec![0]);
}

#[test]
fn question_do_runs_zero_iterations_for_an_empty_range() {
    let result = eval_and_stack(": Z 0 0 ?DO 1 LOOP ; Z", &[]).unwrap();
    assert_eq!(result, Vec::<i64>::new());
}

#[test]
fn question_do_runs_a_non_empty_range() {
    let result = eval_and_stack(": Z 0 3 0 ?DO 1+ LOOP ; Z", &[]).unwrap();
    assert_eq!(result, vec![3]);
}

#[test]
fn plus_loop_steps_by_the_given_value() {
    let result = eval_and_stack(": P 0 10 0 DO I + 2 +LOOP ; P", &[]).unwrap();
    assert_eq!(result, vec![20]);
}

#[test]
fn plus_loop_with_a_negative_step_counts_down() {
    let result = eval_and_stack(": N 0 0 5 DO I + -1 +LOOP ; N", &[]).unwrap();
    assert_eq!(result, vec![5 + 4 + 3 + 2 + 1]);
}

#[test]
fn nested_loops_expose_the_outer_index_through_j() {
    let result = eval_and_stack(": N 0 2 0 DO 2 0 DO J + LOOP LOOP ; N", &[]).unwrap();
    assert_eq!(result, vec![2]);
}

#[test]
fn exit_inside_a_counted_loop_leaves_it_early() {
    let result = eval_and_stack(
        ": E 0 10 0 DO I 5 = IF EXIT THEN 1+ LOOP ; E",
        &[],
    )
    .unwrap();

    assert_eq!(result, vec![5]);
}

#[test]
fn exit_outside_a_loop_ends_the_word() {
    let result = eval_and_stack(": X 1 EXIT 2 ; X", &[]).unwrap();
    assert_eq!(result, vec![1]);
}

#[test]
fn case_selects_the_matching_clause() {
    let program = ": DAY CASE 1 OF .\" Mon\" ENDOF 2 OF .\" Tue\" ENDOF .\" ??\" ENDCASE ;";

    let output = eval_output(&format!("{} 2 DAY", program));
    assert!(output.contains("Tue"));

    let output = eval_output(&format!("{} 1 DAY", program));
    assert!(output.contains("Mon"));

    let output = eval_output(&format!("{} 9 DAY", program));
    assert!(output.contains("??"));
}

#[test]
fn case_consumes_the_selector() {
    let program = ": DAY CASE 1 OF 10 ENDOF 2 OF 20 ENDOF 0 ENDCASE ;";

    let result = eval_and_stack(&format!("{} 2 DAY", program), &[]).unwrap();
    assert_eq!(result, vec![20]);

    let result = eval_and_stack(&format!("{} 9 DAY", program), &[]).unwrap();
    assert_eq!(result, vec![0]);
}

#[test]
fn composite_execution_matches_direct_interpretation() {
    // A composite without control flow behaves exactly like its tokens typed in directly.
    let composed = eval_and_stack(": C 1 2 + 3 * ; C", &[]).unwrap();
    let direct = eval_and_stack("1 2 + 3 *", &[]).unwrap();

    assert_eq!(composed, direct);
}

#[test]
fn recursion_references_the_definition_under_construction() {
    let result = eval_and_stack(
        ": FACT DUP 1 > IF DUP 1- FACT * THEN ; 5 FACT",
        &[],
    )
    .unwrap();

    assert_eq!(result, vec![120]);
}

#[test]
fn mismatched_control_words_are_compile_errors() {
    assert!(eval_and_stack(": B THEN ;", &[]).is_err());
    assert!(eval_and_stack(": B ELSE ;", &[]).is_err());
    assert!(eval_and_stack(": B AGAIN ;", &[]).is_err());
    assert!(eval_and_stack(": B ENDCASE ;", &[]).is_err());
    assert!(eval_and_stack(": B 1 OF ;", &[]).is_err());
}

#[test]
fn an_unresolved_control_structure_fails_the_definition() {
    assert!(eval_and_stack(": B 1 IF 2 ;", &[]).is_err());
}

#[test]
fn semicolon_without_colon_is_an_error() {
    let error = eval_and_stack(";", &[]).unwrap_err();
    assert!(!error.must_clear_stacks());
}

#[test]
fn a_failed_definition_rolls_back_and_can_be_retried() {
    let (mut interpreter, _output) = new_interpreter();

    let error = interpreter
        .process_source("<test>", ": W NO-SUCH-WORD ;")
        .unwrap_err();

    interpreter.recover_from_error(&error);
    assert!(interpreter.find_word("W").is_none());

    interpreter.process_source("<test>", ": W 1 ; W").unwrap();
    assert_eq!(interpreter.stack().data(), &[1]);
}
