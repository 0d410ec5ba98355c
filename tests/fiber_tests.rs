use coforth::runtime::{
    built_ins::{process_boot_source, register_core_words},
    data_structures::cell::cell_to_int,
    interpreter::{
        coforth_interpreter::CoforthInterpreter, CodeManagement, Interpreter, InterpreterStack,
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

fn stack_of(interpreter: &CoforthInterpreter) -> Vec<i64> {
    interpreter
        .stack()
        .data()
        .iter()
        .map(|&cell| cell_to_int(cell))
        .collect()
}

#[test]
fn co_range_yields_successive_values() {
    let (mut interpreter, output) = new_interpreter();

    interpreter
        .process_source("<test>", ": R 0 5 1 CO_RANGE ; R . R . R . R . R .")
        .unwrap();

    let text = String::from_utf8(output.borrow().clone()).unwrap();
    assert_eq!(text, "0 1 2 3 4 ");
}

#[test]
fn co_range_with_compile_time_parameters_keeps_the_stack_clean() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter
        .process_source("<test>", ": R [ 0 ] [ 3 ] [ 1 ] CO_RANGE ; R R R")
        .unwrap();

    assert_eq!(stack_of(&interpreter), vec![0, 1, 2]);
}

#[test]
fn an_exhausted_co_range_does_nothing() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter
        .process_source("<test>", ": R [ 0 ] [ 2 ] [ 1 ] CO_RANGE ; R R R R R")
        .unwrap();

    // Two values, then silence.
    assert_eq!(stack_of(&interpreter), vec![0, 1]);
}

#[test]
fn co_range_counts_down_with_a_negative_step() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter
        .process_source("<test>", ": R [ 3 ] [ 0 ] [ -1 ] CO_RANGE ; R R R")
        .unwrap();

    assert_eq!(stack_of(&interpreter), vec![3, 2, 1]);
}

#[test]
fn a_non_progressing_co_range_is_an_error() {
    let (mut interpreter, _output) = new_interpreter();

    let error = interpreter
        .process_source("<test>", ": R [ 5 ] [ 0 ] [ 1 ] CO_RANGE ; R")
        .unwrap_err();

    assert!(error.must_clear_stacks());
}

#[test]
fn two_range_words_do_not_share_progress() {
    let (mut interpreter, _output) = new_interpreter();

    // Each word is constructed right after its definition, while its own parameters are still
    // on top of the stack.
    interpreter
        .process_source("<test>", ": A [ 0 ] [ 9 ] [ 1 ] CO_RANGE ; A A")
        .unwrap();

    interpreter
        .process_source("<test>", ": B [ 100 ] [ 109 ] [ 1 ] CO_RANGE ; B")
        .unwrap();

    interpreter.process_source("<test>", "A B").unwrap();

    assert_eq!(stack_of(&interpreter), vec![0, 1, 100, 2, 101]);
}

#[test]
fn a_fiber_runs_once_per_scheduler_tick_with_a_zero_slice() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter
        .process_source(
            "<test>",
            "VARIABLE N 0 N ! : LED N @ 1+ N ! 1 ; : F [ 3 ] [ 0 ] LED CO_FIBER ; F F",
        )
        .unwrap();

    // The first call built the fiber, the second registered it with the scheduler.
    for _ in 0..3 {
        interpreter.pump_fibers().unwrap();
    }

    interpreter.process_source("<test>", "N @").unwrap();
    assert_eq!(stack_of(&interpreter), vec![3]);
}

#[test]
fn a_fiber_with_used_up_rotations_stops() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter
        .process_source(
            "<test>",
            "VARIABLE N 0 N ! : LED N @ 1+ N ! 1 ; : F [ 2 ] [ 0 ] LED CO_FIBER ; F F",
        )
        .unwrap();

    for _ in 0..5 {
        interpreter.pump_fibers().unwrap();
    }

    // Two rotations only, no matter how often the scheduler ticks afterwards.
    interpreter.process_source("<test>", "N @").unwrap();
    assert_eq!(stack_of(&interpreter), vec![2]);
}

#[test]
fn a_fiber_terminates_when_its_body_leaves_zero() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter
        .process_source(
            "<test>",
            "VARIABLE N 0 N ! : STEP N @ 1+ N ! N @ 5 < ; : F [ -1 ] [ 0 ] STEP CO_FIBER ; F F",
        )
        .unwrap();

    for _ in 0..10 {
        interpreter.pump_fibers().unwrap();
    }

    // The body left a zero once N reached 5, which stopped the unlimited fiber.
    interpreter.process_source("<test>", "N @").unwrap();
    assert_eq!(stack_of(&interpreter), vec![5]);
}

#[test]
fn registering_a_fiber_twice_enqueues_it_once() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter
        .process_source(
            "<test>",
            "VARIABLE N 0 N ! : LED N @ 1+ N ! 1 ; : F [ 9 ] [ 0 ] LED CO_FIBER ; F F F F",
        )
        .unwrap();

    interpreter.pump_fibers().unwrap();

    // Three registrations collapse into one queue entry, so one tick runs one rotation.
    interpreter.process_source("<test>", "N @").unwrap();
    assert_eq!(stack_of(&interpreter), vec![1]);
}

#[test]
fn an_error_in_a_composite_clears_the_stacks_but_keeps_the_dictionary() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter.process_source("<test>", ": OOPS + ;").unwrap();

    let error = interpreter.process_source("<test>", "1 OOPS").unwrap_err();
    assert!(error.must_clear_stacks());

    interpreter.recover_from_error(&error);
    assert!(interpreter.stack().is_empty());
    assert!(interpreter.return_stack().is_empty());

    // The offending word is still there and works with enough arguments.
    interpreter.process_source("<test>", "1 2 OOPS").unwrap();
    assert_eq!(stack_of(&interpreter), vec![3]);
}

#[test]
fn lexical_errors_leave_the_stacks_alone() {
    let (mut interpreter, _output) = new_interpreter();

    interpreter.process_source("<test>", "5").unwrap();

    let error = interpreter.process_source("<test>", "THEN").unwrap_err();
    assert!(!error.must_clear_stacks());

    interpreter.recover_from_error(&error);
    assert_eq!(stack_of(&interpreter), vec![5]);
}
