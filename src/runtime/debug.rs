use crate::{
    lang::source_buffer::SourceLocation,
    runtime::data_structures::cell::{cell_to_int, Cell},
};
use std::io::{self, BufRead, Write};

/// What the tracer wants the interpreter to do after a trace stop.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TraceAction {
    /// Carry on executing.
    Continue,

    /// Switch the debug mode off and carry on.
    StopDebug,

    /// Abort the current token batch with an error.
    Abort,
}

/// A hook called before each dispatched token and after each child of an executing composite,
/// while the debug mode is on.  The default implementation does nothing; the REPL installs the
/// interactive console tracer.
pub trait Tracer {
    fn on_word(
        &mut self,
        name: &str,
        location: Option<&SourceLocation>,
        stack: &[Cell],
        base: u32,
    ) -> TraceAction;
}

/// A tracer that does nothing and never stops execution.
pub struct NullTracer;

impl Tracer for NullTracer {
    fn on_word(
        &mut self,
        _name: &str,
        _location: Option<&SourceLocation>,
        _stack: &[Cell],
        _base: u32,
    ) -> TraceAction {
        TraceAction::Continue
    }
}

/// Format one stack cell in the given base.
fn format_cell(value: u64, base: u32) -> String {
    match base {
        16 => format!("{:#x}", value),
        8 => format!("{:#o}", value),
        2 => format!("{:#b}", value),
        _ => format!("{}", value),
    }
}

/// The interactive console tracer.  At every stop it shows the word about to execute and offers
/// a one letter menu: continue, signed stack dump, unsigned stack dump, stop debugging, or abort.
pub struct ConsoleTracer;

impl ConsoleTracer {
    fn dump_signed(stack: &[Cell], base: u32) {
        let mut line = String::new();

        for value in stack.iter() {
            let signed = cell_to_int(*value);

            if base == 10 {
                line.push_str(&format!("{} ", signed));
            } else {
                line.push_str(&format_cell(*value, base));
                line.push(' ');
            }
        }

        println!("{}", line);
    }

    fn dump_unsigned(stack: &[Cell], base: u32) {
        let mut line = String::new();

        for value in stack.iter() {
            line.push_str(&format_cell(*value, base));
            line.push(' ');
        }

        println!("{}", line);
    }
}

impl Tracer for ConsoleTracer {
    fn on_word(
        &mut self,
        name: &str,
        location: Option<&SourceLocation>,
        stack: &[Cell],
        base: u32,
    ) -> TraceAction {
        match location {
            Some(location) => print!("\nTo exec >> {}  @ {}\nStack dump: ", name, location),
            None => print!("\nTo exec >> {}\nStack dump: ", name),
        }

        print!("(c) cont, (s) signd st.dump & cont, (d) unsignd st.dump & cont, (x) stop debug & cont, (a) abort: ");
        let _ = io::stdout().flush();

        let mut answer = String::new();

        if io::stdin().lock().read_line(&mut answer).is_err() {
            return TraceAction::Continue;
        }

        match answer.trim().chars().next() {
            Some('s') | Some('S') => {
                ConsoleTracer::dump_signed(stack, base);
                TraceAction::Continue
            }

            Some('d') | Some('D') => {
                ConsoleTracer::dump_unsigned(stack, base);
                TraceAction::Continue
            }

            Some('x') | Some('X') => TraceAction::StopDebug,

            Some('a') | Some('A') => TraceAction::Abort,

            _ => TraceAction::Continue,
        }
    }
}
