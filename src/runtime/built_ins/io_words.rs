use crate::{
    add_native_word,
    runtime::{
        data_structures::cell::{cell_to_int, Cell},
        error::{self},
        interpreter::Interpreter,
    },
};
use std::io::Write;

/// Format one cell for numeric output in the given base.  Decimal output is signed; the other
/// bases print the cell's raw bits, which shows negative numbers in two's complement form.
pub fn format_number(value: Cell, base: u32) -> String {
    match base {
        16 => format!("{:X}", value),
        8 => format!("{:o}", value),
        2 => format!("{:b}", value),
        _ => format!("{}", cell_to_int(value)),
    }
}

/// Print the popped cell as a signed number followed by a space.
///
/// Signature: `value -- `
fn word_dot(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.pop()?;
    let base = interpreter.base();
    let text = format!("{} ", format_number(value, base));

    interpreter.output().write_all(text.as_bytes())?;
    Ok(())
}

/// Print the popped cell as an unsigned number followed by a space.
///
/// Signature: `value -- `
fn word_u_dot(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.pop()?;
    let base = interpreter.base();

    let text = if base == 10 {
        format!("{} ", value)
    } else {
        format!("{} ", format_number(value, base))
    };

    interpreter.output().write_all(text.as_bytes())?;
    Ok(())
}

/// Dump the whole data stack without disturbing it.
///
/// Signature: ` -- `
fn word_dot_s(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let base = interpreter.base();
    let values: Vec<Cell> = interpreter.stack().data().to_vec();

    let mut text = format!("<{}> ", values.len());

    for value in values {
        text.push_str(&format_number(value, base));
        text.push(' ');
    }

    text.push('\n');

    interpreter.output().write_all(text.as_bytes())?;
    Ok(())
}

/// Print the popped cell as a single character.
///
/// Signature: `char -- `
fn word_emit(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.pop()?;
    let byte = [value as u8];

    interpreter.output().write_all(&byte)?;
    Ok(())
}

/// Register the numeric and character output words.
pub fn register_io_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(
        interpreter,
        ".",
        word_dot,
        "Print the top value as a signed number."
    );

    add_native_word!(
        interpreter,
        "U.",
        word_u_dot,
        "Print the top value as an unsigned number."
    );

    add_native_word!(
        interpreter,
        ".S",
        word_dot_s,
        "Print the whole data stack without disturbing it."
    );

    add_native_word!(
        interpreter,
        "EMIT",
        word_emit,
        "Print the top value as a single character."
    );

    add_native_word!(
        interpreter,
        "CR",
        |interpreter: &mut dyn Interpreter| {
            interpreter.output().write_all(b"\n")?;
            Ok(())
        },
        "Print a new line."
    );

    add_native_word!(
        interpreter,
        "SPACE",
        |interpreter: &mut dyn Interpreter| {
            interpreter.output().write_all(b" ")?;
            Ok(())
        },
        "Print a single space."
    );

    add_native_word!(
        interpreter,
        "SPACES",
        |interpreter: &mut dyn Interpreter| {
            let count = interpreter.pop_as_int()?.max(0) as usize;
            let text = " ".repeat(count);

            interpreter.output().write_all(text.as_bytes())?;
            Ok(())
        },
        "Print the popped number of spaces."
    );
}
