use crate::{
    add_native_word,
    runtime::{
        data_structures::cell::{cell_from_bool, cell_from_float, cell_from_int},
        error::{self},
        interpreter::Interpreter,
    },
};
use std::io::Write;

/// Pop two cells as floats, second underneath first.  The floats share the data stack with the
/// integers by bit reinterpretation, so the words themselves must know which view applies.
fn pop_pair(interpreter: &mut dyn Interpreter) -> error::Result<(f64, f64)> {
    let b = interpreter.pop_as_float()?;
    let a = interpreter.pop_as_float()?;

    Ok((a, b))
}

/// Register the floating point words.
pub fn register_float_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(
        interpreter,
        "F+",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_float(a + b));
            Ok(())
        },
        "Add the top two values as floats."
    );

    add_native_word!(
        interpreter,
        "F-",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_float(a - b));
            Ok(())
        },
        "Subtract the top value from the second as floats."
    );

    add_native_word!(
        interpreter,
        "F*",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_float(a * b));
            Ok(())
        },
        "Multiply the top two values as floats."
    );

    add_native_word!(
        interpreter,
        "F/",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_float(a / b));
            Ok(())
        },
        "Divide the second value by the top as floats."
    );

    add_native_word!(
        interpreter,
        "FNEGATE",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_float()?;
            interpreter.push(cell_from_float(-value));
            Ok(())
        },
        "Negate the top value as a float."
    );

    add_native_word!(
        interpreter,
        "FABS",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_float()?;
            interpreter.push(cell_from_float(value.abs()));
            Ok(())
        },
        "Absolute value of the top value as a float."
    );

    add_native_word!(
        interpreter,
        "F.",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_float()?;
            let text = format!("{} ", value);

            interpreter.output().write_all(text.as_bytes())?;
            Ok(())
        },
        "Print the top value as a float."
    );

    add_native_word!(
        interpreter,
        "F<",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_bool(a < b));
            Ok(())
        },
        "Is the second value less than the top, as floats?"
    );

    add_native_word!(
        interpreter,
        "F>",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_bool(a > b));
            Ok(())
        },
        "Is the second value greater than the top, as floats?"
    );

    add_native_word!(
        interpreter,
        "F=",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_bool(a == b));
            Ok(())
        },
        "Are the top two values equal, as floats?"
    );

    add_native_word!(
        interpreter,
        "S>F",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_int()?;
            interpreter.push(cell_from_float(value as f64));
            Ok(())
        },
        "Convert the top signed value into a float."
    );

    add_native_word!(
        interpreter,
        "F>S",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_float()?;
            interpreter.push(cell_from_int(value as i64));
            Ok(())
        },
        "Convert the top float into a signed value, truncating."
    );
}
