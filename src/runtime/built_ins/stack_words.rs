use crate::{
    add_native_word,
    runtime::{
        error::{self, forth_error, ErrorKind},
        interpreter::Interpreter,
    },
};

/// Duplicate the top value on the data stack.
///
/// Signature: `value -- value value`
fn word_dup(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.pop()?;

    interpreter.push(value);
    interpreter.push(value);

    Ok(())
}

/// Drop the top value on the data stack.
///
/// Signature: `value -- `
fn word_drop(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let _ = interpreter.pop()?;

    Ok(())
}

/// Swap the top 2 values on the data stack.
///
/// Signature: `a b -- b a`
fn word_swap(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let b = interpreter.pop()?;
    let a = interpreter.pop()?;

    interpreter.push(b);
    interpreter.push(a);

    Ok(())
}

/// Copy the second value over the top one.
///
/// Signature: `a b -- a b a`
fn word_over(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let b = interpreter.pop()?;
    let a = interpreter.pop()?;

    interpreter.push(a);
    interpreter.push(b);
    interpreter.push(a);

    Ok(())
}

/// Rotate the third value to the top of the stack.
///
/// Signature: `a b c -- b c a`
fn word_rot(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let c = interpreter.pop()?;
    let b = interpreter.pop()?;
    let a = interpreter.pop()?;

    interpreter.push(b);
    interpreter.push(c);
    interpreter.push(a);

    Ok(())
}

/// Duplicate the top pair of values.
///
/// Signature: `a b -- a b a b`
fn word_2dup(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let b = interpreter.pop()?;
    let a = interpreter.pop()?;

    interpreter.push(a);
    interpreter.push(b);
    interpreter.push(a);
    interpreter.push(b);

    Ok(())
}

/// Drop the top pair of values.
///
/// Signature: `a b -- `
fn word_2drop(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let _ = interpreter.pop()?;
    let _ = interpreter.pop()?;

    Ok(())
}

/// Swap the top two pairs of values.
///
/// Signature: `a b c d -- c d a b`
fn word_2swap(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let d = interpreter.pop()?;
    let c = interpreter.pop()?;
    let b = interpreter.pop()?;
    let a = interpreter.pop()?;

    interpreter.push(c);
    interpreter.push(d);
    interpreter.push(a);
    interpreter.push(b);

    Ok(())
}

/// Copy the second pair of values over the top pair.
///
/// Signature: `a b c d -- a b c d a b`
fn word_2over(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let d = interpreter.pop()?;
    let c = interpreter.pop()?;
    let b = interpreter.pop()?;
    let a = interpreter.pop()?;

    interpreter.push(a);
    interpreter.push(b);
    interpreter.push(c);
    interpreter.push(d);
    interpreter.push(a);
    interpreter.push(b);

    Ok(())
}

/// Move the top value to the return stack.
///
/// Signature: `value -- `
fn word_to_r(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.pop()?;

    interpreter.push_return(value);
    Ok(())
}

/// Move the top of the return stack back to the data stack.
///
/// Signature: ` -- value`
fn word_r_from(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.pop_return()?;

    interpreter.push(value);
    Ok(())
}

/// Copy the top of the return stack without removing it.
///
/// Signature: ` -- value`
fn word_r_fetch(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.peek_return(0)?;

    interpreter.push(value);
    Ok(())
}

/// Copy the value at the given depth to the top of the stack.  A depth of 0 copies the top.
///
/// Signature: `xu ... x0 u -- xu ... x0 xu`
fn word_pick(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let index = interpreter.pop_as_int()?;
    let count = interpreter.stack().len() as i64;

    if index < 0 || index >= count {
        return forth_error(
            interpreter,
            ErrorKind::Underflow,
            format!("Index {} out of range of stack size {}.", index, count),
        );
    }

    let value = match interpreter.stack().peek(index as usize) {
        Some(value) => *value,
        None => {
            return forth_error(
                interpreter,
                ErrorKind::Underflow,
                format!("Index {} out of range of stack size {}.", index, count),
            )
        }
    };

    interpreter.push(value);
    Ok(())
}

/// The current depth of the data stack, before this word ran.
///
/// Signature: ` -- depth`
fn word_depth(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let depth = interpreter.stack().len() as u64;

    interpreter.push(depth);
    Ok(())
}

/// Register the stack manipulation words.
pub fn register_stack_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(
        interpreter,
        "DUP",
        word_dup,
        "Duplicate the top value on the data stack."
    );

    add_native_word!(
        interpreter,
        "DROP",
        word_drop,
        "Discard the top value on the data stack."
    );

    add_native_word!(
        interpreter,
        "SWAP",
        word_swap,
        "Swap the top 2 values on the data stack."
    );

    add_native_word!(
        interpreter,
        "OVER",
        word_over,
        "Copy the second value over the top one."
    );

    add_native_word!(
        interpreter,
        "ROT",
        word_rot,
        "Rotate the third value to the top of the stack."
    );

    add_native_word!(interpreter, "2DUP", word_2dup, "Duplicate the top pair of values.");

    add_native_word!(interpreter, "2DROP", word_2drop, "Discard the top pair of values.");

    add_native_word!(interpreter, "2SWAP", word_2swap, "Swap the top two pairs of values.");

    add_native_word!(
        interpreter,
        "2OVER",
        word_2over,
        "Copy the second pair of values over the top pair."
    );

    add_native_word!(
        interpreter,
        ">R",
        word_to_r,
        "Move the top value to the return stack."
    );

    add_native_word!(
        interpreter,
        "R>",
        word_r_from,
        "Move the top of the return stack back to the data stack."
    );

    add_native_word!(
        interpreter,
        "R@",
        word_r_fetch,
        "Copy the top of the return stack without removing it."
    );

    add_native_word!(
        interpreter,
        "PICK",
        word_pick,
        "Copy the value at the given depth to the top of the stack."
    );

    add_native_word!(
        interpreter,
        "ROLL",
        |interpreter: &mut dyn Interpreter| {
            let index = interpreter.pop_as_int()?;
            let count = interpreter.stack().len() as i64;

            if index < 0 || index >= count {
                return forth_error(
                    interpreter,
                    ErrorKind::Underflow,
                    format!("Index {} out of range of stack size {}.", index, count),
                );
            }

            // Pop down to the selected value, then push everything back with it on top.
            let mut values = Vec::with_capacity(index as usize + 1);

            for _ in 0..=index {
                values.push(interpreter.pop()?);
            }

            let moved = match values.pop() {
                Some(value) => value,
                None => return Ok(()),
            };

            for value in values.into_iter().rev() {
                interpreter.push(value);
            }

            interpreter.push(moved);
            Ok(())
        },
        "Move the value at the given depth to the top of the stack."
    );

    add_native_word!(
        interpreter,
        "DEPTH",
        word_depth,
        "Get the depth of the data stack before calling this word."
    );
}
