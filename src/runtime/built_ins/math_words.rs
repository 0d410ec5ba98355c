use crate::{
    add_native_word,
    runtime::{
        data_structures::cell::{cell_from_bool, cell_from_int, Cell},
        error::{self, forth_error_str, ErrorKind},
        interpreter::Interpreter,
    },
};

/// Pop two cells as signed integers, second underneath first.
fn pop_pair(interpreter: &mut dyn Interpreter) -> error::Result<(i64, i64)> {
    let b = interpreter.pop_as_int()?;
    let a = interpreter.pop_as_int()?;

    Ok((a, b))
}

/// Signature: `a b -- a+b`
fn word_add(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (a, b) = pop_pair(interpreter)?;

    interpreter.push(cell_from_int(a.wrapping_add(b)));
    Ok(())
}

/// Signature: `a b -- a-b`
fn word_subtract(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (a, b) = pop_pair(interpreter)?;

    interpreter.push(cell_from_int(a.wrapping_sub(b)));
    Ok(())
}

/// Signature: `a b -- a*b`
fn word_multiply(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (a, b) = pop_pair(interpreter)?;

    interpreter.push(cell_from_int(a.wrapping_mul(b)));
    Ok(())
}

/// Signature: `a b -- a/b`
fn word_divide(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (a, b) = pop_pair(interpreter)?;

    if b == 0 {
        return forth_error_str(interpreter, ErrorKind::Arithmetic, "Division by zero.");
    }

    interpreter.push(cell_from_int(a.wrapping_div(b)));
    Ok(())
}

/// Signature: `a b -- a%b`
fn word_mod(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (a, b) = pop_pair(interpreter)?;

    if b == 0 {
        return forth_error_str(interpreter, ErrorKind::Arithmetic, "Division by zero.");
    }

    interpreter.push(cell_from_int(a.wrapping_rem(b)));
    Ok(())
}

/// Signature: `a b -- rem quot`
fn word_div_mod(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (a, b) = pop_pair(interpreter)?;

    if b == 0 {
        return forth_error_str(interpreter, ErrorKind::Arithmetic, "Division by zero.");
    }

    interpreter.push(cell_from_int(a.wrapping_rem(b)));
    interpreter.push(cell_from_int(a.wrapping_div(b)));
    Ok(())
}

/// Multiply then divide through a widened intermediate, so `n1*n2` does not overflow before the
/// division.
///
/// Signature: `n1 n2 n3 -- n1*n2/n3`
fn word_star_slash(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let n3 = interpreter.pop_as_int()?;
    let n2 = interpreter.pop_as_int()?;
    let n1 = interpreter.pop_as_int()?;

    if n3 == 0 {
        return forth_error_str(interpreter, ErrorKind::Arithmetic, "Division by zero.");
    }

    let wide = (n1 as i128) * (n2 as i128) / (n3 as i128);

    interpreter.push(cell_from_int(wide as i64));
    Ok(())
}

/// Multiply then divide through a widened intermediate, leaving the remainder as well.
///
/// Signature: `n1 n2 n3 -- rem quot`
fn word_star_slash_mod(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let n3 = interpreter.pop_as_int()?;
    let n2 = interpreter.pop_as_int()?;
    let n1 = interpreter.pop_as_int()?;

    if n3 == 0 {
        return forth_error_str(interpreter, ErrorKind::Arithmetic, "Division by zero.");
    }

    let product = (n1 as i128) * (n2 as i128);

    interpreter.push(cell_from_int((product % n3 as i128) as i64));
    interpreter.push(cell_from_int((product / n3 as i128) as i64));
    Ok(())
}

/// Register the arithmetic, comparison, and bit manipulation words.
pub fn register_math_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(interpreter, "+", word_add, "Add the top two values.");

    add_native_word!(
        interpreter,
        "-",
        word_subtract,
        "Subtract the top value from the second."
    );

    add_native_word!(interpreter, "*", word_multiply, "Multiply the top two values.");

    add_native_word!(
        interpreter,
        "/",
        word_divide,
        "Divide the second value by the top."
    );

    add_native_word!(
        interpreter,
        "MOD",
        word_mod,
        "Remainder of dividing the second value by the top."
    );

    add_native_word!(
        interpreter,
        "/MOD",
        word_div_mod,
        "Remainder and quotient of dividing the second value by the top."
    );

    add_native_word!(
        interpreter,
        "*/",
        word_star_slash,
        "Multiply then divide with a widened intermediate."
    );

    add_native_word!(
        interpreter,
        "*/MOD",
        word_star_slash_mod,
        "Multiply then divide with a widened intermediate, keeping the remainder."
    );

    add_native_word!(
        interpreter,
        "1+",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_int()?;
            interpreter.push(cell_from_int(value.wrapping_add(1)));
            Ok(())
        },
        "Increment the top value."
    );

    add_native_word!(
        interpreter,
        "1-",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_int()?;
            interpreter.push(cell_from_int(value.wrapping_sub(1)));
            Ok(())
        },
        "Decrement the top value."
    );

    add_native_word!(
        interpreter,
        "NEGATE",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_int()?;
            interpreter.push(cell_from_int(value.wrapping_neg()));
            Ok(())
        },
        "Negate the top value."
    );

    add_native_word!(
        interpreter,
        "ABS",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_int()?;
            interpreter.push(cell_from_int(value.wrapping_abs()));
            Ok(())
        },
        "Absolute value of the top value."
    );

    add_native_word!(
        interpreter,
        "MIN",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_int(a.min(b)));
            Ok(())
        },
        "The smaller of the top two values."
    );

    add_native_word!(
        interpreter,
        "MAX",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_int(a.max(b)));
            Ok(())
        },
        "The larger of the top two values."
    );

    // Comparisons push the canonical truth cells.
    add_native_word!(
        interpreter,
        "=",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_bool(a == b));
            Ok(())
        },
        "Are the top two values equal?"
    );

    add_native_word!(
        interpreter,
        "<>",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_bool(a != b));
            Ok(())
        },
        "Are the top two values different?"
    );

    add_native_word!(
        interpreter,
        "<",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_bool(a < b));
            Ok(())
        },
        "Is the second value less than the top?"
    );

    add_native_word!(
        interpreter,
        ">",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_bool(a > b));
            Ok(())
        },
        "Is the second value greater than the top?"
    );

    add_native_word!(
        interpreter,
        "<=",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_bool(a <= b));
            Ok(())
        },
        "Is the second value less than or equal to the top?"
    );

    add_native_word!(
        interpreter,
        ">=",
        |interpreter: &mut dyn Interpreter| {
            let (a, b) = pop_pair(interpreter)?;
            interpreter.push(cell_from_bool(a >= b));
            Ok(())
        },
        "Is the second value greater than or equal to the top?"
    );

    add_native_word!(
        interpreter,
        "0=",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_int()?;
            interpreter.push(cell_from_bool(value == 0));
            Ok(())
        },
        "Is the top value zero?"
    );

    add_native_word!(
        interpreter,
        "0<>",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_int()?;
            interpreter.push(cell_from_bool(value != 0));
            Ok(())
        },
        "Is the top value non-zero?"
    );

    add_native_word!(
        interpreter,
        "0<",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_int()?;
            interpreter.push(cell_from_bool(value < 0));
            Ok(())
        },
        "Is the top value negative?"
    );

    add_native_word!(
        interpreter,
        "0>",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop_as_int()?;
            interpreter.push(cell_from_bool(value > 0));
            Ok(())
        },
        "Is the top value positive?"
    );

    add_native_word!(
        interpreter,
        "AND",
        |interpreter: &mut dyn Interpreter| {
            let b = interpreter.pop()?;
            let a = interpreter.pop()?;
            interpreter.push(a & b);
            Ok(())
        },
        "Bitwise and of the top two values."
    );

    add_native_word!(
        interpreter,
        "OR",
        |interpreter: &mut dyn Interpreter| {
            let b = interpreter.pop()?;
            let a = interpreter.pop()?;
            interpreter.push(a | b);
            Ok(())
        },
        "Bitwise or of the top two values."
    );

    add_native_word!(
        interpreter,
        "XOR",
        |interpreter: &mut dyn Interpreter| {
            let b = interpreter.pop()?;
            let a = interpreter.pop()?;
            interpreter.push(a ^ b);
            Ok(())
        },
        "Bitwise exclusive or of the top two values."
    );

    add_native_word!(
        interpreter,
        "INVERT",
        |interpreter: &mut dyn Interpreter| {
            let value = interpreter.pop()?;
            interpreter.push(!value);
            Ok(())
        },
        "Bitwise complement of the top value."
    );

    add_native_word!(
        interpreter,
        "LSHIFT",
        |interpreter: &mut dyn Interpreter| {
            let count = interpreter.pop()? & 63;
            let value = interpreter.pop()?;
            interpreter.push(value << count);
            Ok(())
        },
        "Shift the second value left by the top value bits."
    );

    add_native_word!(
        interpreter,
        "RSHIFT",
        |interpreter: &mut dyn Interpreter| {
            let count = interpreter.pop()? & 63;
            let value: Cell = interpreter.pop()?;
            interpreter.push(value >> count);
            Ok(())
        },
        "Shift the second value right by the top value bits."
    );
}
