use crate::{
    add_native_immediate_word, add_native_word,
    runtime::{
        data_structures::{
            cell::encode_address,
            word::{CompositeBody, WordNode},
        },
        error::{self, forth_error, forth_error_str, ErrorKind},
        interpreter::Interpreter,
    },
};
use std::cell::RefCell;

/// Start a new word definition.  The name is taken from the next token in the stream.
fn word_start_definition(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let token = match interpreter.next_token() {
        Ok(token) => token,
        Err(_) => {
            return forth_error_str(
                interpreter,
                ErrorKind::Syntax,
                "Syntax missing name for the new definition.",
            )
        }
    };

    let location = token.location().clone();
    interpreter.begin_construction(token.into_name(), location)
}

/// End the definition of the new word and install it into the dictionary.
fn word_end_definition(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    interpreter.finish_construction()
}

/// Mark the word being defined as immediate.
fn word_immediate(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    interpreter.construction_mut()?.immediate = true;
    Ok(())
}

/// Mark the word being defined as hidden from the WORDS listing.
fn word_hidden(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    interpreter.construction_mut()?.hidden = true;
    Ok(())
}

/// Compile a reference to the following word into the current definition, regardless of its
/// immediate flag.  This defers an immediate word's execution to the new word's run time.
fn word_postpone(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let token = match interpreter.next_token() {
        Ok(token) => token,
        Err(_) => {
            return forth_error_str(interpreter, ErrorKind::Syntax, "Syntax missing word name.")
        }
    };

    let location = Some(token.location().clone());
    interpreter.compile_word_named(token.name(), location)
}

/// Split the creation and behavior branches of a defining word.  Everything compiled so far
/// becomes the creation branch; everything after accumulates into the behavior branch.
fn word_does(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    if interpreter.construction()?.does_creation.is_some() {
        return forth_error_str(
            interpreter,
            ErrorKind::Syntax,
            "A definition can only contain one DOES>.",
        );
    }

    let (children, locations) = interpreter.construction_mut()?.take_body();

    let creation = interpreter.add_node(WordNode::Composite {
        body: RefCell::new(CompositeBody::from_parts(children, locations)),
    });

    interpreter.construction_mut()?.does_creation = Some(creation);
    Ok(())
}

/// Temporarily drop out of compile mode, so the following tokens execute right away.
fn word_left_bracket(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    interpreter.set_compile_suspended(true)
}

/// Return to compile mode after a `[`.
fn word_right_bracket(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    interpreter.set_compile_suspended(false)
}

/// Take the cell on top of the data stack at compile time and compile it as a literal.
fn word_literal(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.pop()?;
    let node = interpreter.add_node(WordNode::Literal { value });

    interpreter.compile_reference(node, None)
}

/// The compiling counterpart of `'`: compile the following word's dictionary address as a
/// literal.
fn word_bracket_tick(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let token = match interpreter.next_token() {
        Ok(token) => token,
        Err(_) => {
            return forth_error_str(interpreter, ErrorKind::Syntax, "Syntax missing word name.")
        }
    };

    let entry = match interpreter.find_word(token.name()) {
        Some(entry) => entry.clone(),
        None => {
            return forth_error(
                interpreter,
                ErrorKind::Undefined,
                format!("Unknown word {}.", token.name()),
            )
        }
    };

    let node = interpreter.add_node(WordNode::Literal {
        value: encode_address(entry.node, 0),
    });

    interpreter.compile_reference(node, Some(token.location().clone()))
}

/// The compiling counterpart of CHAR: compile the ASCII code of the following token's first
/// character as a literal.
fn word_bracket_char(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let token = match interpreter.next_token() {
        Ok(token) => token,
        Err(_) => {
            return forth_error_str(
                interpreter,
                ErrorKind::Syntax,
                "Syntax [CHAR] should be followed by a text.",
            )
        }
    };

    let first = match token.name().chars().next() {
        Some(first) => first,
        None => {
            return forth_error_str(
                interpreter,
                ErrorKind::Syntax,
                "Syntax [CHAR] found an empty token.",
            )
        }
    };

    let node = interpreter.add_node(WordNode::Literal {
        value: first as u64,
    });

    interpreter.compile_reference(node, Some(token.location().clone()))
}

/// Execute the word whose dictionary address is on the stack.
///
/// Signature: `addr -- `
fn word_execute(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (node, _) = interpreter.pop_as_address()?;

    interpreter.execute_node(node)
}

/// Skip a `( ... )` block comment.  Nested parentheses are balanced, so comments can quote other
/// comments.
fn word_paren(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let mut depth = 1;

    loop {
        let token = match interpreter.next_token() {
            Ok(token) => token,
            Err(_) => {
                return forth_error_str(
                    interpreter,
                    ErrorKind::Syntax,
                    "No closing ) found for the comment.",
                )
            }
        };

        let name = token.name();

        if name.contains('(') && !name.contains(')') {
            depth += 1;
            continue;
        }

        if name.ends_with(')') {
            depth -= 1;

            if depth == 0 {
                break;
            }
        }
    }

    Ok(())
}

/// Register the word creation and compilation control words.
pub fn register_word_words(interpreter: &mut dyn Interpreter) {
    add_native_immediate_word!(
        interpreter,
        ":",
        word_start_definition,
        "Start a new word definition."
    );

    add_native_immediate_word!(
        interpreter,
        ";",
        word_end_definition,
        "End the definition of the new word."
    );

    add_native_immediate_word!(
        interpreter,
        "IMMEDIATE",
        word_immediate,
        "Mark the word being defined as immediate."
    );

    add_native_immediate_word!(
        interpreter,
        "HIDDEN",
        word_hidden,
        "Mark the word being defined as hidden from the listing."
    );

    add_native_immediate_word!(
        interpreter,
        "POSTPONE",
        word_postpone,
        "Compile a reference to the following word, deferring its execution."
    );

    add_native_immediate_word!(
        interpreter,
        "DOES>",
        word_does,
        "Split a defining word into its creation and behavior branches."
    );

    add_native_immediate_word!(
        interpreter,
        "[",
        word_left_bracket,
        "Temporarily leave compile mode."
    );

    add_native_immediate_word!(
        interpreter,
        "]",
        word_right_bracket,
        "Return to compile mode."
    );

    add_native_immediate_word!(
        interpreter,
        "LITERAL",
        word_literal,
        "Compile the cell on top of the stack as a literal."
    );

    add_native_immediate_word!(
        interpreter,
        "[']",
        word_bracket_tick,
        "Compile the following word's dictionary address as a literal."
    );

    add_native_immediate_word!(
        interpreter,
        "[CHAR]",
        word_bracket_char,
        "Compile the following token's first character as a literal."
    );

    add_native_word!(
        interpreter,
        "EXECUTE",
        word_execute,
        "Execute the word whose dictionary address is on the stack."
    );

    add_native_immediate_word!(
        interpreter,
        "(",
        word_paren,
        "Skip a block comment up to the closing parenthesis."
    );
}
