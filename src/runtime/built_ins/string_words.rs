use crate::{
    add_native_immediate_word, add_native_word,
    lang::source_buffer::SourceLocation,
    runtime::{
        built_ins::memory_words::read_bytes,
        data_structures::{
            cell::{encode_address, Cell},
            dictionary::WordEntry,
            word::WordNode,
        },
        error::{self, forth_error, forth_error_str, ErrorKind},
        interpreter::Interpreter,
    },
};
use std::{cell::RefCell, io::Write, rc::Rc};

/// Signature: `addr len -- `
fn word_type(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let length = interpreter.pop_as_int()?;
    let (node, offset) = interpreter.pop_as_address()?;

    if length < 0 {
        return forth_error_str(interpreter, ErrorKind::Runtime, "TYPE with a negative length.");
    }

    let bytes = read_bytes(interpreter, node, offset, length as usize)?;

    interpreter.output().write_all(&bytes)?;
    Ok(())
}

/// `."` prints the collected text.  In compile mode the text is baked into a counted string and
/// a TYPE is compiled after it.
fn word_dot_quote(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let text = interpreter.collect_quoted_text()?;

    if interpreter.is_compiling() {
        let node = interpreter.add_node(WordNode::CountedString {
            bytes: text.into_bytes(),
        });

        interpreter.compile_reference(node, None)?;
        interpreter.compile_word_named("TYPE", None)
    } else {
        interpreter.output().write_all(text.as_bytes())?;
        Ok(())
    }
}

/// `S"` produces a runtime (addr, len) pair for the collected text.
fn word_s_quote(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let text = interpreter.collect_quoted_text()?;
    let length = text.len();

    let node = interpreter.add_node(WordNode::CountedString {
        bytes: text.into_bytes(),
    });

    if interpreter.is_compiling() {
        interpreter.compile_reference(node, None)
    } else {
        interpreter.push(encode_address(node, 0));
        interpreter.push(length as Cell);
        Ok(())
    }
}

/// `C"` produces a counted string: a length byte followed by the text.  Only the address is
/// pushed; COUNT unpacks it.
fn word_c_quote(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let text = interpreter.collect_quoted_text()?;

    if text.len() > u8::MAX as usize {
        return forth_error(
            interpreter,
            ErrorKind::Runtime,
            format!("Counted string of {} bytes is too long.", text.len()),
        );
    }

    let mut bytes = vec![text.len() as u8];
    bytes.extend_from_slice(text.as_bytes());

    let node = interpreter.add_node(WordNode::ByteArray {
        bytes: RefCell::new(bytes),
    });

    if interpreter.is_compiling() {
        interpreter.compile_reference(node, None)
    } else {
        interpreter.push(encode_address(node, 0));
        Ok(())
    }
}

/// `,"` installs the collected text as a counted string.  Used after CREATE it appends a length
/// byte and the text to the new array; in compile mode it bakes a counted string into the
/// current definition.
fn word_comma_quote(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let text = interpreter.collect_quoted_text()?;

    if interpreter.is_compiling() {
        let node = interpreter.add_node(WordNode::CountedString {
            bytes: text.into_bytes(),
        });

        return interpreter.compile_reference(node, None);
    }

    if text.len() > u8::MAX as usize {
        return forth_error(
            interpreter,
            ErrorKind::Runtime,
            format!("Counted string of {} bytes is too long.", text.len()),
        );
    }

    let latest = match interpreter.latest_array() {
        Some(latest) => latest,
        None => {
            return forth_error_str(
                interpreter,
                ErrorKind::Runtime,
                "',\"' without a CREATE to append to.",
            )
        }
    };

    let node = interpreter.node(latest)?;

    if let WordNode::ByteArray { bytes } = &*node {
        let mut bytes = bytes.borrow_mut();
        bytes.push(text.len() as u8);
        bytes.extend_from_slice(text.as_bytes());
    }

    Ok(())
}

/// The runtime half of ABORT": pops the message and fails with it.
///
/// Signature: `addr len -- `
fn word_abort_message(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let length = interpreter.pop_as_int()?.max(0) as usize;
    let (node, offset) = interpreter.pop_as_address()?;

    let bytes = read_bytes(interpreter, node, offset, length)?;
    let message = String::from_utf8_lossy(&bytes).to_string();

    forth_error(interpreter, ErrorKind::Runtime, message)
}

/// `ABORT"` prints nothing on success; it simply fails with the collected message.
fn word_abort_quote(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let text = interpreter.collect_quoted_text()?;

    if interpreter.is_compiling() {
        let node = interpreter.add_node(WordNode::CountedString {
            bytes: text.into_bytes(),
        });

        interpreter.compile_reference(node, None)?;
        return interpreter.compile_word_named("(ABORT\")", None);
    }

    forth_error(interpreter, ErrorKind::Runtime, text)
}

/// Register the text words.
pub fn register_string_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(
        interpreter,
        "TYPE",
        word_type,
        "Print the text at the popped address and length."
    );

    add_native_immediate_word!(
        interpreter,
        ".\"",
        word_dot_quote,
        "Print the text up to the closing quote."
    );

    add_native_immediate_word!(
        interpreter,
        "S\"",
        word_s_quote,
        "Produce the address and length of the text up to the closing quote."
    );

    add_native_immediate_word!(
        interpreter,
        "C\"",
        word_c_quote,
        "Produce a counted string from the text up to the closing quote."
    );

    add_native_immediate_word!(
        interpreter,
        ",\"",
        word_comma_quote,
        "Install the text up to the closing quote as a counted string."
    );

    add_native_immediate_word!(
        interpreter,
        "ABORT\"",
        word_abort_quote,
        "Fail with the text up to the closing quote as the message."
    );

    add_native_word!(
        interpreter,
        "ABORT",
        |interpreter: &mut dyn Interpreter| -> error::Result<()> {
            forth_error_str(interpreter, ErrorKind::Runtime, "ABORT.")
        },
        "Fail unconditionally, clearing both stacks."
    );

    // The runtime half of ABORT" is hidden from the WORDS listing.
    {
        let node = interpreter.add_node(WordNode::Primitive {
            handler: Rc::new(word_abort_message),
        });

        let mut entry = WordEntry::new(
            node,
            "Fail with the popped text as the message.".to_string(),
            SourceLocation::new_from_info(file!(), line!() as usize, column!() as usize),
        );

        entry.hidden = true;

        interpreter.insert_entry("(ABORT\")", entry);
    }
}
