use crate::{
    add_native_word,
    lang::source_buffer::SourceLocation,
    runtime::{
        data_structures::{
            cell::{cell_from_int, encode_address, Cell, CELL_BYTES},
            dictionary::WordEntry,
            word::{NodeIndex, WordNode},
        },
        error::{self, forth_error, forth_error_str, ErrorKind},
        interpreter::Interpreter,
    },
};
use std::cell::RefCell;

/// Read a run of bytes out of a byte array or counted string node.
pub fn read_bytes(
    interpreter: &dyn Interpreter,
    node: NodeIndex,
    offset: usize,
    length: usize,
) -> error::Result<Vec<u8>> {
    let node = interpreter.node(node)?;

    let copied = match &*node {
        WordNode::ByteArray { bytes } => {
            let bytes = bytes.borrow();
            bytes.get(offset..offset + length).map(|slice| slice.to_vec())
        }

        WordNode::CountedString { bytes } => {
            bytes.get(offset..offset + length).map(|slice| slice.to_vec())
        }

        _ => {
            return forth_error(
                interpreter,
                ErrorKind::Runtime,
                format!("A {} node has no readable memory.", node.kind_name()),
            )
        }
    };

    match copied {
        Some(copied) => Ok(copied),
        None => forth_error_str(
            interpreter,
            ErrorKind::Runtime,
            "Memory read past the end of the buffer.",
        ),
    }
}

/// Write a run of bytes into a byte array node.  Counted strings are immutable.
pub fn write_bytes(
    interpreter: &dyn Interpreter,
    node: NodeIndex,
    offset: usize,
    data: &[u8],
) -> error::Result<()> {
    let node = interpreter.node(node)?;

    match &*node {
        WordNode::ByteArray { bytes } => {
            let mut bytes = bytes.borrow_mut();

            match bytes.get_mut(offset..offset + data.len()) {
                Some(slice) => {
                    slice.copy_from_slice(data);
                    Ok(())
                }
                None => forth_error_str(
                    interpreter,
                    ErrorKind::Runtime,
                    "Memory write past the end of the buffer.",
                ),
            }
        }

        _ => forth_error(
            interpreter,
            ErrorKind::Runtime,
            format!("A {} node has no writable memory.", node.kind_name()),
        ),
    }
}

/// Signature: `addr -- value`
fn word_fetch(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (node, offset) = interpreter.pop_as_address()?;
    let bytes = read_bytes(interpreter, node, offset, CELL_BYTES)?;

    let mut cell = [0u8; CELL_BYTES];
    cell.copy_from_slice(&bytes);

    interpreter.push(Cell::from_le_bytes(cell));
    Ok(())
}

/// Signature: `value addr -- `
fn word_store(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (node, offset) = interpreter.pop_as_address()?;
    let value = interpreter.pop()?;

    write_bytes(interpreter, node, offset, &value.to_le_bytes())
}

/// Signature: `addr -- byte`
fn word_char_fetch(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (node, offset) = interpreter.pop_as_address()?;
    let bytes = read_bytes(interpreter, node, offset, 1)?;

    interpreter.push(bytes[0] as Cell);
    Ok(())
}

/// Signature: `byte addr -- `
fn word_char_store(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (node, offset) = interpreter.pop_as_address()?;
    let value = interpreter.pop()?;

    write_bytes(interpreter, node, offset, &[value as u8])
}

/// Signature: `n addr -- `
fn word_add_store(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (node, offset) = interpreter.pop_as_address()?;
    let increment = interpreter.pop_as_int()?;

    let bytes = read_bytes(interpreter, node, offset, CELL_BYTES)?;
    let mut cell = [0u8; CELL_BYTES];
    cell.copy_from_slice(&bytes);

    let updated = (Cell::from_le_bytes(cell) as i64).wrapping_add(increment);

    write_bytes(interpreter, node, offset, &(updated as Cell).to_le_bytes())
}

/// Reserve a fresh empty byte array in the repository and remember it as the latest one for
/// ALLOT and `,` to operate on.  This is the runtime half of CREATE; the interpreter's defining
/// word protocol takes care of attaching a name.
fn word_create(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let node = interpreter.add_node(WordNode::ByteArray {
        bytes: RefCell::new(Vec::new()),
    });

    interpreter.set_latest_array(node);
    Ok(())
}

/// Extend the most recently created array by the popped byte count.  A negative count shrinks
/// the array.
///
/// Signature: `n -- `
fn word_allot(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let count = interpreter.pop_as_int()?;

    let latest = match interpreter.latest_array() {
        Some(latest) => latest,
        None => {
            return forth_error_str(
                interpreter,
                ErrorKind::Runtime,
                "ALLOT without a CREATE to extend.",
            )
        }
    };

    let node = interpreter.node(latest)?;

    if let WordNode::ByteArray { bytes } = &*node {
        let mut bytes = bytes.borrow_mut();
        let new_size = bytes.len() as i64 + count;

        if new_size < 0 {
            return forth_error_str(
                interpreter,
                ErrorKind::Runtime,
                "ALLOT can not shrink an array below empty.",
            );
        }

        bytes.resize(new_size as usize, 0);
    }

    Ok(())
}

/// Append the popped cell to the most recently created array.
///
/// Signature: `value -- `
fn word_comma(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let value = interpreter.pop()?;

    let latest = match interpreter.latest_array() {
        Some(latest) => latest,
        None => {
            return forth_error_str(
                interpreter,
                ErrorKind::Runtime,
                "',' without a CREATE to append to.",
            )
        }
    };

    let node = interpreter.node(latest)?;

    if let WordNode::ByteArray { bytes } = &*node {
        bytes.borrow_mut().extend_from_slice(&value.to_le_bytes());
    }

    Ok(())
}

/// Signature: `addr -- addr+1 len`
fn word_count(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (node, offset) = interpreter.pop_as_address()?;
    let bytes = read_bytes(interpreter, node, offset, 1)?;

    interpreter.push(encode_address(node, offset + 1));
    interpreter.push(bytes[0] as Cell);
    Ok(())
}

/// Register the memory and data space words.
pub fn register_memory_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(
        interpreter,
        "@",
        word_fetch,
        "Fetch the cell at the popped address."
    );

    add_native_word!(
        interpreter,
        "!",
        word_store,
        "Store the second value at the popped address."
    );

    add_native_word!(
        interpreter,
        "C@",
        word_char_fetch,
        "Fetch the byte at the popped address."
    );

    add_native_word!(
        interpreter,
        "C!",
        word_char_store,
        "Store the second value's low byte at the popped address."
    );

    add_native_word!(
        interpreter,
        "+!",
        word_add_store,
        "Add the second value into the cell at the popped address."
    );

    add_native_word!(
        interpreter,
        "ALLOT",
        word_allot,
        "Extend the most recently created array by the popped byte count."
    );

    add_native_word!(
        interpreter,
        ",",
        word_comma,
        "Append the popped cell to the most recently created array."
    );

    add_native_word!(
        interpreter,
        "CELLS",
        |interpreter: &mut dyn Interpreter| {
            let count = interpreter.pop_as_int()?;
            interpreter.push(cell_from_int(count.wrapping_mul(CELL_BYTES as i64)));
            Ok(())
        },
        "Convert a cell count into a byte count."
    );

    add_native_word!(
        interpreter,
        "CHARS",
        |interpreter: &mut dyn Interpreter| {
            let count = interpreter.pop_as_int()?;
            interpreter.push(cell_from_int(count));
            Ok(())
        },
        "Convert a character count into a byte count."
    );

    add_native_word!(
        interpreter,
        "COUNT",
        word_count,
        "Unpack a counted string into its text address and length."
    );

    // [CREATE] carries the defining flag, so the interpreter's defining word protocol reads the
    // name that follows it and installs the array under that name.
    {
        use std::rc::Rc;

        let node = interpreter.add_node(WordNode::Primitive {
            handler: Rc::new(word_create),
        });

        let mut entry = WordEntry::new(
            node,
            "Reserve a fresh byte array under the following name.".to_string(),
            SourceLocation::new_from_info(file!(), line!() as usize, column!() as usize),
        );

        entry.defining = true;

        interpreter.insert_entry("[CREATE]", entry);
    }
}
