use crate::{
    add_native_immediate_word,
    lang::{compilation::ControlFrame, source_buffer::SourceLocation},
    runtime::{
        data_structures::{dictionary::WordEntry, word::WordNode},
        error::{self, forth_error, forth_error_str, ErrorKind},
        interpreter::Interpreter,
    },
};
use std::cell::RefCell;

/// Append a branch node with an unresolved offset to the current definition, returning its body
/// position for later patching.
fn emit_open_branch(
    interpreter: &mut dyn Interpreter,
    conditional: bool,
) -> error::Result<usize> {
    let node = if conditional {
        WordNode::BranchIf0 {
            offset: RefCell::new(0),
        }
    } else {
        WordNode::Branch {
            offset: RefCell::new(0),
        }
    };

    let node = interpreter.add_node(node);
    let site = interpreter.construction()?.here();

    interpreter.compile_reference(node, None)?;
    Ok(site)
}

/// Append a branch node jumping backwards to an already known body position.
fn emit_branch_back(
    interpreter: &mut dyn Interpreter,
    conditional: bool,
    target: usize,
) -> error::Result<()> {
    let site = interpreter.construction()?.here();
    let offset = target as isize - site as isize;

    let node = if conditional {
        WordNode::BranchIf0 {
            offset: RefCell::new(offset),
        }
    } else {
        WordNode::Branch {
            offset: RefCell::new(offset),
        }
    };

    let node = interpreter.add_node(node);
    interpreter.compile_reference(node, None)
}

/// Resolve a previously emitted forward branch to jump to the given body position.
fn patch_site(
    interpreter: &mut dyn Interpreter,
    site: usize,
    target: usize,
) -> error::Result<()> {
    let node_index = match interpreter.construction()?.body.get(site) {
        Some(node_index) => *node_index,
        None => {
            return forth_error(
                interpreter,
                ErrorKind::Syntax,
                format!("Branch site {} is outside of the definition.", site),
            )
        }
    };

    let offset = target as isize - site as isize;
    let node = interpreter.node(node_index)?;

    match &*node {
        WordNode::Branch { offset: slot } => *slot.borrow_mut() = offset,
        WordNode::BranchIf0 { offset: slot } => *slot.borrow_mut() = offset,
        WordNode::DoLoopHead { skip } => *skip.borrow_mut() = Some(offset),

        _ => {
            return forth_error(
                interpreter,
                ErrorKind::Syntax,
                format!("A {} node can not be patched.", node.kind_name()),
            )
        }
    }

    Ok(())
}

/// Pop the top control frame, or report which closing word was left dangling.
fn pop_control_frame(
    interpreter: &mut dyn Interpreter,
    closer: &str,
) -> error::Result<ControlFrame> {
    match interpreter.construction_mut()?.controls.pop() {
        Some(frame) => Ok(frame),
        None => forth_error(
            interpreter,
            ErrorKind::Syntax,
            format!("{} without a matching control structure.", closer),
        ),
    }
}

/// IF compiles a conditional forward branch taken when the top of the stack is zero.
fn word_if(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let site = emit_open_branch(interpreter, true)?;

    interpreter
        .construction_mut()?
        .controls
        .push(ControlFrame::If { site });

    Ok(())
}

/// ELSE closes the true branch with a jump over the false branch, and lands the IF here.
fn word_else(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let frame = pop_control_frame(interpreter, "ELSE")?;

    let if_site = match frame {
        ControlFrame::If { site } => site,
        other => {
            return forth_error(
                interpreter,
                ErrorKind::Syntax,
                format!("ELSE can not close an open {}.", other.structure_name()),
            )
        }
    };

    let else_site = emit_open_branch(interpreter, false)?;
    let here = interpreter.construction()?.here();

    patch_site(interpreter, if_site, here)?;

    interpreter
        .construction_mut()?
        .controls
        .push(ControlFrame::Else { site: else_site });

    Ok(())
}

/// THEN lands the open IF or ELSE branch here.
fn word_then(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let frame = pop_control_frame(interpreter, "THEN")?;

    let site = match frame {
        ControlFrame::If { site } => site,
        ControlFrame::Else { site } => site,
        other => {
            return forth_error(
                interpreter,
                ErrorKind::Syntax,
                format!("THEN can not close an open {}.", other.structure_name()),
            )
        }
    };

    let here = interpreter.construction()?.here();
    patch_site(interpreter, site, here)
}

/// BEGIN records a backward jump target.
fn word_begin(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let target = interpreter.construction()?.here();

    interpreter
        .construction_mut()?
        .controls
        .push(ControlFrame::Begin { target });

    Ok(())
}

/// AGAIN jumps back to the matching BEGIN unconditionally.
fn word_again(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let frame = pop_control_frame(interpreter, "AGAIN")?;

    match frame {
        ControlFrame::Begin { target } => emit_branch_back(interpreter, false, target),
        other => forth_error(
            interpreter,
            ErrorKind::Syntax,
            format!("AGAIN can not close an open {}.", other.structure_name()),
        ),
    }
}

/// UNTIL jumps back to the matching BEGIN while the top of the stack is zero.
fn word_until(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let frame = pop_control_frame(interpreter, "UNTIL")?;

    match frame {
        ControlFrame::Begin { target } => emit_branch_back(interpreter, true, target),
        other => forth_error(
            interpreter,
            ErrorKind::Syntax,
            format!("UNTIL can not close an open {}.", other.structure_name()),
        ),
    }
}

/// WHILE compiles the loop's exit test; its branch is landed by REPEAT.
fn word_while(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let begin_on_top = matches!(
        interpreter.construction()?.controls.last(),
        Some(ControlFrame::Begin { .. })
    );

    if !begin_on_top {
        return forth_error_str(interpreter, ErrorKind::Syntax, "WHILE without a BEGIN.");
    }

    let site = emit_open_branch(interpreter, true)?;

    interpreter
        .construction_mut()?
        .controls
        .push(ControlFrame::While { site });

    Ok(())
}

/// REPEAT jumps back to the BEGIN and lands the WHILE's exit branch here.
fn word_repeat(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let while_frame = pop_control_frame(interpreter, "REPEAT")?;

    let while_site = match while_frame {
        ControlFrame::While { site } => site,
        other => {
            return forth_error(
                interpreter,
                ErrorKind::Syntax,
                format!("REPEAT can not close an open {}.", other.structure_name()),
            )
        }
    };

    let begin_frame = pop_control_frame(interpreter, "REPEAT")?;

    let target = match begin_frame {
        ControlFrame::Begin { target } => target,
        other => {
            return forth_error(
                interpreter,
                ErrorKind::Syntax,
                format!("REPEAT can not close an open {}.", other.structure_name()),
            )
        }
    };

    emit_branch_back(interpreter, false, target)?;

    let here = interpreter.construction()?.here();
    patch_site(interpreter, while_site, here)
}

/// DO compiles the runtime loop setup; ?DO also guards against an empty range.
fn compile_do(interpreter: &mut dyn Interpreter, guarded: bool) -> error::Result<()> {
    let skip = if guarded { Some(0) } else { None };

    let node = interpreter.add_node(WordNode::DoLoopHead {
        skip: RefCell::new(skip),
    });

    let head = interpreter.construction()?.here();
    interpreter.compile_reference(node, None)?;

    interpreter
        .construction_mut()?
        .controls
        .push(ControlFrame::Do {
            head,
            exits: Vec::new(),
        });

    Ok(())
}

fn word_do(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    compile_do(interpreter, false)
}

fn word_question_do(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    compile_do(interpreter, true)
}

/// LOOP and +LOOP compile the runtime step and land every pending exit after it.
fn compile_loop_tail(
    interpreter: &mut dyn Interpreter,
    step_on_stack: bool,
) -> error::Result<()> {
    let closer = if step_on_stack { "+LOOP" } else { "LOOP" };
    let frame = pop_control_frame(interpreter, closer)?;

    let (head, exits) = match frame {
        ControlFrame::Do { head, exits } => (head, exits),
        other => {
            return forth_error(
                interpreter,
                ErrorKind::Syntax,
                format!("{} can not close an open {}.", closer, other.structure_name()),
            )
        }
    };

    let tail = interpreter.construction()?.here();
    let back = (head as isize + 1) - tail as isize;

    let node = interpreter.add_node(WordNode::DoLoopTail {
        back: RefCell::new(back),
        step_on_stack,
    });

    interpreter.compile_reference(node, None)?;

    let exit_target = interpreter.construction()?.here();

    for site in exits {
        patch_site(interpreter, site, exit_target)?;
    }

    // ?DO's guarded skip lands in the same place.  A plain DO has no skip to resolve.
    let head_node = interpreter.construction()?.body.get(head).copied();

    if let Some(head_node) = head_node {
        if let WordNode::DoLoopHead { skip } = &*interpreter.node(head_node)? {
            if skip.borrow().is_some() {
                patch_site(interpreter, head, exit_target)?;
            }
        }
    }

    Ok(())
}

fn word_loop(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    compile_loop_tail(interpreter, false)
}

fn word_plus_loop(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    compile_loop_tail(interpreter, true)
}

/// EXIT inside a counted loop drops the loop frame and jumps past LOOP; anywhere else it ends
/// the word.
fn word_exit(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let inside_do = interpreter
        .construction()?
        .controls
        .iter()
        .any(|frame| matches!(frame, ControlFrame::Do { .. }));

    if !inside_do {
        let node = interpreter.add_node(WordNode::Return);
        return interpreter.compile_reference(node, None);
    }

    let unloop = interpreter.add_node(WordNode::Unloop);
    interpreter.compile_reference(unloop, None)?;

    let site = emit_open_branch(interpreter, false)?;

    if let Some(ControlFrame::Do { exits, .. }) =
        interpreter.construction_mut()?.innermost_do()
    {
        exits.push(site);
    }

    Ok(())
}

/// CASE starts a selector, collecting the exit branch of every ENDOF.
fn word_case(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    interpreter
        .construction_mut()?
        .controls
        .push(ControlFrame::Case { exits: Vec::new() });

    Ok(())
}

/// OF compares the selector against the case value: `OVER = IF DROP` in one gesture.
fn word_of(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let case_on_top = matches!(
        interpreter.construction()?.controls.last(),
        Some(ControlFrame::Case { .. })
    );

    if !case_on_top {
        return forth_error_str(interpreter, ErrorKind::Syntax, "OF without a CASE.");
    }

    interpreter.compile_word_named("OVER", None)?;
    interpreter.compile_word_named("=", None)?;

    let site = emit_open_branch(interpreter, true)?;

    interpreter.compile_word_named("DROP", None)?;

    interpreter
        .construction_mut()?
        .controls
        .push(ControlFrame::Of { site });

    Ok(())
}

/// ENDOF jumps to the end of the CASE and lands the OF's test branch on the next clause.
fn word_endof(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let frame = pop_control_frame(interpreter, "ENDOF")?;

    let of_site = match frame {
        ControlFrame::Of { site } => site,
        other => {
            return forth_error(
                interpreter,
                ErrorKind::Syntax,
                format!("ENDOF can not close an open {}.", other.structure_name()),
            )
        }
    };

    let exit_site = emit_open_branch(interpreter, false)?;

    match interpreter.construction_mut()?.controls.last_mut() {
        Some(ControlFrame::Case { exits }) => exits.push(exit_site),
        _ => {
            return forth_error_str(interpreter, ErrorKind::Syntax, "ENDOF without a CASE.");
        }
    }

    let here = interpreter.construction()?.here();
    patch_site(interpreter, of_site, here)
}

/// ENDCASE drops the unmatched selector and lands every ENDOF exit after the drop.
fn word_endcase(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let frame = pop_control_frame(interpreter, "ENDCASE")?;

    let exits = match frame {
        ControlFrame::Case { exits } => exits,
        other => {
            return forth_error(
                interpreter,
                ErrorKind::Syntax,
                format!("ENDCASE can not close an open {}.", other.structure_name()),
            )
        }
    };

    interpreter.compile_word_named("DROP", None)?;

    let here = interpreter.construction()?.here();

    for site in exits {
        patch_site(interpreter, site, here)?;
    }

    Ok(())
}

/// Register the control flow compiling words and the loop index readers.
pub fn register_control_words(interpreter: &mut dyn Interpreter) {
    add_native_immediate_word!(
        interpreter,
        "IF",
        word_if,
        "Run the following words when the top of the stack is non-zero."
    );

    add_native_immediate_word!(
        interpreter,
        "ELSE",
        word_else,
        "Run the following words when the IF test failed."
    );

    add_native_immediate_word!(interpreter, "THEN", word_then, "Close an IF or ELSE.");

    add_native_immediate_word!(interpreter, "BEGIN", word_begin, "Open an unbounded loop.");

    add_native_immediate_word!(
        interpreter,
        "AGAIN",
        word_again,
        "Jump back to the matching BEGIN unconditionally."
    );

    add_native_immediate_word!(
        interpreter,
        "UNTIL",
        word_until,
        "Jump back to the matching BEGIN while the top of the stack is zero."
    );

    add_native_immediate_word!(
        interpreter,
        "WHILE",
        word_while,
        "Keep looping while the top of the stack is non-zero."
    );

    add_native_immediate_word!(
        interpreter,
        "REPEAT",
        word_repeat,
        "Close a BEGIN ... WHILE loop."
    );

    add_native_immediate_word!(
        interpreter,
        "DO",
        word_do,
        "Open a counted loop over the popped limit and start."
    );

    add_native_immediate_word!(
        interpreter,
        "?DO",
        word_question_do,
        "Open a counted loop, skipping it entirely when the range is empty."
    );

    add_native_immediate_word!(interpreter, "LOOP", word_loop, "Close a counted loop.");

    add_native_immediate_word!(
        interpreter,
        "+LOOP",
        word_plus_loop,
        "Close a counted loop, stepping by the popped value."
    );

    add_native_immediate_word!(
        interpreter,
        "EXIT",
        word_exit,
        "Leave the enclosing counted loop, or the word itself outside of one."
    );

    add_native_immediate_word!(interpreter, "CASE", word_case, "Open a selector.");

    add_native_immediate_word!(
        interpreter,
        "OF",
        word_of,
        "Run the following words when the selector matches the popped value."
    );

    add_native_immediate_word!(interpreter, "ENDOF", word_endof, "Close an OF clause.");

    add_native_immediate_word!(
        interpreter,
        "ENDCASE",
        word_endcase,
        "Close a selector, dropping an unmatched value."
    );

    // I and J are direct return stack readers rather than primitives, so the composite
    // execution loop can run them without any special casing.
    for (name, depth, comment) in [
        ("I", 0usize, "The index of the innermost counted loop."),
        ("J", 2usize, "The index of the next outer counted loop."),
    ] {
        let node = interpreter.add_node(WordNode::LoopIndex { depth });

        let entry = WordEntry::new(
            node,
            comment.to_string(),
            SourceLocation::new_from_info(file!(), line!() as usize, column!() as usize),
        );

        interpreter.insert_entry(name, entry);
    }
}
