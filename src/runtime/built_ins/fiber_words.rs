use crate::{
    add_native_immediate_word,
    runtime::{
        data_structures::word::{CompositeBody, RangeState, WordNode},
        error::{self},
        interpreter::Interpreter,
    },
};
use std::cell::RefCell;

/// CO_RANGE bakes a fresh generator instance into the definition being compiled.  Each
/// definition gets its own generator, so two range words never share progress.
///
/// The first call of the containing word pops (from, to, step) and yields the first value; every
/// later call yields the next value until the range is used up.
fn word_co_range(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let node = interpreter.add_node(WordNode::CoRange {
        state: RefCell::new(RangeState::Unstarted),
    });

    interpreter.compile_reference(node, None)
}

/// CO_FIBER captures the body compiled so far as the fiber's child word and replaces it with the
/// fiber node.  The literals pushed with `[ ... ]` stay on the data stack until the first call
/// pops them as the rotation count and time slice.
fn word_co_fiber(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let (children, locations) = interpreter.construction_mut()?.take_body();

    let child = interpreter.add_node(WordNode::Composite {
        body: RefCell::new(CompositeBody::from_parts(children, locations)),
    });

    let fiber = interpreter.add_node(WordNode::CoFiber {
        child,
        fiber: RefCell::new(None),
    });

    interpreter.compile_reference(fiber, None)
}

/// Register the generator and fiber words.
pub fn register_fiber_words(interpreter: &mut dyn Interpreter) {
    add_native_immediate_word!(
        interpreter,
        "CO_RANGE",
        word_co_range,
        "Bake a lazy integer range generator into the definition."
    );

    add_native_immediate_word!(
        interpreter,
        "CO_FIBER",
        word_co_fiber,
        "Capture the definition's body as a time sliced cooperative fiber."
    );
}
