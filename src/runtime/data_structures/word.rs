use crate::{
    lang::source_buffer::SourceLocation,
    runtime::{
        data_structures::cell::{Cell, SignedCell},
        interpreter::WordHandler,
    },
};
use std::{cell::RefCell, rc::Rc};

/// A stable handle into the node repository.  Composite bodies, dictionary entries, and the
/// address cells pushed by `'` all refer to words through these indices, never through pointers.
pub type NodeIndex = usize;

/// The body of a composite word.  The children are repository handles executed in order; the
/// locations run parallel to them and exist only for the debug tracer.
///
/// Bodies sit behind a RefCell because the composite node is reserved in the repository when `:`
/// is seen, but its children are only filled in when `;` installs the word.  After installation a
/// body is never modified again.
pub struct CompositeBody {
    pub children: Vec<NodeIndex>,
    pub locations: Vec<Option<SourceLocation>>,
}

impl CompositeBody {
    pub fn new() -> CompositeBody {
        CompositeBody {
            children: Vec::new(),
            locations: Vec::new(),
        }
    }

    pub fn from_parts(
        children: Vec<NodeIndex>,
        locations: Vec<Option<SourceLocation>>,
    ) -> CompositeBody {
        CompositeBody {
            children,
            locations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Default for CompositeBody {
    fn default() -> Self {
        Self::new()
    }
}

/// The progress of a CO_RANGE generator.  The first invocation pops the range parameters from the
/// data stack and moves the generator to Running; every later invocation either yields the next
/// value or quietly finishes.
pub enum RangeState {
    /// Waiting for the first call to pop (from, to, step) off the data stack.
    Unstarted,

    /// Producing values.  `next` is the value the next resumption will yield.
    Running {
        next: SignedCell,
        to: SignedCell,
        step: SignedCell,
    },

    /// The range is used up.  Further calls do nothing.
    Done,
}

/// The state of a cooperative fiber.  The fiber runs its captured child word up to `rotations`
/// times (forever when -1), popping a status cell after each run; a zero status terminates it.
/// When the wall clock time spent in one resumption exceeds the time slice, the fiber suspends
/// until the next scheduler tick.
pub struct Fiber {
    /// The repository handle of the captured child word.
    pub child: NodeIndex,

    /// How many times to run the child word, or -1 to run until the child leaves a zero.
    pub rotations: SignedCell,

    /// The time slice in milliseconds for one resumption.
    pub time_slice_ms: SignedCell,

    /// How many rotations have completed so far.
    pub iterations: SignedCell,

    /// Set when the fiber has finished; the scheduler sweeps done fibers from its queue.
    pub done: bool,
}

/// A shared handle to a fiber, held by both the fiber's word node and the scheduler queue.
pub type FiberRef = Rc<RefCell<Fiber>>;

/// One executable word.  Every variant obeys the same invocation contract: it takes no arguments
/// and produces no results, reading and writing the stacks instead.
///
/// The branch and loop variants only make sense inside a composite body, where the composite
/// execution loop interprets them directly; executing one on its own is an error.  Their offsets
/// sit behind RefCells because the compiler patches them in place while resolving forward
/// references.
pub enum WordNode {
    /// A built-in word backed by a Rust handler.
    Primitive { handler: Rc<WordHandler> },

    /// An ordered sequence of child words, run in order.
    Composite { body: RefCell<CompositeBody> },

    /// Pushes a baked-in cell.
    Literal { value: Cell },

    /// Pushes the address and length of an immutable text blob.
    CountedString { bytes: Vec<u8> },

    /// Pushes the address of a mutable byte buffer, resizable by ALLOT.
    ByteArray { bytes: RefCell<Vec<u8>> },

    /// An unconditional jump within the enclosing composite, as a relative body offset.
    Branch { offset: RefCell<isize> },

    /// A conditional jump taken when the popped cell is zero.
    BranchIf0 { offset: RefCell<isize> },

    /// Reads a loop counter from the return stack.  The peek depth is 0 for I and 2 for J,
    /// skipping the inner loop's limit.
    LoopIndex { depth: usize },

    /// Sets up a counted loop by moving (limit, index) to the return stack.  For ?DO the skip
    /// offset jumps past the loop when the index already equals the limit.
    DoLoopHead { skip: RefCell<Option<isize>> },

    /// Steps a counted loop.  The step is 1 for LOOP; +LOOP pops it from the data stack.
    DoLoopTail {
        back: RefCell<isize>,
        step_on_stack: bool,
    },

    /// Drops one loop frame from the return stack.  Compiled before the exit branch of an EXIT
    /// inside a counted loop.
    Unloop,

    /// Ends the execution of the enclosing composite.
    Return,

    /// The runtime half of a defining word: a creation branch that must CREATE a byte array, and
    /// the behavior branch attached to every word the defining word installs.
    Does {
        creation: NodeIndex,
        behavior: NodeIndex,
    },

    /// A lazy signed integer range generator.
    CoRange { state: RefCell<RangeState> },

    /// A time sliced cooperative task over a captured child word.
    CoFiber {
        child: NodeIndex,
        fiber: RefCell<Option<FiberRef>>,
    },
}

impl WordNode {
    /// A short name for the node's kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            WordNode::Primitive { .. } => "primitive",
            WordNode::Composite { .. } => "composite",
            WordNode::Literal { .. } => "literal",
            WordNode::CountedString { .. } => "counted-string",
            WordNode::ByteArray { .. } => "byte-array",
            WordNode::Branch { .. } => "branch",
            WordNode::BranchIf0 { .. } => "branch-if-0",
            WordNode::LoopIndex { .. } => "loop-index",
            WordNode::DoLoopHead { .. } => "loop-head",
            WordNode::DoLoopTail { .. } => "loop-tail",
            WordNode::Unloop => "unloop",
            WordNode::Return => "return",
            WordNode::Does { .. } => "does",
            WordNode::CoRange { .. } => "co-range",
            WordNode::CoFiber { .. } => "co-fiber",
        }
    }
}

/// The owning storage for every word node in the interpreter.  The repository is append only, so
/// handles stay stable for the life of the session; the single exception is the rollback of a
/// failed definition, which truncates back to the mark taken at its `:`.  Nothing outside the
/// failed definition can hold handles to the truncated tail.
pub struct NodeRepository {
    nodes: Vec<Rc<WordNode>>,
}

impl Default for NodeRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRepository {
    /// Create a new empty repository.
    pub fn new() -> NodeRepository {
        NodeRepository { nodes: Vec::new() }
    }

    /// Add a node and return its stable handle.
    pub fn push(&mut self, node: WordNode) -> NodeIndex {
        self.nodes.push(Rc::new(node));
        self.nodes.len() - 1
    }

    /// Look a node up by handle.  The Rc is cloned so the caller can execute the node while the
    /// repository continues to grow.
    pub fn get(&self, index: NodeIndex) -> Option<Rc<WordNode>> {
        self.nodes.get(index).cloned()
    }

    /// The handle the next pushed node will receive.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The most recently added node, used to verify that a defining word's creation branch
    /// actually performed a CREATE.
    pub fn last(&self) -> Option<Rc<WordNode>> {
        self.nodes.last().cloned()
    }

    /// Discard every node added since the mark.  Only used to roll back a failed definition.
    pub fn truncate(&mut self, mark: usize) {
        self.nodes.truncate(mark);
    }
}
