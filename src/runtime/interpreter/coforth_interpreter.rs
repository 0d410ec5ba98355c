use crate::{
    lang::{
        compilation::Construction,
        source_buffer::SourceLocation,
        tokenizing::{tokenize_file, tokenize_source, Token, TokenStream},
    },
    runtime::{
        data_structures::{
            cell::{
                canonical_name, cell_from_int, cell_to_float, cell_to_int, decode_address,
                encode_address, Cell, FloatCell, SignedCell, CELL_BYTES, FALSE_CELL,
            },
            dictionary::{Dictionary, WordEntry},
            stack::Stack,
            word::{
                CompositeBody, Fiber, FiberRef, NodeIndex, NodeRepository, RangeState, WordNode,
            },
        },
        debug::{NullTracer, TraceAction, Tracer},
        error::{self, forth_error, forth_error_str, ErrorKind, ForthError},
        interpreter::{
            CallItem, CallStack, CodeManagement, Interpreter, InterpreterStack, WordHandler,
            WordManagement,
        },
    },
};
use lazy_static::lazy_static;
use regex::Regex;
use std::{cell::RefCell, io::Write, rc::Rc, time::Instant};

lazy_static! {
    // Integer literals are checked against the current BASE; the 0x prefix is accepted in any
    // base.  Floats always require a dot, otherwise every integer would parse as one.
    static ref HEX_PREFIXED: Regex = Regex::new(r"^[+-]?0[xX][0-9a-fA-F]+$").unwrap();
    static ref BIN_LITERAL: Regex = Regex::new(r"^[+-]?[01]+$").unwrap();
    static ref OCT_LITERAL: Regex = Regex::new(r"^[+-]?[0-7]+$").unwrap();
    static ref DEC_LITERAL: Regex = Regex::new(r"^[+-]?[0-9]+$").unwrap();
    static ref HEX_LITERAL: Regex = Regex::new(r"^[+-]?[0-9a-fA-F]+$").unwrap();
    static ref FLOAT_LITERAL: Regex =
        Regex::new(r"^[+-]?([0-9]+\.[0-9]*([eE][+-]?[0-9]+)?|\.[0-9]+([eE][+-]?[0-9]+)?)$")
            .unwrap();
}

/// The core implementation of the interpreter-compiler.  One instance owns every process wide
/// resource: both stacks, the dictionary, the node repository, the fiber scheduler, and the
/// output stream.  Multiple instances are fully independent.
pub struct CoforthInterpreter {
    /// The data stack used by all words.
    data_stack: Stack<Cell>,

    /// The return stack, holding loop frames and values moved by >R.
    return_stack: Stack<Cell>,

    /// The dictionary of words known by the interpreter.
    dictionary: Dictionary,

    /// The owning storage for every word node, named or anonymous.
    repository: NodeRepository,

    /// The stack of token batches being processed.  Immediate words consume their following
    /// tokens from the top entry.
    token_contexts: Vec<TokenStream>,

    /// The definition currently being compiled, if any.
    construction: Option<Construction>,

    /// Set while `[` has temporarily dropped us back into interpretation.
    compile_suspended: bool,

    /// The last known location execution has reached in the original source code.
    current_location: Option<SourceLocation>,

    /// The call stack used to keep track of the current execution context.
    call_stack: CallStack,

    /// The most recently created byte array, operated on by ALLOT and `,`.
    latest_array: Option<NodeIndex>,

    /// The cooperative fiber ready queue, pumped between REPL reads.
    scheduler: Vec<FiberRef>,

    /// The debug tracer hook and its on/off switch.
    tracer: Box<dyn Tracer>,
    debug_on: bool,

    /// The output stream written to by the IO words.
    output: Box<dyn Write>,
}

impl Default for CoforthInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl CoforthInterpreter {
    /// Create a new interpreter writing to standard output.
    pub fn new() -> CoforthInterpreter {
        CoforthInterpreter::with_output(Box::new(std::io::stdout()))
    }

    /// Create a new interpreter writing to the given sink.  Tests use this to capture the
    /// output of words like `.` and TYPE.
    pub fn with_output(output: Box<dyn Write>) -> CoforthInterpreter {
        CoforthInterpreter {
            data_stack: Stack::with_capacity(32),
            return_stack: Stack::with_capacity(32),
            dictionary: Dictionary::new(),
            repository: NodeRepository::new(),
            token_contexts: Vec::new(),
            construction: None,
            compile_suspended: false,
            current_location: None,
            call_stack: CallStack::with_capacity(32),
            latest_array: None,
            scheduler: Vec::new(),
            tracer: Box::new(NullTracer),
            debug_on: false,
            output,
        }
    }

    /// Replace the debug tracer.  The REPL installs the interactive console tracer here.
    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer>) {
        self.tracer = tracer;
    }
}

// Private helpers for token dispatch and literal handling.
impl CoforthInterpreter {
    /// Run the tokens in the top context until it is exhausted.
    fn run_current_context(&mut self) -> error::Result<()> {
        loop {
            let token = match self.token_contexts.last_mut() {
                Some(context) => match context.pop_front() {
                    Some(token) => token,
                    None => break,
                },
                None => break,
            };

            self.dispatch_token(token)?;
        }

        Ok(())
    }

    /// Classify and act on a single token, per the current mode.
    fn dispatch_token(&mut self, token: Token) -> error::Result<()> {
        self.current_location = Some(token.location().clone());

        let mut canonical = canonical_name(token.name());

        // The debugger switch pre-empts everything, in either mode.
        if canonical == "DEBUGGER" {
            return self.process_debugger_switch();
        }

        self.trace_word(token.name(), Some(token.location().clone()))?;

        // CREATE is rewritten to [CREATE] and then handled as a normal word.  This applies in
        // both modes so that CREATE can be compiled into a defining word's creation branch.
        if canonical == "CREATE" {
            canonical = "[CREATE]".to_string();
        }

        if self.is_compiling() {
            self.compile_token(token, canonical)
        } else {
            self.interpret_token(token, canonical)
        }
    }

    /// Handle one token in interpretation mode.
    fn interpret_token(&mut self, token: Token, canonical: String) -> error::Result<()> {
        // The context sequences consume a fixed number of following tokens before normal
        // classification gets a chance.
        match canonical.as_str() {
            "FIND" => return self.process_find(),
            "'" => return self.process_tick(),
            "TO" => return self.process_to(),
            "CHAR" => return self.process_char(),
            _ => {}
        }

        if let Some(value) = self.parse_integer(token.name())? {
            self.push(cell_from_int(value));
            return Ok(());
        }

        if let Some(value) = parse_float(token.name()) {
            self.push(value.to_bits());
            return Ok(());
        }

        if let Some(entry) = self.dictionary.get(&canonical) {
            let entry = entry.clone();

            if entry.defining {
                return self.process_defining_word(&token, &entry);
            }

            return self.execute_entry(token.name(), token.location().clone(), &entry);
        }

        forth_error(
            self,
            ErrorKind::Undefined,
            format!("Unknown word {}.", token.name()),
        )
    }

    /// Handle one token in compilation mode.
    fn compile_token(&mut self, token: Token, canonical: String) -> error::Result<()> {
        let location = Some(token.location().clone());

        // The name of the word under construction resolves to its own reserved handle, even when
        // an older definition of the same name exists.  This is how recursion compiles.
        if let Ok(construction) = self.construction() {
            if canonical_name(&construction.name) == canonical {
                let self_index = construction.self_index;
                return self.compile_reference(self_index, location);
            }
        }

        if let Some(entry) = self.dictionary.get(&canonical) {
            let entry = entry.clone();

            if entry.immediate {
                return self.execute_entry(token.name(), token.location().clone(), &entry);
            }

            return self.compile_reference(entry.node, location);
        }

        if let Some(value) = self.parse_integer(token.name())? {
            let literal = self.add_node(WordNode::Literal {
                value: cell_from_int(value),
            });
            return self.compile_reference(literal, location);
        }

        if let Some(value) = parse_float(token.name()) {
            let literal = self.add_node(WordNode::Literal {
                value: value.to_bits(),
            });
            return self.compile_reference(literal, location);
        }

        forth_error(
            self,
            ErrorKind::Undefined,
            format!("Unknown word {}.", token.name()),
        )
    }

    /// Try to read the token as an integer literal in the current base.  The 0x prefix forces
    /// base 16 regardless of BASE.  A token that looks numeric but fails to convert is a parse
    /// error rather than an unknown word.
    fn parse_integer(&self, text: &str) -> error::Result<Option<SignedCell>> {
        if HEX_PREFIXED.is_match(text) {
            let cleaned = text.replacen("0x", "", 1).replacen("0X", "", 1);

            return match SignedCell::from_str_radix(&cleaned, 16) {
                Ok(value) => Ok(Some(value)),
                Err(_) => forth_error_str(
                    self,
                    ErrorKind::Parse,
                    "Wrong format of the integer literal.",
                ),
            };
        }

        let base = self.base();

        let matches = match base {
            2 => BIN_LITERAL.is_match(text),
            8 => OCT_LITERAL.is_match(text),
            16 => HEX_LITERAL.is_match(text),
            _ => DEC_LITERAL.is_match(text),
        };

        if !matches {
            return Ok(None);
        }

        match SignedCell::from_str_radix(text, base) {
            Ok(value) => Ok(Some(value)),
            Err(_) => forth_error_str(
                self,
                ErrorKind::Parse,
                "Wrong format of the integer literal.",
            ),
        }
    }

    /// Execute a found dictionary entry, keeping the call stack in sync for error reports.
    fn execute_entry(
        &mut self,
        name: &str,
        location: SourceLocation,
        entry: &WordEntry,
    ) -> error::Result<()> {
        self.call_stack_push(name.to_string(), location);

        let result = self.execute_node(entry.node);

        self.call_stack_pop();
        result
    }

    /// DEBUGGER must be followed by ON or OFF.
    fn process_debugger_switch(&mut self) -> error::Result<()> {
        let missing = "Missing 'ON' or 'OFF' in DEBUGGER command.";

        let token = match self.next_token() {
            Ok(token) => token,
            Err(_) => return forth_error_str(self, ErrorKind::Syntax, missing),
        };

        match canonical_name(token.name()).as_str() {
            "ON" => self.debug_on = true,
            "OFF" => self.debug_on = false,
            _ => return forth_error_str(self, ErrorKind::Syntax, missing),
        }

        Ok(())
    }

    /// FIND prints whether the following word exists, along with its comment.
    fn process_find(&mut self) -> error::Result<()> {
        let token = match self.next_token() {
            Ok(token) => token,
            Err(_) => return forth_error_str(self, ErrorKind::Syntax, "Syntax missing word name."),
        };

        let message = match self.dictionary.get(token.name()) {
            Some(entry) => format!(
                "Word {} found ==> ( {} ){}\n",
                token.name(),
                entry.comment,
                if entry.immediate { "\t\timmediate" } else { "" }
            ),
            None => format!("Unknown word {}\n", token.name()),
        };

        self.output.write_all(message.as_bytes())?;
        Ok(())
    }

    /// `'` pushes the dictionary address of the following word, a stable repository handle.
    fn process_tick(&mut self) -> error::Result<()> {
        let token = match self.next_token() {
            Ok(token) => token,
            Err(_) => return forth_error_str(self, ErrorKind::Syntax, "Syntax missing word name."),
        };

        match self.dictionary.get(token.name()) {
            Some(entry) => {
                let address = encode_address(entry.node, 0);
                self.push(address);
                Ok(())
            }

            None => forth_error(
                self,
                ErrorKind::Undefined,
                format!("Unknown word {}.", token.name()),
            ),
        }
    }

    /// TO pops a cell and stores it into the cell sized head of the following variable.
    fn process_to(&mut self) -> error::Result<()> {
        let token = match self.next_token() {
            Ok(token) => token,
            Err(_) => {
                return forth_error_str(self, ErrorKind::Syntax, "Syntax missing variable name.")
            }
        };

        let value = self.pop()?;
        let entry = match self.dictionary.get(token.name()) {
            Some(entry) => entry.clone(),
            None => {
                return forth_error(
                    self,
                    ErrorKind::Undefined,
                    format!("Unknown word {}.", token.name()),
                )
            }
        };

        let array = match self.variable_array(entry.node) {
            Some(array) => array,
            None => {
                return forth_error(
                    self,
                    ErrorKind::Runtime,
                    format!("Word {} is not a variable.", token.name()),
                )
            }
        };

        if let WordNode::ByteArray { bytes } = &*array {
            let mut bytes = bytes.borrow_mut();

            if bytes.len() < CELL_BYTES {
                return forth_error(
                    self,
                    ErrorKind::Runtime,
                    format!("Word {} is not a cell sized variable.", token.name()),
                );
            }

            bytes[0..CELL_BYTES].copy_from_slice(&value.to_le_bytes());
        }

        Ok(())
    }

    /// CHAR pushes the ASCII code of the first character of the following token.
    fn process_char(&mut self) -> error::Result<()> {
        let token = match self.next_token() {
            Ok(token) => token,
            Err(_) => {
                return forth_error_str(
                    self,
                    ErrorKind::Syntax,
                    "Syntax CHAR should be followed by a text.",
                )
            }
        };

        match token.name().chars().next() {
            Some(first) => {
                self.push(first as Cell);
                Ok(())
            }
            None => forth_error_str(self, ErrorKind::Syntax, "Syntax CHAR found an empty token."),
        }
    }

    /// If the handle names a variable shaped word, a composite whose first child is a byte
    /// array, return that array node.
    fn variable_array(&self, node: NodeIndex) -> Option<Rc<WordNode>> {
        let composite = self.repository.get(node)?;

        if let WordNode::Composite { body } = &*composite {
            let body = body.borrow();
            let first = *body.children.first()?;
            let array = self.repository.get(first)?;

            if let WordNode::ByteArray { .. } = &*array {
                return Some(array);
            }
        }

        None
    }

    /// The two phase protocol of a defining word: execute its creation branch, verify that it
    /// left a fresh byte array in the repository, then install a new word under the following
    /// name whose body is the array followed by the behavior branch.
    fn process_defining_word(
        &mut self,
        token: &Token,
        entry: &WordEntry,
    ) -> error::Result<()> {
        let name_token = match self.next_token() {
            Ok(name_token) => name_token,
            Err(_) => {
                return forth_error_str(
                    self,
                    ErrorKind::Syntax,
                    "Syntax missing name for the defining word.",
                )
            }
        };

        // A defining word built by DOES> is a composite holding a single Does node; [CREATE]
        // itself is a bare primitive.  Either way the creation part must perform a CREATE.
        let mut behavior: Option<NodeIndex> = None;
        let mut creation: Option<NodeIndex> = None;

        let node = self.node(entry.node)?;

        if let WordNode::Composite { body } = &*node {
            let body = body.borrow();

            if body.children.len() == 1 {
                if let WordNode::Does {
                    creation: creation_index,
                    behavior: behavior_index,
                } = &*self.node(body.children[0])?
                {
                    creation = Some(*creation_index);
                    behavior = Some(*behavior_index);
                }
            }
        }

        let mark = self.repository.len();

        match creation {
            Some(creation) => self.execute_node(creation)?,
            None => self.execute_node(entry.node)?,
        }

        // Drop an empty behavior branch, so plain variables do not pay for an extra call.
        if let Some(behavior_index) = behavior {
            if let WordNode::Composite { body } = &*self.node(behavior_index)? {
                if body.borrow().is_empty() {
                    behavior = None;
                }
            }
        }

        let array_index = self.repository.len().wrapping_sub(1);
        let created_array = self.repository.len() > mark
            && matches!(
                self.repository.get(array_index).as_deref(),
                Some(WordNode::ByteArray { .. })
            );

        if !created_array {
            return forth_error_str(
                self,
                ErrorKind::Runtime,
                "Missing CREATE action in the defining word.",
            );
        }

        let mut children = vec![array_index];

        if let Some(behavior_index) = behavior {
            children.push(behavior_index);
        }

        let locations = vec![None; children.len()];
        let composite = self.add_node(WordNode::Composite {
            body: RefCell::new(CompositeBody::from_parts(children, locations)),
        });

        let new_entry = WordEntry::new(
            composite,
            format!("DOES> {}", token.name()),
            name_token.location().clone(),
        );

        self.insert_entry(name_token.name(), new_entry);
        Ok(())
    }

    /// Call the debug tracer if it is switched on, and act on its answer.
    fn trace_word(
        &mut self,
        name: &str,
        location: Option<SourceLocation>,
    ) -> error::Result<()> {
        if !self.debug_on {
            return Ok(());
        }

        let base = self.base();
        let snapshot: Vec<Cell> = self.data_stack.data().to_vec();
        let action = self.tracer.on_word(name, location.as_ref(), &snapshot, base);

        match action {
            TraceAction::Continue => Ok(()),

            TraceAction::StopDebug => {
                self.debug_on = false;
                Ok(())
            }

            TraceAction::Abort => {
                forth_error_str(self, ErrorKind::Runtime, "DEBUGGING aborted by a user.")
            }
        }
    }
}

// The execution machinery: running nodes, composites, generators, and fibers.
impl CoforthInterpreter {
    /// Execute a single word node by dispatching on its kind.  The branch and loop variants are
    /// only meaningful inside a composite body and fail here.
    fn run_node(&mut self, index: NodeIndex, node: &Rc<WordNode>) -> error::Result<()> {
        match &**node {
            WordNode::Primitive { handler } => {
                let handler = handler.clone();
                handler(self)
            }

            WordNode::Composite { .. } => self.run_composite(node),

            WordNode::Literal { value } => {
                self.push(*value);
                Ok(())
            }

            WordNode::CountedString { bytes } => {
                self.push(encode_address(index, 0));
                self.push(bytes.len() as Cell);
                Ok(())
            }

            WordNode::ByteArray { .. } => {
                self.push(encode_address(index, 0));
                Ok(())
            }

            WordNode::LoopIndex { depth } => {
                let value = self.peek_return(*depth)?;
                self.push(value);
                Ok(())
            }

            WordNode::Does { creation, .. } => self.execute_node(*creation),

            WordNode::CoRange { state } => self.run_co_range(state),

            WordNode::CoFiber { child, fiber } => self.run_co_fiber(*child, fiber),

            _ => forth_error(
                self,
                ErrorKind::Runtime,
                format!(
                    "A {} node can not be executed outside of a composite.",
                    node.kind_name()
                ),
            ),
        }
    }

    /// Run a composite body.  The branch, loop, and return nodes are interpreted right here
    /// because they manipulate this loop's program counter; everything else is executed through
    /// the normal dispatch.
    fn run_composite(&mut self, node: &Rc<WordNode>) -> error::Result<()> {
        let body = match &**node {
            WordNode::Composite { body } => body.borrow(),
            _ => {
                return forth_error_str(self, ErrorKind::Runtime, "Expected a composite node.");
            }
        };

        let mut pc = 0usize;

        while pc < body.children.len() {
            let child_index = body.children[pc];

            if let Some(location) = body.locations.get(pc).and_then(|loc| loc.clone()) {
                self.current_location = Some(location);
            }

            let child = self.node(child_index)?;

            match &*child {
                WordNode::Branch { offset } => {
                    pc = self.branch_target(pc, *offset.borrow(), body.children.len())?;
                    continue;
                }

                WordNode::BranchIf0 { offset } => {
                    let flag = self.pop()?;

                    if flag == FALSE_CELL {
                        pc = self.branch_target(pc, *offset.borrow(), body.children.len())?;
                    } else {
                        pc += 1;
                    }

                    continue;
                }

                WordNode::DoLoopHead { skip } => {
                    let start = self.pop_as_int()?;
                    let limit = self.pop_as_int()?;
                    let skip = *skip.borrow();

                    if let Some(offset) = skip {
                        if start == limit {
                            pc = self.branch_target(pc, offset, body.children.len())?;
                            continue;
                        }
                    }

                    self.push_return(cell_from_int(limit));
                    self.push_return(cell_from_int(start));
                    pc += 1;
                    continue;
                }

                WordNode::DoLoopTail {
                    back,
                    step_on_stack,
                } => {
                    let step = if *step_on_stack { self.pop_as_int()? } else { 1 };

                    if *step_on_stack && step == 0 {
                        return forth_error_str(
                            self,
                            ErrorKind::Arithmetic,
                            "Loop with a zero step can not make progress.",
                        );
                    }

                    let index = cell_to_int(self.pop_return()?).wrapping_add(step);
                    let limit = cell_to_int(self.pop_return()?);

                    let continues =
                        (step >= 0 && index < limit) || (step < 0 && index > limit);

                    if continues {
                        self.push_return(cell_from_int(limit));
                        self.push_return(cell_from_int(index));
                        pc = self.branch_target(pc, *back.borrow(), body.children.len())?;
                    } else {
                        pc += 1;
                    }

                    continue;
                }

                WordNode::Unloop => {
                    let _ = self.pop_return()?;
                    let _ = self.pop_return()?;
                    pc += 1;
                    continue;
                }

                WordNode::Return => break,

                _ => {
                    self.run_node(child_index, &child)?;

                    // Report the executed child to the tracer.  The reverse name lookup is
                    // expensive, so it only happens while debugging.
                    if self.debug_on {
                        let name = self
                            .dictionary
                            .name_of_node(child_index)
                            .cloned()
                            .unwrap_or_default();

                        self.trace_word(&name, self.current_location.clone())?;
                    }

                    pc += 1;
                }
            }
        }

        Ok(())
    }

    /// Compute an absolute body position from a relative branch offset.
    fn branch_target(
        &self,
        pc: usize,
        offset: isize,
        body_len: usize,
    ) -> error::Result<usize> {
        let target = pc as isize + offset;

        if target < 0 || target as usize > body_len {
            return ForthError::new_as_result(
                ErrorKind::Runtime,
                self.current_location.clone(),
                format!("Invalid branch target {}.", target),
                Some(self.call_stack.clone()),
            );
        }

        Ok(target as usize)
    }

    /// One invocation of a CO_RANGE generator.  The first call pops (from, to, step), validates
    /// them, and yields the first value; later calls yield the following values until the range
    /// is used up, after which calls do nothing.
    fn run_co_range(&mut self, state: &RefCell<RangeState>) -> error::Result<()> {
        let current = {
            let state = state.borrow();

            match &*state {
                RangeState::Unstarted => None,
                RangeState::Running { next, to, step } => Some((*next, *to, *step)),
                RangeState::Done => return Ok(()),
            }
        };

        match current {
            None => {
                let step = self.pop_as_int()?;
                let to = self.pop_as_int()?;
                let from = self.pop_as_int()?;

                let progresses = (from < to && step > 0) || (from > to && step < 0);

                if !progresses {
                    return forth_error_str(
                        self,
                        ErrorKind::Runtime,
                        "Wrong iteration parameters when creating CO_RANGE.",
                    );
                }

                self.push(cell_from_int(from));
                *state.borrow_mut() = RangeState::Running {
                    next: from.wrapping_add(step),
                    to,
                    step,
                };
            }

            Some((next, to, step)) => {
                let yields = (step > 0 && next < to) || (step < 0 && next > to);

                if yields {
                    self.push(cell_from_int(next));
                    *state.borrow_mut() = RangeState::Running {
                        next: next.wrapping_add(step),
                        to,
                        step,
                    };
                } else {
                    *state.borrow_mut() = RangeState::Done;
                }
            }
        }

        Ok(())
    }

    /// One invocation of a CO_FIBER word.  The first call pops the rotation count and time
    /// slice and builds the fiber; later calls insert its handle into the scheduler's ready
    /// queue, at most once.
    fn run_co_fiber(
        &mut self,
        child: NodeIndex,
        fiber: &RefCell<Option<FiberRef>>,
    ) -> error::Result<()> {
        let existing = fiber.borrow().clone();

        match existing {
            None => {
                let time_slice = match self.pop_as_int() {
                    Ok(value) => value,
                    Err(_) => {
                        return forth_error_str(
                            self,
                            ErrorKind::Runtime,
                            "Unexpectedly empty stack when creating CO_FIBER.",
                        )
                    }
                };

                let rotations = match self.pop_as_int() {
                    Ok(value) => value,
                    Err(_) => {
                        return forth_error_str(
                            self,
                            ErrorKind::Runtime,
                            "Unexpectedly empty stack when creating CO_FIBER.",
                        )
                    }
                };

                if time_slice < 0 {
                    return forth_error_str(
                        self,
                        ErrorKind::Runtime,
                        "A fiber's time slice can not be negative.",
                    );
                }

                let new_fiber = Rc::new(RefCell::new(Fiber {
                    child,
                    rotations,
                    time_slice_ms: time_slice,
                    iterations: 0,
                    done: false,
                }));

                *fiber.borrow_mut() = Some(new_fiber);
                Ok(())
            }

            Some(handle) => {
                if !handle.borrow().done {
                    self.scheduler_enqueue(handle);
                }

                Ok(())
            }
        }
    }

    /// Resume a fiber for one scheduler tick.  The fiber runs its child word repeatedly until
    /// its rotations are used up, its child leaves a zero status, or its time slice runs out.
    fn resume_fiber(&mut self, fiber: &FiberRef) -> error::Result<()> {
        let (child, rotations, time_slice_ms) = {
            let fiber = fiber.borrow();
            (fiber.child, fiber.rotations, fiber.time_slice_ms)
        };

        let resumed = Instant::now();

        loop {
            let finished = {
                let fiber = fiber.borrow();
                fiber.done || (rotations != -1 && fiber.iterations >= rotations)
            };

            if finished {
                fiber.borrow_mut().done = true;
                break;
            }

            self.execute_node(child)?;

            let status = match self.pop() {
                Ok(status) => status,
                Err(_) => {
                    return forth_error_str(
                        self,
                        ErrorKind::Runtime,
                        "Unexpectedly empty stack - the fiber word should leave a status value 1/0 on the stack.",
                    )
                }
            };

            if status == FALSE_CELL {
                fiber.borrow_mut().done = true;
                break;
            }

            fiber.borrow_mut().iterations += 1;

            if resumed.elapsed().as_millis() >= time_slice_ms.max(0) as u128 {
                break;
            }
        }

        Ok(())
    }
}

impl InterpreterStack for CoforthInterpreter {
    fn stack(&self) -> &Stack<Cell> {
        &self.data_stack
    }

    fn return_stack(&self) -> &Stack<Cell> {
        &self.return_stack
    }

    fn push(&mut self, value: Cell) {
        self.data_stack.push(value);
    }

    fn pop(&mut self) -> error::Result<Cell> {
        match self.data_stack.pop() {
            Some(value) => Ok(value),
            None => forth_error_str(self, ErrorKind::Underflow, "Stack underflow."),
        }
    }

    fn pop_as_int(&mut self) -> error::Result<SignedCell> {
        Ok(cell_to_int(self.pop()?))
    }

    fn pop_as_float(&mut self) -> error::Result<FloatCell> {
        Ok(cell_to_float(self.pop()?))
    }

    fn pop_as_address(&mut self) -> error::Result<(usize, usize)> {
        Ok(decode_address(self.pop()?))
    }

    fn push_return(&mut self, value: Cell) {
        self.return_stack.push(value);
    }

    fn pop_return(&mut self) -> error::Result<Cell> {
        match self.return_stack.pop() {
            Some(value) => Ok(value),
            None => forth_error_str(self, ErrorKind::Underflow, "Return stack underflow."),
        }
    }

    fn peek_return(&self, depth: usize) -> error::Result<Cell> {
        match self.return_stack.peek(depth) {
            Some(value) => Ok(*value),
            None => ForthError::new_as_result(
                ErrorKind::Underflow,
                self.current_location.clone(),
                "Return stack underflow.".to_string(),
                Some(self.call_stack.clone()),
            ),
        }
    }

    fn clear_stacks(&mut self) {
        self.data_stack.clear();
        self.return_stack.clear();
    }
}

impl CodeManagement for CoforthInterpreter {
    fn next_token(&mut self) -> error::Result<Token> {
        let token = self
            .token_contexts
            .last_mut()
            .and_then(|context| context.pop_front());

        match token {
            Some(token) => Ok(token),
            None => forth_error_str(
                self,
                ErrorKind::Syntax,
                "Reading past the end of the token stream.",
            ),
        }
    }

    fn next_token_name(&mut self) -> error::Result<String> {
        Ok(self.next_token()?.into_name())
    }

    fn collect_quoted_text(&mut self) -> error::Result<String> {
        let mut parts: Vec<String> = Vec::new();

        loop {
            let token = match self.next_token() {
                Ok(token) => token,
                Err(_) => {
                    return forth_error_str(
                        self,
                        ErrorKind::Syntax,
                        "No closing \" found for the text literal.",
                    )
                }
            };

            let name = token.into_name();

            if let Some(stripped) = name.strip_suffix('"') {
                parts.push(stripped.to_string());
                break;
            }

            parts.push(name);
        }

        Ok(parts.join(" "))
    }

    fn is_compiling(&self) -> bool {
        self.construction.is_some() && !self.compile_suspended
    }

    fn construction(&self) -> error::Result<&Construction> {
        match &self.construction {
            Some(construction) => Ok(construction),
            None => ForthError::new_as_result(
                ErrorKind::Syntax,
                self.current_location.clone(),
                "Not currently compiling a definition.".to_string(),
                Some(self.call_stack.clone()),
            ),
        }
    }

    fn construction_mut(&mut self) -> error::Result<&mut Construction> {
        let location = self.current_location.clone();
        let call_stack = self.call_stack.clone();

        match &mut self.construction {
            Some(construction) => Ok(construction),
            None => ForthError::new_as_result(
                ErrorKind::Syntax,
                location,
                "Not currently compiling a definition.".to_string(),
                Some(call_stack),
            ),
        }
    }

    fn begin_construction(
        &mut self,
        name: String,
        location: SourceLocation,
    ) -> error::Result<()> {
        if self.construction.is_some() {
            return forth_error_str(
                self,
                ErrorKind::Syntax,
                "Already compiling a definition.",
            );
        }

        let repo_mark = self.repository.len();
        let self_index = self.repository.push(WordNode::Composite {
            body: RefCell::new(CompositeBody::new()),
        });

        self.construction = Some(Construction::new(name, location, self_index, repo_mark));
        self.compile_suspended = false;
        Ok(())
    }

    fn finish_construction(&mut self) -> error::Result<()> {
        if self.construction.is_none() {
            return forth_error_str(self, ErrorKind::Syntax, "Found ';' without a matching ':'.");
        }

        if let Some(frame) = self.construction().ok().and_then(|c| c.controls.last()) {
            let name = frame.structure_name();

            return forth_error(
                self,
                ErrorKind::Syntax,
                format!("Unresolved {} at the end of the definition.", name),
            );
        }

        let construction = match self.construction.take() {
            Some(construction) => construction,
            None => return Ok(()),
        };

        let (body, locations) = (construction.body, construction.locations);

        // A DOES> definition becomes a composite holding a single Does node, pairing the
        // creation branch split off earlier with the behavior compiled since.
        let (final_body, final_locations) = match construction.does_creation {
            Some(creation) => {
                let behavior = self.repository.push(WordNode::Composite {
                    body: RefCell::new(CompositeBody::from_parts(body, locations)),
                });

                let does = self.repository.push(WordNode::Does { creation, behavior });

                (vec![does], vec![None])
            }

            None => (body, locations),
        };

        if let Some(WordNode::Composite { body }) =
            self.repository.get(construction.self_index).as_deref()
        {
            *body.borrow_mut() = CompositeBody::from_parts(final_body, final_locations);
        }

        let mut entry = WordEntry::new(
            construction.self_index,
            construction.comment,
            construction.location,
        );

        entry.immediate = construction.immediate;
        entry.defining = construction.does_creation.is_some();
        entry.hidden = construction.hidden;

        self.dictionary.insert(&construction.name, entry);
        self.compile_suspended = false;
        Ok(())
    }

    fn set_compile_suspended(&mut self, suspended: bool) -> error::Result<()> {
        if self.construction.is_none() {
            return forth_error_str(
                self,
                ErrorKind::Syntax,
                "'[' and ']' are only allowed inside a definition.",
            );
        }

        self.compile_suspended = suspended;
        Ok(())
    }

    fn compile_reference(
        &mut self,
        node: NodeIndex,
        location: Option<SourceLocation>,
    ) -> error::Result<()> {
        self.construction_mut()?.push(node, location);
        Ok(())
    }

    fn compile_word_named(
        &mut self,
        name: &str,
        location: Option<SourceLocation>,
    ) -> error::Result<()> {
        match self.dictionary.get(name) {
            Some(entry) => {
                let node = entry.node;
                self.compile_reference(node, location)
            }

            None => forth_error(
                self,
                ErrorKind::Undefined,
                format!("Unknown word {}.", name),
            ),
        }
    }

    fn process_tokens(&mut self, tokens: TokenStream) -> error::Result<()> {
        self.token_contexts.push(tokens);

        let result = self.run_current_context();

        let _ = self.token_contexts.pop();

        // One more stop after the whole batch, so the tracer can show the final stack.
        if result.is_ok() && self.debug_on {
            self.trace_word("", None)?;
        }

        result
    }

    fn process_source(&mut self, path: &str, source: &str) -> error::Result<()> {
        let tokens = tokenize_source(path, source);
        self.process_tokens(tokens)
    }

    fn process_source_file(&mut self, path: &str) -> error::Result<()> {
        let tokens = tokenize_file(path)?;
        self.process_tokens(tokens)
    }
}

impl WordManagement for CoforthInterpreter {
    fn current_location(&self) -> &Option<SourceLocation> {
        &self.current_location
    }

    fn add_word(
        &mut self,
        file: String,
        line: usize,
        column: usize,
        name: String,
        handler: Rc<WordHandler>,
        comment: String,
        immediate: bool,
    ) {
        let location = SourceLocation::new_from_info(&file, line, column);
        let node = self.repository.push(WordNode::Primitive { handler });

        let mut entry = WordEntry::new(node, comment, location);
        entry.immediate = immediate;

        self.dictionary.insert(&name, entry);
    }

    fn insert_entry(&mut self, name: &str, entry: WordEntry) {
        self.dictionary.insert(name, entry);
    }

    fn find_word(&self, name: &str) -> Option<&WordEntry> {
        self.dictionary.get(name)
    }

    fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn add_node(&mut self, node: WordNode) -> NodeIndex {
        self.repository.push(node)
    }

    fn node(&self, index: NodeIndex) -> error::Result<Rc<WordNode>> {
        match self.repository.get(index) {
            Some(node) => Ok(node),
            None => ForthError::new_as_result(
                ErrorKind::Runtime,
                self.current_location.clone(),
                format!("Word handle {} not found.", index),
                Some(self.call_stack.clone()),
            ),
        }
    }

    fn repository_len(&self) -> usize {
        self.repository.len()
    }

    fn last_node(&self) -> Option<Rc<WordNode>> {
        self.repository.last()
    }

    fn execute_node(&mut self, index: NodeIndex) -> error::Result<()> {
        let node = self.node(index)?;
        self.run_node(index, &node)
    }

    fn execute_word_named(
        &mut self,
        location: &SourceLocation,
        name: &str,
    ) -> error::Result<()> {
        match self.dictionary.get(name) {
            Some(entry) => {
                let entry = entry.clone();
                self.execute_entry(name, location.clone(), &entry)
            }

            None => forth_error(
                self,
                ErrorKind::Undefined,
                format!("Unknown word {}.", name),
            ),
        }
    }

    fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    fn call_stack_push(&mut self, name: String, location: SourceLocation) {
        self.call_stack.push(CallItem::new(name, location));
    }

    fn call_stack_pop(&mut self) {
        let _ = self.call_stack.pop();
    }

    fn latest_array(&self) -> Option<NodeIndex> {
        self.latest_array
    }

    fn set_latest_array(&mut self, index: NodeIndex) {
        self.latest_array = Some(index);
    }
}

impl Interpreter for CoforthInterpreter {
    fn base(&self) -> u32 {
        // BASE is an ordinary variable; read its cell sized head if it has been defined.
        if let Some(entry) = self.dictionary.get("BASE") {
            if let Some(array) = self.variable_array(entry.node) {
                if let WordNode::ByteArray { bytes } = &*array {
                    let bytes = bytes.borrow();

                    if bytes.len() >= CELL_BYTES {
                        let mut head = [0u8; CELL_BYTES];
                        head.copy_from_slice(&bytes[0..CELL_BYTES]);

                        return match Cell::from_le_bytes(head) {
                            2 => 2,
                            8 => 8,
                            16 => 16,
                            _ => 10,
                        };
                    }
                }
            }
        }

        10
    }

    fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    fn scheduler_enqueue(&mut self, fiber: FiberRef) {
        let already_queued = self
            .scheduler
            .iter()
            .any(|queued| Rc::ptr_eq(queued, &fiber));

        if !already_queued {
            self.scheduler.push(fiber);
        }
    }

    fn pump_fibers(&mut self) -> error::Result<()> {
        let queue = std::mem::take(&mut self.scheduler);
        let mut survivors: Vec<FiberRef> = Vec::new();
        let mut result = Ok(());
        let mut fibers = queue.into_iter();

        for fiber in fibers.by_ref() {
            if fiber.borrow().done {
                continue;
            }

            let outcome = self.resume_fiber(&fiber);

            if !fiber.borrow().done {
                survivors.push(fiber);
            }

            if let Err(error) = outcome {
                result = Err(error);
                break;
            }
        }

        // Keep anything the failed resume left unvisited, plus any handles that were enqueued
        // while the queue was being pumped.
        for fiber in fibers {
            if !fiber.borrow().done {
                survivors.push(fiber);
            }
        }

        for fiber in std::mem::take(&mut self.scheduler) {
            let already_queued = survivors.iter().any(|queued| Rc::ptr_eq(queued, &fiber));

            if !already_queued && !fiber.borrow().done {
                survivors.push(fiber);
            }
        }

        self.scheduler = survivors;
        result
    }

    fn debug_mode(&self) -> bool {
        self.debug_on
    }

    fn set_debug_mode(&mut self, enabled: bool) {
        self.debug_on = enabled;
    }

    fn recover_from_error(&mut self, error: &ForthError) {
        // A fault in the middle of a definition discards the partial word and every node it
        // reserved, then drops back into interpretation.
        if let Some(construction) = self.construction.take() {
            self.repository.truncate(construction.repo_mark);
        }

        if let Some(latest) = self.latest_array {
            if latest >= self.repository.len() {
                self.latest_array = None;
            }
        }

        self.compile_suspended = false;

        if error.must_clear_stacks() {
            self.clear_stacks();
        }

        self.call_stack.clear();
    }

    fn reset(&mut self) {
        if let Some(construction) = self.construction.take() {
            self.repository.truncate(construction.repo_mark);
        }

        self.compile_suspended = false;
        self.clear_stacks();
        self.call_stack.clear();
    }
}

/// Try to read the token as a floating point literal.  A dot is always required, so integers are
/// never mistaken for floats.
fn parse_float(text: &str) -> Option<FloatCell> {
    if !FLOAT_LITERAL.is_match(text) {
        return None;
    }

    text.parse().ok()
}
