use crate::{
    lang::{
        compilation::Construction,
        source_buffer::SourceLocation,
        tokenizing::{Token, TokenStream},
    },
    runtime::{
        data_structures::{
            cell::{Cell, FloatCell, SignedCell},
            dictionary::{Dictionary, WordEntry},
            stack::Stack,
            word::{FiberRef, NodeIndex, WordNode},
        },
        error::{self, ForthError},
    },
};
use std::{
    fmt::{self, Display, Formatter},
    io::Write,
    rc::Rc,
};

pub mod coforth_interpreter;

/// A call stack item is a record of an executing word's name and the location within the original
/// source code where its execution was requested.  These items are read-only and the fields are
/// accessed by member functions.
#[derive(Clone)]
pub struct CallItem {
    location: SourceLocation,
    word: String,
}

impl CallItem {
    /// Create a new call stack item.
    pub fn new(word: String, location: SourceLocation) -> CallItem {
        CallItem { location, word }
    }

    /// Where in the source code was the execution of this word found?
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// The name of the word being executed.
    pub fn word(&self) -> &String {
        &self.word
    }
}

/// Make sure that this item can be nicely displayed to the user in the event of an error.
impl Display for CallItem {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.word)
    }
}

/// The stack of words currently being executed by the interpreter, used to give error reports a
/// script level stack trace.
pub type CallStack = Vec<CallItem>;

/// Definition of a word handler function.  This is the function that is called when a built-in
/// word is executed.  Can be a lambda, a callable object, or a plain Rust function.
pub type WordHandler = dyn Fn(&mut dyn Interpreter) -> error::Result<()>;

/// Trait for managing the interpreter's data and return stacks.  Intended to be called by word
/// handlers, both immediate and normal.
pub trait InterpreterStack {
    /// Use to examine the full data stack when required, for example for the .S dump word.
    fn stack(&self) -> &Stack<Cell>;

    /// Use to examine the full return stack.
    fn return_stack(&self) -> &Stack<Cell>;

    /// Push a cell onto the data stack.  This is the primary way of sending values to words.
    fn push(&mut self, value: Cell);

    /// Pop a cell from the data stack.  If the stack is empty an underflow error is returned.
    fn pop(&mut self) -> error::Result<Cell>;

    /// Pop the top cell reinterpreted as a signed integer.
    fn pop_as_int(&mut self) -> error::Result<SignedCell>;

    /// Pop the top cell reinterpreted as a float.  This is a bit reinterpretation, not a value
    /// conversion.
    fn pop_as_float(&mut self) -> error::Result<FloatCell>;

    /// Pop the top cell and split it into a repository handle and byte offset.
    fn pop_as_address(&mut self) -> error::Result<(usize, usize)>;

    /// Push a cell onto the return stack.
    fn push_return(&mut self, value: Cell);

    /// Pop a cell from the return stack.  If the stack is empty an underflow error is returned.
    fn pop_return(&mut self) -> error::Result<Cell>;

    /// Peek at a return stack cell without removing it.  Used by the loop index words.
    fn peek_return(&self, depth: usize) -> error::Result<Cell>;

    /// Drop everything on both stacks.
    fn clear_stacks(&mut self);
}

/// Trait for managing the incoming token stream and the compile time state of the word under
/// construction.
///
/// The token functions are how immediate words consume the tokens that follow them, which is what
/// makes the context sequences and the text collecting words work.
pub trait CodeManagement {
    /// Get the next token from the current token stream.
    fn next_token(&mut self) -> error::Result<Token>;

    /// Get the next token's text from the current token stream.
    fn next_token_name(&mut self) -> error::Result<String>;

    /// Collect the text of following tokens through the next token that ends with a double
    /// quote.  A single joining space is re-inserted between the consumed tokens, because the
    /// tokenizer stripped the original whitespace.
    fn collect_quoted_text(&mut self) -> error::Result<String>;

    /// Are we currently compiling a definition?  True between `:` and `;`, except while `[` has
    /// temporarily suspended compilation.
    fn is_compiling(&self) -> bool;

    /// Access the word definition currently under construction.
    fn construction(&self) -> error::Result<&Construction>;

    /// Access the word definition currently under construction as mutable.
    fn construction_mut(&mut self) -> error::Result<&mut Construction>;

    /// Start a new definition, reserving the word's composite node in the repository.
    fn begin_construction(
        &mut self,
        name: String,
        location: SourceLocation,
    ) -> error::Result<()>;

    /// Close the current definition and install it into the dictionary.
    fn finish_construction(&mut self) -> error::Result<()>;

    /// Temporarily leave or re-enter compile mode, for `[` and `]`.
    fn set_compile_suspended(&mut self, suspended: bool) -> error::Result<()>;

    /// Append a repository handle to the body of the definition under construction.
    fn compile_reference(
        &mut self,
        node: NodeIndex,
        location: Option<SourceLocation>,
    ) -> error::Result<()>;

    /// Look a word up by name and append its handle to the definition under construction.
    fn compile_word_named(
        &mut self,
        name: &str,
        location: Option<SourceLocation>,
    ) -> error::Result<()>;

    /// Run a batch of tokens through the interpreter.
    fn process_tokens(&mut self, tokens: TokenStream) -> error::Result<()>;

    /// Tokenize a source string and run it.  The path parameter tags the code in call stacks and
    /// error reports; the REPL uses "\<repl\>".
    fn process_source(&mut self, path: &str, source: &str) -> error::Result<()>;

    /// Read a file, tokenize it, and run it under its own source path.
    fn process_source_file(&mut self, path: &str) -> error::Result<()>;
}

/// Trait for managing and executing the words known to the interpreter.
pub trait WordManagement {
    /// If currently set, the location in the original source code being executed.
    fn current_location(&self) -> &Option<SourceLocation>;

    /// Add a new built-in word to the dictionary.  Use the macro `add_native_word!` to record the
    /// Rust source location the word was registered from.
    #[allow(clippy::too_many_arguments)]
    fn add_word(
        &mut self,
        file: String,
        line: usize,
        column: usize,
        name: String,
        handler: Rc<WordHandler>,
        comment: String,
        immediate: bool,
    );

    /// Insert a fully built dictionary entry.  This is the escape hatch for words that need the
    /// defining or hidden flags.
    fn insert_entry(&mut self, name: &str, entry: WordEntry);

    /// Find a word in the dictionary by name.
    fn find_word(&self, name: &str) -> Option<&WordEntry>;

    /// The dictionary of words known to the interpreter.
    fn dictionary(&self) -> &Dictionary;

    /// Add an anonymous node to the repository, returning its stable handle.
    fn add_node(&mut self, node: WordNode) -> NodeIndex;

    /// Look a node up by its handle.
    fn node(&self, index: NodeIndex) -> error::Result<Rc<WordNode>>;

    /// The handle the next added node will receive.
    fn repository_len(&self) -> usize;

    /// The most recently added node, if any.
    fn last_node(&self) -> Option<Rc<WordNode>>;

    /// Execute the node at the given handle.
    fn execute_node(&mut self, index: NodeIndex) -> error::Result<()>;

    /// Find and execute a word by name.  Supply a source location to represent where the word
    /// was executed from; use `location_here!()` when executing from native code.
    fn execute_word_named(
        &mut self,
        location: &SourceLocation,
        name: &str,
    ) -> error::Result<()>;

    /// The current script execution call stack.
    fn call_stack(&self) -> &CallStack;

    /// Push a new name and location onto the call stack.
    fn call_stack_push(&mut self, name: String, location: SourceLocation);

    /// Pop the last name and location from the call stack.
    fn call_stack_pop(&mut self);

    /// The most recently created byte array, the one ALLOT and `,` operate on.
    fn latest_array(&self) -> Option<NodeIndex>;

    /// Record a freshly created byte array as the latest one.
    fn set_latest_array(&mut self, index: NodeIndex);
}

/// Core interpreter trait, bringing together the stack, code, and word management traits along
/// with the interpreter-wide facilities: numeric base, output stream, the fiber scheduler, the
/// debug tracer toggle, and error recovery.
pub trait Interpreter: InterpreterStack + CodeManagement + WordManagement {
    /// The current numeric base for integer literals and numeric output, read from the BASE
    /// variable.  Defaults to 10 when BASE is not defined.
    fn base(&self) -> u32;

    /// The output stream written to by `.`, EMIT, TYPE, and friends.
    fn output(&mut self) -> &mut dyn Write;

    /// Insert a fiber handle into the scheduler's ready queue.  Inserting the same handle twice
    /// is a no-op.
    fn scheduler_enqueue(&mut self, fiber: FiberRef);

    /// Resume every fiber in the ready queue once, sweeping out the completed ones.  Called by
    /// the REPL between reads.
    fn pump_fibers(&mut self) -> error::Result<()>;

    /// Is the interactive debug tracer switched on?
    fn debug_mode(&self) -> bool;

    /// Switch the interactive debug tracer on or off.
    fn set_debug_mode(&mut self, enabled: bool);

    /// Put the interpreter back into a usable state after an error has unwound to the REPL.
    /// Discards any definition in progress, and clears the stacks when the error calls for it.
    fn recover_from_error(&mut self, error: &ForthError);

    /// Reset the interpreter: clear both stacks and abandon any definition in progress.
    fn reset(&mut self);
}

/// Simplify registering a native word with the interpreter.
///
/// Required parameters are the interpreter instance to register with, the name of the word, the
/// word's handler function, and a short comment describing the word.
#[macro_export]
macro_rules! add_native_word {
    (
        $interpreter:expr ,
        $name:expr ,
        $function:expr ,
        $comment:expr
    ) => {{
        use std::rc::Rc;

        // Register the word while recording where in the Rust source code the word was
        // registered from.
        $interpreter.add_word(
            file!().to_string(),
            line!() as usize,
            column!() as usize,
            $name.to_string(),
            Rc::new($function),
            $comment.to_string(),
            false,
        );
    }};
}

/// Simplify registering a native immediate word with the interpreter.  That is, a word intended
/// to be executed at compile time.
#[macro_export]
macro_rules! add_native_immediate_word {
    (
        $interpreter:expr ,
        $name:expr ,
        $function:expr ,
        $comment:expr
    ) => {{
        use std::rc::Rc;

        // Register the word while recording where in the Rust source code the word was
        // registered from.
        $interpreter.add_word(
            file!().to_string(),
            line!() as usize,
            column!() as usize,
            $name.to_string(),
            Rc::new($function),
            $comment.to_string(),
            true,
        );
    }};
}
