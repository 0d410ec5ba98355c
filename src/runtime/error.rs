use crate::{
    lang::source_buffer::SourceLocation,
    runtime::interpreter::{CallStack, Interpreter},
};
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    process::{ExitCode, Termination},
};

pub type Result<T> = std::result::Result<T, ForthError>;

/// The broad classification of a failure.  The kind decides whether the stacks are cleared when
/// the error unwinds back to the REPL.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    /// A malformed integer or float literal in the current base.
    Parse,

    /// A context sequence missing its following token, a `;` without a `:`, or mismatched
    /// control flow words.
    Syntax,

    /// A word name that could not be found in the dictionary.
    Undefined,

    /// A stack pop on an empty stack.
    Underflow,

    /// Division by zero or a loop that can not make progress.
    Arithmetic,

    /// A fault raised while user code was running, such as ABORT" or a misused defining word.
    Runtime,

    /// A file could not be read.
    Io,
}

impl ErrorKind {
    /// Runtime faults reset both stacks on the way out; purely lexical faults leave them alone so
    /// that the user's data survives a typo.
    pub fn clears_stacks(self) -> bool {
        matches!(
            self,
            ErrorKind::Undefined | ErrorKind::Underflow | ErrorKind::Arithmetic | ErrorKind::Runtime
        )
    }
}

/// Any error that occurs while interpreting or compiling Forth code.
#[derive(Clone)]
pub struct ForthError {
    /// What class of failure this is.
    kind: ErrorKind,

    /// The location in the source code the error occurred, if available.
    location: Option<SourceLocation>,

    /// The description of the error.
    error: String,

    /// The script's call stack at the time of the error, if available.
    call_stack: Option<CallStack>,
}

impl Error for ForthError {}

/// When returned from main, convert the error result to an operating system exit code.
impl Termination for ForthError {
    /// Because this type represents an error, the exit code is always FAILURE.
    fn report(self) -> ExitCode {
        eprintln!("Error: {}", self);
        ExitCode::FAILURE
    }
}

/// Pretty print the error with its location and the script's call stack, when known.
impl Display for ForthError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}", location, self.error)?,
            None => write!(f, "{}", self.error)?,
        }

        if let Some(call_stack) = &self.call_stack {
            if !call_stack.is_empty() {
                write!(f, "\n\nCall stack\n")?;

                for item in call_stack.iter().rev() {
                    writeln!(f, "  {}", item)?;
                }
            }
        }

        Ok(())
    }
}

impl Debug for ForthError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl ForthError {
    /// Create a new ForthError.
    pub fn new(
        kind: ErrorKind,
        location: Option<SourceLocation>,
        error: String,
        call_stack: Option<CallStack>,
    ) -> ForthError {
        ForthError {
            kind,
            location,
            error,
            call_stack,
        }
    }

    /// Create a new ForthError and wrap it in a Result::Err.
    pub fn new_as_result<T>(
        kind: ErrorKind,
        location: Option<SourceLocation>,
        error: String,
        call_stack: Option<CallStack>,
    ) -> Result<T> {
        Err(ForthError::new(kind, location, error, call_stack))
    }

    /// The classification of the error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// If available, the location in the source code the error occurred.
    pub fn location(&self) -> &Option<SourceLocation> {
        &self.location
    }

    /// The description of the error.
    pub fn error(&self) -> &String {
        &self.error
    }

    /// If available, the script's call stack at the time of the error.
    pub fn call_stack(&self) -> &Option<CallStack> {
        &self.call_stack
    }

    /// Should the data and return stacks be cleared when this error reaches the REPL?
    pub fn must_clear_stacks(&self) -> bool {
        self.kind.clears_stacks()
    }
}

/// Allow for the conversion of a std::io::Error into a ForthError.
impl From<std::io::Error> for ForthError {
    fn from(error: std::io::Error) -> ForthError {
        ForthError::new(ErrorKind::Io, None, format!("I/O error: {}", error), None)
    }
}

/// A convenience function for creating a ForthError and wrapping it in a Result::Err using the
/// interpreter's current location and call stack.
pub fn forth_error<T>(
    interpreter: &dyn Interpreter,
    kind: ErrorKind,
    message: String,
) -> Result<T> {
    let location = interpreter.current_location().clone();
    let call_stack = interpreter.call_stack().clone();

    ForthError::new_as_result(kind, location, message, Some(call_stack))
}

pub fn forth_error_str<T>(
    interpreter: &dyn Interpreter,
    kind: ErrorKind,
    message: &str,
) -> Result<T> {
    forth_error(interpreter, kind, message.to_string())
}
