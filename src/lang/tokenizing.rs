use crate::{
    lang::source_buffer::SourceLocation,
    runtime::error::{self, ErrorKind, ForthError},
};
use std::{
    collections::VecDeque,
    fmt::{self, Debug, Display, Formatter},
    fs::read_to_string,
};

/// A token is a whitespace delimited unit of the language.  Classification into numbers, words,
/// and text happens later, in the interpreter, because integer literals depend on the value of the
/// BASE variable at the moment the token is dispatched.
///
/// The token also holds the location in the original source code where it was found.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    name: String,
    location: SourceLocation,
}

/// A batch of tokens produced from one read of the input source.  The interpreter consumes tokens
/// from the front, and immediate words are allowed to consume the tokens that follow them.
pub type TokenStream = VecDeque<Token>;

/// Make sure that the tokens are nicely printable for debugging purposes.
impl Display for Token {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.name)
    }
}

impl Token {
    /// Create a new token from its text and the location it was found at.
    pub fn new(name: String, location: SourceLocation) -> Token {
        Token { name, location }
    }

    /// The raw text of the token.
    pub fn name(&self) -> &String {
        &self.name
    }

    /// Get the token's location in the original source text.
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Consume the token and keep only its text.
    pub fn into_name(self) -> String {
        self.name
    }
}

/// Check if the given character is considered whitespace.
fn is_whitespace(next: char) -> bool {
    next == ' ' || next == '\t' || next == '\r'
}

/// The colon and semicolon are only treated as delimiters when they stand alone, surrounded by
/// whitespace on both sides.  This way words like `BUFFER:` remain a single token.
fn is_standalone(line: &[char], index: usize) -> bool {
    let left_ok = index == 0 || is_whitespace(line[index - 1]);
    let right_ok = index + 1 >= line.len() || is_whitespace(line[index + 1]);

    left_ok && right_ok
}

/// Tokenize one line of source code, appending the found tokens to the stream.  A backslash
/// starting a token comments out the rest of the line.
fn tokenize_line(path: &str, line_number: usize, line: &str, stream: &mut TokenStream) {
    let chars: Vec<char> = line.chars().collect();
    let mut text = String::new();
    let mut start_column = 0;

    // Small helper to flush the accumulated text as a finished token.
    let mut flush = |text: &mut String, start_column: usize, stream: &mut TokenStream| {
        if !text.is_empty() {
            let location = SourceLocation::new_from_info(path, line_number, start_column);
            stream.push_back(Token::new(std::mem::take(text), location));
        }
    };

    for (index, &next) in chars.iter().enumerate() {
        let column = index + 1;

        if is_whitespace(next) {
            flush(&mut text, start_column, stream);
            continue;
        }

        // A backslash at the start of a token comments out the rest of the line.
        if next == '\\' && text.is_empty() {
            break;
        }

        if (next == ':' || next == ';') && text.is_empty() && is_standalone(&chars, index) {
            let location = SourceLocation::new_from_info(path, line_number, column);
            stream.push_back(Token::new(next.to_string(), location));
            continue;
        }

        if text.is_empty() {
            start_column = column;
        }

        text.push(next);
    }

    flush(&mut text, start_column, stream);
}

/// Tokenize source code from a string.  The path parameter is used to tag the tokens' locations,
/// for example the REPL uses "\<repl\>" for code entered by the user.
pub fn tokenize_source(path: &str, source: &str) -> TokenStream {
    let mut stream = TokenStream::new();

    for (index, line) in source.lines().enumerate() {
        tokenize_line(path, index + 1, line, &mut stream);
    }

    stream
}

/// Load the code from a file and then tokenize it.  The tokens are tagged with the file's path so
/// that errors found while executing them can point back at the file.
pub fn tokenize_file(path: &str) -> error::Result<TokenStream> {
    match read_to_string(path) {
        Ok(source) => Ok(tokenize_source(path, &source)),
        Err(error) => Err(ForthError::new(
            ErrorKind::Io,
            None,
            format!("Could not read file {}: {}.", path, error),
            None,
        )),
    }
}

/// Check whether the token batch leaves a `:` definition open.  The REPL uses this to keep reading
/// input lines until the closing `;` arrives, so definitions can span multiple lines.
pub fn has_open_definition(tokens: &TokenStream) -> bool {
    let mut open = false;

    for token in tokens.iter() {
        match token.name().as_str() {
            ":" => open = true,
            ";" => open = false,
            _ => {}
        }
    }

    open
}
