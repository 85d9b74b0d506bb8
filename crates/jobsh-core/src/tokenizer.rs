//! Command-line tokenizer.
//!
//! Splits one raw input line into an argument vector:
//! - Tokens are delimited by spaces; the trailing newline is a separator
//! - A token that begins with a single quote runs to the closing quote,
//!   spaces included, with the quotes stripped
//! - A final `&` token is removed and reported as a background request
//! - Line length and argument count are bounded

use std::iter::Peekable;
use std::str::Chars;

/// Maximum accepted command-line length in bytes.
pub const MAX_LINE: usize = 1024;

/// Maximum number of argument tokens per command line.
pub const MAX_ARGS: usize = 128;

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

/// Errors for tokenizing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum TokenizeError {
    /// Input line exceeds the line limit.
    #[error("command line too long: {length} bytes, limit is {limit}")]
    LineTooLong { length: usize, limit: usize },

    /// Input line produces more tokens than the argument limit.
    #[error("too many arguments: limit is {limit}")]
    TooManyArguments { limit: usize },
}

// ---------------------------------------------------------------------------
//  Parsed command line
// ---------------------------------------------------------------------------

/// A tokenized command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine {
    /// Argument tokens, program name first.
    pub tokens: Vec<String>,
    /// True if the command requested background execution (trailing `&`).
    pub background: bool,
}

impl CommandLine {
    /// True if the line produced no tokens (nothing to execute).
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// ---------------------------------------------------------------------------
//  Tokenizer
// ---------------------------------------------------------------------------

/// Tokenize a raw command line into an argument vector and background flag.
///
/// An empty line yields zero tokens and `background == false`. A line
/// consisting only of `&` also yields zero tokens, with the flag set.
pub fn tokenize(line: &str) -> Result<CommandLine, TokenizeError> {
    if line.len() > MAX_LINE {
        return Err(TokenizeError::LineTooLong {
            length: line.len(),
            limit: MAX_LINE,
        });
    }

    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        skip_separators(&mut chars);
        let Some(&ch) = chars.peek() else { break };

        let token = if ch == '\'' {
            chars.next();
            // A quote opening a token runs to the closing quote, spaces
            // included. With no closing quote the remainder is dropped.
            match scan_quoted(&mut chars) {
                Some(word) => word,
                None => break,
            }
        } else {
            scan_word(&mut chars)
        };

        if tokens.len() == MAX_ARGS {
            return Err(TokenizeError::TooManyArguments { limit: MAX_ARGS });
        }
        tokens.push(token);
    }

    let background = tokens.last().is_some_and(|last| last == "&");
    if background {
        tokens.pop();
    }

    Ok(CommandLine { tokens, background })
}

/// Consume spaces and the line terminator.
fn skip_separators(chars: &mut Peekable<Chars<'_>>) {
    while let Some(&c) = chars.peek() {
        if c == ' ' || c == '\n' {
            chars.next();
        } else {
            break;
        }
    }
}

/// Scan a quoted token; the opening quote is already consumed.
///
/// Returns `None` when the closing quote is missing.
fn scan_quoted(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut word = String::new();
    for c in chars {
        if c == '\'' {
            return Some(word);
        }
        word.push(c);
    }
    None
}

/// Scan an unquoted token up to the next separator.
fn scan_word(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c == ' ' || c == '\n' {
            break;
        }
        word.push(c);
        chars.next();
    }
    word
}

// ===========================================================================
//  Tests
// ===========================================================================
