//! # Shell-like Lexing Utilities
//!
//! Splits a command line into program arguments following POSIX shell quoting rules, without
//! handing the line to a shell. Variables, globs, pipes, and redirections are therefore passed
//! through literally.

use thiserror::Error;

/// Errors produced while splitting a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated {quote} quote starting at byte {position}")]
    UnterminatedQuote { quote: char, position: usize },

    #[error("command line ends with an unfinished escape")]
    TrailingEscape,
}

/// Split a command line into words.
///
/// Supports single quotes (fully literal), double quotes (where a backslash escapes only
/// `"`, `\`, `$`, `` ` `` and newline), and backslash escapes outside quotes. Adjacent quoted
/// and unquoted segments join into one word, and `''` produces an empty word.
///
/// # Arguments
/// * `input` - The raw command line
///
/// # Returns
/// The words with quotes removed and escapes applied
///
/// # Example
/// ```rust
/// use rigger_util::shell_lexing::split_command_line;
///
/// let words = split_command_line("echo 'this is a test'").unwrap();
/// assert_eq!(words, vec!["echo", "this is a test"]);
///
/// let words = split_command_line(r#"echo Don\'t "Panic: $HOME""#).unwrap();
/// assert_eq!(words, vec!["echo", "Don't", "Panic: $HOME"]);
/// ```
pub fn split_command_line(input: &str) -> Result<Vec<String>, LexError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut characters = input.char_indices().peekable();

    while let Some((position, character)) = characters.next() {
        match character {
            '\\' => {
                let (_, escaped) = characters.next().ok_or(LexError::TrailingEscape)?;
                // A backslash-newline pair is a line continuation.
                if escaped != '\n' {
                    current.push(escaped);
                    in_word = true;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match characters.next() {
                        Some((_, '\'')) => break,
                        Some((_, quoted)) => current.push(quoted),
                        None => return Err(LexError::UnterminatedQuote { quote: '\'', position }),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match characters.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match characters.peek().copied() {
                            Some((_, escaped @ ('"' | '\\' | '$' | '`'))) => {
                                characters.next();
                                current.push(escaped);
                            }
                            Some((_, '\n')) => {
                                characters.next();
                            }
                            Some(_) => current.push('\\'),
                            None => return Err(LexError::UnterminatedQuote { quote: '"', position }),
                        },
                        Some((_, quoted)) => current.push(quoted),
                        None => return Err(LexError::UnterminatedQuote { quote: '"', position }),
                    }
                }
            }
            whitespace if whitespace.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            other => {
                current.push(other);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}
