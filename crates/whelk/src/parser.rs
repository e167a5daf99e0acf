//! Command-line tokenizer and pipeline parser.
//!
//! The grammar is deliberately small: words, single and double quotes,
//! backslash escapes, and three operators recognised outside quotes:
//! `|`, `>` and `>>`. There is no variable expansion and no globbing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while folding tokens into pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// An operator appeared where a word was required.
    #[error("syntax error near unexpected token `{0}`")]
    UnexpectedToken(String),
    /// A stage carried more than one output redirect.
    #[error("syntax error: multiple output redirects in command")]
    MultipleRedirects,
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word after quote and escape removal.
    Word(String),
    /// `|`
    Pipe,
    /// `>`
    Truncate,
    /// `>>`
    Append,
}

impl Token {
    fn as_text(&self) -> &str {
        match self {
            Token::Word(w) => w,
            Token::Pipe => "|",
            Token::Truncate => ">",
            Token::Append => ">>",
        }
    }
}

/// How a redirect opens its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    /// `>`: replace the file's content.
    Truncate,
    /// `>>`: append to the file's content.
    Append,
}

/// A stage's stdout redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    /// Open mode.
    pub mode: RedirectMode,
    /// Target path, resolved by the filesystem at execution time.
    pub path: String,
}

/// One pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Program name followed by its arguments. Never empty after parsing.
    pub argv: Vec<String>,
    /// Optional stdout redirect.
    pub redirect: Option<Redirect>,
}

impl ParsedCommand {
    /// A stage with the given argv and no redirect.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            redirect: None,
        }
    }
}

/// Split `input` into tokens.
///
/// Quotes group characters and hide operators; a backslash takes the next
/// character literally (also inside quotes). A trailing lone backslash is
/// kept as a literal `\`. Unterminated quotes run to the end of input.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Set when the current word had quotes, so `""` still yields a word.
    let mut quoted = false;
    let mut quote: Option<char> = None;
    let mut escaping = false;

    let flush = |tokens: &mut Vec<Token>, current: &mut String, quoted: &mut bool| {
        if !current.is_empty() || *quoted {
            tokens.push(Token::Word(std::mem::take(current)));
        }
        *quoted = false;
    };

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if escaping {
            current.push(c);
            escaping = false;
            continue;
        }
        if c == '\\' {
            escaping = true;
            continue;
        }
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                quoted = true;
            }
            '|' => {
                flush(&mut tokens, &mut current, &mut quoted);
                tokens.push(Token::Pipe);
            }
            '>' => {
                flush(&mut tokens, &mut current, &mut quoted);
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::Append);
                } else {
                    tokens.push(Token::Truncate);
                }
            }
            c if c.is_whitespace() => flush(&mut tokens, &mut current, &mut quoted),
            c => current.push(c),
        }
    }
    if escaping {
        current.push('\\');
    }
    flush(&mut tokens, &mut current, &mut quoted);
    tokens
}

/// Tokenize and render every token as text, operators included.
///
/// Used by programs that accept a command string (`su -c`, `bash -c`).
pub fn split_words(input: &str) -> Vec<String> {
    tokenize(input)
        .into_iter()
        .map(|t| match t {
            Token::Word(w) => w,
            other => other.as_text().to_string(),
        })
        .collect()
}

/// Parse a line into pipeline stages. Blank input yields no stages.
pub fn parse(input: &str) -> Result<Vec<ParsedCommand>, ParseError> {
    let tokens = tokenize(input);
    let mut stages = Vec::new();
    let mut current = ParsedCommand::default();

    let mut iter = tokens.into_iter().peekable();
    if iter.peek().is_none() {
        return Ok(stages);
    }
    while let Some(token) = iter.next() {
        match token {
            Token::Pipe => {
                if current.argv.is_empty() {
                    return Err(ParseError::UnexpectedToken("|".to_string()));
                }
                stages.push(std::mem::take(&mut current));
            }
            Token::Truncate | Token::Append => {
                if current.redirect.is_some() {
                    return Err(ParseError::MultipleRedirects);
                }
                let mode = if token == Token::Append {
                    RedirectMode::Append
                } else {
                    RedirectMode::Truncate
                };
                match iter.next() {
                    Some(Token::Word(path)) => current.redirect = Some(Redirect { mode, path }),
                    Some(op) => return Err(ParseError::UnexpectedToken(op.as_text().to_string())),
                    None => return Err(ParseError::UnexpectedToken("newline".to_string())),
                }
            }
            Token::Word(word) => current.argv.push(word),
        }
    }

    if current.argv.is_empty() {
        return Err(ParseError::UnexpectedToken("newline".to_string()));
    }
    stages.push(current);
    Ok(stages)
}
