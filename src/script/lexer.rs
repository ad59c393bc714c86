//! Two-mode lexer for SmartScript templates.
//!
//! The lexer never switches modes on its own: the parser flips it into
//! [`LexerMode::Tag`] after an open-tag marker and back into
//! [`LexerMode::Text`] after a close-tag marker.

use std::fmt;

use crate::script::error::LexerError;

/// Marker that opens a tag in text mode.
pub const OPEN_TAG: &str = "{$";
/// Marker that closes a tag in tag mode.
pub const CLOSE_TAG: &str = "$}";

/// Lexical mode, selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexerMode {
    /// Raw document text between tags.
    #[default]
    Text,
    /// Inside a `{$ ... $}` tag.
    Tag,
}

/// Tag keywords. `for` and `end` are matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    For,
    End,
    /// The `=` that starts an echo tag.
    Echo,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("for") {
            Some(Keyword::For)
        } else if word.eq_ignore_ascii_case("end") {
            Some(Keyword::End)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::For => "FOR",
            Keyword::End => "END",
            Keyword::Echo => "=",
        }
    }
}

/// The four arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '*' => Some(Operator::Mul),
            '/' => Some(Operator::Div),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A single lexical unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal document text with escapes already collapsed.
    Text(String),
    OpenTag,
    CloseTag,
    Identifier(String),
    Keyword(Keyword),
    /// Function name without the leading `@`.
    Function(String),
    Operator(Operator),
    /// String literal with escapes already collapsed.
    Str(String),
    Integer(i64),
    Double(f64),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Text(text) => write!(f, "text {text:?}"),
            Token::OpenTag => f.write_str(OPEN_TAG),
            Token::CloseTag => f.write_str(CLOSE_TAG),
            Token::Identifier(name) => write!(f, "identifier `{name}`"),
            Token::Keyword(keyword) => write!(f, "keyword `{}`", keyword.as_str()),
            Token::Function(name) => write!(f, "function `@{name}`"),
            Token::Operator(op) => write!(f, "operator `{op}`"),
            Token::Str(value) => write!(f, "string {value:?}"),
            Token::Integer(value) => write!(f, "integer {value}"),
            Token::Double(value) => write!(f, "double {value}"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

/// Lazy token producer over a template source.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    cursor: usize,
    mode: LexerMode,
    current: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            mode: LexerMode::Text,
            current: None,
        }
    }

    pub fn set_mode(&mut self, mode: LexerMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> LexerMode {
        self.mode
    }

    /// The most recently produced token, if any.
    pub fn current_token(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    /// Byte offset of the next unread character.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Produce the next token in the current mode.
    ///
    /// Once [`Token::Eof`] has been returned, every further call fails with
    /// [`LexerError::Exhausted`].
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        if matches!(self.current, Some(Token::Eof)) {
            return Err(LexerError::Exhausted);
        }
        let token = match self.mode {
            LexerMode::Text => self.lex_text()?,
            LexerMode::Tag => self.lex_tag()?,
        };
        self.current = Some(token.clone());
        Ok(token)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn lex_text(&mut self) -> Result<Token, LexerError> {
        let rest = self.rest();
        if rest.is_empty() {
            return Ok(Token::Eof);
        }
        if rest.starts_with(OPEN_TAG) {
            self.cursor += OPEN_TAG.len();
            return Ok(Token::OpenTag);
        }

        let mut text = String::new();
        loop {
            let rest = self.rest();
            let Some(c) = rest.chars().next() else { break };
            if rest.starts_with(OPEN_TAG) {
                break;
            }
            if c == '\\' {
                let escaped = &rest[1..];
                if escaped.starts_with('\\') {
                    text.push('\\');
                } else if escaped.starts_with(OPEN_TAG) {
                    text.push('{');
                } else {
                    return Err(LexerError::InvalidEscape {
                        offset: self.cursor,
                    });
                }
                self.cursor += 2;
                continue;
            }
            text.push(c);
            self.cursor += c.len_utf8();
        }
        Ok(Token::Text(text))
    }

    fn lex_tag(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace();
        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            return Ok(Token::Eof);
        };

        if rest.starts_with(CLOSE_TAG) {
            self.cursor += CLOSE_TAG.len();
            return Ok(Token::CloseTag);
        }
        if c == '=' {
            self.cursor += 1;
            return Ok(Token::Keyword(Keyword::Echo));
        }
        if c.is_alphabetic() {
            let word = self.take_identifier();
            return Ok(match Keyword::from_word(word) {
                Some(keyword) => Token::Keyword(keyword),
                None => Token::Identifier(word.to_string()),
            });
        }
        if c == '@' {
            return self.lex_function();
        }
        if starts_number(rest) {
            return self.lex_number();
        }
        if c == '"' {
            return self.lex_string();
        }
        if let Some(op) = Operator::from_char(c) {
            self.cursor += 1;
            return Ok(Token::Operator(op));
        }

        Err(LexerError::UnexpectedCharacter {
            character: c,
            offset: self.cursor,
        })
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.cursor += rest.len() - trimmed.len();
    }

    /// Consume a letter-led run of alphanumerics and underscores.
    fn take_identifier(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !(c.is_alphanumeric() || c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.cursor += len;
        &rest[..len]
    }

    fn lex_function(&mut self) -> Result<Token, LexerError> {
        let at = self.cursor;
        self.cursor += 1;
        match self.rest().chars().next() {
            Some(c) if c.is_alphabetic() => {
                let name = self.take_identifier();
                Ok(Token::Function(name.to_string()))
            }
            _ => Err(LexerError::InvalidFunctionName { offset: at }),
        }
    }

    fn lex_number(&mut self) -> Result<Token, LexerError> {
        let start = self.cursor;
        let bytes = self.input.as_bytes();
        let mut end = start;
        if bytes.get(end) == Some(&b'-') {
            end += 1;
        }

        let mut seen_dot = false;
        while let Some(&b) = bytes.get(end) {
            match b {
                b'0'..=b'9' => end += 1,
                b'.' if !seen_dot => {
                    seen_dot = true;
                    end += 1;
                }
                b'.' => return Err(LexerError::MalformedNumber { offset: end }),
                _ => break,
            }
        }

        let literal = &self.input[start..end];
        self.cursor = end;
        if seen_dot {
            literal
                .parse::<f64>()
                .map(Token::Double)
                .map_err(|_| LexerError::MalformedNumber { offset: start })
        } else {
            literal
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| LexerError::MalformedNumber { offset: start })
        }
    }

    fn lex_string(&mut self) -> Result<Token, LexerError> {
        let start = self.cursor;
        let body = &self.input[start + 1..];
        let mut value = String::new();
        let mut chars = body.char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.cursor = start + 1 + i + 1;
                    return Ok(Token::Str(value));
                }
                '\\' => match chars.next() {
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, 't')) => value.push('\t'),
                    Some(_) => {
                        return Err(LexerError::InvalidEscape {
                            offset: start + 1 + i,
                        })
                    }
                    None => break,
                },
                other => value.push(other),
            }
        }

        Err(LexerError::UnterminatedString { offset: start })
    }
}

/// A digit, or a `.` followed by a digit, optionally after a leading `-`.
fn starts_number(rest: &str) -> bool {
    let unsigned = rest.strip_prefix('-').unwrap_or(rest);
    let bytes = unsigned.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_digit() => true,
        Some(b'.') => bytes.get(1).is_some_and(|b| b.is_ascii_digit()),
        _ => false,
    }
}
