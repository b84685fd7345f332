//! Text key-value documents, as embedded in model descriptors and collision files.
//!
//! ```text
//! solid
//! {
//!     "index" "0"
//!     "name"  "pelvis"   // bare words are allowed too
//! }
//! ```
//!
//! A document is an implicit top-level group. Values are kept as strings and parsed on demand.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Primitive(String),
    Group(Vec<(String, KeyValue)>),
    Array(Vec<KeyValue>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValuesError {
    UnexpectedCharacter { line: usize, character: char },
    UnterminatedString { line: usize },
    UnexpectedToken { line: usize, found: String },
    UnexpectedEnd,
}

impl Display for KeyValuesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KeyValuesError::UnexpectedCharacter { line, character } => {
                write!(f, "Unexpected {:?} at line {}", character, line)
            }
            KeyValuesError::UnterminatedString { line } => {
                write!(f, "Unterminated string starting at line {}", line)
            }
            KeyValuesError::UnexpectedToken { line, found } => {
                write!(f, "Unexpected {} at line {}", found, line)
            }
            KeyValuesError::UnexpectedEnd => write!(f, "Unexpected end of document"),
        }
    }
}

impl Error for KeyValuesError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Text(String),
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Token::Open => write!(f, "'{{'"),
            Token::Close => write!(f, "'}}'"),
            Token::Text(text) => write!(f, "{:?}", text),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, KeyValuesError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut chars = text.chars().peekable();
    while let Some(character) = chars.next() {
        match character {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '{' => tokens.push((line, Token::Open)),
            '}' => tokens.push((line, Token::Close)),
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '"' => {
                let start = line;
                let mut value = String::new();
                loop {
                    match chars.next() {
                        None => return Err(KeyValuesError::UnterminatedString { line: start }),
                        Some('"') => break,
                        Some('\\') if chars.peek() == Some(&'"') => {
                            chars.next();
                            value.push('"');
                        }
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            value.push(c);
                        }
                    }
                }
                tokens.push((start, Token::Text(value)));
            }
            c if c.is_control() => {
                return Err(KeyValuesError::UnexpectedCharacter { line, character: c })
            }
            c => {
                let mut value = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '{' | '}' | '"') {
                        break;
                    }
                    value.push(next);
                    chars.next();
                }
                tokens.push((line, Token::Text(value)));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(_, token)| token)
    }

    fn next(&mut self) -> Result<(usize, Token), KeyValuesError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or(KeyValuesError::UnexpectedEnd)?;
        self.position += 1;
        Ok(token)
    }

    fn value(&mut self) -> Result<KeyValue, KeyValuesError> {
        match self.next()? {
            (_, Token::Text(text)) => Ok(KeyValue::Primitive(text)),
            (_, Token::Open) => {
                let items = self.items()?;
                match self.next()? {
                    (_, Token::Close) => Ok(KeyValue::Group(items)),
                    (line, token) => Err(KeyValuesError::UnexpectedToken {
                        line,
                        found: token.to_string(),
                    }),
                }
            }
            (line, token) => Err(KeyValuesError::UnexpectedToken {
                line,
                found: token.to_string(),
            }),
        }
    }

    /// Key/value pairs up to (not including) a closing brace or the end.
    fn items(&mut self) -> Result<Vec<(String, KeyValue)>, KeyValuesError> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            if *token == Token::Close {
                break;
            }
            let key = match self.next()? {
                (_, Token::Text(key)) => key,
                (line, token) => {
                    return Err(KeyValuesError::UnexpectedToken {
                        line,
                        found: token.to_string(),
                    })
                }
            };
            let value = self.value()?;
            items.push((key, value));
        }
        Ok(items)
    }
}

impl KeyValue {
    /// Parses a whole document.
    ///
    /// Usually this is an implicit group of key/value pairs. A document made of bare `{ ... }`
    /// blocks becomes an [`KeyValue::Array`] of them (or the block itself if there is only one).
    pub fn parse(text: &str) -> Result<KeyValue, KeyValuesError> {
        let mut parser = Parser {
            tokens: tokenize(text)?,
            position: 0,
        };
        if parser.peek() == Some(&Token::Open) {
            let mut values = Vec::new();
            while parser.peek().is_some() {
                values.push(parser.value()?);
            }
            return Ok(if values.len() == 1 {
                values.remove(0)
            } else {
                KeyValue::Array(values)
            });
        }
        let items = parser.items()?;
        match parser.tokens.get(parser.position) {
            Some((line, token)) => Err(KeyValuesError::UnexpectedToken {
                line: *line,
                found: token.to_string(),
            }),
            None => Ok(KeyValue::Group(items)),
        }
    }

    pub fn items(&self) -> &[(String, KeyValue)] {
        match self {
            KeyValue::Group(items) => items,
            _ => &[],
        }
    }

    pub fn as_array(&self) -> &[KeyValue] {
        match self {
            KeyValue::Array(values) => values,
            _ => &[],
        }
    }

    /// First value stored under `key` (keys compare case-insensitively).
    pub fn get(&self, key: &str) -> Option<&KeyValue> {
        self.nth(key, 0)
    }

    fn nth(&self, key: &str, index: usize) -> Option<&KeyValue> {
        self.items()
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(key))
            .nth(index)
            .map(|(_, value)| value)
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a KeyValue> + 'a {
        self.items()
            .iter()
            .filter(move |(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    }

    /// Looks up a dotted path such as `"solid[1].name"`.
    ///
    /// An indexer after a group key picks among duplicate keys; an indexer on an array picks
    /// an element.
    pub fn path(&self, path: &str) -> Option<&KeyValue> {
        let mut current = self;
        for segment in path.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, index) = match segment.find('[') {
                Some(open) => {
                    let index = segment[open + 1..].strip_suffix(']')?.trim().parse::<usize>().ok()?;
                    (segment[..open].trim(), Some(index))
                }
                None => (segment, None),
            };
            current = match (key.is_empty(), index) {
                (true, Some(index)) => current.as_array().get(index)?,
                (false, Some(index)) => current.nth(key, index)?,
                (false, None) => current.get(key)?,
                (true, None) => current,
            };
        }
        Some(current)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeyValue::Primitive(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_str()?.trim().parse().ok()
    }

    /// Integers; decimal values are truncated.
    pub fn as_i32(&self) -> Option<i32> {
        let text = self.as_str()?.trim();
        text.parse()
            .ok()
            .or_else(|| text.parse::<f32>().ok().map(|value| value as i32))
    }

    pub fn as_bool(&self) -> Option<bool> {
        let text = self.as_str()?.trim();
        if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("yes") {
            Some(true)
        } else if text.eq_ignore_ascii_case("false") || text.eq_ignore_ascii_case("no") {
            Some(false)
        } else {
            self.as_f32().map(|value| value > 0.0)
        }
    }
}
