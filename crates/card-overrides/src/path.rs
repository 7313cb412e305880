//! Typed configuration paths
//!
//! A [`ConfigPath`] addresses a node of an untyped configuration tree, e.g.
//! `live.controls.buttons[2].icon` or `elements[0]["some.key"]`. Paths are
//! parsed and validated once; tree operations take the parsed form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigPathError;

/// One step of a [`ConfigPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// A parsed, non-empty path into a configuration tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigPath {
    segments: Vec<PathSegment>,
}

impl ConfigPath {
    /// Parse a path string
    pub fn parse(path: &str) -> Result<Self, ConfigPathError> {
        Parser::new(path).parse()
    }

    /// Build a path from segments
    pub fn from_segments(segments: Vec<PathSegment>) -> Result<Self, ConfigPathError> {
        if segments.is_empty() {
            return Err(ConfigPathError::Empty);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`: a parsed path has at least one segment
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path without its last segment, or `None` for a single-segment path
    pub fn parent(&self) -> Option<ConfigPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn last(&self) -> &PathSegment {
        // Non-empty by construction
        &self.segments[self.segments.len() - 1]
    }

    /// Append a segment
    pub fn join(&self, segment: impl Into<PathSegment>) -> ConfigPath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }
}

impl FromStr for ConfigPath {
    type Err = ConfigPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigPath::parse(s)
    }
}

impl TryFrom<String> for ConfigPath {
    type Error = ConfigPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ConfigPath::parse(&value)
    }
}

impl TryFrom<&str> for ConfigPath {
    type Error = ConfigPathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ConfigPath::parse(value)
    }
}

impl From<ConfigPath> for String {
    fn from(path: ConfigPath) -> Self {
        path.to_string()
    }
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty() || key.contains(&['.', '[', ']', '"'][..])
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Key(key) if needs_quoting(key) => {
                    if key.contains('"') {
                        write!(f, "['{key}']")?
                    } else {
                        write!(f, "[\"{key}\"]")?
                    }
                }
                PathSegment::Key(key) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{key}")?
                }
            }
        }
        Ok(())
    }
}

struct Parser<'a> {
    path: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    segments: Vec<PathSegment>,
}

impl<'a> Parser<'a> {
    fn new(path: &'a str) -> Self {
        Self {
            path,
            chars: path.char_indices().peekable(),
            segments: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<ConfigPath, ConfigPathError> {
        if self.path.is_empty() {
            return Err(ConfigPathError::Empty);
        }

        // A key is expected at the start and after every '.'
        let mut expect_key = true;
        while let Some(&(offset, c)) = self.chars.peek() {
            match c {
                '[' => {
                    self.chars.next();
                    self.bracket()?;
                    expect_key = false;
                }
                '.' if !expect_key => {
                    self.chars.next();
                    expect_key = true;
                    if self.chars.peek().is_none() {
                        return Err(ConfigPathError::EmptyKey {
                            path: self.path.to_string(),
                            offset: offset + 1,
                        });
                    }
                }
                _ if expect_key => {
                    self.key(offset)?;
                    expect_key = false;
                }
                found => {
                    return Err(ConfigPathError::UnexpectedChar {
                        path: self.path.to_string(),
                        offset,
                        found,
                    })
                }
            }
        }

        ConfigPath::from_segments(self.segments)
    }

    fn key(&mut self, start: usize) -> Result<(), ConfigPathError> {
        let mut end = start;
        while let Some(&(offset, c)) = self.chars.peek() {
            if c == '.' || c == '[' {
                break;
            }
            if c == ']' {
                return Err(ConfigPathError::UnexpectedChar {
                    path: self.path.to_string(),
                    offset,
                    found: c,
                });
            }
            end = offset + c.len_utf8();
            self.chars.next();
        }

        if end == start {
            return Err(ConfigPathError::EmptyKey {
                path: self.path.to_string(),
                offset: start,
            });
        }
        self.segments
            .push(PathSegment::Key(self.path[start..end].to_string()));
        Ok(())
    }

    fn bracket(&mut self) -> Result<(), ConfigPathError> {
        let unterminated = || ConfigPathError::UnterminatedBracket {
            path: self.path.to_string(),
        };

        match self.chars.peek().copied() {
            Some((_, quote @ ('"' | '\''))) => {
                self.chars.next();
                let mut key = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, c)) if c == quote => break,
                        Some((_, c)) => key.push(c),
                        None => return Err(unterminated()),
                    }
                }
                match self.chars.next() {
                    Some((_, ']')) => {}
                    _ => return Err(unterminated()),
                }
                self.segments.push(PathSegment::Key(key));
            }
            Some(_) => {
                let mut raw = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, ']')) => break,
                        Some((_, c)) => raw.push(c),
                        None => return Err(unterminated()),
                    }
                }
                let index = raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigPathError::InvalidIndex {
                        path: self.path.to_string(),
                        index: raw.clone(),
                    })?;
                self.segments.push(PathSegment::Index(index));
            }
            None => return Err(unterminated()),
        }
        Ok(())
    }
}
