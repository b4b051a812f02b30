#![forbid(unsafe_code)]
//! Visibility expressions and caller authorization evaluation.
//!
//! Every value crossing the security boundary carries a visibility
//! expression; a caller presents a set of authorization tokens. Evaluation
//! is pure and deterministic, and a malformed expression is never readable:
//! a parse ambiguity here is a security boundary, not a data-quality issue.

use std::fmt;

use rustc_hash::FxHashSet;

/// A boolean expression over authorization tokens, e.g. `a&b|c`.
///
/// Immutable once written; a stored visibility is never edited, only
/// superseded by a later event. The expression is kept as raw bytes the
/// way it appears on the wire.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Visibility(Vec<u8>);

impl Visibility {
    /// Wraps a wire-format visibility expression.
    pub fn new(expr: impl Into<Vec<u8>>) -> Self {
        Self(expr.into())
    }

    /// The always-readable empty expression.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// True for the empty (unrestricted) expression.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw expression bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Visibility {
    fn from(expr: &str) -> Self {
        Self(expr.as_bytes().to_vec())
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// The unordered set of authorization tokens a caller presents.
#[derive(Clone, Debug, Default)]
pub struct Authorizations {
    tokens: FxHashSet<String>,
}

impl Authorizations {
    /// Builds an authorization set from the given tokens.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// The empty authorization set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the caller holds `token`. Tokens are opaque strings; no
    /// normalization beyond exact match.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    /// Number of tokens held.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when the caller holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Decides whether a value tagged with `expr` is readable by this
    /// caller.
    ///
    /// The empty expression is always readable and short-circuits before
    /// any parsing; unvisibilitied data dominates typical workloads.
    /// Malformed or non-UTF-8 expressions fail closed.
    pub fn can_read(&self, expr: &[u8]) -> bool {
        if expr.is_empty() {
            return true;
        }
        let Ok(expr) = std::str::from_utf8(expr) else {
            return false;
        };
        Parser::new(expr, self).evaluate().unwrap_or(false)
    }

    /// [`Authorizations::can_read`] over a wrapped expression.
    pub fn can_read_visibility(&self, visibility: &Visibility) -> bool {
        self.can_read(visibility.as_bytes())
    }
}

/// Recursive-descent evaluator over `&`/`|`/parentheses.
///
/// Grammar: `or := and ('|' and)*`, `and := primary ('&' primary)*`,
/// `primary := token | '(' or ')'`. A token is any non-empty run of bytes
/// other than the four structural characters. Returns `None` on any
/// malformed input so the caller fails closed.
struct Parser<'a> {
    bytes: &'a [u8],
    expr: &'a str,
    pos: usize,
    auths: &'a Authorizations,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str, auths: &'a Authorizations) -> Self {
        Self {
            bytes: expr.as_bytes(),
            expr,
            pos: 0,
            auths,
        }
    }

    fn evaluate(mut self) -> Option<bool> {
        let value = self.parse_or()?;
        if self.pos == self.bytes.len() {
            Some(value)
        } else {
            None
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn parse_or(&mut self) -> Option<bool> {
        let mut value = self.parse_and()?;
        while self.peek() == Some(b'|') {
            self.pos += 1;
            let rhs = self.parse_and()?;
            value = value || rhs;
        }
        Some(value)
    }

    fn parse_and(&mut self) -> Option<bool> {
        let mut value = self.parse_primary()?;
        while self.peek() == Some(b'&') {
            self.pos += 1;
            let rhs = self.parse_primary()?;
            value = value && rhs;
        }
        Some(value)
    }

    fn parse_primary(&mut self) -> Option<bool> {
        match self.peek()? {
            b'(' => {
                self.pos += 1;
                let value = self.parse_or()?;
                if self.peek() == Some(b')') {
                    self.pos += 1;
                    Some(value)
                } else {
                    None
                }
            }
            b')' | b'&' | b'|' => None,
            _ => {
                let start = self.pos;
                while let Some(byte) = self.peek() {
                    if matches!(byte, b'&' | b'|' | b'(' | b')') {
                        break;
                    }
                    self.pos += 1;
                }
                // structural characters are ASCII, so this slice sits on
                // char boundaries
                let token = &self.expr[start..self.pos];
                Some(self.auths.contains(token))
            }
        }
    }
}
