//! Boolean conditions over session variables.
//!
//! Variable-mode triggers use a condition instead of an output pattern:
//!
//! ```text
//! expr    := or
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | cmp
//! cmp     := primary ( ("==" | "!=") literal )?
//! primary := "(" expr ")" | "true" | "false" | ident
//! ident   := "%"? [A-Za-z_][A-Za-z0-9_]*
//! literal := "..." | '...' | [A-Za-z0-9_.-]+
//! ```
//!
//! A bare identifier is true when the variable is set to a non-empty value.
//! `name == lit` requires the variable to be set and equal; `name != lit` is
//! its negation, so it holds for an unset variable.

use std::collections::BTreeSet;
use std::fmt;

use aiterm_config::SessionVariables;

use super::TriggerError;

/// Deepest nesting of `(` and `!` a condition may use.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Const(bool),
    IsSet(String),
    Equals(String, String),
    NotEquals(String, String),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, TriggerError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(TriggerError::condition(
                tok.offset,
                format!("unexpected {}", tok.kind),
            ));
        }
        Ok(expr)
    }

    pub fn evaluate(&self, vars: &SessionVariables) -> bool {
        match self {
            Self::Const(value) => *value,
            Self::IsSet(name) => vars.get(name).is_some_and(|v| !v.is_empty()),
            Self::Equals(name, lit) => vars.get(name).is_some_and(|v| v == lit),
            Self::NotEquals(name, lit) => vars.get(name).is_none_or(|v| v != lit),
            Self::Not(inner) => !inner.evaluate(vars),
            Self::And(parts) => parts.iter().all(|p| p.evaluate(vars)),
            Self::Or(parts) => parts.iter().any(|p| p.evaluate(vars)),
        }
    }

    /// Names of every variable the condition reads, sorted.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Const(_) => {}
            Self::IsSet(name) | Self::Equals(name, _) | Self::NotEquals(name, _) => {
                out.insert(name.as_str());
            }
            Self::Not(inner) => inner.collect_variables(out),
            Self::And(parts) | Self::Or(parts) => {
                for part in parts {
                    part.collect_variables(out);
                }
            }
        }
    }
}

// ── Tokenizer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    /// `%name`, always a variable reference.
    Var(String),
    /// Unquoted run of `[A-Za-z0-9_.-]`.
    Word(String),
    /// Quoted string, quotes removed.
    Str(String),
    Not,
    And,
    Or,
    Eq,
    Ne,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => write!(f, "'%{name}'"),
            Self::Word(word) => write!(f, "'{word}'"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Not => write!(f, "'!'"),
            Self::And => write!(f, "'&&'"),
            Self::Or => write!(f, "'||'"),
            Self::Eq => write!(f, "'=='"),
            Self::Ne => write!(f, "'!='"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_ident(word: &str) -> bool {
    let mut chars = word.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn tokenize(source: &str) -> Result<Vec<Token>, TriggerError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '!' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::Ne
                } else {
                    TokenKind::Not
                }
            }
            '=' => {
                if chars.next_if(|&(_, n)| n == '=').is_none() {
                    return Err(TriggerError::condition(offset, "expected '=='"));
                }
                TokenKind::Eq
            }
            '&' => {
                if chars.next_if(|&(_, n)| n == '&').is_none() {
                    return Err(TriggerError::condition(offset, "expected '&&'"));
                }
                TokenKind::And
            }
            '|' => {
                if chars.next_if(|&(_, n)| n == '|').is_none() {
                    return Err(TriggerError::condition(offset, "expected '||'"));
                }
                TokenKind::Or
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == quote {
                        closed = true;
                        break;
                    }
                    value.push(n);
                }
                if !closed {
                    return Err(TriggerError::condition(offset, "unterminated string"));
                }
                TokenKind::Str(value)
            }
            '%' => {
                let mut name = String::new();
                while let Some((_, n)) = chars.next_if(|&(_, n)| is_word_char(n)) {
                    name.push(n);
                }
                if !is_ident(&name) {
                    return Err(TriggerError::condition(offset, "expected variable name after '%'"));
                }
                TokenKind::Var(name)
            }
            c if is_word_char(c) => {
                let mut word = String::from(c);
                while let Some((_, n)) = chars.next_if(|&(_, n)| is_word_char(n)) {
                    word.push(n);
                }
                TokenKind::Word(word)
            }
            other => {
                return Err(TriggerError::condition(
                    offset,
                    format!("unexpected character '{other}'"),
                ));
            }
        };
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

// ── Parser ─────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Source length, reported as the position of "unexpected end".
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn descend(&mut self, offset: usize) -> Result<(), TriggerError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(TriggerError::condition(offset, "condition nested too deeply"));
        }
        Ok(())
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Condition, TriggerError> {
        let mut parts = vec![self.parse_and()?];
        while self.eat(&TokenKind::Or) {
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Condition::Or(parts)
        })
    }

    fn parse_and(&mut self) -> Result<Condition, TriggerError> {
        let mut parts = vec![self.parse_unary()?];
        while self.eat(&TokenKind::And) {
            parts.push(self.parse_unary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Condition::And(parts)
        })
    }

    fn parse_unary(&mut self) -> Result<Condition, TriggerError> {
        if let Some(offset) = self.peek().filter(|t| t.kind == TokenKind::Not).map(|t| t.offset) {
            self.pos += 1;
            self.descend(offset)?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Condition, TriggerError> {
        let Some(tok) = self.next() else {
            return Err(TriggerError::condition(self.end, "unexpected end of condition"));
        };

        let name = match tok.kind {
            TokenKind::LParen => {
                self.descend(tok.offset)?;
                let inner = self.parse_or()?;
                if !self.eat(&TokenKind::RParen) {
                    let at = self.peek().map_or(self.end, |t| t.offset);
                    return Err(TriggerError::condition(at, "expected ')'"));
                }
                self.depth -= 1;
                return Ok(inner);
            }
            TokenKind::Word(ref w) if w == "true" => return Ok(Condition::Const(true)),
            TokenKind::Word(ref w) if w == "false" => return Ok(Condition::Const(false)),
            TokenKind::Var(name) => name,
            TokenKind::Word(word) if is_ident(&word) => word,
            other => {
                return Err(TriggerError::condition(
                    tok.offset,
                    format!("expected variable name, found {other}"),
                ));
            }
        };

        let negate = if self.eat(&TokenKind::Eq) {
            false
        } else if self.eat(&TokenKind::Ne) {
            true
        } else {
            return Ok(Condition::IsSet(name));
        };

        let literal = match self.next() {
            Some(Token {
                kind: TokenKind::Str(s) | TokenKind::Word(s),
                ..
            }) => s,
            Some(tok) => {
                return Err(TriggerError::condition(
                    tok.offset,
                    format!("expected a value, found {}", tok.kind),
                ));
            }
            None => return Err(TriggerError::condition(self.end, "expected a value")),
        };

        Ok(if negate {
            Condition::NotEquals(name, literal)
        } else {
            Condition::Equals(name, literal)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> SessionVariables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn eval(source: &str, pairs: &[(&str, &str)]) -> bool {
        Condition::parse(source).unwrap().evaluate(&vars(pairs))
    }

    #[test]
    fn test_bare_identifier_is_set_and_non_empty() {
        assert!(eval("branch", &[("branch", "main")]));
        assert!(!eval("branch", &[("branch", "")]));
        assert!(!eval("branch", &[]));
    }

    #[test]
    fn test_percent_sigil_is_optional() {
        assert_eq!(
            Condition::parse("%branch").unwrap(),
            Condition::parse("branch").unwrap()
        );
    }

    #[test]
    fn test_equality_with_quoted_and_bare_literals() {
        assert!(eval("state == \"waiting for input\"", &[("state", "waiting for input")]));
        assert!(eval("state == 'idle'", &[("state", "idle")]));
        assert!(eval("version == 1.2.3", &[("version", "1.2.3")]));
        assert!(!eval("state == idle", &[]));
    }

    #[test]
    fn test_not_equals_holds_for_unset() {
        assert!(eval("state != busy", &[]));
        assert!(eval("state != busy", &[("state", "idle")]));
        assert!(!eval("state != busy", &[("state", "busy")]));
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        // a || (b && c)
        assert!(eval("a || b && c", &[("a", "1")]));
        assert!(!eval("a || b && c", &[("b", "1")]));
        assert!(eval("(a || b) && c", &[("b", "1"), ("c", "1")]));
    }

    #[test]
    fn test_negation_and_constants() {
        assert!(eval("!busy", &[]));
        assert!(!eval("!!busy", &[]));
        assert!(eval("true && !false", &[]));
    }

    #[test]
    fn test_variables_lists_referenced_names() {
        let cond = Condition::parse("a && (b == x || !c)").unwrap();
        let names: Vec<_> = cond.variables().into_iter().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |n: usize| format!("{}a{}", "(".repeat(n), ")".repeat(n));
        assert!(eval(&nested(MAX_NESTING), &[("a", "1")]));
        assert!(eval(&format!("{}a", "!".repeat(MAX_NESTING)), &[("a", "1")]));

        match Condition::parse(&nested(MAX_NESTING + 1)) {
            Err(TriggerError::Condition { position, message }) => {
                assert_eq!(position, MAX_NESTING);
                assert!(message.contains("nested too deeply"));
            }
            other => panic!("expected nesting error, got {other:?}"),
        }
        assert!(Condition::parse(&nested(5000)).is_err());
        assert!(Condition::parse(&format!("{}a", "!".repeat(200_000))).is_err());
    }

    #[test]
    fn test_parse_errors_report_position() {
        let cases = [
            ("", 0),
            ("a ==", 4),
            ("a = b", 2),
            ("a & b", 2),
            ("(a", 2),
            ("a b", 2),
            ("\"unterminated", 0),
            ("a == (b)", 5),
            ("1abc", 0),
            ("a $ b", 2),
        ];
        for (source, expected) in cases {
            match Condition::parse(source) {
                Err(TriggerError::Condition { position, .. }) => {
                    assert_eq!(position, expected, "position for {source:?}")
                }
                other => panic!("expected error for {source:?}, got {other:?}"),
            }
        }
    }
}
