//! Restricted boolean expression language.
//!
//! Free-form conditions such as
//!
//! ```text
//! principal.department == resource.department && (principal.level >= 3 || principal.id == 'root')
//! ```
//!
//! are tokenized and parsed into an [`Expr`] tree by a small recursive-descent
//! parser, then evaluated against the merged attribute tree. Nothing here
//! touches ambient state or performs I/O.
//!
//! # Grammar
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := compare ( "&&" compare )*
//! compare := primary ( ( "==" | "!=" | ">" | ">=" | "<" | "<=" ) primary )?
//! primary := "(" or ")" | literal | path
//! literal := number | 'string' | "string" | true | false | null
//! path    := ( principal | resource | context ) ( "." ident )+ | action
//! ```
//!
//! A bare `primary` used as a boolean is true only when it is the JSON
//! value `true`.

use std::borrow::Cow;
use std::fmt;

use serde_json::{Number, Value};
use thiserror::Error;

use crate::condition::{ConditionEvaluator, Operator};
use crate::path;

/// Longest expression accepted by the parser, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Deepest parenthesis nesting accepted by the parser.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Roots an attribute path may start from.
const PATH_ROOTS: [&str; 3] = ["principal", "resource", "context"];

// ============================================================================
// Errors
// ============================================================================

/// Error produced while tokenizing or parsing an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,

    #[error("expression is {len} bytes long; the limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string literal starting at position {pos}")]
    UnterminatedString { pos: usize },

    #[error("invalid number '{text}' at position {pos}")]
    InvalidNumber { text: String, pos: usize },

    #[error(
        "unknown identifier '{name}' at position {pos}; only principal.*, resource.*, context.* and action may be referenced"
    )]
    UnknownIdentifier { name: String, pos: usize },

    #[error("unexpected {found} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("parentheses nested deeper than {max} levels")]
    TooDeep { max: usize },
}

// ============================================================================
// AST
// ============================================================================

/// Comparison operators available inside expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn operator(self) -> Operator {
        match self {
            Self::Eq => Operator::Eq,
            Self::Ne => Operator::Neq,
            Self::Gt => Operator::Gt,
            Self::Ge => Operator::Gte,
            Self::Lt => Operator::Lt,
            Self::Le => Operator::Lte,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        };
        f.write_str(symbol)
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A dotted attribute path rooted at a context namespace.
    Path(String),
    /// A binary comparison.
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Both sides must be true.
    And(Box<Expr>, Box<Expr>),
    /// At least one side must be true.
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluates the expression to a boolean against `ctx`.
    pub fn evaluate(&self, evaluator: &ConditionEvaluator, ctx: &Value) -> bool {
        matches!(self.value(evaluator, ctx).as_deref(), Some(Value::Bool(true)))
    }

    fn value<'a>(&'a self, evaluator: &ConditionEvaluator, ctx: &'a Value) -> Option<Cow<'a, Value>> {
        match self {
            Self::Literal(v) => Some(Cow::Borrowed(v)),
            Self::Path(p) => path::lookup(ctx, p).map(Cow::Borrowed),
            Self::Compare { op, left, right } => {
                let l = left.value(evaluator, ctx);
                let r = right.value(evaluator, ctx);
                let result = evaluator.compare(op.operator(), l.as_deref(), r.as_deref());
                Some(Cow::Owned(Value::Bool(result)))
            }
            Self::And(a, b) => Some(Cow::Owned(Value::Bool(
                a.evaluate(evaluator, ctx) && b.evaluate(evaluator, ctx),
            ))),
            Self::Or(a, b) => Some(Cow::Owned(Value::Bool(
                a.evaluate(evaluator, ctx) || b.evaluate(evaluator, ctx),
            ))),
        }
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Str(String),
    True,
    False,
    Null,
    Path(String),
    Cmp(CompareOp),
    AndAnd,
    OrOr,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "number {n}"),
            Self::Str(s) => write!(f, "string '{s}'"),
            Self::True => f.write_str("'true'"),
            Self::False => f.write_str("'false'"),
            Self::Null => f.write_str("'null'"),
            Self::Path(p) => write!(f, "path '{p}'"),
            Self::Cmp(op) => write!(f, "operator '{op}'"),
            Self::AndAnd => f.write_str("operator '&&'"),
            Self::OrOr => f.write_str("operator '||'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, consumed) = match (c, next) {
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('=', Some('=')) => (Token::Cmp(CompareOp::Eq), 2),
            ('!', Some('=')) => (Token::Cmp(CompareOp::Ne), 2),
            ('>', Some('=')) => (Token::Cmp(CompareOp::Ge), 2),
            ('<', Some('=')) => (Token::Cmp(CompareOp::Le), 2),
            ('>', _) => (Token::Cmp(CompareOp::Gt), 1),
            ('<', _) => (Token::Cmp(CompareOp::Lt), 1),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('\'' | '"', _) => lex_string(&chars, i)?,
            (d, _) if d.is_ascii_digit() => lex_number(input, &chars, i)?,
            ('-', Some(d)) if d.is_ascii_digit() => lex_number(input, &chars, i)?,
            (a, _) if a.is_ascii_alphabetic() || a == '_' => lex_word(input, &chars, i)?,
            _ => return Err(ExpressionError::UnexpectedChar { ch: c, pos }),
        };

        tokens.push(Spanned { token, pos });
        i += consumed;
    }

    Ok(tokens)
}

fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(Token, usize), ExpressionError> {
    let (pos, quote) = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            return Ok((Token::Str(out), i - start + 1));
        }
        if c == '\\' {
            let escaped = chars
                .get(i + 1)
                .map(|&(_, c)| c)
                .ok_or(ExpressionError::UnterminatedString { pos })?;
            out.push(match escaped {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }

    Err(ExpressionError::UnterminatedString { pos })
}

fn end_offset(input: &str, chars: &[(usize, char)], i: usize) -> usize {
    chars.get(i).map_or(input.len(), |&(p, _)| p)
}

fn lex_number(
    input: &str,
    chars: &[(usize, char)],
    start: usize,
) -> Result<(Token, usize), ExpressionError> {
    let pos = chars[start].0;
    let mut i = start + 1;
    while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
        i += 1;
    }

    let text = &input[pos..end_offset(input, chars, i)];
    let invalid = || ExpressionError::InvalidNumber {
        text: text.to_string(),
        pos,
    };

    let number = if text.contains('.') {
        let f: f64 = text.parse().map_err(|_| invalid())?;
        Number::from_f64(f).ok_or_else(invalid)?
    } else {
        let n: i64 = text.parse().map_err(|_| invalid())?;
        Number::from(n)
    };

    Ok((Token::Number(number), i - start))
}

fn lex_word(
    input: &str,
    chars: &[(usize, char)],
    start: usize,
) -> Result<(Token, usize), ExpressionError> {
    let pos = chars[start].0;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i].1;
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            i += 1;
        } else {
            break;
        }
    }

    let word = &input[pos..end_offset(input, chars, i)];
    let token = match word {
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        "action" => Token::Path(word.to_string()),
        _ => {
            let mut segments = word.split('.');
            let root = segments.next().unwrap_or_default();
            let rest: Vec<&str> = segments.collect();
            let well_formed = PATH_ROOTS.contains(&root)
                && !rest.is_empty()
                && rest.iter().all(|s| !s.is_empty());
            if !well_formed {
                return Err(ExpressionError::UnknownIdentifier {
                    name: word.to_string(),
                    pos,
                });
            }
            Token::Path(word.to_string())
        }
    };

    Ok((token, i - start))
}

// ============================================================================
// Parser
// ============================================================================

/// Parses `input` into an expression tree.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    if input.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }
    if input.len() > MAX_EXPRESSION_LEN {
        return Err(ExpressionError::TooLong {
            len: input.len(),
            max: MAX_EXPRESSION_LEN,
        });
    }

    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };

    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek() {
        return Err(ExpressionError::UnexpectedToken {
            found: extra.token.to_string(),
            pos: extra.pos,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().is_some_and(|t| &t.token == token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_compare()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_compare()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Spanned {
                token: Token::Cmp(op),
                ..
            }) => *op,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_primary()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let Spanned { token, pos } = self.next().ok_or(ExpressionError::UnexpectedEnd)?;
        match token {
            Token::LParen => {
                self.depth += 1;
                if self.depth > MAX_NESTING_DEPTH {
                    return Err(ExpressionError::TooDeep {
                        max: MAX_NESTING_DEPTH,
                    });
                }
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Spanned {
                        token: Token::RParen,
                        ..
                    }) => {
                        self.depth -= 1;
                        Ok(inner)
                    }
                    Some(other) => Err(ExpressionError::UnexpectedToken {
                        found: other.token.to_string(),
                        pos: other.pos,
                    }),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Path(p) => Ok(Expr::Path(p)),
            other => Err(ExpressionError::UnexpectedToken {
                found: other.to_string(),
                pos,
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: &str, ctx: &Value) -> bool {
        parse(expr)
            .expect("expression should parse")
            .evaluate(&ConditionEvaluator::default(), ctx)
    }

    fn ctx() -> Value {
        json!({
            "principal": { "id": "u1", "level": 3, "department": "eng", "active": true },
            "resource": { "kind": "doc", "department": "eng", "size": 10.5 },
            "action": "read",
            "context": { "country": "US" }
        })
    }

    #[test]
    fn test_parse_comparison() {
        let expr = parse("principal.level >= 3").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                op: CompareOp::Ge,
                left: Box::new(Expr::Path("principal.level".to_string())),
                right: Box::new(Expr::Literal(json!(3))),
            }
        );
    }

    #[test]
    fn test_precedence_and_binds_tighter() {
        // a || b && c  ==>  a || (b && c)
        let expr = parse("principal.active || principal.level > 5 && principal.id == 'x'").unwrap();
        assert!(matches!(expr, Expr::Or(_, ref rhs) if matches!(**rhs, Expr::And(_, _))));
    }

    #[test]
    fn test_evaluate_basic() {
        let ctx = ctx();
        assert!(eval("principal.level >= 3", &ctx));
        assert!(!eval("principal.level > 3", &ctx));
        assert!(eval("principal.department == resource.department", &ctx));
        assert!(eval("action == 'read'", &ctx));
        assert!(eval("context.country != \"DE\"", &ctx));
        assert!(eval("resource.size < 11", &ctx));
        assert!(eval("principal.active", &ctx));
    }

    #[test]
    fn test_evaluate_logical() {
        let ctx = ctx();
        assert!(eval("principal.level > 5 || principal.id == 'u1'", &ctx));
        assert!(!eval("principal.level > 5 && principal.id == 'u1'", &ctx));
        assert!(eval("(principal.level > 5 || principal.active) && action == 'read'", &ctx));
    }

    #[test]
    fn test_missing_path_is_undefined() {
        let ctx = ctx();
        assert!(!eval("principal.missing == 1", &ctx));
        assert!(!eval("principal.missing > 1", &ctx));
        assert!(eval("principal.missing != 1", &ctx));
        assert!(!eval("principal.missing", &ctx));
    }

    #[test]
    fn test_negative_and_float_literals() {
        let ctx = json!({ "principal": { "balance": -5, "ratio": 0.25 } });
        assert!(eval("principal.balance == -5", &ctx));
        assert!(eval("principal.ratio < 0.5", &ctx));
    }

    #[test]
    fn test_string_escapes() {
        let ctx = json!({ "principal": { "name": "O'Brien" } });
        assert!(eval(r"principal.name == 'O\'Brien'", &ctx));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(parse(""), Err(ExpressionError::Empty));
        assert_eq!(parse("   "), Err(ExpressionError::Empty));
        assert!(matches!(
            parse("principal.x ==="),
            Err(ExpressionError::UnexpectedChar { ch: '=', .. })
        ));
        assert_eq!(parse("principal.x =="), Err(ExpressionError::UnexpectedEnd));
        assert!(matches!(
            parse("(principal.x == 1"),
            Err(ExpressionError::UnexpectedEnd)
        ));
        assert!(matches!(
            parse("principal.x == 1)"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse("'abc"),
            Err(ExpressionError::UnterminatedString { pos: 0 })
        ));
        assert!(matches!(
            parse("1.2.3 == 1"),
            Err(ExpressionError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_rejects_code_injection_shapes() {
        for attempt in [
            "process.exit(1)",
            "require('fs')",
            "principal.x == 1; drop()",
            "constructor.constructor('return this')()",
            "principal",
            "principal.",
            "principal.x = 1",
            "!principal.active",
            "principal.x == `cmd`",
        ] {
            assert!(parse(attempt).is_err(), "should reject: {attempt}");
        }
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!(
            "{}principal.x == 1{}",
            "(".repeat(MAX_NESTING_DEPTH + 1),
            ")".repeat(MAX_NESTING_DEPTH + 1)
        );
        assert_eq!(
            parse(&deep),
            Err(ExpressionError::TooDeep {
                max: MAX_NESTING_DEPTH
            })
        );

        let ok = format!(
            "{}principal.x == 1{}",
            "(".repeat(MAX_NESTING_DEPTH),
            ")".repeat(MAX_NESTING_DEPTH)
        );
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn test_length_limit() {
        let long = format!("principal.x == '{}'", "a".repeat(MAX_EXPRESSION_LEN));
        assert!(matches!(parse(&long), Err(ExpressionError::TooLong { .. })));
    }
}
