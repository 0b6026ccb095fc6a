//! Restricted boolean expressions for `#{if(...)}` conditionals.
//!
//! Grammar:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := cmp ( "&&" cmp )*
//! cmp     := mod ( ( "==" | "!=" | "<" | "<=" | ">" | ">=" ) mod )?
//! mod     := unary ( "%" unary )*
//! unary   := "!" unary | "-" unary | primary
//! primary := INT | STRING | "true" | "false" | IDENT | "(" or ")"
//! ```
//!
//! Identifiers name context variables: `doc_id_counter`, `db_prefix` and
//! `user_prefix`. Nothing else can be referenced or called.

use crate::context::{GenerationContext, PrefixKind};
use crate::error::TemplateError;
use std::fmt;

/// A runtime value of the expression language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl ExprValue {
    fn type_name(&self) -> &'static str {
        match self {
            ExprValue::Int(_) => "integer",
            ExprValue::Str(_) => "string",
            ExprValue::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprValue::Int(v) => write!(f, "{v}"),
            ExprValue::Str(v) => write!(f, "{v:?}"),
            ExprValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Context variable referenced by an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    DocIdCounter,
    Prefix(PrefixKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(ExprValue),
    Var(Variable),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn lex(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() {
            let mut end = i;
            while let Some(&(j, d)) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                end = j + d.len_utf8();
                chars.next();
            }
            let value = src[i..end]
                .parse()
                .map_err(|_| format!("integer literal '{}' out of range", &src[i..end]))?;
            tokens.push(Token::Int(value));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut end = i;
            while let Some(&(j, d)) = chars.peek() {
                if !(d.is_ascii_alphanumeric() || d == '_') {
                    break;
                }
                end = j + d.len_utf8();
                chars.next();
            }
            tokens.push(Token::Ident(src[i..end].to_string()));
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            for (_, d) in chars.by_ref() {
                if d == c {
                    closed = true;
                    break;
                }
                value.push(d);
            }
            if !closed {
                return Err("unterminated string literal".to_string());
            }
            tokens.push(Token::Str(value));
        } else {
            chars.next();
            let next = chars.peek().map(|&(_, d)| d);
            let op = match (c, next) {
                ('(', _) => {
                    tokens.push(Token::LParen);
                    continue;
                }
                (')', _) => {
                    tokens.push(Token::RParen);
                    continue;
                }
                ('=', Some('=')) => "==",
                ('!', Some('=')) => "!=",
                ('<', Some('=')) => "<=",
                ('>', Some('=')) => ">=",
                ('&', Some('&')) => "&&",
                ('|', Some('|')) => "||",
                ('<', _) => "<",
                ('>', _) => ">",
                ('!', _) => "!",
                ('%', _) => "%",
                ('-', _) => "-",
                _ => return Err(format!("unexpected character '{c}'")),
            };
            if op.len() == 2 {
                chars.next();
            }
            tokens.push(Token::Op(op));
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and()?;
        while self.peek_op() == Some("||") {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.cmp()?;
        while self.peek_op() == Some("&&") {
            self.pos += 1;
            let rhs = self.cmp()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn cmp(&mut self) -> Result<Expr, String> {
        let lhs = self.modulo()?;
        let op = match self.peek_op() {
            Some("==") => BinaryOp::Eq,
            Some("!=") => BinaryOp::Ne,
            Some("<") => BinaryOp::Lt,
            Some("<=") => BinaryOp::Le,
            Some(">") => BinaryOp::Gt,
            Some(">=") => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.modulo()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn modulo(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        while self.peek_op() == Some("%") {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(BinaryOp::Mod, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        match self.peek_op() {
            Some("!") => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            Some("-") => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Expr::Literal(ExprValue::Int(v))),
            Some(Token::Str(v)) => Ok(Expr::Literal(ExprValue::Str(v))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(ExprValue::Bool(true))),
                "false" => Ok(Expr::Literal(ExprValue::Bool(false))),
                "doc_id_counter" => Ok(Expr::Var(Variable::DocIdCounter)),
                "db_prefix" => Ok(Expr::Var(Variable::Prefix(PrefixKind::Db))),
                "user_prefix" => Ok(Expr::Var(Variable::Prefix(PrefixKind::User))),
                other => Err(format!("unknown variable '{other}'")),
            },
            Some(Token::LParen) => {
                let inner = self.or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("expected ')'".to_string()),
                }
            }
            Some(Token::RParen) => Err("unexpected ')'".to_string()),
            Some(Token::Op(op)) => Err(format!("unexpected operator '{op}'")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

impl Expr {
    /// Parse expression source.
    pub fn parse(src: &str) -> Result<Expr, TemplateError> {
        let tokens = lex(src).map_err(|reason| TemplateError::expression(src, reason))?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser
            .or()
            .map_err(|reason| TemplateError::expression(src, reason))?;
        if parser.pos < parser.tokens.len() {
            return Err(TemplateError::expression(src, "trailing input"));
        }
        Ok(expr)
    }

    /// Evaluate against a generation context.
    pub fn eval(&self, ctx: &GenerationContext<'_>) -> Result<ExprValue, String> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(Variable::DocIdCounter) => i64::try_from(ctx.doc_id_counter)
                .map(ExprValue::Int)
                .map_err(|_| "doc_id_counter out of range".to_string()),
            Expr::Var(Variable::Prefix(kind)) => Ok(ExprValue::Str(ctx.prefix(*kind).to_string())),
            Expr::Unary(op, inner) => match (op, inner.eval(ctx)?) {
                (UnaryOp::Not, ExprValue::Bool(b)) => Ok(ExprValue::Bool(!b)),
                (UnaryOp::Neg, ExprValue::Int(v)) => Ok(ExprValue::Int(-v)),
                (UnaryOp::Not, v) => Err(format!("cannot negate {}", v.type_name())),
                (UnaryOp::Neg, v) => Err(format!("cannot negate {}", v.type_name())),
            },
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                if expect_bool(lhs.eval(ctx)?)? {
                    return Ok(ExprValue::Bool(true));
                }
                Ok(ExprValue::Bool(expect_bool(rhs.eval(ctx)?)?))
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                if !expect_bool(lhs.eval(ctx)?)? {
                    return Ok(ExprValue::Bool(false));
                }
                Ok(ExprValue::Bool(expect_bool(rhs.eval(ctx)?)?))
            }
            Expr::Binary(op, lhs, rhs) => apply(*op, lhs.eval(ctx)?, rhs.eval(ctx)?),
        }
    }

    /// Evaluate and require a boolean result.
    pub fn eval_bool(&self, ctx: &GenerationContext<'_>) -> Result<bool, String> {
        expect_bool(self.eval(ctx)?)
    }
}

fn expect_bool(value: ExprValue) -> Result<bool, String> {
    match value {
        ExprValue::Bool(b) => Ok(b),
        other => Err(format!("expected a boolean, got {} {other}", other.type_name())),
    }
}

fn apply(op: BinaryOp, lhs: ExprValue, rhs: ExprValue) -> Result<ExprValue, String> {
    use std::cmp::Ordering;

    if op == BinaryOp::Mod {
        return match (lhs, rhs) {
            (ExprValue::Int(_), ExprValue::Int(0)) => Err("modulo by zero".to_string()),
            (ExprValue::Int(a), ExprValue::Int(b)) => Ok(ExprValue::Int(a.rem_euclid(b))),
            (a, b) => Err(format!(
                "'%' needs integers, got {} and {}",
                a.type_name(),
                b.type_name()
            )),
        };
    }

    let ordering: Ordering = match (&lhs, &rhs) {
        (ExprValue::Int(a), ExprValue::Int(b)) => a.cmp(b),
        (ExprValue::Str(a), ExprValue::Str(b)) => a.cmp(b),
        (ExprValue::Bool(a), ExprValue::Bool(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
            a.cmp(b)
        }
        _ => {
            return Err(format!(
                "cannot compare {} with {}",
                lhs.type_name(),
                rhs.type_name()
            ))
        }
    };

    let result = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        BinaryOp::Or | BinaryOp::And | BinaryOp::Mod => unreachable!("handled above"),
    };
    Ok(ExprValue::Bool(result))
}

/// Parse and evaluate `src` as a boolean condition.
pub fn evaluate_condition(src: &str, ctx: &GenerationContext<'_>) -> Result<bool, TemplateError> {
    Expr::parse(src)?
        .eval_bool(ctx)
        .map_err(|reason| TemplateError::expression(src, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> Result<bool, TemplateError> {
        let ctx = GenerationContext::new(7, "testdb", "user");
        evaluate_condition(src, &ctx)
    }

    #[test]
    fn test_literals() {
        assert!(eval("true").unwrap());
        assert!(!eval("false").unwrap());
        assert!(eval(" ( true ) ").unwrap());
    }

    #[test]
    fn test_comparisons() {
        assert!(eval("7 > 5").unwrap());
        assert!(eval("doc_id_counter == 7").unwrap());
        assert!(eval("doc_id_counter >= 7 && doc_id_counter <= 7").unwrap());
        assert!(!eval("doc_id_counter < 7").unwrap());
        assert!(eval("doc_id_counter != 8").unwrap());
        assert!(eval("-1 < 0").unwrap());
    }

    #[test]
    fn test_strings() {
        assert!(eval("db_prefix == \"testdb\"").unwrap());
        assert!(eval("user_prefix != 'admin'").unwrap());
        assert!(eval("'a' < 'b'").unwrap());
    }

    #[test]
    fn test_logic_and_modulo() {
        assert!(eval("doc_id_counter % 2 == 1").unwrap());
        assert!(eval("!(doc_id_counter % 2 == 0)").unwrap());
        assert!(eval("false || doc_id_counter % 7 == 0").unwrap());
        assert!(!eval("true && false").unwrap());
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert!(eval("true || (1 % 0 == 0)").unwrap());
        assert!(!eval("false && (1 % 0 == 0)").unwrap());
    }

    #[test]
    fn test_rejects_unknown_identifiers() {
        let err = eval("system == 1").unwrap_err();
        assert!(matches!(err, TemplateError::Expression { .. }));
        assert!(err.to_string().contains("unknown variable"));
    }

    #[test]
    fn test_rejects_non_boolean_and_type_errors() {
        assert!(eval("1").is_err());
        assert!(eval("db_prefix == 1").is_err());
        assert!(eval("1 % 0 == 0").is_err());
        assert!(eval("true < false").is_err());
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(eval("").is_err());
        assert!(eval("(true").is_err());
        assert!(eval("true true").is_err());
        assert!(eval("'open").is_err());
        assert!(eval("1 + 1 == 2").is_err());
        assert!(eval("`ls`").is_err());
    }
}
