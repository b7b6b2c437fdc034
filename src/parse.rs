use std::{borrow::Cow, fmt::Display};

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::lex::{Token, TokenKind, lex};

/// Every parse step yields either a value or a human readable message.
pub type PResult<T> = Result<T, String>;

/// Combines several independent parse results: all values when every one
/// succeeded, otherwise every present message joined with `"; "`.
pub trait Gather {
    type Output;
    fn gather(self) -> PResult<Self::Output>;
}

fn joined(errors: impl IntoIterator<Item = String>) -> String {
    errors.into_iter().collect::<Vec<_>>().join("; ")
}

macro_rules! gather_tuple {
    ($($ty:ident $val:ident),+) => {
        impl<$($ty),+> Gather for ($(PResult<$ty>,)+) {
            type Output = ($($ty,)+);

            fn gather(self) -> PResult<Self::Output> {
                match self {
                    ($(Ok($val),)+) => Ok(($($val,)+)),
                    ($($val,)+) => Err(joined([$($val.err()),+].into_iter().flatten())),
                }
            }
        }
    };
}

gather_tuple!(A a, B b);
gather_tuple!(A a, B b, C c);
gather_tuple!(A a, B b, C c, D d);

impl<T> Gather for Vec<PResult<T>> {
    type Output = Vec<T>;

    fn gather(self) -> PResult<Vec<T>> {
        let mut values = Vec::with_capacity(self.len());
        let mut errors = Vec::new();
        for result in self {
            match result {
                Ok(value) => values.push(value),
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(joined(errors))
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(cmdlang::parse))]
pub struct ParseError {
    pub message: String,

    #[source_code]
    src: NamedSource<String>,

    #[label("first problem here")]
    at: Option<SourceSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Pipeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Pipeline => "|>",
        }
    }
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        }
    }
}

impl Display for AssignOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignOp::Assign => write!(f, "="),
            AssignOp::Compound(op) => write!(f, "{}=", op.symbol()),
        }
    }
}

/// What a variable reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRef<'de> {
    /// A plain identifier: a global, a builtin or a command.
    Global(&'de str),
    /// `$0`, `$1`, ...: a macro argument.
    Arg(usize),
    /// `$user`, `$self`, `$channel`, `$args`.
    Special(&'de str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'de> {
    Integer(i64),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(Cow<'de, str>),
    List(Vec<Expr<'de>>),
    Var(VarRef<'de>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr<'de>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr<'de>>,
        rhs: Box<Expr<'de>>,
    },
    Assign {
        op: AssignOp,
        place: Box<Expr<'de>>,
        value: Box<Expr<'de>>,
    },
    Ternary {
        cond: Box<Expr<'de>>,
        then: Box<Expr<'de>>,
        otherwise: Box<Expr<'de>>,
    },
    /// `a < b <= c`: one node, `ops.len() == operands.len() - 1`.
    Comparison {
        operands: Vec<Expr<'de>>,
        ops: Vec<CompareOp>,
    },
    Call {
        callee: Box<Expr<'de>>,
        args: Vec<Expr<'de>>,
    },
    Subscript {
        base: Box<Expr<'de>>,
        index: Box<Expr<'de>>,
    },
    Slice {
        base: Box<Expr<'de>>,
        start: Option<Box<Expr<'de>>>,
        end: Option<Box<Expr<'de>>>,
    },
    Member {
        base: Box<Expr<'de>>,
        name: &'de str,
    },
}

impl Display for VarRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarRef::Global(name) => write!(f, "{name}"),
            VarRef::Arg(n) => write!(f, "${n}"),
            VarRef::Special(name) => write!(f, "${name}"),
        }
    }
}

impl Display for Expr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Integer(i) => write!(f, "{i}"),
            Expr::Double(d) => write!(f, "{d:?}"),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Char(c) => write!(f, "{c:?}"),
            Expr::Str(s) => write!(f, "{s:?}"),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Expr::Var(var) => write!(f, "{var}"),
            Expr::Unary { op, expr } => write!(f, "({} {expr})", op.symbol()),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {lhs} {rhs})", op.symbol()),
            Expr::Assign { op, place, value } => write!(f, "({op} {place} {value})"),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => write!(f, "(? {cond} {then} {otherwise})"),
            Expr::Comparison { operands, ops } => {
                write!(f, "(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", ops[i - 1].symbol())?;
                    }
                    write!(f, "{operand}")?;
                }
                write!(f, ")")
            }
            Expr::Call { callee, args } => {
                write!(f, "(call {callee}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            Expr::Subscript { base, index } => write!(f, "(index {base} {index})"),
            Expr::Slice { base, start, end } => {
                write!(f, "(slice {base}")?;
                for bound in [start, end] {
                    match bound {
                        Some(bound) => write!(f, " {bound}")?,
                        None => write!(f, " _")?,
                    }
                }
                write!(f, ")")
            }
            Expr::Member { base, name } => write!(f, "(. {base} {name})"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Infix {
    Member,
    Call,
    Index,
    Binary(BinaryOp),
    Compare(CompareOp),
    Assign(AssignOp),
    Ternary,
}

const TERNARY: u32 = 10;
const POSTFIX: u32 = 2800;

fn infix(kind: TokenKind) -> Option<(Infix, u32)> {
    use BinaryOp as B;
    use TokenKind as T;

    let compound = |op| Some((Infix::Assign(AssignOp::Compound(op)), 200));
    let binary = |op, prec| Some((Infix::Binary(op), prec));
    let compare = |op| Some((Infix::Compare(op), 800));

    match kind {
        T::Dot => Some((Infix::Member, 8000)),
        T::LeftParen => Some((Infix::Call, 3000)),
        T::LeftSquare => Some((Infix::Index, POSTFIX)),
        T::StarStar => binary(B::Pow, 2600),
        T::Star => binary(B::Mul, 2400),
        T::Slash => binary(B::Div, 2400),
        T::Percent => binary(B::Rem, 2400),
        T::Plus => binary(B::Add, 1800),
        T::Minus => binary(B::Sub, 1800),
        T::ShiftLeft => binary(B::Shl, 1600),
        T::ShiftRight => binary(B::Shr, 1600),
        T::Ampersand => binary(B::BitAnd, 1400),
        T::Caret => binary(B::BitXor, 1200),
        T::Pipe => binary(B::BitOr, 1000),
        T::EqualEqual => compare(CompareOp::Eq),
        T::BangEqual => compare(CompareOp::Ne),
        T::Less => compare(CompareOp::Lt),
        T::Greater => compare(CompareOp::Gt),
        T::LessEqual => compare(CompareOp::Le),
        T::GreaterEqual => compare(CompareOp::Ge),
        T::AndAnd => binary(B::And, 600),
        T::OrOr => binary(B::Or, 400),
        T::Equal => Some((Infix::Assign(AssignOp::Assign), 200)),
        T::PlusEqual => compound(B::Add),
        T::MinusEqual => compound(B::Sub),
        T::StarEqual => compound(B::Mul),
        T::SlashEqual => compound(B::Div),
        T::PercentEqual => compound(B::Rem),
        T::StarStarEqual => compound(B::Pow),
        T::ShiftLeftEqual => compound(B::Shl),
        T::ShiftRightEqual => compound(B::Shr),
        T::AmpersandEqual => compound(B::BitAnd),
        T::PipeEqual => compound(B::BitOr),
        T::CaretEqual => compound(B::BitXor),
        T::Question => Some((Infix::Ternary, TERNARY)),
        T::Pipeline => binary(B::Pipeline, 1),
        _ => None,
    }
}

pub struct Parser<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    tokens: Vec<Token<'de>>,
    pos: usize,
    first_error: Option<SourceSpan>,
}

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Self {
        Self::from_tokens(filename, whole, lex(whole))
    }

    /// `tokens` must have been lexed from `whole`.
    pub fn from_tokens(filename: Option<&'de str>, whole: &'de str, mut tokens: Vec<Token<'de>>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::EndOfFile) {
            tokens.push(Token {
                kind: TokenKind::EndOfFile,
                literal: "",
                offset: whole.len(),
            });
        }

        Parser {
            filename,
            whole,
            tokens,
            pos: 0,
            first_error: None,
        }
    }

    pub fn parse(mut self) -> Result<Expr<'de>, ParseError> {
        let result = self.expression(0).and_then(|expr| {
            let token = self.peek();
            match token.kind {
                TokenKind::EndOfFile => Ok(expr),
                _ => Err(self.fail(token, format!("unexpected token '{}' after expression", token.literal))),
            }
        });

        result.map_err(|message| {
            tracing::debug!(target: "parser", "parse failed: {message}");
            ParseError {
                message,
                src: NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string()),
                at: self.first_error,
            }
        })
    }

    fn peek(&self) -> Token<'de> {
        self.tokens[self.pos]
    }

    /// Takes the current token; the end of input is never consumed.
    fn advance(&mut self) -> Token<'de> {
        let token = self.peek();
        if token.kind != TokenKind::EndOfFile {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        let matched = self.peek().kind == kind;
        if matched {
            self.advance();
        }
        matched
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> PResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            let token = self.peek();
            Err(self.fail(token, message.to_string()))
        }
    }

    fn fail(&mut self, token: Token<'de>, message: String) -> String {
        self.first_error.get_or_insert(token.span());
        message
    }

    fn expression(&mut self, min_prec: u32) -> PResult<Expr<'de>> {
        let mut lhs = self.unary();
        // only a comparison built by this loop may be extended; a
        // parenthesised one is an ordinary operand
        let mut chained = false;

        loop {
            let Some((op, prec)) = infix(self.peek().kind) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();

            let extends_chain = chained && matches!(op, Infix::Compare(_));
            chained = matches!(op, Infix::Compare(_));
            lhs = match op {
                Infix::Member => self.member(lhs),
                Infix::Call => self.call(lhs),
                Infix::Index => self.index(lhs),
                Infix::Binary(op) => {
                    let next = if op == BinaryOp::Pow { prec } else { prec + 1 };
                    let rhs = self.expression(next);
                    (lhs, rhs).gather().map(|(lhs, rhs)| Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    })
                }
                Infix::Compare(op) => {
                    let rhs = self.expression(prec + 1);
                    (lhs, rhs).gather().map(|(lhs, rhs)| match lhs {
                        Expr::Comparison {
                            mut operands,
                            mut ops,
                        } if extends_chain => {
                            operands.push(rhs);
                            ops.push(op);
                            Expr::Comparison { operands, ops }
                        }
                        lhs => Expr::Comparison {
                            operands: vec![lhs, rhs],
                            ops: vec![op],
                        },
                    })
                }
                Infix::Assign(op) => {
                    let value = self.expression(prec);
                    (lhs, value).gather().map(|(place, value)| Expr::Assign {
                        op,
                        place: Box::new(place),
                        value: Box::new(value),
                    })
                }
                Infix::Ternary => self.ternary(lhs),
            };
        }

        lhs
    }

    fn unary(&mut self) -> PResult<Expr<'de>> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            _ => return self.primary(),
        };
        self.advance();

        // prefix operators bind tighter than every binary operator but
        // looser than calls, subscripts and member access
        let expr = self.expression(POSTFIX)?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn primary(&mut self) -> PResult<Expr<'de>> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number => number(token.literal).map_err(|e| self.fail(token, e)),
            TokenKind::String => Ok(Expr::Str(unescape(token.literal))),
            TokenKind::Char => {
                let text = unescape(token.literal);
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Expr::Char(c)),
                    _ => Err(self.fail(token, format!("invalid character literal '{}'", token.literal))),
                }
            }
            TokenKind::Bool => Ok(Expr::Bool(token.literal == "true")),
            TokenKind::Ident => Ok(Expr::Var(VarRef::Global(token.literal))),
            TokenKind::Dollar => self.dollar(),
            TokenKind::LeftParen => {
                let inner = self.expression(0);
                let close = self.expect(TokenKind::RightParen, "expected ')'");
                (inner, close).gather().map(|(inner, ())| inner)
            }
            TokenKind::LeftSquare => self.list_literal(),
            TokenKind::EndOfFile => Err(self.fail(token, "unexpected end of input".to_string())),
            TokenKind::Invalid(e) => Err(self.fail(token, format!("invalid token '{}': {e}", token.literal))),
            _ => Err(self.fail(token, format!("unexpected token '{}'", token.literal))),
        }
    }

    fn dollar(&mut self) -> PResult<Expr<'de>> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident => Ok(Expr::Var(VarRef::Special(token.literal))),
            TokenKind::Number => token
                .literal
                .parse::<usize>()
                .map(|n| Expr::Var(VarRef::Arg(n)))
                .map_err(|_| self.fail(token, format!("invalid numeric literal '{}' after '$'", token.literal))),
            _ => Err(self.fail(token, format!("invalid token '{}' after '$'", token.literal))),
        }
    }

    /// Parses `item, item, ...` up to `close`, which is consumed. A trailing
    /// comma is allowed.
    fn delimited(&mut self, close: TokenKind, message: &str) -> PResult<Vec<Expr<'de>>> {
        if self.eat(close) {
            return Ok(Vec::new());
        }

        let mut items: Vec<PResult<Expr<'de>>> = Vec::new();

        loop {
            items.push(self.expression(0));
            if self.eat(TokenKind::Comma) {
                if self.eat(close) {
                    break;
                }
                continue;
            }
            if let Err(e) = self.expect(close, message) {
                items.push(Err(e));
            }
            break;
        }

        items.gather()
    }

    fn list_literal(&mut self) -> PResult<Expr<'de>> {
        self.delimited(TokenKind::RightSquare, "expected ',' or ']'")
            .map(Expr::List)
    }

    fn call(&mut self, callee: PResult<Expr<'de>>) -> PResult<Expr<'de>> {
        let args = self.delimited(TokenKind::RightParen, "expected ',' or ')'");
        (callee, args).gather().map(|(callee, args)| Expr::Call {
            callee: Box::new(callee),
            args,
        })
    }

    fn member(&mut self, base: PResult<Expr<'de>>) -> PResult<Expr<'de>> {
        let token = self.peek();
        let name = if token.kind == TokenKind::Ident {
            self.advance();
            Ok(token.literal)
        } else {
            Err(self.fail(token, format!("expected identifier after '.', found '{}'", token.literal)))
        };

        (base, name).gather().map(|(base, name)| Expr::Member {
            base: Box::new(base),
            name,
        })
    }

    // [N], [:], [N:], [:M], [N:M]
    fn index(&mut self, base: PResult<Expr<'de>>) -> PResult<Expr<'de>> {
        if self.eat(TokenKind::Colon) {
            return self.slice(base, None);
        }

        let index = self.expression(0);
        if self.eat(TokenKind::Colon) {
            return self.slice(base, Some(index));
        }

        let close = if self.eat(TokenKind::RightSquare) {
            Ok(())
        } else {
            let token = self.peek();
            Err(self.fail(token, format!("expected either ']' or ':', found '{}'", token.literal)))
        };

        (base, index, close).gather().map(|(base, index, ())| Expr::Subscript {
            base: Box::new(base),
            index: Box::new(index),
        })
    }

    fn slice(
        &mut self,
        base: PResult<Expr<'de>>,
        start: Option<PResult<Expr<'de>>>,
    ) -> PResult<Expr<'de>> {
        let end = (self.peek().kind != TokenKind::RightSquare).then(|| self.expression(0));
        let close = self.expect(TokenKind::RightSquare, "expected ']'");

        (base, start.transpose(), end.transpose(), close)
            .gather()
            .map(|(base, start, end, ())| Expr::Slice {
                base: Box::new(base),
                start: start.map(Box::new),
                end: end.map(Box::new),
            })
    }

    fn ternary(&mut self, cond: PResult<Expr<'de>>) -> PResult<Expr<'de>> {
        let then = self.expression(0);
        if !self.eat(TokenKind::Colon) {
            let token = self.peek();
            let missing = Err(self.fail(token, "expected ':' after '?'".to_string()));
            return (cond, then, missing).gather().map(|(cond, _, ())| cond);
        }

        let otherwise = self.expression(TERNARY);
        (cond, then, otherwise)
            .gather()
            .map(|(cond, then, otherwise)| Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            })
    }
}

/// Parses a single expression; the whole input must be consumed.
pub fn parse(input: &str) -> Result<Expr<'_>, ParseError> {
    Parser::new(None, input).parse()
}

fn number(literal: &str) -> PResult<Expr<'static>> {
    let (digits, radix) = if let Some(hex) = literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = literal.strip_prefix("0b").or_else(|| literal.strip_prefix("0B")) {
        (bin, 2)
    } else {
        (literal, 10)
    };

    if radix == 10 && literal.contains(['.', 'e', 'E']) {
        return literal
            .parse::<f64>()
            .map(Expr::Double)
            .map_err(|_| format!("invalid floating point literal '{literal}'"));
    }

    i64::from_str_radix(digits, radix)
        .map(Expr::Integer)
        .map_err(|e| format!("invalid integer literal '{literal}': {e}"))
}

/// Resolves `\n \b \r \t \" \' \\`; any other escape is kept verbatim.
fn unescape(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('b') => out.push('\u{8}'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(input: &str) -> String {
        match parse(input) {
            Ok(expr) => expr.to_string(),
            Err(e) => panic!("failed to parse {input:?}: {e}"),
        }
    }

    fn error(input: &str) -> String {
        match parse(input) {
            Ok(expr) => panic!("{input:?} unexpectedly parsed as {expr}"),
            Err(e) => e.message,
        }
    }

    #[test]
    fn gather_collects_every_error() {
        let all: (PResult<i32>, PResult<i32>, PResult<i32>) =
            (Err("one".into()), Ok(2), Err("three".into()));
        assert_eq!(all.gather(), Err("one; three".to_string()));

        let fine: (PResult<i32>, PResult<&str>) = (Ok(1), Ok("x"));
        assert_eq!(fine.gather(), Ok((1, "x")));

        let many = vec![Ok(1), Err("a".to_string()), Err("b".to_string())];
        assert_eq!(many.gather(), Err("a; b".to_string()));
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(tree("1 + 2 * 3"), "(+ 1 (* 2 3))");
        assert_eq!(tree("1 - 2 - 3"), "(- (- 1 2) 3)");
        assert_eq!(tree("2 ** 3 ** 2"), "(** 2 (** 3 2))");
        assert_eq!(tree("a = b += 1"), "(= a (+= b 1))");
        assert_eq!(tree("1 | 2 ^ 3 & 4"), "(| 1 (^ 2 (& 3 4)))");
        assert_eq!(tree("a && b || c"), "(|| (&& a b) c)");
        assert_eq!(tree("1 << 2 + 3"), "(<< 1 (+ 2 3))");
    }

    #[test]
    fn prefix_operators_bind_tightly() {
        assert_eq!(tree("-2 ** 2"), "(** (- 2) 2)");
        assert_eq!(tree("-xs[0]"), "(- (index xs 0))");
        assert_eq!(tree("!~x"), "(! (~ x))");
    }

    #[test]
    fn comparisons_chain_into_one_node() {
        assert_eq!(tree("1 < 2 <= 3 != 4"), "(1 < 2 <= 3 != 4)");
        let Ok(Expr::Comparison { operands, ops }) = parse("a == b == c") else {
            panic!("expected a comparison");
        };
        assert_eq!(operands.len(), 3);
        assert_eq!(ops, vec![CompareOp::Eq, CompareOp::Eq]);
        assert_eq!(tree("a < b && c"), "(&& (a < b) c)");
    }

    #[test]
    fn parenthesised_comparisons_stay_grouped() {
        assert_eq!(tree("(1 < 2) == true"), "((1 < 2) == true)");
        assert_eq!(tree("a < (b < c)"), "(a < (b < c))");
        assert_eq!(tree("(a < b) < c < d"), "((a < b) < c < d)");
    }

    #[test]
    fn postfix_forms() {
        assert_eq!(tree("f(1, 2)(3)"), "(call (call f 1 2) 3)");
        assert_eq!(tree("f()"), "(call f)");
        assert_eq!(tree("xs[1]"), "(index xs 1)");
        assert_eq!(tree("xs[:]"), "(slice xs _ _)");
        assert_eq!(tree("xs[1:]"), "(slice xs 1 _)");
        assert_eq!(tree("xs[:2]"), "(slice xs _ 2)");
        assert_eq!(tree("xs[1:2]"), "(slice xs 1 2)");
        assert_eq!(tree("xs.len()"), "(call (. xs len))");
        assert_eq!(tree("1.len()"), "(call (. 1 len))");
    }

    #[test]
    fn ternary_and_pipeline() {
        assert_eq!(tree("a ? b : c"), "(? a b c)");
        assert_eq!(tree("a ? b : c ? d : e"), "(? a b (? c d e))");
        assert_eq!(tree("x |> f |> g(1)"), "(|> (|> x f) (call g 1))");
        assert_eq!(tree("a = 1 |> f"), "(|> (= a 1) f)");
    }

    #[test]
    fn missing_colon_in_ternary() {
        assert_eq!(error("a ? b"), "expected ':' after '?'");
    }

    #[test]
    fn literals() {
        assert_eq!(parse("0x2A").ok(), Some(Expr::Integer(42)));
        assert_eq!(parse("0b101010").ok(), Some(Expr::Integer(42)));
        assert_eq!(parse("2.5").ok(), Some(Expr::Double(2.5)));
        assert_eq!(parse("1e3").ok(), Some(Expr::Double(1000.0)));
        assert_eq!(parse(r#""a\tb\q""#).ok(), Some(Expr::Str(Cow::Owned("a\tb\\q".into()))));
        assert_eq!(parse(r"'\n'").ok(), Some(Expr::Char('\n')));
        assert_eq!(tree("[1, \"x\", [],]"), "[1, \"x\", []]");
    }

    #[test]
    fn dollar_variables() {
        assert_eq!(parse("$0").ok(), Some(Expr::Var(VarRef::Arg(0))));
        assert_eq!(parse("$user").ok(), Some(Expr::Var(VarRef::Special("user"))));
        assert_eq!(error("$0x1"), "invalid numeric literal '0x1' after '$'");
        assert_eq!(error("$+"), "invalid token '+' after '$'");
    }

    #[test]
    fn sibling_errors_are_aggregated() {
        assert_eq!(
            error(") + ]"),
            "unexpected token ')'; unexpected token ']'"
        );
        assert_eq!(
            error("f(), ])"),
            "unexpected token ',' after expression"
        );
        assert_eq!(
            error("g(#, ])"),
            "invalid token '#': unexpected character; unexpected token ']'"
        );
    }

    #[test]
    fn unclosed_brackets() {
        assert_eq!(error("xs[1"), "expected either ']' or ':', found ''");
        assert_eq!(error("xs[1:"), "unexpected end of input; expected ']'");
        assert_eq!(error("(1 + 2"), "expected ')'");
        assert_eq!(error("f(1 2)"), "expected ',' or ')'");
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert_eq!(error("1 2"), "unexpected token '2' after expression");
        assert_eq!(error(""), "unexpected end of input");
    }

    #[test]
    fn integer_overflow_is_an_error() {
        assert!(error("99999999999999999999").starts_with("invalid integer literal"));
    }
}
