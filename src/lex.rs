use std::fmt::Display;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Why a span of input could not be turned into a real token.
///
/// The lexer never fails outright: it emits a [`TokenKind::Invalid`] token
/// carrying one of these, and the parser reports it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    #[error("unexpected character")]
    UnexpectedCharacter,
    #[error("unterminated double quote string")]
    UnterminatedString,
    #[error("unterminated character literal")]
    UnterminatedChar,
    #[error("exponential form is supported with neither hexadecimal nor binary literals")]
    ExponentInBase,
    #[error("invalid floating point literal; decimal point cannot occur after the exponent ('e' or 'E')")]
    DecimalAfterExponent,
    #[error("invalid floating point literal; only valid in base 10")]
    FractionInBase,
}

#[derive(Error, Debug, Diagnostic)]
#[error("{kind}")]
#[diagnostic(help("remove or correct `{token}`"))]
pub struct LexDiagnostic {
    #[source_code]
    src: NamedSource<String>,

    #[label("this input")]
    bad_bit: SourceSpan,

    pub token: String,
    pub kind: LexError,
}

impl LexDiagnostic {
    pub fn build(filename: Option<&str>, whole: &str, token: &Token<'_>, kind: LexError) -> Self {
        LexDiagnostic {
            src: NamedSource::new(filename.unwrap_or("<input>"), whole.to_string()),
            bad_bit: token.span(),
            token: token.literal.to_string(),
            kind,
        }
    }

    pub fn line(&self) -> usize {
        let src = self.src.inner();
        // token offsets always sit on a char boundary
        let end = self.bad_bit.offset().min(src.len());
        src[..end].matches('\n').count() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    /// Exact source text. For string and char literals this is the raw text
    /// between the quotes, escapes untouched.
    pub literal: &'de str,
    pub offset: usize,
}

impl Token<'_> {
    pub fn span(&self) -> SourceSpan {
        SourceSpan::from(self.offset..self.offset + self.literal.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Invalid(LexError),
    EndOfFile,

    Fn,
    If,
    Let,
    Else,
    While,
    Return,
    For,

    Semicolon,
    Dollar,
    Colon,
    Pipe,
    Ampersand,
    Dot,
    Star,
    Caret,
    Bang,
    Plus,
    Comma,
    Minus,
    Slash,
    LeftParen,
    RightParen,
    LeftSquare,
    RightSquare,
    LeftBrace,
    RightBrace,
    Less,
    Greater,
    Equal,
    Percent,
    Tilde,
    Question,

    AndAnd,
    OrOr,
    EqualEqual,
    BangEqual,
    LessEqual,
    GreaterEqual,
    ShiftLeft,
    ShiftRight,
    StarStar,
    Pipeline,
    RightArrow,

    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    CaretEqual,
    AmpersandEqual,
    PipeEqual,
    ShiftLeftEqual,
    ShiftRightEqual,
    StarStarEqual,

    String,
    Char,
    Number,
    Bool,
    Ident,
}

impl TokenKind {
    fn name(self) -> &'static str {
        match self {
            TokenKind::Invalid(_) => "INVALID",
            TokenKind::EndOfFile => "EOF",
            TokenKind::Fn => "FN",
            TokenKind::If => "IF",
            TokenKind::Let => "LET",
            TokenKind::Else => "ELSE",
            TokenKind::While => "WHILE",
            TokenKind::Return => "RETURN",
            TokenKind::For => "FOR",
            TokenKind::Semicolon => "SEMICOLON",
            TokenKind::Dollar => "DOLLAR",
            TokenKind::Colon => "COLON",
            TokenKind::Pipe => "PIPE",
            TokenKind::Ampersand => "AMPERSAND",
            TokenKind::Dot => "DOT",
            TokenKind::Star => "STAR",
            TokenKind::Caret => "CARET",
            TokenKind::Bang => "BANG",
            TokenKind::Plus => "PLUS",
            TokenKind::Comma => "COMMA",
            TokenKind::Minus => "MINUS",
            TokenKind::Slash => "SLASH",
            TokenKind::LeftParen => "LEFT_PAREN",
            TokenKind::RightParen => "RIGHT_PAREN",
            TokenKind::LeftSquare => "LEFT_SQUARE",
            TokenKind::RightSquare => "RIGHT_SQUARE",
            TokenKind::LeftBrace => "LEFT_BRACE",
            TokenKind::RightBrace => "RIGHT_BRACE",
            TokenKind::Less => "LESS",
            TokenKind::Greater => "GREATER",
            TokenKind::Equal => "EQUAL",
            TokenKind::Percent => "PERCENT",
            TokenKind::Tilde => "TILDE",
            TokenKind::Question => "QUESTION",
            TokenKind::AndAnd => "AND_AND",
            TokenKind::OrOr => "OR_OR",
            TokenKind::EqualEqual => "EQUAL_EQUAL",
            TokenKind::BangEqual => "BANG_EQUAL",
            TokenKind::LessEqual => "LESS_EQUAL",
            TokenKind::GreaterEqual => "GREATER_EQUAL",
            TokenKind::ShiftLeft => "SHIFT_LEFT",
            TokenKind::ShiftRight => "SHIFT_RIGHT",
            TokenKind::StarStar => "STAR_STAR",
            TokenKind::Pipeline => "PIPELINE",
            TokenKind::RightArrow => "RIGHT_ARROW",
            TokenKind::PlusEqual => "PLUS_EQUAL",
            TokenKind::MinusEqual => "MINUS_EQUAL",
            TokenKind::StarEqual => "STAR_EQUAL",
            TokenKind::SlashEqual => "SLASH_EQUAL",
            TokenKind::PercentEqual => "PERCENT_EQUAL",
            TokenKind::CaretEqual => "CARET_EQUAL",
            TokenKind::AmpersandEqual => "AMPERSAND_EQUAL",
            TokenKind::PipeEqual => "PIPE_EQUAL",
            TokenKind::ShiftLeftEqual => "SHIFT_LEFT_EQUAL",
            TokenKind::ShiftRightEqual => "SHIFT_RIGHT_EQUAL",
            TokenKind::StarStarEqual => "STAR_STAR_EQUAL",
            TokenKind::String => "STRING",
            TokenKind::Char => "CHAR",
            TokenKind::Number => "NUMBER",
            TokenKind::Bool => "BOOL",
            TokenKind::Ident => "IDENTIFIER",
        }
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.literal;
        match self.kind {
            TokenKind::String => write!(f, "STRING \"{lit}\""),
            TokenKind::Char => write!(f, "CHAR '{lit}'"),
            TokenKind::Invalid(e) => write!(f, "INVALID {lit} ({e})"),
            TokenKind::EndOfFile => write!(f, "EOF"),
            kind => write!(f, "{} {lit}", kind.name()),
        }
    }
}

// longest match first: every three-character operator is tried before
// any two-character one sharing its prefix.
const THREE_CHAR: &[(&str, TokenKind)] = &[
    ("**=", TokenKind::StarStarEqual),
    ("<<=", TokenKind::ShiftLeftEqual),
    (">>=", TokenKind::ShiftRightEqual),
];

const TWO_CHAR: &[(&str, TokenKind)] = &[
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    ("==", TokenKind::EqualEqual),
    ("!=", TokenKind::BangEqual),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
    ("<<", TokenKind::ShiftLeft),
    (">>", TokenKind::ShiftRight),
    ("**", TokenKind::StarStar),
    ("|>", TokenKind::Pipeline),
    ("+=", TokenKind::PlusEqual),
    ("-=", TokenKind::MinusEqual),
    ("*=", TokenKind::StarEqual),
    ("/=", TokenKind::SlashEqual),
    ("%=", TokenKind::PercentEqual),
    ("^=", TokenKind::CaretEqual),
    ("&=", TokenKind::AmpersandEqual),
    ("|=", TokenKind::PipeEqual),
    ("->", TokenKind::RightArrow),
];

pub struct Lexer<'de> {
    whole: &'de str,
    rest: &'de str,
    pub byte: usize,
    prev: Option<TokenKind>,
    done: bool,
}

impl<'de> Lexer<'de> {
    pub fn new(input: &'de str) -> Self {
        Lexer {
            whole: input,
            rest: input,
            byte: 0,
            prev: None,
            done: false,
        }
    }

    pub fn source(&self) -> &'de str {
        self.whole
    }

    fn take(&mut self, len: usize, kind: TokenKind) -> Token<'de> {
        let token = Token {
            kind,
            literal: &self.rest[..len],
            offset: self.byte,
        };
        self.rest = &self.rest[len..];
        self.byte += len;
        token
    }

    fn lex_one(&mut self) -> Token<'de> {
        let trimmed = self.rest.trim_start_matches([' ', '\t', '\n', '\r']);
        self.byte += self.rest.len() - trimmed.len();
        self.rest = trimmed;

        let Some(c) = self.rest.chars().next() else {
            return Token {
                kind: TokenKind::EndOfFile,
                literal: "",
                offset: self.byte,
            };
        };

        for (text, kind) in THREE_CHAR.iter().chain(TWO_CHAR) {
            if self.rest.starts_with(text) {
                return self.take(text.len(), *kind);
            }
        }

        let kind = match c {
            '0'..='9' => return self.number(),
            '"' => return self.string(),
            '\'' => return self.char_literal(),
            'a'..='z' | 'A'..='Z' | '_' => return self.ident(),
            ';' => TokenKind::Semicolon,
            '$' => TokenKind::Dollar,
            ':' => TokenKind::Colon,
            '|' => TokenKind::Pipe,
            '&' => TokenKind::Ampersand,
            '.' => TokenKind::Dot,
            '*' => TokenKind::Star,
            '^' => TokenKind::Caret,
            '!' => TokenKind::Bang,
            '+' => TokenKind::Plus,
            ',' => TokenKind::Comma,
            '-' => TokenKind::Minus,
            '/' => TokenKind::Slash,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftSquare,
            ']' => TokenKind::RightSquare,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '=' => TokenKind::Equal,
            '%' => TokenKind::Percent,
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            c => {
                tracing::warn!(target: "lexer", "invalid token - stream: '{}'", self.rest);
                return self.take(c.len_utf8(), TokenKind::Invalid(LexError::UnexpectedCharacter));
            }
        };
        self.take(1, kind)
    }

    fn number(&mut self) -> Token<'de> {
        let bytes = self.rest.as_bytes();
        let len = bytes.len();
        let digit = |b: u8, base: u32| (b as char).is_digit(base);

        let (base, mut end) = match bytes {
            [b'0', b'x' | b'X', ..] => (16, 2),
            [b'0', b'b' | b'B', ..] => (2, 2),
            _ => (10, 0),
        };

        while end < len && digit(bytes[end], base) {
            end += 1;
        }

        // hex literals already swallowed any 'e' as a digit
        let mut had_exp = false;
        if end < len && matches!(bytes[end], b'e' | b'E') {
            if base != 10 {
                end += 1;
                while end < len && bytes[end].is_ascii_alphanumeric() {
                    end += 1;
                }
                return self.take(end, TokenKind::Invalid(LexError::ExponentInBase));
            }

            end += 1;
            if end < len && matches!(bytes[end], b'+' | b'-') {
                end += 1;
            }
            while end < len && bytes[end].is_ascii_digit() {
                end += 1;
            }
            had_exp = true;
        }

        // `x.0.1` is member access on `x.0`, not the float `0.1`; and `1.len()`
        // is a method call on an integer.
        let fraction_follows = end < len
            && bytes[end] == b'.'
            && bytes.get(end + 1).is_some_and(u8::is_ascii_digit)
            && self.prev != Some(TokenKind::Dot);

        if fraction_follows {
            let error = if base != 10 {
                Some(LexError::FractionInBase)
            } else if had_exp {
                Some(LexError::DecimalAfterExponent)
            } else {
                None
            };

            end += 1;
            while end < len && bytes[end].is_ascii_digit() {
                end += 1;
            }

            if let Some(error) = error {
                return self.take(end, TokenKind::Invalid(error));
            }
        }

        self.take(end, TokenKind::Number)
    }

    fn string(&mut self) -> Token<'de> {
        let inner = &self.rest[1..];
        let mut chars = inner.char_indices();

        // escapes stay raw here; the parser unescapes when it builds the literal
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => {
                    let token = Token {
                        kind: TokenKind::String,
                        literal: &inner[..i],
                        offset: self.byte + 1,
                    };
                    self.rest = &inner[i + 1..];
                    self.byte += i + 2;
                    return token;
                }
                _ => {}
            }
        }

        let rest = self.rest.len();
        self.take(rest, TokenKind::Invalid(LexError::UnterminatedString))
    }

    fn char_literal(&mut self) -> Token<'de> {
        let inner = &self.rest[1..];
        let mut chars = inner.char_indices();

        let body_end = match chars.next() {
            Some((_, '\\')) => chars.next().map(|(i, c)| i + c.len_utf8()),
            Some((i, c)) => Some(i + c.len_utf8()),
            None => None,
        };

        match body_end {
            Some(end) if inner[end..].starts_with('\'') => {
                let token = Token {
                    kind: TokenKind::Char,
                    literal: &inner[..end],
                    offset: self.byte + 1,
                };
                self.rest = &inner[end + 1..];
                self.byte += end + 2;
                token
            }
            Some(end) => self.take(end + 1, TokenKind::Invalid(LexError::UnterminatedChar)),
            None => self.take(1, TokenKind::Invalid(LexError::UnterminatedChar)),
        }
    }

    fn ident(&mut self) -> Token<'de> {
        let end = self
            .rest
            .find(|c| !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_'))
            .unwrap_or(self.rest.len());

        let kind = match &self.rest[..end] {
            "fn" => TokenKind::Fn,
            "if" => TokenKind::If,
            "let" => TokenKind::Let,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "for" => TokenKind::For,
            "true" | "false" => TokenKind::Bool,
            _ => TokenKind::Ident,
        };

        self.take(end, kind)
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Token<'de>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let token = self.lex_one();
        if token.kind == TokenKind::EndOfFile {
            self.done = true;
        }
        self.prev = Some(token.kind);
        Some(token)
    }
}

/// Lexes the whole input. The last token is always [`TokenKind::EndOfFile`].
pub fn lex(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}
