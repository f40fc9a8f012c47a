//! Tokenizer for the body of a single template action.

use gotmpl_check_template::Span;

use crate::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `.Name`
    Field(String),
    /// A lone `.`
    Dot,
    /// `$name`, or an empty name for `$`.
    Variable(String),
    Ident(String),
    Bool(bool),
    Nil,
    Int(i64),
    Float(f64),
    /// `1i`, `0x1p-2i`
    Imaginary(f64),
    Str(String),
    Char(char),
    /// `[key]` with the raw key text.
    Index(String),
    LeftParen,
    RightParen,
    Pipe,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut lexer = Lexer { src, pos: 0 };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> ExprError {
        ExprError::Malformed {
            message: message.into(),
            offset,
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let src = self.src;
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &src[start..self.pos]
    }

    fn next_token(&mut self) -> Result<Option<Token>, ExprError> {
        self.take_while(char::is_whitespace);
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let kind = match c {
            '(' => {
                self.bump();
                TokenKind::LeftParen
            }
            ')' => {
                self.bump();
                TokenKind::RightParen
            }
            '|' => {
                self.bump();
                TokenKind::Pipe
            }
            '[' => self.index()?,
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => self.number()?,
            '.' => {
                self.bump();
                let name = self.take_while(is_ident_continue);
                if name.is_empty() {
                    TokenKind::Dot
                } else if name.starts_with(|c: char| c.is_ascii_digit()) {
                    return Err(self.error(format!("bad field name `.{name}`"), start));
                } else {
                    TokenKind::Field(name.to_string())
                }
            }
            '$' => {
                self.bump();
                let name = self.take_while(is_ident_continue);
                TokenKind::Variable(name.to_string())
            }
            '"' => TokenKind::Str(self.interpreted_string()?),
            '`' => TokenKind::Str(self.raw_string()?),
            '\'' => TokenKind::Char(self.char_literal()?),
            c if c.is_ascii_digit() => self.number()?,
            '+' | '-' if self.peek_second().is_some_and(|c| c.is_ascii_digit() || c == '.') => {
                self.number()?
            }
            c if is_ident_start(c) => match self.take_while(is_ident_continue) {
                "true" => TokenKind::Bool(true),
                "false" => TokenKind::Bool(false),
                "nil" => TokenKind::Nil,
                name => TokenKind::Ident(name.to_string()),
            },
            ':' | '=' | ',' => {
                return Err(self.error(
                    "variable declarations are only allowed at the start of an action",
                    start,
                ));
            }
            other => return Err(self.error(format!("unexpected character `{other}`"), start)),
        };
        Ok(Some(Token {
            kind,
            span: Span::new(start, self.pos),
        }))
    }

    fn index(&mut self) -> Result<TokenKind, ExprError> {
        let start = self.pos;
        self.bump();
        let key_start = self.pos;
        let mut quote = None;
        let mut esc = false;
        while let Some(c) = self.bump() {
            match quote {
                Some(q) => {
                    if esc {
                        esc = false;
                    } else if c == '\\' && q != '`' {
                        esc = true;
                    } else if c == q {
                        quote = None;
                    }
                }
                None if matches!(c, '"' | '`' | '\'') => quote = Some(c),
                None if c == ']' => {
                    let key = self.src[key_start..self.pos - 1].trim();
                    if key.is_empty() {
                        return Err(self.error("empty index", start));
                    }
                    return Ok(TokenKind::Index(key.to_string()));
                }
                None => {}
            }
        }
        Err(self.error("unclosed index", start))
    }

    fn number(&mut self) -> Result<TokenKind, ExprError> {
        let start = self.pos;
        if matches!(self.peek(), Some('+' | '-')) {
            self.bump();
        }
        let hex = self.src[self.pos..].starts_with("0x") || self.src[self.pos..].starts_with("0X");
        let mut prev = ' ';
        while let Some(c) = self.peek() {
            let exponent = matches!(prev, 'p' | 'P') || (!hex && matches!(prev, 'e' | 'E'));
            let exponent_sign = matches!(c, '+' | '-') && exponent;
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                prev = c;
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        parse_number(text).ok_or_else(|| self.error(format!("bad number syntax `{text}`"), start))
    }

    fn escape(&mut self, quote: char) -> Result<char, ExprError> {
        let at = self.pos;
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape", at));
        };
        let simple = match c {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'a' => Some('\u{7}'),
            'b' => Some('\u{8}'),
            'f' => Some('\u{c}'),
            'v' => Some('\u{b}'),
            '\\' => Some('\\'),
            c if c == quote => Some(c),
            _ => None,
        };
        if let Some(c) = simple {
            return Ok(c);
        }
        let digits = match c {
            'x' => 2,
            'u' => 4,
            'U' => 8,
            '0'..='7' => {
                let mut octal = String::from(c);
                for _ in 0..2 {
                    match self.bump() {
                        Some(d @ '0'..='7') => octal.push(d),
                        _ => return Err(self.error("bad octal escape", at)),
                    }
                }
                return u32::from_str_radix(&octal, 8)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error("bad octal escape", at));
            }
            other => return Err(self.error(format!("unknown escape `\\{other}`"), at)),
        };
        let mut hex = String::new();
        for _ in 0..digits {
            match self.bump() {
                Some(d) if d.is_ascii_hexdigit() => hex.push(d),
                _ => return Err(self.error("bad hex escape", at)),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("escape is not a valid character", at))
    }

    fn interpreted_string(&mut self) -> Result<String, ExprError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated quoted string", start)),
                Some('"') => return Ok(out),
                Some('\\') => out.push(self.escape('"')?),
                Some(c) => out.push(c),
            }
        }
    }

    fn raw_string(&mut self) -> Result<String, ExprError> {
        let start = self.pos;
        self.bump();
        let body = self.take_while(|c| c != '`').to_string();
        match self.bump() {
            Some('`') => Ok(body),
            _ => Err(self.error("unterminated raw string", start)),
        }
    }

    fn char_literal(&mut self) -> Result<char, ExprError> {
        let start = self.pos;
        self.bump();
        let c = match self.bump() {
            Some('\\') => self.escape('\'')?,
            Some('\'') | None => return Err(self.error("empty character constant", start)),
            Some(c) => c,
        };
        match self.bump() {
            Some('\'') => Ok(c),
            _ => Err(self.error("unterminated character constant", start)),
        }
    }
}

/// Parses Go number literals: decimal, `0x`, `0o`, `0b`, legacy leading-zero
/// octal, `_` separators, exponents, hex floats and imaginary literals.
fn parse_number(text: &str) -> Option<TokenKind> {
    let clean = text.replace('_', "");
    let (negative, digits) = match clean.as_bytes().first() {
        Some(b'-') => (true, &clean[1..]),
        Some(b'+') => (false, &clean[1..]),
        _ => (false, clean.as_str()),
    };
    let radix_int = |prefix_len: usize, radix: u32| {
        i64::from_str_radix(&digits[prefix_len..], radix).ok()
    };
    let lower = digits.to_ascii_lowercase();
    let int = if lower.starts_with("0x") && !lower.contains(['.', 'p']) {
        radix_int(2, 16)
    } else if lower.starts_with("0o") {
        radix_int(2, 8)
    } else if lower.starts_with("0b") {
        radix_int(2, 2)
    } else if digits.len() > 1 && digits.starts_with('0') && digits.bytes().all(|b| b.is_ascii_digit()) {
        radix_int(1, 8)
    } else if digits.bytes().all(|b| b.is_ascii_digit()) && !digits.is_empty() {
        digits.parse::<i64>().ok()
    } else {
        None
    };
    if let Some(value) = int {
        return Some(TokenKind::Int(if negative { -value } else { value }));
    }
    if let Some(imag) = lower.strip_suffix('i') {
        // `0123i` is decimal, unlike `0123`
        let value = if !imag.is_empty() && imag.bytes().all(|b| b.is_ascii_digit()) {
            imag.parse::<f64>().ok()?
        } else {
            match parse_number(imag)? {
                #[allow(clippy::cast_precision_loss)]
                TokenKind::Int(v) => v as f64,
                TokenKind::Float(v) => v,
                _ => return None,
            }
        };
        return Some(TokenKind::Imaginary(if negative { -value } else { value }));
    }
    let value = if lower.starts_with("0x") {
        parse_hex_float(&lower[2..])?
    } else {
        digits.parse::<f64>().ok()?
    };
    Some(TokenKind::Float(if negative { -value } else { value }))
}

/// `1.8p1`, `.4p-2`: hex mantissa with a mandatory binary exponent.
fn parse_hex_float(body: &str) -> Option<f64> {
    let (mantissa, exponent) = body.split_once('p')?;
    let exponent: i32 = exponent.parse().ok()?;
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let mut value = 0.0_f64;
    for c in int_part.chars() {
        value = value * 16.0 + f64::from(c.to_digit(16)?);
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += f64::from(c.to_digit(16)?) * scale;
        scale /= 16.0;
    }
    Some(value * 2.0_f64.powi(exponent))
}
