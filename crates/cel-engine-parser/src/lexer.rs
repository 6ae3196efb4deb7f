//! Lexer built on logos.

use logos::Logos;

use crate::ast::Span;

/// A token with its source span.
pub type SpannedToken = (Token, Span);

/// Lexer error with span information.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

/// Tokens.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // === Numeric Literals ===

    // Hex unsigned: 0x1Fu, 0X1FU
    #[regex(r"0[xX][0-9a-fA-F]+[uU]", lex_hex_uint)]
    // Decimal unsigned: 123u, 123U
    #[regex(r"[0-9]+[uU]", lex_decimal_uint, priority = 4)]
    UInt(u64),

    /// Magnitude of a signed integer literal. Values above `i64::MAX` are
    /// only valid directly under a unary minus.
    #[regex(r"0[xX][0-9a-fA-F]+", lex_hex_int, priority = 3)]
    #[regex(r"[0-9]+", lex_decimal_int, priority = 1)]
    Int(u64),

    // 1.5, 1.5e10, .5
    #[regex(r"[0-9]*\.[0-9]+([eE][+-]?[0-9]+)?", lex_float, priority = 5)]
    // 1e10, 1E-5
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", lex_float, priority = 2)]
    Double(f64),

    // === String Literals ===
    #[regex(r#"""""#, |lex| lex_triple(lex, "\"\"\"", Mode::Text, false))]
    #[regex(r"'''", |lex| lex_triple(lex, "'''", Mode::Text, false))]
    #[regex(r#"[rR]""""#, |lex| lex_triple(lex, "\"\"\"", Mode::Text, true))]
    #[regex(r"[rR]'''", |lex| lex_triple(lex, "'''", Mode::Text, true))]
    #[regex(r#"[rR]""#, |lex| lex_raw(lex, '"'))]
    #[regex(r"[rR]'", |lex| lex_raw(lex, '\''))]
    #[regex(r#"""#, |lex| lex_quoted(lex, '"', Mode::Text))]
    #[regex(r"'", |lex| lex_quoted(lex, '\'', Mode::Text))]
    String(String),

    // === Bytes Literals ===
    #[regex(r#"[bB]""""#, |lex| lex_triple_bytes(lex, "\"\"\""))]
    #[regex(r"[bB]'''", |lex| lex_triple_bytes(lex, "'''"))]
    #[regex(r#"([bB][rR]|[rR][bB])""#, |lex| lex_raw(lex, '"').map(String::into_bytes))]
    #[regex(r"([bB][rR]|[rR][bB])'", |lex| lex_raw(lex, '\'').map(String::into_bytes))]
    #[regex(r#"[bB]""#, |lex| lex_quoted_bytes(lex, '"'))]
    #[regex(r"[bB]'", |lex| lex_quoted_bytes(lex, '\''))]
    Bytes(Vec<u8>),

    // === Keywords ===
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("in")]
    In,

    // === Reserved Words ===
    #[token("as", |_| "as".to_string())]
    #[token("break", |_| "break".to_string())]
    #[token("const", |_| "const".to_string())]
    #[token("continue", |_| "continue".to_string())]
    #[token("else", |_| "else".to_string())]
    #[token("for", |_| "for".to_string())]
    #[token("function", |_| "function".to_string())]
    #[token("if", |_| "if".to_string())]
    #[token("import", |_| "import".to_string())]
    #[token("let", |_| "let".to_string())]
    #[token("loop", |_| "loop".to_string())]
    #[token("package", |_| "package".to_string())]
    #[token("namespace", |_| "namespace".to_string())]
    #[token("return", |_| "return".to_string())]
    #[token("var", |_| "var".to_string())]
    #[token("void", |_| "void".to_string())]
    #[token("while", |_| "while".to_string())]
    Reserved(String),

    // === Identifier ===
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 0)]
    Ident(String),

    // === Operators (multi-char first) ===
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("&&")]
    And,
    #[token("||")]
    Or,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("!")]
    Not,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Int(n) => write!(f, "{}", n),
            Token::UInt(n) => write!(f, "{}u", n),
            Token::Double(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "{:?}", s),
            Token::Bytes(b) => write!(f, "b\"{}\"", b.escape_ascii()),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::In => write!(f, "in"),
            Token::Reserved(s) => write!(f, "{}", s),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::EqEq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
        }
    }
}

// === Numbers ===

fn lex_decimal_int(lex: &mut logos::Lexer<Token>) -> Option<u64> {
    lex.slice().parse().ok()
}

fn lex_decimal_uint(lex: &mut logos::Lexer<Token>) -> Option<u64> {
    let s = lex.slice();
    s[..s.len() - 1].parse().ok()
}

fn lex_hex_int(lex: &mut logos::Lexer<Token>) -> Option<u64> {
    let s = lex.slice();
    u64::from_str_radix(&s[2..], 16).ok()
}

fn lex_hex_uint(lex: &mut logos::Lexer<Token>) -> Option<u64> {
    let s = lex.slice();
    u64::from_str_radix(&s[2..s.len() - 1], 16).ok()
}

fn lex_float(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

// === Strings and bytes ===

/// How escape sequences are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// `\xHH` and octal escapes produce code points; `\u`/`\U` allowed.
    Text,
    /// `\xHH` and octal escapes produce raw bytes; `\u`/`\U` rejected.
    Bytes,
}

/// Find the closing quote of a single-line literal, honoring backslash escapes.
/// Returns the body length in bytes.
fn find_closing_quote(remainder: &str, quote: char) -> Option<usize> {
    let mut chars = remainder.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next()?;
            }
            '\n' => return None,
            c if c == quote => return Some(i),
            _ => {}
        }
    }
    None
}

fn lex_quoted(lex: &mut logos::Lexer<Token>, quote: char, mode: Mode) -> Option<String> {
    let body_len = find_closing_quote(lex.remainder(), quote)?;
    let decoded = decode_escapes(&lex.remainder()[..body_len], mode)?;
    lex.bump(body_len + quote.len_utf8());
    String::from_utf8(decoded).ok()
}

fn lex_quoted_bytes(lex: &mut logos::Lexer<Token>, quote: char) -> Option<Vec<u8>> {
    let body_len = find_closing_quote(lex.remainder(), quote)?;
    let decoded = decode_escapes(&lex.remainder()[..body_len], Mode::Bytes)?;
    lex.bump(body_len + quote.len_utf8());
    Some(decoded)
}

fn lex_raw(lex: &mut logos::Lexer<Token>, quote: char) -> Option<String> {
    let remainder = lex.remainder();
    let end = remainder.find([quote, '\n'])?;
    if !remainder[end..].starts_with(quote) {
        return None;
    }
    let content = remainder[..end].to_string();
    lex.bump(end + quote.len_utf8());
    Some(content)
}

fn lex_triple(
    lex: &mut logos::Lexer<Token>,
    end_quote: &str,
    mode: Mode,
    raw: bool,
) -> Option<String> {
    let remainder = lex.remainder();
    let end = remainder.find(end_quote)?;
    let content = &remainder[..end];
    let text = if raw {
        content.to_string()
    } else {
        String::from_utf8(decode_escapes(content, mode)?).ok()?
    };
    lex.bump(end + end_quote.len());
    Some(text)
}

fn lex_triple_bytes(lex: &mut logos::Lexer<Token>, end_quote: &str) -> Option<Vec<u8>> {
    let remainder = lex.remainder();
    let end = remainder.find(end_quote)?;
    let bytes = decode_escapes(&remainder[..end], Mode::Bytes)?;
    lex.bump(end + end_quote.len());
    Some(bytes)
}

/// Decode the escape sequences of a literal body.
fn decode_escapes(body: &str, mode: Mode) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();

    let push_char = |out: &mut Vec<u8>, c: char| {
        let mut buf = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    };
    let push_unit = |out: &mut Vec<u8>, value: u8| match mode {
        Mode::Text => {
            let mut buf = [0u8; 4];
            out.extend_from_slice(char::from(value).encode_utf8(&mut buf).as_bytes());
        }
        Mode::Bytes => out.push(value),
    };

    while let Some(c) = chars.next() {
        if c != '\\' {
            push_char(&mut out, c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push(b'\\'),
            '/' => out.push(b'/'),
            '"' => out.push(b'"'),
            '\'' => out.push(b'\''),
            '`' => out.push(b'`'),
            '?' => out.push(b'?'),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0C),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'v' => out.push(0x0B),
            'x' | 'X' => {
                let hex = take_digits(&mut chars, 2, 16)?;
                push_unit(&mut out, u8::try_from(hex).ok()?);
            }
            'u' if mode == Mode::Text => {
                let code = take_digits(&mut chars, 4, 16)?;
                push_char(&mut out, char::from_u32(code)?);
            }
            'U' if mode == Mode::Text => {
                let code = take_digits(&mut chars, 8, 16)?;
                push_char(&mut out, char::from_u32(code)?);
            }
            first @ '0'..='3' => {
                let rest = take_digits(&mut chars, 2, 8)?;
                let value = (first as u32 - '0' as u32) * 64 + rest;
                push_unit(&mut out, u8::try_from(value).ok()?);
            }
            _ => return None,
        }
    }
    Some(out)
}

fn take_digits(chars: &mut std::str::Chars<'_>, count: usize, radix: u32) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..count {
        value = value * radix + chars.next()?.to_digit(radix)?;
    }
    Some(value)
}

// === Public Lexer API ===

/// Tokenize the input string.
///
/// Lexing continues past invalid input so that every bad literal or stray
/// character is reported; the tokens returned alongside errors are the
/// valid ones.
pub fn lex(input: &str) -> (Vec<SpannedToken>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut lexer = Token::lexer(input);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let slice = &input[span.clone()];
                errors.push(LexError {
                    message: describe_invalid(slice),
                    span,
                });
            }
        }
    }

    (tokens, errors)
}

fn describe_invalid(slice: &str) -> String {
    match slice.chars().next() {
        Some(c) if c.is_ascii_digit() || c == '.' => {
            format!("invalid numeric literal '{}'", slice)
        }
        Some('"' | '\'' | 'r' | 'R' | 'b' | 'B') => {
            "invalid or unterminated string literal".to_string()
        }
        _ => format!("unexpected character '{}'", slice),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_tokens(input: &str) -> Vec<Token> {
        let (tokens, errors) = lex(input);
        assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
        tokens.into_iter().map(|(tok, _)| tok).collect()
    }

    fn lex_errors(input: &str) -> Vec<LexError> {
        lex(input).1
    }

    #[test]
    fn lex_integers() {
        assert_eq!(lex_tokens("123"), vec![Token::Int(123)]);
        assert_eq!(lex_tokens("0"), vec![Token::Int(0)]);
        assert_eq!(lex_tokens("0x1F"), vec![Token::Int(31)]);
        assert_eq!(lex_tokens("0XAB"), vec![Token::Int(171)]);
        assert_eq!(
            lex_tokens("9223372036854775808"),
            vec![Token::Int(9223372036854775808)]
        );
    }

    #[test]
    fn lex_unsigned_integers() {
        assert_eq!(lex_tokens("123u"), vec![Token::UInt(123)]);
        assert_eq!(lex_tokens("123U"), vec![Token::UInt(123)]);
        assert_eq!(lex_tokens("0x1Fu"), vec![Token::UInt(31)]);
    }

    #[test]
    fn lex_doubles() {
        assert_eq!(lex_tokens("1.5"), vec![Token::Double(1.5)]);
        assert_eq!(lex_tokens("1e10"), vec![Token::Double(1e10)]);
        assert_eq!(lex_tokens("1.5e-3"), vec![Token::Double(1.5e-3)]);
        assert_eq!(lex_tokens(".5"), vec![Token::Double(0.5)]);
    }

    #[test]
    fn lex_strings() {
        assert_eq!(lex_tokens(r#""hello""#), vec![Token::String("hello".to_string())]);
        assert_eq!(lex_tokens("'world'"), vec![Token::String("world".to_string())]);
        assert_eq!(
            lex_tokens(r#""hello\nworld""#),
            vec![Token::String("hello\nworld".to_string())]
        );
        assert_eq!(
            lex_tokens(r#""say \"hi\"""#),
            vec![Token::String("say \"hi\"".to_string())]
        );
    }

    #[test]
    fn lex_raw_strings() {
        assert_eq!(lex_tokens(r#"r"hello\n""#), vec![Token::String(r"hello\n".to_string())]);
        assert_eq!(lex_tokens(r"R'a\b'"), vec![Token::String(r"a\b".to_string())]);
    }

    #[test]
    fn lex_triple_strings() {
        assert_eq!(
            lex_tokens("\"\"\"multi\nline\"\"\""),
            vec![Token::String("multi\nline".to_string())]
        );
        assert_eq!(
            lex_tokens("'''tab\\there'''"),
            vec![Token::String("tab\there".to_string())]
        );
    }

    #[test]
    fn lex_bytes() {
        assert_eq!(lex_tokens(r#"b"hello""#), vec![Token::Bytes(b"hello".to_vec())]);
        assert_eq!(lex_tokens("b'world'"), vec![Token::Bytes(b"world".to_vec())]);
        assert_eq!(lex_tokens(r#"b"\xff\000""#), vec![Token::Bytes(vec![0xff, 0x00])]);
        assert_eq!(lex_tokens(r#"b"ÿ""#), vec![Token::Bytes(vec![0xc3, 0xbf])]);
        assert_eq!(lex_tokens(r#"br"\x""#), vec![Token::Bytes(b"\\x".to_vec())]);
    }

    #[test]
    fn lex_text_hex_escape_is_code_point() {
        assert_eq!(lex_tokens(r#""\xff""#), vec![Token::String("\u{FF}".to_string())]);
    }

    #[test]
    fn lex_keywords() {
        assert_eq!(lex_tokens("true"), vec![Token::True]);
        assert_eq!(lex_tokens("false"), vec![Token::False]);
        assert_eq!(lex_tokens("null"), vec![Token::Null]);
        assert_eq!(lex_tokens("in"), vec![Token::In]);
        assert_eq!(lex_tokens("index"), vec![Token::Ident("index".to_string())]);
    }

    #[test]
    fn lex_operators() {
        assert_eq!(
            lex_tokens("+ - * / %"),
            vec![Token::Plus, Token::Minus, Token::Star, Token::Slash, Token::Percent]
        );
        assert_eq!(
            lex_tokens("== != < <= > >="),
            vec![Token::EqEq, Token::Ne, Token::Lt, Token::Le, Token::Gt, Token::Ge]
        );
        assert_eq!(lex_tokens("&& || !"), vec![Token::And, Token::Or, Token::Not]);
        assert_eq!(lex_tokens("? :"), vec![Token::Question, Token::Colon]);
    }

    #[test]
    fn lex_with_comments() {
        assert_eq!(
            lex_tokens("a // comment\n+ b"),
            vec![Token::Ident("a".to_string()), Token::Plus, Token::Ident("b".to_string())]
        );
    }

    #[test]
    fn lex_unicode_escapes() {
        assert_eq!(lex_tokens(r#""\u03B1""#), vec![Token::String("α".to_string())]);
        assert_eq!(lex_tokens(r#""\U0001F600""#), vec![Token::String("😀".to_string())]);
    }

    #[test]
    fn lex_octal_escapes() {
        assert_eq!(lex_tokens(r#""\101""#), vec![Token::String("A".to_string())]);
        assert_eq!(lex_tokens(r#""\377""#), vec![Token::String("\u{FF}".to_string())]);
    }

    #[test]
    fn lex_reserved_words() {
        for word in ["if", "else", "for", "while", "return", "let", "const", "var", "as"] {
            assert_eq!(lex_tokens(word), vec![Token::Reserved(word.to_string())]);
        }
    }

    #[test]
    fn unicode_escape_rejected_in_bytes() {
        assert_eq!(lex_errors(r#"b"\u0041""#).len(), 1);
    }

    #[test]
    fn unterminated_string_reported() {
        let errors = lex_errors(r#""abc"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unterminated"));
    }

    #[test]
    fn all_bad_characters_reported() {
        let (tokens, errors) = lex("a # b $ c");
        assert_eq!(errors.len(), 2);
        assert_eq!(tokens.len(), 3);
        assert_eq!(errors[1].span, 6..7);
    }

    #[test]
    fn oversized_integer_is_an_error() {
        let errors = lex_errors("99999999999999999999");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("numeric literal"));
    }
}
