//! Tokenizer for the filter language.
//!
//! Matching order at each position: whitespace, operators, keywords,
//! quoted strings, integers, identifiers. Anything else becomes a single
//! `Error` token holding the remaining input, after which the lexer stops.
//!
//! The token set is deliberately narrow: identifiers are ASCII letters
//! only, and numbers are unsigned decimal integers.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    And,
    Or,
    In,
    True,
    False,

    // Operators
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Comma,
    LParen,
    RParen,

    // Literals
    Number,
    String,
    Identifier,

    Error,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::In => "in",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Equal => "=",
            TokenKind::NotEqual => "!=",
            TokenKind::LessThan => "<",
            TokenKind::LessThanEqual => "<=",
            TokenKind::GreaterThan => ">",
            TokenKind::GreaterThanEqual => ">=",
            TokenKind::Comma => ",",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Identifier => "identifier",
            TokenKind::Error => "error",
        };
        f.write_str(text)
    }
}

/// A lexed token with its source text and byte offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

const TWO_CHAR_OPERATORS: &[(&str, TokenKind)] = &[
    ("&&", TokenKind::And),
    ("||", TokenKind::Or),
    ("<=", TokenKind::LessThanEqual),
    ("!=", TokenKind::NotEqual),
    (">=", TokenKind::GreaterThanEqual),
];

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("true", TokenKind::True),
    ("or", TokenKind::Or),
    ("in", TokenKind::In),
    ("false", TokenKind::False),
    ("and", TokenKind::And),
];

pub struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            failed: false,
        }
    }

    /// Lex the whole source; an `Error` token, if any, is always last
    pub fn tokenize(source: &str) -> Vec<Token> {
        Lexer::new(source).collect()
    }

    pub fn next_token(&mut self) -> Option<Token> {
        if self.failed {
            return None;
        }
        self.skip_whitespace();

        let rest = &self.source[self.offset..];
        if rest.is_empty() {
            return None;
        }

        let (kind, len) = scan_operator(rest)
            .or_else(|| scan_keyword(rest))
            .or_else(|| scan_string(rest))
            .or_else(|| scan_number(rest))
            .or_else(|| scan_identifier(rest))
            .unwrap_or((TokenKind::Error, rest.len()));

        if kind == TokenKind::Error {
            self.failed = true;
        }

        let token = Token {
            kind,
            text: rest[..len].to_string(),
            offset: self.offset,
        };
        self.offset += len;
        Some(token)
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.source[self.offset..];
        self.offset += rest.len() - rest.trim_start().len();
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

fn scan_operator(rest: &str) -> Option<(TokenKind, usize)> {
    for (symbol, kind) in TWO_CHAR_OPERATORS {
        if rest.starts_with(symbol) {
            return Some((*kind, 2));
        }
    }
    let kind = match rest.as_bytes().first()? {
        b'<' => TokenKind::LessThan,
        b'=' => TokenKind::Equal,
        b'>' => TokenKind::GreaterThan,
        b',' => TokenKind::Comma,
        b'(' => TokenKind::LParen,
        b')' => TokenKind::RParen,
        _ => return None,
    };
    Some((kind, 1))
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn scan_keyword(rest: &str) -> Option<(TokenKind, usize)> {
    KEYWORDS.iter().find_map(|(word, kind)| {
        let head = rest.get(..word.len())?;
        let bounded = rest
            .as_bytes()
            .get(word.len())
            .map_or(true, |b| !is_word_byte(*b));
        (head.eq_ignore_ascii_case(word) && bounded).then_some((*kind, word.len()))
    })
}

fn scan_string(rest: &str) -> Option<(TokenKind, usize)> {
    let mut chars = rest.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next()?;
        } else if c == quote {
            return Some((TokenKind::String, i + c.len_utf8()));
        }
    }
    None
}

fn scan_number(rest: &str) -> Option<(TokenKind, usize)> {
    let len = rest.bytes().take_while(u8::is_ascii_digit).count();
    (len > 0).then_some((TokenKind::Number, len))
}

fn scan_identifier(rest: &str) -> Option<(TokenKind, usize)> {
    let len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
    (len > 0).then_some((TokenKind::Identifier, len))
}

/// Strip the quotes from a string token and resolve backslash escapes
pub fn unquote(text: &str) -> String {
    let inner = text
        .get(1..text.len().saturating_sub(1))
        .unwrap_or_default();
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_operators_prefer_two_characters() {
        assert_eq!(
            kinds("<= < >= > != = && ||"),
            vec![
                TokenKind::LessThanEqual,
                TokenKind::LessThan,
                TokenKind::GreaterThanEqual,
                TokenKind::GreaterThan,
                TokenKind::NotEqual,
                TokenKind::Equal,
                TokenKind::And,
                TokenKind::Or,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive_and_bounded() {
        assert_eq!(kinds("AND Or tRuE"), vec![TokenKind::And, TokenKind::Or, TokenKind::True]);
        assert_eq!(kinds("order"), vec![TokenKind::Identifier]);
        assert_eq!(kinds("inside"), vec![TokenKind::Identifier]);
    }

    #[test]
    fn test_identifiers_are_letters_only() {
        let tokens = Lexer::tokenize("user_id");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "user");
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert_eq!(tokens[1].text, "_id");
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_numbers_have_no_sign_or_fraction() {
        assert_eq!(kinds("42"), vec![TokenKind::Number]);
        assert_eq!(kinds("-1"), vec![TokenKind::Error]);
        let tokens = Lexer::tokenize("1.5");
        assert_eq!(tokens[0].text, "1");
        assert_eq!(tokens[1].kind, TokenKind::Error);
    }

    #[test]
    fn test_strings_with_escapes() {
        let tokens = Lexer::tokenize(r#"'it\'s' "say \"hi\"""#);
        assert_eq!(tokens.len(), 2);
        assert_eq!(unquote(&tokens[0].text), "it's");
        assert_eq!(unquote(&tokens[1].text), "say \"hi\"");
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert_eq!(kinds("'open"), vec![TokenKind::Error]);
    }

    #[test]
    fn test_offsets_track_source_positions() {
        let tokens = Lexer::tokenize("  a = 1");
        assert_eq!(tokens[0].offset, 2);
        assert_eq!(tokens[1].offset, 4);
        assert_eq!(tokens[2].offset, 6);
    }
}
