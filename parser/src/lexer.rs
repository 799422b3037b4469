/// Lexer over in-memory source text.
///
/// The [`Lexer`] implements [`Iterator`] over [`Token`]s and tracks byte
/// offset, line and column for every token it produces. The final token is
/// always [`TokenKind::Eof`]; iteration ends after it.
///
/// Line comments start with `//` and run to the end of the line. Strings
/// are double-quoted and understand `\n`, `\t`, `\"` and `\\`.
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

pub struct Lexer<'a> {
    src: &'a [u8],
    offset: usize,
    line: usize,
    column: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            offset: 0,
            line: 1,
            column: 1,
            done: false,
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.offset, self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.offset).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        self.src.get(self.offset + n).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.offset += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_ahead(1) == Some(b'/') => {
                    while let Some(byte) = self.peek() {
                        if byte == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn text(&self, start: usize) -> &'a str {
        // Token boundaries only ever fall on ASCII bytes.
        std::str::from_utf8(&self.src[start..self.offset]).unwrap_or("")
    }

    fn lex_number(&mut self, start: usize) -> TokenKind {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        if self.peek() == Some(b'.')
            && matches!(self.peek_ahead(1), Some(b'0'..=b'9'))
        {
            self.advance();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        let text = self.text(start);
        match text.parse::<f64>() {
            Ok(value) => TokenKind::Number(value),
            Err(_) => TokenKind::Error(format!("malformed number `{text}`")),
        }
    }

    fn lex_word(&mut self, start: usize) -> TokenKind {
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
        ) {
            self.advance();
        }
        let word = self.text(start);
        TokenKind::keyword(word)
            .unwrap_or_else(|| TokenKind::Identifier(word.to_string()))
    }

    fn lex_string(&mut self) -> TokenKind {
        let mut bytes = Vec::new();
        loop {
            match self.advance() {
                None => {
                    return TokenKind::Error("unterminated string".into());
                }
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(b'"') => bytes.push(b'"'),
                    Some(b'\\') => bytes.push(b'\\'),
                    Some(other) => {
                        return TokenKind::Error(format!(
                            "unknown escape `\\{}`",
                            other as char
                        ));
                    }
                    None => {
                        return TokenKind::Error("unterminated string".into());
                    }
                },
                Some(byte) => bytes.push(byte),
            }
        }
        match String::from_utf8(bytes) {
            Ok(s) => TokenKind::String(s),
            Err(_) => TokenKind::Error("string is not valid UTF-8".into()),
        }
    }

    fn lex_token(&mut self) -> Token {
        self.skip_trivia();
        let start_pos = self.pos();
        let start = self.offset;

        let Some(byte) = self.advance() else {
            self.done = true;
            return Token::new(TokenKind::Eof, Span::point(start_pos));
        };

        let kind = match byte {
            b'=' if self.peek() == Some(b'=') => {
                self.advance();
                TokenKind::Eq
            }
            b'!' if self.peek() == Some(b'=') => {
                self.advance();
                TokenKind::NotEq
            }
            b'=' => TokenKind::Assign,
            b'!' => TokenKind::Bang,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Asterisk,
            b'/' => TokenKind::Slash,
            b'<' => TokenKind::Lt,
            b'>' => TokenKind::Gt,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'"' => self.lex_string(),
            b'0'..=b'9' => self.lex_number(start),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_word(start),
            other => {
                // Swallow the rest of a multi-byte character.
                while matches!(self.peek(), Some(0x80..=0xBF)) {
                    self.advance();
                }
                if other.is_ascii() {
                    TokenKind::Error(format!(
                        "unexpected character `{}`",
                        other as char
                    ))
                } else {
                    TokenKind::Error(format!(
                        "unexpected character `{}`",
                        self.text(start)
                    ))
                }
            }
        };

        Token::new(kind, Span::new(start_pos, self.pos()))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        Some(self.lex_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).map(|t| t.kind).collect()
    }

    #[test]
    fn lex_let_statement() {
        assert_eq!(kinds("let five = 5;"), vec![
            TokenKind::Let,
            TokenKind::Identifier("five".into()),
            TokenKind::Assign,
            TokenKind::Number(5.0),
            TokenKind::Semicolon,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn lex_operators() {
        assert_eq!(kinds("== != = ! < > + - * /"), vec![
            TokenKind::Eq,
            TokenKind::NotEq,
            TokenKind::Assign,
            TokenKind::Bang,
            TokenKind::Lt,
            TokenKind::Gt,
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Asterisk,
            TokenKind::Slash,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn lex_delimiters_and_keywords() {
        assert_eq!(kinds("fn(x) { if else return true false } [ ] :"), vec![
            TokenKind::Function,
            TokenKind::LParen,
            TokenKind::Identifier("x".into()),
            TokenKind::RParen,
            TokenKind::LBrace,
            TokenKind::If,
            TokenKind::Else,
            TokenKind::Return,
            TokenKind::True,
            TokenKind::False,
            TokenKind::RBrace,
            TokenKind::LBracket,
            TokenKind::RBracket,
            TokenKind::Colon,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn lex_fractional_number() {
        assert_eq!(kinds("3.25 7."), vec![
            TokenKind::Number(3.25),
            TokenKind::Number(7.0),
            TokenKind::Error("unexpected character `.`".into()),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn lex_string_escapes() {
        assert_eq!(kinds(r#""a\"b\n""#), vec![
            TokenKind::String("a\"b\n".into()),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn lex_unterminated_string() {
        assert_eq!(kinds("\"abc"), vec![
            TokenKind::Error("unterminated string".into()),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("1 // one\n2"), vec![
            TokenKind::Number(1.0),
            TokenKind::Number(2.0),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn spans_track_lines() {
        let tokens: Vec<Token> = Lexer::new("a\n  bc").collect();
        assert_eq!(tokens[1].span.start, Pos::new(4, 2, 3));
        assert_eq!(tokens[1].span.end, Pos::new(6, 2, 5));
    }
}
