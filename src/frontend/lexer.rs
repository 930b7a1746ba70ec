//! Lexer
//!
//! Converts source text into a stream of tokens.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result};

/// The lexer state
pub struct Lexer {
    source: Vec<char>,
    /// Current position in source
    pos: usize,
    /// Start position of the current token
    start: usize,
    /// Current 1-based line number
    line: u32,
}

impl Lexer {
    /// Create a new lexer for the given source text
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            start: 0,
            line: 1,
        }
    }

    /// Tokenize the whole input, ending with an `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let at_end = token.kind == TokenKind::Eof;
            tokens.push(token);
            if at_end {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c == Some('\n') {
            self.line += 1;
        }
        self.pos += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.line)
    }

    /// If the next character is `expected`, consume it and produce `matched`;
    /// otherwise produce `unmatched`.
    fn two_char_token(&mut self, expected: char, matched: TokenKind, unmatched: TokenKind) -> Token {
        if self.peek() == Some(expected) {
            self.advance();
            self.make_token(matched)
        } else {
            self.make_token(unmatched)
        }
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                // Line comment
                '/' if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                // Block comment
                '/' if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    while !self.is_at_end() {
                        if self.peek() == Some('*') && self.peek_next() == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.source[self.start..self.pos].iter().collect();
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));
        self.make_token(kind)
    }

    /// Read a decimal integer constant
    fn read_number(&mut self) -> Result<Token> {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.source[self.start..self.pos].iter().collect();
        let value = text
            .parse::<i32>()
            .map_err(|_| Error::IntConstOutOfRange { line: self.line })?;
        Ok(self.make_token(TokenKind::IntConst(value)))
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        self.start = self.pos;

        let c = match self.advance() {
            Some(c) => c,
            None => return Ok(self.make_token(TokenKind::Eof)),
        };

        match c {
            '(' => Ok(self.make_token(TokenKind::LParen)),
            ')' => Ok(self.make_token(TokenKind::RParen)),
            '{' => Ok(self.make_token(TokenKind::LBrace)),
            '}' => Ok(self.make_token(TokenKind::RBrace)),
            ',' => Ok(self.make_token(TokenKind::Comma)),
            ';' => Ok(self.make_token(TokenKind::Semicolon)),
            ':' => Ok(self.make_token(TokenKind::Colon)),
            '*' => Ok(self.make_token(TokenKind::Star)),
            '/' => Ok(self.make_token(TokenKind::Slash)),
            '%' => Ok(self.make_token(TokenKind::Percent)),
            '~' => Ok(self.make_token(TokenKind::Tilde)),
            '&' => Ok(self.make_token(TokenKind::Amp)),
            '+' => Ok(self.two_char_token('+', TokenKind::PlusPlus, TokenKind::Plus)),
            '-' => Ok(self.two_char_token('-', TokenKind::MinusMinus, TokenKind::Minus)),
            '=' => Ok(self.two_char_token('=', TokenKind::EqEq, TokenKind::Assign)),
            '!' => Ok(self.two_char_token('=', TokenKind::Ne, TokenKind::Not)),
            '<' => Ok(self.two_char_token('=', TokenKind::Le, TokenKind::Lt)),
            '>' => Ok(self.two_char_token('=', TokenKind::Ge, TokenKind::Gt)),
            _ if c.is_ascii_digit() => self.read_number(),
            _ if c.is_alphabetic() || c == '_' => Ok(self.read_identifier()),
            _ => Err(Error::UnexpectedChar { ch: c, line: self.line }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            kinds("int main while whilst"),
            vec![
                TokenKind::Int,
                TokenKind::Ident("main".to_string()),
                TokenKind::While,
                TokenKind::Ident("whilst".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("+ ++ = == ! != <= >="),
            vec![
                TokenKind::Plus,
                TokenKind::PlusPlus,
                TokenKind::Assign,
                TokenKind::EqEq,
                TokenKind::Not,
                TokenKind::Ne,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("1 // line\n/* block\n */ 2"),
            vec![TokenKind::IntConst(1), TokenKind::IntConst(2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Lexer::new("1\n2\n\n3").tokenize().unwrap();
        let lines: Vec<u32> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 2, 4, 4]);
    }

    #[test]
    fn test_unexpected_character() {
        let result = Lexer::new("int $x;").tokenize();
        assert_eq!(
            result,
            Err(Error::UnexpectedChar { ch: '$', line: 1 })
        );
    }

    #[test]
    fn test_int_const_out_of_range() {
        let result = Lexer::new("99999999999").tokenize();
        assert!(matches!(result, Err(Error::IntConstOutOfRange { .. })));
    }
}
