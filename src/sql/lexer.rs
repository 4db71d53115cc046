//! SQL Lexer - converts a query string into spanned tokens

use super::token::{Token, TokenType};
use crate::error::{QueryError, Result};

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    byte_offset: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            byte_offset: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.token_type, TokenType::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        let start = self.byte_offset;
        let line = self.line;
        let column = self.column;

        if self.is_eof() {
            return Ok(Token::new(TokenType::Eof, start, start, line, column));
        }

        let ch = self.current_char();

        // Skip comments
        if ch == '-' && self.peek_char() == Some('-') {
            self.skip_line_comment();
            return self.next_token();
        }

        let token_type = match ch {
            // String literals
            '\'' | '"' => self.read_string(ch)?,

            // Numbers
            '0'..='9' => self.read_number(),

            // Identifiers and keywords
            c if c.is_alphabetic() || c == '_' => self.read_identifier(),

            // Operators and delimiters
            '=' => {
                self.advance();
                TokenType::Eq
            }
            '!' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Ne
                } else {
                    return Err(QueryError::Parse(format!(
                        "Unexpected character '!' at {}:{}", line, column
                    )));
                }
            }
            '<' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Le
                } else if self.current_char() == '>' {
                    self.advance();
                    TokenType::Ne
                } else {
                    TokenType::Lt
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Ge
                } else {
                    TokenType::Gt
                }
            }
            '+' => {
                self.advance();
                TokenType::Plus
            }
            '-' => {
                self.advance();
                TokenType::Minus
            }
            '*' => {
                self.advance();
                TokenType::Star
            }
            '/' => {
                self.advance();
                TokenType::Slash
            }
            '%' => {
                self.advance();
                TokenType::Percent
            }
            '(' => {
                self.advance();
                TokenType::LParen
            }
            ')' => {
                self.advance();
                TokenType::RParen
            }
            ',' => {
                self.advance();
                TokenType::Comma
            }
            ';' => {
                self.advance();
                TokenType::Semicolon
            }
            '.' => {
                self.advance();
                TokenType::Dot
            }
            _ => {
                return Err(QueryError::Parse(format!(
                    "Unexpected character '{}' at {}:{}", ch, line, column
                )));
            }
        };

        Ok(Token::new(token_type, start, self.byte_offset, line, column))
    }

    fn current_char(&self) -> char {
        if self.is_eof() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            let ch = self.input[self.position];
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.byte_offset += ch.len_utf8();
            self.position += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn skip_line_comment(&mut self) {
        while !self.is_eof() && self.current_char() != '\n' {
            self.advance();
        }
        if !self.is_eof() {
            self.advance(); // skip newline
        }
    }

    fn read_string(&mut self, quote: char) -> Result<TokenType> {
        self.advance(); // skip opening quote
        let mut value = String::new();

        while !self.is_eof() && self.current_char() != quote {
            if self.current_char() == '\\' {
                self.advance();
                if self.is_eof() {
                    return Err(QueryError::Parse("Unterminated string".to_string()));
                }
                value.push(self.current_char());
            } else {
                value.push(self.current_char());
            }
            self.advance();
        }

        if self.is_eof() {
            return Err(QueryError::Parse("Unterminated string".to_string()));
        }

        self.advance(); // skip closing quote
        Ok(TokenType::String(value))
    }

    fn read_number(&mut self) -> TokenType {
        let mut value = String::new();

        while !self.is_eof() && (self.current_char().is_ascii_digit() || self.current_char() == '.') {
            value.push(self.current_char());
            self.advance();
        }

        // Scientific notation (e.g., 1.5e10)
        if !self.is_eof() && (self.current_char() == 'e' || self.current_char() == 'E') {
            value.push(self.current_char());
            self.advance();
            if !self.is_eof() && (self.current_char() == '+' || self.current_char() == '-') {
                value.push(self.current_char());
                self.advance();
            }
            while !self.is_eof() && self.current_char().is_ascii_digit() {
                value.push(self.current_char());
                self.advance();
            }
        }

        // Digit-led words such as `1.2.3` or `12abc` are bare literals
        while !self.is_eof() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match value.parse::<f64>() {
            Ok(n) => TokenType::Number(n),
            Err(_) => TokenType::Identifier(value),
        }
    }

    fn read_identifier(&mut self) -> TokenType {
        let mut value = String::new();

        while !self.is_eof() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        TokenType::from_keyword(&value)
            .unwrap_or(TokenType::Identifier(value))
    }
}

/// Tokenize `input`, mapping any lexical failure to a parse error
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_simple_select() {
        let tokens = tokenize("SELECT * FROM users").unwrap();

        assert_eq!(tokens.len(), 5); // SELECT, *, FROM, users, EOF
        assert!(matches!(tokens[0].token_type, TokenType::Select));
        assert!(matches!(tokens[1].token_type, TokenType::Star));
        assert!(matches!(tokens[2].token_type, TokenType::From));
        assert!(matches!(tokens[3].token_type, TokenType::Identifier(_)));
        assert!(matches!(tokens[4].token_type, TokenType::Eof));
    }

    #[test]
    fn test_lexer_spans_cover_source_text() {
        let sql = "select name from users where name = 'Tom AND Jerry'";
        let tokens = tokenize(sql).unwrap();

        let literal = tokens.iter().find(|t| matches!(t.token_type, TokenType::String(_))).unwrap();
        assert_eq!(&sql[literal.start..literal.end], "'Tom AND Jerry'");
        // The AND inside the literal is not a keyword
        assert!(!tokens.iter().any(|t| t.is(&TokenType::And)));
    }

    #[test]
    fn test_lexer_spans_with_multibyte_text() {
        let sql = "SELECT * FROM t WHERE city = 'Zürich' LIMIT 2";
        let tokens = tokenize(sql).unwrap();
        let limit = tokens.iter().find(|t| t.is(&TokenType::Limit)).unwrap();
        assert_eq!(&sql[limit.start..limit.end], "LIMIT");
    }

    #[test]
    fn test_lexer_operators() {
        let tokens = tokenize("= != < > <= >= <>").unwrap();

        assert!(matches!(tokens[0].token_type, TokenType::Eq));
        assert!(matches!(tokens[1].token_type, TokenType::Ne));
        assert!(matches!(tokens[2].token_type, TokenType::Lt));
        assert!(matches!(tokens[3].token_type, TokenType::Gt));
        assert!(matches!(tokens[4].token_type, TokenType::Le));
        assert!(matches!(tokens[5].token_type, TokenType::Ge));
        assert!(matches!(tokens[6].token_type, TokenType::Ne));
    }

    #[test]
    fn test_lexer_digit_led_words() {
        let tokens = tokenize("1.5e3 1.2.3 12abc").unwrap();

        assert!(matches!(tokens[0].token_type, TokenType::Number(n) if n == 1500.0));
        assert!(matches!(&tokens[1].token_type, TokenType::Identifier(s) if s == "1.2.3"));
        assert!(matches!(&tokens[2].token_type, TokenType::Identifier(s) if s == "12abc"));
        assert!(matches!(tokens[3].token_type, TokenType::Eof));
    }

    #[test]
    fn test_lexer_unterminated_string() {
        assert!(matches!(tokenize("SELECT 'abc"), Err(QueryError::Parse(_))));
    }

    #[test]
    fn test_lexer_comment() {
        let tokens = tokenize("SELECT * -- this is a comment\nFROM users").unwrap();

        assert_eq!(tokens.len(), 5); // Comment should be skipped
        assert!(matches!(tokens[2].token_type, TokenType::From));
    }
}
