/// Token types for the SELECT lexer

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Keywords
    Select,
    Distinct,
    From,
    Where,
    And,
    Or,
    Like,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    Join,
    On,
    Group,
    Order,
    By,
    Asc,
    Desc,
    Limit,

    // Operators
    Eq,           // =
    Ne,           // != or <>
    Lt,           // <
    Gt,           // >
    Le,           // <=
    Ge,           // >=
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %

    // Delimiters
    LParen,       // (
    RParen,       // )
    Comma,        // ,
    Semicolon,    // ;
    Dot,          // .

    // Literals
    Number(f64),
    String(String),
    Identifier(String),

    // Special
    Eof,
}

/// A token plus its byte span in the text it was read from.
///
/// Spans let the compiler cut clauses out of the working query buffer while
/// keeping literals exactly as written.
#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(token_type: TokenType, start: usize, end: usize, line: usize, column: usize) -> Self {
        Self { token_type, start, end, line, column }
    }

    pub fn is(&self, token_type: &TokenType) -> bool {
        &self.token_type == token_type
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self.token_type,
            TokenType::Eq | TokenType::Ne | TokenType::Lt | TokenType::Gt | TokenType::Le | TokenType::Ge
        )
    }
}

impl TokenType {
    /// Case-insensitive keyword lookup
    pub fn from_keyword(s: &str) -> Option<Self> {
        let keyword = match s.to_ascii_lowercase().as_str() {
            "select" => TokenType::Select,
            "distinct" => TokenType::Distinct,
            "from" => TokenType::From,
            "where" => TokenType::Where,
            "and" => TokenType::And,
            "or" => TokenType::Or,
            "like" => TokenType::Like,
            "inner" => TokenType::Inner,
            "left" => TokenType::Left,
            "right" => TokenType::Right,
            "full" => TokenType::Full,
            "outer" => TokenType::Outer,
            "cross" => TokenType::Cross,
            "join" => TokenType::Join,
            "on" => TokenType::On,
            "group" => TokenType::Group,
            "order" => TokenType::Order,
            "by" => TokenType::By,
            "asc" => TokenType::Asc,
            "desc" => TokenType::Desc,
            "limit" => TokenType::Limit,
            _ => return None,
        };
        Some(keyword)
    }
}
