use std::fmt::Display;

/// A location in the source text. `offset` is in bytes, `line` and
/// `column` are 1-based and count characters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open source range `[start, end)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn empty(at: Position) -> Self {
        Self { start: at, end: at }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        let start = if other.start.offset < self.start.offset {
            other.start
        } else {
            self.start
        };
        let end = if other.end.offset > self.end.offset {
            other.end
        } else {
            self.end
        };
        Span { start, end }
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start.offset <= other.start.offset && other.end.offset <= self.end.offset
    }

    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Coarse classification of a token.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenClass {
    Ident,
    Number,
    Str,
    Operator,
    Keyword,
    Delim,
    Eof,
}

/// The enum variants are in SCREAMING_SNAKE_CASE as they technically
/// represent constants, but Rust does not allow const enum variants.
#[allow(nonstandard_style)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
    // Delimiters
    LPAREN,
    RPAREN,
    LBRACE,
    RBRACE,
    LBRACKET,
    RBRACKET,
    COMMA,
    SEMICOLON,
    COLON,
    // Arithmetic
    PLUS,
    MINUS,
    STAR,
    SLASH,
    MODULO,
    // Comparisons
    BANG_EQUAL,
    EQUAL_EQUAL,
    GREATER,
    GREATER_EQUAL,
    LESS,
    LESS_EQUAL,
    // Logical
    BANG,
    AND_AND,
    OR_OR,
    // Assignment
    EQUAL,
    PLUS_EQUAL,
    MINUS_EQUAL,
    STAR_EQUAL,
    SLASH_EQUAL,
    // Member access
    DOT,
    // Literals
    IDENT,
    STRING,
    NUMBER,
    // Keywords
    IF,
    ELSE,
    WHILE,
    FOR,
    RETURN,
    BREAK,
    CONTINUE,
    FUNCTION,
    TRUE,
    FALSE,
    UNDEFINED,
    VAR,
    EOF,
}

impl TokenKind {
    pub fn from_char(c: char) -> Option<Self> {
        let token = match c {
            '(' => Self::LPAREN,
            ')' => Self::RPAREN,
            '{' => Self::LBRACE,
            '}' => Self::RBRACE,
            '[' => Self::LBRACKET,
            ']' => Self::RBRACKET,
            ',' => Self::COMMA,
            ';' => Self::SEMICOLON,
            ':' => Self::COLON,
            '.' => Self::DOT,
            '%' => Self::MODULO,
            _ => return None,
        };
        Some(token)
    }

    pub fn from_keyword(kw: &str) -> Option<Self> {
        let token = match kw {
            "if" => Self::IF,
            "else" => Self::ELSE,
            "while" => Self::WHILE,
            "for" => Self::FOR,
            "return" => Self::RETURN,
            "break" => Self::BREAK,
            "continue" => Self::CONTINUE,
            "function" => Self::FUNCTION,
            "true" => Self::TRUE,
            "false" => Self::FALSE,
            "undefined" => Self::UNDEFINED,
            "var" => Self::VAR,
            _ => return None,
        };
        Some(token)
    }

    pub fn class(self) -> TokenClass {
        match self {
            Self::LPAREN
            | Self::RPAREN
            | Self::LBRACE
            | Self::RBRACE
            | Self::LBRACKET
            | Self::RBRACKET
            | Self::COMMA
            | Self::SEMICOLON
            | Self::COLON => TokenClass::Delim,
            Self::IDENT => TokenClass::Ident,
            Self::STRING => TokenClass::Str,
            Self::NUMBER => TokenClass::Number,
            Self::IF
            | Self::ELSE
            | Self::WHILE
            | Self::FOR
            | Self::RETURN
            | Self::BREAK
            | Self::CONTINUE
            | Self::FUNCTION
            | Self::TRUE
            | Self::FALSE
            | Self::UNDEFINED
            | Self::VAR => TokenClass::Keyword,
            Self::EOF => TokenClass::Eof,
            _ => TokenClass::Operator,
        }
    }

    /// How the token kind is spelled in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            Self::LPAREN => "'('",
            Self::RPAREN => "')'",
            Self::LBRACE => "'{'",
            Self::RBRACE => "'}'",
            Self::LBRACKET => "'['",
            Self::RBRACKET => "']'",
            Self::COMMA => "','",
            Self::SEMICOLON => "';'",
            Self::COLON => "':'",
            Self::PLUS => "'+'",
            Self::MINUS => "'-'",
            Self::STAR => "'*'",
            Self::SLASH => "'/'",
            Self::MODULO => "'%'",
            Self::BANG_EQUAL => "'!='",
            Self::EQUAL_EQUAL => "'=='",
            Self::GREATER => "'>'",
            Self::GREATER_EQUAL => "'>='",
            Self::LESS => "'<'",
            Self::LESS_EQUAL => "'<='",
            Self::BANG => "'!'",
            Self::AND_AND => "'&&'",
            Self::OR_OR => "'||'",
            Self::EQUAL => "'='",
            Self::PLUS_EQUAL => "'+='",
            Self::MINUS_EQUAL => "'-='",
            Self::STAR_EQUAL => "'*='",
            Self::SLASH_EQUAL => "'/='",
            Self::DOT => "'.'",
            Self::IDENT => "identifier",
            Self::STRING => "string",
            Self::NUMBER => "number",
            Self::IF => "'if'",
            Self::ELSE => "'else'",
            Self::WHILE => "'while'",
            Self::FOR => "'for'",
            Self::RETURN => "'return'",
            Self::BREAK => "'break'",
            Self::CONTINUE => "'continue'",
            Self::FUNCTION => "'function'",
            Self::TRUE => "'true'",
            Self::FALSE => "'false'",
            Self::UNDEFINED => "'undefined'",
            Self::VAR => "'var'",
            Self::EOF => "end of file",
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// A lexed token. For `STRING` tokens the lexeme holds the unescaped
/// contents; for every other kind it is the source text.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub lexeme: String,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::EOF => f.write_str("end of file"),
            TokenKind::STRING => write!(f, "string \"{}\"", self.lexeme),
            _ => write!(f, "'{}'", self.lexeme),
        }
    }
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: String) -> Self {
        Self { kind, span, lexeme }
    }

    pub fn class(&self) -> TokenClass {
        self.kind.class()
    }
}
