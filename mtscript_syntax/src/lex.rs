use crate::{
    error::{Diagnostic, ErrorKind, ErrorMsg},
    token::{Position, Span, Token, TokenKind},
};
use std::{collections::VecDeque, iter::Peekable, str::CharIndices};

/// Lazy, single-pass lexer. Whitespace and `//` comments are skipped;
/// the sequence ends with exactly one `EOF` token. Lexing errors are
/// yielded in place and lexing resumes after the offending input, so
/// one pass reports every bad character. Cloning a fresh lexer gives an
/// independent restart of the same sequence.
#[derive(Clone, Debug)]
pub struct Lexer<'a> {
    source: &'a str,
    stream: Peekable<CharIndices<'a>>,
    start: Position,
    current: Position,
    queue: VecDeque<Result<Token, Diagnostic>>,
    finished: bool,
}

/// Lex the whole source, separating tokens from diagnostics.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    Lexer::new(source).lex_all()
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, Diagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }
            self.lex();
        }
    }
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            stream: source.char_indices().peekable(),
            start: Position::default(),
            current: Position::default(),
            queue: VecDeque::default(),
            finished: false,
        }
    }

    pub fn lex_all(self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut tokens: Vec<Token> = Vec::default();
        let mut diagnostics: Vec<Diagnostic> = Vec::default();
        for item in self {
            match item {
                Ok(t) => tokens.push(t),
                Err(e) => diagnostics.push(e),
            }
        }
        (tokens, diagnostics)
    }

    /// Scan one lexeme, queueing the token and any diagnostics for it.
    fn lex(&mut self) {
        self.skip_trivia();
        self.start = self.current;
        let Some(c) = self.advance() else {
            let eof = Token::new(TokenKind::EOF, self.text_range(), String::default());
            self.queue.push_back(Ok(eof));
            self.finished = true;
            return;
        };
        let token = match c {
            '!' => self.lookahead_for_token('=', TokenKind::BANG_EQUAL, TokenKind::BANG),
            '=' => self.lookahead_for_token('=', TokenKind::EQUAL_EQUAL, TokenKind::EQUAL),
            '>' => self.lookahead_for_token('=', TokenKind::GREATER_EQUAL, TokenKind::GREATER),
            '<' => self.lookahead_for_token('=', TokenKind::LESS_EQUAL, TokenKind::LESS),
            '+' => self.lookahead_for_token('=', TokenKind::PLUS_EQUAL, TokenKind::PLUS),
            '-' => self.lookahead_for_token('=', TokenKind::MINUS_EQUAL, TokenKind::MINUS),
            '*' => self.lookahead_for_token('=', TokenKind::STAR_EQUAL, TokenKind::STAR),
            '/' => self.lookahead_for_token('=', TokenKind::SLASH_EQUAL, TokenKind::SLASH),
            '&' => self.lookahead_or_err('&', TokenKind::AND_AND),
            '|' => self.lookahead_or_err('|', TokenKind::OR_OR),
            '"' | '\'' => self.lex_string(c),
            _ => {
                if let Some(t) = TokenKind::from_char(c) {
                    Ok(Some(self.make_token(t)))
                } else if c.is_alphabetic() || c == '_' {
                    Ok(self.lex_ident())
                } else if c.is_ascii_digit() {
                    self.lex_number()
                } else {
                    Err(self.error(ErrorMsg::UnexpectedChar))
                }
            }
        };
        self.push(token);
    }

    fn push(&mut self, token: Result<Option<Token>, Diagnostic>) {
        match token {
            Ok(Some(t)) => self.queue.push_back(Ok(t)),
            Ok(None) => (),
            Err(e) => self.queue.push_back(Err(e)),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_nth(1) == Some('/') => {
                    self.advance_while(|c| c != '\n');
                }
                _ => break,
            }
        }
    }

    fn lex_ident(&mut self) -> Option<Token> {
        self.advance_while(|c| c.is_alphanumeric() || c == '_');
        if let Some(t) = TokenKind::from_keyword(self.lexeme_from_range()) {
            Some(self.make_token(t))
        } else {
            Some(self.make_token(TokenKind::IDENT))
        }
    }

    fn lex_number(&mut self) -> Result<Option<Token>, Diagnostic> {
        self.advance_while(|c| c.is_ascii_digit());
        // A fraction needs at least one digit after the dot
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.advance_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let digits_at = match self.peek_nth(1) {
                Some('+' | '-') => 2,
                _ => 1,
            };
            if self.peek_nth(digits_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digits_at {
                    self.advance();
                }
                self.advance_while(|c| c.is_ascii_digit());
            }
        }
        // Swallow trailing identifier characters so `12abc` is one error
        if self
            .advance_while(|c| c.is_alphanumeric() || c == '_')
            .is_some()
        {
            return Err(self.error(ErrorMsg::InvalidNumber));
        }
        Ok(Some(self.make_token(TokenKind::NUMBER)))
    }

    fn lex_string(&mut self, quote: char) -> Result<Option<Token>, Diagnostic> {
        let mut contents = String::default();
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error(ErrorMsg::UnterminatedString)),
                Some(c) if c == quote => {
                    // Consume the closing quote
                    self.advance();
                    return Ok(Some(Token::new(
                        TokenKind::STRING,
                        self.text_range(),
                        contents,
                    )));
                }
                Some('\\') => {
                    let escape_start = self.current;
                    self.advance();
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some(c @ ('\\' | '"' | '\'')) => c,
                        // Leave the line break for the unterminated check
                        None | Some('\n') => {
                            contents.push('\\');
                            continue;
                        }
                        Some(other) => {
                            self.advance();
                            contents.push('\\');
                            contents.push(other);
                            self.queue.push_back(Err(Diagnostic::warning(
                                ErrorKind::SyntaxError,
                                format!("{} \\{other}", ErrorMsg::UnknownEscape),
                                Span::new(escape_start, self.current),
                            )));
                            continue;
                        }
                    };
                    self.advance();
                    contents.push(escaped);
                }
                Some(c) => {
                    self.advance();
                    contents.push(c);
                }
            }
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.text_range(), self.lexeme_from_range().to_string())
    }

    fn lexeme_from_range(&self) -> &'a str {
        &self.source[self.start.offset..self.current.offset]
    }

    fn text_range(&self) -> Span {
        Span::new(self.start, self.current)
    }

    fn peek(&mut self) -> Option<char> {
        self.stream.peek().map(|&(_, c)| c)
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.stream.clone().nth(n).map(|(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        let (idx, c) = self.stream.next()?;
        self.current.offset = idx + c.len_utf8();
        if c == '\n' {
            self.current.line += 1;
            self.current.column = 1;
        } else {
            self.current.column += 1;
        }
        Some(c)
    }

    fn advance_if<F>(&mut self, cond: F) -> Option<char>
    where
        F: FnOnce(char) -> bool,
    {
        if self.peek().filter(|&c| cond(c)).is_some() {
            self.advance()
        } else {
            None
        }
    }

    fn advance_while<F>(&mut self, cond: F) -> Option<usize>
    where
        F: Fn(char) -> bool,
    {
        let mut count: usize = 0;
        while self.peek().filter(|&c| cond(c)).is_some() {
            count += 1;
            self.advance();
        }
        count.ne(&0).then_some(count)
    }

    fn lookahead_for_token(
        &mut self,
        match_char: char,
        if_match: TokenKind,
        no_match: TokenKind,
    ) -> Result<Option<Token>, Diagnostic> {
        if self.advance_if(|c| c == match_char).is_some() {
            Ok(Some(self.make_token(if_match)))
        } else {
            Ok(Some(self.make_token(no_match)))
        }
    }

    fn lookahead_or_err(
        &mut self,
        match_char: char,
        if_match: TokenKind,
    ) -> Result<Option<Token>, Diagnostic> {
        if self.advance_if(|c| c == match_char).is_some() {
            Ok(Some(self.make_token(if_match)))
        } else {
            Err(self.error(ErrorMsg::UnexpectedChar))
        }
    }

    fn error(&self, msg: ErrorMsg) -> Diagnostic {
        Diagnostic::syntax(
            format!("{} {}", msg, self.lexeme_from_range()),
            self.text_range(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let (tokens, errors) = tokenize(input);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("+ += - -= * *= / /= % == != < <= > >= ! && || = ."),
            vec![
                TokenKind::PLUS,
                TokenKind::PLUS_EQUAL,
                TokenKind::MINUS,
                TokenKind::MINUS_EQUAL,
                TokenKind::STAR,
                TokenKind::STAR_EQUAL,
                TokenKind::SLASH,
                TokenKind::SLASH_EQUAL,
                TokenKind::MODULO,
                TokenKind::EQUAL_EQUAL,
                TokenKind::BANG_EQUAL,
                TokenKind::LESS,
                TokenKind::LESS_EQUAL,
                TokenKind::GREATER,
                TokenKind::GREATER_EQUAL,
                TokenKind::BANG,
                TokenKind::AND_AND,
                TokenKind::OR_OR,
                TokenKind::EQUAL,
                TokenKind::DOT,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            kinds("if else while for return break continue function true false undefined var iffy _x"),
            vec![
                TokenKind::IF,
                TokenKind::ELSE,
                TokenKind::WHILE,
                TokenKind::FOR,
                TokenKind::RETURN,
                TokenKind::BREAK,
                TokenKind::CONTINUE,
                TokenKind::FUNCTION,
                TokenKind::TRUE,
                TokenKind::FALSE,
                TokenKind::UNDEFINED,
                TokenKind::VAR,
                TokenKind::IDENT,
                TokenKind::IDENT,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn numbers() {
        let (tokens, errors) = tokenize("42 3.25 1e3 2.5E-2 7.");
        assert!(errors.is_empty());
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["42", "3.25", "1e3", "2.5E-2", "7", ".", ""]);
    }

    #[test]
    fn strings_and_escapes() {
        let (tokens, errors) = tokenize(r#"'a\tb' "say \"hi\"\n""#);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].lexeme, "a\tb");
        assert_eq!(tokens[1].lexeme, "say \"hi\"\n");
        // The span covers the quotes
        assert_eq!(tokens[0].span.start.offset, 0);
        assert_eq!(tokens[0].span.end.offset, 6);
    }

    #[test]
    fn unknown_escape_is_a_warning() {
        let (tokens, diagnostics) = tokenize(r#""a\qb""#);
        assert_eq!(tokens[0].lexeme, "a\\qb");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn positions() {
        let (tokens, _) = tokenize("a\n  bc // note\n  \"é\" d");
        let starts: Vec<(usize, usize)> = tokens
            .iter()
            .map(|t| (t.span.start.line, t.span.start.column))
            .collect();
        assert_eq!(starts, vec![(1, 1), (2, 3), (3, 3), (3, 7), (3, 8)]);
        assert_eq!(tokens[3].span.start.offset, tokens[3].span.end.offset - 1);
    }

    #[test]
    fn unterminated_string_recovers() {
        let (tokens, errors) = tokenize("x = 'abc\ny = 2;");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::SyntaxError);
        assert_eq!(errors[0].span.start.offset, 4);
        assert_eq!(errors[0].span.end.offset, 8);
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::IDENT,
                TokenKind::EQUAL,
                TokenKind::IDENT,
                TokenKind::EQUAL,
                TokenKind::NUMBER,
                TokenKind::SEMICOLON,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn illegal_characters_are_skipped() {
        let (tokens, errors) = tokenize("1 @ 2 # 3 & 4");
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.span.len() == 1));
        assert_eq!(
            tokens.iter().filter(|t| t.kind == TokenKind::NUMBER).count(),
            4
        );
    }

    #[test]
    fn invalid_number() {
        let (_, errors) = tokenize("12abc");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            format!("{} 12abc", ErrorMsg::InvalidNumber)
        );
    }

    #[test]
    fn lazy_and_restartable() {
        let lexer = Lexer::new("a + b");
        let restart = lexer.clone();
        let first: Vec<_> = lexer.take(2).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(restart.count(), 4);
    }
}
