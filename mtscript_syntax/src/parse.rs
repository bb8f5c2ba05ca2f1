use std::{collections::HashSet, iter::Peekable, slice::Iter};

use log::warn;

use crate::{
    error::Diagnostic,
    token::{Position, Span, Token, TokenKind},
};

/// Syntactic nesting beyond this depth is rejected so that hostile input
/// cannot exhaust the stack of the parser, builder or evaluator.
pub const MAX_NESTING: usize = 128;

/// Whether the parser stops at the first syntax error or recovers and
/// keeps collecting diagnostics.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ParseMode {
    #[default]
    Strict,
    Lenient,
}

/// The grammar rule a concrete tree node was produced by.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    Script,
    Block,
    VarDecl,
    ExprStmt,
    EmptyStmt,
    If,
    While,
    For,
    ForInit,
    ForCondition,
    ForUpdate,
    Return,
    Break,
    Continue,
    Function,
    Params,
    Assignment,
    LogicalOr,
    LogicalAnd,
    Equality,
    Relational,
    Additive,
    Multiplicative,
    Unary,
    Call,
    Args,
    Index,
    Member,
    Group,
    Literal,
    Name,
    List,
    Map,
    MapEntry,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SyntaxElement {
    Node(SyntaxNode),
    Token(Token),
}

impl SyntaxElement {
    pub fn span(&self) -> Span {
        match self {
            Self::Node(n) => n.span,
            Self::Token(t) => t.span,
        }
    }
}

/// A node of the concrete parse tree. It keeps every token it matched,
/// punctuation included, and exclusively owns its children.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntaxNode {
    pub rule: Rule,
    pub span: Span,
    pub children: Vec<SyntaxElement>,
}

impl SyntaxNode {
    /// Build a node spanning from its first to its last child. Nodes
    /// without children must be created with [`SyntaxNode::with_span`].
    fn new(rule: Rule, children: Vec<SyntaxElement>) -> Self {
        let span = match (children.first(), children.last()) {
            (Some(first), Some(last)) => first.span().join(last.span()),
            _ => Span::default(),
        };
        Self {
            rule,
            span,
            children,
        }
    }

    pub fn with_span(rule: Rule, span: Span, children: Vec<SyntaxElement>) -> Self {
        Self {
            rule,
            span,
            children,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.children.iter().filter_map(|c| match c {
            SyntaxElement::Node(n) => Some(n),
            SyntaxElement::Token(_) => None,
        })
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.children.iter().filter_map(|c| match c {
            SyntaxElement::Token(t) => Some(t),
            SyntaxElement::Node(_) => None,
        })
    }

    pub fn token(&self, kind: TokenKind) -> Option<&Token> {
        self.tokens().find(|t| t.kind == kind)
    }
}

#[derive(Debug)]
pub struct ParseOutput {
    pub tree: SyntaxNode,
    /// Diagnostics recovered from in lenient mode. Always empty in
    /// strict mode, where the first error is returned instead.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub struct Parser<'a> {
    stream: Peekable<Iter<'a, Token>>,
    eof: Token,
    mode: ParseMode,
    errors: Vec<Diagnostic>,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(stream: &'a [Token], mode: ParseMode) -> Self {
        // Tolerate a stream without the trailing EOF token
        let eof = match stream.last() {
            Some(t) if t.kind == TokenKind::EOF => t.clone(),
            last => Token::new(
                TokenKind::EOF,
                Span::empty(last.map(|t| t.span.end).unwrap_or_default()),
                String::default(),
            ),
        };
        Self {
            stream: stream.iter().peekable(),
            eof,
            mode,
            errors: Vec::default(),
            depth: 0,
        }
    }

    pub fn parse_all(mut self) -> Result<ParseOutput, Diagnostic> {
        let items = self.parse_statements(false)?;
        let end = self.peek().span.end;
        let tree = SyntaxNode::with_span(Rule::Script, Span::new(Position::default(), end), items);
        Ok(ParseOutput {
            tree,
            diagnostics: self.errors,
        })
    }

    fn parse_statements(&mut self, in_block: bool) -> Result<Vec<SyntaxElement>, Diagnostic> {
        let mut items = Vec::default();
        loop {
            match self.peek_kind() {
                TokenKind::EOF => break,
                TokenKind::RBRACE if in_block => break,
                _ => (),
            }
            let depth = self.depth;
            match self.parse_statement() {
                Ok(node) => items.push(SyntaxElement::Node(node)),
                Err(e) => {
                    // An error can leave loop-charged levels behind
                    self.depth = depth;
                    self.recover(e, in_block)?
                }
            }
        }
        Ok(items)
    }

    fn recover(&mut self, error: Diagnostic, in_block: bool) -> Result<(), Diagnostic> {
        if self.mode == ParseMode::Strict {
            return Err(error);
        }
        warn!("Recovering from {error}");
        self.errors.push(error);
        self.sync(in_block);
        Ok(())
    }

    pub fn parse_statement(&mut self) -> Result<SyntaxNode, Diagnostic> {
        self.nested(|p| match p.peek_kind() {
            TokenKind::LBRACE => p.parse_block(),
            TokenKind::VAR => {
                let mut children = p.parse_var_decl()?;
                p.parse_terminator(&mut children)?;
                Ok(SyntaxNode::new(Rule::VarDecl, children))
            }
            TokenKind::IF => p.parse_if_stmt(),
            TokenKind::WHILE => p.parse_while_stmt(),
            TokenKind::FOR => p.parse_for_stmt(),
            TokenKind::RETURN => p.parse_return(),
            TokenKind::BREAK => p.parse_jump(Rule::Break),
            TokenKind::CONTINUE => p.parse_jump(Rule::Continue),
            TokenKind::FUNCTION => p.parse_function(),
            TokenKind::SEMICOLON => {
                let semi = p.advance();
                Ok(SyntaxNode::new(Rule::EmptyStmt, vec![SyntaxElement::Token(semi)]))
            }
            _ => p.parse_expr_stmt(),
        })
    }

    /// `var` IDENT (`=` expr)?, without the terminator so that `for`
    /// initialisers can reuse it.
    fn parse_var_decl(&mut self) -> Result<Vec<SyntaxElement>, Diagnostic> {
        let mut children = vec![
            SyntaxElement::Token(self.advance()),
            SyntaxElement::Token(self.advance_or_err(TokenKind::IDENT)?),
        ];
        if let Some(eq) = self.advance_if(|t| t.kind == TokenKind::EQUAL) {
            children.push(SyntaxElement::Token(eq));
            children.push(SyntaxElement::Node(self.parse_expr()?));
        }
        Ok(children)
    }

    fn parse_if_stmt(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let mut children = self.parse_keyword_condition()?;
        children.push(SyntaxElement::Node(self.parse_statement()?));
        // A trailing `else` binds to the nearest `if`, which is this one
        if let Some(else_kw) = self.advance_if(|t| t.kind == TokenKind::ELSE) {
            children.push(SyntaxElement::Token(else_kw));
            children.push(SyntaxElement::Node(self.parse_statement()?));
        }
        Ok(SyntaxNode::new(Rule::If, children))
    }

    fn parse_while_stmt(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let mut children = self.parse_keyword_condition()?;
        children.push(SyntaxElement::Node(self.parse_statement()?));
        Ok(SyntaxNode::new(Rule::While, children))
    }

    /// keyword `(` expr `)`
    fn parse_keyword_condition(&mut self) -> Result<Vec<SyntaxElement>, Diagnostic> {
        Ok(vec![
            SyntaxElement::Token(self.advance()),
            SyntaxElement::Token(self.advance_or_err(TokenKind::LPAREN)?),
            SyntaxElement::Node(self.parse_expr()?),
            SyntaxElement::Token(self.advance_or_err(TokenKind::RPAREN)?),
        ])
    }

    fn parse_for_stmt(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let mut children = vec![
            SyntaxElement::Token(self.advance()),
            SyntaxElement::Token(self.advance_or_err(TokenKind::LPAREN)?),
        ];

        let init = match self.peek_kind() {
            TokenKind::SEMICOLON => self.empty_node(Rule::ForInit),
            TokenKind::VAR => {
                let decl = SyntaxNode::new(Rule::VarDecl, self.parse_var_decl()?);
                SyntaxNode::new(Rule::ForInit, vec![SyntaxElement::Node(decl)])
            }
            _ => SyntaxNode::new(Rule::ForInit, vec![SyntaxElement::Node(self.parse_expr()?)]),
        };
        children.push(SyntaxElement::Node(init));
        children.push(SyntaxElement::Token(self.advance_or_err(TokenKind::SEMICOLON)?));

        let condition = if self.peek_kind() == TokenKind::SEMICOLON {
            self.empty_node(Rule::ForCondition)
        } else {
            SyntaxNode::new(
                Rule::ForCondition,
                vec![SyntaxElement::Node(self.parse_expr()?)],
            )
        };
        children.push(SyntaxElement::Node(condition));
        children.push(SyntaxElement::Token(self.advance_or_err(TokenKind::SEMICOLON)?));

        let update = if self.peek_kind() == TokenKind::RPAREN {
            self.empty_node(Rule::ForUpdate)
        } else {
            SyntaxNode::new(Rule::ForUpdate, vec![SyntaxElement::Node(self.parse_expr()?)])
        };
        children.push(SyntaxElement::Node(update));
        children.push(SyntaxElement::Token(self.advance_or_err(TokenKind::RPAREN)?));

        children.push(SyntaxElement::Node(self.parse_statement()?));
        Ok(SyntaxNode::new(Rule::For, children))
    }

    fn parse_function(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let fn_kw = self.advance();
        let name = self.advance_or_err(TokenKind::IDENT)?;

        let mut params = vec![SyntaxElement::Token(self.advance_or_err(TokenKind::LPAREN)?)];
        let mut seen = HashSet::new();
        if self.peek_kind() != TokenKind::RPAREN {
            loop {
                let param = self.advance_or_err(TokenKind::IDENT)?;
                if !seen.insert(param.lexeme.clone()) {
                    return Err(Diagnostic::syntax(
                        format!("duplicate parameter '{}'", param.lexeme),
                        param.span,
                    ));
                }
                params.push(SyntaxElement::Token(param));
                match self.advance_if(|t| t.kind == TokenKind::COMMA) {
                    Some(comma) => params.push(SyntaxElement::Token(comma)),
                    None => break,
                }
            }
        }
        params.push(SyntaxElement::Token(self.advance_or_err(TokenKind::RPAREN)?));

        if self.peek_kind() != TokenKind::LBRACE {
            return Err(Self::error(self.peek(), TokenKind::LBRACE.describe()));
        }
        let body = self.parse_block()?;

        Ok(SyntaxNode::new(
            Rule::Function,
            vec![
                SyntaxElement::Token(fn_kw),
                SyntaxElement::Token(name),
                SyntaxElement::Node(SyntaxNode::new(Rule::Params, params)),
                SyntaxElement::Node(body),
            ],
        ))
    }

    fn parse_return(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let mut children = vec![SyntaxElement::Token(self.advance())];
        if !matches!(
            self.peek_kind(),
            TokenKind::SEMICOLON | TokenKind::RBRACE | TokenKind::EOF
        ) {
            children.push(SyntaxElement::Node(self.parse_expr()?));
        }
        self.parse_terminator(&mut children)?;
        Ok(SyntaxNode::new(Rule::Return, children))
    }

    fn parse_jump(&mut self, rule: Rule) -> Result<SyntaxNode, Diagnostic> {
        let mut children = vec![SyntaxElement::Token(self.advance())];
        self.parse_terminator(&mut children)?;
        Ok(SyntaxNode::new(rule, children))
    }

    fn parse_expr_stmt(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let mut children = vec![SyntaxElement::Node(self.parse_expr()?)];
        self.parse_terminator(&mut children)?;
        Ok(SyntaxNode::new(Rule::ExprStmt, children))
    }

    fn parse_block(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let mut children = vec![SyntaxElement::Token(self.advance_or_err(TokenKind::LBRACE)?)];
        children.extend(self.parse_statements(true)?);
        children.push(SyntaxElement::Token(self.advance_or_err(TokenKind::RBRACE)?));
        Ok(SyntaxNode::new(Rule::Block, children))
    }

    /// A statement ends at `;`, or right before a closing brace or the
    /// end of the input.
    fn parse_terminator(&mut self, children: &mut Vec<SyntaxElement>) -> Result<(), Diagnostic> {
        match self.peek_kind() {
            TokenKind::SEMICOLON => {
                children.push(SyntaxElement::Token(self.advance()));
                Ok(())
            }
            TokenKind::RBRACE | TokenKind::EOF => Ok(()),
            _ => Err(Self::error(self.peek(), TokenKind::SEMICOLON.describe())),
        }
    }

    pub fn parse_expr(&mut self) -> Result<SyntaxNode, Diagnostic> {
        self.nested(|p| p.parse_assignment())
    }

    fn parse_assignment(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let lhs = self.parse_binary(1)?;
        let Some(op) = self.advance_if(|t| {
            matches!(
                t.kind,
                TokenKind::EQUAL
                    | TokenKind::PLUS_EQUAL
                    | TokenKind::MINUS_EQUAL
                    | TokenKind::STAR_EQUAL
                    | TokenKind::SLASH_EQUAL
            )
        }) else {
            return Ok(lhs);
        };
        if !matches!(lhs.rule, Rule::Name | Rule::Index | Rule::Member) {
            return Err(Diagnostic::syntax(
                format!("expected a variable, index or member before {}", op.kind),
                lhs.span,
            ));
        }
        // Right associative: `a = b = c` assigns `c` to both
        let rhs = self.parse_expr()?;
        Ok(SyntaxNode::new(
            Rule::Assignment,
            vec![
                SyntaxElement::Node(lhs),
                SyntaxElement::Token(op),
                SyntaxElement::Node(rhs),
            ],
        ))
    }

    /// Precedence climbing over the left-associative binary levels.
    fn parse_binary(&mut self, min_prec: u8) -> Result<SyntaxNode, Diagnostic> {
        let mut lhs = self.parse_unary()?;
        let mut wraps = 0;
        while let Some((prec, rule)) =
            binary_rule(self.peek_kind()).filter(|&(prec, _)| prec >= min_prec)
        {
            let op = self.advance();
            self.deepen()?;
            wraps += 1;
            let rhs = self.parse_binary(prec + 1)?;
            lhs = SyntaxNode::new(
                rule,
                vec![
                    SyntaxElement::Node(lhs),
                    SyntaxElement::Token(op),
                    SyntaxElement::Node(rhs),
                ],
            );
        }
        self.depth -= wraps;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<SyntaxNode, Diagnostic> {
        if let Some(op) = self.advance_if(|t| matches!(t.kind, TokenKind::BANG | TokenKind::MINUS)) {
            let operand = self.nested(|p| p.parse_unary())?;
            Ok(SyntaxNode::new(
                Rule::Unary,
                vec![SyntaxElement::Token(op), SyntaxElement::Node(operand)],
            ))
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let mut expr = self.parse_primary()?;
        let mut wraps = 0;
        loop {
            if matches!(
                self.peek_kind(),
                TokenKind::LPAREN | TokenKind::LBRACKET | TokenKind::DOT
            ) {
                self.deepen()?;
                wraps += 1;
            }
            match self.peek_kind() {
                TokenKind::LPAREN => {
                    // Only named functions can be called
                    if expr.rule != Rule::Name {
                        return Err(Diagnostic::syntax(
                            format!("expected a function name before {}", TokenKind::LPAREN),
                            self.peek().span,
                        ));
                    }
                    let args = self.parse_delimited(
                        Rule::Args,
                        TokenKind::LPAREN,
                        TokenKind::RPAREN,
                        |p| p.parse_expr(),
                    )?;
                    expr = SyntaxNode::new(
                        Rule::Call,
                        vec![SyntaxElement::Node(expr), SyntaxElement::Node(args)],
                    );
                }
                TokenKind::LBRACKET => {
                    let lbracket = self.advance();
                    let index = self.parse_expr()?;
                    let rbracket = self.advance_or_err(TokenKind::RBRACKET)?;
                    expr = SyntaxNode::new(
                        Rule::Index,
                        vec![
                            SyntaxElement::Node(expr),
                            SyntaxElement::Token(lbracket),
                            SyntaxElement::Node(index),
                            SyntaxElement::Token(rbracket),
                        ],
                    );
                }
                TokenKind::DOT => {
                    let dot = self.advance();
                    let field = self.advance_or_err(TokenKind::IDENT)?;
                    expr = SyntaxNode::new(
                        Rule::Member,
                        vec![
                            SyntaxElement::Node(expr),
                            SyntaxElement::Token(dot),
                            SyntaxElement::Token(field),
                        ],
                    );
                }
                _ => break,
            }
        }
        self.depth -= wraps;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<SyntaxNode, Diagnostic> {
        match self.peek_kind() {
            TokenKind::NUMBER
            | TokenKind::STRING
            | TokenKind::TRUE
            | TokenKind::FALSE
            | TokenKind::UNDEFINED => Ok(SyntaxNode::new(
                Rule::Literal,
                vec![SyntaxElement::Token(self.advance())],
            )),
            TokenKind::IDENT => Ok(SyntaxNode::new(
                Rule::Name,
                vec![SyntaxElement::Token(self.advance())],
            )),
            TokenKind::LPAREN => {
                let lparen = self.advance();
                let expr = self.parse_expr()?;
                let rparen = self.advance_or_err(TokenKind::RPAREN)?;
                Ok(SyntaxNode::new(
                    Rule::Group,
                    vec![
                        SyntaxElement::Token(lparen),
                        SyntaxElement::Node(expr),
                        SyntaxElement::Token(rparen),
                    ],
                ))
            }
            TokenKind::LBRACKET => self.parse_delimited(
                Rule::List,
                TokenKind::LBRACKET,
                TokenKind::RBRACKET,
                |p| p.parse_expr(),
            ),
            TokenKind::LBRACE => {
                self.parse_delimited(Rule::Map, TokenKind::LBRACE, TokenKind::RBRACE, |p| {
                    p.parse_map_entry()
                })
            }
            _ => Err(Self::error(self.peek(), "expression")),
        }
    }

    fn parse_map_entry(&mut self) -> Result<SyntaxNode, Diagnostic> {
        let key = match self.peek_kind() {
            TokenKind::IDENT | TokenKind::STRING => self.advance(),
            _ => return Err(Self::error(self.peek(), "map key")),
        };
        let colon = self.advance_or_err(TokenKind::COLON)?;
        let value = self.parse_expr()?;
        Ok(SyntaxNode::new(
            Rule::MapEntry,
            vec![
                SyntaxElement::Token(key),
                SyntaxElement::Token(colon),
                SyntaxElement::Node(value),
            ],
        ))
    }

    /// `open` (item (`,` item)* `,`?)? `close`. Trailing commas are only
    /// accepted in list and map literals.
    fn parse_delimited<F>(
        &mut self,
        rule: Rule,
        open: TokenKind,
        close: TokenKind,
        mut item: F,
    ) -> Result<SyntaxNode, Diagnostic>
    where
        F: FnMut(&mut Self) -> Result<SyntaxNode, Diagnostic>,
    {
        let mut children = vec![SyntaxElement::Token(self.advance_or_err(open)?)];
        while self.peek_kind() != close {
            children.push(SyntaxElement::Node(self.nested(&mut item)?));
            match self.advance_if(|t| t.kind == TokenKind::COMMA) {
                Some(comma) => {
                    if rule == Rule::Args && self.peek_kind() == close {
                        return Err(Self::error(self.peek(), "expression"));
                    }
                    children.push(SyntaxElement::Token(comma));
                }
                None => break,
            }
        }
        children.push(SyntaxElement::Token(self.advance_or_err(close)?));
        Ok(SyntaxNode::new(rule, children))
    }

    fn nested<T, F>(&mut self, f: F) -> Result<T, Diagnostic>
    where
        F: FnOnce(&mut Self) -> Result<T, Diagnostic>,
    {
        self.deepen()?;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Charge one level of tree depth against the nesting budget. Loops
    /// that wrap a node in a new parent call this once per wrap.
    fn deepen(&mut self) -> Result<(), Diagnostic> {
        if self.depth >= MAX_NESTING {
            return Err(Diagnostic::syntax(
                format!("nesting deeper than {MAX_NESTING} levels"),
                self.peek().span,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn empty_node(&mut self, rule: Rule) -> SyntaxNode {
        let at = self.peek().span.start;
        SyntaxNode::with_span(rule, Span::empty(at), Vec::default())
    }

    fn peek(&mut self) -> &Token {
        match self.stream.peek() {
            Some(&t) => t,
            None => &self.eof,
        }
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.peek().kind
    }

    /// Consume the next token. At the end of the stream the EOF token is
    /// returned again without consuming anything.
    fn advance(&mut self) -> Token {
        match self.stream.next() {
            Some(t) => t.clone(),
            None => self.eof.clone(),
        }
    }

    fn advance_if<F>(&mut self, cond: F) -> Option<Token>
    where
        F: FnOnce(&Token) -> bool,
    {
        if cond(self.peek()) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn advance_or_err(&mut self, kind: TokenKind) -> Result<Token, Diagnostic> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(Self::error(self.peek(), kind.describe()))
        }
    }

    /// Skip to the end of the broken statement: past the next `;`, past
    /// a balanced `{ ... }` group, or up to the `}` closing the
    /// enclosing block. A stray top-level `}` is consumed.
    fn sync(&mut self, in_block: bool) {
        let mut braces = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::EOF => return,
                TokenKind::SEMICOLON if braces == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::LBRACE => {
                    braces += 1;
                    self.advance();
                }
                TokenKind::RBRACE if braces > 0 => {
                    braces -= 1;
                    self.advance();
                    if braces == 0 {
                        return;
                    }
                }
                TokenKind::RBRACE => {
                    if !in_block {
                        self.advance();
                    }
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn error(token: &Token, expected: &str) -> Diagnostic {
        Diagnostic::syntax(format!("expected {expected}, found {token}"), token.span)
    }
}

fn binary_rule(kind: TokenKind) -> Option<(u8, Rule)> {
    let rule = match kind {
        TokenKind::OR_OR => (1, Rule::LogicalOr),
        TokenKind::AND_AND => (2, Rule::LogicalAnd),
        TokenKind::EQUAL_EQUAL | TokenKind::BANG_EQUAL => (3, Rule::Equality),
        TokenKind::LESS
        | TokenKind::LESS_EQUAL
        | TokenKind::GREATER
        | TokenKind::GREATER_EQUAL => (4, Rule::Relational),
        TokenKind::PLUS | TokenKind::MINUS => (5, Rule::Additive),
        TokenKind::STAR | TokenKind::SLASH | TokenKind::MODULO => (6, Rule::Multiplicative),
        _ => return None,
    };
    Some(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, lex::tokenize};

    fn parse_test(input: &str) -> SyntaxNode {
        let (tokens, errors) = tokenize(input);
        assert!(errors.is_empty());
        Parser::new(&tokens, ParseMode::Strict)
            .parse_all()
            .unwrap()
            .tree
    }

    fn parse_err_test(input: &str, expected: &str) {
        let (tokens, _) = tokenize(input);
        let err = Parser::new(&tokens, ParseMode::Strict)
            .parse_all()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.message, expected);
    }

    fn lenient(input: &str) -> ParseOutput {
        let (tokens, _) = tokenize(input);
        Parser::new(&tokens, ParseMode::Lenient).parse_all().unwrap()
    }

    fn first_expr(tree: &SyntaxNode) -> &SyntaxNode {
        tree.nodes().next().unwrap().nodes().next().unwrap()
    }

    #[test]
    fn precedence() {
        let tree = parse_test("1 + 2 * 3 == 7 && !x || y");
        let or = first_expr(&tree);
        assert_eq!(or.rule, Rule::LogicalOr);
        let and = or.nodes().next().unwrap();
        assert_eq!(and.rule, Rule::LogicalAnd);
        let eq = and.nodes().next().unwrap();
        assert_eq!(eq.rule, Rule::Equality);
        let add = eq.nodes().next().unwrap();
        assert_eq!(add.rule, Rule::Additive);
        let rules: Vec<Rule> = add.nodes().map(|n| n.rule).collect();
        assert_eq!(rules, vec![Rule::Literal, Rule::Multiplicative]);
        assert_eq!(and.nodes().nth(1).unwrap().rule, Rule::Unary);
    }

    #[test]
    fn left_associative() {
        let tree = parse_test("a - b - c");
        let outer = first_expr(&tree);
        assert_eq!(outer.rule, Rule::Additive);
        assert_eq!(outer.nodes().next().unwrap().rule, Rule::Additive);
        assert_eq!(outer.nodes().nth(1).unwrap().rule, Rule::Name);
    }

    #[test]
    fn right_associative_assignment() {
        let tree = parse_test("a = b = 1;");
        let outer = first_expr(&tree);
        assert_eq!(outer.rule, Rule::Assignment);
        assert_eq!(outer.nodes().nth(1).unwrap().rule, Rule::Assignment);
    }

    #[test]
    fn dangling_else() {
        let tree = parse_test("if (a) if (b) x; else y;");
        let outer = tree.nodes().next().unwrap();
        assert_eq!(outer.rule, Rule::If);
        assert!(outer.token(TokenKind::ELSE).is_none());
        let inner = outer.nodes().nth(1).unwrap();
        assert_eq!(inner.rule, Rule::If);
        assert!(inner.token(TokenKind::ELSE).is_some());
    }

    #[test]
    fn postfix_chain() {
        let tree = parse_test("m.list[0].name");
        let member = first_expr(&tree);
        assert_eq!(member.rule, Rule::Member);
        let index = member.nodes().next().unwrap();
        assert_eq!(index.rule, Rule::Index);
        assert_eq!(index.nodes().next().unwrap().rule, Rule::Member);
    }

    #[test]
    fn for_clauses() {
        let tree = parse_test("for (;;) {}");
        let for_node = tree.nodes().next().unwrap();
        let clauses: Vec<(Rule, usize)> = for_node
            .nodes()
            .map(|n| (n.rule, n.children.len()))
            .collect();
        assert_eq!(
            clauses,
            vec![
                (Rule::ForInit, 0),
                (Rule::ForCondition, 0),
                (Rule::ForUpdate, 0),
                (Rule::Block, 2),
            ]
        );
    }

    #[test]
    fn optional_final_semicolon() {
        let tree = parse_test("x = 5; while (x > 0) { x = x - 1; }; x");
        let rules: Vec<Rule> = tree.nodes().map(|n| n.rule).collect();
        assert_eq!(
            rules,
            vec![Rule::ExprStmt, Rule::While, Rule::EmptyStmt, Rule::ExprStmt]
        );
    }

    #[test]
    fn script_spans_whole_source() {
        let tree = parse_test("  a;  ");
        assert_eq!(tree.span.start.offset, 0);
        assert_eq!(tree.span.end.offset, 6);
    }

    #[test]
    fn missing_semicolon() {
        parse_err_test("x = 1 y = 2", "expected ';', found 'y'");
    }

    #[test]
    fn missing_closing_paren() {
        parse_err_test("(1 + 2 * 3;", "expected ')', found ';'");
    }

    #[test]
    fn missing_closing_brace() {
        parse_err_test("{ a;", "expected '}', found end of file");
    }

    #[test]
    fn call_needs_a_name() {
        parse_err_test("(f)(1)", "expected a function name before '('");
    }

    #[test]
    fn invalid_assignment_target() {
        parse_err_test("1 + 2 = 3", "expected a variable, index or member before '='");
    }

    #[test]
    fn duplicate_parameter() {
        parse_err_test("function f(a, a) {}", "duplicate parameter 'a'");
    }

    #[test]
    fn trailing_comma_in_call() {
        parse_err_test("f(1,)", "expected expression, found ')'");
    }

    #[test]
    fn nesting_limit() {
        let source = format!("{}1{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        let (tokens, _) = tokenize(&source);
        let err = Parser::new(&tokens, ParseMode::Strict)
            .parse_all()
            .unwrap_err();
        assert!(err.message.starts_with("nesting deeper than"));
    }

    #[test]
    fn long_chains_count_toward_nesting() {
        let nesting = format!("nesting deeper than {MAX_NESTING} levels");
        parse_err_test(&format!("1{}", " + 1".repeat(100_000)), &nesting);
        parse_err_test(&format!("m{}", ".a".repeat(50_000)), &nesting);
        parse_err_test(&format!("m{}", "[0]".repeat(50_000)), &nesting);
        parse_err_test(&format!("x = -1{}", " * -1".repeat(1_000)), &nesting);
        parse_test(&format!("1{}", " + 1".repeat(100)));
    }

    #[test]
    fn lenient_restores_depth_after_errors() {
        let output = lenient(&format!("x = 1{}; y = 1 + 2;", " + 1".repeat(500)));
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.tree.nodes().count(), 1);
    }

    #[test]
    fn lenient_collects_independent_errors() {
        let output = lenient("a = ; b = 2; c = * 3; d = 4");
        assert_eq!(output.diagnostics.len(), 2);
        assert_eq!(output.diagnostics[0].span.start.column, 5);
        assert_eq!(output.diagnostics[1].span.start.column, 18);
        // The valid statements survive
        assert_eq!(output.tree.nodes().count(), 2);
    }

    #[test]
    fn lenient_recovers_inside_blocks() {
        let output = lenient("while (x) { a = ; b = 1; } c = 2;");
        assert_eq!(output.diagnostics.len(), 1);
        let rules: Vec<Rule> = output.tree.nodes().map(|n| n.rule).collect();
        assert_eq!(rules, vec![Rule::While, Rule::ExprStmt]);
    }

    #[test]
    fn lenient_skips_balanced_braces() {
        let output = lenient("while (x > ) { y = 1; } z = 1;");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.tree.nodes().count(), 1);
    }

    #[test]
    fn lenient_consumes_stray_brace() {
        let output = lenient("} x = 1;");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.tree.nodes().count(), 1);
    }
}
