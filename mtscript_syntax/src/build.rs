use std::{iter::Peekable, rc::Rc, vec::IntoIter};

use crate::{
    ast::{
        Ast, BinOp, Expr, ExprKind, FunctionDef, Ident, Literal, LogicalOp, Stmt, StmtKind,
        UnaryOp,
    },
    error::{Diagnostic, ErrorKind},
    parse::{Rule, SyntaxElement, SyntaxNode},
    token::{Span, Token, TokenKind},
};

/// Lower a concrete parse tree into the AST, dropping punctuation,
/// parentheses and empty statements. Fails only on a tree that the
/// parser could not have produced.
pub fn build(tree: SyntaxNode) -> Result<Ast, Diagnostic> {
    if tree.rule != Rule::Script {
        return Err(malformed(&tree.rule, tree.span));
    }
    let span = tree.span;
    let body = build_stmts(Children::new(tree).nodes())?;
    Ok(Ast { body, span })
}

fn malformed(rule: &Rule, span: Span) -> Diagnostic {
    Diagnostic::error(
        ErrorKind::MalformedTree,
        format!("malformed {rule:?} node"),
        span,
    )
}

/// Cursor over the children of one node.
struct Children {
    rule: Rule,
    span: Span,
    iter: Peekable<IntoIter<SyntaxElement>>,
}

impl Children {
    fn new(node: SyntaxNode) -> Self {
        Self {
            rule: node.rule,
            span: node.span,
            iter: node.children.into_iter().peekable(),
        }
    }

    fn error(&self) -> Diagnostic {
        malformed(&self.rule, self.span)
    }

    fn node(&mut self) -> Result<SyntaxNode, Diagnostic> {
        match self.iter.next() {
            Some(SyntaxElement::Node(n)) => Ok(n),
            _ => Err(self.error()),
        }
    }

    fn token(&mut self) -> Result<Token, Diagnostic> {
        match self.iter.next() {
            Some(SyntaxElement::Token(t)) => Ok(t),
            _ => Err(self.error()),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, Diagnostic> {
        let token = self.token()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(self.error())
        }
    }

    fn ident(&mut self) -> Result<Ident, Diagnostic> {
        let token = self.expect(TokenKind::IDENT)?;
        Ok(Ident {
            name: token.lexeme,
            span: token.span,
        })
    }

    /// Consume the next child if it is a token of `kind`.
    fn eat(&mut self, kind: TokenKind) -> bool {
        self.iter
            .next_if(|c| matches!(c, SyntaxElement::Token(t) if t.kind == kind))
            .is_some()
    }

    fn next_is_node(&mut self) -> bool {
        matches!(self.iter.peek(), Some(SyntaxElement::Node(_)))
    }

    /// The remaining child nodes, skipping tokens.
    fn nodes(self) -> impl Iterator<Item = SyntaxNode> {
        self.iter.filter_map(|c| match c {
            SyntaxElement::Node(n) => Some(n),
            SyntaxElement::Token(_) => None,
        })
    }
}

fn build_stmts(nodes: impl Iterator<Item = SyntaxNode>) -> Result<Vec<Stmt>, Diagnostic> {
    nodes
        .filter(|n| n.rule != Rule::EmptyStmt)
        .map(build_stmt)
        .collect()
}

fn build_stmt(node: SyntaxNode) -> Result<Stmt, Diagnostic> {
    let span = node.span;
    let rule = node.rule;
    let mut c = Children::new(node);
    let kind = match rule {
        // A lone `;` in statement position, e.g. `while (x) ;`
        Rule::EmptyStmt => StmtKind::Block(Vec::default()),
        Rule::Block => StmtKind::Block(build_stmts(c.nodes())?),
        Rule::ExprStmt => StmtKind::Expr(build_expr(c.node()?)?),
        Rule::VarDecl => {
            c.expect(TokenKind::VAR)?;
            let name = c.ident()?;
            let init = if c.eat(TokenKind::EQUAL) {
                Some(build_expr(c.node()?)?)
            } else {
                None
            };
            StmtKind::Var { name, init }
        }
        Rule::If => {
            c.expect(TokenKind::IF)?;
            c.expect(TokenKind::LPAREN)?;
            let condition = build_expr(c.node()?)?;
            c.expect(TokenKind::RPAREN)?;
            let then = Box::new(build_stmt(c.node()?)?);
            let otherwise = if c.eat(TokenKind::ELSE) {
                Some(Box::new(build_stmt(c.node()?)?))
            } else {
                None
            };
            StmtKind::If {
                condition,
                then,
                otherwise,
            }
        }
        Rule::While => {
            c.expect(TokenKind::WHILE)?;
            c.expect(TokenKind::LPAREN)?;
            let condition = build_expr(c.node()?)?;
            c.expect(TokenKind::RPAREN)?;
            let body = Box::new(build_stmt(c.node()?)?);
            StmtKind::While { condition, body }
        }
        Rule::For => {
            c.expect(TokenKind::FOR)?;
            c.expect(TokenKind::LPAREN)?;
            let init = build_for_init(c.node()?)?;
            c.expect(TokenKind::SEMICOLON)?;
            let condition = build_for_clause(c.node()?, Rule::ForCondition)?;
            c.expect(TokenKind::SEMICOLON)?;
            let update = build_for_clause(c.node()?, Rule::ForUpdate)?;
            c.expect(TokenKind::RPAREN)?;
            let body = Box::new(build_stmt(c.node()?)?);
            StmtKind::For {
                init,
                condition,
                update,
                body,
            }
        }
        Rule::Return => {
            c.expect(TokenKind::RETURN)?;
            if c.next_is_node() {
                StmtKind::Return(Some(build_expr(c.node()?)?))
            } else {
                StmtKind::Return(None)
            }
        }
        Rule::Break => StmtKind::Break,
        Rule::Continue => StmtKind::Continue,
        Rule::Function => {
            c.expect(TokenKind::FUNCTION)?;
            let name = c.ident()?;
            let params = c.node()?;
            if params.rule != Rule::Params {
                return Err(malformed(&params.rule, params.span));
            }
            let params = params
                .tokens()
                .filter(|t| t.kind == TokenKind::IDENT)
                .map(|t| Ident {
                    name: t.lexeme.clone(),
                    span: t.span,
                })
                .collect();
            let body = c.node()?;
            if body.rule != Rule::Block {
                return Err(malformed(&body.rule, body.span));
            }
            let body = build_stmts(Children::new(body).nodes())?;
            StmtKind::Function(Rc::new(FunctionDef {
                name,
                params,
                body,
                span,
            }))
        }
        _ => return Err(c.error()),
    };
    Ok(Stmt { kind, span })
}

fn build_for_init(node: SyntaxNode) -> Result<Option<Box<Stmt>>, Diagnostic> {
    if node.rule != Rule::ForInit {
        return Err(malformed(&node.rule, node.span));
    }
    let mut c = Children::new(node);
    if !c.next_is_node() {
        return Ok(None);
    }
    let inner = c.node()?;
    let stmt = if inner.rule == Rule::VarDecl {
        build_stmt(inner)?
    } else {
        let expr = build_expr(inner)?;
        Stmt {
            span: expr.span,
            kind: StmtKind::Expr(expr),
        }
    };
    Ok(Some(Box::new(stmt)))
}

fn build_for_clause(node: SyntaxNode, rule: Rule) -> Result<Option<Expr>, Diagnostic> {
    if node.rule != rule {
        return Err(malformed(&node.rule, node.span));
    }
    let mut c = Children::new(node);
    if c.next_is_node() {
        Ok(Some(build_expr(c.node()?)?))
    } else {
        Ok(None)
    }
}

fn build_expr(node: SyntaxNode) -> Result<Expr, Diagnostic> {
    let span = node.span;
    let rule = node.rule;
    let mut c = Children::new(node);
    let kind = match rule {
        Rule::Literal => {
            let token = c.token()?;
            let literal = match token.kind {
                TokenKind::NUMBER => {
                    Literal::Number(token.lexeme.parse().map_err(|_| c.error())?)
                }
                TokenKind::STRING => Literal::Str(token.lexeme),
                TokenKind::TRUE => Literal::Boolean(true),
                TokenKind::FALSE => Literal::Boolean(false),
                TokenKind::UNDEFINED => Literal::Undefined,
                _ => return Err(c.error()),
            };
            ExprKind::Literal(literal)
        }
        Rule::Name => ExprKind::Variable(c.expect(TokenKind::IDENT)?.lexeme),
        Rule::Group => {
            c.expect(TokenKind::LPAREN)?;
            // Keep the span of the parentheses
            build_expr(c.node()?)?.kind
        }
        Rule::List => ExprKind::List(c.nodes().map(build_expr).collect::<Result<_, _>>()?),
        Rule::Map => {
            let entries = c
                .nodes()
                .map(|entry| {
                    let mut e = Children::new(entry);
                    let key = e.token()?;
                    if !matches!(key.kind, TokenKind::IDENT | TokenKind::STRING) {
                        return Err(e.error());
                    }
                    e.expect(TokenKind::COLON)?;
                    Ok((key.lexeme, build_expr(e.node()?)?))
                })
                .collect::<Result<_, Diagnostic>>()?;
            ExprKind::Map(entries)
        }
        Rule::Unary => {
            let op = UnaryOp::from_token(c.token()?.kind).ok_or_else(|| c.error())?;
            let expr = Box::new(build_expr(c.node()?)?);
            ExprKind::Unary { op, expr }
        }
        Rule::Additive | Rule::Multiplicative | Rule::Relational | Rule::Equality => {
            let lhs = Box::new(build_expr(c.node()?)?);
            let op = BinOp::from_token(c.token()?.kind).ok_or_else(|| c.error())?;
            let rhs = Box::new(build_expr(c.node()?)?);
            ExprKind::Binary { lhs, op, rhs }
        }
        Rule::LogicalOr | Rule::LogicalAnd => {
            let lhs = Box::new(build_expr(c.node()?)?);
            let op = LogicalOp::from_token(c.token()?.kind).ok_or_else(|| c.error())?;
            let rhs = Box::new(build_expr(c.node()?)?);
            ExprKind::Logical { lhs, op, rhs }
        }
        Rule::Assignment => {
            let target = Box::new(build_expr(c.node()?)?);
            let op = match c.token()?.kind {
                TokenKind::EQUAL => None,
                kind => Some(BinOp::from_compound(kind).ok_or_else(|| c.error())?),
            };
            let value = Box::new(build_expr(c.node()?)?);
            ExprKind::Assign { target, op, value }
        }
        Rule::Call => {
            let name = c.node()?;
            if name.rule != Rule::Name {
                return Err(malformed(&name.rule, name.span));
            }
            let callee = Children::new(name).ident()?;
            let args = c.node()?;
            if args.rule != Rule::Args {
                return Err(malformed(&args.rule, args.span));
            }
            let args = Children::new(args)
                .nodes()
                .map(build_expr)
                .collect::<Result<_, _>>()?;
            ExprKind::Call { callee, args }
        }
        Rule::Index => {
            let target = Box::new(build_expr(c.node()?)?);
            c.expect(TokenKind::LBRACKET)?;
            let index = Box::new(build_expr(c.node()?)?);
            ExprKind::Index { target, index }
        }
        Rule::Member => {
            let target = Box::new(build_expr(c.node()?)?);
            c.expect(TokenKind::DOT)?;
            let field = c.ident()?;
            ExprKind::Member { target, field }
        }
        _ => return Err(c.error()),
    };
    Ok(Expr { kind, span })
}
