//! Recursive-descent parser for judge scripts.

use super::eval::Value;
use super::lexer::{tokenize, Token, TokenKind};
use super::ScriptError;

/// Maximum parser nesting: parenthesized and bracketed expressions, unary
/// operator runs, operator chains and nested `if` blocks all count.
pub const MAX_NESTING: usize = 64;

/// Maximum depth of the finished syntax tree, which bounds evaluator recursion.
pub const MAX_TREE_DEPTH: usize = 96;

/// A parsed judge script.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: String,
        value: Expr,
        line: usize,
    },
    Expr {
        expr: Expr,
        line: usize,
    },
    Raise {
        value: Option<Expr>,
        line: usize,
    },
    Assert {
        condition: Expr,
        message: Option<Expr>,
        line: usize,
    },
    Pass {
        line: usize,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Vec<Stmt>,
        line: usize,
    },
}

impl Stmt {
    pub fn line(&self) -> usize {
        match self {
            Stmt::Assign { line, .. }
            | Stmt::Expr { line, .. }
            | Stmt::Raise { line, .. }
            | Stmt::Assert { line, .. }
            | Stmt::Pass { line }
            | Stmt::If { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Python-style chained comparison: `a < b <= c`.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
    Method {
        receiver: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
}

/// Parses script source into a [`Program`].
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut statements = Vec::new();
    loop {
        parser.skip_newlines();
        if parser.check(&TokenKind::Eof) {
            break;
        }
        statements.extend(parser.statement()?);
    }
    let program = Program { statements };
    check_tree_depth(&program)?;
    Ok(program)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn statement(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        match self.peek() {
            TokenKind::If => Ok(vec![self.if_statement()?]),
            TokenKind::Indent => Err(self.error("unexpected indent")),
            TokenKind::Elif | TokenKind::Else => {
                Err(self.error("'elif'/'else' without a matching 'if'"))
            }
            _ => self.simple_line(),
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.descend()?;
        let line = self.line();
        self.advance();
        let condition = self.expression()?;
        self.expect(TokenKind::Colon)?;
        let body = self.block()?;

        let mut branches = vec![(condition, body)];
        let mut otherwise = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Elif => {
                    self.advance();
                    let condition = self.expression()?;
                    self.expect(TokenKind::Colon)?;
                    branches.push((condition, self.block()?));
                }
                TokenKind::Else => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    otherwise = self.block()?;
                    break;
                }
                _ => break,
            }
        }

        self.ascend(1);
        Ok(Stmt::If {
            branches,
            otherwise,
            line,
        })
    }

    /// Either an indented block on the following lines or statements on the
    /// same line after the colon.
    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        if !self.check(&TokenKind::Newline) {
            return self.simple_line();
        }
        self.advance();
        if !self.check(&TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.advance();

        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn simple_line(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut statements = vec![self.simple()?];
        while self.check(&TokenKind::Semicolon) {
            self.advance();
            if matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            statements.push(self.simple()?);
        }
        match self.peek() {
            TokenKind::Newline => {
                self.advance();
                Ok(statements)
            }
            TokenKind::Eof => Ok(statements),
            other => Err(self.error(&format!("unexpected {}", other.describe()))),
        }
    }

    fn simple(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();
        match self.peek().clone() {
            TokenKind::Pass => {
                self.advance();
                Ok(Stmt::Pass { line })
            }
            TokenKind::Raise => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.expression()?)
                };
                Ok(Stmt::Raise { value, line })
            }
            TokenKind::Assert => {
                self.advance();
                let condition = self.expression()?;
                let message = if self.check(&TokenKind::Comma) {
                    self.advance();
                    Some(self.expression()?)
                } else {
                    None
                };
                Ok(Stmt::Assert {
                    condition,
                    message,
                    line,
                })
            }
            TokenKind::Name(name) if self.is_assignment() => {
                self.advance();
                let op = self.advance().kind;
                let value = self.expression()?;
                let value = match op {
                    TokenKind::PlusAssign => binary(BinOp::Add, Expr::Name(name.clone()), value),
                    TokenKind::MinusAssign => binary(BinOp::Sub, Expr::Name(name.clone()), value),
                    _ => value,
                };
                Ok(Stmt::Assign {
                    target: name,
                    value,
                    line,
                })
            }
            _ => {
                let expr = self.expression()?;
                if self.check(&TokenKind::Assign) {
                    return Err(self.error("only plain names can be assigned to"));
                }
                Ok(Stmt::Expr { expr, line })
            }
        }
    }

    fn is_assignment(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::Assign | TokenKind::PlusAssign | TokenKind::MinusAssign)
        )
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    // Expressions, lowest precedence first.

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.descend()?;
        let expr = self.conditional()?;
        self.ascend(1);
        Ok(expr)
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let then = self.or_expr()?;
        if !self.check(&TokenKind::If) {
            return Ok(then);
        }
        self.advance();
        let condition = self.or_expr()?;
        self.expect(TokenKind::Else)?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.and_expr()?;
        let mut chain = 0;
        while self.check(&TokenKind::Or) {
            self.advance();
            self.descend()?;
            chain += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.ascend(chain);
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.not_expr()?;
        let mut chain = 0;
        while self.check(&TokenKind::And) {
            self.advance();
            self.descend()?;
            chain += 1;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.ascend(chain);
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ScriptError> {
        if self.check(&TokenKind::Not) {
            self.advance();
            self.descend()?;
            let operand = self.not_expr()?;
            self.ascend(1);
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Eq => CmpOp::Eq,
                TokenKind::Ne => CmpOp::Ne,
                TokenKind::Lt => CmpOp::Lt,
                TokenKind::Le => CmpOp::Le,
                TokenKind::Gt => CmpOp::Gt,
                TokenKind::Ge => CmpOp::Ge,
                TokenKind::In => CmpOp::In,
                TokenKind::Not
                    if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::In) =>
                {
                    self.advance();
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.advance();
            rest.push((op, self.arith()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn arith(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.term()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            chain += 1;
            let right = self.term()?;
            left = binary(op, left, right);
        }
        self.ascend(chain);
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::SlashSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.descend()?;
            chain += 1;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
        self.ascend(chain);
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.check(&TokenKind::Minus) {
            self.advance();
            self.descend()?;
            let operand = self.unary()?;
            self.ascend(1);
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.atom()?;
        let mut chain = 0;
        loop {
            if matches!(
                self.peek(),
                TokenKind::LBracket | TokenKind::Dot | TokenKind::LParen
            ) {
                self.descend()?;
                chain += 1;
            }
            match self.peek() {
                TokenKind::LBracket => {
                    self.advance();
                    expr = self.subscript(expr)?;
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = match self.advance().kind {
                        TokenKind::Name(name) => name,
                        other => {
                            return Err(self.error(&format!(
                                "expected method name, found {}",
                                other.describe()
                            )))
                        }
                    };
                    self.expect(TokenKind::LParen)?;
                    let args = self.arguments()?;
                    expr = Expr::Method {
                        receiver: Box::new(expr),
                        name,
                        args,
                    };
                }
                TokenKind::LParen => {
                    let Expr::Name(function) = expr else {
                        return Err(self.error("only builtin functions can be called"));
                    };
                    self.advance();
                    let args = self.arguments()?;
                    expr = Expr::Call { function, args };
                }
                _ => break,
            }
        }
        self.ascend(chain);
        Ok(expr)
    }

    /// Parses what follows `[`: an index or a `start:end` slice.
    fn subscript(&mut self, target: Expr) -> Result<Expr, ScriptError> {
        let start = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };

        if !self.check(&TokenKind::Colon) {
            self.expect(TokenKind::RBracket)?;
            let index = start.ok_or_else(|| self.error("empty index"))?;
            return Ok(Expr::Index {
                target: Box::new(target),
                index,
            });
        }

        self.advance();
        let end = if self.check(&TokenKind::RBracket) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::Slice {
            target: Box::new(target),
            start,
            end,
        })
    }

    /// Parses a comma-separated argument list after `(`, consuming `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        self.sequence(TokenKind::RParen)
    }

    fn sequence(&mut self, close: TokenKind) -> Result<Vec<Expr>, ScriptError> {
        let mut items = Vec::new();
        while !self.check(&close) {
            items.push(self.expression()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(close)?;
        Ok(items)
    }

    fn atom(&mut self) -> Result<Expr, ScriptError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(value) => Ok(Expr::Literal(Value::Int(value))),
            TokenKind::Str(value) => Ok(Expr::Literal(Value::Str(value))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::None => Ok(Expr::Literal(Value::None)),
            TokenKind::Name(name) => Ok(Expr::Name(name)),
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => Ok(Expr::List(self.sequence(TokenKind::RBracket)?)),
            other => Err(ScriptError::Syntax {
                line: token.line,
                message: format!("unexpected {}", other.describe()),
            }),
        }
    }

    // Token helpers.

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        match self.tokens.get(self.pos) {
            Some(token) => {
                self.pos += 1;
                token.clone()
            }
            None => Token {
                kind: TokenKind::Eof,
                line: self.line(),
            },
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ScriptError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&format!(
                "expected {}, found {}",
                kind.describe(),
                self.peek().describe()
            )))
        }
    }

    fn descend(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(&format!("too many nested levels (limit {MAX_NESTING})")));
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message: message.to_string(),
        }
    }
}

/// Rejects programs whose syntax tree is deeper than [`MAX_TREE_DEPTH`].
///
/// Operator chains nest to the left independently of the parser's own
/// recursion, so the finished tree is measured separately, without recursion.
fn check_tree_depth(program: &Program) -> Result<(), ScriptError> {
    enum Node<'a> {
        Stmt(&'a Stmt),
        Expr(&'a Expr),
    }

    let mut pending: Vec<(Node<'_>, usize, usize)> = program
        .statements
        .iter()
        .map(|stmt| (Node::Stmt(stmt), 1, stmt.line()))
        .collect();

    while let Some((node, depth, line)) = pending.pop() {
        if depth > MAX_TREE_DEPTH {
            return Err(ScriptError::Syntax {
                line,
                message: format!("script is nested too deeply (limit {MAX_TREE_DEPTH})"),
            });
        }
        let next = depth + 1;
        match node {
            Node::Stmt(stmt) => {
                let line = stmt.line();
                match stmt {
                    Stmt::Assign { value: expr, .. } | Stmt::Expr { expr, .. } => {
                        pending.push((Node::Expr(expr), next, line));
                    }
                    Stmt::Raise { value, .. } => {
                        pending.extend(value.iter().map(|e| (Node::Expr(e), next, line)));
                    }
                    Stmt::Assert {
                        condition, message, ..
                    } => {
                        pending.push((Node::Expr(condition), next, line));
                        pending.extend(message.iter().map(|e| (Node::Expr(e), next, line)));
                    }
                    Stmt::Pass { .. } => {}
                    Stmt::If {
                        branches,
                        otherwise,
                        ..
                    } => {
                        for (condition, body) in branches {
                            pending.push((Node::Expr(condition), next, line));
                            pending.extend(body.iter().map(|s| (Node::Stmt(s), next, s.line())));
                        }
                        pending.extend(otherwise.iter().map(|s| (Node::Stmt(s), next, s.line())));
                    }
                }
            }
            Node::Expr(expr) => {
                let mut children: Vec<&Expr> = Vec::new();
                match expr {
                    Expr::Literal(_) | Expr::Name(_) => {}
                    Expr::List(items) | Expr::Call { args: items, .. } => children.extend(items),
                    Expr::Neg(operand) | Expr::Not(operand) => children.push(operand),
                    Expr::And(left, right)
                    | Expr::Or(left, right)
                    | Expr::Binary { left, right, .. } => {
                        children.push(left);
                        children.push(right);
                    }
                    Expr::Compare { first, rest } => {
                        children.push(first);
                        children.extend(rest.iter().map(|(_, e)| e));
                    }
                    Expr::Conditional {
                        condition,
                        then,
                        otherwise,
                    } => children.extend([&**condition, &**then, &**otherwise]),
                    Expr::Index { target, index } => children.extend([&**target, &**index]),
                    Expr::Slice { target, start, end } => {
                        children.push(target);
                        children.extend(start.as_deref());
                        children.extend(end.as_deref());
                    }
                    Expr::Method { receiver, args, .. } => {
                        children.push(receiver);
                        children.extend(args);
                    }
                }
                pending.extend(children.into_iter().map(|e| (Node::Expr(e), next, line)));
            }
        }
    }
    Ok(())
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let program = parse("output = 'PASS'").unwrap();
        assert_eq!(
            program.statements,
            vec![Stmt::Assign {
                target: "output".into(),
                value: Expr::Literal(Value::Str("PASS".into())),
                line: 1,
            }]
        );
    }

    #[test]
    fn test_parse_precedence() {
        let program = parse("x = 1 + 2 * 3").unwrap();
        let Stmt::Assign { value, .. } = &program.statements[0] else {
            panic!("expected assignment");
        };
        let Expr::Binary { op, right, .. } = value else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_parse_inline_if_else() {
        let program = parse("if exit_code == 0: output = 'PASS'\nelse: output = 'FAIL'\n").unwrap();
        let Stmt::If {
            branches,
            otherwise,
            ..
        } = &program.statements[0]
        else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 1);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn test_parse_block_if_elif() {
        let source = "\
if 'a' in stdout:
    x = 1
    y = 2
elif not stdout:
    x = 3
else:
    pass
done = True
";
        let program = parse(source).unwrap();
        assert_eq!(program.statements.len(), 2);
        let Stmt::If {
            branches,
            otherwise,
            ..
        } = &program.statements[0]
        else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].1.len(), 2);
        assert_eq!(otherwise, &vec![Stmt::Pass { line: 7 }]);
        assert_eq!(program.statements[1].line(), 8);
    }

    #[test]
    fn test_parse_not_in_and_chained_compare() {
        let program = parse("x = 'a' not in s; y = 0 < n <= 10").unwrap();
        assert_eq!(program.statements.len(), 2);
        let Stmt::Assign { value, .. } = &program.statements[1] else {
            panic!("expected assignment");
        };
        let Expr::Compare { rest, .. } = value else {
            panic!("expected compare");
        };
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_parse_methods_index_slice_and_ternary() {
        parse("n = len(stdout.strip().splitlines()[-1][1:])").unwrap();
        parse("output = 'PASS' if x else 'FAIL'").unwrap();
        parse("count += 1").unwrap();
        parse("items = [1, 2,\n 3,]").unwrap();
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse("output ="),
            Err(ScriptError::Syntax { line: 1, .. })
        ));
        assert!(parse("x.y = 1").is_err());
        assert!(parse("else: x = 1").is_err());
        assert!(parse("if x:\ny = 1").is_err());
        assert!(parse("  x = 1").is_err());
        assert!(parse("f = stdout.strip").is_err());
        assert!(parse("[a](1)").is_err());
    }

    fn nesting_error(source: &str) -> bool {
        matches!(
            parse(source),
            Err(ScriptError::Syntax { ref message, .. }) if message.contains("limit")
        )
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let parens = format!("output = {}1{}", "(".repeat(2000), ")".repeat(2000));
        assert!(nesting_error(&parens));
        let lists = format!("output = {}1{}", "[".repeat(10_000), "]".repeat(10_000));
        assert!(nesting_error(&lists));
        assert!(nesting_error(&format!("x = {}1", "-".repeat(5000))));
        assert!(nesting_error(&format!("x = {}True", "not ".repeat(5000))));
        assert!(nesting_error(&format!("x = 1{}", " + 1".repeat(5000))));
        assert!(nesting_error(&format!("x = s{}", ".strip()".repeat(5000))));

        let mut nested_ifs = String::new();
        for level in 0..200 {
            nested_ifs.push_str(&"    ".repeat(level));
            nested_ifs.push_str("if True:\n");
        }
        nested_ifs.push_str(&"    ".repeat(200));
        nested_ifs.push_str("pass\n");
        assert!(nesting_error(&nested_ifs));
    }

    #[test]
    fn test_moderate_nesting_is_accepted() {
        let parens = format!("output = {}1{}", "(".repeat(20), ")".repeat(20));
        assert!(parse(&parens).is_ok());
        assert!(parse(&format!("x = 1{}", " + 1".repeat(40))).is_ok());
    }

    #[test]
    fn test_tree_depth_is_bounded_across_levels() {
        // Each parenthesized level stays under the parser limit, but the
        // operator chains stack up to a deeper tree.
        let chain = " + 1".repeat(50);
        let source = format!("x = ((1{chain}){chain}){chain}");
        assert!(nesting_error(&source));
    }
}
