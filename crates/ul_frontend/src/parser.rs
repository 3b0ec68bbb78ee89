use std::sync::Arc;

use thiserror::Error;

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Location, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}: {message}")]
pub struct ParseError {
    pub message: String,
    pub location: Location,
}

impl ParseError {
    fn new(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

type PResult<T> = Result<T, ParseError>;

/// Recursive-descent parser with Pratt-style binary expressions.
pub struct Parser {
    lexer: Lexer,
    file: Arc<str>,
}

impl Parser {
    pub fn new(file: impl Into<Arc<str>>, source: &str) -> Self {
        let file: Arc<str> = file.into();
        Self {
            lexer: Lexer::new(file.clone(), source),
            file,
        }
    }

    pub fn parse_program(mut self) -> PResult<Program> {
        let mut decls = Vec::new();
        while !self.lexer.is_exhausted() {
            decls.push(self.parse_decl()?);
        }
        Ok(Program {
            file: self.file,
            decls,
        })
    }

    // ---- Token helpers ----

    fn peek_kind(&self) -> TokenKind {
        self.lexer.peek().kind
    }

    fn next(&mut self) -> PResult<Token> {
        let token = self.lexer.next();
        if self.lexer.is_error(&token) {
            return Err(ParseError::new(
                format!("{} `{}`", token.kind.describe(), token.lexeme),
                token.location,
            ));
        }
        Ok(token)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.lexer.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        let token = self.next()?;
        if token.kind != kind {
            return Err(unexpected(&token, kind.describe()));
        }
        Ok(token)
    }

    fn expect_ident(&mut self) -> PResult<(String, Location)> {
        let token = self.expect(TokenKind::Ident)?;
        Ok((token.lexeme, token.location))
    }

    // ---- Declarations ----

    fn parse_decl(&mut self) -> PResult<Decl> {
        let token = self.lexer.peek().clone();
        match token.kind {
            TokenKind::Let => self.parse_let_decl(),
            TokenKind::Class => self.parse_class().map(Decl::Class),
            TokenKind::Interface => self.parse_interface().map(Decl::Interface),
            TokenKind::Directive if token.lexeme == "@include" => {
                self.parse_include().map(Decl::Include)
            }
            _ => Err(unexpected(&self.next()?, "declaration")),
        }
    }

    fn parse_let_decl(&mut self) -> PResult<Decl> {
        let let_token = self.expect(TokenKind::Let)?;
        let (name, _) = self.expect_ident()?;
        match self.peek_kind() {
            TokenKind::LParen => self
                .parse_function_rest(name, let_token.location, true)
                .map(Decl::Function),
            TokenKind::ColonColon => {
                self.lexer.next();
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Decl::Const(ConstDef {
                    name,
                    value,
                    location: let_token.location,
                }))
            }
            _ => self
                .parse_var_rest(name, let_token.location)
                .map(Decl::Var),
        }
    }

    /// Parses `(params) (: ret)? (=> block | ;)` after the function name.
    fn parse_function_rest(
        &mut self,
        name: String,
        location: Location,
        allow_prototype: bool,
    ) -> PResult<FunctionDef> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.eat(TokenKind::RParen) {
            loop {
                let (pname, plocation) = self.expect_ident()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                params.push(Param {
                    name: pname,
                    ty,
                    location: plocation,
                });
                if self.eat(TokenKind::RParen) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }

        let ret = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = if allow_prototype && self.eat(TokenKind::Semi) {
            None
        } else {
            self.expect(TokenKind::FatArrow)?;
            Some(self.parse_block()?)
        };

        Ok(FunctionDef {
            name,
            params,
            ret,
            body,
            location,
        })
    }

    /// Parses `: type (= expr)? ;` after the variable name.
    fn parse_var_rest(&mut self, name: String, location: Location) -> PResult<VarDef> {
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        let init = if self.eat(TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;
        Ok(VarDef {
            name,
            ty,
            init,
            location,
        })
    }

    fn parse_class(&mut self) -> PResult<ClassDef> {
        let class_token = self.expect(TokenKind::Class)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::FatArrow)?;
        self.expect(TokenKind::LBrace)?;

        let mut class = ClassDef {
            name,
            template: Vec::new(),
            members: Vec::new(),
            methods: Vec::new(),
            location: class_token.location,
        };

        while !self.eat(TokenKind::RBrace) {
            let token = self.next()?;
            match token.kind {
                TokenKind::Directive if token.lexeme == "@template" => {
                    self.expect(TokenKind::Colon)?;
                    loop {
                        let (pname, plocation) = self.expect_ident()?;
                        let interface = if self.eat(TokenKind::Colon) {
                            Some(self.expect_ident()?.0)
                        } else {
                            None
                        };
                        class.template.push(TemplateParam {
                            name: pname,
                            interface,
                            location: plocation,
                        });
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::Semi)?;
                }
                TokenKind::Public | TokenKind::Private => {
                    let visibility = if token.kind == TokenKind::Public {
                        Visibility::Public
                    } else {
                        Visibility::Private
                    };
                    let (item, location) = self.expect_ident()?;
                    if self.peek_kind() == TokenKind::LParen {
                        let def = self.parse_function_rest(item, location, false)?;
                        let is_constructor = def.name == class.name;
                        if is_constructor && def.ret.is_some() {
                            return Err(ParseError::new(
                                "constructors cannot declare a return type",
                                def.location,
                            ));
                        }
                        class.methods.push(MethodDef {
                            visibility,
                            is_constructor,
                            def,
                        });
                    } else {
                        let var = self.parse_var_rest(item, location)?;
                        class.members.push(MemberDef { visibility, var });
                    }
                }
                _ => return Err(unexpected(&token, "class member")),
            }
        }
        Ok(class)
    }

    fn parse_interface(&mut self) -> PResult<InterfaceDef> {
        let token = self.expect(TokenKind::Interface)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::Lt)?;
        let (type_param, _) = self.expect_ident()?;
        self.expect(TokenKind::Gt)?;
        self.expect(TokenKind::FatArrow)?;
        self.expect(TokenKind::LBrace)?;

        let mut prototypes = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            let let_token = self.expect(TokenKind::Let)?;
            let (pname, _) = self.expect_ident()?;
            let proto = self.parse_function_rest(pname, let_token.location, true)?;
            if proto.body.is_some() {
                return Err(ParseError::new(
                    "interface prototypes cannot have a body",
                    proto.location,
                ));
            }
            prototypes.push(proto);
        }

        Ok(InterfaceDef {
            name,
            type_param,
            prototypes,
            location: token.location,
        })
    }

    fn parse_include(&mut self) -> PResult<Include> {
        let token = self.expect(TokenKind::Directive)?;
        let mut path = vec![self.expect_ident()?.0];
        while self.eat(TokenKind::ColonColon) {
            path.push(self.expect_ident()?.0);
        }
        self.expect(TokenKind::Semi)?;
        Ok(Include {
            path,
            location: token.location,
        })
    }

    fn parse_type(&mut self) -> PResult<TypeRef> {
        let (name, location) = self.expect_ident()?;
        let mut args = Vec::new();
        if self.eat(TokenKind::Lt) {
            loop {
                args.push(self.parse_type()?);
                if self.eat(TokenKind::Gt) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }
        let mut ptr_depth = 0;
        while self.eat(TokenKind::Star) {
            ptr_depth += 1;
        }
        Ok(TypeRef {
            name,
            args,
            ptr_depth,
            location,
        })
    }

    // ---- Statements ----

    fn parse_block(&mut self) -> PResult<Block> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            if self.lexer.is_exhausted() {
                return Err(unexpected(&self.lexer.next(), "`}`"));
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(Block {
            stmts,
            location: open.location,
        })
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let location = self.lexer.peek().location.clone();
        match self.peek_kind() {
            TokenKind::LBrace => self.parse_block().map(Stmt::Block),
            TokenKind::Let => {
                self.lexer.next();
                let (name, _) = self.expect_ident()?;
                self.parse_var_rest(name, location).map(Stmt::Var)
            }
            TokenKind::If => {
                self.lexer.next();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::FatArrow)?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.eat(TokenKind::Else) {
                    self.eat(TokenKind::FatArrow);
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    location,
                })
            }
            TokenKind::While => {
                self.lexer.next();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::FatArrow)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While {
                    cond,
                    body,
                    location,
                })
            }
            TokenKind::Return => {
                self.lexer.next();
                let value = if self.eat(TokenKind::Semi) {
                    None
                } else {
                    let value = self.parse_expr()?;
                    self.expect(TokenKind::Semi)?;
                    Some(value)
                };
                Ok(Stmt::Return { value, location })
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.eat(TokenKind::Assign) {
                    let value = self.parse_expr()?;
                    self.expect(TokenKind::Semi)?;
                    return Ok(Stmt::Assign {
                        target: expr,
                        value,
                        location,
                    });
                }
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    // ---- Expressions ----

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let Some((op, bp)) = binary_op(self.peek_kind()) else {
                break;
            };
            if bp <= min_bp {
                break;
            }
            let op_token = self.lexer.next();
            let rhs = self.parse_expr_bp(bp)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                op_token.location,
            );
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::Plus => {
                self.lexer.next();
                return self.parse_prefix();
            }
            _ => None,
        };
        match op {
            Some(op) => {
                let token = self.lexer.next();
                let operand = self.parse_prefix()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    token.location,
                ))
            }
            None => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let token = self.lexer.next();
                    let args = self.parse_args()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        token.location,
                    );
                }
                TokenKind::LBracket => {
                    let token = self.lexer.next();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::new(
                        ExprKind::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                        token.location,
                    );
                }
                TokenKind::Dot => {
                    let token = self.lexer.next();
                    let (field, _) = self.expect_ident()?;
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            field,
                        },
                        token.location,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parses a comma-separated argument list after the opening paren.
    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(TokenKind::Comma)?;
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.next()?;
        let location = token.location.clone();
        let kind = match token.kind {
            TokenKind::Ident => ExprKind::Ident(token.lexeme),
            TokenKind::IntLit => ExprKind::Int(parse_int(&token)?),
            TokenKind::FloatLit => {
                let text = token.lexeme.trim_end_matches('f');
                let value = text.parse::<f64>().map_err(|_| {
                    ParseError::new(format!("invalid float literal `{}`", token.lexeme), location.clone())
                })?;
                ExprKind::Float(value)
            }
            TokenKind::CharLit => {
                let bytes = unescape(&token.lexeme[1..token.lexeme.len() - 1], &location)?;
                match bytes.as_slice() {
                    [b] => ExprKind::Char(*b),
                    _ => {
                        return Err(ParseError::new(
                            format!("character literal `{}` must be one byte", token.lexeme),
                            location,
                        ));
                    }
                }
            }
            TokenKind::StrLit => {
                ExprKind::Str(unescape(&token.lexeme[1..token.lexeme.len() - 1], &location)?)
            }
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::Directive => return self.parse_directive_expr(token),
            _ => return Err(unexpected(&token, "expression")),
        };
        Ok(Expr::new(kind, location))
    }

    fn parse_directive_expr(&mut self, token: Token) -> PResult<Expr> {
        self.expect(TokenKind::LParen)?;
        let ty = self.parse_type()?;
        let kind = match token.lexeme.as_str() {
            "@sizeof" => ExprKind::SizeOf(ty),
            "@as" | "@new" => {
                self.expect(TokenKind::Comma)?;
                let expr = Box::new(self.parse_expr()?);
                if token.lexeme == "@as" {
                    ExprKind::As { ty, expr }
                } else {
                    ExprKind::New { ty, expr }
                }
            }
            other => {
                return Err(ParseError::new(
                    format!("unknown directive `{other}` in expression"),
                    token.location,
                ));
            }
        };
        self.expect(TokenKind::RParen)?;
        Ok(Expr::new(kind, token.location))
    }
}

/// Binding power of an infix operator; higher binds tighter.
fn binary_op(kind: TokenKind) -> Option<(BinaryOp, u8)> {
    let entry = match kind {
        TokenKind::OrOr => (BinaryOp::Or, 1),
        TokenKind::AndAnd => (BinaryOp::And, 2),
        TokenKind::Pipe => (BinaryOp::BitOr, 3),
        TokenKind::Caret => (BinaryOp::BitXor, 4),
        TokenKind::Amp => (BinaryOp::BitAnd, 5),
        TokenKind::EqEq => (BinaryOp::Eq, 6),
        TokenKind::NotEq => (BinaryOp::NotEq, 6),
        TokenKind::Lt => (BinaryOp::Lt, 7),
        TokenKind::LtEq => (BinaryOp::LtEq, 7),
        TokenKind::Gt => (BinaryOp::Gt, 7),
        TokenKind::GtEq => (BinaryOp::GtEq, 7),
        TokenKind::Plus => (BinaryOp::Add, 8),
        TokenKind::Minus => (BinaryOp::Sub, 8),
        TokenKind::Star => (BinaryOp::Mul, 9),
        TokenKind::Slash => (BinaryOp::Div, 9),
        TokenKind::Percent => (BinaryOp::Mod, 9),
        _ => return None,
    };
    Some(entry)
}

fn unexpected(token: &Token, expected: &str) -> ParseError {
    let found = if token.kind == TokenKind::Eof {
        token.kind.describe().to_string()
    } else {
        format!("`{}`", token.lexeme)
    };
    ParseError::new(
        format!("expected {expected}, found {found}"),
        token.location.clone(),
    )
}

fn parse_int(token: &Token) -> PResult<i64> {
    let text = token.lexeme.as_str();
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        text.parse::<i64>()
    };
    parsed.map_err(|_| {
        ParseError::new(
            format!("integer literal `{text}` is out of range"),
            token.location.clone(),
        )
    })
}

fn unescape(text: &str, location: &Location) -> PResult<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let escaped = match bytes.next() {
            Some(b'n') => b'\n',
            Some(b't') => b'\t',
            Some(b'r') => b'\r',
            Some(b'0') => 0,
            Some(b'\\') => b'\\',
            Some(b'\'') => b'\'',
            Some(b'"') => b'"',
            other => {
                return Err(ParseError::new(
                    format!(
                        "unknown escape sequence `\\{}`",
                        other.map(char::from).unwrap_or(' ')
                    ),
                    location.clone(),
                ));
            }
        };
        out.push(escaped);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Program {
        Parser::new("test.ul", source)
            .parse_program()
            .unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    fn parse_one_expr(source: &str) -> Expr {
        let mut parser = Parser::new("test.ul", source);
        parser.parse_expr().unwrap()
    }

    #[test]
    fn test_function_definition() {
        let program = parse("let add(a: int, b: int): int => { return a + b; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("expected function");
        };
        assert_eq!(f.name, "add");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.ret.as_ref().map(|t| t.name.as_str()), Some("int"));
        let body = f.body.as_ref().unwrap();
        assert!(matches!(body.stmts[0], Stmt::Return { value: Some(_), .. }));
    }

    #[test]
    fn test_prototype_has_no_body() {
        let program = parse("let puts(s: char*): int;");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("expected function");
        };
        assert!(f.body.is_none());
        assert_eq!(f.params[0].ty.ptr_depth, 1);
    }

    #[test]
    fn test_generic_class() {
        let program = parse(
            "class Box => { @template: T, U: Printable; public val: T; \
             public Box(v: T) => { self.val = v; } public get(): T => { return self.val; } }",
        );
        let Decl::Class(class) = &program.decls[0] else {
            panic!("expected class");
        };
        assert!(class.is_generic());
        assert_eq!(class.template[1].interface.as_deref(), Some("Printable"));
        assert_eq!(class.members[0].var.name, "val");
        assert_eq!(class.constructors().count(), 1);
        assert_eq!(class.plain_methods().count(), 1);
    }

    #[test]
    fn test_nested_generic_type() {
        let program = parse("let b: Box<Box<int>>*;");
        let Decl::Var(var) = &program.decls[0] else {
            panic!("expected variable");
        };
        assert_eq!(var.ty.to_string(), "Box<Box<int>>*");
    }

    #[test]
    fn test_include_and_const() {
        let program = parse("@include std::io; let LIMIT :: 10;");
        let Decl::Include(inc) = &program.decls[0] else {
            panic!("expected include");
        };
        assert_eq!(inc.path, vec!["std".to_string(), "io".to_string()]);
        assert!(matches!(program.decls[1], Decl::Const(_)));
    }

    #[test]
    fn test_precedence() {
        let expr = parse_one_expr("1 + 2 * 3 == 7 && ok");
        let ExprKind::Binary { op, lhs, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::And);
        let ExprKind::Binary { op, lhs, .. } = lhs.kind else {
            panic!("expected comparison");
        };
        assert_eq!(op, BinaryOp::Eq);
        let ExprKind::Binary { op, rhs, .. } = lhs.kind else {
            panic!("expected addition");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        let expr = parse_one_expr("a - b - c");
        let ExprKind::Binary { lhs, rhs, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
        assert_eq!(rhs.kind, ExprKind::Ident("c".into()));
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse_one_expr("-p.items[2].get(1)");
        let ExprKind::Unary { op, operand } = expr.kind else {
            panic!("expected unary");
        };
        assert_eq!(op, UnaryOp::Neg);
        let ExprKind::Call { callee, args } = operand.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert!(matches!(callee.kind, ExprKind::Member { .. }));
    }

    #[test]
    fn test_directives() {
        assert!(matches!(parse_one_expr("@as(i64, x)").kind, ExprKind::As { .. }));
        assert!(matches!(parse_one_expr("@new(Box<int>, 3)").kind, ExprKind::New { .. }));
        assert!(matches!(parse_one_expr("@sizeof(int*)").kind, ExprKind::SizeOf(_)));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_one_expr("0x10").kind, ExprKind::Int(16));
        assert_eq!(parse_one_expr("0b11").kind, ExprKind::Int(3));
        assert_eq!(parse_one_expr("2.5f").kind, ExprKind::Float(2.5));
        assert_eq!(parse_one_expr("'\\n'").kind, ExprKind::Char(b'\n'));
        assert_eq!(parse_one_expr("\"a\\tb\"").kind, ExprKind::Str(b"a\tb".to_vec()));
        assert_eq!(parse_one_expr("\"a\\0b\"").kind, ExprKind::Str(vec![b'a', 0, b'b']));
    }

    #[test]
    fn test_statements() {
        let program = parse(
            "let main(): int => { let i: int = 0; while i < 3 => { i = i + 1; } \
             if i == 3 => { return 0; } else => return 1; }",
        );
        let Decl::Function(f) = &program.decls[0] else {
            panic!("expected function");
        };
        let stmts = &f.body.as_ref().unwrap().stmts;
        assert!(matches!(stmts[0], Stmt::Var(_)));
        assert!(matches!(stmts[1], Stmt::While { .. }));
        assert!(matches!(stmts[2], Stmt::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn test_error_location() {
        let err = Parser::new("test.ul", "let x: int = ;").parse_program().unwrap_err();
        assert_eq!(err.location.column, 14);
        assert!(err.message.contains("expected expression"));
    }

    #[test]
    fn test_constructor_with_return_type_rejected() {
        let err = Parser::new("test.ul", "class A => { public A(): int => {} }")
            .parse_program()
            .unwrap_err();
        assert!(err.message.contains("constructors"));
    }
}
