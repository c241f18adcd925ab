//! Recursive-descent parser from tokens to [`Program`].
//!
//! Binary operators use precedence climbing; everything else is one
//! method per grammar production. Constructs outside the supported subset
//! (classes, `new`, template literals, generators, modules) are rejected
//! with a `SyntaxError` naming the construct.

use super::ast::*;
use super::error::ScriptError;
use super::lexer::{tokenize, Keyword, Spanned, Token};
use std::rc::Rc;

/// Deepest statement/expression nesting accepted before bailing out.
const MAX_NESTING: usize = 256;

/// Parse a complete script.
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        allow_in: true,
    };
    parser.parse_program()
}

type PResult<T> = Result<T, ScriptError>;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    allow_in: bool,
}

fn binary_precedence(token: &Token, allow_in: bool) -> Option<(u8, BinaryOrLogical)> {
    use BinaryOrLogical::{Binary as B, Logical as L};
    let entry = match token {
        Token::Punct(p) => match *p {
            "??" => (1, L(LogicalOp::Nullish)),
            "||" => (2, L(LogicalOp::Or)),
            "&&" => (3, L(LogicalOp::And)),
            "|" => (4, B(BinaryOp::BitOr)),
            "^" => (5, B(BinaryOp::BitXor)),
            "&" => (6, B(BinaryOp::BitAnd)),
            "==" => (7, B(BinaryOp::Eq)),
            "!=" => (7, B(BinaryOp::NotEq)),
            "===" => (7, B(BinaryOp::StrictEq)),
            "!==" => (7, B(BinaryOp::StrictNotEq)),
            "<" => (8, B(BinaryOp::Lt)),
            "<=" => (8, B(BinaryOp::LtEq)),
            ">" => (8, B(BinaryOp::Gt)),
            ">=" => (8, B(BinaryOp::GtEq)),
            "<<" => (9, B(BinaryOp::Shl)),
            ">>" => (9, B(BinaryOp::Shr)),
            ">>>" => (9, B(BinaryOp::UShr)),
            "+" => (10, B(BinaryOp::Add)),
            "-" => (10, B(BinaryOp::Sub)),
            "*" => (11, B(BinaryOp::Mul)),
            "/" => (11, B(BinaryOp::Div)),
            "%" => (11, B(BinaryOp::Rem)),
            "**" => (12, B(BinaryOp::Exp)),
            _ => return None,
        },
        Token::Keyword(Keyword::In) if allow_in => (8, B(BinaryOp::In)),
        _ => return None,
    };
    Some(entry)
}

#[derive(Clone, Copy)]
enum BinaryOrLogical {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn compound_assignment(punct: &str) -> Option<Option<BinaryOp>> {
    let op = match punct {
        "=" => None,
        "+=" => Some(BinaryOp::Add),
        "-=" => Some(BinaryOp::Sub),
        "*=" => Some(BinaryOp::Mul),
        "/=" => Some(BinaryOp::Div),
        "%=" => Some(BinaryOp::Rem),
        "**=" => Some(BinaryOp::Exp),
        "&=" => Some(BinaryOp::BitAnd),
        "|=" => Some(BinaryOp::BitOr),
        "^=" => Some(BinaryOp::BitXor),
        "<<=" => Some(BinaryOp::Shl),
        ">>=" => Some(BinaryOp::Shr),
        ">>>=" => Some(BinaryOp::UShr),
        _ => return None,
    };
    Some(op)
}

fn keyword_text(keyword: Keyword) -> &'static str {
    match keyword {
        Keyword::Break => "break",
        Keyword::Case => "case",
        Keyword::Catch => "catch",
        Keyword::Const => "const",
        Keyword::Continue => "continue",
        Keyword::Default => "default",
        Keyword::Do => "do",
        Keyword::Else => "else",
        Keyword::False => "false",
        Keyword::Finally => "finally",
        Keyword::For => "for",
        Keyword::Function => "function",
        Keyword::If => "if",
        Keyword::In => "in",
        Keyword::Let => "let",
        Keyword::Null => "null",
        Keyword::Return => "return",
        Keyword::Switch => "switch",
        Keyword::This => "this",
        Keyword::Throw => "throw",
        Keyword::True => "true",
        Keyword::Try => "try",
        Keyword::Typeof => "typeof",
        Keyword::Var => "var",
        Keyword::While => "while",
        Keyword::Class => "class",
        Keyword::New => "new",
        Keyword::Delete => "delete",
        Keyword::Instanceof => "instanceof",
        Keyword::Yield => "yield",
        Keyword::Await => "await",
        Keyword::Async => "async",
        Keyword::Import => "import",
        Keyword::Export => "export",
        Keyword::With => "with",
    }
}

impl Parser {
    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    fn current(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn advance(&mut self) -> Token {
        let token = self.current().token.clone();
        self.pos += 1;
        token
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Token::Punct(p) if *p == punct)
    }

    fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek(), Token::Keyword(k) if *k == keyword)
    }

    fn is_contextual(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == word)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> PResult<T> {
        let at = self.current();
        Err(ScriptError::syntax(message, at.line, at.column))
    }

    fn unexpected<T>(&self) -> PResult<T> {
        let description = match self.peek() {
            Token::Eof => return self.error("Unexpected end of input"),
            Token::Number(n) => format!("number {}", n),
            Token::Str(_) => "string".to_string(),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Keyword(keyword) => format!("token '{}'", keyword_text(*keyword)),
            Token::Punct(p) => format!("token '{}'", p),
            Token::Backtick => return self.error("Template literals are not supported"),
        };
        self.error(format!("Unexpected {}", description))
    }

    fn expect_punct(&mut self, punct: &str) -> PResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            self.unexpected()
        }
    }

    fn expect_ident(&mut self) -> PResult<Rc<str>> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(Rc::from(name.as_str()))
            }
            _ => self.unexpected(),
        }
    }

    /// Automatic semicolon insertion, restricted to the common cases.
    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat_punct(";") {
            return Ok(());
        }
        if self.is_punct("}") || matches!(self.peek(), Token::Eof) || self.current().newline_before
        {
            return Ok(());
        }
        self.unexpected()
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return self.error("Nesting too deep");
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn with_in<T>(&mut self, allow_in: bool, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = self.allow_in;
        self.allow_in = allow_in;
        let result = f(self);
        self.allow_in = saved;
        result
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_program(&mut self) -> PResult<Program> {
        let mut body = Vec::new();
        while !matches!(self.peek(), Token::Eof) {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        self.enter()?;
        let stmt = self.parse_statement_inner();
        self.leave();
        stmt
    }

    fn parse_statement_inner(&mut self) -> PResult<Stmt> {
        match self.peek().clone() {
            Token::Punct("{") => Ok(Stmt::Block(self.parse_block()?)),
            Token::Punct(";") => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Token::Keyword(Keyword::Var) => self.parse_declaration_statement(DeclKind::Var),
            Token::Keyword(Keyword::Let) => self.parse_declaration_statement(DeclKind::Let),
            Token::Keyword(Keyword::Const) => self.parse_declaration_statement(DeclKind::Const),
            Token::Keyword(Keyword::Function) => {
                self.advance();
                if self.is_punct("*") {
                    return self.error("Generators are not supported");
                }
                let name = self.expect_ident()?;
                let def = self.parse_function_rest(Some(name))?;
                Ok(Stmt::Function(Rc::new(def)))
            }
            Token::Keyword(Keyword::Return) => {
                self.advance();
                let argument = if self.is_punct(";")
                    || self.is_punct("}")
                    || matches!(self.peek(), Token::Eof)
                    || self.current().newline_before
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(argument))
            }
            Token::Keyword(Keyword::If) => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.parse_expression()?;
                self.expect_punct(")")?;
                let consequent = Box::new(self.parse_statement()?);
                let alternate = if self.eat_keyword(Keyword::Else) {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    test,
                    consequent,
                    alternate,
                })
            }
            Token::Keyword(Keyword::While) => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.parse_expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { test, body })
            }
            Token::Keyword(Keyword::Do) => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                if !self.eat_keyword(Keyword::While) {
                    return self.unexpected();
                }
                self.expect_punct("(")?;
                let test = self.parse_expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile { body, test })
            }
            Token::Keyword(Keyword::For) => self.parse_for(),
            Token::Keyword(Keyword::Break) => {
                self.advance();
                self.consume_semicolon()?;
                Ok(Stmt::Break)
            }
            Token::Keyword(Keyword::Continue) => {
                self.advance();
                self.consume_semicolon()?;
                Ok(Stmt::Continue)
            }
            Token::Keyword(Keyword::Throw) => {
                self.advance();
                if self.current().newline_before {
                    return self.error("Illegal newline after throw");
                }
                let argument = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(argument))
            }
            Token::Keyword(Keyword::Try) => self.parse_try(),
            Token::Keyword(Keyword::Switch) => self.parse_switch(),
            Token::Keyword(
                keyword @ (Keyword::Class
                | Keyword::Import
                | Keyword::Export
                | Keyword::With
                | Keyword::Async
                | Keyword::Yield
                | Keyword::Await),
            ) => self.error(format!(
                "'{}' is not supported by the sandboxed interpreter",
                keyword_text(keyword)
            )),
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if matches!(self.peek(), Token::Eof) {
                return self.unexpected();
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_declaration_statement(&mut self, kind: DeclKind) -> PResult<Stmt> {
        self.advance();
        let declarators = self.parse_declarators(kind)?;
        self.consume_semicolon()?;
        Ok(Stmt::Decl(kind, declarators))
    }

    fn parse_declarators(&mut self, kind: DeclKind) -> PResult<Vec<Declarator>> {
        let mut declarators = Vec::new();
        loop {
            let target = self.parse_binding_pattern()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            if init.is_none() {
                if kind == DeclKind::Const {
                    return self.error("Missing initializer in const declaration");
                }
                if !matches!(target, Pattern::Ident(_)) {
                    return self.error("Missing initializer in destructuring declaration");
                }
            }
            declarators.push(Declarator { target, init });
            if !self.eat_punct(",") {
                return Ok(declarators);
            }
        }
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect_punct("(")?;

        let decl_kind = match self.peek() {
            Token::Keyword(Keyword::Var) => Some(DeclKind::Var),
            Token::Keyword(Keyword::Let) => Some(DeclKind::Let),
            Token::Keyword(Keyword::Const) => Some(DeclKind::Const),
            _ => None,
        };

        let init = if let Some(kind) = decl_kind {
            self.advance();
            let start = self.pos;
            let pattern = self.parse_binding_pattern()?;
            if let Some(iteration) = self.iteration_kind() {
                self.advance();
                return self.parse_for_each(iteration, ForBinding::Decl(kind, pattern));
            }
            self.pos = start;
            let declarators = self.with_in(false, |p| p.parse_declarators(kind))?;
            Some(ForInit::Decl(kind, declarators))
        } else if self.is_punct(";") {
            None
        } else {
            let expr = self.with_in(false, |p| p.parse_expression())?;
            if let Some(iteration) = self.iteration_kind() {
                self.advance();
                let target = self.to_assign_target(expr, true)?;
                return self.parse_for_each(iteration, ForBinding::Target(target));
            }
            Some(ForInit::Expr(expr))
        };

        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn iteration_kind(&self) -> Option<IterationKind> {
        if self.is_contextual("of") {
            Some(IterationKind::Of)
        } else if self.is_keyword(Keyword::In) {
            Some(IterationKind::In)
        } else {
            None
        }
    }

    fn parse_for_each(&mut self, kind: IterationKind, binding: ForBinding) -> PResult<Stmt> {
        let iterable = self.parse_assignment()?;
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::ForEach {
            kind,
            binding,
            iterable,
            body,
        })
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        self.advance();
        let block = self.parse_block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_keyword(Keyword::Catch) {
            if self.eat_punct("(") {
                param = Some(self.parse_binding_pattern()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.parse_block()?);
        }
        let finalizer = if self.eat_keyword(Keyword::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return self.error("Missing catch or finally after try");
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect_punct("(")?;
        let discriminant = self.parse_expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.eat_punct("}") {
            let test = if self.eat_keyword(Keyword::Case) {
                Some(self.parse_expression()?)
            } else if self.eat_keyword(Keyword::Default) {
                if seen_default {
                    return self.error("More than one default clause in switch statement");
                }
                seen_default = true;
                None
            } else {
                return self.unexpected();
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !self.is_keyword(Keyword::Case)
                && !self.is_keyword(Keyword::Default)
                && !self.is_punct("}")
            {
                if matches!(self.peek(), Token::Eof) {
                    return self.unexpected();
                }
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    // ------------------------------------------------------------------
    // Functions and patterns
    // ------------------------------------------------------------------

    /// Parameters and body, after the `function` keyword and optional name.
    fn parse_function_rest(&mut self, name: Option<Rc<str>>) -> PResult<FunctionDef> {
        let (params, rest) = self.parse_params()?;
        let body = self.with_in(true, |p| p.parse_block())?;
        Ok(FunctionDef {
            name,
            params,
            rest,
            body: FunctionBody::Block(body),
            is_arrow: false,
        })
    }

    fn parse_params(&mut self) -> PResult<(Vec<PatternElement>, Option<Pattern>)> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        let mut rest = None;
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                rest = Some(self.parse_binding_pattern()?);
                self.expect_punct(")")?;
                break;
            }
            params.push(self.parse_binding_element()?);
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok((params, rest))
    }

    fn parse_binding_element(&mut self) -> PResult<PatternElement> {
        let target = self.parse_binding_pattern()?;
        let default = if self.eat_punct("=") {
            Some(self.with_in(true, |p| p.parse_assignment())?)
        } else {
            None
        };
        Ok(PatternElement { target, default })
    }

    fn parse_binding_pattern(&mut self) -> PResult<Pattern> {
        if self.eat_punct("[") {
            let mut elements = Vec::new();
            let mut rest = None;
            while !self.eat_punct("]") {
                if self.eat_punct(",") {
                    elements.push(None);
                    continue;
                }
                if self.eat_punct("...") {
                    rest = Some(Box::new(self.parse_binding_pattern()?));
                    self.expect_punct("]")?;
                    break;
                }
                elements.push(Some(self.parse_binding_element()?));
                if !self.is_punct("]") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Array { elements, rest });
        }

        if self.eat_punct("{") {
            let mut properties = Vec::new();
            let mut rest = None;
            while !self.eat_punct("}") {
                if self.eat_punct("...") {
                    rest = Some(self.expect_ident()?);
                    self.expect_punct("}")?;
                    break;
                }
                let shorthand = matches!(self.peek(), Token::Ident(_))
                    && !matches!(self.peek_at(1), Token::Punct(":"));
                let element = if shorthand {
                    let name = self.expect_ident()?;
                    let default = if self.eat_punct("=") {
                        Some(self.with_in(true, |p| p.parse_assignment())?)
                    } else {
                        None
                    };
                    properties.push((
                        PropertyKey::Static(name.clone()),
                        PatternElement {
                            target: Pattern::Ident(name),
                            default,
                        },
                    ));
                    None
                } else {
                    let key = self.parse_property_key()?;
                    self.expect_punct(":")?;
                    Some((key, self.parse_binding_element()?))
                };
                if let Some(entry) = element {
                    properties.push(entry);
                }
                if !self.is_punct("}") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Object { properties, rest });
        }

        Ok(Pattern::Ident(self.expect_ident()?))
    }

    fn parse_property_key(&mut self) -> PResult<PropertyKey> {
        let key = match self.advance() {
            Token::Ident(name) => PropertyKey::Static(Rc::from(name.as_str())),
            Token::Keyword(keyword) => PropertyKey::Static(Rc::from(keyword_text(keyword))),
            Token::Str(text) => PropertyKey::Static(Rc::from(text.as_str())),
            Token::Number(n) => PropertyKey::Static(Rc::from(
                super::value::number_to_string(n).as_str(),
            )),
            Token::Punct("[") => {
                let expr = self.with_in(true, |p| p.parse_assignment())?;
                self.expect_punct("]")?;
                PropertyKey::Computed(Box::new(expr))
            }
            _ => {
                self.pos -= 1;
                return self.unexpected();
            }
        };
        Ok(key)
    }

    /// Reinterpret an already-parsed expression as an assignment target.
    fn to_assign_target(&self, expr: Expr, allow_pattern: bool) -> PResult<AssignTarget> {
        match expr {
            Expr::Ident(name) => Ok(AssignTarget::Ident(name)),
            Expr::Member {
                object,
                property,
                optional: false,
            } => Ok(AssignTarget::Member { object, property }),
            Expr::Array(_) | Expr::Object(_) if allow_pattern => {
                Ok(AssignTarget::Pattern(self.to_pattern(expr)?))
            }
            _ => self.error("Invalid left-hand side in assignment"),
        }
    }

    fn to_pattern(&self, expr: Expr) -> PResult<Pattern> {
        match expr {
            Expr::Ident(name) => Ok(Pattern::Ident(name)),
            Expr::Array(items) => {
                let mut elements = Vec::new();
                let mut rest = None;
                let count = items.len();
                for (index, item) in items.into_iter().enumerate() {
                    match item {
                        ArrayElement::Hole => elements.push(None),
                        ArrayElement::Item(expr) => {
                            elements.push(Some(self.to_pattern_element(expr)?))
                        }
                        ArrayElement::Spread(expr) if index + 1 == count => {
                            rest = Some(Box::new(self.to_pattern(expr)?));
                        }
                        ArrayElement::Spread(_) => {
                            return self.error("Rest element must be last element")
                        }
                    }
                }
                Ok(Pattern::Array { elements, rest })
            }
            Expr::Object(members) => {
                let mut properties = Vec::new();
                let mut rest = None;
                for member in members {
                    match member {
                        ObjectMember::Property(key, value) => {
                            properties.push((key, self.to_pattern_element(value)?));
                        }
                        ObjectMember::Spread(Expr::Ident(name)) => rest = Some(name),
                        ObjectMember::Spread(_) => {
                            return self.error("Invalid rest element in object pattern")
                        }
                    }
                }
                Ok(Pattern::Object { properties, rest })
            }
            _ => self.error("Invalid destructuring assignment target"),
        }
    }

    fn to_pattern_element(&self, expr: Expr) -> PResult<PatternElement> {
        match expr {
            Expr::Assign {
                op: None,
                target,
                value,
            } => {
                let target = match target {
                    AssignTarget::Ident(name) => Pattern::Ident(name),
                    AssignTarget::Pattern(pattern) => pattern,
                    AssignTarget::Member { .. } => {
                        return self.error("Member targets are not supported in patterns")
                    }
                };
                Ok(PatternElement {
                    target,
                    default: Some(*value),
                })
            }
            other => Ok(PatternElement {
                target: self.to_pattern(other)?,
                default: None,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expression(&mut self) -> PResult<Expr> {
        let first = self.parse_assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        self.enter()?;
        let expr = self.parse_assignment_inner();
        self.leave();
        expr
    }

    fn parse_assignment_inner(&mut self) -> PResult<Expr> {
        if self.at_arrow_function() {
            return self.parse_arrow_function();
        }
        if self.is_keyword(Keyword::Async) || self.is_keyword(Keyword::Yield) {
            return self.unexpected();
        }

        let lhs = self.parse_conditional()?;

        let op = match self.peek() {
            Token::Punct(p) => compound_assignment(p),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(lhs);
        };
        self.advance();
        let target = self.to_assign_target(lhs, op.is_none())?;
        let value = Box::new(self.parse_assignment()?);
        Ok(Expr::Assign { op, target, value })
    }

    fn at_arrow_function(&self) -> bool {
        match self.peek() {
            Token::Ident(_) => matches!(self.peek_at(1), Token::Punct("=>")),
            Token::Punct("(") => {
                let mut depth = 0usize;
                let mut offset = 0;
                loop {
                    match self.peek_at(offset) {
                        Token::Punct("(") | Token::Punct("[") | Token::Punct("{") => depth += 1,
                        Token::Punct(")") | Token::Punct("]") | Token::Punct("}") => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(self.peek_at(offset + 1), Token::Punct("=>"));
                            }
                        }
                        Token::Eof => return false,
                        _ => {}
                    }
                    offset += 1;
                }
            }
            _ => false,
        }
    }

    fn parse_arrow_function(&mut self) -> PResult<Expr> {
        let (params, rest) = if let Token::Ident(_) = self.peek() {
            let name = self.expect_ident()?;
            (
                vec![PatternElement {
                    target: Pattern::Ident(name),
                    default: None,
                }],
                None,
            )
        } else {
            self.parse_params()?
        };
        if self.current().newline_before {
            return self.unexpected();
        }
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.with_in(true, |p| p.parse_block())?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            rest,
            body,
            is_arrow: true,
        })))
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let test = self.parse_binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.with_in(true, |p| p.parse_assignment())?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional(
            Box::new(test),
            Box::new(consequent),
            Box::new(alternate),
        ))
    }

    /// Parses operators binding at least as tightly as `min_precedence`.
    fn parse_binary(&mut self, min_precedence: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Some((precedence, op)) = binary_precedence(self.peek(), self.allow_in) {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            // `**` is right-associative.
            let next_min = if precedence == 12 {
                precedence
            } else {
                precedence + 1
            };
            let rhs = self.parse_binary(next_min)?;
            lhs = match op {
                BinaryOrLogical::Binary(op) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
                BinaryOrLogical::Logical(op) => Expr::Logical(op, Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        self.enter()?;
        let expr = self.parse_unary_inner();
        self.leave();
        expr
    }

    fn parse_unary_inner(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            Token::Punct("!") => Some(UnaryOp::Not),
            Token::Punct("-") => Some(UnaryOp::Neg),
            Token::Punct("+") => Some(UnaryOp::Plus),
            Token::Punct("~") => Some(UnaryOp::BitNot),
            Token::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
            Token::Keyword(Keyword::Delete) => {
                return self.error("'delete' is not supported by the sandboxed interpreter")
            }
            Token::Ident(word) if word == "void" => {
                return self.error("'void' is not supported by the sandboxed interpreter")
            }
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }

        if self.is_punct("++") || self.is_punct("--") {
            let increment = self.is_punct("++");
            self.advance();
            let operand = self.parse_unary()?;
            let target = self.to_assign_target(operand, false)?;
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target,
            });
        }

        let expr = self.parse_call_member()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.current().newline_before {
            let increment = self.is_punct("++");
            self.advance();
            let target = self.to_assign_target(expr, false)?;
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target,
            });
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        let mut in_optional_chain = false;
        loop {
            if self.eat_punct(".") {
                let name = match self.advance() {
                    Token::Ident(name) => name,
                    Token::Keyword(keyword) => keyword_text(keyword).to_string(),
                    _ => {
                        self.pos -= 1;
                        return self.unexpected();
                    }
                };
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: PropertyKey::Static(Rc::from(name.as_str())),
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                in_optional_chain = true;
                if self.is_punct("(") {
                    let args = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                    };
                } else if self.eat_punct("[") {
                    let property = self.with_in(true, |p| p.parse_expression())?;
                    self.expect_punct("]")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: PropertyKey::Computed(Box::new(property)),
                        optional: true,
                    };
                } else {
                    let name = match self.advance() {
                        Token::Ident(name) => name,
                        Token::Keyword(keyword) => keyword_text(keyword).to_string(),
                        _ => {
                            self.pos -= 1;
                            return self.unexpected();
                        }
                    };
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: PropertyKey::Static(Rc::from(name.as_str())),
                        optional: true,
                    };
                }
            } else if self.is_punct("[") {
                self.advance();
                let property = self.with_in(true, |p| p.parse_expression())?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: PropertyKey::Computed(Box::new(property)),
                    optional: false,
                };
            } else if self.is_punct("(") {
                let args = self.parse_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                };
            } else if matches!(self.peek(), Token::Backtick) {
                return self.error("Template literals are not supported");
            } else {
                break;
            }
        }
        if in_optional_chain {
            expr = Expr::OptionalChain(Box::new(expr));
        }
        Ok(expr)
    }

    /// `new Callee(args)`; the callee is a member expression without calls.
    fn parse_new(&mut self) -> PResult<Expr> {
        self.enter()?;
        let mut callee = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let name = self.expect_ident()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: PropertyKey::Static(name),
                    optional: false,
                };
            } else if self.eat_punct("[") {
                let property = self.with_in(true, |p| p.parse_expression())?;
                self.expect_punct("]")?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: PropertyKey::Computed(Box::new(property)),
                    optional: false,
                };
            } else {
                break;
            }
        }
        let args = if self.is_punct("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        self.leave();
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_arguments(&mut self) -> PResult<Vec<Argument>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        self.with_in(true, |p| {
            while !p.eat_punct(")") {
                if p.eat_punct("...") {
                    args.push(Argument::Spread(p.parse_assignment()?));
                } else {
                    args.push(Argument::Item(p.parse_assignment()?));
                }
                if !p.is_punct(")") {
                    p.expect_punct(",")?;
                }
            }
            Ok(())
        })?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(text) => Ok(Expr::Str(Rc::from(text.as_str()))),
            Token::Ident(name) => Ok(Expr::Ident(Rc::from(name.as_str()))),
            Token::Keyword(Keyword::True) => Ok(Expr::Bool(true)),
            Token::Keyword(Keyword::False) => Ok(Expr::Bool(false)),
            Token::Keyword(Keyword::Null) => Ok(Expr::Null),
            Token::Keyword(Keyword::This) => Ok(Expr::This),
            Token::Keyword(Keyword::Function) => {
                if self.is_punct("*") {
                    return self.error("Generators are not supported");
                }
                let name = match self.peek() {
                    Token::Ident(_) => Some(self.expect_ident()?),
                    _ => None,
                };
                Ok(Expr::Function(Rc::new(self.parse_function_rest(name)?)))
            }
            Token::Keyword(Keyword::New) => self.parse_new(),
            Token::Keyword(Keyword::Class) => {
                self.pos -= 1;
                self.error("'class' is not supported by the sandboxed interpreter")
            }
            Token::Punct("(") => {
                let expr = self.with_in(true, |p| p.parse_expression())?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => self.with_in(true, |p| p.parse_array_literal()),
            Token::Punct("{") => self.with_in(true, |p| p.parse_object_literal()),
            Token::Backtick => {
                self.pos -= 1;
                self.error("Template literals are not supported")
            }
            Token::Punct("/") | Token::Punct("/=") => {
                self.pos -= 1;
                self.error("Regular expression literals are not supported")
            }
            _ => {
                self.pos -= 1;
                self.unexpected()
            }
        }
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        let mut elements = Vec::new();
        while !self.eat_punct("]") {
            if self.eat_punct(",") {
                elements.push(ArrayElement::Hole);
                continue;
            }
            if self.eat_punct("...") {
                elements.push(ArrayElement::Spread(self.parse_assignment()?));
            } else {
                elements.push(ArrayElement::Item(self.parse_assignment()?));
            }
            if !self.is_punct("]") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Array(elements))
    }

    fn parse_object_literal(&mut self) -> PResult<Expr> {
        let mut members = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                members.push(ObjectMember::Spread(self.parse_assignment()?));
            } else if matches!(self.peek(), Token::Ident(_))
                && matches!(
                    self.peek_at(1),
                    Token::Punct(",") | Token::Punct("}") | Token::Punct("=")
                )
            {
                // Shorthand `{ a }`, or `{ a = 1 }` when reinterpreted as a pattern.
                let name = self.expect_ident()?;
                let value = if self.eat_punct("=") {
                    Expr::Assign {
                        op: None,
                        target: AssignTarget::Ident(name.clone()),
                        value: Box::new(self.parse_assignment()?),
                    }
                } else {
                    Expr::Ident(name.clone())
                };
                members.push(ObjectMember::Property(PropertyKey::Static(name), value));
            } else {
                let key = self.parse_property_key()?;
                let value = if self.is_punct("(") {
                    let name = match &key {
                        PropertyKey::Static(name) => Some(name.clone()),
                        PropertyKey::Computed(_) => None,
                    };
                    Expr::Function(Rc::new(self.parse_function_rest(name)?))
                } else {
                    self.expect_punct(":")?;
                    self.parse_assignment()?
                };
                members.push(ObjectMember::Property(key, value));
            }
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse(source).unwrap_or_else(|e| panic!("failed to parse {:?}: {}", source, e))
    }

    #[test]
    fn test_function_declaration() {
        let program = parse_ok("function add(a,b){return a+b}");
        assert_eq!(program.body.len(), 1);
        let Stmt::Function(def) = &program.body[0] else {
            panic!("expected a function declaration");
        };
        assert_eq!(def.name.as_deref(), Some("add"));
        assert_eq!(def.params.len(), 2);
    }

    #[test]
    fn test_missing_brace_is_syntax_error() {
        let err = parse("function add(a,b){return a+b").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { .. }));
    }

    #[test]
    fn test_precedence() {
        let program = parse_ok("1 + 2 * 3");
        let Stmt::Expr(Expr::Binary(BinaryOp::Add, _, rhs)) = &program.body[0] else {
            panic!("expected addition at the root");
        };
        assert!(matches!(**rhs, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_exponent_is_right_associative() {
        let program = parse_ok("2 ** 3 ** 2");
        let Stmt::Expr(Expr::Binary(BinaryOp::Exp, lhs, rhs)) = &program.body[0] else {
            panic!("expected exponentiation at the root");
        };
        assert!(matches!(**lhs, Expr::Number(_)));
        assert!(matches!(**rhs, Expr::Binary(BinaryOp::Exp, _, _)));
    }

    #[test]
    fn test_arrow_functions() {
        parse_ok("const f = x => x * 2;");
        parse_ok("const g = (a, b = 1, ...rest) => { return a + b + rest.length };");
        parse_ok("const h = ({ x, y }) => x + y;");
    }

    #[test]
    fn test_loops_and_destructuring() {
        parse_ok(
            "function f(arr) {\n\
               let total = 0;\n\
               for (let i = 0; i < arr.length; i++) total += arr[i];\n\
               for (const [k, v] of Object.entries({a: 1})) total += v;\n\
               for (const key in { a: 1 }) total += key.length;\n\
               let [a, b] = [1, 2]; [a, b] = [b, a];\n\
               return total;\n\
             }",
        );
    }

    #[test]
    fn test_switch_and_try() {
        parse_ok(
            "function f(x) { switch (x) { case 1: return 'one'; default: break; }\n\
             try { throw new_error } catch (e) { return e } finally { x = 0 } }",
        );
    }

    #[test]
    fn test_return_asi() {
        let program = parse_ok("function f() { return\n 1 }");
        let Stmt::Function(def) = &program.body[0] else {
            panic!("expected a function declaration");
        };
        let FunctionBody::Block(body) = &def.body else {
            panic!("expected a block body");
        };
        assert!(matches!(body[0], Stmt::Return(None)));
    }

    #[test]
    fn test_unsupported_constructs() {
        assert!(parse("class A {}").is_err());
        assert!(parse("function* g() {}").is_err());
        assert!(parse("const s = `x`").is_err());
    }

    #[test]
    fn test_new_expression() {
        let program = parse_ok("const a = new Array(3).fill(0);");
        let Stmt::Decl(_, declarators) = &program.body[0] else {
            panic!("expected a declaration");
        };
        let Some(Expr::Call { callee, .. }) = &declarators[0].init else {
            panic!("expected a call");
        };
        let Expr::Member { object, .. } = &**callee else {
            panic!("expected a member callee");
        };
        assert!(matches!(**object, Expr::New { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse("1 = 2").is_err());
        assert!(parse("a + b = c").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));
        assert!(parse(&source).is_err());
    }
}
