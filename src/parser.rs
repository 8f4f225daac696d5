use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use thiserror::Error;

use crate::ast::{BinaryOp, ExprId, ExprKind, Expression, Field, Literal, Method, Source, Statement};
use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Expected {expected}, got {found} at index {index}")]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub index: usize,
}

impl ParseError {
    /// Zero-based byte offset of the offending token, or one past the final
    /// token when the stream ended early.
    pub fn index(&self) -> usize {
        self.index
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Recursive-descent parser over the lexed token stream.
///
/// Grammar rules map one-to-one onto `parse_*` methods. Lookahead is a single
/// token, inspected either by kind or by exact literal (keywords such as
/// `LET` are identifiers matched by literal).
pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    next_expr_id: u32,
    in_for_header: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self {
            tokens,
            pos: 0,
            next_expr_id: 0,
            in_for_header: false,
        }
    }

    pub fn parse_source(mut self) -> ParseResult<Source> {
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while self.current().is_some() {
            if self.peek_literal("LET") {
                fields.push(self.parse_field()?);
            } else if self.peek_literal("DEF") {
                methods.push(self.parse_method()?);
            } else {
                return Err(self.error("field or method declaration"));
            }
        }
        Ok(Source { fields, methods })
    }

    fn parse_field(&mut self) -> ParseResult<Field> {
        self.expect_literal("LET")?;
        let constant = self.match_literal("CONST");
        let name = self.expect_identifier()?;
        let type_name = if self.match_literal(":") {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let value = if self.match_literal("=") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_literal(";")?;
        Ok(Field {
            name,
            type_name,
            constant,
            value,
        })
    }

    fn parse_method(&mut self) -> ParseResult<Method> {
        self.expect_literal("DEF")?;
        let name = self.expect_identifier()?;
        self.expect_literal("(")?;

        let mut parameters = Vec::new();
        let mut parameter_type_names = Vec::new();
        if !self.peek_literal(")") {
            loop {
                parameters.push(self.expect_identifier()?);
                self.expect_literal(":")?;
                parameter_type_names.push(self.expect_identifier()?);
                if !self.match_literal(",") {
                    break;
                }
            }
        }
        self.expect_literal(")")?;

        let return_type_name = if self.match_literal(":") {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        self.expect_literal("DO")?;
        let statements = self.parse_block(&["END"])?;
        self.expect_literal("END")?;

        Ok(Method {
            name,
            parameters,
            parameter_type_names,
            return_type_name,
            statements,
        })
    }

    /// Parses statements until one of `terminators` (which is not consumed).
    fn parse_block(&mut self, terminators: &[&str]) -> ParseResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            if self.current().is_none() {
                return Err(self.error("'END'"));
            }
            if terminators
                .iter()
                .any(|terminator| self.peek_literal(terminator))
            {
                return Ok(statements);
            }
            statements.push(self.parse_statement()?);
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        if self.peek_literal("LET") {
            self.parse_declaration()
        } else if self.peek_literal("IF") {
            self.parse_if()
        } else if self.peek_literal("FOR") {
            self.parse_for()
        } else if self.peek_literal("WHILE") {
            self.parse_while()
        } else if self.peek_literal("RETURN") {
            self.parse_return()
        } else {
            self.parse_expression_or_assignment()
        }
    }

    fn parse_declaration(&mut self) -> ParseResult<Statement> {
        self.expect_literal("LET")?;
        let name = self.expect_identifier()?;
        let type_name = if self.match_literal(":") {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let value = if self.match_literal("=") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_literal(";")?;
        Ok(Statement::Declaration {
            name,
            type_name,
            value,
        })
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.expect_literal("IF")?;
        let condition = self.parse_expression()?;
        self.expect_literal("DO")?;
        let then_statements = self.parse_block(&["ELSE", "END"])?;
        let else_statements = if self.match_literal("ELSE") {
            self.parse_block(&["END"])?
        } else {
            Vec::new()
        };
        self.expect_literal("END")?;
        Ok(Statement::If {
            condition,
            then_statements,
            else_statements,
        })
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        self.expect_literal("FOR")?;
        self.expect_literal("(")?;

        let initializer = if self.peek_literal(";") {
            None
        } else {
            Some(Box::new(self.parse_header_statement()?))
        };
        self.expect_literal(";")?;

        let condition = if self.peek_literal(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_literal(";")?;

        let increment = if self.peek_literal(")") {
            None
        } else {
            Some(Box::new(self.parse_header_statement()?))
        };
        self.expect_literal(")")?;

        self.expect_literal("DO")?;
        let statements = self.parse_block(&["END"])?;
        self.expect_literal("END")?;

        Ok(Statement::For {
            initializer,
            condition,
            increment,
            statements,
        })
    }

    /// The `;` separators inside a `FOR (...)` header terminate its
    /// sub-statements, so those parse with semicolon enforcement suppressed.
    fn parse_header_statement(&mut self) -> ParseResult<Statement> {
        self.in_for_header = true;
        let statement = self.parse_expression_or_assignment();
        self.in_for_header = false;
        statement
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        self.expect_literal("WHILE")?;
        let condition = self.parse_expression()?;
        self.expect_literal("DO")?;
        let statements = self.parse_block(&["END"])?;
        self.expect_literal("END")?;
        Ok(Statement::While {
            condition,
            statements,
        })
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        self.expect_literal("RETURN")?;
        let value = self.parse_expression()?;
        self.expect_literal(";")?;
        Ok(Statement::Return { value })
    }

    fn parse_expression_or_assignment(&mut self) -> ParseResult<Statement> {
        let expression = self.parse_expression()?;
        let statement = if self.match_literal("=") {
            let value = self.parse_expression()?;
            Statement::Assignment {
                receiver: expression,
                value,
            }
        } else {
            Statement::Expression(expression)
        };
        if !self.in_for_header {
            self.expect_literal(";")?;
        }
        Ok(statement)
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> ParseResult<Expression> {
        let mut result = self.parse_comparison()?;
        while let Some(op) = self.peek_operator(&[("&&", BinaryOp::And), ("||", BinaryOp::Or)]) {
            self.advance();
            let right = self.parse_comparison()?;
            result = self.binary(op, result, right);
        }
        Ok(result)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut result = self.parse_additive()?;
        while let Some(op) = self.peek_operator(&[
            ("<", BinaryOp::Less),
            ("<=", BinaryOp::LessEqual),
            (">", BinaryOp::Greater),
            (">=", BinaryOp::GreaterEqual),
            ("==", BinaryOp::Equal),
            ("!=", BinaryOp::NotEqual),
        ]) {
            self.advance();
            let right = self.parse_additive()?;
            result = self.binary(op, result, right);
        }
        Ok(result)
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut result = self.parse_multiplicative()?;
        while let Some(op) =
            self.peek_operator(&[("+", BinaryOp::Add), ("-", BinaryOp::Subtract)])
        {
            self.advance();
            let right = self.parse_multiplicative()?;
            result = self.binary(op, result, right);
        }
        Ok(result)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut result = self.parse_secondary()?;
        while let Some(op) =
            self.peek_operator(&[("*", BinaryOp::Multiply), ("/", BinaryOp::Divide)])
        {
            self.advance();
            let right = self.parse_secondary()?;
            result = self.binary(op, result, right);
        }
        Ok(result)
    }

    fn parse_secondary(&mut self) -> ParseResult<Expression> {
        let mut result = self.parse_primary()?;
        while self.match_literal(".") {
            let name = self.expect_identifier()?;
            result = if self.match_literal("(") {
                let arguments = self.parse_arguments()?;
                self.expression(ExprKind::Function {
                    receiver: Some(Box::new(result)),
                    name,
                    arguments,
                })
            } else {
                self.expression(ExprKind::Access {
                    receiver: Some(Box::new(result)),
                    name,
                })
            };
        }
        Ok(result)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        if self.match_literal("NIL") {
            return Ok(self.expression(ExprKind::Literal(Literal::Nil)));
        }
        if self.match_literal("TRUE") {
            return Ok(self.expression(ExprKind::Literal(Literal::Boolean(true))));
        }
        if self.match_literal("FALSE") {
            return Ok(self.expression(ExprKind::Literal(Literal::Boolean(false))));
        }
        if self.peek_kind(TokenKind::Integer) {
            let literal = self.take_literal();
            let value = literal
                .parse::<BigInt>()
                .map_err(|_| self.error("integer literal"))?;
            return Ok(self.expression(ExprKind::Literal(Literal::Integer(value))));
        }
        if self.peek_kind(TokenKind::Decimal) {
            let literal = self.take_literal();
            let value = literal
                .parse::<BigDecimal>()
                .map_err(|_| self.error("decimal literal"))?;
            return Ok(self.expression(ExprKind::Literal(Literal::Decimal(value))));
        }
        if self.peek_kind(TokenKind::Character) {
            let literal = self.take_literal();
            let decoded = decode_escapes(unquote(&literal));
            let value = decoded
                .chars()
                .next()
                .ok_or_else(|| self.error("character literal"))?;
            return Ok(self.expression(ExprKind::Literal(Literal::Character(value))));
        }
        if self.peek_kind(TokenKind::String) {
            let literal = self.take_literal();
            let value = decode_escapes(unquote(&literal));
            return Ok(self.expression(ExprKind::Literal(Literal::String(value))));
        }
        if self.match_literal("(") {
            let inner = self.parse_expression()?;
            self.expect_literal(")")?;
            return Ok(self.expression(ExprKind::Group(Box::new(inner))));
        }
        if self.peek_kind(TokenKind::Identifier) {
            let name = self.take_literal();
            if self.match_literal("(") {
                let arguments = self.parse_arguments()?;
                return Ok(self.expression(ExprKind::Function {
                    receiver: None,
                    name,
                    arguments,
                }));
            }
            return Ok(self.expression(ExprKind::Access {
                receiver: None,
                name,
            }));
        }
        Err(self.error("expression"))
    }

    /// Parses `[expr ("," expr)*] ")"` after the opening parenthesis.
    fn parse_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        let mut arguments = Vec::new();
        if !self.peek_literal(")") {
            arguments.push(self.parse_expression()?);
            while self.match_literal(",") {
                arguments.push(self.parse_expression()?);
            }
        }
        self.expect_literal(")")?;
        Ok(arguments)
    }

    fn expression(&mut self, kind: ExprKind) -> Expression {
        let id = ExprId(self.next_expr_id);
        self.next_expr_id += 1;
        Expression { id, kind }
    }

    fn binary(&mut self, op: BinaryOp, left: Expression, right: Expression) -> Expression {
        self.expression(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn current(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn peek_literal(&self, literal: &str) -> bool {
        self.current()
            .is_some_and(|token| token.literal == literal)
    }

    fn peek_kind(&self, kind: TokenKind) -> bool {
        self.current().is_some_and(|token| token.kind == kind)
    }

    fn peek_operator(&self, operators: &[(&str, BinaryOp)]) -> Option<BinaryOp> {
        let token = self.current()?;
        if token.kind != TokenKind::Operator {
            return None;
        }
        operators
            .iter()
            .find(|(literal, _)| *literal == token.literal)
            .map(|(_, op)| *op)
    }

    fn match_literal(&mut self, literal: &str) -> bool {
        if self.peek_literal(literal) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_literal(&mut self, literal: &str) -> ParseResult<()> {
        if self.match_literal(literal) {
            Ok(())
        } else {
            Err(self.error(&format!("'{literal}'")))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        if self.peek_kind(TokenKind::Identifier) {
            Ok(self.take_literal())
        } else {
            Err(self.error("identifier"))
        }
    }

    /// Consumes the current token and returns its literal as an owned string.
    /// Only call after peeking; at end of input this returns an empty string.
    fn take_literal(&mut self) -> String {
        let literal = self
            .current()
            .map(|token| token.literal.to_string())
            .unwrap_or_default();
        self.advance();
        literal
    }

    fn advance(&mut self) {
        self.pos = self.pos.saturating_add(1);
    }

    fn error(&self, expected: &str) -> ParseError {
        match self.current() {
            Some(token) => ParseError {
                expected: expected.to_string(),
                found: format!("'{}'", token.literal),
                index: token.start,
            },
            None => ParseError {
                expected: expected.to_string(),
                found: "end of input".to_string(),
                index: self.tokens.last().map(Token::end).unwrap_or(0),
            },
        }
    }
}

fn unquote(literal: &str) -> &str {
    &literal[1..literal.len() - 1]
}

fn decode_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('b') => out.push('\u{8}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> ParseResult<Source> {
    Parser::new(tokens).parse_source()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use indoc::indoc;

    fn parse(input: &str) -> Source {
        let tokens = tokenize(input).expect("tokenize should succeed");
        parse_tokens(tokens).expect("parse should succeed")
    }

    fn parse_err(input: &str) -> ParseError {
        let tokens = tokenize(input).expect("tokenize should succeed");
        parse_tokens(tokens).expect_err("expected parse failure")
    }

    /// Parses a single expression by wrapping it in a return statement.
    fn parse_expression(input: &str) -> Expression {
        let source = parse(&format!("DEF main(): Integer DO RETURN {input}; END"));
        match &source.methods[0].statements[0] {
            Statement::Return { value } => value.clone(),
            other => panic!("expected return statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_field_with_initializer() {
        let source = parse("LET x : Integer = 5;");
        assert_eq!(source.fields.len(), 1);
        let field = &source.fields[0];
        assert_eq!(field.name, "x");
        assert_eq!(field.type_name.as_deref(), Some("Integer"));
        assert!(!field.constant);
        assert!(matches!(
            field.value.as_ref().map(|value| &value.kind),
            Some(ExprKind::Literal(Literal::Integer(n))) if *n == BigInt::from(5)
        ));
    }

    #[test]
    fn parses_constant_field() {
        let source = parse("LET CONST limit : Integer = 10;");
        assert!(source.fields[0].constant);
        assert_eq!(source.fields[0].name, "limit");
    }

    #[test]
    fn const_is_an_ordinary_name_outside_fields() {
        let source = parse(indoc! {"
            DEF main(): Integer DO
                LET CONST = 1;
                RETURN CONST;
            END
        "});
        assert!(matches!(
            &source.methods[0].statements[0],
            Statement::Declaration { name, type_name: None, value: Some(_) } if name == "CONST"
        ));
    }

    #[test]
    fn parses_method_signature() {
        let source = parse(indoc! {"
            DEF square(x: Integer): Integer DO
                RETURN x * x;
            END
        "});
        let method = &source.methods[0];
        assert_eq!(method.name, "square");
        assert_eq!(method.parameters, vec!["x"]);
        assert_eq!(method.parameter_type_names, vec!["Integer"]);
        assert_eq!(method.return_type_name.as_deref(), Some("Integer"));
        assert_eq!(method.statements.len(), 1);
    }

    #[test]
    fn method_return_type_defaults_to_none() {
        let source = parse("DEF shout() DO print(\"hi\"); END");
        assert_eq!(source.methods[0].return_type_name, None);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expression = parse_expression("1 + 2 * 3");
        let ExprKind::Binary { op, left, right } = &expression.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            &left.kind,
            ExprKind::Literal(Literal::Integer(n)) if *n == BigInt::from(1)
        ));
        assert!(matches!(
            &right.kind,
            ExprKind::Binary { op: BinaryOp::Multiply, .. }
        ));
    }

    #[test]
    fn binary_operators_are_left_associative() {
        let expression = parse_expression("1 - 2 - 3");
        let ExprKind::Binary { op, left, right } = &expression.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Subtract);
        assert!(matches!(
            &left.kind,
            ExprKind::Binary { op: BinaryOp::Subtract, .. }
        ));
        assert!(matches!(
            &right.kind,
            ExprKind::Literal(Literal::Integer(n)) if *n == BigInt::from(3)
        ));
    }

    #[test]
    fn groups_override_precedence() {
        let expression = parse_expression("(1 + 2) * 3");
        let ExprKind::Binary { op, left, .. } = &expression.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Multiply);
        assert!(matches!(&left.kind, ExprKind::Group(_)));
    }

    #[test]
    fn comparisons_bind_looser_than_arithmetic() {
        let expression = parse_expression("1 + 2 < 3 * 4 && TRUE");
        let ExprKind::Binary { op, left, .. } = &expression.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::And);
        assert!(matches!(
            &left.kind,
            ExprKind::Binary { op: BinaryOp::Less, .. }
        ));
    }

    #[test]
    fn parses_member_access_and_method_calls() {
        let expression = parse_expression("obj.field");
        assert!(matches!(
            &expression.kind,
            ExprKind::Access { receiver: Some(_), name } if name == "field"
        ));

        let expression = parse_expression("obj.compute(1, 2)");
        let ExprKind::Function {
            receiver,
            name,
            arguments,
        } = &expression.kind
        else {
            panic!("expected function expression");
        };
        assert!(receiver.is_some());
        assert_eq!(name, "compute");
        assert_eq!(arguments.len(), 2);
    }

    #[test]
    fn decodes_string_and_character_escapes() {
        let expression = parse_expression("\"str\\ning\"");
        assert!(matches!(
            &expression.kind,
            ExprKind::Literal(Literal::String(s)) if s == "str\ning"
        ));

        let expression = parse_expression("'\\t'");
        assert!(matches!(
            &expression.kind,
            ExprKind::Literal(Literal::Character('\t'))
        ));
    }

    #[test]
    fn expression_ids_are_unique() {
        let source = parse("DEF main(): Integer DO RETURN 1 + 2 * (3 - 4); END");
        let Statement::Return { value } = &source.methods[0].statements[0] else {
            panic!("expected return statement");
        };
        let mut ids = Vec::new();
        collect_ids(value, &mut ids);
        let count = ids.len();
        ids.sort_unstable_by_key(|id| id.0);
        ids.dedup();
        assert_eq!(ids.len(), count);
    }

    fn collect_ids(expression: &Expression, ids: &mut Vec<ExprId>) {
        ids.push(expression.id);
        match &expression.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Group(inner) => collect_ids(inner, ids),
            ExprKind::Binary { left, right, .. } => {
                collect_ids(left, ids);
                collect_ids(right, ids);
            }
            ExprKind::Access { receiver, .. } => {
                if let Some(receiver) = receiver {
                    collect_ids(receiver, ids);
                }
            }
            ExprKind::Function {
                receiver,
                arguments,
                ..
            } => {
                if let Some(receiver) = receiver {
                    collect_ids(receiver, ids);
                }
                for argument in arguments {
                    collect_ids(argument, ids);
                }
            }
        }
    }

    #[test]
    fn for_header_statements_need_no_own_semicolons() {
        let source = parse(indoc! {"
            DEF main(): Integer DO
                LET i = 0;
                FOR (; i < 3; i = i + 1) DO
                    print(i);
                END
                RETURN i;
            END
        "});
        let Statement::For {
            initializer,
            condition,
            increment,
            statements,
        } = &source.methods[0].statements[1]
        else {
            panic!("expected for statement");
        };
        assert!(initializer.is_none());
        assert!(condition.is_some());
        assert!(matches!(
            increment.as_deref(),
            Some(Statement::Assignment { .. })
        ));
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn parses_full_for_header() {
        let source = parse(indoc! {"
            LET i : Integer = 0;
            DEF main(): Integer DO
                FOR (i = 9; i > 0; i = i - 1) DO
                    print(i);
                END
                RETURN 0;
            END
        "});
        let Statement::For { initializer, .. } = &source.methods[0].statements[0] else {
            panic!("expected for statement");
        };
        assert!(matches!(
            initializer.as_deref(),
            Some(Statement::Assignment { .. })
        ));
    }

    #[test]
    fn missing_semicolon_fails_at_end_of_input() {
        let input = "LET x : Integer = 5";
        let err = parse_err(input);
        assert_eq!(err.expected, "';'");
        assert_eq!(err.index, input.len());
    }

    #[test]
    fn missing_end_fails_at_end_of_input() {
        let input = "DEF main(): Integer DO RETURN 0;";
        let err = parse_err(input);
        assert_eq!(err.index, input.len());
    }

    #[test]
    fn trailing_comma_in_arguments_fails() {
        let err = parse_err("DEF main(): Integer DO f(1,); RETURN 0; END");
        assert_eq!(err.expected, "expression");
    }

    #[test]
    fn empty_parenthesized_expression_fails() {
        let err = parse_err("DEF main(): Integer DO LET x = (); RETURN 0; END");
        assert_eq!(err.expected, "expression");
    }

    #[test]
    fn field_annotation_is_optional() {
        let source = parse("LET x = 5;");
        let field = &source.fields[0];
        assert_eq!(field.name, "x");
        assert_eq!(field.type_name, None);
        assert!(field.value.is_some());
    }

    #[test]
    fn stray_token_at_top_level_fails() {
        let err = parse_err("42");
        assert_eq!(err.expected, "field or method declaration");
        assert_eq!(err.index, 0);
    }
}
