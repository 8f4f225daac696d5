//! Java source backend.
//!
//! Walks the analyzed AST and prints an equivalent `Main` class: fields
//! first, then the conventional entry point that exits with `main`'s result,
//! then one Java method per PLC method. Access and call sites use the target
//! names the analyzer resolved, which is how `print` becomes
//! `System.out.println`.

use anyhow::{bail, Context, Result};

use crate::analyzer::Analysis;
use crate::ast::{Expression, ExprKind, Field, Literal, Method, Source, Statement};
use crate::types::Type;

pub struct Emitter<'a> {
    analysis: &'a Analysis,
    generating_increment: bool,
}

pub fn emit(source: &Source, analysis: &Analysis) -> Result<String> {
    Emitter::new(analysis).emit_source(source)
}

fn map_type_name(name: &str) -> &str {
    Type::from_name(name)
        .map(Type::target_name)
        .unwrap_or(name)
}

impl<'a> Emitter<'a> {
    pub fn new(analysis: &'a Analysis) -> Self {
        Self {
            analysis,
            generating_increment: false,
        }
    }

    pub fn emit_source(mut self, source: &Source) -> Result<String> {
        let mut output = String::new();
        output.push_str("public class Main {\n");

        if !source.fields.is_empty() {
            output.push('\n');
            for field in &source.fields {
                self.emit_field(field, &mut output)?;
            }
        }

        output.push('\n');
        self.push_line(&mut output, 1, "public static void main(String[] args) {");
        self.push_line(&mut output, 2, "System.exit(new Main().main());");
        self.push_line(&mut output, 1, "}");

        for method in &source.methods {
            output.push('\n');
            self.emit_method(method, &mut output)?;
        }

        output.push_str("}\n");
        Ok(output)
    }

    fn emit_field(&mut self, field: &Field, output: &mut String) -> Result<()> {
        let type_name = self.declared_type(&field.name, &field.type_name, &field.value)?;
        let mut line = String::new();
        if field.constant {
            line.push_str("final ");
        }
        line.push_str(&format!("{type_name} {}", field.name));
        if let Some(value) = &field.value {
            line.push_str(" = ");
            line.push_str(&self.emit_expression(value)?);
        }
        line.push(';');
        self.push_line(output, 1, &line);
        Ok(())
    }

    fn emit_method(&mut self, method: &Method, output: &mut String) -> Result<()> {
        let return_type = method
            .return_type_name
            .as_deref()
            .map(map_type_name)
            .unwrap_or("Void");

        let parameters = method
            .parameters
            .iter()
            .zip(&method.parameter_type_names)
            .map(|(name, type_name)| format!("{} {name}", map_type_name(type_name)))
            .collect::<Vec<_>>()
            .join(", ");

        let signature = format!("{return_type} {}({parameters}) {{", method.name);
        if method.statements.is_empty() {
            self.push_line(output, 1, &format!("{signature}}}"));
            return Ok(());
        }

        self.push_line(output, 1, &signature);
        for statement in &method.statements {
            self.emit_statement(statement, 2, output)?;
        }
        self.push_line(output, 1, "}");
        Ok(())
    }

    fn emit_statement(
        &mut self,
        statement: &Statement,
        indent: usize,
        output: &mut String,
    ) -> Result<()> {
        match statement {
            Statement::Expression(expression) => {
                let rendered = self.emit_expression(expression)?;
                self.push_line(output, indent, &format!("{rendered};"));
            }
            Statement::Declaration {
                name,
                type_name,
                value,
            } => {
                let type_name = self.declared_type(name, type_name, value)?;
                let mut line = format!("{type_name} {name}");
                if let Some(value) = value {
                    line.push_str(" = ");
                    line.push_str(&self.emit_expression(value)?);
                }
                line.push(';');
                self.push_line(output, indent, &line);
            }
            Statement::Assignment { receiver, value } => {
                let receiver = self.emit_expression(receiver)?;
                let value = self.emit_expression(value)?;
                self.push_line(output, indent, &format!("{receiver} = {value};"));
            }
            Statement::If {
                condition,
                then_statements,
                else_statements,
            } => {
                let condition = self.emit_expression(condition)?;
                if then_statements.is_empty() {
                    self.push_line(output, indent, &format!("if ({condition}) {{}}"));
                    return Ok(());
                }
                self.push_line(output, indent, &format!("if ({condition}) {{"));
                for statement in then_statements {
                    self.emit_statement(statement, indent + 1, output)?;
                }
                if !else_statements.is_empty() {
                    self.push_line(output, indent, "} else {");
                    for statement in else_statements {
                        self.emit_statement(statement, indent + 1, output)?;
                    }
                }
                self.push_line(output, indent, "}");
            }
            Statement::For {
                initializer,
                condition,
                increment,
                statements,
            } => {
                let mut header = String::from("for (");
                match initializer {
                    Some(initializer) => header.push_str(&self.emit_inline_statement(initializer)?),
                    None => header.push(';'),
                }
                header.push(' ');
                if let Some(condition) = condition {
                    header.push_str(&self.emit_expression(condition)?);
                }
                header.push(';');
                if let Some(increment) = increment {
                    // The for header supplies the terminating semicolon.
                    self.generating_increment = true;
                    let rendered = self.emit_inline_statement(increment);
                    self.generating_increment = false;
                    header.push(' ');
                    header.push_str(&rendered?);
                }
                header.push_str(") {");
                if statements.is_empty() {
                    header.push('}');
                    self.push_line(output, indent, &header);
                    return Ok(());
                }
                self.push_line(output, indent, &header);
                for statement in statements {
                    self.emit_statement(statement, indent + 1, output)?;
                }
                self.push_line(output, indent, "}");
            }
            Statement::While {
                condition,
                statements,
            } => {
                let condition = self.emit_expression(condition)?;
                if statements.is_empty() {
                    self.push_line(output, indent, &format!("while ({condition}) {{}}"));
                    return Ok(());
                }
                self.push_line(output, indent, &format!("while ({condition}) {{"));
                for statement in statements {
                    self.emit_statement(statement, indent + 1, output)?;
                }
                self.push_line(output, indent, "}");
            }
            Statement::Return { value } => {
                let value = self.emit_expression(value)?;
                self.push_line(output, indent, &format!("return {value};"));
            }
        }
        Ok(())
    }

    /// Renders an assignment or call without indentation for `for` headers.
    fn emit_inline_statement(&self, statement: &Statement) -> Result<String> {
        let mut rendered = match statement {
            Statement::Assignment { receiver, value } => format!(
                "{} = {}",
                self.emit_expression(receiver)?,
                self.emit_expression(value)?
            ),
            Statement::Expression(expression) => self.emit_expression(expression)?,
            _ => bail!("only assignments and calls may appear in a for header"),
        };
        if !self.generating_increment {
            rendered.push(';');
        }
        Ok(rendered)
    }

    fn emit_expression(&self, expression: &Expression) -> Result<String> {
        match &expression.kind {
            ExprKind::Literal(literal) => Ok(emit_literal(literal)),
            ExprKind::Group(inner) => Ok(format!("({})", self.emit_expression(inner)?)),
            ExprKind::Binary { op, left, right } => Ok(format!(
                "{} {} {}",
                self.emit_expression(left)?,
                op.as_str(),
                self.emit_expression(right)?
            )),
            ExprKind::Access { receiver, name } => {
                let target = match self.analysis.variable_of(expression.id) {
                    Some(variable) => variable.target_name.clone(),
                    None => name.clone(),
                };
                match receiver {
                    Some(receiver) => Ok(format!("{}.{target}", self.emit_expression(receiver)?)),
                    None => Ok(target),
                }
            }
            ExprKind::Function {
                receiver,
                name,
                arguments,
            } => {
                let target = match self.analysis.function_of(expression.id) {
                    Some(function) => function.target_name.clone(),
                    None => name.clone(),
                };
                let mut rendered_args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    rendered_args.push(self.emit_expression(argument)?);
                }
                let call = format!("{target}({})", rendered_args.join(", "));
                match receiver {
                    Some(receiver) => Ok(format!("{}.{call}", self.emit_expression(receiver)?)),
                    None => Ok(call),
                }
            }
        }
    }

    /// Resolves the type name to declare: the annotation if present, else the
    /// analyzed type of the initializer.
    fn declared_type(
        &self,
        name: &str,
        type_name: &Option<String>,
        value: &Option<Expression>,
    ) -> Result<String> {
        match type_name {
            Some(type_name) => Ok(map_type_name(type_name).to_string()),
            None => {
                let value = value
                    .as_ref()
                    .with_context(|| format!("declaration of '{name}' has no type or value"))?;
                let ty = self
                    .analysis
                    .type_of(value.id)
                    .with_context(|| format!("initializer of '{name}' was not analyzed"))?;
                Ok(ty.target_name().to_string())
            }
        }
    }

    fn push_line(&self, output: &mut String, indent: usize, line: &str) {
        for _ in 0..indent {
            output.push_str("    ");
        }
        output.push_str(line);
        output.push('\n');
    }
}

fn emit_literal(literal: &Literal) -> String {
    match literal {
        Literal::Nil => "null".to_string(),
        Literal::Boolean(value) => value.to_string(),
        Literal::Character(value) => format!("'{value}'"),
        Literal::Integer(value) => value.to_string(),
        // Plain fixed-point notation, never scientific.
        Literal::Decimal(value) => value.to_string(),
        Literal::String(value) => format!("\"{value}\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::lexer::tokenize;
    use crate::parser::parse_tokens;
    use indoc::indoc;

    fn emit_source(input: &str) -> String {
        let tokens = tokenize(input).expect("tokenize should succeed");
        let source = parse_tokens(tokens).expect("parse should succeed");
        let analysis = analyze(&source).expect("analysis should succeed");
        emit(&source, &analysis).expect("emit should succeed")
    }

    #[test]
    fn emits_the_square_method() {
        let output = emit_source(indoc! {"
            DEF square(x: Integer): Integer DO
                RETURN x * x;
            END
            DEF main(): Integer DO
                RETURN square(5);
            END
        "});
        assert!(output.contains("int square(int x) {"));
        assert!(output.contains("        return x * x;"));
    }

    #[test]
    fn emits_a_complete_class() {
        let output = emit_source(indoc! {"
            LET CONST greeting : String = \"Hello, \";
            LET name = \"PLC\";
            DEF main(): Integer DO
                print(greeting + name);
                RETURN 0;
            END
        "});
        let expected = indoc! {r#"
            public class Main {

                final String greeting = "Hello, ";
                String name = "PLC";

                public static void main(String[] args) {
                    System.exit(new Main().main());
                }

                int main() {
                    System.out.println(greeting + name);
                    return 0;
                }
            }
        "#};
        assert_eq!(output, expected);
    }

    #[test]
    fn declarations_use_the_inferred_type() {
        let output = emit_source(indoc! {"
            DEF main(): Integer DO
                LET i = 0;
                LET d = 1.5;
                LET s : String = \"x\";
                print(s);
                RETURN i;
            END
        "});
        assert!(output.contains("int i = 0;"));
        assert!(output.contains("double d = 1.5;"));
        assert!(output.contains("String s = \"x\";"));
    }

    #[test]
    fn for_headers_suppress_the_increment_semicolon() {
        let output = emit_source(indoc! {"
            DEF main(): Integer DO
                LET i = 0;
                FOR (i = 0; i < 3; i = i + 1) DO
                    print(i);
                END
                RETURN 0;
            END
        "});
        assert!(output.contains("for (i = 0; i < 3; i = i + 1) {"));
    }

    #[test]
    fn empty_for_initializer_emits_a_bare_semicolon() {
        let output = emit_source(indoc! {"
            DEF main(): Integer DO
                LET i = 0;
                FOR (; i < 3; i = i + 1) DO
                    print(i);
                END
                RETURN 0;
            END
        "});
        assert!(output.contains("for (; i < 3; i = i + 1) {"));
    }

    #[test]
    fn if_else_uses_the_expected_braces() {
        let output = emit_source(indoc! {"
            DEF main(): Integer DO
                IF 1 < 2 DO
                    print(1);
                ELSE
                    print(2);
                END
                RETURN 0;
            END
        "});
        assert!(output.contains("        if (1 < 2) {"));
        assert!(output.contains("        } else {"));
    }

    #[test]
    fn while_loops_emit_canonical_syntax() {
        let output = emit_source(indoc! {"
            DEF main(): Integer DO
                LET i = 0;
                WHILE i < 2 DO
                    i = i + 1;
                END
                RETURN i;
            END
        "});
        assert!(output.contains("        while (i < 2) {"));
        assert!(output.contains("            i = i + 1;"));
    }

    #[test]
    fn empty_method_body_is_a_single_line() {
        let output = emit_source(indoc! {"
            DEF noop() DO END
            DEF main(): Integer DO
                RETURN 0;
            END
        "});
        assert!(output.contains("    Void noop() {}"));
    }

    #[test]
    fn literals_emit_target_keywords_and_quotes() {
        let output = emit_source(indoc! {"
            DEF main(): Integer DO
                print(NIL);
                print(TRUE);
                print('x');
                print(\"text\");
                print(2.50);
                RETURN 0;
            END
        "});
        assert!(output.contains("System.out.println(null);"));
        assert!(output.contains("System.out.println(true);"));
        assert!(output.contains("System.out.println('x');"));
        assert!(output.contains("System.out.println(\"text\");"));
        assert!(output.contains("System.out.println(2.50);"));
    }

    #[test]
    fn groups_keep_their_parentheses() {
        let output = emit_source(indoc! {"
            DEF main(): Integer DO
                RETURN (1 + 2) * 3;
            END
        "});
        assert!(output.contains("return (1 + 2) * 3;"));
    }
}
