//! Recursive-descent parser for the filter language.
//!
//! Grammar, lowest to highest precedence:
//!
//! ```text
//! in         := or ( 'in' '(' or ( ',' or )* ')' )?
//! or         := and ( ('or' | '||') and )*
//! and        := equality ( ('and' | '&&') equality )*
//! equality   := relational ( ('=' | '!=') relational )?
//! relational := member ( ('<' | '<=' | '>' | '>=') member )?
//! member     := identifier | identifier '(' args ')' | true | false
//!             | number | string | '(' or ')'
//! ```

use super::ast::{BinaryOperator, Expression, Operand};
use super::lexer::{unquote, Lexer, Token, TokenKind};
use crate::errors::{QuarryError, Result};
use crate::value::Value;

/// Parse a filter string into an expression tree
pub fn parse(source: &str) -> Result<Expression> {
    let tokens = Lexer::tokenize(source);
    if let Some(bad) = tokens.iter().find(|t| t.kind == TokenKind::Error) {
        return Err(QuarryError::Lex {
            offset: bad.offset,
            fragment: bad.text.clone(),
        });
    }
    let expression = Parser::new(tokens).parse()?;
    tracing::trace!(filter = source, "parsed filter expression");
    Ok(expression)
}

const STARTING_TOKENS: &[TokenKind] = &[
    TokenKind::Identifier,
    TokenKind::False,
    TokenKind::LParen,
    TokenKind::Number,
    TokenKind::String,
    TokenKind::True,
];

struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    fn parse(&mut self) -> Result<Expression> {
        match self.peek() {
            None => return Err(QuarryError::parse("empty expression")),
            Some(token) if !STARTING_TOKENS.contains(&token.kind) => {
                return Err(QuarryError::parse(format!(
                    "unrecognized starting token '{}'",
                    token.text
                )))
            }
            Some(_) => {}
        }

        let expression = self.in_expression()?;
        if let Some(token) = self.peek() {
            return Err(QuarryError::parse(format!(
                "unexpected trailing token '{}' at offset {}",
                token.text, token.offset
            )));
        }
        Ok(expression)
    }

    // ===== Token manipulation =====

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.current).cloned();
        if token.is_some() {
            self.current += 1;
        }
        token
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn match_operator(&mut self, table: &[(TokenKind, BinaryOperator)]) -> Option<BinaryOperator> {
        let kind = self.peek()?.kind;
        let (_, operator) = table.iter().find(|(k, _)| *k == kind)?;
        self.current += 1;
        Some(*operator)
    }

    // ===== Grammar =====

    fn in_expression(&mut self) -> Result<Expression> {
        let lhs = self.or_expression()?;
        if !self.match_kind(TokenKind::In) {
            return Ok(lhs);
        }
        if !self.match_kind(TokenKind::LParen) {
            return Err(QuarryError::parse(
                "'in' list did not start with a left parenthesis",
            ));
        }
        let mut list = vec![self.or_expression()?];
        while self.match_kind(TokenKind::Comma) {
            list.push(self.or_expression()?);
        }
        if !self.match_kind(TokenKind::RParen) {
            return Err(QuarryError::parse(
                "'in' list did not end with a right parenthesis",
            ));
        }
        Ok(Expression::Binary {
            lhs: Box::new(lhs),
            operator: BinaryOperator::In,
            rhs: Operand::List(list),
        })
    }

    fn or_expression(&mut self) -> Result<Expression> {
        let mut lhs = self.and_expression()?;
        while self.match_kind(TokenKind::Or) {
            let rhs = self.and_expression()?;
            lhs = Expression::binary(lhs, BinaryOperator::Or, rhs);
        }
        Ok(lhs)
    }

    fn and_expression(&mut self) -> Result<Expression> {
        let mut lhs = self.equality()?;
        while self.match_kind(TokenKind::And) {
            let rhs = self.equality()?;
            lhs = Expression::binary(lhs, BinaryOperator::And, rhs);
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expression> {
        let lhs = self.relational()?;
        let table = [
            (TokenKind::Equal, BinaryOperator::Equal),
            (TokenKind::NotEqual, BinaryOperator::NotEqual),
        ];
        match self.match_operator(&table) {
            Some(operator) => Ok(Expression::binary(lhs, operator, self.relational()?)),
            None => Ok(lhs),
        }
    }

    fn relational(&mut self) -> Result<Expression> {
        let lhs = self.member()?;
        let table = [
            (TokenKind::LessThan, BinaryOperator::LessThan),
            (TokenKind::LessThanEqual, BinaryOperator::LessThanEqual),
            (TokenKind::GreaterThan, BinaryOperator::GreaterThan),
            (TokenKind::GreaterThanEqual, BinaryOperator::GreaterThanEqual),
        ];
        match self.match_operator(&table) {
            Some(operator) => Ok(Expression::binary(lhs, operator, self.member()?)),
            None => Ok(lhs),
        }
    }

    fn member(&mut self) -> Result<Expression> {
        let Some(token) = self.advance() else {
            return Err(QuarryError::parse("unexpected end of expression"));
        };

        match token.kind {
            TokenKind::Identifier if self.check(TokenKind::LParen) => {
                self.current += 1;
                let args = self.arguments()?;
                Ok(Expression::Function {
                    name: token.text,
                    args,
                })
            }
            TokenKind::Identifier => Ok(Expression::Identifier(token.text)),
            TokenKind::True => Ok(Expression::Scalar(Value::Bool(true))),
            TokenKind::False => Ok(Expression::Scalar(Value::Bool(false))),
            TokenKind::Number => token
                .text
                .parse::<i64>()
                .map(|n| Expression::Scalar(Value::Int(n)))
                .map_err(|_| {
                    QuarryError::parse(format!("number literal '{}' out of range", token.text))
                }),
            TokenKind::String => Ok(Expression::Scalar(Value::Text(unquote(&token.text)))),
            TokenKind::LParen => {
                let inner = self.or_expression()?;
                if !self.match_kind(TokenKind::RParen) {
                    return Err(QuarryError::parse("missing closing right parenthesis"));
                }
                Ok(inner)
            }
            _ => Err(QuarryError::parse(format!(
                "unexpected token '{}' at offset {}",
                token.text, token.offset
            ))),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        if self.match_kind(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or_expression()?);
            if self.match_kind(TokenKind::Comma) {
                continue;
            }
            if self.match_kind(TokenKind::RParen) {
                return Ok(args);
            }
            return Err(match self.peek() {
                None => QuarryError::parse("function argument list was not closed"),
                Some(token) => QuarryError::parse(format!(
                    "unexpected token '{}' in function argument list",
                    token.text
                )),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(source: &str) -> String {
        match parse(source) {
            Err(QuarryError::Parse { message }) => message,
            other => panic!("expected parse error for {:?}, got {:?}", source, other),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a = 1 or b = 2 and c = 3").unwrap();
        match expr {
            Expression::Binary {
                operator: BinaryOperator::Or,
                rhs: Operand::Single(rhs),
                ..
            } => assert!(matches!(
                *rhs,
                Expression::Binary {
                    operator: BinaryOperator::And,
                    ..
                }
            )),
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_function_call_arguments() {
        let expr = parse("pow(a, 2) > 10").unwrap();
        let Expression::Binary { lhs, .. } = expr else {
            panic!("expected binary node");
        };
        assert!(matches!(*lhs, Expression::Function { ref name, ref args } if name == "pow" && args.len() == 2));
    }

    #[test]
    fn test_in_list_requires_parentheses() {
        assert_eq!(
            message("a in 'x'"),
            "'in' list did not start with a left parenthesis"
        );
        assert_eq!(
            message("a in ('x', 'y'"),
            "'in' list did not end with a right parenthesis"
        );
    }

    #[test]
    fn test_unclosed_groups() {
        assert_eq!(message("(a = 1"), "missing closing right parenthesis");
        assert_eq!(message("abs(a"), "function argument list was not closed");
    }

    #[test]
    fn test_bad_start_and_trailing_tokens() {
        assert!(message("= 1").starts_with("unrecognized starting token"));
        assert!(message("a = 1 b").starts_with("unexpected trailing token"));
        assert_eq!(message("   "), "empty expression");
    }

    #[test]
    fn test_lexer_failure_surfaces_as_lex_error() {
        let err = parse("user_id = 1").unwrap_err();
        assert!(matches!(err, QuarryError::Lex { offset: 4, .. }));
    }
}
