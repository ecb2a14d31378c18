//! Expression tree and evaluator

use crate::errors::{QuarryError, Result};
use crate::value::{Row, Value};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Or,
    In,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanEqual => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::In => "in",
        }
    }
}

/// Right-hand side of a binary node; only `in` takes a list
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Single(Box<Expression>),
    List(Vec<Expression>),
}

/// A parsed filter expression. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperator,
        rhs: Operand,
    },
    Identifier(String),
    Function {
        name: String,
        args: Vec<Expression>,
    },
    Scalar(Value),
}

/// Resolves function calls made from a filter
pub trait FunctionLookup {
    fn call(&self, name: &str, row: &Row, args: &[Value]) -> Result<Value>;
}

impl<F> FunctionLookup for F
where
    F: Fn(&str, &Row, &[Value]) -> Result<Value>,
{
    fn call(&self, name: &str, row: &Row, args: &[Value]) -> Result<Value> {
        self(name, row, args)
    }
}

/// Lookup that knows no functions at all
pub struct NoFunctions;

impl FunctionLookup for NoFunctions {
    fn call(&self, name: &str, _row: &Row, _args: &[Value]) -> Result<Value> {
        Err(QuarryError::UnknownFunction {
            name: name.to_string(),
        })
    }
}

impl Expression {
    pub fn binary(lhs: Expression, operator: BinaryOperator, rhs: Expression) -> Self {
        Expression::Binary {
            lhs: Box::new(lhs),
            operator,
            rhs: Operand::Single(Box::new(rhs)),
        }
    }

    /// Evaluate against one row.
    ///
    /// `and`/`or` yield one of their operands rather than a boolean, and
    /// both operands are always evaluated.
    pub fn evaluate(&self, row: &Row, functions: &dyn FunctionLookup) -> Result<Value> {
        match self {
            Expression::Identifier(name) => Ok(row.get(name).cloned().unwrap_or(Value::Null)),
            Expression::Scalar(value) => Ok(value.clone()),
            Expression::Function { name, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(row, functions))
                    .collect::<Result<Vec<_>>>()?;
                functions.call(name, row, &values)
            }
            Expression::Binary { lhs, operator, rhs } => {
                evaluate_binary(lhs, *operator, rhs, row, functions)
            }
        }
    }

    /// Evaluate and reduce to truthiness
    pub fn matches(&self, row: &Row, functions: &dyn FunctionLookup) -> Result<bool> {
        Ok(self.evaluate(row, functions)?.is_truthy())
    }
}

fn evaluate_binary(
    lhs: &Expression,
    operator: BinaryOperator,
    rhs: &Operand,
    row: &Row,
    functions: &dyn FunctionLookup,
) -> Result<Value> {
    let left = lhs.evaluate(row, functions)?;

    if operator == BinaryOperator::In {
        let Operand::List(candidates) = rhs else {
            return Err(QuarryError::Evaluation {
                message: "'in' requires a literal list".to_string(),
            });
        };
        for candidate in candidates {
            if left.loose_eq(&candidate.evaluate(row, functions)?) {
                return Ok(Value::Bool(true));
            }
        }
        return Ok(Value::Bool(false));
    }

    let right = match rhs {
        Operand::Single(expression) => expression.evaluate(row, functions)?,
        Operand::List(_) => {
            return Err(QuarryError::Evaluation {
                message: format!("operator '{}' does not take a list", operator.symbol()),
            })
        }
    };

    let ordering = || left.compare(&right);
    let result = match operator {
        BinaryOperator::Equal => Value::Bool(left.strict_eq(&right)),
        BinaryOperator::NotEqual => Value::Bool(!left.strict_eq(&right)),
        BinaryOperator::LessThan => Value::Bool(ordering() == Some(Ordering::Less)),
        BinaryOperator::LessThanEqual => {
            Value::Bool(matches!(ordering(), Some(Ordering::Less | Ordering::Equal)))
        }
        BinaryOperator::GreaterThan => Value::Bool(ordering() == Some(Ordering::Greater)),
        BinaryOperator::GreaterThanEqual => {
            Value::Bool(matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)))
        }
        BinaryOperator::And => {
            if left.is_truthy() {
                right
            } else {
                left
            }
        }
        BinaryOperator::Or => {
            if left.is_truthy() {
                left
            } else {
                right
            }
        }
        BinaryOperator::In => Value::Bool(left.loose_eq(&right)),
    };
    Ok(result)
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => f.write_str(name),
            Expression::Scalar(Value::Text(s)) => {
                write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
            }
            Expression::Scalar(value) => write!(f, "{}", value),
            Expression::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expression::Binary {
                lhs,
                operator,
                rhs: Operand::Single(rhs),
            } => write!(f, "({} {} {})", lhs, operator.symbol(), rhs),
            Expression::Binary {
                lhs,
                operator,
                rhs: Operand::List(items),
            } => {
                // `in` only parses at the top level, so it is never wrapped
                write!(f, "{} {} (", lhs, operator.symbol())?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}
