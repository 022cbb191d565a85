// Copyright 2023 the pulseq developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::{
    floating_point_eq,
    parser::{lex, parse_expression, ParseError},
};
use internment::ArcIntern;
use itertools::Itertools;
use lexical::{format, to_string_with_options, WriteFloatOptions};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    f64::consts::PI,
    fmt,
    hash::{Hash, Hasher},
    num::NonZeroI32,
    ops::{Add, AddAssign, BitXor, BitXorAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

/// The different possible types of errors that could occur during expression evaluation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("no value was provided for the variable `{0}`")]
    UndefinedVariable(String),
}

/// The type of symbolic pulse expressions: real arithmetic over named free variables.
///
/// Pulse expressions take advantage of *structural sharing*; if an expression contains the same
/// subexpression twice, such as `x + y` in `(x + y) * (x + y)`, the two children of the `*` node
/// will be the *same pointer*.  This is implemented through *interning*; the recursive references
/// to child nodes are done via [`ArcIntern<Expression>`]s, so equality, cloning, and hashing of
/// subtrees are all cheap pointer operations.
///
/// The structural sharing also means that expressions are fundamentally *immutable*; it is
/// impossible to get an owned or `&mut` reference to the child `Expression`s of any `Expression`.
///
/// Note that when comparing expressions, any embedded NaNs are treated as *equal* to other NaNs,
/// not unequal, in contravention of the IEEE 754 spec.
#[derive(Clone, Debug)]
pub enum Expression {
    FunctionCall(FunctionCallExpression),
    Infix(InfixExpression),
    Number(f64),
    PiConstant,
    Prefix(PrefixExpression),
    Variable(String),
}

/// The type of function call expressions, e.g. `sin(e)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionCallExpression {
    pub function: ExpressionFunction,
    pub expression: ArcIntern<Expression>,
}

impl FunctionCallExpression {
    pub fn new(function: ExpressionFunction, expression: ArcIntern<Expression>) -> Self {
        Self {
            function,
            expression,
        }
    }
}

/// The type of infix expressions, e.g. `e1 + e2`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InfixExpression {
    pub left: ArcIntern<Expression>,
    pub operator: InfixOperator,
    pub right: ArcIntern<Expression>,
}

impl InfixExpression {
    pub fn new(
        left: ArcIntern<Expression>,
        operator: InfixOperator,
        right: ArcIntern<Expression>,
    ) -> Self {
        Self {
            left,
            operator,
            right,
        }
    }
}

/// The type of prefix expressions, e.g. `-e`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrefixExpression {
    pub operator: PrefixOperator,
    pub expression: ArcIntern<Expression>,
}

impl PrefixExpression {
    pub fn new(operator: PrefixOperator, expression: ArcIntern<Expression>) -> Self {
        Self {
            operator,
            expression,
        }
    }
}

impl PartialEq for Expression {
    // Implemented by hand since we can't derive with f64s hidden inside.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::FunctionCall(left), Self::FunctionCall(right)) => left == right,
            (Self::Infix(left), Self::Infix(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => floating_point_eq::eq(*left, *right),
            (Self::PiConstant, Self::PiConstant) => true,
            (Self::Prefix(left), Self::Prefix(right)) => left == right,
            (Self::Variable(left), Self::Variable(right)) => left == right,

            // This explicit or-pattern ensures that we'll get a compilation error if `Expression`
            // grows another constructor.
            (
                Self::FunctionCall(_)
                | Self::Infix(_)
                | Self::Number(_)
                | Self::PiConstant
                | Self::Prefix(_)
                | Self::Variable(_),
                _,
            ) => false,
        }
    }
}

// Implemented by hand since we can't derive with f64s hidden inside.
impl Eq for Expression {}

impl Hash for Expression {
    // Implemented by hand since we can't derive with f64s hidden inside.
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::FunctionCall(FunctionCallExpression {
                function,
                expression,
            }) => {
                "FunctionCall".hash(state);
                function.hash(state);
                expression.hash(state);
            }
            Self::Infix(InfixExpression {
                left,
                operator,
                right,
            }) => {
                "Infix".hash(state);
                operator.hash(state);
                left.hash(state);
                right.hash(state);
            }
            Self::Number(n) => {
                "Number".hash(state);
                floating_point_eq::hash(*n, state);
            }
            Self::PiConstant => {
                "PiConstant".hash(state);
            }
            Self::Prefix(p) => {
                "Prefix".hash(state);
                p.operator.hash(state);
                p.expression.hash(state);
            }
            Self::Variable(v) => {
                "Variable".hash(state);
                v.hash(state);
            }
        }
    }
}

macro_rules! impl_expr_op {
    ($name:ident, $name_assign:ident, $function:ident, $function_assign:ident, $operator:ident) => {
        impl $name for Expression {
            type Output = Self;
            fn $function(self, other: Self) -> Self {
                Self::Infix(InfixExpression {
                    left: ArcIntern::new(self),
                    operator: InfixOperator::$operator,
                    right: ArcIntern::new(other),
                })
            }
        }

        impl $name_assign for Expression {
            fn $function_assign(&mut self, other: Self) {
                // Move out of self to avoid potentially cloning a large value
                let temp = ::std::mem::replace(self, Self::PiConstant);
                *self = temp.$function(other);
            }
        }
    };
}

impl_expr_op!(BitXor, BitXorAssign, bitxor, bitxor_assign, Caret);
impl_expr_op!(Add, AddAssign, add, add_assign, Plus);
impl_expr_op!(Sub, SubAssign, sub, sub_assign, Minus);
impl_expr_op!(Mul, MulAssign, mul, mul_assign, Star);
impl_expr_op!(Div, DivAssign, div, div_assign, Slash);

impl Neg for Expression {
    type Output = Self;

    fn neg(self) -> Self {
        Expression::Prefix(PrefixExpression {
            operator: PrefixOperator::Minus,
            expression: ArcIntern::new(self),
        })
    }
}

/// Compute the result of an infix expression where both operands are concrete.
#[inline]
pub(crate) fn calculate_infix(left: f64, operator: InfixOperator, right: f64) -> f64 {
    use InfixOperator::*;
    match operator {
        Caret => left.powf(right),
        Plus => left + right,
        Minus => left - right,
        Slash => left / right,
        Star => left * right,
    }
}

/// Compute the result of an expression function where the operand is concrete.
#[inline]
pub(crate) fn calculate_function(function: ExpressionFunction, argument: f64) -> f64 {
    use ExpressionFunction::*;
    match function {
        Abs => argument.abs(),
        Cosine => argument.cos(),
        Exponent => argument.exp(),
        Sine => argument.sin(),
        SquareRoot => argument.sqrt(),
    }
}

impl Expression {
    /// Evaluate the expression to a single number, given a value for each free variable.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pulseq::expression::Expression;
    /// use std::collections::HashMap;
    /// use std::str::FromStr;
    ///
    /// let expression = Expression::from_str("a + b * t").unwrap();
    ///
    /// let mut variables = HashMap::new();
    /// variables.insert(String::from("a"), 1.0);
    /// variables.insert(String::from("b"), 2.0);
    /// variables.insert(String::from("t"), 3.0);
    ///
    /// assert_eq!(expression.evaluate(&variables).unwrap(), 7.0);
    /// ```
    pub fn evaluate<K>(&self, variables: &HashMap<K, f64>) -> Result<f64, EvaluationError>
    where
        K: Borrow<str> + Hash + Eq,
    {
        use Expression::*;

        match self {
            FunctionCall(FunctionCallExpression {
                function,
                expression,
            }) => {
                let evaluated = expression.evaluate(variables)?;
                Ok(calculate_function(*function, evaluated))
            }
            Infix(InfixExpression {
                left,
                operator,
                right,
            }) => {
                let left_evaluated = left.evaluate(variables)?;
                let right_evaluated = right.evaluate(variables)?;
                Ok(calculate_infix(left_evaluated, *operator, right_evaluated))
            }
            Number(number) => Ok(*number),
            PiConstant => Ok(PI),
            Prefix(PrefixExpression {
                operator,
                expression,
            }) => {
                use PrefixOperator::*;
                let value = expression.evaluate(variables)?;
                if matches!(operator, Minus) {
                    Ok(-value)
                } else {
                    Ok(value)
                }
            }
            Variable(identifier) => match variables.get(identifier.as_str()) {
                Some(&value) => Ok(value),
                None => Err(EvaluationError::UndefinedVariable(identifier.clone())),
            },
        }
    }

    /// Return the names of all free variables within the expression.
    pub fn variables(&self) -> HashSet<String> {
        let mut result = HashSet::new();
        self.collect_variables(&mut result);
        result
    }

    fn collect_variables(&self, result: &mut HashSet<String>) {
        use Expression::*;

        match self {
            FunctionCall(FunctionCallExpression { expression, .. }) => {
                expression.collect_variables(result)
            }
            Infix(InfixExpression { left, right, .. }) => {
                left.collect_variables(result);
                right.collect_variables(result);
            }
            Number(_) | PiConstant => {}
            Prefix(PrefixExpression { expression, .. }) => expression.collect_variables(result),
            Variable(identifier) => {
                result.insert(identifier.clone());
            }
        }
    }
}

impl FromStr for Expression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = lex(s)?;
        let (remainder, expression) = parse_expression(&tokens)?;
        if !remainder.is_empty() {
            return Err(ParseError::Leftover(
                remainder.iter().map(ToString::to_string).join(" "),
            ));
        }
        Ok(expression)
    }
}

static FORMAT_REAL_OPTIONS: Lazy<WriteFloatOptions> = Lazy::new(|| {
    WriteFloatOptions::builder()
        .negative_exponent_break(NonZeroI32::new(-5))
        .positive_exponent_break(NonZeroI32::new(15))
        .trim_floats(true)
        .build()
        .expect("options are valid")
});

/// Format an [`f64`] so that integral values are printed without a trailing `.0` and exponents are
/// only used for very large or very small magnitudes.
#[inline(always)]
pub(crate) fn format_f64(value: f64) -> String {
    const FORMAT: u128 = format::STANDARD;
    to_string_with_options::<_, FORMAT>(value, &FORMAT_REAL_OPTIONS)
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Expression::*;
        match self {
            FunctionCall(FunctionCallExpression {
                function,
                expression,
            }) => {
                write!(f, "{function}(")?;
                write!(f, "{expression}")?;
                write!(f, ")")
            }
            Infix(InfixExpression {
                left,
                operator,
                right,
            }) => {
                format_inner_expression(f, left)?;
                write!(f, "{operator}")?;
                format_inner_expression(f, right)
            }
            Number(value) => write!(f, "{}", format_f64(*value)),
            PiConstant => write!(f, "pi"),
            Prefix(PrefixExpression {
                operator,
                expression,
            }) => {
                write!(f, "{operator}")?;
                format_inner_expression(f, expression)
            }
            Variable(identifier) => write!(f, "{identifier}"),
        }
    }
}

/// Utility function to wrap infix expressions that are part of an expression in parentheses, so
/// that correct precedence rules are enforced.
fn format_inner_expression(f: &mut fmt::Formatter, expression: &Expression) -> fmt::Result {
    match expression {
        Expression::Infix(InfixExpression {
            left,
            operator,
            right,
        }) => {
            write!(f, "(")?;
            format_inner_expression(f, left)?;
            write!(f, "{operator}")?;
            format_inner_expression(f, right)?;
            write!(f, ")")
        }
        _ => write!(f, "{expression}"),
    }
}

// Expressions travel through serialized templates in their text form; see the `serialization`
// module for the data-dictionary schema.
impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_str(&text).map_err(serde::de::Error::custom)
    }
}

/// A function usable within an expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExpressionFunction {
    Abs,
    Cosine,
    Exponent,
    Sine,
    SquareRoot,
}

impl fmt::Display for ExpressionFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ExpressionFunction::*;
        write!(
            f,
            "{}",
            match self {
                Abs => "abs",
                Cosine => "cos",
                Exponent => "exp",
                Sine => "sin",
                SquareRoot => "sqrt",
            }
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrefixOperator {
    Plus,
    Minus,
}

impl fmt::Display for PrefixOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use PrefixOperator::*;
        write!(
            f,
            "{}",
            match self {
                Plus => "+",
                Minus => "-",
            }
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InfixOperator {
    Caret,
    Plus,
    Minus,
    Slash,
    Star,
}

impl fmt::Display for InfixOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use InfixOperator::*;
        write!(
            f,
            "{}",
            match self {
                Caret => "^",
                Plus => "+",
                Minus => "-",
                Slash => "/",
                Star => "*",
            }
        )
    }
}
