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

use internment::ArcIntern;

use super::lexer::{Operator, Token};
use super::ParseError;
use crate::expression::{
    Expression, ExpressionFunction, FunctionCallExpression, InfixExpression, InfixOperator,
    PrefixExpression, PrefixOperator,
};

pub(crate) type ParserInput<'a> = &'a [Token];
type ParserResult<'a, T> = Result<(ParserInput<'a>, T), ParseError>;

#[derive(Debug, PartialEq, PartialOrd)]
enum Precedence {
    Lowest,
    Sum,
    Product,
    Exponentiation,
}

impl From<&Token> for Precedence {
    fn from(token: &Token) -> Self {
        match token {
            Token::Operator(operator) => Self::from(operator),
            _ => Precedence::Lowest,
        }
    }
}

impl From<&Operator> for Precedence {
    fn from(operator: &Operator) -> Self {
        match operator {
            Operator::Plus | Operator::Minus => Precedence::Sum,
            Operator::Star | Operator::Slash => Precedence::Product,
            Operator::Caret => Precedence::Exponentiation,
        }
    }
}

fn get_precedence(input: ParserInput) -> Precedence {
    match input.first() {
        Some(token) => Precedence::from(token),
        None => Precedence::Lowest,
    }
}

/// Parse an expression at the head of the current input, for as long as the expression continues.
/// Return an error only if the first token(s) do not form an expression.
pub(crate) fn parse_expression(input: ParserInput) -> ParserResult<Expression> {
    parse(input, Precedence::Lowest)
}

/// Recursively parse an expression as long as operator precedence is satisfied.
fn parse(input: ParserInput, precedence: Precedence) -> ParserResult<Expression> {
    let (input, prefix) = parse_prefix(input);
    let (mut input, mut left) = match input.split_first() {
        None => return Err(ParseError::UnexpectedEof),
        Some((Token::Float(value), remainder)) => (remainder, Expression::Number(*value)),
        Some((Token::Identifier(_), _)) => parse_expression_identifier(input)?,
        Some((Token::LParenthesis, remainder)) => parse_grouped_expression(remainder)?,
        Some((token, _)) => {
            return Err(ParseError::UnexpectedToken {
                expected: "expression",
                found: token.to_string(),
            })
        }
    };

    if let Some(prefix) = prefix {
        left = Expression::Prefix(PrefixExpression {
            operator: prefix,
            expression: ArcIntern::new(left),
        });
    }

    while get_precedence(input) > precedence {
        match input.first() {
            None => return Ok((input, left)),
            Some(Token::Operator(_)) => {
                let (remainder, expression) = parse_infix(input, left)?;
                left = expression;
                input = remainder;
            }
            Some(_) => return Ok((input, left)),
        }
    }

    Ok((input, left))
}

/// Given an expression function, parse the expression within its parentheses.
fn parse_function_call(input: ParserInput, function: ExpressionFunction) -> ParserResult<Expression> {
    let (input, _) = expect(input, &Token::LParenthesis, "opening parenthesis")?;
    let (input, expression) = parse(input, Precedence::Lowest)?;
    let (input, _) = expect(input, &Token::RParenthesis, "closing parenthesis")?;
    Ok((
        input,
        Expression::FunctionCall(FunctionCallExpression {
            function,
            expression: ArcIntern::new(expression),
        }),
    ))
}

/// Identifiers have to be handled specially because some have special meaning.
///
/// By order of precedence:
///
/// 1. Known function names introduce a function call
/// 2. `pi` is a constant
/// 3. Anything else is a free variable
fn parse_expression_identifier(input: ParserInput) -> ParserResult<Expression> {
    match input.split_first() {
        None => Err(ParseError::UnexpectedEof),
        Some((Token::Identifier(identifier), remainder)) => match identifier.as_str() {
            "abs" => parse_function_call(remainder, ExpressionFunction::Abs),
            "cos" => parse_function_call(remainder, ExpressionFunction::Cosine),
            "exp" => parse_function_call(remainder, ExpressionFunction::Exponent),
            "pi" => Ok((remainder, Expression::PiConstant)),
            "sin" => parse_function_call(remainder, ExpressionFunction::Sine),
            "sqrt" => parse_function_call(remainder, ExpressionFunction::SquareRoot),
            _ => Ok((remainder, Expression::Variable(identifier.clone()))),
        },
        Some((other_token, _)) => Err(ParseError::UnexpectedToken {
            expected: "identifier",
            found: other_token.to_string(),
        }),
    }
}

/// To be called following an opening parenthesis, this will parse the expression to its end
/// and then expect a closing right parenthesis.
fn parse_grouped_expression(input: ParserInput) -> ParserResult<Expression> {
    let (input, expression) = parse(input, Precedence::Lowest)?;
    let (input, _) = expect(input, &Token::RParenthesis, "right parenthesis")?;
    Ok((input, expression))
}

/// Parse an infix operator and then the expression to the right of the operator, and return the
/// resulting infixed expression.
fn parse_infix(input: ParserInput, left: Expression) -> ParserResult<Expression> {
    match input.split_first() {
        None => Err(ParseError::UnexpectedEof),
        Some((Token::Operator(token_operator), remainder)) => {
            let expression_operator = match token_operator {
                Operator::Plus => InfixOperator::Plus,
                Operator::Minus => InfixOperator::Minus,
                Operator::Caret => InfixOperator::Caret,
                Operator::Slash => InfixOperator::Slash,
                Operator::Star => InfixOperator::Star,
            };
            let precedence = Precedence::from(token_operator);
            let (remainder, right) = parse(remainder, precedence)?;
            let infix_expression = Expression::Infix(InfixExpression {
                left: ArcIntern::new(left),
                operator: expression_operator,
                right: ArcIntern::new(right),
            });
            Ok((remainder, infix_expression))
        }
        Some((other_token, _)) => Err(ParseError::UnexpectedToken {
            expected: "infix operator",
            found: other_token.to_string(),
        }),
    }
}

/// Split off the prefix operator at the beginning of the input, if any.
fn parse_prefix(input: ParserInput) -> (ParserInput, Option<PrefixOperator>) {
    match input.split_first() {
        Some((Token::Operator(Operator::Minus), remainder)) => {
            (remainder, Some(PrefixOperator::Minus))
        }
        _ => (input, None),
    }
}

fn expect<'a>(
    input: ParserInput<'a>,
    token: &Token,
    expected: &'static str,
) -> ParserResult<'a, ()> {
    match input.split_first() {
        None => Err(ParseError::UnexpectedEof),
        Some((found, remainder)) if found == token => Ok((remainder, ())),
        Some((found, _)) => Err(ParseError::UnexpectedToken {
            expected,
            found: found.to_string(),
        }),
    }
}
