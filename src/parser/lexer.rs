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

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0, one_of},
    combinator::{all_consuming, map},
    multi::many0,
    number::complete::double,
    sequence::{pair, preceded, terminated},
    Finish, IResult,
};
use nom_locate::LocatedSpan;
use std::fmt;

pub(crate) type LexInput<'a> = LocatedSpan<&'a str>;
type InternalLexResult<'a, T = Token> = IResult<LexInput<'a>, T>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Float(f64),
    Identifier(String),
    LParenthesis,
    Operator(Operator),
    RParenthesis,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Float(value) => write!(f, "{value}"),
            Token::Identifier(name) => write!(f, "{name}"),
            Token::LParenthesis => write!(f, "("),
            Token::Operator(operator) => write!(f, "{operator}"),
            Token::RParenthesis => write!(f, ")"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Operator {
    Caret,
    Minus,
    Plus,
    Slash,
    Star,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Operator::*;
        write!(
            f,
            "{}",
            match self {
                Caret => "^",
                Minus => "-",
                Plus => "+",
                Slash => "/",
                Star => "*",
            }
        )
    }
}

/// An error encountered while lexing expression text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unexpected input `{snippet}` at column {column}")]
pub struct LexError {
    snippet: String,
    column: usize,
}

impl From<nom::error::Error<LexInput<'_>>> for LexError {
    fn from(error: nom::error::Error<LexInput<'_>>) -> Self {
        Self {
            snippet: error.input.fragment().chars().take(16).collect(),
            column: error.input.get_utf8_column(),
        }
    }
}

/// Completely lex a string, returning the tokens within.
pub(crate) fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    let input = LexInput::new(input);
    all_consuming(_lex)(input)
        .finish()
        .map(|(_, tokens)| tokens)
        .map_err(LexError::from)
}

fn _lex(input: LexInput) -> InternalLexResult<Vec<Token>> {
    terminated(many0(preceded(multispace0, lex_token)), multispace0)(input)
}

fn lex_token(input: LexInput) -> InternalLexResult {
    // Operator must come before number (or it may be parsed as a sign)
    alt((lex_punctuation, lex_operator, lex_number, lex_identifier))(input)
}

fn lex_punctuation(input: LexInput) -> InternalLexResult {
    alt((
        map(char('('), |_| Token::LParenthesis),
        map(char(')'), |_| Token::RParenthesis),
    ))(input)
}

fn lex_operator(input: LexInput) -> InternalLexResult {
    use Operator::*;
    map(one_of("^-+/*"), |symbol| {
        Token::Operator(match symbol {
            '^' => Caret,
            '-' => Minus,
            '+' => Plus,
            '/' => Slash,
            _ => Star,
        })
    })(input)
}

fn lex_number(input: LexInput) -> InternalLexResult {
    map(double, Token::Float)(input)
}

fn is_valid_identifier_leading_character(chr: char) -> bool {
    chr.is_ascii_alphabetic() || chr == '_'
}

fn is_valid_identifier_end_character(chr: char) -> bool {
    is_valid_identifier_leading_character(chr) || chr.is_ascii_digit()
}

fn lex_identifier(input: LexInput) -> InternalLexResult {
    map(
        pair(
            take_while1(is_valid_identifier_leading_character),
            take_while(is_valid_identifier_end_character),
        ),
        |(leading, end): (LexInput, LexInput)| {
            Token::Identifier(format!("{}{}", leading.fragment(), end.fragment()))
        },
    )(input)
}
