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

//! Lexing and parsing for the expression language used by pulse templates.
//!
//! The surface syntax is deliberately small: real numbers, named variables, `pi`, the infix
//! operators `+ - * / ^`, a prefix `-`, and the function calls `abs`/`cos`/`exp`/`sin`/`sqrt`.
//! The public entry point is [`Expression::from_str`](crate::expression::Expression).

mod expression;
mod lexer;

pub(crate) use expression::parse_expression;
pub(crate) use lexer::lex;
pub use lexer::LexError;

/// An error that can occur while parsing an expression from text.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected end of expression")]
    UnexpectedEof,

    #[error("expected {expected}, found `{found}`")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },

    #[error("leftover input after expression: `{0}`")]
    Leftover(String),
}
