//! 函数式权重表达式：引擎只依赖 [`WeightEvaluator`] 约定。
//!
//! 默认实现 [`FunctionalWeightParser`] 支持的文法：
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := number | '#(' place [',' token] ')' | 'cap(' place ')'
//!         | ('floor' | 'ceil') '(' expr ')' | ident | '(' expr ')' | '-' factor
//! ```
//!
//! `#(P)` 为库所 `P` 中所有颜色令牌之和，`#(P, Red)` 为单一颜色的计数，
//! 裸标识符解析为速率参数。
use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::{many0, many0_count},
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded},
};
use thiserror::Error;

use crate::net::structure::Weight;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("cannot parse `{expression}`: {message}")]
    Parse { expression: String, message: String },
    #[error("no place named `{0}`")]
    UnknownPlace(String),
    #[error("no token named `{0}`")]
    UnknownToken(String),
    #[error("no rate parameter named `{0}`")]
    UnknownVariable(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression evaluated to a non-finite value")]
    NotFinite,
    #[error("expression evaluated to a negative weight {0}")]
    Negative(f64),
}

/// 表达式求值时看到的网的只读视图。
pub trait EvalContext {
    /// `place` 中的令牌数，`token` 为 `None` 时对所有颜色求和。
    fn token_count(&self, place: &str, token: Option<&str>) -> Result<Weight, EvaluationError>;

    fn capacity(&self, place: &str) -> Result<Option<Weight>, EvaluationError>;

    fn variable(&self, name: &str) -> Result<f64, EvaluationError>;
}

pub trait WeightEvaluator: fmt::Debug + Send + Sync {
    fn evaluate(&self, expression: &str, context: &dyn EvalContext)
    -> Result<f64, EvaluationError>;
}

/// 将求值结果向零截断为权重。
pub fn truncate_weight(value: f64) -> Result<Weight, EvaluationError> {
    if !value.is_finite() {
        return Err(EvaluationError::NotFinite);
    }
    let truncated = value.trunc();
    if truncated < 0.0 {
        return Err(EvaluationError::Negative(value));
    }
    Ok(truncated as Weight)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Floor,
    Ceil,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Tokens {
        place: String,
        token: Option<String>,
    },
    Capacity(String),
    Variable(String),
    Neg(Box<Expr>),
    Call(Func, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn evaluate(&self, ctx: &dyn EvalContext) -> Result<f64, EvaluationError> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Tokens { place, token } => ctx
                .token_count(place, token.as_deref())
                .map(|count| count as f64),
            Expr::Capacity(place) => ctx
                .capacity(place)
                .map(|capacity| capacity.unwrap_or(0) as f64),
            Expr::Variable(name) => ctx.variable(name),
            Expr::Neg(inner) => Ok(-inner.evaluate(ctx)?),
            Expr::Call(Func::Floor, inner) => Ok(inner.evaluate(ctx)?.floor()),
            Expr::Call(Func::Ceil, inner) => Ok(inner.evaluate(ctx)?.ceil()),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.evaluate(ctx)?;
                let rhs = rhs.evaluate(ctx)?;
                match op {
                    BinOp::Add => Ok(lhs + rhs),
                    BinOp::Sub => Ok(lhs - rhs),
                    BinOp::Mul => Ok(lhs * rhs),
                    BinOp::Div if rhs == 0.0 => Err(EvaluationError::DivisionByZero),
                    BinOp::Div => Ok(lhs / rhs),
                }
            }
        }
    }
}

pub fn parse_expression(expression: &str) -> Result<Expr, EvaluationError> {
    all_consuming(expr)
        .parse(expression)
        .map(|(_, parsed)| parsed)
        .map_err(|err| EvaluationError::Parse {
            expression: expression.to_owned(),
            message: err.to_string(),
        })
}

/// 弧权重与速率的默认求值器。
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionalWeightParser;

impl WeightEvaluator for FunctionalWeightParser {
    fn evaluate(
        &self,
        expression: &str,
        context: &dyn EvalContext,
    ) -> Result<f64, EvaluationError> {
        parse_expression(expression)?.evaluate(context)
    }
}

fn ws<'a, O, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    P: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map(
        map_res(recognize_float, |s: &str| s.parse::<f64>()),
        Expr::Number,
    )
    .parse(input)
}

fn token_ref(input: &str) -> IResult<&str, Expr> {
    map(
        preceded(
            pair(char('#'), ws(char('('))),
            (
                ws(identifier),
                opt(preceded(char(','), ws(identifier))),
                char(')'),
            ),
        ),
        |(place, token, _)| Expr::Tokens {
            place: place.to_owned(),
            token: token.map(str::to_owned),
        },
    )
    .parse(input)
}

fn named(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = identifier(input)?;
    match name {
        "floor" | "ceil" => {
            let func = if name == "floor" {
                Func::Floor
            } else {
                Func::Ceil
            };
            let (rest, arg) = delimited(ws(char('(')), expr, char(')')).parse(rest)?;
            Ok((rest, Expr::Call(func, Box::new(arg))))
        }
        "cap" => {
            let (rest, place) = delimited(ws(char('(')), ws(identifier), char(')')).parse(rest)?;
            Ok((rest, Expr::Capacity(place.to_owned())))
        }
        _ => Ok((rest, Expr::Variable(name.to_owned()))),
    }
}

fn parens(input: &str) -> IResult<&str, Expr> {
    delimited(char('('), expr, char(')')).parse(input)
}

fn negation(input: &str) -> IResult<&str, Expr> {
    map(preceded(char('-'), factor), |inner| Expr::Neg(Box::new(inner))).parse(input)
}

fn factor(input: &str) -> IResult<&str, Expr> {
    ws(alt((number, token_ref, named, parens, negation))).parse(input)
}

fn fold_binary(first: Expr, rest: Vec<(char, Expr)>) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| {
        let op = match op {
            '+' => BinOp::Add,
            '-' => BinOp::Sub,
            '*' => BinOp::Mul,
            _ => BinOp::Div,
        };
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    })
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(pair(one_of("*/"), factor)).parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(one_of("+-"), term)).parse(input)?;
    Ok((input, fold_binary(first, rest)))
}
