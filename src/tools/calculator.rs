//! Calculator tool.
//!
//! Expressions are tokenized, parsed by recursive descent into an [`Expr`]
//! tree and evaluated. Only arithmetic and the functions and constants of
//! the math namespace are available; nothing else can be named.

use std::f64::consts;
use std::fmt;

use async_trait::async_trait;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};
use serde_json::{json, Value};

use crate::error::{ChatError, Result};
use crate::tool::Tool;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "A calculator tool that evaluates mathematical expressions. Supports: addition (+), \
         subtraction (-), multiplication (*), division (/), exponentiation (^), and square \
         root (sqrt). Example expressions: \"2 + 3\", \"sqrt(16)\", \"2^3\"."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Mathematical expression as a string (e.g., \"2 + 3\", \"sqrt(16)\", \"2^3\")"
                }
            },
            "required": ["expression"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let expression = input
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ChatError::tool("calculator", "missing `expression` argument"))?;
        Ok(Value::String(calculate(expression)))
    }
}

/// Evaluates `expression`, returning the rendered value or an `Error: ...`
/// message. Never fails.
pub fn calculate(expression: &str) -> String {
    match evaluate(expression) {
        Ok(number) => number.to_string(),
        Err(err) => format!("Error: {err}. Please check your mathematical expression."),
    }
}

pub fn evaluate(expression: &str) -> std::result::Result<Number, CalcError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse()?;
    expr.eval()
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalcError {
    Syntax(String),
    UnknownName(String),
    DivisionByZero,
    ZeroToNegativePower,
    Domain,
    Overflow,
    IntTooLarge,
    NotReal,
    Arity { name: String, expected: usize, got: usize },
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcError::Syntax(detail) => write!(f, "invalid syntax: {detail}"),
            CalcError::UnknownName(name) => write!(f, "name '{name}' is not defined"),
            CalcError::DivisionByZero => f.write_str("division by zero"),
            CalcError::ZeroToNegativePower => {
                f.write_str("0.0 cannot be raised to a negative power")
            }
            CalcError::Domain => f.write_str("math domain error"),
            CalcError::Overflow => f.write_str("numerical result out of range"),
            CalcError::IntTooLarge => f.write_str("int too large to convert to float"),
            CalcError::NotReal => f.write_str("result is not a real number"),
            CalcError::Arity { name, expected, got } => {
                write!(f, "{name}() takes {expected} argument(s) ({got} given)")
            }
        }
    }
}

impl std::error::Error for CalcError {}

/// Integers are exact up to `MAX_INT_BITS` and stay integers until an
/// operation forces a float.
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    Int(BigInt),
    Float(f64),
}

/// Largest integer magnitude kept, about 4300 decimal digits.
const MAX_INT_BITS: u64 = 14_000;

/// Deepest nesting of parentheses, calls, signs and powers accepted.
const MAX_DEPTH: usize = 200;

impl Number {
    fn int(value: BigInt) -> std::result::Result<Number, CalcError> {
        if value.bits() > MAX_INT_BITS {
            return Err(CalcError::Overflow);
        }
        Ok(Number::Int(value))
    }

    fn to_float(&self) -> std::result::Result<f64, CalcError> {
        match self {
            Number::Int(i) => i
                .to_f64()
                .filter(|x| x.is_finite())
                .ok_or(CalcError::IntTooLarge),
            Number::Float(x) => Ok(*x),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// Shortest round-trip rendering, always showing the float-ness of the value:
/// `4.0`, `0.30000000000000004`, `1e+16`, `1.5e-05`.
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0".into() } else { "0.0".into() };
    }

    let sci = format!("{x:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..16).contains(&exponent) {
        let fixed = format!("{x}");
        if fixed.contains('.') {
            fixed
        } else {
            format!("{fixed}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Power);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Power);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    is_float |= chars[i] == '.';
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        is_float = true;
                        i = j;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(parse_number(&literal, is_float)?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => {
                return Err(CalcError::Syntax(format!(
                    "unexpected character '{other}' at position {i}"
                )))
            }
        }
    }

    Ok(tokens)
}

fn parse_number(literal: &str, is_float: bool) -> std::result::Result<Number, CalcError> {
    if is_float {
        literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| CalcError::Syntax(format!("invalid number '{literal}'")))
    } else {
        let value = literal
            .parse::<BigInt>()
            .map_err(|_| CalcError::Syntax(format!("invalid number '{literal}'")))?;
        Number::int(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(Number),
    Constant(f64),
    Neg(Box<Expr>),
    /// A left-associative run such as `a - b + c`, kept flat.
    Chain(Box<Expr>, Vec<(BinOp, Expr)>),
    Power(Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Log10,
    Log2,
    Pow,
    Fabs,
    Floor,
    Ceil,
    Hypot,
    Degrees,
    Radians,
}

/// Strips the optional `math.` prefix. Any other dotted name is rejected.
fn math_name(name: &str) -> std::result::Result<&str, CalcError> {
    let bare = name.strip_prefix("math.").unwrap_or(name);
    if bare.contains('.') || bare.is_empty() {
        return Err(CalcError::UnknownName(name.to_string()));
    }
    Ok(bare)
}

fn lookup_constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(consts::PI),
        "e" => Some(consts::E),
        "tau" => Some(consts::TAU),
        "inf" => Some(f64::INFINITY),
        _ => None,
    }
}

const FUNCTIONS: &[(&str, Function)] = &[
    ("sqrt", Function::Sqrt),
    ("sin", Function::Sin),
    ("cos", Function::Cos),
    ("tan", Function::Tan),
    ("asin", Function::Asin),
    ("acos", Function::Acos),
    ("atan", Function::Atan),
    ("atan2", Function::Atan2),
    ("sinh", Function::Sinh),
    ("cosh", Function::Cosh),
    ("tanh", Function::Tanh),
    ("exp", Function::Exp),
    ("log", Function::Log),
    ("log10", Function::Log10),
    ("log2", Function::Log2),
    ("pow", Function::Pow),
    ("fabs", Function::Fabs),
    ("floor", Function::Floor),
    ("ceil", Function::Ceil),
    ("hypot", Function::Hypot),
    ("degrees", Function::Degrees),
    ("radians", Function::Radians),
];

fn lookup_function(name: &str) -> Option<Function> {
    FUNCTIONS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, function)| *function)
}

impl Function {
    fn name(self) -> &'static str {
        FUNCTIONS
            .iter()
            .find(|(_, function)| *function == self)
            .map(|(name, _)| *name)
            .unwrap_or("function")
    }

    fn arity(self, given: usize) -> usize {
        match self {
            Function::Atan2 | Function::Pow | Function::Hypot => 2,
            Function::Log => given.clamp(1, 2),
            _ => 1,
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn parse(&mut self) -> std::result::Result<Expr, CalcError> {
        if self.tokens.is_empty() {
            return Err(CalcError::Syntax("empty expression".into()));
        }
        let expr = self.expr()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(CalcError::Syntax(format!("unexpected {token:?}"))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn nested<T>(
        &mut self,
        rule: fn(&mut Self) -> std::result::Result<T, CalcError>,
    ) -> std::result::Result<T, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::Syntax("expression is nested too deeply".into()));
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> std::result::Result<Expr, CalcError> {
        let first = self.term()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(Expr::chain(first, rest)),
            };
            self.pos += 1;
            rest.push((op, self.term()?));
        }
    }

    fn term(&mut self) -> std::result::Result<Expr, CalcError> {
        let first = self.nested(Self::unary)?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(Expr::chain(first, rest)),
            };
            self.pos += 1;
            rest.push((op, self.nested(Self::unary)?));
        }
    }

    // Unary minus binds looser than `^`: -2^2 == -(2^2).
    fn unary(&mut self) -> std::result::Result<Expr, CalcError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.nested(Self::unary)?)));
        }
        if self.eat(&Token::Plus) {
            return self.nested(Self::unary);
        }
        self.power()
    }

    fn power(&mut self) -> std::result::Result<Expr, CalcError> {
        let base = self.primary()?;
        if self.eat(&Token::Power) {
            let exponent = self.nested(Self::unary)?;
            return Ok(Expr::Power(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> std::result::Result<Expr, CalcError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.nested(Self::expr)?;
                if !self.eat(&Token::RParen) {
                    return Err(CalcError::Syntax("expected ')'".into()));
                }
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                let bare = math_name(&name)?;
                if self.eat(&Token::LParen) {
                    let function =
                        lookup_function(bare).ok_or_else(|| CalcError::UnknownName(name.clone()))?;
                    let args = self.nested(Self::arguments)?;
                    Ok(Expr::Call(function, args))
                } else {
                    lookup_constant(bare)
                        .map(Expr::Constant)
                        .ok_or(CalcError::UnknownName(name))
                }
            }
            Some(token) => Err(CalcError::Syntax(format!("unexpected {token:?}"))),
            None => Err(CalcError::Syntax("unexpected end of expression".into())),
        }
    }

    fn arguments(&mut self) -> std::result::Result<Vec<Expr>, CalcError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            if !self.eat(&Token::Comma) {
                return Err(CalcError::Syntax("expected ',' or ')'".into()));
            }
        }
    }
}

impl Expr {
    fn chain(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
        if rest.is_empty() {
            first
        } else {
            Expr::Chain(Box::new(first), rest)
        }
    }

    fn eval(&self) -> std::result::Result<Number, CalcError> {
        match self {
            Expr::Number(n) => Ok(n.clone()),
            Expr::Constant(x) => Ok(Number::Float(*x)),
            Expr::Neg(inner) => match inner.eval()? {
                Number::Int(i) => Ok(Number::Int(-i)),
                Number::Float(x) => Ok(Number::Float(-x)),
            },
            Expr::Chain(first, rest) => {
                let mut acc = first.eval()?;
                for (op, operand) in rest {
                    acc = binary(*op, acc, operand.eval()?)?;
                }
                Ok(acc)
            }
            Expr::Power(base, exponent) => binary(BinOp::Pow, base.eval()?, exponent.eval()?),
            Expr::Call(function, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval().and_then(|n| n.to_float()))
                    .collect::<std::result::Result<Vec<f64>, CalcError>>()?;
                let result = call(*function, &values)?;
                match function {
                    // floor and ceil return integers.
                    Function::Floor | Function::Ceil => BigInt::from_f64(result)
                        .ok_or(CalcError::Overflow)
                        .and_then(Number::int),
                    _ => Ok(Number::Float(result)),
                }
            }
        }
    }
}

fn int_pow(base: &BigInt, exponent: &BigInt) -> std::result::Result<Number, CalcError> {
    // 0, 1 and -1 stay small whatever the exponent.
    if base.bits() <= 1 {
        let value = if exponent.is_zero() || (base.is_negative() && (exponent % 2u32).is_zero()) {
            BigInt::one()
        } else {
            base.clone()
        };
        return Ok(Number::Int(value));
    }
    let exponent = exponent
        .to_u32()
        .filter(|e| (base.bits() - 1).saturating_mul(u64::from(*e)) <= MAX_INT_BITS)
        .ok_or(CalcError::Overflow)?;
    Number::int(base.pow(exponent))
}

fn binary(op: BinOp, lhs: Number, rhs: Number) -> std::result::Result<Number, CalcError> {
    use Number::{Float, Int};

    match (op, lhs, rhs) {
        (BinOp::Add, Int(a), Int(b)) => Number::int(a + b),
        (BinOp::Sub, Int(a), Int(b)) => Number::int(a - b),
        (BinOp::Mul, Int(a), Int(b)) => Number::int(a * b),
        (BinOp::Pow, Int(a), Int(b)) if !b.is_negative() => int_pow(&a, &b),
        (BinOp::Add, a, b) => Ok(Float(a.to_float()? + b.to_float()?)),
        (BinOp::Sub, a, b) => Ok(Float(a.to_float()? - b.to_float()?)),
        (BinOp::Mul, a, b) => Ok(Float(a.to_float()? * b.to_float()?)),
        (BinOp::Div, a, b) => {
            let divisor = b.to_float()?;
            if divisor == 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            Ok(Float(a.to_float()? / divisor))
        }
        (BinOp::Pow, a, b) => {
            let (base, exponent) = (a.to_float()?, b.to_float()?);
            if base == 0.0 && exponent < 0.0 {
                return Err(CalcError::ZeroToNegativePower);
            }
            if base < 0.0 && exponent.fract() != 0.0 {
                return Err(CalcError::NotReal);
            }
            let result = base.powf(exponent);
            if result.is_infinite() && base.is_finite() && exponent.is_finite() {
                return Err(CalcError::Overflow);
            }
            Ok(Float(result))
        }
    }
}

fn call(function: Function, args: &[f64]) -> std::result::Result<f64, CalcError> {
    let arity = function.arity(args.len());
    if args.len() != arity {
        return Err(CalcError::Arity {
            name: function.name().to_string(),
            expected: arity,
            got: args.len(),
        });
    }

    let x = args[0];
    let result = match function {
        Function::Sqrt => {
            if x < 0.0 {
                return Err(CalcError::Domain);
            }
            x.sqrt()
        }
        Function::Sin => x.sin(),
        Function::Cos => x.cos(),
        Function::Tan => x.tan(),
        Function::Asin | Function::Acos if !(-1.0..=1.0).contains(&x) => {
            return Err(CalcError::Domain)
        }
        Function::Asin => x.asin(),
        Function::Acos => x.acos(),
        Function::Atan => x.atan(),
        Function::Atan2 => x.atan2(args[1]),
        Function::Sinh => x.sinh(),
        Function::Cosh => x.cosh(),
        Function::Tanh => x.tanh(),
        Function::Exp => x.exp(),
        Function::Log | Function::Log10 | Function::Log2 if x <= 0.0 => {
            return Err(CalcError::Domain)
        }
        Function::Log => match args.get(1) {
            Some(&base) if base <= 0.0 || base == 1.0 => return Err(CalcError::Domain),
            Some(&base) => x.ln() / base.ln(),
            None => x.ln(),
        },
        Function::Log10 => x.log10(),
        Function::Log2 => x.log2(),
        Function::Pow => {
            return binary(BinOp::Pow, Number::Float(x), Number::Float(args[1]))
                .and_then(|n| n.to_float())
        }
        Function::Fabs => x.abs(),
        Function::Floor => x.floor(),
        Function::Ceil => x.ceil(),
        Function::Hypot => x.hypot(args[1]),
        Function::Degrees => x.to_degrees(),
        Function::Radians => x.to_radians(),
    };

    if result.is_infinite() && args.iter().all(|a| a.is_finite()) {
        return Err(CalcError::Overflow);
    }
    Ok(result)
}
