//! Arithmetic expression evaluator behind the `calculate` tool
//!
//! Input is tokenized, parsed by recursive descent into an [`Expr`] tree and
//! evaluated by walking that tree. The grammar only knows numeric literals,
//! `+ - * / **`, parentheses and calls to the functions in [`Function`]; any other
//! name is rejected while parsing, and evaluation has no bindings to look up.
//!
//! ```text
//! expression := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := ("+" | "-") unary | power
//! power      := primary ("**" unary)?
//! primary    := NUMBER | FUNCTION "(" arguments? ")" | "(" expression ")"
//! ```

use std::fmt;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalcError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("name '{0}' is not allowed")]
    UnknownName(String),
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("{function}() takes {expected}, got {given}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        given: usize,
    },
    #[error("{0}")]
    InvalidArgument(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("result is not a finite number")]
    NonFinite,
    #[error("expression nests deeper than {0} levels")]
    TooDeep(usize),
}

/// Integers stay integers until an operation forces a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    pub fn to_json(self) -> Result<Value, CalcError> {
        match self {
            Self::Int(value) => Ok(Value::from(value)),
            Self::Float(value) => serde_json::Number::from_f64(value)
                .map(Value::Number)
                .ok_or(CalcError::NonFinite),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Round,
    Min,
    Max,
    Sum,
    Pow,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Self::Abs),
            "round" => Some(Self::Round),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "sum" => Some(Self::Sum),
            "pow" => Some(Self::Pow),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Pow => "pow",
        }
    }

    fn apply(self, args: &[Number]) -> Result<Number, CalcError> {
        match (self, args) {
            (Self::Abs, [value]) => match value {
                Number::Int(value) => value.checked_abs().map(Number::Int).ok_or(CalcError::Overflow),
                Number::Float(value) => Ok(Number::Float(value.abs())),
            },
            (Self::Abs, _) => Err(self.arity("exactly one argument", args.len())),
            (Self::Round, [value]) => round(*value, None),
            (Self::Round, [value, digits]) => round(*value, Some(*digits)),
            (Self::Round, _) => Err(self.arity("one or two arguments", args.len())),
            (Self::Min | Self::Max, []) => Err(self.arity("at least one argument", 0)),
            (Self::Min, [first, rest @ ..]) => Ok(rest.iter().fold(*first, |best, candidate| {
                if candidate.as_f64() < best.as_f64() {
                    *candidate
                } else {
                    best
                }
            })),
            (Self::Max, [first, rest @ ..]) => Ok(rest.iter().fold(*first, |best, candidate| {
                if candidate.as_f64() > best.as_f64() {
                    *candidate
                } else {
                    best
                }
            })),
            (Self::Sum, _) => args
                .iter()
                .try_fold(Number::Int(0), |total, value| BinaryOp::Add.apply(total, *value)),
            (Self::Pow, [base, exponent]) => BinaryOp::Pow.apply(*base, *exponent),
            (Self::Pow, _) => Err(self.arity("exactly two arguments", args.len())),
        }
    }

    fn arity(self, expected: &'static str, given: usize) -> CalcError {
        CalcError::Arity {
            function: self.name(),
            expected,
            given,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn apply(self, left: Number, right: Number) -> Result<Number, CalcError> {
        use Number::{Float, Int};

        let result = match (self, left, right) {
            (Self::Add, Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or(CalcError::Overflow)?,
            (Self::Sub, Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or(CalcError::Overflow)?,
            (Self::Mul, Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or(CalcError::Overflow)?,
            (Self::Add, a, b) => Float(a.as_f64() + b.as_f64()),
            (Self::Sub, a, b) => Float(a.as_f64() - b.as_f64()),
            (Self::Mul, a, b) => Float(a.as_f64() * b.as_f64()),
            (Self::Div, a, b) => {
                if b.as_f64() == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                Float(a.as_f64() / b.as_f64())
            }
            (Self::Pow, Int(base), Int(exponent)) if exponent >= 0 => u32::try_from(exponent)
                .ok()
                .and_then(|exponent| base.checked_pow(exponent))
                .map(Int)
                .ok_or(CalcError::Overflow)?,
            (Self::Pow, base, exponent) => {
                if base.as_f64() == 0.0 && exponent.as_f64() < 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                Float(base.as_f64().powf(exponent.as_f64()))
            }
        };

        finite(result)
    }
}

fn finite(value: Number) -> Result<Number, CalcError> {
    match value {
        Number::Float(inner) if !inner.is_finite() => Err(CalcError::NonFinite),
        _ => Ok(value),
    }
}

fn round(value: Number, digits: Option<Number>) -> Result<Number, CalcError> {
    let digits = match digits {
        None => None,
        Some(Number::Int(digits)) => Some(
            i32::try_from(digits)
                .map_err(|_| CalcError::InvalidArgument("round() digits out of range".to_string()))?,
        ),
        Some(Number::Float(_)) => {
            return Err(CalcError::InvalidArgument(
                "round() digits must be an integer".to_string(),
            ))
        }
    };

    match (value, digits) {
        (Number::Int(_), None) => Ok(value),
        (Number::Int(_), Some(digits)) if digits >= 0 => Ok(value),
        (Number::Int(value), Some(digits)) => {
            // Past 10**18 every i64 rounds to zero.
            let Some(factor) = 10_i64.checked_pow(digits.unsigned_abs()) else {
                return Ok(Number::Int(0));
            };
            let quotient = (value as f64 / factor as f64).round_ties_even();
            float_to_int(quotient)?
                .checked_mul(factor)
                .map(Number::Int)
                .ok_or(CalcError::Overflow)
        }
        (Number::Float(value), None) => float_to_int(value.round_ties_even()).map(Number::Int),
        (Number::Float(value), Some(digits)) => {
            let factor = 10_f64.powi(digits);
            if !factor.is_finite() {
                return Ok(Number::Float(value));
            }
            if factor == 0.0 {
                return Ok(Number::Float(0.0_f64.copysign(value)));
            }
            let scaled = value * factor;
            if !scaled.is_finite() {
                return Ok(Number::Float(value));
            }
            finite(Number::Float(scaled.round_ties_even() / factor))
        }
    }
}

fn float_to_int(value: f64) -> Result<i64, CalcError> {
    if !value.is_finite() {
        return Err(CalcError::NonFinite);
    }
    if value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(CalcError::Overflow);
    }
    Ok(value as i64)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Number),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn evaluate(&self) -> Result<Number, CalcError> {
        match self {
            Self::Number(value) => finite(*value),
            Self::Unary { op, operand } => {
                let value = operand.evaluate()?;
                match (op, value) {
                    (UnaryOp::Plus, _) => Ok(value),
                    (UnaryOp::Minus, Number::Int(inner)) => {
                        inner.checked_neg().map(Number::Int).ok_or(CalcError::Overflow)
                    }
                    (UnaryOp::Minus, Number::Float(inner)) => Ok(Number::Float(-inner)),
                }
            }
            Self::Binary { op, left, right } => op.apply(left.evaluate()?, right.evaluate()?),
            Self::Call { function, args } => {
                let values = args
                    .iter()
                    .map(Expr::evaluate)
                    .collect::<Result<Vec<_>, _>>()?;
                function.apply(&values)
            }
        }
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
    DoubleStar,
    LeftParen,
    RightParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Name(name) => f.write_str(name),
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
            Self::Star => f.write_str("*"),
            Self::Slash => f.write_str("/"),
            Self::DoubleStar => f.write_str("**"),
            Self::LeftParen => f.write_str("("),
            Self::RightParen => f.write_str(")"),
            Self::Comma => f.write_str(","),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut position = 0;

    while position < bytes.len() {
        let (token, end) = match bytes[position] {
            byte if byte.is_ascii_whitespace() => {
                position += 1;
                continue;
            }
            b'0'..=b'9' | b'.' => lex_number(input, position)?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let end = scan_while(bytes, position, |byte| {
                    byte.is_ascii_alphanumeric() || byte == b'_'
                });
                (Token::Name(input[position..end].to_string()), end)
            }
            b'*' if bytes.get(position + 1) == Some(&b'*') => (Token::DoubleStar, position + 2),
            b'*' => (Token::Star, position + 1),
            b'+' => (Token::Plus, position + 1),
            b'-' => (Token::Minus, position + 1),
            b'/' => (Token::Slash, position + 1),
            b'(' => (Token::LeftParen, position + 1),
            b')' => (Token::RightParen, position + 1),
            b',' => (Token::Comma, position + 1),
            _ => {
                return Err(CalcError::UnexpectedCharacter {
                    character: input[position..].chars().next().unwrap_or_default(),
                    position,
                })
            }
        };

        tokens.push(token);
        position = end;
    }

    Ok(tokens)
}

fn scan_while(bytes: &[u8], start: usize, accept: impl Fn(u8) -> bool) -> usize {
    bytes[start..]
        .iter()
        .position(|byte| !accept(*byte))
        .map_or(bytes.len(), |offset| start + offset)
}

fn lex_number(input: &str, start: usize) -> Result<(Token, usize), CalcError> {
    let bytes = input.as_bytes();
    let mut end = scan_while(bytes, start, |byte| byte.is_ascii_digit());
    let mut is_float = false;

    if bytes.get(end) == Some(&b'.') {
        is_float = true;
        end = scan_while(bytes, end + 1, |byte| byte.is_ascii_digit());
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let digits_end = scan_while(bytes, exponent, |byte| byte.is_ascii_digit());
        if digits_end > exponent {
            is_float = true;
            end = digits_end;
        }
    }

    let literal = &input[start..end];
    let number = if is_float {
        literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| CalcError::InvalidNumber(literal.to_string()))?
    } else {
        literal
            .parse::<i64>()
            .map(Number::Int)
            .map_err(|_| CalcError::Overflow)?
    };

    Ok((Token::Number(number), end))
}

/// Deepest expression tree the parser will build. Both evaluation and drop
/// recurse over the tree, so this bounds their stack use as well.
pub const MAX_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), CalcError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn descend(&mut self) -> Result<(), CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels;
    }

    // Each loop iteration nests the tree built so far one level deeper.
    fn expression(&mut self) -> Result<Expr, CalcError> {
        let mut left = self.term()?;
        let mut levels = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.position += 1;
            self.descend()?;
            levels += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.ascend(levels);
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, CalcError> {
        let mut left = self.unary()?;
        let mut levels = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.position += 1;
            self.descend()?;
            levels += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.ascend(levels);
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, CalcError> {
        let op = match self.peek() {
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Minus) => UnaryOp::Minus,
            _ => return self.power(),
        };
        self.position += 1;
        self.descend()?;
        let operand = self.unary()?;
        self.ascend(1);
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    // `**` is right-associative and its right operand may carry a sign: 2 ** -1.
    fn power(&mut self) -> Result<Expr, CalcError> {
        let base = self.primary()?;
        if self.peek() != Some(&Token::DoubleStar) {
            return Ok(base);
        }
        self.position += 1;
        self.descend()?;
        let exponent = self.unary()?;
        self.ascend(1);
        Ok(Expr::Binary {
            op: BinaryOp::Pow,
            left: Box::new(base),
            right: Box::new(exponent),
        })
    }

    fn primary(&mut self) -> Result<Expr, CalcError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LeftParen) => {
                self.descend()?;
                let inner = self.expression()?;
                self.expect(Token::RightParen)?;
                self.ascend(1);
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                let function = Function::from_name(&name).ok_or(CalcError::UnknownName(name))?;
                self.expect(Token::LeftParen)?;
                self.descend()?;
                let args = self.arguments()?;
                self.ascend(1);
                Ok(Expr::Call { function, args })
            }
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, CalcError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RightParen) {
            self.position += 1;
            return Ok(args);
        }

        loop {
            args.push(self.expression()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RightParen) => return Ok(args),
                Some(token) => return Err(CalcError::UnexpectedToken(token.to_string())),
                None => return Err(CalcError::UnexpectedEnd),
            }
        }
    }
}

pub fn parse(input: &str) -> Result<Expr, CalcError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }

    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.peek() {
        Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
        None => Ok(expr),
    }
}

pub fn evaluate(input: &str) -> Result<Number, CalcError> {
    parse(input)?.evaluate()
}

#[cfg(test)]
mod tests {
    use super::{evaluate, parse, CalcError, Number, MAX_DEPTH};

    fn int(input: &str) -> i64 {
        match evaluate(input).expect("expression should evaluate") {
            Number::Int(value) => value,
            other => panic!("expected integer result for {input}, got {other:?}"),
        }
    }

    fn float(input: &str) -> f64 {
        match evaluate(input).expect("expression should evaluate") {
            Number::Float(value) => value,
            other => panic!("expected float result for {input}, got {other:?}"),
        }
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(int("2 + 2"), 4);
        assert_eq!(int("10 * 5"), 50);
        assert_eq!(int("7 - 10"), -3);
    }

    #[test]
    fn follows_operator_precedence() {
        assert_eq!(int("2 + 3 * 4"), 14);
        assert_eq!(int("(2 + 3) * 4"), 20);
        assert_eq!(int("2 ** 3 ** 2"), 512);
        assert_eq!(int("-2 ** 2"), -4);
        assert_eq!(int("--3"), 3);
    }

    #[test]
    fn division_always_yields_float() {
        assert_eq!(float("10 / 4"), 2.5);
        assert_eq!(float("8 / 2"), 4.0);
        assert_eq!(float("2 ** -1"), 0.5);
    }

    #[test]
    fn parses_float_literals() {
        assert_eq!(float("1.5 + .5"), 2.0);
        assert_eq!(float("1e3"), 1000.0);
        assert_eq!(float("2.5E-1"), 0.25);
    }

    #[test]
    fn evaluates_allowed_functions() {
        assert_eq!(int("abs(-7)"), 7);
        assert_eq!(int("round(2.5)"), 2);
        assert_eq!(int("round(3.5)"), 4);
        assert_eq!(float("round(3.14159, 2)"), 3.14);
        assert_eq!(int("min(4, 2, 8)"), 2);
        assert_eq!(int("max(4, 2, 8)"), 8);
        assert_eq!(int("sum(1, 2, 3)"), 6);
        assert_eq!(int("sum()"), 0);
        assert_eq!(int("pow(2, 10)"), 1024);
    }

    #[test]
    fn rejects_names_outside_allow_list() {
        assert!(matches!(
            evaluate("__import__('os')"),
            Err(CalcError::UnexpectedCharacter { character: '\'', .. })
        ));
        assert_eq!(
            evaluate("__import__(1)"),
            Err(CalcError::UnknownName("__import__".to_string()))
        );
        assert_eq!(
            evaluate("open(1)"),
            Err(CalcError::UnknownName("open".to_string()))
        );
        assert!(evaluate("abs.__class__").is_err());
        assert!(evaluate("x = 1").is_err());
        assert!(evaluate("abs").is_err());
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(evaluate(""), Err(CalcError::Empty));
        assert_eq!(evaluate("2 +"), Err(CalcError::UnexpectedEnd));
        assert!(matches!(evaluate("(1 + 2"), Err(CalcError::UnexpectedEnd)));
        assert!(matches!(evaluate("1 2"), Err(CalcError::UnexpectedToken(_))));
        assert!(matches!(
            evaluate("1 % 2"),
            Err(CalcError::UnexpectedCharacter { character: '%', .. })
        ));
    }

    #[test]
    fn reports_arithmetic_failures() {
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("0 ** -1"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("9223372036854775807 + 1"), Err(CalcError::Overflow));
        assert_eq!(evaluate("10.0 ** 400"), Err(CalcError::NonFinite));
        assert!(matches!(evaluate("pow(2)"), Err(CalcError::Arity { .. })));
    }

    #[test]
    fn rejects_nesting_past_depth_limit() {
        let parens = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        assert_eq!(evaluate(&parens), Err(CalcError::TooDeep(MAX_DEPTH)));

        let signs = format!("{}1", "-".repeat(200_000));
        assert_eq!(evaluate(&signs), Err(CalcError::TooDeep(MAX_DEPTH)));

        let calls = format!("{}1{}", "abs(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(evaluate(&calls), Err(CalcError::TooDeep(MAX_DEPTH)));

        let chain = vec!["1"; 10_000].join(" + ");
        assert_eq!(evaluate(&chain), Err(CalcError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn accepts_nesting_up_to_depth_limit() {
        assert_eq!(int(&format!("{}1", "-".repeat(MAX_DEPTH))), 1);
        assert_eq!(
            evaluate(&format!("{}1", "-".repeat(MAX_DEPTH + 1))),
            Err(CalcError::TooDeep(MAX_DEPTH))
        );

        let parens = format!("{}2 * 3{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(int(&parens), 6);
        assert_eq!(int(&vec!["1"; 200].join(" + ")), 200);
    }

    #[test]
    fn rounds_with_extreme_digit_counts() {
        assert_eq!(float("round(1.5, 400)"), 1.5);
        assert_eq!(float("round(1e300, 20)"), 1e300);
        assert_eq!(float("round(123.456, -400)"), 0.0);
        assert_eq!(int("round(5, -400)"), 0);
        assert_eq!(float("round(2.675, 2)"), 2.67);
    }

    #[test]
    fn parse_is_pure() {
        assert_eq!(parse("1 + 2 * 3"), parse("1 + 2 * 3"));
    }
}
