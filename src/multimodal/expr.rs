//! 함수 그래프용 제한된 수식 파서/평가기
//!
//! 허용 문법: 숫자, `x`, `+ - * / ^ **`, 괄호, 단항 부호,
//! 함수 `sin cos tan exp log sqrt abs`, 상수 `pi e`.
//! 그 외 식별자는 파싱 단계에서 거부합니다.

use anyhow::Result;

/// 이항 연산자
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// 허용 함수
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Abs,
}

impl Func {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Func::Sin),
            "cos" => Some(Func::Cos),
            "tan" => Some(Func::Tan),
            "exp" => Some(Func::Exp),
            "log" => Some(Func::Log),
            "sqrt" => Some(Func::Sqrt),
            "abs" => Some(Func::Abs),
            _ => None,
        }
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Sin => v.sin(),
            Func::Cos => v.cos(),
            Func::Tan => v.tan(),
            Func::Exp => v.exp(),
            Func::Log => v.ln(),
            Func::Sqrt => v.sqrt(),
            Func::Abs => v.abs(),
        }
    }
}

/// 파싱된 수식
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    X,
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

impl Expr {
    /// 수식 문자열 파싱
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            anyhow::bail!("Empty expression");
        }

        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        if let Some(token) = parser.peek() {
            anyhow::bail!("Unexpected token {:?} in '{}'", token, source);
        }
        Ok(expr)
    }

    /// x 값에서 평가 (정의되지 않으면 NaN/inf)
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::X => x,
            Expr::Neg(inner) => -inner.eval(x),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(x), rhs.eval(x));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(func, arg) => func.apply(arg.eval(x)),
        }
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
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
                tokens.push(Token::Caret);
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
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| anyhow::anyhow!("Invalid number '{}'", literal))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => anyhow::bail!("Unsupported character '{}'", other),
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser (recursive descent)
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => anyhow::bail!("Expected {:?}, found {:?}", expected, other),
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // unary := ('-' | '+') unary | power
    fn unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // power := atom ('^' unary)?   (우결합)
    fn power(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Expr::Num(v)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "x" => Ok(Expr::X),
                "pi" => Ok(Expr::Num(std::f64::consts::PI)),
                "e" => Ok(Expr::Num(std::f64::consts::E)),
                _ => {
                    let func = Func::parse(&name)
                        .ok_or_else(|| anyhow::anyhow!("Unknown identifier '{}'", name))?;
                    self.expect(Token::LParen)?;
                    let arg = self.expr()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call(func, Box::new(arg)))
                }
            },
            other => anyhow::bail!("Unexpected {:?}", other),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, x: f64) -> f64 {
        Expr::parse(source).unwrap().eval(x)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("x**2", 3.0), 9.0);
        assert_eq!(eval("2 + 3 * x", 2.0), 8.0);
        assert_eq!(eval("(2 + 3) * x", 2.0), 10.0);
        assert_eq!(eval("2^3^2", 0.0), 512.0);
        assert_eq!(eval("-x^2", 3.0), -9.0);
        assert_eq!(eval("10 / 4 - 1", 0.0), 1.5);
    }

    #[test]
    fn test_functions_and_constants() {
        assert!((eval("sin(pi / 2)", 0.0) - 1.0).abs() < 1e-12);
        assert!((eval("log(e)", 0.0) - 1.0).abs() < 1e-12);
        assert_eq!(eval("sqrt(abs(x))", -16.0), 4.0);
        assert!(eval("log(x)", -1.0).is_nan());
    }

    #[test]
    fn test_rejects_unknown_identifiers() {
        assert!(Expr::parse("__import__(os)").is_err());
        assert!(Expr::parse("np.sin(x)").is_err());
        assert!(Expr::parse("y + 1").is_err());
        assert!(Expr::parse("").is_err());
        assert!(Expr::parse("(x + 1").is_err());
        assert!(Expr::parse("x 2").is_err());
    }
}
