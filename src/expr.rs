//! Evaluator for the small Python-literal expressions servers put in contexts, domains
//! and attribute conditions (`[('user_id', '=', uid)]`, `{'lang': lang}`, `a and b`).
//!
//! Only literals, context names, subscripts and operators exist. There are no calls and
//! no attribute access, so nothing a server sends can reach outside the given context.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("syntax error at {pos}: {message}")]
    Syntax { pos: usize, message: String },
    #[error("name '{0}' is not defined")]
    UnknownName(String),
    #[error("key {0} not found")]
    MissingKey(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

type ExprResult<T> = Result<T, ExprError>;

/// Deepest nesting the parser accepts; deeper input is a syntax error.
pub const MAX_DEPTH: usize = 100;
/// Longest string or list a repetition may produce.
pub const MAX_SEQUENCE_LEN: usize = 1 << 20;

/// Python truthiness.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Evaluate `source` against `context`; anything that fails yields `false`.
pub fn evaluate(source: &str, context: &Map<String, Value>) -> Value {
    evaluate_strict(source, context).unwrap_or(Value::Bool(false))
}

pub fn evaluate_strict(source: &str, context: &Map<String, Value>) -> ExprResult<Value> {
    let tokens = lex(source)?;
    let mut p = Parser { tokens, at: 0, depth: 0 };
    let expr = p.top()?;
    p.expect_end()?;
    eval(&expr, context)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(&'static str),
    End,
}

const OPS: &[&str] = &[
    "//", "==", "!=", "<=", ">=", "(", ")", "[", "]", "{", "}", ",", ":", "+", "-", "*", "/", "%", "<", ">",
];

fn lex(src: &str) -> ExprResult<Vec<(Tok, usize)>> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() { i += 1; continue; }
        let start = i;
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let (tok, next) = lex_number(&chars, i)?;
            out.push((tok, start));
            i = next;
        } else if c == '\'' || c == '"' {
            let (s, next) = lex_string(&chars, i, false)?;
            out.push((Tok::Str(s), start));
            i = next;
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') { i += 1; }
            let word: String = chars[start..i].iter().collect();
            let prefixed = matches!(word.as_str(), "u" | "U" | "r" | "R" | "b" | "B");
            if prefixed && matches!(chars.get(i), Some('\'') | Some('"')) {
                let (s, next) = lex_string(&chars, i, word.eq_ignore_ascii_case("r"))?;
                out.push((Tok::Str(s), start));
                i = next;
            } else {
                out.push((Tok::Name(word), start));
            }
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let Some(&op) = OPS.iter().find(|op| rest.starts_with(**op)) else {
                return Err(ExprError::Syntax { pos: i, message: format!("unexpected character '{}'", c) });
            };
            out.push((Tok::Op(op), start));
            i += op.chars().count();
        }
    }
    out.push((Tok::End, chars.len()));
    Ok(out)
}

fn lex_number(chars: &[char], mut i: usize) -> ExprResult<(Tok, usize)> {
    let start = i;
    let mut float = false;
    while i < chars.len() && chars[i].is_ascii_digit() { i += 1; }
    if chars.get(i) == Some(&'.') {
        float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() { i += 1; }
    }
    if matches!(chars.get(i), Some('e') | Some('E')) {
        float = true;
        i += 1;
        if matches!(chars.get(i), Some('+') | Some('-')) { i += 1; }
        while i < chars.len() && chars[i].is_ascii_digit() { i += 1; }
    }
    // python 2 long suffix
    let text: String = chars[start..i].iter().collect();
    if matches!(chars.get(i), Some('l') | Some('L')) && !float { i += 1; }
    let bad = || ExprError::Syntax { pos: start, message: format!("bad number '{}'", text) };
    let tok = if float {
        Tok::Float(text.parse().map_err(|_| bad())?)
    } else {
        Tok::Int(text.parse().map_err(|_| bad())?)
    };
    Ok((tok, i))
}

fn lex_string(chars: &[char], open: usize, raw: bool) -> ExprResult<(String, usize)> {
    let quote = chars[open];
    let mut s = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote { return Ok((s, i + 1)); }
        if c == '\\' && i + 1 < chars.len() {
            let e = chars[i + 1];
            if raw {
                s.push(c);
                s.push(e);
            } else {
                match e {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    '0' => s.push('\0'),
                    '\\' | '\'' | '"' => s.push(e),
                    other => { s.push('\\'); s.push(other); }
                }
            }
            i += 2;
            continue;
        }
        s.push(c);
        i += 1;
    }
    Err(ExprError::Syntax { pos: open, message: "unterminated string".into() })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp { Add, Sub, Mul, Div, FloorDiv, Mod }

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp { Eq, Ne, Lt, Le, Gt, Ge, In, NotIn }

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Lit(Value),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Neg(Box<Expr>),
    Pos(Box<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Cmp(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse { then: Box<Expr>, cond: Box<Expr>, other: Box<Expr> },
    Index(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<(Tok, usize)>,
    at: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Tok { &self.tokens[self.at.min(self.tokens.len() - 1)].0 }

    fn pos(&self) -> usize { self.tokens[self.at.min(self.tokens.len() - 1)].1 }

    fn bump(&mut self) -> Tok {
        let t = self.peek().clone();
        if self.at < self.tokens.len() - 1 { self.at += 1; }
        t
    }

    fn is_op(&self, op: &str) -> bool { matches!(self.peek(), Tok::Op(o) if *o == op) }

    fn is_word(&self, w: &str) -> bool { matches!(self.peek(), Tok::Name(n) if n == w) }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) { self.at += 1; true } else { false }
    }

    fn eat_word(&mut self, w: &str) -> bool {
        if self.is_word(w) { self.at += 1; true } else { false }
    }

    fn error<T>(&self, message: impl Into<String>) -> ExprResult<T> {
        Err(ExprError::Syntax { pos: self.pos(), message: message.into() })
    }

    fn expect_op(&mut self, op: &str) -> ExprResult<()> {
        if self.eat_op(op) { Ok(()) } else { self.error(format!("expected '{}'", op)) }
    }

    fn descend(&mut self) -> ExprResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH { return self.error("expression nested too deeply"); }
        Ok(())
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> ExprResult<T>) -> ExprResult<T> {
        self.descend()?;
        let r = f(self);
        self.depth -= 1;
        r
    }

    fn expect_end(&self) -> ExprResult<()> {
        if *self.peek() == Tok::End { Ok(()) } else { self.error("unexpected trailing input") }
    }

    // a bare `x, y` at top level is a tuple
    fn top(&mut self) -> ExprResult<Expr> {
        let first = self.conditional()?;
        if !self.is_op(",") { return Ok(first); }
        let mut items = vec![first];
        while self.eat_op(",") {
            if *self.peek() == Tok::End { break; }
            items.push(self.conditional()?);
        }
        Ok(Expr::List(items))
    }

    fn conditional(&mut self) -> ExprResult<Expr> { self.nested(Self::if_else) }

    fn if_else(&mut self) -> ExprResult<Expr> {
        let then = self.or()?;
        if !self.eat_word("if") { return Ok(then); }
        let cond = self.or()?;
        if !self.eat_word("else") { return self.error("expected 'else'"); }
        let other = self.conditional()?;
        Ok(Expr::IfElse { then: Box::new(then), cond: Box::new(cond), other: Box::new(other) })
    }

    fn or(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.and()?;
        let depth = self.depth;
        while self.eat_word("or") {
            self.descend()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn and(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.not()?;
        let depth = self.depth;
        while self.eat_word("and") {
            self.descend()?;
            lhs = Expr::And(Box::new(lhs), Box::new(self.not()?));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn not(&mut self) -> ExprResult<Expr> {
        if self.eat_word("not") { return self.nested(|p| Ok(Expr::Not(Box::new(p.not()?)))); }
        self.comparison()
    }

    fn cmp_op(&mut self) -> Option<CmpOp> {
        let tok = self.peek().clone();
        let op = match &tok {
            Tok::Op("==") => CmpOp::Eq,
            Tok::Op("!=") => CmpOp::Ne,
            Tok::Op("<") => CmpOp::Lt,
            Tok::Op("<=") => CmpOp::Le,
            Tok::Op(">") => CmpOp::Gt,
            Tok::Op(">=") => CmpOp::Ge,
            Tok::Name(n) if n == "in" => CmpOp::In,
            Tok::Name(n) if n == "is" => {
                self.at += 1;
                return Some(if self.eat_word("not") { CmpOp::Ne } else { CmpOp::Eq });
            }
            Tok::Name(n) if n == "not" && matches!(self.tokens.get(self.at + 1), Some((Tok::Name(m), _)) if m == "in") => {
                self.at += 2;
                return Some(CmpOp::NotIn);
            }
            _ => return None,
        };
        self.at += 1;
        Some(op)
    }

    fn comparison(&mut self) -> ExprResult<Expr> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.cmp_op() { rest.push((op, self.arith()?)); }
        if rest.is_empty() { Ok(first) } else { Ok(Expr::Cmp(Box::new(first), rest)) }
    }

    fn arith(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.term()?;
        let depth = self.depth;
        loop {
            let op = if self.eat_op("+") { BinOp::Add } else if self.eat_op("-") { BinOp::Sub } else { break };
            self.descend()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(self.term()?));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn term(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.unary()?;
        let depth = self.depth;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("//") {
                BinOp::FloorDiv
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                break;
            };
            self.descend()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(self.unary()?));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn unary(&mut self) -> ExprResult<Expr> {
        if self.eat_op("-") { return self.nested(|p| Ok(Expr::Neg(Box::new(p.unary()?)))); }
        if self.eat_op("+") { return self.nested(|p| Ok(Expr::Pos(Box::new(p.unary()?)))); }
        self.postfix()
    }

    fn postfix(&mut self) -> ExprResult<Expr> {
        let mut e = self.atom()?;
        let depth = self.depth;
        loop {
            if self.eat_op("[") {
                self.descend()?;
                let key = self.conditional()?;
                self.expect_op("]")?;
                e = Expr::Index(Box::new(e), Box::new(key));
            } else if self.is_op("(") {
                return self.error("function calls are not allowed");
            } else {
                self.depth = depth;
                return Ok(e);
            }
        }
    }

    fn sequence(&mut self, close: &str) -> ExprResult<(Vec<Expr>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        while !self.eat_op(close) {
            items.push(self.conditional()?);
            trailing_comma = self.eat_op(",");
            if !trailing_comma {
                self.expect_op(close)?;
                break;
            }
        }
        Ok((items, trailing_comma))
    }

    fn atom(&mut self) -> ExprResult<Expr> {
        let pos = self.pos();
        match self.bump() {
            Tok::Int(i) => Ok(Expr::Lit(Value::from(i))),
            Tok::Float(f) => Number::from_f64(f)
                .map(|n| Expr::Lit(Value::Number(n)))
                .ok_or(ExprError::Syntax { pos, message: "non-finite number".into() }),
            Tok::Str(mut s) => {
                // adjacent literals concatenate
                while let Tok::Str(next) = self.peek() {
                    s.push_str(next);
                    self.at += 1;
                }
                Ok(Expr::Lit(Value::String(s)))
            }
            Tok::Name(n) => match n.as_str() {
                "True" => Ok(Expr::Lit(Value::Bool(true))),
                "False" => Ok(Expr::Lit(Value::Bool(false))),
                "None" => Ok(Expr::Lit(Value::Null)),
                "and" | "or" | "not" | "in" | "if" | "else" | "is" | "lambda" => {
                    Err(ExprError::Syntax { pos, message: format!("unexpected keyword '{}'", n) })
                }
                _ => Ok(Expr::Name(n)),
            },
            Tok::Op("(") => {
                let (mut items, trailing) = self.sequence(")")?;
                if items.len() == 1 && !trailing { Ok(items.remove(0)) } else { Ok(Expr::List(items)) }
            }
            Tok::Op("[") => Ok(Expr::List(self.sequence("]")?.0)),
            Tok::Op("{") => {
                let mut pairs = Vec::new();
                while !self.eat_op("}") {
                    let k = self.conditional()?;
                    self.expect_op(":")?;
                    let v = self.conditional()?;
                    pairs.push((k, v));
                    if !self.eat_op(",") {
                        self.expect_op("}")?;
                        break;
                    }
                }
                Ok(Expr::Dict(pairs))
            }
            Tok::End => Err(ExprError::Syntax { pos, message: "unexpected end of expression".into() }),
            Tok::Op(op) => Err(ExprError::Syntax { pos, message: format!("unexpected '{}'", op) }),
        }
    }
}

fn eval(e: &Expr, ctx: &Map<String, Value>) -> ExprResult<Value> {
    match e {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Name(n) => ctx.get(n).cloned().ok_or_else(|| ExprError::UnknownName(n.clone())),
        Expr::List(items) => items.iter().map(|i| eval(i, ctx)).collect::<ExprResult<Vec<_>>>().map(Value::Array),
        Expr::Dict(pairs) => {
            let mut map = Map::new();
            for (k, v) in pairs {
                map.insert(dict_key(&eval(k, ctx)?)?, eval(v, ctx)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Neg(x) => match num(&eval(x, ctx)?)? {
            Num::I(i) => i.checked_neg().map(Value::from).ok_or(ExprError::Overflow),
            Num::F(f) => float(-f),
        },
        Expr::Pos(x) => num(&eval(x, ctx)?)?.into_value(),
        Expr::Not(x) => Ok(Value::Bool(!truthy(&eval(x, ctx)?))),
        Expr::And(a, b) => {
            let l = eval(a, ctx)?;
            if truthy(&l) { eval(b, ctx) } else { Ok(l) }
        }
        Expr::Or(a, b) => {
            let l = eval(a, ctx)?;
            if truthy(&l) { Ok(l) } else { eval(b, ctx) }
        }
        Expr::IfElse { then, cond, other } => {
            if truthy(&eval(cond, ctx)?) { eval(then, ctx) } else { eval(other, ctx) }
        }
        Expr::Bin(op, a, b) => binary(*op, eval(a, ctx)?, eval(b, ctx)?),
        Expr::Cmp(first, rest) => {
            let mut lhs = eval(first, ctx)?;
            for (op, e) in rest {
                let rhs = eval(e, ctx)?;
                if !compare(*op, &lhs, &rhs)? { return Ok(Value::Bool(false)); }
                lhs = rhs;
            }
            Ok(Value::Bool(true))
        }
        Expr::Index(base, key) => index(eval(base, ctx)?, &eval(key, ctx)?),
    }
}

fn dict_key(k: &Value) -> ExprResult<String> {
    match k {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "True" } else { "False" }.to_string()),
        other => Err(ExprError::Type(format!("unhashable key {}", other))),
    }
}

fn index(base: Value, key: &Value) -> ExprResult<Value> {
    match base {
        Value::Object(mut map) => {
            let k = dict_key(key)?;
            map.remove(&k).ok_or(ExprError::MissingKey(k))
        }
        Value::Array(mut items) => {
            let i = position(key, items.len())?;
            Ok(items.swap_remove(i))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = position(key, chars.len())?;
            Ok(Value::String(chars[i].to_string()))
        }
        other => Err(ExprError::Type(format!("{} is not subscriptable", type_name(&other)))),
    }
}

fn position(key: &Value, len: usize) -> ExprResult<usize> {
    let Some(i) = key.as_i64() else {
        return Err(ExprError::Type(format!("indices must be integers, not {}", type_name(key))));
    };
    let resolved = if i < 0 { len as i64 + i } else { i };
    if resolved < 0 || resolved >= len as i64 { return Err(ExprError::MissingKey(i.to_string())); }
    Ok(resolved as usize)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[derive(Debug, Clone, Copy)]
enum Num { I(i64), F(f64) }

impl Num {
    fn f(self) -> f64 {
        match self { Num::I(i) => i as f64, Num::F(f) => f }
    }

    fn into_value(self) -> ExprResult<Value> {
        match self { Num::I(i) => Ok(Value::from(i)), Num::F(f) => float(f) }
    }
}

fn num(v: &Value) -> ExprResult<Num> {
    match v {
        Value::Bool(b) => Ok(Num::I(*b as i64)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Num::I(i)),
            None => n.as_f64().map(Num::F).ok_or(ExprError::Overflow),
        },
        other => Err(ExprError::Type(format!("expected a number, got {}", type_name(other)))),
    }
}

fn float(f: f64) -> ExprResult<Value> { Number::from_f64(f).map(Value::Number).ok_or(ExprError::Overflow) }

fn repeat<T: Clone>(items: &[T], times: &Value) -> ExprResult<Vec<T>> {
    let n = match times {
        Value::Bool(b) => *b as i64,
        other => other.as_i64().ok_or_else(|| ExprError::Type("can only repeat by an integer".into()))?,
    };
    let n = usize::try_from(n.max(0)).map_err(|_| ExprError::Overflow)?;
    let len = items.len().checked_mul(n).filter(|&len| len <= MAX_SEQUENCE_LEN).ok_or(ExprError::Overflow)?;
    Ok(items.iter().cloned().cycle().take(len).collect())
}

fn binary(op: BinOp, a: Value, b: Value) -> ExprResult<Value> {
    match (op, &a, &b) {
        (BinOp::Add, Value::String(x), Value::String(y)) => return Ok(Value::String(format!("{}{}", x, y))),
        (BinOp::Add, Value::Array(x), Value::Array(y)) => return Ok(Value::Array(x.iter().chain(y).cloned().collect())),
        (BinOp::Mul, Value::String(s), n) | (BinOp::Mul, n, Value::String(s)) => {
            let chars: Vec<char> = s.chars().collect();
            return Ok(Value::String(repeat(&chars, n)?.into_iter().collect()));
        }
        (BinOp::Mul, Value::Array(items), n) | (BinOp::Mul, n, Value::Array(items)) => {
            return Ok(Value::Array(repeat(items, n)?));
        }
        _ => {}
    }
    let (x, y) = (num(&a)?, num(&b)?);
    match (op, x, y) {
        (BinOp::Add, Num::I(i), Num::I(j)) => i.checked_add(j).map(Value::from).ok_or(ExprError::Overflow),
        (BinOp::Sub, Num::I(i), Num::I(j)) => i.checked_sub(j).map(Value::from).ok_or(ExprError::Overflow),
        (BinOp::Mul, Num::I(i), Num::I(j)) => i.checked_mul(j).map(Value::from).ok_or(ExprError::Overflow),
        (BinOp::Add, ..) => float(x.f() + y.f()),
        (BinOp::Sub, ..) => float(x.f() - y.f()),
        (BinOp::Mul, ..) => float(x.f() * y.f()),
        (BinOp::Div, ..) => {
            if y.f() == 0.0 { return Err(ExprError::DivisionByZero); }
            float(x.f() / y.f())
        }
        (BinOp::FloorDiv, Num::I(i), Num::I(j)) => {
            if j == 0 { return Err(ExprError::DivisionByZero); }
            let q = i.checked_div(j).ok_or(ExprError::Overflow)?;
            Ok(Value::from(if (i % j != 0) && ((i < 0) != (j < 0)) { q - 1 } else { q }))
        }
        (BinOp::FloorDiv, ..) => {
            if y.f() == 0.0 { return Err(ExprError::DivisionByZero); }
            float((x.f() / y.f()).floor())
        }
        (BinOp::Mod, Num::I(i), Num::I(j)) => {
            if j == 0 { return Err(ExprError::DivisionByZero); }
            let r = i.checked_rem(j).ok_or(ExprError::Overflow)?;
            Ok(Value::from(if r != 0 && ((r < 0) != (j < 0)) { r + j } else { r }))
        }
        (BinOp::Mod, ..) => {
            if y.f() == 0.0 { return Err(ExprError::DivisionByZero); }
            let r = x.f() % y.f();
            float(if r != 0.0 && ((r < 0.0) != (y.f() < 0.0)) { r + y.f() } else { r })
        }
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_) | Value::Bool(_), Value::Number(_) | Value::Bool(_)) => match (num(a), num(b)) {
            (Ok(Num::I(i)), Ok(Num::I(j))) => i == j,
            (Ok(x), Ok(y)) => x.f() == y.f(),
            _ => false,
        },
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(p, q)| equal(p, q)),
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> ExprResult<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (p, q) in x.iter().zip(y) {
                if !equal(p, q) { return order(p, q); }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => {
            let (x, y) = (num(a)?, num(b)?);
            match (x, y) {
                (Num::I(i), Num::I(j)) => Ok(i.cmp(&j)),
                _ => x.f().partial_cmp(&y.f()).ok_or(ExprError::Type("unordered numbers".into())),
            }
        }
    }
}

fn contains(haystack: &Value, needle: &Value) -> ExprResult<bool> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|i| equal(i, needle))),
        Value::Object(map) => Ok(map.contains_key(&dict_key(needle)?)),
        Value::String(s) => match needle {
            Value::String(n) => Ok(s.contains(n.as_str())),
            other => Err(ExprError::Type(format!("'in <string>' requires a string, not {}", type_name(other)))),
        },
        other => Err(ExprError::Type(format!("argument of type {} is not iterable", type_name(other)))),
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> ExprResult<bool> {
    Ok(match op {
        CmpOp::Eq => equal(a, b),
        CmpOp::Ne => !equal(a, b),
        CmpOp::Lt => order(a, b)? == Ordering::Less,
        CmpOp::Le => order(a, b)? != Ordering::Greater,
        CmpOp::Gt => order(a, b)? == Ordering::Greater,
        CmpOp::Ge => order(a, b)? != Ordering::Less,
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
    })
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod expr_tests;
