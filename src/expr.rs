//! Sandboxed expression language for row filters and capacity expressions.
//!
//! Sources such as `"tract_id == 7 and num_workers > 2"` or
//! `"parcel_sqft / 500"` are tokenized, parsed into a small AST and lowered
//! into a Polars [`Expr`]. Only arithmetic, comparison, membership and
//! boolean operators over named columns and literals are accepted; there is
//! no way to call functions or reach anything outside the frame.
use polars::prelude::*;

// ── Tokens ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                let exponent_sign = (ch == '+' || ch == '-') && word.ends_with(['e', 'E']);
                if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exponent_sign {
                    word.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            let is_float = word.contains(['.', 'e', 'E']);
            let token = if is_float {
                word.parse::<f64>().map(Token::Float)
            } else {
                match word.parse::<i64>() {
                    Ok(i) => Ok(Token::Int(i)),
                    Err(_) => word.parse::<f64>().map(Token::Float),
                }
            };
            tokens.push(token.map_err(|_| format!("invalid number literal '{word}'"))?);
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    word.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(match word.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                "True" | "true" => Token::True,
                "False" | "false" => Token::False,
                _ => Token::Ident(word),
            });
            continue;
        }

        if c == '`' {
            chars.next();
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some('`') => break,
                    Some(ch) => name.push(ch),
                    None => return Err(format!("unterminated quoted name `{name}")),
                }
            }
            tokens.push(Token::Ident(name));
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => s.push(escaped),
                        None => return Err("unterminated string literal".into()),
                    },
                    Some(ch) if ch == quote => break,
                    Some(ch) => s.push(ch),
                    None => return Err("unterminated string literal".into()),
                }
            }
            tokens.push(Token::Str(s));
            continue;
        }

        chars.next();
        let next_is_eq = chars.peek() == Some(&'=');
        let token = match c {
            '=' if next_is_eq => {
                chars.next();
                Token::Eq
            }
            '=' => return Err("unexpected '=', use '==' for comparison".into()),
            '!' if next_is_eq => {
                chars.next();
                Token::Ne
            }
            '<' if next_is_eq => {
                chars.next();
                Token::Le
            }
            '>' if next_is_eq => {
                chars.next();
                Token::Ge
            }
            '<' => Token::Lt,
            '>' => Token::Gt,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '&' => Token::And,
            '|' => Token::Or,
            '~' => Token::Not,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            other => return Err(format!("unexpected character '{other}'")),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

// ── AST ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Column(String),
    Literal(Literal),
    Neg(Box<Node>),
    Not(Box<Node>),
    Arith {
        op: ArithOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Compare {
        op: CmpOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    In {
        value: Box<Node>,
        list: Vec<Literal>,
        negated: bool,
    },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

// ── Recursive descent parser ────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            Some(t) => Err(format!("expected {expected:?}, got {t:?}")),
            None => Err(format!("expected {expected:?}, got end of input")),
        }
    }

    fn parse(&mut self) -> Result<Node, String> {
        if self.tokens.is_empty() {
            return Err("empty expression".into());
        }
        let node = self.parse_or()?;
        if let Some(t) = self.peek() {
            return Err(format!("unexpected token {t:?}"));
        }
        Ok(node)
    }

    fn parse_or(&mut self) -> Result<Node, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, String> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Node, String> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node, String> {
        let left = self.parse_additive()?;

        let node = if let Some(op) = self.peek().and_then(cmp_op) {
            self.advance();
            let right = self.parse_additive()?;
            Node::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }
        } else if self.peek() == Some(&Token::In) {
            self.advance();
            Node::In {
                value: Box::new(left),
                list: self.parse_list()?,
                negated: false,
            }
        } else if self.peek() == Some(&Token::Not) && self.peek_at(1) == Some(&Token::In) {
            self.advance();
            self.advance();
            Node::In {
                value: Box::new(left),
                list: self.parse_list()?,
                negated: true,
            }
        } else {
            return Ok(left);
        };

        let chained = self.peek().and_then(cmp_op).is_some() || self.peek() == Some(&Token::In);
        if chained {
            return Err("chained comparisons are not supported, combine them with 'and'".into());
        }
        Ok(node)
    }

    fn parse_additive(&mut self) -> Result<Node, String> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Node::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Node, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                Some(Token::Percent) => ArithOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Node::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Node, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(match self.parse_unary()? {
                    Node::Literal(Literal::Int(i)) => Node::Literal(Literal::Int(-i)),
                    Node::Literal(Literal::Float(f)) => Node::Literal(Literal::Float(-f)),
                    other => Node::Neg(Box::new(other)),
                })
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Node, String> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => Ok(Node::Column(name)),
            Some(t) => match literal(&t) {
                Some(lit) => Ok(Node::Literal(lit)),
                None => Err(format!("unexpected token {t:?}")),
            },
            None => Err("unexpected end of input".into()),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Literal>, String> {
        let close = match self.advance() {
            Some(Token::LBracket) => Token::RBracket,
            Some(Token::LParen) => Token::RParen,
            Some(t) => return Err(format!("expected a list after 'in', got {t:?}")),
            None => return Err("expected a list after 'in'".into()),
        };

        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&close) {
                self.advance();
                return Ok(items);
            }
            let negative = self.peek() == Some(&Token::Minus);
            if negative {
                self.advance();
            }
            let item = match (self.advance(), negative) {
                (Some(Token::Int(i)), true) => Literal::Int(-i),
                (Some(Token::Float(f)), true) => Literal::Float(-f),
                (Some(t), false) => {
                    literal(&t).ok_or_else(|| format!("list items must be literals, got {t:?}"))?
                }
                (Some(t), true) => return Err(format!("cannot negate {t:?}")),
                (None, _) => return Err("unterminated list".into()),
            };
            items.push(item);

            match self.advance() {
                Some(Token::Comma) => {}
                Some(ref t) if *t == close => return Ok(items),
                Some(t) => return Err(format!("expected ',' in list, got {t:?}")),
                None => return Err("unterminated list".into()),
            }
        }
    }
}

fn cmp_op(token: &Token) -> Option<CmpOp> {
    match token {
        Token::Eq => Some(CmpOp::Eq),
        Token::Ne => Some(CmpOp::Ne),
        Token::Lt => Some(CmpOp::Lt),
        Token::Le => Some(CmpOp::Le),
        Token::Gt => Some(CmpOp::Gt),
        Token::Ge => Some(CmpOp::Ge),
        _ => None,
    }
}

fn literal(token: &Token) -> Option<Literal> {
    match token {
        Token::Int(i) => Some(Literal::Int(*i)),
        Token::Float(f) => Some(Literal::Float(*f)),
        Token::Str(s) => Some(Literal::Str(s.clone())),
        Token::True => Some(Literal::Bool(true)),
        Token::False => Some(Literal::Bool(false)),
        _ => None,
    }
}

/// Parse an expression source into its AST without resolving columns.
pub fn parse(source: &str) -> Result<Node, String> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.parse()
}

// ── Lowering to Polars ──────────────────────────────────────────────────────

/// Parse `source` and lower it to a Polars expression over `schema`.
///
/// Every identifier must name a column of `schema`.
pub fn compile(source: &str, schema: &Schema) -> Result<Expr, String> {
    let node = parse(source)?;
    lower(&node, schema)
}

fn lower(node: &Node, schema: &Schema) -> Result<Expr, String> {
    let expr = match node {
        Node::Column(name) => {
            if schema.get(name.as_str()).is_none() {
                return Err(format!("unknown column '{name}'"));
            }
            col(name.as_str())
        }
        Node::Literal(Literal::Int(i)) => lit(*i),
        Node::Literal(Literal::Float(f)) => lit(*f),
        Node::Literal(Literal::Str(s)) => lit(s.clone()),
        Node::Literal(Literal::Bool(b)) => lit(*b),
        Node::Neg(inner) => lit(0i64) - lower(inner, schema)?,
        Node::Not(inner) => lower(inner, schema)?.not(),
        Node::And(l, r) => lower(l, schema)?.and(lower(r, schema)?),
        Node::Or(l, r) => lower(l, schema)?.or(lower(r, schema)?),
        Node::Arith { op, left, right } => {
            let l = lower(left, schema)?;
            let r = lower(right, schema)?;
            match op {
                ArithOp::Add => l + r,
                ArithOp::Sub => l - r,
                ArithOp::Mul => l * r,
                ArithOp::Div => l.cast(DataType::Float64) / r.cast(DataType::Float64),
                ArithOp::Rem => l % r,
            }
        }
        Node::Compare { op, left, right } => {
            let l = lower(left, schema)?;
            let r = lower(right, schema)?;
            match op {
                CmpOp::Eq => l.eq(r),
                CmpOp::Ne => l.neq(r),
                CmpOp::Lt => l.lt(r),
                CmpOp::Le => l.lt_eq(r),
                CmpOp::Gt => l.gt(r),
                CmpOp::Ge => l.gt_eq(r),
            }
        }
        Node::In {
            value,
            list,
            negated,
        } => {
            let mut values = list_series(list)?;
            if let Node::Column(name) = value.as_ref() {
                if let Some(dtype) = schema.get(name.as_str()) {
                    values = values.cast(dtype).map_err(|e| e.to_string())?;
                }
            }
            let membership = lower(value, schema)?.is_in(lit(values), false);
            if *negated {
                membership.not()
            } else {
                membership
            }
        }
    };
    Ok(expr)
}

fn list_series(list: &[Literal]) -> Result<Series, String> {
    let name = PlSmallStr::from_static("values");
    if list.iter().all(|l| matches!(l, Literal::Str(_))) {
        let values: Vec<&str> = list
            .iter()
            .filter_map(|l| match l {
                Literal::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        return Ok(Series::new(name, values));
    }
    if list.iter().all(|l| matches!(l, Literal::Bool(_))) {
        let values: Vec<bool> = list
            .iter()
            .filter_map(|l| match l {
                Literal::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        return Ok(Series::new(name, values));
    }
    if list.iter().all(|l| matches!(l, Literal::Int(_))) {
        let values: Vec<i64> = list
            .iter()
            .filter_map(|l| match l {
                Literal::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        return Ok(Series::new(name, values));
    }
    let values = list
        .iter()
        .map(|l| match l {
            Literal::Int(i) => Ok(*i as f64),
            Literal::Float(f) => Ok(*f),
            other => Err(format!("list mixes numbers with {other:?}")),
        })
        .collect::<Result<Vec<f64>, String>>()?;
    Ok(Series::new(name, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "zone_id" => [1i64, 2, 1, 3],
            "kind" => ["a", "b", "c", "a"],
            "parcel_sqft" => [1000.0, 250.0, 500.0, 0.0],
        )
        .unwrap()
    }

    fn eval_mask(source: &str) -> Vec<Option<bool>> {
        let df = frame();
        let expr = compile(source, df.schema()).unwrap();
        let out = df.lazy().select([expr.alias("m")]).collect().unwrap();
        out.column("m").unwrap().bool().unwrap().into_iter().collect()
    }

    #[test]
    fn precedence_binds_and_tighter_than_or() {
        let node = parse("a == 1 or b == 2 and c == 3").unwrap();
        match node {
            Node::Or(_, right) => assert!(matches!(*right, Node::And(_, _))),
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn arithmetic_binds_tighter_than_comparison() {
        let node = parse("a + 2 * b > 10").unwrap();
        let Node::Compare { op, left, .. } = node else {
            panic!("expected comparison");
        };
        assert_eq!(op, CmpOp::Gt);
        assert!(matches!(
            *left,
            Node::Arith {
                op: ArithOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(parse("-3").unwrap(), Node::Literal(Literal::Int(-3)));
        assert_eq!(parse("-2.5").unwrap(), Node::Literal(Literal::Float(-2.5)));
    }

    #[test]
    fn rejects_bad_sources() {
        assert!(parse("").is_err());
        assert!(parse("a = 1").is_err());
        assert!(parse("a < b < c").is_err());
        assert!(parse("kind == 'open").is_err());
        assert!(parse("(a == 1").is_err());
        assert!(parse("a == 1 )").is_err());
        assert!(parse("__import__('os')").is_err());
    }

    #[test]
    fn unknown_column_fails_to_compile() {
        let df = frame();
        let err = compile("missing > 1", df.schema()).unwrap_err();
        assert!(err.contains("missing"));
    }

    #[test]
    fn evaluates_comparisons_and_boolean_ops() {
        assert_eq!(
            eval_mask("zone_id == 1 and parcel_sqft > 600"),
            vec![Some(true), Some(false), Some(false), Some(false)]
        );
        assert_eq!(
            eval_mask("kind == 'b' | zone_id == 3"),
            vec![Some(false), Some(true), Some(false), Some(true)]
        );
        assert_eq!(
            eval_mask("not zone_id == 1"),
            vec![Some(false), Some(true), Some(false), Some(true)]
        );
    }

    #[test]
    fn evaluates_membership() {
        assert_eq!(
            eval_mask("kind in ['a', 'c']"),
            vec![Some(true), Some(false), Some(true), Some(true)]
        );
        assert_eq!(
            eval_mask("zone_id not in (1, 3)"),
            vec![Some(false), Some(true), Some(false), Some(false)]
        );
    }

    #[test]
    fn division_is_floating_point() {
        let df = df!("units" => [5i64, 3]).unwrap();
        let expr = compile("units / 2", df.schema()).unwrap();
        let out = df.lazy().select([expr.alias("v")]).collect().unwrap();
        let values: Vec<Option<f64>> = out.column("v").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(2.5), Some(1.5)]);
    }

    #[test]
    fn backtick_names_reach_columns_with_spaces() {
        let df = df!("floor area" => [10.0, 20.0]).unwrap();
        assert!(compile("`floor area` > 15", df.schema()).is_ok());
    }
}
