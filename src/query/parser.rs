//! Hand-rolled tokenizer and recursive-descent parser for the query
//! language. Verbs and clause keywords are case-insensitive; variables,
//! property keys, and labels are case-sensitive.

use crate::error::{Result, TrellisError};
use crate::model::{PropMap, PropValue};
use crate::traverse::Direction;

use super::ast::{
    BoolExpr, CmpOp, Comparison, MatchQuery, NodePattern, Pattern, Query, RelPattern,
};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Dash,
    Arrow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier '{s}'"),
            Token::Str(_) => "string literal".into(),
            Token::Int(i) => format!("integer {i}"),
            Token::Float(f) => format!("float {f}"),
            other => format!("'{}'", match other {
                Token::LParen => "(",
                Token::RParen => ")",
                Token::LBrace => "{",
                Token::RBrace => "}",
                Token::LBracket => "[",
                Token::RBracket => "]",
                Token::Comma => ",",
                Token::Colon => ":",
                Token::Dot => ".",
                Token::Dash => "-",
                Token::Arrow => "->",
                Token::Eq => "=",
                Token::Ne => "!=",
                Token::Lt => "<",
                Token::Le => "<=",
                Token::Gt => ">",
                Token::Ge => ">=",
                _ => unreachable!(),
            }),
        }
    }
}

fn syntax(msg: impl Into<String>) -> TrellisError {
    TrellisError::InvalidQuerySyntax(msg.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '{' => {
                chars.next();
                tokens.push(Token::LBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::RBrace);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(syntax("expected '=' after '!'"));
                }
                tokens.push(Token::Ne);
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '-' => {
                chars.next();
                if chars.next_if_eq(&'>').is_some() {
                    tokens.push(Token::Arrow);
                } else {
                    tokens.push(Token::Dash);
                }
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => value.push('"'),
                            Some('\\') => value.push('\\'),
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some(other) => {
                                return Err(syntax(format!("unknown escape '\\{other}'")))
                            }
                            None => return Err(syntax("unterminated string literal")),
                        },
                        Some(other) => value.push(other),
                        None => return Err(syntax("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                let mut is_float = false;
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        chars.next();
                    } else if d == '.' && !is_float {
                        // Only consume the dot when a digit follows; `1.x`
                        // is a projection, not a float.
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        if lookahead.peek().is_some_and(|n| n.is_ascii_digit()) {
                            is_float = true;
                            text.push('.');
                            chars.next();
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                if is_float {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| syntax(format!("bad float literal '{text}'")))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| syntax(format!("bad integer literal '{text}'")))?;
                    tokens.push(Token::Int(value));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(text));
            }
            other => return Err(syntax(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn parse(input: &str) -> Result<Query> {
        let mut parser = Parser {
            tokens: tokenize(input)?,
            pos: 0,
        };
        let query = parser.parse_query()?;
        if let Some(extra) = parser.peek() {
            return Err(syntax(format!("unexpected trailing {}", extra.describe())));
        }
        Ok(query)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| syntax("unexpected end of query"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let token = self.next()?;
        if token != expected {
            return Err(syntax(format!(
                "expected {} but found {}",
                expected.describe(),
                token.describe()
            )));
        }
        Ok(())
    }

    fn ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(syntax(format!("expected identifier, found {}", other.describe()))),
        }
    }

    /// Case-insensitive keyword check without consuming.
    fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(word))
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.peek_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn int(&mut self) -> Result<u64> {
        match self.next()? {
            Token::Int(value) if value >= 0 => Ok(value as u64),
            other => Err(syntax(format!(
                "expected non-negative integer, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_query(&mut self) -> Result<Query> {
        let verb = match self.next()? {
            Token::Ident(word) => word,
            other => return Err(syntax(format!("query must start with a verb, found {}", other.describe()))),
        };
        match verb.to_ascii_uppercase().as_str() {
            "MATCH" => self.parse_match(),
            "CREATE" => self.parse_create(),
            "FIND" => self.parse_find(),
            "TRAVERSE" => self.parse_traverse(),
            "PATH" => self.parse_path(),
            "SHOW" => {
                if self.eat_keyword("STATS") {
                    Ok(Query::ShowStats)
                } else {
                    Err(syntax("SHOW supports only STATS"))
                }
            }
            "VISUALIZE" => Ok(Query::Visualize),
            other => Err(syntax(format!("unknown query verb '{other}'"))),
        }
    }

    fn parse_match(&mut self) -> Result<Query> {
        self.expect(Token::LParen)?;
        let left = self.parse_node_pattern()?;
        self.expect(Token::RParen)?;

        let pattern = if matches!(self.peek(), Some(Token::Dash)) {
            self.next()?;
            self.expect(Token::LBracket)?;
            let rel = self.parse_rel_pattern()?;
            self.expect(Token::RBracket)?;
            self.expect(Token::Arrow)?;
            self.expect(Token::LParen)?;
            let right = self.parse_node_pattern()?;
            self.expect(Token::RParen)?;
            Pattern::Edge { left, rel, right }
        } else {
            Pattern::Node(left)
        };

        let predicate = if self.eat_keyword("WHERE") {
            Some(self.parse_or_expr()?)
        } else {
            None
        };

        let mut returns = Vec::new();
        if self.eat_keyword("RETURN") {
            returns.push(self.ident()?);
            while matches!(self.peek(), Some(Token::Comma)) {
                self.next()?;
                returns.push(self.ident()?);
            }
        }

        Ok(Query::Match(MatchQuery {
            pattern,
            predicate,
            returns,
        }))
    }

    fn parse_node_pattern(&mut self) -> Result<NodePattern> {
        let var = self.ident()?;
        let props = if matches!(self.peek(), Some(Token::LBrace)) {
            self.parse_props()?
        } else {
            PropMap::new()
        };
        Ok(NodePattern { var, props })
    }

    fn parse_rel_pattern(&mut self) -> Result<RelPattern> {
        let mut rel = RelPattern::default();
        if let Some(Token::Ident(_)) = self.peek() {
            rel.var = Some(self.ident()?);
        }
        if matches!(self.peek(), Some(Token::Colon)) {
            self.next()?;
            rel.label = Some(self.ident()?);
        }
        if matches!(self.peek(), Some(Token::LBrace)) {
            rel.props = self.parse_props()?;
        }
        Ok(rel)
    }

    fn parse_props(&mut self) -> Result<PropMap> {
        self.expect(Token::LBrace)?;
        let mut props = PropMap::new();
        if matches!(self.peek(), Some(Token::RBrace)) {
            self.next()?;
            return Ok(props);
        }
        loop {
            let key = self.ident()?;
            self.expect(Token::Colon)?;
            let value = self.parse_value()?;
            props.insert(key, value);
            match self.next()? {
                Token::Comma => continue,
                Token::RBrace => break,
                other => {
                    return Err(syntax(format!(
                        "expected ',' or '}}' in property map, found {}",
                        other.describe()
                    )))
                }
            }
        }
        Ok(props)
    }

    fn parse_value(&mut self) -> Result<PropValue> {
        match self.next()? {
            Token::Str(s) => Ok(PropValue::Str(s)),
            Token::Int(i) => Ok(PropValue::Int(i)),
            Token::Float(f) => Ok(PropValue::Float(f)),
            Token::Dash => match self.next()? {
                Token::Int(i) => Ok(PropValue::Int(-i)),
                Token::Float(f) => Ok(PropValue::Float(-f)),
                other => Err(syntax(format!(
                    "expected number after '-', found {}",
                    other.describe()
                ))),
            },
            Token::Colon => Ok(PropValue::Symbol(self.ident()?)),
            Token::Ident(word) if word.eq_ignore_ascii_case("true") => Ok(PropValue::Bool(true)),
            Token::Ident(word) if word.eq_ignore_ascii_case("false") => Ok(PropValue::Bool(false)),
            Token::LBracket => {
                let mut items = Vec::new();
                if matches!(self.peek(), Some(Token::RBracket)) {
                    self.next()?;
                    return Ok(PropValue::List(items));
                }
                loop {
                    items.push(self.parse_value()?);
                    match self.next()? {
                        Token::Comma => continue,
                        Token::RBracket => break,
                        other => {
                            return Err(syntax(format!(
                                "expected ',' or ']' in list, found {}",
                                other.describe()
                            )))
                        }
                    }
                }
                Ok(PropValue::List(items))
            }
            other => Err(syntax(format!("expected literal value, found {}", other.describe()))),
        }
    }

    fn parse_or_expr(&mut self) -> Result<BoolExpr> {
        let mut left = self.parse_and_expr()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and_expr()?;
            left = BoolExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<BoolExpr> {
        let mut left = self.parse_comparison()?;
        while self.eat_keyword("AND") {
            let right = self.parse_comparison()?;
            left = BoolExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<BoolExpr> {
        let var = self.ident()?;
        self.expect(Token::Dot)?;
        let prop = self.ident()?;
        let op = match self.next()? {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            other => {
                return Err(syntax(format!(
                    "expected comparison operator, found {}",
                    other.describe()
                )))
            }
        };
        let value = self.parse_value()?;
        Ok(BoolExpr::Cmp(Comparison {
            var,
            prop,
            op,
            value,
        }))
    }

    fn parse_create(&mut self) -> Result<Query> {
        self.expect(Token::LParen)?;
        match self.peek() {
            Some(Token::Int(_)) => {
                let from = self.int()?;
                self.expect(Token::RParen)?;
                self.expect(Token::Dash)?;
                self.expect(Token::LBracket)?;
                self.expect(Token::Colon)?;
                let label = self.ident()?;
                let props = if matches!(self.peek(), Some(Token::LBrace)) {
                    self.parse_props()?
                } else {
                    PropMap::new()
                };
                self.expect(Token::RBracket)?;
                self.expect(Token::Arrow)?;
                self.expect(Token::LParen)?;
                let to = self.int()?;
                self.expect(Token::RParen)?;
                Ok(Query::CreateEdge {
                    from,
                    to,
                    label,
                    props,
                })
            }
            _ => {
                let _var = self.ident()?;
                let props = if matches!(self.peek(), Some(Token::LBrace)) {
                    self.parse_props()?
                } else {
                    PropMap::new()
                };
                self.expect(Token::RParen)?;
                Ok(Query::CreateNode { props })
            }
        }
    }

    fn parse_find(&mut self) -> Result<Query> {
        if self.eat_keyword("NODES") {
            let key = self.ident()?;
            // Bare words are accepted as string values here for CLI comfort.
            let value = match self.peek() {
                Some(Token::Ident(word))
                    if !word.eq_ignore_ascii_case("true")
                        && !word.eq_ignore_ascii_case("false") =>
                {
                    let word = self.ident()?;
                    PropValue::Str(word)
                }
                _ => self.parse_value()?,
            };
            Ok(Query::FindNodes { key, value })
        } else if self.eat_keyword("EDGES") {
            let label = self.ident()?;
            Ok(Query::FindEdges { label })
        } else {
            Err(syntax("FIND requires NODES or EDGES"))
        }
    }

    fn parse_traverse(&mut self) -> Result<Query> {
        let start = self.int()?;
        let depth = if matches!(self.peek(), Some(Token::Int(_))) {
            self.int()? as u32
        } else {
            1
        };
        let direction = if self.eat_keyword("IN") {
            Direction::In
        } else if self.eat_keyword("BOTH") {
            Direction::Both
        } else {
            self.eat_keyword("OUT");
            Direction::Out
        };
        Ok(Query::Traverse {
            start,
            direction,
            depth,
        })
    }

    fn parse_path(&mut self) -> Result<Query> {
        let from = self.int()?;
        let to = self.int()?;
        let max_depth = if matches!(self.peek(), Some(Token::Int(_))) {
            self.int()? as u32
        } else {
            crate::traverse::MAX_DEPTH
        };
        Ok(Query::Path {
            from,
            to,
            max_depth,
        })
    }
}
