//! Boolean label expressions compiled into RCSB search query trees
//!
//! ```text
//! expr  := expr '&' term | expr '|' term | term
//! term  := NAME | '(' expr ')'
//! NAME  := [A-Za-z0-9_]+
//! ```
//!
//! `&` and `|` share one precedence tier and fold left to right, so
//! `A & B | C` and `(A & B) | C` compile to the same tree. Parentheses are the
//! only way to change the grouping. Each fold step yields a binary node:
//! `A & B & C` is `and[and[A, B], C]`.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Search service used for every terminal node
pub const TERMINAL_SERVICE: &str = "text";

/// Errors raised while compiling an expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unknown label '{0}' in expression: no matching parameters")]
    UnknownLabel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => f.write_str("and"),
            LogicalOperator::Or => f.write_str("or"),
        }
    }
}

/// Parsed expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Var(String),
    Op {
        operator: LogicalOperator,
        children: Vec<Expr>,
    },
}

/// Search query tree, serialized verbatim into the search request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryNode {
    Terminal {
        service: String,
        parameters: Value,
    },
    Group {
        logical_operator: LogicalOperator,
        nodes: Vec<QueryNode>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    And,
    Or,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => write!(f, "'{name}'"),
            Token::And => f.write_str("'&'"),
            Token::Or => f.write_str("'|'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

fn syntax(position: usize, message: impl Into<String>) -> QueryError {
    QueryError::Syntax {
        position,
        message: message.into(),
    }
}

/// Split an expression into `(byte offset, token)` pairs.
fn tokenize(expression: &str) -> Result<Vec<(usize, Token)>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '&' => tokens.push((idx, Token::And)),
            '|' => tokens.push((idx, Token::Or)),
            '(' => tokens.push((idx, Token::LParen)),
            ')' => tokens.push((idx, Token::RParen)),
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut name = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((idx, Token::Name(name)));
            }
            other => return Err(syntax(idx, format!("invalid character '{other}'"))),
        }
    }

    Ok(tokens)
}

/// Deepest parenthesis nesting a query may use
const MAX_NESTING: usize = 256;

/// Most `&`/`|` operators in one query; each one adds a level to the tree
const MAX_OPERATORS: usize = 256;

struct Parser {
    tokens: Vec<(usize, Token)>,
    index: usize,
    end: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn parse(mut self) -> Result<Expr, QueryError> {
        if self.tokens.is_empty() {
            return Err(syntax(0, "expression is empty"));
        }
        let expr = self.parse_expr()?;
        if let Some((position, token)) = self.tokens.get(self.index) {
            return Err(syntax(*position, format!("unexpected {token}")));
        }
        Ok(expr)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.index).map_or(self.end, |(pos, _)| *pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, token)| token)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|(_, token)| token.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn parse_expr(&mut self) -> Result<Expr, QueryError> {
        let mut expr = self.parse_term()?;
        loop {
            let operator = match self.peek() {
                Some(Token::And) => LogicalOperator::And,
                Some(Token::Or) => LogicalOperator::Or,
                _ => break,
            };
            self.operators += 1;
            if self.operators > MAX_OPERATORS {
                return Err(syntax(
                    self.position(),
                    format!("expression has more than {MAX_OPERATORS} operators"),
                ));
            }
            self.consume();
            let rhs = self.parse_term()?;
            expr = Expr::Op {
                operator,
                children: vec![expr, rhs],
            };
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, QueryError> {
        let position = self.position();
        match self.consume() {
            Some(Token::Name(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                self.depth += 1;
                if self.depth > MAX_NESTING {
                    return Err(syntax(position, "expression nested too deeply"));
                }
                let inner = self.parse_expr()?;
                self.depth -= 1;
                match self.consume() {
                    Some(Token::RParen) => Ok(inner),
                    Some(token) => Err(syntax(
                        self.tokens[self.index - 1].0,
                        format!("expected ')' but found {token}"),
                    )),
                    None => Err(syntax(
                        self.end,
                        format!("unterminated group opened at position {position}"),
                    )),
                }
            }
            Some(token) => Err(syntax(position, format!("expected a label or '(' but found {token}"))),
            None => Err(syntax(position, "expected a label or '(' but reached the end")),
        }
    }
}

/// Parse a label expression
pub fn parse(expression: &str) -> Result<Expr, QueryError> {
    debug!(expression, "Parsing search expression");
    let tokens = tokenize(expression)?;
    Parser {
        tokens,
        index: 0,
        end: expression.len(),
        depth: 0,
        operators: 0,
    }
    .parse()
}

/// Lower a parsed expression into a query tree, substituting label parameters
pub fn transform(node: &Expr, parameters: &BTreeMap<String, Value>) -> Result<QueryNode, QueryError> {
    match node {
        Expr::Var(label) => {
            let params = parameters
                .get(label)
                .ok_or_else(|| QueryError::UnknownLabel(label.clone()))?;
            Ok(QueryNode::Terminal {
                service: TERMINAL_SERVICE.to_string(),
                parameters: params.clone(),
            })
        }
        Expr::Op { operator, children } => Ok(QueryNode::Group {
            logical_operator: *operator,
            nodes: children
                .iter()
                .map(|child| transform(child, parameters))
                .collect::<Result<_, _>>()?,
        }),
    }
}

/// Parse and transform in one step
pub fn compile(expression: &str, parameters: &BTreeMap<String, Value>) -> Result<QueryNode, QueryError> {
    transform(&parse(expression)?, parameters)
}
