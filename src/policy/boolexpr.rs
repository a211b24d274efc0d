//! Conditional (boolean) expressions guarding conditional TE rules.
//!
//! Expressions are stored in postfix order, the form the kernel policy uses.
//! The parser accepts infix text with the policy language operators
//! `!`, `==`, `!=`, `&&`, `^`, `||` (highest to lowest precedence) and
//! parentheses.

use std::collections::BTreeSet;
use std::fmt;

use super::symbols::BoolId;
use super::{Policy, PolicyDisplay};
use crate::error::{PolicyError, Result};

/// Conditional expression operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondOp {
    Not,
    And,
    Or,
    Xor,
    Eq,
    Neq,
}

impl CondOp {
    fn precedence(self) -> u8 {
        match self {
            CondOp::Not => 5,
            CondOp::Eq | CondOp::Neq => 4,
            CondOp::And => 3,
            CondOp::Xor => 2,
            CondOp::Or => 1,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CondOp::Not => "!",
            CondOp::And => "&&",
            CondOp::Or => "||",
            CondOp::Xor => "^",
            CondOp::Eq => "==",
            CondOp::Neq => "!=",
        }
    }
}

/// One node of a postfix expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondNode {
    Bool(BoolId),
    Op(CondOp),
}

/// A conditional expression in postfix order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionalExpr {
    pub nodes: Vec<CondNode>,
}

impl ConditionalExpr {
    /// The set of booleans in the expression.
    pub fn booleans(&self) -> BTreeSet<BoolId> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                CondNode::Bool(b) => Some(*b),
                CondNode::Op(_) => None,
            })
            .collect()
    }

    pub fn contains(&self, boolean: BoolId) -> bool {
        self.nodes.contains(&CondNode::Bool(boolean))
    }

    /// Evaluate with the given boolean states.
    pub fn evaluate(&self, state: impl Fn(BoolId) -> bool) -> bool {
        let mut stack: Vec<bool> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            match node {
                CondNode::Bool(b) => stack.push(state(*b)),
                CondNode::Op(CondOp::Not) => {
                    let v = stack.pop().unwrap_or(false);
                    stack.push(!v);
                }
                CondNode::Op(op) => {
                    let rhs = stack.pop().unwrap_or(false);
                    let lhs = stack.pop().unwrap_or(false);
                    stack.push(match op {
                        CondOp::And => lhs && rhs,
                        CondOp::Or => lhs || rhs,
                        CondOp::Xor => lhs ^ rhs,
                        CondOp::Eq => lhs == rhs,
                        CondOp::Neq => lhs != rhs,
                        CondOp::Not => unreachable!("unary handled above"),
                    });
                }
            }
        }
        stack.pop().unwrap_or(false)
    }

    /// Evaluate using every boolean's default state.
    pub fn evaluate_default(&self, policy: &Policy) -> bool {
        self.evaluate(|b| policy.boolean(b).state)
    }
}

impl PolicyDisplay for ConditionalExpr {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // (text, precedence of the outermost operator)
        let mut stack: Vec<(String, u8)> = Vec::new();
        for node in &self.nodes {
            match node {
                CondNode::Bool(b) => stack.push((policy.boolean(*b).name.clone(), u8::MAX)),
                CondNode::Op(CondOp::Not) => {
                    let (operand, prec) = stack.pop().unwrap_or_default();
                    let text = if prec < CondOp::Not.precedence() {
                        format!("! ( {} )", operand)
                    } else {
                        format!("! {}", operand)
                    };
                    stack.push((text, CondOp::Not.precedence()));
                }
                CondNode::Op(op) => {
                    let (rhs, rprec) = stack.pop().unwrap_or_default();
                    let (lhs, lprec) = stack.pop().unwrap_or_default();
                    let wrap = |s: String, p: u8| {
                        if p <= op.precedence() {
                            format!("( {} )", s)
                        } else {
                            s
                        }
                    };
                    let text = format!("{} {} {}", wrap(lhs, lprec), op.symbol(), wrap(rhs, rprec));
                    stack.push((text, op.precedence()));
                }
            }
        }
        let (text, _) = stack.pop().unwrap_or_default();
        write!(f, "{}", text)
    }
}

// =============================================================================
// PARSER
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Op(CondOp),
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bad = |why: &str| PolicyError::InvalidValue(format!("{}: {}", text, why));
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Op(CondOp::Xor));
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CondOp::Neq));
                } else {
                    tokens.push(Token::Op(CondOp::Not));
                }
            }
            '&' | '|' | '=' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(bad("incomplete operator"));
                }
                tokens.push(Token::Op(match c {
                    '&' => CondOp::And,
                    '|' => CondOp::Or,
                    _ => CondOp::Eq,
                }));
            }
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            _ => return Err(bad("unexpected character")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    policy: &'a Policy,
    tokens: Vec<Token>,
    pos: usize,
    out: Vec<CondNode>,
    text: &'a str,
}

impl Parser<'_> {
    fn error(&self, why: &str) -> PolicyError {
        PolicyError::InvalidValue(format!("{}: {}", self.text, why))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expr(&mut self, min_prec: u8) -> Result<()> {
        self.unary()?;
        while let Some(Token::Op(op)) = self.peek().cloned() {
            if op == CondOp::Not || op.precedence() < min_prec {
                break;
            }
            self.pos += 1;
            self.expr(op.precedence() + 1)?;
            self.out.push(CondNode::Op(op));
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<()> {
        match self.peek().cloned() {
            Some(Token::Op(CondOp::Not)) => {
                self.pos += 1;
                self.unary()?;
                self.out.push(CondNode::Op(CondOp::Not));
                Ok(())
            }
            Some(Token::Open) => {
                self.pos += 1;
                self.expr(0)?;
                if self.peek() != Some(&Token::Close) {
                    return Err(self.error("unbalanced parentheses"));
                }
                self.pos += 1;
                Ok(())
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                let b = self.policy.lookup_boolean(&name)?;
                self.out.push(CondNode::Bool(b.id));
                Ok(())
            }
            _ => Err(self.error("expected a Boolean")),
        }
    }
}

/// Parse an infix conditional expression.
pub(crate) fn parse_conditional(policy: &Policy, text: &str) -> Result<ConditionalExpr> {
    let mut parser = Parser {
        policy,
        tokens: tokenize(text)?,
        pos: 0,
        out: Vec::new(),
        text,
    };
    parser.expr(0)?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("trailing tokens"));
    }
    Ok(ConditionalExpr { nodes: parser.out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("bools");
        b.boolean("a", true).unwrap();
        b.boolean("b", false).unwrap();
        b.boolean("c", true).unwrap();
        b.build()
    }

    #[test]
    fn test_precedence() {
        let p = policy();
        let expr = parse_conditional(&p, "a || b && c").unwrap();
        let [a, b, c] = [0, 1, 2].map(BoolId);
        assert_eq!(
            expr.nodes,
            vec![
                CondNode::Bool(a),
                CondNode::Bool(b),
                CondNode::Bool(c),
                CondNode::Op(CondOp::And),
                CondNode::Op(CondOp::Or),
            ]
        );
        assert_eq!(expr.display(&p).to_string(), "a || b && c");
    }

    #[test]
    fn test_parentheses_and_not() {
        let p = policy();
        let expr = parse_conditional(&p, "!(a || b) ^ c").unwrap();
        assert_eq!(expr.display(&p).to_string(), "! ( a || b ) ^ c");
        assert!(expr.evaluate_default(&p) == (!(true || false) ^ true));
        assert_eq!(expr.booleans().len(), 3);
    }

    #[test]
    fn test_evaluate() {
        let p = policy();
        let expr = parse_conditional(&p, "a && b").unwrap();
        assert!(!expr.evaluate_default(&p));
        assert!(expr.evaluate(|_| true));

        let eq = parse_conditional(&p, "a == c").unwrap();
        assert!(eq.evaluate_default(&p));
    }

    #[test]
    fn test_parse_errors() {
        let p = policy();
        assert!(matches!(
            parse_conditional(&p, "a && missing"),
            Err(PolicyError::InvalidBoolean(_))
        ));
        assert!(parse_conditional(&p, "(a && b").is_err());
        assert!(parse_conditional(&p, "a & b").is_err());
        assert!(parse_conditional(&p, "a b").is_err());
    }
}
