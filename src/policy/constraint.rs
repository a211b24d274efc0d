//! Constraints and validatetrans statements.
//!
//! The expression is kept in postfix order. Leaves compare a context operand
//! (`u1`, `t2`, `l1`, ...) against either another operand or a set of names.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::symbols::{fmt_name_set, ClassId, RoleId, TypeId, TypeOrAttr, UserId};
use super::{Policy, PolicyDisplay};
use crate::error::{PolicyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintRuletype {
    Constrain,
    Mlsconstrain,
    Validatetrans,
    Mlsvalidatetrans,
}

impl ConstraintRuletype {
    pub fn is_validatetrans(self) -> bool {
        matches!(self, Self::Validatetrans | Self::Mlsvalidatetrans)
    }
}

impl fmt::Display for ConstraintRuletype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Constrain => "constrain",
            Self::Mlsconstrain => "mlsconstrain",
            Self::Validatetrans => "validatetrans",
            Self::Mlsvalidatetrans => "mlsvalidatetrans",
        })
    }
}

/// Context field referenced by a constraint leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    U1,
    U2,
    U3,
    R1,
    R2,
    R3,
    T1,
    T2,
    T3,
    L1,
    L2,
    H1,
    H2,
}

impl Operand {
    fn parse(word: &str) -> Option<Self> {
        Some(match word {
            "u1" => Self::U1,
            "u2" => Self::U2,
            "u3" => Self::U3,
            "r1" => Self::R1,
            "r2" => Self::R2,
            "r3" => Self::R3,
            "t1" => Self::T1,
            "t2" => Self::T2,
            "t3" => Self::T3,
            "l1" => Self::L1,
            "l2" => Self::L2,
            "h1" => Self::H1,
            "h2" => Self::H2,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::U1 => "u1",
            Self::U2 => "u2",
            Self::U3 => "u3",
            Self::R1 => "r1",
            Self::R2 => "r2",
            Self::R3 => "r3",
            Self::T1 => "t1",
            Self::T2 => "t2",
            Self::T3 => "t3",
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::H1 => "h1",
            Self::H2 => "h2",
        }
    }

    pub fn is_mls(self) -> bool {
        matches!(self, Self::L1 | Self::L2 | Self::H1 | Self::H2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOp {
    Eq,
    Neq,
    Dom,
    Domby,
    Incomp,
}

impl ConstraintOp {
    fn parse(word: &str) -> Option<Self> {
        Some(match word {
            "==" | "eq" => Self::Eq,
            "!=" => Self::Neq,
            "dom" => Self::Dom,
            "domby" => Self::Domby,
            "incomp" => Self::Incomp,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Dom => "dom",
            Self::Domby => "domby",
            Self::Incomp => "incomp",
        }
    }
}

/// Names on the right-hand side of a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstraintNames {
    Users(Vec<UserId>),
    Roles(Vec<RoleId>),
    Types(Vec<TypeOrAttr>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstraintNode {
    /// `u1 == u2`
    Compare {
        left: Operand,
        op: ConstraintOp,
        right: Operand,
    },
    /// `t1 == { foo_t bar_t }`
    Names {
        left: Operand,
        op: ConstraintOp,
        names: ConstraintNames,
    },
    Not,
    And,
    Or,
}

/// A constraint expression in postfix order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstraintExpr {
    pub nodes: Vec<ConstraintNode>,
}

impl ConstraintExpr {
    pub fn users(&self) -> BTreeSet<UserId> {
        self.names()
            .filter_map(|n| match n {
                ConstraintNames::Users(u) => Some(u.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn roles(&self) -> BTreeSet<RoleId> {
        self.names()
            .filter_map(|n| match n {
                ConstraintNames::Roles(r) => Some(r.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Types and attributes named in the expression.
    pub fn types(&self) -> BTreeSet<TypeOrAttr> {
        self.names()
            .filter_map(|n| match n {
                ConstraintNames::Types(t) => Some(t.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Types named in the expression with attributes expanded.
    pub fn expanded_types(&self, policy: &Policy) -> BTreeSet<TypeId> {
        self.types()
            .iter()
            .flat_map(|t| t.expand(policy).iter().copied())
            .collect()
    }

    fn names(&self) -> impl Iterator<Item = &ConstraintNames> {
        self.nodes.iter().filter_map(|n| match n {
            ConstraintNode::Names { names, .. } => Some(names),
            _ => None,
        })
    }

    /// True if any leaf compares MLS levels.
    pub fn is_mls(&self) -> bool {
        self.nodes.iter().any(|n| match n {
            ConstraintNode::Compare { left, .. } | ConstraintNode::Names { left, .. } => {
                left.is_mls()
            }
            _ => false,
        })
    }
}

impl PolicyDisplay for ConstraintExpr {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // (text, precedence): leaf 4, not 3, and 2, or 1
        let mut stack: Vec<(String, u8)> = Vec::new();
        for node in &self.nodes {
            match node {
                ConstraintNode::Compare { left, op, right } => stack.push((
                    format!("{} {} {}", left.as_str(), op.as_str(), right.as_str()),
                    4,
                )),
                ConstraintNode::Names { left, op, names } => {
                    let names = NamesDisplay(names, policy).to_string();
                    stack.push((format!("{} {} {}", left.as_str(), op.as_str(), names), 4));
                }
                ConstraintNode::Not => {
                    let (operand, _) = stack.pop().unwrap_or_default();
                    stack.push((format!("not ( {} )", operand), 3));
                }
                ConstraintNode::And | ConstraintNode::Or => {
                    let (word, prec) = match node {
                        ConstraintNode::And => ("and", 2),
                        _ => ("or", 1),
                    };
                    let (rhs, rprec) = stack.pop().unwrap_or_default();
                    let (lhs, lprec) = stack.pop().unwrap_or_default();
                    let wrap = |s: String, p: u8| if p < prec { format!("( {} )", s) } else { s };
                    stack.push((format!("{} {} {}", wrap(lhs, lprec), word, wrap(rhs, rprec)), prec));
                }
            }
        }
        let (text, _) = stack.pop().unwrap_or_default();
        f.write_str(&text)
    }
}

struct NamesDisplay<'a>(&'a ConstraintNames, &'a Policy);

impl fmt::Display for NamesDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = self.1;
        let names: Vec<&str> = match self.0 {
            ConstraintNames::Users(u) => u.iter().map(|u| policy.user(*u).name.as_str()).collect(),
            ConstraintNames::Roles(r) => r.iter().map(|r| policy.role(*r).name.as_str()).collect(),
            ConstraintNames::Types(t) => t.iter().map(|t| t.name(policy)).collect(),
        };
        if names.is_empty() {
            return f.write_str("<empty set>");
        }
        fmt_name_set(f, names)
    }
}

/// A constrain/mlsconstrain/validatetrans/mlsvalidatetrans statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub ruletype: ConstraintRuletype,
    pub tclass: ClassId,
    /// Absent for validatetrans statements.
    pub(crate) perms: Option<BTreeSet<String>>,
    pub expression: ConstraintExpr,
}

impl Constraint {
    pub fn perms(&self) -> Result<&BTreeSet<String>> {
        self.perms.as_ref().ok_or_else(|| PolicyError::InvalidRuleUse {
            ruletype: self.ruletype.to_string(),
            attribute: "permissions",
        })
    }
}

impl PolicyDisplay for Constraint {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.ruletype, policy.class(self.tclass).name)?;
        if let Some(perms) = &self.perms {
            fmt_name_set(f, perms.iter().map(String::as_str))?;
            f.write_str(" ")?;
        }
        write!(f, "( {} );", self.expression.display(policy))
    }
}

// =============================================================================
// PARSER
// =============================================================================

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' | ')' | '{' | '}' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

struct Parser<'a> {
    policy: &'a Policy,
    tokens: Vec<String>,
    pos: usize,
    out: Vec<ConstraintNode>,
    text: &'a str,
}

impl Parser<'_> {
    fn error(&self, why: &str) -> PolicyError {
        PolicyError::InvalidValue(format!("{}: {}", self.text, why))
    }

    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Option<String> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn or_expr(&mut self) -> Result<()> {
        self.and_expr()?;
        while matches!(self.peek(), Some("or") | Some("||")) {
            self.pos += 1;
            self.and_expr()?;
            self.out.push(ConstraintNode::Or);
        }
        Ok(())
    }

    fn and_expr(&mut self) -> Result<()> {
        self.not_expr()?;
        while matches!(self.peek(), Some("and") | Some("&&")) {
            self.pos += 1;
            self.not_expr()?;
            self.out.push(ConstraintNode::And);
        }
        Ok(())
    }

    fn not_expr(&mut self) -> Result<()> {
        match self.peek() {
            Some("not") | Some("!") => {
                self.pos += 1;
                self.not_expr()?;
                self.out.push(ConstraintNode::Not);
                Ok(())
            }
            Some("(") => {
                self.pos += 1;
                self.or_expr()?;
                if self.next().as_deref() != Some(")") {
                    return Err(self.error("unbalanced parentheses"));
                }
                Ok(())
            }
            _ => self.leaf(),
        }
    }

    fn leaf(&mut self) -> Result<()> {
        let left = self
            .next()
            .and_then(|t| Operand::parse(&t))
            .ok_or_else(|| self.error("expected an operand"))?;
        let op = self
            .next()
            .and_then(|t| ConstraintOp::parse(&t))
            .ok_or_else(|| self.error("expected an operator"))?;

        if let Some(right) = self.peek().and_then(Operand::parse) {
            self.pos += 1;
            self.out.push(ConstraintNode::Compare { left, op, right });
            return Ok(());
        }

        let words = match self.next().as_deref() {
            Some("{") => {
                let mut words = Vec::new();
                loop {
                    match self.next() {
                        Some(t) if t == "}" => break,
                        Some(t) => words.push(t),
                        None => return Err(self.error("unterminated name set")),
                    }
                }
                words
            }
            Some(word) if !matches!(word, "(" | ")" | "}") => vec![word.to_string()],
            _ => return Err(self.error("expected names")),
        };

        let names = match left {
            Operand::U1 | Operand::U2 | Operand::U3 => ConstraintNames::Users(
                words
                    .iter()
                    .map(|w| self.policy.lookup_user(w).map(|u| u.id))
                    .collect::<Result<_>>()?,
            ),
            Operand::R1 | Operand::R2 | Operand::R3 => ConstraintNames::Roles(
                words
                    .iter()
                    .map(|w| self.policy.lookup_role(w).map(|r| r.id))
                    .collect::<Result<_>>()?,
            ),
            Operand::T1 | Operand::T2 | Operand::T3 => ConstraintNames::Types(
                words
                    .iter()
                    .map(|w| self.policy.lookup_type_or_attr(w))
                    .collect::<Result<_>>()?,
            ),
            _ => return Err(self.error("MLS operands cannot be compared to names")),
        };

        self.out.push(ConstraintNode::Names { left, op, names });
        Ok(())
    }
}

/// Parse an infix constraint expression such as
/// `u1 == u2 or t1 == { foo_t bar_t }`.
pub(crate) fn parse_constraint_expr(policy: &Policy, text: &str) -> Result<ConstraintExpr> {
    let mut parser = Parser {
        policy,
        tokens: tokenize(text),
        pos: 0,
        out: Vec::new(),
        text,
    };
    parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("trailing tokens"));
    }
    Ok(ConstraintExpr { nodes: parser.out })
}
