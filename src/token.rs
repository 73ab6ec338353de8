//! Terraform expressions and the reference tokens that carry them between stacks.
//!
//! A reference is rendered as `TfToken[<stack>:<address>]` until the owning
//! [`App`](crate::app::App) resolves it, either to a plain address inside its
//! own stack or to a remote state lookup when it crosses a stack boundary.

use std::fmt::Write;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Matches an unresolved reference token and captures the stack and address.
pub const TOKEN_PATTERN: &str = r"TfToken\[([A-Za-z0-9_-]+):([^\]]+)\]";

pub fn token_regex() -> Regex {
    Regex::new(TOKEN_PATTERN).expect("Token pattern is a valid regex")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub stack: String,
    pub address: String,
}

impl Reference {
    pub fn new(stack: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            address: address.into(),
        }
    }

    pub fn token(&self) -> String {
        format!("TfToken[{}:{}]", self.stack, self.address)
    }
}

/// A Terraform expression used as an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ref(Reference),
    Call { name: &'static str, args: Vec<Expr> },
    /// String interpolation; literal string parts are emitted verbatim.
    Template(Vec<Expr>),
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn reference(stack: impl Into<String>, address: impl Into<String>) -> Self {
        Expr::Ref(Reference::new(stack, address))
    }

    /// Every reference reachable from this expression.
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Expr::Literal(_) => Vec::new(),
            Expr::Ref(reference) => vec![reference],
            Expr::Call { args: parts, .. } | Expr::Template(parts) => {
                parts.iter().flat_map(Expr::references).collect()
            }
        }
    }

    /// Renders the expression as it appears between `${` and `}`.
    pub fn render_inner(&self) -> String {
        match self {
            Expr::Literal(value) => value.to_string(),
            Expr::Ref(reference) => reference.token(),
            Expr::Call { name, args } => {
                let args: Vec<String> = args.iter().map(Expr::render_inner).collect();
                format!("{}({})", name, args.join(", "))
            }
            Expr::Template(_) => Value::String(self.render_template()).to_string(),
        }
    }

    /// Renders the expression as a JSON attribute value.
    pub fn render(&self) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Template(_) => Value::String(self.render_template()),
            _ => Value::String(format!("${{{}}}", self.render_inner())),
        }
    }

    fn render_template(&self) -> String {
        let parts = match self {
            Expr::Template(parts) => parts,
            other => return format!("${{{}}}", other.render_inner()),
        };

        parts.iter().fold(String::new(), |mut acc, part| {
            match part {
                Expr::Literal(Value::String(text)) => acc.push_str(text),
                other => {
                    let _ = write!(acc, "${{{}}}", other.render_inner());
                }
            }
            acc
        })
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.render().serialize(serializer)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::literal(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::literal(value)
    }
}

/// Terraform built-in functions used by the stacks.
pub mod func {
    use super::Expr;

    /// <https://www.terraform.io/language/functions/cidrsubnet>
    pub fn cidrsubnet(prefix: impl Into<Expr>, newbits: u8, netnum: u32) -> Expr {
        Expr::Call {
            name: "cidrsubnet",
            args: vec![prefix.into(), Expr::literal(newbits), Expr::literal(netnum)],
        }
    }

    pub fn tolist(value: Expr) -> Expr {
        Expr::Call {
            name: "tolist",
            args: vec![value],
        }
    }

    pub fn element(list: Expr, index: u32) -> Expr {
        Expr::Call {
            name: "element",
            args: vec![list, Expr::literal(index)],
        }
    }

    pub fn jsonencode(value: impl Into<Expr>) -> Expr {
        Expr::Call {
            name: "jsonencode",
            args: vec![value.into()],
        }
    }
}
