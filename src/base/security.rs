//! Public, application and data security tiers.
//!
//! Only the public tier accepts traffic by address range. Every other tier
//! accepts traffic from the security group of the tier directly upstream of
//! it, referenced by id, so the chain holds whatever the addresses become.

use serde::Serialize;

use crate::stack::Stack;
use crate::token::Expr;

pub const SECURITY_GROUP_MODULE_SOURCE: &str = "terraform-aws-modules/security-group/aws";
pub const SECURITY_GROUP_MODULE_VERSION: &str = "4.9.0";

const ANYWHERE: &str = "0.0.0.0/0";
const ALL_ALL: &str = "all-all";
const PUBLIC_INGRESS_RULES: [&str; 2] = ["http-80-tcp", "https-443-tcp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecurityTier {
    Public,
    App,
    Data,
}

impl SecurityTier {
    pub const ALL: [SecurityTier; 3] = [SecurityTier::Public, SecurityTier::App, SecurityTier::Data];

    pub fn name(self) -> &'static str {
        match self {
            SecurityTier::Public => "public",
            SecurityTier::App => "app",
            SecurityTier::Data => "data",
        }
    }

    /// The tier this one accepts ingress from, if any.
    pub fn upstream(self) -> Option<SecurityTier> {
        match self {
            SecurityTier::Public => None,
            SecurityTier::App => Some(SecurityTier::Public),
            SecurityTier::Data => Some(SecurityTier::App),
        }
    }
}

/// Security group id handles for the three tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct TierHandles {
    pub public: Expr,
    pub app: Expr,
    pub data: Expr,
}

impl TierHandles {
    pub fn get(&self, tier: SecurityTier) -> &Expr {
        match tier {
            SecurityTier::Public => &self.public,
            SecurityTier::App => &self.app,
            SecurityTier::Data => &self.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ingress {
    Internet { rules: Vec<String> },
    FromGroup(Expr),
}

/// Ingress policy of `tier` given the handles of every tier.
pub fn ingress(tier: SecurityTier, handles: &TierHandles) -> Ingress {
    match tier.upstream() {
        Some(upstream) => Ingress::FromGroup(handles.get(upstream).clone()),
        None => Ingress::Internet {
            rules: PUBLIC_INGRESS_RULES.iter().map(|rule| rule.to_string()).collect(),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleRef {
    pub rule: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceGroupRule {
    pub rule: String,
    pub source_security_group_id: Expr,
}

/// Inputs of the security-group module.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroupInputs {
    pub name: String,
    pub vpc_id: Expr,
    pub ingress_with_self: Vec<RuleRef>,
    pub egress_with_self: Vec<RuleRef>,
    pub egress_cidr_blocks: Vec<String>,
    pub egress_rules: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ingress_cidr_blocks: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ingress_rules: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub computed_ingress_with_source_security_group_id: Vec<SourceGroupRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_computed_ingress_with_source_security_group_id: Option<usize>,
}

impl SecurityGroupInputs {
    pub fn new(tier: SecurityTier, vpc_id: Expr, ingress: Ingress) -> Self {
        let mut inputs = Self {
            name: tier.name().to_string(),
            vpc_id,
            ingress_with_self: vec![RuleRef { rule: ALL_ALL.to_string() }],
            egress_with_self: vec![RuleRef { rule: ALL_ALL.to_string() }],
            egress_cidr_blocks: vec![ANYWHERE.to_string()],
            egress_rules: vec![ALL_ALL.to_string()],
            ingress_cidr_blocks: Vec::new(),
            ingress_rules: Vec::new(),
            computed_ingress_with_source_security_group_id: Vec::new(),
            number_of_computed_ingress_with_source_security_group_id: None,
        };

        match ingress {
            Ingress::Internet { rules } => {
                inputs.ingress_cidr_blocks = vec![ANYWHERE.to_string()];
                inputs.ingress_rules = rules;
            }
            Ingress::FromGroup(source) => {
                inputs.computed_ingress_with_source_security_group_id = vec![SourceGroupRule {
                    rule: ALL_ALL.to_string(),
                    source_security_group_id: source,
                }];
                inputs.number_of_computed_ingress_with_source_security_group_id = Some(1);
            }
        }

        inputs
    }
}

/// Declares the three tier modules and returns their id handles.
pub fn declare_tiers(stack: &mut Stack, vpc_id: &Expr) -> TierHandles {
    let handle = |tier: SecurityTier| {
        Expr::reference(
            stack.name(),
            format!("module.{}.security_group_id", tier.name()),
        )
    };
    let handles = TierHandles {
        public: handle(SecurityTier::Public),
        app: handle(SecurityTier::App),
        data: handle(SecurityTier::Data),
    };

    for tier in SecurityTier::ALL {
        let inputs = SecurityGroupInputs::new(tier, vpc_id.clone(), ingress(tier, &handles));
        stack.module(
            tier.name(),
            SECURITY_GROUP_MODULE_SOURCE,
            SECURITY_GROUP_MODULE_VERSION,
            serde_json::json!(inputs),
        );
    }

    handles
}
