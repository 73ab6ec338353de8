use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::token::Expr;

/// Named outputs a base stack exposes to the stacks built on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BundleField {
    VpcId,
    PublicSubnets,
    PrivateSubnets,
    DatabaseSubnets,
    PublicSecurityGroup,
    AppSecurityGroup,
    DataSecurityGroup,
    EcsClusterName,
    LookupTable,
}

impl BundleField {
    pub const ALL: [BundleField; 9] = [
        BundleField::VpcId,
        BundleField::PublicSubnets,
        BundleField::PrivateSubnets,
        BundleField::DatabaseSubnets,
        BundleField::PublicSecurityGroup,
        BundleField::AppSecurityGroup,
        BundleField::DataSecurityGroup,
        BundleField::EcsClusterName,
        BundleField::LookupTable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BundleField::VpcId => "vpcId",
            BundleField::PublicSubnets => "publicSubnets",
            BundleField::PrivateSubnets => "privateSubnets",
            BundleField::DatabaseSubnets => "databaseSubnets",
            BundleField::PublicSecurityGroup => "publicSecurityGroup",
            BundleField::AppSecurityGroup => "appSecurityGroup",
            BundleField::DataSecurityGroup => "dataSecurityGroup",
            BundleField::EcsClusterName => "ecsClusterName",
            BundleField::LookupTable => "lookupTable",
        }
    }
}

impl fmt::Display for BundleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputBundle {
    fields: BTreeMap<BundleField, Expr>,
}

impl OutputBundle {
    /// Bumped whenever a field is added, removed or changes meaning.
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: BundleField, value: Expr) -> Self {
        self.fields.insert(field, value);
        self
    }

    pub fn without(mut self, field: BundleField) -> Self {
        self.fields.remove(&field);
        self
    }

    pub fn get(&self, field: BundleField) -> Option<&Expr> {
        self.fields.get(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = BundleField> + '_ {
        self.fields.keys().copied()
    }

    /// Fields of the contract this bundle lacks.
    pub fn missing(&self) -> Vec<BundleField> {
        BundleField::ALL
            .iter()
            .copied()
            .filter(|field| !self.fields.contains_key(field))
            .collect()
    }
}
