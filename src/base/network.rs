//! The shared VPC and its subnet partitioning.

use serde_json::json;

use crate::stack::Stack;
use crate::token::{func, Expr};

pub const VPC_MODULE_SOURCE: &str = "terraform-aws-modules/vpc/aws";
pub const VPC_MODULE_VERSION: &str = "3.14.0";

/// Bits added to the VPC prefix for every subnet (a /16 yields /24 subnets).
pub const SUBNET_NEWBITS: u8 = 8;

/// `netnum` arguments to `cidrsubnet` for each subnet group, one per AZ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetLayout {
    pub public: [u32; 3],
    pub private: [u32; 3],
    pub database: [u32; 3],
}

impl Default for SubnetLayout {
    fn default() -> Self {
        Self {
            public: [0, 1, 2],
            private: [4, 5, 6],
            database: [8, 9, 10],
        }
    }
}

/// Output handles of the VPC module.
#[derive(Debug, Clone, PartialEq)]
pub struct VpcHandles {
    pub vpc_id: Expr,
    pub public_subnets: Expr,
    pub private_subnets: Expr,
    pub database_subnets: Expr,
}

pub fn availability_zones(region: &str) -> Vec<String> {
    ["a", "b", "c"]
        .iter()
        .map(|suffix| format!("{}{}", region, suffix))
        .collect()
}

pub fn subnets(cidr: &str, netnums: &[u32]) -> Vec<Expr> {
    netnums
        .iter()
        .map(|netnum| func::cidrsubnet(cidr, SUBNET_NEWBITS, *netnum))
        .collect()
}

pub fn declare_vpc(stack: &mut Stack, id: &str, cidr: &str, region: &str) -> VpcHandles {
    let layout = SubnetLayout::default();
    let vpc = stack.module(
        id,
        VPC_MODULE_SOURCE,
        VPC_MODULE_VERSION,
        json!({
            "name": id,
            "cidr": cidr,
            "azs": availability_zones(region),
            "public_subnets": subnets(cidr, &layout.public),
            "private_subnets": subnets(cidr, &layout.private),
            "database_subnets": subnets(cidr, &layout.database),
            "enable_nat_gateway": true,
            "one_nat_gateway_per_az": true,
            "enable_dns_hostnames": true,
        }),
    );

    VpcHandles {
        vpc_id: vpc.attr("vpc_id"),
        public_subnets: vpc.attr("public_subnets"),
        private_subnets: vpc.attr("private_subnets"),
        database_subnets: vpc.attr("database_subnets"),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{availability_zones, declare_vpc};
    use crate::stack::Stack;

    #[test]
    fn zones_follow_region() {
        assert_eq!(
            vec!["eu-west-1a", "eu-west-1b", "eu-west-1c"],
            availability_zones("eu-west-1")
        );
    }

    #[test]
    fn subnets_are_partitioned_per_group() {
        let mut stack = Stack::new("base");
        let handles = declare_vpc(&mut stack, "base-ue1-main", "10.1.0.0/16", "us-east-1");

        let module = &stack.to_terraform_json()["module"]["base-ue1-main"];
        assert_eq!(
            json!([
                "${cidrsubnet(\"10.1.0.0/16\", 8, 0)}",
                "${cidrsubnet(\"10.1.0.0/16\", 8, 1)}",
                "${cidrsubnet(\"10.1.0.0/16\", 8, 2)}",
            ]),
            module["public_subnets"]
        );
        assert_eq!(
            json!([
                "${cidrsubnet(\"10.1.0.0/16\", 8, 4)}",
                "${cidrsubnet(\"10.1.0.0/16\", 8, 5)}",
                "${cidrsubnet(\"10.1.0.0/16\", 8, 6)}",
            ]),
            module["private_subnets"]
        );
        assert_eq!(
            json!([
                "${cidrsubnet(\"10.1.0.0/16\", 8, 8)}",
                "${cidrsubnet(\"10.1.0.0/16\", 8, 9)}",
                "${cidrsubnet(\"10.1.0.0/16\", 8, 10)}",
            ]),
            module["database_subnets"]
        );
        assert_eq!(
            json!("${TfToken[base:module.base-ue1-main.vpc_id]}"),
            handles.vpc_id.render()
        );
    }
}
