//! Shared platform resources every application stack builds on.

pub mod bundle;
pub mod network;
pub mod security;
pub mod sync;

use serde_json::json;
use tracing::{info, instrument};

use crate::app::{self, App};
use crate::stack::{BlockRef, Stack};
use crate::token::func;

pub use bundle::{BundleField, OutputBundle};
pub use network::VpcHandles;
pub use security::{SecurityTier, TierHandles};
pub use sync::SyncSource;

const TABLE_CAPACITY: u32 = 2;
const ACTIVATION_INSTANCE_TYPE: &str = "t2.micro";
const AMAZON_LINUX_2_AMI_PARAMETER: &str =
    "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseStackConfig {
    pub cidr: String,
    pub profile: String,
    pub region: String,
    pub sync: SyncSource,
}

#[derive(Debug, Clone)]
pub struct BaseStack {
    pub name: String,
    pub profile: String,
    pub region: String,
    pub vpc: VpcHandles,
    pub security_groups: TierHandles,
    pub ecs_cluster: BlockRef,
    pub dynamodb_table: BlockRef,
    pub environment_types_table: BlockRef,
}

impl BaseStack {
    /// Declares the base stack and adds it to `app`.
    #[instrument(skip(app, config), fields(cidr = %config.cidr, region = %config.region))]
    pub fn new(app: &mut App, name: &str, config: BaseStackConfig) -> Result<Self, app::Error> {
        let mut stack = Stack::new(name);

        stack.provider(
            "aws",
            json!({ "region": config.region, "profile": config.profile }),
        );

        let vpc = network::declare_vpc(
            &mut stack,
            &format!("{}-ue1-main", name),
            &config.cidr,
            &config.region,
        );
        let security_groups = security::declare_tiers(&mut stack, &vpc.vpc_id);

        stack.resource(
            "aws_iam_service_linked_role",
            "ecs",
            json!({ "aws_service_name": "ecs.amazonaws.com" }),
        );

        let ecs_cluster = stack.resource("aws_ecs_cluster", "ecs-cluster-main", json!({ "name": "main" }));
        stack.resource(
            "aws_ecs_cluster_capacity_providers",
            "ecs-capacity-provider-main",
            json!({
                "cluster_name": ecs_cluster.attr("name"),
                "capacity_providers": ["FARGATE"],
            }),
        );

        let dynamodb_table = declare_table(&mut stack, &format!("{}-idp-environment", name), "environment");
        let environment_types_table =
            declare_table(&mut stack, &format!("{}-idp-environment-type", name), "envType");

        sync::declare_sync_job(
            &mut stack,
            &config.sync,
            &environment_types_table,
            sync::SyncNetwork {
                vpc_id: &vpc.vpc_id,
                subnets: &vpc.private_subnets,
                security_group_id: &security_groups.app,
            },
        );

        // Fresh accounts cannot run more than two ECS tasks until an EC2
        // instance has been launched in them.
        let ami = stack.data_source(
            "aws_ssm_parameter",
            "latest-amazon-linux-2-ami-id",
            json!({ "name": AMAZON_LINUX_2_AMI_PARAMETER }),
        );
        stack.resource(
            "aws_instance",
            "activation",
            json!({
                "ami": ami.attr("value"),
                "instance_type": ACTIVATION_INSTANCE_TYPE,
                "associate_public_ip_address": false,
                "subnet_id": func::element(func::tolist(vpc.private_subnets.clone()), 0),
            }),
        );

        app.add(stack)?;
        info!(stack = name, "Constructed base stack");

        Ok(Self {
            name: name.to_string(),
            profile: config.profile,
            region: config.region,
            vpc,
            security_groups,
            ecs_cluster,
            dynamodb_table,
            environment_types_table,
        })
    }

    /// Outputs this stack offers to application stacks.
    pub fn bundle(&self) -> OutputBundle {
        OutputBundle::new()
            .with(BundleField::VpcId, self.vpc.vpc_id.clone())
            .with(BundleField::PublicSubnets, self.vpc.public_subnets.clone())
            .with(BundleField::PrivateSubnets, self.vpc.private_subnets.clone())
            .with(BundleField::DatabaseSubnets, self.vpc.database_subnets.clone())
            .with(BundleField::PublicSecurityGroup, self.security_groups.public.clone())
            .with(BundleField::AppSecurityGroup, self.security_groups.app.clone())
            .with(BundleField::DataSecurityGroup, self.security_groups.data.clone())
            .with(BundleField::EcsClusterName, self.ecs_cluster.attr("name"))
            .with(BundleField::LookupTable, self.dynamodb_table.attr("name"))
    }
}

fn declare_table(stack: &mut Stack, name: &str, hash_key: &str) -> BlockRef {
    stack.resource(
        "aws_dynamodb_table",
        name,
        json!({
            "name": name,
            "billing_mode": "PROVISIONED",
            "read_capacity": TABLE_CAPACITY,
            "write_capacity": TABLE_CAPACITY,
            "hash_key": hash_key,
            // S = string, N = number, B = binary
            "attribute": [{ "name": hash_key, "type": "S" }],
        }),
    )
}
