//! CodeBuild job that syncs environment types from the infra repository into
//! the environment-type table on every push.

use serde_json::json;

use crate::stack::{BlockRef, Stack};
use crate::token::{func, Expr};

pub const PROJECT_NAME: &str = "infra-environment-types-dynamodb-sync";
pub const SERVICE_ROLE_NAME: &str = "codebuild-service-role-infra-environment-types-dynamodb-sync";
pub const DYNAMODB_FULL_ACCESS_ARN: &str = "arn:aws:iam::aws:policy/AmazonDynamoDBFullAccess";

// https://docs.aws.amazon.com/codebuild/latest/userguide/build-env-ref-available.html
const BUILD_IMAGE: &str = "aws/codebuild/standard:5.0";
const COMPUTE_TYPE: &str = "BUILD_GENERAL1_SMALL";

const SERVICE_ROLE_ACTIONS: [&str; 17] = [
    "cloudwatch:*",
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
    "s3:PutObject",
    "s3:GetObject",
    "s3:GetObjectVersion",
    "s3:GetBucketAcl",
    "s3:GetBucketLocation",
    // VPC network interface for builds running inside the VPC
    "ec2:CreateNetworkInterface",
    "ec2:DescribeDhcpOptions",
    "ec2:DescribeNetworkInterfaces",
    "ec2:DeleteNetworkInterface",
    "ec2:DescribeSubnets",
    "ec2:DescribeSecurityGroups",
    "ec2:DescribeVpcs",
    "ec2:CreateNetworkInterfacePermission",
];

/// Where the sync job fetches its sources from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSource {
    pub repository: String,
    pub branch: String,
}

/// Network placement for the build containers.
pub struct SyncNetwork<'a> {
    pub vpc_id: &'a Expr,
    pub subnets: &'a Expr,
    pub security_group_id: &'a Expr,
}

pub fn buildspec(table_name: Expr) -> Expr {
    Expr::Template(vec![
        Expr::literal(
            "version: 0.2\n\
             phases:\n  \
             install:\n    \
             runtime-versions:\n      \
             nodejs: 14\n  \
             pre_build:\n    \
             commands:\n      \
             - echo Installing dependencies\n      \
             - npm install\n  \
             build:\n    \
             commands:\n      \
             - echo Running synchronization script\n      \
             - DYNAMODB_TABLE_NAME=",
        ),
        table_name,
        Expr::literal(" npx ts-node ./scripts/syncEnvType.ts\n"),
    ])
}

/// Declares the service role, the build project and its push webhook.
pub fn declare_sync_job(
    stack: &mut Stack,
    source: &SyncSource,
    table: &BlockRef,
    network: SyncNetwork<'_>,
) -> BlockRef {
    let assume_role = stack.data_source(
        "aws_iam_policy_document",
        "codebuildServiceRoleAssumeRolePolicyDocument",
        json!({
            "statement": [{
                "effect": "Allow",
                "principals": [{ "type": "Service", "identifiers": ["codebuild.amazonaws.com"] }],
                "actions": ["sts:AssumeRole"],
            }],
        }),
    );

    let role = stack.resource(
        "aws_iam_role",
        "codebuildServiceRole",
        json!({
            "name": SERVICE_ROLE_NAME,
            "assume_role_policy": assume_role.attr("json"),
        }),
    );

    let policy = stack.resource(
        "aws_iam_policy",
        "codebuildServiceRolePolicy",
        json!({
            "policy": func::jsonencode(Expr::literal(json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Action": SERVICE_ROLE_ACTIONS,
                    "Resource": ["*"],
                }],
            }))),
        }),
    );

    stack.resource(
        "aws_iam_role_policy_attachment",
        "codebuildServiceRoleRolePolicyAttachment",
        json!({ "role": role.attr("name"), "policy_arn": policy.attr("arn") }),
    );
    stack.resource(
        "aws_iam_role_policy_attachment",
        "codebuildServiceRoleRolePolicyAttachmentAWSCodeBuildAdminAccess",
        json!({ "role": role.attr("name"), "policy_arn": DYNAMODB_FULL_ACCESS_ARN }),
    );

    let project = stack.resource(
        "aws_codebuild_project",
        "project",
        json!({
            "depends_on": [table.address()],
            "name": PROJECT_NAME,
            "service_role": role.attr("arn"),
            "artifacts": { "type": "NO_ARTIFACTS" },
            "environment": {
                "compute_type": COMPUTE_TYPE,
                "type": "LINUX_CONTAINER",
                "image": BUILD_IMAGE,
                "image_pull_credentials_type": "CODEBUILD",
                "privileged_mode": false,
            },
            "source": {
                "type": "GITHUB",
                "location": source.repository,
                "git_clone_depth": 1,
                "git_submodules_config": { "fetch_submodules": true },
                "report_build_status": true,
                "buildspec": buildspec(table.attr("name")),
            },
            "vpc_config": {
                "vpc_id": network.vpc_id,
                "security_group_ids": [network.security_group_id],
                "subnets": func::tolist(network.subnets.clone()),
            },
        }),
    );

    // https://docs.aws.amazon.com/codebuild/latest/userguide/github-webhook.html
    stack.resource(
        "aws_codebuild_webhook",
        "webhook",
        json!({
            "project_name": project.attr("name"),
            "build_type": "BUILD",
            "filter_group": [{
                "filter": [
                    { "type": "EVENT", "pattern": "PUSH" },
                    { "type": "HEAD_REF", "pattern": source.branch },
                ],
            }],
        }),
    );

    project
}
