//! Sample application stack: a containerized PetApp served behind a load
//! balancer on the base stack's ECS cluster, rebuilt on every push.

pub mod adapter;
pub mod config;

use serde_json::json;
use tracing::{info, instrument};

use crate::app::{self, App};
use crate::stack::{BlockRef, Stack};
use crate::token::{func, Expr};

pub use adapter::{base_config, AdapterError, Inherited};
pub use config::{
    ConfigError, PetAppBaseConfig, PetAppCustomConfig, PetAppStackConfig, StackMetadata,
};

const CONTAINER_PORT: u16 = 80;
const TASK_CPU: &str = "256";
const TASK_MEMORY: &str = "512";
const LOG_RETENTION_DAYS: u32 = 7;
const TASK_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";
const BUILD_POLICY_ARNS: [&str; 2] = [
    "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryPowerUser",
    "arn:aws:iam::aws:policy/CloudWatchLogsFullAccess",
];

#[derive(Debug, Clone)]
pub struct PetAppStack {
    pub name: String,
    pub repository: BlockRef,
    pub service: BlockRef,
    pub load_balancer: BlockRef,
}

impl PetAppStack {
    /// Declares the PetApp stack and adds it to `app`.
    ///
    /// Fails if `config` references a stack that has not been added to `app` yet.
    #[instrument(skip(app, config), fields(owner = %config.metadata.owner, branch = %config.custom.branch))]
    pub fn new(app: &mut App, name: &str, config: PetAppStackConfig) -> Result<Self, app::Error> {
        let PetAppStackConfig {
            base,
            metadata,
            custom,
        } = config;
        let mut stack = Stack::new(name);

        stack.provider(
            "aws",
            json!({
                "profile": base.profile,
                "region": base.region,
                "default_tags": [{
                    "tags": { "Owner": metadata.owner, "Branch": custom.branch, "Stack": name },
                }],
            }),
        );

        let repository = stack.resource(
            "aws_ecr_repository",
            "repository",
            json!({ "name": name, "force_delete": true }),
        );
        let log_group = stack.resource(
            "aws_cloudwatch_log_group",
            "logs",
            json!({ "name": format!("/ecs/{}", name), "retention_in_days": LOG_RETENTION_DAYS }),
        );

        let execution_role = service_role(&mut stack, "task-execution", name, "ecs-tasks.amazonaws.com");
        stack.resource(
            "aws_iam_role_policy_attachment",
            "task-execution",
            json!({ "role": execution_role.attr("name"), "policy_arn": TASK_EXECUTION_POLICY_ARN }),
        );

        let region = stack.data_source("aws_region", "current", json!({}));
        let image = Expr::Template(vec![
            repository.attr("repository_url"),
            Expr::literal(":latest"),
        ]);
        let task = stack.resource(
            "aws_ecs_task_definition",
            "task",
            json!({
                "family": name,
                "requires_compatibilities": ["FARGATE"],
                "network_mode": "awsvpc",
                "cpu": TASK_CPU,
                "memory": TASK_MEMORY,
                "execution_role_arn": execution_role.attr("arn"),
                "container_definitions": func::jsonencode(Expr::literal(json!([{
                    "name": name,
                    "image": image,
                    "essential": true,
                    "portMappings": [{ "containerPort": CONTAINER_PORT }],
                    "logConfiguration": {
                        "logDriver": "awslogs",
                        "options": {
                            "awslogs-group": log_group.attr("name"),
                            "awslogs-region": region.attr("name"),
                            "awslogs-stream-prefix": name,
                        },
                    },
                }]))),
            }),
        );

        let load_balancer = stack.resource(
            "aws_lb",
            "lb",
            json!({
                "name": format!("{}-lb", name),
                "load_balancer_type": "application",
                "internal": false,
                "subnets": base.public_subnets,
                "security_groups": [base.public_security_group],
            }),
        );
        let target_group = stack.resource(
            "aws_lb_target_group",
            "target-group",
            json!({
                "name": format!("{}-tg", name),
                "port": CONTAINER_PORT,
                "protocol": "HTTP",
                "target_type": "ip",
                "vpc_id": base.vpc_id,
            }),
        );
        let listener = stack.resource(
            "aws_lb_listener",
            "listener",
            json!({
                "load_balancer_arn": load_balancer.attr("arn"),
                "port": CONTAINER_PORT,
                "protocol": "HTTP",
                "default_action": [{ "type": "forward", "target_group_arn": target_group.attr("arn") }],
            }),
        );

        let service = stack.resource(
            "aws_ecs_service",
            "service",
            json!({
                "depends_on": [listener.address()],
                "name": name,
                "cluster": base.ecs_cluster_name,
                "task_definition": task.attr("arn"),
                "desired_count": 1,
                "launch_type": "FARGATE",
                "network_configuration": {
                    "subnets": base.app_subnets,
                    "security_groups": [base.app_security_group],
                    "assign_public_ip": false,
                },
                "load_balancer": [{
                    "target_group_arn": target_group.attr("arn"),
                    "container_name": name,
                    "container_port": CONTAINER_PORT,
                }],
            }),
        );

        declare_build(&mut stack, name, &base.repository, &custom.branch, &repository);

        stack.output("url", json!(load_balancer.attr("dns_name")));

        app.add(stack)?;
        info!(stack = name, "Constructed PetApp stack");

        Ok(Self {
            name: name.to_string(),
            repository,
            service,
            load_balancer,
        })
    }
}

fn service_role(stack: &mut Stack, id: &str, name: &str, principal: &str) -> BlockRef {
    stack.resource(
        "aws_iam_role",
        id,
        json!({
            "name": format!("{}-{}", name, id),
            "assume_role_policy": func::jsonencode(Expr::literal(json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": principal },
                    "Action": "sts:AssumeRole",
                }],
            }))),
        }),
    )
}

/// Image build for the configured branch, pushed to the stack's repository.
fn declare_build(
    stack: &mut Stack,
    name: &str,
    repository: &str,
    branch: &str,
    registry: &BlockRef,
) {
    let role = service_role(stack, "build", name, "codebuild.amazonaws.com");
    for (index, policy_arn) in BUILD_POLICY_ARNS.iter().enumerate() {
        stack.resource(
            "aws_iam_role_policy_attachment",
            &format!("build-{}", index),
            json!({ "role": role.attr("name"), "policy_arn": policy_arn }),
        );
    }

    let project = stack.resource(
        "aws_codebuild_project",
        "build",
        json!({
            "name": format!("{}-build", name),
            "service_role": role.attr("arn"),
            "artifacts": { "type": "NO_ARTIFACTS" },
            "environment": {
                "compute_type": "BUILD_GENERAL1_SMALL",
                "type": "LINUX_CONTAINER",
                "image": "aws/codebuild/standard:5.0",
                "image_pull_credentials_type": "CODEBUILD",
                "privileged_mode": true,
                "environment_variable": [{
                    "name": "REPOSITORY_URI",
                    "value": registry.attr("repository_url"),
                }],
            },
            "source": {
                "type": "GITHUB",
                "location": format!("https://github.com/{}.git", repository),
                "git_clone_depth": 1,
                "report_build_status": true,
            },
            "source_version": branch,
        }),
    );

    stack.resource(
        "aws_codebuild_webhook",
        "build",
        json!({
            "project_name": project.attr("name"),
            "build_type": "BUILD",
            "filter_group": [{
                "filter": [
                    { "type": "EVENT", "pattern": "PUSH" },
                    { "type": "HEAD_REF", "pattern": branch },
                ],
            }],
        }),
    );
}
