//! A single Terraform stack: the blocks it declares and the outputs it exposes.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::token::{token_regex, Expr, Reference};

pub const AWS_PROVIDER_SOURCE: &str = "hashicorp/aws";
pub const AWS_PROVIDER_VERSION: &str = "~> 4.0";

/// Handle to a declared block, used to build references to its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    stack: String,
    address: String,
}

impl BlockRef {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn attr(&self, name: &str) -> Expr {
        Expr::reference(&self.stack, format!("{}.{}", self.address, name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stack {
    name: String,
    providers: BTreeMap<String, Vec<Value>>,
    modules: BTreeMap<String, Value>,
    resources: BTreeMap<String, BTreeMap<String, Value>>,
    data: BTreeMap<String, BTreeMap<String, Value>>,
    outputs: BTreeMap<String, Value>,
    dependencies: BTreeSet<String>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stacks whose outputs this stack reads through remote state.
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn provider(&mut self, kind: &str, config: Value) {
        debug!(stack = %self.name, provider = kind, "Declaring provider");
        self.providers
            .entry(kind.to_string())
            .or_default()
            .push(config);
    }

    pub fn module(&mut self, id: &str, source: &str, version: &str, inputs: Value) -> BlockRef {
        debug!(stack = %self.name, module = id, source, "Declaring module");
        let mut body = Map::new();
        body.insert("source".to_string(), json!(source));
        body.insert("version".to_string(), json!(version));
        if let Value::Object(inputs) = inputs {
            body.extend(inputs);
        }
        self.modules.insert(id.to_string(), Value::Object(body));

        self.block_ref(format!("module.{}", id))
    }

    pub fn resource(&mut self, kind: &str, id: &str, config: Value) -> BlockRef {
        debug!(stack = %self.name, resource = kind, id, "Declaring resource");
        self.resources
            .entry(kind.to_string())
            .or_default()
            .insert(id.to_string(), config);

        self.block_ref(format!("{}.{}", kind, id))
    }

    pub fn data_source(&mut self, kind: &str, id: &str, config: Value) -> BlockRef {
        debug!(stack = %self.name, data = kind, id, "Declaring data source");
        self.data
            .entry(kind.to_string())
            .or_default()
            .insert(id.to_string(), config);

        self.block_ref(format!("data.{}.{}", kind, id))
    }

    pub fn output(&mut self, name: &str, value: Value) {
        self.outputs
            .insert(name.to_string(), json!({ "value": value }));
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Whether `address` (`module.x.attr`, `type.id.attr`, `data.type.id.attr`)
    /// points into a block this stack declares.
    pub fn declares(&self, address: &str) -> bool {
        let parts: Vec<&str> = address.split('.').collect();
        match parts.as_slice() {
            ["module", id, ..] => self.modules.contains_key(*id),
            ["data", kind, id, ..] => self
                .data
                .get(*kind)
                .map_or(false, |blocks| blocks.contains_key(*id)),
            [kind, id, ..] => self
                .resources
                .get(*kind)
                .map_or(false, |blocks| blocks.contains_key(*id)),
            _ => false,
        }
    }

    /// Adds a `terraform_remote_state` lookup for a stack this one depends on.
    pub fn remote_state(&mut self, producer: &str) -> BlockRef {
        if self.dependencies.insert(producer.to_string()) {
            debug!(stack = %self.name, producer, "Declaring remote state");
            self.data
                .entry("terraform_remote_state".to_string())
                .or_default()
                .insert(
                    producer.to_string(),
                    json!({
                        "backend": "local",
                        "config": { "path": format!("../{}/{}", producer, state_file(producer)) },
                    }),
                );
        }

        self.block_ref(format!("data.terraform_remote_state.{}", producer))
    }

    /// All unresolved reference tokens in declared attributes.
    pub fn references(&self) -> BTreeSet<Reference> {
        let regex = token_regex();
        let mut found = BTreeSet::new();
        self.for_each_body(|value| {
            collect_strings(value, &mut |text| {
                for captures in regex.captures_iter(text) {
                    found.insert(Reference::new(&captures[1], &captures[2]));
                }
            })
        });

        found
    }

    /// Replaces every reference token with the text `resolve` returns for it.
    pub fn rewrite_references<F>(&mut self, mut resolve: F)
    where
        F: FnMut(&Reference) -> String,
    {
        let regex = token_regex();
        self.for_each_body_mut(|value| {
            rewrite_strings(value, &mut |text| {
                regex
                    .replace_all(text, |captures: &regex::Captures| {
                        resolve(&Reference::new(&captures[1], &captures[2]))
                    })
                    .into_owned()
            })
        });
    }

    /// Renders the stack as Terraform JSON.
    pub fn to_terraform_json(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "terraform".to_string(),
            json!({
                "backend": { "local": { "path": state_file(&self.name) } },
                "required_providers": {
                    "aws": { "source": AWS_PROVIDER_SOURCE, "version": AWS_PROVIDER_VERSION },
                },
            }),
        );

        if !self.providers.is_empty() {
            root.insert("provider".to_string(), json!(self.providers));
        }
        if !self.modules.is_empty() {
            root.insert("module".to_string(), json!(self.modules));
        }
        if !self.resources.is_empty() {
            root.insert("resource".to_string(), json!(self.resources));
        }
        if !self.data.is_empty() {
            root.insert("data".to_string(), json!(self.data));
        }
        if !self.outputs.is_empty() {
            root.insert("output".to_string(), json!(self.outputs));
        }

        Value::Object(root)
    }

    fn block_ref(&self, address: String) -> BlockRef {
        BlockRef {
            stack: self.name.clone(),
            address,
        }
    }

    fn for_each_body<F: FnMut(&Value)>(&self, mut visit: F) {
        self.providers.values().flatten().for_each(&mut visit);
        self.modules.values().for_each(&mut visit);
        self.resources.values().flat_map(|b| b.values()).for_each(&mut visit);
        self.data.values().flat_map(|b| b.values()).for_each(&mut visit);
        self.outputs.values().for_each(&mut visit);
    }

    fn for_each_body_mut<F: FnMut(&mut Value)>(&mut self, mut visit: F) {
        self.providers.values_mut().flatten().for_each(&mut visit);
        self.modules.values_mut().for_each(&mut visit);
        self.resources
            .values_mut()
            .flat_map(|b| b.values_mut())
            .for_each(&mut visit);
        self.data
            .values_mut()
            .flat_map(|b| b.values_mut())
            .for_each(&mut visit);
        self.outputs.values_mut().for_each(&mut visit);
    }
}

pub fn state_file(stack: &str) -> String {
    format!("terraform.{}.tfstate", stack)
}

fn collect_strings<F: FnMut(&str)>(value: &Value, visit: &mut F) {
    match value {
        Value::String(text) => visit(text),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, visit)),
        Value::Object(fields) => fields
            .values()
            .for_each(|field| collect_strings(field, visit)),
        _ => {}
    }
}

fn rewrite_strings<F: FnMut(&str) -> String>(value: &mut Value, rewrite: &mut F) {
    match value {
        Value::String(text) => *text = rewrite(text),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| rewrite_strings(item, rewrite)),
        Value::Object(fields) => fields
            .values_mut()
            .for_each(|field| rewrite_strings(field, rewrite)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::Stack;
    use crate::token::Reference;

    #[test]
    fn block_refs_carry_stack_and_address() {
        let mut stack = Stack::new("base");
        let cluster = stack.resource("aws_ecs_cluster", "main", json!({ "name": "main" }));
        let vpc = stack.module("vpc", "terraform-aws-modules/vpc/aws", "3.14.0", json!({}));
        let ami = stack.data_source("aws_ssm_parameter", "ami", json!({ "name": "/ami" }));

        assert_eq!("aws_ecs_cluster.main", cluster.address());
        assert_eq!("module.vpc", vpc.address());
        assert_eq!("data.aws_ssm_parameter.ami", ami.address());
        assert_eq!(
            json!("${TfToken[base:aws_ecs_cluster.main.name]}"),
            cluster.attr("name").render()
        );
    }

    #[test]
    fn declares_matches_block_kinds() {
        let mut stack = Stack::new("base");
        stack.resource("aws_ecs_cluster", "main", json!({}));
        stack.module("vpc", "terraform-aws-modules/vpc/aws", "3.14.0", json!({}));
        stack.data_source("aws_ssm_parameter", "ami", json!({}));

        assert!(stack.declares("aws_ecs_cluster.main.name"));
        assert!(stack.declares("module.vpc.vpc_id"));
        assert!(stack.declares("data.aws_ssm_parameter.ami.value"));
        assert!(!stack.declares("aws_ecs_cluster.other.name"));
        assert!(!stack.declares("module.other.vpc_id"));
        assert!(!stack.declares("nonsense"));
    }

    #[test]
    fn finds_and_rewrites_references() {
        let mut stack = Stack::new("app");
        let foreign = crate::token::Expr::reference("base", "module.vpc.vpc_id");
        stack.resource(
            "aws_security_group",
            "sg",
            json!({ "vpc_id": foreign, "tags": { "Name": "sg" } }),
        );

        let found: Vec<Reference> = stack.references().into_iter().collect();
        assert_eq!(vec![Reference::new("base", "module.vpc.vpc_id")], found);

        stack.rewrite_references(|reference| format!("remote.{}", reference.address));
        let rendered = stack.to_terraform_json();
        assert_eq!(
            json!("${remote.module.vpc.vpc_id}"),
            rendered["resource"]["aws_security_group"]["sg"]["vpc_id"]
        );
        assert!(stack.references().is_empty());
    }

    #[test]
    fn module_body_merges_source_and_inputs() {
        let mut stack = Stack::new("base");
        stack.module(
            "vpc",
            "terraform-aws-modules/vpc/aws",
            "3.14.0",
            json!({ "cidr": "10.0.0.0/16" }),
        );

        let rendered = stack.to_terraform_json();
        assert_eq!(
            json!({
                "source": "terraform-aws-modules/vpc/aws",
                "version": "3.14.0",
                "cidr": "10.0.0.0/16",
            }),
            rendered["module"]["vpc"]
        );
        assert_eq!(
            json!("terraform.base.tfstate"),
            rendered["terraform"]["backend"]["local"]["path"]
        );
        assert!(rendered.get("output").is_none());
    }

    #[test]
    fn remote_state_is_declared_once() {
        let mut stack = Stack::new("app");
        let first = stack.remote_state("base");
        let second = stack.remote_state("base");

        assert_eq!(first, second);
        assert_eq!(1, stack.dependencies().len());
        assert_eq!(
            json!("../base/terraform.base.tfstate"),
            stack.to_terraform_json()["data"]["terraform_remote_state"]["base"]["config"]["path"]
        );
    }
}
