//! The ordered set of stacks for one program run.
//!
//! Stacks are added in construction order. Adding a stack resolves its
//! reference tokens: references into itself become plain addresses, references
//! into an earlier stack become remote state lookups backed by an output on the
//! producer. A reference to any other stack is rejected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::stack::Stack;
use crate::token::Reference;
use crate::writer;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Stack name `{0}` has to start with a letter or `_` and may only contain letters, digits, `-` and `_`")]
    InvalidStackName(String),

    #[error("Stack `{0}` was already added")]
    DuplicateStack(String),

    #[error("Stack `{stack}` references `{address}` of stack `{producer}`, which was not constructed before it")]
    DanglingReference {
        stack: String,
        producer: String,
        address: String,
    },

    #[error("Failed to write {0}: {1}")]
    WriteError(String, String),
}

#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|stack| stack.name() == name)
    }

    #[instrument(skip_all, fields(stack = %stack.name()))]
    pub fn add(&mut self, mut stack: Stack) -> Result<(), Error> {
        let name = stack.name().to_string();
        if !is_valid_stack_name(&name) {
            return Err(Error::InvalidStackName(name));
        }
        if self.stack(&name).is_some() {
            return Err(Error::DuplicateStack(name));
        }

        let references = stack.references();
        for reference in &references {
            let known = if reference.stack == name {
                stack.declares(&reference.address)
            } else {
                self.stack(&reference.stack)
                    .map_or(false, |producer| producer.declares(&reference.address))
            };
            if !known {
                return Err(dangling(&name, reference));
            }
        }

        let mut resolved: BTreeMap<Reference, String> = BTreeMap::new();
        for reference in references {
            let target = if reference.stack == name {
                reference.address.clone()
            } else {
                self.export(&reference);
                let remote = stack.remote_state(&reference.stack);
                format!("{}.outputs.{}", remote.address(), output_name(&reference.address))
            };
            debug!(token = %reference.token(), %target, "Resolved reference");
            resolved.insert(reference, target);
        }

        stack.rewrite_references(|reference| {
            resolved
                .get(reference)
                .cloned()
                .unwrap_or_else(|| reference.address.clone())
        });

        info!(dependencies = stack.dependencies().len(), "Added stack");
        self.stacks.push(stack);

        Ok(())
    }

    /// Writes every stack plus a manifest under `outdir`, returning the written paths.
    #[instrument(skip(self))]
    pub fn synth(&self, outdir: &Path) -> Result<Vec<PathBuf>, Error> {
        let mut written = Vec::with_capacity(self.stacks.len() + 1);
        let mut manifest = serde_json::Map::new();

        for stack in &self.stacks {
            let relative = PathBuf::from("stacks").join(stack.name()).join("cdk.tf.json");
            let path = outdir.join(&relative);
            writer::write_json(&path, &stack.to_terraform_json())
                .map_err(|error| write_error(&path, error))?;
            info!(stack = stack.name(), path = %path.display(), "Synthesized stack");

            manifest.insert(
                stack.name().to_string(),
                json!({
                    "name": stack.name(),
                    "synthesizedStackPath": relative.display().to_string(),
                    "workingDirectory": PathBuf::from("stacks").join(stack.name()).display().to_string(),
                    "dependencies": stack.dependencies(),
                }),
            );
            written.push(path);
        }

        let path = outdir.join("manifest.json");
        let order: Vec<&str> = self.stacks.iter().map(Stack::name).collect();
        let contents = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "order": order,
            "stacks": manifest,
        });
        writer::write_json(&path, &contents).map_err(|error| write_error(&path, error))?;
        written.push(path);

        Ok(written)
    }

    /// Makes `reference` available as an output of its producer stack.
    fn export(&mut self, reference: &Reference) {
        let producer = self
            .stacks
            .iter_mut()
            .find(|stack| stack.name() == reference.stack);

        if let Some(producer) = producer {
            let output = output_name(&reference.address);
            if !producer.has_output(&output) {
                debug!(producer = producer.name(), output = %output, "Exporting cross-stack output");
                producer.output(&output, json!(format!("${{{}}}", reference.address)));
            }
        }
    }
}

/// Stack names become Terraform block labels, so they follow identifier rules.
pub fn is_valid_stack_name(name: &str) -> bool {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$")
        .map(|regex| regex.is_match(name))
        .unwrap_or(false)
}

fn output_name(address: &str) -> String {
    format!("cross-stack-output-{}", address.replace('.', "_"))
}

fn write_error(path: &Path, error: writer::Error) -> Error {
    Error::WriteError(path.display().to_string(), error.to_string())
}

fn dangling(stack: &str, reference: &Reference) -> Error {
    Error::DanglingReference {
        stack: stack.to_string(),
        producer: reference.stack.clone(),
        address: reference.address.clone(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    use super::{is_valid_stack_name, App, Error};
    use crate::stack::Stack;
    use crate::token::Expr;

    fn producer() -> (Stack, crate::stack::BlockRef) {
        let mut stack = Stack::new("base");
        let cluster = stack.resource("aws_ecs_cluster", "main", json!({ "name": "main" }));
        (stack, cluster)
    }

    #[test]
    fn local_references_become_addresses() {
        let mut stack = Stack::new("base");
        let cluster = stack.resource("aws_ecs_cluster", "main", json!({ "name": "main" }));
        stack.resource(
            "aws_ecs_cluster_capacity_providers",
            "main",
            json!({ "cluster_name": cluster.attr("name") }),
        );

        let mut app = App::new();
        app.add(stack).unwrap();

        let rendered = app.stack("base").unwrap().to_terraform_json();
        assert_eq!(
            json!("${aws_ecs_cluster.main.name}"),
            rendered["resource"]["aws_ecs_cluster_capacity_providers"]["main"]["cluster_name"]
        );
        assert!(rendered.get("output").is_none());
    }

    #[test]
    fn cross_stack_references_become_remote_state() {
        let (base, cluster) = producer();
        let mut app = App::new();
        app.add(base).unwrap();

        let mut consumer = Stack::new("petapp");
        consumer.resource(
            "aws_ecs_service",
            "svc",
            json!({ "cluster": cluster.attr("name") }),
        );
        app.add(consumer).unwrap();

        let base = app.stack("base").unwrap().to_terraform_json();
        assert_eq!(
            json!({ "value": "${aws_ecs_cluster.main.name}" }),
            base["output"]["cross-stack-output-aws_ecs_cluster_main_name"]
        );

        let petapp = app.stack("petapp").unwrap();
        assert!(petapp.dependencies().contains("base"));
        assert_eq!(
            json!("${data.terraform_remote_state.base.outputs.cross-stack-output-aws_ecs_cluster_main_name}"),
            petapp.to_terraform_json()["resource"]["aws_ecs_service"]["svc"]["cluster"]
        );
    }

    #[test]
    fn reference_to_missing_stack_is_dangling() {
        let (_, cluster) = producer();
        let mut consumer = Stack::new("petapp");
        consumer.resource("aws_ecs_service", "svc", json!({ "cluster": cluster.attr("name") }));

        let mut app = App::new();
        let result = app.add(consumer);
        assert_eq!(
            Err(Error::DanglingReference {
                stack: "petapp".to_string(),
                producer: "base".to_string(),
                address: "aws_ecs_cluster.main.name".to_string(),
            }),
            result
        );
        assert!(app.stacks().is_empty());
    }

    #[test]
    fn reference_to_undeclared_block_is_dangling() {
        let (base, _) = producer();
        let mut app = App::new();
        app.add(base).unwrap();

        let mut consumer = Stack::new("petapp");
        consumer.resource(
            "aws_ecs_service",
            "svc",
            json!({ "cluster": Expr::reference("base", "aws_ecs_cluster.ghost.name") }),
        );

        match app.add(consumer) {
            Err(Error::DanglingReference { .. }) => {}
            other => panic!("Expected `DanglingReference` error, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_and_invalid_names_are_rejected() {
        let mut app = App::new();
        app.add(Stack::new("base")).unwrap();

        assert_eq!(
            Err(Error::DuplicateStack("base".to_string())),
            app.add(Stack::new("base"))
        );
        assert_eq!(
            Err(Error::InvalidStackName("bad name".to_string())),
            app.add(Stack::new("bad name"))
        );
        assert_eq!(
            Err(Error::InvalidStackName("1base".to_string())),
            app.add(Stack::new("1base"))
        );
        assert!(is_valid_stack_name("dev-base_1"));
        assert!(is_valid_stack_name("_base"));
        assert!(!is_valid_stack_name("1base"));
        assert!(!is_valid_stack_name("-base"));
        assert!(!is_valid_stack_name(""));
    }

    #[test]
    fn synth_writes_stacks_and_manifest() {
        let (base, cluster) = producer();
        let mut app = App::new();
        app.add(base).unwrap();
        let mut consumer = Stack::new("petapp");
        consumer.resource("aws_ecs_service", "svc", json!({ "cluster": cluster.attr("name") }));
        app.add(consumer).unwrap();

        let dir = tempdir().unwrap();
        let written = app.synth(dir.path()).unwrap();
        assert_eq!(3, written.len());

        let contents =
            std::fs::read_to_string(dir.path().join("stacks/petapp/cdk.tf.json")).unwrap();
        let stack: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert!(stack["data"]["terraform_remote_state"]["base"].is_object());

        let contents = std::fs::read_to_string(dir.path().join("manifest.json")).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json!(["base", "petapp"]), manifest["order"]);
        assert_eq!(json!(["base"]), manifest["stacks"]["petapp"]["dependencies"]);
    }
}
