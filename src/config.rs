use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{fs, io, path::Path};
use validator::{Validate, ValidationError};

use crate::app::is_valid_stack_name;

pub const DEFAULT_SYNC_BRANCH: &str = "main";

/// Applications name their load balancer `<name>-lb` and target group
/// `<name>-tg`, both capped at 32 characters by AWS.
pub const MAX_APPLICATION_NAME_LENGTH: usize = 29;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SyncEntry {
    #[validate(required)]
    pub repository: Option<String>,

    pub branch: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BaseEntry {
    #[validate(required, custom = "validate_stack_name")]
    pub name: Option<String>,

    #[validate(required)]
    pub cidr: Option<String>,

    #[validate(required)]
    pub profile: Option<String>,

    pub region: Option<String>,

    #[validate(required_nested)]
    pub sync: Option<SyncEntry>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ApplicationEntry {
    #[validate(required, length(max = 29), custom = "validate_stack_name")]
    pub name: Option<String>,

    #[validate(required)]
    pub owner: Option<String>,

    #[validate(required)]
    pub branch: Option<String>,

    #[validate(required)]
    pub repository: Option<String>,

    pub profile: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_unique_names"))]
pub struct Deployment {
    #[validate]
    pub base: BaseEntry,

    #[serde(default)]
    #[validate]
    pub applications: Vec<ApplicationEntry>,
}

pub fn parse(path: &Path) -> Result<Deployment, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    let deployment: Deployment = match serde_yaml::from_str(&contents) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(error.to_string())),
    }?;

    match deployment.validate() {
        Ok(_) => (),
        Err(error) => return Err(Error::ValidationError(error.to_string())),
    }

    return Ok(deployment);
}

fn validate_stack_name(name: &str) -> Result<(), ValidationError> {
    if !is_valid_stack_name(name) {
        return Err(ValidationError::new(
            "Stack names have to start with a letter or `_` and may only contain letters, digits, `-` and `_`",
        ));
    }

    return Ok(());
}

fn validate_unique_names(deployment: &Deployment) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    let names = std::iter::once(&deployment.base.name)
        .chain(deployment.applications.iter().map(|entry| &entry.name))
        .flatten();

    for name in names {
        if !seen.insert(name) {
            return Err(ValidationError::new("Stack names have to be unique"));
        }
    }

    return Ok(());
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use super::parse;
    use super::ApplicationEntry;
    use super::BaseEntry;
    use super::Deployment;
    use super::Error;
    use super::SyncEntry;
    use super::MAX_APPLICATION_NAME_LENGTH;
    use tempfile::tempdir;

    fn deployment() -> Deployment {
        Deployment {
            base: BaseEntry {
                name: Some(String::from("dev-base")),
                cidr: Some(String::from("10.1.0.0/16")),
                profile: Some(String::from("dev")),
                region: None,
                sync: Some(SyncEntry {
                    repository: Some(String::from("https://github.com/org/infra")),
                    branch: None,
                }),
            },
            applications: vec![ApplicationEntry {
                name: Some(String::from("petapp-test")),
                owner: Some(String::from("admin")),
                branch: Some(String::from("main")),
                repository: Some(String::from("org/petapp")),
                profile: None,
            }],
        }
    }

    fn write_config(deployment: &Deployment) -> (tempfile::TempDir, std::path::PathBuf) {
        let config_contents = serde_yaml::to_string(deployment).unwrap();

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("deployment.yaml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{}", config_contents).unwrap();

        (dir, file_path)
    }

    #[test]
    fn file_does_not_exist() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("deployment.yaml");

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::FileNotFound(_) => {}
            _ => panic!("Expected `FileNotFound` error"),
        }
    }

    #[test]
    fn file_wrong_format() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("deployment.yaml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "Not yaml").unwrap();

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::ParsingError(_) => {}
            _ => panic!("Expected `ParsingError` error"),
        }
    }

    #[test]
    fn file_missing_profile() {
        let mut deployment = deployment();
        deployment.base.profile = None;
        let (_dir, file_path) = write_config(&deployment);

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn file_missing_application_branch() {
        let mut deployment = deployment();
        deployment.applications[0].branch = None;
        let (_dir, file_path) = write_config(&deployment);

        match parse(&file_path).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn file_duplicate_stack_names() {
        let mut deployment = deployment();
        deployment.applications[0].name = Some(String::from("dev-base"));
        let (_dir, file_path) = write_config(&deployment);

        match parse(&file_path).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn file_invalid_stack_name() {
        let mut deployment = deployment();
        deployment.base.name = Some(String::from("dev base"));
        let (_dir, file_path) = write_config(&deployment);

        match parse(&file_path).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn file_digit_leading_stack_name() {
        let mut deployment = deployment();
        deployment.base.name = Some(String::from("1base"));
        let (_dir, file_path) = write_config(&deployment);

        match parse(&file_path).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn file_application_name_too_long() {
        let mut deployment = deployment();
        deployment.applications[0].name =
            Some("p".repeat(MAX_APPLICATION_NAME_LENGTH + 1));
        let (_dir, file_path) = write_config(&deployment);

        match parse(&file_path).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }

        deployment.applications[0].name = Some("p".repeat(MAX_APPLICATION_NAME_LENGTH));
        let (_dir, file_path) = write_config(&deployment);
        assert_eq!(false, parse(&file_path).is_err());
    }

    #[test]
    fn parses_the_config() {
        let (_dir, file_path) = write_config(&deployment());

        let result = parse(&file_path);
        assert_eq!(false, result.is_err());
        let deployment = result.unwrap();
        assert_eq!(1, deployment.applications.len());
        assert_eq!(None, deployment.base.region);
    }
}
