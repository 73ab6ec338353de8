//! Configuration of the PetApp stack, assembled from independent partials.

use serde::Serialize;
use validator::Validate;

use crate::token::Expr;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Validation errors: {0}")]
    Validation(String),
}

/// Fields inherited from the base stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PetAppBaseConfig {
    pub profile: String,
    pub region: String,
    pub repository: String,
    pub vpc_id: Expr,
    pub app_security_group: Expr,
    pub public_security_group: Expr,
    pub public_subnets: Expr,
    pub app_subnets: Expr,
    pub ecs_cluster_name: Expr,
}

/// Fields every stack carries regardless of what it deploys.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct StackMetadata {
    #[validate(length(min = 1))]
    pub owner: String,
}

/// Fields only the PetApp stack knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct PetAppCustomConfig {
    #[validate(length(min = 1))]
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PetAppStackConfig {
    pub base: PetAppBaseConfig,
    pub metadata: StackMetadata,
    pub custom: PetAppCustomConfig,
}

impl PetAppStackConfig {
    pub fn builder() -> PetAppStackConfigBuilder {
        PetAppStackConfigBuilder::default()
    }
}

/// Collects the partial records; [`build`](Self::build) checks the union once.
#[derive(Debug, Default, Validate)]
pub struct PetAppStackConfigBuilder {
    #[validate(required)]
    base: Option<PetAppBaseConfig>,

    #[validate(required_nested)]
    metadata: Option<StackMetadata>,

    #[validate(required_nested)]
    custom: Option<PetAppCustomConfig>,
}

impl PetAppStackConfigBuilder {
    pub fn base(mut self, base: PetAppBaseConfig) -> Self {
        self.base = Some(base);
        self
    }

    pub fn metadata(mut self, metadata: StackMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn custom(mut self, custom: PetAppCustomConfig) -> Self {
        self.custom = Some(custom);
        self
    }

    pub fn build(self) -> Result<PetAppStackConfig, ConfigError> {
        if let Err(error) = self.validate() {
            return Err(ConfigError::Validation(error.to_string()));
        }

        match (self.base, self.metadata, self.custom) {
            (Some(base), Some(metadata), Some(custom)) => Ok(PetAppStackConfig {
                base,
                metadata,
                custom,
            }),
            _ => Err(ConfigError::Validation(String::from(
                "PetApp configuration is incomplete",
            ))),
        }
    }
}
