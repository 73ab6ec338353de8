use crate::base::{BundleField, OutputBundle};
use crate::token::{func, Expr};

use super::config::PetAppBaseConfig;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AdapterError {
    #[error("Base stack does not expose `{0}`")]
    MissingBaseOutput(BundleField),
}

/// Deployment parameters the PetApp inherits alongside the base outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inherited {
    pub profile: String,
    pub region: String,
    pub repository: String,
}

/// Picks the fields a PetApp stack inherits out of a base stack's bundle.
pub fn base_config(
    bundle: &OutputBundle,
    inherited: &Inherited,
) -> Result<PetAppBaseConfig, AdapterError> {
    let field = |field: BundleField| -> Result<Expr, AdapterError> {
        bundle
            .get(field)
            .cloned()
            .ok_or(AdapterError::MissingBaseOutput(field))
    };

    Ok(PetAppBaseConfig {
        profile: inherited.profile.clone(),
        region: inherited.region.clone(),
        repository: inherited.repository.clone(),
        vpc_id: field(BundleField::VpcId)?,
        app_security_group: field(BundleField::AppSecurityGroup)?,
        public_security_group: field(BundleField::PublicSecurityGroup)?,
        public_subnets: func::tolist(field(BundleField::PublicSubnets)?),
        app_subnets: func::tolist(field(BundleField::PrivateSubnets)?),
        ecs_cluster_name: field(BundleField::EcsClusterName)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{base_config, AdapterError, Inherited};
    use crate::app::App;
    use crate::base::{BaseStack, BaseStackConfig, BundleField, SyncSource};

    fn base(app: &mut App) -> BaseStack {
        BaseStack::new(
            app,
            "dev-base",
            BaseStackConfig {
                cidr: "10.1.0.0/16".to_string(),
                profile: "AWS_PROFILE".to_string(),
                region: "us-east-1".to_string(),
                sync: SyncSource {
                    repository: "https://github.com/org/infra".to_string(),
                    branch: "main".to_string(),
                },
            },
        )
        .unwrap()
    }

    fn inherited() -> Inherited {
        Inherited {
            profile: "AWS_PROFILE".to_string(),
            region: "us-east-1".to_string(),
            repository: "org/petapp".to_string(),
        }
    }

    #[test]
    fn output_has_exactly_the_inherited_fields() {
        let mut app = App::new();
        let config = base_config(&base(&mut app).bundle(), &inherited()).unwrap();

        let rendered = json!(config);
        let keys: BTreeSet<&str> = rendered
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        let expected: BTreeSet<&str> = [
            "profile",
            "region",
            "repository",
            "vpcId",
            "appSecurityGroup",
            "publicSecurityGroup",
            "publicSubnets",
            "appSubnets",
            "ecsClusterName",
        ]
        .into_iter()
        .collect();
        assert_eq!(expected, keys);
    }

    #[test]
    fn subnets_come_from_the_base_vpc() {
        let mut app = App::new();
        let config = base_config(&base(&mut app).bundle(), &inherited()).unwrap();

        assert_eq!(
            json!("${tolist(TfToken[dev-base:module.dev-base-ue1-main.public_subnets])}"),
            config.public_subnets.render()
        );
        assert_eq!(
            json!("${tolist(TfToken[dev-base:module.dev-base-ue1-main.private_subnets])}"),
            config.app_subnets.render()
        );
        assert_eq!(
            json!("${TfToken[dev-base:aws_ecs_cluster.ecs-cluster-main.name]}"),
            config.ecs_cluster_name.render()
        );
    }

    #[test]
    fn missing_cluster_name_fails() {
        let mut app = App::new();
        let bundle = base(&mut app).bundle().without(BundleField::EcsClusterName);

        assert_eq!(
            Err(AdapterError::MissingBaseOutput(BundleField::EcsClusterName)),
            base_config(&bundle, &inherited())
        );
    }
}
