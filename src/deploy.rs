//! Turns a parsed deployment file into an [`App`]: the base stack first, then
//! every application on top of it.

use tracing::{info, instrument};

use crate::app::{self, App};
use crate::base::{BaseStack, BaseStackConfig, SyncSource};
use crate::config::{Deployment, DEFAULT_SYNC_BRANCH};
use crate::petapp::{
    base_config, AdapterError, ConfigError, Inherited, PetAppCustomConfig, PetAppStack,
    PetAppStackConfig, StackMetadata,
};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Missing required field `{0}`")]
    MissingField(&'static str),

    #[error(transparent)]
    App(#[from] app::Error),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, Error> {
    value.clone().ok_or(Error::MissingField(field))
}

#[instrument(skip(deployment))]
pub fn compose(deployment: &Deployment, region: &str) -> Result<App, Error> {
    let mut app = App::new();

    let entry = &deployment.base;
    let sync = entry.sync.as_ref().ok_or(Error::MissingField("base.sync"))?;
    let base = BaseStack::new(
        &mut app,
        &required(&entry.name, "base.name")?,
        BaseStackConfig {
            cidr: required(&entry.cidr, "base.cidr")?,
            profile: required(&entry.profile, "base.profile")?,
            region: region.to_string(),
            sync: SyncSource {
                repository: required(&sync.repository, "base.sync.repository")?,
                branch: sync
                    .branch
                    .clone()
                    .unwrap_or_else(|| String::from(DEFAULT_SYNC_BRANCH)),
            },
        },
    )?;
    let bundle = base.bundle();

    for entry in &deployment.applications {
        let inherited = Inherited {
            profile: entry.profile.clone().unwrap_or_else(|| base.profile.clone()),
            region: base.region.clone(),
            repository: required(&entry.repository, "applications.repository")?,
        };
        let config = PetAppStackConfig::builder()
            .base(base_config(&bundle, &inherited)?)
            .metadata(StackMetadata {
                owner: required(&entry.owner, "applications.owner")?,
            })
            .custom(PetAppCustomConfig {
                branch: required(&entry.branch, "applications.branch")?,
            })
            .build()?;

        PetAppStack::new(&mut app, &required(&entry.name, "applications.name")?, config)?;
    }

    info!(stacks = app.stacks().len(), "Composed stacks");

    Ok(app)
}
