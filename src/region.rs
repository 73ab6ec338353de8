use aws_config::default_provider::region::DefaultRegionChain;
use aws_config::meta::region::RegionProviderChain;
use aws_types::region::Region;
use tracing::debug;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Region for the base stack: the configured one, else the AWS default
/// provider chain (environment, then the named profile), else [`DEFAULT_REGION`].
pub async fn resolve(configured: Option<&str>, profile: Option<&str>) -> String {
    let configured = configured.map(|region| Region::new(region.to_string()));
    let region = RegionProviderChain::first_try(configured)
        .or_else(default_chain(profile))
        .or_else(DEFAULT_REGION)
        .region()
        .await;

    let region = match region {
        Some(resolved) => resolved.to_string(),
        None => String::from(DEFAULT_REGION),
    };
    debug!(%region, ?profile, "Resolved region");

    return region;
}

fn default_chain(profile: Option<&str>) -> DefaultRegionChain {
    let builder = DefaultRegionChain::builder();
    match profile {
        Some(name) => builder.profile_name(name).build(),
        None => builder.build(),
    }
}
