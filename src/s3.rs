use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::config::AppConfig;

/// Builds the bucket client. A custom endpoint plus static credentials
/// selects a local MinIO-style setup; otherwise the ambient AWS chain
/// applies. Path-style addressing keeps both working.
pub async fn build_client(config: &AppConfig) -> Result<S3Client> {
    let region_provider =
        RegionProviderChain::first_try(Some(Region::new(config.aws_region.clone())))
            .or_default_provider()
            .or_else("us-east-1");

    #[allow(deprecated)]
    let mut loader = aws_config::from_env().region(region_provider);

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    ) {
        loader =
            loader.credentials_provider(Credentials::new(access_key, secret_key, None, None, "static"));
    }

    let base_config = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(true)
        .build();

    Ok(S3Client::from_conf(s3_config))
}
