//! DynamoDB client pool — §4.3 "DynamoDB: `(endpoint, region, access-key,
//! secret-key, session-token)` → client", and §3.5's credential chain:
//! static credentials → process environment → web-identity (token file +
//! role ARN) → instance/container role providers, in that priority order.

use aws_config::meta::region::RegionProviderChain;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::Client;

use crate::pool::Pool;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DynamoDbKey {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
}

pub type DynamoDbPool = Pool<DynamoDbKey, Client>;

pub async fn connect(key: &DynamoDbKey) -> Result<Client, aws_config::BuildError> {
    let region_provider = RegionProviderChain::first_try(aws_sdk_dynamodb::config::Region::new(key.region.clone()));

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region_provider);

    // Static credentials take priority over the SDK's own env/web-identity/
    // instance-role chain; if neither access nor secret key is supplied the
    // SDK's default provider chain (env vars, then web identity, then
    // instance/container role) runs unmodified.
    if let (Some(access_key), Some(secret_key)) = (&key.access_key, &key.secret_key) {
        let credentials = Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            key.session_token.clone(),
            None,
            "sql-builtin-static",
        );
        loader = loader.credentials_provider(credentials);
    }

    let sdk_config = loader.load().await;
    let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &key.endpoint {
        builder = builder.endpoint_url(endpoint.clone());
    }
    Ok(Client::from_conf(builder.build()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_with_only_region_set_is_distinct_from_default() {
        let a = DynamoDbKey { region: "us-east-1".to_string(), ..Default::default() };
        let b = DynamoDbKey::default();
        assert_ne!(a, b);
    }
}
