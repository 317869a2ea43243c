//! Document-store (MongoDB) client pool — §4.3 "Document store: `(uri,
//! credential-bytes)` → client".

use mongodb::options::{ClientOptions, Credential};
use mongodb::Client;

use crate::pool::Pool;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DocumentStoreKey {
    pub uri: String,
    /// A stable fingerprint of the auth sub-object, not the credential
    /// material itself — this is a pool identity key, not storage.
    pub credential_fingerprint: String,
}

pub type DocumentStorePool = Pool<DocumentStoreKey, Client>;

pub async fn connect(uri: &str, credential: Option<Credential>) -> Result<Client, mongodb::error::Error> {
    let mut options = ClientOptions::parse(uri).await?;
    if let Some(credential) = credential {
        options.credential = Some(credential);
    }
    Client::with_options(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_differ_by_credential_fingerprint_even_with_the_same_uri() {
        let a = DocumentStoreKey { uri: "mongodb://h/db".to_string(), credential_fingerprint: "f1".to_string() };
        let b = DocumentStoreKey { uri: "mongodb://h/db".to_string(), credential_fingerprint: "f2".to_string() };
        assert_ne!(a, b);
    }
}
