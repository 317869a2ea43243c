//! Capability descriptor tags — §6 "Capabilities advertisement".
//!
//! spec.md lists these as bare strings in the engine's capability
//! descriptor; we keep them as a typed, enumerable set instead, mirroring
//! the teacher's `fraiseql_core::schema::introspection` descriptors.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityTag {
    BjsonBundle,
    GrpcService,
    KafkaDataPlugin,
    GitDataPlugin,
    LdapDataPlugin,
    S3DataPlugin,
    OktaDataPlugin,
    HttpDataPlugin,
    LiaPlugin,
}

impl CapabilityTag {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BjsonBundle => "bjson_bundle",
            Self::GrpcService => "grpc_service",
            Self::KafkaDataPlugin => "kafka_data_plugin",
            Self::GitDataPlugin => "git_data_plugin",
            Self::LdapDataPlugin => "ldap_data_plugin",
            Self::S3DataPlugin => "s3_data_plugin",
            Self::OktaDataPlugin => "okta_data_plugin",
            Self::HttpDataPlugin => "http_data_plugin",
            Self::LiaPlugin => "lia_plugin",
        }
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deduplicated, order-stable set of capability tags advertised by this
/// extension build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    tags: Vec<CapabilityTag>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: CapabilityTag) -> &mut Self {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn contains(&self, tag: CapabilityTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = CapabilityTag> + '_ {
        self.tags.iter().copied()
    }

    pub fn as_strings(&self) -> Vec<&'static str> {
        self.tags.iter().map(|t| t.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_deduplicates() {
        let mut set = CapabilitySet::new();
        set.insert(CapabilityTag::S3DataPlugin);
        set.insert(CapabilityTag::S3DataPlugin);
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn as_strings_matches_spec_names() {
        let mut set = CapabilitySet::new();
        set.insert(CapabilityTag::HttpDataPlugin);
        set.insert(CapabilityTag::LiaPlugin);
        assert_eq!(set.as_strings(), vec!["http_data_plugin", "lia_plugin"]);
    }
}
