use std::collections::BTreeMap;

/// Field names a per-call override may use. They match the names operators
/// see in step configuration.
pub mod keys {
    pub const API_URL: &str = "apiURL";
    pub const NAMESPACE: &str = "namespace";
    pub const AUTH_TOKEN: &str = "authToken";
    pub const VERBOSE: &str = "verbose";
    pub const DEPLOYMENT_CONFIG: &str = "depCfg";
    pub const REPLICA_COUNT: &str = "replicaCount";
    pub const VERIFY_REPLICA_COUNT: &str = "verifyReplicaCount";
    pub const TEST_STREAM: &str = "testStream";
    pub const TEST_TAG: &str = "testTag";
    pub const PROD_STREAM: &str = "prodStream";
    pub const PROD_TAG: &str = "prodTag";
    pub const DESTINATION_NAMESPACE: &str = "destinationNamespace";
    pub const DESTINATION_AUTH_TOKEN: &str = "destinationAuthToken";
    pub const JSON_YAML: &str = "jsonyaml";
}

/// Values that shadow step configuration for a single invocation.
///
/// The map is never written back into the step configuration. A missing key
/// means the configured value applies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides(BTreeMap<String, String>);

impl Overrides {
    pub fn new() -> Overrides {
        Overrides::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the override for `key` when one is present, `base` otherwise.
    pub fn resolve<'a>(&'a self, key: &str, base: &'a str) -> &'a str {
        self.get(key).unwrap_or(base)
    }

    pub fn resolve_flag(&self, key: &str, base: bool) -> bool {
        match self.get(key) {
            Some(value) => parse_flag(value),
            None => base,
        }
    }
}

impl FromIterator<(String, String)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Overrides(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for Overrides {
    fn from(map: BTreeMap<String, String>) -> Self {
        Overrides(map)
    }
}

/// Only a case-insensitive "true" is true.
pub fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Parses a `key=value` pair as given on the command line.
pub fn parse_override(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {:?}", raw)),
    }
}
