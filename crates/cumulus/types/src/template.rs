use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute template describing an image (`NAME`, `TYPE`, `SIZE`, ...).
///
/// Attribute names are case-insensitive and stored uppercase.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageTemplate {
    attributes: BTreeMap<String, String>,
}

impl ImageTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.replace(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Set an attribute, overwriting any previous value
    pub fn replace(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(name.to_ascii_uppercase(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(&name.to_ascii_uppercase())
    }

    /// Serialized form used as the payload of CREATE authorization requests
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.attributes).unwrap_or_default()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ImageTemplate {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut template = Self::new();
        for (k, v) in iter {
            template.replace(k.as_ref(), v);
        }
        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_case_insensitive() {
        let mut template = ImageTemplate::new().with("name", "ubuntu");
        assert_eq!(template.get("NAME"), Some("ubuntu"));

        template.replace("Name", "debian");
        assert_eq!(template.get("name"), Some("debian"));
        assert_eq!(template.to_json(), r#"{"NAME":"debian"}"#);
    }

    #[test]
    fn test_json_payload() {
        let template: ImageTemplate = [("NAME", "a"), ("SIZE", "10")].into_iter().collect();
        assert_eq!(template.to_json(), r#"{"NAME":"a","SIZE":"10"}"#);
    }
}
