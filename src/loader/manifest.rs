//! Module manifests: a YAML document at the root of every bundle naming
//! the module and, optionally, its UNS registration name.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub name: String,

    #[serde(rename = "UNS_name", default)]
    pub uns_name: Option<String>,
}

impl ModuleManifest {
    pub fn from_yaml(data: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(data)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_manifest() {
        let manifest = ModuleManifest::from_yaml("name: u8core\n").unwrap();
        assert_eq!(manifest.name, "u8core");
        assert!(manifest.uns_name.is_none());
    }

    #[test]
    fn parses_a_manifest_with_uns_name() {
        let manifest = ModuleManifest::from_yaml("name: wallet\nUNS_name: universa.wallet\n").unwrap();
        assert_eq!(manifest.uns_name.as_deref(), Some("universa.wallet"));
    }

    #[test]
    fn round_trips_through_yaml() {
        let manifest = ModuleManifest {
            name: "demo".to_string(),
            uns_name: Some("demo.uns".to_string()),
        };
        let yaml = manifest.to_yaml().unwrap();
        let restored = ModuleManifest::from_yaml(&yaml).unwrap();
        assert_eq!(restored.name, manifest.name);
        assert_eq!(restored.uns_name, manifest.uns_name);
    }
}
