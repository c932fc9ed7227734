//! The trust file (`u8trust.yaml`) and the `TrustPrompter` trait that
//! factors the interactive "trust this publisher?" decision out of the
//! resolver so tests never touch a real terminal.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::RsaPublicKey;
use crate::serializer::encode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustAll {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default, rename = "UNS_names")]
    pub uns_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustModuleEntry {
    #[serde(default)]
    pub module_names: Vec<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default, rename = "UNS_names")]
    pub uns_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustStore {
    #[serde(default)]
    pub trust_all: TrustAll,
    #[serde(default)]
    pub trust_modules: Vec<TrustModuleEntry>,
}

/// Candidate trust-file locations, checked in order; the first that exists
/// wins.
pub fn trust_file_candidates(home: &Path) -> Vec<PathBuf> {
    vec![
        PathBuf::from("u8trust.yaml"),
        PathBuf::from("./.u8/u8trust.yaml"),
        home.join(".u8").join("u8trust.yaml"),
    ]
}

impl TrustStore {
    pub fn load_from(home: &Path) -> Self {
        for candidate in trust_file_candidates(home) {
            if let Ok(data) = std::fs::read_to_string(&candidate) {
                if let Ok(store) = serde_yaml::from_str(&data) {
                    return store;
                }
            }
        }
        Self::default()
    }

    pub fn save_to(&self, home: &Path) -> std::io::Result<()> {
        let dir = home.join(".u8");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("u8trust.yaml");
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, yaml)
    }

    fn key_b64(pub_key: &RsaPublicKey) -> String {
        BASE64.encode(encode(&pub_key.pack()))
    }

    /// Does any rule in `trust_all`, or any `trust_modules` entry naming
    /// `module_name`, match this signer?
    pub fn is_trusted(&self, module_name: &str, pub_key: &RsaPublicKey, uns_name: Option<&str>) -> bool {
        let key_b64 = Self::key_b64(pub_key);
        let address = pub_key.long_address().to_safe58();

        if Self::matches(&self.trust_all.keys, &self.trust_all.addresses, &self.trust_all.uns_names, &key_b64, &address, uns_name) {
            return true;
        }
        self.trust_modules.iter().any(|entry| {
            entry.module_names.iter().any(|n| n == module_name)
                && Self::matches(&entry.keys, &entry.addresses, &entry.uns_names, &key_b64, &address, uns_name)
        })
    }

    fn matches(
        keys: &[String],
        addresses: &[String],
        uns_names: &[String],
        key_b64: &str,
        address: &str,
        uns_name: Option<&str>,
    ) -> bool {
        keys.iter().any(|k| k == key_b64)
            || addresses.iter().any(|a| a == address)
            || uns_name.is_some_and(|name| uns_names.iter().any(|n| n == name))
    }

    /// Persist an operator's "yes" decision into `trust_all`.
    pub fn grant(&mut self, pub_key: &RsaPublicKey, uns_name: Option<&str>) {
        let key_b64 = Self::key_b64(pub_key);
        if !self.trust_all.keys.contains(&key_b64) {
            self.trust_all.keys.push(key_b64);
        }
        let address = pub_key.long_address().to_safe58();
        if !self.trust_all.addresses.contains(&address) {
            self.trust_all.addresses.push(address);
        }
        if let Some(name) = uns_name {
            if !self.trust_all.uns_names.contains(&name.to_string()) {
                self.trust_all.uns_names.push(name.to_string());
            }
        }
    }
}

/// Factors the interactive trust decision out of the resolver. Tests and
/// daemon contexts supply `NonInteractiveTrustPrompter`; only a real CLI
/// session uses `InteractiveTrustPrompter`.
pub trait TrustPrompter: Send + Sync {
    fn confirm(&self, subject: &str) -> bool;
}

/// Prompts on stdin/stdout with a `y/n` question. Any answer other than a
/// leading `y`/`Y` (including EOF or an IO error) is treated as "no".
pub struct InteractiveTrustPrompter;

impl TrustPrompter for InteractiveTrustPrompter {
    fn confirm(&self, subject: &str) -> bool {
        print!("Trust {subject}? [y/N] ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(_) => matches!(line.trim().chars().next(), Some('y') | Some('Y')),
            Err(_) => false,
        }
    }
}

/// Always answers "no". Used in tests and batch/daemon contexts where no
/// terminal is attached.
pub struct NonInteractiveTrustPrompter;

impl TrustPrompter for NonInteractiveTrustPrompter {
    fn confirm(&self, _subject: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RsaPrivateKey;

    #[test]
    fn empty_store_trusts_nothing() {
        let store = TrustStore::default();
        let key = RsaPrivateKey::generate(2048).unwrap().public_key();
        assert!(!store.is_trusted("demo", &key, None));
    }

    #[test]
    fn granting_a_key_makes_it_trusted() {
        let mut store = TrustStore::default();
        let key = RsaPrivateKey::generate(2048).unwrap().public_key();
        store.grant(&key, None);
        assert!(store.is_trusted("any-module", &key, None));
    }

    #[test]
    fn trust_modules_entry_is_scoped_to_its_module_names() {
        let key = RsaPrivateKey::generate(2048).unwrap().public_key();
        let store = TrustStore {
            trust_all: TrustAll::default(),
            trust_modules: vec![TrustModuleEntry {
                module_names: vec!["wallet".to_string()],
                keys: vec![TrustStore::key_b64(&key)],
                addresses: vec![],
                uns_names: vec![],
            }],
        };
        assert!(store.is_trusted("wallet", &key, None));
        assert!(!store.is_trusted("other-module", &key, None));
    }

    #[test]
    fn non_interactive_prompter_always_declines() {
        assert!(!NonInteractiveTrustPrompter.confirm("anything"));
    }

    #[test]
    fn yaml_round_trip_preserves_trust_rules() {
        let mut store = TrustStore::default();
        let key = RsaPrivateKey::generate(2048).unwrap().public_key();
        store.grant(&key, Some("universa.wallet"));
        let yaml = serde_yaml::to_string(&store).unwrap();
        let restored: TrustStore = serde_yaml::from_str(&yaml).unwrap();
        assert!(restored.is_trusted("x", &key, Some("universa.wallet")));
    }
}
