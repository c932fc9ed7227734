//! ModuleLoader: resolves, opens, verifies, and trust-checks signed module
//! bundles, then exposes their require-roots for source-file resolution.
//!
//! ```rust,ignore
//! use u8core::loader::{ModuleLoader, NonInteractiveTrustPrompter};
//!
//! let loader = ModuleLoader::new(home_dir, u8_publisher_key, Box::new(NonInteractiveTrustPrompter));
//! let module = loader.load("wallet").await?;
//! let path = module.resolve_required("lib/util.js")?;
//! ```

mod bundle;
mod manifest;
mod trust;

pub use bundle::{Bundle, SignatureTrailer};
pub use manifest::ModuleManifest;
pub use trust::{InteractiveTrustPrompter, NonInteractiveTrustPrompter, TrustPrompter, TrustStore};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::crypto::{KeyAddress, RsaPublicKey};
use crate::session::SessionClient;

/// ModuleLoader's unified error type.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module not found: {0}")]
    NotFound(String),

    #[error("bad module signature: {0}")]
    BadSignature(String),

    #[error("untrusted signing key for module {0}")]
    UntrustedKey(String),

    #[error("manifest missing or unreadable: {0}")]
    ManifestMissing(String),

    #[error("failed to download module: {0}")]
    DownloadFailed(String),
}

pub type ModuleResult<T> = Result<T, ModuleError>;

const U8CORE_NAME: &str = "u8core";

/// Resolves a `UNS_name` to the KeyAddresses a name-registration contract
/// currently attests, by querying a remote service over a secure session.
/// Optional: the trust resolver consults this only when a manifest names a
/// `UNS_name` and a resolver was configured.
#[async_trait]
pub trait UnsResolver: Send + Sync {
    async fn resolve_addresses(&self, uns_name: &str) -> ModuleResult<Vec<KeyAddress>>;
}

/// Queries a running node over `SecureSession` (C4) with a
/// `queryNameContract` command.
pub struct SessionUnsResolver {
    client: SessionClient,
}

impl SessionUnsResolver {
    pub fn new(client: SessionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UnsResolver for SessionUnsResolver {
    async fn resolve_addresses(&self, uns_name: &str) -> ModuleResult<Vec<KeyAddress>> {
        use crate::serializer::Value;
        let params = Value::Mapping(vec![("name".to_string(), Value::from(uns_name))]);
        let reply = self
            .client
            .command("queryNameContract", params)
            .await
            .map_err(|e| ModuleError::DownloadFailed(e.to_string()))?;
        let addresses = reply
            .get("addresses")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ModuleError::DownloadFailed("malformed queryNameContract reply".into()))?;
        addresses
            .iter()
            .map(|v| {
                v.as_bytes()
                    .ok_or_else(|| ModuleError::DownloadFailed("non-bytes address in reply".into()))
                    .and_then(|b| KeyAddress::from_bytes(b.to_vec()).map_err(|e| ModuleError::DownloadFailed(e.to_string())))
            })
            .collect()
    }
}

/// A loaded, signature-verified, trust-checked module ready for source
/// resolution.
pub struct LoadedModule {
    pub manifest: ModuleManifest,
    pub signer: RsaPublicKey,
    bundle: Bundle,
    require_roots: Vec<String>,
}

impl LoadedModule {
    /// Resolve `name` per the require-root search order: literal if
    /// absolute or `./`-prefixed, otherwise the first require-root under
    /// which it exists as a zip entry.
    pub fn resolve_required(&self, name: &str) -> ModuleResult<String> {
        if name.starts_with('/') || name.starts_with("./") {
            return Ok(name.to_string());
        }
        for root in &self.require_roots {
            let candidate = if root.is_empty() {
                name.to_string()
            } else {
                format!("{root}/{name}")
            };
            if self.bundle.entry_names()?.iter().any(|n| n == &candidate) {
                return Ok(candidate);
            }
        }
        Err(ModuleError::NotFound(name.to_string()))
    }

    pub fn read_file(&self, entry_path: &str) -> ModuleResult<Vec<u8>> {
        self.bundle.read_entry(entry_path)
    }
}

/// Resolves, opens, verifies, and trust-checks module bundles.
pub struct ModuleLoader {
    home: PathBuf,
    u8_publisher_key: RsaPublicKey,
    prompter: Box<dyn TrustPrompter>,
    uns_resolver: Option<Box<dyn UnsResolver>>,
    http: reqwest::Client,
}

impl ModuleLoader {
    /// `u8_publisher_key` is the hardcoded trust anchor that must sign the
    /// `u8core` bundle; in a real deployment this is compiled in, not
    /// supplied at runtime, but threading it through the constructor keeps
    /// this component testable without a fabricated embedded constant.
    pub fn new(home: PathBuf, u8_publisher_key: RsaPublicKey, prompter: Box<dyn TrustPrompter>) -> Self {
        Self {
            home,
            u8_publisher_key,
            prompter,
            uns_resolver: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_uns_resolver(mut self, resolver: Box<dyn UnsResolver>) -> Self {
        self.uns_resolver = Some(resolver);
        self
    }

    async fn resolve_bundle_bytes(&self, name: &str) -> ModuleResult<Vec<u8>> {
        let literal = Path::new(name);
        if literal.is_absolute() && literal.exists() {
            return std::fs::read(literal).map_err(|e| ModuleError::NotFound(e.to_string()));
        }
        if literal.exists() {
            return std::fs::read(literal).map_err(|e| ModuleError::NotFound(e.to_string()));
        }

        let local = PathBuf::from("./.u8/modules").join(name);
        if local.exists() {
            return std::fs::read(&local).map_err(|e| ModuleError::NotFound(e.to_string()));
        }

        let home_path = self.home.join(".u8/modules").join(name);
        if home_path.exists() {
            return std::fs::read(&home_path).map_err(|e| ModuleError::NotFound(e.to_string()));
        }

        if name.starts_with("http://") || name.starts_with("https://") {
            let response = self
                .http
                .get(name)
                .send()
                .await
                .map_err(|e| ModuleError::DownloadFailed(e.to_string()))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ModuleError::DownloadFailed(e.to_string()))?
                .to_vec();

            let sanitized: String = name
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect();
            let cache_dir = self.home.join(".u8/loaded_modules");
            std::fs::create_dir_all(&cache_dir).map_err(|e| ModuleError::DownloadFailed(e.to_string()))?;
            let cache_path = cache_dir.join(format!("{sanitized}.u8m"));
            std::fs::write(&cache_path, &bytes).map_err(|e| ModuleError::DownloadFailed(e.to_string()))?;
            return Ok(bytes);
        }

        Err(ModuleError::NotFound(name.to_string()))
    }

    /// Load an embedded bundle, e.g. the compiled-in u8core, bypassing
    /// filesystem/network resolution.
    pub async fn load_embedded(&mut self, raw: &'static [u8]) -> ModuleResult<LoadedModule> {
        let bundle = Bundle::from_embedded(raw)?;
        self.finish_load(bundle, true).await
    }

    /// Resolve, open, verify, and trust-check the named module.
    pub async fn load(&mut self, name: &str) -> ModuleResult<LoadedModule> {
        let raw = self.resolve_bundle_bytes(name).await?;
        let bundle = Bundle::parse(&raw)?;
        self.finish_load(bundle, name == U8CORE_NAME).await
    }

    async fn finish_load(&mut self, bundle: Bundle, is_u8core: bool) -> ModuleResult<LoadedModule> {
        if !bundle.verify_signature()? {
            return Err(ModuleError::BadSignature("signature does not match bundle body".into()));
        }

        let manifest_bytes = bundle.read_entry("manifest.yaml")?;
        let manifest_yaml =
            String::from_utf8(manifest_bytes).map_err(|e| ModuleError::ManifestMissing(e.to_string()))?;
        let manifest = ModuleManifest::from_yaml(&manifest_yaml)
            .map_err(|e| ModuleError::ManifestMissing(e.to_string()))?;

        let signer = bundle.trailer.pub_key.clone();

        if is_u8core {
            if signer != self.u8_publisher_key {
                return Err(ModuleError::UntrustedKey(manifest.name.clone()));
            }
        } else {
            self.ensure_trusted(&manifest, &signer).await?;
        }

        let mut require_roots = Vec::new();
        if !is_u8core {
            require_roots.push(String::new());
        }
        let jslib_present = bundle
            .entry_names()?
            .iter()
            .any(|n| n == "jslib" || n.starts_with("jslib/"));
        if jslib_present {
            require_roots.push("jslib".to_string());
        } else if is_u8core {
            return Err(ModuleError::ManifestMissing("u8core bundle has no jslib/".into()));
        }

        Ok(LoadedModule {
            manifest,
            signer,
            bundle,
            require_roots,
        })
    }

    async fn ensure_trusted(&mut self, manifest: &ModuleManifest, signer: &RsaPublicKey) -> ModuleResult<()> {
        let mut store = TrustStore::load_from(&self.home);
        if store.is_trusted(&manifest.name, signer, manifest.uns_name.as_deref()) {
            return Ok(());
        }

        if let (Some(resolver), Some(uns_name)) = (&self.uns_resolver, &manifest.uns_name) {
            if let Ok(addresses) = resolver.resolve_addresses(uns_name).await {
                if addresses.contains(signer.long_address()) {
                    return Ok(());
                }
            }
        }

        let subject = format!(
            "module '{}' signed by {}",
            manifest.name,
            signer.long_address().to_safe58()
        );
        if self.prompter.confirm(&subject) {
            store.grant(signer, manifest.uns_name.as_deref());
            let _ = store.save_to(&self.home);
            return Ok(());
        }

        Err(ModuleError::UntrustedKey(manifest.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RsaPrivateKey;

    fn signed_bundle(key: &RsaPrivateKey, manifest_yaml: &str, files: &[(String, Vec<u8>)]) -> Vec<u8> {
        let zip = Bundle::build_zip(manifest_yaml, files).unwrap();
        Bundle::sign(zip, key).unwrap()
    }

    #[tokio::test]
    async fn loads_a_trusted_module_from_a_literal_path() {
        let dir = tempfile::tempdir().unwrap();
        let signer = RsaPrivateKey::generate(2048).unwrap();
        let signed = signed_bundle(
            &signer,
            "name: demo\n",
            &[("jslib/util.js".to_string(), b"1".to_vec())],
        );
        let bundle_path = dir.path().join("demo.u8m");
        std::fs::write(&bundle_path, &signed).unwrap();

        let home = dir.path().join("home");
        let mut store = TrustStore::default();
        store.grant(&signer.public_key(), None);
        std::fs::create_dir_all(home.join(".u8")).unwrap();
        store.save_to(&home).unwrap();

        let mut loader = ModuleLoader::new(
            home,
            RsaPrivateKey::generate(2048).unwrap().public_key(),
            Box::new(NonInteractiveTrustPrompter),
        );
        let loaded = loader.load(bundle_path.to_str().unwrap()).await.unwrap();
        assert_eq!(loaded.manifest.name, "demo");
        assert!(loaded.require_roots.contains(&"jslib".to_string()));
        assert_eq!(loaded.resolve_required("util.js").unwrap(), "jslib/util.js");
    }

    #[tokio::test]
    async fn rejects_an_untrusted_signer_with_non_interactive_prompter() {
        let dir = tempfile::tempdir().unwrap();
        let signer = RsaPrivateKey::generate(2048).unwrap();
        let signed = signed_bundle(&signer, "name: demo\n", &[]);
        let bundle_path = dir.path().join("demo.u8m");
        std::fs::write(&bundle_path, &signed).unwrap();

        let mut loader = ModuleLoader::new(
            dir.path().join("home"),
            RsaPrivateKey::generate(2048).unwrap().public_key(),
            Box::new(NonInteractiveTrustPrompter),
        );
        let err = loader.load(bundle_path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, ModuleError::UntrustedKey(_)));
    }

    #[tokio::test]
    async fn u8core_must_be_signed_by_the_hardcoded_publisher_key() {
        let dir = tempfile::tempdir().unwrap();
        let wrong_signer = RsaPrivateKey::generate(2048).unwrap();
        let signed = signed_bundle(
            &wrong_signer,
            "name: u8core\n",
            &[("jslib/index.js".to_string(), b"1".to_vec())],
        );
        let bundle_path = dir.path().join("u8core.u8m");
        std::fs::write(&bundle_path, &signed).unwrap();

        let publisher_key = RsaPrivateKey::generate(2048).unwrap().public_key();
        let mut loader = ModuleLoader::new(dir.path().join("home"), publisher_key, Box::new(NonInteractiveTrustPrompter));
        let err = loader.load(bundle_path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, ModuleError::UntrustedKey(_)));
    }

    #[tokio::test]
    async fn a_bad_signature_aborts_before_any_trust_check() {
        let dir = tempfile::tempdir().unwrap();
        let signer = RsaPrivateKey::generate(2048).unwrap();
        let mut signed = signed_bundle(&signer, "name: demo\n", &[]);
        let last = signed.len() - 1;
        signed[last] ^= 0xFF;
        let bundle_path = dir.path().join("demo.u8m");
        std::fs::write(&bundle_path, &signed).unwrap();

        let mut loader = ModuleLoader::new(
            dir.path().join("home"),
            RsaPrivateKey::generate(2048).unwrap().public_key(),
            Box::new(NonInteractiveTrustPrompter),
        );
        let err = loader.load(bundle_path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, ModuleError::BadSignature(_)));
    }
}
