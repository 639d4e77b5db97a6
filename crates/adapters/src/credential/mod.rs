// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential injection.
//!
//! Each credential type may add environment variables, command line
//! arguments or files for a run. Injectors are looked up by the credential's
//! namespace in an [`InjectorRegistry`]; new types are added by registering
//! another injector, the engine never matches on credential types itself.

mod builtin;
mod custom;

pub use builtin::{EnvField, EnvMappingInjector, GceInjector, KubernetesInjector, OpenStackInjector};
pub use custom::{CustomInjector, ENV_BLOCKLIST};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ax_core::Credential;
use thiserror::Error;

/// Placeholder for secret values in the safe environment.
pub const HIDDEN_PASSWORD: &str = "**********";

#[derive(Debug, Error)]
pub enum InjectorError {
    #[error("credential {credential} is missing required input {field:?}")]
    MissingInput { credential: String, field: String },
    #[error("failed to write private data for credential {credential}: {source}")]
    Write {
        credential: String,
        #[source]
        source: std::io::Error,
    },
    #[error("credential {credential}: {message}")]
    Render { credential: String, message: String },
}

/// Scoped writer for the job's private data dir.
pub trait PrivateDataWriter: Send + Sync {
    /// Host path of the private data dir.
    fn path(&self) -> &Path;

    /// Write `data` to `name` (a random name when `None`) under `sub_dir`
    /// with permission bits `mode`. Returns the host path.
    fn write_file(
        &self,
        name: Option<&str>,
        data: &str,
        sub_dir: Option<&str>,
        mode: u32,
    ) -> std::io::Result<PathBuf>;

    /// The path the runner sees for a host path inside the private data dir.
    fn runner_path(&self, host_path: &Path) -> String;
}

/// Mutable view of the run that injectors write into.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InjectionTarget {
    pub env: BTreeMap<String, String>,
    /// Audit copy of `env` with secret values hidden.
    pub safe_env: BTreeMap<String, String>,
    pub args: Vec<String>,
    /// Extra vars contributed by the credential.
    pub extra_vars: serde_json::Map<String, serde_json::Value>,
}

impl InjectionTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a non-secret variable in both environments.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        self.safe_env.insert(key.clone(), value.clone());
        self.env.insert(key, value);
    }

    /// Set a secret variable; the safe environment only sees [`HIDDEN_PASSWORD`].
    pub fn set_secret(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.safe_env.insert(key.clone(), HIDDEN_PASSWORD.to_string());
        self.env.insert(key, value.into());
    }
}

pub trait CredentialInjector: Send + Sync {
    fn inject(
        &self,
        credential: &Credential,
        target: &mut InjectionTarget,
        private_data: &dyn PrivateDataWriter,
    ) -> Result<(), InjectorError>;
}

/// Credential namespace -> injector.
#[derive(Clone, Default)]
pub struct InjectorRegistry {
    injectors: HashMap<String, Arc<dyn CredentialInjector>>,
}

impl InjectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the injectors for the managed cloud credential types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register `injector` for `namespace`, replacing any previous one.
    pub fn register(&mut self, namespace: impl Into<String>, injector: Arc<dyn CredentialInjector>) {
        self.injectors.insert(namespace.into(), injector);
    }

    pub fn get(&self, namespace: &str) -> Option<&Arc<dyn CredentialInjector>> {
        self.injectors.get(namespace)
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.injectors.contains_key(namespace)
    }

    /// Inject every credential that has an injector, in order.
    ///
    /// Credentials without one (machine, vault, source control) are consumed
    /// by the argument and password builders instead.
    pub fn inject_all<'a>(
        &self,
        credentials: impl IntoIterator<Item = &'a Credential>,
        target: &mut InjectionTarget,
        private_data: &dyn PrivateDataWriter,
    ) -> Result<(), InjectorError> {
        for credential in credentials {
            match self.get(credential.namespace()) {
                Some(injector) => {
                    tracing::debug!(
                        credential_id = %credential.id,
                        namespace = credential.namespace(),
                        "injecting credential"
                    );
                    injector.inject(credential, target, private_data)?;
                }
                None => tracing::trace!(
                    credential_id = %credential.id,
                    namespace = credential.namespace(),
                    "no injector registered"
                ),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for InjectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut namespaces: Vec<_> = self.injectors.keys().collect();
        namespaces.sort();
        f.debug_struct("InjectorRegistry").field("namespaces", &namespaces).finish()
    }
}

pub(crate) fn required(credential: &Credential, field: &str) -> Result<String, InjectorError> {
    credential.input(field).filter(|v| !v.is_empty()).ok_or_else(|| InjectorError::MissingInput {
        credential: credential.name.clone(),
        field: field.to_string(),
    })
}

pub(crate) fn write_error(credential: &Credential) -> impl FnOnce(std::io::Error) -> InjectorError + '_ {
    move |source| InjectorError::Write { credential: credential.name.clone(), source }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::PrivateDataWriter;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};

    /// In-memory private data dir rooted at a fixed path.
    pub struct MemoryPrivateData {
        root: PathBuf,
        files: Mutex<Vec<(PathBuf, String, u32)>>,
    }

    impl MemoryPrivateData {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into(), files: Mutex::new(Vec::new()) }
        }

        /// `(path, contents, mode)` of every file written.
        pub fn files(&self) -> Vec<(PathBuf, String, u32)> {
            self.files.lock().clone()
        }

        pub fn contents(&self, path: &Path) -> Option<String> {
            self.files.lock().iter().find(|(p, _, _)| p == path).map(|(_, c, _)| c.clone())
        }
    }

    impl PrivateDataWriter for MemoryPrivateData {
        fn path(&self) -> &Path {
            &self.root
        }

        fn write_file(
            &self,
            name: Option<&str>,
            data: &str,
            sub_dir: Option<&str>,
            mode: u32,
        ) -> std::io::Result<PathBuf> {
            let mut files = self.files.lock();
            let name = name.map(str::to_string).unwrap_or_else(|| format!("tmp{}", files.len()));
            let dir = match sub_dir {
                Some(sub) => self.root.join(sub),
                None => self.root.clone(),
            };
            let path = dir.join(name);
            files.push((path.clone(), data.to_string(), mode));
            Ok(path)
        }

        fn runner_path(&self, host_path: &Path) -> String {
            match host_path.strip_prefix(&self.root) {
                Ok(rel) => Path::new("/runner").join(rel).display().to_string(),
                Err(_) => host_path.display().to_string(),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::MemoryPrivateData;

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
