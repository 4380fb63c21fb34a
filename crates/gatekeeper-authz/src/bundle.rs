//! Policy bundle loading.
//!
//! A bundle is a versioned set of Rego rule modules plus the routes they
//! decide for. Bundles come from the table compiled into the binary, from a
//! directory of `.rego` files, or from an OPA-style `.tar.gz` archive. In
//! the last two cases an optional `.manifest` carries the revision and the
//! route bindings:
//!
//! ```json
//! {
//!   "revision": "2024-05-01",
//!   "roots": ["common", "get"],
//!   "routes": { "get.data.v1.ranges": { "method": "GET", "path": "/data/v1/ranges" } }
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AuthzError, AuthzResult};
use crate::route::Route;

const COMMON_MODULE: &str = include_str!("../policies/common.rego");
const DATA_RANGES_MODULE: &str = include_str!("../policies/get.data.v1.ranges.rego");

/// Metadata about a loaded policy bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Bundle revision (version identifier).
    pub revision: String,
    /// Package roots every module must lie under; empty admits any package.
    pub roots: Vec<String>,
}

impl BundleMetadata {
    /// Whether `package` falls under one of the roots.
    ///
    /// Roots use OPA's slash form (`get/data`) or dotted package form.
    pub fn covers(&self, package: &str) -> bool {
        self.roots.is_empty()
            || self.roots.iter().any(|root| {
                let root = root.trim_matches('/').replace('/', ".");
                root.is_empty()
                    || package == root
                    || package
                        .strip_prefix(root.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
    }
}

/// One Rego module and, for routed modules, the route it decides for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleModule {
    /// Module name; equals the Rego package.
    pub name: String,
    /// Rego source text.
    pub source: String,
    /// Route binding; `None` for shared libraries.
    pub route: Option<Route>,
}

impl RuleModule {
    /// Create a library module.
    pub fn library(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            route: None,
        }
    }

    /// Create a routed module.
    pub fn routed(name: impl Into<String>, source: impl Into<String>, route: Route) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            route: Some(route),
        }
    }
}

/// A loaded policy bundle.
#[derive(Debug, Clone)]
pub struct PolicyBundle {
    /// Bundle metadata.
    pub metadata: BundleMetadata,
    /// Rule modules, in load order.
    pub modules: Vec<RuleModule>,
}

impl PolicyBundle {
    /// Create an empty bundle with the given revision.
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            metadata: BundleMetadata {
                revision: revision.into(),
                roots: vec![],
            },
            modules: Vec::new(),
        }
    }

    /// Add a module to the bundle.
    pub fn add_module(&mut self, module: RuleModule) {
        self.modules.push(module);
    }

    /// Builder form of [`add_module`](Self::add_module).
    pub fn with_module(mut self, module: RuleModule) -> Self {
        self.add_module(module);
        self
    }

    /// The rule table compiled into the binary.
    pub fn builtin() -> Self {
        Self::new(concat!("builtin-", env!("CARGO_PKG_VERSION")))
            .with_module(RuleModule::library("common", COMMON_MODULE))
            .with_module(RuleModule::routed(
                "get.data.v1.ranges",
                DATA_RANGES_MODULE,
                Route::new("GET", "/data/v1/ranges"),
            ))
    }

    /// Modules bound to a route.
    pub fn routed_modules(&self) -> impl Iterator<Item = &RuleModule> {
        self.modules.iter().filter(|m| m.route.is_some())
    }

    /// Attach manifest routes to modules by name.
    fn apply_manifest(&mut self, manifest: OpaManifest) -> AuthzResult<()> {
        self.metadata.revision = manifest.revision.unwrap_or_else(|| "unknown".to_string());
        self.metadata.roots = manifest.roots;
        if let Some(stray) = self
            .modules
            .iter()
            .find(|m| !self.metadata.covers(&m.name))
        {
            return Err(AuthzError::BundleParse(format!(
                "module {} lies outside the manifest roots",
                stray.name
            )));
        }
        for (name, route) in manifest.routes {
            let module = self
                .modules
                .iter_mut()
                .find(|m| m.name == name)
                .ok_or_else(|| {
                    AuthzError::BundleParse(format!("manifest routes unknown module {name}"))
                })?;
            module.route = Some(route);
        }
        Ok(())
    }
}

/// Extract the package name declared by a Rego module.
pub fn package_name(source: &str) -> Option<&str> {
    source.lines().find_map(|line| {
        let line = line.split('#').next().unwrap_or_default().trim();
        line.strip_prefix("package ")
            .map(str::trim)
            .filter(|name| !name.is_empty())
    })
}

fn module_from_source(origin: &str, source: String) -> AuthzResult<RuleModule> {
    let name = package_name(&source)
        .ok_or_else(|| AuthzError::BundleParse(format!("{origin} declares no package")))?
        .to_string();
    Ok(RuleModule::library(name, source))
}

/// Loads policy bundles from various sources.
pub struct BundleLoader;

impl BundleLoader {
    /// Load a bundle from a directory or a `.tar.gz` file.
    pub async fn from_path(path: impl AsRef<Path>) -> AuthzResult<PolicyBundle> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| AuthzError::bundle_load(path, format!("cannot stat bundle: {e}")))?;
        if meta.is_dir() {
            Self::from_dir(path).await
        } else {
            Self::from_file(path).await
        }
    }

    /// Load a bundle from a tar.gz file.
    pub async fn from_file(path: impl AsRef<Path>) -> AuthzResult<PolicyBundle> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading bundle from file");

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| AuthzError::bundle_load(path, format!("failed to read file: {e}")))?;

        Self::from_tar_gz(&content, &path.to_string_lossy())
    }

    /// Load a bundle from a directory of `.rego` files with an optional `.manifest`.
    pub async fn from_dir(path: impl AsRef<Path>) -> AuthzResult<PolicyBundle> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading bundle from directory");

        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| AuthzError::bundle_load(path, format!("failed to read directory: {e}")))?;

        let mut files = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_path = entry.path();
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name == ".manifest" || file_name.ends_with(".rego") {
                let content = tokio::fs::read_to_string(&file_path).await.map_err(|e| {
                    AuthzError::bundle_load(&file_path, format!("failed to read file: {e}"))
                })?;
                files.insert(file_name, content);
            }
        }

        Self::assemble(files, &path.to_string_lossy())
    }

    /// Load a bundle from tar.gz bytes.
    pub fn from_tar_gz(data: &[u8], source: &str) -> AuthzResult<PolicyBundle> {
        use flate2::read::GzDecoder;
        use tar::Archive;

        let decoder = GzDecoder::new(data);
        let mut archive = Archive::new(decoder);
        let mut files = BTreeMap::new();

        for entry_result in archive
            .entries()
            .map_err(|e| AuthzError::BundleParse(format!("failed to read archive: {e}")))?
        {
            let mut entry = entry_result
                .map_err(|e| AuthzError::BundleParse(format!("failed to read entry: {e}")))?;

            let entry_path = entry
                .path()
                .map_err(|e| AuthzError::BundleParse(format!("invalid path in archive: {e}")))?
                .to_string_lossy()
                .to_string();

            if !(entry_path.ends_with(".manifest") || entry_path.ends_with(".rego")) {
                continue;
            }

            let mut content = String::new();
            entry.read_to_string(&mut content).map_err(|e| {
                AuthzError::BundleParse(format!("failed to read entry {entry_path}: {e}"))
            })?;
            let key = if entry_path.ends_with("/.manifest") || entry_path == ".manifest" {
                ".manifest".to_string()
            } else {
                entry_path
            };
            files.insert(key, content);
        }

        Self::assemble(files, source)
    }

    fn assemble(mut files: BTreeMap<String, String>, source: &str) -> AuthzResult<PolicyBundle> {
        let manifest = files
            .remove(".manifest")
            .map(|raw| {
                serde_json::from_str::<OpaManifest>(&raw)
                    .map_err(|e| AuthzError::BundleParse(format!("invalid manifest: {e}")))
            })
            .transpose()?;

        let mut bundle = PolicyBundle::new("unknown");
        for (origin, content) in files {
            debug!(path = %origin, "loading policy");
            bundle.add_module(module_from_source(&origin, content)?);
        }

        match manifest {
            Some(manifest) => bundle.apply_manifest(manifest)?,
            None => debug!(source, "bundle has no manifest, using defaults"),
        }

        info!(
            revision = %bundle.metadata.revision,
            modules = bundle.modules.len(),
            routed = bundle.routed_modules().count(),
            "bundle loaded"
        );

        Ok(bundle)
    }
}

/// OPA bundle manifest format, extended with route bindings.
#[derive(Debug, Deserialize)]
struct OpaManifest {
    /// Bundle revision.
    revision: Option<String>,
    /// Root paths.
    #[serde(default)]
    roots: Vec<String>,
    /// Module name to route.
    #[serde(default)]
    routes: BTreeMap<String, Route>,
}
