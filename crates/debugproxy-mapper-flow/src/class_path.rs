//! Class identities derived from Flow package paths.
//!
//! A Flow package lives at `<base>/Packages/<Container>/<Vendor.Package>/` and
//! keeps its PHP classes below `Classes/` in one of two layouts:
//!
//! - [`Convention::Mirrored`]: directories spell out the whole namespace
//!   (`Classes/Vendor/Package/Sub/Name.php`).
//! - [`Convention::Flat`]: the package key is implied and only the rest of the
//!   namespace appears (`Classes/Sub/Name.php`).
//!
//! Both produce the same [`ClassIdentity`] (`Vendor_Package_Sub_Name`), which
//! is what Flow also uses to name its compiled proxy classes.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const PACKAGES_SEGMENT: &str = "/Packages/";
pub const CLASSES_DIR: &str = "Classes";
pub const CLASS_EXTENSION: &str = "php";

const TEMPORARY_SEGMENT: &str = "/Data/Temporary/";
const PROXY_CLASSES_SEGMENT: &str = "/Cache/Code/Flow_Object_Classes/";
const PROXY_ORIGIN_MARKER: &str = "# PathAndFilename: ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassPathError {
    #[error("no `Packages` directory in {path:?}")]
    NoPackagesSegment { path: String },
    #[error("no package key below `Packages` in {path:?}")]
    NoPackageKey { path: String },
    #[error("invalid package key {key:?} in {path:?}")]
    InvalidPackageKey { key: String, path: String },
    #[error("no `Classes` directory in {path:?}")]
    NoClassesSegment { path: String },
    #[error("no class file below `Classes` in {path:?}")]
    NoClassFile { path: String },
}

/// Layout independent class key, e.g. `Ttree_FlowDebugProxyHelper_ProxyClassMapperComponent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassIdentity(String);

impl ClassIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative file path under `Classes/` for a package laid out per `convention`.
    ///
    /// Returns `None` when the identity does not belong to `package_key`.
    pub fn relative_path(&self, package_key: &str, convention: Convention) -> Option<PathBuf> {
        let key_prefix = package_key.replace('.', "_");
        let rest = self.0.strip_prefix(&key_prefix)?;
        let segments = match convention {
            Convention::Mirrored if rest.is_empty() || rest.starts_with('_') => self.0.as_str(),
            Convention::Flat => rest.strip_prefix('_').filter(|rest| !rest.is_empty())?,
            Convention::Mirrored => return None,
        };
        let mut path: PathBuf = segments.split('_').collect();
        path.set_extension(CLASS_EXTENSION);
        Some(path)
    }
}

impl fmt::Display for ClassIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClassIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// `Classes/Vendor/Package/...` (PSR-0 style).
    Mirrored,
    /// `Classes/...` with the package key implied (PSR-4 style).
    Flat,
}

/// A class file inside a Flow package, broken into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPath {
    /// Everything before `/Packages/`.
    pub base_path: String,
    /// Package container directory (`Application`, `Framework`, ...).
    pub container: String,
    /// `Vendor.Package`.
    pub package_key: String,
    /// Path below `Classes/` without the file extension.
    pub relative_path: String,
    pub convention: Convention,
    pub identity: ClassIdentity,
}

impl ClassPath {
    pub fn parse(path: &str) -> Result<Self, ClassPathError> {
        let packages = path
            .find(PACKAGES_SEGMENT)
            .ok_or_else(|| ClassPathError::NoPackagesSegment { path: path.into() })?;
        let base_path = &path[..packages];
        let rest = &path[packages + PACKAGES_SEGMENT.len()..];

        let mut parts = rest.splitn(3, '/');
        let container = parts.next().unwrap_or_default();
        let package_key = parts.next().unwrap_or_default();
        if container.is_empty() || package_key.is_empty() {
            return Err(ClassPathError::NoPackageKey { path: path.into() });
        }

        let key_parts: Vec<&str> = package_key.split('.').collect();
        if key_parts.iter().any(|part| part.is_empty()) {
            return Err(ClassPathError::InvalidPackageKey {
                key: package_key.into(),
                path: path.into(),
            });
        }

        let class_file = parts
            .next()
            .and_then(|rest| rest.strip_prefix(CLASSES_DIR))
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ClassPathError::NoClassesSegment { path: path.into() })?;
        let relative_path = strip_extension(class_file);
        if relative_path.is_empty() || relative_path.ends_with('/') {
            return Err(ClassPathError::NoClassFile { path: path.into() });
        }

        let segments: Vec<&str> = relative_path.split('/').collect();
        let convention = if segments.starts_with(&key_parts) {
            Convention::Mirrored
        } else {
            Convention::Flat
        };
        let identity = match convention {
            Convention::Mirrored => segments.join("_"),
            Convention::Flat => format!("{}_{}", key_parts.join("_"), segments.join("_")),
        };

        Ok(Self {
            base_path: base_path.to_owned(),
            container: container.to_owned(),
            package_key: package_key.to_owned(),
            relative_path: relative_path.to_owned(),
            convention,
            identity: ClassIdentity(identity),
        })
    }
}

/// Split a package class path into its project base path and class identity.
///
/// ```
/// use debugproxy_mapper_flow::path_to_class_path;
///
/// let (base, class) = path_to_class_path(
///     "/srv/Packages/Application/Acme.Shop/Classes/Domain/Cart.php",
/// )
/// .unwrap();
/// assert_eq!(base, "/srv");
/// assert_eq!(class.as_str(), "Acme_Shop_Domain_Cart");
/// ```
pub fn path_to_class_path(path: &str) -> Result<(String, ClassIdentity), ClassPathError> {
    let class_path = ClassPath::parse(path)?;
    Ok((class_path.base_path, class_path.identity))
}

fn strip_extension(file: &str) -> &str {
    let name_start = file.rfind('/').map(|slash| slash + 1).unwrap_or(0);
    match file[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &file[..name_start + dot],
        _ => file,
    }
}

/// Find the source file of `identity` below `root/Packages`.
///
/// Every package whose key prefixes the identity is tried, longest key first,
/// with the mirrored layout before the flat one. Only files that exist are
/// returned.
pub fn resolve_class_path(root: &Path, identity: &ClassIdentity) -> Option<PathBuf> {
    let mut packages: Vec<(String, PathBuf)> = Vec::new();
    for container in std::fs::read_dir(root.join("Packages")).ok()?.flatten() {
        let Ok(entries) = std::fs::read_dir(container.path()) else {
            continue;
        };
        for package in entries.flatten() {
            let Some(key) = package.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if identity.as_str().starts_with(&key.replace('.', "_")) {
                packages.push((key, package.path()));
            }
        }
    }
    packages.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    packages.into_iter().find_map(|(key, dir)| {
        [Convention::Mirrored, Convention::Flat]
            .into_iter()
            .filter_map(|convention| identity.relative_path(&key, convention))
            .map(|relative| dir.join(CLASSES_DIR).join(relative))
            .find(|candidate| candidate.is_file())
    })
}

/// A compiled proxy class in Flow's code cache:
/// `<base>/Data/Temporary/<ContextDir>/Cache/Code/Flow_Object_Classes/<Identity>.php`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyClassPath {
    pub base_path: String,
    pub context_dir: String,
    pub identity: ClassIdentity,
}

impl ProxyClassPath {
    pub fn parse(path: &str) -> Option<Self> {
        let temporary = path.find(TEMPORARY_SEGMENT)?;
        let rest = &path[temporary + TEMPORARY_SEGMENT.len()..];
        let classes = rest.find(PROXY_CLASSES_SEGMENT)?;
        let context_dir = &rest[..classes];
        let file = &rest[classes + PROXY_CLASSES_SEGMENT.len()..];
        let identity = file.strip_suffix(".php")?;
        if context_dir.is_empty() || identity.is_empty() || identity.contains('/') {
            return None;
        }

        Some(Self {
            base_path: path[..temporary].to_owned(),
            context_dir: context_dir.to_owned(),
            identity: ClassIdentity::new(identity),
        })
    }

    /// Proxy class location relative to the project root for `context`.
    pub fn relative(context: &str, identity: &ClassIdentity) -> String {
        format!(
            "Data/Temporary/{}{}{identity}.php",
            context_directory(context),
            PROXY_CLASSES_SEGMENT
        )
    }
}

/// Directory name Flow uses for a (possibly nested) context:
/// `Development/Docker` becomes `Development/SubContextDocker`.
pub fn context_directory(context: &str) -> String {
    context.replace('/', "/SubContext")
}

/// Original source path recorded in the footer of a compiled proxy class.
pub fn read_proxy_origin(proxy_class: &Path) -> Option<String> {
    let source = std::fs::read_to_string(proxy_class).ok()?;
    source.lines().rev().find_map(|line| {
        line.trim_start()
            .strip_prefix(PROXY_ORIGIN_MARKER)
            .map(|origin| origin.trim().to_owned())
            .filter(|origin| !origin.is_empty())
    })
}
