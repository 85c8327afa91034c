//! Handling of non-class resources, in particular `META-INF`.

use crate::manifest::Manifest;
use crate::mapping::{remap_class_name, ClassMapper};
use crate::util::basename;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const SERVICES_DIR: &str = "META-INF/services/";

/// Manifest attributes holding a class name.
const CLASS_ATTRIBUTES: [&str; 2] = ["Main-Class", "Launcher-Agent-Class"];

/// How resources other than class files are carried over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NonClassCopyMode {
    /// Copy every resource as is.
    Unchanged,
    /// Drop signatures, strip digests and remap class names in `META-INF`.
    #[default]
    FixMetaInf,
    /// Leave out everything under `META-INF`.
    SkipMetaInf,
}

/// What to do with one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAction {
    /// Copy the raw entry.
    Copy,
    /// Leave the entry out.
    Skip,
    /// Rewrite the manifest.
    FixManifest,
    /// Rewrite a service provider file.
    FixService,
}

impl NonClassCopyMode {
    /// Decides how the resource at `path` is carried over.
    pub fn action(self, path: &str) -> ResourceAction {
        let in_meta_inf = path.starts_with("META-INF/");
        match self {
            NonClassCopyMode::Unchanged => ResourceAction::Copy,
            NonClassCopyMode::SkipMetaInf if in_meta_inf => ResourceAction::Skip,
            NonClassCopyMode::SkipMetaInf => ResourceAction::Copy,
            NonClassCopyMode::FixMetaInf => {
                if path.eq_ignore_ascii_case(MANIFEST_PATH) {
                    ResourceAction::FixManifest
                } else if is_signature_file(path) {
                    ResourceAction::Skip
                } else if path.starts_with(SERVICES_DIR) && path.len() > SERVICES_DIR.len() {
                    ResourceAction::FixService
                } else {
                    ResourceAction::Copy
                }
            }
        }
    }
}

/// Returns true for jar signature files, which renaming invalidates.
pub fn is_signature_file(path: &str) -> bool {
    let Some(name) = path.strip_prefix("META-INF/") else {
        return false;
    };
    if name.contains('/') {
        return false;
    }
    let upper = name.to_ascii_uppercase();
    upper.starts_with("SIG-")
        || [".SF", ".RSA", ".DSA", ".EC"]
            .iter()
            .any(|ext| upper.ends_with(ext))
}

/// Remaps a binary class name (`a.b.C`).
fn remap_binary_name<M: ClassMapper + ?Sized>(name: &str, mapper: &M) -> String {
    let internal = name.replace('.', "/");
    remap_class_name(&internal, mapper).replace('/', ".")
}

/// Strips digests and remaps the class names of a manifest.
pub fn fix_manifest<M: ClassMapper + ?Sized>(data: &[u8], mapper: &M) -> Vec<u8> {
    let mut manifest = Manifest::parse(data);
    manifest.remove_attributes(|name| {
        let upper = name.to_ascii_uppercase();
        upper.ends_with("-DIGEST") || upper.contains("-DIGEST-")
    });

    if let Some(main) = manifest.main_mut() {
        for attribute in CLASS_ATTRIBUTES {
            if let Some(value) = main.get(attribute).map(|v| v.trim().to_string()) {
                main.set(attribute, remap_binary_name(&value, mapper));
            }
        }
    }
    manifest.to_bytes()
}

/// Remaps a service provider file: its name and every provider line.
///
/// Comments, blank lines and line endings are kept.
pub fn fix_service<M: ClassMapper + ?Sized>(
    path: &str,
    data: &[u8],
    mapper: &M,
) -> (String, Vec<u8>) {
    let service = basename(path);
    let new_path = format!("{SERVICES_DIR}{}", remap_binary_name(service, mapper));

    let text = String::from_utf8_lossy(data);
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let (body, ending) = match line.strip_suffix("\r\n") {
            Some(body) => (body, "\r\n"),
            None => match line.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (line, ""),
            },
        };
        let (provider, comment) = match body.find('#') {
            Some(pos) => body.split_at(pos),
            None => (body, ""),
        };

        let name = provider.trim();
        if name.is_empty() {
            out.push_str(provider);
        } else {
            let start = provider.len() - provider.trim_start().len();
            out.push_str(&provider[..start]);
            out.push_str(&remap_binary_name(name, mapper));
            out.push_str(&provider[start + name.len()..]);
        }
        out.push_str(comment);
        out.push_str(ending);
    }
    (new_path, out.into_bytes())
}
