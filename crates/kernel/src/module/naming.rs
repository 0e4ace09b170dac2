//! Names derived from module names.
//!
//! All functions here are pure: the same input always yields the same name.

use keystone_sdk::BrowserNaming;

/// Namespace prefix shared by every built-in package.
pub const NAMESPACE_PREFIX: &str = "keystone-";

/// `keystone-blog-posts` → `BlogPosts`.
///
/// Applying it to its own output returns the output unchanged.
pub fn derive_identifier(name: &str) -> String {
    let bare = name.strip_prefix(NAMESPACE_PREFIX).unwrap_or(name);
    bare.split(['-', '_'])
        .filter(|segment| !segment.is_empty())
        .map(capitalize)
        .collect()
}

/// Label of the template source a local override folder contributes.
pub fn override_label(name: &str) -> String {
    format!("my{}", derive_identifier(name))
}

/// Client-side names for a local module layered over package `target`.
///
/// Explicit values in `explicit` always win.
pub fn browser_naming(name: &str, target: &str, explicit: &BrowserNaming) -> BrowserNaming {
    let construct = explicit.construct.clone().unwrap_or_else(|| {
        if name == target {
            format!("My{}", derive_identifier(name))
        } else {
            derive_identifier(name)
        }
    });
    let base_construct = explicit
        .base_construct
        .clone()
        .unwrap_or_else(|| format!("Keystone{}", derive_identifier(target)));

    BrowserNaming {
        construct: Some(construct),
        base_construct: Some(base_construct),
    }
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
