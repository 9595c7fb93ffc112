//! Loading of the common templates bundle shipped next to the operator.

use std::path::Path;

use kube::{
    api::{ApiResource, DynamicObject},
    core::GroupVersionKind,
    ResourceExt,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::util::errors::{Error, Result, StdError};

pub const TEMPLATE_GROUP: &str = "template.openshift.io";
pub const TEMPLATE_VERSION: &str = "v1";
pub const TEMPLATE_KIND: &str = "Template";

pub fn template_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(TEMPLATE_GROUP, TEMPLATE_VERSION, TEMPLATE_KIND),
        "templates",
    )
}

fn bundle_error(msg: String) -> Error {
    Error::StdError(StdError::BundleError(msg))
}

/// Parses every template of one multi document YAML file.
pub fn parse_bundle(content: &str, source: &str) -> Result<Vec<DynamicObject>> {
    let mut templates = Vec::new();

    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| bundle_error(format!("{source}: {e}")))?;
        if value.is_null() {
            continue;
        }

        let template: DynamicObject =
            serde_yaml::from_value(value).map_err(|e| bundle_error(format!("{source}: {e}")))?;
        let kind = template.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default();
        if kind != TEMPLATE_KIND {
            return Err(bundle_error(format!(
                "{source}: expected kind {TEMPLATE_KIND}, found '{kind}'"
            )));
        }
        if template.metadata.name.is_none() {
            return Err(bundle_error(format!("{source}: template without a name")));
        }
        templates.push(template);
    }

    Ok(templates)
}

/// Reads all `*.yaml` files of `dir` in file name order.
///
/// A missing directory yields an empty bundle.
pub fn load_bundle(dir: &Path) -> Result<Vec<DynamicObject>> {
    if !dir.exists() {
        warn!("Templates bundle directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| bundle_error(format!("{}: {e}", dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| bundle_error(format!("{}: {e}", dir.display())))?
            .path();
        if matches!(path.extension().and_then(|ext| ext.to_str()), Some("yaml" | "yml")) {
            files.push(path);
        }
    }
    files.sort();

    let mut templates = Vec::new();
    for file in files {
        let content =
            std::fs::read_to_string(&file).map_err(|e| bundle_error(format!("{}: {e}", file.display())))?;
        let parsed = parse_bundle(&content, &file.display().to_string())?;
        debug!("Loaded {} templates from {}", parsed.len(), file.display());
        templates.extend(parsed);
    }

    let mut names: Vec<String> = templates.iter().map(|t| t.name_any()).collect();
    names.sort();
    names.dedup();
    if names.len() != templates.len() {
        return Err(bundle_error(format!(
            "duplicate template names in {}",
            dir.display()
        )));
    }

    Ok(templates)
}
