use std::path::PathBuf;

pub const DEFAULT_VALIDATOR_IMAGE: &str = "quay.io/kubevirt/kubevirt-template-validator:latest";
pub const DEFAULT_TEMPLATES_BUNDLE_DIR: &str = "data/common-templates-bundle/";

/// Operator wide settings, resolved once at startup and shared by every
/// reconciliation pass.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Image of the template validator webhook server
    pub validator_image: String,
    /// Directory holding the common templates bundle files
    pub templates_bundle_dir: PathBuf,
    /// Version reported in the SSP status
    pub operator_version: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            validator_image: DEFAULT_VALIDATOR_IMAGE.to_string(),
            templates_bundle_dir: PathBuf::from(DEFAULT_TEMPLATES_BUNDLE_DIR),
            operator_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
