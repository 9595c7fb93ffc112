pub mod common_templates;
pub mod template_validator;

use crate::{common::Operand, util::config::OperatorConfig, util::errors::Result};

use self::{common_templates::CommonTemplates, template_validator::TemplateValidator};

/// Operands in the order they are reconciled.
pub fn all(config: &OperatorConfig) -> Result<Vec<Box<dyn Operand>>> {
    Ok(vec![
        Box::new(TemplateValidator::new(config.validator_image.clone())),
        Box::new(CommonTemplates::from_bundle_dir(
            &config.templates_bundle_dir,
            config.operator_version.clone(),
        )?),
    ])
}
