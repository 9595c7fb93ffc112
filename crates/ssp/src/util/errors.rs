use thiserror::Error;

#[derive(Error, Debug)]
pub enum StdError {
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    #[error("SerializationError: {0}")]
    SerializationError(#[source] serde_json::Error),

    #[error("BundleError: {0}")]
    BundleError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("MultipleErrors: {}", join_errors(.0))]
    MultipleErrors(Vec<Error>),
}

fn join_errors(errors: &[Error]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl StdError {
    pub fn metric_label(&self) -> String {
        match self {
            StdError::KubeError(_) => "kubeerror",
            StdError::FinalizerError(_) => "finalizererror",
            StdError::MetadataMissing(_) => "metadatamissing",
            StdError::InvalidArgument(_) => "invalidargument",
            StdError::SerializationError(_) => "serializationerror",
            StdError::BundleError(_) => "bundleerror",
            StdError::Cancelled(_) => "cancelled",
            StdError::MultipleErrors(_) => "multipleerrors",
        }
        .to_string()
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
        }
    }

    /// True when the API server answered 404 for the object.
    pub fn is_not_found(&self) -> bool {
        let Error::StdError(inner) = self;
        matches!(inner, StdError::KubeError(kube::Error::Api(err)) if err.code == 404)
    }

    /// Folds a list of errors into one, `Ok` when the list is empty.
    pub fn from_many(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::StdError(StdError::MultipleErrors(errors))),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::StdError(StdError::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
        })))
    }

    #[test]
    fn not_found_is_recognised() {
        assert!(api_error(404, "NotFound").is_not_found());
        assert!(!api_error(409, "Conflict").is_not_found());
        assert!(!Error::StdError(StdError::MetadataMissing("name".into())).is_not_found());
    }

    #[test]
    fn from_many_folds_errors() {
        assert!(Error::from_many(Vec::new()).is_ok());

        let single = Error::from_many(vec![api_error(409, "Conflict")]).unwrap_err();
        assert_eq!(single.metric_label(), "kubeerror");

        let multiple =
            Error::from_many(vec![api_error(409, "Conflict"), api_error(500, "InternalError")]).unwrap_err();
        assert_eq!(multiple.metric_label(), "multipleerrors");
        assert!(multiple.to_string().contains("Conflict happened"));
        assert!(multiple.to_string().contains("InternalError happened"));
    }
}
