use cloudalign_features::FeatureError;

/// Error type for correspondence estimation and rigid registration.
///
/// The variants distinguish "bad input data" from "no usable signal";
/// neither is retried internally. A caller hitting `DegenerateGeometry`
/// may re-run matching with the reciprocity filter relaxed to gather a
/// richer correspondence set, but that policy lives outside this crate.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// Fewer than [`MIN_CORRESPONDENCES`](crate::MIN_CORRESPONDENCES)
    /// pairs survived matching; a rigid transform is underdetermined.
    InsufficientCorrespondences { found: usize },
    /// The weighted normal equations were singular at the given solver
    /// iteration, e.g. all correspondence points collinear.
    DegenerateGeometry { iteration: usize },
    /// Descriptor computation rejected an input cloud.
    Feature(FeatureError),
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationError::InsufficientCorrespondences { found } => write!(
                f,
                "only {} correspondences found; at least {} required for a rigid transform",
                found,
                crate::MIN_CORRESPONDENCES
            ),
            RegistrationError::DegenerateGeometry { iteration } => write!(
                f,
                "normal equations singular at solver iteration {} (degenerate correspondence geometry)",
                iteration
            ),
            RegistrationError::Feature(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Feature(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FeatureError> for RegistrationError {
    fn from(err: FeatureError) -> Self {
        RegistrationError::Feature(err)
    }
}
