//! Shorthands for building [`crate::error::OptimizerError`] values.

/// Creates an [`crate::error::OptimizerError`] from a kind, a static description and optional
/// detail or source.
#[macro_export]
macro_rules! optimizer_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::OptimizerError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::OptimizerError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::OptimizerError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::OptimizerError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Returns early with an [`crate::error::OptimizerError`]. Accepts the same arguments as
/// [`optimizer_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::optimizer_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::optimizer_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::optimizer_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::optimizer_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
