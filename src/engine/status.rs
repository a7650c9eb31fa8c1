//! Status codes returned by the engine.
use spawn_sys as binding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fmi2Res {
    /// All well
    OK,
    /// Things are not quite right, but the computation can continue. The engine has reported the
    /// details through its logger.
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fmi2Error {
    /// The engine returned `Warning` to a lifecycle call, which fails the call like any other
    /// status but `OK`.
    #[error("Warning")]
    Warning,
    /// The engine could not evaluate its equations for the requested inputs or time, for example
    /// because an iterative solver did not converge. A Model-Exchange engine expects a smaller
    /// step to be tried; the bridge cannot do that and treats it as a failed call.
    #[error("Discard")]
    Discard,
    /// The engine instance can not continue. It must be terminated and freed.
    #[error("Error")]
    Error,
    /// The model computations are irreparably corrupted for all engine instances.
    #[error("Fatal")]
    Fatal,
    /// A status code outside the FMI 2.0 range, or `Pending`, which Model-Exchange engines never
    /// return.
    #[error("Unexpected status {0}")]
    Unexpected(u32),
}

/// Raw status as returned over the C interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fmi2Status(binding::fmi2Status);

impl Fmi2Status {
    /// Convert to [`Result<Fmi2Res, Fmi2Error>`]
    #[inline]
    pub fn ok(self) -> Result<Fmi2Res, Fmi2Error> {
        self.into()
    }
}

impl From<binding::fmi2Status> for Fmi2Status {
    fn from(status: binding::fmi2Status) -> Self {
        Self(status)
    }
}

impl From<Fmi2Status> for Result<Fmi2Res, Fmi2Error> {
    fn from(Fmi2Status(status): Fmi2Status) -> Self {
        match status {
            binding::fmi2Status_fmi2OK => Ok(Fmi2Res::OK),
            binding::fmi2Status_fmi2Warning => Ok(Fmi2Res::Warning),
            binding::fmi2Status_fmi2Discard => Err(Fmi2Error::Discard),
            binding::fmi2Status_fmi2Error => Err(Fmi2Error::Error),
            binding::fmi2Status_fmi2Fatal => Err(Fmi2Error::Fatal),
            other => Err(Fmi2Error::Unexpected(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_conversion() {
        assert_eq!(Fmi2Status::from(binding::fmi2Status_fmi2OK).ok(), Ok(Fmi2Res::OK));
        assert_eq!(
            Fmi2Status::from(binding::fmi2Status_fmi2Warning).ok(),
            Ok(Fmi2Res::Warning)
        );
        assert_eq!(
            Fmi2Status::from(binding::fmi2Status_fmi2Pending).ok(),
            Err(Fmi2Error::Unexpected(binding::fmi2Status_fmi2Pending))
        );
        assert_eq!(
            Fmi2Status::from(binding::fmi2Status_fmi2Fatal).ok(),
            Err(Fmi2Error::Fatal)
        );
    }
}
