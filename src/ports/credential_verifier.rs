/// CredentialVerifier defines the port for checking an inbound credential.
///
/// Implementations must be pure with respect to the decision: the same
/// credential always yields the same answer for the lifetime of the verifier,
/// which is what makes authorizer results cacheable.
pub trait CredentialVerifier: Send + Sync {
    /// Returns true when `credential` grants access.
    fn verify(&self, credential: &str) -> bool;
}

impl<F> CredentialVerifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn verify(&self, credential: &str) -> bool {
        self(credential)
    }
}
