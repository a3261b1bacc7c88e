use parley_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The event payload is unusable: undecodable, or missing the email
    /// correlation key. Nothing is mutated.
    #[error("invalid event payload: {0}")]
    Validation(String),

    /// The event's authenticity could not be established: bad signature,
    /// or a timestamp outside the acceptance window. Nothing is parsed
    /// or mutated.
    #[error("authenticity rejected: {0}")]
    Authenticity(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
