use thiserror::Error;

use super::{claims::Claims, signed::SignedJwt};
use local::LocalPrivateKeySigner;

pub mod local;

#[derive(Error, Debug)]
pub enum JwtSignerError {
    #[error("unable to sign service account assertion: `{0}`")]
    Signing(String),
}

/// Signs the assertion exchanged for an access token.
pub trait JwtSigner {
    fn sign(&self, claims: Claims) -> Result<SignedJwt, JwtSignerError>;
}

/// Enumerates all implementations for `JwtSigner` for static dispatching reasons.
pub enum JwtSignerImpl {
    Local(LocalPrivateKeySigner),
}

impl JwtSigner for JwtSignerImpl {
    fn sign(&self, claims: Claims) -> Result<SignedJwt, JwtSignerError> {
        match self {
            Self::Local(local_signer) => local_signer.sign(claims),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub JwtSigner {}

        impl JwtSigner for JwtSigner {
            fn sign(&self, claims: Claims) -> Result<SignedJwt, JwtSignerError>;
        }
    }
}
