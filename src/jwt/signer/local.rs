use jsonwebtoken::{Algorithm, EncodingKey, Header};
use thiserror::Error;

use crate::jwt::{claims::Claims, signed::SignedJwt};

use super::{JwtSigner, JwtSignerError};

/// Errors that can occur when creating a LocalPrivateKeySigner.
#[derive(Debug, Error)]
pub enum LocalPrivateKeySignerError {
    #[error("unable to load private key: `{0}`")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// Signer structure that uses a local private key to sign JWTs.
pub struct LocalPrivateKeySigner {
    encoding_key: EncodingKey,
    header: Header,
}

impl LocalPrivateKeySigner {
    /// Creates a signer from an RSA private key in PEM format. RS256 is the only algorithm
    /// accepted by the Google token endpoint.
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, LocalPrivateKeySignerError> {
        Ok(Self {
            // This will call pem::parse
            encoding_key: EncodingKey::from_rsa_pem(pem)?,
            header: Header::new(Algorithm::RS256),
        })
    }

    /// Advertises the key identifier in the `kid` header.
    pub fn with_key_id(mut self, key_id: Option<String>) -> Self {
        self.header.kid = key_id;
        self
    }
}

impl JwtSigner for LocalPrivateKeySigner {
    fn sign(&self, claims: Claims) -> Result<SignedJwt, JwtSignerError> {
        let value = jsonwebtoken::encode(&self.header, &claims, &self.encoding_key)
            .map_err(|e| JwtSignerError::Signing(e.to_string()))?;
        Ok(SignedJwt { value })
    }
}
