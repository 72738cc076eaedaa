//! Service account assertions signed with RS256.
pub mod claims;
pub mod signed;
pub mod signer;
