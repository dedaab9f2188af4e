//! Sign and verify json web tokens.
//!
//! The signature is always verified before a single claim is read. Time
//! based claims are left to [`crate::claims::PayloadValidator`].

use std::collections::HashSet;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::Deserialize;

use crate::claims::ClaimSet;
use crate::config::{ConfigError, Configuration};
use crate::token::Token;

/// Errors raised while signing or verifying a token.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("token is malformed")]
    MalformedToken,
    #[error("token signature does not match")]
    SignatureMismatch,
    #[error("token declares an unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("invalid signing key")]
    Key(#[source] jsonwebtoken::errors::Error),
    #[error("token cannot be encoded")]
    Encoding(#[source] jsonwebtoken::errors::Error),
}

type Result<T> = std::result::Result<T, SignatureError>;

/// Port for token signing and verification.
pub trait SigningProvider: Send + Sync {
    /// Algorithm every token must be signed with.
    fn algorithm(&self) -> Algorithm;

    /// Serialize and sign a claim set.
    fn encode(&self, claims: &ClaimSet) -> Result<Token>;

    /// Verify a token and return its claims.
    fn decode(&self, token: &Token) -> Result<ClaimSet>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

impl From<Algorithm> for Family {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Family::Hmac
            },
            Algorithm::ES256 | Algorithm::ES384 => Family::Ec,
            Algorithm::EdDSA => Family::Ed,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Family::Rsa,
        }
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// JWT signer backed by `jsonwebtoken`.
pub struct JwtSigner {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSigner {
    /// Create a [`JwtSigner`] for an HMAC algorithm.
    pub fn hmac(algorithm: Algorithm, secret: &[u8]) -> Result<Self> {
        if Family::from(algorithm) != Family::Hmac {
            return Err(SignatureError::UnsupportedAlgorithm);
        }

        Ok(Self::with_keys(
            algorithm,
            EncodingKey::from_secret(secret),
            DecodingKey::from_secret(secret),
        ))
    }

    /// Create a [`JwtSigner`] for an asymmetric algorithm from PEM keys.
    pub fn from_pem(
        algorithm: Algorithm,
        private_key_pem: &str,
        public_key_pem: &str,
    ) -> Result<Self> {
        let private_key = private_key_pem.as_bytes();
        let public_key = public_key_pem.as_bytes();

        let (encoding_key, decoding_key) = match Family::from(algorithm) {
            Family::Hmac => return Err(SignatureError::UnsupportedAlgorithm),
            Family::Rsa => (
                EncodingKey::from_rsa_pem(private_key),
                DecodingKey::from_rsa_pem(public_key),
            ),
            Family::Ec => (
                EncodingKey::from_ec_pem(private_key),
                DecodingKey::from_ec_pem(public_key),
            ),
            Family::Ed => (
                EncodingKey::from_ed_pem(private_key),
                DecodingKey::from_ed_pem(public_key),
            ),
        };

        Ok(Self::with_keys(
            algorithm,
            encoding_key.map_err(SignatureError::Key)?,
            decoding_key.map_err(SignatureError::Key)?,
        ))
    }

    /// Create a [`JwtSigner`] from `secret`, `algo` and `keys` entries.
    pub fn from_config(config: &Configuration) -> crate::error::Result<Self> {
        let algorithm = config.algorithm()?;

        let signer = if Family::from(algorithm) == Family::Hmac {
            let secret = config
                .secret
                .as_deref()
                .filter(|secret| !secret.is_empty())
                .ok_or(ConfigError::MissingSecret)?;
            Self::hmac(algorithm, secret.as_bytes())?
        } else {
            let private_key = config
                .keys
                .private
                .as_deref()
                .ok_or(ConfigError::MissingKey("private"))?;
            let public_key = config
                .keys
                .public
                .as_deref()
                .ok_or(ConfigError::MissingKey("public"))?;
            Self::from_pem(algorithm, private_key, public_key)?
        };

        tracing::debug!(algorithm = ?algorithm, "json web token signer ready");
        Ok(signer)
    }

    fn with_keys(
        algorithm: Algorithm,
        encoding_key: EncodingKey,
        decoding_key: DecodingKey,
    ) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;

        Self {
            algorithm,
            encoding_key,
            decoding_key,
            validation,
        }
    }

    /// Refuse any token whose header does not declare our algorithm,
    /// including `none`.
    fn check_header(&self, token: &Token) -> Result<()> {
        let header = URL_SAFE_NO_PAD
            .decode(token.header())
            .map_err(|_| SignatureError::MalformedToken)?;
        let header: RawHeader = serde_json::from_slice(&header)
            .map_err(|_| SignatureError::MalformedToken)?;

        match Algorithm::from_str(&header.alg) {
            Ok(algorithm) if algorithm == self.algorithm => Ok(()),
            _ => Err(SignatureError::UnsupportedAlgorithm),
        }
    }
}

impl SigningProvider for JwtSigner {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn encode(&self, claims: &ClaimSet) -> Result<Token> {
        let header = Header::new(self.algorithm);
        let token = encode(&header, claims, &self.encoding_key)
            .map_err(SignatureError::Encoding)?;

        Token::new(token)
    }

    fn decode(&self, token: &Token) -> Result<ClaimSet> {
        self.check_header(token)?;

        decode::<ClaimSet>(token.as_str(), &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature => SignatureError::SignatureMismatch,
                ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::MissingAlgorithm => {
                    SignatureError::UnsupportedAlgorithm
                },
                _ => SignatureError::MalformedToken,
            })
    }
}
