//! Shared-credential authentication
//! Every request must carry `Authorization: Basic <base64(user:password)>`

use base64::{engine::general_purpose::STANDARD, Engine};
use subtle::ConstantTimeEq;
use tracing::warn;

use super::error::{FotaError, Result};

#[derive(Clone)]
pub struct Credentials {
    expected: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{}:{}", username, password));
        Self {
            expected: format!("Basic {}", token),
        }
    }

    pub fn verify(&self, authorization: Option<&str>) -> Result<()> {
        let Some(presented) = authorization else {
            warn!("request without credentials");
            return Err(FotaError::AuthenticationFailed);
        };

        if bool::from(presented.as_bytes().ct_eq(self.expected.as_bytes())) {
            Ok(())
        } else {
            warn!("request with incorrect credentials");
            Err(FotaError::AuthenticationFailed)
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials(..)")
    }
}
