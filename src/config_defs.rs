use std::{fmt, str::FromStr};

/// Namespace the Ingress rule applies to when none is given.
pub const DEFAULT_NAMESPACE: &str = "domino-compute";

/// Reference to a pre-existing TLS secret, written as `namespace/secret_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
#[error("TLS secret must have the form namespace/secret_name, got {0:?}")]
pub struct InvalidSecretRef(String);

impl FromStr for SecretRef {
    type Err = InvalidSecretRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = s
            .split_once('/')
            .ok_or_else(|| InvalidSecretRef(s.to_string()))?;
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(InvalidSecretRef(s.to_string()));
        }
        Ok(SecretRef {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Process-wide settings. Built once at startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Hostname put into `spec.tls[0].hosts` together with its wildcard.
    pub tls_host: String,
    pub tls_secret: SecretRef,
    /// Ingresses outside this namespace are left alone.
    pub target_namespace: String,
}

impl Configuration {
    pub fn new(
        tls_host: impl Into<String>,
        tls_secret: SecretRef,
        target_namespace: impl Into<String>,
    ) -> Self {
        Configuration {
            tls_host: tls_host.into(),
            tls_secret,
            target_namespace: target_namespace.into(),
        }
    }

    pub fn wildcard_host(&self) -> String {
        format!("*.{}", self.tls_host)
    }
}
