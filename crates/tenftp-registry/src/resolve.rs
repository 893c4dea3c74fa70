//! Materialises passwords and backend credentials from records and secrets.
//!
//! The one rule that matters here: a secret reference that omits its
//! namespace resolves in the *owning record's* namespace. Never a fixed
//! default, or multi-tenant deployments would silently read each other's
//! secrets.

use crate::records::{BackendCredentials, SecretRecord, UserRecord};
use crate::source::{RecordSource, SourceError};
use base64::Engine;
use secrecy::SecretString;
use thiserror::Error;

/// Default key under which a user's password lives in a secret.
pub const DEFAULT_PASSWORD_KEY: &str = "password";
/// Default key pair for object-store backend credentials.
pub const OBJECT_STORE_KEYS: (&str, &str) = ("accessKeyID", "secretAccessKey");
/// Default key pair for WebDAV backend credentials.
pub const WEBDAV_KEYS: (&str, &str) = ("username", "password");

/// Errors produced while materialising credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The referenced secret does not exist in the resolved namespace.
    #[error("secret {namespace}/{name} not found")]
    SecretMissing {
        name: String,
        namespace: String,
    },
    /// The secret exists but lacks the requested key.
    #[error("secret {namespace}/{name} has no key '{key}'")]
    KeyMissing {
        name: String,
        namespace: String,
        key: String,
    },
    /// The value under the key is empty or not valid base64/UTF-8.
    #[error("secret {namespace}/{name} key '{key}' holds an empty or undecodable value")]
    EmptyValue {
        name: String,
        namespace: String,
        key: String,
    },
    /// The record carries neither an inline credential nor a secret ref.
    #[error("record configures no credentials")]
    NotConfigured,
    /// The store could not be consulted.
    #[error(transparent)]
    Source(#[from] SourceError),
}

fn secret_value(secret: &SecretRecord, key: &str) -> Result<SecretString, CredentialError> {
    let raw = secret.data.get(key).ok_or_else(|| CredentialError::KeyMissing {
        name: secret.name.clone(),
        namespace: secret.namespace.clone(),
        key: key.to_string(),
    })?;
    let empty = || CredentialError::EmptyValue {
        name: secret.name.clone(),
        namespace: secret.namespace.clone(),
        key: key.to_string(),
    };
    let decoded = base64::engine::general_purpose::STANDARD.decode(raw).map_err(|_| empty())?;
    let value = String::from_utf8(decoded).map_err(|_| empty())?;
    if value.is_empty() {
        return Err(empty());
    }
    Ok(SecretString::from(value))
}

async fn fetch_secret(source: &dyn RecordSource, name: &str, namespace: &str) -> Result<SecretRecord, CredentialError> {
    match source.get_secret(name, namespace).await {
        Ok(secret) => Ok(secret),
        Err(SourceError::NotFound(_)) => Err(CredentialError::SecretMissing {
            name: name.to_string(),
            namespace: namespace.to_string(),
        }),
        Err(err) => Err(err.into()),
    }
}

/// How a user password was obtained; feeds the login method counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    Inline,
    Secret,
}

/// Returns the user's effective password. Inline literals win; otherwise
/// the referenced secret is read under its `key` (default `password`),
/// resolved in the user record's namespace when the ref has none.
pub async fn resolve_user_password(user: &UserRecord, source: &dyn RecordSource) -> Result<(SecretString, PasswordSource), CredentialError> {
    if let Some(password) = &user.password {
        if password.is_empty() {
            return Err(CredentialError::EmptyValue {
                name: user.username.clone(),
                namespace: user.namespace.clone(),
                key: "password".to_string(),
            });
        }
        return Ok((SecretString::from(password.clone()), PasswordSource::Inline));
    }

    let secret_ref = user.password_secret_ref.as_ref().ok_or(CredentialError::NotConfigured)?;
    let namespace = secret_ref.namespace.as_deref().unwrap_or(&user.namespace);
    let secret = fetch_secret(source, &secret_ref.name, namespace).await?;
    let key = secret_ref.key.as_deref().unwrap_or(DEFAULT_PASSWORD_KEY);
    Ok((secret_value(&secret, key)?, PasswordSource::Secret))
}

/// Returns a backend's credential pair (id, secret). `default_keys` names
/// the secret keys per back-end family, e.g. [`OBJECT_STORE_KEYS`] or
/// [`WEBDAV_KEYS`]. A ref without a namespace resolves in
/// `owner_namespace`, the namespace of the backend record itself.
pub async fn resolve_backend_credentials(
    credentials: &BackendCredentials,
    owner_namespace: &str,
    default_keys: (&str, &str),
    source: &dyn RecordSource,
) -> Result<(String, SecretString), CredentialError> {
    match credentials {
        BackendCredentials::Inline {
            access_key_id,
            secret_access_key,
        } => {
            if access_key_id.is_empty() || secret_access_key.is_empty() {
                return Err(CredentialError::NotConfigured);
            }
            Ok((access_key_id.clone(), SecretString::from(secret_access_key.clone())))
        }
        BackendCredentials::SecretRef { secret_ref } => {
            let namespace = secret_ref.namespace.as_deref().unwrap_or(owner_namespace);
            let secret = fetch_secret(source, &secret_ref.name, namespace).await?;
            let id_key = secret_ref.id_key.as_deref().unwrap_or(default_keys.0);
            let secret_key = secret_ref.secret_key.as_deref().unwrap_or(default_keys.1);
            let id = secret_value(&secret, id_key)?;
            let value = secret_value(&secret, secret_key)?;
            use secrecy::ExposeSecret;
            Ok((id.expose_secret().to_string(), value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, RecordSet};
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn b64(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    fn source_with_secret(namespace: &str) -> MemorySource {
        let json = format!(
            r#"{{
                "secrets": [
                    {{"name": "creds", "namespace": "{}", "data": {{"password": "{}", "accessKeyID": "{}", "secretAccessKey": "{}", "empty": ""}}}}
                ]
            }}"#,
            namespace,
            b64("StrongPw9!"),
            b64("minio"),
            b64("minio123"),
        );
        MemorySource::new(RecordSet::from_json(&json).unwrap())
    }

    fn user_with_secret_ref(namespace: &str, ref_namespace: Option<&str>) -> UserRecord {
        let ns_field = match ref_namespace {
            Some(ns) => format!(r#", "namespace": "{}""#, ns),
            None => String::new(),
        };
        serde_json::from_str(&format!(
            r#"{{
                "username": "carol",
                "namespace": "{}",
                "passwordSecretRef": {{"name": "creds"{}}},
                "backendRef": {{"kind": "Filesystem", "name": "disk"}},
                "homeDirectory": "/carol"
            }}"#,
            namespace, ns_field
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn inline_password_wins() {
        let source = MemorySource::default();
        let user: UserRecord = serde_json::from_str(
            r#"{
                "username": "alice",
                "password": "P@ssw0rd!",
                "backendRef": {"kind": "Filesystem", "name": "disk"},
                "homeDirectory": "/alice"
            }"#,
        )
        .unwrap();
        let (pw, from) = resolve_user_password(&user, &source).await.unwrap();
        assert_eq!(pw.expose_secret(), "P@ssw0rd!");
        assert_eq!(from, PasswordSource::Inline);
    }

    #[tokio::test]
    async fn secret_ref_defaults_to_owner_namespace() {
        // The secret lives in ns-a, same as the user; a same-named secret
        // in another namespace must not be consulted.
        let source = source_with_secret("ns-a");
        let user = user_with_secret_ref("ns-a", None);
        let (pw, from) = resolve_user_password(&user, &source).await.unwrap();
        assert_eq!(pw.expose_secret(), "StrongPw9!");
        assert_eq!(from, PasswordSource::Secret);

        // Same records, but the user now lives in ns-b: resolution looks in
        // ns-b and fails instead of silently finding ns-a's secret.
        let stranger = user_with_secret_ref("ns-b", None);
        assert!(matches!(
            resolve_user_password(&stranger, &source).await,
            Err(CredentialError::SecretMissing { .. })
        ));
    }

    #[tokio::test]
    async fn explicit_ref_namespace_is_honoured() {
        let source = source_with_secret("ns-a");
        let user = user_with_secret_ref("ns-b", Some("ns-a"));
        let (pw, _) = resolve_user_password(&user, &source).await.unwrap();
        assert_eq!(pw.expose_secret(), "StrongPw9!");
    }

    #[tokio::test]
    async fn missing_key_and_empty_value() {
        let source = source_with_secret("ns-a");
        let mut user = user_with_secret_ref("ns-a", None);
        user.password_secret_ref.as_mut().unwrap().key = Some("nope".to_string());
        assert!(matches!(
            resolve_user_password(&user, &source).await,
            Err(CredentialError::KeyMissing { .. })
        ));

        user.password_secret_ref.as_mut().unwrap().key = Some("empty".to_string());
        assert!(matches!(
            resolve_user_password(&user, &source).await,
            Err(CredentialError::EmptyValue { .. })
        ));
    }

    #[tokio::test]
    async fn backend_pair_from_secret_with_default_keys() {
        let source = source_with_secret("storage");
        let credentials: BackendCredentials = serde_json::from_str(r#"{"secretRef": {"name": "creds"}}"#).unwrap();
        let (id, secret) = resolve_backend_credentials(&credentials, "storage", OBJECT_STORE_KEYS, &source)
            .await
            .unwrap();
        assert_eq!(id, "minio");
        assert_eq!(secret.expose_secret(), "minio123");
    }

    #[tokio::test]
    async fn backend_pair_inline() {
        let source = MemorySource::default();
        let credentials: BackendCredentials = serde_json::from_str(r#"{"username": "dav", "password": "hunter2"}"#).unwrap();
        let (id, secret) = resolve_backend_credentials(&credentials, "default", WEBDAV_KEYS, &source).await.unwrap();
        assert_eq!(id, "dav");
        assert_eq!(secret.expose_secret(), "hunter2");
    }
}
