//! The record-driven [`Authenticator`] and the user detail it produces.

use crate::cache::RecordCache;
use crate::records::{BackendRef, UserType};
use crate::resolve::{self, PasswordSource};
use async_trait::async_trait;
use ring::constant_time::verify_slices_are_equal;
use secrecy::ExposeSecret;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tenftp::auth::{AuthMethod, AuthenticationError, Authenticator, Credentials, StoragePermissions, UserDetail};

/// The authenticated subject handed to the FTP engine: everything a session
/// needs to confine paths, gate operations and bind storage.
#[derive(Debug, Clone)]
pub struct TenantUser {
    pub username: String,
    /// The namespace of the user record; backend references without one
    /// resolve here.
    pub namespace: String,
    pub user_type: UserType,
    pub home: PathBuf,
    pub chroot: bool,
    pub permissions: StoragePermissions,
    pub backend_ref: BackendRef,
    auth_method: AuthMethod,
}

impl fmt::Display for TenantUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}

impl UserDetail for TenantUser {
    fn home(&self) -> Option<&Path> {
        Some(&self.home)
    }

    fn chroot(&self) -> bool {
        self.chroot
    }

    fn storage_permissions(&self) -> StoragePermissions {
        self.permissions
    }

    fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }
}

/// Authenticates (username, password) pairs against user records.
///
/// Identity is re-derived from the record store on every login: passwords
/// referenced through secrets are re-read (rotation), and nothing about a
/// previous login leaks into the next. Session binding itself is the
/// engine's job; this type is deliberately stateless.
pub struct RegistryAuthenticator {
    cache: Arc<RecordCache>,
    anonymous_write: bool,
}

impl fmt::Debug for RegistryAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuthenticator")
            .field("anonymous_write", &self.anonymous_write)
            .finish()
    }
}

impl RegistryAuthenticator {
    pub fn new(cache: Arc<RecordCache>) -> Self {
        RegistryAuthenticator {
            cache,
            anonymous_write: false,
        }
    }

    /// Lets anonymous users keep the write/delete bits their records grant.
    /// Off by default: a record mistake should not turn an anonymous share
    /// into a writable drop box.
    pub fn allow_anonymous_write(mut self, allow: bool) -> Self {
        self.anonymous_write = allow;
        self
    }

    fn constant_time_eq(expected: &str, presented: &str) -> bool {
        verify_slices_are_equal(expected.as_bytes(), presented.as_bytes()).is_ok()
    }
}

#[async_trait]
impl Authenticator<TenantUser> for RegistryAuthenticator {
    #[tracing_attributes::instrument(skip(self, creds))]
    async fn authenticate(&self, username: &str, creds: &Credentials) -> Result<TenantUser, AuthenticationError> {
        let record = self.cache.get_user(username).await.map_err(|err| match err {
            crate::source::SourceError::NotFound(_) => AuthenticationError::BadUser,
            other => AuthenticationError::new(other.to_string()),
        })?;

        if !record.enabled {
            return Err(AuthenticationError::AccountDisabled);
        }

        let home = PathBuf::from(&record.home_directory);
        if !home.is_absolute() {
            return Err(AuthenticationError::new(format!(
                "user {} has a non-absolute home directory",
                record.username
            )));
        }

        let mut permissions = StoragePermissions::from_bools(
            record.permissions.read,
            record.permissions.write,
            record.permissions.delete,
            record.permissions.list,
        );

        let auth_method = match record.user_type {
            UserType::Anonymous => {
                // RFC 1635: any password (even none) is accepted.
                if !self.anonymous_write {
                    permissions &= !StoragePermissions::WRITE_OPS;
                }
                AuthMethod::Anonymous
            }
            UserType::Admin => {
                // Admin passwords must live in secrets; an inline literal on
                // an admin record is a configuration error, not a fallback.
                if record.password.is_some() || record.password_secret_ref.is_none() {
                    return Err(AuthenticationError::SecretError(
                        "admin users must reference a password secret".to_string(),
                    ));
                }
                verify_password(&record, creds, self.cache.source().as_ref()).await?;
                AuthMethod::Secret
            }
            UserType::Regular => match verify_password(&record, creds, self.cache.source().as_ref()).await? {
                PasswordSource::Inline => AuthMethod::Inline,
                PasswordSource::Secret => AuthMethod::Secret,
            },
        };

        Ok(TenantUser {
            username: record.username.clone(),
            namespace: record.namespace.clone(),
            user_type: record.user_type,
            home,
            chroot: record.chroot,
            permissions,
            backend_ref: record.backend_ref.clone(),
            auth_method,
        })
    }

    fn name(&self) -> &str {
        "registry"
    }
}

async fn verify_password(
    record: &crate::records::UserRecord,
    creds: &Credentials,
    source: &dyn crate::source::RecordSource,
) -> Result<PasswordSource, AuthenticationError> {
    let presented = creds.password.as_deref().ok_or(AuthenticationError::BadPassword)?;
    let (expected, from) = resolve::resolve_user_password(record, source)
        .await
        .map_err(AuthenticationError::secret)?;
    if RegistryAuthenticator::constant_time_eq(expected.expose_secret(), presented) {
        Ok(from)
    } else {
        Err(AuthenticationError::BadPassword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RecordCache;
    use crate::source::{MemorySource, RecordSet};
    use base64::Engine;
    use pretty_assertions::assert_eq;

    fn b64(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    async fn authenticator(records: &str) -> RegistryAuthenticator {
        let source = MemorySource::new(RecordSet::from_json(records).unwrap());
        let cache = RecordCache::new(Arc::new(source)).await.unwrap();
        RegistryAuthenticator::new(cache)
    }

    fn creds(password: &str) -> Credentials {
        Credentials {
            password: Some(password.to_string()),
            source_ip: "127.0.0.1".parse().unwrap(),
        }
    }

    fn records() -> String {
        format!(
            r#"{{
                "users": [
                    {{
                        "username": "alice",
                        "password": "P@ssw0rd!",
                        "backendRef": {{"kind": "ObjectStore", "name": "minio-main"}},
                        "homeDirectory": "/alice",
                        "permissions": {{"read": true, "write": true, "delete": true, "list": true}}
                    }},
                    {{
                        "username": "carol",
                        "namespace": "ns-a",
                        "passwordSecretRef": {{"name": "creds", "key": "password"}},
                        "backendRef": {{"kind": "Filesystem", "name": "disk"}},
                        "homeDirectory": "/carol"
                    }},
                    {{
                        "username": "root",
                        "type": "admin",
                        "passwordSecretRef": {{"name": "admin-pw"}},
                        "backendRef": {{"kind": "Filesystem", "name": "disk"}},
                        "homeDirectory": "/"
                    }},
                    {{
                        "username": "sloppy-admin",
                        "type": "admin",
                        "password": "inline-is-wrong",
                        "backendRef": {{"kind": "Filesystem", "name": "disk"}},
                        "homeDirectory": "/"
                    }},
                    {{
                        "username": "ftp",
                        "type": "anonymous",
                        "backendRef": {{"kind": "Filesystem", "name": "disk"}},
                        "homeDirectory": "/pub",
                        "permissions": {{"read": true, "write": true, "delete": true, "list": true}}
                    }},
                    {{
                        "username": "gone",
                        "enabled": false,
                        "password": "pw",
                        "backendRef": {{"kind": "Filesystem", "name": "disk"}},
                        "homeDirectory": "/gone"
                    }}
                ],
                "secrets": [
                    {{"name": "creds", "namespace": "ns-a", "data": {{"password": "{}"}}}},
                    {{"name": "creds", "namespace": "ns-b", "data": {{"password": "{}"}}}},
                    {{"name": "admin-pw", "data": {{"password": "{}"}}}}
                ]
            }}"#,
            b64("StrongPw9!"),
            b64("OtherNamespacePw"),
            b64("RootPw123!"),
        )
    }

    #[tokio::test]
    async fn regular_user_inline_password() {
        let auth = authenticator(&records()).await;
        let user = auth.authenticate("alice", &creds("P@ssw0rd!")).await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.auth_method(), AuthMethod::Inline);
        assert!(user.storage_permissions().contains(StoragePermissions::PUT));

        let denied = auth.authenticate("alice", &creds("nope")).await.unwrap_err();
        assert_eq!(denied.reason_label(), "invalid_password");
    }

    #[tokio::test]
    async fn secret_password_resolves_in_owning_namespace() {
        let auth = authenticator(&records()).await;
        // carol lives in ns-a; the ns-b secret of the same name holds a
        // different password that must not be accepted.
        let user = auth.authenticate("carol", &creds("StrongPw9!")).await.unwrap();
        assert_eq!(user.auth_method(), AuthMethod::Secret);
        assert!(auth.authenticate("carol", &creds("OtherNamespacePw")).await.is_err());
    }

    #[tokio::test]
    async fn admin_requires_secret_ref() {
        let auth = authenticator(&records()).await;
        assert!(auth.authenticate("root", &creds("RootPw123!")).await.is_ok());

        let err = auth.authenticate("sloppy-admin", &creds("inline-is-wrong")).await.unwrap_err();
        assert_eq!(err.reason_label(), "secret_error");
    }

    #[tokio::test]
    async fn anonymous_accepts_anything_but_cannot_write() {
        let auth = authenticator(&records()).await;
        let user = auth.authenticate("ftp", &creds("whatever@example.com")).await.unwrap();
        assert_eq!(user.auth_method(), AuthMethod::Anonymous);
        assert!(user.storage_permissions().contains(StoragePermissions::GET));
        assert!(!user.storage_permissions().intersects(StoragePermissions::WRITE_OPS));

        let writable = authenticator(&records()).await.allow_anonymous_write(true);
        let user = writable.authenticate("ftp", &creds("x")).await.unwrap();
        assert!(user.storage_permissions().contains(StoragePermissions::PUT));
    }

    #[tokio::test]
    async fn disabled_and_unknown_users_are_denied() {
        let auth = authenticator(&records()).await;
        assert_eq!(
            auth.authenticate("gone", &creds("pw")).await.unwrap_err().reason_label(),
            "user_disabled"
        );
        assert_eq!(
            auth.authenticate("mallory", &creds("pw")).await.unwrap_err().reason_label(),
            "user_not_found"
        );
    }
}
