//! The typed record model: what the control plane stores about users,
//! storage back-ends and secrets. Field names mirror the control-plane JSON
//! (camelCase).

use serde::Deserialize;
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "default".to_string()
}

/// A user identity plus its policy: how to authenticate it, where its data
/// lives, what it may do.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserRecord {
    /// The login name; unique within the deployment's namespace.
    pub username: String,
    /// The namespace the record lives in. Secret references without an
    /// explicit namespace resolve here.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default, rename = "type")]
    pub user_type: UserType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Password literal. Mutually exclusive with `passwordSecretRef` for
    /// regular users; refused entirely for admin users.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_secret_ref: Option<SecretKeyRef>,
    pub backend_ref: BackendRef,
    /// Absolute path of the user's home subtree on the selected back-end.
    pub home_directory: String,
    #[serde(default = "default_true")]
    pub chroot: bool,
    #[serde(default)]
    pub permissions: PermissionSet,
}

/// The user classes with distinct authentication policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Regular,
    /// RFC 1635 behavior: any password is accepted.
    Anonymous,
    /// Must authenticate through a password secret, never an inline literal.
    Admin,
}

/// The four coarse permission switches carried on a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PermissionSet {
    #[serde(default = "default_true")]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub delete: bool,
    #[serde(default = "default_true")]
    pub list: bool,
}

impl Default for PermissionSet {
    fn default() -> Self {
        PermissionSet {
            read: true,
            write: false,
            delete: false,
            list: true,
        }
    }
}

/// Which storage back-end record a user's data path binds to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackendRef {
    pub kind: BackendKind,
    pub name: String,
    /// Defaults to the owning user record's namespace.
    #[serde(default)]
    pub namespace: Option<String>,
}

/// The closed set of back-end families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BackendKind {
    ObjectStore,
    #[serde(rename = "WebDAV")]
    WebDav,
    Filesystem,
}

/// Reference to one key of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretKeyRef {
    pub name: String,
    /// Defaults to the owning record's namespace, never to a fixed value.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Defaults to `password`.
    #[serde(default)]
    pub key: Option<String>,
}

/// An S3-compatible object store holding one bucket worth of tenant data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectStoreBackendRecord {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Endpoint URL, e.g. `https://minio.example.net:9000`.
    pub endpoint: String,
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    /// Key prefix between the bucket root and every user home.
    #[serde(default)]
    pub path_prefix: String,
    pub credentials: BackendCredentials,
    #[serde(default)]
    pub tls: Option<TlsOptions>,
}

/// A remote WebDAV share.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebDavBackendRecord {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Endpoint URL, e.g. `https://dav.example.net/remote.php/dav`.
    pub endpoint: String,
    /// Collection path between the endpoint and every user home.
    #[serde(default)]
    pub base_path: String,
    pub credentials: BackendCredentials,
    #[serde(default)]
    pub tls: Option<TlsOptions>,
}

fn default_file_mode() -> String {
    "0644".to_string()
}

fn default_dir_mode() -> String {
    "0755".to_string()
}

/// A directory mounted into the server process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilesystemBackendRecord {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub base_path: String,
    #[serde(default)]
    pub read_only: bool,
    /// Octal mode string of the form `0nnn` for created files.
    #[serde(default = "default_file_mode")]
    pub file_mode: String,
    /// Octal mode string of the form `0nnn` for created directories.
    #[serde(default = "default_dir_mode")]
    pub dir_mode: String,
    /// Per-file upload cap in bytes; 0 means unbounded.
    #[serde(default)]
    pub max_file_size: u64,
}

/// TLS knobs for HTTP-based back-ends.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TlsOptions {
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// PEM bundle to trust instead of the system roots.
    #[serde(default)]
    pub ca_cert: Option<String>,
}

/// How a back-end authenticates against its store: an inline pair or a
/// reference to a secret holding the pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BackendCredentials {
    SecretRef {
        #[serde(rename = "secretRef")]
        secret_ref: BackendSecretRef,
    },
    Inline {
        /// Access key id for object stores, username for WebDAV.
        #[serde(alias = "username", rename = "accessKeyId")]
        access_key_id: String,
        /// Secret key for object stores, password for WebDAV.
        #[serde(alias = "password", rename = "secretAccessKey")]
        secret_access_key: String,
    },
}

/// Reference to the secret holding a back-end credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackendSecretRef {
    pub name: String,
    /// Defaults to the owning backend record's namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Key of the first half of the pair. Defaults per back-end family
    /// (`accessKeyID` or `username`).
    #[serde(default)]
    pub id_key: Option<String>,
    /// Key of the second half of the pair. Defaults per back-end family
    /// (`secretAccessKey` or `password`).
    #[serde(default)]
    pub secret_key: Option<String>,
}

/// An opaque named map of base64-encoded byte strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretRecord {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub data: HashMap<String, String>,
}

/// Parses a `0nnn` octal mode string as carried on filesystem backend
/// records.
pub fn parse_mode(mode: &str) -> Result<u32, String> {
    let bytes = mode.as_bytes();
    let well_formed = bytes.len() == 4 && bytes[0] == b'0' && bytes[1..].iter().all(|b| (b'0'..=b'7').contains(b));
    if !well_formed {
        return Err(format!("invalid mode '{}': expected the pattern 0nnn with octal digits", mode));
    }
    u32::from_str_radix(&mode[1..], 8).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn user_record_parses_with_defaults() {
        let user: UserRecord = serde_json::from_str(
            r#"{
                "username": "alice",
                "password": "P@ssw0rd!",
                "backendRef": {"kind": "ObjectStore", "name": "minio-main"},
                "homeDirectory": "/alice"
            }"#,
        )
        .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.namespace, "default");
        assert_eq!(user.user_type, UserType::Regular);
        assert!(user.enabled);
        assert!(user.chroot);
        assert_eq!(user.backend_ref.kind, BackendKind::ObjectStore);
        assert_eq!(user.permissions, PermissionSet::default());
    }

    #[test]
    fn user_type_and_webdav_kind_spellings() {
        let user: UserRecord = serde_json::from_str(
            r#"{
                "username": "ftp",
                "type": "anonymous",
                "backendRef": {"kind": "WebDAV", "name": "dav-1", "namespace": "storage"},
                "homeDirectory": "/pub"
            }"#,
        )
        .unwrap();
        assert_eq!(user.user_type, UserType::Anonymous);
        assert_eq!(user.backend_ref.kind, BackendKind::WebDav);
        assert_eq!(user.backend_ref.namespace.as_deref(), Some("storage"));
    }

    #[test]
    fn backend_credentials_inline_and_ref() {
        let inline: BackendCredentials = serde_json::from_str(r#"{"accessKeyId": "minio", "secretAccessKey": "minio123"}"#).unwrap();
        assert_eq!(
            inline,
            BackendCredentials::Inline {
                access_key_id: "minio".into(),
                secret_access_key: "minio123".into()
            }
        );

        let by_ref: BackendCredentials = serde_json::from_str(r#"{"secretRef": {"name": "minio-creds"}}"#).unwrap();
        match by_ref {
            BackendCredentials::SecretRef { secret_ref } => {
                assert_eq!(secret_ref.name, "minio-creds");
                assert_eq!(secret_ref.namespace, None);
            }
            _ => panic!("expected a secret ref"),
        }
    }

    #[test]
    fn webdav_credentials_accept_username_password_spelling() {
        let inline: BackendCredentials = serde_json::from_str(r#"{"username": "dav", "password": "hunter2"}"#).unwrap();
        assert_eq!(
            inline,
            BackendCredentials::Inline {
                access_key_id: "dav".into(),
                secret_access_key: "hunter2".into()
            }
        );
    }

    #[test]
    fn mode_strings() {
        assert_eq!(parse_mode("0644").unwrap(), 0o644);
        assert_eq!(parse_mode("0755").unwrap(), 0o755);
        assert!(parse_mode("644").is_err());
        assert!(parse_mode("0999").is_err());
        assert!(parse_mode("01644").is_err());
        assert!(parse_mode("").is_err());
    }
}
