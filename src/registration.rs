//! # Registration: Validating and Managing Server Records
//!
//! Validation runs before anything is stored or probed and reports every
//! problem at once. A duplicate hostname is reported separately as a conflict.
//! A newly registered server gets a seeded status document immediately so it
//! appears on the dashboard before its first poll.
//!
//! These functions write to the store directly. The API calls them through
//! [`crate::coordinator::Coordinator`], which holds the host lock.

use crate::model::{ServerMeta, ServerMetaView, ServerStatusDocument};
use crate::store::StatusStore;
use std::collections::HashSet;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("invalid server registration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("server {0} is already registered")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// RFC 1123 host name: dot-separated labels of ASCII alphanumerics and `-`,
/// no label starting or ending with `-`.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }
    hostname.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Database names are bound as parameters, but are still restricted to plain
/// identifiers.
pub fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '-'))
}

/// Collect every validation problem of a (normalized) registration.
pub fn validate(meta: &ServerMeta) -> Vec<String> {
    let mut errors = Vec::new();

    if meta.hostname.is_empty() {
        errors.push("hostname is required".to_string());
    } else if !is_valid_hostname(&meta.hostname) {
        errors.push(format!("hostname '{}' is not a valid host name", meta.hostname));
    }

    if meta.is_cluster {
        if meta.node_hostnames.is_empty() {
            errors.push("a cluster needs at least one node hostname".to_string());
        }
        let mut seen = HashSet::new();
        for node in &meta.node_hostnames {
            if !is_valid_hostname(node) {
                errors.push(format!("node hostname '{node}' is not a valid host name"));
            } else if !seen.insert(node.as_str()) {
                errors.push(format!("node hostname '{node}' is listed twice"));
            }
        }
    }

    let required = [
        (&meta.registry_username, "registry username"),
        (&meta.registry_password, "registry password"),
        (&meta.shell_username, "shell username"),
        (&meta.shell_password, "shell password"),
    ];
    for (value, label) in required {
        if value.trim().is_empty() {
            errors.push(format!("{label} is required"));
        }
    }

    if meta.show_database_info {
        let db_required = [
            (&meta.database_host, "database host"),
            (&meta.database_username, "database username"),
            (&meta.database_password, "database password"),
        ];
        for (value, label) in db_required {
            if value.trim().is_empty() {
                errors.push(format!("{label} is required when database info is shown"));
            }
        }
        if meta.selected_database_names.is_empty() {
            errors.push("select at least one database".to_string());
        }
        for name in &meta.selected_database_names {
            if !is_valid_database_name(name) {
                errors.push(format!("database name '{name}' is not a plain identifier"));
            }
        }
    }

    errors
}

/// Validate, store and seed a new server.
pub async fn register_server(
    store: &dyn StatusStore,
    meta: ServerMeta,
) -> Result<ServerMetaView, RegistrationError> {
    let meta = meta.normalized();
    let errors = validate(&meta);
    if !errors.is_empty() {
        return Err(RegistrationError::Invalid(errors));
    }
    if !store.create_server_meta(&meta).await? {
        return Err(RegistrationError::Conflict(meta.hostname));
    }
    store
        .put_status(&ServerStatusDocument::from_meta(&meta))
        .await?;
    info!(hostname = %meta.hostname, cluster = meta.is_cluster, "server registered");

    let stored = store.get_server_meta(&meta.hostname).await?.unwrap_or(meta);
    Ok(stored.view())
}

/// Clean a tag list: trimmed, no empties, first occurrence kept.
pub fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Replace a server's tags. `Ok(false)` for an unknown hostname.
pub async fn update_tags(
    store: &dyn StatusStore,
    hostname: &str,
    tags: Vec<String>,
) -> anyhow::Result<bool> {
    store.update_server_tags(hostname, &clean_tags(tags)).await
}

/// Remove a server and its status document. `Ok(false)` for an unknown hostname.
pub async fn delete_server(store: &dyn StatusStore, hostname: &str) -> anyhow::Result<bool> {
    let deleted = store.delete_server(hostname).await?;
    if deleted {
        info!(hostname, "server deleted");
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn valid() -> ServerMeta {
        ServerMeta {
            hostname: "thor.example.com".into(),
            is_cluster: false,
            node_hostnames: vec![],
            registry_username: "admin".into(),
            registry_password: "secret".into(),
            shell_username: "root".into(),
            shell_password: "secret".into(),
            show_database_info: false,
            database_host: String::new(),
            database_username: String::new(),
            database_password: String::new(),
            selected_database_names: vec![],
            tags: vec![],
            created_at: None,
        }
    }

    #[test]
    fn hostname_rules() {
        assert!(is_valid_hostname("thor"));
        assert!(is_valid_hostname("thor-1.example.com"));
        assert!(!is_valid_hostname("-thor"));
        assert!(!is_valid_hostname("thor..com"));
        assert!(!is_valid_hostname("thor_1"));
        assert!(!is_valid_hostname(&"a".repeat(64)));
    }

    #[test]
    fn database_name_rules() {
        assert!(is_valid_database_name("orders_2024"));
        assert!(!is_valid_database_name("orders; DROP TABLE x"));
        assert!(!is_valid_database_name(""));
    }

    #[test]
    fn valid_registration_has_no_errors() {
        assert!(validate(&valid()).is_empty());
    }

    #[test]
    fn errors_are_batched() {
        let meta = ServerMeta {
            hostname: "bad host".into(),
            shell_password: String::new(),
            show_database_info: true,
            ..valid()
        };
        let errors = validate(&meta);
        assert!(errors.len() >= 5, "{:?}", errors);
        assert!(errors.iter().any(|e| e.contains("hostname")));
        assert!(errors.iter().any(|e| e.contains("shell password")));
        assert!(errors.iter().any(|e| e.contains("select at least one database")));
    }

    #[test]
    fn cluster_requires_distinct_nodes() {
        let meta = ServerMeta {
            is_cluster: true,
            node_hostnames: vec![],
            ..valid()
        };
        assert_eq!(validate(&meta).len(), 1);

        let meta = ServerMeta {
            is_cluster: true,
            node_hostnames: vec!["n1".into(), "n1".into()],
            ..valid()
        };
        assert!(validate(&meta)[0].contains("listed twice"));
    }

    #[test]
    fn tags_cleaned() {
        let tags = clean_tags(vec![" prod ".into(), "".into(), "prod".into(), "eu".into()]);
        assert_eq!(tags, vec!["prod", "eu"]);
    }

    #[tokio::test]
    async fn register_seeds_document_and_detects_conflict() {
        let store = MemoryStore::new();
        let view = register_server(&store, valid()).await.unwrap();
        assert_eq!(view.hostname, "thor.example.com");

        let doc = store.get_status("thor.example.com").await.unwrap().unwrap();
        assert_eq!(doc.alias, "thor");
        assert!(doc.services.is_empty());

        let err = register_server(&store, valid()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Conflict(_)));
    }

    #[tokio::test]
    async fn invalid_registration_stores_nothing() {
        let store = MemoryStore::new();
        let meta = ServerMeta {
            registry_username: String::new(),
            ..valid()
        };
        let err = register_server(&store, meta).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Invalid(ref e) if e.len() == 1));
        assert!(store.list_server_meta().await.unwrap().is_empty());
    }
}
