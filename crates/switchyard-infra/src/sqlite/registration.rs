//! SQLite webhook registration and secret store.
//!
//! Implements `RegistrationStore` and `WebhookSecretStore`. Secrets live in
//! their own table so registration rows never carry key material.

use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::Row;

use switchyard_core::repository::registration::RegistrationStore;
use switchyard_core::repository::secret::WebhookSecretStore;
use switchyard_types::error::RepositoryError;
use switchyard_types::secret::Redacted;
use switchyard_types::subscription::{
    PhysicalWebhookRegistration, RegistrationId, SubscriptionMetadata, WebhookSubscriptionRequest,
};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `RegistrationStore` + `WebhookSecretStore`.
#[derive(Clone)]
pub struct SqliteRegistrationStore {
    pool: DatabasePool,
}

impl SqliteRegistrationStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct RegistrationRow {
    id: String,
    integration: String,
    account: String,
    url: String,
    covered: String,
    metadata: Option<String>,
    triggers: String,
    created_at: String,
    updated_at: String,
}

impl RegistrationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            integration: row.try_get("integration")?,
            account: row.try_get("account")?,
            url: row.try_get("url")?,
            covered: row.try_get("covered")?,
            metadata: row.try_get("metadata")?,
            triggers: row.try_get("triggers")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_registration(self) -> Result<PhysicalWebhookRegistration, RepositoryError> {
        let id = self
            .id
            .parse::<RegistrationId>()
            .map_err(|e| RepositoryError::Query(format!("invalid registration id: {e}")))?;
        let covered: WebhookSubscriptionRequest = from_json(&self.covered, "covered")?;
        let metadata: Option<SubscriptionMetadata> = self
            .metadata
            .as_deref()
            .map(|m| from_json(m, "metadata"))
            .transpose()?;
        let triggers: BTreeSet<String> = from_json(&self.triggers, "triggers")?;

        Ok(PhysicalWebhookRegistration {
            id,
            integration: self.integration,
            account: self.account,
            url: self.url,
            covered,
            metadata,
            triggers,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str, column: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {column}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T, column: &str) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::Query(format!("failed to serialize {column}: {e}")))
}

// ---------------------------------------------------------------------------
// RegistrationStore implementation
// ---------------------------------------------------------------------------

impl RegistrationStore for SqliteRegistrationStore {
    async fn get_registration(
        &self,
        id: &RegistrationId,
    ) -> Result<Option<PhysicalWebhookRegistration>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM webhook_registrations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.map(|row| {
            RegistrationRow::from_row(&row)
                .map_err(query_error)?
                .into_registration()
        })
        .transpose()
    }

    async fn find_registration(
        &self,
        integration: &str,
        account: &str,
    ) -> Result<Option<PhysicalWebhookRegistration>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM webhook_registrations WHERE integration = ? AND account = ?",
        )
        .bind(integration)
        .bind(account)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        row.map(|row| {
            RegistrationRow::from_row(&row)
                .map_err(query_error)?
                .into_registration()
        })
        .transpose()
    }

    async fn save_registration(
        &self,
        registration: &PhysicalWebhookRegistration,
    ) -> Result<(), RepositoryError> {
        let metadata = registration
            .metadata
            .as_ref()
            .map(|m| to_json(m, "metadata"))
            .transpose()?;

        let result = sqlx::query(
            r#"INSERT INTO webhook_registrations
               (id, integration, account, url, covered, metadata, triggers, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (id) DO UPDATE SET
                   url = excluded.url,
                   covered = excluded.covered,
                   metadata = excluded.metadata,
                   triggers = excluded.triggers,
                   updated_at = excluded.updated_at"#,
        )
        .bind(registration.id.to_string())
        .bind(&registration.integration)
        .bind(&registration.account)
        .bind(&registration.url)
        .bind(to_json(&registration.covered, "covered")?)
        .bind(metadata)
        .bind(to_json(&registration.triggers, "triggers")?)
        .bind(format_datetime(&registration.created_at))
        .bind(format_datetime(&registration.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepositoryError::Conflict(format!(
                    "registration for {}/{} already exists",
                    registration.integration, registration.account
                )))
            }
            Err(e) => Err(query_error(e)),
        }
    }

    async fn delete_registration(&self, id: &RegistrationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM webhook_registrations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// WebhookSecretStore implementation
// ---------------------------------------------------------------------------

impl WebhookSecretStore for SqliteRegistrationStore {
    async fn get_secret(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<Redacted>, RepositoryError> {
        let row = sqlx::query("SELECT secret FROM webhook_secrets WHERE registration_id = ?")
            .bind(registration_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let secret: String = row.try_get("secret").map_err(query_error)?;
                Ok(Some(Redacted::new(secret)))
            }
            None => Ok(None),
        }
    }

    async fn set_secret(
        &self,
        registration_id: &RegistrationId,
        secret: &Redacted,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO webhook_secrets (registration_id, secret, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT (registration_id) DO UPDATE SET
                   secret = excluded.secret, updated_at = excluded.updated_at"#,
        )
        .bind(registration_id.to_string())
        .bind(secret.expose())
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn delete_secret(&self, registration_id: &RegistrationId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM webhook_secrets WHERE registration_id = ?")
            .bind(registration_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::sqlite::test_pool;

    fn registration(account: &str) -> PhysicalWebhookRegistration {
        let id = RegistrationId::new();
        let mut reg = PhysicalWebhookRegistration::new(
            id,
            "deploy",
            account,
            format!("https://hooks.example.com/webhooks/{id}"),
            WebhookSubscriptionRequest::new(["DeploymentSucceeded"])
                .with_filter("projects", ["Projects-1"]),
        );
        reg.metadata = Some(SubscriptionMetadata {
            remote_id: "Subscriptions-1".to_string(),
            scope_id: Some(account.to_string()),
        });
        reg.triggers.insert("trigger-a".to_string());
        reg
    }

    #[tokio::test]
    async fn test_save_and_get_registration() {
        let store = SqliteRegistrationStore::new(test_pool().await);
        let reg = registration("Spaces-1");
        store.save_registration(&reg).await.unwrap();

        let loaded = store.get_registration(&reg.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, reg.id);
        assert_eq!(loaded.covered, reg.covered);
        assert_eq!(loaded.metadata, reg.metadata);
        assert_eq!(loaded.triggers, reg.triggers);

        let found = store
            .find_registration("deploy", "Spaces-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, reg.id);
        assert!(store
            .find_registration("deploy", "Spaces-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_save_registration_upserts() {
        let store = SqliteRegistrationStore::new(test_pool().await);
        let mut reg = registration("Spaces-1");
        store.save_registration(&reg).await.unwrap();

        reg.triggers.insert("trigger-b".to_string());
        reg.covered = WebhookSubscriptionRequest::new(["DeploymentSucceeded", "DeploymentFailed"]);
        store.save_registration(&reg).await.unwrap();

        let loaded = store.get_registration(&reg.id).await.unwrap().unwrap();
        assert_eq!(loaded.triggers.len(), 2);
        assert_eq!(loaded.covered.events.len(), 2);
        assert!(loaded.covered.filters.is_empty());
    }

    #[tokio::test]
    async fn test_second_registration_for_account_conflicts() {
        let store = SqliteRegistrationStore::new(test_pool().await);
        store.save_registration(&registration("Spaces-1")).await.unwrap();
        let err = store
            .save_registration(&registration("Spaces-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_registration() {
        let store = SqliteRegistrationStore::new(test_pool().await);
        let reg = registration("Spaces-1");
        store.save_registration(&reg).await.unwrap();

        assert!(store.delete_registration(&reg.id).await.unwrap());
        assert!(!store.delete_registration(&reg.id).await.unwrap());
        assert!(store.get_registration(&reg.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_secret_lifecycle() {
        let store = SqliteRegistrationStore::new(test_pool().await);
        let id = RegistrationId::new();
        assert!(store.get_secret(&id).await.unwrap().is_none());

        store.set_secret(&id, &Redacted::new("first")).await.unwrap();
        store.set_secret(&id, &Redacted::new("second")).await.unwrap();
        assert_eq!(
            store.get_secret(&id).await.unwrap().unwrap().expose(),
            "second"
        );

        store.delete_secret(&id).await.unwrap();
        assert!(store.get_secret(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_registration_rows_carry_no_secret() {
        let store = SqliteRegistrationStore::new(test_pool().await);
        let reg = registration("Spaces-1");
        store.save_registration(&reg).await.unwrap();
        store
            .set_secret(&reg.id, &Redacted::new("top-secret-value"))
            .await
            .unwrap();

        let row: (String, String, String) = sqlx::query_as(
            "SELECT covered, COALESCE(metadata, ''), triggers FROM webhook_registrations WHERE id = ?",
        )
        .bind(reg.id.to_string())
        .fetch_one(&store.pool.reader)
        .await
        .unwrap();
        let joined = format!("{}{}{}", row.0, row.1, row.2);
        assert!(!joined.contains("top-secret-value"));
    }
}
