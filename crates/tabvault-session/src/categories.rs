//! Session categories

use tabvault_security::sanitize_text;
use tabvault_storage::keys;

use crate::error::SessionError;
use crate::store::SessionStore;
use crate::Result;

/// Seeded the first time the list is read
pub const DEFAULT_CATEGORIES: &[&str] = &["general", "work", "personal", "research"];

impl SessionStore {
    pub async fn list_categories(&self) -> Result<Vec<String>> {
        if let Some(value) = self.store.get(keys::CATEGORIES).await? {
            if let Ok(categories) = serde_json::from_value::<Vec<String>>(value) {
                return Ok(categories);
            }
            tracing::warn!("Category list is malformed, reseeding defaults");
        }

        let defaults: Vec<String> = DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect();
        self.write_categories(&defaults).await?;
        Ok(defaults)
    }

    /// Adding an existing category (ignoring case) is a no-op
    pub async fn add_category(&self, name: &str) -> Result<Vec<String>> {
        let name = sanitize_text(name.trim());
        if name.is_empty() {
            return Err(SessionError::EmptyCategory);
        }

        let mut categories = self.list_categories().await?;
        if !categories.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
            categories.push(name.clone());
            self.write_categories(&categories).await?;
            tracing::info!(category = %name, "Added category");
        }
        Ok(categories)
    }

    /// Sessions filed under the category keep it
    pub async fn remove_category(&self, name: &str) -> Result<Vec<String>> {
        let mut categories = self.list_categories().await?;
        let before = categories.len();
        categories.retain(|c| !c.eq_ignore_ascii_case(name.trim()));

        if categories.len() != before {
            self.write_categories(&categories).await?;
            tracing::info!(category = %name, "Removed category");
        }
        Ok(categories)
    }

    async fn write_categories(&self, categories: &[String]) -> Result<()> {
        self.store
            .set_one(keys::CATEGORIES, serde_json::to_value(categories)?)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::store::tests::store_with;
    use crate::store::StoreOptions;
    use crate::SessionError;

    #[tokio::test]
    async fn test_defaults_seeded() {
        let (store, _host, _db) = store_with(StoreOptions::default());
        let categories = store.list_categories().await.unwrap();
        assert_eq!(categories, vec!["general", "work", "personal", "research"]);
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let (store, _host, _db) = store_with(StoreOptions::default());

        let added = store.add_category(" <i>Travel</i> ").await.unwrap();
        assert!(added.contains(&"iTravel/i".to_string()));

        let again = store.add_category("WORK").await.unwrap();
        assert_eq!(again.len(), added.len());

        let removed = store.remove_category("Work").await.unwrap();
        assert!(!removed.iter().any(|c| c == "work"));
        assert_eq!(store.list_categories().await.unwrap(), removed);

        assert!(matches!(
            store.add_category("   ").await,
            Err(SessionError::EmptyCategory)
        ));
    }
}
