use sqlx::SqlitePool;
use time::OffsetDateTime;

use leoscope_core::model::GlobalConfig;

const KEY_GLOBAL_CONFIG: &str = "global_config_v1";

pub async fn get(db: &SqlitePool) -> Result<Option<GlobalConfig>, anyhow::Error> {
    let Some(json) = crate::settings_repo::get_value_json(db, KEY_GLOBAL_CONFIG).await? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(&json)?))
}

pub async fn upsert(db: &SqlitePool, doc: serde_json::Value) -> Result<GlobalConfig, anyhow::Error> {
    let config = GlobalConfig {
        doc,
        updated_at: OffsetDateTime::now_utc().unix_timestamp(),
    };
    let json = serde_json::to_string(&config)?;
    crate::settings_repo::upsert_value_json(db, KEY_GLOBAL_CONFIG, &json).await?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn global_config_round_trip() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        assert!(get(&pool).await.unwrap().is_none());

        upsert(&pool, serde_json::json!({"retention_days": 30}))
            .await
            .unwrap();

        let loaded = get(&pool).await.unwrap().expect("loaded");
        assert_eq!(loaded.doc["retention_days"], 30);
    }
}
