use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;

use leoscope_core::model::{Coords, Node, Role};

fn row_to_node(row: sqlx::sqlite::SqliteRow) -> Node {
    Node {
        id: row.get::<String, _>("id"),
        display_name: row.get::<String, _>("display_name"),
        coords: Coords {
            lat: row.get::<f64, _>("lat"),
            lon: row.get::<f64, _>("lon"),
        },
        location: row.get::<String, _>("location"),
        provider: row.get::<String, _>("provider"),
        last_active_ts: row.get::<i64, _>("last_active_ts"),
        public_ip: row.get::<Option<String>, _>("public_ip"),
        scavenger_active: row.get::<i64, _>("scavenger_active") != 0,
    }
}

const NODE_COLUMNS: &str = "id, display_name, lat, lon, location, provider, last_active_ts, public_ip, scavenger_active";

/// Registers the paired `users` (role `NODE`) and `nodes` rows
/// transactionally — a node and its auth identity are always created or
/// never created.
#[allow(clippy::too_many_arguments)]
pub async fn register_node(
    db: &SqlitePool,
    node_id: &str,
    display_name: &str,
    coords: Coords,
    location: &str,
    provider: &str,
    static_token_hash: &[u8],
) -> Result<(), anyhow::Error> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut tx = db.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, name, role, team, static_token_hash, created_at) VALUES (?, ?, ?, NULL, ?, ?)",
    )
    .bind(node_id)
    .bind(display_name)
    .bind(Role::Node.to_string())
    .bind(static_token_hash)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO nodes (id, display_name, lat, lon, location, provider, last_active_ts, public_ip, scavenger_active, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, NULL, 0, ?)
        "#,
    )
    .bind(node_id)
    .bind(display_name)
    .bind(coords.lat)
    .bind(coords.lon)
    .bind(location)
    .bind(provider)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub struct NodesFilter<'a> {
    pub node_id: Option<&'a str>,
    pub location: Option<&'a str>,
    pub active_since_ts: Option<i64>,
}

pub async fn get_nodes(db: &SqlitePool, filter: NodesFilter<'_>) -> Result<Vec<Node>, anyhow::Error> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes ORDER BY id");
    let rows = sqlx::query(&sql).fetch_all(db).await?;

    Ok(rows
        .into_iter()
        .map(row_to_node)
        .filter(|n| filter.node_id.is_none_or(|id| n.id == id))
        .filter(|n| filter.location.is_none_or(|loc| n.location == loc))
        .filter(|n| {
            filter
                .active_since_ts
                .is_none_or(|since| n.last_active_ts >= since)
        })
        .collect())
}

/// Partial update of the mutable node fields. Unset fields keep their
/// current value.
pub struct NodeUpdate<'a> {
    pub display_name: Option<&'a str>,
    pub coords: Option<Coords>,
    pub location: Option<&'a str>,
    pub provider: Option<&'a str>,
    pub public_ip: Option<Option<&'a str>>,
}

pub async fn update_node(db: &SqlitePool, node_id: &str, update: NodeUpdate<'_>) -> Result<bool, anyhow::Error> {
    let existing = get_nodes(
        db,
        NodesFilter {
            node_id: Some(node_id),
            location: None,
            active_since_ts: None,
        },
    )
    .await?;
    let Some(existing) = existing.into_iter().next() else {
        return Ok(false);
    };

    let display_name = update.display_name.unwrap_or(&existing.display_name);
    let coords = update.coords.unwrap_or(existing.coords);
    let location = update.location.unwrap_or(&existing.location);
    let provider = update.provider.unwrap_or(&existing.provider);
    let public_ip = update.public_ip.unwrap_or(existing.public_ip.as_deref());

    let result = sqlx::query(
        "UPDATE nodes SET display_name = ?, lat = ?, lon = ?, location = ?, provider = ?, public_ip = ? WHERE id = ?",
    )
    .bind(display_name)
    .bind(coords.lat)
    .bind(coords.lon)
    .bind(location)
    .bind(provider)
    .bind(public_ip)
    .bind(node_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn touch_heartbeat(db: &SqlitePool, node_id: &str, now_ts: i64) -> Result<bool, anyhow::Error> {
    let result = sqlx::query(
        "UPDATE nodes SET last_active_ts = ? WHERE id = ? AND last_active_ts < ?",
    )
    .bind(now_ts)
    .bind(node_id)
    .bind(now_ts)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_scavenger(db: &SqlitePool, node_id: &str, active: bool) -> Result<bool, anyhow::Error> {
    let result = sqlx::query("UPDATE nodes SET scavenger_active = ? WHERE id = ?")
        .bind(active as i64)
        .bind(node_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_scavenger(db: &SqlitePool, node_id: &str) -> Result<Option<bool>, anyhow::Error> {
    let row = sqlx::query("SELECT scavenger_active FROM nodes WHERE id = ? LIMIT 1")
        .bind(node_id)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|r| r.get::<i64, _>("scavenger_active") != 0))
}

pub async fn delete_node(db: &SqlitePool, node_id: &str) -> Result<bool, anyhow::Error> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM nodes WHERE id = ?")
        .bind(node_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(node_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leoscope_core::auth;
    use tempfile::TempDir;

    async fn setup() -> SqlitePool {
        let tmp = TempDir::new().unwrap();
        crate::db::init(tmp.path()).await.unwrap()
    }

    #[tokio::test]
    async fn register_creates_paired_user_and_node() {
        let pool = setup().await;
        let token = auth::generate_token_b64_urlsafe(32);
        let hash = auth::sha256_urlsafe_token(&token).unwrap();

        register_node(
            &pool,
            "n1",
            "ground-station-1",
            Coords { lat: 1.0, lon: 2.0 },
            "svalbard",
            "on-prem",
            &hash,
        )
        .await
        .unwrap();

        let user = crate::users_repo::get_user(&pool, "n1").await.unwrap().unwrap();
        assert_eq!(user.role, Role::Node);

        let nodes = get_nodes(
            &pool,
            NodesFilter {
                node_id: Some("n1"),
                location: None,
                active_since_ts: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].location, "svalbard");
    }

    #[tokio::test]
    async fn heartbeat_only_advances_forward() {
        let pool = setup().await;
        let hash = auth::sha256_urlsafe_token(&auth::generate_token_b64_urlsafe(32)).unwrap();
        register_node(&pool, "n1", "gs", Coords { lat: 0.0, lon: 0.0 }, "x", "y", &hash)
            .await
            .unwrap();

        assert!(touch_heartbeat(&pool, "n1", 1000).await.unwrap());
        assert!(!touch_heartbeat(&pool, "n1", 500).await.unwrap());
        let node = get_nodes(
            &pool,
            NodesFilter {
                node_id: Some("n1"),
                location: None,
                active_since_ts: None,
            },
        )
        .await
        .unwrap()
        .remove(0);
        assert_eq!(node.last_active_ts, 1000);
    }

    #[tokio::test]
    async fn scavenger_toggle_round_trips() {
        let pool = setup().await;
        let hash = auth::sha256_urlsafe_token(&auth::generate_token_b64_urlsafe(32)).unwrap();
        register_node(&pool, "n1", "gs", Coords { lat: 0.0, lon: 0.0 }, "x", "y", &hash)
            .await
            .unwrap();

        assert_eq!(get_scavenger(&pool, "n1").await.unwrap(), Some(false));
        assert!(set_scavenger(&pool, "n1", true).await.unwrap());
        assert_eq!(get_scavenger(&pool, "n1").await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn update_node_changes_only_given_fields() {
        let pool = setup().await;
        let hash = auth::sha256_urlsafe_token(&auth::generate_token_b64_urlsafe(32)).unwrap();
        register_node(&pool, "n1", "gs", Coords { lat: 0.0, lon: 0.0 }, "x", "y", &hash)
            .await
            .unwrap();

        assert!(
            update_node(
                &pool,
                "n1",
                NodeUpdate {
                    display_name: None,
                    coords: None,
                    location: Some("svalbard"),
                    provider: None,
                    public_ip: Some(Some("1.2.3.4")),
                },
            )
            .await
            .unwrap()
        );

        let node = get_nodes(
            &pool,
            NodesFilter {
                node_id: Some("n1"),
                location: None,
                active_since_ts: None,
            },
        )
        .await
        .unwrap()
        .remove(0);
        assert_eq!(node.display_name, "gs");
        assert_eq!(node.location, "svalbard");
        assert_eq!(node.public_ip.as_deref(), Some("1.2.3.4"));
    }
}
