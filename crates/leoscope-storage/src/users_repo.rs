use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;

use leoscope_core::model::{Role, User};

fn row_to_user(row: sqlx::sqlite::SqliteRow) -> Result<User, anyhow::Error> {
    let role: Role = row.get::<String, _>("role").parse()?;
    Ok(User {
        id: row.get::<String, _>("id"),
        name: row.get::<String, _>("name"),
        role,
        team: row.get::<Option<String>, _>("team"),
        static_token_hash: row.get::<Vec<u8>, _>("static_token_hash"),
        signed_token: None,
    })
}

pub async fn create_user(
    db: &SqlitePool,
    id: &str,
    name: &str,
    role: Role,
    team: Option<&str>,
    static_token_hash: &[u8],
) -> Result<(), anyhow::Error> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    sqlx::query(
        r#"
        INSERT INTO users (id, name, role, team, static_token_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(role.to_string())
    .bind(team)
    .bind(static_token_hash)
    .bind(now)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn get_user(db: &SqlitePool, user_id: &str) -> Result<Option<User>, anyhow::Error> {
    let row = sqlx::query(
        "SELECT id, name, role, team, static_token_hash FROM users WHERE id = ? LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;

    row.map(row_to_user).transpose()
}

pub async fn modify_user(
    db: &SqlitePool,
    user_id: &str,
    name: Option<&str>,
    role: Option<Role>,
    team: Option<Option<&str>>,
) -> Result<bool, anyhow::Error> {
    let Some(existing) = get_user(db, user_id).await? else {
        return Ok(false);
    };

    let name = name.unwrap_or(&existing.name);
    let role = role.unwrap_or(existing.role);
    let team = team.unwrap_or(existing.team.as_deref());

    let result = sqlx::query("UPDATE users SET name = ?, role = ?, team = ? WHERE id = ?")
        .bind(name)
        .bind(role.to_string())
        .bind(team)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_user(db: &SqlitePool, user_id: &str) -> Result<bool, anyhow::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leoscope_core::auth;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_get_modify_delete_round_trip() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let token = auth::generate_token_b64_urlsafe(32);
        let hash = auth::sha256_urlsafe_token(&token).unwrap();
        create_user(&pool, "u1", "alice", Role::UserPriv, Some("ops"), &hash)
            .await
            .unwrap();

        let user = get_user(&pool, "u1").await.unwrap().expect("user exists");
        assert_eq!(user.name, "alice");
        assert_eq!(user.role, Role::UserPriv);
        assert_eq!(user.team.as_deref(), Some("ops"));
        assert_eq!(user.static_token_hash, hash);

        assert!(
            modify_user(&pool, "u1", Some("alice2"), None, None)
                .await
                .unwrap()
        );
        let user = get_user(&pool, "u1").await.unwrap().unwrap();
        assert_eq!(user.name, "alice2");
        assert_eq!(user.role, Role::UserPriv);

        assert!(delete_user(&pool, "u1").await.unwrap());
        assert!(get_user(&pool, "u1").await.unwrap().is_none());
    }
}
