use scylla::Session;

use crate::error::{AppError, AppResult};

/// `chat_messages` carries a composite partition key of conversation id and
/// day (YYYYMMDD). A single very active conversation would outgrow one
/// partition; the day component bounds partition size, and readers roll over
/// to the previous day when a page comes up short.
const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS chats (
        id text PRIMARY KEY,
        name text,
        type text,
        created_by text,
        is_private boolean,
        members list<text>,
        created_at timestamp,
        updated_at timestamp
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_members (
        chat_id text,
        user_id text,
        role text,
        joined_at timestamp,
        updated_at timestamp,
        PRIMARY KEY ((chat_id), user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS chat_members_user_id_idx ON chat_members (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        conversation_id text,
        partition_date int,
        message_id text,
        sender_id text,
        content text,
        type text,
        created_at timestamp,
        PRIMARY KEY ((conversation_id, partition_date), created_at, message_id)
    ) WITH CLUSTERING ORDER BY (created_at DESC, message_id ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_status (
        user_id text PRIMARY KEY,
        status text,
        last_seen timestamp,
        updated_at timestamp
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        user_id text,
        id text,
        type text,
        content text,
        read boolean,
        created_at timestamp,
        PRIMARY KEY ((user_id), created_at, id)
    ) WITH CLUSTERING ORDER BY (created_at DESC, id ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_invite_links (
        chat_id text,
        code text,
        created_by text,
        created_at timestamp,
        expires_at timestamp,
        max_uses int,
        uses int,
        PRIMARY KEY ((chat_id), code)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS chat_invite_links_code_idx ON chat_invite_links (code)",
];

/// Create the keyspace and every table, then switch the session onto the
/// keyspace. Idempotent; safe to run on every boot.
pub async fn initialize(session: &Session, keyspace: &str, replication_factor: u32) -> AppResult<()> {
    let create_keyspace = format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}"
    );
    session
        .query(create_keyspace, ())
        .await
        .map_err(|e| AppError::ChatStore(format!("create keyspace: {e}")))?;

    session
        .use_keyspace(keyspace, false)
        .await
        .map_err(|e| AppError::ChatStore(format!("use keyspace: {e}")))?;

    for ddl in TABLES {
        session
            .query(*ddl, ())
            .await
            .map_err(|e| AppError::ChatStore(format!("schema statement failed: {e}")))?;
    }

    Ok(())
}
