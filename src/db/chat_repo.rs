use chrono::{DateTime, Duration, Utc};
use scylla::query::Query;
use scylla::statement::Consistency;
use scylla::{Session, SessionBuilder};

use crate::config::ScyllaConfig;
use crate::db::chat_schema;
use crate::error::{AppError, AppResult};
use crate::models::chat::partition_date;
use crate::models::{
    Chat, ChatMember, ChatMessage, ChatRole, ChatType, InviteLink, MessageType, Notification,
    PresenceState, UserStatus,
};

/// How many daily partitions a limit-underflowing history read will walk
/// back before giving up.
const HISTORY_SCAN_DAYS: i64 = 7;

/// Upper bound for date-range scans, which iterate days ascending.
const RANGE_SCAN_DAYS: i64 = 31;

fn store_err<E: std::fmt::Display>(e: E) -> AppError {
    AppError::ChatStore(e.to_string())
}

/// Every statement runs at quorum; a conversation's history is a contiguous
/// set of daily partitions ordered `(created_at DESC, message_id ASC)`.
pub struct ChatRepository {
    session: Session,
}

impl ChatRepository {
    pub async fn connect(cfg: &ScyllaConfig) -> AppResult<Self> {
        let session = SessionBuilder::new()
            .known_nodes(&cfg.hosts)
            .build()
            .await
            .map_err(|e| AppError::ChatStore(format!("session: {e}")))?;

        chat_schema::initialize(&session, &cfg.keyspace, cfg.replication_factor).await?;

        Ok(Self { session })
    }

    fn quorum(cql: &str) -> Query {
        let mut query = Query::new(cql);
        query.set_consistency(Consistency::Quorum);
        query
    }

    // --- conversations ---

    pub async fn create_chat(&self, chat: &Chat) -> AppResult<()> {
        self.session
            .query(
                Self::quorum(
                    "INSERT INTO chats (id, name, type, created_by, is_private, members, \
                     created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                ),
                (
                    &chat.id,
                    &chat.name,
                    chat.chat_type.as_str(),
                    &chat.created_by,
                    chat.is_private,
                    &chat.members,
                    chat.created_at,
                    chat.updated_at,
                ),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub async fn get_chat(&self, chat_id: &str) -> AppResult<Option<Chat>> {
        let row = self
            .session
            .query(
                Self::quorum(
                    "SELECT id, name, type, created_by, is_private, members, created_at, \
                     updated_at FROM chats WHERE id = ?",
                ),
                (chat_id,),
            )
            .await
            .map_err(store_err)?
            .maybe_first_row_typed::<(
                String,
                Option<String>,
                String,
                String,
                bool,
                Option<Vec<String>>,
                DateTime<Utc>,
                DateTime<Utc>,
            )>()
            .map_err(store_err)?;

        Ok(row.map(
            |(id, name, kind, created_by, is_private, members, created_at, updated_at)| Chat {
                id,
                name,
                chat_type: ChatType::parse(&kind).unwrap_or(ChatType::Direct),
                created_by,
                is_private,
                members: members.unwrap_or_default(),
                created_at,
                updated_at,
            },
        ))
    }

    /// Rewrite the denormalized member list on the chat row.
    pub async fn set_chat_members(&self, chat_id: &str, members: &[String]) -> AppResult<()> {
        self.session
            .query(
                Self::quorum("UPDATE chats SET members = ?, updated_at = ? WHERE id = ?"),
                (members, Utc::now(), chat_id),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    // --- membership ---

    pub async fn add_chat_member(&self, member: &ChatMember) -> AppResult<()> {
        self.session
            .query(
                Self::quorum(
                    "INSERT INTO chat_members (chat_id, user_id, role, joined_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?)",
                ),
                (
                    &member.chat_id,
                    &member.user_id,
                    member.role.as_str(),
                    member.joined_at,
                    member.updated_at,
                ),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub async fn remove_chat_member(&self, chat_id: &str, user_id: &str) -> AppResult<()> {
        self.session
            .query(
                Self::quorum("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?"),
                (chat_id, user_id),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub async fn update_member_role(
        &self,
        chat_id: &str,
        user_id: &str,
        role: ChatRole,
    ) -> AppResult<()> {
        self.session
            .query(
                Self::quorum(
                    "UPDATE chat_members SET role = ?, updated_at = ? \
                     WHERE chat_id = ? AND user_id = ?",
                ),
                (role.as_str(), Utc::now(), chat_id, user_id),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub async fn get_chat_members(&self, chat_id: &str) -> AppResult<Vec<ChatMember>> {
        let result = self
            .session
            .query(
                Self::quorum(
                    "SELECT chat_id, user_id, role, joined_at, updated_at \
                     FROM chat_members WHERE chat_id = ?",
                ),
                (chat_id,),
            )
            .await
            .map_err(store_err)?;

        let mut members = Vec::new();
        for row in result
            .rows_typed::<(String, String, String, DateTime<Utc>, DateTime<Utc>)>()
            .map_err(store_err)?
        {
            let (chat_id, user_id, role, joined_at, updated_at) = row.map_err(store_err)?;
            members.push(ChatMember {
                chat_id,
                user_id,
                role: ChatRole::parse(&role).unwrap_or(ChatRole::Member),
                joined_at,
                updated_at,
            });
        }
        Ok(members)
    }

    /// Memberships across all chats, served by the secondary index on
    /// `user_id`.
    pub async fn get_user_chats(&self, user_id: &str) -> AppResult<Vec<ChatMember>> {
        let result = self
            .session
            .query(
                Self::quorum(
                    "SELECT chat_id, user_id, role, joined_at, updated_at \
                     FROM chat_members WHERE user_id = ?",
                ),
                (user_id,),
            )
            .await
            .map_err(store_err)?;

        let mut members = Vec::new();
        for row in result
            .rows_typed::<(String, String, String, DateTime<Utc>, DateTime<Utc>)>()
            .map_err(store_err)?
        {
            let (chat_id, user_id, role, joined_at, updated_at) = row.map_err(store_err)?;
            members.push(ChatMember {
                chat_id,
                user_id,
                role: ChatRole::parse(&role).unwrap_or(ChatRole::Member),
                joined_at,
                updated_at,
            });
        }
        Ok(members)
    }

    // --- messages ---

    pub async fn save_message(&self, msg: &ChatMessage) -> AppResult<()> {
        self.session
            .query(
                Self::quorum(
                    "INSERT INTO chat_messages (conversation_id, partition_date, message_id, \
                     sender_id, content, type, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                ),
                (
                    &msg.conversation_id,
                    msg.partition_date(),
                    &msg.message_id,
                    &msg.sender_id,
                    &msg.content,
                    msg.message_type.as_str(),
                    msg.created_at,
                ),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn query_day(
        &self,
        conversation_id: &str,
        day: i32,
        before: DateTime<Utc>,
        limit: i32,
    ) -> AppResult<Vec<ChatMessage>> {
        let result = self
            .session
            .query(
                Self::quorum(
                    "SELECT conversation_id, message_id, sender_id, content, type, created_at \
                     FROM chat_messages \
                     WHERE conversation_id = ? AND partition_date = ? AND created_at < ? \
                     LIMIT ?",
                ),
                (conversation_id, day, before, limit),
            )
            .await
            .map_err(store_err)?;

        let mut messages = Vec::new();
        for row in result
            .rows_typed::<(String, String, String, String, String, DateTime<Utc>)>()
            .map_err(store_err)?
        {
            let (conversation_id, message_id, sender_id, content, kind, created_at) =
                row.map_err(store_err)?;
            messages.push(ChatMessage {
                message_id,
                conversation_id,
                sender_id,
                content,
                message_type: MessageType::parse(&kind).unwrap_or(MessageType::Text),
                created_at,
            });
        }
        Ok(messages)
    }

    /// Newest-first page of history. Starts in the partition holding
    /// `before` and rolls back one day at a time while the page is short;
    /// concatenation preserves the global `(created_at DESC, message_id ASC)`
    /// order because later days sort strictly after earlier ones.
    pub async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        before: DateTime<Utc>,
    ) -> AppResult<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(limit);
        let mut cursor = before;

        for _ in 0..HISTORY_SCAN_DAYS {
            let remaining = limit - messages.len();
            let day = partition_date(cursor);
            let page = self
                .query_day(conversation_id, day, before, remaining as i32)
                .await?;
            messages.extend(page);

            if messages.len() >= limit {
                break;
            }
            cursor -= Duration::days(1);
        }

        messages.truncate(limit);
        Ok(messages)
    }

    /// Oldest-first read of a bounded date range, iterating daily partitions
    /// ascending.
    pub async fn get_messages_in_range(
        &self,
        conversation_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<ChatMessage>> {
        let mut messages = Vec::new();
        let mut date = from.date_naive();
        let last = to.date_naive();

        for _ in 0..RANGE_SCAN_DAYS {
            if date > last {
                break;
            }
            let day: i32 = date
                .format("%Y%m%d")
                .to_string()
                .parse()
                .unwrap_or(0);
            let result = self
                .session
                .query(
                    Self::quorum(
                        "SELECT conversation_id, message_id, sender_id, content, type, \
                         created_at FROM chat_messages \
                         WHERE conversation_id = ? AND partition_date = ? \
                         AND created_at >= ? AND created_at <= ?",
                    ),
                    (conversation_id, day, from, to),
                )
                .await
                .map_err(store_err)?;

            let mut day_rows = Vec::new();
            for row in result
                .rows_typed::<(String, String, String, String, String, DateTime<Utc>)>()
                .map_err(store_err)?
            {
                let (conversation_id, message_id, sender_id, content, kind, created_at) =
                    row.map_err(store_err)?;
                day_rows.push(ChatMessage {
                    message_id,
                    conversation_id,
                    sender_id,
                    content,
                    message_type: MessageType::parse(&kind).unwrap_or(MessageType::Text),
                    created_at,
                });
            }
            // Partition order is newest-first; flip for the ascending read.
            day_rows.reverse();
            messages.extend(day_rows);

            let Some(next) = date.succ_opt() else {
                break;
            };
            date = next;
        }

        Ok(messages)
    }

    // --- user status ---

    pub async fn update_user_status(&self, status: &UserStatus) -> AppResult<()> {
        self.session
            .query(
                Self::quorum(
                    "INSERT INTO user_status (user_id, status, last_seen, updated_at) \
                     VALUES (?, ?, ?, ?)",
                ),
                (
                    &status.user_id,
                    status.status.as_str(),
                    status.last_seen,
                    status.updated_at,
                ),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub async fn get_user_status(&self, user_id: &str) -> AppResult<Option<UserStatus>> {
        let row = self
            .session
            .query(
                Self::quorum(
                    "SELECT user_id, status, last_seen, updated_at FROM user_status \
                     WHERE user_id = ?",
                ),
                (user_id,),
            )
            .await
            .map_err(store_err)?
            .maybe_first_row_typed::<(String, String, DateTime<Utc>, DateTime<Utc>)>()
            .map_err(store_err)?;

        Ok(row.map(|(user_id, status, last_seen, updated_at)| UserStatus {
            user_id,
            status: match status.as_str() {
                "online" => PresenceState::Online,
                "away" => PresenceState::Away,
                _ => PresenceState::Offline,
            },
            last_seen,
            updated_at,
        }))
    }

    // --- notifications ---

    pub async fn save_notification(&self, notification: &Notification) -> AppResult<()> {
        self.session
            .query(
                Self::quorum(
                    "INSERT INTO notifications (user_id, id, type, content, read, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                ),
                (
                    &notification.user_id,
                    &notification.id,
                    &notification.kind,
                    &notification.content,
                    notification.read,
                    notification.created_at,
                ),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub async fn get_user_notifications(
        &self,
        user_id: &str,
        limit: i32,
    ) -> AppResult<Vec<Notification>> {
        let result = self
            .session
            .query(
                Self::quorum(
                    "SELECT user_id, id, type, content, read, created_at FROM notifications \
                     WHERE user_id = ? LIMIT ?",
                ),
                (user_id, limit),
            )
            .await
            .map_err(store_err)?;

        let mut notifications = Vec::new();
        for row in result
            .rows_typed::<(String, String, String, String, bool, DateTime<Utc>)>()
            .map_err(store_err)?
        {
            let (user_id, id, kind, content, read, created_at) = row.map_err(store_err)?;
            notifications.push(Notification {
                id,
                user_id,
                kind,
                content,
                read,
                created_at,
            });
        }
        Ok(notifications)
    }

    /// The clustering key is `(created_at, id)`, so the row is located among
    /// recent notifications first and then updated under its full key.
    pub async fn mark_notification_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> AppResult<()> {
        let recent = self.get_user_notifications(user_id, 100).await?;
        let Some(target) = recent.iter().find(|n| n.id == notification_id) else {
            return Err(AppError::NotFound);
        };

        self.session
            .query(
                Self::quorum(
                    "UPDATE notifications SET read = true \
                     WHERE user_id = ? AND created_at = ? AND id = ?",
                ),
                (user_id, target.created_at, notification_id),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    // --- invite links ---

    pub async fn create_invite_link(&self, link: &InviteLink) -> AppResult<()> {
        self.session
            .query(
                Self::quorum(
                    "INSERT INTO chat_invite_links (chat_id, code, created_by, created_at, \
                     expires_at, max_uses, uses) VALUES (?, ?, ?, ?, ?, ?, ?)",
                ),
                (
                    &link.chat_id,
                    &link.code,
                    &link.created_by,
                    link.created_at,
                    link.expires_at,
                    link.max_uses,
                    link.uses,
                ),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub async fn get_invite_by_code(&self, code: &str) -> AppResult<Option<InviteLink>> {
        let row = self
            .session
            .query(
                Self::quorum(
                    "SELECT chat_id, code, created_by, created_at, expires_at, max_uses, uses \
                     FROM chat_invite_links WHERE code = ?",
                ),
                (code,),
            )
            .await
            .map_err(store_err)?
            .maybe_first_row_typed::<(
                String,
                String,
                String,
                DateTime<Utc>,
                DateTime<Utc>,
                i32,
                i32,
            )>()
            .map_err(store_err)?;

        Ok(row.map(
            |(chat_id, code, created_by, created_at, expires_at, max_uses, uses)| InviteLink {
                chat_id,
                code,
                created_by,
                created_at,
                expires_at,
                max_uses,
                uses,
            },
        ))
    }

    pub async fn get_chat_invite_links(&self, chat_id: &str) -> AppResult<Vec<InviteLink>> {
        let result = self
            .session
            .query(
                Self::quorum(
                    "SELECT chat_id, code, created_by, created_at, expires_at, max_uses, uses \
                     FROM chat_invite_links WHERE chat_id = ?",
                ),
                (chat_id,),
            )
            .await
            .map_err(store_err)?;

        let mut links = Vec::new();
        for row in result
            .rows_typed::<(String, String, String, DateTime<Utc>, DateTime<Utc>, i32, i32)>()
            .map_err(store_err)?
        {
            let (chat_id, code, created_by, created_at, expires_at, max_uses, uses) =
                row.map_err(store_err)?;
            links.push(InviteLink {
                chat_id,
                code,
                created_by,
                created_at,
                expires_at,
                max_uses,
                uses,
            });
        }
        Ok(links)
    }

    /// Read-modify-write on the use counter. Two joins racing at the
    /// capacity boundary may both land; the contract accepts that.
    pub async fn increment_invite_uses(&self, chat_id: &str, code: &str) -> AppResult<()> {
        let link = self
            .get_invite_by_code(code)
            .await?
            .ok_or(AppError::NotFound)?;

        self.session
            .query(
                Self::quorum(
                    "UPDATE chat_invite_links SET uses = ? WHERE chat_id = ? AND code = ?",
                ),
                (link.uses + 1, chat_id, code),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub async fn delete_invite_link(&self, chat_id: &str, code: &str) -> AppResult<()> {
        self.session
            .query(
                Self::quorum("DELETE FROM chat_invite_links WHERE chat_id = ? AND code = ?"),
                (chat_id, code),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
