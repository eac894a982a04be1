use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{self, CacheRepository};
use crate::db::chat_repo::ChatRepository;
use crate::error::{AppError, AppResult};
use crate::kafka::MessageProducer;
use crate::models::{
    Chat, ChatMember, ChatMessage, ChatRole, ChatType, InviteLink, Notification, PresenceState,
    UserStatus,
};
use crate::security::random;
use crate::services::{Deliver, Ingest};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

const GROUP_MIN_MEMBERS: usize = 2;
const GROUP_MAX_MEMBERS: usize = 200;
const GROUP_NAME_MAX_CHARS: usize = 255;
const INVITE_CODE_LENGTH: usize = 10;
const MIN_INVITE_TTL_MINUTES: i64 = 5;

pub struct ChatService {
    repo: Arc<ChatRepository>,
    cache: Arc<CacheRepository>,
    producer: MessageProducer,
    delivery: Arc<dyn Deliver>,
}

impl ChatService {
    pub fn new(
        repo: Arc<ChatRepository>,
        cache: Arc<CacheRepository>,
        producer: MessageProducer,
        delivery: Arc<dyn Deliver>,
    ) -> Self {
        Self {
            repo,
            cache,
            producer,
            delivery,
        }
    }

    // --- conversation lifecycle ---

    /// Create a conversation of any type. Direct chats deduplicate against
    /// the creator's existing pair; broadcast names are unique per creator.
    pub async fn create_chat(
        &self,
        creator: &str,
        chat_type: ChatType,
        name: Option<String>,
        mut participants: Vec<String>,
        is_private: bool,
    ) -> AppResult<Chat> {
        if !participants.iter().any(|p| p == creator) {
            participants.push(creator.to_string());
        }

        match chat_type {
            ChatType::Direct => {
                if participants.len() != 2 {
                    return Err(AppError::BadRequest(
                        "direct chats have exactly two members".into(),
                    ));
                }
                if let Some(existing) = self.find_direct_chat(creator, &participants).await? {
                    return Ok(existing);
                }
            }
            ChatType::Group => {
                let group_name = name.as_deref().unwrap_or("").trim();
                if group_name.is_empty() || group_name.chars().count() > GROUP_NAME_MAX_CHARS {
                    return Err(AppError::BadRequest(
                        "group chats need a name of at most 255 characters".into(),
                    ));
                }
                if participants.len() < GROUP_MIN_MEMBERS
                    || participants.len() > GROUP_MAX_MEMBERS
                {
                    return Err(AppError::BadRequest(
                        "group chats hold between 2 and 200 members".into(),
                    ));
                }
            }
            ChatType::Broadcast => {
                let Some(broadcast_name) = name.as_deref().filter(|n| !n.trim().is_empty())
                else {
                    return Err(AppError::BadRequest("broadcast channels need a name".into()));
                };
                if self
                    .creator_has_broadcast(creator, broadcast_name)
                    .await?
                {
                    return Err(AppError::Conflict(
                        "a broadcast with this name already exists".into(),
                    ));
                }
            }
        }

        let now = Utc::now();
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            name,
            chat_type,
            created_by: creator.to_string(),
            is_private,
            members: participants.clone(),
            created_at: now,
            updated_at: now,
        };

        self.repo.create_chat(&chat).await?;
        for member in &participants {
            let role = if member == creator {
                ChatRole::Owner
            } else {
                ChatRole::Member
            };
            self.repo
                .add_chat_member(&ChatMember {
                    chat_id: chat.id.clone(),
                    user_id: member.clone(),
                    role,
                    joined_at: now,
                    updated_at: now,
                })
                .await?;
        }

        self.cache
            .set(&cache::keys::chat(&chat.id), &chat, cache::CHAT_TTL_SECS)
            .await;

        info!(chat_id = %chat.id, kind = chat.chat_type.as_str(), "conversation created");
        Ok(chat)
    }

    async fn find_direct_chat(
        &self,
        creator: &str,
        participants: &[String],
    ) -> AppResult<Option<Chat>> {
        for membership in self.repo.get_user_chats(creator).await? {
            if let Some(chat) = self.repo.get_chat(&membership.chat_id).await? {
                if chat.chat_type == ChatType::Direct && chat.has_same_members(participants) {
                    return Ok(Some(chat));
                }
            }
        }
        Ok(None)
    }

    async fn creator_has_broadcast(&self, creator: &str, name: &str) -> AppResult<bool> {
        for membership in self.repo.get_user_chats(creator).await? {
            if let Some(chat) = self.repo.get_chat(&membership.chat_id).await? {
                if chat.chat_type == ChatType::Broadcast
                    && chat.created_by == creator
                    && chat.name.as_deref() == Some(name)
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub async fn get_chat(&self, chat_id: &str) -> AppResult<Chat> {
        if let Some(chat) = self.cache.get::<Chat>(&cache::keys::chat(chat_id)).await {
            return Ok(chat);
        }
        let chat = self
            .repo
            .get_chat(chat_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.cache
            .set(&cache::keys::chat(chat_id), &chat, cache::CHAT_TTL_SECS)
            .await;
        Ok(chat)
    }

    pub async fn get_user_chats(&self, user_id: &str) -> AppResult<Vec<Chat>> {
        let mut chats = Vec::new();
        for membership in self.repo.get_user_chats(user_id).await? {
            if let Some(chat) = self.repo.get_chat(&membership.chat_id).await? {
                chats.push(chat);
            }
        }
        Ok(chats)
    }

    // --- membership ---

    pub async fn member_role(&self, chat_id: &str, user_id: &str) -> AppResult<Option<ChatRole>> {
        let members = self.repo.get_chat_members(chat_id).await?;
        Ok(members
            .into_iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.role))
    }

    pub async fn add_member(&self, chat_id: &str, user_id: &str) -> AppResult<Chat> {
        let mut chat = self.get_chat(chat_id).await?;
        if chat.members.iter().any(|m| m == user_id) {
            return Ok(chat);
        }
        if chat.chat_type == ChatType::Group && chat.members.len() >= GROUP_MAX_MEMBERS {
            return Err(AppError::BadRequest("group is at capacity".into()));
        }

        let now = Utc::now();
        self.repo
            .add_chat_member(&ChatMember {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
                role: ChatRole::Member,
                joined_at: now,
                updated_at: now,
            })
            .await?;

        chat.members.push(user_id.to_string());
        chat.updated_at = now;
        self.repo.set_chat_members(chat_id, &chat.members).await?;
        self.cache
            .set(&cache::keys::chat(chat_id), &chat, cache::CHAT_TTL_SECS)
            .await;
        Ok(chat)
    }

    pub async fn remove_member(&self, chat_id: &str, user_id: &str) -> AppResult<()> {
        let mut chat = self.get_chat(chat_id).await?;
        self.repo.remove_chat_member(chat_id, user_id).await?;

        chat.members.retain(|m| m != user_id);
        chat.updated_at = Utc::now();
        self.repo.set_chat_members(chat_id, &chat.members).await?;
        self.cache
            .set(&cache::keys::chat(chat_id), &chat, cache::CHAT_TTL_SECS)
            .await;
        Ok(())
    }

    pub async fn update_member_role(
        &self,
        chat_id: &str,
        user_id: &str,
        role: ChatRole,
    ) -> AppResult<()> {
        self.repo.update_member_role(chat_id, user_id, role).await
    }

    // --- history ---

    pub async fn get_messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<ChatMessage>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 1000);
        let before = before.unwrap_or_else(Utc::now);
        self.repo.get_messages(conversation_id, limit, before).await
    }

    /// Oldest-first slice between two instants, walking daily partitions
    /// ascending.
    pub async fn get_messages_between(
        &self,
        conversation_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<ChatMessage>> {
        if from > to {
            return Err(AppError::BadRequest("from must not be after to".into()));
        }
        self.repo
            .get_messages_in_range(conversation_id, from, to)
            .await
    }

    // --- invite links ---

    pub async fn create_invite(
        &self,
        chat_id: &str,
        creator: &str,
        max_uses: i32,
        expires_in: Duration,
    ) -> AppResult<InviteLink> {
        if expires_in < Duration::minutes(MIN_INVITE_TTL_MINUTES) {
            return Err(AppError::BadRequest(
                "invite links must live at least five minutes".into(),
            ));
        }
        // Confirm the chat exists before minting a code against it.
        self.get_chat(chat_id).await?;

        let now = Utc::now();
        let link = InviteLink {
            chat_id: chat_id.to_string(),
            code: random::generate_invite_code(INVITE_CODE_LENGTH),
            created_by: creator.to_string(),
            created_at: now,
            expires_at: now + expires_in,
            max_uses,
            uses: 0,
        };
        self.repo.create_invite_link(&link).await?;
        Ok(link)
    }

    /// Redeem an invite. Re-joining is a no-op returning the chat unchanged;
    /// the use counter is a read-modify-write and may over-admit by one at
    /// the capacity boundary.
    pub async fn join_via_invite(&self, code: &str, user_id: &str) -> AppResult<Chat> {
        let link = self
            .repo
            .get_invite_by_code(code)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = Utc::now();
        if link.is_expired(now) {
            return Err(AppError::BadRequest("invite link has expired".into()));
        }
        if link.is_exhausted() {
            return Err(AppError::BadRequest("invite link has no uses left".into()));
        }

        let chat = self.get_chat(&link.chat_id).await?;
        if chat.members.iter().any(|m| m == user_id) {
            return Ok(chat);
        }

        let chat = self.add_member(&link.chat_id, user_id).await?;
        self.repo
            .increment_invite_uses(&link.chat_id, code)
            .await?;
        Ok(chat)
    }

    pub async fn list_invites(&self, chat_id: &str) -> AppResult<Vec<InviteLink>> {
        self.repo.get_chat_invite_links(chat_id).await
    }

    pub async fn delete_invite(&self, chat_id: &str, code: &str) -> AppResult<()> {
        self.repo.delete_invite_link(chat_id, code).await
    }

    // --- presence & notifications ---

    pub async fn set_user_status(&self, user_id: &str, status: PresenceState) -> AppResult<()> {
        let now = Utc::now();
        self.repo
            .update_user_status(&UserStatus {
                user_id: user_id.to_string(),
                status,
                last_seen: now,
                updated_at: now,
            })
            .await
    }

    pub async fn list_notifications(
        &self,
        user_id: &str,
        limit: i32,
    ) -> AppResult<Vec<Notification>> {
        self.repo.get_user_notifications(user_id, limit).await
    }

    pub async fn mark_notification_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> AppResult<()> {
        self.repo
            .mark_notification_read(user_id, notification_id)
            .await
    }

    // --- broadcast pipeline (consumer side) ---

    /// Runs on every instance for every record the bus hands this process.
    /// Local members get the message through the delivery contract; users
    /// whose sockets live elsewhere are served by that instance's consumer.
    /// The sender's own copy also arrives here, once, as the echo.
    pub async fn broadcast(&self, message: &ChatMessage) -> AppResult<()> {
        let chat = self.get_chat(&message.conversation_id).await?;
        self.delivery
            .broadcast_to_chat(&chat.members, message)
            .await;
        Ok(())
    }
}

#[async_trait]
impl Ingest for ChatService {
    /// Ingress pipeline: persist, then publish. Either failure is terminal
    /// and the message is not considered sent. Fan-out happens only on the
    /// consumer side so a single ordering authority exists.
    async fn ingest(&self, mut message: ChatMessage) -> AppResult<ChatMessage> {
        if message.conversation_id.is_empty() || message.sender_id.is_empty() {
            return Err(AppError::BadRequest(
                "message needs a conversation and a sender".into(),
            ));
        }
        if message.message_id.is_empty() {
            message.message_id = Uuid::new_v4().to_string();
        }
        message.created_at = Utc::now();

        self.repo.save_message(&message).await?;

        if let Err(e) = self.producer.publish(&message).await {
            warn!(
                conversation_id = %message.conversation_id,
                message_id = %message.message_id,
                error = %e,
                "publish failed after persist; message not sent"
            );
            return Err(e);
        }

        Ok(message)
    }
}
