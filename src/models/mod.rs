pub mod chat;
pub mod user;

pub use chat::{
    Chat, ChatMember, ChatMessage, ChatRole, ChatType, InviteLink, MessageType, Notification,
    PresenceState, UserStatus,
};
pub use user::{AccountRecovery, AuthCode, DeviceSession, LoginHistory, User};
