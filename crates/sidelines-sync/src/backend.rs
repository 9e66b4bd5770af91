use async_trait::async_trait;
use uuid::Uuid;

use sidelines_types::events::{ChangeEvent, ChangeFilter};
use sidelines_types::models::{AuthorProfile, ChannelDetail, ChatMessage, HighlightEntry, TeamBadge};

use crate::error::SyncResult;
use crate::stream::RowStream;

/// Everything a channel page needs from the hosted store. Pages receive it
/// as an `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Channel with joined teams and league; `None` when the slug is unknown.
    async fn channel_by_slug(&self, slug: &str) -> SyncResult<Option<ChannelDetail>>;

    /// History in ascending insertion order.
    async fn messages_for_channel(&self, channel_id: i64) -> SyncResult<Vec<ChatMessage>>;

    /// Play-by-play in descending insertion order.
    async fn highlights_for_channel(&self, channel_id: i64) -> SyncResult<Vec<HighlightEntry>>;

    async fn lookup_author(&self, user_id: Uuid) -> SyncResult<Option<AuthorProfile>>;

    async fn lookup_team(&self, team_id: i64) -> SyncResult<Option<TeamBadge>>;

    /// Signed-in user, if any.
    async fn current_user(&self) -> SyncResult<Option<Uuid>>;

    async fn insert_message(&self, channel_id: i64, text: &str) -> SyncResult<()>;

    /// Open a server-filtered change subscription.
    async fn subscribe(&self, filter: ChangeFilter) -> SyncResult<RowStream<ChangeEvent>>;
}
