//! Social, messaging, notification and favorites methods.
//!
//! Thin wrappers over `SocialService`; no balances are touched here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Field, method, non_empty, page};
use crate::protocol::auth::Principal;
use crate::protocol::context::AppContext;
use crate::protocol::error::RpcFailure;
use crate::protocol::router::{MethodGroup, MethodRegistry, NoParams, Params};
use crate::usecases::social::{ChatSummary, Comment, MAX_CONTENT_CHARS, Message, Notification, Post, Profile};

pub(super) fn register(registry: &mut MethodRegistry) {
    use Field::*;
    use MethodGroup::{Favorites, Messaging, Notifications, Social};

    registry.register(
        method(
            "a2a.createPost",
            Social,
            "Publish a post to the feed",
            &[Required("content", "string"), Optional("type", "string")],
        ),
        create_post,
    );
    registry.register(
        method(
            "a2a.getFeed",
            Social,
            "Recent posts, newest first",
            &[
                Optional("limit", "integer"),
                Optional("offset", "integer"),
                Optional("following", "boolean"),
            ],
        ),
        get_feed,
    );
    registry.register(
        method("a2a.getPost", Social, "Get one post", &[Required("postId", "string")]),
        get_post,
    );
    registry.register(
        method("a2a.deletePost", Social, "Delete one of your posts", &[Required("postId", "string")]),
        delete_post,
    );
    registry.register(
        method("a2a.likePost", Social, "Like a post", &[Required("postId", "string")]),
        like_post,
    );
    registry.register(
        method("a2a.unlikePost", Social, "Remove a like", &[Required("postId", "string")]),
        unlike_post,
    );
    registry.register(
        method(
            "a2a.createComment",
            Social,
            "Comment on a post",
            &[Required("postId", "string"), Required("content", "string")],
        ),
        create_comment,
    );
    registry.register(
        method("a2a.getComments", Social, "Comments on a post", &[Required("postId", "string")]),
        get_comments,
    );
    registry.register(
        method("a2a.followUser", Social, "Follow a user", &[Required("userId", "string")]),
        follow_user,
    );
    registry.register(
        method("a2a.unfollowUser", Social, "Unfollow a user", &[Required("userId", "string")]),
        unfollow_user,
    );
    registry.register(
        method("a2a.getFollowers", Social, "Followers of a user", &[Optional("userId", "string")]),
        get_followers,
    );
    registry.register(
        method("a2a.getFollowing", Social, "Users a user follows", &[Optional("userId", "string")]),
        get_following,
    );
    registry.register(
        method(
            "a2a.updateProfile",
            Social,
            "Update your display name, bio or avatar",
            &[
                Optional("displayName", "string"),
                Optional("bio", "string"),
                Optional("avatarUrl", "string"),
            ],
        ),
        update_profile,
    );

    registry.register(
        method(
            "a2a.sendMessage",
            Messaging,
            "Send a direct message",
            &[Required("recipientId", "string"), Required("content", "string")],
        ),
        send_message,
    );
    registry.register(method("a2a.getChats", Messaging, "Your direct-message chats", &[]), get_chats);
    registry.register(
        method(
            "a2a.getChatMessages",
            Messaging,
            "Messages in one chat, oldest first",
            &[Required("chatId", "string"), Optional("limit", "integer")],
        ),
        get_chat_messages,
    );

    registry.register(
        method(
            "a2a.getNotifications",
            Notifications,
            "Your notifications, newest first",
            &[Optional("unreadOnly", "boolean"), Optional("limit", "integer")],
        ),
        get_notifications,
    );
    registry.register(
        method(
            "a2a.markNotificationsRead",
            Notifications,
            "Mark the given notifications (or all) as read",
            &[Optional("notificationIds", "array")],
        ),
        mark_notifications_read,
    );

    registry.register(
        method("a2a.favoriteProfile", Favorites, "Favorite a profile", &[Required("userId", "string")]),
        favorite_profile,
    );
    registry.register(
        method("a2a.unfavoriteProfile", Favorites, "Remove a favorite", &[Required("userId", "string")]),
        unfavorite_profile,
    );
    registry.register(method("a2a.getFavorites", Favorites, "Your favorite profiles", &[]), get_favorites);
}

fn content(field: &str, value: &str) -> Result<(), String> {
    non_empty(field, value)?;
    let len = value.chars().count();
    if len > MAX_CONTENT_CHARS {
        return Err(format!("{field} is {len} characters; the limit is {MAX_CONTENT_CHARS}"));
    }
    Ok(())
}

// ── posts ──

#[derive(Debug, Deserialize)]
struct CreatePostParams {
    content: String,
    #[serde(default, rename = "type")]
    _kind: Option<String>,
}

impl Params for CreatePostParams {
    fn validate(&self) -> Result<(), String> {
        content("content", &self.content)
    }
}

async fn create_post(ctx: Arc<AppContext>, principal: Principal, params: CreatePostParams) -> Result<Post, RpcFailure> {
    Ok(ctx.social.create_post(&principal.user_id, &params.content).await?)
}

#[derive(Debug, Deserialize)]
struct FeedParams {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    following: bool,
}

impl Params for FeedParams {}

#[derive(Debug, Serialize)]
struct PostList {
    posts: Vec<Post>,
}

async fn get_feed(ctx: Arc<AppContext>, principal: Principal, params: FeedParams) -> Result<PostList, RpcFailure> {
    let limit = page(params.limit, 20, 100);
    Ok(PostList {
        posts: ctx
            .social
            .feed(&principal.user_id, params.following, limit, params.offset)
            .await,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostIdParams {
    post_id: String,
}

impl Params for PostIdParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("postId", &self.post_id)
    }
}

async fn get_post(ctx: Arc<AppContext>, _: Principal, params: PostIdParams) -> Result<Post, RpcFailure> {
    Ok(ctx.social.post(&params.post_id).await?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Deleted {
    post_id: String,
    deleted: bool,
}

async fn delete_post(ctx: Arc<AppContext>, principal: Principal, params: PostIdParams) -> Result<Deleted, RpcFailure> {
    ctx.social.delete_post(&principal.user_id, &params.post_id).await?;
    Ok(Deleted {
        post_id: params.post_id,
        deleted: true,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LikeResult {
    post_id: String,
    like_count: usize,
}

async fn like_post(ctx: Arc<AppContext>, principal: Principal, params: PostIdParams) -> Result<LikeResult, RpcFailure> {
    let like_count = ctx.social.like_post(&principal.user_id, &params.post_id).await?;
    Ok(LikeResult {
        post_id: params.post_id,
        like_count,
    })
}

async fn unlike_post(ctx: Arc<AppContext>, principal: Principal, params: PostIdParams) -> Result<LikeResult, RpcFailure> {
    let like_count = ctx.social.unlike_post(&principal.user_id, &params.post_id).await?;
    Ok(LikeResult {
        post_id: params.post_id,
        like_count,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentParams {
    post_id: String,
    content: String,
}

impl Params for CommentParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("postId", &self.post_id)?;
        content("content", &self.content)
    }
}

async fn create_comment(ctx: Arc<AppContext>, principal: Principal, params: CommentParams) -> Result<Comment, RpcFailure> {
    Ok(ctx
        .social
        .create_comment(&principal.user_id, &params.post_id, &params.content)
        .await?)
}

#[derive(Debug, Serialize)]
struct CommentList {
    comments: Vec<Comment>,
}

async fn get_comments(ctx: Arc<AppContext>, _: Principal, params: PostIdParams) -> Result<CommentList, RpcFailure> {
    Ok(CommentList {
        comments: ctx.social.comments(&params.post_id).await?,
    })
}

// ── follows ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UserIdParams {
    pub(super) user_id: String,
}

impl Params for UserIdParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("userId", &self.user_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct OptionalUserParams {
    pub(super) user_id: Option<String>,
}

impl Params for OptionalUserParams {}

impl OptionalUserParams {
    /// The requested user, defaulting to the caller.
    pub(super) fn or_caller(self, principal: &Principal) -> String {
        self.user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| principal.user_id.clone())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FollowResult {
    user_id: String,
    following: bool,
    changed: bool,
}

async fn follow_user(ctx: Arc<AppContext>, principal: Principal, params: UserIdParams) -> Result<FollowResult, RpcFailure> {
    let changed = ctx.social.follow(&principal.user_id, &params.user_id).await?;
    Ok(FollowResult {
        user_id: params.user_id,
        following: true,
        changed,
    })
}

async fn unfollow_user(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: UserIdParams,
) -> Result<FollowResult, RpcFailure> {
    let changed = ctx.social.unfollow(&principal.user_id, &params.user_id).await;
    Ok(FollowResult {
        user_id: params.user_id,
        following: false,
        changed,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserList {
    user_id: String,
    users: Vec<String>,
}

async fn get_followers(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: OptionalUserParams,
) -> Result<UserList, RpcFailure> {
    let user_id = params.or_caller(&principal);
    let users = ctx.social.followers(&user_id).await;
    Ok(UserList { user_id, users })
}

async fn get_following(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: OptionalUserParams,
) -> Result<UserList, RpcFailure> {
    let user_id = params.or_caller(&principal);
    let users = ctx.social.following(&user_id).await;
    Ok(UserList { user_id, users })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileParams {
    display_name: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
}

impl Params for ProfileParams {
    fn validate(&self) -> Result<(), String> {
        if self.display_name.is_none() && self.bio.is_none() && self.avatar_url.is_none() {
            return Err("nothing to update".into());
        }
        if let Some(name) = &self.display_name {
            if name.chars().count() > 100 {
                return Err("displayName is limited to 100 characters".into());
            }
        }
        if let Some(bio) = &self.bio {
            if bio.chars().count() > MAX_CONTENT_CHARS {
                return Err(format!("bio is limited to {MAX_CONTENT_CHARS} characters"));
            }
        }
        Ok(())
    }
}

async fn update_profile(ctx: Arc<AppContext>, principal: Principal, params: ProfileParams) -> Result<Profile, RpcFailure> {
    Ok(ctx
        .social
        .update_profile(&principal.user_id, params.display_name, params.bio, params.avatar_url)
        .await)
}

// ── messaging ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageParams {
    #[serde(alias = "userId")]
    recipient_id: String,
    content: String,
}

impl Params for SendMessageParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("recipientId", &self.recipient_id)?;
        content("content", &self.content)
    }
}

async fn send_message(ctx: Arc<AppContext>, principal: Principal, params: SendMessageParams) -> Result<Message, RpcFailure> {
    Ok(ctx
        .social
        .send_message(&principal.user_id, &params.recipient_id, &params.content)
        .await?)
}

#[derive(Debug, Serialize)]
struct ChatList {
    chats: Vec<ChatSummary>,
}

async fn get_chats(ctx: Arc<AppContext>, principal: Principal, _: NoParams) -> Result<ChatList, RpcFailure> {
    Ok(ChatList {
        chats: ctx.social.chats(&principal.user_id).await,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessagesParams {
    chat_id: String,
    limit: Option<usize>,
}

impl Params for ChatMessagesParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("chatId", &self.chat_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    chat_id: String,
    messages: Vec<Message>,
}

async fn get_chat_messages(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: ChatMessagesParams,
) -> Result<MessageList, RpcFailure> {
    let limit = page(params.limit, 50, 500);
    let messages = ctx
        .social
        .chat_messages(&principal.user_id, &params.chat_id, limit)
        .await?;
    Ok(MessageList {
        chat_id: params.chat_id,
        messages,
    })
}

// ── notifications ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationsParams {
    #[serde(default)]
    unread_only: bool,
    limit: Option<usize>,
}

impl Params for NotificationsParams {}

#[derive(Debug, Serialize)]
struct NotificationList {
    notifications: Vec<Notification>,
}

async fn get_notifications(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: NotificationsParams,
) -> Result<NotificationList, RpcFailure> {
    let limit = page(params.limit, 50, 500);
    Ok(NotificationList {
        notifications: ctx
            .social
            .notifications(&principal.user_id, params.unread_only, limit)
            .await,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadParams {
    #[serde(default)]
    notification_ids: Vec<String>,
}

impl Params for MarkReadParams {}

#[derive(Debug, Serialize)]
struct MarkReadResult {
    marked: usize,
}

async fn mark_notifications_read(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: MarkReadParams,
) -> Result<MarkReadResult, RpcFailure> {
    Ok(MarkReadResult {
        marked: ctx
            .social
            .mark_notifications_read(&principal.user_id, &params.notification_ids)
            .await,
    })
}

// ── favorites ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FavoriteResult {
    user_id: String,
    favorited: bool,
    changed: bool,
}

async fn favorite_profile(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: UserIdParams,
) -> Result<FavoriteResult, RpcFailure> {
    let changed = ctx.social.favorite(&principal.user_id, &params.user_id).await?;
    Ok(FavoriteResult {
        user_id: params.user_id,
        favorited: true,
        changed,
    })
}

async fn unfavorite_profile(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: UserIdParams,
) -> Result<FavoriteResult, RpcFailure> {
    let changed = ctx.social.unfavorite(&principal.user_id, &params.user_id).await;
    Ok(FavoriteResult {
        user_id: params.user_id,
        favorited: false,
        changed,
    })
}

async fn get_favorites(ctx: Arc<AppContext>, principal: Principal, _: NoParams) -> Result<UserList, RpcFailure> {
    let users = ctx.social.favorites(&principal.user_id).await;
    Ok(UserList {
        user_id: principal.user_id,
        users,
    })
}
