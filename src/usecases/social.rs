//! Social Use Case - Profiles, Feed, Messaging and Moderation
//!
//! Thin in-process read/write service backing the social, messaging,
//! notification, moderation and favorites method groups. State lives
//! behind one `RwLock` and is not part of the trading store; nothing
//! here touches balances.
//!
//! Notifications are appended as a side effect of follows, likes,
//! comments and messages.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::error::{TradingError, TradingResult};
use crate::domain::market::new_id;

/// Longest accepted post, comment or message body.
pub const MAX_CONTENT_CHARS: usize = 5000;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub user_id: String,
  pub display_name: Option<String>,
  pub bio: Option<String>,
  pub avatar_url: Option<String>,
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
  pub id: String,
  pub author_id: String,
  pub content: String,
  pub like_count: usize,
  pub comment_count: usize,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub id: String,
  pub post_id: String,
  pub author_id: String,
  pub content: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
  pub id: String,
  pub chat_id: String,
  pub sender_id: String,
  pub content: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
  pub chat_id: String,
  pub participants: Vec<String>,
  pub last_message: Option<Message>,
  pub message_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
  Follow,
  Like,
  Comment,
  Message,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id: String,
  pub user_id: String,
  pub kind: NotificationKind,
  pub actor_id: String,
  pub reference_id: Option<String>,
  pub read: bool,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
  pub id: String,
  pub reporter_id: String,
  pub post_id: String,
  pub reason: String,
  pub created_at: DateTime<Utc>,
}

/// Social counters for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialStats {
  pub posts: usize,
  pub followers: usize,
  pub following: usize,
}

#[derive(Debug, Default)]
struct SocialState {
  profiles: HashMap<String, Profile>,
  posts: BTreeMap<String, Post>,
  likes: HashMap<String, HashSet<String>>,
  comments: HashMap<String, Vec<Comment>>,
  /// user -> users they follow
  follows: HashMap<String, HashSet<String>>,
  chats: HashMap<String, Vec<Message>>,
  notifications: Vec<Notification>,
  blocks: HashMap<String, HashSet<String>>,
  reports: Vec<Report>,
  favorites: HashMap<String, HashSet<String>>,
}

impl SocialState {
  fn notify(&mut self, user_id: &str, kind: NotificationKind, actor_id: &str, reference_id: Option<&str>) {
    if user_id == actor_id {
      return;
    }
    self.notifications.push(Notification {
      id: new_id(),
      user_id: user_id.to_string(),
      kind,
      actor_id: actor_id.to_string(),
      reference_id: reference_id.map(str::to_string),
      read: false,
      created_at: Utc::now(),
    });
  }

  fn is_blocked_by(&self, user_id: &str, other: &str) -> bool {
    self.blocks.get(user_id).is_some_and(|b| b.contains(other))
  }

  fn post_mut(&mut self, post_id: &str) -> TradingResult<&mut Post> {
    self
      .posts
      .get_mut(post_id)
      .ok_or_else(|| TradingError::NotFound(format!("post {post_id}")))
  }
}

fn validate_content(content: &str) -> TradingResult<String> {
  let content = content.trim();
  if content.is_empty() {
    return Err(TradingError::InvalidInput("content must not be empty".into()));
  }
  if content.chars().count() > MAX_CONTENT_CHARS {
    return Err(TradingError::InvalidInput(format!(
      "content exceeds {MAX_CONTENT_CHARS} characters"
    )));
  }
  Ok(content.to_string())
}

fn distinct(user_id: &str, target: &str) -> TradingResult<()> {
  if user_id == target {
    return Err(TradingError::InvalidInput("target must be another user".into()));
  }
  Ok(())
}

/// Direct-message chat id for a pair of users.
pub fn dm_chat_id(a: &str, b: &str) -> String {
  if a <= b {
    format!("dm:{a}:{b}")
  } else {
    format!("dm:{b}:{a}")
  }
}

fn sorted(set: Option<&HashSet<String>>) -> Vec<String> {
  let mut out: Vec<String> = set.map(|s| s.iter().cloned().collect()).unwrap_or_default();
  out.sort();
  out
}

/// In-process social graph and content store.
#[derive(Debug, Default)]
pub struct SocialService {
  state: RwLock<SocialState>,
}

impl SocialService {
  pub fn new() -> Self {
    Self::default()
  }

  // ── profiles ──

  pub async fn profile(&self, user_id: &str) -> Profile {
    let state = self.state.read().await;
    state.profiles.get(user_id).cloned().unwrap_or_else(|| Profile {
      user_id: user_id.to_string(),
      ..Profile::default()
    })
  }

  pub async fn update_profile(
    &self,
    user_id: &str,
    display_name: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
  ) -> Profile {
    let mut state = self.state.write().await;
    let profile = state
      .profiles
      .entry(user_id.to_string())
      .or_insert_with(|| Profile {
        user_id: user_id.to_string(),
        ..Profile::default()
      });
    if display_name.is_some() {
      profile.display_name = display_name;
    }
    if bio.is_some() {
      profile.bio = bio;
    }
    if avatar_url.is_some() {
      profile.avatar_url = avatar_url;
    }
    profile.updated_at = Some(Utc::now());
    profile.clone()
  }

  /// Profiles whose id or display name contains `query` (case-insensitive).
  pub async fn search_profiles(&self, query: &str, limit: usize) -> Vec<Profile> {
    let needle = query.to_lowercase();
    let state = self.state.read().await;
    let mut hits: Vec<Profile> = state
      .profiles
      .values()
      .filter(|p| {
        p.user_id.to_lowercase().contains(&needle)
          || p.display_name.as_deref().is_some_and(|n| n.to_lowercase().contains(&needle))
      })
      .cloned()
      .collect();
    hits.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    hits.truncate(limit);
    hits
  }

  // ── posts ──

  pub async fn create_post(&self, author_id: &str, content: &str) -> TradingResult<Post> {
    let content = validate_content(content)?;
    let post = Post {
      id: new_id(),
      author_id: author_id.to_string(),
      content,
      like_count: 0,
      comment_count: 0,
      created_at: Utc::now(),
    };
    self.state.write().await.posts.insert(post.id.clone(), post.clone());
    info!(post_id = %post.id, author_id, "Post created");
    Ok(post)
  }

  pub async fn post(&self, post_id: &str) -> TradingResult<Post> {
    self
      .state
      .read()
      .await
      .posts
      .get(post_id)
      .cloned()
      .ok_or_else(|| TradingError::NotFound(format!("post {post_id}")))
  }

  /// Newest posts, hiding authors the viewer blocked.
  pub async fn feed(&self, viewer_id: &str, following_only: bool, limit: usize, offset: usize) -> Vec<Post> {
    let state = self.state.read().await;
    let following = state.follows.get(viewer_id);
    let mut posts: Vec<&Post> = state
      .posts
      .values()
      .filter(|p| !state.is_blocked_by(viewer_id, &p.author_id))
      .filter(|p| {
        !following_only
          || p.author_id == viewer_id
          || following.is_some_and(|f| f.contains(&p.author_id))
      })
      .collect();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts.into_iter().skip(offset).take(limit).cloned().collect()
  }

  pub async fn delete_post(&self, user_id: &str, post_id: &str) -> TradingResult<()> {
    let mut state = self.state.write().await;
    let post = state.post_mut(post_id)?;
    if post.author_id != user_id {
      return Err(TradingError::Forbidden(format!("post {post_id} belongs to another user")));
    }
    state.posts.remove(post_id);
    state.likes.remove(post_id);
    state.comments.remove(post_id);
    Ok(())
  }

  /// Like a post; returns the new like count. Liking twice is a no-op.
  pub async fn like_post(&self, user_id: &str, post_id: &str) -> TradingResult<usize> {
    let mut state = self.state.write().await;
    let author = state.post_mut(post_id)?.author_id.clone();
    let inserted = state.likes.entry(post_id.to_string()).or_default().insert(user_id.to_string());
    let count = state.likes.get(post_id).map_or(0, HashSet::len);
    state.post_mut(post_id)?.like_count = count;
    if inserted {
      state.notify(&author, NotificationKind::Like, user_id, Some(post_id));
    }
    Ok(count)
  }

  pub async fn unlike_post(&self, user_id: &str, post_id: &str) -> TradingResult<usize> {
    let mut state = self.state.write().await;
    state.post_mut(post_id)?;
    if let Some(likes) = state.likes.get_mut(post_id) {
      likes.remove(user_id);
    }
    let count = state.likes.get(post_id).map_or(0, HashSet::len);
    state.post_mut(post_id)?.like_count = count;
    Ok(count)
  }

  // ── comments ──

  pub async fn create_comment(&self, author_id: &str, post_id: &str, content: &str) -> TradingResult<Comment> {
    let content = validate_content(content)?;
    let mut state = self.state.write().await;
    let post = state.post_mut(post_id)?;
    post.comment_count += 1;
    let post_author = post.author_id.clone();
    let comment = Comment {
      id: new_id(),
      post_id: post_id.to_string(),
      author_id: author_id.to_string(),
      content,
      created_at: Utc::now(),
    };
    state.comments.entry(post_id.to_string()).or_default().push(comment.clone());
    state.notify(&post_author, NotificationKind::Comment, author_id, Some(post_id));
    Ok(comment)
  }

  pub async fn comments(&self, post_id: &str) -> TradingResult<Vec<Comment>> {
    let state = self.state.read().await;
    if !state.posts.contains_key(post_id) {
      return Err(TradingError::NotFound(format!("post {post_id}")));
    }
    Ok(state.comments.get(post_id).cloned().unwrap_or_default())
  }

  // ── follows ──

  pub async fn follow(&self, user_id: &str, target: &str) -> TradingResult<bool> {
    distinct(user_id, target)?;
    let mut state = self.state.write().await;
    let inserted = state.follows.entry(user_id.to_string()).or_default().insert(target.to_string());
    if inserted {
      state.notify(target, NotificationKind::Follow, user_id, None);
    }
    Ok(inserted)
  }

  pub async fn unfollow(&self, user_id: &str, target: &str) -> bool {
    let mut state = self.state.write().await;
    state.follows.get_mut(user_id).is_some_and(|f| f.remove(target))
  }

  pub async fn followers(&self, user_id: &str) -> Vec<String> {
    let state = self.state.read().await;
    let mut out: Vec<String> = state
      .follows
      .iter()
      .filter(|(_, targets)| targets.contains(user_id))
      .map(|(follower, _)| follower.clone())
      .collect();
    out.sort();
    out
  }

  pub async fn following(&self, user_id: &str) -> Vec<String> {
    sorted(self.state.read().await.follows.get(user_id))
  }

  // ── messaging ──

  /// Send a direct message. Fails if the recipient blocked the sender.
  pub async fn send_message(&self, sender_id: &str, recipient_id: &str, content: &str) -> TradingResult<Message> {
    distinct(sender_id, recipient_id)?;
    let content = validate_content(content)?;
    let mut state = self.state.write().await;
    if state.is_blocked_by(recipient_id, sender_id) {
      return Err(TradingError::Forbidden("recipient does not accept messages from you".into()));
    }
    let chat_id = dm_chat_id(sender_id, recipient_id);
    let message = Message {
      id: new_id(),
      chat_id: chat_id.clone(),
      sender_id: sender_id.to_string(),
      content,
      created_at: Utc::now(),
    };
    state.chats.entry(chat_id.clone()).or_default().push(message.clone());
    state.notify(recipient_id, NotificationKind::Message, sender_id, Some(&chat_id));
    debug!(chat_id = %chat_id, "Message sent");
    Ok(message)
  }

  pub async fn chats(&self, user_id: &str) -> Vec<ChatSummary> {
    let state = self.state.read().await;
    let mut chats: Vec<ChatSummary> = state
      .chats
      .iter()
      .filter_map(|(chat_id, messages)| {
        let participants: Vec<String> = chat_id.strip_prefix("dm:")?.split(':').map(str::to_string).collect();
        if !participants.iter().any(|p| p == user_id) {
          return None;
        }
        Some(ChatSummary {
          chat_id: chat_id.clone(),
          participants,
          last_message: messages.last().cloned(),
          message_count: messages.len(),
        })
      })
      .collect();
    chats.sort_by(|a, b| {
      let at = |c: &ChatSummary| c.last_message.as_ref().map(|m| m.created_at);
      at(b).cmp(&at(a))
    });
    chats
  }

  pub async fn chat_messages(&self, user_id: &str, chat_id: &str, limit: usize) -> TradingResult<Vec<Message>> {
    let is_member = chat_id
      .strip_prefix("dm:")
      .is_some_and(|rest| rest.split(':').any(|p| p == user_id));
    if !is_member {
      return Err(TradingError::Forbidden(format!("not a participant of {chat_id}")));
    }
    let state = self.state.read().await;
    let messages = state
      .chats
      .get(chat_id)
      .ok_or_else(|| TradingError::NotFound(format!("chat {chat_id}")))?;
    let skip = messages.len().saturating_sub(limit);
    Ok(messages[skip..].to_vec())
  }

  // ── notifications ──

  pub async fn notifications(&self, user_id: &str, unread_only: bool, limit: usize) -> Vec<Notification> {
    let state = self.state.read().await;
    state
      .notifications
      .iter()
      .rev()
      .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
      .take(limit)
      .cloned()
      .collect()
  }

  /// Mark the given notifications (or all when `ids` is empty) read.
  pub async fn mark_notifications_read(&self, user_id: &str, ids: &[String]) -> usize {
    let mut state = self.state.write().await;
    let mut marked = 0;
    for n in state.notifications.iter_mut().filter(|n| n.user_id == user_id && !n.read) {
      if ids.is_empty() || ids.contains(&n.id) {
        n.read = true;
        marked += 1;
      }
    }
    marked
  }

  // ── moderation ──

  pub async fn block(&self, user_id: &str, target: &str) -> TradingResult<bool> {
    distinct(user_id, target)?;
    let mut state = self.state.write().await;
    let inserted = state.blocks.entry(user_id.to_string()).or_default().insert(target.to_string());
    if let Some(f) = state.follows.get_mut(target) {
      f.remove(user_id);
    }
    Ok(inserted)
  }

  pub async fn unblock(&self, user_id: &str, target: &str) -> bool {
    let mut state = self.state.write().await;
    state.blocks.get_mut(user_id).is_some_and(|b| b.remove(target))
  }

  pub async fn blocked(&self, user_id: &str) -> Vec<String> {
    sorted(self.state.read().await.blocks.get(user_id))
  }

  pub async fn report_post(&self, reporter_id: &str, post_id: &str, reason: &str) -> TradingResult<Report> {
    let reason = validate_content(reason)?;
    let mut state = self.state.write().await;
    if !state.posts.contains_key(post_id) {
      return Err(TradingError::NotFound(format!("post {post_id}")));
    }
    let report = Report {
      id: new_id(),
      reporter_id: reporter_id.to_string(),
      post_id: post_id.to_string(),
      reason,
      created_at: Utc::now(),
    };
    state.reports.push(report.clone());
    info!(report_id = %report.id, post_id, "Post reported");
    Ok(report)
  }

  // ── favorites ──

  pub async fn favorite(&self, user_id: &str, target: &str) -> TradingResult<bool> {
    distinct(user_id, target)?;
    let mut state = self.state.write().await;
    Ok(state.favorites.entry(user_id.to_string()).or_default().insert(target.to_string()))
  }

  pub async fn unfavorite(&self, user_id: &str, target: &str) -> bool {
    let mut state = self.state.write().await;
    state.favorites.get_mut(user_id).is_some_and(|f| f.remove(target))
  }

  pub async fn favorites(&self, user_id: &str) -> Vec<String> {
    sorted(self.state.read().await.favorites.get(user_id))
  }

  // ── stats ──

  pub async fn stats(&self, user_id: &str) -> SocialStats {
    let state = self.state.read().await;
    SocialStats {
      posts: state.posts.values().filter(|p| p.author_id == user_id).count(),
      followers: state.follows.values().filter(|f| f.contains(user_id)).count(),
      following: state.follows.get(user_id).map_or(0, HashSet::len),
    }
  }

  /// Total number of posts.
  pub async fn post_count(&self) -> usize {
    self.state.read().await.posts.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_post_like_comment_flow_notifies_author() {
    let social = SocialService::new();
    let post = social.create_post("alice", "hello").await.unwrap();
    assert_eq!(social.like_post("bob", &post.id).await.unwrap(), 1);
    assert_eq!(social.like_post("bob", &post.id).await.unwrap(), 1);
    social.create_comment("bob", &post.id, "hi").await.unwrap();

    let post = social.post(&post.id).await.unwrap();
    assert_eq!(post.comment_count, 1);
    let notes = social.notifications("alice", true, 10).await;
    assert_eq!(notes.len(), 2);
    assert_eq!(social.mark_notifications_read("alice", &[]).await, 2);
    assert!(social.notifications("alice", true, 10).await.is_empty());
  }

  #[tokio::test]
  async fn test_only_author_deletes() {
    let social = SocialService::new();
    let post = social.create_post("alice", "x").await.unwrap();
    assert!(matches!(
      social.delete_post("bob", &post.id).await,
      Err(TradingError::Forbidden(_))
    ));
    social.delete_post("alice", &post.id).await.unwrap();
    assert!(social.post(&post.id).await.is_err());
  }

  #[tokio::test]
  async fn test_block_hides_feed_and_messages() {
    let social = SocialService::new();
    social.create_post("spammer", "buy now").await.unwrap();
    social.block("alice", "spammer").await.unwrap();
    assert!(social.feed("alice", false, 10, 0).await.is_empty());
    assert!(social.send_message("spammer", "alice", "hey").await.is_err());
    assert_eq!(social.blocked("alice").await, vec!["spammer".to_string()]);
  }

  #[tokio::test]
  async fn test_follow_and_following_feed() {
    let social = SocialService::new();
    social.create_post("bob", "from bob").await.unwrap();
    social.create_post("carol", "from carol").await.unwrap();
    assert!(social.follow("alice", "bob").await.unwrap());
    let feed = social.feed("alice", true, 10, 0).await;
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].author_id, "bob");
    assert_eq!(social.followers("bob").await, vec!["alice".to_string()]);
    assert!(social.follow("alice", "alice").await.is_err());
  }

  #[tokio::test]
  async fn test_direct_messages() {
    let social = SocialService::new();
    let msg = social.send_message("alice", "bob", "hi bob").await.unwrap();
    assert_eq!(msg.chat_id, dm_chat_id("bob", "alice"));
    assert_eq!(social.chats("bob").await.len(), 1);
    assert_eq!(social.chat_messages("bob", &msg.chat_id, 50).await.unwrap().len(), 1);
    assert!(social.chat_messages("carol", &msg.chat_id, 50).await.is_err());
  }

  #[tokio::test]
  async fn test_rejects_empty_content() {
    let social = SocialService::new();
    assert!(social.create_post("alice", "   ").await.is_err());
  }
}
