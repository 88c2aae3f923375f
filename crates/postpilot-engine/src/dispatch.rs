//! Posting dispatch — the decision made when a schedule slot fires, and the
//! manual "post now" variant.

use std::sync::Arc;

use postpilot_core::error::Result;
use postpilot_core::traits::Publisher;
use postpilot_core::types::{Content, ContentType};
use postpilot_store::{ContentStore, ScheduleStore, SettingsStore};

/// Decides whether and what to publish for a fire event, and records the
/// outcome in the post log. Transport failures are caught here and reported
/// as `false` — a failed publish must never reach the trigger runner as an
/// error.
pub struct PostingDispatcher {
    settings: SettingsStore,
    schedules: ScheduleStore,
    content: ContentStore,
    publisher: Arc<dyn Publisher>,
}

impl PostingDispatcher {
    pub fn new(
        settings: SettingsStore,
        schedules: ScheduleStore,
        content: ContentStore,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            settings,
            schedules,
            content,
            publisher,
        }
    }

    /// Handle a fire event for one schedule slot. Returns true when a post
    /// went out. Every skip is silent success; only storage failures are
    /// errors.
    pub async fn on_fire(&self, schedule_id: i64) -> Result<bool> {
        if !self.settings.posting_enabled()? {
            tracing::debug!("Posting disabled, skipping fire for schedule #{schedule_id}");
            return Ok(false);
        }
        let Some(target) = self.settings.target_chat_id()? else {
            tracing::warn!("Target chat not set, skipping fire for schedule #{schedule_id}");
            return Ok(false);
        };
        let Some(content_id) = self.schedules.bound_content(schedule_id)? else {
            tracing::debug!("No content bound to schedule #{schedule_id}");
            return Ok(false);
        };
        let Some(content) = self.content.get(content_id)? else {
            tracing::debug!("Content #{content_id} gone, skipping schedule #{schedule_id}");
            return Ok(false);
        };
        if !content.is_postable() {
            tracing::debug!(
                "Content #{content_id} not postable (status {}, publishing {})",
                content.status.as_str(),
                content.publishing_enabled
            );
            return Ok(false);
        }
        let posted = self.publish_and_log(&content, target).await?;
        if posted {
            tracing::info!("Scheduled post: content #{content_id} for schedule #{schedule_id}");
        }
        Ok(posted)
    }

    /// Publish one content item immediately, bypassing the schedule and the
    /// global posting switch. Target and content gates still apply.
    pub async fn post_now(&self, content_id: i64) -> Result<bool> {
        let Some(target) = self.settings.target_chat_id()? else {
            tracing::warn!("Target chat not set, cannot post content #{content_id}");
            return Ok(false);
        };
        let Some(content) = self.content.get(content_id)? else {
            return Ok(false);
        };
        if !content.is_postable() {
            return Ok(false);
        }
        let posted = self.publish_and_log(&content, target).await?;
        if posted {
            tracing::info!("Posted content #{content_id} to chat {target} (post now)");
        }
        Ok(posted)
    }

    /// Shared tail: validate the payload, publish, append the post-log row.
    /// The log write is the sole idempotence anchor — it happens only after
    /// a successful transport call, exactly once per call.
    async fn publish_and_log(&self, content: &Content, target: i64) -> Result<bool> {
        let caption = content.caption.as_deref();
        let sent = match content.content_type {
            ContentType::Photo => match content.file_id.as_deref() {
                Some(file_id) => self.publisher.send_photo(target, file_id, caption).await,
                None => {
                    tracing::warn!("Content #{} is a photo without media, skipping", content.id);
                    return Ok(false);
                }
            },
            ContentType::Video => match content.file_id.as_deref() {
                Some(file_id) => self.publisher.send_video(target, file_id, caption).await,
                None => {
                    tracing::warn!("Content #{} is a video without media, skipping", content.id);
                    return Ok(false);
                }
            },
            ContentType::Text => {
                let text = content
                    .text
                    .as_deref()
                    .or(caption)
                    .map(str::trim)
                    .unwrap_or("");
                if text.is_empty() {
                    tracing::warn!("Content #{} has no text, skipping", content.id);
                    return Ok(false);
                }
                self.publisher.send_text(target, text).await
            }
        };

        match sent {
            Ok(message_id) => {
                self.content.log_post(content.id, target, message_id)?;
                Ok(true)
            }
            Err(e) => {
                tracing::error!("Publish of content #{} failed: {e}", content.id);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingPublisher;
    use postpilot_store::Database;

    struct Fixture {
        dispatcher: PostingDispatcher,
        settings: SettingsStore,
        schedules: ScheduleStore,
        content: ContentStore,
        publisher: Arc<RecordingPublisher>,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let settings = SettingsStore::new(db.clone());
        let schedules = ScheduleStore::new(db.clone());
        let content = ContentStore::new(db.clone());
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = PostingDispatcher::new(
            settings.clone(),
            schedules.clone(),
            content.clone(),
            publisher.clone(),
        );
        Fixture {
            dispatcher,
            settings,
            schedules,
            content,
            publisher,
        }
    }

    /// Target set, posting on, one bound text item. Returns (fixture,
    /// schedule id, content id).
    fn ready_fixture() -> (Fixture, i64, i64) {
        let f = fixture();
        f.settings.set_target_chat_id(-100).unwrap();
        f.settings.set_posting_enabled(true).unwrap();
        let c = f
            .content
            .add(ContentType::Text, 1, None, Some("promo"), None)
            .unwrap();
        let sid = f.schedules.add("09:00").unwrap().unwrap();
        f.schedules.bind_content(sid, c.id).unwrap();
        (f, sid, c.id)
    }

    #[tokio::test]
    async fn test_fire_publishes_and_logs() {
        let (f, sid, cid) = ready_fixture();
        assert!(f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.publisher.call_count(), 1);
        assert_eq!(f.content.post_count(cid).unwrap(), 1);
        let entry = &f.content.recent_posts(1).unwrap()[0];
        assert_eq!(entry.content_id, cid);
        assert_eq!(entry.chat_id, -100);
    }

    #[tokio::test]
    async fn test_fire_skips_when_posting_disabled() {
        let (f, sid, cid) = ready_fixture();
        f.settings.set_posting_enabled(false).unwrap();
        assert!(!f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.publisher.call_count(), 0);
        assert_eq!(f.content.post_count(cid).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fire_skips_without_target() {
        let (f, sid, _) = ready_fixture();
        f.settings.set(postpilot_store::settings::KEY_TARGET_CHAT, "0").unwrap();
        assert!(!f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.publisher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fire_skips_unbound_schedule() {
        let f = fixture();
        f.settings.set_target_chat_id(-100).unwrap();
        f.settings.set_posting_enabled(true).unwrap();
        let sid = f.schedules.add("10:00").unwrap().unwrap();
        assert!(!f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.publisher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fire_skips_publishing_disabled_content() {
        let (f, sid, cid) = ready_fixture();
        f.content.set_publishing_enabled(cid, false).unwrap();
        assert!(!f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.publisher.call_count(), 0);
        assert_eq!(f.content.post_count(cid).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fire_skips_deleted_content() {
        let (f, sid, cid) = ready_fixture();
        f.content.soft_delete(cid).unwrap();
        assert!(!f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.publisher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fire_skips_photo_without_media() {
        let f = fixture();
        f.settings.set_target_chat_id(-100).unwrap();
        f.settings.set_posting_enabled(true).unwrap();
        // Malformed row: photo with no file id
        let c = f
            .content
            .add(ContentType::Photo, 1, None, None, Some("cap"))
            .unwrap();
        let sid = f.schedules.add("09:00").unwrap().unwrap();
        f.schedules.bind_content(sid, c.id).unwrap();

        assert!(!f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.publisher.call_count(), 0);
        assert_eq!(f.content.post_count(c.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_text_falls_back_to_caption() {
        let f = fixture();
        f.settings.set_target_chat_id(-100).unwrap();
        f.settings.set_posting_enabled(true).unwrap();
        let c = f
            .content
            .add(ContentType::Text, 1, None, None, Some("caption only"))
            .unwrap();
        let sid = f.schedules.add("09:00").unwrap().unwrap();
        f.schedules.bind_content(sid, c.id).unwrap();

        assert!(f.dispatcher.on_fire(sid).await.unwrap());
        let calls = f.publisher.calls.lock().unwrap();
        assert_eq!(calls[0].0, "text");
        assert_eq!(calls[0].2, "caption only");
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_posted() {
        let (f, sid, cid) = ready_fixture();
        f.publisher.set_fail(true);
        // Caught at the boundary: boolean failure, no log row
        assert!(!f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.content.post_count(cid).unwrap(), 0);

        // Retry after the outage succeeds and logs exactly once
        f.publisher.set_fail(false);
        assert!(f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.content.post_count(cid).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_post_now_bypasses_global_switch() {
        let (f, _, cid) = ready_fixture();
        f.settings.set_posting_enabled(false).unwrap();
        assert!(f.dispatcher.post_now(cid).await.unwrap());
        assert_eq!(f.content.post_count(cid).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_post_now_still_gates_content() {
        let (f, _, cid) = ready_fixture();
        f.content.set_publishing_enabled(cid, false).unwrap();
        assert!(!f.dispatcher.post_now(cid).await.unwrap());
        assert!(!f.dispatcher.post_now(9999).await.unwrap());

        f.settings.set(postpilot_store::settings::KEY_TARGET_CHAT, "0").unwrap();
        f.content.set_publishing_enabled(cid, true).unwrap();
        assert!(!f.dispatcher.post_now(cid).await.unwrap());
        assert_eq!(f.publisher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_triggers_both_log() {
        let (f, sid, cid) = ready_fixture();
        // Manual and scheduled publish of the same content are independent
        assert!(f.dispatcher.on_fire(sid).await.unwrap());
        assert!(f.dispatcher.post_now(cid).await.unwrap());
        assert_eq!(f.content.post_count(cid).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let f = fixture();
        f.settings.set_target_chat_id(-100).unwrap();
        f.settings.set_posting_enabled(true).unwrap();

        let sid = f.schedules.add("09:00").unwrap().unwrap();
        assert!(f.schedules.add("09:00").unwrap().is_none());

        let c = f
            .content
            .add(ContentType::Text, 1, None, Some("offer"), None)
            .unwrap();
        assert!(f.schedules.bind_content(sid, c.id).unwrap());

        assert!(f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.content.post_count(c.id).unwrap(), 1);

        f.content.set_publishing_enabled(c.id, false).unwrap();
        assert!(!f.dispatcher.on_fire(sid).await.unwrap());
        assert_eq!(f.content.post_count(c.id).unwrap(), 1);
    }
}
