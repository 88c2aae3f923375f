//! Lead intake — rate-windowed capture of inbound customer messages and
//! routing to the admin chat.

use std::sync::Arc;

use chrono::{Duration, Utc};
use postpilot_core::config::LeadConfig;
use postpilot_core::error::Result;
use postpilot_core::traits::Publisher;
use postpilot_store::{LeadStore, SettingsStore, UserDirectory};

/// Everything intake needs to know about one inbound contact.
#[derive(Debug, Clone)]
pub struct IncomingLead {
    pub telegram_user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub text: String,
    pub source_content_id: Option<i64>,
    pub phone: Option<String>,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Rejected by the rate window; nothing was written.
    RateLimited,
    /// Lead persisted and forwarded to the admin chat.
    Routed { lead_id: i64 },
    /// Lead persisted, but no admin chat is configured (or the forward
    /// failed) — a lead is never dropped when routing is unavailable.
    StoredOnly { lead_id: i64 },
}

/// Converts inbound messages into lead records.
pub struct LeadIntake {
    users: UserDirectory,
    leads: LeadStore,
    settings: SettingsStore,
    publisher: Arc<dyn Publisher>,
    rate_limit: u32,
    rate_window: Duration,
}

impl LeadIntake {
    pub fn new(
        users: UserDirectory,
        leads: LeadStore,
        settings: SettingsStore,
        publisher: Arc<dyn Publisher>,
        config: &LeadConfig,
    ) -> Self {
        Self {
            users,
            leads,
            settings,
            publisher,
            rate_limit: config.rate_limit,
            rate_window: Duration::minutes(config.rate_window_mins as i64),
        }
    }

    /// Run one inbound message through the rate check, persist the lead,
    /// and forward it when an admin chat is configured.
    ///
    /// The check-then-act is advisory, not atomic: concurrent messages from
    /// the same user can overcount slightly, which is accepted.
    pub async fn handle_message(&self, incoming: IncomingLead) -> Result<IntakeOutcome> {
        let since = Utc::now() - self.rate_window;
        let count = self.leads.count_since(incoming.telegram_user_id, since)?;
        if count >= self.rate_limit {
            tracing::info!(
                "Rate limit hit for user {} ({count} in window)",
                incoming.telegram_user_id
            );
            return Ok(IntakeOutcome::RateLimited);
        }

        let user = self.users.get_or_create(
            incoming.telegram_user_id,
            incoming.username.as_deref(),
            incoming.first_name.as_deref(),
            incoming.last_name.as_deref(),
        )?;
        let lead = self.leads.create(
            user.id,
            incoming.telegram_user_id,
            &incoming.text,
            incoming.source_content_id,
            incoming.phone.as_deref(),
        )?;

        let Some(admin_chat) = self.settings.admin_chat_id()? else {
            tracing::warn!("Admin chat not set, lead #{} stored without routing", lead.id);
            return Ok(IntakeOutcome::StoredOnly { lead_id: lead.id });
        };

        let notice = format_notice(&incoming, lead.id);
        match self.publisher.send_text(admin_chat, &notice).await {
            Ok(_) => Ok(IntakeOutcome::Routed { lead_id: lead.id }),
            Err(e) => {
                tracing::error!("Failed to forward lead #{} to admin chat: {e}", lead.id);
                Ok(IntakeOutcome::StoredOnly { lead_id: lead.id })
            }
        }
    }
}

fn format_notice(incoming: &IncomingLead, lead_id: i64) -> String {
    let name = [incoming.first_name.as_deref(), incoming.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let source = incoming
        .source_content_id
        .map(|id| format!("#{id}"))
        .unwrap_or_else(|| "direct".into());
    format!(
        "New lead #{lead_id}\nFrom: {} (@{}, id {})\nPhone: {}\nSource: {source}\n\n{}",
        if name.is_empty() { "—" } else { &name },
        incoming.username.as_deref().unwrap_or("—"),
        incoming.telegram_user_id,
        incoming.phone.as_deref().unwrap_or("—"),
        incoming.text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingPublisher;
    use postpilot_store::Database;

    struct Fixture {
        intake: LeadIntake,
        leads: LeadStore,
        settings: SettingsStore,
        publisher: Arc<RecordingPublisher>,
    }

    fn fixture(rate_limit: u32) -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let leads = LeadStore::new(db.clone());
        let settings = SettingsStore::new(db.clone());
        let publisher = Arc::new(RecordingPublisher::default());
        let intake = LeadIntake::new(
            UserDirectory::new(db.clone()),
            leads.clone(),
            settings.clone(),
            publisher.clone(),
            &LeadConfig {
                rate_limit,
                rate_window_mins: 60,
            },
        );
        Fixture {
            intake,
            leads,
            settings,
            publisher,
        }
    }

    fn incoming(text: &str) -> IncomingLead {
        IncomingLead {
            telegram_user_id: 100,
            username: Some("ann".into()),
            first_name: Some("Ann".into()),
            last_name: None,
            text: text.into(),
            source_content_id: Some(5),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_routed_when_admin_chat_set() {
        let f = fixture(10);
        f.settings.set_admin_chat_id(-200).unwrap();

        let outcome = f.intake.handle_message(incoming("interested")).await.unwrap();
        let IntakeOutcome::Routed { lead_id } = outcome else {
            panic!("expected Routed, got {outcome:?}");
        };
        let lead = f.leads.get(lead_id).unwrap().unwrap();
        assert_eq!(lead.source_content_id, Some(5));

        let calls = f.publisher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, -200);
        assert!(calls[0].2.contains("interested"));
        assert!(calls[0].2.contains("#5"));
    }

    #[tokio::test]
    async fn test_stored_only_without_admin_chat() {
        let f = fixture(10);
        let outcome = f.intake.handle_message(incoming("hello")).await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::StoredOnly { .. }));
        // Lead persisted even though nothing was forwarded
        assert_eq!(f.leads.list_recent(10).unwrap().len(), 1);
        assert_eq!(f.publisher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_forward_failure_keeps_lead() {
        let f = fixture(10);
        f.settings.set_admin_chat_id(-200).unwrap();
        f.publisher.set_fail(true);

        let outcome = f.intake.handle_message(incoming("hello")).await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::StoredOnly { .. }));
        assert_eq!(f.leads.list_recent(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_boundary() {
        let f = fixture(3);
        f.settings.set_admin_chat_id(-200).unwrap();

        // N-th message inside the window is accepted...
        for i in 0..3 {
            let outcome = f.intake.handle_message(incoming(&format!("msg {i}"))).await.unwrap();
            assert!(matches!(outcome, IntakeOutcome::Routed { .. }), "msg {i}");
        }
        // ...the (N+1)-th is rejected with no new row
        let outcome = f.intake.handle_message(incoming("one too many")).await.unwrap();
        assert_eq!(outcome, IntakeOutcome::RateLimited);
        assert_eq!(f.leads.list_recent(10).unwrap().len(), 3);

        // Other users are unaffected
        let mut other = incoming("different user");
        other.telegram_user_id = 999;
        let outcome = f.intake.handle_message(other).await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::Routed { .. }));
    }
}
