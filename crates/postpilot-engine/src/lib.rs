//! # PostPilot Engine
//! The decision layer between the stores and the transport: the posting
//! dispatcher (what to publish when a slot fires), the trigger runner that
//! produces fire events from the schedule table, lead intake with its rate
//! window, and TTL-bound session state for multi-step admin flows.

pub mod clock;
pub mod dispatch;
pub mod intake;
pub mod runner;
pub mod session;

pub use dispatch::PostingDispatcher;
pub use intake::{IncomingLead, IntakeOutcome, LeadIntake};
pub use runner::spawn_runner;
pub use session::SessionStore;

#[cfg(test)]
pub(crate) mod testutil {
    use async_trait::async_trait;
    use postpilot_core::error::{PostPilotError, Result};
    use postpilot_core::traits::Publisher;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// One recorded publish call: (method, chat_id, payload, caption).
    pub type Call = (&'static str, i64, String, Option<String>);

    /// Publisher fake that records calls and can be told to fail.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub calls: Mutex<Vec<Call>>,
        pub fail: AtomicBool,
    }

    impl RecordingPublisher {
        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn record(&self, call: Call) -> Result<i64> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PostPilotError::Channel("simulated outage".into()));
            }
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            Ok(calls.len() as i64)
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn send_photo(
            &self,
            chat_id: i64,
            file_id: &str,
            caption: Option<&str>,
        ) -> Result<i64> {
            self.record(("photo", chat_id, file_id.into(), caption.map(Into::into)))
        }

        async fn send_video(
            &self,
            chat_id: i64,
            file_id: &str,
            caption: Option<&str>,
        ) -> Result<i64> {
            self.record(("video", chat_id, file_id.into(), caption.map(Into::into)))
        }

        async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64> {
            self.record(("text", chat_id, text.into(), None))
        }
    }
}
