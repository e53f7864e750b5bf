//! Text message summary of upcoming events.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collab::permission::{Capability, PermissionDecision, PermissionGate};
use crate::collab::sms::SmsTransport;
use crate::coordinator::EventsView;
use crate::error::{TrackerError, TrackerResult};
use crate::event::Event;
use crate::format::{parse_date, sort_chronologically};

pub const DIGEST_HEADER: &str = "Your upcoming events:\n";

/// Build the digest body: one `title: date` line per event dated `today` or
/// later, in calendar order. Events whose date doesn't parse are left out.
pub fn compose_digest(events: &[Event], today: NaiveDate) -> String {
    let mut upcoming: Vec<Event> = events
        .iter()
        .filter(|event| parse_date(&event.date).is_some_and(|date| date >= today))
        .cloned()
        .collect();
    sort_chronologically(&mut upcoming);

    let mut body = String::from(DIGEST_HEADER);
    for event in &upcoming {
        body.push_str(&event.title);
        body.push_str(": ");
        body.push_str(&event.date);
        body.push('\n');
    }
    body
}

pub struct DigestService {
    sms: Arc<dyn SmsTransport>,
    permissions: Arc<dyn PermissionGate>,
    phone_number: Option<String>,
}

impl DigestService {
    pub fn new(
        sms: Arc<dyn SmsTransport>,
        permissions: Arc<dyn PermissionGate>,
        phone_number: Option<String>,
    ) -> Self {
        DigestService {
            sms,
            permissions,
            phone_number: phone_number.filter(|n| !n.trim().is_empty()),
        }
    }

    /// Check `SendSms`, asking for it if it has not been granted yet.
    pub fn ensure_permission(&self) -> TrackerResult<()> {
        if self.permissions.has_permission(Capability::SendSms) {
            return Ok(());
        }
        match self.permissions.request_permission(Capability::SendSms) {
            PermissionDecision::Granted => Ok(()),
            PermissionDecision::Denied => Err(TrackerError::PermissionDenied(Capability::SendSms)),
        }
    }

    /// Send a digest of `events` as of today. Returns the message body.
    pub async fn send(&self, events: &[Event]) -> TrackerResult<String> {
        self.send_at(events, Local::now().date_naive()).await
    }

    pub async fn send_at(&self, events: &[Event], today: NaiveDate) -> TrackerResult<String> {
        self.ensure_permission()?;
        let phone_number = self.phone_number.as_deref().ok_or_else(|| {
            TrackerError::Config("No phone number configured (set sms.phone_number)".into())
        })?;

        let body = compose_digest(events, today);
        self.sms.send(phone_number, &body).await;
        info!(events = events.len(), "digest sent");
        Ok(body)
    }

    /// Send a digest for the current view and again for every new revision.
    /// Ends when the view channel closes.
    pub fn watch(self: Arc<Self>, mut views: watch::Receiver<EventsView>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_sent: Option<u64> = None;
            loop {
                let pending = {
                    let view = views.borrow_and_update();
                    (view.loaded && last_sent != Some(view.revision))
                        .then(|| (view.revision, view.events.clone()))
                };

                if let Some((revision, events)) = pending {
                    match self.send(&events).await {
                        Ok(_) => debug!(revision, "digest sent for revision"),
                        Err(e) => warn!(revision, error = %e, "digest not sent"),
                    }
                    last_sent = Some(revision);
                }

                if views.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::permission::GrantStore;
    use crate::collab::sms::OutboxSms;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn events() -> Vec<Event> {
        vec![
            Event::new("a", "Retro", "03/08/2024", "4:00PM"),
            Event::new("b", "Kickoff", "01/15/2024", "9:00AM"),
            Event::new("c", "Standup", "03/05/2024", "9:00AM"),
            Event::new("d", "Offsite", "01/02/2025", "8:00AM"),
            Event::new("e", "Mystery", "soon", "1:00PM"),
        ]
    }

    #[test]
    fn digest_lists_upcoming_events_in_calendar_order() {
        assert_eq!(
            compose_digest(&events(), today()),
            "Your upcoming events:\nStandup: 03/05/2024\nRetro: 03/08/2024\nOffsite: 01/02/2025\n"
        );
    }

    #[test]
    fn empty_digest_is_just_the_header() {
        assert_eq!(compose_digest(&[], today()), DIGEST_HEADER);
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        outbox: Arc<OutboxSms>,
        grants: Arc<GrantStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            outbox: Arc::new(OutboxSms::new(dir.path().join("sms-outbox.jsonl"))),
            grants: Arc::new(GrantStore::new(dir.path().join("permissions.toml"))),
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn denied_permission_sends_nothing() {
        let fx = fixture();
        let service = DigestService::new(fx.outbox.clone(), fx.grants.clone(), Some("+1555".into()));

        let err = service.send_at(&events(), today()).await.unwrap_err();
        assert!(matches!(err, TrackerError::PermissionDenied(Capability::SendSms)));
        assert!(fx.outbox.messages().is_empty());
    }

    #[tokio::test]
    async fn missing_phone_number_is_a_config_error() {
        let fx = fixture();
        fx.grants.grant(Capability::SendSms).unwrap();
        let service = DigestService::new(fx.outbox.clone(), fx.grants.clone(), Some(" ".into()));

        assert!(matches!(
            service.send_at(&events(), today()).await,
            Err(TrackerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn each_send_builds_a_fresh_message() {
        let fx = fixture();
        fx.grants.grant(Capability::SendSms).unwrap();
        let service = DigestService::new(fx.outbox.clone(), fx.grants.clone(), Some("+1555".into()));

        service.send_at(&events(), today()).await.unwrap();
        service.send_at(&events()[..1], today()).await.unwrap();

        let messages = fx.outbox.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].body, "Your upcoming events:\nRetro: 03/08/2024\n");
    }

    #[tokio::test]
    async fn watch_sends_once_per_revision() {
        let fx = fixture();
        fx.grants.grant(Capability::SendSms).unwrap();
        let service = Arc::new(DigestService::new(
            fx.outbox.clone(),
            fx.grants.clone(),
            Some("+1555".into()),
        ));

        let (tx, rx) = watch::channel(EventsView::default());
        let handle = service.watch(rx);

        tx.send_modify(|view| {
            view.revision = 1;
            view.loaded = true;
        });
        wait_for_messages(&fx.outbox, 1).await;

        tx.send_modify(|view| view.error = None);
        tx.send_modify(|view| view.revision = 2);
        wait_for_messages(&fx.outbox, 2).await;

        drop(tx);
        handle.await.unwrap();
        assert_eq!(fx.outbox.messages().len(), 2);
    }

    async fn wait_for_messages(outbox: &OutboxSms, count: usize) {
        for _ in 0..200 {
            if outbox.messages().len() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("expected {} outbox messages", count);
    }
}
