//! Cooldown (rate-limit) state machine.
//!
//! Tracks the client's placement window and arms at most one timer.
//!
//! # State Diagram
//!
//! ```text
//!                 set_cooldown(None)
//!        ┌──────────────────────────────────┐
//!        │                                  ▼
//! ┌──────┴─────┐  set_cooldown(future)  ┌────────────┐
//! │    Idle    │───────────────────────▶│ Indefinite │
//! │            │◀──────────────────┐    └─────┬──────┘
//! └──────┬─────┘  timer fired /    │          │ set_cooldown(future)
//!        │        set_cooldown(past)          ▼
//!        │                          │    ┌────────────┐
//!        └─────────────────────────────▶│   Active    │
//!                set_cooldown(future)    │ { ends_at } │
//!                                        └────────────┘
//! ```
//!
//! An `Active` phase whose deadline has passed reads as `Idle`, so callers
//! see the right answer even between the deadline and the timer task's
//! notification.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::event::{emit, EventSender, SyncEvent};

/// Where the client stands with respect to the rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownPhase {
    /// No active window; placing is allowed.
    Idle,
    /// Window runs until the deadline.
    Active { ends_at: DateTime<Utc> },
    /// On cooldown with no known end.
    Indefinite,
}

/// Single-timer cooldown tracker.
#[derive(Debug)]
pub struct CooldownTimer {
    phase: CooldownPhase,
    timer: Option<JoinHandle<()>>,
    events: EventSender,
}

impl CooldownTimer {
    /// Create an idle tracker that notifies on the given bus.
    pub fn new(events: EventSender) -> Self {
        Self {
            phase: CooldownPhase::Idle,
            timer: None,
            events,
        }
    }

    /// Current phase, normalizing an elapsed deadline to `Idle`.
    pub fn phase(&self) -> CooldownPhase {
        match self.phase {
            CooldownPhase::Active { ends_at } if ends_at <= Utc::now() => CooldownPhase::Idle,
            phase => phase,
        }
    }

    /// Whether placing is currently disallowed.
    pub fn on_cooldown(&self) -> bool {
        !matches!(self.phase(), CooldownPhase::Idle)
    }

    /// Deadline of the current window, if one is known.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        match self.phase() {
            CooldownPhase::Active { ends_at } => Some(ends_at),
            _ => None,
        }
    }

    /// Drive the state machine from a server-provided end date.
    ///
    /// `None` means an indefinite cooldown. Any armed timer is cleared
    /// first; a future deadline arms exactly one new timer whose expiry
    /// emits [`SyncEvent::CooldownEnded`]. Every branch, including the
    /// no-op `Idle` one, emits [`SyncEvent::CooldownChanged`].
    pub fn set_cooldown(&mut self, ends_at: Option<DateTime<Utc>>) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let now = Utc::now();
        self.phase = match ends_at {
            None => CooldownPhase::Indefinite,
            Some(end) if end <= now => CooldownPhase::Idle,
            Some(end) => {
                let remaining = (end - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                let events = self.events.clone();
                self.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(remaining).await;
                    emit(&events, SyncEvent::CooldownEnded);
                }));
                CooldownPhase::Active { ends_at: end }
            }
        };

        emit(
            &self.events,
            SyncEvent::CooldownChanged {
                ends_at,
                on_cooldown: self.on_cooldown(),
            },
        );
    }

    #[cfg(test)]
    fn timer_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for CooldownTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tokio::sync::mpsc;

    fn timer() -> (CooldownTimer, super::super::event::EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CooldownTimer::new(tx), rx)
    }

    #[tokio::test]
    async fn test_indefinite() {
        let (mut cooldown, mut events) = timer();
        cooldown.set_cooldown(None);

        assert_eq!(cooldown.phase(), CooldownPhase::Indefinite);
        assert!(cooldown.on_cooldown());
        assert!(!cooldown.timer_armed());
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::CooldownChanged {
                ends_at: None,
                on_cooldown: true
            }
        );
    }

    #[tokio::test]
    async fn test_past_deadline_is_idle() {
        let (mut cooldown, mut events) = timer();
        let past = Utc::now() - ChronoDuration::seconds(1);
        cooldown.set_cooldown(Some(past));

        assert_eq!(cooldown.phase(), CooldownPhase::Idle);
        assert!(!cooldown.on_cooldown());
        assert!(!cooldown.timer_armed());
        // The changed notification fires even on the idle branch.
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::CooldownChanged {
                ends_at: Some(past),
                on_cooldown: false
            }
        );
    }

    // Real time here: the phase check compares wall-clock deadlines, which
    // a paused tokio clock would not advance.
    #[tokio::test]
    async fn test_future_deadline_arms_one_timer() {
        let (mut cooldown, mut events) = timer();
        let end = Utc::now() + ChronoDuration::milliseconds(500);
        cooldown.set_cooldown(Some(end));

        assert!(cooldown.on_cooldown());
        assert!(matches!(cooldown.phase(), CooldownPhase::Active { .. }));
        assert!(matches!(
            events.try_recv().unwrap(),
            SyncEvent::CooldownChanged {
                on_cooldown: true,
                ..
            }
        ));

        // Nothing fires before the deadline.
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        assert!(events.try_recv().is_err());

        // Exactly one expiry notification at the deadline.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(events.try_recv().unwrap(), SyncEvent::CooldownEnded);
        assert!(events.try_recv().is_err());
        assert!(!cooldown.on_cooldown());
        assert_eq!(cooldown.phase(), CooldownPhase::Idle);
    }

    #[tokio::test]
    async fn test_rearm_clears_previous_timer() {
        let (mut cooldown, mut events) = timer();
        cooldown.set_cooldown(Some(Utc::now() + ChronoDuration::milliseconds(100)));
        cooldown.set_cooldown(Some(Utc::now() + ChronoDuration::milliseconds(800)));

        // Two changed notifications, then silence past the first deadline.
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_ok());
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        tokio::task::yield_now().await;
        assert!(events.try_recv().is_err());
        assert!(cooldown.on_cooldown());

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert_eq!(events.try_recv().unwrap(), SyncEvent::CooldownEnded);
    }

    #[tokio::test]
    async fn test_indefinite_then_release() {
        let (mut cooldown, _events) = timer();
        cooldown.set_cooldown(None);
        assert!(cooldown.on_cooldown());

        cooldown.set_cooldown(Some(Utc::now() - ChronoDuration::seconds(5)));
        assert!(!cooldown.on_cooldown());
    }
}
