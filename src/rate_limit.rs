use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Spaces outbound generation calls. Successive calls sit at least
/// `interval` apart; a quota rejection pushes the next slot out to
/// `cooldown` instead. The cooldown replaces whatever wait was already
/// pending, it never stacks on top of it.
pub struct Pacer {
    interval: Duration,
    cooldown: Duration,
    next_ready: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration, cooldown: Duration) -> Self {
        Pacer {
            interval,
            cooldown,
            next_ready: None,
        }
    }

    /// Wait until the next call slot opens. The first call never waits.
    pub async fn await_slot(&mut self) {
        if let Some(ready) = self.next_ready {
            let now = Instant::now();
            if ready > now {
                debug!("pacing: waiting {:.1}s", (ready - now).as_secs_f64());
                tokio::time::sleep(ready - now).await;
            }
        }
        self.next_ready = Some(Instant::now() + self.interval);
    }

    /// Push the next slot out to the cooldown horizon after a quota hit.
    pub fn start_cooldown(&mut self) {
        warn!(
            "rate limited: cooling down for {:.0}s",
            self.cooldown.as_secs_f64()
        );
        self.next_ready = Some(Instant::now() + self.cooldown);
    }
}

// ── Tests ──
