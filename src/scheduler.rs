// =============================================================================
// Trading scheduler — wall-clock callbacks for session events
// =============================================================================
//
// Fires auto-flatten a configurable number of minutes before the close,
// the daily digest at the close, and a session-start callback at the open.
// Holiday and early-close calendars come in through `SessionCalendar`.
// Daily fired-flags reset when the ET date rolls over.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::New_York;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::session::{rth_open, SessionCalendar};

/// How often the scheduler polls the clock.
const POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Callbacks fire when now is within this many seconds of the target.
const FIRE_WINDOW_SECS: i64 = 60;

type Callback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct DayFlags {
    date: Option<NaiveDate>,
    flattened: bool,
    digest_sent: bool,
    session_started: bool,
}

pub struct TradingScheduler {
    calendar: SessionCalendar,
    flatten_before_close_minutes: i64,
    flatten_callback: Option<Callback>,
    digest_callback: Option<Callback>,
    session_start_callback: Option<Callback>,
    flags: Arc<Mutex<DayFlags>>,
}

impl TradingScheduler {
    pub fn new(calendar: SessionCalendar, flatten_before_close_minutes: i64) -> Self {
        Self {
            calendar,
            flatten_before_close_minutes,
            flatten_callback: None,
            digest_callback: None,
            session_start_callback: None,
            flags: Arc::new(Mutex::new(DayFlags::default())),
        }
    }

    pub fn on_flatten(&mut self, cb: impl Fn() + Send + Sync + 'static) {
        self.flatten_callback = Some(Box::new(cb));
    }

    pub fn on_digest(&mut self, cb: impl Fn() + Send + Sync + 'static) {
        self.digest_callback = Some(Box::new(cb));
    }

    pub fn on_session_start(&mut self, cb: impl Fn() + Send + Sync + 'static) {
        self.session_start_callback = Some(Box::new(cb));
    }

    /// Spawn the polling loop on the current runtime.
    pub fn start(self) -> JoinHandle<()> {
        info!(
            flatten_before_close_minutes = self.flatten_before_close_minutes,
            "trading scheduler started"
        );
        tokio::spawn(async move {
            loop {
                self.tick(Utc::now());
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
    }

    /// One scheduling decision at `now`. Public so tests can drive the
    /// clock directly.
    pub fn tick(&self, now: DateTime<Utc>) {
        let today = now.with_timezone(&New_York).date_naive();
        {
            let mut flags = self.flags.lock();
            if flags.date != Some(today) {
                debug!(date = %today, "scheduler day rollover");
                *flags = DayFlags {
                    date: Some(today),
                    ..DayFlags::default()
                };
            }
        }

        if !self.calendar.is_trading_day(now) {
            return;
        }

        let open_at = self.calendar.today_at(now, rth_open());
        let close_at = self.calendar.today_at(now, self.calendar.close_time(now));
        let flatten_at = close_at - chrono::Duration::minutes(self.flatten_before_close_minutes);

        if self.due(now, open_at) && !self.flags.lock().session_started {
            self.flags.lock().session_started = true;
            info!("session start fired");
            if let Some(cb) = &self.session_start_callback {
                cb();
            }
        }

        if self.due(now, flatten_at) && !self.flags.lock().flattened {
            self.flags.lock().flattened = true;
            info!("auto-flatten fired");
            if let Some(cb) = &self.flatten_callback {
                cb();
            }
        }

        if self.due(now, close_at) && !self.flags.lock().digest_sent {
            self.flags.lock().digest_sent = true;
            info!("daily digest fired");
            if let Some(cb) = &self.digest_callback {
                cb();
            }
        }
    }

    fn due(&self, now: DateTime<Utc>, target: DateTime<Utc>) -> bool {
        (now - target).num_seconds().abs() < FIRE_WINDOW_SECS
    }
}
