use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tanklevel_core::link::{LinkCfg, LinkState, LinkSupervisor, STATUS_ONLINE};
use tanklevel_traits::clock::MonotonicClock;
use tanklevel_traits::clock::test_clock::TestClock;
use tanklevel_traits::{NetworkLink, SessionOpts};

#[derive(Default)]
struct LinkInner {
    accept_link: bool,
    accept_session: bool,
    link_up: bool,
    session_alive: bool,
    events: Vec<String>,
    published: Vec<(String, Vec<u8>, bool)>,
}

/// Transport double with a shared handle so tests can inspect it after the
/// supervisor takes ownership of a clone.
#[derive(Clone)]
struct FakeLink(Rc<RefCell<LinkInner>>);

impl FakeLink {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(LinkInner {
            accept_link: true,
            accept_session: true,
            ..LinkInner::default()
        })))
    }
    fn refuse_link(&self) {
        self.0.borrow_mut().accept_link = false;
    }
    fn allow_link(&self) {
        self.0.borrow_mut().accept_link = true;
    }
    fn refuse_session(&self) {
        self.0.borrow_mut().accept_session = false;
    }
    fn drop_session(&self) {
        self.0.borrow_mut().session_alive = false;
    }
    fn drop_link(&self) {
        let mut i = self.0.borrow_mut();
        i.link_up = false;
        i.session_alive = false;
    }
    fn events(&self) -> Vec<String> {
        self.0.borrow().events.clone()
    }
    fn published(&self) -> Vec<(String, Vec<u8>, bool)> {
        self.0.borrow().published.clone()
    }
}

impl NetworkLink for FakeLink {
    fn establish_link(&mut self, _timeout: Duration) -> bool {
        let mut i = self.0.borrow_mut();
        i.events.push("link".into());
        if i.accept_link {
            i.link_up = true;
        }
        i.accept_link
    }
    fn establish_session(&mut self, opts: &SessionOpts<'_>) -> bool {
        let mut i = self.0.borrow_mut();
        i.events.push(format!("session:{}", opts.client_id));
        if i.link_up && i.accept_session {
            i.session_alive = true;
            true
        } else {
            false
        }
    }
    fn is_link_up(&self) -> bool {
        self.0.borrow().link_up
    }
    fn is_session_alive(&self) -> bool {
        self.0.borrow().session_alive
    }
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        let mut i = self.0.borrow_mut();
        if !i.session_alive {
            return false;
        }
        i.published.push((topic.to_owned(), payload.to_vec(), retain));
        true
    }
    fn poll(&mut self) {}
    fn link_quality(&self) -> i32 {
        -61
    }
}

fn link_cfg(reconnect_delay_ms: u64) -> LinkCfg {
    LinkCfg {
        link_timeout_ms: 100,
        reconnect_delay_ms,
        client_id: "tank-node-1".into(),
        username: "tank".into(),
        password: "secret".into(),
        topic: "tank/level".into(),
    }
}

fn supervisor(link: FakeLink) -> LinkSupervisor<FakeLink> {
    LinkSupervisor::new(link, link_cfg(0), Arc::new(MonotonicClock::new()))
}

#[test]
fn connect_passes_through_link_up_before_session_up() {
    let link = FakeLink::new();
    let mut sup = supervisor(link.clone());
    assert_eq!(sup.state(), LinkState::Disconnected);

    sup.connect().expect("connect");
    assert_eq!(sup.state(), LinkState::SessionUp);
    assert_eq!(link.events(), ["link", "session:tank-node-1"]);
}

#[test]
fn online_announcement_is_retained_on_the_status_topic() {
    let link = FakeLink::new();
    let mut sup = supervisor(link.clone());
    sup.connect().expect("connect");

    let published = link.published();
    assert_eq!(published.len(), 1);
    let (topic, payload, retain) = &published[0];
    assert_eq!(topic, "tank/level/status");
    assert_eq!(payload.as_slice(), STATUS_ONLINE);
    assert!(retain);
}

#[test]
fn startup_link_timeout_is_fatal() {
    let link = FakeLink::new();
    link.refuse_link();
    let mut sup = supervisor(link.clone());

    let err = sup.connect().expect_err("must not come up");
    assert!(err.to_string().contains("link establishment"));
    assert_eq!(sup.state(), LinkState::Disconnected);
    assert_eq!(sup.retry_count(), 1);
}

#[test]
fn startup_session_refusal_is_fatal() {
    let link = FakeLink::new();
    link.refuse_session();
    let mut sup = supervisor(link.clone());

    let err = sup.connect().expect_err("must not come up");
    assert!(err.to_string().contains("session establishment"));
    // The link itself did come up; only the session failed.
    assert_eq!(sup.state(), LinkState::LinkUp);
}

#[test]
fn dead_session_is_resumed_with_a_single_session_attempt() {
    let link = FakeLink::new();
    let mut sup = supervisor(link.clone());
    sup.connect().expect("connect");

    // Broker dropped the session, transport association survived.
    link.drop_session();
    assert!(sup.ensure_ready());
    assert_eq!(sup.state(), LinkState::SessionUp);
    // One extra session attempt, no extra link attempt.
    assert_eq!(
        link.events(),
        ["link", "session:tank-node-1", "session:tank-node-1"]
    );
}

#[test]
fn dead_link_means_one_bounded_attempt_per_call() {
    let link = FakeLink::new();
    let mut sup = supervisor(link.clone());
    sup.connect().expect("connect");

    link.drop_link();
    link.refuse_link();
    assert!(!sup.ensure_ready());
    assert!(!sup.ensure_ready());
    assert_eq!(sup.state(), LinkState::Disconnected);
    // connect + exactly one link attempt per failed ensure_ready call
    let link_attempts = link.events().iter().filter(|e| *e == "link").count();
    assert_eq!(link_attempts, 3);

    // Radio recovered: the next call walks all the way back up.
    link.allow_link();
    assert!(sup.ensure_ready());
    assert_eq!(sup.state(), LinkState::SessionUp);
}

#[test]
fn failed_attempts_are_spaced_by_the_reconnect_delay() {
    let clock = TestClock::new();
    let link = FakeLink::new();
    let mut sup = LinkSupervisor::new(link.clone(), link_cfg(5_000), Arc::new(clock.clone()));
    sup.connect().expect("connect");

    link.drop_link();
    link.refuse_link();
    assert!(!sup.ensure_ready());
    let attempts_after_first = link.events().len();

    // Immediately after a failure nothing new is attempted.
    assert!(!sup.ensure_ready());
    assert_eq!(link.events().len(), attempts_after_first);

    // Past the delay window the next call attempts again.
    clock.advance(Duration::from_millis(5_000));
    assert!(!sup.ensure_ready());
    assert_eq!(link.events().len(), attempts_after_first + 1);
}

#[test]
fn ready_session_needs_no_attempt() {
    let link = FakeLink::new();
    let mut sup = supervisor(link.clone());
    sup.connect().expect("connect");
    let before = link.events().len();

    assert!(sup.ensure_ready());
    assert_eq!(link.events().len(), before);
}
