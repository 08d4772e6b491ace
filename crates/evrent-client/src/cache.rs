//! Keyed, TTL-based cache of read results.
//!
//! Each [`QueryKey`] owns at most one entry. An entry is either a fetch in
//! flight, shared by every reader that asks for the key meanwhile, or a
//! settled value with the instant it was fetched. Settled values are served
//! until they go stale or are invalidated; entries nobody observes are
//! dropped after an inactivity window.
//!
//! Invalidating a key whose fetch is still in flight marks that fetch
//! superseded. Its result is then never served: the next reader starts a
//! fresh fetch that first waits for the superseded one, so a key still has a
//! single request on the wire at any time.

use std::{
  any::Any,
  collections::{BTreeMap, HashMap},
  fmt,
  future::Future,
  sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use futures::{
  FutureExt as _,
  future::{BoxFuture, Shared},
};
use tokio::time::Instant;

use crate::{
  Error, Result,
  retry::{self, RetryPolicy},
};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Identity of one cached read: a resource family, optional scope segments
/// (`["user", "<id>"]`), and the request parameters.
///
/// Two keys built from the same parts compare equal regardless of the order
/// the parameters were added in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  family: String,
  scope:  Vec<String>,
  params: BTreeMap<String, String>,
}

impl QueryKey {
  pub fn new(family: impl Into<String>) -> Self {
    Self {
      family: family.into(),
      scope:  Vec::new(),
      params: BTreeMap::new(),
    }
  }

  /// Append a scope segment.
  pub fn scope(mut self, segment: impl fmt::Display) -> Self {
    self.scope.push(segment.to_string());
    self
  }

  /// Set a parameter.
  pub fn param(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
    self.params.insert(name.into(), value.to_string());
    self
  }

  pub fn family(&self) -> &str { &self.family }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.family)?;
    for segment in &self.scope {
      write!(f, "/{segment}")?;
    }
    for (i, (name, value)) in self.params.iter().enumerate() {
      let sep = if i == 0 { '?' } else { '&' };
      write!(f, "{sep}{name}={value}")?;
    }
    Ok(())
  }
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// Per-read cache behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
  /// How long a settled value is served without refetching.
  pub stale_after:          Duration,
  /// How long an entry without subscribers survives after its last use.
  pub evict_after:          Duration,
  /// Invalidate on [`CacheEvent::Focus`].
  pub refetch_on_focus:     bool,
  /// Invalidate on [`CacheEvent::Reconnect`].
  pub refetch_on_reconnect: bool,
  /// Invalidate whenever a new subscriber attaches.
  pub refetch_on_mount:     bool,
  pub retry:                RetryPolicy,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      stale_after:          Duration::from_secs(5 * 60),
      evict_after:          Duration::from_secs(10 * 60),
      refetch_on_focus:     false,
      refetch_on_reconnect: false,
      refetch_on_mount:     false,
      retry:                RetryPolicy::queries(),
    }
  }
}

/// Freshness of a settled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
  Fresh,
  Stale,
  Invalid,
}

/// Environment signals that may invalidate entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
  /// The consumer regained focus.
  Focus,
  /// Network connectivity came back.
  Reconnect,
}

// ─── Entries ─────────────────────────────────────────────────────────────────

type Erased = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<Erased>>>;

enum Slot {
  Fetching {
    fetch_id:   u64,
    fetch:      SharedFetch,
    superseded: bool,
  },
  Settled {
    data:       Erased,
    fetched_at: Instant,
    invalid:    bool,
  },
}

struct Entry {
  slot:      Slot,
  options:   QueryOptions,
  last_used: Instant,
}

impl Entry {
  fn invalidate(&mut self) {
    match &mut self.slot {
      Slot::Fetching { superseded, .. } => *superseded = true,
      Slot::Settled { invalid, .. } => *invalid = true,
    }
  }
}

#[derive(Default)]
struct State {
  entries:     HashMap<QueryKey, Entry>,
  subscribers: HashMap<QueryKey, usize>,
}

impl State {
  /// Drop settled entries nobody subscribes to and nobody read within their
  /// eviction window.
  fn sweep(&mut self, now: Instant) {
    let subscribers = &self.subscribers;
    self.entries.retain(|key, entry| {
      let idle = now.saturating_duration_since(entry.last_used);
      let watched = subscribers.get(key).is_some_and(|n| *n > 0);
      let fetching = matches!(entry.slot, Slot::Fetching { .. });
      let keep = watched || fetching || idle < entry.options.evict_after;
      if !keep {
        tracing::trace!(%key, "evicting idle cache entry");
      }
      keep
    });
  }
}

#[derive(Default)]
struct Inner {
  state:      Mutex<State>,
  next_fetch: AtomicU64,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Record the outcome of fetch `fetch_id` if it is still the key's
  /// current, non-superseded fetch.
  fn settle(&self, key: &QueryKey, fetch_id: u64, result: &Result<Erased>) {
    let mut state = self.lock();
    let Some(entry) = state.entries.get_mut(key) else { return };
    let superseded = match entry.slot {
      Slot::Fetching {
        fetch_id: current,
        superseded,
        ..
      } if current == fetch_id => superseded,
      _ => return,
    };

    match result {
      Ok(data) if !superseded => {
        entry.slot = Slot::Settled {
          data:       Arc::clone(data),
          fetched_at: Instant::now(),
          invalid:    false,
        };
      }
      // Failed or superseded: nothing worth serving.
      _ => {
        state.entries.remove(key);
      }
    }
  }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// The shared query cache. Cloning yields another handle to the same cache.
#[derive(Clone, Default)]
pub struct QueryCache {
  inner: Arc<Inner>,
}

enum Plan {
  Join(SharedFetch),
  Fetch { after: Option<SharedFetch> },
}

impl QueryCache {
  pub fn new() -> Self { Self::default() }

  /// Read `key`, serving a fresh cached value, joining an in-flight fetch,
  /// or starting a new fetch with `fetcher`.
  ///
  /// The fetch runs on its own task, so it completes and populates the cache
  /// even if every reader goes away. Failures are retried per
  /// `options.retry`; the final failure reaches every reader and leaves
  /// nothing cached.
  pub async fn read<T, F, Fut>(&self, key: QueryKey, options: &QueryOptions, fetcher: F) -> Result<T>
  where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let fetch = {
      let mut state = self.inner.lock();
      let now = Instant::now();
      state.sweep(now);

      let plan = match state.entries.get_mut(&key) {
        None => Plan::Fetch { after: None },
        Some(entry) => {
          entry.last_used = now;
          entry.options = options.clone();
          match &entry.slot {
            Slot::Settled {
              data,
              fetched_at,
              invalid: false,
            } if now.saturating_duration_since(*fetched_at) < options.stale_after => {
              if let Ok(value) = Arc::clone(data).downcast::<T>() {
                tracing::debug!(%key, "cache hit");
                return Ok(T::clone(&value));
              }
              Plan::Fetch { after: None }
            }
            Slot::Settled { .. } => Plan::Fetch { after: None },
            Slot::Fetching {
              fetch,
              superseded: false,
              ..
            } => Plan::Join(fetch.clone()),
            Slot::Fetching { fetch, .. } => Plan::Fetch {
              after: Some(fetch.clone()),
            },
          }
        }
      };

      match plan {
        Plan::Join(fetch) => {
          tracing::debug!(%key, "joining in-flight fetch");
          fetch
        }
        Plan::Fetch { after } => self.start_fetch(&mut state, key.clone(), options, after, fetcher),
      }
    };

    let data = fetch.await?;
    data
      .downcast::<T>()
      .map(|value| T::clone(&value))
      .map_err(|_| Error::Decode(format!("cached value for {key} has an unexpected type")))
  }

  fn start_fetch<T, F, Fut>(
    &self,
    state: &mut State,
    key: QueryKey,
    options: &QueryOptions,
    after: Option<SharedFetch>,
    fetcher: F,
  ) -> SharedFetch
  where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let fetch_id = self.inner.next_fetch.fetch_add(1, Ordering::Relaxed);
    let policy = options.retry.clone();
    let inner = Arc::clone(&self.inner);
    let task_key = key.clone();
    tracing::debug!(%key, fetch_id, "fetching");

    let task = tokio::spawn(async move {
      if let Some(previous) = after {
        // Only its completion matters; its result is never served.
        let _ = previous.await;
      }
      let label = task_key.to_string();
      let result = retry::run(&policy, &label, fetcher)
        .await
        .map(|value| Arc::new(value) as Erased);
      if let Err(e) = &result {
        tracing::warn!(key = %label, error = %e, "fetch failed");
      }
      inner.settle(&task_key, fetch_id, &result);
      result
    });

    let fetch = async move {
      task
        .await
        .unwrap_or_else(|e| Err(Error::Cancelled(format!("fetch task ended abnormally: {e}"))))
    }
    .boxed()
    .shared();

    state.entries.insert(key, Entry {
      slot:      Slot::Fetching {
        fetch_id,
        fetch: fetch.clone(),
        superseded: false,
      },
      options:   options.clone(),
      last_used: Instant::now(),
    });
    fetch
  }

  /// Run a mutation with `policy`, then invalidate every family in
  /// `families`. Nothing is invalidated when the mutation fails.
  pub async fn mutate<T, F, Fut>(&self, families: &[&str], policy: &RetryPolicy, op: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let label = families.join(",");
    let value = retry::run(policy, &label, op).await?;
    for family in families {
      self.invalidate_family(family);
    }
    Ok(value)
  }

  // ─── Invalidation ──────────────────────────────────────────────────────────

  /// Invalidate one key. Returns whether an entry existed.
  pub fn invalidate(&self, key: &QueryKey) -> bool {
    match self.inner.lock().entries.get_mut(key) {
      Some(entry) => {
        entry.invalidate();
        true
      }
      None => false,
    }
  }

  /// Invalidate every key of `family`. Returns how many entries were hit.
  pub fn invalidate_family(&self, family: &str) -> usize {
    let mut state = self.inner.lock();
    let mut hit = 0;
    for entry in state
      .entries
      .iter_mut()
      .filter(|(key, _)| key.family == family)
      .map(|(_, entry)| entry)
    {
      entry.invalidate();
      hit += 1;
    }
    if hit > 0 {
      tracing::debug!(%family, entries = hit, "invalidated");
    }
    hit
  }

  /// Apply an environment signal to every entry that opted into it.
  pub fn notify(&self, event: CacheEvent) -> usize {
    let mut state = self.inner.lock();
    let mut hit = 0;
    for entry in state.entries.values_mut() {
      let wants = match event {
        CacheEvent::Focus => entry.options.refetch_on_focus,
        CacheEvent::Reconnect => entry.options.refetch_on_reconnect,
      };
      if wants {
        entry.invalidate();
        hit += 1;
      }
    }
    hit
  }

  /// Drop everything, e.g. when the signed-in user changes. Fetches still in
  /// flight complete without populating the cache.
  pub fn clear(&self) {
    let mut state = self.inner.lock();
    state.entries.clear();
  }

  // ─── Observation ───────────────────────────────────────────────────────────

  /// Keep `key` alive while the returned guard exists.
  pub fn subscribe(&self, key: QueryKey) -> Subscription {
    let mut state = self.inner.lock();
    *state.subscribers.entry(key.clone()).or_default() += 1;
    if let Some(entry) = state.entries.get_mut(&key)
      && entry.options.refetch_on_mount
    {
      entry.invalidate();
    }
    Subscription {
      inner: Arc::clone(&self.inner),
      key,
    }
  }

  /// Freshness of a settled entry; `None` when absent or still fetching.
  pub fn state(&self, key: &QueryKey) -> Option<CacheState> {
    let state = self.inner.lock();
    match &state.entries.get(key)?.slot {
      Slot::Fetching { .. } => None,
      Slot::Settled { invalid: true, .. } => Some(CacheState::Invalid),
      Slot::Settled { fetched_at, .. } => {
        let stale_after = state.entries.get(key)?.options.stale_after;
        if fetched_at.elapsed() < stale_after {
          Some(CacheState::Fresh)
        } else {
          Some(CacheState::Stale)
        }
      }
    }
  }

  pub fn is_fetching(&self, key: &QueryKey) -> bool {
    matches!(
      self.inner.lock().entries.get(key).map(|e| &e.slot),
      Some(Slot::Fetching { .. })
    )
  }

  pub fn len(&self) -> usize { self.inner.lock().entries.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Run the eviction sweep now.
  pub fn sweep(&self) { self.inner.lock().sweep(Instant::now()); }
}

impl fmt::Debug for QueryCache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryCache")
      .field("entries", &self.len())
      .finish()
  }
}

/// Interest in a key. The entry is exempt from eviction until every
/// subscription to it is dropped.
pub struct Subscription {
  inner: Arc<Inner>,
  key:   QueryKey,
}

impl Subscription {
  pub fn key(&self) -> &QueryKey { &self.key }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    let mut state = self.inner.lock();
    if let Some(n) = state.subscribers.get_mut(&self.key) {
      *n = n.saturating_sub(1);
      if *n == 0 {
        state.subscribers.remove(&self.key);
        // The inactivity window starts when the last observer leaves.
        if let Some(entry) = state.entries.get_mut(&self.key) {
          entry.last_used = Instant::now();
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  fn counter() -> Arc<AtomicUsize> { Arc::new(AtomicUsize::new(0)) }

  /// A fetcher returning how many times it has been called.
  fn counting(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
  ) -> impl Fn() -> BoxFuture<'static, Result<usize>> + Send + 'static {
    let calls = Arc::clone(calls);
    move || {
      let calls = Arc::clone(&calls);
      async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(delay).await;
        Ok(n)
      }
      .boxed()
    }
  }

  fn key() -> QueryKey { QueryKey::new("depot").param("pageNumber", 1) }

  fn opts() -> QueryOptions {
    QueryOptions {
      retry: RetryPolicy::none(),
      ..QueryOptions::default()
    }
  }

  #[test]
  fn keys_are_order_independent() {
    let a = QueryKey::new("car").param("modelId", "m").param("status", "AVAILABLE");
    let b = QueryKey::new("car").param("status", "AVAILABLE").param("modelId", "m");
    assert_eq!(a, b);
    assert_eq!(a.to_string(), "car?modelId=m&status=AVAILABLE");
    assert_eq!(QueryKey::new("orderBooking").scope("user").scope(7).to_string(), "orderBooking/user/7");
  }

  #[tokio::test(start_paused = true)]
  async fn concurrent_reads_share_one_fetch() {
    let cache = QueryCache::new();
    let calls = counter();

    let (o1, o2, o3) = (opts(), opts(), opts());
    let (a, b, c) = tokio::join!(
      cache.read(key(), &o1, counting(&calls, Duration::from_millis(50))),
      cache.read(key(), &o2, counting(&calls, Duration::from_millis(50))),
      cache.read(key(), &o3, counting(&calls, Duration::from_millis(50))),
    );

    assert_eq!((a, b, c), (Ok(1), Ok(1), Ok(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn fresh_values_are_served_until_stale() {
    let cache = QueryCache::new();
    let calls = counter();

    assert_eq!(cache.read(key(), &opts(), counting(&calls, Duration::ZERO)).await, Ok(1));
    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    assert_eq!(cache.state(&key()), Some(CacheState::Fresh));
    assert_eq!(cache.read(key(), &opts(), counting(&calls, Duration::ZERO)).await, Ok(1));

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(cache.state(&key()), Some(CacheState::Stale));
    assert_eq!(cache.read(key(), &opts(), counting(&calls, Duration::ZERO)).await, Ok(2));
  }

  #[tokio::test(start_paused = true)]
  async fn family_invalidation_forces_refetch() {
    let cache = QueryCache::new();
    let calls = counter();
    let other = QueryKey::new("car");

    cache.read(key(), &opts(), counting(&calls, Duration::ZERO)).await.unwrap();
    cache.read(other.clone(), &opts(), counting(&calls, Duration::ZERO)).await.unwrap();

    assert_eq!(cache.invalidate_family("depot"), 1);
    assert_eq!(cache.state(&key()), Some(CacheState::Invalid));
    assert_eq!(cache.state(&other), Some(CacheState::Fresh));
    assert_eq!(cache.read(key(), &opts(), counting(&calls, Duration::ZERO)).await, Ok(3));
  }

  #[tokio::test(start_paused = true)]
  async fn invalidation_during_fetch_is_not_lost() {
    let cache = QueryCache::new();
    let calls = counter();

    let first = tokio::spawn({
      let cache = cache.clone();
      let f = counting(&calls, Duration::from_millis(100));
      async move { cache.read(key(), &opts(), f).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(cache.is_fetching(&key()));

    cache.invalidate_family("depot");
    let second = cache.read(key(), &opts(), counting(&calls, Duration::from_millis(100))).await;

    // The first reader gets what it asked for; the post-invalidation reader
    // never sees it.
    assert_eq!(first.await.unwrap(), Ok(1));
    assert_eq!(second, Ok(2));
    assert_eq!(cache.read(key(), &opts(), counting(&calls, Duration::ZERO)).await, Ok(2));
  }

  #[tokio::test(start_paused = true)]
  async fn failures_are_retried_then_not_cached() {
    let cache = QueryCache::new();
    let calls = counter();
    let options = QueryOptions::default();

    let c = Arc::clone(&calls);
    let out: Result<u32> = cache
      .read(key(), &options, move || {
        c.fetch_add(1, Ordering::SeqCst);
        async {
          Err(Error::Status {
            status:  503,
            message: "unavailable".into(),
            code:    None,
          })
        }
      })
      .await;

    assert_eq!(out.unwrap_err().status(), Some(503));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(cache.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn mutation_invalidates_only_on_success() {
    let cache = QueryCache::new();
    let calls = counter();
    cache.read(key(), &opts(), counting(&calls, Duration::ZERO)).await.unwrap();

    let failed: Result<()> = cache
      .mutate(&["depot"], &RetryPolicy::mutations(), || async {
        Err(Error::Status {
          status:  403,
          message: "forbidden".into(),
          code:    None,
        })
      })
      .await;
    assert!(failed.is_err());
    assert_eq!(cache.state(&key()), Some(CacheState::Fresh));

    cache
      .mutate(&["depot"], &RetryPolicy::mutations(), || async { Ok(()) })
      .await
      .unwrap();
    assert_eq!(cache.state(&key()), Some(CacheState::Invalid));
  }

  #[tokio::test(start_paused = true)]
  async fn unobserved_entries_are_evicted() {
    let cache = QueryCache::new();
    let calls = counter();
    let watched = QueryKey::new("model");

    cache.read(key(), &opts(), counting(&calls, Duration::ZERO)).await.unwrap();
    cache.read(watched.clone(), &opts(), counting(&calls, Duration::ZERO)).await.unwrap();
    let subscription = cache.subscribe(watched.clone());

    tokio::time::advance(Duration::from_secs(11 * 60)).await;
    cache.sweep();
    assert_eq!(cache.state(&key()), None);
    assert!(cache.state(&watched).is_some());

    drop(subscription);
    tokio::time::advance(Duration::from_secs(11 * 60)).await;
    cache.sweep();
    assert!(cache.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn events_respect_opt_in() {
    let cache = QueryCache::new();
    let calls = counter();
    let focused = QueryKey::new("car");
    let focus_opts = QueryOptions {
      refetch_on_focus: true,
      ..opts()
    };

    cache.read(key(), &opts(), counting(&calls, Duration::ZERO)).await.unwrap();
    cache.read(focused.clone(), &focus_opts, counting(&calls, Duration::ZERO)).await.unwrap();

    assert_eq!(cache.notify(CacheEvent::Reconnect), 0);
    assert_eq!(cache.notify(CacheEvent::Focus), 1);
    assert_eq!(cache.state(&focused), Some(CacheState::Invalid));
    assert_eq!(cache.state(&key()), Some(CacheState::Fresh));
  }
}
