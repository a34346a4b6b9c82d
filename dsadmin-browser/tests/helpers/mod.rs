//! Test helpers: an in-memory mock directory server
//!
//! Implements the connectivity traits over a HashMap of entries, with
//! configurable per-DN failures, artificial latency and per-DN concurrency
//! accounting (used to verify the serialize-per-node property).

use dsadmin_common::dn::Dn;
use dsadmin_common::entry::SearchEntry;
use dsadmin_common::ldap::{
    AttributeChange, ChangeOp, ConnectionPool, LdapConnection, LdapError, SearchOutcome,
    SearchScope,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Route tracing output through the test harness (call once per test)
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct MockState {
    entries: Mutex<HashMap<Dn, SearchEntry>>,
    fail_dns: Mutex<HashMap<Dn, LdapError>>,
    latency: Mutex<Duration>,
    concurrent: Mutex<HashMap<Dn, usize>>,
    max_concurrent: Mutex<HashMap<Dn, usize>>,
    search_count: AtomicUsize,
}

/// In-memory mock directory
#[derive(Clone, Default)]
pub struct MockDirectory {
    state: Arc<MockState>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool handing out connections into this directory
    pub fn pool(&self) -> Arc<dyn ConnectionPool> {
        Arc::new(MockPool {
            state: self.state.clone(),
        })
    }

    pub fn put(&self, entry: SearchEntry) {
        self.state
            .entries
            .lock()
            .unwrap()
            .insert(entry.dn.clone(), entry);
    }

    /// Make searches based at `dn` fail with `error`
    pub fn fail_search(&self, dn: &Dn, error: LdapError) {
        self.state.fail_dns.lock().unwrap().insert(dn.clone(), error);
    }

    pub fn clear_failures(&self) {
        self.state.fail_dns.lock().unwrap().clear();
    }

    /// Delay every search by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock().unwrap() = latency;
    }

    /// Highest number of concurrent searches observed for `dn`
    pub fn max_concurrent_searches(&self, dn: &Dn) -> usize {
        self.state
            .max_concurrent
            .lock()
            .unwrap()
            .get(dn)
            .copied()
            .unwrap_or(0)
    }

    pub fn search_count(&self) -> usize {
        self.state.search_count.load(Ordering::SeqCst)
    }
}

struct MockPool {
    state: Arc<MockState>,
}

impl ConnectionPool for MockPool {
    fn acquire(&self) -> Result<Box<dyn LdapConnection>, LdapError> {
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
}

impl MockConnection {
    fn enter_search(&self, base: &Dn) {
        let mut concurrent = self.state.concurrent.lock().unwrap();
        let count = concurrent.entry(base.clone()).or_insert(0);
        *count += 1;
        let mut max = self.state.max_concurrent.lock().unwrap();
        let peak = max.entry(base.clone()).or_insert(0);
        if *count > *peak {
            *peak = *count;
        }
    }

    fn leave_search(&self, base: &Dn) {
        let mut concurrent = self.state.concurrent.lock().unwrap();
        if let Some(count) = concurrent.get_mut(base) {
            *count -= 1;
        }
    }
}

/// Minimal filter evaluation: the all-objects filters match everything,
/// `(objectClass=value)` matches entries carrying that object class.
fn filter_matches(filter: &str, entry: &SearchEntry) -> bool {
    let trimmed = filter.trim();
    if trimmed.is_empty()
        || trimmed == dsadmin_common::ldap::ALL_OBJECTS_FILTER
        || trimmed.eq_ignore_ascii_case("(objectclass=*)")
    {
        return true;
    }
    let inner = trimmed.trim_start_matches('(').trim_end_matches(')');
    match inner.split_once('=') {
        Some((attr, value)) if attr.eq_ignore_ascii_case("objectclass") => {
            if value == "*" {
                return true;
            }
            entry
                .object_classes()
                .iter()
                .any(|oc| oc.eq_ignore_ascii_case(value))
        }
        _ => true,
    }
}

impl LdapConnection for MockConnection {
    fn search(
        &mut self,
        base: &Dn,
        scope: SearchScope,
        filter: &str,
        size_limit: usize,
    ) -> Result<SearchOutcome, LdapError> {
        self.state.search_count.fetch_add(1, Ordering::SeqCst);
        self.enter_search(base);

        let latency = *self.state.latency.lock().unwrap();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let result = (|| {
            if let Some(error) = self.state.fail_dns.lock().unwrap().get(base) {
                return Err(error.clone());
            }

            let entries = self.state.entries.lock().unwrap();
            let base_entry = entries
                .get(base)
                .ok_or_else(|| LdapError::NoSuchObject(base.to_string()))?;

            let mut matched: Vec<SearchEntry> = match scope {
                SearchScope::Base => vec![base_entry.clone()],
                SearchScope::OneLevel => entries
                    .values()
                    .filter(|e| e.dn.parent().as_ref() == Some(base))
                    .cloned()
                    .collect(),
                SearchScope::WholeSubtree => entries
                    .values()
                    .filter(|e| e.dn == *base || e.dn.is_descendant_of(base))
                    .cloned()
                    .collect(),
            };
            matched.retain(|e| filter_matches(filter, e));
            matched.sort_by(|a, b| a.dn.cmp(&b.dn));

            let truncated = size_limit > 0 && matched.len() > size_limit;
            if truncated {
                matched.truncate(size_limit);
            }
            Ok(SearchOutcome {
                entries: matched,
                truncated,
            })
        })();

        self.leave_search(base);
        result
    }

    fn modify(&mut self, dn: &Dn, changes: &[AttributeChange]) -> Result<(), LdapError> {
        let mut entries = self.state.entries.lock().unwrap();
        let entry = entries
            .get_mut(dn)
            .ok_or_else(|| LdapError::NoSuchObject(dn.to_string()))?;
        for change in changes {
            let mut values: Vec<String> = entry
                .attr(&change.attribute)
                .map(|v| v.to_vec())
                .unwrap_or_default();
            match change.op {
                ChangeOp::Add => values.extend(change.values.iter().cloned()),
                ChangeOp::Delete => values.retain(|v| !change.values.contains(v)),
                ChangeOp::Replace => values = change.values.clone(),
            }
            entry.set_attr(&change.attribute, values);
        }
        Ok(())
    }

    fn add(&mut self, entry: &SearchEntry) -> Result<(), LdapError> {
        self.state
            .entries
            .lock()
            .unwrap()
            .insert(entry.dn.clone(), entry.clone());
        Ok(())
    }

    fn delete(&mut self, dn: &Dn) -> Result<(), LdapError> {
        self.state
            .entries
            .lock()
            .unwrap()
            .remove(dn)
            .map(|_| ())
            .ok_or_else(|| LdapError::NoSuchObject(dn.to_string()))
    }

    fn is_alive(&self) -> bool {
        true
    }
}

/// An organizationalUnit entry reporting `num_subordinates` children
pub fn ou_entry(dn: &str, num_subordinates: u64) -> SearchEntry {
    SearchEntry::new(Dn::parse(dn).unwrap())
        .with_attr("objectClass", vec!["top", "organizationalUnit"])
        .with_attr("numsubordinates", vec![num_subordinates.to_string()])
}

/// A leaf person entry
pub fn person_entry(dn: &str) -> SearchEntry {
    SearchEntry::new(Dn::parse(dn).unwrap()).with_attr("objectClass", vec!["top", "person"])
}

/// A domain entry usable as a suffix base
pub fn domain_entry(dn: &str) -> SearchEntry {
    SearchEntry::new(Dn::parse(dn).unwrap())
        .with_attr("objectClass", vec!["top", "domain"])
        .with_attr("hassubordinates", vec!["TRUE"])
}
