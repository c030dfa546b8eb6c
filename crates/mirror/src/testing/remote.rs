//! In-memory remote CRM service.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use sync_core::{
    DeletedPage, ListQuery, OutgoingRecord, RecordPage, RemoteClient, RemoteRecord, SaveResult,
};

type Fields = Map<String, Value>;

#[derive(Debug)]
struct FakeState {
    modules: HashMap<String, BTreeMap<String, Fields>>,
    deleted: HashMap<String, Vec<(String, DateTime<Utc>)>>,
    clock: DateTime<Utc>,
    last_id: u64,
    list_calls: Vec<(String, ListQuery)>,
    failing_pages: Vec<(String, u32)>,
    rejections: Vec<(String, Value)>,
    merge_next_insert: Option<String>,
    saved: Vec<(String, Vec<OutgoingRecord>)>,
    delete_calls: Vec<(String, String)>,
    failing_deletes: HashSet<String>,
}

impl FakeState {
    /// Advance the clock by a minute and return the new time.
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::minutes(1);
        self.clock
    }
}

fn timestamp(t: DateTime<Utc>) -> Value {
    Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, false))
}

fn paginate<T: Clone>(items: &[T], page: u32, page_size: u32) -> (Vec<T>, bool) {
    let size = page_size.max(1) as usize;
    let start = (page.max(1) as usize - 1) * size;
    let end = (start + size).min(items.len());
    if start >= items.len() {
        return (Vec::new(), false);
    }
    (items[start..end].to_vec(), end < items.len())
}

/// In-memory [`RemoteClient`].
///
/// Every write stamps the record's modification key with a clock that
/// advances one minute per write, starting at 2024-01-01T00:00:00Z.
/// Listings filter on that key (`>= modified_since`) and sort by it.
#[derive(Debug)]
pub struct FakeRemote {
    modified_key: String,
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new(modified_key: impl Into<String>) -> Self {
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
        Self {
            modified_key: modified_key.into(),
            state: Mutex::new(FakeState {
                modules: HashMap::new(),
                deleted: HashMap::new(),
                clock: epoch,
                last_id: 0,
                list_calls: Vec::new(),
                failing_pages: Vec::new(),
                rejections: Vec::new(),
                merge_next_insert: None,
                saved: Vec::new(),
                delete_calls: Vec::new(),
                failing_deletes: HashSet::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modified_of(&self, fields: &Fields) -> Option<DateTime<Utc>> {
        let raw = fields.get(&self.modified_key)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    // ------------------------------------------------------------------
    // Remote-side changes
    // ------------------------------------------------------------------

    /// Create or replace a record as if edited in the CRM.
    ///
    /// The modification key is stamped unless `fields` already carries it.
    pub fn put_record(&self, module: &str, id: &str, fields: Value) {
        let mut fields = match fields {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        let mut state = self.state();
        if !fields.contains_key(&self.modified_key) {
            let now = state.tick();
            fields.insert(self.modified_key.clone(), timestamp(now));
        }
        state
            .modules
            .entry(module.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// Delete a record as if deleted in the CRM; it shows up in the
    /// deleted-id listing.
    pub fn remove_record(&self, module: &str, id: &str) {
        let mut state = self.state();
        let now = state.tick();
        if let Some(records) = state.modules.get_mut(module) {
            records.remove(id);
        }
        state
            .deleted
            .entry(module.to_string())
            .or_default()
            .push((id.to_string(), now));
    }

    pub fn record(&self, module: &str, id: &str) -> Option<Fields> {
        self.state().modules.get(module)?.get(id).cloned()
    }

    pub fn record_count(&self, module: &str) -> usize {
        self.state().modules.get(module).map_or(0, BTreeMap::len)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.state().clock
    }

    // ------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------

    /// Fail the next listing of `page` of a module.
    pub fn fail_list_page(&self, module: &str, page: u32) {
        self.state().failing_pages.push((module.to_string(), page));
    }

    /// Reject every saved record whose `key` equals `value`.
    pub fn reject_when(&self, key: &str, value: Value) {
        self.state().rejections.push((key.to_string(), value));
    }

    /// Answer the next insert with an existing id, as a duplicate check
    /// merging the new record into an old one would.
    pub fn merge_next_insert_into(&self, id: &str) {
        self.state().merge_next_insert = Some(id.to_string());
    }

    /// Fail deletes of a record id.
    pub fn fail_delete_of(&self, id: &str) {
        self.state().failing_deletes.insert(id.to_string());
    }

    // ------------------------------------------------------------------
    // Call log
    // ------------------------------------------------------------------

    pub fn list_calls(&self) -> Vec<(String, ListQuery)> {
        self.state().list_calls.clone()
    }

    pub fn saved_batches(&self) -> Vec<(String, Vec<OutgoingRecord>)> {
        self.state().saved.clone()
    }

    pub fn delete_calls(&self) -> Vec<(String, String)> {
        self.state().delete_calls.clone()
    }

    fn save_one(&self, state: &mut FakeState, module: &str, record: OutgoingRecord) -> SaveResult {
        if let Some((key, _)) = state
            .rejections
            .iter()
            .find(|(key, value)| record.fields.get(key) == Some(value))
        {
            return SaveResult::Failure {
                message: format!("INVALID_DATA: rejected value for {key}"),
            };
        }

        let id = match record.id {
            Some(id) => {
                let exists = state
                    .modules
                    .get(module)
                    .is_some_and(|records| records.contains_key(&id));
                if !exists {
                    return SaveResult::Failure {
                        message: format!("INVALID_DATA: record {id} not found"),
                    };
                }
                id
            }
            None => match state.merge_next_insert.take() {
                Some(id) => id,
                None => {
                    state.last_id += 1;
                    format!("{}", 5_000_000 + state.last_id)
                }
            },
        };

        let now = state.tick();
        let stored = state
            .modules
            .entry(module.to_string())
            .or_default()
            .entry(id.clone())
            .or_default();
        stored.extend(record.fields);
        stored.insert(self.modified_key.clone(), timestamp(now));

        SaveResult::Success { id }
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn list_records(&self, module: &str, query: &ListQuery) -> Result<RecordPage> {
        let mut state = self.state();
        state.list_calls.push((module.to_string(), query.clone()));

        if let Some(pos) = state
            .failing_pages
            .iter()
            .position(|(m, page)| m == module && *page == query.page)
        {
            state.failing_pages.remove(pos);
            bail!("Injected failure listing page {} of {module}", query.page);
        }

        let mut matching: Vec<(Option<DateTime<Utc>>, RemoteRecord)> = state
            .modules
            .get(module)
            .into_iter()
            .flatten()
            .map(|(id, fields)| {
                (
                    self.modified_of(fields),
                    RemoteRecord {
                        id: id.clone(),
                        fields: fields.clone(),
                    },
                )
            })
            .filter(|(modified, _)| match query.modified_since {
                Some(since) => modified.is_some_and(|m| m >= since),
                None => true,
            })
            .collect();
        matching.sort_by(|a, b| (a.0, &a.1.id).cmp(&(b.0, &b.1.id)));

        let records: Vec<RemoteRecord> = matching.into_iter().map(|(_, r)| r).collect();
        let (records, more_records) = paginate(&records, query.page, query.page_size);
        Ok(RecordPage {
            records,
            more_records,
        })
    }

    async fn list_deleted_ids(
        &self,
        module: &str,
        modified_since: Option<DateTime<Utc>>,
        page: u32,
        page_size: u32,
    ) -> Result<DeletedPage> {
        let state = self.state();
        let ids: Vec<String> = state
            .deleted
            .get(module)
            .into_iter()
            .flatten()
            .filter(|(_, at)| modified_since.map_or(true, |since| *at >= since))
            .map(|(id, _)| id.clone())
            .collect();
        let (ids, more_records) = paginate(&ids, page, page_size);
        Ok(DeletedPage { ids, more_records })
    }

    async fn save_records(
        &self,
        module: &str,
        records: Vec<OutgoingRecord>,
    ) -> Result<Vec<SaveResult>> {
        let mut state = self.state();
        state.saved.push((module.to_string(), records.clone()));
        Ok(records
            .into_iter()
            .map(|record| self.save_one(&mut state, module, record))
            .collect())
    }

    async fn delete_record(&self, module: &str, id: &str) -> Result<()> {
        let mut state = self.state();
        state
            .delete_calls
            .push((module.to_string(), id.to_string()));
        if state.failing_deletes.contains(id) {
            bail!("Injected failure deleting {module} record {id}");
        }
        let now = state.tick();
        if let Some(records) = state.modules.get_mut(module) {
            records.remove(id);
        }
        state
            .deleted
            .entry(module.to_string())
            .or_default()
            .push((id.to_string(), now));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_core::SortOrder;

    fn query(page: u32, page_size: u32, since: Option<DateTime<Utc>>) -> ListQuery {
        ListQuery {
            sort_by: "Modified_Time".to_string(),
            order: SortOrder::Asc,
            modified_since: since,
            page,
            page_size,
        }
    }

    #[tokio::test]
    async fn test_listing_pages_in_modification_order() {
        let remote = FakeRemote::new("Modified_Time");
        remote.put_record("Leads", "b", json!({"Last_Name": "B"}));
        remote.put_record("Leads", "a", json!({"Last_Name": "A"}));
        remote.put_record("Leads", "c", json!({"Last_Name": "C"}));

        let first = remote.list_records("Leads", &query(1, 2, None)).await.unwrap();
        let ids: Vec<_> = first.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert!(first.more_records);

        let second = remote.list_records("Leads", &query(2, 2, None)).await.unwrap();
        assert_eq!(second.records.len(), 1);
        assert!(!second.more_records);
    }

    #[tokio::test]
    async fn test_listing_filters_on_modified_since() {
        let remote = FakeRemote::new("Modified_Time");
        remote.put_record("Leads", "old", json!({}));
        let cutoff = remote.now();
        remote.put_record("Leads", "new", json!({}));

        let page = remote
            .list_records("Leads", &query(1, 10, Some(cutoff + Duration::seconds(1))))
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "new");
    }

    #[tokio::test]
    async fn test_injected_page_failure_is_one_shot() {
        let remote = FakeRemote::new("Modified_Time");
        remote.fail_list_page("Leads", 1);
        assert!(remote.list_records("Leads", &query(1, 10, None)).await.is_err());
        assert!(remote.list_records("Leads", &query(1, 10, None)).await.is_ok());
    }

    #[tokio::test]
    async fn test_save_assigns_ids_and_rejects() {
        let remote = FakeRemote::new("Modified_Time");
        remote.reject_when("Last_Name", json!("bad"));

        let mut ok = Map::new();
        ok.insert("Last_Name".to_string(), json!("good"));
        let mut bad = Map::new();
        bad.insert("Last_Name".to_string(), json!("bad"));

        let results = remote
            .save_records(
                "Leads",
                vec![
                    OutgoingRecord { id: None, fields: ok },
                    OutgoingRecord { id: None, fields: bad },
                ],
            )
            .await
            .unwrap();

        let SaveResult::Success { id } = &results[0] else {
            panic!("expected success, got {:?}", results[0]);
        };
        assert!(remote.record("Leads", id).is_some());
        assert!(matches!(results[1], SaveResult::Failure { .. }));
        assert_eq!(remote.record_count("Leads"), 1);
    }
}
