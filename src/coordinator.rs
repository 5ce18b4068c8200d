//! Groups the calls of one search into a batch: picks who to call, dials them page by page, and
//! reports how the batch is going.

use crate::config::CallPolicy;
use crate::dnc::DoNotCallRegistry;
use crate::eligibility::is_eligible;
use crate::error::{AppError, CollaboratorError};
use crate::opening_hours::candidate_is_open;
use crate::places::PlaceSearch;
use crate::ranking::{extract_keywords, rank};
use crate::store::{self, DocumentStore, BATCHES, CALLS};
use crate::telephony::CallControl;
use crate::types::{
    Batch, BatchStatus, CallPhase, CallRecord, CallResult, CallStatus, Candidate, Outcome,
    RestaurantRef, SearchQuery, SearchResponse, StatusResponse,
};
use crate::utils::{encode_client_state, KeyedLocks};

use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type Clock = fn() -> OffsetDateTime;

pub struct BatchCoordinator {
    store: Arc<dyn DocumentStore>,
    places: Arc<dyn PlaceSearch>,
    control: Arc<dyn CallControl>,
    dnc: DoNotCallRegistry,
    policy: CallPolicy,
    batch_locks: KeyedLocks,
    call_locks: KeyedLocks,
    clock: Clock,
}

impl BatchCoordinator {
    /// `call_locks` must be the same set the call driver uses, since dialing writes call records
    /// that webhooks may already be updating.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        places: Arc<dyn PlaceSearch>,
        control: Arc<dyn CallControl>,
        dnc: DoNotCallRegistry,
        policy: CallPolicy,
        call_locks: KeyedLocks,
    ) -> Self {
        Self {
            store,
            places,
            control,
            dnc,
            policy,
            batch_locks: KeyedLocks::new(),
            call_locks,
            clock: OffsetDateTime::now_utc,
        }
    }

    /// Replace the clock used for "open right now" checks.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    async fn load_batch(&self, batch_id: Uuid) -> Result<Batch, AppError> {
        store::load::<Batch>(self.store.as_ref(), BATCHES, &batch_id.to_string())
            .await?
            .ok_or(AppError::BatchNotFound(batch_id))
    }

    /// Eligible, callable candidates in the order they should be called.
    async fn resolve_candidates(&self, query: &SearchQuery) -> Result<Vec<Candidate>, AppError> {
        let found = self.places.search(query).await.map_err(|e| {
            warn!(error=%e, "place search failed");
            AppError::NoCandidatesFound
        })?;
        if found.is_empty() {
            return Err(AppError::NoCandidatesFound);
        }
        let total = found.len();

        let mut seen = HashSet::new();
        let mut eligible = Vec::new();
        for candidate in found {
            if !is_eligible(&candidate) || !seen.insert(candidate.place_id.clone()) {
                continue;
            }
            let phone = candidate.phone.as_deref().unwrap_or_default();
            if self.dnc.contains(phone).await? {
                debug!(restaurant=%candidate.name, "skipping do-not-call number");
                continue;
            }
            eligible.push(candidate);
        }
        info!(found = total, eligible = eligible.len(), "resolved candidates");

        let keywords = extract_keywords(query.preferences.as_deref(), &query.cuisines);
        Ok(rank(eligible, &keywords))
    }

    /// Take the next page of callable candidates, moving the cursor past everything examined.
    async fn next_page(&self, batch: &mut Batch) -> Result<Vec<Candidate>, AppError> {
        let now = (self.clock)();
        let mut page = Vec::new();
        while batch.cursor < batch.candidates.len() && page.len() < batch.page_size {
            let candidate = &batch.candidates[batch.cursor];
            batch.cursor += 1;
            if !candidate_is_open(candidate, &batch.query, now) {
                debug!(restaurant=%candidate.name, "closed at requested time");
                continue;
            }
            let phone = candidate.phone.as_deref().unwrap_or_default();
            if self.dnc.contains(phone).await? {
                debug!(restaurant=%candidate.name, "number opted out since search started");
                continue;
            }
            page.push(candidate.clone());
        }
        Ok(page)
    }

    /// Create a call record for each candidate and ask telephony to place the calls.
    /// `first_position` is how many calls the batch had dialed before this page.
    async fn dial_page(
        &self,
        batch_id: Uuid,
        first_position: usize,
        page: &[Candidate],
    ) -> Result<(), AppError> {
        let now = OffsetDateTime::now_utc();
        let mut records = Vec::with_capacity(page.len());
        for (offset, candidate) in page.iter().enumerate() {
            let record = CallRecord::new(
                batch_id,
                first_position + offset,
                RestaurantRef {
                    place_id: candidate.place_id.clone(),
                    name: candidate.name.clone(),
                    phone: candidate.phone.clone().unwrap_or_default(),
                },
                now,
            );
            store::save(self.store.as_ref(), CALLS, &record.id.to_string(), &record).await?;
            records.push(record);
        }

        let placements = records.iter().map(|record| async move {
            let placed = self
                .control
                .dial(&record.restaurant.phone, &encode_client_state(record.id))
                .await;
            self.record_placement(record.id, placed).await
        });
        for result in join_all(placements).await {
            result?;
        }
        Ok(())
    }

    async fn record_placement(
        &self,
        record_id: Uuid,
        placed: Result<String, CollaboratorError>,
    ) -> Result<(), AppError> {
        let id = record_id.to_string();
        let _guard = self.call_locks.lock(&id).await;
        let Some(mut record) = store::load::<CallRecord>(self.store.as_ref(), CALLS, &id).await?
        else {
            return Ok(());
        };
        match placed {
            Ok(call_control_id) => {
                info!(call=%id, restaurant=%record.restaurant.name, "dialed");
                record.call_control_id = Some(call_control_id);
            }
            Err(e) => {
                warn!(call=%id, restaurant=%record.restaurant.name, error=%e, "dial failed");
                if !record.status.is_terminal() {
                    record.status = CallStatus::Failed;
                    record.phase = CallPhase::Closed;
                    record.result = CallResult::new(
                        Outcome::NoReservationLine,
                        "The call could not be placed.",
                    );
                }
            }
        }
        record.updated_at = OffsetDateTime::now_utc();
        store::save(self.store.as_ref(), CALLS, &id, &record).await?;
        Ok(())
    }

    pub async fn start_batch(
        &self,
        query: SearchQuery,
        max_calls: Option<usize>,
    ) -> Result<SearchResponse, AppError> {
        query.validate()?;
        let candidates = self.resolve_candidates(&query).await?;
        if candidates.is_empty() {
            return Err(AppError::NoEligibleCandidates);
        }

        let mut batch = Batch {
            id: Uuid::new_v4(),
            query,
            status: BatchStatus::Calling,
            candidates,
            cursor: 0,
            called_count: 0,
            page_size: self.policy.calls_per_page(max_calls),
            created_at: OffsetDateTime::now_utc(),
        };
        let _guard = self.batch_locks.lock(&batch.id.to_string()).await;
        let page = self.next_page(&mut batch).await?;
        if page.is_empty() {
            return Err(AppError::NoEligibleCandidates);
        }
        batch.called_count = page.len();
        store::save(self.store.as_ref(), BATCHES, &batch.id.to_string(), &batch).await?;
        info!(batch=%batch.id, calls = page.len(), "batch started");

        self.dial_page(batch.id, 0, &page).await?;
        Ok(SearchResponse {
            batch_id: batch.id,
            map_url: self.places.map_url(&page),
            restaurants: page,
            query: batch.query,
        })
    }

    pub async fn continue_batch(&self, batch_id: Uuid) -> Result<SearchResponse, AppError> {
        let _guard = self.batch_locks.lock(&batch_id.to_string()).await;
        let mut batch = self.load_batch(batch_id).await?;
        let page = self.next_page(&mut batch).await?;
        if page.is_empty() {
            // nothing left worth calling, but remember how far we looked
            store::save(self.store.as_ref(), BATCHES, &batch_id.to_string(), &batch).await?;
            return Err(AppError::NoMoreCandidates(batch_id));
        }
        let first_position = batch.called_count;
        batch.called_count += page.len();
        batch.status = BatchStatus::Calling;
        store::save(self.store.as_ref(), BATCHES, &batch_id.to_string(), &batch).await?;
        info!(batch=%batch_id, calls = page.len(), total = batch.called_count, "batch continued");

        self.dial_page(batch_id, first_position, &page).await?;
        Ok(SearchResponse {
            batch_id,
            map_url: self.places.map_url(&page),
            restaurants: page,
            query: batch.query,
        })
    }

    pub async fn get_status(&self, batch_id: Uuid) -> Result<StatusResponse, AppError> {
        let _guard = self.batch_locks.lock(&batch_id.to_string()).await;
        let mut batch = self.load_batch(batch_id).await?;
        let mut items: Vec<CallRecord> =
            store::find(self.store.as_ref(), CALLS, "batch_id", batch_id).await?;
        items.sort_by_key(|r| (r.position, r.created_at));

        let finished = !items.is_empty() && items.iter().all(|r| r.status.is_terminal());
        let status = if finished {
            BatchStatus::Completed
        } else {
            BatchStatus::Calling
        };
        if status != batch.status {
            batch.status = status;
            store::save(self.store.as_ref(), BATCHES, &batch_id.to_string(), &batch).await?;
            info!(batch=%batch_id, ?status, "batch status changed");
        }
        Ok(StatusResponse { status, items })
    }
}
