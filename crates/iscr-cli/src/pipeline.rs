//! Year run orchestration: discover → fetch → extract → classify → persist.
//!
//! Each case advances independently through the manifest state machine.
//! Cases run concurrently up to a fixed limit; work on one `case_id` is
//! serialised by a per-case lock so a case is never classified twice in a run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use iscr_ai::Classifier;
use iscr_core::{CaseStatus, DiscoveredCase, InvalidYear, RunManifest, Stage};
use iscr_extract::Extractor;
use iscr_fetch::{FetchError, Fetcher};
use iscr_store::{CacheLayout, ClassifiedCase, ManifestStore, ResultStore, StoreError};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct RunOptions {
    pub year: i32,
    pub force: bool,
    pub limit: Option<usize>,
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCase {
    pub case_id: String,
    pub stage: Stage,
    pub reason: String,
}

impl FailedCase {
    fn new(case_id: &str, stage: Stage, reason: impl std::fmt::Display) -> Self {
        Self {
            case_id: case_id.to_string(),
            stage,
            reason: reason.to_string(),
        }
    }
}

/// What one run did.
#[derive(Debug, Default)]
pub struct RunReport {
    pub year: i32,
    /// Distinct cases on the year's listing.
    pub discovered: usize,
    /// Cases already terminal before this run started.
    pub skipped: usize,
    pub classified: usize,
    pub failed: Vec<FailedCase>,
    /// Cases left pending because the run was interrupted.
    pub not_started: usize,
    pub interrupted: bool,
}

/// Errors that stop a run before any case is processed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    InvalidYear(InvalidYear),

    #[error("case discovery failed: {0}")]
    Discovery(FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The LLM endpoint refused the API key; no case was marked failed for it.
    #[error("LLM endpoint rejected the API key: {0}")]
    Unauthorized(String),
}

/// A manifest or table write that did not complete.
#[derive(Debug, Error)]
enum PersistError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store writer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Run store I/O on the blocking pool.
async fn off_thread<T: Send + 'static>(
    op: impl FnOnce() -> Result<T, StoreError> + Send + 'static,
) -> Result<T, PersistError> {
    Ok(tokio::task::spawn_blocking(op).await??)
}

enum CaseError {
    Failed(FailedCase),
    Unauthorized(String),
}

impl From<FailedCase> for CaseError {
    fn from(failed: FailedCase) -> Self {
        Self::Failed(failed)
    }
}

enum CaseOutcome {
    Classified,
    Failed(FailedCase),
    /// Stopped at classification because the API key was refused.
    Rejected(String),
    /// Finished by a concurrent dispatch of the same case.
    AlreadyDone,
    Interrupted,
}

/// Shared state of one year run.
struct RunState {
    year: i32,
    manifest: Mutex<RunManifest>,
    total: usize,
    done: AtomicUsize,
}

impl RunState {
    async fn status(&self, case_id: &str) -> Option<CaseStatus> {
        self.manifest.lock().await.status(case_id)
    }

    /// Apply `update` and persist the manifest while still holding the lock, so
    /// saves land in the order updates were made.
    async fn record(
        &self,
        store: &ManifestStore,
        update: impl FnOnce(&mut RunManifest),
    ) -> Result<(), PersistError> {
        let mut manifest = self.manifest.lock().await;
        update(&mut manifest);
        let snapshot = manifest.clone();
        let store = store.clone();
        off_thread(move || store.save(&snapshot)).await
    }

    fn progress(&self, case_id: &str, state: &str) {
        let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        eprintln!("  [{n}/{}] {case_id} -> {state}", self.total);
    }
}

pub struct Orchestrator {
    fetcher: Fetcher,
    extractor: Extractor,
    classifier: Classifier,
    manifests: ManifestStore,
    results: ResultStore,
    case_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        fetcher: Fetcher,
        extractor: Extractor,
        classifier: Classifier,
        layout: CacheLayout,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            classifier,
            manifests: ManifestStore::new(layout.clone()),
            results: ResultStore::new(layout),
            case_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Discover the year's cases and run every outstanding one.
    pub async fn run(
        &self,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let cases = match self.fetcher.discover(opts.year, opts.force).await {
            Ok(cases) => cases,
            Err(FetchError::InvalidYear(e)) => return Err(RunError::InvalidYear(e)),
            Err(e) => return Err(RunError::Discovery(e)),
        };
        eprintln!("  Discovered {} cases for {}", cases.len(), opts.year);
        self.run_cases(opts, cases, cancel).await
    }

    /// Run the given cases. Cases already terminal in the manifest are skipped
    /// unless `opts.force` is set.
    pub async fn run_cases(
        &self,
        opts: &RunOptions,
        cases: Vec<DiscoveredCase>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let year = opts.year;
        let mut manifest = self.manifests.load(year)?;
        if opts.force {
            manifest.reset_all();
        }
        let cases = manifest.merge_discovered(&cases);
        if !opts.force {
            self.reconcile(&mut manifest)?;
        }
        self.manifests.save(&manifest)?;

        let distinct: HashSet<&str> = cases.iter().map(|c| c.case_id.as_str()).collect();
        let skipped = distinct
            .iter()
            .filter(|id| manifest.status(id).is_some_and(|s| s.is_terminal()))
            .count();

        let mut work: Vec<DiscoveredCase> = cases
            .iter()
            .filter(|c| manifest.status(&c.case_id).is_some_and(|s| !s.is_terminal()))
            .cloned()
            .collect();
        if let Some(limit) = opts.limit {
            work.truncate(limit);
        }

        info!(year, discovered = distinct.len(), skipped, queued = work.len(), "starting run");
        let state = RunState {
            year,
            manifest: Mutex::new(manifest),
            total: work.len(),
            done: AtomicUsize::new(0),
        };

        // Cancelled by Ctrl-C through `cancel`, or by a refused API key.
        let halt = cancel.child_token();
        let outcomes: Vec<CaseOutcome> = stream::iter(work)
            .map(|case| self.process_case(&state, case, &halt))
            .buffer_unordered(opts.concurrency.max(1))
            .collect()
            .await;

        let mut report = RunReport {
            year,
            discovered: distinct.len(),
            skipped,
            interrupted: cancel.is_cancelled(),
            ..RunReport::default()
        };
        let mut rejected = None;
        for outcome in outcomes {
            match outcome {
                CaseOutcome::Classified => report.classified += 1,
                CaseOutcome::Failed(failed) => report.failed.push(failed),
                CaseOutcome::Rejected(detail) => rejected = Some(detail),
                CaseOutcome::AlreadyDone => {}
                CaseOutcome::Interrupted => report.not_started += 1,
            }
        }
        if let Some(detail) = rejected {
            return Err(RunError::Unauthorized(detail));
        }
        report.failed.sort_by(|a, b| a.case_id.cmp(&b.case_id));
        Ok(report)
    }

    /// Bring the manifest in line with the result table: a stored row means
    /// the case is done, a `classified` case without a row must run again.
    fn reconcile(&self, manifest: &mut RunManifest) -> Result<(), StoreError> {
        let stored: HashSet<String> = self
            .results
            .load(manifest.year)?
            .into_iter()
            .map(|c| c.result.case_id)
            .collect();

        let changes: Vec<(String, CaseStatus)> = manifest
            .entries()
            .iter()
            .filter_map(|e| match (e.status, stored.contains(&e.case_id)) {
                (CaseStatus::Classified, false) => Some((e.case_id.clone(), CaseStatus::Pending)),
                (s, true) if !s.is_terminal() => Some((e.case_id.clone(), CaseStatus::Classified)),
                _ => None,
            })
            .collect();
        for (case_id, status) in changes {
            manifest.advance(&case_id, status);
        }
        Ok(())
    }

    async fn case_lock(&self, case_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.case_locks.lock().await;
        Arc::clone(locks.entry(case_id.to_string()).or_default())
    }

    async fn process_case(
        &self,
        state: &RunState,
        case: DiscoveredCase,
        cancel: &CancellationToken,
    ) -> CaseOutcome {
        if cancel.is_cancelled() {
            return CaseOutcome::Interrupted;
        }
        let lock = self.case_lock(&case.case_id).await;
        let _guard = lock.lock().await;

        if state
            .status(&case.case_id)
            .await
            .is_some_and(|s| s.is_terminal())
        {
            return CaseOutcome::AlreadyDone;
        }
        if cancel.is_cancelled() {
            return CaseOutcome::Interrupted;
        }

        match self.advance(state, &case).await {
            Ok(()) => {
                state.progress(&case.case_id, CaseStatus::Classified.as_str());
                CaseOutcome::Classified
            }
            Err(CaseError::Unauthorized(detail)) => {
                error!(case_id = %case.case_id, error = %detail, "API key rejected, stopping run");
                cancel.cancel();
                CaseOutcome::Rejected(detail)
            }
            Err(CaseError::Failed(failed)) => {
                warn!(
                    case_id = %failed.case_id,
                    stage = %failed.stage,
                    reason = %failed.reason,
                    "case failed"
                );
                let recorded = state
                    .record(&self.manifests, |m| {
                        m.fail(&failed.case_id, failed.stage, failed.reason.clone());
                    })
                    .await;
                if let Err(e) = recorded {
                    warn!(case_id = %failed.case_id, error = %e, "could not record failure");
                }
                state.progress(&case.case_id, CaseStatus::Failed.as_str());
                CaseOutcome::Failed(failed)
            }
        }
    }

    /// Walk one case from wherever it is to `classified`.
    async fn advance(&self, state: &RunState, case: &DiscoveredCase) -> Result<(), CaseError> {
        let id = case.case_id.as_str();
        let persist = |e: PersistError| FailedCase::new(id, Stage::Persist, e);

        let record = self
            .fetcher
            .fetch(state.year, case)
            .await
            .map_err(|e| FailedCase::new(id, Stage::Fetch, e))?;
        state
            .record(&self.manifests, |m| {
                m.advance(id, CaseStatus::Fetched);
            })
            .await
            .map_err(persist)?;

        self.extractor
            .extract(&record)
            .await
            .map_err(|e| FailedCase::new(id, Stage::Extract, e))?;
        state
            .record(&self.manifests, |m| {
                m.advance(id, CaseStatus::Extracted);
            })
            .await
            .map_err(persist)?;

        let text = self
            .extractor
            .read_text(&record)
            .await
            .map_err(|e| FailedCase::new(id, Stage::Extract, e))?;
        let result = self
            .classifier
            .classify(id, &text)
            .await
            .map_err(|e| {
                if e.is_auth_failure() {
                    CaseError::Unauthorized(e.to_string())
                } else {
                    FailedCase::new(id, Stage::Classify, e).into()
                }
            })?;

        let results = self.results.clone();
        let year = state.year;
        let row = ClassifiedCase {
            result,
            source_url: case.source_url.clone(),
        };
        off_thread(move || results.upsert(year, row))
            .await
            .map_err(persist)?;
        state
            .record(&self.manifests, |m| {
                m.advance(id, CaseStatus::Classified);
            })
            .await
            .map_err(persist)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use iscr_ai::{ClassificationError, ClassifierConfig, Completion, LanguageModel, Message, Taxonomy};
    use iscr_core::{Outcome, RetryPolicy};
    use iscr_extract::TextBackend;
    use iscr_fetch::PageSource;
    use std::num::NonZeroU32;
    use std::time::Duration;
    use tempfile::TempDir;

    const ROOT: &str = "https://archive.test/ISCR/";
    const YEAR: i32 = 2021;

    /// Archive with one year page; documents are `%PDF-` followed by their text.
    struct StubArchive {
        documents: HashMap<String, Vec<u8>>,
        year_page: String,
        document_calls: AtomicUsize,
    }

    impl StubArchive {
        fn new(cases: &[(&str, &str)]) -> Arc<Self> {
            let mut documents = HashMap::new();
            let mut year_page = String::new();
            for (id, text) in cases {
                year_page.push_str(&format!(r#"<a href="files/{id}.pdf">{id}</a>"#));
                documents.insert(
                    format!("{ROOT}{YEAR}/files/{id}.pdf"),
                    format!("%PDF-1.4\n{text}").into_bytes(),
                );
            }
            Arc::new(Self {
                documents,
                year_page,
                document_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageSource for StubArchive {
        async fn page(&self, url: &str) -> Result<String, FetchError> {
            if url == ROOT {
                Ok(format!(r#"<a href="{YEAR}/">{YEAR}</a>"#))
            } else if url == format!("{ROOT}{YEAR}/") {
                Ok(self.year_page.clone())
            } else {
                Err(FetchError::NotFound(url.to_string()))
            }
        }

        async fn document(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.document_calls.fetch_add(1, Ordering::SeqCst);
            self.documents
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(url.to_string()))
        }
    }

    #[derive(Default)]
    struct StubBackend {
        calls: AtomicUsize,
    }

    impl TextBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<String>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = String::from_utf8_lossy(pdf);
            Ok(vec![text.trim_start_matches("%PDF-1.4").to_string()])
        }
    }

    /// Grants when the text says "granted", denies otherwise; omits the
    /// outcome for texts containing "GARBLED".
    #[derive(Default)]
    struct StubModel {
        calls: AtomicUsize,
        delay: Duration,
        /// Answer every request with HTTP 401.
        unauthorized: bool,
        /// Cancelled once the first request has been answered.
        cancel_after_first: Option<CancellationToken>,
    }

    #[async_trait]
    impl LanguageModel for StubModel {
        fn model(&self) -> &str {
            "stub-model"
        }

        async fn complete(&self, messages: &[Message]) -> Result<Completion, ClassificationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.unauthorized {
                return Err(ClassificationError::Api {
                    status: 401,
                    body: "invalid api key".into(),
                });
            }
            if call == 1
                && let Some(token) = &self.cancel_after_first
            {
                token.cancel();
            }
            let text = &messages[1].content;
            let content = if text.contains("GARBLED") {
                r#"{"guideline_flags": [], "rationale_summary": "unclear"}"#.to_string()
            } else {
                let outcome = if text.contains("granted") { "Granted" } else { "Denied" };
                format!(
                    r#"{{"outcome": "{outcome}", "guideline_flags": ["F"], "rationale_summary": "Per the decision."}}"#
                )
            };
            Ok(Completion {
                content,
                model: "stub-model".into(),
            })
        }
    }

    struct Harness {
        dir: TempDir,
        archive: Arc<StubArchive>,
        backend: Arc<StubBackend>,
        model: Arc<StubModel>,
        orchestrator: Orchestrator,
    }

    fn orchestrator(
        layout: &CacheLayout,
        archive: Arc<StubArchive>,
        backend: Arc<StubBackend>,
        model: Arc<StubModel>,
    ) -> Orchestrator {
        let fetcher = Fetcher::new(archive, layout.clone(), ROOT)
            .unwrap()
            .with_retry(RetryPolicy::immediate(2));
        let extractor = Extractor::new(backend);
        let classifier = Classifier::new(
            model,
            Taxonomy::sead4(),
            ClassifierConfig {
                max_input_tokens: 1000,
                schema_retries: 1,
                requests_per_minute: NonZeroU32::new(100_000).unwrap(),
                retry: RetryPolicy::immediate(2),
            },
        );
        Orchestrator::new(fetcher, extractor, classifier, layout.clone())
    }

    fn harness_with(cases: &[(&str, &str)], model: StubModel) -> Harness {
        let dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(dir.path());
        let archive = StubArchive::new(cases);
        let backend = Arc::new(StubBackend::default());
        let model = Arc::new(model);
        Harness {
            orchestrator: orchestrator(&layout, archive.clone(), backend.clone(), model.clone()),
            dir,
            archive,
            backend,
            model,
        }
    }

    fn harness(cases: &[(&str, &str)], delay: Duration) -> Harness {
        harness_with(
            cases,
            StubModel {
                delay,
                ..StubModel::default()
            },
        )
    }

    fn opts() -> RunOptions {
        RunOptions {
            year: YEAR,
            force: false,
            limit: None,
            concurrency: 4,
        }
    }

    const THREE: &[(&str, &str)] = &[
        ("21-00001.h1", "The clearance is granted."),
        ("21-00002.h1", "The clearance is denied."),
        ("21-00003.h1", "Eligibility is granted."),
    ];

    impl Harness {
        async fn run(&self, opts: &RunOptions) -> RunReport {
            self.orchestrator
                .run(opts, &CancellationToken::new())
                .await
                .unwrap()
        }

        fn table(&self) -> Vec<ClassifiedCase> {
            ResultStore::new(CacheLayout::new(self.dir.path()))
                .load(YEAR)
                .unwrap()
        }

        fn table_bytes(&self) -> Vec<u8> {
            std::fs::read(CacheLayout::new(self.dir.path()).output_path(YEAR)).unwrap()
        }

        fn manifest(&self) -> RunManifest {
            ManifestStore::new(CacheLayout::new(self.dir.path()))
                .load(YEAR)
                .unwrap()
        }
    }

    #[tokio::test]
    async fn classifies_every_case_once() {
        let h = harness(THREE, Duration::ZERO);
        let report = h.run(&opts()).await;

        assert_eq!(report.discovered, 3);
        assert_eq!(report.classified, 3);
        assert!(report.failed.is_empty());

        let table = h.table();
        let ids: HashSet<&str> = table.iter().map(|c| c.case_id()).collect();
        assert_eq!(ids.len(), 3);
        assert!(table.iter().all(|c| Outcome::ALL.contains(&c.result.outcome)));
        let denied = table.iter().find(|c| c.case_id() == "21-00002.h1").unwrap();
        assert_eq!(denied.result.outcome, Outcome::Denied);
        assert_eq!(denied.source_url, format!("{ROOT}{YEAR}/files/21-00002.h1.pdf"));
        assert_eq!(h.manifest().counts().classified, 3);
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let h = harness(THREE, Duration::ZERO);
        h.run(&opts()).await;
        let before = h.table_bytes();

        let report = h.run(&opts()).await;
        assert_eq!(report.skipped, 3);
        assert_eq!(report.classified, 0);
        assert_eq!(h.model.calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.table_bytes(), before);
    }

    #[tokio::test]
    async fn limited_run_resumes_with_the_rest() {
        let h = harness(THREE, Duration::ZERO);
        let first = h.run(&RunOptions {
            limit: Some(1),
            ..opts()
        })
        .await;
        assert_eq!(first.classified, 1);
        assert_eq!(h.manifest().outstanding().count(), 2);

        let second = h.run(&opts()).await;
        assert_eq!(second.skipped, 1);
        assert_eq!(second.classified, 2);
        assert_eq!(h.model.calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.table().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_run_leaves_cases_pending() {
        let h = harness(THREE, Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = h.orchestrator.run(&opts(), &cancel).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.not_started, 3);
        assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.manifest().counts().pending, 3);

        let resumed = h.run(&opts()).await;
        assert_eq!(resumed.classified, 3);
    }

    #[tokio::test]
    async fn interrupted_mid_run_keeps_finished_work_and_resumes() {
        let cancel = CancellationToken::new();
        let h = harness_with(
            THREE,
            StubModel {
                cancel_after_first: Some(cancel.clone()),
                ..StubModel::default()
            },
        );
        let sequential = RunOptions {
            concurrency: 1,
            ..opts()
        };

        let report = h.orchestrator.run(&sequential, &cancel).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.classified, 1);
        assert_eq!(report.not_started, 2);

        let first_table = h.table();
        assert_eq!(first_table.len(), 1);
        assert_eq!(first_table[0].case_id(), "21-00001.h1");
        let manifest = h.manifest();
        assert_eq!(manifest.status("21-00001.h1"), Some(CaseStatus::Classified));
        assert_eq!(manifest.counts().pending, 2);

        let resumed = h.run(&opts()).await;
        assert_eq!(resumed.skipped, 1);
        assert_eq!(resumed.classified, 2);
        assert_eq!(h.model.calls.load(Ordering::SeqCst), 3);

        let table = h.table();
        assert_eq!(table.len(), 3);
        assert!(table.contains(&first_table[0]));
    }

    #[tokio::test]
    async fn rejected_api_key_stops_run_without_failing_cases() {
        let h = harness_with(
            THREE,
            StubModel {
                unauthorized: true,
                ..StubModel::default()
            },
        );
        let sequential = RunOptions {
            concurrency: 1,
            ..opts()
        };

        let err = h
            .orchestrator
            .run(&sequential, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Unauthorized(_)), "{err}");
        assert_eq!(h.model.calls.load(Ordering::SeqCst), 1);

        let manifest = h.manifest();
        assert_eq!(manifest.counts().failed, 0);
        assert_eq!(manifest.outstanding().count(), 3);
        assert!(h.table().is_empty());

        // With a working key the next run picks every case up again.
        let layout = CacheLayout::new(h.dir.path());
        let model = Arc::new(StubModel::default());
        let retry = orchestrator(&layout, h.archive.clone(), h.backend.clone(), model.clone());
        let report = retry.run(&opts(), &CancellationToken::new()).await.unwrap();
        assert_eq!(report.classified, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        // The first case was already extracted and is not fetched again.
        assert_eq!(h.archive.document_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn grown_listing_keeps_existing_case_ids() {
        let h = harness(THREE, Duration::ZERO);
        let url = |dir: &str| format!("{ROOT}{YEAR}/{dir}/21-00001.h1.pdf");
        let run = |cases: Vec<DiscoveredCase>| {
            let orchestrator = &h.orchestrator;
            async move {
                orchestrator
                    .run_cases(&opts(), cases, &CancellationToken::new())
                    .await
                    .unwrap()
            }
        };

        // Both fail at fetch (the stub only serves `files/`), which is enough
        // to bind ids to URLs in the manifest.
        run(vec![DiscoveredCase::new("21-00001.h1", url("b"))]).await;
        // A new URL that sorts first now gets the bare id on the listing.
        run(vec![
            DiscoveredCase::new("21-00001.h1", url("a")),
            DiscoveredCase::new("21-00001.h1_2", url("b")),
        ])
        .await;

        let manifest = h.manifest();
        assert_eq!(manifest.get("21-00001.h1").unwrap().source_url, url("b"));
        assert_eq!(manifest.get("21-00001.h1_2").unwrap().source_url, url("a"));
        assert_eq!(manifest.len(), 2);
    }

    #[tokio::test]
    async fn schema_rejection_marks_case_failed() {
        let h = harness(
            &[
                ("21-00001.h1", "The clearance is granted."),
                ("21-00009.h1", "GARBLED scan"),
            ],
            Duration::ZERO,
        );
        let report = h.run(&opts()).await;

        assert_eq!(report.classified, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].case_id, "21-00009.h1");
        assert_eq!(report.failed[0].stage, Stage::Classify);
        assert!(h.table().iter().all(|c| c.case_id() != "21-00009.h1"));

        let manifest = h.manifest();
        assert_eq!(manifest.status("21-00009.h1"), Some(CaseStatus::Failed));

        // Failed cases are terminal: the next run does not retry them.
        let calls = h.model.calls.load(Ordering::SeqCst);
        h.run(&opts()).await;
        assert_eq!(h.model.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn missing_document_fails_only_that_case() {
        let h = harness(THREE, Duration::ZERO);
        let mut cases: Vec<DiscoveredCase> = THREE
            .iter()
            .map(|(id, _)| DiscoveredCase::new(*id, format!("{ROOT}{YEAR}/files/{id}.pdf")))
            .collect();
        cases.push(DiscoveredCase::new("gone", format!("{ROOT}{YEAR}/files/gone.pdf")));

        let report = h
            .orchestrator
            .run_cases(&opts(), cases, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.classified, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].stage, Stage::Fetch);
    }

    #[tokio::test]
    async fn concurrent_duplicates_classify_once() {
        let h = harness(THREE, Duration::from_millis(50));
        let case = DiscoveredCase::new("21-00001.h1", format!("{ROOT}{YEAR}/files/21-00001.h1.pdf"));
        let cases = vec![case.clone(), case.clone(), case];

        let report = h
            .orchestrator
            .run_cases(&opts(), cases, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.classified, 1);
        assert_eq!(h.model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.archive.document_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.table().len(), 1);
    }

    #[tokio::test]
    async fn force_reclassifies_but_reuses_caches() {
        let h = harness(THREE, Duration::ZERO);
        h.run(&opts()).await;
        let report = h.run(&RunOptions {
            force: true,
            ..opts()
        })
        .await;

        assert_eq!(report.classified, 3);
        assert_eq!(h.model.calls.load(Ordering::SeqCst), 6);
        assert_eq!(h.table().len(), 3);
        assert_eq!(h.archive.document_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn lost_table_rows_are_reclassified() {
        let h = harness(THREE, Duration::ZERO);
        h.run(&opts()).await;
        std::fs::remove_file(CacheLayout::new(h.dir.path()).output_path(YEAR)).unwrap();

        let report = h.run(&opts()).await;
        assert_eq!(report.classified, 3);
        assert_eq!(h.table().len(), 3);
    }

    #[tokio::test]
    async fn unlisted_year_is_invalid() {
        let h = harness(THREE, Duration::ZERO);
        let err = h
            .orchestrator
            .run(
                &RunOptions {
                    year: 2019,
                    ..opts()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::InvalidYear(_)));
    }
}
