//! Page-by-page record assembly.

use std::collections::HashSet;
use std::iter::FusedIterator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use super::RegionExtractor;
use crate::error::{ExtractionError, PdfRegionError};
use crate::pdf::DocumentSource;
use crate::region::RegionSpec;

/// One page's values, aligned with the declared region order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    /// Page the row was built from (0-based).
    pub page_index: usize,
    /// `(label, value)` cells in region order.
    #[serde(serialize_with = "ordered_map")]
    pub cells: Vec<(String, String)>,
}

impl OutputRow {
    /// Cell values in column order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(_, v)| v.as_str())
    }

    /// Value of the cell labelled `label`.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }
}

fn ordered_map<S: Serializer>(cells: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(cells.iter().map(|(k, v)| (k, v)))
}

/// Cooperative cancellation shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; pages not yet started are not processed.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct RowPolicy {
    specs: Vec<RegionSpec>,
    extractor: RegionExtractor,
    timeout_is_fatal: bool,
    cancel: CancelFlag,
}

impl RowPolicy {
    /// Build the row for one page, or fail on the first fatal region error.
    fn row<D: DocumentSource + ?Sized>(&self, doc: &D, page: usize) -> Result<OutputRow, ExtractionError> {
        if self.cancel.is_cancelled() {
            return Err(ExtractionError::Cancelled { page });
        }

        let mut cells = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let value = match self.extractor.extract(doc, page, spec) {
                Ok(result) => result.value,
                Err(e) if e.is_recoverable(self.timeout_is_fatal) => {
                    warn!("{}; leaving value empty", e);
                    String::new()
                }
                Err(e) => return Err(e),
            };
            cells.push((spec.label().to_string(), value));
        }

        Ok(OutputRow {
            page_index: page,
            cells,
        })
    }
}

/// Applies an ordered set of regions to every page of a document.
#[derive(Debug, Clone)]
pub struct PageRecordBuilder {
    policy: Arc<RowPolicy>,
    workers: usize,
}

impl PageRecordBuilder {
    /// Create a builder for `specs`, which must be non-empty with unique labels.
    pub fn new(specs: Vec<RegionSpec>, extractor: RegionExtractor) -> Result<Self, PdfRegionError> {
        if specs.is_empty() {
            return Err(PdfRegionError::Config("no regions configured".to_string()));
        }
        let mut labels = HashSet::new();
        if let Some(dup) = specs.iter().find(|s| !labels.insert(s.label())) {
            return Err(PdfRegionError::Config(format!(
                "duplicate region label {:?}",
                dup.label()
            )));
        }

        Ok(Self {
            policy: Arc::new(RowPolicy {
                specs,
                extractor,
                timeout_is_fatal: false,
                cancel: CancelFlag::new(),
            }),
            workers: 1,
        })
    }

    fn policy_mut(&mut self) -> &mut RowPolicy {
        Arc::make_mut(&mut self.policy)
    }

    /// Abort the run on OCR timeouts instead of leaving the value empty.
    pub fn with_timeout_fatal(mut self, fatal: bool) -> Self {
        self.policy_mut().timeout_is_fatal = fatal;
        self
    }

    /// Observe `cancel` before each page.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.policy_mut().cancel = cancel;
        self
    }

    /// Pages processed in parallel by [`collect_parallel`](Self::collect_parallel).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Region specs in column order.
    pub fn specs(&self) -> &[RegionSpec] {
        &self.policy.specs
    }

    /// Column labels in region order.
    pub fn labels(&self) -> Vec<String> {
        self.policy.specs.iter().map(|s| s.label().to_string()).collect()
    }

    /// Check every spec against the first page before any page is processed.
    fn validate<D: DocumentSource + ?Sized>(&self, doc: &D) -> Result<(), ExtractionError> {
        let size = doc.page_size(0).map_err(ExtractionError::DocumentOpen)?;
        for spec in &self.policy.specs {
            spec.check_bounds(0, size)?;
        }
        Ok(())
    }

    /// Start a lazy row stream over `doc`, which the stream takes over.
    ///
    /// Fails with `InvalidRegion` when any spec does not fit the first page.
    pub fn build<D: DocumentSource>(&self, doc: D) -> Result<RecordStream<D>, ExtractionError> {
        self.validate(&doc)?;
        let page_count = doc.page_count();
        info!(
            "Extracting {} regions from {} pages",
            self.policy.specs.len(),
            page_count
        );

        Ok(RecordStream {
            doc: Some(doc),
            policy: Arc::clone(&self.policy),
            next_page: 0,
            page_count,
        })
    }

    /// Build every row, processing pages on a worker pool.
    ///
    /// Rows come back in page order. Nothing is returned unless every page
    /// succeeded; the document is dropped before returning.
    pub fn collect_parallel<D>(&self, doc: D) -> Result<Vec<OutputRow>, ExtractionError>
    where
        D: DocumentSource + Sync,
    {
        if self.workers <= 1 {
            return self.build(doc)?.collect();
        }

        self.validate(&doc)?;
        let page_count = doc.page_count();
        info!(
            "Extracting {} regions from {} pages on {} workers",
            self.policy.specs.len(),
            page_count,
            self.workers
        );

        let run = || {
            (0..page_count)
                .into_par_iter()
                .map(|page| self.policy.row(&doc, page))
                .collect::<Result<Vec<_>, _>>()
        };

        match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!("Could not build worker pool ({}), using the global pool", e);
                run()
            }
        }
    }
}

/// Lazy sequence of rows, one per page, in page order.
///
/// The stream owns the document and drops it after the last page or the
/// first fatal error. After an error it yields nothing more.
pub struct RecordStream<D> {
    doc: Option<D>,
    policy: Arc<RowPolicy>,
    next_page: usize,
    page_count: usize,
}

impl<D: DocumentSource> RecordStream<D> {
    /// Whether the document has been released.
    pub fn is_finished(&self) -> bool {
        self.doc.is_none()
    }

    fn release(&mut self) {
        if self.doc.take().is_some() {
            debug!("Released document after {} pages", self.next_page);
        }
    }
}

impl<D: DocumentSource> Iterator for RecordStream<D> {
    type Item = Result<OutputRow, ExtractionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_page >= self.page_count {
            self.release();
            return None;
        }

        let result = {
            let doc = self.doc.as_ref()?;
            self.policy.row(doc, self.next_page)
        };

        match result {
            Ok(row) => {
                self.next_page += 1;
                if self.next_page >= self.page_count {
                    self.release();
                }
                Some(Ok(row))
            }
            Err(e) => {
                self.release();
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.doc {
            Some(_) => (0, Some(self.page_count - self.next_page)),
            None => (0, Some(0)),
        }
    }
}

impl<D: DocumentSource> FusedIterator for RecordStream<D> {}
