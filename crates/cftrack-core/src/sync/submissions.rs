//! Newest-first page walk over a student's submission history.

use crate::source::{ExternalSubmission, JudgeSource, SourceResult};

/// Items newer than the watermark, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionWalk {
    pub staged: Vec<ExternalSubmission>,
    /// Pages requested, including the first
    pub pages: usize,
    /// Items the judge returned across all pages
    pub fetched: usize,
    /// Stopped at the history cap before reaching stored data
    pub history_capped: bool,
}

/// How a walk ended before anything is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    /// The judge has no submissions for this handle
    NoHistory,
    /// The newest judge id is the stored watermark
    UpToDate,
    /// The judge reports less history than is stored
    Regression { latest: i64, stored: i64 },
    NewItems(SubmissionWalk),
}

/// Walk pages from position 1 until the first item at or below `last_stored_id`.
///
/// The walk also stops on a short page or once `history_cap` items have been
/// fetched. Any fetch error aborts the whole walk; nothing is staged
/// partially.
pub async fn walk_submissions<S: JudgeSource>(
    source: &S,
    handle: &str,
    last_stored_id: i64,
    page_size: u32,
    history_cap: u32,
) -> SourceResult<WalkOutcome> {
    let mut page = source.fetch_submission_page(handle, 1, page_size).await?;
    if page.is_empty() {
        return Ok(WalkOutcome::NoHistory);
    }

    if let Some(latest) = page.latest_id() {
        if latest < last_stored_id {
            return Ok(WalkOutcome::Regression {
                latest,
                stored: last_stored_id,
            });
        }
        if latest == last_stored_id {
            return Ok(WalkOutcome::UpToDate);
        }
    }

    let page_len = page_size as usize;
    let cap = history_cap as usize;
    let mut walk = SubmissionWalk::default();
    let mut start = 1u32;

    loop {
        walk.pages += 1;
        walk.fetched += page.fetched;
        let short_page = page.fetched < page_len;

        let mut reached_boundary = false;
        for item in page.items {
            if item.id <= last_stored_id {
                reached_boundary = true;
                break;
            }
            walk.staged.push(item);
        }

        tracing::debug!(
            "Page {} for {}: {} fetched, {} staged so far",
            walk.pages,
            handle,
            page.fetched,
            walk.staged.len()
        );

        if reached_boundary || short_page {
            break;
        }
        if walk.fetched >= cap {
            walk.history_capped = true;
            break;
        }
        let Some(next) = start.checked_add(page_size) else {
            break;
        };
        start = next;

        page = source.fetch_submission_page(handle, start, page_size).await?;
        if page.is_empty() {
            break;
        }
    }

    Ok(WalkOutcome::NewItems(walk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ExternalRatingChange, SourceError, SubmissionPage};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Serves a fixed newest-first history and records `start` positions.
    struct PagedHistory {
        items: Vec<ExternalSubmission>,
        fail_at: Option<u32>,
        starts: Mutex<Vec<u32>>,
    }

    impl PagedHistory {
        fn new(newest: i64, oldest: i64) -> Self {
            Self {
                items: (oldest..=newest).rev().map(item).collect(),
                fail_at: None,
                starts: Mutex::new(Vec::new()),
            }
        }

        fn starts(&self) -> Vec<u32> {
            self.starts.lock().unwrap().clone()
        }
    }

    impl JudgeSource for PagedHistory {
        async fn fetch_submission_page(
            &self,
            _handle: &str,
            start: u32,
            count: u32,
        ) -> SourceResult<SubmissionPage> {
            self.starts.lock().unwrap().push(start);
            if self.fail_at == Some(start) {
                return Err(SourceError::Unavailable("connection reset".to_string()));
            }
            Ok(SubmissionPage::new(
                self.items
                    .iter()
                    .skip(start as usize - 1)
                    .take(count as usize)
                    .cloned()
                    .collect(),
            ))
        }

        async fn fetch_rating_history(
            &self,
            _handle: &str,
        ) -> SourceResult<Vec<ExternalRatingChange>> {
            Ok(Vec::new())
        }
    }

    fn item(id: i64) -> ExternalSubmission {
        ExternalSubmission {
            id,
            contest_id: Some(1),
            problem_index: "A".to_string(),
            problem_name: None,
            problem_rating: 0,
            tags: Vec::new(),
            verdict: Some("OK".to_string()),
            creation_time_seconds: id,
            language: None,
            time_consumed_ms: 0,
            memory_consumed_bytes: 0,
            passed_test_count: None,
            participant_type: None,
        }
    }

    fn staged_ids(outcome: &WalkOutcome) -> Vec<i64> {
        match outcome {
            WalkOutcome::NewItems(walk) => walk.staged.iter().map(|item| item.id).collect(),
            other => panic!("expected new items, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stops_at_boundary_on_second_page() {
        let source = PagedHistory::new(1100, 901);
        let outcome = walk_submissions(&source, "ann_cf", 1000, 100, 1000)
            .await
            .unwrap();

        let ids = staged_ids(&outcome);
        assert_eq!(ids.len(), 100);
        assert_eq!(ids.first(), Some(&1100));
        assert_eq!(ids.last(), Some(&1001));
        assert_eq!(source.starts(), vec![1, 101]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn boundary_mid_page_stops_walk() {
        let source = PagedHistory::new(1030, 901);
        let outcome = walk_submissions(&source, "ann_cf", 1000, 100, 1000)
            .await
            .unwrap();

        assert_eq!(staged_ids(&outcome).len(), 30);
        assert_eq!(source.starts(), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn classifies_empty_equal_and_regressed_history() {
        let empty = PagedHistory {
            items: Vec::new(),
            fail_at: None,
            starts: Mutex::new(Vec::new()),
        };
        assert_eq!(
            walk_submissions(&empty, "ann_cf", 0, 100, 1000).await.unwrap(),
            WalkOutcome::NoHistory
        );

        let same = PagedHistory::new(50, 1);
        assert_eq!(
            walk_submissions(&same, "ann_cf", 50, 100, 1000).await.unwrap(),
            WalkOutcome::UpToDate
        );

        let shrunk = PagedHistory::new(40, 1);
        assert_eq!(
            walk_submissions(&shrunk, "ann_cf", 50, 100, 1000).await.unwrap(),
            WalkOutcome::Regression {
                latest: 40,
                stored: 50
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn short_page_ends_walk() {
        let source = PagedHistory::new(25, 1);
        let outcome = walk_submissions(&source, "ann_cf", 0, 10, 1000).await.unwrap();

        assert_eq!(staged_ids(&outcome).len(), 25);
        assert_eq!(source.starts(), vec![1, 11, 21]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cap_limits_fetched_items() {
        let source = PagedHistory::new(100, 1);
        let outcome = walk_submissions(&source, "ann_cf", 0, 10, 30).await.unwrap();

        let WalkOutcome::NewItems(walk) = outcome else {
            panic!("expected new items");
        };
        assert!(walk.history_capped);
        assert_eq!(walk.fetched, 30);
        assert_eq!(walk.staged.len(), 30);
        assert_eq!(walk.staged.last().map(|item| item.id), Some(71));
        assert_eq!(source.starts(), vec![1, 11, 21]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn later_page_failure_aborts_walk() {
        let mut source = PagedHistory::new(150, 1);
        source.fail_at = Some(101);

        let error = walk_submissions(&source, "ann_cf", 0, 100, 1000)
            .await
            .unwrap_err();
        assert!(error.is_unavailable());
        assert_eq!(source.starts(), vec![1, 101]);
    }
}
