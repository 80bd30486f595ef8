//! A participant's visits for one module, in evaluation order.

use gearbox_core::ids::{ContainerId, FileId};
use gearbox_core::ports::VisitStore;
use gearbox_core::visit::Visit;
use gearbox_core::Result;

#[derive(Debug, Clone)]
pub struct VisitChain {
    module: String,
    visits: Vec<Visit>,
}

impl VisitChain {
    /// Read the chain from the platform as it is right now.
    pub async fn load(
        store: &dyn VisitStore,
        participant: &ContainerId,
        module: &str,
    ) -> Result<Self> {
        let visits = store.visits(participant, module).await?;
        Ok(Self::from_visits(module, visits))
    }

    pub fn from_visits(module: impl Into<String>, mut visits: Vec<Visit>) -> Self {
        visits.sort_by(|a, b| a.chain_order(b));
        Self {
            module: module.into(),
            visits,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn visits(&self) -> &[Visit] {
        &self.visits
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    pub fn position(&self, file: &FileId) -> Option<usize> {
        self.visits.iter().position(|v| v.file_id() == file)
    }

    /// Earliest visit still waiting for (or interrupted during) evaluation.
    pub fn first_awaiting(&self) -> Option<usize> {
        self.visits.iter().position(|v| v.status.awaits_evaluation())
    }

    /// Latest blocking visit before `index`.
    pub fn blocking_before(&self, index: usize) -> Option<&Visit> {
        self.visits[..index.min(self.visits.len())]
            .iter()
            .rev()
            .find(|v| v.status.is_blocking())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gearbox_core::file::FileRef;
    use gearbox_core::visit::QcStatus;

    fn visit(id: &str, date: &str, number: Option<&str>, status: QcStatus) -> Visit {
        Visit {
            file: FileRef {
                id: FileId::new(id),
                name: format!("{id}.json"),
                parent: ContainerId::new("acq"),
                tags: vec![],
                origin: None,
            },
            module: "UDS".into(),
            visit_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            visit_number: number.map(str::to_string),
            status,
            error_log: None,
        }
    }

    fn ids(chain: &VisitChain) -> Vec<&str> {
        chain.visits().iter().map(|v| v.file_id().as_str()).collect()
    }

    #[test]
    fn test_sorted_by_date_then_visit_number_then_id() {
        let chain = VisitChain::from_visits(
            "UDS",
            vec![
                visit("f9", "2021-01-01", None, QcStatus::Pending),
                visit("f3", "2020-05-01", Some("2"), QcStatus::Pending),
                visit("f2", "2020-05-01", Some("1"), QcStatus::Pending),
                visit("f1", "2020-05-01", Some("2"), QcStatus::Pending),
            ],
        );
        assert_eq!(ids(&chain), vec!["f2", "f1", "f3", "f9"]);
    }

    #[test]
    fn test_first_awaiting_includes_interrupted() {
        let chain = VisitChain::from_visits(
            "UDS",
            vec![
                visit("v1", "2020-01-01", None, QcStatus::Pass),
                visit("v2", "2020-02-01", None, QcStatus::Evaluating),
                visit("v3", "2020-03-01", None, QcStatus::Pending),
            ],
        );
        assert_eq!(chain.first_awaiting(), Some(1));
    }

    #[test]
    fn test_blocking_before() {
        let chain = VisitChain::from_visits(
            "UDS",
            vec![
                visit("v1", "2020-01-01", None, QcStatus::InReview),
                visit("v2", "2020-02-01", None, QcStatus::Pass),
                visit("v3", "2020-03-01", None, QcStatus::Pending),
            ],
        );
        assert_eq!(
            chain.blocking_before(2).map(|v| v.file_id().as_str()),
            Some("v1")
        );
        assert!(chain.blocking_before(0).is_none());
    }
}
