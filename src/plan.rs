use tracing::{debug, warn};

use crate::pubmed::client::PubmedSearch;
use crate::query::Query;

/// One symptom/condition combination to try against the search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchStep {
    pub symptoms: Vec<String>,
    pub conditions: Vec<String>,
}

impl SearchStep {
    /// Boolean search term: terms within a group are ANDed, groups are ANDed.
    /// e.g. `(fatigue AND dizziness) AND (anemia)`.
    pub fn term(&self) -> String {
        let mut groups = Vec::new();
        if !self.symptoms.is_empty() {
            groups.push(format!("({})", self.symptoms.join(" AND ")));
        }
        if !self.conditions.is_empty() {
            groups.push(format!("({})", self.conditions.join(" AND ")));
        }
        groups.join(" AND ")
    }
}

/// Relaxation-search plan: Cartesian product of non-empty subsets of
/// symptoms and conditions, ordered by ascending combined subset size so
/// the narrowest combinations are tried first. Within a size class the
/// generation order is kept (symptom subsets outer, condition subsets
/// inner, each ascending by size).
pub fn build_plan(query: &Query) -> Vec<SearchStep> {
    let symptom_subsets = subsets(&query.symptoms);
    let condition_subsets = if query.conditions.is_empty() {
        // No known conditions: search on symptoms alone.
        vec![Vec::new()]
    } else {
        subsets(&query.conditions)
    };

    let mut steps = Vec::new();
    for symptoms in &symptom_subsets {
        for conditions in &condition_subsets {
            steps.push(SearchStep {
                symptoms: symptoms.clone(),
                conditions: conditions.clone(),
            });
        }
    }
    steps.sort_by_key(|s| s.symptoms.len() + s.conditions.len());
    steps
}

/// All non-empty subsets, ascending by size.
fn subsets(items: &[String]) -> Vec<Vec<String>> {
    let mut out: Vec<Vec<String>> = Vec::new();
    for mask in 1u32..(1 << items.len()) {
        out.push(
            items
                .iter()
                .enumerate()
                .filter(|(i, _)| mask >> i & 1 == 1)
                .map(|(_, item)| item.clone())
                .collect(),
        );
    }
    out.sort_by_key(Vec::len);
    out
}

#[derive(Debug, PartialEq, Eq)]
pub enum PlanOutcome {
    /// First plan step that matched, with the article IDs it returned.
    Hit {
        step: SearchStep,
        pmids: Vec<String>,
    },
    /// Every step returned empty or failed.
    Exhausted,
}

/// Executes plan steps in order, stopping at the first non-empty result.
/// A transport failure on a single step counts as empty for that step;
/// the plan only exhausts if every step fails or comes back empty.
pub async fn run_plan(search: &impl PubmedSearch, plan: &[SearchStep]) -> PlanOutcome {
    for step in plan {
        let term = step.term();
        match search.search(&term).await {
            Ok(pmids) if !pmids.is_empty() => {
                debug!(%term, hits = pmids.len(), "search plan step matched");
                return PlanOutcome::Hit {
                    step: step.clone(),
                    pmids,
                };
            }
            Ok(_) => debug!(%term, "search plan step empty"),
            Err(e) => warn!(error = %e, %term, "search step failed, treating as empty"),
        }
    }
    PlanOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubmed::client::PubmedError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn step(symptoms: &[&str], conditions: &[&str]) -> SearchStep {
        SearchStep {
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            conditions: conditions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn query(symptoms: &[&str], conditions: &[&str]) -> Query {
        Query::new(
            symptoms.iter().map(|s| s.to_string()).collect(),
            conditions.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn term_joins_groups_with_and() {
        let s = step(&["fatigue", "dizziness"], &["anemia"]);
        assert_eq!(s.term(), "(fatigue AND dizziness) AND (anemia)");
    }

    #[test]
    fn term_without_conditions_is_symptoms_only() {
        let s = step(&["fatigue"], &[]);
        assert_eq!(s.term(), "(fatigue)");
    }

    #[test]
    fn plan_orders_by_ascending_combined_size() {
        let plan = build_plan(&query(&["a", "b"], &["x"]));
        assert_eq!(
            plan,
            vec![
                step(&["a"], &["x"]),
                step(&["b"], &["x"]),
                step(&["a", "b"], &["x"]),
            ]
        );
    }

    #[test]
    fn plan_with_two_conditions_keeps_size_classes() {
        let plan = build_plan(&query(&["a", "b"], &["x", "y"]));
        assert_eq!(plan.len(), 9);
        // Size 2 pairs first, the full pair last.
        assert_eq!(plan[0], step(&["a"], &["x"]));
        assert_eq!(plan[1], step(&["a"], &["y"]));
        assert_eq!(plan[2], step(&["b"], &["x"]));
        assert_eq!(plan[3], step(&["b"], &["y"]));
        assert_eq!(plan[8], step(&["a", "b"], &["x", "y"]));
        for window in plan.windows(2) {
            let size = |s: &SearchStep| s.symptoms.len() + s.conditions.len();
            assert!(size(&window[0]) <= size(&window[1]));
        }
    }

    #[test]
    fn plan_without_conditions_uses_symptom_subsets() {
        let plan = build_plan(&query(&["a", "b"], &[]));
        assert_eq!(
            plan,
            vec![step(&["a"], &[]), step(&["b"], &[]), step(&["a", "b"], &[])]
        );
    }

    struct MockSearch {
        responses: Mutex<VecDeque<Result<Vec<String>, PubmedError>>>,
        terms: Mutex<Vec<String>>,
    }

    impl MockSearch {
        fn new(responses: Vec<Result<Vec<String>, PubmedError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                terms: Mutex::new(Vec::new()),
            }
        }

        fn captured_terms(&self) -> Vec<String> {
            self.terms.lock().unwrap().clone()
        }
    }

    impl PubmedSearch for MockSearch {
        async fn search(&self, term: &str) -> Result<Vec<String>, PubmedError> {
            self.terms.lock().unwrap().push(term.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Vec::new()))
        }
    }

    #[tokio::test]
    async fn run_plan_stops_at_first_hit() {
        let mock = MockSearch::new(vec![
            Ok(vec![]),
            Ok(vec!["111".into(), "222".into()]),
            Ok(vec!["999".into()]),
        ]);
        let plan = build_plan(&query(&["a", "b"], &["x"]));

        let outcome = run_plan(&mock, &plan).await;

        assert_eq!(
            outcome,
            PlanOutcome::Hit {
                step: step(&["b"], &["x"]),
                pmids: vec!["111".into(), "222".into()],
            }
        );
        // The third step must never be issued.
        assert_eq!(
            mock.captured_terms(),
            vec!["(a) AND (x)", "(b) AND (x)"]
        );
    }

    #[tokio::test]
    async fn run_plan_treats_step_failure_as_empty() {
        let mock = MockSearch::new(vec![
            Err(PubmedError::Status(500)),
            Ok(vec!["111".into()]),
        ]);
        let plan = build_plan(&query(&["a", "b"], &["x"]));

        let outcome = run_plan(&mock, &plan).await;

        assert!(matches!(outcome, PlanOutcome::Hit { .. }));
        assert_eq!(mock.captured_terms().len(), 2);
    }

    #[tokio::test]
    async fn run_plan_exhausts_when_all_steps_empty_or_fail() {
        let mock = MockSearch::new(vec![
            Ok(vec![]),
            Err(PubmedError::Status(503)),
            Ok(vec![]),
        ]);
        let plan = build_plan(&query(&["a", "b"], &["x"]));

        assert_eq!(run_plan(&mock, &plan).await, PlanOutcome::Exhausted);
        assert_eq!(mock.captured_terms().len(), 3);
    }
}
