use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{Candidate, Profession};
use super::error::DispatchError;
use super::repository::CandidateDirectory;

/// How candidates without any service-area record are treated once a postal code is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// Unscoped candidates serve everywhere.
    #[default]
    Include,
    /// Unscoped candidates are skipped until an area is configured.
    Exclude,
}

/// Returns ranked candidates able to service a profession in an area.
pub struct CandidateMatcher<D> {
    directory: Arc<D>,
    coverage: CoveragePolicy,
}

impl<D> CandidateMatcher<D>
where
    D: CandidateDirectory,
{
    pub fn new(directory: Arc<D>, coverage: CoveragePolicy) -> Self {
        Self {
            directory,
            coverage,
        }
    }

    /// An empty result is not an error; callers decide how to react.
    pub fn find(
        &self,
        profession: &Profession,
        postal_code: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Candidate>, DispatchError> {
        let pool = self.directory.candidates_for(profession)?;
        let pool_size = pool.len();

        let mut matches: Vec<Candidate> = pool
            .into_iter()
            .filter(|candidate| candidate.serves(profession))
            .filter(|candidate| self.covers(candidate, postal_code))
            .collect();

        matches.sort_by(rank);
        if let Some(limit) = limit {
            matches.truncate(limit);
        }

        debug!(
            %profession,
            postal_code = postal_code.unwrap_or("-"),
            pool_size,
            matched = matches.len(),
            "matched candidates"
        );
        Ok(matches)
    }

    fn covers(&self, candidate: &Candidate, postal_code: Option<&str>) -> bool {
        let Some(postal_code) = postal_code else {
            return true;
        };
        match &candidate.coverage {
            Some(ranges) => ranges.iter().any(|range| range.contains(postal_code)),
            None => self.coverage == CoveragePolicy::Include,
        }
    }
}

/// Verified first, then rating descending (unrated last), then id ascending.
fn rank(left: &Candidate, right: &Candidate) -> Ordering {
    right
        .verified
        .cmp(&left.verified)
        .then_with(|| match (left.rating, right.rating) {
            (Some(l), Some(r)) => r.total_cmp(&l),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| left.id.cmp(&right.id))
}
