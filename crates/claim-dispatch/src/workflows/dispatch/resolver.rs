use std::sync::Arc;

use tracing::{debug, warn};

use super::domain::{AssignmentMode, AssignmentPolicy, Profession};
use super::error::DispatchError;
use super::repository::PolicyStore;

/// Number of leading postal-code characters policies are keyed on.
pub const POSTAL_PREFIX_LEN: usize = 2;

/// Leading characters of a postal code, or `None` when the code is too short to key on.
pub fn postal_prefix(postal_code: &str) -> Option<String> {
    let trimmed = postal_code.trim();
    let prefix: String = trimmed.chars().take(POSTAL_PREFIX_LEN).collect();
    (prefix.chars().count() == POSTAL_PREFIX_LEN).then_some(prefix)
}

/// Selects the single governing policy for a profession and postal code.
pub struct RuleResolver<P> {
    store: Arc<P>,
}

impl<P> RuleResolver<P>
where
    P: PolicyStore,
{
    pub fn new(store: Arc<P>) -> Self {
        Self { store }
    }

    pub fn resolve(
        &self,
        profession: &Profession,
        postal_code: Option<&str>,
    ) -> Result<AssignmentPolicy, DispatchError> {
        let prefix = postal_code.and_then(postal_prefix);
        let rows = self.store.policies_for(profession)?;

        let matching: Vec<&AssignmentPolicy> = rows
            .iter()
            .filter(|policy| match (&policy.postal_prefix, &prefix) {
                (None, _) => true,
                (Some(row_prefix), Some(prefix)) => row_prefix.trim() == prefix,
                (Some(_), None) => false,
            })
            .collect();

        if matching.is_empty() {
            return Err(DispatchError::NoPolicyConfigured {
                profession: profession.clone(),
                prefix,
            });
        }

        let active: Vec<&AssignmentPolicy> = matching
            .iter()
            .copied()
            .filter(|policy| policy.active)
            .collect();

        let Some(policy) = most_specific(&active) else {
            return Err(DispatchError::PolicyNotEnabled {
                profession: profession.clone(),
                reason: "matching policy is inactive".to_string(),
            });
        };

        if policy.mode == AssignmentMode::Unrecognized {
            return Err(DispatchError::PolicyNotEnabled {
                profession: profession.clone(),
                reason: format!("policy {} has an unrecognized mode", policy.id),
            });
        }

        debug!(
            %profession,
            prefix = prefix.as_deref().unwrap_or("-"),
            policy_id = %policy.id,
            mode = policy.mode.label(),
            "resolved assignment policy"
        );
        Ok(policy.clone())
    }
}

/// Prefix rows beat wildcard rows; duplicates at one level resolve to the lowest id.
fn most_specific<'a>(candidates: &[&'a AssignmentPolicy]) -> Option<&'a AssignmentPolicy> {
    let specific: Vec<&AssignmentPolicy> = candidates
        .iter()
        .copied()
        .filter(|policy| !policy.is_wildcard())
        .collect();
    let level = if specific.is_empty() {
        candidates.to_vec()
    } else {
        specific
    };

    if level.len() > 1 {
        warn!(
            profession = %level[0].profession,
            rows = level.len(),
            "several active policies match at the same specificity; using the lowest id"
        );
    }

    level.into_iter().min_by_key(|policy| policy.id)
}
