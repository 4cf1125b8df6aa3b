//! Worker name allocation

use super::provider::Instance;
use crate::error::ProvisioningError;
use regex::Regex;
use std::sync::OnceLock;

const WORKER_MARKER: &str = "worker";

fn index_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("[0-9]+").expect("static regex"))
}

/// Numeric index of a worker name: the first digit run in a name containing `worker`
pub fn worker_index(name: &str) -> Option<u64> {
    if !name.contains(WORKER_MARKER) {
        return None;
    }
    index_pattern()
        .find(name)
        .and_then(|m| m.as_str().parse().ok())
}

/// Next worker name: highest existing index plus one, gaps are not reused
pub fn next_worker_name<'a, I>(names: I) -> Result<String, ProvisioningError>
where
    I: IntoIterator<Item = &'a str>,
{
    let max = names.into_iter().filter_map(worker_index).max().unwrap_or(0);
    let next = max.checked_add(1).ok_or_else(|| {
        ProvisioningError::CreateFailed("worker index space exhausted".to_string())
    })?;
    Ok(format!("{}{}", WORKER_MARKER, next))
}

/// [`next_worker_name`] over a provider inventory
pub fn next_worker_for(instances: &[Instance]) -> Result<String, ProvisioningError> {
    next_worker_name(instances.iter().map(|i| i.name.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_after_gap_uses_max() {
        assert_eq!(
            next_worker_name(["master", "worker1", "worker3"]).unwrap(),
            "worker4"
        );
    }

    #[test]
    fn test_first_worker_is_one() {
        assert_eq!(next_worker_name(["master"]).unwrap(), "worker1");
        assert_eq!(next_worker_name(Vec::<&str>::new()).unwrap(), "worker1");
    }

    #[test]
    fn test_ignores_numbered_non_workers() {
        assert_eq!(
            next_worker_name(["master7", "db12", "worker2"]).unwrap(),
            "worker3"
        );
    }

    #[test]
    fn test_worker_without_digits_is_skipped() {
        assert_eq!(worker_index("worker"), None);
        assert_eq!(worker_index("k8s-worker-10"), Some(8));
        assert_eq!(next_worker_name(["worker", "worker5"]).unwrap(), "worker6");
    }

    #[test]
    fn test_large_indexes_do_not_wrap() {
        assert_eq!(
            next_worker_name(["worker4294967295"]).unwrap(),
            "worker4294967296"
        );
    }

    #[test]
    fn test_exhausted_index_space_is_an_error() {
        let name = format!("worker{}", u64::MAX);
        let err = next_worker_name([name.as_str()]).unwrap_err();
        assert!(matches!(err, ProvisioningError::CreateFailed(_)));
    }
}
