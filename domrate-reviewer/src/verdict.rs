//! Verdict computation (§4.9): out of scope as a real data-source concern,
//! so the shipped policy is the minimal deterministic rule needed to
//! exercise the pipeline end-to-end — deny if any module recorded an error
//! for the request, permit otherwise.

use domrate_common::persistence::{Persistence, PersistenceError};
use domrate_common::types::Access;

pub fn compute(persistence: &dyn Persistence, request_id: u64) -> Result<(Access, Option<String>), PersistenceError> {
    let errors = persistence.errors_for(request_id)?;
    match errors.first() {
        Some(first) => Ok((Access::Denied, Some(first.comment.clone()))),
        None => Ok((Access::Permitted, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domrate_common::JsonlPersistence;

    #[test]
    fn no_errors_permits() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonlPersistence::open(dir.path().join("journal.jsonl")).unwrap();
        persistence.insert_module_record(1, "ASN", serde_json::json!({"asn": 1})).unwrap();
        let (access, comment) = compute(&persistence, 1).unwrap();
        assert_eq!(access, Access::Permitted);
        assert!(comment.is_none());
    }

    #[test]
    fn any_error_denies_with_its_comment() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonlPersistence::open(dir.path().join("journal.jsonl")).unwrap();
        persistence.insert_error(1, "ASN", "Module depends on finally failed module").unwrap();
        let (access, comment) = compute(&persistence, 1).unwrap();
        assert_eq!(access, Access::Denied);
        assert_eq!(comment.as_deref(), Some("Module depends on finally failed module"));
    }
}
