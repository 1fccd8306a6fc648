use rand::seq::SliceRandom;
use rand::Rng;

use crate::question::Question;

/// Pick up to `count` distinct questions whose subject is in `subjects`, in random order.
///
/// Asking for more than the pool holds returns the whole filtered pool.
pub fn select_questions(pool: &[Question], subjects: &[String], count: usize) -> Vec<Question> {
    select_questions_with(pool, subjects, count, &mut rand::thread_rng())
}

pub fn select_questions_with<R: Rng + ?Sized>(
    pool: &[Question],
    subjects: &[String],
    count: usize,
    rng: &mut R,
) -> Vec<Question> {
    let mut available: Vec<&Question> = pool
        .iter()
        .filter(|q| subjects.iter().any(|s| *s == q.subject))
        .collect();

    available.shuffle(rng);
    available.into_iter().take(count).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::fixtures::{pool, question};
    use std::collections::HashSet;

    fn subjects(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn only_selected_subjects() {
        let mut qs = pool("Math", 1..=5);
        qs.extend(pool("History", 6..=10));

        let picked = select_questions(&qs, &subjects(&["History"]), 3);

        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|q| q.subject == "History"));
    }

    #[test]
    fn never_repeats_a_question() {
        let qs = pool("Math", 1..=20);
        let picked = select_questions(&qs, &subjects(&["Math"]), 20);

        let ids: HashSet<i64> = picked.iter().map(|q| q.id).collect();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn short_pool_returns_everything_available() {
        let mut qs = pool("Math", 1..=3);
        qs.push(question(99, "Art", 0));

        let picked = select_questions(&qs, &subjects(&["Math"]), 10);

        let ids: HashSet<i64> = picked.iter().map(|q| q.id).collect();
        assert_eq!(ids, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn no_matching_subject_yields_empty() {
        let qs = pool("Math", 1..=3);
        assert!(select_questions(&qs, &subjects(&["Latin"]), 2).is_empty());
        assert!(select_questions(&qs, &[], 2).is_empty());
    }

    #[test]
    fn zero_count_yields_empty() {
        let qs = pool("Math", 1..=3);
        assert!(select_questions(&qs, &subjects(&["Math"]), 0).is_empty());
    }
}
