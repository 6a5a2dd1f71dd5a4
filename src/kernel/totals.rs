use serde::{Deserialize, Serialize};

use super::scene::SceneRecord;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionTotals {
    pub correct_answers: u64,
    pub wrong_answers: u64,
    pub score: i64,
    pub time_spent: f64,
    /// Percentage, 0..=100.
    pub accuracy: f64,
}

/// Pure fold over closed scene records.
pub fn compute_totals<'a, I>(records: I) -> SessionTotals
where
    I: IntoIterator<Item = &'a SceneRecord>,
{
    let mut totals = SessionTotals::default();

    for record in records {
        totals.correct_answers += u64::from(record.correct_answers);
        totals.wrong_answers += u64::from(record.wrong_answers);
        totals.score = totals.score.saturating_add(record.score);
        totals.time_spent += record.time_spent;
    }

    totals.accuracy = accuracy(totals.correct_answers, totals.wrong_answers);
    totals
}

/// `correct / (correct + wrong) * 100`, or exactly zero with no answers.
pub fn accuracy(correct: u64, wrong: u64) -> f64 {
    let answered = correct + wrong;
    if answered == 0 {
        0.0
    } else {
        correct as f64 / answered as f64 * 100.0
    }
}
