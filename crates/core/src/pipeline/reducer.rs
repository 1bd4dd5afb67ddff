use crate::types::TaskResult;
use std::sync::Arc;

/// Binary combine function. Must be associative and commutative since
/// results arrive in no particular order.
pub type CombineFn = Arc<dyn Fn(i64, i64) -> i64 + Send + Sync>;

/// Explicit fold over unit results. Each worker folds its own results
/// into a partial; the partials are folded onto `initial` after the
/// barrier.
#[derive(Clone)]
pub struct Reducer {
    name: String,
    initial: i64,
    combine: CombineFn,
}

impl Reducer {
    pub fn new<F>(name: impl Into<String>, initial: i64, combine: F) -> Self
    where
        F: Fn(i64, i64) -> i64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            initial,
            combine: Arc::new(combine),
        }
    }

    /// Integer addition starting from 0
    pub fn sum() -> Self {
        Self::new("sum", 0, i64::wrapping_add)
    }

    pub fn max() -> Self {
        Self::new("max", i64::MIN, std::cmp::max)
    }

    pub fn min() -> Self {
        Self::new("min", i64::MAX, std::cmp::min)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial(&self) -> i64 {
        self.initial
    }

    /// Add one result to a worker-local partial
    pub fn absorb(&self, partial: Option<i64>, result: &TaskResult) -> Option<i64> {
        Some(match partial {
            None => result.value,
            Some(acc) => (self.combine)(acc, result.value),
        })
    }

    /// Fold worker partials onto the initial value
    pub fn finish<I>(&self, partials: I) -> i64
    where
        I: IntoIterator<Item = i64>,
    {
        partials.into_iter().fold(self.initial, |acc, v| (self.combine)(acc, v))
    }
}

impl Default for Reducer {
    fn default() -> Self {
        Self::sum()
    }
}

impl std::fmt::Debug for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reducer")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(reducer: &Reducer, values: &[i64]) -> Option<i64> {
        values.iter().enumerate().fold(None, |acc, (i, v)| {
            reducer.absorb(
                acc,
                &TaskResult {
                    index: i as u64,
                    value: *v,
                },
            )
        })
    }

    #[test]
    fn test_sum_is_split_independent() {
        let reducer = Reducer::sum();

        let whole = partial(&reducer, &[1, 2, 3, 4, 5]);
        let left = partial(&reducer, &[5, 3]);
        let right = partial(&reducer, &[2, 4, 1]);

        assert_eq!(reducer.finish(whole), 15);
        assert_eq!(reducer.finish(left.into_iter().chain(right)), 15);
    }

    #[test]
    fn test_empty_fold_is_initial() {
        assert_eq!(Reducer::sum().finish(None), 0);
        assert_eq!(Reducer::max().finish(Vec::new()), i64::MIN);
    }

    #[test]
    fn test_min_max() {
        let max = Reducer::max();
        let min = Reducer::min();
        assert_eq!(max.finish(partial(&max, &[3, -1, 9, 2])), 9);
        assert_eq!(min.finish(partial(&min, &[3, -1, 9, 2])), -1);
    }

    #[test]
    fn test_initial_applied_once() {
        let reducer = Reducer::new("offset_sum", 100, |a, b| a + b);
        let a = partial(&reducer, &[1, 1]);
        let b = partial(&reducer, &[1]);

        assert_eq!(reducer.name(), "offset_sum");
        assert_eq!(reducer.finish(a.into_iter().chain(b)), 103);
    }
}
