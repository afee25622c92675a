//! Best-first iteration over a dense space.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::SpaceIter;
use super::hypercube::Hypercube;
use crate::values::DomainValue;
use crate::values::UtilityValue;

/// One (flat index, utility) pair awaiting service.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry<U> {
    util: U,
    index: usize,
}

#[derive(Debug)]
enum OrderedHeap<U> {
    Max(BinaryHeap<Entry<U>>),
    Min(BinaryHeap<Reverse<Entry<U>>>),
}

impl<U: UtilityValue> OrderedHeap<U> {
    fn pop(&mut self) -> Option<Entry<U>> {
        match self {
            OrderedHeap::Max(heap) => heap.pop(),
            OrderedHeap::Min(heap) => heap.pop().map(|entry| entry.0),
        }
    }

    fn len(&self) -> usize {
        match self {
            OrderedHeap::Max(heap) => heap.len(),
            OrderedHeap::Min(heap) => heap.len(),
        }
    }
}

/// Serves the solutions of a dense space best-utility-first.
///
/// All (index, utility) pairs are materialised up front, infeasible ones
/// filtered out, and the rest queued by utility — descending when
/// maximising, ascending when minimising. Callers stop polling once they
/// have seen enough good solutions.
#[derive(Debug)]
pub struct BestFirstIter<'a, V, U> {
    space: &'a Hypercube<V, U>,
    heap: OrderedHeap<U>,
    solution: Vec<V>,
    current: Option<U>,
    total: u64,
}

impl<'a, V: DomainValue, U: UtilityValue> BestFirstIter<'a, V, U> {
    pub(crate) fn new(space: &'a Hypercube<V, U>, maximize: bool) -> BestFirstIter<'a, V, U> {
        let infeasible = if maximize {
            U::min_infinity()
        } else {
            U::plus_infinity()
        };

        let feasible = space
            .raw_values()
            .iter()
            .enumerate()
            .filter(|(_, util)| **util != infeasible)
            .map(|(index, util)| Entry { util: *util, index });

        let heap = if maximize {
            OrderedHeap::Max(feasible.collect())
        } else {
            OrderedHeap::Min(feasible.map(Reverse).collect())
        };

        if let Some(checks) = space.checks() {
            checks.increment(space.solution_count());
        }

        let total = heap.len() as u64;
        BestFirstIter {
            space,
            heap,
            solution: Vec::new(),
            current: None,
            total,
        }
    }

    fn pop(&mut self) -> Option<U> {
        match self.heap.pop() {
            None => {
                self.current = None;
                self.solution.clear();
                None
            }
            Some(entry) => {
                self.solution = self.space.assignment_of(entry.index);
                self.current = Some(entry.util);
                self.current
            }
        }
    }
}

impl<V: DomainValue, U: UtilityValue> SpaceIter<V, U> for BestFirstIter<'_, V, U> {
    fn solution_count(&self) -> u64 {
        self.total
    }

    fn has_next(&self) -> bool {
        self.heap.len() > 0
    }

    fn next_solution(&mut self) -> Option<&[V]> {
        self.pop()?;
        Some(&self.solution)
    }

    fn next_utility(&mut self) -> Option<U> {
        self.pop()
    }

    fn current_solution(&self) -> Option<&[V]> {
        self.current.map(|_| self.solution.as_slice())
    }

    fn current_utility(&mut self) -> Option<U> {
        self.current
    }

    fn set_current_utility(&mut self, _util: U) {
        // The queued utilities are already fixed; overwriting the served
        // one would not feed back into the space.
    }

    fn variable_order(&self) -> &[String] {
        self.space.variables()
    }

    fn iter_domains(&self) -> &[Vec<V>] {
        self.space.domains()
    }
}

impl<V: DomainValue, U: UtilityValue> Hypercube<V, U> {
    /// An iterator serving solutions best-utility-first, infeasible
    /// solutions excluded.
    pub fn iter_best_first(&self, maximize: bool) -> BestFirstIter<'_, V, U> {
        BestFirstIter::new(self, maximize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::test_helpers::*;

    #[test]
    fn solutions_come_out_best_first() {
        let cube = two_var_cube();

        let mut iter = cube.iter_best_first(true);
        assert_eq!(
            vec![4, 3, 2, 1],
            std::iter::from_fn(|| iter.next_utility()).collect::<Vec<_>>()
        );

        let mut iter = cube.iter_best_first(false);
        assert_eq!(
            vec![1, 2, 3, 4],
            std::iter::from_fn(|| iter.next_utility()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn the_served_solution_matches_the_utility() {
        let cube = two_var_cube();
        let mut iter = cube.iter_best_first(true);

        let best = iter.next_solution().expect("space is feasible").to_vec();
        assert_eq!(vec![1, 1], best);
        assert_eq!(Some(4), iter.current_utility());
    }

    #[test]
    fn infeasible_solutions_are_filtered_out() {
        let inf = i32::min_infinity();
        let cube = Hypercube::new(
            vars(&["a", "b"]),
            vec![vec![0, 1], vec![0, 1]],
            vec![3, inf, inf, 4],
            inf,
        );

        let mut iter = cube.iter_best_first(true);
        assert_eq!(2, iter.solution_count());
        assert_eq!(Some(4), iter.next_utility());
        assert_eq!(Some(3), iter.next_utility());
        assert_eq!(None, iter.next_utility());
        assert!(iter.current_solution().is_none());
    }
}
