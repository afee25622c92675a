//! The iterator protocol over solution spaces.
//!
//! All iteration is "odometer" order: the last variable of the requested
//! order varies fastest. A dense iterator advances by adding a precomputed
//! signed step to the current flat index instead of recomputing the index
//! from scratch, which makes one advance O(variables) in the worst case and
//! O(1) amortised.

use crate::colony_assert_moderate;
use crate::colony_assert_simple;
use crate::statistics::CheckCounter;
use crate::values::DomainValue;
use crate::values::UtilityValue;

/// A solution iterator over a utility space.
///
/// `next_solution` returns a borrow of reusable internal storage: the slice
/// is only valid until the iterator is advanced again. Callers that need to
/// keep an assignment copy it out.
pub trait SpaceIter<V: DomainValue, U: UtilityValue> {
    /// The total number of solutions this iterator ranges over.
    fn solution_count(&self) -> u64;

    /// Whether any solution is left.
    ///
    /// A sparse iterator may still answer `true` when every remaining
    /// solution will be skipped; `next_utility` then returns `None`.
    fn has_next(&self) -> bool;

    /// Advances to the next solution and returns the current assignment.
    fn next_solution(&mut self) -> Option<&[V]>;

    /// Advances to the next solution and returns its utility.
    fn next_utility(&mut self) -> Option<U>;

    /// Advances until a utility strictly better than `bound` is found.
    ///
    /// This is the pruning primitive of projection: once no remaining
    /// solution can improve on `bound`, the scan stops at exhaustion.
    fn next_utility_past(&mut self, bound: U, minimize: bool) -> Option<U> {
        while let Some(util) = self.next_utility() {
            if (minimize && util < bound) || (!minimize && util > bound) {
                return Some(util);
            }
        }
        None
    }

    /// The current assignment, without advancing.
    fn current_solution(&self) -> Option<&[V]>;

    /// The utility of the current assignment, without advancing.
    ///
    /// Lazily computed views do the actual work here.
    fn current_utility(&mut self) -> Option<U>;

    /// Like [`current_utility`](Self::current_utility), but the caller
    /// only cares whether the utility beats `bound`: a lazy view may
    /// return a value clamped at `bound` once it can prove the true
    /// utility is no better.
    fn current_utility_within(&mut self, bound: U, minimize: bool) -> Option<U> {
        let _ = (bound, minimize);
        self.current_utility()
    }

    /// Overwrites the utility of the current solution, for iterators that
    /// build a table in place.
    fn set_current_utility(&mut self, util: U) {
        let _ = util;
        unimplemented!("this iterator cannot overwrite utilities");
    }

    /// The variable order of iteration.
    fn variable_order(&self) -> &[String];

    /// The iterated domains, aligned with
    /// [`variable_order`](Self::variable_order).
    fn iter_domains(&self) -> &[Vec<V>];
}

/// The product of domain sizes, asserting against overflow.
pub(crate) fn solution_product<V>(domains: &[Vec<V>]) -> u64 {
    let mut product: u64 = 1;
    for dom in domains {
        let next = product.checked_mul(dom.len() as u64);
        colony_assert_simple!(next.is_some(), "too many solutions in a space");
        product = next.unwrap_or(0);
    }
    product
}

/// Extends `order`/`doms` so that every space variable is covered, and
/// intersects the domains of shared variables with the space's.
///
/// An empty intersection leaves an empty domain in the output, which makes
/// the resulting iterator empty.
pub(crate) fn normalise_iteration<V: DomainValue>(
    space_vars: &[String],
    space_doms: &[Vec<V>],
    order: &[String],
    doms: &[Vec<V>],
) -> (Vec<String>, Vec<Vec<V>>) {
    colony_assert_simple!(
        order.len() == doms.len(),
        "an iteration order must pair every variable with a domain"
    );

    let mut out_order: Vec<String> = Vec::with_capacity(order.len() + space_vars.len());
    let mut out_doms: Vec<Vec<V>> = Vec::with_capacity(order.len() + space_vars.len());

    for (var, dom) in order.iter().zip(doms) {
        let restricted = match space_vars.iter().position(|name| name == var) {
            Some(index) => super::domain_intersection(&space_doms[index], dom).unwrap_or_default(),
            None => dom.clone(),
        };
        out_order.push(var.clone());
        out_doms.push(restricted);
    }

    for (var, dom) in space_vars.iter().zip(space_doms) {
        if !out_order.contains(var) {
            out_order.push(var.clone());
            out_doms.push(dom.clone());
        }
    }

    (out_order, out_doms)
}

/// The stepping machinery shared by the read-only and write-capable dense
/// iterators: the variable order, the signed per-variable step tables, and
/// the odometer state.
#[derive(Debug)]
pub(crate) struct DenseCursor<V> {
    order: Vec<String>,
    domains: Vec<Vec<V>>,
    /// `steps[i][k]` is the signed change of the flat index when variable
    /// `i` moves from domain position `k - 1` to `k`; `steps[i][0]` is the
    /// wrap-around step from the last position back to the first.
    steps: Vec<Vec<isize>>,
    val_indexes: Vec<usize>,
    solution: Vec<V>,
    util_index: isize,
    left: u64,
    total: u64,
    started: bool,
    live: bool,
}

impl<V: DomainValue> DenseCursor<V> {
    /// Builds a cursor over `values`-indexed space `(space_vars,
    /// space_doms)`, iterating in `order` over (sub-)domains `domains`.
    ///
    /// `order` must contain every space variable; variables foreign to the
    /// space get all-zero steps, so each of their values repeats the same
    /// utilities.
    pub(crate) fn new(
        space_vars: &[String],
        space_doms: &[Vec<V>],
        order: Vec<String>,
        domains: Vec<Vec<V>>,
    ) -> DenseCursor<V> {
        colony_assert_simple!(
            order.len() == domains.len(),
            "an iteration order must pair every variable with a domain"
        );

        let nbr_vars = order.len();
        let total = solution_product(&domains);

        // Absolute steps first: for variable `i` at domain position `k`,
        // the contribution of that value to the flat index.
        let mut abs_steps: Vec<Vec<isize>> = domains.iter().map(|dom| vec![0; dom.len()]).collect();
        let mut step: isize = 1;
        for (space_index, space_dom) in space_doms.iter().enumerate().rev() {
            let var = &space_vars[space_index];
            let order_index = order
                .iter()
                .position(|name| name == var)
                .unwrap_or_else(|| panic!("iteration order is missing the variable {var}"));

            for (k, value) in domains[order_index].iter().enumerate() {
                let position = space_dom.iter().position(|candidate| candidate == value);
                colony_assert_simple!(
                    position.is_some(),
                    "an iterated domain must be a sub-domain of the space's"
                );
                abs_steps[order_index][k] = position.unwrap_or(0) as isize * step;
            }
            step *= space_dom.len() as isize;
        }

        // The flat index of the very first assignment, then the absolute
        // steps become relative to the previous domain position.
        let mut util_index: isize = 0;
        let mut steps: Vec<Vec<isize>> = Vec::with_capacity(nbr_vars);
        for mut var_steps in abs_steps {
            if !var_steps.is_empty() {
                util_index += var_steps[0];
                let last = var_steps[var_steps.len() - 1];
                for k in (1..var_steps.len()).rev() {
                    var_steps[k] -= var_steps[k - 1];
                }
                var_steps[0] -= last;
            }
            steps.push(var_steps);
        }

        let solution: Vec<V> = domains.iter().filter_map(|dom| dom.first().copied()).collect();
        let live = total > 0;

        DenseCursor {
            val_indexes: vec![0; nbr_vars],
            solution,
            order,
            domains,
            steps,
            util_index,
            left: total,
            total,
            started: false,
            live,
        }
    }

    /// Moves to the next assignment and returns its flat index.
    pub(crate) fn advance(&mut self) -> Option<usize> {
        if self.left == 0 {
            self.live = false;
            return None;
        }
        self.left -= 1;

        if !self.started {
            self.started = true;
            return Some(self.util_index as usize);
        }

        for var_index in (0..self.order.len()).rev() {
            let dom = &self.domains[var_index];
            let val_index = self.val_indexes[var_index];
            if val_index == dom.len() - 1 {
                // Wrap this variable around and carry into the next one.
                self.val_indexes[var_index] = 0;
                self.solution[var_index] = dom[0];
                self.util_index += self.steps[var_index][0];
            } else {
                let val_index = val_index + 1;
                self.val_indexes[var_index] = val_index;
                self.solution[var_index] = dom[val_index];
                self.util_index += self.steps[var_index][val_index];
                break;
            }
        }

        Some(self.util_index as usize)
    }

    /// Marks the cursor as exhausted (used when a sparse scan runs dry).
    pub(crate) fn exhaust(&mut self) {
        self.left = 0;
        self.live = false;
    }

    pub(crate) fn current_index(&self) -> Option<usize> {
        if self.live && self.started {
            Some(self.util_index as usize)
        } else {
            None
        }
    }

    pub(crate) fn solution(&self) -> Option<&[V]> {
        if self.live && self.started {
            Some(&self.solution)
        } else {
            None
        }
    }

    pub(crate) fn has_next(&self) -> bool {
        self.left > 0
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn order(&self) -> &[String] {
        &self.order
    }

    pub(crate) fn domains(&self) -> &[Vec<V>] {
        &self.domains
    }
}

/// The dense (and, with a skipped utility, sparse) iterator over a
/// [`Hypercube`](super::Hypercube).
#[derive(Debug)]
pub struct HypercubeIter<'a, V, U> {
    cursor: DenseCursor<V>,
    values: &'a [U],
    skip: Option<U>,
    current: Option<U>,
    checks: Option<CheckCounter>,
}

impl<'a, V: DomainValue, U: UtilityValue> HypercubeIter<'a, V, U> {
    pub(crate) fn new(
        cursor: DenseCursor<V>,
        values: &'a [U],
        skip: Option<U>,
        checks: Option<CheckCounter>,
    ) -> HypercubeIter<'a, V, U> {
        HypercubeIter {
            cursor,
            values,
            skip,
            current: None,
            checks,
        }
    }

    fn read(&mut self, index: usize) -> U {
        if let Some(checks) = &self.checks {
            checks.increment(1);
        }
        self.values[index]
    }

    /// Advances once, then keeps advancing past utilities equal to `skip`.
    ///
    /// Returns the utility of the landed-on solution, or `None` when the
    /// remaining solutions were all skipped.
    fn advance_feasible(&mut self, skip: U) -> Option<U> {
        let mut index = self.cursor.advance()?;

        let mut util = self.read(index);
        while util == skip {
            if !self.cursor.has_next() {
                self.cursor.exhaust();
                self.current = None;
                return None;
            }
            index = self.cursor.advance().unwrap_or(index);
            util = self.read(index);
        }
        self.current = Some(util);
        Some(util)
    }
}

impl<V: DomainValue, U: UtilityValue> SpaceIter<V, U> for HypercubeIter<'_, V, U> {
    fn solution_count(&self) -> u64 {
        self.cursor.total()
    }

    fn has_next(&self) -> bool {
        self.cursor.has_next()
    }

    fn next_solution(&mut self) -> Option<&[V]> {
        if !self.cursor.has_next() {
            self.cursor.exhaust();
            self.current = None;
            return None;
        }
        match self.skip {
            None => {
                let _ = self.cursor.advance();
                self.current = None;
            }
            Some(skip) => {
                self.advance_feasible(skip)?;
            }
        }
        self.cursor.solution()
    }

    fn next_utility(&mut self) -> Option<U> {
        if !self.cursor.has_next() {
            self.cursor.exhaust();
            self.current = None;
            return None;
        }
        match self.skip {
            None => {
                let index = self.cursor.advance()?;
                let util = self.read(index);
                self.current = Some(util);
                Some(util)
            }
            Some(skip) => self.advance_feasible(skip),
        }
    }

    fn current_solution(&self) -> Option<&[V]> {
        self.cursor.solution()
    }

    fn current_utility(&mut self) -> Option<U> {
        if self.current.is_none() {
            if let Some(index) = self.cursor.current_index() {
                let util = self.read(index);
                self.current = Some(util);
            }
        }
        self.current
    }

    fn variable_order(&self) -> &[String] {
        self.cursor.order()
    }

    fn iter_domains(&self) -> &[Vec<V>] {
        self.cursor.domains()
    }
}

/// A write-capable dense iterator, used to populate a table in place
/// (e.g. by the eager join). Performs no constraint-check accounting: the
/// table under construction is not being *queried*.
#[derive(Debug)]
pub(crate) struct HypercubeIterMut<'a, V, P> {
    cursor: DenseCursor<V>,
    values: &'a mut [P],
}

impl<'a, V: DomainValue, P: Clone> HypercubeIterMut<'a, V, P> {
    pub(crate) fn new(cursor: DenseCursor<V>, values: &'a mut [P]) -> HypercubeIterMut<'a, V, P> {
        HypercubeIterMut { cursor, values }
    }

    pub(crate) fn solution_count(&self) -> u64 {
        self.cursor.total()
    }

    pub(crate) fn has_next(&self) -> bool {
        self.cursor.has_next()
    }

    pub(crate) fn next_solution(&mut self) -> Option<&[V]> {
        let _ = self.cursor.advance()?;
        self.cursor.solution()
    }

    pub(crate) fn next_value(&mut self) -> Option<P> {
        let index = self.cursor.advance()?;
        Some(self.values[index].clone())
    }

    pub(crate) fn set_current_value(&mut self, value: P) {
        let index = self
            .cursor
            .current_index()
            .expect("cannot overwrite before the first advance");
        self.values[index] = value;
    }

    pub(crate) fn iter_domains(&self) -> &[Vec<V>] {
        self.cursor.domains()
    }
}

/// A plain odometer over a list of domains, used by iterators whose
/// solutions are not backed by a flat array (scalar spaces, lazy views).
///
/// Zero domains produce exactly one (empty) solution.
#[derive(Debug)]
pub(crate) struct Odometer<V> {
    domains: Vec<Vec<V>>,
    indexes: Vec<usize>,
    solution: Vec<V>,
    left: u64,
    total: u64,
    started: bool,
    live: bool,
}

impl<V: DomainValue> Odometer<V> {
    pub(crate) fn new(domains: Vec<Vec<V>>) -> Odometer<V> {
        let total = solution_product(&domains);
        let solution: Vec<V> = domains.iter().filter_map(|dom| dom.first().copied()).collect();
        colony_assert_moderate!(
            total == 0 || solution.len() == domains.len(),
            "a non-empty space cannot have an empty domain"
        );
        Odometer {
            indexes: vec![0; domains.len()],
            solution,
            live: total > 0,
            left: total,
            total,
            domains,
            started: false,
        }
    }

    pub(crate) fn advance(&mut self) -> bool {
        if self.left == 0 {
            self.live = false;
            return false;
        }
        self.left -= 1;

        if !self.started {
            self.started = true;
            return true;
        }

        for var_index in (0..self.domains.len()).rev() {
            let dom = &self.domains[var_index];
            let val_index = self.indexes[var_index];
            if val_index == dom.len() - 1 {
                self.indexes[var_index] = 0;
                self.solution[var_index] = dom[0];
            } else {
                self.indexes[var_index] = val_index + 1;
                self.solution[var_index] = dom[val_index + 1];
                break;
            }
        }
        true
    }

    pub(crate) fn exhaust(&mut self) {
        self.left = 0;
        self.live = false;
    }

    pub(crate) fn solution(&self) -> Option<&[V]> {
        if self.live && self.started {
            Some(&self.solution)
        } else {
            None
        }
    }

    pub(crate) fn has_next(&self) -> bool {
        self.left > 0
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn domains(&self) -> &[Vec<V>] {
        &self.domains
    }
}

/// The iterator of the null space: no variables, no solutions.
#[derive(Debug, Default)]
pub(crate) struct EmptyIter<V> {
    domains: [Vec<V>; 0],
}

impl<V> EmptyIter<V> {
    pub(crate) fn new() -> EmptyIter<V> {
        EmptyIter { domains: [] }
    }
}

impl<V: DomainValue, U: UtilityValue> SpaceIter<V, U> for EmptyIter<V> {
    fn solution_count(&self) -> u64 {
        0
    }

    fn has_next(&self) -> bool {
        false
    }

    fn next_solution(&mut self) -> Option<&[V]> {
        None
    }

    fn next_utility(&mut self) -> Option<U> {
        None
    }

    fn current_solution(&self) -> Option<&[V]> {
        None
    }

    fn current_utility(&mut self) -> Option<U> {
        None
    }

    fn variable_order(&self) -> &[String] {
        &[]
    }

    fn iter_domains(&self) -> &[Vec<V>] {
        &self.domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::Hypercube;
    use crate::spaces::UtilitySpace;
    use crate::spaces::test_helpers::*;
    use crate::statistics::CheckCounter;

    #[test]
    fn dense_iteration_follows_odometer_order() {
        let cube = two_var_cube();

        let mut iter = cube.iter();
        assert_eq!(4, iter.solution_count());
        assert_eq!(
            vec![3, 1, 2, 4],
            std::iter::from_fn(|| iter.next_utility()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn a_permuted_order_revisits_every_utility() {
        let cube = two_var_cube();

        let order = vars(&["b", "a"]);
        let doms = vec![vec![0, 1], vec![0, 1]];
        let mut iter = cube.iter_over(&order, &doms, None);
        assert_eq!(
            vec![3, 2, 1, 4],
            std::iter::from_fn(|| iter.next_utility()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn every_visited_solution_decodes_back_to_its_utility() {
        // The step-encoding round-trip, for all permutations of a
        // three-variable order.
        let cube = Hypercube::new(
            vars(&["x", "y", "z"]),
            vec![vec![0, 1], vec![0, 1, 2], vec![0, 1]],
            (0..12).collect(),
            i32::min_infinity(),
        );

        for order in [
            vars(&["x", "y", "z"]),
            vars(&["x", "z", "y"]),
            vars(&["y", "x", "z"]),
            vars(&["y", "z", "x"]),
            vars(&["z", "x", "y"]),
            vars(&["z", "y", "x"]),
        ] {
            let doms: Vec<Vec<i32>> = order
                .iter()
                .map(|var| cube.domain_of(var).expect("known variable").to_vec())
                .collect();
            let mut iter = cube.iter_over(&order, &doms, None);
            let mut visited = 0;
            loop {
                let Some(solution) = iter.next_solution() else {
                    break;
                };
                let solution = solution.to_vec();
                assert_eq!(
                    cube.utility_named(&order, &solution),
                    iter.current_utility(),
                    "order {order:?}, solution {solution:?}"
                );
                visited += 1;
            }
            assert_eq!(12, visited);
        }
    }

    #[test]
    fn sub_domain_iteration_restricts_the_scan() {
        let cube = two_var_cube();

        let order = vars(&["a", "b"]);
        let doms = vec![vec![1], vec![0, 1]];
        let mut iter = cube.iter_over(&order, &doms, None);
        assert_eq!(
            vec![2, 4],
            std::iter::from_fn(|| iter.next_utility()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn foreign_variables_repeat_the_utilities() {
        let cube = two_var_cube();

        let order = vars(&["w", "a", "b"]);
        let doms = vec![vec![0, 1], vec![0, 1], vec![0, 1]];
        let mut iter = cube.iter_over(&order, &doms, None);
        assert_eq!(
            vec![3, 1, 2, 4, 3, 1, 2, 4],
            std::iter::from_fn(|| iter.next_utility()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn variables_missing_from_the_order_are_appended() {
        let cube = two_var_cube();

        let order = vars(&["b"]);
        let doms = vec![vec![0, 1]];
        let iter = cube.iter_over(&order, &doms, None);
        assert_eq!(vars(&["b", "a"]), iter.variable_order());
        assert_eq!(4, iter.solution_count());
    }

    #[test]
    fn the_sparse_iterator_skips_infeasible_solutions() {
        let inf = i32::min_infinity();
        let cube = Hypercube::new(
            vars(&["a", "b"]),
            vec![vec![0, 1], vec![0, 1]],
            vec![inf, 7, inf, inf],
            inf,
        );

        let mut iter = cube.sparse_iter();
        assert_eq!(Some(7), iter.next_utility());
        assert_eq!(Some(vec![0, 1]), iter.current_solution().map(<[i32]>::to_vec));
        // The all-infeasible tail exhausts instead of looping.
        assert_eq!(None, iter.next_utility());
        assert_eq!(None, iter.current_solution().map(<[i32]>::to_vec));
    }

    #[test]
    fn an_entirely_infeasible_space_sparse_iterates_to_nothing() {
        let inf = i32::min_infinity();
        let cube = Hypercube::new(vars(&["a"]), vec![vec![0, 1]], vec![inf, inf], inf);

        let mut iter = cube.sparse_iter();
        assert_eq!(None, iter.next_solution().map(<[i32]>::to_vec));
        assert_eq!(None, iter.next_utility());
    }

    #[test]
    fn bounded_iteration_stops_at_the_first_improvement() {
        let cube = two_var_cube();

        let mut iter = cube.iter();
        assert_eq!(Some(3), iter.next_utility_past(2, false));

        // Past 3 the scan skips 1 and 2 and lands on 4; past 4 it
        // exhausts.
        let mut iter = cube.iter();
        assert_eq!(Some(4), iter.next_utility_past(3, false));
        assert_eq!(None, iter.next_utility_past(4, false));
    }

    #[test]
    fn an_empty_domain_intersection_yields_an_empty_iterator() {
        let cube = two_var_cube();

        let order = vars(&["a", "b"]);
        let doms = vec![vec![7], vec![0, 1]];
        let mut iter = cube.iter_over(&order, &doms, None);
        assert_eq!(0, iter.solution_count());
        assert!(!iter.has_next());
        assert_eq!(None, iter.next_utility());
    }

    #[test]
    fn iteration_counts_one_check_per_utility_read() {
        let mut cube = two_var_cube();
        let checks = CheckCounter::new();
        cube.attach_checks(checks.clone());

        let mut iter = cube.iter();
        while iter.next_utility().is_some() {}
        drop(iter);
        assert_eq!(4, checks.count());

        // Advancing without demanding utilities reads nothing.
        checks.reset();
        let mut iter = cube.iter();
        while iter.next_solution().is_some() {}
        drop(iter);
        assert_eq!(0, checks.count());
    }
}
