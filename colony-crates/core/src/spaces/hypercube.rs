//! The dense utility table.

use std::borrow::Cow;

use itertools::Itertools;
use rand::Rng;

use super::Payload;
use super::Space;
use super::SpaceIter;
use super::UtilitySpace;
use super::domain_intersection;
use super::iter::DenseCursor;
use super::iter::HypercubeIter;
use super::iter::HypercubeIterMut;
use super::iter::Odometer;
use super::iter::normalise_iteration;
use super::iter::solution_product;
use super::scalar::ScalarSpace;
use crate::colony_assert_moderate;
use crate::colony_assert_simple;
use crate::containers::HashMap;
use crate::statistics::CheckCounter;
use crate::values::DomainValue;
use crate::values::UtilityValue;

/// A dense table storing one payload per combination of variable values.
///
/// The flat index of an assignment is the sum of per-variable *steps*: a
/// variable at domain position `p` contributes `p` times the product of
/// the domain sizes of all later variables. Each variable owns a
/// precomputed map from its values to their step, so a point lookup is a
/// hash lookup per variable rather than a product recomputation. The step
/// maps are rebuilt whenever the variables, the domains or their order
/// change.
///
/// The payload type is usually a utility, but projection stores its
/// conditional optimal assignments in a hypercube too (`P = Vec<V>`), so
/// only the operations that actually add or compare utilities require
/// [`UtilityValue`].
#[derive(Clone, Debug)]
pub struct Hypercube<V, P> {
    name: String,
    relation: String,
    owner: Option<String>,
    variables: Vec<String>,
    domains: Vec<Vec<V>>,
    values: Vec<P>,
    infeasible: Option<P>,
    steps: Vec<HashMap<V, usize>>,
    checks: Option<CheckCounter>,
}

impl<V: PartialEq, P: PartialEq> PartialEq for Hypercube<V, P> {
    /// Variable-order-sensitive equality; names and owners are metadata
    /// and do not participate.
    fn eq(&self, other: &Hypercube<V, P>) -> bool {
        self.variables == other.variables
            && self.domains == other.domains
            && self.values == other.values
            && self.infeasible == other.infeasible
    }
}

impl<V: DomainValue, P: Payload> Hypercube<V, P> {
    /// Creates a new hypercube.
    ///
    /// `values` is in odometer order: the first utility corresponds to
    /// every variable taking its first (smallest) domain value, and the
    /// last variable varies fastest. Domains must be sorted ascending and
    /// duplicate-free; several operators rely on this to detect no-op
    /// reorderings.
    pub fn new(
        variables: Vec<String>,
        domains: Vec<Vec<V>>,
        values: Vec<P>,
        infeasible: P,
    ) -> Hypercube<V, P> {
        Hypercube::from_parts(variables, domains, values, Some(infeasible))
    }

    /// Creates a companion space of conditional assignments, which has no
    /// infeasible sentinel.
    pub fn assignments(
        variables: Vec<String>,
        domains: Vec<Vec<V>>,
        values: Vec<P>,
    ) -> Hypercube<V, P> {
        Hypercube::from_parts(variables, domains, values, None)
    }

    pub(crate) fn from_parts(
        variables: Vec<String>,
        domains: Vec<Vec<V>>,
        values: Vec<P>,
        infeasible: Option<P>,
    ) -> Hypercube<V, P> {
        colony_assert_simple!(
            !variables.is_empty(),
            "a hypercube must contain at least one variable"
        );
        colony_assert_simple!(
            variables.len() == domains.len(),
            "a hypercube must specify a domain for each of its variables"
        );
        colony_assert_simple!(
            domains.iter().all(|dom| !dom.is_empty()),
            "a hypercube cannot have an empty domain"
        );
        colony_assert_simple!(
            values.len() as u64 == solution_product(&domains),
            "a hypercube must specify a payload for every assignment"
        );
        colony_assert_moderate!(
            variables.iter().all_unique(),
            "a hypercube cannot contain the same variable twice"
        );
        colony_assert_moderate!(
            domains
                .iter()
                .all(|dom| dom.windows(2).all(|pair| pair[0] < pair[1])),
            "domains must be sorted ascending and duplicate-free"
        );

        let mut cube = Hypercube {
            name: String::new(),
            relation: String::new(),
            owner: None,
            variables,
            domains,
            values,
            infeasible,
            steps: Vec::new(),
            checks: None,
        };
        cube.rebuild_steps();
        cube
    }

    /// Rebuilds the per-variable value→step maps. Must be called after any
    /// change to the variables, the domains or their order.
    fn rebuild_steps(&mut self) {
        let mut step = self.values.len();
        self.steps = self
            .domains
            .iter()
            .map(|dom| {
                step /= dom.len();
                dom.iter()
                    .enumerate()
                    .map(|(position, value)| (*value, position * step))
                    .collect()
            })
            .collect();
    }

    /// The name of this space, if any.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The name of the underlying relation, if any.
    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn set_relation(&mut self, relation: impl Into<String>) {
        self.relation = relation.into();
    }

    /// The agent owning this space, if any.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = Some(owner.into());
    }

    /// Attaches the counter that each raw utility lookup reports to.
    pub fn attach_checks(&mut self, checks: CheckCounter) {
        self.checks = Some(checks);
    }

    pub(crate) fn checks(&self) -> Option<&CheckCounter> {
        self.checks.as_ref()
    }

    /// The variables, in this hypercube's internal order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The domains, aligned with [`variables`](Self::variables).
    pub fn domains(&self) -> &[Vec<V>] {
        &self.domains
    }

    /// The position of `var` in the internal order.
    pub fn variable_index(&self, var: &str) -> Option<usize> {
        self.variables.iter().position(|name| name == var)
    }

    /// The domain of `var`, or `None` if the variable is absent.
    pub fn domain_of(&self, var: &str) -> Option<&[V]> {
        self.variable_index(var)
            .map(|index| self.domains[index].as_slice())
    }

    /// The number of assignments (and payloads) of this space.
    pub fn solution_count(&self) -> u64 {
        self.values.len() as u64
    }

    pub(crate) fn raw_values(&self) -> &[P] {
        &self.values
    }

    /// The flat index of an assignment given in the internal variable
    /// order, or `None` if some value is not in its variable's domain.
    ///
    /// `assignment` may be longer than the variable count; extra entries
    /// are ignored.
    pub fn index_of(&self, assignment: &[V]) -> Option<usize> {
        colony_assert_simple!(
            assignment.len() >= self.variables.len(),
            "an assignment must cover every variable"
        );
        let mut index = 0;
        for (steps, value) in self.steps.iter().zip(assignment) {
            index += steps.get(value)?;
        }
        Some(index)
    }

    fn decode_index(&self, mut index: usize) -> Vec<V> {
        let mut assignment = Vec::with_capacity(self.variables.len());
        let mut step = self.values.len();
        for dom in &self.domains {
            step /= dom.len();
            assignment.push(dom[index / step]);
            index %= step;
        }
        assignment
    }

    fn count_checks(&self, increment: u64) {
        if let Some(checks) = &self.checks {
            checks.increment(increment);
        }
    }

    /// The payload stored at a flat index.
    pub fn payload_at(&self, index: usize) -> Option<&P> {
        let payload = self.values.get(index);
        if payload.is_some() {
            self.count_checks(1);
        }
        payload
    }

    /// Overwrites the payload at a flat index.
    pub fn set_payload_at(&mut self, index: usize, payload: P) {
        colony_assert_simple!(index < self.values.len(), "payload index out of range");
        self.values[index] = payload;
    }

    /// The payload of a full assignment in the internal variable order.
    ///
    /// Returns `None` when the assignment covers too few variables; a
    /// value outside its domain yields the infeasible sentinel (`None`
    /// for companion spaces, which have none).
    pub fn payload(&self, assignment: &[V]) -> Option<P> {
        if assignment.len() < self.variables.len() {
            return None;
        }
        match self.index_of(assignment) {
            Some(index) => {
                self.count_checks(1);
                Some(self.values[index].clone())
            }
            None => self.infeasible.clone(),
        }
    }

    /// The payload of an assignment described by parallel `names` and
    /// `values` arrays, which may mention foreign variables but must
    /// cover all of this space's.
    pub fn payload_named(&self, names: &[String], values: &[V]) -> Option<P> {
        let mut assignment = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            let position = names.iter().position(|name| name == var)?;
            assignment.push(values[position]);
        }
        self.payload(&assignment)
    }

    /// The payload of an assignment described by a map.
    pub fn payload_map(&self, assignment: &HashMap<String, V>) -> Option<P> {
        let mut flat = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            flat.push(*assignment.get(var)?);
        }
        self.payload(&flat)
    }

    /// Overwrites the payload of an assignment in the internal order.
    /// Returns `false` (without writing) if the assignment does not map
    /// to a valid index.
    pub fn set_payload(&mut self, assignment: &[V], payload: P) -> bool {
        match self.index_of(assignment) {
            Some(index) => {
                self.values[index] = payload;
                true
            }
            None => false,
        }
    }

    /// Renames a variable in place. A no-op if `old` is absent.
    pub fn rename_variable(&mut self, old: &str, new: impl Into<String>) {
        if let Some(index) = self.variable_index(old) {
            self.variables[index] = new.into();
        }
    }

    /// A copy of this space with all variables renamed positionally.
    pub fn rename_all(&self, new_names: &[String]) -> Hypercube<V, P> {
        colony_assert_simple!(
            new_names.len() == self.variables.len(),
            "a new name must be provided for each variable"
        );
        let mut out = self.clone();
        out.variables = new_names.to_vec();
        out
    }

    /// A copy of this space using the given variable order.
    ///
    /// `order` must be a permutation of this space's variables. The
    /// utility-to-assignment mapping is preserved exactly; only the flat
    /// layout changes. Reordering performs no constraint checks.
    pub fn change_variables_order(&self, order: &[String]) -> Hypercube<V, P> {
        colony_assert_simple!(
            order.len() == self.variables.len()
                && order.iter().all(|var| self.variables.contains(var)),
            "the new order must be a permutation of the space's variables"
        );

        let new_domains: Vec<Vec<V>> = order
            .iter()
            .map(|var| self.domains[self.variable_index(var).unwrap_or(0)].clone())
            .collect();

        let mut cursor = DenseCursor::new(
            &self.variables,
            &self.domains,
            order.to_vec(),
            new_domains.clone(),
        );
        let mut new_values = Vec::with_capacity(self.values.len());
        while let Some(index) = cursor.advance() {
            new_values.push(self.values[index].clone());
        }

        let mut out =
            Hypercube::from_parts(order.to_vec(), new_domains, new_values, self.infeasible.clone());
        out.name.clone_from(&self.name);
        out.relation.clone_from(&self.relation);
        out.owner.clone_from(&self.owner);
        out.checks.clone_from(&self.checks);
        out
    }

    /// Reorders this space's variables in place.
    pub fn apply_change_variables_order(&mut self, order: &[String]) {
        *self = self.change_variables_order(order);
    }

    /// A copy of this space augmented with new variables, prepended to the
    /// variable order; the payloads are replicated accordingly.
    pub fn augment(&self, new_vars: &[String], new_doms: &[Vec<V>]) -> Hypercube<V, P> {
        colony_assert_simple!(
            new_vars.len() == new_doms.len(),
            "a domain must be specified for each new variable"
        );
        colony_assert_simple!(
            new_vars.iter().all(|var| !self.variables.contains(var)),
            "cannot augment with a variable the space already contains"
        );

        let factor = solution_product(new_doms);
        let mut values = Vec::with_capacity(self.values.len() * factor as usize);
        for _ in 0..factor {
            values.extend(self.values.iter().cloned());
        }

        let variables: Vec<String> = new_vars.iter().chain(&self.variables).cloned().collect();
        let domains: Vec<Vec<V>> = new_doms.iter().chain(&self.domains).cloned().collect();
        Hypercube::from_parts(variables, domains, values, self.infeasible.clone())
    }

    /// The slicing workhorse behind [`Space::slice`].
    ///
    /// Returns `None` when the slice is a no-op, so the caller can hand
    /// back the original space unchanged.
    pub(crate) fn slice_impl(&self, vars: &[String], sub_domains: &[Vec<V>]) -> Option<Space<V, P>> {
        colony_assert_simple!(
            vars.len() == sub_domains.len(),
            "a sub-domain must be provided for each sliced variable"
        );
        colony_assert_simple!(
            sub_domains.iter().all(|dom| !dom.is_empty()),
            "cannot slice onto an empty sub-domain"
        );
        colony_assert_moderate!(
            vars.iter().zip(sub_domains).all(|(var, dom)| {
                self.domain_of(var)
                    .is_none_or(|mine| dom.iter().all(|value| mine.contains(value)))
            }),
            "a slicing domain must be a subset of the variable's domain"
        );

        // The domains to iterate over: sliced where requested, full
        // elsewhere. Variables foreign to this space are ignored.
        let mut iter_doms: Vec<&[V]> = Vec::with_capacity(self.variables.len());
        let mut remaining: Vec<(String, Vec<V>)> = Vec::with_capacity(self.variables.len());
        for (my_var, my_dom) in self.variables.iter().zip(&self.domains) {
            match vars.iter().position(|var| var == my_var) {
                None => {
                    iter_doms.push(my_dom);
                    remaining.push((my_var.clone(), my_dom.clone()));
                }
                Some(position) => {
                    let sub = &sub_domains[position];
                    iter_doms.push(sub);
                    if sub.len() != 1 {
                        remaining.push((my_var.clone(), sub.clone()));
                    }
                }
            }
        }

        // No-op detection: every variable remains over its full domain.
        if remaining.len() == self.variables.len()
            && remaining
                .iter()
                .zip(&self.domains)
                .all(|((_, dom), mine)| dom == mine)
        {
            return None;
        }

        // All variables pinned to single values: collapse to a scalar.
        if remaining.is_empty() {
            let assignment: Vec<V> = iter_doms.iter().map(|dom| dom[0]).collect();
            let payload = self
                .payload(&assignment)
                .expect("a pinned assignment covers every variable");
            return Some(Space::Scalar(ScalarSpace::from_parts(
                payload,
                self.infeasible.clone(),
            )));
        }

        let iter_doms: Vec<Vec<V>> = iter_doms.iter().map(|dom| dom.to_vec()).collect();
        let mut cursor = DenseCursor::new(
            &self.variables,
            &self.domains,
            self.variables.clone(),
            iter_doms,
        );
        let mut new_values = Vec::with_capacity(solution_product(
            &remaining.iter().map(|(_, dom)| dom.clone()).collect::<Vec<_>>(),
        ) as usize);
        while let Some(index) = cursor.advance() {
            new_values.push(self.values[index].clone());
        }

        let (vars, doms): (Vec<String>, Vec<Vec<V>>) = remaining.into_iter().unzip();
        Some(Space::Hypercube(Hypercube::from_parts(
            vars,
            doms,
            new_values,
            self.infeasible.clone(),
        )))
    }

    /// Slices this space in place.
    pub fn apply_slice(&mut self, vars: &[String], sub_domains: &[Vec<V>]) -> Space<V, P> {
        match self.slice_impl(vars, sub_domains) {
            None => Space::Hypercube(self.clone()),
            Some(Space::Hypercube(cube)) => {
                *self = cube;
                Space::Hypercube(self.clone())
            }
            Some(other) => other,
        }
    }
}

impl<V: DomainValue, U: UtilityValue> Hypercube<V, U> {
    /// The infeasible utility: `-∞` when maximising, `+∞` when minimising.
    pub fn infeasible(&self) -> U {
        colony_assert_moderate!(
            self.infeasible.is_some(),
            "a utility space must carry an infeasible sentinel"
        );
        self.infeasible.unwrap_or_else(U::min_infinity)
    }

    /// The utility of a full assignment in the internal variable order.
    pub fn utility(&self, assignment: &[V]) -> Option<U> {
        self.payload(assignment)
    }

    /// Overwrites the utility of an assignment; `false` if the assignment
    /// does not map to a valid index.
    pub fn set_utility(&mut self, assignment: &[V], utility: U) -> bool {
        self.set_payload(assignment, utility)
    }

    pub(crate) fn iter_mut_over(
        &mut self,
        order: &[String],
        doms: &[Vec<V>],
    ) -> HypercubeIterMut<'_, V, U> {
        let (order, doms) = normalise_iteration(&self.variables, &self.domains, order, doms);
        let cursor = DenseCursor::new(&self.variables, &self.domains, order, doms);
        HypercubeIterMut::new(cursor, &mut self.values)
    }

    /// Sub-domains of this space's variables where the utility is strictly
    /// better than `threshold` for at least one assignment; the result is
    /// the slice of this space onto those sub-domains, or the null space
    /// when no assignment beats the threshold.
    pub fn split(&self, threshold: U, maximize: bool) -> Space<V, U> {
        let mut kept: Vec<Vec<V>> = vec![Vec::new(); self.variables.len()];

        let mut odometer = Odometer::new(self.domains.clone());
        let mut index = 0;
        while odometer.advance() {
            self.count_checks(1);
            let util = self.values[index];
            index += 1;
            let better = if maximize { util > threshold } else { util < threshold };
            if better {
                let solution = odometer.solution().unwrap_or(&[]);
                for (dom, value) in kept.iter_mut().zip(solution) {
                    if !dom.contains(value) {
                        dom.push(*value);
                    }
                }
            }
        }

        if kept.iter().any(Vec::is_empty) {
            return Space::Null;
        }
        for dom in &mut kept {
            dom.sort_unstable();
        }
        match self.slice_impl(&self.variables, &kept) {
            Some(space) => space,
            None => Space::Hypercube(self.clone()),
        }
    }

    /// Draws `nbr_samples` weighted samples from a one-variable
    /// probability space, returning each drawn value with its sample
    /// count. With `nbr_samples == 0` the true weights are returned
    /// instead (restricted to values of positive weight).
    pub fn sample(&self, nbr_samples: usize, rng: &mut impl Rng) -> HashMap<V, f64> {
        colony_assert_simple!(
            self.variables.len() == 1,
            "sampling is only defined for one-variable spaces"
        );

        let dom = &self.domains[0];
        let mut out = HashMap::default();

        if nbr_samples == 0 {
            for (value, weight) in dom.iter().zip(&self.values) {
                let weight = weight.as_f64();
                if weight > 0.0 {
                    let _ = out.insert(*value, weight);
                }
            }
            return out;
        }

        let mut cumulative = Vec::with_capacity(self.values.len());
        let mut sum = 0.0;
        for weight in &self.values {
            sum += weight.as_f64();
            cumulative.push(sum);
        }

        for _ in 0..nbr_samples {
            let draw: f64 = rng.gen::<f64>() * sum;
            if let Some(position) = cumulative.iter().position(|bound| *bound >= draw) {
                *out.entry(dom[position]).or_insert(0.0) += 1.0;
            }
        }
        out
    }

    /// Replaces each of `vars_out` in this space by the values recorded in
    /// `substitution` (a companion space produced by projection), playing
    /// the recorded assignments back to reconstruct the induced utility
    /// over the remaining variables.
    ///
    /// A null substitution, or one disjoint from this space's variables,
    /// yields a clone.
    pub fn compose(&self, vars_out: &[String], substitution: &Space<V, Vec<V>>) -> Space<V, U> {
        if substitution.is_null_space()
            || vars_out.iter().all(|var| !self.variables.contains(var))
        {
            return Space::Hypercube(self.clone());
        }

        let subst_vars = substitution.space_variables().to_vec();
        colony_assert_simple!(
            subst_vars.iter().all(|var| !vars_out.contains(var)),
            "a substitution cannot be expressed over the variables it substitutes"
        );

        // Output order: the substitution's variables first, then this
        // space's remaining variables.
        let mut out_vars = subst_vars.clone();
        for var in &self.variables {
            if !out_vars.contains(var) && !vars_out.contains(var) {
                out_vars.push(var.clone());
            }
        }

        let mut out_doms: Vec<Vec<V>> = Vec::with_capacity(out_vars.len());
        for var in &out_vars {
            let dom = match (substitution_domain(substitution, var), self.domain_of(var)) {
                (Some(theirs), Some(mine)) => match domain_intersection(mine, theirs) {
                    Some(dom) => dom,
                    None => return Space::Null,
                },
                (Some(theirs), None) => theirs.to_vec(),
                (None, Some(mine)) => mine.to_vec(),
                (None, None) => return Space::Null,
            };
            out_doms.push(dom);
        }

        // Every output assignment is looked up in this space after
        // substituting the recorded values for `vars_out`.
        let mut lookup_names = vars_out.to_vec();
        lookup_names.extend(out_vars.iter().cloned());
        let infeasible = self.infeasible();

        let mut out_values = Vec::with_capacity(solution_product(&out_doms) as usize);
        let mut odometer = Odometer::new(out_doms.clone());
        while odometer.advance() {
            let solution = odometer.solution().unwrap_or(&[]);
            let recorded = substitution
                .payload_named(&out_vars, solution)
                .expect("the substitution covers its own variables");
            colony_assert_simple!(
                recorded.len() == vars_out.len(),
                "the substitution must record a value for each substituted variable"
            );

            let in_domain = vars_out.iter().zip(&recorded).all(|(var, value)| {
                self.domain_of(var).is_none_or(|dom| dom.contains(value))
            });
            if !in_domain {
                out_values.push(infeasible);
                continue;
            }

            let mut lookup_values = recorded;
            lookup_values.extend_from_slice(solution);
            let util = self
                .utility_named(&lookup_names, &lookup_values)
                .unwrap_or(infeasible);
            out_values.push(util);
        }

        if out_vars.is_empty() {
            let utility = out_values.first().copied().unwrap_or(infeasible);
            Space::Scalar(ScalarSpace::new(utility, infeasible))
        } else {
            Space::Hypercube(Hypercube::new(out_vars, out_doms, out_values, infeasible))
        }
    }
}

fn substitution_domain<'a, V: DomainValue>(
    substitution: &'a Space<V, Vec<V>>,
    var: &str,
) -> Option<&'a [V]> {
    match substitution {
        Space::Hypercube(cube) => cube.domain_of(var),
        Space::Scalar(_) | Space::Null => None,
    }
}

impl<V: DomainValue, U: UtilityValue> UtilitySpace<V, U> for Hypercube<V, U> {
    fn as_dyn(&self) -> &dyn UtilitySpace<V, U> {
        self
    }

    fn variables(&self) -> &[String] {
        &self.variables
    }

    fn domains(&self) -> &[Vec<V>] {
        &self.domains
    }

    fn infeasible(&self) -> U {
        Hypercube::infeasible(self)
    }

    fn solution_count(&self) -> u64 {
        Hypercube::solution_count(self)
    }

    fn utility_named(&self, names: &[String], values: &[V]) -> Option<U> {
        self.payload_named(names, values)
    }

    fn iter_over<'s>(
        &'s self,
        order: &[String],
        doms: &[Vec<V>],
        skip: Option<U>,
    ) -> Box<dyn SpaceIter<V, U> + 's>
    where
        V: 's,
    {
        let (order, doms) = normalise_iteration(&self.variables, &self.domains, order, doms);
        let cursor = DenseCursor::new(&self.variables, &self.domains, order, doms);
        Box::new(HypercubeIter::new(
            cursor,
            &self.values,
            skip,
            self.checks.clone(),
        ))
    }

    fn resolve(&self) -> Space<V, U> {
        Space::Hypercube(self.clone())
    }
}

impl<V: DomainValue, U: UtilityValue> Hypercube<V, U> {
    /// Decodes a flat index back into an assignment; the inverse of
    /// [`index_of`](Self::index_of). Exposed for solution reconstruction
    /// from best-first iteration.
    pub fn assignment_of(&self, index: usize) -> Vec<V> {
        colony_assert_simple!(index < self.values.len(), "index out of range");
        self.decode_index(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::test_helpers::*;

    #[test]
    fn index_of_matches_the_odometer_layout() {
        let cube = two_var_cube();

        assert_eq!(Some(0), cube.index_of(&[0, 0]));
        assert_eq!(Some(1), cube.index_of(&[0, 1]));
        assert_eq!(Some(2), cube.index_of(&[1, 0]));
        assert_eq!(Some(3), cube.index_of(&[1, 1]));
        assert_eq!(None, cube.index_of(&[0, 5]));
    }

    #[test]
    fn index_round_trips_through_assignment_of() {
        let cube = Hypercube::new(
            vars(&["x", "y", "z"]),
            vec![vec![1, 2], vec![10, 20, 30], vec![0, 1]],
            (0..12).collect(),
            i32::min_infinity(),
        );

        for index in 0..12 {
            let assignment = cube.assignment_of(index);
            assert_eq!(Some(index), cube.index_of(&assignment));
        }
    }

    #[test]
    fn utility_lookups_follow_the_partial_assignment_contract() {
        let cube = two_var_cube();

        assert_eq!(Some(2), cube.utility(&[1, 0]));
        // Too few values assigned.
        assert_eq!(None, cube.utility(&[1]));
        // A value outside the domain is infeasible, not an error.
        assert_eq!(Some(i32::min_infinity()), cube.utility(&[1, 7]));
    }

    #[test]
    fn named_lookup_ignores_foreign_variables_but_requires_mine() {
        let cube = two_var_cube();

        let names = vars(&["c", "b", "a"]);
        assert_eq!(Some(1), cube.utility_named(&names, &[99, 1, 0]));
        assert_eq!(None, cube.utility_named(&vars(&["a", "c"]), &[0, 99]));
    }

    #[test]
    fn map_lookup_matches_named_lookup() {
        let cube = two_var_cube();

        let mut assignment = HashMap::default();
        let _ = assignment.insert("a".to_owned(), 1);
        let _ = assignment.insert("b".to_owned(), 1);
        assert_eq!(Some(4), cube.payload_map(&assignment));

        let _ = assignment.remove("b");
        assert_eq!(None, cube.payload_map(&assignment));
    }

    #[test]
    fn set_utility_rejects_invalid_assignments() {
        let mut cube = two_var_cube();

        assert!(cube.set_utility(&[0, 1], 42));
        assert_eq!(Some(42), cube.utility(&[0, 1]));
        assert!(!cube.set_utility(&[0, 9], 0));
    }

    #[test]
    fn reordering_preserves_the_utility_mapping() {
        let cube = Hypercube::new(
            vars(&["x", "y", "z"]),
            vec![vec![0, 1], vec![0, 1, 2], vec![0, 1]],
            (0..12).collect(),
            i32::min_infinity(),
        );

        for order in [
            vars(&["z", "y", "x"]),
            vars(&["y", "x", "z"]),
            vars(&["x", "z", "y"]),
        ] {
            let reordered = cube.change_variables_order(&order);
            assert_eq!(order, reordered.variables());

            for x in 0..2 {
                for y in 0..3 {
                    for z in 0..2 {
                        let names = vars(&["x", "y", "z"]);
                        assert_eq!(
                            cube.utility_named(&names, &[x, y, z]),
                            reordered.utility_named(&names, &[x, y, z]),
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn reordering_to_the_same_order_is_an_identity() {
        let cube = two_var_cube();
        assert_eq!(cube, cube.change_variables_order(&vars(&["a", "b"])));
    }

    #[test]
    fn renaming_keeps_the_values() {
        let mut cube = two_var_cube();
        cube.rename_variable("a", "alpha");

        assert_eq!(vars(&["alpha", "b"]), cube.variables());
        assert_eq!(Some(4), cube.utility_named(&vars(&["alpha", "b"]), &[1, 1]));

        let renamed = cube.rename_all(&vars(&["u", "v"]));
        assert_eq!(Some(4), renamed.utility_named(&vars(&["u", "v"]), &[1, 1]));
    }

    #[test]
    fn augmenting_replicates_the_utilities() {
        let cube = two_var_cube();
        let augmented = cube.augment(&vars(&["w"]), &[vec![0, 1, 2]]);

        assert_eq!(vars(&["w", "a", "b"]), augmented.variables());
        assert_eq!(12, augmented.solution_count());
        for w in 0..3 {
            assert_eq!(Some(2), augmented.utility(&[w, 1, 0]));
        }
    }

    #[test]
    fn slicing_a_single_variable_value() {
        // Slicing a=1 yields the table over b with utilities [2, 4].
        let cube = Space::Hypercube(two_var_cube());

        let sliced = cube.slice_values(&vars(&["a"]), &[1]);
        let Space::Hypercube(sliced) = sliced.as_ref() else {
            panic!("expected a dense space");
        };
        assert_eq!(vars(&["b"]), sliced.variables());
        assert_eq!(vec![2, 4], sliced.raw_values().to_vec());
    }

    #[test]
    fn slicing_everything_collapses_to_a_scalar() {
        let cube = Space::Hypercube(two_var_cube());

        let sliced = cube.slice_values(&vars(&["a", "b"]), &[1, 1]);
        assert_eq!(
            Space::Scalar(ScalarSpace::new(4, i32::min_infinity())),
            *sliced.as_ref()
        );
    }

    #[test]
    fn slicing_a_sub_domain_keeps_the_variable() {
        let cube = Hypercube::new(
            vars(&["x", "y"]),
            vec![vec![0, 1, 2], vec![0, 1]],
            vec![0, 1, 10, 11, 20, 21],
            i32::min_infinity(),
        );

        let space = Space::Hypercube(cube);
        let sliced = space.slice(&vars(&["x"]), &[vec![0, 2]]);
        let Space::Hypercube(sliced) = sliced.as_ref() else {
            panic!("expected a dense space");
        };
        assert_eq!(vec![0, 1, 20, 21], sliced.raw_values().to_vec());
    }

    #[test]
    fn apply_slice_mutates_in_place() {
        let mut cube = two_var_cube();
        let _ = cube.apply_slice(&vars(&["b"]), &[vec![1]]);

        assert_eq!(vars(&["a"]), cube.variables());
        assert_eq!(vec![1, 4], cube.raw_values().to_vec());
    }

    #[test]
    fn composition_plays_back_projected_assignments() {
        // Project b out, then compose the companion back in: the result
        // must equal the projection's utility at every kept assignment.
        use crate::spaces::UtilitySpaceExt;

        let cube = two_var_cube();
        let projected = UtilitySpaceExt::<i32, i32>::project(&cube, &vars(&["b"]), true);

        let composed = cube.compose(&vars(&["b"]), &projected.assignments);
        assert!(composed.equivalent(&projected.space));
    }

    #[test]
    fn composition_with_a_null_substitution_is_a_clone() {
        let cube = two_var_cube();
        let composed = cube.compose(&vars(&["b"]), &Space::Null);
        assert_eq!(Space::Hypercube(cube), composed);
    }

    #[test]
    fn split_drops_values_that_never_beat_the_threshold() {
        let cube = two_var_cube();

        // Only a=1, b=1 (utility 4) beats 3 when maximising.
        let Space::Hypercube(split) = cube.split(3, true) else {
            panic!("expected a dense space");
        };
        assert_eq!(vec![4], split.raw_values().to_vec());

        assert_eq!(Space::Null, cube.split(10, true));
    }

    #[test]
    fn sampling_zero_returns_the_true_weights() {
        let cube = Hypercube::new(
            vars(&["r"]),
            vec![vec![0, 1, 2]],
            vec![crate::values::Real::new(0.2), crate::values::Real::new(0.0), crate::values::Real::new(0.8)],
            crate::values::Real::min_infinity(),
        );

        let mut rng = rand::rngs::mock::StepRng::new(0, 0);
        let weights = cube.sample(0, &mut rng);
        assert_eq!(2, weights.len());
        assert_eq!(Some(&0.8), weights.get(&2));
    }

    #[test]
    fn lookups_report_constraint_checks() {
        let mut cube = two_var_cube();
        let checks = CheckCounter::new();
        cube.attach_checks(checks.clone());

        let _ = cube.utility(&[0, 0]);
        let _ = cube.utility(&[1, 1]);
        // An out-of-domain lookup never touches the array.
        let _ = cube.utility(&[9, 9]);

        assert_eq!(2, checks.count());
    }

    #[test]
    #[should_panic(expected = "at least one variable")]
    fn constructing_without_variables_fails_fast() {
        let _ = Hypercube::<i32, i32>::new(vec![], vec![], vec![0], i32::min_infinity());
    }

    #[test]
    #[should_panic(expected = "payload for every assignment")]
    fn constructing_with_a_short_utility_array_fails_fast() {
        let _ = Hypercube::<i32, i32>::new(
            vars(&["a"]),
            vec![vec![0, 1]],
            vec![0],
            i32::min_infinity(),
        );
    }
}
