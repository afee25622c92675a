//! Eager projection: variable elimination by optimisation.

use log::trace;

use super::ProjOutput;
use super::Space;
use super::UtilitySpace;
use super::hypercube::Hypercube;
use super::iter::solution_product;
use super::scalar::ScalarSpace;
use crate::colony_assert_simple;
use crate::values::DomainValue;
use crate::values::UtilityValue;

/// Eliminates `vars_out` by keeping, for every assignment to the remaining
/// variables, the optimal utility and one optimal assignment to the
/// eliminated variables. Ties break towards the first optimum found in
/// iteration order.
pub(crate) fn project<V: DomainValue, U: UtilityValue>(
    space: &dyn UtilitySpace<V, U>,
    vars_out: &[String],
    maximize: bool,
) -> ProjOutput<V, U> {
    if space.is_null() {
        return ProjOutput {
            space: Space::Null,
            vars_out: vars_out.to_vec(),
            assignments: Space::Null,
        };
    }

    colony_assert_simple!(
        vars_out.iter().all(|var| space.domain_of(var).is_some()),
        "a space must contain all the variables being projected out"
    );

    if vars_out.is_empty() {
        return ProjOutput {
            space: space.resolve(),
            vars_out: Vec::new(),
            assignments: Space::Null,
        };
    }
    if vars_out.len() == space.variables().len() {
        return project_all_over(space, maximize, vars_out);
    }

    // Iterate with the kept variables outermost, so each kept assignment
    // owns one contiguous block of eliminated-variable assignments.
    let mut kept_vars: Vec<String> = Vec::new();
    let mut kept_doms: Vec<Vec<V>> = Vec::new();
    for (var, dom) in space.variables().iter().zip(space.domains()) {
        if !vars_out.contains(var) {
            kept_vars.push(var.clone());
            kept_doms.push(dom.clone());
        }
    }
    let mut order = kept_vars.clone();
    let mut order_doms = kept_doms.clone();
    for var in vars_out {
        order.push(var.clone());
        order_doms.push(
            space
                .domain_of(var)
                .expect("projected variables are present")
                .to_vec(),
        );
    }

    let nbr_kept = solution_product(&kept_doms);
    let nbr_out = space.solution_count() / nbr_kept;
    let infeasible = space.infeasible();
    trace!(
        "projecting {} variables out of {}: {} blocks of {}",
        vars_out.len(),
        space.variables().len(),
        nbr_kept,
        nbr_out
    );

    let mut iter = space.iter_over(&order, &order_doms, None);
    let kept_len = kept_vars.len();
    let mut opt_utils: Vec<U> = Vec::with_capacity(nbr_kept as usize);
    let mut opt_sols: Vec<Vec<V>> = Vec::with_capacity(nbr_kept as usize);

    for _ in 0..nbr_kept {
        let _ = iter.next_solution();
        let mut opt_util = iter.current_utility().unwrap_or(infeasible);
        let mut opt_sol: Vec<V> = iter
            .current_solution()
            .map(|solution| solution[kept_len..].to_vec())
            .unwrap_or_default();

        for _ in 1..nbr_out {
            let _ = iter.next_solution();
            // The bounded peek lets a lazy view stop computing as soon as
            // it can prove the utility is no better than the optimum.
            let util = iter
                .current_utility_within(opt_util, !maximize)
                .unwrap_or(infeasible);
            let improves = if maximize { util > opt_util } else { util < opt_util };
            if improves {
                opt_util = util;
                if let Some(solution) = iter.current_solution() {
                    opt_sol = solution[kept_len..].to_vec();
                }
            }
        }

        opt_utils.push(opt_util);
        opt_sols.push(opt_sol);
    }

    ProjOutput {
        space: Space::Hypercube(Hypercube::new(
            kept_vars.clone(),
            kept_doms.clone(),
            opt_utils,
            infeasible,
        )),
        vars_out: vars_out.to_vec(),
        assignments: Space::Hypercube(Hypercube::assignments(kept_vars, kept_doms, opt_sols)),
    }
}

/// Projects out every variable of the space.
pub(crate) fn project_all<V: DomainValue, U: UtilityValue>(
    space: &dyn UtilitySpace<V, U>,
    maximize: bool,
) -> ProjOutput<V, U> {
    let vars_out = space.variables().to_vec();
    if vars_out.is_empty() {
        return ProjOutput {
            space: space.resolve(),
            vars_out,
            assignments: Space::Null,
        };
    }
    project_all_over(space, maximize, &vars_out)
}

fn project_all_over<V: DomainValue, U: UtilityValue>(
    space: &dyn UtilitySpace<V, U>,
    maximize: bool,
    vars_out: &[String],
) -> ProjOutput<V, U> {
    let infeasible = space.infeasible();
    let mut iter = space.iter();

    let _ = iter.next_solution();
    let mut opt_util = iter.current_utility().unwrap_or(infeasible);
    let mut opt_sol: Vec<V> = iter
        .current_solution()
        .map(<[V]>::to_vec)
        .unwrap_or_default();

    while iter.has_next() {
        let _ = iter.next_solution();
        let util = iter
            .current_utility_within(opt_util, !maximize)
            .unwrap_or(infeasible);
        let improves = if maximize { util > opt_util } else { util < opt_util };
        if improves {
            opt_util = util;
            if let Some(solution) = iter.current_solution() {
                opt_sol = solution.to_vec();
            }
        }
    }

    // Order the recorded assignment by `vars_out` rather than by the
    // iteration order.
    let order = iter.variable_order().to_vec();
    drop(iter);
    let ordered: Vec<V> = vars_out
        .iter()
        .map(|var| {
            let position = order
                .iter()
                .position(|name| name == var)
                .expect("every projected variable is iterated");
            opt_sol[position]
        })
        .collect();

    ProjOutput {
        space: Space::Scalar(ScalarSpace::new(opt_util, infeasible)),
        vars_out: vars_out.to_vec(),
        assignments: Space::Scalar(ScalarSpace::assignment(ordered)),
    }
}

/// The optimal utility over all solutions, discarding the assignment.
pub(crate) fn blind_project_all<V: DomainValue, U: UtilityValue>(
    space: &dyn UtilitySpace<V, U>,
    maximize: bool,
) -> U {
    let infeasible = if maximize {
        U::min_infinity()
    } else {
        U::plus_infinity()
    };

    let mut iter = space.iter_over(space.variables(), space.domains(), Some(infeasible));
    let Some(mut optimum) = iter.next_utility() else {
        return infeasible;
    };
    while let Some(util) = iter.next_utility() {
        optimum = if maximize {
            optimum.max(util)
        } else {
            optimum.min(util)
        };
    }
    optimum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::UtilitySpaceExt;
    use crate::spaces::test_helpers::*;

    #[test]
    fn projecting_one_variable_keeps_the_argmax() {
        // Project b out of [3, 1, 2, 4]: space over a = [3, 4], with the
        // companion b=0 for a=0 and b=1 for a=1.
        let cube = two_var_cube();
        let output = UtilitySpaceExt::<i32, i32>::project(&cube, &vars(&["b"]), true);

        let Space::Hypercube(space) = &output.space else {
            panic!("expected a dense space");
        };
        assert_eq!(vars(&["a"]), space.variables());
        assert_eq!(vec![3, 4], space.raw_values().to_vec());

        assert_eq!(vars(&["b"]), output.vars_out);
        let Space::Hypercube(assignments) = &output.assignments else {
            panic!("expected a dense companion");
        };
        assert_eq!(Some(vec![0]), assignments.payload(&[0]));
        assert_eq!(Some(vec![1]), assignments.payload(&[1]));
    }

    #[test]
    fn projecting_towards_the_minimum() {
        let cube = two_var_cube();
        let output = UtilitySpaceExt::<i32, i32>::project(&cube, &vars(&["b"]), false);

        let Space::Hypercube(space) = &output.space else {
            panic!("expected a dense space");
        };
        assert_eq!(vec![1, 2], space.raw_values().to_vec());
    }

    #[test]
    fn ties_break_towards_the_first_optimum() {
        let cube = Hypercube::new(
            vars(&["a", "b"]),
            vec![vec![0, 1], vec![0, 1]],
            vec![5, 5, 2, 2],
            i32::min_infinity(),
        );

        let output = UtilitySpaceExt::<i32, i32>::project(&cube, &vars(&["b"]), true);
        let Space::Hypercube(assignments) = &output.assignments else {
            panic!("expected a dense companion");
        };
        assert_eq!(Some(vec![0]), assignments.payload(&[0]));
        assert_eq!(Some(vec![0]), assignments.payload(&[1]));
    }

    #[test]
    fn projecting_zero_variables_is_a_clone_without_companion() {
        let cube = two_var_cube();
        let output = UtilitySpaceExt::<i32, i32>::project(&cube, &[], true);

        assert_eq!(Space::Hypercube(cube), output.space);
        assert_eq!(Space::Null, output.assignments);
    }

    #[test]
    fn projecting_every_variable_yields_scalars() {
        let cube = two_var_cube();
        let output = UtilitySpaceExt::<i32, i32>::project_all(&cube, true);

        assert_eq!(
            Space::Scalar(ScalarSpace::new(4, i32::min_infinity())),
            output.space
        );
        assert_eq!(
            Space::Scalar(ScalarSpace::assignment(vec![1, 1])),
            output.assignments
        );
    }

    #[test]
    fn projecting_the_null_space_stays_null() {
        let null: Space<i32, i32> = Space::Null;
        let output = null.project(&vars(&["a"]), true);

        assert_eq!(Space::Null, output.space);
        assert_eq!(Space::Null, output.assignments);
    }

    #[test]
    fn infeasible_blocks_stay_infeasible() {
        let inf = i32::min_infinity();
        let cube = Hypercube::new(
            vars(&["a", "b"]),
            vec![vec![0, 1], vec![0, 1]],
            vec![inf, inf, 3, inf],
            inf,
        );

        let output = UtilitySpaceExt::<i32, i32>::project(&cube, &vars(&["b"]), true);
        let Space::Hypercube(space) = &output.space else {
            panic!("expected a dense space");
        };
        assert_eq!(vec![inf, 3], space.raw_values().to_vec());
    }

    #[test]
    fn blind_projection_of_everything_is_just_the_optimum() {
        let cube = two_var_cube();

        assert_eq!(4, UtilitySpaceExt::<i32, i32>::blind_project_all(&cube, true));
        assert_eq!(1, UtilitySpaceExt::<i32, i32>::blind_project_all(&cube, false));
    }

    #[test]
    fn blind_projection_of_an_all_infeasible_space_is_infeasible() {
        let inf = i32::min_infinity();
        let cube = Hypercube::new(vars(&["a"]), vec![vec![0, 1]], vec![inf, inf], inf);

        assert_eq!(inf, UtilitySpaceExt::<i32, i32>::blind_project_all(&cube, true));
    }

    #[test]
    fn projection_on_a_lazy_join_matches_projection_on_its_resolution() {
        let a = two_var_cube();
        let b = Hypercube::new(
            vars(&["b", "c"]),
            vec![vec![0, 1], vec![0, 1]],
            vec![5, 1, 0, 8],
            i32::min_infinity(),
        );

        let view = a.join(&b, super::super::Combine::Add).expect("not null");
        let from_view = UtilitySpaceExt::<i32, i32>::project(&view, &vars(&["c"]), true);
        let from_dense = view.resolve().project(&vars(&["c"]), true);

        assert!(from_view.space.equivalent(&from_dense.space));
    }
}
