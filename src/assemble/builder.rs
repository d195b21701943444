//! Model assembly: vary-policy resolution, identifier assignment, and
//! staged write-back.
//!
//! For every active submodel instance the builder walks the registry's
//! declared arguments, selects each argument's active use-case, and
//! resolves the `vary` cell:
//!
//! - `n`   — fixed: the guess becomes a literal in the term
//! - `y`   — free: a slot in the free-parameter vector (`p<N>`)
//! - other — a link `target_submodel,target_arg`, followed transitively to
//!   a terminal `y` (shared slot, `x<M>`) or `n` (literal)
//!
//! Store writes (id marks, fixed fitted/error cells) are staged in memory
//! during traversal and committed only after validation passes, so a failed
//! build leaves the store untouched.

use std::collections::HashMap;

use crate::assemble::composite::{CompositeModel, FreeParams, ParamId, ResolvedArg, SubmodelTerm};
use crate::error::FitError;
use crate::models::{base_name, SubmodelRegistry};
use crate::sheet::{Cell, TabularStore};
use crate::table::{read_parameters, ParameterTable, UseCase};

/// Assemble the composite model from the store's parameter table.
///
/// Side effects on success: the `#` column is renumbered, the `id` column
/// is rewritten (`p<N>` / `x<M>` / `-`, blank for unused rows), and fixed
/// parameters get their guess copied into `fitted` with `error` set to 0.
pub fn build_model(
    store: &mut impl TabularStore,
    registry: &SubmodelRegistry,
) -> Result<CompositeModel, FitError> {
    let table = read_parameters(store)?;
    let mut builder = Builder::new(&table);

    let mut terms = Vec::new();
    for sp in table.submodels.iter().filter(|sp| sp.is_active()) {
        let submodel = registry
            .resolve_instance(&sp.name)
            .ok_or_else(|| FitError::UnknownSubmodel {
                name: base_name(&sp.name).to_string(),
            })?;

        let mut args = Vec::with_capacity(submodel.args().len());
        for arg_name in submodel.args() {
            args.push(builder.resolve_arg(&sp.name, arg_name)?);
        }
        terms.push(SubmodelTerm {
            instance: sp.name.clone(),
            base: submodel.name().to_string(),
            func: submodel.func(),
            args,
        });
    }

    let free = builder.finish()?;
    builder.commit(store, &table, &free);

    Ok(CompositeModel {
        terms,
        free,
        header: table.header,
    })
}

/// Per-build state: free-parameter slots keyed by their defining
/// (submodel, arg) pair, plus staged store writes.
struct Builder<'a> {
    table: &'a ParameterTable,

    ids: Vec<ParamId>,
    guess: Vec<Option<f64>>,
    min: Vec<f64>,
    max: Vec<f64>,
    fitted: Vec<f64>,
    error: Vec<f64>,
    rows: Vec<Vec<usize>>,

    /// (submodel, arg) -> slot index, for free params and link targets.
    assigned: HashMap<(String, String), usize>,
    x_count: usize,

    /// Rows to mark `-` in the id column (fixed and link-to-fixed).
    dash_rows: Vec<usize>,
    /// (row, fitted value) pairs for fixed parameters.
    fixed_writes: Vec<(usize, f64)>,
}

impl<'a> Builder<'a> {
    fn new(table: &'a ParameterTable) -> Self {
        Builder {
            table,
            ids: Vec::new(),
            guess: Vec::new(),
            min: Vec::new(),
            max: Vec::new(),
            fitted: Vec::new(),
            error: Vec::new(),
            rows: Vec::new(),
            assigned: HashMap::new(),
            x_count: 0,
            dash_rows: Vec::new(),
            fixed_writes: Vec::new(),
        }
    }

    /// Resolve one declared argument of an active submodel instance.
    fn resolve_arg(&mut self, submodel: &str, arg: &str) -> Result<ResolvedArg, FitError> {
        let case = self.active_case(submodel, arg)?.clone();
        let vary = case.vary.as_text().trim().to_string();

        match vary.as_str() {
            "n" => self.resolve_fixed(submodel, arg, &case),
            "y" => Ok(self.resolve_free(submodel, arg, &case)),
            _ => self.resolve_link(submodel, arg, &case, &vary),
        }
    }

    /// The use-case selected for a (submodel, arg) pair: the first with
    /// `use = y`.
    fn active_case(&self, submodel: &str, arg: &str) -> Result<&'a UseCase, FitError> {
        let entry = self
            .table
            .submodel(submodel)
            .and_then(|sp| sp.arg(arg))
            .ok_or_else(|| FitError::MissingArgument {
                submodel: submodel.to_string(),
                arg: arg.to_string(),
            })?;
        let idx = entry.active_case().ok_or_else(|| FitError::MissingArgument {
            submodel: submodel.to_string(),
            arg: arg.to_string(),
        })?;
        Ok(&entry.cases[idx])
    }

    fn resolve_fixed(
        &mut self,
        submodel: &str,
        arg: &str,
        case: &UseCase,
    ) -> Result<ResolvedArg, FitError> {
        let v = case.guess.as_number().ok_or_else(|| FitError::MissingGuess {
            ids: vec![format!("{submodel}.{arg}")],
        })?;
        self.dash_rows.push(case.row);
        self.fixed_writes.push((case.row, v));
        Ok(ResolvedArg::Literal(v))
    }

    fn resolve_free(&mut self, submodel: &str, arg: &str, case: &UseCase) -> ResolvedArg {
        let key = (submodel.to_string(), arg.to_string());
        if let Some(&slot) = self.assigned.get(&key) {
            // Already allocated: either a repeated row of the same pair, or
            // the target of an earlier link (then the id is the shared x).
            self.bind_row(slot, case.row);
            return ResolvedArg::Free(slot);
        }

        // Fresh independent parameter. P ids are renumbered at the end so
        // promotions to x leave no gaps.
        let slot = self.alloc_slot(case, ParamId::P(0));
        self.assigned.insert(key, slot);
        ResolvedArg::Free(slot)
    }

    fn resolve_link(
        &mut self,
        submodel: &str,
        arg: &str,
        case: &UseCase,
        vary: &str,
    ) -> Result<ResolvedArg, FitError> {
        let (mut t_sub, mut t_arg) = parse_link(vary).ok_or_else(|| FitError::InvalidRow {
            row: case.row,
            message: format!(
                "vary cell '{vary}' must be 'y', 'n', or 'submodel,arg' \
                 (for '{submodel}.{arg}')."
            ),
        })?;

        let mut chain = vec![format!("{submodel}.{arg}")];
        loop {
            let label = format!("{t_sub}.{t_arg}");
            if chain.contains(&label) {
                chain.push(label);
                return Err(FitError::LinkCycle { chain });
            }
            chain.push(label);

            let exists = self
                .table
                .submodel(&t_sub)
                .map(|sp| sp.arg(&t_arg).is_some())
                .unwrap_or(false);
            if !exists {
                return Err(FitError::UnresolvedLink {
                    submodel: submodel.to_string(),
                    arg: arg.to_string(),
                    target_submodel: t_sub,
                    target_arg: t_arg,
                });
            }

            let t_case = self.active_case(&t_sub, &t_arg)?.clone();
            let t_vary = t_case.vary.as_text().trim().to_string();
            match t_vary.as_str() {
                // Terminal fixed: the target's guess becomes this
                // argument's literal value and fit result.
                "n" => {
                    let v = t_case.guess.as_number().ok_or_else(|| FitError::MissingGuess {
                        ids: vec![format!("{t_sub}.{t_arg}")],
                    })?;
                    self.dash_rows.push(case.row);
                    self.fixed_writes.push((case.row, v));
                    return Ok(ResolvedArg::Literal(v));
                }
                // Terminal free: one shared slot keyed by the target pair.
                "y" => {
                    let key = (t_sub.clone(), t_arg.clone());
                    let slot = match self.assigned.get(&key) {
                        Some(&slot) => {
                            // The target was already processed as its own
                            // free parameter: promote its p id to a shared
                            // x id.
                            if let ParamId::P(_) = self.ids[slot] {
                                self.ids[slot] = ParamId::X(self.x_count);
                                self.x_count += 1;
                            }
                            slot
                        }
                        None => {
                            let slot = self.alloc_slot(&t_case, ParamId::X(self.x_count));
                            self.x_count += 1;
                            self.assigned.insert(key, slot);
                            // Bind the target's own row only if its
                            // submodel is active (inactive targets
                            // contribute values, not write-back cells).
                            let target_active = self
                                .table
                                .submodel(&t_sub)
                                .map(|sp| sp.is_active())
                                .unwrap_or(false);
                            if !target_active {
                                self.rows[slot].clear();
                            }
                            slot
                        }
                    };
                    self.bind_row(slot, case.row);
                    return Ok(ResolvedArg::Free(slot));
                }
                _ => {
                    let next = parse_link(&t_vary).ok_or_else(|| FitError::InvalidRow {
                        row: t_case.row,
                        message: format!(
                            "vary cell '{t_vary}' must be 'y', 'n', or 'submodel,arg' \
                             (for '{t_sub}.{t_arg}')."
                        ),
                    })?;
                    (t_sub, t_arg) = next;
                }
            }
        }
    }

    /// Allocate a free-parameter slot from a use-case's cells, applying the
    /// documented defaults (min/max -> ±inf, fitted/error -> 0).
    fn alloc_slot(&mut self, case: &UseCase, id: ParamId) -> usize {
        self.ids.push(id);
        self.guess.push(case.guess.as_number());
        self.min
            .push(case.min.as_number().unwrap_or(f64::NEG_INFINITY));
        self.max.push(case.max.as_number().unwrap_or(f64::INFINITY));
        self.fitted.push(case.fitted.as_number().unwrap_or(0.0));
        self.error.push(case.error.as_number().unwrap_or(0.0));
        self.rows.push(vec![case.row]);
        self.ids.len() - 1
    }

    fn bind_row(&mut self, slot: usize, row: usize) {
        if !self.rows[slot].contains(&row) {
            self.rows[slot].push(row);
        }
    }

    /// Validate guesses and produce the final free-parameter vectors.
    fn finish(&mut self) -> Result<FreeParams, FitError> {
        // Renumber p ids in slot order so promotions leave no gaps.
        let mut p = 0;
        for id in &mut self.ids {
            if let ParamId::P(n) = id {
                *n = p;
                p += 1;
            }
        }

        let missing: Vec<String> = self
            .ids
            .iter()
            .zip(&self.guess)
            .filter(|(_, g)| g.is_none())
            .map(|(id, _)| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(FitError::MissingGuess { ids: missing });
        }

        Ok(FreeParams {
            ids: self.ids.clone(),
            guess: self.guess.iter().map(|g| g.unwrap_or(0.0)).collect(),
            min: self.min.clone(),
            max: self.max.clone(),
            fitted: self.fitted.clone(),
            error: self.error.clone(),
            rows: self.rows.clone(),
        })
    }

    /// Commit all staged writes. Called only after validation has passed.
    fn commit(&self, store: &mut impl TabularStore, table: &ParameterTable, free: &FreeParams) {
        // Id column: cleared everywhere, then marked per bound row.
        let mut marks: HashMap<usize, String> = HashMap::new();
        for row in &self.dash_rows {
            marks.insert(*row, "-".to_string());
        }
        for (slot, rows) in free.rows.iter().enumerate() {
            for row in rows {
                marks.insert(*row, free.ids[slot].to_string());
            }
        }
        for row in 2..=store.get_last_row() {
            let value = marks
                .get(&row)
                .map(|s| Cell::from(s.as_str()))
                .unwrap_or(Cell::Empty);
            store.set_cell_value(value, row, table.header.id);
        }

        // Fixed parameters report their own value with zero uncertainty.
        for (row, v) in &self.fixed_writes {
            store.set_cell_value(Cell::Number(*v), *row, table.header.fitted);
            store.set_cell_value(Cell::Number(0.0), *row, table.header.error);
        }
    }
}

/// Parse a `vary` link cell: `target_submodel,target_arg`.
fn parse_link(vary: &str) -> Option<(String, String)> {
    let (sub, arg) = vary.split_once(',')?;
    let (sub, arg) = (sub.trim(), arg.trim());
    if sub.is_empty() || arg.is_empty() {
        return None;
    }
    Some((sub.to_string(), arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Submodel, SubmodelRegistry};
    use crate::sheet::Sheet;

    fn peak2(x: f64, p: &[f64]) -> f64 {
        // amplitude, center
        p[0] * (-(x - p[1]) * (x - p[1]) / 2.0).exp()
    }

    fn peak3(x: f64, p: &[f64]) -> f64 {
        // amplitude, center, width
        p[0] * (-(x - p[1]) * (x - p[1]) / (2.0 * p[2] * p[2])).exp()
    }

    fn registry() -> SubmodelRegistry {
        let mut r = SubmodelRegistry::new();
        r.register(Submodel::new("gauss", &["amplitude", "center"], peak2))
            .unwrap();
        r.register(Submodel::new("peak", &["amplitude", "center", "width"], peak3))
            .unwrap();
        r
    }

    fn param_sheet(rows: &[[&str; 11]]) -> Sheet {
        let mut sheet = Sheet::new(&[
            "#", "submodel", "arg", "use", "vary", "guess", "min", "max", "fitted", "error", "id",
        ]);
        for row in rows {
            sheet.push_row(row.iter().map(|s| Cell::from(*s)).collect());
        }
        sheet
    }

    fn cell_text(sheet: &Sheet, row: usize, col: usize) -> String {
        sheet.get_row_values(row, col)[col - 1].as_text()
    }

    #[test]
    fn scenario_free_amplitude_fixed_center() {
        let mut sheet = param_sheet(&[
            ["", "gauss", "amplitude", "y", "y", "1", "0", "10", "", "", ""],
            ["", "gauss", "center", "y", "n", "5", "", "", "", "", ""],
        ]);
        let model = build_model(&mut sheet, &registry()).unwrap();

        assert_eq!(model.expression(), "gauss(x, p0, 5)");
        assert_eq!(model.free.guess, vec![1.0]);
        assert_eq!(model.free.min, vec![0.0]);
        assert_eq!(model.free.max, vec![10.0]);
        assert_eq!(model.free.id_strings(), vec!["p0"]);

        // Fixed parameter: fitted = guess, error = 0, id = '-'.
        let header = model.header;
        assert_eq!(cell_text(&sheet, 3, header.fitted), "5");
        assert_eq!(cell_text(&sheet, 3, header.error), "0");
        assert_eq!(cell_text(&sheet, 3, header.id), "-");
        assert_eq!(cell_text(&sheet, 2, header.id), "p0");
    }

    #[test]
    fn shared_link_uses_one_x_id_in_both_terms() {
        let mut sheet = param_sheet(&[
            ["", "peak#1", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "peak#1", "center", "y", "n", "2", "", "", "", "", ""],
            ["", "peak#1", "width", "y", "y", "0.5", "", "", "", "", ""],
            ["", "peak#2", "amplitude", "y", "y", "2", "", "", "", "", ""],
            ["", "peak#2", "center", "y", "n", "7", "", "", "", "", ""],
            ["", "peak#2", "width", "y", "peak#1,width", "", "", "", "", "", ""],
        ]);
        let model = build_model(&mut sheet, &registry()).unwrap();

        assert_eq!(
            model.expression(),
            "peak(x, p0, 2, x0) + peak(x, p1, 7, x0)"
        );
        // Exactly one width entry in the free vector.
        assert_eq!(model.free.len(), 3);
        assert_eq!(model.free.id_strings(), vec!["p0", "x0", "p1"]);
        assert_eq!(model.free.guess, vec![1.0, 0.5, 2.0]);

        // Both width rows carry the shared id and are bound to one slot.
        let header = model.header;
        assert_eq!(cell_text(&sheet, 4, header.id), "x0");
        assert_eq!(cell_text(&sheet, 7, header.id), "x0");
        assert_eq!(model.free.rows[1], vec![4, 7]);
    }

    #[test]
    fn chain_to_free_terminal_shares_one_slot_across_three_rows() {
        let mut sheet = param_sheet(&[
            ["", "peak#a", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "peak#a", "center", "y", "n", "1", "", "", "", "", ""],
            ["", "peak#a", "width", "y", "peak#b,width", "", "", "", "", "", ""],
            ["", "peak#b", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "peak#b", "center", "y", "n", "2", "", "", "", "", ""],
            ["", "peak#b", "width", "y", "peak#c,width", "", "", "", "", "", ""],
            ["", "peak#c", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "peak#c", "center", "y", "n", "3", "", "", "", "", ""],
            ["", "peak#c", "width", "y", "y", "0.7", "", "", "", "", ""],
        ]);
        let model = build_model(&mut sheet, &registry()).unwrap();

        // One shared width slot bound to all three width rows.
        let width_slot = model
            .free
            .ids
            .iter()
            .position(|id| matches!(id, ParamId::X(0)))
            .unwrap();
        let mut rows = model.free.rows[width_slot].clone();
        rows.sort_unstable();
        assert_eq!(rows, vec![4, 7, 10]);
        assert_eq!(model.free.guess[width_slot], 0.7);

        let header = model.header;
        for row in [4, 7, 10] {
            assert_eq!(cell_text(&sheet, row, header.id), "x0");
        }
    }

    #[test]
    fn chain_to_fixed_terminal_substitutes_target_guess() {
        let mut sheet = param_sheet(&[
            ["", "peak#a", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "peak#a", "center", "y", "n", "1", "", "", "", "", ""],
            ["", "peak#a", "width", "y", "peak#b,width", "", "", "", "", "", ""],
            ["", "peak#b", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "peak#b", "center", "y", "n", "2", "", "", "", "", ""],
            ["", "peak#b", "width", "y", "n", "0.4", "", "", "", "", ""],
        ]);
        let model = build_model(&mut sheet, &registry()).unwrap();

        assert_eq!(
            model.expression(),
            "peak(x, p0, 1, 0.4) + peak(x, p1, 2, 0.4)"
        );
        // The linking row reports the substituted value as its own result.
        let header = model.header;
        assert_eq!(cell_text(&sheet, 4, header.id), "-");
        assert_eq!(cell_text(&sheet, 4, header.fitted), "0.4");
        assert_eq!(cell_text(&sheet, 4, header.error), "0");
    }

    #[test]
    fn link_cycle_fails_deterministically() {
        let mut sheet = param_sheet(&[
            ["", "peak#a", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "peak#a", "center", "y", "n", "1", "", "", "", "", ""],
            ["", "peak#a", "width", "y", "peak#b,width", "", "", "", "", "", ""],
            ["", "peak#b", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "peak#b", "center", "y", "n", "2", "", "", "", "", ""],
            ["", "peak#b", "width", "y", "peak#a,width", "", "", "", "", "", ""],
        ]);
        let err = build_model(&mut sheet, &registry()).unwrap_err();
        match err {
            FitError::LinkCycle { chain } => {
                assert_eq!(chain.first().map(String::as_str), Some("peak#a.width"));
                assert_eq!(chain.last().map(String::as_str), Some("peak#a.width"));
            }
            other => panic!("expected LinkCycle, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_link_names_both_sides() {
        let mut sheet = param_sheet(&[
            ["", "gauss", "amplitude", "y", "ghost,width", "", "", "", "", "", ""],
            ["", "gauss", "center", "y", "n", "5", "", "", "", "", ""],
        ]);
        let err = build_model(&mut sheet, &registry()).unwrap_err();
        assert_eq!(
            err,
            FitError::UnresolvedLink {
                submodel: "gauss".to_string(),
                arg: "amplitude".to_string(),
                target_submodel: "ghost".to_string(),
                target_arg: "width".to_string(),
            }
        );
    }

    #[test]
    fn missing_active_use_case_is_missing_argument() {
        let mut sheet = param_sheet(&[
            ["", "gauss", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "gauss", "center", "n", "n", "5", "", "", "", "", ""],
        ]);
        let err = build_model(&mut sheet, &registry()).unwrap_err();
        assert_eq!(
            err,
            FitError::MissingArgument {
                submodel: "gauss".to_string(),
                arg: "center".to_string(),
            }
        );
    }

    #[test]
    fn missing_guess_lists_identifiers_and_leaves_store_untouched() {
        let mut sheet = param_sheet(&[
            ["", "gauss", "amplitude", "y", "y", "", "", "", "", "", ""],
            ["", "gauss", "center", "y", "n", "5", "", "", "", "", ""],
        ]);
        let before = sheet.get_col_values(11);
        let err = build_model(&mut sheet, &registry()).unwrap_err();
        assert_eq!(
            err,
            FitError::MissingGuess {
                ids: vec!["p0".to_string()]
            }
        );
        // Staged writes were never committed: fitted/error/id untouched.
        assert_eq!(sheet.get_col_values(11), before);
        assert!(sheet.get_row_values(3, 9)[8].is_empty());
    }

    #[test]
    fn min_max_default_to_infinite_bounds() {
        let mut sheet = param_sheet(&[
            ["", "gauss", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "gauss", "center", "y", "n", "5", "", "", "", "", ""],
        ]);
        let model = build_model(&mut sheet, &registry()).unwrap();
        assert_eq!(model.free.min, vec![f64::NEG_INFINITY]);
        assert_eq!(model.free.max, vec![f64::INFINITY]);
        assert_eq!(model.free.fitted, vec![0.0]);
        assert_eq!(model.free.error, vec![0.0]);
    }

    #[test]
    fn inactive_submodels_are_excluded() {
        let mut sheet = param_sheet(&[
            ["", "gauss", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "gauss", "center", "y", "n", "5", "", "", "", "", ""],
            ["", "peak#bg", "amplitude", "n", "y", "1", "", "", "", "", ""],
            ["", "peak#bg", "center", "n", "n", "0", "", "", "", "", ""],
            ["", "peak#bg", "width", "n", "y", "1", "", "", "", "", ""],
        ]);
        let model = build_model(&mut sheet, &registry()).unwrap();
        assert_eq!(model.terms.len(), 1);
        assert_eq!(model.expression(), "gauss(x, p0, 5)");
    }

    #[test]
    fn rebuild_assigns_identical_ids_for_unchanged_active_set() {
        let rows = [
            ["", "peak#1", "amplitude", "y", "y", "1", "", "", "", "", ""],
            ["", "peak#1", "center", "y", "n", "2", "", "", "", "", ""],
            ["", "peak#1", "width", "y", "y", "0.5", "", "", "", "", ""],
            ["", "peak#2", "amplitude", "y", "y", "2", "", "", "", "", ""],
            ["", "peak#2", "center", "y", "n", "7", "", "", "", "", ""],
            ["", "peak#2", "width", "y", "peak#1,width", "", "", "", "", "", ""],
        ];
        let mut sheet = param_sheet(&rows);
        let first = build_model(&mut sheet, &registry()).unwrap();
        let second = build_model(&mut sheet, &registry()).unwrap();

        assert_eq!(first.free.ids, second.free.ids);
        assert_eq!(first.free.rows, second.free.rows);
        assert_eq!(first.expression(), second.expression());
    }

    #[test]
    fn unknown_submodel_fails_before_any_write() {
        let mut sheet = param_sheet(&[
            ["", "mystery", "amplitude", "y", "y", "1", "", "", "", "", ""],
        ]);
        let err = build_model(&mut sheet, &registry()).unwrap_err();
        assert_eq!(
            err,
            FitError::UnknownSubmodel {
                name: "mystery".to_string()
            }
        );
        assert!(sheet.get_row_values(2, 11)[10].is_empty());
    }
}
