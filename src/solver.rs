use crate::config::SolverConfig;
use crate::data::{ScheduleEntry, SubjectId, TimetableRequest};
use crate::error::SolveError;
use crate::validation::{check_schedule, validate_request};
use good_lp::variable;
use good_lp::{
    Constraint, Expression, ProblemVariables, Solution, SolverModel, Variable, constraint,
    default_solver,
};
use itertools::{Itertools, iproduct};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// (class, staff, subject, slot) indices. The subject index points into the
/// staff member's shuffled subject list.
type VarKey = (usize, usize, usize, usize);

/// Solves the timetabling problem using the HiGHS MIP solver.
///
/// There is no objective: any schedule that satisfies the hard constraints
/// is returned, and which one depends on the subject shuffle.
pub fn solve(
    request: &TimetableRequest,
    config: &SolverConfig,
) -> Result<Vec<ScheduleEntry>, SolveError> {
    validate_request(request).map_err(SolveError::InvalidInput)?;
    let start_time = Instant::now();

    let (model, seed) = seeded_model(request, config);

    if model.is_empty() {
        model.ensure_coverable()?;
        info!("No teaching to schedule; returning an empty timetable.");
        return Ok(Vec::new());
    }

    let entries = model.solve(config, seed)?;

    let violations = check_schedule(request, &entries);
    if !violations.is_empty() {
        // only reachable when the time limit cut the search short
        warn!(
            "Solver returned an invalid timetable ({} violations, first: {}).",
            violations.len(),
            violations[0]
        );
        return Err(SolveError::NoFeasibleSolution);
    }

    info!(
        "Timetable with {} entries found in {:.2?}",
        entries.len(),
        start_time.elapsed()
    );
    Ok(entries)
}

/// Builds the model with the request's seed, falling back to the configured one.
fn seeded_model<'a>(
    request: &'a TimetableRequest,
    config: &SolverConfig,
) -> (TimetableModel<'a>, Option<u64>) {
    let seed = request.seed.or(config.seed);
    let mut rng = shuffle_rng(seed);
    (TimetableModel::build(request, &mut rng), seed)
}

fn shuffle_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// The binary model for one request: one variable per allowed
/// (class, staff, subject, slot) quadruple.
///
/// Break slots get no variables at all, so nothing can ever be placed in them.
pub struct TimetableModel<'a> {
    request: &'a TimetableRequest,
    subjects: Vec<Vec<&'a SubjectId>>,
    teaching_slots: Vec<usize>,
    problem: ProblemVariables,
    vars: HashMap<VarKey, Variable>,
}

impl<'a> TimetableModel<'a> {
    pub fn build<R: Rng + ?Sized>(request: &'a TimetableRequest, rng: &mut R) -> Self {
        let breaks: HashSet<&str> = request.break_periods.iter().map(String::as_str).collect();
        let known_slots: HashSet<&str> = request.slots.iter().map(String::as_str).collect();
        for unknown in breaks.iter().filter(|b| !known_slots.contains(*b)) {
            warn!("Break period {unknown} is not a slot; ignoring it.");
        }
        let known_staff: HashSet<&str> = request.staff.iter().map(String::as_str).collect();
        for extra in request
            .staff_subjects
            .keys()
            .filter(|s| !known_staff.contains(s.as_str()))
        {
            warn!("Subjects given for unlisted staff member {extra}; ignoring them.");
        }

        // cosmetic: only changes which of several valid timetables is found
        let subjects: Vec<Vec<&SubjectId>> = request
            .staff
            .iter()
            .map(|staff| {
                let mut subjects: Vec<&SubjectId> = Vec::new();
                for subject in request.staff_subjects.get(staff).into_iter().flatten() {
                    if subject.trim().is_empty() {
                        warn!("Blank subject for staff member {staff}; ignoring it.");
                    } else {
                        subjects.push(subject);
                    }
                }
                subjects.shuffle(rng);
                subjects
            })
            .collect();

        let teaching_slots: Vec<usize> = request
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !breaks.contains(slot.as_str()))
            .map(|(i, _)| i)
            .collect();

        info!(
            "Setting up model with {} classes, {} staff, and {} slots ({} breaks)...",
            request.classes.len(),
            request.staff.len(),
            request.slots.len(),
            request.slots.len() - teaching_slots.len()
        );

        let mut problem = ProblemVariables::new();
        let mut vars = HashMap::new();
        for (class, (staff, staff_subjects)) in
            iproduct!(0..request.classes.len(), subjects.iter().enumerate())
        {
            for (subject, &slot) in iproduct!(0..staff_subjects.len(), &teaching_slots) {
                vars.insert((class, staff, subject, slot), problem.add(variable().binary()));
            }
        }

        let subject_count: usize = subjects.iter().map(Vec::len).sum();
        trace!(
            "Generated {} assignment variables out of a dense maximum of {}.",
            vars.len(),
            request.classes.len() * subject_count * request.slots.len()
        );

        TimetableModel {
            request,
            subjects,
            teaching_slots,
            problem,
            vars,
        }
    }

    #[cfg(test)]
    fn variable_count(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Whether a variable exists for the given identifiers.
    #[cfg(test)]
    fn has_variable(&self, class: &str, staff: &str, subject: &str, slot: &str) -> bool {
        let request = self.request;
        let class = request.classes.iter().position(|c| c == class);
        let staff = request.staff.iter().position(|s| s == staff);
        let slot = request.slots.iter().position(|s| s == slot);
        let (Some(class), Some(staff), Some(slot)) = (class, staff, slot) else {
            return false;
        };
        self.subjects[staff]
            .iter()
            .position(|s| s.as_str() == subject)
            .is_some_and(|subject| self.vars.contains_key(&(class, staff, subject, slot)))
    }

    /// The staff member's subjects in the order the model uses them.
    #[cfg(test)]
    fn subjects_of(&self, staff: &str) -> Option<&[&'a SubjectId]> {
        let index = self.request.staff.iter().position(|s| s == staff)?;
        Some(self.subjects[index].as_slice())
    }

    /// Fails fast when some class has a teaching slot no one can cover.
    ///
    /// Candidates do not depend on the class or the slot, so a single
    /// qualified staff member is enough.
    fn ensure_coverable(&self) -> Result<(), SolveError> {
        let needs_cover = !self.request.classes.is_empty() && !self.teaching_slots.is_empty();
        let has_candidates = self.subjects.iter().any(|s| !s.is_empty());
        if needs_cover && !has_candidates {
            warn!("No staff member teaches any subject; classes cannot be covered.");
            return Err(SolveError::NoFeasibleSolution);
        }
        Ok(())
    }

    fn var(&self, class: usize, staff: usize, subject: usize, slot: usize) -> Option<Variable> {
        self.vars.get(&(class, staff, subject, slot)).copied()
    }

    pub fn constraints(&self) -> Result<Vec<Constraint>, SolveError> {
        self.ensure_coverable()?;
        let class_count = self.request.classes.len();
        let mut constraints = Vec::new();

        // each class has exactly one lesson in every teaching slot
        debug!("Adding 'class coverage' constraints...");
        for (class, &slot) in iproduct!(0..class_count, &self.teaching_slots) {
            let covered: Expression = self
                .subjects
                .iter()
                .enumerate()
                .flat_map(|(staff, subjects)| {
                    (0..subjects.len()).filter_map(move |subject| {
                        self.var(class, staff, subject, slot)
                    })
                })
                .sum();
            constraints.push(constraint!(covered == 1));
        }

        // no staff double-booking
        debug!("Adding 'staff availability' constraints...");
        for (staff, subjects) in self.subjects.iter().enumerate() {
            if subjects.is_empty() {
                continue;
            }
            for &slot in &self.teaching_slots {
                let busy: Expression = iproduct!(0..class_count, 0..subjects.len())
                    .filter_map(|(class, subject)| self.var(class, staff, subject, slot))
                    .sum();
                constraints.push(constraint!(busy <= 1));
            }
        }

        // the same lesson never fills two adjacent slots
        debug!("Adding 'no consecutive repeat' constraints...");
        let adjacent: Vec<(usize, usize)> = self
            .teaching_slots
            .iter()
            .copied()
            .tuple_windows()
            .filter(|(current, next)| current + 1 == *next)
            .collect();
        for (staff, subjects) in self.subjects.iter().enumerate() {
            for (class, subject) in iproduct!(0..class_count, 0..subjects.len()) {
                for &(current, next) in &adjacent {
                    if let (Some(now), Some(after)) = (
                        self.var(class, staff, subject, current),
                        self.var(class, staff, subject, next),
                    ) {
                        constraints.push(constraint!(now + after <= 1));
                    }
                }
            }
        }

        trace!("Model has {} constraints.", constraints.len());
        Ok(constraints)
    }

    /// Runs HiGHS on the model and reads the chosen quadruples back out,
    /// ordered class, staff, subject, slot.
    pub fn solve(
        self,
        config: &SolverConfig,
        seed: Option<u64>,
    ) -> Result<Vec<ScheduleEntry>, SolveError> {
        let constraints = self.constraints()?;

        let mut model = self
            .problem
            .minimise(0)
            .using(default_solver)
            .set_option("log_to_console", config.log_to_console);
        if config.threads > 0 {
            model = model.set_option("threads", i32::try_from(config.threads).unwrap_or(i32::MAX));
        }
        if let Some(limit) = config.time_limit {
            model = model.set_option("time_limit", limit.as_secs_f64());
        }
        if let Some(seed) = seed {
            model = model.set_option("random_seed", (seed % i32::MAX as u64) as i32);
        }
        for c in constraints {
            model.add_constraint(c);
        }

        info!("Starting HiGHS solver...");
        let solution = match model.solve() {
            Ok(s) => s,
            Err(e) => {
                warn!("No timetable found. Solver error: {e}");
                return Err(SolveError::NoFeasibleSolution);
            }
        };

        let request = self.request;
        let mut entries = Vec::new();
        for (class, class_id) in request.classes.iter().enumerate() {
            for (staff, staff_id) in request.staff.iter().enumerate() {
                for (subject, subject_id) in self.subjects[staff].iter().enumerate() {
                    for (slot, slot_id) in request.slots.iter().enumerate() {
                        let chosen = self
                            .vars
                            .get(&(class, staff, subject, slot))
                            .is_some_and(|var| solution.value(*var) > 0.5);
                        if chosen {
                            entries.push(ScheduleEntry {
                                class: class_id.clone(),
                                staff: staff_id.clone(),
                                subject: (*subject_id).clone(),
                                slot: slot_id.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationErrorKind;

    fn request(
        classes: &[&str],
        slots: &[&str],
        staff_subjects: &[(&str, &[&str])],
        breaks: &[&str],
    ) -> TimetableRequest {
        TimetableRequest {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            slots: slots.iter().map(|s| s.to_string()).collect(),
            staff: staff_subjects.iter().map(|(s, _)| s.to_string()).collect(),
            staff_subjects: staff_subjects
                .iter()
                .map(|(s, subjects)| {
                    (
                        s.to_string(),
                        subjects.iter().map(|x| x.to_string()).collect(),
                    )
                })
                .collect(),
            break_periods: breaks.iter().map(|b| b.to_string()).collect(),
            seed: Some(7),
        }
    }

    fn config() -> SolverConfig {
        SolverConfig {
            seed: Some(7),
            ..SolverConfig::default()
        }
    }

    fn assert_valid(request: &TimetableRequest, entries: &[ScheduleEntry]) {
        let violations = check_schedule(request, entries);
        assert!(violations.is_empty(), "violations: {violations:?}");
    }

    #[test]
    fn solves_two_classes_around_a_break() {
        let request = request(
            &["A", "B"],
            &["1", "2", "3"],
            &[("T1", &["Math"]), ("T2", &["Science"])],
            &["2"],
        );

        let entries = solve(&request, &config()).unwrap();

        assert_valid(&request, &entries);
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|e| e.slot != "2"));
        let covered: HashSet<(&str, &str)> = entries
            .iter()
            .map(|e| (e.class.as_str(), e.slot.as_str()))
            .collect();
        assert_eq!(
            covered,
            HashSet::from([("A", "1"), ("A", "3"), ("B", "1"), ("B", "3")])
        );
        for slot in ["1", "3"] {
            let staff: HashSet<&str> = entries
                .iter()
                .filter(|e| e.slot == slot)
                .map(|e| e.staff.as_str())
                .collect();
            assert_eq!(staff, HashSet::from(["T1", "T2"]));
        }
    }

    #[test]
    fn reports_infeasible_when_staff_is_short() {
        let request = request(&["A", "B"], &["1"], &[("T1", &["Math"])], &[]);
        assert_eq!(
            solve(&request, &config()),
            Err(SolveError::NoFeasibleSolution)
        );
    }

    #[test]
    fn no_classes_gives_empty_timetable() {
        let request = request(&[], &["1", "2"], &[("T1", &["Math"])], &[]);
        assert_eq!(solve(&request, &config()), Ok(Vec::new()));
    }

    #[test]
    fn only_breaks_gives_empty_timetable() {
        let request = request(&["A"], &["1", "2"], &[("T1", &["Math"])], &["1", "2"]);
        assert_eq!(solve(&request, &config()), Ok(Vec::new()));
    }

    #[test]
    fn staff_without_subjects_cannot_cover_classes() {
        let request = request(&["A"], &["1"], &[("T1", &[])], &[]);
        assert_eq!(
            solve(&request, &config()),
            Err(SolveError::NoFeasibleSolution)
        );
    }

    #[test]
    fn same_lesson_cannot_fill_adjacent_slots() {
        let request = request(&["A"], &["1", "2"], &[("T1", &["Math"])], &[]);
        assert_eq!(
            solve(&request, &config()),
            Err(SolveError::NoFeasibleSolution)
        );
    }

    #[test]
    fn a_break_separates_otherwise_adjacent_lessons() {
        let request = request(&["A"], &["1", "2", "3"], &[("T1", &["Math"])], &["2"]);
        let entries = solve(&request, &config()).unwrap();
        assert_valid(&request, &entries);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn alternates_subjects_for_a_single_staff_member() {
        let request = request(
            &["A"],
            &["1", "2", "3", "4"],
            &[("T1", &["Math", "Art"])],
            &[],
        );

        let mut entries = solve(&request, &config()).unwrap();

        assert_valid(&request, &entries);
        entries.sort_by(|a, b| a.slot.cmp(&b.slot));
        for (first, second) in entries.iter().tuple_windows() {
            assert_ne!(first.subject, second.subject);
        }
    }

    #[test]
    fn solves_a_week_shaped_problem() {
        let request = request(
            &["Class_1", "Class_2", "Class_3"],
            &[
                "Day_1_Period_1",
                "Day_1_Period_2",
                "Day_1_Period_3",
                "Day_1_Period_4",
                "Day_2_Period_1",
                "Day_2_Period_2",
                "Day_2_Period_3",
                "Day_2_Period_4",
            ],
            &[
                ("Ada", &["Math", "Physics"]),
                ("Brook", &["English"]),
                ("Cyd", &["History", "Geography"]),
                ("Dale", &["Chemistry", "Biology"]),
            ],
            &["Day_1_Period_3", "Day_2_Period_3"],
        );

        let entries = solve(&request, &config()).unwrap();

        assert_valid(&request, &entries);
        assert_eq!(entries.len(), 3 * 6);
    }

    #[test]
    fn entries_follow_class_then_staff_order() {
        let request = request(
            &["A", "B"],
            &["1", "2", "3"],
            &[("T1", &["Math"]), ("T2", &["Science"])],
            &["2"],
        );

        let entries = solve(&request, &config()).unwrap();

        let classes: Vec<&str> = entries.iter().map(|e| e.class.as_str()).collect();
        assert_eq!(classes, vec!["A", "A", "B", "B"]);
        for pair in entries.chunks(2) {
            assert!(pair[0].staff <= pair[1].staff);
        }
    }

    #[test]
    fn same_seed_gives_same_timetable() {
        let request = request(
            &["A", "B"],
            &["1", "2", "3", "4"],
            &[("T1", &["Math", "Art"]), ("T2", &["Science", "Music"])],
            &[],
        );
        let first = solve(&request, &config()).unwrap();
        let second = solve(&request, &config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_invalid_requests_before_building() {
        let mut request = request(&["A", "A"], &["1"], &[("T1", &["Math"])], &[]);
        request.staff.push("T2".into());

        let Err(SolveError::InvalidInput(errors)) = solve(&request, &config()) else {
            panic!("expected invalid input");
        };
        let kinds: Vec<ValidationErrorKind> = errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ValidationErrorKind::DuplicateId,
                ValidationErrorKind::MissingStaffSubjects
            ]
        );
    }

    #[test]
    fn model_has_no_variables_for_breaks() {
        let request = request(
            &["A", "B"],
            &["1", "2", "3"],
            &[("T1", &["Math", "Art"]), ("T2", &["Science"]), ("T3", &[])],
            &["2", "not-a-slot"],
        );
        let mut rng = StdRng::seed_from_u64(1);

        let model = TimetableModel::build(&request, &mut rng);

        // 2 classes x 3 (staff, subject) pairs x 2 teaching slots
        assert_eq!(model.variable_count(), 12);
        assert!(model.has_variable("A", "T1", "Art", "1"));
        assert!(model.has_variable("B", "T2", "Science", "3"));
        assert!(!model.has_variable("A", "T1", "Math", "2"));
        assert!(!model.has_variable("A", "T2", "Math", "1"));
        assert!(!model.has_variable("A", "T3", "Math", "1"));
    }

    #[test]
    fn model_constraint_families_have_expected_sizes() {
        let request = request(
            &["A", "B"],
            &["1", "2", "3", "4"],
            &[("T1", &["Math", "Art"]), ("T2", &["Science"]), ("T3", &[])],
            &["3"],
        );
        let mut rng = StdRng::seed_from_u64(1);
        let model = TimetableModel::build(&request, &mut rng);

        let constraints = model.constraints().unwrap();

        // coverage: 2 classes x 3 teaching slots
        // availability: 2 staff with subjects x 3 teaching slots
        // adjacency: only slots 1-2 are adjacent teaching slots, 2 classes x 3 lessons
        assert_eq!(constraints.len(), 6 + 6 + 6);
    }

    #[test]
    fn shuffle_keeps_every_subject() {
        let request = request(
            &["A"],
            &["1"],
            &[("T1", &["Math", "Art", "Music", "Drama"])],
            &[],
        );
        let mut rng = StdRng::seed_from_u64(99);
        let model = TimetableModel::build(&request, &mut rng);

        let subjects: HashSet<&str> = model
            .subjects_of("T1")
            .unwrap()
            .iter()
            .map(|s| s.as_str())
            .collect();
        assert_eq!(subjects, HashSet::from(["Math", "Art", "Music", "Drama"]));
        assert!(model.subjects_of("Nobody").is_none());
    }

    #[test]
    fn request_seed_overrides_configured_seed() {
        let mut request = request(
            &["A"],
            &["1"],
            &[("T1", &["Math", "Art", "Music", "Drama", "History", "Latin"])],
            &[],
        );
        let config = SolverConfig {
            seed: Some(11),
            ..SolverConfig::default()
        };
        let subjects_with = |seed: u64, request: &TimetableRequest| -> Vec<String> {
            let mut rng = StdRng::seed_from_u64(seed);
            let model = TimetableModel::build(request, &mut rng);
            model.subjects_of("T1").unwrap().iter().map(|s| s.to_string()).collect()
        };

        let chosen_with = |request: &TimetableRequest| -> (Option<u64>, Vec<String>) {
            let (model, seed) = seeded_model(request, &config);
            let subjects = model
                .subjects_of("T1")
                .unwrap()
                .iter()
                .map(|s| s.to_string())
                .collect();
            (seed, subjects)
        };

        request.seed = Some(5);
        assert_eq!(chosen_with(&request), (Some(5), subjects_with(5, &request)));

        request.seed = None;
        assert_eq!(chosen_with(&request), (Some(11), subjects_with(11, &request)));
    }

    #[test]
    fn blank_subjects_are_skipped() {
        let request = request(&["A"], &["1", "2"], &[("T1", &["Math", "", "Art"])], &[]);
        let mut rng = StdRng::seed_from_u64(1);
        let model = TimetableModel::build(&request, &mut rng);

        // 1 class x 2 named subjects x 2 slots
        assert_eq!(model.variable_count(), 4);
        assert!(!model.has_variable("A", "T1", "", "1"));

        let entries = solve(&request, &config()).unwrap();
        assert_valid(&request, &entries);
        assert!(entries.iter().all(|e| !e.subject.is_empty()));
    }
}
