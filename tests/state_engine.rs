#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use tempfile::TempDir;
    use test_context::{test_context, TestContext};
    use vigil::db::attendance::{self, AttendanceRecord};
    use vigil::db::db::Db;
    use vigil::libs::state::{self, WorkState};

    struct StateTestContext {
        _temp_dir: TempDir,
        db: Db,
    }

    impl TestContext for StateTestContext {
        fn setup() -> Self {
            let temp_dir = tempfile::tempdir().unwrap();
            let db = Db::open(&temp_dir.path().join("vigil.db")).unwrap();
            StateTestContext { _temp_dir: temp_dir, db }
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, h, m, s).unwrap()
    }

    fn seed_record(db: &Db) -> AttendanceRecord {
        let conn = db.conn();
        let record = AttendanceRecord::new("u1", date(), at(9, 0, 0));
        attendance::insert(&conn, &record).unwrap();
        record
    }

    #[test_context(StateTestContext)]
    #[test]
    fn test_first_transition_initialises_without_credit(ctx: &mut StateTestContext) {
        let mut record = seed_record(&ctx.db);
        let conn = ctx.db.conn();

        let applied = state::apply_transition(&conn, &mut record, WorkState::Working, at(9, 0, 0)).unwrap();
        assert!(applied);
        assert_eq!(record.current_state, Some(WorkState::Working));
        assert_eq!(record.last_state_change_at, Some(at(9, 0, 0)));
        assert_eq!(record.active_seconds, 0);
        assert_eq!(record.idle_seconds, 0);
        assert_eq!(record.lunch_seconds, 0);
    }

    #[test_context(StateTestContext)]
    #[test]
    fn test_transition_credits_previous_state(ctx: &mut StateTestContext) {
        let mut record = seed_record(&ctx.db);
        let conn = ctx.db.conn();

        state::apply_transition(&conn, &mut record, WorkState::Working, at(9, 0, 0)).unwrap();
        state::apply_transition(&conn, &mut record, WorkState::Idle, at(10, 0, 0)).unwrap();

        assert_eq!(record.active_seconds, 3600);
        assert_eq!(record.idle_seconds, 0);
        assert_eq!(record.current_state, Some(WorkState::Idle));

        // The stored row matches the in-memory view
        let stored = attendance::fetch_by_id(&conn, &record.id).unwrap().unwrap();
        assert_eq!(stored.active_seconds, 3600);
        assert_eq!(stored.current_state, Some(WorkState::Idle));
        assert_eq!(stored.last_state_change_at, Some(at(10, 0, 0)));
    }

    #[test_context(StateTestContext)]
    #[test]
    fn test_backdated_transition_is_rejected(ctx: &mut StateTestContext) {
        let mut record = seed_record(&ctx.db);
        let conn = ctx.db.conn();

        state::apply_transition(&conn, &mut record, WorkState::Working, at(10, 0, 0)).unwrap();
        let applied = state::apply_transition(&conn, &mut record, WorkState::Idle, at(9, 30, 0)).unwrap();

        assert!(!applied);
        assert_eq!(record.current_state, Some(WorkState::Working));
        assert_eq!(record.last_state_change_at, Some(at(10, 0, 0)));
        assert_eq!(record.active_seconds, 0);

        let stored = attendance::fetch_by_id(&conn, &record.id).unwrap().unwrap();
        assert_eq!(stored.current_state, Some(WorkState::Working));
        assert_eq!(stored.last_state_change_at, Some(at(10, 0, 0)));
    }

    #[test_context(StateTestContext)]
    #[test]
    fn test_finalize_credits_and_clears_state(ctx: &mut StateTestContext) {
        let mut record = seed_record(&ctx.db);
        let conn = ctx.db.conn();

        state::apply_transition(&conn, &mut record, WorkState::Working, at(9, 0, 0)).unwrap();
        state::apply_transition(&conn, &mut record, WorkState::Lunch, at(12, 0, 0)).unwrap();
        state::finalize(&conn, &mut record, at(12, 30, 0)).unwrap();

        assert_eq!(record.active_seconds, 3 * 3600);
        assert_eq!(record.lunch_seconds, 1800);
        assert_eq!(record.current_state, None);
        assert_eq!(record.last_state_change_at, None);

        let stored = attendance::fetch_by_id(&conn, &record.id).unwrap().unwrap();
        assert_eq!(stored.current_state, None);
        assert_eq!(stored.last_state_change_at, None);
    }

    #[test_context(StateTestContext)]
    #[test]
    fn test_current_duration_does_not_mutate(ctx: &mut StateTestContext) {
        let mut record = seed_record(&ctx.db);
        let conn = ctx.db.conn();

        state::apply_transition(&conn, &mut record, WorkState::Working, at(9, 0, 0)).unwrap();
        assert_eq!(state::current_duration_at(&record, at(9, 45, 0)), 2700);
        assert_eq!(record.active_seconds, 0);

        state::finalize(&conn, &mut record, at(10, 0, 0)).unwrap();
        assert_eq!(state::current_duration_at(&record, at(11, 0, 0)), 0);
    }

    #[test]
    fn test_clamp_trims_idle_before_active() {
        let totals = state::clamp_counters(3600, 1800, 600, 4500);
        // 1500 over budget: idle absorbs the excess first
        assert_eq!(totals.idle, 300);
        assert_eq!(totals.active, 3600);
        assert_eq!(totals.lunch, 600);
        assert_eq!(totals.tracked(), 4500);
    }

    #[test]
    fn test_clamp_trims_active_after_idle_exhausted() {
        let totals = state::clamp_counters(3600, 600, 0, 2000);
        assert_eq!(totals.idle, 0);
        assert_eq!(totals.active, 1400);
        assert_eq!(totals.work(), 1400);
    }

    #[test]
    fn test_clamp_is_idempotent() {
        let once = state::clamp_counters(3600, 1800, 600, 4500);
        let twice = state::clamp_counters(once.active, once.idle, once.lunch, 4500);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_clamp_leaves_consistent_counters_alone() {
        let totals = state::clamp_counters(3600, 1800, 600, 6000);
        assert_eq!(totals.active, 3600);
        assert_eq!(totals.idle, 1800);
        assert_eq!(totals.lunch, 600);
    }
}
