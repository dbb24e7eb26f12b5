#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use tempfile::TempDir;
    use test_context::{test_context, TestContext};
    use vigil::api::AttendanceApi;
    use vigil::db::db::Db;
    use vigil::db::input_samples::InputSample;
    use vigil::db::{activity_log, attendance, lunch_breaks};
    use vigil::libs::config::Config;
    use vigil::libs::error::ApiError;
    use vigil::libs::state::WorkState;

    struct ApiTestContext {
        _temp_dir: TempDir,
        api: AttendanceApi,
    }

    impl TestContext for ApiTestContext {
        fn setup() -> Self {
            let temp_dir = tempfile::tempdir().unwrap();
            let db = Db::open(&temp_dir.path().join("vigil.db")).unwrap();
            let api = AttendanceApi::with_db(Config::default(), db);
            ApiTestContext { _temp_dir: temp_dir, api }
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, h, m, s).unwrap()
    }

    fn clicks() -> InputSample {
        InputSample {
            mouse_clicks: 5,
            is_active: true,
            ..Default::default()
        }
    }

    fn fetch(api: &AttendanceApi, user_id: &str) -> attendance::AttendanceRecord {
        let conn = api.db().conn();
        attendance::fetch_by_user_date(&conn, user_id, date()).unwrap().unwrap()
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_check_in_creates_working_record(ctx: &mut ApiTestContext) {
        let record = ctx.api.check_in("u1", Some(at(9, 0, 0)), Some("10.0.0.7".into()), None).unwrap();

        assert_eq!(record.check_in_time, Some(at(9, 0, 0)));
        assert_eq!(record.current_state, Some(WorkState::Working));
        assert_eq!(record.last_state_change_at, Some(at(9, 0, 0)));
        assert_eq!(record.check_in_ip.as_deref(), Some("10.0.0.7"));
        assert!(record.check_out_time.is_none());

        // An active audit segment is open
        let conn = ctx.api.db().conn();
        let segments = activity_log::fetch_for_record(&conn, &record.id).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment_type, "active");
        assert!(segments[0].ended_at.is_none());
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_double_check_in_is_rejected(ctx: &mut ApiTestContext) {
        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        let err = ctx.api.check_in("u1", Some(at(9, 5, 0)), None, None).unwrap_err();
        assert!(matches!(err, ApiError::AlreadyCheckedIn));

        // The rejection mutated nothing
        let record = fetch(&ctx.api, "u1");
        assert_eq!(record.last_state_change_at, Some(at(9, 0, 0)));
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_check_out_freezes_counters_and_writes_totals(ctx: &mut ApiTestContext) {
        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        let record = ctx.api.check_out("u1", Some(at(17, 0, 0)), None, None, None).unwrap();

        assert_eq!(record.check_out_time, Some(at(17, 0, 0)));
        assert_eq!(record.current_state, None);
        assert_eq!(record.last_state_change_at, None);
        assert_eq!(record.active_seconds, 8 * 3600);
        assert_eq!(record.total_work_duration, Some(8 * 3600));
        assert_eq!(record.total_active_duration, Some(8 * 3600));
        assert_eq!(record.total_idle_duration, Some(0));
        assert_eq!(record.total_break_duration, Some(0));
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_check_out_requires_check_in(ctx: &mut ApiTestContext) {
        let err = ctx.api.check_out("u1", Some(at(17, 0, 0)), None, None, None).unwrap_err();
        assert!(matches!(err, ApiError::NotCheckedIn));

        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        ctx.api.check_out("u1", Some(at(17, 0, 0)), None, None, None).unwrap();
        let err = ctx.api.check_out("u1", Some(at(17, 5, 0)), None, None, None).unwrap_err();
        assert!(matches!(err, ApiError::AlreadyCheckedOut));
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_check_out_clears_cached_activity(ctx: &mut ApiTestContext) {
        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        ctx.api.heartbeat_at("u1", clicks(), at(9, 0, 30)).unwrap();
        assert!(ctx.api.cache().activity("u1").is_some());

        ctx.api.check_out("u1", Some(at(10, 0, 0)), None, None, None).unwrap();
        assert!(ctx.api.cache().activity("u1").is_none());
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_re_check_in_credits_gap_as_idle(ctx: &mut ApiTestContext) {
        // Morning shift: 09:00 to 12:00, all working
        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        ctx.api.check_out("u1", Some(at(12, 0, 0)), None, None, None).unwrap();

        // Back at 13:00: the hour away is idle, counters keep accumulating
        let record = ctx.api.check_in("u1", Some(at(13, 0, 0)), None, None).unwrap();
        assert_eq!(record.active_seconds, 3 * 3600);
        assert_eq!(record.idle_seconds, 3600);
        assert_eq!(record.check_out_time, None);
        assert_eq!(record.total_work_duration, None);
        assert_eq!(record.current_state, Some(WorkState::Working));
        assert_eq!(record.last_state_change_at, Some(at(13, 0, 0)));

        // Closing the day keeps both stretches
        let closed = ctx.api.check_out("u1", Some(at(17, 0, 0)), None, None, None).unwrap();
        assert_eq!(closed.active_seconds, 7 * 3600);
        assert_eq!(closed.idle_seconds, 3600);
        assert_eq!(closed.total_work_duration, Some(8 * 3600));
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_check_in_claims_pre_created_row(ctx: &mut ApiTestContext) {
        let conn = ctx.api.db().conn();
        attendance::create_empty(&conn, "u1", date()).unwrap();
        drop(conn);

        let record = ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        assert_eq!(record.check_in_time, Some(at(9, 0, 0)));
        assert_eq!(record.current_state, Some(WorkState::Working));

        // Still exactly one row for the day
        let conn = ctx.api.db().conn();
        let history = attendance::fetch_history(&conn, "u1", None, None).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_break_lifecycle(ctx: &mut ApiTestContext) {
        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        let started = ctx.api.start_break("u1", Some(at(12, 0, 0)), None).unwrap();
        assert_eq!(started.break_start_time, at(12, 0, 0));
        assert!(started.break_end_time.is_none());

        let record = fetch(&ctx.api, "u1");
        assert_eq!(record.current_state, Some(WorkState::Lunch));
        assert_eq!(record.active_seconds, 3 * 3600);

        let ended = ctx.api.end_break("u1", Some(at(12, 30, 0)), None).unwrap();
        assert_eq!(ended.break_end_time, Some(at(12, 30, 0)));
        assert_eq!(ended.duration, Some(1800));

        let record = fetch(&ctx.api, "u1");
        assert_eq!(record.current_state, Some(WorkState::Working));
        assert_eq!(record.lunch_seconds, 1800);
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_single_open_break_per_record(ctx: &mut ApiTestContext) {
        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        ctx.api.start_break("u1", Some(at(12, 0, 0)), None).unwrap();

        let err = ctx.api.start_break("u1", Some(at(12, 5, 0)), None).unwrap_err();
        assert!(matches!(err, ApiError::BreakAlreadyStarted));

        let conn = ctx.api.db().conn();
        let record = attendance::fetch_by_user_date(&conn, "u1", date()).unwrap().unwrap();
        let open: Vec<_> = lunch_breaks::fetch_for_record(&conn, &record.id)
            .unwrap()
            .into_iter()
            .filter(|b| b.break_end_time.is_none())
            .collect();
        assert_eq!(open.len(), 1);
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_end_break_requires_open_break(ctx: &mut ApiTestContext) {
        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        let err = ctx.api.end_break("u1", Some(at(12, 30, 0)), None).unwrap_err();
        assert!(matches!(err, ApiError::NoActiveBreak));
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_break_requires_check_in(ctx: &mut ApiTestContext) {
        let err = ctx.api.start_break("u1", Some(at(12, 0, 0)), None).unwrap_err();
        assert!(matches!(err, ApiError::NotCheckedIn));
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_today_attendance_adds_live_duration(ctx: &mut ApiTestContext) {
        assert!(ctx.api.today_attendance_at("u1", at(10, 0, 0)).unwrap().is_none());

        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        let today = ctx.api.today_attendance_at("u1", at(10, 0, 0)).unwrap().unwrap();
        assert_eq!(today.live.active, 3600);
        assert_eq!(today.live.idle, 0);
        assert_eq!(today.live.tracked, 3600);
        // The stored counters are untouched by the read
        assert_eq!(today.record.active_seconds, 0);

        ctx.api.start_break("u1", Some(at(12, 0, 0)), None).unwrap();
        let today = ctx.api.today_attendance_at("u1", at(12, 20, 0)).unwrap().unwrap();
        assert_eq!(today.live.active, 3 * 3600);
        assert_eq!(today.live.lunch, 1200);
        assert_eq!(today.live.tracked, 3 * 3600 + 1200);
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_break_lifecycle_writes_audit_segments(ctx: &mut ApiTestContext) {
        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, None).unwrap();
        ctx.api.start_break("u1", Some(at(12, 0, 0)), None).unwrap();
        ctx.api.end_break("u1", Some(at(12, 30, 0)), None).unwrap();

        let conn = ctx.api.db().conn();
        let record = attendance::fetch_by_user_date(&conn, "u1", date()).unwrap().unwrap();
        let segments = activity_log::fetch_for_record(&conn, &record.id).unwrap();

        let kinds: Vec<&str> = segments.iter().map(|s| s.segment_type.as_str()).collect();
        assert_eq!(kinds, vec!["active", "lunch_break", "active"]);
        // Only the newest segment is open
        assert_eq!(segments.iter().filter(|s| s.ended_at.is_none()).count(), 1);
        assert_eq!(segments[0].ended_at, Some(at(12, 0, 0)));
        assert_eq!(segments[1].ended_at, Some(at(12, 30, 0)));
        assert!(segments[2].ended_at.is_none());
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ApiError::NotCheckedIn.code(), "NOT_CHECKED_IN");
        assert_eq!(ApiError::AlreadyCheckedIn.code(), "ALREADY_CHECKED_IN");
        assert_eq!(ApiError::AlreadyCheckedOut.code(), "ALREADY_CHECKED_OUT");
        assert_eq!(ApiError::BreakAlreadyStarted.code(), "BREAK_ALREADY_STARTED");
        assert_eq!(ApiError::NoActiveBreak.code(), "NO_ACTIVE_BREAK");
        assert_eq!(ApiError::AutoCheckedOut.code(), "AUTO_CHECKED_OUT");
        assert!(ApiError::NotCheckedIn.is_domain_rejection());
        assert!(!ApiError::Internal(anyhow::anyhow!("boom")).is_domain_rejection());
    }

    #[test_context(ApiTestContext)]
    #[test]
    fn test_check_in_with_location_roundtrips(ctx: &mut ApiTestContext) {
        let location = serde_json::json!({"lat": 52.52, "lon": 13.405});
        ctx.api.check_in("u1", Some(at(9, 0, 0)), None, Some(location.clone())).unwrap();
        let record = fetch(&ctx.api, "u1");
        assert_eq!(record.check_in_location, Some(location));
    }
}
