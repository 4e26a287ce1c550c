/// # Integration Tests Module
///
/// End-to-end tests driving a [`Database`](crate::database::Database) through
/// its public operations against real files in a temporary directory.

#[cfg(test)]
mod tests {
    use crate::core::db::{ChangesResult, SetStatement, SqlValue};
    use crate::core::{StatementStage, SyncqlError};
    use crate::json::{JsonMode, JsonSqlite};
    use crate::test_utils::*;
    use chrono::Utc;

    const T_SCHEMA: &str = "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);";

    fn insert_v(v: &str) -> SetStatement {
        SetStatement::new("INSERT INTO t(v) VALUES(?)", vec![SqlValue::from(v)])
    }

    fn values_of_t(db: &crate::database::Database) -> Vec<SqlValue> {
        db.select_sql("SELECT v FROM t", &[])
            .unwrap()
            .into_iter()
            .filter_map(|mut row| row.remove("v"))
            .collect()
    }

    #[test]
    fn test_batch_commits_in_insertion_order() {
        let store = TestStore::new("batch");
        let db = store.open_database();
        db.exec_sql(T_SCHEMA).unwrap();

        let changes = db.exec_set(&[insert_v("a"), insert_v("b")]).unwrap();
        assert_eq!(changes, 2);
        assert_eq!(values_of_t(&db), vec![SqlValue::from("a"), SqlValue::from("b")]);
    }

    #[test]
    fn test_failed_batch_leaves_nothing_behind() {
        let store = TestStore::new("atomic");
        let db = store.open_database();
        db.exec_sql(T_SCHEMA).unwrap();

        let failing = SetStatement::new(
            "INSERT INTO missing_table(v) VALUES(?)",
            vec![SqlValue::from("b")],
        );
        let err = db.exec_set(&[insert_v("a"), failing]).unwrap_err();
        match &err {
            SyncqlError::ExecSet(inner) => {
                assert!(matches!(**inner, SyncqlError::BatchMember { index: 1, .. }))
            }
            other => panic!("Expected ExecSet error, got {:?}", other),
        }
        assert_eq!(err.stage(), Some(StatementStage::Prepare));
        assert!(values_of_t(&db).is_empty());

        // The store is not left locked by the abandoned transaction.
        assert_eq!(db.exec_set(&[insert_v("c")]).unwrap(), 1);
        assert_eq!(values_of_t(&db), vec![SqlValue::from("c")]);
    }

    #[test]
    fn test_failed_batch_member_at_step_stage() {
        let store = TestStore::new("step");
        let db = store.with_sample_data();
        let duplicate = SetStatement::new(
            "INSERT INTO users (id, name) VALUES (?, ?)",
            vec![SqlValue::Integer(1), SqlValue::from("Again")],
        );
        let fresh = SetStatement::new(
            "INSERT INTO users (id, name) VALUES (?, ?)",
            vec![SqlValue::Integer(3), SqlValue::from("Carol")],
        );
        let err = db.exec_set(&[fresh, duplicate]).unwrap_err();
        assert_eq!(err.stage(), Some(StatementStage::Step));
        assert_eq!(
            err.status_code(),
            Some(rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        );

        let rows = db.select_sql("SELECT id FROM users WHERE id = ?", &["3".to_string()]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_run_sql_on_empty_table() {
        let store = TestStore::new("run");
        let db = store.open_database();
        db.exec_sql(T_SCHEMA).unwrap();

        let result = db
            .run_sql("INSERT INTO t(v) VALUES(?)", &[SqlValue::from("x")])
            .unwrap();
        assert_eq!(
            result,
            ChangesResult {
                changes: 1,
                last_id: 1
            }
        );
    }

    #[test]
    fn test_round_trip_through_separate_connections() {
        let store = TestStore::new("roundtrip");
        let db = store.open_database();
        db.exec_sql("CREATE TABLE kinds (i INTEGER, r REAL, s TEXT, b BLOB, n TEXT);")
            .unwrap();
        db.run_sql(
            "INSERT INTO kinds VALUES (?, ?, ?, ?, ?)",
            &[
                SqlValue::Integer(-7),
                SqlValue::Real(2.5),
                SqlValue::from("héllo"),
                SqlValue::Blob(vec![0, 255, 16]),
                SqlValue::Null,
            ],
        )
        .unwrap();

        let rows = db.select_sql("SELECT * FROM kinds", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["i"], SqlValue::Integer(-7));
        assert_eq!(rows[0]["r"], SqlValue::Real(2.5));
        assert_eq!(rows[0]["s"], SqlValue::from("héllo"));
        assert_eq!(rows[0]["b"], SqlValue::Blob(vec![0, 255, 16]));
        assert_eq!(rows[0]["n"], SqlValue::Null);
    }

    #[test]
    fn test_sync_table_creation_is_idempotent() {
        let store = TestStore::new("ledger");
        let db = store.open_database();

        assert!(db.create_sync_table().unwrap() > 0);
        assert_eq!(db.create_sync_table().unwrap(), 0);

        let rows = db.select_sql("SELECT id FROM sync_table", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], SqlValue::Integer(1));
    }

    #[test]
    fn test_set_sync_date_records_call_time() {
        let store = TestStore::new("syncdate");
        let db = store.open_database();
        db.create_sync_table().unwrap();
        db.set_sync_date_to(1).unwrap();

        let called_at = Utc::now().timestamp();
        assert!(db.set_sync_date().unwrap());

        let rows = db
            .select_sql("SELECT sync_date FROM sync_table WHERE id = 1", &[])
            .unwrap();
        let stamped = rows[0]["sync_date"].as_i64().unwrap();
        assert!((stamped - called_at).abs() <= 1);
        assert_eq!(db.get_sync_date().unwrap(), stamped);
    }

    #[test]
    fn test_set_sync_date_without_ledger_fails() {
        let store = TestStore::new("noledger");
        let db = store.open_database();
        match db.set_sync_date() {
            Err(SyncqlError::SyncDate(inner)) => {
                assert!(matches!(*inner, SyncqlError::Prepare { .. }))
            }
            other => panic!("Expected SyncDate error, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_is_idempotent_and_closes() {
        let store = TestStore::new("deleted");
        let mut db = store.with_sample_data();
        let wal = {
            let mut p = db.path().as_os_str().to_owned();
            p.push("-wal");
            std::path::PathBuf::from(p)
        };
        std::fs::write(&wal, b"").unwrap();

        assert!(db.delete().unwrap());
        assert!(!db.is_open());
        assert!(!db.path().exists());
        assert!(!wal.exists());
        assert!(!db.delete().unwrap());

        assert!(matches!(db.exec_sql("SELECT 1"), Err(SyncqlError::ExecSql(_))));
    }

    #[test]
    fn test_reopen_after_close_sees_committed_data() {
        let store = TestStore::new("reopen");
        let mut db = store.open_database();
        db.exec_sql(T_SCHEMA).unwrap();
        db.exec_set(&[insert_v("kept")]).unwrap();
        db.close().unwrap();

        assert!(matches!(
            innermost(&db.select_sql("SELECT v FROM t", &[]).unwrap_err()),
            SyncqlError::NotOpen(_)
        ));

        db.open().unwrap();
        assert_eq!(values_of_t(&db), vec![SqlValue::from("kept")]);
    }

    #[test]
    fn test_many_failures_do_not_exhaust_resources() {
        let store = TestStore::new("resources");
        let db = store.open_database();
        db.exec_sql(T_SCHEMA).unwrap();

        for _ in 0..200 {
            assert!(db.run_sql("INSERT INTO t(v) VALUES(?, ?)", &["a".into(), "b".into()]).is_err());
            assert!(db.select_sql("SELECT nope FROM t", &[]).is_err());
            assert!(db.exec_sql("NOT SQL").is_err());
        }
        assert_eq!(db.exec_set(&[insert_v("after")]).unwrap(), 1);
    }

    #[test]
    fn test_json_export_then_import_into_new_store() {
        let source_store = TestStore::new("source");
        let source = source_store.with_sample_data();
        source.create_sync_table().unwrap();
        let exported = source.export_to_json(JsonMode::Full).unwrap();

        let names: Vec<&str> = exported.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "posts"]);

        let text = exported.to_json_string().unwrap();
        let parsed = JsonSqlite::from_json_str(&text).unwrap();

        let target_store = TestStore::new("target");
        let target = target_store.open_database();
        assert_eq!(target.import_from_json(&parsed).unwrap(), 3);

        let round_trip = target.export_to_json(JsonMode::Full).unwrap();
        assert_eq!(round_trip.tables, exported.tables);
        assert_eq!(round_trip.database, "target");
    }

    #[test]
    fn test_partial_export_after_sync() {
        let store = TestStore::new("partial");
        let db = store.with_sample_data();
        db.create_sync_table().unwrap();
        db.set_sync_date_to(2000).unwrap();
        db.run_sql(
            "INSERT INTO posts (id, user_id, title, last_modified) VALUES (?, ?, ?, ?)",
            &[
                SqlValue::Integer(2),
                SqlValue::Integer(2),
                SqlValue::from("Later"),
                SqlValue::Integer(3000),
            ],
        )
        .unwrap();

        let partial = db.export_to_json(JsonMode::Partial).unwrap();
        assert_eq!(partial.mode, JsonMode::Partial);
        assert_eq!(partial.tables.len(), 1);
        assert_eq!(partial.tables[0].name, "posts");
        assert_eq!(partial.tables[0].values.as_ref().unwrap().len(), 1);

        // Merging the partial export into a copy updates or inserts by key.
        let copy_store = TestStore::new("copy");
        let copy = copy_store.with_sample_data();
        copy.import_from_json(&partial).unwrap();
        let titles = copy.select_sql("SELECT title FROM posts ORDER BY id", &[]).unwrap();
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[1]["title"], SqlValue::from("Later"));
    }

    #[test]
    fn test_invalid_import_is_rejected_before_touching_the_store() {
        let store = TestStore::new("badimport");
        let db = store.open_database();
        let json = JsonSqlite {
            database: "badimport".to_string(),
            encrypted: false,
            mode: JsonMode::Full,
            tables: vec![crate::json::JsonTable {
                name: "bad name".to_string(),
                schema: None,
                indexes: None,
                values: Some(vec![]),
            }],
        };
        match db.import_from_json(&json) {
            Err(SyncqlError::Import(inner)) => {
                assert!(matches!(*inner, SyncqlError::InvalidJson(_)))
            }
            other => panic!("Expected Import error, got {:?}", other),
        }
    }
}
